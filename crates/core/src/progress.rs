//! Progress reporting for migration phases
//!
//! One bar per phase and entity, drawn with `indicatif`. Trackers can be
//! hidden for tests and non-interactive runs; counters keep working either way.

use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.green} {prefix:>22} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {prefix:>22} [{elapsed_precise}] {pos} {msg}";

/// Creates progress tasks for a run
pub struct ProgressTracker {
    multi: MultiProgress,
    visible: bool,
}

impl ProgressTracker {
    /// Create a tracker drawing to stderr
    pub fn new(visible: bool) -> Self {
        let multi = if visible {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        Self { multi, visible }
    }

    /// Create a tracker that never draws
    pub fn hidden() -> Self {
        Self::new(false)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Start a task with a known total (0 for unknown)
    pub fn task(&self, label: impl Into<String>, total: u64) -> TaskProgress {
        let label = label.into();
        let bar = if !self.visible {
            ProgressBar::hidden()
        } else if total > 0 {
            let bar = self.multi.add(ProgressBar::new(total));
            bar.set_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▓▒░  "),
            );
            bar
        } else {
            let bar = self.multi.add(ProgressBar::new_spinner());
            bar.set_style(
                ProgressStyle::with_template(SPINNER_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        bar.set_prefix(label.clone());

        TaskProgress {
            label,
            bar,
            total,
            processed: 0,
            errors: 0,
            started: Instant::now(),
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::hidden()
    }
}

/// Progress of one phase/entity task
pub struct TaskProgress {
    label: String,
    bar: ProgressBar,
    total: u64,
    processed: u64,
    errors: u64,
    started: Instant,
}

impl TaskProgress {
    /// Record processed items
    pub fn inc(&mut self, count: u64) {
        self.processed += count;
        self.bar.inc(count);
    }

    /// Record items that failed
    pub fn error(&mut self, count: u64) {
        self.errors += count;
        self.bar
            .set_message(format!("{} error(s)", format_number(self.errors)));
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.bar.set_message(msg.into());
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Finish the task and return its counters
    pub fn finish(self) -> TaskStats {
        let stats = self.stats();
        self.bar.finish_with_message(format!(
            "✓ {} processed",
            format_number(stats.processed)
        ));
        stats
    }

    /// Abandon the task after a failure
    pub fn abandon(self, msg: &str) -> TaskStats {
        let stats = self.stats();
        self.bar.abandon_with_message(format!("✗ {}", msg));
        stats
    }

    fn stats(&self) -> TaskStats {
        TaskStats {
            label: self.label.clone(),
            total: self.total,
            processed: self.processed,
            errors: self.errors,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Counters of a finished task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStats {
    pub label: String,
    pub total: u64,
    pub processed: u64,
    pub errors: u64,
    pub elapsed: Duration,
}

impl TaskStats {
    /// Processed share of the total, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.processed.saturating_sub(self.errors)) as f64 / self.total as f64 * 100.0
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}
