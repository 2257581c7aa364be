//! Per-run context handed to every phase
//!
//! Holds what would otherwise be process-wide state: run identity, dry-run
//! and continue-on-error flags, the cancellation token and the progress
//! tracker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::progress::ProgressTracker;

/// Shared flag set when the user interrupts a run
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Context of one migration run
pub struct MigrationContext {
    pub run_id: String,
    /// Fixed for the whole run; used as default audit timestamp
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub continue_on_error: bool,
    cancel: CancellationToken,
    progress: ProgressTracker,
}

impl MigrationContext {
    pub fn new(dry_run: bool, continue_on_error: bool) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            dry_run,
            continue_on_error,
            cancel: CancellationToken::new(),
            progress: ProgressTracker::hidden(),
        }
    }

    /// Share a cancellation token with a signal handler
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }
}

impl Default for MigrationContext {
    fn default() -> Self {
        Self::new(false, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let context = MigrationContext::default().with_cancellation(token.clone());
        assert!(!context.is_cancelled());

        token.cancel();
        assert!(context.is_cancelled());
    }

    #[test]
    fn test_run_ids_are_unique() {
        let a = MigrationContext::default();
        let b = MigrationContext::default();
        assert_ne!(a.run_id, b.run_id);
    }
}
