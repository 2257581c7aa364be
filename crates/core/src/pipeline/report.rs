//! Run report

use serde::Serialize;

use crate::model::{Entity, Phase};
use crate::progress::format_number;
use crate::validate::ValidationReport;

/// Final status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Some entity failed and the run went on because of continue-on-error
    CompletedWithErrors,
    Failed,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithErrors => write!(f, "completed with errors"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What happened to one entity in one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    /// Already checkpointed by an earlier run
    Skipped,
    /// Dry run; only counted
    Planned,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityOutcome {
    pub phase: Phase,
    pub entity: Entity,
    pub status: OutcomeStatus,
    /// Records processed, or counted in a dry run
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one orchestrator run
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub run_id: String,
    pub status: RunStatus,
    pub dry_run: bool,
    pub phases: Vec<Phase>,
    pub outcomes: Vec<EntityOutcome>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntityOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
    }

    pub fn outcome(&self, phase: Phase, entity: Entity) -> Option<&EntityOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.phase == phase && o.entity == entity)
    }

    /// Get formatted duration
    pub fn duration_formatted(&self) -> String {
        let secs = self.duration_ms / 1000;
        let mins = secs / 60;
        let remaining_secs = secs % 60;

        if mins > 0 {
            format!("{}m {}s", mins, remaining_secs)
        } else if secs > 0 {
            format!("{}s", secs)
        } else {
            format!("{}ms", self.duration_ms)
        }
    }

    /// Print summary to stderr
    pub fn print_summary(&self) {
        eprintln!();
        eprintln!("Migration {} - {}", self.run_id, self.status);
        if self.dry_run {
            eprintln!("DRY RUN - nothing was written");
        }
        eprintln!("Duration: {}", self.duration_formatted());

        for phase in &self.phases {
            eprintln!("  {}:", phase);
            for outcome in self.outcomes.iter().filter(|o| o.phase == *phase) {
                let status = match outcome.status {
                    OutcomeStatus::Succeeded => "ok",
                    OutcomeStatus::Skipped => "skipped (checkpointed)",
                    OutcomeStatus::Planned => "planned",
                    OutcomeStatus::Failed => "FAILED",
                };
                eprintln!(
                    "    - {:<10} {:>10}  {}",
                    outcome.entity.name(),
                    format_number(outcome.count),
                    status
                );
                if let Some(error) = &outcome.error {
                    eprintln!("        {}", error);
                }
            }
        }

        if let Some(validation) = &self.validation {
            let summary = &validation.summary;
            eprintln!(
                "Validation: {} record(s), {} invalid, {} error(s), {} warning(s)",
                format_number(summary.total_records as u64),
                format_number(summary.invalid_records as u64),
                summary.error_count,
                summary.warning_count
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: RunStatus, duration_ms: u64) -> MigrationReport {
        MigrationReport {
            run_id: "run-1".to_string(),
            status,
            dry_run: false,
            phases: vec![Phase::Load],
            outcomes: vec![
                EntityOutcome {
                    phase: Phase::Load,
                    entity: Entity::Buyers,
                    status: OutcomeStatus::Succeeded,
                    count: 10,
                    error: None,
                },
                EntityOutcome {
                    phase: Phase::Load,
                    entity: Entity::Sales,
                    status: OutcomeStatus::Failed,
                    count: 0,
                    error: Some("batch 2 failed".to_string()),
                },
            ],
            duration_ms,
            validation: None,
        }
    }

    #[test]
    fn test_duration_formatted() {
        assert_eq!(report(RunStatus::Completed, 65_000).duration_formatted(), "1m 5s");
        assert_eq!(report(RunStatus::Completed, 4_200).duration_formatted(), "4s");
        assert_eq!(report(RunStatus::Completed, 37).duration_formatted(), "37ms");
    }

    #[test]
    fn test_failures() {
        let report = report(RunStatus::CompletedWithErrors, 0);
        assert!(!report.is_success());
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].entity, Entity::Sales);
        assert_eq!(
            report.outcome(Phase::Load, Entity::Buyers).map(|o| o.count),
            Some(10)
        );
    }

    #[test]
    fn test_serializes_statuses() {
        let value = serde_json::to_value(report(RunStatus::CompletedWithErrors, 0)).unwrap();
        assert_eq!(value["status"], "completed_with_errors");
        assert_eq!(value["outcomes"][1]["status"], "failed");
        assert!(value["outcomes"][0].get("error").is_none());
    }
}
