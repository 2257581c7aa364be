use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Entity;

/// Record counts of one entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStats {
    pub count: usize,
    pub valid: usize,
    pub invalid: usize,
}

/// Outcome of validating one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityValidation {
    pub entity: Entity,
    pub stats: EntityStats,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl EntityValidation {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            stats: EntityStats::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Whether the entity blocks the pipeline
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.stats.invalid > 0
    }

    /// Count one record, valid when it produced no errors
    pub(super) fn record(&mut self, errors: Vec<String>, warnings: Vec<String>) {
        self.stats.count += 1;
        if errors.is_empty() {
            self.stats.valid += 1;
        } else {
            self.stats.invalid += 1;
        }
        self.errors.extend(errors);
        self.warnings.extend(warnings);
    }
}

/// Aggregate counts over all entities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total_records: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    pub error_count: usize,
    pub warning_count: usize,
}

/// Validation results of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub timestamp: String,
    pub summary: ValidationSummary,
    pub statistics: BTreeMap<Entity, EntityStats>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            ..Default::default()
        }
    }

    /// Merge the results of one entity
    pub fn add(&mut self, result: &EntityValidation) {
        self.statistics.insert(result.entity, result.stats);
        self.errors.extend(result.errors.iter().cloned());
        self.warnings.extend(result.warnings.iter().cloned());

        let summary = &mut self.summary;
        summary.total_records += result.stats.count;
        summary.valid_records += result.stats.valid;
        summary.invalid_records += result.stats.invalid;
        summary.error_count = self.errors.len();
        summary.warning_count = self.warnings.len();
    }

    pub fn passed(&self) -> bool {
        self.summary.error_count == 0 && self.summary.invalid_records == 0
    }

    pub fn is_empty(&self) -> bool {
        self.statistics.is_empty()
    }
}
