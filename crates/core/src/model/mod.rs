//! Migration data model
//!
//! - [`Entity`] and [`Phase`]: what is migrated and in which order
//! - [`canonical`]: field-resolved records produced by extraction
//! - [`TargetItem`] and [`SaleRecord`]: keyed items produced by transformation
//! - [`keys`]: key design shared by the transformer and the validator

pub mod canonical;
mod item;
pub mod keys;

pub use canonical::{CanonicalBuyer, CanonicalProducer, CanonicalSale, CanonicalSaleLine, PartyFields};
pub use item::{SaleRecord, TargetItem, is_empty_value};

use serde::{Deserialize, Serialize};

/// Business entity migrated by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Buyers,
    Producers,
    Sales,
}

impl Entity {
    /// All entities in processing order
    ///
    /// Sales come last because they embed buyer and producer snapshots.
    pub fn all() -> Vec<Self> {
        vec![Self::Buyers, Self::Producers, Self::Sales]
    }

    /// Get entity name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Buyers => "buyers",
            Self::Producers => "producers",
            Self::Sales => "sales",
        }
    }

    /// Singular key prefix used in partition keys (`BUYER#<id>`)
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::Buyers => "BUYER",
            Self::Producers => "PRODUCER",
            Self::Sales => "SALE",
        }
    }

    /// Label used in validation messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::Buyers => "Buyer",
            Self::Producers => "Producer",
            Self::Sales => "Sale",
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Entity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buyers" | "buyer" => Ok(Self::Buyers),
            "producers" | "producer" => Ok(Self::Producers),
            "sales" | "sale" => Ok(Self::Sales),
            _ => Err(format!(
                "Unknown entity: {s} (expected buyers, producers or sales)"
            )),
        }
    }
}

/// Migration phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Phase 1: Read rows from the relational source
    Extract,
    /// Phase 2: Build keyed target items
    Transform,
    /// Phase 3: Check structural and business rules
    Validate,
    /// Phase 4: Write items to the target store
    Load,
    /// Phase 5: Compare item counts after loading
    Verify,
}

impl Phase {
    /// Get all phases in execution order
    pub fn all() -> Vec<Self> {
        vec![
            Self::Extract,
            Self::Transform,
            Self::Validate,
            Self::Load,
            Self::Verify,
        ]
    }

    /// Phases whose completion is recorded in the checkpoint
    pub fn checkpointed() -> Vec<Self> {
        vec![Self::Extract, Self::Transform, Self::Validate, Self::Load]
    }

    /// Get phase name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Transform => "transform",
            Self::Validate => "validate",
            Self::Load => "load",
            Self::Verify => "verify",
        }
    }

    /// Get phase description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Extract => "Extract records from the relational source",
            Self::Transform => "Transform records into keyed target items",
            Self::Validate => "Validate target items",
            Self::Load => "Load items into the target store",
            Self::Verify => "Verify item counts in the target store",
        }
    }

    /// Get phase index (1-based)
    pub fn index(&self) -> usize {
        match self {
            Self::Extract => 1,
            Self::Transform => 2,
            Self::Validate => 3,
            Self::Load => 4,
            Self::Verify => 5,
        }
    }

    /// Whether completion of this phase is checkpointed
    pub fn is_checkpointed(&self) -> bool {
        !matches!(self, Self::Verify)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "extract" | "1" => Ok(Self::Extract),
            "transform" | "2" => Ok(Self::Transform),
            "validate" | "3" => Ok(Self::Validate),
            "load" | "4" => Ok(Self::Load),
            "verify" | "5" => Ok(Self::Verify),
            _ => Err(format!("Unknown phase: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_order() {
        assert_eq!(
            Entity::all(),
            vec![Entity::Buyers, Entity::Producers, Entity::Sales]
        );
    }

    #[test]
    fn test_entity_from_str() {
        assert_eq!("buyers".parse::<Entity>().unwrap(), Entity::Buyers);
        assert_eq!("Producer".parse::<Entity>().unwrap(), Entity::Producers);
        assert_eq!(" SALES ".parse::<Entity>().unwrap(), Entity::Sales);
        assert!("invoices".parse::<Entity>().is_err());
    }

    #[test]
    fn test_phase_from_str() {
        assert_eq!("extract".parse::<Phase>().unwrap(), Phase::Extract);
        assert_eq!("3".parse::<Phase>().unwrap(), Phase::Validate);
        assert_eq!("LOAD".parse::<Phase>().unwrap(), Phase::Load);
        assert!("publish".parse::<Phase>().is_err());
    }

    #[test]
    fn test_phase_index_matches_order() {
        for (position, phase) in Phase::all().iter().enumerate() {
            assert_eq!(phase.index(), position + 1);
        }
        assert!(!Phase::Verify.is_checkpointed());
        assert_eq!(Phase::checkpointed().len(), 4);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Phase::Transform).unwrap(), "\"transform\"");
        assert_eq!(serde_json::to_string(&Entity::Producers).unwrap(), "\"producers\"");
    }
}
