//! Migration pipeline
//!
//! Ties the phases together:
//!
//! - [`Orchestrator`] runs phases and entities in order, honouring dry-run,
//!   continue-on-error and cancellation
//! - [`CheckpointStore`] records which phase completed for which entity
//! - [`ArtifactStore`] holds the JSON handed from one phase to the next
//! - [`MigrationReport`] summarizes a run
//!
//! # Example
//!
//! ```rust,ignore
//! use sale_migration_core::config::MigrationConfig;
//! use sale_migration_core::pipeline::Orchestrator;
//!
//! let config = MigrationConfig::from_file("migration.toml")?;
//! let mut orchestrator = Orchestrator::new(config)?;
//! let report = orchestrator.resume()?;
//!
//! println!("Migration finished in {}", report.duration_formatted());
//! ```

mod artifacts;
pub mod checkpoint;
mod orchestrator;
mod report;
mod verify;

pub use artifacts::{ArtifactStore, TransformedRecords, read_json, write_json};
pub use checkpoint::{Checkpoint, CheckpointEntry, CheckpointStore};
pub use orchestrator::{Orchestrator, PipelineState};
pub use report::{EntityOutcome, MigrationReport, OutcomeStatus, RunStatus};
pub use verify::verify_entity;
