//! Sale migration core library
//!
//! Moves sales, buyers and producers out of a normalized relational schema
//! and into a denormalized single-table key-value store. The work is split in
//! phases that run in a fixed order:
//!
//! 1. **Extract**: read rows through a [`extract::SourceConnection`] and
//!    resolve them into canonical records
//! 2. **Transform**: mint surrogate ids, derive line amounts, normalize
//!    statuses and build keyed target items
//! 3. **Validate**: check structural and business rules, producing a
//!    [`validate::ValidationReport`]
//! 4. **Load**: write items in chunks through a [`load::TargetStore`]
//! 5. **Verify** (optional): compare item counts in the target store
//!
//! Each phase checkpoints per entity so an interrupted run can be resumed.
//!
//! # Example
//!
//! ```rust,ignore
//! use sale_migration_core::config::MigrationConfig;
//! use sale_migration_core::pipeline::Orchestrator;
//!
//! let config = MigrationConfig::from_file("migration.toml")?;
//! let mut orchestrator = Orchestrator::new(config)?;
//! let report = orchestrator.run_full()?;
//! report.print_summary();
//! ```

pub mod config;
pub mod context;
pub mod dates;
pub mod error;
pub mod extract;
pub mod load;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod transform;
pub mod validate;

pub use config::MigrationConfig;
pub use context::{CancellationToken, MigrationContext};
pub use error::{MigrationError, MigrationResult};
pub use model::{Entity, Phase, SaleRecord, TargetItem};
pub use pipeline::{MigrationReport, Orchestrator};
