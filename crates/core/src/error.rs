//! Error types for migration operations
//!
//! Every phase reports failures through its own error type. The orchestrator
//! wraps them in [`MigrationError`], adding the phase and entity they
//! occurred in, so CLI output can always name where a run stopped.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::{Entity, Phase};

/// Errors raised by a relational source connection
#[derive(Error, Debug)]
pub enum SourceError {
    /// The connection could not be opened
    #[error("Source connection failed: {0}")]
    Connection(String),

    /// A statement failed to execute
    #[error("Query failed: {message} (SQL: {sql})")]
    Query { sql: String, message: String },

    /// The source is not available in this build
    #[error("Source backend '{0}' is not available in this build")]
    Unsupported(String),
}

/// A source value that could not be interpreted for a canonical field
#[derive(Error, Debug, Clone, PartialEq)]
#[error("field '{field}' (column '{column}'): cannot interpret {value} as {expected}")]
pub struct FieldError {
    pub field: &'static str,
    pub column: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Errors raised while extracting one entity
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Query or connection failure
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A row carries no usable source identifier
    #[error("{entity} row {row} has no source identifier (looked for: {candidates})")]
    MissingSourceId {
        entity: Entity,
        row: usize,
        candidates: String,
    },

    /// A column value could not be coerced
    #[error("{entity} record {record}: {source}")]
    InvalidField {
        entity: Entity,
        record: String,
        #[source]
        source: FieldError,
    },

    /// The resolved fields did not form a canonical record
    #[error("{entity} record {record} could not be built: {message}")]
    Shape {
        entity: Entity,
        record: String,
        message: String,
    },
}

/// Errors raised while transforming one entity
#[derive(Error, Debug)]
pub enum TransformationError {
    /// A canonical record cannot be turned into a target item
    #[error("{entity} record {source_id}: {message}")]
    InvalidRecord {
        entity: Entity,
        source_id: String,
        message: String,
    },
}

/// Validation found blocking errors for an entity
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("validation of {entity} failed: {errors} error(s), {warnings} warning(s), {invalid} invalid record(s)")]
    Failed {
        entity: Entity,
        errors: usize,
        warnings: usize,
        invalid: usize,
    },
}

/// Errors raised by a target store backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend call failed
    #[error("target store error: {0}")]
    Backend(String),

    /// Items were still unprocessed after all retries
    #[error("{remaining} item(s) left unprocessed after {attempts} attempt(s)")]
    Unprocessed { remaining: usize, attempts: u32 },

    /// The target is not available in this build
    #[error("Target backend '{0}' is not available in this build")]
    Unsupported(String),
}

/// Errors raised while loading one entity
#[derive(Error, Debug)]
pub enum LoadError {
    /// A chunk write failed; earlier chunks stay written
    #[error("batch {batch} for table '{table}' failed after {written} item(s) were written")]
    BatchFailed {
        table: String,
        batch: usize,
        written: usize,
        #[source]
        source: StoreError,
    },

    /// A number could not be represented as an exact decimal
    #[error("attribute '{attribute}' holds a number that cannot be stored exactly: {value}")]
    InvalidNumber { attribute: String, value: String },

    /// The run was cancelled between two chunks
    #[error("load cancelled after {written} item(s) were written")]
    Cancelled { written: usize },

    /// The target store could not be reached
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while verifying loaded data
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("{entity}: expected {expected} item(s) in table '{table}', found {actual}")]
    CountMismatch {
        entity: Entity,
        table: String,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the checkpoint store
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("cannot access checkpoint file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint file {path} is not valid: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur during a migration run
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Transformation error: {0}")]
    Transformation(#[from] TransformationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A phase failed for one entity
    #[error("{phase} failed for {entity}: {source}")]
    Entity {
        phase: Phase,
        entity: Entity,
        #[source]
        source: Box<MigrationError>,
    },

    /// An intermediate artifact needed by a phase does not exist
    #[error("Missing intermediate data: {0}")]
    MissingArtifact(PathBuf),

    /// IO error with path context
    #[error("IO error with {path}: {message}")]
    IoWithPath {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run cancelled
    #[error("Migration interrupted by user")]
    Cancelled,
}

/// Result type for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

impl MigrationError {
    /// Attach phase and entity context
    pub fn in_entity(self, phase: Phase, entity: Entity) -> Self {
        match self {
            // Cancellation and already-wrapped errors keep their shape
            Self::Cancelled | Self::Entity { .. } => self,
            other => Self::Entity {
                phase,
                entity,
                source: Box::new(other),
            },
        }
    }

    /// Create an IO error with path context
    pub fn io_with_path(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::IoWithPath {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Whether the run stopped because the user interrupted it
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Load(LoadError::Cancelled { .. }) => true,
            Self::Entity { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Phase and entity the error occurred in, if known
    pub fn location(&self) -> Option<(Phase, Entity)> {
        match self {
            Self::Entity { phase, entity, .. } => Some((*phase, *entity)),
            _ => None,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(msg) => {
                format!("Configuration error: {msg}\n\nHint: Check your migration configuration file.")
            }
            Self::Entity {
                phase,
                entity,
                source,
            } => {
                let hint = match phase {
                    Phase::Extract => "Check the source connection settings and extraction queries.",
                    Phase::Transform => "Inspect the extracted records for the reported entity.",
                    Phase::Validate => {
                        "See the validation report, or set continue_on_error to load anyway."
                    }
                    Phase::Load => "Rerun the load phase; writes overwrite items by key.",
                    Phase::Verify => "Compare the transformed data with the target table.",
                };
                format!("Phase '{phase}' failed for {entity}: {source}\n\nHint: {hint}")
            }
            Self::MissingArtifact(path) => {
                format!(
                    "Missing intermediate data: {}\n\nHint: Run the earlier phases first, or use 'resume'.",
                    path.display()
                )
            }
            Self::Checkpoint(err) => {
                format!("Checkpoint error: {err}\n\nHint: Delete the checkpoint file to start over.")
            }
            Self::Cancelled => "Migration interrupted by user".to_string(),
            _ => self.to_string(),
        }
    }
}
