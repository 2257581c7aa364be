//! CLI error type

use sale_migration_core::MigrationError;
use thiserror::Error;

/// Exit status after a user interrupt
pub const EXIT_INTERRUPTED: u8 = 130;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{}", .0.user_message())]
    Migration(#[from] MigrationError),

    /// The run finished, but some entity failed under continue-on-error
    #[error("Migration completed with {0} failed step(s). Fix the cause and run 'salemig resume'.")]
    CompletedWithErrors(usize),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Migration(err) if err.is_cancelled() => EXIT_INTERRUPTED,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::from(MigrationError::Cancelled).exit_code(), 130);
        assert_eq!(
            CliError::from(MigrationError::Config("bad".to_string())).exit_code(),
            1
        );
        assert_eq!(CliError::CompletedWithErrors(2).exit_code(), 1);
    }

    #[test]
    fn test_migration_errors_render_hints() {
        let err = CliError::from(MigrationError::Config("batch_size".to_string()));
        assert!(err.to_string().contains("Hint:"));
        assert_eq!(
            CliError::from(MigrationError::Cancelled).to_string(),
            "Migration interrupted by user"
        );
    }
}
