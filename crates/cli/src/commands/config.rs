//! `check-config` and `example-config`

use std::path::Path;

use sale_migration_core::config::SourceBackend;
use sale_migration_core::{Entity, MigrationConfig};

use crate::error::CliError;

/// Handle the `example-config` command
pub fn handle_example_config() {
    print!("{}", MigrationConfig::example());
}

/// Handle the `check-config` command
pub fn handle_check_config(path: &Path) -> Result<(), CliError> {
    let config = MigrationConfig::from_file(path)?;

    println!("Configuration OK: {}", path.display());
    println!();
    match config.source.backend {
        SourceBackend::DuckDb => println!(
            "Source:      duckdb ({})",
            config
                .source
                .path
                .as_deref()
                .map_or_else(|| "in-memory".to_string(), |p| p.display().to_string())
        ),
        SourceBackend::MySql => println!(
            "Source:      mysql {}:{}/{}",
            config.source.host.as_deref().unwrap_or("localhost"),
            config.source.port,
            config.source.database.as_deref().unwrap_or("")
        ),
    }
    for entity in Entity::all() {
        println!(
            "Target:      {:<10} -> {}",
            entity.name(),
            config.target.table_for(entity)
        );
    }
    if let Some(endpoint) = &config.target.endpoint {
        println!("Endpoint:    {endpoint}");
    }
    println!("Batch size:  {}", config.migration.batch_size);
    println!("Data dir:    {}", config.paths.data_dir.display());
    if config.checkpoint.enabled {
        println!("Checkpoint:  {}", config.checkpoint.file.display());
    } else {
        println!("Checkpoint:  disabled");
    }

    let mut flags = Vec::new();
    if config.migration.dry_run {
        flags.push("dry-run");
    }
    if config.migration.continue_on_error {
        flags.push("continue-on-error");
    }
    if config.migration.backup_before_load {
        flags.push("backup-before-load");
    }
    if config.migration.validate_after_load {
        flags.push("validate-after-load");
    }
    if !flags.is_empty() {
        println!("Options:     {}", flags.join(", "));
    }
    Ok(())
}
