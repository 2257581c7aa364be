//! `status`

use sale_migration_core::pipeline::CheckpointStore;
use sale_migration_core::{Entity, MigrationConfig, MigrationError};

use crate::error::CliError;

/// Handle the `status` command
pub fn handle_status(config: &MigrationConfig, json: bool) -> Result<(), CliError> {
    let mut store = CheckpointStore::new(&config.checkpoint);
    if !store.is_enabled() {
        println!("Checkpointing is disabled in the configuration.");
        return Ok(());
    }

    let path = store.path().to_path_buf();
    let checkpoint = store.load().map_err(MigrationError::from)?;
    if json {
        let text = serde_json::to_string_pretty(checkpoint).map_err(MigrationError::from)?;
        println!("{text}");
        return Ok(());
    }

    if checkpoint.is_empty() {
        println!("No checkpoint found at {}", path.display());
        println!("Run 'salemig run' to start a migration.");
        return Ok(());
    }

    println!("Migration Checkpoint");
    println!("====================");
    println!("File: {}", path.display());
    println!();
    println!("{:<10} {:<10} {:>10}  {}", "Phase", "Entity", "Records", "Completed at");
    for (phase, entity, entry) in checkpoint.entries() {
        println!(
            "{:<10} {:<10} {:>10}  {}",
            phase.name(),
            entity.name(),
            entry.progress,
            entry.timestamp
        );
    }

    println!();
    match checkpoint.next_phase(&Entity::all()) {
        Some(phase) => println!("Next phase: {} (run 'salemig resume')", phase.name()),
        None => println!("All phases complete."),
    }
    Ok(())
}
