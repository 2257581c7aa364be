//! `run` and `resume`

use std::io::IsTerminal;

use anyhow::Context;
use sale_migration_core::progress::ProgressTracker;
use sale_migration_core::{
    CancellationToken, Entity, MigrationConfig, MigrationReport, MigrationResult, Orchestrator,
    Phase,
};
use tracing::warn;

use crate::error::{CliError, EXIT_INTERRUPTED};

/// Arguments for the `run` command
pub struct RunArgs {
    /// Single phase to run; the whole pipeline when absent
    pub phase: Option<Phase>,
    pub entity: Option<Entity>,
    pub dry_run: bool,
    pub no_progress: bool,
}

/// Arguments for the `resume` command
pub struct ResumeArgs {
    pub entity: Option<Entity>,
    pub dry_run: bool,
    pub no_progress: bool,
}

/// Handle the `run` command
pub fn handle_run(config: MigrationConfig, args: &RunArgs) -> Result<(), CliError> {
    let mut orchestrator = orchestrator(config, args.entity, args.dry_run, args.no_progress)?;

    let result = match args.phase {
        Some(phase) => {
            eprintln!("Running phase '{}'", phase);
            orchestrator.run_phase(phase)
        }
        None => {
            eprintln!("Starting migration run {}", orchestrator.context().run_id);
            orchestrator.run_full()
        }
    };
    finish(&orchestrator, result)
}

/// Handle the `resume` command
pub fn handle_resume(config: MigrationConfig, args: &ResumeArgs) -> Result<(), CliError> {
    let mut orchestrator = orchestrator(config, args.entity, args.dry_run, args.no_progress)?;
    eprintln!(
        "Resuming from checkpoint {}",
        orchestrator.config().checkpoint.file.display()
    );
    let result = orchestrator.resume();
    finish(&orchestrator, result)
}

fn orchestrator(
    mut config: MigrationConfig,
    entity: Option<Entity>,
    dry_run: bool,
    no_progress: bool,
) -> Result<Orchestrator, CliError> {
    if dry_run {
        config.migration.dry_run = true;
    }

    let token = CancellationToken::new();
    install_interrupt_handler(token.clone())?;
    let progress = ProgressTracker::new(!no_progress && std::io::stderr().is_terminal());

    let mut orchestrator = Orchestrator::new(config)?
        .with_cancellation(token)
        .with_progress(progress);
    if let Some(entity) = entity {
        orchestrator = orchestrator.with_entity(entity);
    }
    Ok(orchestrator)
}

fn finish(
    orchestrator: &Orchestrator,
    result: MigrationResult<MigrationReport>,
) -> Result<(), CliError> {
    match result {
        Ok(report) => {
            report.print_summary();
            if report.is_success() {
                eprintln!();
                eprintln!("Migration completed successfully!");
                Ok(())
            } else {
                Err(CliError::CompletedWithErrors(report.failures().count()))
            }
        }
        Err(err) => {
            orchestrator.report().print_summary();
            Err(err.into())
        }
    }
}

/// Flip the token on the first Ctrl-C and exit on the second
///
/// The orchestrator checks the token before each entity and the loader before
/// each write chunk. An interrupted load can leave part of an entity written;
/// the checkpoint still names only fully completed entities, and a resume
/// rewrites the partial one.
fn install_interrupt_handler(token: CancellationToken) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting signal handler runtime")?;

    std::thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("Interrupt received, stopping before the next entity or write chunk (Ctrl-C again to abort)");
                token.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(i32::from(EXIT_INTERRUPTED));
                }
            });
        })
        .context("spawning signal handler thread")?;
    Ok(())
}
