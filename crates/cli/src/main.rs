//! salemig - move sales, buyers and producers into a single-table store

mod commands;
mod error;
mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sale_migration_core::{Entity, MigrationConfig, Phase};

use crate::commands::run::{ResumeArgs, RunArgs};
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "salemig")]
#[command(version)]
#[command(about = "Migrate sales, buyers and producers from a relational database into a key-value store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "migration.toml")]
    config: PathBuf,

    /// Debug-level console logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline, or a single phase
    Run {
        /// Only run this phase (extract, transform, validate, load, verify)
        #[arg(long)]
        phase: Option<Phase>,

        /// Only process this entity (buyers, producers, sales)
        #[arg(long)]
        entity: Option<Entity>,

        /// Count what would happen without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Hide progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Continue from the last checkpoint
    Resume {
        /// Only process this entity (buyers, producers, sales)
        #[arg(long)]
        entity: Option<Entity>,

        /// Count what would happen without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Hide progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Show the checkpoint of the last run
    Status {
        /// Print the checkpoint as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load and validate the configuration file
    CheckConfig,

    /// Print an annotated example configuration
    ExampleConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!();
            eprintln!("Error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn execute(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::ExampleConfig => {
            commands::config::handle_example_config();
            Ok(())
        }
        Commands::CheckConfig => commands::config::handle_check_config(&cli.config),
        Commands::Status { json } => {
            let config = load_config(&cli.config, cli.verbose)?;
            commands::status::handle_status(&config, json)
        }
        Commands::Run {
            phase,
            entity,
            dry_run,
            no_progress,
        } => {
            let config = load_config(&cli.config, cli.verbose)?;
            commands::run::handle_run(
                config,
                &RunArgs {
                    phase,
                    entity,
                    dry_run,
                    no_progress,
                },
            )
        }
        Commands::Resume {
            entity,
            dry_run,
            no_progress,
        } => {
            let config = load_config(&cli.config, cli.verbose)?;
            commands::run::handle_resume(
                config,
                &ResumeArgs {
                    entity,
                    dry_run,
                    no_progress,
                },
            )
        }
    }
}

/// Read the configuration and install logging as it describes
fn load_config(path: &Path, verbose: bool) -> Result<MigrationConfig, CliError> {
    let config = MigrationConfig::from_file(path)?;
    logging::init(&config.logging, verbose)?;
    Ok(config)
}
