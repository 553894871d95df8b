//! Warden CLI
//!
//! Runs worker processes under supervision and sweeps orphaned ones.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::debug;

use warden_cli::classify_cmd::{self, ClassifyArgs};
use warden_cli::cleanup_cmd::{self, CleanupArgs};
use warden_cli::config_cmd;
use warden_cli::run_cmd::{self, RunArgs};
use warden_cli::settings::GlobalArgs;

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version, about = "Worker process supervisor", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a worker in the foreground, stopping it gracefully on shutdown
    Run(RunArgs),
    /// Stop orphaned workers found anywhere in the process table
    Cleanup(CleanupArgs),
    /// Show how a command line is classified and its grace period
    Classify(ClassifyArgs),
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.global.resolve()?;

    warden_core::tracing_init::init_tracing(&config.logging.level, config.logging.json);
    debug!(version = env!("CARGO_PKG_VERSION"), "Starting warden");

    let code = match cli.command {
        Command::Run(args) => run_cmd::run(args, &config).await?,
        Command::Cleanup(args) => cleanup_cmd::run(args, &config).await?,
        Command::Classify(args) => {
            classify_cmd::run(&args, &config)?;
            0
        }
        Command::Config => {
            config_cmd::run(&cli.global, &config)?;
            0
        }
    };
    Ok(ExitCode::from(code))
}
