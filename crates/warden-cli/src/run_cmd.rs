//! `warden run`: launch one worker in the foreground and supervise it.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use warden_core::Config;
use warden_supervisor::{
    CommandSpec, ExitReport, ProcessSupervisor, ShutdownCoordinator, SupervisorError,
};

/// Exit code for a worker that could not be found.
pub const EXIT_NOT_FOUND: u8 = 127;
/// Exit code for a worker that could not be executed.
pub const EXIT_NOT_EXECUTABLE: u8 = 126;
/// Exit code when the worker's fate is unknown.
pub const EXIT_UNREACHABLE: u8 = 1;

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Working directory for the worker
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Stop the worker after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Extra environment variable for the worker (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Program and arguments to run
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    pub fn to_spec(&self) -> Result<CommandSpec> {
        let (program, args) = self
            .command
            .split_first()
            .context("No command given")?;
        let mut spec = CommandSpec::new(program.as_str()).args(args.iter().cloned());
        if let Some(dir) = &self.cwd {
            spec = spec.current_dir(dir);
        }
        for (key, value) in &self.env {
            spec = spec.env(key.as_str(), value.as_str());
        }
        if let Some(secs) = self.timeout {
            spec = spec.timeout(Duration::from_secs(secs));
        }
        Ok(spec)
    }
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// Execute `warden run`, returning the process exit code.
#[allow(clippy::print_stderr)]
pub async fn run(args: RunArgs, config: &Config) -> Result<u8> {
    let spec = args.to_spec()?;
    let supervisor = ProcessSupervisor::from_config(config).context("Invalid supervisor settings")?;

    let handle = match supervisor.spawn(spec) {
        Ok(handle) => handle,
        Err(SupervisorError::LaunchFailure { program, source }) => {
            eprintln!("warden: failed to launch {program}: {source}");
            return Ok(launch_failure_code(source.kind()));
        }
        Err(e) => return Err(e.into()),
    };

    let coordinator = Arc::new(ShutdownCoordinator::new());
    coordinator.attach(handle.clone());
    let listener = coordinator
        .listen()
        .context("Failed to install signal handlers")?;

    let outcome = supervisor.wait_for_exit(&handle).await;
    listener.close().await;
    coordinator.detach();

    if let Some(reason) = coordinator.triggered() {
        info!(%reason, run_id = handle.run_id(), "Worker stopped on shutdown request");
    }

    match outcome {
        Ok(report) => Ok(report_code(&report)),
        Err(e @ (SupervisorError::Unreachable { .. } | SupervisorError::Wait { .. })) => {
            warn!(error = %e, "Worker ended in an unknown state");
            eprintln!("warden: {e}");
            Ok(EXIT_UNREACHABLE)
        }
        Err(e) => Err(e.into()),
    }
}

/// Shell conventions for a program that could not be started.
pub fn launch_failure_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::NotFound => EXIT_NOT_FOUND,
        _ => EXIT_NOT_EXECUTABLE,
    }
}

/// Worker exit code truncated to a process status byte.
pub fn report_code(report: &ExitReport) -> u8 {
    u8::try_from(report.exit_code().rem_euclid(256)).unwrap_or(EXIT_UNREACHABLE)
}
