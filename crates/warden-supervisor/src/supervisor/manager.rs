//! Foreground worker supervision.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use warden_core::{Classify, Config, EscalationPolicy, ManagedProcess};

use super::handle::{self, Shared, SupervisedHandle};
use super::types::{CommandSpec, ExitReport, OutputLine, OutputMode, OutputStream};
use crate::error::SupervisorError;
use crate::process_table::{ProcessTable, SystemProcessTable};
use crate::progress::ProgressReporter;

/// Launches workers and drives them through polite stop and forced kill.
#[derive(Clone)]
pub struct ProcessSupervisor {
    policy: EscalationPolicy,
    classifier: Arc<dyn Classify>,
    table: Arc<dyn ProcessTable>,
    progress: ProgressReporter,
}

impl ProcessSupervisor {
    pub fn new(
        policy: EscalationPolicy,
        classifier: Arc<dyn Classify>,
        table: Arc<dyn ProcessTable>,
    ) -> Self {
        Self {
            policy,
            classifier,
            table,
            progress: ProgressReporter::default(),
        }
    }

    /// Supervisor backed by the real process table, tuned from `config`.
    pub fn from_config(config: &Config) -> Result<Self, SupervisorError> {
        let policy = config.escalation_policy()?;
        Ok(Self::new(
            policy,
            Arc::new(config.classifier()),
            Arc::new(SystemProcessTable),
        )
        .with_progress(ProgressReporter::new(config.progress_interval())))
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub const fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Launch `spec` and start watching it. Must be called inside a tokio runtime.
    pub fn spawn(&self, spec: CommandSpec) -> Result<SupervisedHandle, SupervisorError> {
        let command_line = spec.command_line();
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_directory {
            cmd.current_dir(dir);
        }
        match &spec.output {
            OutputMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Null => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
            OutputMode::Capture(_) => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let mut child = cmd.spawn().map_err(|source| SupervisorError::LaunchFailure {
            program: spec.program.clone(),
            source,
        })?;
        let pid = child.id().ok_or_else(|| SupervisorError::LaunchFailure {
            program: spec.program.clone(),
            source: std::io::Error::other("worker exited before its pid was read"),
        })?;

        if let OutputMode::Capture(tx) = &spec.output {
            if let Some(stdout) = child.stdout.take() {
                forward_lines(pid, stdout, OutputStream::Stdout, tx.clone());
            }
            if let Some(stderr) = child.stderr.take() {
                forward_lines(pid, stderr, OutputStream::Stderr, tx.clone());
            }
        }

        let process = ManagedProcess::new(pid, command_line, self.classifier.as_ref());
        info!(
            pid,
            classification = %process.classification(),
            command = %process.command_line(),
            "Spawned worker"
        );

        let shared = Arc::new(Shared::new(
            process,
            self.policy,
            Arc::clone(&self.table),
            self.progress.clone(),
        ));
        tokio::spawn(handle::watch_exit(Arc::clone(&shared), child));
        if let Some(limit) = spec.timeout {
            handle::arm_deadline(&shared, limit);
        }
        Ok(SupervisedHandle { shared })
    }

    /// Begin graceful termination of `handle`. Idempotent.
    pub fn request_stop(&self, handle: &SupervisedHandle) -> Result<bool, SupervisorError> {
        handle.request_stop()
    }

    pub async fn wait_for_exit(
        &self,
        handle: &SupervisedHandle,
    ) -> Result<ExitReport, SupervisorError> {
        handle.wait_for_exit().await
    }

    /// Spawn `spec` and wait for it to finish.
    pub async fn run(&self, spec: CommandSpec) -> Result<ExitReport, SupervisorError> {
        let handle = self.spawn(spec)?;
        handle.wait_for_exit().await
    }
}

fn forward_lines<R>(pid: u32, reader: R, stream: OutputStream, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(OutputLine { stream, line }).await.is_err() {
                warn!(pid, ?stream, "Output channel closed");
                break;
            }
        }
        debug!(pid, ?stream, "Output reader finished");
    });
}
