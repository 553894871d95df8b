//! Handle to a supervised worker and the tasks that drive its lifecycle.
//!
//! Each worker gets one exit watcher (owns the `Child`), at most one
//! escalation timer and at most one deadline timer. The timers are stored on
//! the shared state and aborted on every terminal transition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant as ClockInstant;
use tracing::{debug, error, info, warn};
use warden_core::policy::duration_ms;
use warden_core::{Classification, EscalationPolicy, ManagedProcess, ProcessState};

use super::types::{ExitReport, ExitStatusInfo};
use crate::error::{SignalError, SupervisorError};
use crate::process_table::{ProcessTable, SignalKind};
use crate::progress::ProgressReporter;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct Shared {
    run_id: String,
    process: Mutex<ManagedProcess>,
    policy: EscalationPolicy,
    table: Arc<dyn ProcessTable>,
    progress: ProgressReporter,
    state_tx: watch::Sender<ProcessState>,
    exit: Mutex<Option<Result<ExitStatusInfo, String>>>,
    stop_requested: AtomicBool,
    timed_out: AtomicBool,
    escalation: Mutex<Option<JoinHandle<()>>>,
    deadline: Mutex<Option<JoinHandle<()>>>,
    started: Instant,
}

impl Shared {
    pub(crate) fn new(
        process: ManagedProcess,
        policy: EscalationPolicy,
        table: Arc<dyn ProcessTable>,
        progress: ProgressReporter,
    ) -> Self {
        let (state_tx, _) = watch::channel(process.state());
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            process: Mutex::new(process),
            policy,
            table,
            progress,
            state_tx,
            exit: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
            timed_out: AtomicBool::new(false),
            escalation: Mutex::new(None),
            deadline: Mutex::new(None),
            started: Instant::now(),
        }
    }

    fn publish(&self, state: ProcessState) {
        self.state_tx.send_replace(state);
        if state.is_terminal() {
            self.cancel_timers();
        }
    }

    fn cancel_timers(&self) {
        if let Some(task) = lock(&self.escalation).take() {
            task.abort();
        }
        if let Some(task) = lock(&self.deadline).take() {
            task.abort();
        }
    }

    /// Resolves once the process has reached a terminal state.
    async fn terminal(&self) -> ProcessState {
        let mut rx = self.state_tx.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        rx.wait_for(|s| s.is_terminal())
            .await
            .map_or(ProcessState::Unreachable, |state| *state)
    }

    /// Grace period ran out: escalate to a forceful kill if still needed.
    fn escalate(&self) {
        let mut process = lock(&self.process);
        if process.state() != ProcessState::TerminationRequested {
            return;
        }
        let pid = process.pid();
        if let Err(e) = process.request_force_kill(ClockInstant::now().into_std()) {
            warn!(pid, error = %e, "Escalation refused");
            return;
        }
        self.state_tx.send_replace(process.state());
        warn!(
            pid,
            grace_ms = process.grace_period().map(duration_ms),
            "Grace period elapsed, sending SIGKILL"
        );

        match self.table.signal(pid, SignalKind::ForceKill) {
            // Exited between the timer firing and the kill; the watcher records it.
            Ok(()) | Err(SignalError::NoSuchProcess { .. }) => {}
            Err(e) => {
                error!(pid, error = %e, "Forceful kill failed");
                if process.mark_unreachable().is_ok() {
                    let state = process.state();
                    drop(process);
                    self.publish(state);
                }
            }
        }
    }
}

/// Observe the child's exit and record it. Owns the `Child` for its whole life.
pub(crate) async fn watch_exit(shared: Arc<Shared>, mut child: Child) {
    let status = child.wait().await;
    let mut process = lock(&shared.process);
    let pid = process.pid();

    let next = match status {
        Ok(status) => {
            let info = ExitStatusInfo::from(status);
            info!(pid, code = ?info.code, signal = ?info.signal, "Worker exited");
            *lock(&shared.exit) = Some(Ok(info));
            process.mark_exited()
        }
        Err(e) => {
            error!(pid, error = %e, "Failed to collect worker exit status");
            *lock(&shared.exit) = Some(Err(e.to_string()));
            process.mark_unreachable()
        }
    };
    if let Err(e) = next {
        debug!(pid, error = %e, "Exit observed after terminal state");
    }
    let state = process.state();
    drop(process);
    shared.publish(state);
}

/// Ask the worker to stop once `limit` has elapsed.
pub(crate) fn arm_deadline(shared: &Arc<Shared>, limit: Duration) {
    let task_shared = Arc::clone(shared);
    let task = tokio::spawn(async move {
        tokio::select! {
            _ = task_shared.terminal() => {}
            () = tokio::time::sleep(limit) => {
                task_shared.timed_out.store(true, Ordering::SeqCst);
                let handle = SupervisedHandle { shared: Arc::clone(&task_shared) };
                warn!(pid = handle.pid(), timeout_ms = duration_ms(limit), "Worker exceeded its time limit");
                if let Err(e) = handle.request_stop() {
                    warn!(pid = handle.pid(), error = %e, "Stop after timeout failed");
                }
            }
        }
    });
    *lock(&shared.deadline) = Some(task);
}

/// Cloneable handle to one supervised worker.
#[derive(Clone)]
pub struct SupervisedHandle {
    pub(crate) shared: Arc<Shared>,
}

impl std::fmt::Debug for SupervisedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisedHandle")
            .field("run_id", &self.shared.run_id)
            .field("pid", &self.pid())
            .field("state", &self.state())
            .finish()
    }
}

impl SupervisedHandle {
    pub fn run_id(&self) -> &str {
        &self.shared.run_id
    }

    pub fn pid(&self) -> u32 {
        lock(&self.shared.process).pid()
    }

    pub fn classification(&self) -> Classification {
        lock(&self.shared.process).classification()
    }

    pub fn state(&self) -> ProcessState {
        *self.shared.state_tx.borrow()
    }

    /// Copy of the current lifecycle record.
    pub fn snapshot(&self) -> ManagedProcess {
        lock(&self.shared.process).clone()
    }

    /// Receive every published state change.
    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.shared.state_tx.subscribe()
    }

    /// Send the polite stop and start the grace timer.
    ///
    /// Idempotent: only the first call can deliver a signal. Returns `true`
    /// when this call started the escalation.
    pub fn request_stop(&self) -> Result<bool, SupervisorError> {
        if self.shared.stop_requested.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        let mut process = lock(&self.shared.process);
        if process.state() != ProcessState::Running {
            return Ok(false);
        }
        let pid = process.pid();

        match self.shared.table.signal(pid, SignalKind::PoliteStop) {
            Ok(()) => {
                let now = ClockInstant::now().into_std();
                let grace = process.request_termination(&self.shared.policy, now)?;
                let classification = process.classification();
                self.shared.state_tx.send_replace(process.state());
                drop(process);
                info!(
                    pid,
                    %classification,
                    grace_ms = duration_ms(grace),
                    "Sent SIGTERM, waiting for worker to exit"
                );
                self.start_escalation(grace);
                Ok(true)
            }
            // Already reaped; the exit watcher records the exit.
            Err(SignalError::NoSuchProcess { .. }) => {
                debug!(pid, "Worker already gone when stop was requested");
                Ok(false)
            }
            Err(e) => {
                process.mark_unreachable()?;
                let state = process.state();
                drop(process);
                self.shared.publish(state);
                warn!(pid, error = %e, "Polite stop refused");
                Err(SupervisorError::SignalDelivery(e))
            }
        }
    }

    fn start_escalation(&self, grace: Duration) {
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = shared.terminal() => {}
                () = tokio::time::sleep(grace) => shared.escalate(),
            }
        });
        *lock(&self.shared.escalation) = Some(task);
    }

    /// Block until the worker reaches a terminal state, reporting progress
    /// while waiting.
    pub async fn wait_for_exit(&self) -> Result<ExitReport, SupervisorError> {
        let (pid, label) = {
            let process = lock(&self.shared.process);
            (process.pid(), process.command_line().to_string())
        };
        let mut progress = self.shared.progress.start(pid, &label);
        let state = self.shared.terminal().await;
        progress.stop();

        let exit = lock(&self.shared.exit).clone();
        let forced = lock(&self.shared.process).forced();
        match (state, exit) {
            (ProcessState::Exited, Some(Ok(info))) => Ok(ExitReport {
                pid,
                code: info.code,
                signal: info.signal,
                final_state: state,
                forced,
                timed_out: self.shared.timed_out.load(Ordering::SeqCst),
                elapsed: self.shared.started.elapsed(),
            }),
            (_, Some(Err(reason))) => Err(SupervisorError::Wait { pid, reason }),
            _ => Err(SupervisorError::Unreachable { pid }),
        }
    }
}

impl PartialEq for SupervisedHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for SupervisedHandle {}
