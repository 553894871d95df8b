//! Single idempotent shutdown entry point.
//!
//! Interrupts, termination signals, hangups and parent exit all funnel into
//! [`ShutdownCoordinator::trigger`]. Only the first trigger has any effect:
//! it asks the active worker, if any, to stop. Waiting for the exit stays
//! with the original caller; the escalation timer started by the stop request
//! reaps the worker either way.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::supervisor::SupervisedHandle;

#[cfg(unix)]
const PARENT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// What asked for the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownReason {
    /// Ctrl-C / SIGINT.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGHUP.
    Hangup,
    /// The process was reparented.
    ParentExited,
    /// Programmatic request.
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Interrupt => "interrupt",
            Self::Terminate => "terminate",
            Self::Hangup => "hangup",
            Self::ParentExited => "parent_exited",
            Self::Requested => "requested",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    active: Mutex<Option<SupervisedHandle>>,
    fired: OnceLock<ShutdownReason>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handle` the active worker. If shutdown already fired, the worker
    /// is asked to stop immediately.
    pub fn attach(&self, handle: SupervisedHandle) {
        let late = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            *active = Some(handle.clone());
            // Checked under the lock so a concurrent trigger sees either the
            // handle or the fired flag.
            self.fired.get().copied()
        };
        if let Some(reason) = late {
            info!(%reason, pid = handle.pid(), "Shutdown already requested, stopping new worker");
            stop(&handle);
        }
    }

    pub fn detach(&self) -> Option<SupervisedHandle> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Fire the shutdown. Returns `true` only for the first call.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        if self.fired.set(reason).is_err() {
            debug!(%reason, "Shutdown already in progress");
            return false;
        }
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match active {
            Some(handle) => {
                info!(%reason, pid = handle.pid(), "Shutdown requested, stopping worker");
                stop(&handle);
            }
            None => info!(%reason, "Shutdown requested, no active worker"),
        }
        true
    }

    /// The reason of the trigger that fired, if any.
    pub fn triggered(&self) -> Option<ShutdownReason> {
        self.fired.get().copied()
    }

    /// Install the OS listeners. They stay active until the returned
    /// listener is dropped or the first trigger fires.
    pub fn listen(self: &Arc<Self>) -> std::io::Result<ShutdownListener> {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let coordinator = Arc::clone(self);

        #[cfg(unix)]
        let (mut sigterm, mut sighup) = {
            use tokio::signal::unix::{SignalKind, signal};
            (signal(SignalKind::terminate())?, signal(SignalKind::hangup())?)
        };

        let task = tokio::spawn(async move {
            #[cfg(unix)]
            let (terminate, hangup) = (sigterm.recv(), sighup.recv());
            #[cfg(not(unix))]
            let (terminate, hangup) = (
                std::future::pending::<Option<()>>(),
                std::future::pending::<Option<()>>(),
            );

            let reason = tokio::select! {
                () = cancelled.cancelled() => return,
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to listen for Ctrl-C");
                        return;
                    }
                    ShutdownReason::Interrupt
                }
                _ = terminate => ShutdownReason::Terminate,
                _ = hangup => ShutdownReason::Hangup,
                () = parent_exited() => ShutdownReason::ParentExited,
            };
            coordinator.trigger(reason);
        });

        Ok(ShutdownListener {
            token,
            task: Some(task),
        })
    }
}

fn stop(handle: &SupervisedHandle) {
    if let Err(e) = handle.request_stop() {
        warn!(pid = handle.pid(), error = %e, "Stop request failed");
    }
}

/// Resolves once this process is reparented.
#[cfg(unix)]
async fn parent_exited() {
    let original = nix::unistd::getppid();
    let mut ticker = tokio::time::interval(PARENT_POLL_INTERVAL);
    loop {
        ticker.tick().await;
        if nix::unistd::getppid() != original {
            return;
        }
    }
}

#[cfg(not(unix))]
async fn parent_exited() {
    std::future::pending::<()>().await;
}

/// Background task listening for shutdown signals. Dropping it stops listening.
#[derive(Debug)]
pub struct ShutdownListener {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ShutdownListener {
    /// Stop listening and wait for the task to finish.
    pub async fn close(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ShutdownListener {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn only_first_trigger_fires() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.triggered(), None);
        assert!(coordinator.trigger(ShutdownReason::Interrupt));
        assert!(!coordinator.trigger(ShutdownReason::Terminate));
        assert!(!coordinator.trigger(ShutdownReason::ParentExited));
        assert_eq!(coordinator.triggered(), Some(ShutdownReason::Interrupt));
    }

    #[test]
    fn trigger_without_worker_is_noop() {
        let coordinator = ShutdownCoordinator::new();
        assert!(coordinator.detach().is_none());
        assert!(coordinator.trigger(ShutdownReason::Requested));
    }

    #[test]
    fn reason_display() {
        assert_eq!(ShutdownReason::ParentExited.to_string(), "parent_exited");
        assert_eq!(ShutdownReason::Hangup.to_string(), "hangup");
    }

    #[tokio::test]
    async fn listener_close_ends_task() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let listener = coordinator.listen().unwrap();
        listener.close().await;
        assert_eq!(coordinator.triggered(), None);
    }
}
