//! Liveness reporting while a worker is being waited on.
//!
//! [`ProgressReporter::start`] hands back a [`ProgressGuard`] owning the only
//! timer. The timer is cancelled exactly once, either by
//! [`ProgressGuard::stop`] or when the guard is dropped, so every way out of
//! a wait (normal exit, forced kill, error, panic) releases it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Default interval between liveness messages.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// One liveness message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressTick {
    pub pid: u32,
    /// 1-based tick counter.
    pub tick: u64,
    pub elapsed: Duration,
}

/// Emits periodic "still running" messages.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    interval: Duration,
    sink: Option<mpsc::UnboundedSender<ProgressTick>>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}

impl ProgressReporter {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            sink: None,
        }
    }

    /// Also deliver every tick to `sink`, in addition to the log line.
    #[must_use]
    pub fn with_sink(mut self, sink: mpsc::UnboundedSender<ProgressTick>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the timer for `pid`. Must be called inside a tokio runtime.
    pub fn start(&self, pid: u32, label: &str) -> ProgressGuard {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let period = self.interval;
        let sink = self.sink.clone();
        let label = label.to_string();

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut timer = tokio::time::interval_at(started + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut tick = 0_u64;
            loop {
                tokio::select! {
                    () = cancelled.cancelled() => return,
                    _ = timer.tick() => {
                        tick += 1;
                        let elapsed = started.elapsed();
                        info!(pid, elapsed_secs = elapsed.as_secs(), command = %label, "Worker still running");
                        if let Some(sink) = &sink {
                            let _ = sink.send(ProgressTick { pid, tick, elapsed });
                        }
                    }
                }
            }
        });

        ProgressGuard {
            timer: Some((token, task)),
        }
    }
}

/// Owns a running progress timer.
#[derive(Debug)]
pub struct ProgressGuard {
    timer: Option<(CancellationToken, JoinHandle<()>)>,
}

impl ProgressGuard {
    /// Cancel the timer. Returns `true` only on the call that cancelled it.
    pub fn stop(&mut self) -> bool {
        match self.timer.take() {
            Some((token, task)) => {
                token.cancel();
                task.abort();
                true
            }
            None => false,
        }
    }

    pub const fn is_active(&self) -> bool {
        self.timer.is_some()
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.stop();
    }
}
