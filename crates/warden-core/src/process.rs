//! Managed process lifecycle.
//!
//! A [`ManagedProcess`] is created the moment a pid is observed, either
//! because the supervisor spawned it or because a sweep discovered it. Its
//! state only moves forward:
//!
//! ```text
//! Running ──polite stop──▶ TerminationRequested ──grace elapsed──▶ ForceKillRequested
//!    │                            │                                  │        │
//!    └──────── exit ──────────────┴────────────── exit ──────────────┘   kill failed
//!                                 ▼                                           ▼
//!                               Exited                                   Unreachable
//! ```
//!
//! Any live state may also drop to `Unreachable` when the process can no
//! longer be signalled or tracked (permission denied, or its exit status
//! could not be collected).

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::classify::{Classification, Classify};
use crate::error::{Error, Result};
use crate::policy::EscalationPolicy;

/// Lifecycle state of a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Running,
    TerminationRequested,
    ForceKillRequested,
    Exited,
    Unreachable,
}

impl ProcessState {
    /// `Exited` and `Unreachable` have no successors.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited | Self::Unreachable)
    }

    /// Whether `self -> next` is a legal edge. Guards such as the grace
    /// period are checked separately by [`ManagedProcess`].
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Running,
                Self::TerminationRequested | Self::Exited | Self::Unreachable
            ) | (
                Self::TerminationRequested,
                Self::ForceKillRequested | Self::Exited | Self::Unreachable
            ) | (Self::ForceKillRequested, Self::Exited | Self::Unreachable)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::TerminationRequested => "termination_requested",
            Self::ForceKillRequested => "force_kill_requested",
            Self::Exited => "exited",
            Self::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

/// A process under supervision or discovered by a sweep.
#[derive(Debug, Clone)]
pub struct ManagedProcess {
    pid: u32,
    command_line: String,
    classification: Classification,
    state: ProcessState,
    grace_period: Option<Duration>,
    termination_requested_at: Option<Instant>,
    forced: bool,
}

impl ManagedProcess {
    /// Capture a newly observed process. Classification happens here, once.
    pub fn new(pid: u32, command_line: impl Into<String>, classifier: &dyn Classify) -> Self {
        let command_line = command_line.into();
        let classification = classifier.classify(&command_line);
        Self {
            pid,
            command_line,
            classification,
            state: ProcessState::Running,
            grace_period: None,
            termination_requested_at: None,
            forced: false,
        }
    }

    pub const fn pid(&self) -> u32 {
        self.pid
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub const fn classification(&self) -> Classification {
        self.classification
    }

    pub const fn state(&self) -> ProcessState {
        self.state
    }

    /// Grace period fixed at the time termination was requested.
    pub const fn grace_period(&self) -> Option<Duration> {
        self.grace_period
    }

    pub const fn termination_requested_at(&self) -> Option<Instant> {
        self.termination_requested_at
    }

    /// Whether a forceful kill was ever requested.
    pub const fn forced(&self) -> bool {
        self.forced
    }

    /// Record that the polite stop signal was delivered.
    ///
    /// Fixes the grace period from `policy` and stamps the request time.
    /// Returns the grace period to wait before escalating.
    pub fn request_termination(
        &mut self,
        policy: &EscalationPolicy,
        now: Instant,
    ) -> Result<Duration> {
        self.transition(ProcessState::TerminationRequested)?;
        let grace = policy.grace_period(self.classification);
        self.grace_period = Some(grace);
        self.termination_requested_at = Some(now);
        Ok(grace)
    }

    /// Whether the grace period has run out at `now`.
    pub fn grace_elapsed(&self, now: Instant) -> bool {
        match (self.termination_requested_at, self.grace_period) {
            (Some(at), Some(grace)) => now.saturating_duration_since(at) >= grace,
            _ => false,
        }
    }

    /// Record the decision to escalate to a forceful kill.
    ///
    /// Refused unless termination was requested and the grace period has
    /// fully elapsed at `now`.
    pub fn request_force_kill(&mut self, now: Instant) -> Result<()> {
        if self.state == ProcessState::TerminationRequested && !self.grace_elapsed(now) {
            return Err(self.invalid(ProcessState::ForceKillRequested));
        }
        self.transition(ProcessState::ForceKillRequested)?;
        self.forced = true;
        Ok(())
    }

    /// Record that the process is gone.
    pub fn mark_exited(&mut self) -> Result<()> {
        self.transition(ProcessState::Exited)
    }

    /// Record that a signal could not be delivered.
    pub fn mark_unreachable(&mut self) -> Result<()> {
        self.transition(ProcessState::Unreachable)
    }

    fn transition(&mut self, next: ProcessState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(self.invalid(next));
        }
        tracing::debug!(pid = self.pid, from = %self.state, to = %next, "State transition");
        self.state = next;
        Ok(())
    }

    fn invalid(&self, to: ProcessState) -> Error {
        Error::InvalidTransition {
            pid: self.pid,
            from: self.state,
            to,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::classify::MarkerClassifier;

    const ALL: [ProcessState; 5] = [
        ProcessState::Running,
        ProcessState::TerminationRequested,
        ProcessState::ForceKillRequested,
        ProcessState::Exited,
        ProcessState::Unreachable,
    ];

    fn policy() -> EscalationPolicy {
        EscalationPolicy::new(Duration::from_millis(300), Duration::from_millis(100)).unwrap()
    }

    fn background() -> ManagedProcess {
        ManagedProcess::new(42, "pytest -x", &MarkerClassifier::new())
    }

    #[test]
    fn new_process_is_running_and_classified() {
        let p = ManagedProcess::new(7, "python3 workflow_engine.py", &MarkerClassifier::new());
        assert_eq!(p.state(), ProcessState::Running);
        assert_eq!(p.classification(), Classification::Interactive);
        assert!(p.termination_requested_at().is_none());
        assert!(p.grace_period().is_none());
    }

    #[test]
    fn terminal_states_have_no_successors() {
        for from in [ProcessState::Exited, ProcessState::Unreachable] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn no_backward_edges() {
        assert!(!ProcessState::TerminationRequested.can_transition_to(ProcessState::Running));
        assert!(!ProcessState::ForceKillRequested.can_transition_to(ProcessState::Running));
        assert!(
            !ProcessState::ForceKillRequested.can_transition_to(ProcessState::TerminationRequested)
        );
    }

    #[test]
    fn force_kill_only_from_termination_requested() {
        for from in ALL {
            let allowed = from.can_transition_to(ProcessState::ForceKillRequested);
            assert_eq!(allowed, from == ProcessState::TerminationRequested, "{from}");
        }
    }

    #[test]
    fn request_termination_fixes_grace_by_classification() {
        let mut p = background();
        let now = Instant::now();
        let grace = p.request_termination(&policy(), now).unwrap();
        assert_eq!(grace, Duration::from_millis(100));
        assert_eq!(p.state(), ProcessState::TerminationRequested);
        assert_eq!(p.termination_requested_at(), Some(now));
    }

    #[test]
    fn second_termination_request_is_rejected() {
        let mut p = background();
        p.request_termination(&policy(), Instant::now()).unwrap();
        let err = p.request_termination(&policy(), Instant::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { pid: 42, .. }));
    }

    #[test]
    fn force_kill_refused_before_grace_elapses() {
        let mut p = background();
        let start = Instant::now();
        p.request_termination(&policy(), start).unwrap();
        assert!(p.request_force_kill(start + Duration::from_millis(50)).is_err());
        assert_eq!(p.state(), ProcessState::TerminationRequested);
        assert!(!p.forced());

        p.request_force_kill(start + Duration::from_millis(100)).unwrap();
        assert_eq!(p.state(), ProcessState::ForceKillRequested);
        assert!(p.forced());
    }

    #[test]
    fn force_kill_refused_without_polite_stop() {
        let mut p = background();
        assert!(p.request_force_kill(Instant::now()).is_err());
        assert_eq!(p.state(), ProcessState::Running);
    }

    #[test]
    fn natural_exit_from_running() {
        let mut p = background();
        p.mark_exited().unwrap();
        assert_eq!(p.state(), ProcessState::Exited);
        assert!(p.mark_exited().is_err());
    }

    #[test]
    fn every_live_state_can_become_unreachable() {
        for from in ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(ProcessState::Unreachable), "{from}");
        }
    }

    #[test]
    fn unreachable_after_failed_kill() {
        let mut p = background();
        let start = Instant::now();
        p.request_termination(&policy(), start).unwrap();
        p.request_force_kill(start + Duration::from_secs(1)).unwrap();
        p.mark_unreachable().unwrap();
        assert_eq!(p.state(), ProcessState::Unreachable);
        assert!(p.mark_exited().is_err());
    }
}
