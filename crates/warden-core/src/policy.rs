//! Escalation policy: how long to wait between a polite stop and a forceful
//! kill, and how to pace a sweep.

use std::time::Duration;

use crate::classify::Classification;
use crate::error::{Error, Result};

pub const DEFAULT_INTERACTIVE_GRACE_MS: u64 = 15_000;
pub const DEFAULT_BACKGROUND_GRACE_MS: u64 = 5_000;
pub const DEFAULT_INTER_OPERATION_PAUSE_MS: u64 = 100;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_KILL_CONFIRM_TIMEOUT_MS: u64 = 2_000;

/// Grace periods and pacing for stop escalation.
///
/// Always constructed through [`EscalationPolicy::new`] or `Default`, so the
/// interactive grace period is guaranteed to exceed the background one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    interactive_grace: Duration,
    background_grace: Duration,
    inter_operation_pause: Duration,
    poll_interval: Duration,
    kill_confirm_timeout: Duration,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            interactive_grace: Duration::from_millis(DEFAULT_INTERACTIVE_GRACE_MS),
            background_grace: Duration::from_millis(DEFAULT_BACKGROUND_GRACE_MS),
            inter_operation_pause: Duration::from_millis(DEFAULT_INTER_OPERATION_PAUSE_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            kill_confirm_timeout: Duration::from_millis(DEFAULT_KILL_CONFIRM_TIMEOUT_MS),
        }
    }
}

impl EscalationPolicy {
    /// Create a policy with custom grace periods and default pacing.
    pub fn new(interactive_grace: Duration, background_grace: Duration) -> Result<Self> {
        if interactive_grace <= background_grace {
            return Err(Error::InvalidPolicy {
                interactive_ms: duration_ms(interactive_grace),
                background_ms: duration_ms(background_grace),
            });
        }
        Ok(Self {
            interactive_grace,
            background_grace,
            ..Self::default()
        })
    }

    /// Set the pause between successive scan candidates.
    #[must_use]
    pub const fn with_inter_operation_pause(mut self, pause: Duration) -> Self {
        self.inter_operation_pause = pause;
        self
    }

    /// Set the liveness re-check cadence.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set how long to wait for a process to vanish after a forceful kill.
    #[must_use]
    pub const fn with_kill_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.kill_confirm_timeout = timeout;
        self
    }

    /// Grace period for the given classification.
    pub const fn grace_period(&self, classification: Classification) -> Duration {
        match classification {
            Classification::Interactive => self.interactive_grace,
            Classification::Background => self.background_grace,
        }
    }

    pub const fn inter_operation_pause(&self) -> Duration {
        self.inter_operation_pause
    }

    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub const fn kill_confirm_timeout(&self) -> Duration {
        self.kill_confirm_timeout
    }
}

/// Milliseconds in a duration, saturating at `u64::MAX`.
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_grace_periods() {
        let policy = EscalationPolicy::default();
        assert_eq!(
            policy.grace_period(Classification::Interactive),
            Duration::from_secs(15)
        );
        assert_eq!(
            policy.grace_period(Classification::Background),
            Duration::from_secs(5)
        );
        assert_eq!(policy.inter_operation_pause(), Duration::from_millis(100));
    }

    #[test]
    fn interactive_grace_exceeds_background() {
        let policy = EscalationPolicy::default();
        assert!(
            policy.grace_period(Classification::Interactive)
                > policy.grace_period(Classification::Background)
        );
    }

    #[test]
    fn rejects_equal_grace_periods() {
        let err = EscalationPolicy::new(Duration::from_secs(5), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidPolicy {
                interactive_ms: 5000,
                background_ms: 5000
            }
        ));
    }

    #[test]
    fn rejects_inverted_grace_periods() {
        assert!(EscalationPolicy::new(Duration::from_secs(1), Duration::from_secs(2)).is_err());
    }

    #[test]
    fn custom_policy_keeps_default_pacing() {
        let policy =
            EscalationPolicy::new(Duration::from_millis(300), Duration::from_millis(100)).unwrap();
        assert_eq!(policy.poll_interval(), Duration::from_millis(100));
        let policy = policy.with_poll_interval(Duration::from_millis(10));
        assert_eq!(policy.poll_interval(), Duration::from_millis(10));
    }
}
