//! Supervisor, sweep and signal error types.

/// Why a signal could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    /// Target is already gone (ESRCH).
    #[error("Process {pid} does not exist")]
    NoSuchProcess { pid: u32 },

    /// Target exists but belongs to someone else (EPERM).
    #[error("Permission denied signalling process {pid}")]
    PermissionDenied { pid: u32 },

    /// Pid cannot name a single process (0, or beyond `pid_t`).
    #[error("Refusing to signal invalid pid {pid}")]
    InvalidPid { pid: u32 },

    #[error("Failed to signal process {pid}: {reason}")]
    Os { pid: u32, reason: String },

    #[error("Signals are not supported on this platform")]
    Unsupported,
}

impl SignalError {
    /// The target vanished before the signal landed.
    pub const fn is_vanished(&self) -> bool {
        matches!(self, Self::NoSuchProcess { .. })
    }
}

/// Errors from a sweep as a whole. Per-candidate failures are recorded in
/// the result instead.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Failed to enumerate process table: {reason}")]
    Enumeration { reason: String },
}

/// Errors from foreground supervision.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to launch {program}: {source}")]
    LaunchFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Signal delivery failed: {0}")]
    SignalDelivery(#[from] SignalError),

    #[error("Process {pid} is unreachable; it may still be running")]
    Unreachable { pid: u32 },

    #[error("Failed waiting for process {pid}: {reason}")]
    Wait { pid: u32, reason: String },

    #[error(transparent)]
    Core(#[from] warden_core::Error),
}
