//! Error types for `Warden` core library.

use thiserror::Error;

use crate::process::ProcessState;

/// Result type alias using `Warden` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `Warden` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Grace periods violate the interactive > background ordering
    #[error(
        "Invalid escalation policy: interactive grace ({interactive_ms}ms) must exceed background grace ({background_ms}ms)"
    )]
    InvalidPolicy {
        interactive_ms: u64,
        background_ms: u64,
    },

    /// Lifecycle state machine refused a transition
    #[error("Invalid transition for pid {pid}: {from} -> {to}")]
    InvalidTransition {
        pid: u32,
        from: ProcessState,
        to: ProcessState,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
