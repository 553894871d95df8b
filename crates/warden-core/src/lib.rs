//! `Warden` Core Library
//!
//! Shared functionality for `Warden` components:
//! - Managed process model and its lifecycle state machine
//! - Command-line classification (interactive vs. background workers)
//! - Escalation policy (grace periods and sweep pacing)
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod classify;
pub mod config;
pub mod error;
pub mod policy;
pub mod process;
pub mod tracing_init;

pub use classify::{Classification, Classify, MarkerClassifier};
pub use config::Config;
pub use error::{Error, Result};
pub use policy::EscalationPolicy;
pub use process::{ManagedProcess, ProcessState};
