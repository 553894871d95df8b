//! Foreground supervision of a single worker.
//!
//! A worker is launched with [`ProcessSupervisor::spawn`]. Stopping it sends
//! a polite signal first and a forceful one only after the grace period for
//! its classification has elapsed.

mod handle;
mod manager;
mod types;

pub use handle::SupervisedHandle;
pub use manager::ProcessSupervisor;
pub use types::{CommandSpec, ExitReport, OutputLine, OutputMode, OutputStream};
