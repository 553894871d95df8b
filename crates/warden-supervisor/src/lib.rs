//! Warden supervisor library
//!
//! Worker process lifecycle management:
//! - Foreground supervision with polite stop and grace-period escalation
//! - Orphan sweeps across the whole process table
//! - A single idempotent shutdown entry point for signals and parent exit
//! - Periodic liveness reporting while waiting on a worker

pub mod error;
pub mod process_table;
pub mod progress;
pub mod scanner;
pub mod shutdown;
pub mod supervisor;

pub use error::{ScanError, SignalError, SupervisorError};
pub use process_table::{ProcessEntry, ProcessTable, SignalKind, SystemProcessTable};
pub use progress::{ProgressGuard, ProgressReporter, ProgressTick};
pub use scanner::{OrphanScanner, ScanEntry, ScanOptions, ScanOutcome, ScanResult, ScanSummary};
pub use shutdown::{ShutdownCoordinator, ShutdownListener, ShutdownReason};
pub use supervisor::{
    CommandSpec, ExitReport, OutputLine, OutputMode, OutputStream, ProcessSupervisor,
    SupervisedHandle,
};
