//! OS process table boundary: enumeration and signal delivery.
//!
//! Everything that touches other processes goes through [`ProcessTable`], so
//! the supervisor and the sweep can be driven by a scripted table in tests.

use std::fmt;
use std::process::Command;

use tracing::debug;

use crate::error::{ScanError, SignalError};

/// The two signal kinds used for escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Graceful shutdown request (SIGTERM).
    PoliteStop,
    /// Unconditional termination (SIGKILL).
    ForceKill,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoliteStop => f.write_str("SIGTERM"),
            Self::ForceKill => f.write_str("SIGKILL"),
        }
    }
}

/// One row of a process table snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub ppid: u32,
    pub command_line: String,
}

/// Read and signal the OS process table.
pub trait ProcessTable: Send + Sync {
    /// Point-in-time listing of every visible process.
    fn snapshot(&self) -> Result<Vec<ProcessEntry>, ScanError>;

    /// Deliver `kind` to `pid`.
    fn signal(&self, pid: u32, kind: SignalKind) -> Result<(), SignalError>;

    /// Whether `pid` still names a live (non-zombie) process.
    fn is_alive(&self, pid: u32) -> bool;
}

/// The real process table: `ps` for enumeration, `kill(2)` for signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn snapshot(&self) -> Result<Vec<ProcessEntry>, ScanError> {
        let output = Command::new("ps")
            .args(["-axo", "pid=,ppid=,args="])
            .output()
            .map_err(|e| ScanError::Enumeration {
                reason: format!("failed to run ps: {e}"),
            })?;
        if !output.status.success() {
            return Err(ScanError::Enumeration {
                reason: format!(
                    "ps exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        let entries: Vec<ProcessEntry> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(parse_ps_line)
            .collect();
        debug!(count = entries.len(), "Process table snapshot");
        Ok(entries)
    }

    #[cfg(unix)]
    fn signal(&self, pid: u32, kind: SignalKind) -> Result<(), SignalError> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};

        let target = to_pid(pid)?;
        let signal = match kind {
            SignalKind::PoliteStop => Signal::SIGTERM,
            SignalKind::ForceKill => Signal::SIGKILL,
        };
        kill(target, signal).map_err(|errno| match errno {
            Errno::ESRCH => SignalError::NoSuchProcess { pid },
            Errno::EPERM => SignalError::PermissionDenied { pid },
            other => SignalError::Os {
                pid,
                reason: other.desc().to_string(),
            },
        })
    }

    #[cfg(not(unix))]
    fn signal(&self, _pid: u32, _kind: SignalKind) -> Result<(), SignalError> {
        Err(SignalError::Unsupported)
    }

    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;

        let Ok(target) = to_pid(pid) else {
            return false;
        };
        match kill(target, None) {
            Ok(()) => !is_zombie(pid),
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        false
    }
}

/// Convert to a `pid_t`, refusing values that would address a process group.
#[cfg(unix)]
fn to_pid(pid: u32) -> Result<nix::unistd::Pid, SignalError> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(nix::unistd::Pid::from_raw(raw)),
        _ => Err(SignalError::InvalidPid { pid }),
    }
}

/// Exited-but-unreaped processes still answer `kill(pid, 0)`.
#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .as_deref()
        .and_then(stat_state)
        == Some('Z')
}

#[cfg(all(unix, not(target_os = "linux")))]
const fn is_zombie(_pid: u32) -> bool {
    false
}

/// State letter from a `/proc/<pid>/stat` line. The command name may itself
/// contain parentheses, so split on the last `)`.
#[cfg(any(target_os = "linux", test))]
fn stat_state(stat: &str) -> Option<char> {
    let (_, rest) = stat.rsplit_once(')')?;
    rest.trim_start().chars().next()
}

/// Parse one `ps -o pid=,ppid=,args=` line.
pub fn parse_ps_line(line: &str) -> Option<ProcessEntry> {
    let trimmed = line.trim_start();
    let (pid, rest) = trimmed.split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    let (ppid, args) = rest
        .split_once(char::is_whitespace)
        .unwrap_or((rest, ""));
    let command_line = args.trim();
    if command_line.is_empty() {
        return None;
    }
    Some(ProcessEntry {
        pid: pid.parse().ok()?,
        ppid: ppid.parse().ok()?,
        command_line: command_line.to_string(),
    })
}
