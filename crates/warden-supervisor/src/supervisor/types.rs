//! Supervisor input and output types.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::sync::mpsc;
use warden_core::ProcessState;

/// What to launch and how.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Inherits the supervisor's working directory when `None`.
    pub working_directory: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Wall-clock limit; the worker is asked to stop once it elapses.
    pub timeout: Option<Duration>,
    pub output: OutputMode,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_directory: None,
            env: Vec::new(),
            timeout: None,
            output: OutputMode::Inherit,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// The invocation as a single string, used for classification.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Where the worker's stdio goes.
#[derive(Debug, Clone, Default)]
pub enum OutputMode {
    /// Share the supervisor's terminal.
    #[default]
    Inherit,
    /// Discard all output.
    Null,
    /// Forward stdout and stderr line by line.
    Capture(mpsc::Sender<OutputLine>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of captured worker output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

/// How the worker's exit was observed by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExitStatusInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl From<ExitStatus> for ExitStatusInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Final outcome of a supervised worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    pub pid: u32,
    /// Exit code, when the worker exited on its own.
    pub code: Option<i32>,
    /// Terminating signal number, when the worker was killed by one.
    pub signal: Option<i32>,
    pub final_state: ProcessState,
    /// A forceful kill was sent.
    pub forced: bool,
    /// The command's wall-clock limit triggered the stop.
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ExitReport {
    /// Shell-style exit code: the worker's own code, or `128 + signal`.
    pub fn exit_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => 1,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code() == 0
    }
}
