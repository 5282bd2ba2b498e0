//! Final outcome of a supervised child.

use launchkit_common::OutputStream;
use launchkit_log_collection::DrainSummary;
use std::process::ExitStatus;
use std::time::Duration;

/// How the child ended, as observed when it was reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub exit_code: i32,
    pub signaled: bool,
    pub signal: Option<i32>,
}

impl ExitOutcome {
    /// Decode an OS exit status. A signal death reports `128 + signal` as the
    /// exit code, the way shells do.
    pub fn from_status(status: &ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self {
                exit_code: code,
                signaled: false,
                signal: None,
            };
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;

            if let Some(signal) = status.signal() {
                return Self {
                    exit_code: 128 + signal,
                    signaled: true,
                    signal: Some(signal),
                };
            }
        }

        Self::unknown()
    }

    /// Exit could not be determined (wait failed).
    pub fn unknown() -> Self {
        Self {
            exit_code: -1,
            signaled: false,
            signal: None,
        }
    }
}

/// Produced exactly once per child, after it was reaped and both output
/// streams were drained. Every `wait()` returns a clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    pub exit_code: i32,
    pub signaled: bool,
    pub signal: Option<i32>,
    /// From spawn until the OS reported exit.
    pub duration: Duration,
    /// Set when some output may not have reached the sink: strict-mode
    /// rejection, a read error, or a lost drain task.
    pub partial_delivery: bool,
    pub stdout: DrainSummary,
    pub stderr: DrainSummary,
}

impl ExitReport {
    pub(crate) fn new(
        outcome: ExitOutcome,
        duration: Duration,
        stdout: DrainSummary,
        stderr: DrainSummary,
    ) -> Self {
        Self {
            exit_code: outcome.exit_code,
            signaled: outcome.signaled,
            signal: outcome.signal,
            duration,
            partial_delivery: stdout.partial || stderr.partial,
            stdout,
            stderr,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.signaled
    }

    pub fn stream(&self, stream: OutputStream) -> &DrainSummary {
        match stream {
            OutputStream::Stdout => &self.stdout,
            OutputStream::Stderr => &self.stderr,
        }
    }
}
