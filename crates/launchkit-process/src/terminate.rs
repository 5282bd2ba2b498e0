//! Process termination primitives.
//!
//! Forced kills go through `tokio::process::Child::start_kill`, which owns
//! the handle and cannot race with reaping. Only the graceful stop signal
//! needs a raw PID.

use launchkit_common::{TerminateError, TerminateResult};

/// Ask a process to stop (SIGTERM on Unix).
///
/// Callers must guarantee the PID has not been reaped yet, otherwise the
/// signal may reach an unrelated process that reused it.
pub fn terminate_gracefully(pid: u32) -> TerminateResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| TerminateError::signal_failed(pid, "pid out of range"))?;

        kill(Pid::from_raw(raw), Signal::SIGTERM)
            .map_err(|e| TerminateError::signal_failed(pid, e.to_string()))
    }

    #[cfg(not(unix))]
    {
        Err(TerminateError::signal_failed(
            pid,
            "graceful stop signal is not supported on this platform",
        ))
    }
}
