//! Error types for launchkit.
//!
//! Launch failures are reported synchronously to the caller and are never
//! retried here. Failures while the child runs (sink rejections, read errors)
//! are recorded on the exit report instead of being returned, so nothing in
//! this taxonomy is fatal to the supervising task.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// ==============================================================================
// Launch Errors
// ==============================================================================

/// Errors returned by `ChildProcessSupervisor::launch`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// The path does not name an existing, executable regular file.
    #[error("Executable not found: {}", path.display())]
    ExecutableNotFound { path: PathBuf },

    /// The OS refused to create the process.
    #[error("Process spawn failed: {} - {reason}", path.display())]
    SpawnFailed { path: PathBuf, reason: String },

    /// The launch spec itself is malformed (e.g. NUL in an argument, `=` in a key).
    #[error("Invalid launch spec: {reason}")]
    InvalidSpec { reason: String },
}

impl LaunchError {
    pub fn executable_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ExecutableNotFound { path: path.into() }
    }

    pub fn spawn_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            reason: reason.into(),
        }
    }
}

/// Result type for launch operations.
pub type LaunchResult<T> = std::result::Result<T, LaunchError>;

// ==============================================================================
// Terminate Errors
// ==============================================================================

/// Errors produced while terminating a child.
///
/// `AlreadyReaped` never reaches callers of `RunningProcess::terminate`: it
/// is mapped to `Ok(())` there and only used to tell the no-op apart in logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TerminateError {
    #[error("Process already reaped")]
    AlreadyReaped,

    #[error("Failed to signal process {pid}: {reason}")]
    SignalFailed { pid: u32, reason: String },

    #[error("Process {pid} still running after {waited:?}")]
    Timeout { pid: u32, waited: Duration },
}

impl TerminateError {
    pub fn signal_failed(pid: u32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            pid,
            reason: reason.into(),
        }
    }

    pub fn timeout(pid: u32, waited: Duration) -> Self {
        Self::Timeout { pid, waited }
    }
}

/// Result type for terminate operations.
pub type TerminateResult<T> = std::result::Result<T, TerminateError>;

// ==============================================================================
// Sink Errors
// ==============================================================================

/// Errors returned by an output sink when it rejects a chunk.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink delivery failed: {reason}")]
    DeliveryFailed { reason: String },

    #[error("Sink closed")]
    Closed,

    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    pub fn delivery_failed(reason: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            reason: reason.into(),
        }
    }
}

/// Result type for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

// ==============================================================================
// Config Errors
// ==============================================================================

/// Errors raised while loading or validating configuration files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Invalid configuration: {field} - {reason}")]
    Validation { field: String, reason: String },
}

impl ConfigError {
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
