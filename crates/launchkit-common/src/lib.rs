//! # Launchkit Common
//!
//! Error taxonomy and small domain types shared by every launchkit crate.
//!
//! The errors are split by the operation that produces them, so callers can
//! match on exactly the failures a given call can return:
//! - [`LaunchError`] from `ChildProcessSupervisor::launch`
//! - [`TerminateError`] from `RunningProcess::terminate`
//! - [`SinkError`] from `OutputSink::deliver`
//! - [`ConfigError`] from configuration loading

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{
    ConfigError, ConfigResult, LaunchError, LaunchResult, SinkError, SinkResult, TerminateError,
    TerminateResult,
};
pub use types::OutputStream;
