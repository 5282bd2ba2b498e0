//! # Launchkit Supervisor
//!
//! Lifecycle management of a single child process with concurrent output
//! draining.
//!
//! [`ChildProcessSupervisor::launch`] validates a [`LaunchSpec`], spawns the
//! child with piped stdout/stderr, and starts three tasks: one drain task per
//! stream and one lifecycle task that owns the OS handle. The returned
//! [`RunningProcess`] can be waited on or terminated.
//!
//! The core guarantee: [`RunningProcess::wait`] resolves only after the
//! process has been reaped **and** every byte it wrote has been delivered to
//! the sink.
//!
//! ```rust,no_run
//! use launchkit_log_collection::TracingSink;
//! use launchkit_supervisor::{ChildProcessSupervisor, LaunchSpec};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let supervisor = ChildProcessSupervisor::default();
//! let spec = LaunchSpec::new("/usr/local/bin/helper").env("RUST_BACKTRACE", "1");
//!
//! let process = supervisor.launch(spec, Arc::new(TracingSink::new("helper"))).await?;
//! let report = process.wait().await;
//! println!("exit code: {}", report.exit_code);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod launch_spec;
mod lifecycle;
pub mod report;
pub mod running;
pub mod supervisor;

pub use config::{LauncherConfig, SupervisorConfig};
pub use launch_spec::LaunchSpec;
pub use report::ExitReport;
pub use running::RunningProcess;
pub use supervisor::ChildProcessSupervisor;

// Re-exported so embedders need only this crate for the common path
pub use launchkit_common::{LaunchError, OutputStream, TerminateError};
pub use launchkit_log_collection::{DeliveryMode, DrainSummary, OutputChunk, OutputSink};
pub use launchkit_process_state::{LifecycleSnapshot, ProcessState};
