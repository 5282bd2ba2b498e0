//! # Launchkit Process
//!
//! Low-level process operations used by the supervisor.
//!
//! This crate provides primitives for:
//! - Executable validation
//! - Environment merging
//! - Graceful termination signals
//! - Process existence verification
//! - Bundled resource resolution

pub mod bundle;
pub mod check;
pub mod environment;
pub mod terminate;
pub mod validation;

// Re-export main types
pub use bundle::*;
pub use check::*;
pub use environment::*;
pub use terminate::*;
pub use validation::*;
