//! # Launchkit Log Collection
//!
//! Capture of a child process's stdout and stderr.
//!
//! This crate provides:
//! - [`OutputChunk`]: one read's worth of bytes from one stream
//! - [`OutputSink`]: the delivery contract, plus tracing, file, in-memory,
//!   channel and fan-out sinks
//! - [`drain_stream`]: the per-stream drain task

pub mod drain;
pub mod output;
pub mod types;

// Re-export main types
pub use drain::{drain_stream, DrainOptions, DEFAULT_READ_BUFFER_SIZE};
pub use output::{BufferSink, ChannelSink, FanoutSink, FileSink, OutputSink, TracingSink};
pub use types::{DeliveryMode, DrainSummary, OutputChunk, StreamProgress};
