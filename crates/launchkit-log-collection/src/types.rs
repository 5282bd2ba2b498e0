//! Core types for output collection

use chrono::{DateTime, Utc};
use launchkit_common::OutputStream;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// One non-empty read from a child's output pipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub bytes: Vec<u8>,
    /// Starts at 1 and grows by one per chunk, independently per stream.
    pub sequence_number: u64,
    pub captured_at: DateTime<Utc>,
}

impl OutputChunk {
    pub fn new(stream: OutputStream, bytes: Vec<u8>, sequence_number: u64) -> Self {
        Self {
            stream,
            bytes,
            sequence_number,
            captured_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The bytes as text, with invalid UTF-8 replaced.
    pub fn text_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// What a drain task does when the sink rejects a chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Log the failure and keep draining.
    #[default]
    BestEffort,
    /// Stop draining at the first failure and flag partial delivery.
    Strict,
}

/// Live counters for one stream.
///
/// Only the stream's own drain task writes these; everyone else reads.
#[derive(Debug)]
pub struct StreamProgress {
    stream: OutputStream,
    chunks: AtomicU64,
    bytes: AtomicU64,
    complete: AtomicBool,
}

impl StreamProgress {
    pub fn new(stream: OutputStream) -> Self {
        Self {
            stream,
            chunks: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            complete: AtomicBool::new(false),
        }
    }

    pub fn stream(&self) -> OutputStream {
        self.stream
    }

    pub fn chunks(&self) -> u64 {
        self.chunks.load(Ordering::Acquire)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub(crate) fn record_chunk(&self, len: usize) {
        self.chunks.fetch_add(1, Ordering::AcqRel);
        self.bytes.fetch_add(len as u64, Ordering::AcqRel);
    }

    pub(crate) fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }
}

/// Final accounting returned by a drain task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainSummary {
    /// Chunks read from the pipe.
    pub chunks: u64,
    /// Bytes read from the pipe.
    pub bytes: u64,
    /// Chunks (or flushes) the sink rejected.
    pub delivery_failures: u64,
    /// The pipe reached end-of-stream.
    pub reached_eof: bool,
    /// Some output may not have reached the sink.
    pub partial: bool,
}

impl DrainSummary {
    /// Summary for a drain task that never reported back (panicked or was
    /// aborted).
    pub fn lost() -> Self {
        Self {
            partial: true,
            ..Self::default()
        }
    }
}
