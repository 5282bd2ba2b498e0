//! Per-stream drain task.
//!
//! One drain task runs per output pipe. It owns its sequence counter and its
//! completion flag, and shares no lock with the other stream's task, so a
//! slow sink on one stream never stalls the other.

use crate::output::OutputSink;
use crate::types::{DeliveryMode, DrainSummary, OutputChunk, StreamProgress};
use launchkit_common::OutputStream;
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, warn};

/// Default read size per chunk.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;

/// Drain task settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOptions {
    /// Upper bound on the size of one chunk.
    pub buffer_size: usize,
    pub delivery_mode: DeliveryMode,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_READ_BUFFER_SIZE,
            delivery_mode: DeliveryMode::BestEffort,
        }
    }
}

/// Read `reader` to end-of-stream, delivering each non-empty read to `sink`
/// as one [`OutputChunk`].
///
/// Returns once the pipe is closed, a read fails, or (in strict mode) the
/// sink rejects a chunk. `progress` is marked complete before returning in
/// every case, and the reader is dropped.
pub async fn drain_stream<R>(
    mut reader: R,
    stream: OutputStream,
    label: &str,
    sink: Arc<dyn OutputSink>,
    options: DrainOptions,
    progress: Arc<StreamProgress>,
) -> DrainSummary
where
    R: AsyncRead + Unpin,
{
    debug!(process = %label, %stream, "Drain task started");

    let mut buf = vec![0u8; options.buffer_size.max(1)];
    let mut summary = DrainSummary::default();
    let mut sequence_number = 0u64;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                summary.reached_eof = true;
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                error!(process = %label, %stream, error = %e, "Error reading from pipe");
                summary.partial = true;
                break;
            }
        };

        sequence_number += 1;
        summary.chunks += 1;
        summary.bytes += n as u64;
        progress.record_chunk(n);

        let chunk = OutputChunk::new(stream, buf[..n].to_vec(), sequence_number);
        if let Err(e) = sink.deliver(chunk).await {
            summary.delivery_failures += 1;
            warn!(
                process = %label,
                %stream,
                seq = sequence_number,
                error = %e,
                "Sink rejected output chunk"
            );

            if options.delivery_mode == DeliveryMode::Strict {
                summary.partial = true;
                break;
            }
        }
    }

    if let Err(e) = sink.flush().await {
        summary.delivery_failures += 1;
        warn!(process = %label, %stream, error = %e, "Sink flush failed");
        if options.delivery_mode == DeliveryMode::Strict {
            summary.partial = true;
        }
    }

    progress.mark_complete();

    debug!(
        process = %label,
        %stream,
        chunks = summary.chunks,
        bytes = summary.bytes,
        eof = summary.reached_eof,
        "Drain task finished"
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::BufferSink;
    use async_trait::async_trait;
    use launchkit_common::{SinkError, SinkResult};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::io::AsyncWriteExt;

    /// Rejects every chunk whose sequence number is listed.
    struct RejectingSink {
        reject: Vec<u64>,
        accepted: AtomicU64,
    }

    #[async_trait]
    impl OutputSink for RejectingSink {
        async fn deliver(&self, chunk: OutputChunk) -> SinkResult<()> {
            if self.reject.contains(&chunk.sequence_number) {
                return Err(SinkError::delivery_failed("rejected"));
            }
            self.accepted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn small_chunks(mode: DeliveryMode) -> DrainOptions {
        DrainOptions {
            buffer_size: 4,
            delivery_mode: mode,
        }
    }

    #[tokio::test]
    async fn test_drain_reassembles_in_order() {
        let sink = BufferSink::new();
        let progress = Arc::new(StreamProgress::new(OutputStream::Stdout));
        let input: &[u8] = b"the quick brown fox";

        let summary = drain_stream(
            input,
            OutputStream::Stdout,
            "test",
            Arc::new(sink.clone()),
            small_chunks(DeliveryMode::BestEffort),
            Arc::clone(&progress),
        )
        .await;

        assert!(summary.reached_eof);
        assert!(!summary.partial);
        assert_eq!(summary.bytes, input.len() as u64);
        assert_eq!(sink.stream_bytes(OutputStream::Stdout), input);

        let seqs: Vec<u64> = sink.chunks().iter().map(|c| c.sequence_number).collect();
        let expected: Vec<u64> = (1..=summary.chunks).collect();
        assert_eq!(seqs, expected);

        assert!(progress.is_complete());
        assert_eq!(progress.bytes(), input.len() as u64);
    }

    #[tokio::test]
    async fn test_empty_stream_completes_without_chunks() {
        let sink = BufferSink::new();
        let progress = Arc::new(StreamProgress::new(OutputStream::Stderr));

        let summary = drain_stream(
            tokio::io::empty(),
            OutputStream::Stderr,
            "test",
            Arc::new(sink.clone()),
            DrainOptions::default(),
            Arc::clone(&progress),
        )
        .await;

        assert!(summary.reached_eof);
        assert_eq!(summary.chunks, 0);
        assert!(sink.is_empty());
        assert!(progress.is_complete());
    }

    #[tokio::test]
    async fn test_best_effort_keeps_draining_after_rejection() {
        let sink = Arc::new(RejectingSink {
            reject: vec![1],
            accepted: AtomicU64::new(0),
        });
        let progress = Arc::new(StreamProgress::new(OutputStream::Stdout));

        let summary = drain_stream(
            &b"aaaabbbbcccc"[..],
            OutputStream::Stdout,
            "test",
            sink.clone(),
            small_chunks(DeliveryMode::BestEffort),
            progress,
        )
        .await;

        assert!(summary.reached_eof);
        assert!(!summary.partial);
        assert_eq!(summary.delivery_failures, 1);
        assert_eq!(sink.accepted.load(Ordering::SeqCst), summary.chunks - 1);
    }

    #[tokio::test]
    async fn test_strict_mode_stops_at_first_rejection() {
        let sink = Arc::new(RejectingSink {
            reject: vec![2],
            accepted: AtomicU64::new(0),
        });
        let progress = Arc::new(StreamProgress::new(OutputStream::Stdout));

        let summary = drain_stream(
            &b"aaaabbbbcccc"[..],
            OutputStream::Stdout,
            "test",
            sink.clone(),
            small_chunks(DeliveryMode::Strict),
            Arc::clone(&progress),
        )
        .await;

        assert!(summary.partial);
        assert!(!summary.reached_eof);
        assert_eq!(summary.delivery_failures, 1);
        assert_eq!(sink.accepted.load(Ordering::SeqCst), 1);
        assert!(progress.is_complete());
    }

    #[tokio::test]
    async fn test_drains_a_live_pipe() {
        let (mut writer, reader) = tokio::io::duplex(16);
        let sink = BufferSink::new();
        let progress = Arc::new(StreamProgress::new(OutputStream::Stdout));

        let task = tokio::spawn(drain_stream(
            reader,
            OutputStream::Stdout,
            "test",
            Arc::new(sink.clone()),
            DrainOptions::default(),
            Arc::clone(&progress),
        ));

        writer.write_all(b"first ").await.unwrap();
        writer.write_all(b"second").await.unwrap();
        drop(writer);

        let summary = task.await.unwrap();
        assert!(summary.reached_eof);
        assert_eq!(sink.stream_bytes(OutputStream::Stdout), b"first second");
    }
}
