//! Output sinks for child process output

use crate::types::OutputChunk;
use async_trait::async_trait;
use launchkit_common::{OutputStream, SinkError, SinkResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Destination for output chunks.
///
/// Both drain tasks of a child call `deliver` concurrently, so
/// implementations take `&self` and synchronise internally. Delivery may
/// block (await); doing so throttles only the calling stream.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Deliver one chunk.
    async fn deliver(&self, chunk: OutputChunk) -> SinkResult<()>;

    /// Flush any buffered output.
    async fn flush(&self) -> SinkResult<()> {
        Ok(())
    }
}

/// Forwards chunks to the `tracing` subscriber, i.e. the system log.
///
/// stdout is logged at `info`, stderr at `warn`.
#[derive(Debug, Clone)]
pub struct TracingSink {
    label: String,
}

impl TracingSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[async_trait]
impl OutputSink for TracingSink {
    async fn deliver(&self, chunk: OutputChunk) -> SinkResult<()> {
        let text = chunk.text_lossy();
        let message = text.trim_end_matches(['\n', '\r']);

        match chunk.stream {
            OutputStream::Stdout => info!(
                process = %self.label,
                stream = %chunk.stream,
                seq = chunk.sequence_number,
                "{}",
                message
            ),
            OutputStream::Stderr => warn!(
                process = %self.label,
                stream = %chunk.stream,
                seq = chunk.sequence_number,
                "{}",
                message
            ),
        }

        Ok(())
    }
}

/// Appends chunks to a file, one record per chunk.
pub struct FileSink {
    writer: Mutex<BufWriter<File>>,
    label: String,
    path: PathBuf,
}

impl FileSink {
    /// Open (or create) `path` for appending, creating parent directories.
    pub fn new(path: impl Into<PathBuf>, label: impl Into<String>) -> SinkResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            label: label.into(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OutputSink for FileSink {
    async fn deliver(&self, chunk: OutputChunk) -> SinkResult<()> {
        // Format: [timestamp] [label/stream #seq] text
        let text = chunk.text_lossy();
        let line = format!(
            "[{}] [{}/{} #{}] {}\n",
            chunk.captured_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.label,
            chunk.stream,
            chunk.sequence_number,
            text.trim_end_matches(['\n', '\r'])
        );

        self.writer.lock().write_all(line.as_bytes())?;
        Ok(())
    }

    async fn flush(&self) -> SinkResult<()> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

/// In-memory sink that keeps the most recent chunks.
///
/// Used by tests and by embedders that want the tail of a helper's output.
#[derive(Debug, Clone)]
pub struct BufferSink {
    buffer: Arc<Mutex<VecDeque<OutputChunk>>>,
    max_chunks: Option<usize>,
}

impl BufferSink {
    /// Unbounded buffer.
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::new())),
            max_chunks: None,
        }
    }

    /// Buffer keeping only the last `max_chunks` chunks.
    pub fn with_capacity(max_chunks: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(max_chunks))),
            max_chunks: Some(max_chunks),
        }
    }

    pub fn chunks(&self) -> Vec<OutputChunk> {
        self.buffer.lock().iter().cloned().collect()
    }

    /// Chunks of one stream, in delivery order.
    pub fn stream_chunks(&self, stream: OutputStream) -> Vec<OutputChunk> {
        self.buffer
            .lock()
            .iter()
            .filter(|chunk| chunk.stream == stream)
            .cloned()
            .collect()
    }

    /// Concatenated bytes of one stream.
    pub fn stream_bytes(&self, stream: OutputStream) -> Vec<u8> {
        self.buffer
            .lock()
            .iter()
            .filter(|chunk| chunk.stream == stream)
            .flat_map(|chunk| chunk.bytes.iter().copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

impl Default for BufferSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutputSink for BufferSink {
    async fn deliver(&self, chunk: OutputChunk) -> SinkResult<()> {
        let mut buffer = self.buffer.lock();
        buffer.push_back(chunk);

        if let Some(max) = self.max_chunks {
            while buffer.len() > max {
                buffer.pop_front();
            }
        }

        Ok(())
    }
}

/// Hands chunks to an async consumer over a bounded channel.
///
/// A full channel makes `deliver` wait, which throttles the producing
/// stream only.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<OutputChunk>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutputChunk>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    async fn deliver(&self, chunk: OutputChunk) -> SinkResult<()> {
        self.tx.send(chunk).await.map_err(|_| SinkError::Closed)
    }
}

/// Delivers every chunk to each inner sink in order.
///
/// All sinks are attempted; the first error is returned.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn OutputSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl OutputSink for FanoutSink {
    async fn deliver(&self, chunk: OutputChunk) -> SinkResult<()> {
        let mut first_error = None;

        for sink in &self.sinks {
            if let Err(e) = sink.deliver(chunk.clone()).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn flush(&self) -> SinkResult<()> {
        let mut first_error = None;

        for sink in &self.sinks {
            if let Err(e) = sink.flush().await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chunk(stream: OutputStream, text: &str, seq: u64) -> OutputChunk {
        OutputChunk::new(stream, text.as_bytes().to_vec(), seq)
    }

    #[tokio::test]
    async fn test_buffer_sink_reassembles_streams() {
        let sink = BufferSink::new();
        sink.deliver(chunk(OutputStream::Stdout, "hel", 1)).await.unwrap();
        sink.deliver(chunk(OutputStream::Stderr, "wor", 1)).await.unwrap();
        sink.deliver(chunk(OutputStream::Stdout, "lo", 2)).await.unwrap();
        sink.deliver(chunk(OutputStream::Stderr, "ld", 2)).await.unwrap();

        assert_eq!(sink.len(), 4);
        assert_eq!(sink.stream_bytes(OutputStream::Stdout), b"hello");
        assert_eq!(sink.stream_bytes(OutputStream::Stderr), b"world");
        assert_eq!(sink.stream_chunks(OutputStream::Stdout).len(), 2);
    }

    #[tokio::test]
    async fn test_bounded_buffer_sink_keeps_tail() {
        let sink = BufferSink::with_capacity(2);
        for seq in 1..=5 {
            sink.deliver(chunk(OutputStream::Stdout, "x", seq)).await.unwrap();
        }

        let kept: Vec<u64> = sink.chunks().iter().map(|c| c.sequence_number).collect();
        assert_eq!(kept, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_file_sink_writes_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs/helper.log");

        let sink = FileSink::new(&path, "helper").unwrap();
        sink.deliver(chunk(OutputStream::Stdout, "ready\n", 1)).await.unwrap();
        sink.deliver(chunk(OutputStream::Stderr, "warning", 1)).await.unwrap();
        sink.flush().await.unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[helper/stdout #1] ready"));
        assert!(lines[1].ends_with("[helper/stderr #1] warning"));
    }

    #[test]
    fn test_file_sink_open_failure_is_io_error() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for appending
        let err = FileSink::new(dir.path(), "helper").err().unwrap();
        assert!(matches!(err, SinkError::Io(_)));

        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let err = FileSink::new(blocker.join("helper.log"), "helper").err().unwrap();
        assert!(matches!(err, SinkError::Io(_)));
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed() {
        let (sink, mut rx) = ChannelSink::new(4);
        sink.deliver(chunk(OutputStream::Stdout, "a", 1)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().bytes, b"a");

        drop(rx);
        let err = sink.deliver(chunk(OutputStream::Stdout, "b", 2)).await.unwrap_err();
        assert!(matches!(err, SinkError::Closed));
    }

    #[tokio::test]
    async fn test_fanout_attempts_every_sink() {
        let (closed, rx) = ChannelSink::new(1);
        drop(rx);
        let buffer = BufferSink::new();

        let fanout = FanoutSink::new()
            .with(Arc::new(closed))
            .with(Arc::new(buffer.clone()));
        assert_eq!(fanout.len(), 2);

        let result = fanout.deliver(chunk(OutputStream::Stdout, "x", 1)).await;
        assert!(matches!(result, Err(SinkError::Closed)));
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_both_streams() {
        let sink = TracingSink::new("helper");
        assert!(sink.deliver(chunk(OutputStream::Stdout, "out\n", 1)).await.is_ok());
        assert!(sink.deliver(chunk(OutputStream::Stderr, "err\n", 1)).await.is_ok());
    }
}
