//! # Streaming Chunk Processor
//!
//! Scans a large input in fixed-size chunks and exposes the scan as a lazy
//! [`Stream`](futures::Stream) of [`StreamEvent`]s. Only one chunk is held in memory at a
//! time, and chunk N+1 is not read until the consumer pulls past chunk N's
//! events. Dropping the stream stops the scan.
//!
//! Per chunk the stream yields, in order:
//! - a `result` event when the analyzer found anything,
//! - an `error` event when the analyzer failed (the scan continues),
//! - a `progress` event.
//!
//! A final `complete` event carries the [`StreamSummary`]. A failure to read
//! the source yields one `error` event and then `complete`.

use super::analyzer::{ChunkAnalyzer, Finding};
use super::errors::{ChunkError, ChunkFailure};
use crate::config::StreamingConfig;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

/// Invoked with the completion percentage after every chunk
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

pub type EventStream = BoxStream<'static, StreamEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventKind {
    Progress,
    Result,
    Error,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamPayload {
    Progress {
        bytes_processed: u64,
        total_bytes: u64,
    },
    Result {
        findings: Vec<Finding>,
    },
    Error(ChunkFailure),
    Complete(StreamSummary),
}

/// Serializes as `{"type": ..., "data": ..., "progress": ...}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamEvent {
    #[serde(flatten)]
    pub payload: StreamPayload,
    /// Percentage of the input processed when the event was emitted
    pub progress: f64,
}

impl StreamEvent {
    pub fn kind(&self) -> StreamEventKind {
        match self.payload {
            StreamPayload::Progress { .. } => StreamEventKind::Progress,
            StreamPayload::Result { .. } => StreamEventKind::Result,
            StreamPayload::Error(_) => StreamEventKind::Error,
            StreamPayload::Complete(_) => StreamEventKind::Complete,
        }
    }

    pub fn summary(&self) -> Option<&StreamSummary> {
        match &self.payload {
            StreamPayload::Complete(summary) => Some(summary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub total_bytes: u64,
    pub bytes_processed: u64,
    pub chunks_processed: u64,
    pub findings: u64,
    pub errors: Vec<ChunkFailure>,
}

pub struct StreamingChunkProcessor {
    analyzer: Arc<dyn ChunkAnalyzer>,
    chunk_size: usize,
}

impl fmt::Debug for StreamingChunkProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingChunkProcessor")
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl StreamingChunkProcessor {
    pub fn new(analyzer: Arc<dyn ChunkAnalyzer>, chunk_size: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::InvalidChunkSize);
        }
        Ok(Self {
            analyzer,
            chunk_size,
        })
    }

    pub fn from_config(
        config: &StreamingConfig,
        analyzer: Arc<dyn ChunkAnalyzer>,
    ) -> Result<Self, ChunkError> {
        Self::new(analyzer, config.chunk_size_bytes)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Scan `total_bytes` bytes from `reader`
    pub fn process_stream<R>(
        &self,
        reader: R,
        total_bytes: u64,
        on_progress: Option<ProgressCallback>,
    ) -> EventStream
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let task = ChunkTask {
            reader,
            analyzer: Arc::clone(&self.analyzer),
            chunk_size: self.chunk_size,
            total_bytes,
            offset: 0,
            chunks_processed: 0,
            findings: 0,
            errors: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
            on_progress,
        };

        debug!(total_bytes, chunk_size = self.chunk_size, "Starting chunked scan");
        stream::unfold(task, ChunkTask::next_event).boxed()
    }

    /// Scan an in-memory buffer
    pub fn process_bytes(
        &self,
        data: impl Into<Vec<u8>>,
        on_progress: Option<ProgressCallback>,
    ) -> EventStream {
        let data = data.into();
        let total_bytes = data.len() as u64;
        self.process_stream(std::io::Cursor::new(data), total_bytes, on_progress)
    }

    /// Scan a file on disk
    pub async fn process_file(
        &self,
        path: impl AsRef<Path>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<EventStream, ChunkError> {
        let path = path.as_ref();
        let open_error = |e: std::io::Error| ChunkError::Read {
            offset: 0,
            message: format!("{}: {e}", path.display()),
        };

        let file = tokio::fs::File::open(path).await.map_err(open_error)?;
        let total_bytes = file.metadata().await.map_err(open_error)?.len();
        Ok(self.process_stream(file, total_bytes, on_progress))
    }
}

/// Scan state carried between pulls of the event stream
struct ChunkTask<R> {
    reader: R,
    analyzer: Arc<dyn ChunkAnalyzer>,
    chunk_size: usize,
    total_bytes: u64,
    offset: u64,
    chunks_processed: u64,
    findings: u64,
    errors: Vec<ChunkFailure>,
    pending: VecDeque<StreamEvent>,
    finished: bool,
    on_progress: Option<ProgressCallback>,
}

impl<R> ChunkTask<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_event(mut self) -> Option<(StreamEvent, Self)> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some((event, self));
            }
            if self.finished {
                return None;
            }
            if self.offset >= self.total_bytes {
                self.complete();
            } else {
                self.process_next_chunk().await;
            }
        }
    }

    async fn process_next_chunk(&mut self) {
        let remaining = self.total_bytes - self.offset;
        let len = remaining.min(self.chunk_size as u64) as usize;
        let mut chunk = vec![0_u8; len];

        if let Err(e) = self.reader.read_exact(&mut chunk).await {
            let error = ChunkError::Read {
                offset: self.offset,
                message: e.to_string(),
            };
            warn!(offset = self.offset, error = %error, "Input read failed, ending scan");
            self.record_error(&error);
            self.complete();
            return;
        }

        match self.analyzer.analyze(&chunk, self.offset).await {
            Ok(findings) if findings.is_empty() => {}
            Ok(findings) => {
                debug!(offset = self.offset, count = findings.len(), "Chunk produced findings");
                self.findings += findings.len() as u64;
                let progress = self.progress_at(self.offset);
                self.pending.push_back(StreamEvent {
                    payload: StreamPayload::Result { findings },
                    progress,
                });
            }
            Err(error) => {
                warn!(offset = self.offset, error = %error, "Chunk analysis failed, continuing");
                self.record_error(&error);
            }
        }

        self.offset += len as u64;
        self.chunks_processed += 1;

        let progress = self.progress_at(self.offset);
        if let Some(callback) = &self.on_progress {
            callback(progress);
        }
        self.pending.push_back(StreamEvent {
            payload: StreamPayload::Progress {
                bytes_processed: self.offset,
                total_bytes: self.total_bytes,
            },
            progress,
        });
    }

    fn record_error(&mut self, error: &ChunkError) {
        let failure = ChunkFailure::from(error);
        self.pending.push_back(StreamEvent {
            payload: StreamPayload::Error(failure.clone()),
            progress: self.progress_at(self.offset),
        });
        self.errors.push(failure);
    }

    fn complete(&mut self) {
        let summary = StreamSummary {
            total_bytes: self.total_bytes,
            bytes_processed: self.offset,
            chunks_processed: self.chunks_processed,
            findings: self.findings,
            errors: std::mem::take(&mut self.errors),
        };

        info!(
            total_bytes = summary.total_bytes,
            bytes_processed = summary.bytes_processed,
            chunks = summary.chunks_processed,
            findings = summary.findings,
            errors = summary.errors.len(),
            "Chunked scan complete"
        );

        self.pending.push_back(StreamEvent {
            payload: StreamPayload::Complete(summary),
            progress: self.progress_at(self.offset),
        });
        self.finished = true;
    }

    fn progress_at(&self, offset: u64) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        offset as f64 * 100.0 / self.total_bytes as f64
    }
}
