//! # Streaming Scans
//!
//! Bounded-memory, chunked analysis of large inputs with incremental
//! progress and findings.

pub mod analyzer;
pub mod errors;
pub mod processor;

pub use analyzer::{ChunkAnalyzer, Finding, PatternAnalyzer, DEFAULT_RULES};
pub use errors::{ChunkError, ChunkFailure};
pub use processor::{
    EventStream, ProgressCallback, StreamEvent, StreamEventKind, StreamPayload, StreamSummary,
    StreamingChunkProcessor,
};
