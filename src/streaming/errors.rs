//! Streaming scan errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    /// The analyzer could not process one chunk; the scan moves on
    #[error("Analysis failed for chunk at offset {offset}: {message}")]
    Analysis { offset: u64, message: String },

    /// The source could not be read; the scan ends
    #[error("Failed to read input at offset {offset}: {message}")]
    Read { offset: u64, message: String },

    #[error("Invalid pattern '{rule}': {message}")]
    InvalidPattern { rule: String, message: String },

    #[error("Chunk size must be greater than 0")]
    InvalidChunkSize,
}

impl ChunkError {
    pub fn analysis(offset: u64, message: impl Into<String>) -> Self {
        Self::Analysis {
            offset,
            message: message.into(),
        }
    }

    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::Analysis { offset, .. } | Self::Read { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

/// A chunk error as reported in the final summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub offset: u64,
    pub message: String,
}

impl From<&ChunkError> for ChunkFailure {
    fn from(error: &ChunkError) -> Self {
        Self {
            offset: error.offset().unwrap_or_default(),
            message: error.to_string(),
        }
    }
}
