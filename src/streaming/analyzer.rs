//! # Chunk Analyzers
//!
//! A [`ChunkAnalyzer`] inspects one chunk at a time and reports findings
//! with absolute offsets. Matches that straddle a chunk boundary are not
//! seen by either chunk.

use super::errors::ChunkError;
use crate::constants::streaming::MAX_SNIPPET_BYTES;
use async_trait::async_trait;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

/// One issue discovered in the input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Name of the rule that matched
    pub rule: String,
    /// Absolute byte offset of the match within the whole input
    pub offset: u64,
    pub snippet: String,
}

#[async_trait]
pub trait ChunkAnalyzer: Send + Sync {
    /// Analyze `chunk`, which starts at byte `offset` of the input
    async fn analyze(&self, chunk: &[u8], offset: u64) -> Result<Vec<Finding>, ChunkError>;
}

/// Rules used by [`PatternAnalyzer::with_default_rules`]
pub const DEFAULT_RULES: &[(&str, &str)] = &[
    ("aws_access_key", r"AKIA[0-9A-Z]{16}"),
    (
        "private_key",
        r"-----BEGIN (?:RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----",
    ),
    (
        "password_assignment",
        r#"(?i)password\s*[:=]\s*["']?[^\s"']+"#,
    ),
];

/// Regex-driven analyzer over raw bytes
#[derive(Debug, Clone)]
pub struct PatternAnalyzer {
    rules: Vec<(String, Regex)>,
}

impl PatternAnalyzer {
    pub fn new<N, P>(rules: impl IntoIterator<Item = (N, P)>) -> Result<Self, ChunkError>
    where
        N: Into<String>,
        P: AsRef<str>,
    {
        let rules = rules
            .into_iter()
            .map(|(name, pattern)| {
                let name = name.into();
                Regex::new(pattern.as_ref())
                    .map(|regex| (name.clone(), regex))
                    .map_err(|e| ChunkError::InvalidPattern {
                        rule: name,
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules })
    }

    pub fn with_default_rules() -> Result<Self, ChunkError> {
        Self::new(DEFAULT_RULES.iter().copied())
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(name, _)| name.as_str())
    }

    /// Synchronous scan used by the async trait impl
    pub fn scan(&self, chunk: &[u8], offset: u64) -> Vec<Finding> {
        let mut findings: Vec<Finding> = self
            .rules
            .iter()
            .flat_map(|(name, regex)| {
                regex.find_iter(chunk).map(move |m| Finding {
                    rule: name.clone(),
                    offset: offset + m.start() as u64,
                    snippet: snippet(m.as_bytes()),
                })
            })
            .collect();
        findings.sort_by_key(|finding| finding.offset);
        findings
    }
}

#[async_trait]
impl ChunkAnalyzer for PatternAnalyzer {
    async fn analyze(&self, chunk: &[u8], offset: u64) -> Result<Vec<Finding>, ChunkError> {
        Ok(self.scan(chunk, offset))
    }
}

fn snippet(bytes: &[u8]) -> String {
    let end = bytes.len().min(MAX_SNIPPET_BYTES);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
