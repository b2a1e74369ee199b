//! Error taxonomy for the analysis pipeline.
//!
//! Acquisition errors abort an analysis. Per-file errors are recorded in
//! [`AnalysisStats`](crate::report::AnalysisStats) and the walk continues.
//! Anything else surfaces as a fatal error on the report, never as a panic
//! or a raw `Err` to the caller of [`Analyzer::analyze`](crate::Analyzer::analyze).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while acquiring a repository.
#[derive(Error, Debug)]
pub enum AcquireError {
    /// The reference is malformed or its host is not allow-listed.
    #[error("invalid repository reference: {0}")]
    Validation(String),
    /// The fetch primitive failed.
    #[error("failed to fetch repository: {0}")]
    Fetch(String),
    /// The fetch primitive did not finish in time.
    #[error("fetch timed out after {0}s")]
    FetchTimeout(u64),
    /// The fetched tree is larger than the configured limit.
    #[error("repository too large: {size_mb:.1}MB exceeds limit of {limit_mb}MB")]
    SizeLimit { size_mb: f64, limit_mb: u64 },
    /// The working directory could not be prepared.
    #[error("working directory error: {0}")]
    Io(#[from] std::io::Error),
}

impl AcquireError {
    /// Classify this error for the report.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AcquireError::Validation(_) => ErrorKind::Validation,
            AcquireError::Fetch(_) | AcquireError::FetchTimeout(_) => ErrorKind::Fetch,
            AcquireError::SizeLimit { .. } => ErrorKind::SizeLimit,
            AcquireError::Io(_) => ErrorKind::Fatal,
        }
    }
}

/// Errors raised while obtaining an embedding for a chunk.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("embedding timed out after {0}s")]
    Timeout(u64),
    #[error("embedding disabled")]
    Disabled,
    #[error("unexpected embedding response: {0}")]
    BadResponse(String),
}

/// Errors raised while persisting a vector.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("vector store rejected object: HTTP {0}")]
    Rejected(u16),
}

/// Errors raised while constructing the parser service.
///
/// An unavailable concrete engine is not an error; see
/// [`EngineStatus`](crate::parser::EngineStatus).
#[derive(Error, Debug)]
pub enum ParserInitError {
    #[error("failed to load grammar: {0}")]
    Grammar(String),
    #[error("failed to compile outline query: {0}")]
    Query(String),
}

/// Error classes recorded in `stats.errors` and on a failed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "validation_error")]
    Validation,
    #[serde(rename = "fetch_error")]
    Fetch,
    #[serde(rename = "size_limit_error")]
    SizeLimit,
    #[serde(rename = "processing_error")]
    Processing,
    #[serde(rename = "doc_chunk_error")]
    DocChunk,
    #[serde(rename = "syntax_error")]
    Syntax,
    #[serde(rename = "fatal_error")]
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Fetch => "fetch_error",
            ErrorKind::SizeLimit => "size_limit_error",
            ErrorKind::Processing => "processing_error",
            ErrorKind::DocChunk => "doc_chunk_error",
            ErrorKind::Syntax => "syntax_error",
            ErrorKind::Fatal => "fatal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_error_kinds() {
        assert_eq!(
            AcquireError::Validation("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(AcquireError::FetchTimeout(5).kind(), ErrorKind::Fetch);
        assert_eq!(
            AcquireError::SizeLimit {
                size_mb: 150.0,
                limit_mb: 100
            }
            .kind(),
            ErrorKind::SizeLimit
        );
    }

    #[test]
    fn test_size_limit_message() {
        let err = AcquireError::SizeLimit {
            size_mb: 150.04,
            limit_mb: 100,
        };
        assert_eq!(
            err.to_string(),
            "repository too large: 150.0MB exceeds limit of 100MB"
        );
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::Processing).unwrap();
        assert_eq!(json, "\"processing_error\"");
    }
}
