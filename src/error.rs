//! Error taxonomy for the annotation pipeline.
//!
//! Failure classes map to containment levels: configuration errors abort a
//! whole run, transport errors abort one batch after retries, parse and
//! resolution misses drop individual elements. Review-state conflicts are
//! reported as boolean no-ops, never as errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("no active provider configuration")]
    NoActiveConfig,

    #[error("provider configuration invalid: {0}")]
    InvalidConfig(String),

    #[error("cannot reach provider at {0}")]
    Connection(String),

    #[error("provider request timed out after {0}s")]
    Timeout(u64),

    #[error("provider returned error (status {status}): {body}")]
    Provider { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("response parsing error: {0}")]
    ResponseParsing(String),

    #[error("no active labels available")]
    NoActiveLabels,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid stored value for {field}: {value}")]
    InvalidStored { field: String, value: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnnotationError {
    /// Transport-class failures are retried by the dispatch loop; everything
    /// else either aborts the run (configuration) or is contained locally.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Provider { .. } | Self::HttpClient(_)
        )
    }
}
