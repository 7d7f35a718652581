use std::time::Duration;
use thiserror::Error;

/// Failure reported by an external collaborator (index, reranker, LLM,
/// parent store). Always recoverable at the orchestrator level.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed backend response: {0}")]
    Malformed(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl BackendError {
    /// Transient failures worth another attempt under the retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_) | BackendError::Timeout(_))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("All {attempted} retrieval calls failed; last error: {last_error}")]
    Failed { attempted: usize, last_error: BackendError },

    #[error("Search exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Search was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
