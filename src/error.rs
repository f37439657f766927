// Error types for the bananachat sync engine.
// Maps GitHub API failures, rate limiting, and cache I/O into one taxonomy.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("authentication failed: invalid or expired token")]
    Unauthorized,

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("rate limit exceeded, retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("invalid message data: {0}")]
    InvalidData(String),

    #[error("cache persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("metadata encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing GITHUB_TOKEN environment variable")]
    MissingToken,

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("sync cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl ChatError {
    /// Whether a retry with backoff could plausibly succeed.
    ///
    /// Only transient transport failures and timeouts qualify. Rate limiting
    /// is excluded: the remedy there is waiting for the window to reset,
    /// which the limiter already handles.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Network(_) | ChatError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
