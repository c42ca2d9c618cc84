//! Error types for the mention pipeline.
//!
//! Each collaborator gets its own error so the processor can tell a failed
//! discovery (abort the cycle) from a failed reply (record and move on).

use thiserror::Error;

/// Durable key-value store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt value at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(format!("sqlite: {}", e))
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Unavailable(format!("redis: {}", e))
    }
}

/// Mention discovery failures.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("rate limited, reset in {reset_in_secs:?}s")]
    RateLimited { reset_in_secs: Option<u64> },

    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("more than {pages} pages of mentions in the lookback window; lower LOOKBACK_PERIOD_MINUTES")]
    Truncated { pages: usize },

    #[error("{0}")]
    Other(String),
}

/// Reply posting failures (transport, authorization, or content rejection).
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("reply rejected: {0}")]
    Rejected(String),
}

/// Reasons a whole cycle aborts. Per-mention failures never surface here.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("mention source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    #[error("{0}")]
    StoreUnavailable(#[from] StoreError),
}

impl CycleError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }
}
