//! Error type shared by the whole ingestion pipeline.

use std::time::Duration;

/// Errors raised by the pipeline, grouped by how callers must react to them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Upstream signalled HTTP 429. Transient, retried by [`crate::backoff::BackoffExecutor`].
    #[error("rate limited (retry after: {retry_after:?})")]
    RateLimited {
        /// Server supplied `Retry-After` hint, if any.
        retry_after: Option<Duration>,
    },
    /// Still rate limited after the configured number of attempts.
    #[error("retry budget exhausted for `{label}` after {attempts} attempts")]
    RetryBudgetExhausted {
        /// Which call ran out of attempts.
        label: String,
        /// How many attempts were made.
        attempts: u32,
    },
    /// Any other upstream failure (4xx/5xx, transport). Never retried.
    #[error("upstream error (status: {status:?}): {message}")]
    Upstream {
        /// HTTP status, if a response was received at all.
        status: Option<u16>,
        /// Human readable detail.
        message: String,
    },
    /// Store unavailable or a write was rejected.
    #[error("persistence error: {0}")]
    Persistence(String),
    /// A payload is missing an expected field or has the wrong shape.
    #[error("unexpected data shape: {0}")]
    DataShape(String),
    /// Invalid [`crate::config::PipelineConfig`].
    #[error("invalid config: {0}")]
    Config(String),
}

impl Error {
    /// If this is [`Error::RateLimited`].
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// If this is [`Error::DataShape`].
    pub fn is_data_shape(&self) -> bool {
        matches!(self, Self::DataShape(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::DataShape(value.to_string())
    }
}

/// Result alias defaulting to [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
