//! Embedding error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Provider throttled the request
    #[error("Rate limited by embedding provider")]
    RateLimited {
        /// Server-suggested wait, when one was sent
        retry_after: Option<Duration>,
    },

    /// Provider unreachable, failed, or returned an unreadable body
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),

    /// Returned vector does not match the configured dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Client could not be built from its configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl EmbeddingError {
    /// Server-suggested wait if this is a rate-limit error.
    pub fn retry_hint(&self) -> Option<Option<Duration>> {
        match self {
            EmbeddingError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, EmbeddingError::RateLimited { .. })
    }
}
