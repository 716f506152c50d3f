//! Error types shared across pagemark crates.

use thiserror::Error;

/// Configuration and input errors.
#[derive(Debug, Error)]
pub enum PagemarkError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
