//! Error types for the indexing pipeline.

use pagemark_embeddings::EmbeddingError;
use pagemark_storage::StorageError;
use pagemark_vector::VectorError;
use thiserror::Error;

/// Errors that can occur in the indexing pipeline
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Vector index error
    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    /// Embedding generation error
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The page stopped being wanted while its rebuild was in flight
    #[error("Indexing cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for IndexingError {
    fn from(err: serde_json::Error) -> Self {
        IndexingError::Serialization(err.to_string())
    }
}

impl IndexingError {
    /// Whether the provider throttled the request.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, IndexingError::Embedding(e) if e.is_rate_limited())
    }

    /// Whether the failure is transient (provider throttled or unreachable).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IndexingError::Embedding(EmbeddingError::RateLimited { .. })
                | IndexingError::Embedding(EmbeddingError::Unavailable(_))
        )
    }
}
