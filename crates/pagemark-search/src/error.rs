//! Search error types.

use std::error::Error as StdError;

use pagemark_embeddings::EmbeddingError;
use pagemark_indexing::IndexingError;
use thiserror::Error;

/// Errors surfaced by the query path.
///
/// Callers show [`SearchError::Unavailable`] as a generic message; the cause
/// stays reachable through [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum SearchError {
    /// Backends are not ready yet
    #[error("search not initialized")]
    NotInitialized,

    /// Embedding provider or index failure
    #[error("search unavailable")]
    Unavailable {
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl From<EmbeddingError> for SearchError {
    fn from(err: EmbeddingError) -> Self {
        SearchError::Unavailable {
            source: Box::new(err),
        }
    }
}

impl From<IndexingError> for SearchError {
    fn from(err: IndexingError) -> Self {
        SearchError::Unavailable {
            source: Box::new(err),
        }
    }
}
