//! Vector index trait and types.

use pagemark_embeddings::Embedding;

use crate::error::VectorError;

/// Result of a vector search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Vector id
    pub vector_id: u64,
    /// Cosine similarity, higher is closer
    pub score: f32,
}

impl SearchResult {
    pub fn new(vector_id: u64, score: f32) -> Self {
        Self { vector_id, score }
    }
}

/// Index statistics
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    /// Number of vectors in the index
    pub vector_count: usize,
    /// Embedding dimension
    pub dimension: usize,
    /// Index file size in bytes (0 if never saved)
    pub size_bytes: u64,
}

/// Vector store capability.
///
/// Methods take `&self`; backends use interior mutability so one index can be
/// shared behind an `Arc` by the indexer and the search path.
pub trait VectorIndex: Send + Sync {
    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the number of vectors in the index
    fn len(&self) -> usize;

    /// Check if the index is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `embedding` under `id`, replacing any vector already stored there.
    fn upsert(&self, id: u64, embedding: &Embedding) -> Result<(), VectorError>;

    /// Remove a vector by id. Returns `false` if it was absent.
    fn delete(&self, id: u64) -> Result<bool, VectorError>;

    /// Search for k nearest neighbors, best first.
    fn search(&self, query: &Embedding, k: usize) -> Result<Vec<SearchResult>, VectorError>;

    /// Check if a vector id exists
    fn contains(&self, id: u64) -> bool;

    /// Whether `upsert` on an existing id is a true in-place overwrite.
    ///
    /// When `false`, callers replace a vector by inserting under a new id and
    /// deleting the old one.
    fn supports_in_place_update(&self) -> bool {
        false
    }

    /// Get index statistics
    fn stats(&self) -> IndexStats;

    /// Persist the index, a no-op for purely in-memory backends.
    fn save(&self) -> Result<(), VectorError>;
}

pub(crate) fn check_dimension(expected: usize, embedding: &Embedding) -> Result<(), VectorError> {
    if embedding.dimension() != expected {
        return Err(VectorError::DimensionMismatch {
            expected,
            actual: embedding.dimension(),
        });
    }
    Ok(())
}
