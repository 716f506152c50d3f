//! HNSW index implementation using usearch.
//!
//! Parameters tuned for quality over speed:
//! - M = 16 (connections per layer)
//! - ef_construction = 200 (build-time quality)
//! - ef_search = 100 (search-time quality)
//!
//! usearch cannot overwrite a key in place; `upsert` on an existing id is a
//! remove followed by an add, so this backend reports no in-place update.

use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use pagemark_embeddings::Embedding;
use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::VectorError;
use crate::index::{check_dimension, IndexStats, SearchResult, VectorIndex};

const INDEX_FILE: &str = "documents.usearch";

/// HNSW index configuration
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Embedding dimension (must match the embedding provider)
    pub dimension: usize,
    /// Number of connections per layer (M parameter)
    pub connectivity: usize,
    /// Build-time search depth (ef_construction)
    pub expansion_add: usize,
    /// Query-time search depth (ef_search)
    pub expansion_search: usize,
    /// Directory holding the index file
    pub index_path: PathBuf,
    /// Initial capacity; grows on demand
    pub capacity: usize,
}

impl HnswConfig {
    pub fn new(dimension: usize, index_path: impl Into<PathBuf>) -> Self {
        Self {
            dimension,
            connectivity: 16,
            expansion_add: 200,
            expansion_search: 100,
            index_path: index_path.into(),
            capacity: 1024,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    fn options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimension,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false,
        }
    }
}

/// HNSW index wrapper around usearch.
pub struct HnswIndex {
    index: RwLock<Index>,
    config: HnswConfig,
}

impl HnswIndex {
    /// Create a new HNSW index or open existing one.
    pub fn open_or_create(config: HnswConfig) -> Result<Self, VectorError> {
        let index_file = config.index_path.join(INDEX_FILE);
        let index = Index::new(&config.options()).map_err(|e| VectorError::Index(e.to_string()))?;

        if index_file.exists() {
            info!(path = ?index_file, "Opening existing vector index");
            index
                .load(path_str(&index_file)?)
                .map_err(|e| VectorError::Index(format!("Failed to load: {}", e)))?;
            if index.dimensions() != config.dimension {
                return Err(VectorError::DimensionMismatch {
                    expected: config.dimension,
                    actual: index.dimensions(),
                });
            }
        } else {
            info!(path = ?index_file, dim = config.dimension, "Creating new vector index");
            std::fs::create_dir_all(&config.index_path)?;
            index
                .reserve(config.capacity)
                .map_err(|e| VectorError::Index(e.to_string()))?;
        }

        Ok(Self {
            index: RwLock::new(index),
            config,
        })
    }

    /// Get the index file path
    pub fn index_file(&self) -> PathBuf {
        self.config.index_path.join(INDEX_FILE)
    }

    fn ensure_capacity(index: &Index, additional: usize) -> Result<(), VectorError> {
        let needed = index.size() + additional;
        if needed > index.capacity() {
            let target = needed.max(index.capacity() * 2).max(64);
            index
                .reserve(target)
                .map_err(|e| VectorError::Index(e.to_string()))?;
            debug!(capacity = target, "Grew vector index");
        }
        Ok(())
    }
}

fn path_str(path: &std::path::Path) -> Result<&str, VectorError> {
    path.to_str()
        .ok_or_else(|| VectorError::Index("Invalid path encoding".to_string()))
}

impl VectorIndex for HnswIndex {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn len(&self) -> usize {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .size()
    }

    #[allow(clippy::readonly_write_lock)] // usearch::Index uses interior mutability
    fn upsert(&self, id: u64, embedding: &Embedding) -> Result<(), VectorError> {
        check_dimension(self.config.dimension, embedding)?;

        // Write lock keeps remove + add from interleaving with another writer
        let index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        if index.contains(id) {
            index
                .remove(id)
                .map_err(|e| VectorError::Index(e.to_string()))?;
        }
        Self::ensure_capacity(&index, 1)?;
        index
            .add(id, &embedding.values)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        debug!(vector_id = id, "Upserted vector");
        Ok(())
    }

    #[allow(clippy::readonly_write_lock)] // usearch::Index uses interior mutability
    fn delete(&self, id: u64) -> Result<bool, VectorError> {
        let index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        let removed = index
            .remove(id)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        if removed > 0 {
            debug!(vector_id = id, "Removed vector");
        }
        Ok(removed > 0)
    }

    fn search(&self, query: &Embedding, k: usize) -> Result<Vec<SearchResult>, VectorError> {
        check_dimension(self.config.dimension, query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        if index.size() == 0 {
            return Ok(Vec::new());
        }
        let results = index
            .search(&query.values, k)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        // Cosine distance to similarity; zero vectors yield NaN distances
        let search_results: Vec<SearchResult> = results
            .keys
            .iter()
            .zip(results.distances.iter())
            .map(|(&id, &dist)| {
                let score = 1.0 - dist;
                SearchResult::new(id, if score.is_nan() { 0.0 } else { score })
            })
            .collect();

        debug!(k = k, found = search_results.len(), "Search complete");
        Ok(search_results)
    }

    fn contains(&self, id: u64) -> bool {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    fn stats(&self) -> IndexStats {
        let size_bytes = std::fs::metadata(self.index_file())
            .map(|m| m.len())
            .unwrap_or(0);

        IndexStats {
            vector_count: self.len(),
            dimension: self.config.dimension,
            size_bytes,
        }
    }

    fn save(&self) -> Result<(), VectorError> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        let path = self.index_file();
        index
            .save(path_str(&path)?)
            .map_err(|e| VectorError::Index(format!("Failed to save: {}", e)))?;

        debug!(path = ?path, vectors = index.size(), "Saved vector index");
        Ok(())
    }
}
