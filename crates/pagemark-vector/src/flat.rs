//! Exact brute-force vector index.
//!
//! Scores every stored vector against the query. Suitable for the small
//! collections a personal library produces, and deterministic, which makes it
//! the backend of choice in tests. Optionally persisted as a JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use pagemark_embeddings::{cosine_similarity, Embedding};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::VectorError;
use crate::index::{check_dimension, IndexStats, SearchResult, VectorIndex};

#[derive(Serialize, Deserialize)]
struct FlatFile {
    dimension: usize,
    vectors: BTreeMap<u64, Vec<f32>>,
}

/// Exact nearest-neighbor index over an in-memory map.
pub struct FlatIndex {
    dimension: usize,
    vectors: RwLock<BTreeMap<u64, Vec<f32>>>,
    path: Option<PathBuf>,
    in_place: bool,
}

impl FlatIndex {
    /// In-memory index that overwrites ids in place.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: RwLock::new(BTreeMap::new()),
            path: None,
            in_place: true,
        }
    }

    /// Open a file-backed index, creating an empty one if the file is missing.
    pub fn open(path: impl Into<PathBuf>, dimension: usize) -> Result<Self, VectorError> {
        let path = path.into();
        let vectors = if path.exists() {
            let file: FlatFile = serde_json::from_slice(&std::fs::read(&path)?)?;
            if file.dimension != dimension {
                return Err(VectorError::DimensionMismatch {
                    expected: dimension,
                    actual: file.dimension,
                });
            }
            info!(path = ?path, vectors = file.vectors.len(), "Opened flat vector index");
            file.vectors
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            dimension,
            vectors: RwLock::new(vectors),
            path: Some(path),
            in_place: true,
        })
    }

    /// Report no in-place update, so callers exercise the insert-then-delete path.
    pub fn append_only(mut self) -> Self {
        self.in_place = false;
        self
    }

    /// Ids currently stored, ascending.
    pub fn ids(&self) -> Vec<u64> {
        self.vectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    fn write_file(&self, path: &Path) -> Result<(), VectorError> {
        let file = FlatFile {
            dimension: self.dimension,
            vectors: self
                .vectors
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(&file)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn upsert(&self, id: u64, embedding: &Embedding) -> Result<(), VectorError> {
        check_dimension(self.dimension, embedding)?;
        self.vectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, embedding.values.clone());
        debug!(vector_id = id, "Upserted vector");
        Ok(())
    }

    fn delete(&self, id: u64) -> Result<bool, VectorError> {
        Ok(self
            .vectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some())
    }

    fn search(&self, query: &Embedding, k: usize) -> Result<Vec<SearchResult>, VectorError> {
        check_dimension(self.dimension, query)?;

        let vectors = self.vectors.read().unwrap_or_else(PoisonError::into_inner);
        let mut scored: Vec<SearchResult> = vectors
            .iter()
            .map(|(&id, values)| SearchResult::new(id, cosine_similarity(&query.values, values)))
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.vector_id.cmp(&b.vector_id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    fn contains(&self, id: u64) -> bool {
        self.vectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    fn supports_in_place_update(&self) -> bool {
        self.in_place
    }

    fn stats(&self) -> IndexStats {
        let size_bytes = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);
        IndexStats {
            vector_count: self.len(),
            dimension: self.dimension,
            size_bytes,
        }
    }

    fn save(&self) -> Result<(), VectorError> {
        match &self.path {
            Some(path) => self.write_file(path),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_exact_ranking() {
        let index = FlatIndex::new(2);
        index.upsert(1, &Embedding::new(vec![1.0, 0.0])).unwrap();
        index.upsert(2, &Embedding::new(vec![0.7, 0.7])).unwrap();
        index.upsert(3, &Embedding::new(vec![0.0, 1.0])).unwrap();

        let results = index.search(&Embedding::new(vec![1.0, 0.1]), 2).unwrap();
        let ids: Vec<u64> = results.iter().map(|r| r.vector_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_ties_break_by_id() {
        let index = FlatIndex::new(2);
        index.upsert(9, &Embedding::new(vec![1.0, 0.0])).unwrap();
        index.upsert(4, &Embedding::new(vec![1.0, 0.0])).unwrap();

        let results = index.search(&Embedding::new(vec![1.0, 0.0]), 5).unwrap();
        assert_eq!(results[0].vector_id, 4);
        assert_eq!(results[1].vector_id, 9);
    }

    #[test]
    fn test_in_place_flag() {
        assert!(FlatIndex::new(2).supports_in_place_update());
        assert!(!FlatIndex::new(2).append_only().supports_in_place_update());
    }

    #[test]
    fn test_persistence() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("flat.json");
        {
            let index = FlatIndex::open(&path, 3).unwrap();
            index.upsert(7, &Embedding::new(vec![0.0, 0.0, 1.0])).unwrap();
            assert_eq!(index.stats().size_bytes, 0);
            index.save().unwrap();
        }

        let index = FlatIndex::open(&path, 3).unwrap();
        assert!(index.contains(7));
        let stats = index.stats();
        assert_eq!(stats.vector_count, 1);
        assert_eq!(stats.dimension, 3);
        assert!(stats.size_bytes > 0);
        assert!(matches!(
            FlatIndex::open(&path, 4),
            Err(VectorError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_delete() {
        let index = FlatIndex::new(2);
        index.upsert(1, &Embedding::new(vec![1.0, 0.0])).unwrap();
        index.upsert(2, &Embedding::new(vec![0.0, 1.0])).unwrap();
        assert!(index.delete(1).unwrap());
        assert!(!index.delete(1).unwrap());
        assert_eq!(index.ids(), vec![2]);
        assert!(index.delete(2).unwrap());
        assert!(index.is_empty());
    }
}
