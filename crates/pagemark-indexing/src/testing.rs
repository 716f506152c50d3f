//! Test doubles shared by the unit tests of this crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use pagemark_embeddings::{Embedding, EmbeddingClient, EmbeddingError, HashEmbedder};
use pagemark_storage::{MetadataStore, Storage, StorageError};
use pagemark_types::{DocumentIndex, LegacyPageRecord, PendingIndexTask, SchemaVersion};
use pagemark_vector::FlatIndex;

use crate::retry::RetryPolicy;
use crate::store::DocumentIndexStore;

pub const DIM: usize = 64;

/// Hash embedder that can be told to fail its next calls.
pub struct FlakyEmbedder {
    pub inner: HashEmbedder,
    fail_next: AtomicUsize,
    rate_limited: AtomicBool,
}

impl FlakyEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashEmbedder::new(DIM),
            fail_next: AtomicUsize::new(0),
            rate_limited: AtomicBool::new(false),
        }
    }

    pub fn fail_next(&self, count: usize) {
        self.rate_limited.store(false, Ordering::SeqCst);
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn rate_limit_next(&self, count: usize) {
        self.rate_limited.store(true, Ordering::SeqCst);
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.inner.call_count()
    }
}

#[async_trait]
impl EmbeddingClient for FlakyEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            if self.rate_limited.load(Ordering::SeqCst) {
                return Err(EmbeddingError::RateLimited { retry_after: None });
            }
            return Err(EmbeddingError::Unavailable("injected failure".to_string()));
        }
        self.inner.embed(text).await
    }
}

/// RocksDB storage whose document writes can be made to fail.
pub struct FailingMetadata {
    pub inner: Storage,
    fail_writes: AtomicBool,
}

impl FailingMetadata {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Serialization("injected failure".to_string()));
        }
        Ok(())
    }
}

impl MetadataStore for FailingMetadata {
    fn load_documents(&self) -> Result<Vec<DocumentIndex>, StorageError> {
        self.inner.load_documents()
    }

    fn replace_documents(&self, documents: &[DocumentIndex]) -> Result<(), StorageError> {
        self.check()?;
        self.inner.replace_documents(documents)
    }

    fn load_pending_tasks(&self) -> Result<Vec<PendingIndexTask>, StorageError> {
        self.inner.load_pending_tasks()
    }

    fn replace_pending_tasks(&self, tasks: &[PendingIndexTask]) -> Result<(), StorageError> {
        self.inner.replace_pending_tasks(tasks)
    }

    fn load_legacy_pages(&self) -> Result<Vec<LegacyPageRecord>, StorageError> {
        self.inner.load_legacy_pages()
    }

    fn commit_migration_step(
        &self,
        documents: &[DocumentIndex],
        remaining_legacy: &[LegacyPageRecord],
    ) -> Result<(), StorageError> {
        self.check()?;
        self.inner.commit_migration_step(documents, remaining_legacy)
    }

    fn schema_version(&self) -> Result<Option<SchemaVersion>, StorageError> {
        self.inner.schema_version()
    }

    fn set_schema_version(&self, version: SchemaVersion) -> Result<(), StorageError> {
        self.inner.set_schema_version(version)
    }
}

pub struct Fixture {
    pub metadata: Arc<FailingMetadata>,
    pub vectors: Arc<FlatIndex>,
    pub embedder: Arc<FlakyEmbedder>,
    pub _temp: TempDir,
}

impl Fixture {
    /// Fresh storage with an append-only flat index.
    pub fn new() -> Self {
        Self::with_vectors(FlatIndex::new(DIM).append_only())
    }

    pub fn with_vectors(vectors: FlatIndex) -> Self {
        let temp = TempDir::new().unwrap();
        let storage = Storage::open(temp.path()).unwrap();
        Self {
            metadata: Arc::new(FailingMetadata {
                inner: storage,
                fail_writes: AtomicBool::new(false),
            }),
            vectors: Arc::new(vectors),
            embedder: Arc::new(FlakyEmbedder::new()),
            _temp: temp,
        }
    }

    /// Open a store over this fixture's collaborators.
    pub fn store(&self) -> DocumentIndexStore {
        DocumentIndexStore::open(
            self.metadata.clone(),
            self.vectors.clone(),
            self.embedder.clone(),
        )
        .unwrap()
        .with_retry_policy(RetryPolicy::new(2, std::time::Duration::from_secs(1)))
    }
}
