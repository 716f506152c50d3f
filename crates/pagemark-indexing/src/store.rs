//! Per-document aggregate index.
//!
//! Replace ordering for a changed page set:
//! embed, insert the vector under its id, persist the full record set, then
//! delete the old vector. An embedding failure leaves everything untouched;
//! a persist failure removes the freshly inserted vector again.
//!
//! Backends that overwrite in place keep the document's id: the record set is
//! persisted first and the vector overwritten second, restoring the previous
//! record set if the overwrite fails.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use pagemark_embeddings::{Embedding, EmbeddingClient};
use pagemark_storage::{MetadataStore, StorageError};
use pagemark_types::{DocumentIndex, LegacyPageRecord, PageIndexEntry};
use pagemark_vector::VectorIndex;

use crate::error::IndexingError;
use crate::retry::RetryPolicy;
use crate::text::combined_text;

/// Outcome of [`DocumentIndexStore::repair_missing_vectors`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Documents whose vector was present
    pub checked: usize,
    /// Documents re-embedded
    pub repaired: usize,
    /// Documents that could not be re-embedded
    pub failed: usize,
}

/// Owns every [`DocumentIndex`] record and its vector.
pub struct DocumentIndexStore {
    metadata: Arc<dyn MetadataStore>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingClient>,
    retry: RetryPolicy,
    documents: Mutex<BTreeMap<String, DocumentIndex>>,
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    next_id: AtomicU64,
}

impl DocumentIndexStore {
    /// Load all document records and prepare the id sequence.
    pub fn open(
        metadata: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<Self, IndexingError> {
        let loaded = metadata.load_documents()?;
        let legacy = metadata.load_legacy_pages()?;

        let max_id = loaded
            .iter()
            .map(|d| d.id)
            .chain(legacy.iter().map(|r| r.vector_id))
            .max()
            .unwrap_or(0);

        let documents: BTreeMap<String, DocumentIndex> = loaded
            .into_iter()
            .map(|d| (d.document_key.clone(), d))
            .collect();

        info!(
            documents = documents.len(),
            legacy_pages = legacy.len(),
            next_id = max_id + 1,
            "Opened document index store"
        );

        Ok(Self {
            metadata,
            vectors,
            embedder,
            retry: RetryPolicy::default(),
            documents: Mutex::new(documents),
            locks: DashMap::new(),
            next_id: AtomicU64::new(max_id + 1),
        })
    }

    /// Retry policy used by batch operations.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingClient> {
        &self.embedder
    }

    pub fn vectors(&self) -> &Arc<dyn VectorIndex> {
        &self.vectors
    }

    fn docs(&self) -> MutexGuard<'_, BTreeMap<String, DocumentIndex>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_for(&self, document_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(document_key.to_string())
            .or_default()
            .clone()
    }

    /// Next vector id not present in the vector index.
    fn mint_id(&self) -> u64 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            if !self.vectors.contains(id) {
                return id;
            }
        }
    }

    /// Whether the page is part of its document's index.
    pub fn is_indexed(&self, document_key: &str, page_index: u32) -> bool {
        self.docs()
            .get(document_key)
            .is_some_and(|d| d.contains_page(page_index))
    }

    pub fn get(&self, document_key: &str) -> Option<DocumentIndex> {
        self.docs().get(document_key).cloned()
    }

    /// All document records, ordered by document key.
    pub fn documents(&self) -> Vec<DocumentIndex> {
        self.docs().values().cloned().collect()
    }

    pub fn document_count(&self) -> usize {
        self.docs().len()
    }

    pub fn page_count(&self) -> usize {
        self.docs().values().map(|d| d.pages.len()).sum()
    }

    /// Add one page to its document. Returns `false` if it was already present.
    ///
    /// Interactive: a failed embedding is returned without retry and leaves
    /// the document unchanged.
    pub async fn add_page(
        &self,
        document_key: &str,
        page_index: u32,
        summary: &str,
        highlight_excerpts: Option<Vec<String>>,
    ) -> Result<bool, IndexingError> {
        self.add_page_if(document_key, page_index, summary, highlight_excerpts, || true)
            .await
    }

    /// [`add_page`](Self::add_page) that commits only while `still_wanted` holds.
    ///
    /// `still_wanted` is checked under the document lock once the embedding
    /// is back, so a removal that takes the same lock either sees the page or
    /// prevents it from being written. Returns [`IndexingError::Cancelled`]
    /// without touching the document otherwise.
    pub async fn add_page_if<F>(
        &self,
        document_key: &str,
        page_index: u32,
        summary: &str,
        highlight_excerpts: Option<Vec<String>>,
        still_wanted: F,
    ) -> Result<bool, IndexingError>
    where
        F: Fn() -> bool + Send + Sync,
    {
        let lock = self.lock_for(document_key);
        let _guard = lock.lock().await;

        let previous = self.get(document_key);
        if previous
            .as_ref()
            .is_some_and(|d| d.contains_page(page_index))
        {
            debug!(document_key, page_index, "Page already indexed");
            return Ok(false);
        }

        let mut next = previous
            .clone()
            .unwrap_or_else(|| DocumentIndex::new(0, document_key));
        next.insert_page(
            PageIndexEntry::new(page_index, summary)
                .with_excerpts(highlight_excerpts.unwrap_or_default()),
        );
        next.touch();

        let embedding = self.embedder.embed(&combined_text(&next.pages)).await?;
        if !still_wanted() {
            debug!(document_key, page_index, "Page no longer wanted, dropping rebuild");
            return Err(IndexingError::Cancelled);
        }
        self.install(previous, next, &embedding, true, |docs| {
            self.metadata.replace_documents(docs)
        })?;

        info!(document_key, page_index, "Indexed page");
        Ok(true)
    }

    /// Remove one page. Returns `false` if it was not indexed.
    ///
    /// Removing the last page deletes the document record and its vector.
    pub async fn remove_page(
        &self,
        document_key: &str,
        page_index: u32,
    ) -> Result<bool, IndexingError> {
        let lock = self.lock_for(document_key);
        let _guard = lock.lock().await;

        let Some(previous) = self.get(document_key) else {
            return Ok(false);
        };
        let mut next = previous.clone();
        if next.remove_page(page_index).is_none() {
            return Ok(false);
        }

        if next.is_empty() {
            self.delete_document(&previous)?;
        } else {
            next.touch();
            let embedding = self.embedder.embed(&combined_text(&next.pages)).await?;
            self.install(Some(previous), next, &embedding, true, |docs| {
                self.metadata.replace_documents(docs)
            })?;
        }

        info!(document_key, page_index, "Removed page from index");
        Ok(true)
    }

    /// Rebuild a document from a complete page set with one embedding.
    ///
    /// Batch: the embedding is retried on rate limiting. An empty page set
    /// deletes the document. Returns the stored record.
    pub async fn replace_document(
        &self,
        document_key: &str,
        pages: Vec<PageIndexEntry>,
    ) -> Result<Option<DocumentIndex>, IndexingError> {
        let lock = self.lock_for(document_key);
        let _guard = lock.lock().await;

        let previous = self.get(document_key);
        if pages.is_empty() {
            if let Some(previous) = previous {
                self.delete_document(&previous)?;
            }
            return Ok(None);
        }

        let mut next = previous
            .clone()
            .unwrap_or_else(|| DocumentIndex::new(0, document_key));
        next.pages = pages;
        next.normalize();
        next.touch();

        let embedding = self.embed_with_retry(&combined_text(&next.pages)).await?;
        let stored = self.install(previous, next, &embedding, true, |docs| {
            self.metadata.replace_documents(docs)
        })?;
        Ok(Some(stored))
    }

    /// Fold one legacy group into its document and drop it from the legacy set.
    ///
    /// Existing pages win over legacy records with the same page index. The
    /// document set and `remaining_legacy` are committed in one write.
    pub(crate) async fn merge_legacy_group(
        &self,
        document_key: &str,
        records: &[LegacyPageRecord],
        remaining_legacy: &[LegacyPageRecord],
    ) -> Result<(), IndexingError> {
        let lock = self.lock_for(document_key);
        let _guard = lock.lock().await;

        let previous = self.get(document_key);
        let mut next = previous
            .clone()
            .unwrap_or_else(|| DocumentIndex::new(0, document_key));
        let mut added = 0;
        for record in records {
            if next.insert_page(record.to_entry()) {
                added += 1;
            }
        }
        if let Some(created) = records.iter().map(|r| r.created_at).min() {
            next.created_at = next.created_at.min(created);
        }

        if added == 0 {
            if let Some(previous) = previous {
                // Nothing new for an existing document; only the legacy set changes
                let docs = self.docs();
                let all: Vec<DocumentIndex> = docs.values().cloned().collect();
                self.metadata.commit_migration_step(&all, remaining_legacy)?;
                debug!(document_key, id = previous.id, "Legacy group already covered");
                return Ok(());
            }
        }

        next.touch();
        let embedding = self.embed_with_retry(&combined_text(&next.pages)).await?;
        self.install(previous, next, &embedding, false, |docs| {
            self.metadata.commit_migration_step(docs, remaining_legacy)
        })?;
        Ok(())
    }

    /// Re-embed every document whose vector is missing from the vector index.
    ///
    /// Failures are isolated per document.
    pub async fn repair_missing_vectors(&self) -> RepairReport {
        let mut report = RepairReport::default();
        let missing: Vec<DocumentIndex> = self
            .documents()
            .into_iter()
            .filter(|d| {
                let present = self.vectors.contains(d.id);
                if present {
                    report.checked += 1;
                }
                !present
            })
            .collect();

        if missing.is_empty() {
            return report;
        }
        warn!(count = missing.len(), "Documents missing their vector");

        for doc in missing {
            let lock = self.lock_for(&doc.document_key);
            let _guard = lock.lock().await;

            // Re-read under the lock; the record may have changed meanwhile
            let Some(current) = self.get(&doc.document_key) else {
                continue;
            };
            if self.vectors.contains(current.id) {
                report.checked += 1;
                continue;
            }

            let result = async {
                let embedding = self.embed_with_retry(&combined_text(&current.pages)).await?;
                self.vectors.upsert(current.id, &embedding)?;
                Ok::<(), IndexingError>(())
            }
            .await;

            match result {
                Ok(()) => {
                    report.repaired += 1;
                    debug!(document_key = %current.document_key, vector_id = current.id, "Repaired vector");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(document_key = %current.document_key, error = %e, "Failed to repair vector");
                }
            }
        }

        self.save_vectors();
        info!(
            repaired = report.repaired,
            failed = report.failed,
            "Vector repair complete"
        );
        report
    }

    /// Documents nearest to `query`, in vector rank order.
    ///
    /// Vector ids without a document record are skipped.
    pub fn nearest_documents(
        &self,
        query: &Embedding,
        k: usize,
    ) -> Result<Vec<DocumentIndex>, IndexingError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let hits = self.vectors.search(query, k)?;

        let docs = self.docs();
        let by_id: HashMap<u64, &DocumentIndex> = docs.values().map(|d| (d.id, d)).collect();
        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            match by_id.get(&hit.vector_id) {
                Some(doc) => out.push((*doc).clone()),
                None => debug!(vector_id = hit.vector_id, "Skipping vector without document"),
            }
        }
        Ok(out)
    }

    /// Persist the vector index, logging instead of failing.
    pub fn save_vectors(&self) {
        if let Err(e) = self.vectors.save() {
            warn!(error = %e, "Failed to save vector index");
        }
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Embedding, IndexingError> {
        Ok(self
            .retry
            .run("embed document", || self.embedder.embed(text))
            .await?)
    }

    /// Install `next` with its embedding, replacing `previous`.
    ///
    /// `allow_in_place` lets a capable backend keep the previous id; callers
    /// whose `persist` touches more than the document set pass `false`.
    fn install<P>(
        &self,
        previous: Option<DocumentIndex>,
        mut next: DocumentIndex,
        embedding: &Embedding,
        allow_in_place: bool,
        persist: P,
    ) -> Result<DocumentIndex, IndexingError>
    where
        P: FnOnce(&[DocumentIndex]) -> Result<(), StorageError>,
    {
        let key = next.document_key.clone();
        let in_place = allow_in_place && self.vectors.supports_in_place_update();

        match previous {
            Some(previous) if in_place => {
                next.id = previous.id;

                let mut docs = self.docs();
                let before: Vec<DocumentIndex> = docs.values().cloned().collect();
                let mut staged = docs.clone();
                staged.insert(key.clone(), next.clone());
                let all: Vec<DocumentIndex> = staged.values().cloned().collect();
                persist(&all)?;

                if let Err(e) = self.vectors.upsert(next.id, embedding) {
                    if let Err(restore) = self.metadata.replace_documents(&before) {
                        warn!(document_key = %key, error = %restore, "Failed to restore document records");
                    }
                    return Err(e.into());
                }
                *docs = staged;
                debug!(document_key = %key, vector_id = next.id, "Updated vector in place");
            }
            previous => {
                next.id = self.mint_id();
                self.vectors.upsert(next.id, embedding)?;

                let persisted = {
                    let mut docs = self.docs();
                    let mut staged = docs.clone();
                    staged.insert(key.clone(), next.clone());
                    let all: Vec<DocumentIndex> = staged.values().cloned().collect();
                    persist(&all).map(|()| *docs = staged)
                };
                if let Err(e) = persisted {
                    if let Err(rollback) = self.vectors.delete(next.id) {
                        warn!(vector_id = next.id, error = %rollback, "Failed to roll back vector");
                    }
                    return Err(e.into());
                }

                if let Some(previous) = previous {
                    if let Err(e) = self.vectors.delete(previous.id) {
                        warn!(vector_id = previous.id, error = %e, "Failed to delete replaced vector");
                    }
                }
                debug!(document_key = %key, vector_id = next.id, "Inserted vector");
            }
        }

        self.save_vectors();
        Ok(next)
    }

    /// Drop a document record, then its vector.
    fn delete_document(&self, previous: &DocumentIndex) -> Result<(), IndexingError> {
        {
            let mut docs = self.docs();
            let mut staged = docs.clone();
            staged.remove(&previous.document_key);
            let all: Vec<DocumentIndex> = staged.values().cloned().collect();
            self.metadata.replace_documents(&all)?;
            *docs = staged;
        }

        if let Err(e) = self.vectors.delete(previous.id) {
            warn!(vector_id = previous.id, error = %e, "Failed to delete document vector");
        }
        self.save_vectors();
        info!(document_key = %previous.document_key, "Deleted document index");
        Ok(())
    }
}
