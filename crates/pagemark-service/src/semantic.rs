//! The composed semantic index service.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pagemark_embeddings::EmbeddingClient;
use pagemark_indexing::{
    DocumentIndexStore, MigrationReport, RepairReport, RetryPolicy, SchemaMigrator,
};
use pagemark_scheduler::{PendingTaskScheduler, ReconcileReport};
use pagemark_search::{SearchCoordinator, SearchError};
use pagemark_storage::MetadataStore;
use pagemark_summarizer::SummaryClient;
use pagemark_types::{PageKey, SchemaVersion, SearchHit, Settings};
use pagemark_vector::VectorIndex;

use crate::error::ServiceError;
use crate::indexer::PageIndexer;
use crate::sources::{BookmarkSource, PageTextSource};

/// Everything the host injects.
#[derive(Clone)]
pub struct Collaborators {
    pub metadata: Arc<dyn MetadataStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub summarizer: Arc<dyn SummaryClient>,
    pub bookmarks: Arc<dyn BookmarkSource>,
    pub texts: Arc<dyn PageTextSource>,
}

/// Result of [`SemanticIndex::initialize`] and [`SemanticIndex::start`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub migration: MigrationReport,
    pub repair: RepairReport,
    /// Only set by `start`
    pub reconcile: Option<ReconcileReport>,
}

/// Result of [`SemanticIndex::reindex_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexReport {
    /// Documents rebuilt
    pub documents: usize,
    /// Pages freshly summarized into a rebuilt document
    pub pages_indexed: usize,
    /// Pages whose summary or document rebuild failed
    pub pages_failed: usize,
    /// Documents dropped because none of their pages are bookmarked
    pub documents_removed: usize,
}

/// Point-in-time view of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStatus {
    pub initialized: bool,
    pub schema_version: Option<SchemaVersion>,
    pub documents: usize,
    pub pages: usize,
    pub vectors: usize,
    /// On-disk size of the vector index, 0 if it was never saved
    pub vector_index_bytes: u64,
    pub pending_tasks: usize,
    pub bookmarks: usize,
}

/// Semantic bookmark index.
///
/// Constructed once by the host. Searches are refused until
/// [`initialize`](Self::initialize) has run the schema migration and the
/// vector repair pass.
pub struct SemanticIndex {
    metadata: Arc<dyn MetadataStore>,
    bookmarks: Arc<dyn BookmarkSource>,
    store: Arc<DocumentIndexStore>,
    indexer: Arc<PageIndexer>,
    scheduler: PendingTaskScheduler,
    search: SearchCoordinator,
    migrator: SchemaMigrator,
    index_delay: Duration,
    throttle: Duration,
    initialized: AtomicBool,
    shutdown: CancellationToken,
}

impl SemanticIndex {
    pub fn new(collaborators: Collaborators, settings: &Settings) -> Result<Self, ServiceError> {
        let Collaborators {
            metadata,
            vectors,
            embedder,
            summarizer,
            bookmarks,
            texts,
        } = collaborators;

        let store = Arc::new(
            DocumentIndexStore::open(metadata.clone(), vectors, embedder.clone())?
                .with_retry_policy(RetryPolicy::from_settings(&settings.retry)),
        );
        let indexer = Arc::new(PageIndexer::new(
            store.clone(),
            summarizer,
            texts,
            bookmarks.clone(),
        ));
        let scheduler = PendingTaskScheduler::new(metadata.clone(), indexer.clone())?;
        let search = SearchCoordinator::new(store.clone(), embedder, settings.search.clone());
        let migrator = SchemaMigrator::new(metadata.clone(), store.clone());

        Ok(Self {
            metadata,
            bookmarks,
            store,
            indexer,
            scheduler,
            search,
            migrator,
            index_delay: settings.scheduler.index_delay(),
            throttle: Duration::from_millis(settings.retry.throttle_ms),
            initialized: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn store(&self) -> &Arc<DocumentIndexStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &PendingTaskScheduler {
        &self.scheduler
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Migrate the legacy layout, repair missing vectors and open for search.
    pub async fn initialize(&self) -> Result<StartupReport, ServiceError> {
        let migration = self.migrator.run().await?;
        let repair = self.store.repair_missing_vectors().await;
        self.initialized.store(true, Ordering::SeqCst);

        info!(
            documents = self.store.document_count(),
            pages = self.store.page_count(),
            "Semantic index initialized"
        );
        Ok(StartupReport {
            migration,
            repair,
            reconcile: None,
        })
    }

    /// [`initialize`](Self::initialize) and then recover persisted pending tasks.
    pub async fn start(&self) -> Result<StartupReport, ServiceError> {
        let mut report = self.initialize().await?;
        report.reconcile = Some(self.scheduler.reconcile_on_startup()?);
        Ok(report)
    }

    /// Schedule delayed indexing of a newly bookmarked page.
    ///
    /// Returns `false` if the page is already indexed.
    pub fn on_bookmark_added(
        &self,
        document_key: &str,
        page_index: u32,
    ) -> Result<bool, ServiceError> {
        self.schedule_indexing(document_key, page_index, self.index_delay)
    }

    /// Like [`on_bookmark_added`](Self::on_bookmark_added) with an explicit delay.
    pub fn schedule_indexing(
        &self,
        document_key: &str,
        page_index: u32,
        delay: Duration,
    ) -> Result<bool, ServiceError> {
        Ok(self
            .scheduler
            .schedule(PageKey::new(document_key, page_index), delay)?)
    }

    /// Cancel pending indexing and drop the page from the index.
    ///
    /// Returns `true` if the page was removed from the index.
    pub async fn on_bookmark_removed(
        &self,
        document_key: &str,
        page_index: u32,
    ) -> Result<bool, ServiceError> {
        let key = PageKey::new(document_key, page_index);
        self.scheduler.cancel(&key)?;
        // Waits on the document lock, so a rebuild already past its last
        // cancellation check either commits first and is undone here, or
        // observes the cancelled token and drops its result
        Ok(self.store.remove_page(document_key, page_index).await?)
    }

    /// Index one page immediately, without retry.
    ///
    /// Any pending task for the page becomes moot and is cancelled.
    pub async fn index_page_now(
        &self,
        document_key: &str,
        page_index: u32,
    ) -> Result<bool, ServiceError> {
        let key = PageKey::new(document_key, page_index);
        let added = self
            .indexer
            .index_page(&key, &self.shutdown.child_token())
            .await?;
        if self.scheduler.has_pending(&key) {
            self.scheduler.cancel(&key)?;
        }
        Ok(added)
    }

    /// Ranked pages for a natural-language query.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, SearchError> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if !self.is_initialized() {
            return Err(SearchError::NotInitialized);
        }

        let hits = self.search.search(query, top_k).await;
        if let Err(e) = &hits {
            warn!(error = %e, cause = ?std::error::Error::source(e), "Search failed");
        }
        hits
    }

    /// Default result count for callers that do not choose one.
    pub fn default_top_k(&self) -> usize {
        self.search.settings().top_k
    }

    /// Rebuild every document from the current bookmarks.
    ///
    /// Summaries and document embeddings use the retry policy; page summaries
    /// are throttled. A page whose summary fails keeps its previous entry if
    /// it had one. Failures are isolated per page and per document.
    pub async fn reindex_all(&self) -> Result<ReindexReport, ServiceError> {
        let mut groups: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for key in self.bookmarks.bookmarks() {
            groups.entry(key.document_key).or_default().push(key.page_index);
        }
        info!(documents = groups.len(), "Starting full reindex");

        let retry = self.store.retry_policy().clone();
        let cancel = self.shutdown.child_token();
        let mut report = ReindexReport::default();
        let mut first = true;

        for (document_key, mut pages) in groups.clone() {
            pages.sort_unstable();
            pages.dedup();
            let previous = self.store.get(&document_key);

            let mut entries = Vec::with_capacity(pages.len());
            let mut fresh = 0;
            let mut failed = 0;
            for page_index in pages {
                if !first && !self.throttle.is_zero() {
                    tokio::time::sleep(self.throttle).await;
                }
                first = false;

                let key = PageKey::new(document_key.clone(), page_index);
                match self.indexer.summarize_page(&key, &retry, &cancel).await {
                    Ok(entry) => {
                        entries.push(entry);
                        fresh += 1;
                    }
                    Err(ServiceError::Cancelled) => return Err(ServiceError::Cancelled),
                    Err(e) => {
                        warn!(page = %key, error = %e, "Page not reindexed");
                        failed += 1;
                        if let Some(old) = previous.as_ref().and_then(|d| d.page(page_index)) {
                            entries.push(old.clone());
                        }
                    }
                }
            }

            if entries.is_empty() {
                if previous.is_some() {
                    self.store.replace_document(&document_key, Vec::new()).await?;
                    report.documents_removed += 1;
                }
                report.pages_failed += failed;
                continue;
            }

            let kept = entries.len() - fresh;
            match self.store.replace_document(&document_key, entries).await {
                Ok(_) => {
                    report.documents += 1;
                    report.pages_indexed += fresh;
                    report.pages_failed += failed;
                    debug!(document_key = %document_key, fresh, kept, "Document reindexed");
                }
                Err(e) => {
                    warn!(document_key = %document_key, error = %e, "Document not reindexed");
                    report.pages_failed += fresh + failed;
                }
            }
        }

        for doc in self.store.documents() {
            if groups.contains_key(&doc.document_key) {
                continue;
            }
            match self.store.replace_document(&doc.document_key, Vec::new()).await {
                Ok(_) => report.documents_removed += 1,
                Err(e) => warn!(document_key = %doc.document_key, error = %e, "Stale document not removed"),
            }
        }

        info!(
            documents = report.documents,
            pages_indexed = report.pages_indexed,
            pages_failed = report.pages_failed,
            documents_removed = report.documents_removed,
            "Full reindex complete"
        );
        Ok(report)
    }

    pub fn status(&self) -> Result<IndexStatus, ServiceError> {
        let vectors = self.store.vectors().stats();
        Ok(IndexStatus {
            initialized: self.is_initialized(),
            schema_version: self.metadata.schema_version()?,
            documents: self.store.document_count(),
            pages: self.store.page_count(),
            vectors: vectors.vector_count,
            vector_index_bytes: vectors.size_bytes,
            pending_tasks: self.scheduler.pending().len(),
            bookmarks: self.bookmarks.bookmarks().len(),
        })
    }

    /// Stop timers and in-flight batch work, then persist the vector index.
    ///
    /// Persisted pending tasks are kept for the next startup.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.scheduler.shutdown().await;
        self.store.save_vectors();
        info!("Semantic index shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{MemoryBookmarks, MemoryTextSource};
    use async_trait::async_trait;
    use pagemark_embeddings::{Embedding, EmbeddingError, HashEmbedder};
    use tokio::sync::{Notify, Semaphore};
    use pagemark_storage::Storage;
    use pagemark_summarizer::MockSummarizer;
    use pagemark_vector::FlatIndex;
    use tempfile::TempDir;

    struct Setup {
        index: SemanticIndex,
        storage: Arc<Storage>,
        bookmarks: Arc<MemoryBookmarks>,
        texts: Arc<MemoryTextSource>,
        _temp: TempDir,
    }

    /// Hash embedder that can hold calls until released.
    struct GatedEmbedder {
        inner: HashEmbedder,
        gated: AtomicBool,
        entered: Notify,
        release: Semaphore,
    }

    impl GatedEmbedder {
        fn new() -> Self {
            Self {
                inner: HashEmbedder::new(128),
                gated: AtomicBool::new(false),
                entered: Notify::new(),
                release: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingClient for GatedEmbedder {
        fn dimension(&self) -> usize {
            128
        }

        async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
            if self.gated.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.acquire().await.unwrap().forget();
            }
            self.inner.embed(text).await
        }
    }

    fn setup() -> Setup {
        setup_with_embedder(Arc::new(HashEmbedder::new(128)))
    }

    fn setup_with_embedder(embedder: Arc<dyn EmbeddingClient>) -> Setup {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let bookmarks = Arc::new(MemoryBookmarks::new());
        let texts = Arc::new(MemoryTextSource::new());

        let mut settings = Settings::default();
        settings.retry.throttle_ms = 0;
        settings.retry.default_backoff_secs = 0;

        let index = SemanticIndex::new(
            Collaborators {
                metadata: storage.clone(),
                vectors: Arc::new(FlatIndex::new(128)),
                embedder,
                summarizer: Arc::new(MockSummarizer::new()),
                bookmarks: bookmarks.clone(),
                texts: texts.clone(),
            },
            &settings,
        )
        .unwrap();

        Setup {
            index,
            storage,
            bookmarks,
            texts,
            _temp: temp,
        }
    }

    impl Setup {
        fn bookmark(&self, doc: &str, page: u32, text: &str) {
            let key = PageKey::new(doc, page);
            self.bookmarks.add(key.clone());
            self.texts.insert(key, text);
        }
    }

    #[tokio::test]
    async fn test_search_requires_initialize() {
        let s = setup();
        let err = s.index.search("anything", 5).await.unwrap_err();
        assert!(matches!(err, SearchError::NotInitialized));
        assert!(s.index.search("  ", 5).await.unwrap().is_empty());

        s.index.initialize().await.unwrap();
        assert!(s.index.search("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_now_then_search() {
        let s = setup();
        s.index.initialize().await.unwrap();
        s.bookmark("paper.pdf", 3, "Stochastic gradient descent converges slowly.");

        assert!(s.index.index_page_now("paper.pdf", 3).await.unwrap());
        let hits = s.index.search("gradient descent", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_key, "paper.pdf");
        assert_eq!(hits[0].page_index, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bookmark_added_indexes_after_delay() {
        let s = setup();
        s.index.start().await.unwrap();
        s.bookmark("paper.pdf", 1, "Convex functions have one minimum.");

        assert!(s.index.on_bookmark_added("paper.pdf", 1).unwrap());
        assert_eq!(s.storage.load_pending_tasks().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(181)).await;
        assert!(s.index.store().is_indexed("paper.pdf", 1));
        assert!(s.storage.load_pending_tasks().unwrap().is_empty());
        assert!(!s.index.on_bookmark_added("paper.pdf", 1).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bookmark_removed_cancels_and_unindexes() {
        let s = setup();
        s.index.start().await.unwrap();
        s.bookmark("book.pdf", 5, "Chapter five opens at sea.");
        s.bookmark("book.pdf", 6, "The storm arrives.");

        s.index.index_page_now("book.pdf", 6).await.unwrap();
        s.index.on_bookmark_added("book.pdf", 5).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        s.bookmarks.remove(&PageKey::new("book.pdf", 5));
        assert!(!s.index.on_bookmark_removed("book.pdf", 5).await.unwrap());
        s.bookmarks.remove(&PageKey::new("book.pdf", 6));
        assert!(s.index.on_bookmark_removed("book.pdf", 6).await.unwrap());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(s.index.store().get("book.pdf").is_none());
        assert!(s.index.scheduler().pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_during_rebuild_leaves_page_unindexed() {
        let embedder = Arc::new(GatedEmbedder::new());
        let s = setup_with_embedder(embedder.clone());
        s.index.start().await.unwrap();
        s.bookmark("book.pdf", 5, "Chapter five opens at sea.");

        embedder.gated.store(true, Ordering::SeqCst);
        s.index.on_bookmark_added("book.pdf", 5).unwrap();
        // The job is now inside the document rebuild, past its last token check
        embedder.entered.notified().await;

        s.bookmarks.remove(&PageKey::new("book.pdf", 5));
        let (removed, ()) = tokio::join!(s.index.on_bookmark_removed("book.pdf", 5), async {
            embedder.release.add_permits(1);
        });
        assert!(!removed.unwrap());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(!s.index.store().is_indexed("book.pdf", 5));
        assert!(s.index.store().get("book.pdf").is_none());
        assert_eq!(s.index.store().vectors().len(), 0);
        assert!(s.index.scheduler().pending().is_empty());
        assert!(s.storage.load_pending_tasks().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbookmarked_during_rebuild_is_not_committed() {
        let embedder = Arc::new(GatedEmbedder::new());
        let s = setup_with_embedder(embedder.clone());
        s.index.start().await.unwrap();
        s.bookmark("book.pdf", 2, "The harbour at dawn.");

        embedder.gated.store(true, Ordering::SeqCst);
        s.index.on_bookmark_added("book.pdf", 2).unwrap();
        embedder.entered.notified().await;

        // Bookmark disappears without the removal hook running
        s.bookmarks.remove(&PageKey::new("book.pdf", 2));
        embedder.release.add_permits(1);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(!s.index.store().is_indexed("book.pdf", 2));
        assert_eq!(s.index.store().vectors().len(), 0);
        assert!(s.index.scheduler().pending().is_empty());
        assert!(s.storage.load_pending_tasks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reindex_all_rebuilds_and_drops() {
        let s = setup();
        s.index.initialize().await.unwrap();
        s.bookmark("a.pdf", 0, "Alpha page about kernels.");
        s.bookmark("a.pdf", 2, "Another page about schedulers.");
        s.bookmark("b.pdf", 1, "Beta page about compilers.");
        s.index.index_page_now("a.pdf", 0).await.unwrap();
        s.index.index_page_now("b.pdf", 1).await.unwrap();

        // b.pdf loses its bookmark; a.pdf page 2 has no text any more
        s.bookmarks.remove(&PageKey::new("b.pdf", 1));
        s.texts.remove(&PageKey::new("a.pdf", 2));

        let report = s.index.reindex_all().await.unwrap();
        assert_eq!(
            report,
            ReindexReport {
                documents: 1,
                pages_indexed: 1,
                pages_failed: 1,
                documents_removed: 1,
            }
        );
        let doc = s.index.store().get("a.pdf").unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert!(s.index.store().get("b.pdf").is_none());
    }

    #[tokio::test]
    async fn test_reindex_keeps_previous_entry_on_failure() {
        let s = setup();
        s.index.initialize().await.unwrap();
        s.bookmark("a.pdf", 0, "Original text about caches.");
        s.index.index_page_now("a.pdf", 0).await.unwrap();
        let before = s.index.store().get("a.pdf").unwrap();

        s.texts.remove(&PageKey::new("a.pdf", 0));
        let report = s.index.reindex_all().await.unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.pages_failed, 1);
        assert_eq!(
            s.index.store().get("a.pdf").unwrap().pages,
            before.pages
        );
    }

    #[tokio::test]
    async fn test_status() {
        let s = setup();
        s.index.initialize().await.unwrap();
        s.bookmark("a.pdf", 0, "Some text.");
        s.index.index_page_now("a.pdf", 0).await.unwrap();

        let status = s.index.status().unwrap();
        assert!(status.initialized);
        assert_eq!(status.schema_version, Some(SchemaVersion::CURRENT));
        assert_eq!(status.documents, 1);
        assert_eq!(status.pages, 1);
        assert_eq!(status.vectors, 1);
        assert_eq!(status.vector_index_bytes, 0);
        assert_eq!(status.pending_tasks, 0);
        assert_eq!(status.bookmarks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_keeps_pending_records() {
        let s = setup();
        s.index.start().await.unwrap();
        s.bookmark("a.pdf", 0, "Some text.");
        s.index.on_bookmark_added("a.pdf", 0).unwrap();

        s.index.shutdown().await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(!s.index.store().is_indexed("a.pdf", 0));
        assert_eq!(s.storage.load_pending_tasks().unwrap().len(), 1);
    }
}
