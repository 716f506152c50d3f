//! End-to-end test infrastructure for pagemark.
//!
//! Provides a shared [`TestHarness`] wiring a real RocksDB store and an exact
//! in-memory vector index to deterministic offline providers, plus helpers
//! for seeding the legacy flat layout.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use pagemark_embeddings::{Embedding, EmbeddingClient, EmbeddingError, HashEmbedder};
use pagemark_service::{Collaborators, MemoryBookmarks, MemoryTextSource, SemanticIndex};
use pagemark_storage::Storage;
use pagemark_summarizer::{MockSummarizer, SummarizerError, SummaryClient};
use pagemark_types::{LegacyPageRecord, PageKey, Settings};
use pagemark_vector::{FlatIndex, VectorIndex};

pub const DIM: usize = 128;

/// Keyword-hash embedder with call counting and an outage switch.
///
/// Words about optimization share one concept token, so a query for
/// "optimization algorithm" matches a page about gradient descent.
pub struct StubEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
    down: AtomicBool,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashEmbedder::new(DIM).with_concept(
                "optimization",
                &[
                    "optimization",
                    "optimize",
                    "algorithm",
                    "gradient",
                    "descent",
                    "minimize",
                ],
            ),
            calls: AtomicUsize::new(0),
            down: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every following call fail with `Unavailable` until cleared.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

impl Default for StubEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingClient for StubEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Unavailable("stub outage".to_string()));
        }
        self.inner.embed(text).await
    }
}

/// Mock summarizer that counts calls.
#[derive(Default)]
pub struct CountingSummarizer {
    inner: MockSummarizer,
    calls: AtomicUsize,
}

impl CountingSummarizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummaryClient for CountingSummarizer {
    async fn summarize(
        &self,
        raw_text: &str,
        highlight_excerpts: Option<&[String]>,
    ) -> Result<String, SummarizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.summarize(raw_text, highlight_excerpts).await
    }
}

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: TempDir,
    pub storage: Arc<Storage>,
    pub vectors: Arc<FlatIndex>,
    pub embedder: Arc<StubEmbedder>,
    pub summarizer: Arc<CountingSummarizer>,
    pub bookmarks: Arc<MemoryBookmarks>,
    pub texts: Arc<MemoryTextSource>,
    pub settings: Settings,
    pub index: SemanticIndex,
}

impl TestHarness {
    /// Harness over an append-only vector index (every rebuild mints a new id).
    pub fn new() -> Self {
        Self::with_vectors(FlatIndex::new(DIM).append_only())
    }

    pub fn with_vectors(vectors: FlatIndex) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage =
            Arc::new(Storage::open(temp_dir.path()).expect("Failed to open test storage"));

        let mut settings = Settings::default();
        settings.retry.throttle_ms = 0;
        settings.retry.default_backoff_secs = 0;

        let vectors = Arc::new(vectors);
        let embedder = Arc::new(StubEmbedder::new());
        let summarizer = Arc::new(CountingSummarizer::default());
        let bookmarks = Arc::new(MemoryBookmarks::new());
        let texts = Arc::new(MemoryTextSource::new());

        let index = build_index(
            &storage, &vectors, &embedder, &summarizer, &bookmarks, &texts, &settings,
        );

        Self {
            _temp_dir: temp_dir,
            storage,
            vectors,
            embedder,
            summarizer,
            bookmarks,
            texts,
            settings,
            index,
        }
    }

    /// Simulate a process restart: stop the current service and build a new
    /// one over the same storage, vectors and collaborators.
    pub async fn restart(&mut self) {
        self.index.shutdown().await;
        self.index = build_index(
            &self.storage,
            &self.vectors,
            &self.embedder,
            &self.summarizer,
            &self.bookmarks,
            &self.texts,
            &self.settings,
        );
    }

    /// Bookmark a page and give it text, without scheduling anything.
    pub fn bookmark(&self, doc: &str, page: u32, text: &str) {
        let key = PageKey::new(doc, page);
        self.bookmarks.add(key.clone());
        self.texts.insert(key, text);
    }

    /// Seed the legacy flat layout: one record and one vector per page.
    pub async fn seed_legacy(&self, records: &[LegacyPageRecord]) {
        for record in records {
            self.storage
                .put_legacy_page(record)
                .expect("Failed to put legacy page");
            let embedding = self
                .embedder
                .inner
                .embed(&record.summary)
                .await
                .expect("Failed to embed legacy page");
            self.vectors
                .upsert(record.vector_id, &embedding)
                .expect("Failed to insert legacy vector");
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn build_index(
    storage: &Arc<Storage>,
    vectors: &Arc<FlatIndex>,
    embedder: &Arc<StubEmbedder>,
    summarizer: &Arc<CountingSummarizer>,
    bookmarks: &Arc<MemoryBookmarks>,
    texts: &Arc<MemoryTextSource>,
    settings: &Settings,
) -> SemanticIndex {
    SemanticIndex::new(
        Collaborators {
            metadata: storage.clone(),
            vectors: vectors.clone(),
            embedder: embedder.clone(),
            summarizer: summarizer.clone(),
            bookmarks: bookmarks.clone(),
            texts: texts.clone(),
        },
        settings,
    )
    .expect("Failed to build semantic index")
}

/// A legacy per-page record with a fixed creation time.
pub fn legacy_record(vector_id: u64, doc: &str, page: u32, summary: &str) -> LegacyPageRecord {
    LegacyPageRecord {
        vector_id,
        document_key: doc.to_string(),
        page_index: page,
        summary: summary.to_string(),
        highlight_excerpts: None,
        created_at: Utc
            .timestamp_millis_opt(1_706_540_400_000 + i64::from(page) * 1000)
            .single()
            .unwrap_or_else(Utc::now),
    }
}
