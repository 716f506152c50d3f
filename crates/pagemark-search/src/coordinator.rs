//! Two-phase query pipeline.

use std::cmp::Ordering;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use pagemark_embeddings::{cosine_similarity, EmbeddingClient};
use pagemark_indexing::DocumentIndexStore;
use pagemark_types::{PageIndexEntry, SearchHit, SearchSettings};

use crate::error::SearchError;

/// One page of a coarse candidate document, scored during rerank.
#[derive(Debug, Clone)]
struct Candidate {
    coarse_rank: usize,
    document_key: String,
    page: PageIndexEntry,
    score: f32,
}

/// Coarse document search followed by page-level rerank.
pub struct SearchCoordinator {
    store: Arc<DocumentIndexStore>,
    embedder: Arc<dyn EmbeddingClient>,
    settings: SearchSettings,
}

impl SearchCoordinator {
    pub fn new(
        store: Arc<DocumentIndexStore>,
        embedder: Arc<dyn EmbeddingClient>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            settings,
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Return the `top_k` best pages for `query`.
    ///
    /// A blank query or `top_k == 0` returns nothing without calling the
    /// embedding provider. A page whose embedding fails is skipped.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, SearchError> {
        let query = query.trim();
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;

        let coarse_k = self.settings.coarse_candidates(top_k);
        let documents = self.store.nearest_documents(&query_embedding, coarse_k)?;
        debug!(coarse_k, found = documents.len(), "Coarse phase complete");
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let candidates: Vec<Candidate> = documents
            .into_iter()
            .enumerate()
            .flat_map(|(coarse_rank, doc)| {
                let document_key = doc.document_key;
                doc.pages.into_iter().map(move |page| Candidate {
                    coarse_rank,
                    document_key: document_key.clone(),
                    page,
                    score: 0.0,
                })
            })
            .collect();

        let embedder = &self.embedder;
        let query_values = &query_embedding.values;
        let mut scored: Vec<Candidate> = stream::iter(candidates)
            .map(|mut candidate| async move {
                match embedder.embed(&candidate.page.representation()).await {
                    Ok(page_embedding) => {
                        candidate.score = cosine_similarity(query_values, &page_embedding.values);
                        Some(candidate)
                    }
                    Err(e) => {
                        warn!(
                            document_key = %candidate.document_key,
                            page_index = candidate.page.page_index,
                            error = %e,
                            "Skipping page in rerank"
                        );
                        None
                    }
                }
            })
            .buffered(self.settings.rerank_concurrency.max(1))
            .filter_map(|c| async move { c })
            .collect()
            .await;

        scored.sort_by(rank_order);
        scored.truncate(top_k);
        debug!(results = scored.len(), "Rerank complete");

        Ok(scored
            .into_iter()
            .map(|c| SearchHit {
                document_key: c.document_key,
                page_index: c.page.page_index,
                highlight_excerpts: c.page.excerpts().to_vec(),
                summary: c.page.summary,
                score: c.score,
            })
            .collect())
    }
}

/// Score descending, then coarse rank ascending, then page index ascending.
fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.coarse_rank.cmp(&b.coarse_rank))
        .then_with(|| a.page.page_index.cmp(&b.page.page_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pagemark_embeddings::{Embedding, EmbeddingError, HashEmbedder};
    use pagemark_storage::Storage;
    use pagemark_vector::FlatIndex;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use tempfile::TempDir;

    const DIM: usize = 128;

    /// Hash embedder that, once armed, fails on texts containing "unreachable".
    struct SelectiveEmbedder {
        inner: HashEmbedder,
        armed: AtomicBool,
    }

    #[async_trait]
    impl EmbeddingClient for SelectiveEmbedder {
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
            if self.armed.load(AtomicOrdering::SeqCst) && text.contains("unreachable") {
                return Err(EmbeddingError::Unavailable("injected".to_string()));
            }
            self.inner.embed(text).await
        }
    }

    struct Setup {
        store: Arc<DocumentIndexStore>,
        embedder: Arc<SelectiveEmbedder>,
        _temp: TempDir,
    }

    impl Setup {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let storage = Arc::new(Storage::open(temp.path()).unwrap());
            let embedder = Arc::new(SelectiveEmbedder {
                inner: HashEmbedder::new(DIM).with_concept(
                    "optimization",
                    &["optimization", "algorithm", "gradient", "descent"],
                ),
                armed: AtomicBool::new(false),
            });
            let store = DocumentIndexStore::open(
                storage,
                Arc::new(FlatIndex::new(DIM).append_only()),
                embedder.clone(),
            )
            .unwrap();
            Self {
                store: Arc::new(store),
                embedder,
                _temp: temp,
            }
        }

        fn coordinator(&self) -> SearchCoordinator {
            SearchCoordinator::new(
                self.store.clone(),
                self.embedder.clone(),
                SearchSettings::default(),
            )
        }
    }

    #[tokio::test]
    async fn test_finds_page_by_related_concept() {
        let setup = Setup::new();
        setup
            .store
            .add_page("paper.pdf", 3, "discusses gradient descent", None)
            .await
            .unwrap();
        setup
            .store
            .add_page("cookbook.pdf", 10, "braising short ribs", None)
            .await
            .unwrap();

        let hits = setup
            .coordinator()
            .search("optimization algorithm", 5)
            .await
            .unwrap();
        assert_eq!(hits[0].document_key, "paper.pdf");
        assert_eq!(hits[0].page_index, 3);
        assert!(hits[0].score > 0.0);
    }

    #[tokio::test]
    async fn test_blank_query_and_zero_k_skip_embedding() {
        let setup = Setup::new();
        setup.store.add_page("a.pdf", 0, "text", None).await.unwrap();
        let before = setup.embedder.inner.call_count();

        let coordinator = setup.coordinator();
        assert!(coordinator.search("   ", 5).await.unwrap().is_empty());
        assert!(coordinator.search("text", 0).await.unwrap().is_empty());
        assert_eq!(setup.embedder.inner.call_count(), before);
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let setup = Setup::new();
        let hits = setup.coordinator().search("anything", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    fn candidate(coarse_rank: usize, document_key: &str, page_index: u32, score: f32) -> Candidate {
        Candidate {
            coarse_rank,
            document_key: document_key.to_string(),
            page: PageIndexEntry::new(page_index, "summary"),
            score,
        }
    }

    #[test]
    fn test_rank_order_prefers_earlier_coarse_rank_on_tie() {
        let mut candidates = vec![
            candidate(1, "b.pdf", 0, 0.5),
            candidate(0, "a.pdf", 9, 0.5),
            candidate(2, "c.pdf", 3, 0.9),
            candidate(0, "a.pdf", 2, 0.5),
            candidate(1, "b.pdf", 1, 0.1),
        ];
        candidates.sort_by(rank_order);

        let order: Vec<(&str, u32)> = candidates
            .iter()
            .map(|c| (c.document_key.as_str(), c.page.page_index))
            .collect();
        assert_eq!(
            order,
            vec![
                ("c.pdf", 3),
                ("a.pdf", 2),
                ("a.pdf", 9),
                ("b.pdf", 0),
                ("b.pdf", 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_ties_break_by_coarse_rank_then_page() {
        let setup = Setup::new();
        for page in [4, 1, 2] {
            setup
                .store
                .add_page("a.pdf", page, "gradient descent", None)
                .await
                .unwrap();
        }

        let hits = setup.coordinator().search("gradient", 5).await.unwrap();
        let pages: Vec<u32> = hits.iter().map(|h| h.page_index).collect();
        assert_eq!(pages, vec![1, 2, 4]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_failed_page_embedding_is_skipped() {
        let setup = Setup::new();
        setup
            .store
            .add_page("a.pdf", 0, "gradient descent", None)
            .await
            .unwrap();
        setup
            .store
            .add_page(
                "a.pdf",
                1,
                "gradient methods",
                Some(vec!["unreachable host".to_string()]),
            )
            .await
            .unwrap();
        setup.embedder.armed.store(true, AtomicOrdering::SeqCst);

        let hits = setup.coordinator().search("gradient", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].page_index, 0);
    }

    #[tokio::test]
    async fn test_query_embedding_failure_is_unavailable() {
        let setup = Setup::new();
        setup.embedder.armed.store(true, AtomicOrdering::SeqCst);
        let err = setup
            .coordinator()
            .search("unreachable", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Unavailable { .. }));
        assert_eq!(err.to_string(), "search unavailable");
    }

    #[tokio::test]
    async fn test_respects_top_k() {
        let setup = Setup::new();
        for page in 0..8 {
            setup
                .store
                .add_page("a.pdf", page, &format!("gradient topic {page}"), None)
                .await
                .unwrap();
        }
        let hits = setup.coordinator().search("gradient", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }
}
