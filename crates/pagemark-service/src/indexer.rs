//! Single-page indexing pipeline: text, summary, document index.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use pagemark_indexing::{DocumentIndexStore, IndexingError, RetryPolicy};
use pagemark_scheduler::{IndexJob, JobError};
use pagemark_summarizer::{SummarizerError, SummaryClient};
use pagemark_types::{PageIndexEntry, PageKey};

use crate::error::ServiceError;
use crate::sources::{BookmarkSource, PageTextSource};

/// Runs the indexing pipeline for one page.
///
/// Used directly for interactive indexing and by the scheduler as its
/// [`IndexJob`]. Cancellation is checked before every network call.
pub struct PageIndexer {
    store: Arc<DocumentIndexStore>,
    summarizer: Arc<dyn SummaryClient>,
    texts: Arc<dyn PageTextSource>,
    bookmarks: Arc<dyn BookmarkSource>,
}

impl PageIndexer {
    pub fn new(
        store: Arc<DocumentIndexStore>,
        summarizer: Arc<dyn SummaryClient>,
        texts: Arc<dyn PageTextSource>,
        bookmarks: Arc<dyn BookmarkSource>,
    ) -> Self {
        Self {
            store,
            summarizer,
            texts,
            bookmarks,
        }
    }

    /// Recover text and summarize one page into an index entry.
    ///
    /// `retry` governs rate-limit retries of the summary call.
    pub async fn summarize_page(
        &self,
        key: &PageKey,
        retry: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<PageIndexEntry, ServiceError> {
        check(cancel)?;
        let text = self
            .texts
            .page_text(key)
            .await
            .map_err(|e| ServiceError::PageTextUnavailable {
                key: key.clone(),
                reason: e.to_string(),
            })?;
        if text.trim().is_empty() {
            return Err(ServiceError::PageTextUnavailable {
                key: key.clone(),
                reason: "page has no text".to_string(),
            });
        }
        let highlights = self.texts.highlight_excerpts(key).await;

        check(cancel)?;
        let (text, excerpts) = (text.as_str(), highlights.as_deref());
        let summary = retry
            .run("summarize page", || self.summarizer.summarize(text, excerpts))
            .await?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(SummarizerError::EmptyResponse.into());
        }

        debug!(page = %key, summary_len = summary.len(), "Summarized page");
        Ok(PageIndexEntry::new(key.page_index, summary)
            .with_excerpts(highlights.unwrap_or_default()))
    }

    /// Index one page without retry. Returns `false` if it was already indexed.
    pub async fn index_page(
        &self,
        key: &PageKey,
        cancel: &CancellationToken,
    ) -> Result<bool, ServiceError> {
        self.index_page_while(key, cancel, || !cancel.is_cancelled())
            .await
    }

    /// Index one page, committing only while `still_wanted` holds once the
    /// document embedding is back.
    async fn index_page_while<F>(
        &self,
        key: &PageKey,
        cancel: &CancellationToken,
        still_wanted: F,
    ) -> Result<bool, ServiceError>
    where
        F: Fn() -> bool + Send + Sync,
    {
        let entry = self.summarize_page(key, &RetryPolicy::none(), cancel).await?;

        check(cancel)?;
        self.store
            .add_page_if(
                &key.document_key,
                key.page_index,
                &entry.summary,
                entry.highlight_excerpts,
                still_wanted,
            )
            .await
            .map_err(|e| match e {
                IndexingError::Cancelled => ServiceError::Cancelled,
                e => e.into(),
            })
    }
}

fn check(cancel: &CancellationToken) -> Result<(), ServiceError> {
    if cancel.is_cancelled() {
        Err(ServiceError::Cancelled)
    } else {
        Ok(())
    }
}

#[async_trait]
impl IndexJob for PageIndexer {
    fn is_bookmarked(&self, key: &PageKey) -> bool {
        self.bookmarks.is_bookmarked(key)
    }

    fn is_indexed(&self, key: &PageKey) -> bool {
        self.store.is_indexed(&key.document_key, key.page_index)
    }

    async fn run(&self, key: &PageKey, cancel: &CancellationToken) -> Result<(), JobError> {
        // A removal during the run either cancels the token or unbookmarks the page
        self.index_page_while(key, cancel, || {
            !cancel.is_cancelled() && self.bookmarks.is_bookmarked(key)
        })
        .await?;
        Ok(())
    }
}
