//! Host collaborators consumed by the service.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use pagemark_storage::Storage;
use pagemark_types::PageKey;

/// Which pages the user has bookmarked.
pub trait BookmarkSource: Send + Sync {
    fn is_bookmarked(&self, key: &PageKey) -> bool;

    /// Every bookmark, ordered by document then page.
    fn bookmarks(&self) -> Vec<PageKey>;
}

/// Failure to recover a page's text.
#[derive(Debug, Error)]
pub enum TextSourceError {
    #[error("Page text unavailable: {0}")]
    Unavailable(String),
}

/// Best-effort page text recovery.
#[async_trait]
pub trait PageTextSource: Send + Sync {
    async fn page_text(&self, key: &PageKey) -> Result<String, TextSourceError>;

    /// Passages the user highlighted on the page.
    async fn highlight_excerpts(&self, _key: &PageKey) -> Option<Vec<String>> {
        None
    }
}

impl BookmarkSource for Storage {
    fn is_bookmarked(&self, key: &PageKey) -> bool {
        Storage::is_bookmarked(self, key).unwrap_or_else(|e| {
            warn!(page = %key, error = %e, "Bookmark lookup failed");
            false
        })
    }

    fn bookmarks(&self) -> Vec<PageKey> {
        self.list_bookmarks().unwrap_or_else(|e| {
            warn!(error = %e, "Bookmark listing failed");
            Vec::new()
        })
    }
}

/// In-memory bookmark set.
#[derive(Debug, Default)]
pub struct MemoryBookmarks {
    keys: RwLock<BTreeSet<PageKey>>,
}

impl MemoryBookmarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, key: PageKey) -> bool {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key)
    }

    pub fn remove(&self, key: &PageKey) -> bool {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }
}

impl BookmarkSource for MemoryBookmarks {
    fn is_bookmarked(&self, key: &PageKey) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    fn bookmarks(&self) -> Vec<PageKey> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
struct PageText {
    text: String,
    highlights: Vec<String>,
}

/// In-memory page text.
#[derive(Debug, Default)]
pub struct MemoryTextSource {
    pages: RwLock<HashMap<PageKey, PageText>>,
}

impl MemoryTextSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: PageKey, text: impl Into<String>) {
        self.insert_with_highlights(key, text, Vec::new());
    }

    pub fn insert_with_highlights(
        &self,
        key: PageKey,
        text: impl Into<String>,
        highlights: Vec<String>,
    ) {
        self.pages.write().unwrap_or_else(PoisonError::into_inner).insert(
            key,
            PageText {
                text: text.into(),
                highlights,
            },
        );
    }

    pub fn remove(&self, key: &PageKey) {
        self.pages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn get(&self, key: &PageKey) -> Option<PageText> {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl PageTextSource for MemoryTextSource {
    async fn page_text(&self, key: &PageKey) -> Result<String, TextSourceError> {
        self.get(key)
            .map(|p| p.text)
            .ok_or_else(|| TextSourceError::Unavailable(format!("no text for {key}")))
    }

    async fn highlight_excerpts(&self, key: &PageKey) -> Option<Vec<String>> {
        self.get(key)
            .map(|p| p.highlights)
            .filter(|h| !h.is_empty())
    }
}
