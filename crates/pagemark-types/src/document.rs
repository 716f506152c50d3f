//! Aggregated per-document index record.
//!
//! One `DocumentIndex` covers every bookmarked page of a document and maps
//! to exactly one vector in the vector index (keyed by `id`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::page::PageIndexEntry;

/// Aggregate index entry for one document.
///
/// Invariant: `pages` is strictly ascending by `page_index`. The mutators on
/// this type preserve it; deserialized records are normalized by [`DocumentIndex::normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentIndex {
    /// Vector-store key of the aggregate embedding
    pub id: u64,

    /// Stable document identity
    pub document_key: String,

    /// Bookmarked pages, ascending by page index
    pub pages: Vec<PageIndexEntry>,

    /// When the first page of this document was indexed
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// When the page set last changed
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl DocumentIndex {
    /// Create an empty record for a document.
    pub fn new(id: u64, document_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            document_key: document_key.into(),
            pages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a page with this index is present.
    pub fn contains_page(&self, page_index: u32) -> bool {
        self.position(page_index).is_ok()
    }

    /// Look up one page.
    pub fn page(&self, page_index: u32) -> Option<&PageIndexEntry> {
        self.position(page_index).ok().map(|i| &self.pages[i])
    }

    /// Insert a page at its sorted position.
    ///
    /// Returns `false` (and leaves the record untouched) if the page is already present.
    pub fn insert_page(&mut self, entry: PageIndexEntry) -> bool {
        match self.position(entry.page_index) {
            Ok(_) => false,
            Err(at) => {
                self.pages.insert(at, entry);
                true
            }
        }
    }

    /// Remove a page. Returns the removed entry if it was present.
    pub fn remove_page(&mut self, page_index: u32) -> Option<PageIndexEntry> {
        self.position(page_index)
            .ok()
            .map(|at| self.pages.remove(at))
    }

    /// Sort pages and drop duplicate page indexes (first occurrence wins).
    pub fn normalize(&mut self) {
        self.pages.sort_by_key(|p| p.page_index);
        self.pages.dedup_by_key(|p| p.page_index);
    }

    /// Mark the record as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let mut doc: Self = serde_json::from_slice(bytes)?;
        doc.normalize();
        Ok(doc)
    }

    fn position(&self, page_index: u32) -> Result<usize, usize> {
        self.pages
            .binary_search_by_key(&page_index, |p| p.page_index)
    }
}
