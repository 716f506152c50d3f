//! Query surface result type.

use serde::{Deserialize, Serialize};

/// One ranked page returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub document_key: String,
    pub page_index: u32,
    pub summary: String,
    #[serde(default)]
    pub highlight_excerpts: Vec<String>,
    /// Cosine similarity against the query, in [-1, 1]
    pub score: f32,
}
