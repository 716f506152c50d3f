//! Legacy flat per-page index layout.
//!
//! Before documents were aggregated, every bookmarked page had its own vector
//! and its own metadata record. These records are only read by the schema
//! migrator, which folds them into [`crate::DocumentIndex`] records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::page::{PageIndexEntry, PageKey};

/// One record of the legacy "one vector per page" index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyPageRecord {
    /// Vector-store key of the per-page embedding
    pub vector_id: u64,
    pub document_key: String,
    pub page_index: u32,
    pub summary: String,
    #[serde(default)]
    pub highlight_excerpts: Option<Vec<String>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl LegacyPageRecord {
    pub fn key(&self) -> PageKey {
        PageKey::new(self.document_key.clone(), self.page_index)
    }

    /// Convert into the page entry used by the aggregated layout.
    pub fn to_entry(&self) -> PageIndexEntry {
        PageIndexEntry::new(self.page_index, self.summary.clone())
            .with_excerpts(self.highlight_excerpts.clone().unwrap_or_default())
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Explicit on-disk layout version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVersion {
    /// One vector and one metadata record per bookmarked page
    FlatPages,
    /// One vector per document, built from all of its bookmarked pages
    AggregatedDocuments,
}

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion::AggregatedDocuments;

    pub fn as_u32(self) -> u32 {
        match self {
            SchemaVersion::FlatPages => 1,
            SchemaVersion::AggregatedDocuments => 2,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(SchemaVersion::FlatPages),
            2 => Some(SchemaVersion::AggregatedDocuments),
            _ => None,
        }
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaVersion::FlatPages => write!(f, "v1 (flat pages)"),
            SchemaVersion::AggregatedDocuments => write!(f, "v2 (aggregated documents)"),
        }
    }
}
