//! Pending indexing task record.
//!
//! Written when a bookmark is added and removed once the page has been
//! indexed (or the task became moot). The persisted set of these records
//! is the only thing that survives a restart of the scheduler.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::page::PageKey;

/// A scheduled-but-not-yet-executed indexing job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingIndexTask {
    /// Document of the bookmarked page
    pub document_key: String,

    /// Zero-based page index
    pub page_index: u32,

    /// When the task was scheduled
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub scheduled_at: DateTime<Utc>,

    /// When the task becomes due
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub due_at: DateTime<Utc>,

    /// How many times the job fired and failed transiently
    #[serde(default)]
    pub attempts: u32,
}

impl PendingIndexTask {
    /// Create a task scheduled now and due after `delay`.
    pub fn new(key: &PageKey, delay: std::time::Duration) -> Self {
        let now = Utc::now();
        let delay = Duration::from_std(delay).unwrap_or_else(|_| Duration::days(36_500));
        Self {
            document_key: key.document_key.clone(),
            page_index: key.page_index,
            scheduled_at: now,
            due_at: now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC),
            attempts: 0,
        }
    }

    /// The page this task indexes.
    pub fn key(&self) -> PageKey {
        PageKey::new(self.document_key.clone(), self.page_index)
    }

    /// Time left until the task is due, zero if it is already due.
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.due_at - now).to_std().unwrap_or_default()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
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
