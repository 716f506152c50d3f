//! Error types for the service layer.

use pagemark_indexing::IndexingError;
use pagemark_scheduler::{JobError, SchedulerError};
use pagemark_storage::StorageError;
use pagemark_summarizer::SummarizerError;
use pagemark_types::PageKey;
use thiserror::Error;

/// Errors that can occur in service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Startup has not completed
    #[error("Index not initialized")]
    NotInitialized,

    /// The operation observed cancellation before a network call
    #[error("Cancelled")]
    Cancelled,

    /// The text source could not produce text for the page
    #[error("Page text unavailable for {key}: {reason}")]
    PageTextUnavailable { key: PageKey, reason: String },

    #[error("Summarizer error: {0}")]
    Summarizer(#[from] SummarizerError),

    #[error("Indexing error: {0}")]
    Indexing(#[from] IndexingError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ServiceError {
    /// Whether a later attempt may succeed (provider throttled or unreachable).
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Summarizer(e) => matches!(
                e,
                SummarizerError::RateLimited { .. } | SummarizerError::Unavailable(_)
            ),
            ServiceError::Indexing(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<ServiceError> for JobError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Cancelled => JobError::Cancelled,
            e if e.is_transient() => JobError::Transient(e.to_string()),
            e => JobError::Permanent(e.to_string()),
        }
    }
}
