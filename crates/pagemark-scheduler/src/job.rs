//! The work a pending task performs when it fires.

use async_trait::async_trait;
use pagemark_types::PageKey;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Outcome classification for a failed job.
#[derive(Debug, Error)]
pub enum JobError {
    /// Provider throttled or unreachable; the task is parked for the next startup
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Will not succeed on retry; the task is dropped
    #[error("Permanent failure: {0}")]
    Permanent(String),

    /// Observed cancellation, or the page stopped being wanted mid-run
    #[error("Cancelled")]
    Cancelled,
}

/// Indexing pipeline driven by the scheduler.
///
/// The scheduler re-checks `is_bookmarked` and `is_indexed` right before
/// calling `run`; `run` itself must check `cancel` before each network call.
#[async_trait]
pub trait IndexJob: Send + Sync + 'static {
    /// Whether the page is still bookmarked.
    fn is_bookmarked(&self, key: &PageKey) -> bool;

    /// Whether the page is already part of the index.
    fn is_indexed(&self, key: &PageKey) -> bool;

    /// Index one page.
    async fn run(&self, key: &PageKey, cancel: &CancellationToken) -> Result<(), JobError>;
}
