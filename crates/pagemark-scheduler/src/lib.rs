//! Durable, cancellable, delayed indexing jobs.
//!
//! Adding a bookmark does not index the page straight away: the job waits a
//! configurable delay so a bookmark that is quickly removed never costs a
//! provider call. [`PendingTaskScheduler`] keeps at most one live task per
//! page, persists every task before arming its timer, and recovers persisted
//! tasks after a restart via [`PendingTaskScheduler::reconcile_on_startup`].
//!
//! # Example
//!
//! ```ignore
//! use pagemark_scheduler::PendingTaskScheduler;
//!
//! let scheduler = PendingTaskScheduler::new(storage, indexer)?;
//! scheduler.reconcile_on_startup()?;
//! scheduler.schedule(PageKey::new("book.pdf", 5), Duration::from_secs(180))?;
//! scheduler.cancel(&PageKey::new("book.pdf", 5))?;
//! scheduler.shutdown().await;
//! ```

mod error;
mod job;
mod scheduler;

pub use error::SchedulerError;
pub use job::{IndexJob, JobError};
pub use scheduler::{PendingTaskScheduler, ReconcileReport};
