//! # pagemark-types
//!
//! Shared domain types for the pagemark bookmark search engine.
//!
//! This crate defines the records exchanged between the workspace crates:
//! - [`PageKey`]: the `(document_key, page_index)` identity shared by every layer
//! - [`PageIndexEntry`] / [`DocumentIndex`]: the per-document aggregate index
//! - [`PendingIndexTask`]: a durable, not-yet-executed indexing job
//! - [`LegacyPageRecord`] / [`SchemaVersion`]: the flat per-page layout and its version tag
//! - [`SearchHit`]: one ranked result of the query surface
//! - [`Settings`]: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use pagemark_types::{DocumentIndex, PageIndexEntry};
//!
//! let mut doc = DocumentIndex::new(1, "paper.pdf");
//! doc.insert_page(PageIndexEntry::new(3, "discusses gradient descent"));
//! assert!(doc.contains_page(3));
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod legacy;
pub mod page;
pub mod search;
pub mod task;

pub use config::{
    EmbeddingSettings, RetrySettings, SchedulerSettings, SearchSettings, Settings,
    SummarizerSettings,
};
pub use document::DocumentIndex;
pub use error::PagemarkError;
pub use legacy::{LegacyPageRecord, SchemaVersion};
pub use page::{PageIndexEntry, PageKey};
pub use search::SearchHit;
pub use task::PendingIndexTask;
