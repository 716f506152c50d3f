//! # pagemark-indexing
//!
//! Keeps the per-document aggregate index consistent with its pages.
//!
//! One [`pagemark_types::DocumentIndex`] per document maps to exactly one
//! vector: the embedding of every bookmarked page of that document, combined
//! by [`combined_text`]. Any change to the page set re-embeds the document
//! and replaces its vector. [`DocumentIndexStore`] owns these records and
//! their vectors; [`SchemaMigrator`] folds the legacy flat per-page layout
//! into it once.
//!
//! Batch work (reindex, migration, repair) goes through [`RetryPolicy`],
//! which waits out provider rate limits. Interactive single-page work does
//! not retry.

pub mod error;
pub mod migrate;
pub mod retry;
pub mod store;
pub mod text;

pub use error::IndexingError;
pub use migrate::{MigrationReport, SchemaMigrator};
pub use retry::{RateLimitHint, RetryPolicy};
pub use store::{DocumentIndexStore, RepairReport};
pub use text::combined_text;

#[cfg(test)]
pub(crate) mod testing;
