//! Persistent metadata storage for pagemark.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for documents, pending tasks, legacy pages and bookmarks
//! - Whole-collection replacement in a single synced write batch
//! - An explicit schema version tag
//!
//! Consumers depend on the [`MetadataStore`] trait so alternative backends
//! can be injected; [`Storage`] is the RocksDB implementation.

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;
pub mod metadata;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
pub use metadata::MetadataStore;
