//! # pagemark-service
//!
//! The [`SemanticIndex`] service object: one value, constructed once by the
//! host, that wires the scheduler, document index, search coordinator and
//! schema migrator to the host's collaborators.
//!
//! Hosts provide:
//! - a [`BookmarkSource`] answering which pages are bookmarked
//! - a [`PageTextSource`] recovering the text of a page
//! - embedding and summary clients, a vector index and a metadata store

mod error;
mod indexer;
mod semantic;
pub mod sources;

pub use error::ServiceError;
pub use indexer::PageIndexer;
pub use semantic::{Collaborators, IndexStatus, ReindexReport, SemanticIndex, StartupReport};
pub use sources::{BookmarkSource, MemoryBookmarks, MemoryTextSource, PageTextSource, TextSourceError};
