//! # pagemark-search
//!
//! Answers natural-language queries with ranked bookmarked pages.
//!
//! Search runs in two phases over one query embedding:
//! 1. **Coarse**: nearest documents by their aggregate vector.
//! 2. **Rerank**: every page of every candidate document is embedded on its
//!    own (summary plus highlights) and scored by cosine similarity.
//!
//! Results are ordered by score, then coarse rank, then page index.

mod coordinator;
mod error;

pub use coordinator::SearchCoordinator;
pub use error::SearchError;
