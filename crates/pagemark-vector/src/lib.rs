//! # pagemark-vector
//!
//! Nearest-neighbor storage keyed by opaque `u64` ids.
//!
//! The [`VectorIndex`] trait is the only capability the rest of the workspace
//! sees. Backends differ in whether they can overwrite the vector of an
//! existing id ([`VectorIndex::supports_in_place_update`]); callers that
//! cannot rely on it insert under a fresh id and delete the old one.
//!
//! - [`HnswIndex`]: approximate search via usearch, persisted to disk
//! - [`FlatIndex`]: exact brute-force search, optionally persisted as JSON

pub mod error;
pub mod flat;
pub mod hnsw;
pub mod index;

pub use error::VectorError;
pub use flat::FlatIndex;
pub use hnsw::{HnswConfig, HnswIndex};
pub use index::{IndexStats, SearchResult, VectorIndex};
