//! # pagemark-embeddings
//!
//! Text embedding for pagemark.
//!
//! Everything that needs vectors depends on the [`EmbeddingClient`] trait:
//! - [`ApiEmbedder`]: OpenAI-compatible `/embeddings` endpoint
//! - [`HashEmbedder`]: deterministic offline keyword-hash embedder
//!
//! Clients report provider throttling as [`EmbeddingError::RateLimited`]
//! (with the server's retry hint when it sent one). Retrying is left to the
//! caller: interactive paths give up, batch paths back off.

pub mod api;
pub mod error;
pub mod hash;
pub mod model;

pub use api::{ApiEmbedder, ApiEmbedderConfig};
pub use error::EmbeddingError;
pub use hash::HashEmbedder;
pub use model::{cosine_similarity, Embedding, EmbeddingClient};
