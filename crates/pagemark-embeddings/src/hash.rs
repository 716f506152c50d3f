//! Deterministic keyword-hash embedder.
//!
//! Each lower-cased keyword token is hashed into one of `dimension` buckets.
//! Concept groups map several words onto one shared token, so texts that use
//! different words for the same idea land in the same bucket. Used for offline
//! operation and as the stub provider in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingClient};

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "into", "about",
    "page", "highlights",
];

/// Offline embedder hashing keyword tokens into buckets.
pub struct HashEmbedder {
    dimension: usize,
    concepts: HashMap<String, String>,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            concepts: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Map every word of `words` onto the shared token `concept`.
    pub fn with_concept(mut self, concept: &str, words: &[&str]) -> Self {
        let concept = concept.to_lowercase();
        for word in words {
            self.concepts.insert(word.to_lowercase(), concept.clone());
        }
        self
    }

    /// Number of `embed` calls served so far (batch items included).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Keyword tokens of a text after concept mapping.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .filter(|t| t.len() > 2 && !STOP_WORDS.contains(&t.as_str()))
            .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
            .map(|t| self.concepts.get(&t).cloned().unwrap_or(t))
            .collect()
    }

    fn vectorize(&self, text: &str) -> Embedding {
        let mut values = vec![0.0f32; self.dimension];
        for token in self.tokens(text) {
            let bucket = (fnv1a(token.as_bytes()) % self.dimension as u64) as usize;
            values[bucket] += 1.0;
        }
        Embedding::new(values)
    }
}

/// 64-bit FNV-1a, stable across runs and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingClient for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vectorize(text))
    }
}
