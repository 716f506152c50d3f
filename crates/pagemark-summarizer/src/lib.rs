//! # pagemark-summarizer
//!
//! Turns raw page text into a short, search-oriented summary.
//!
//! - [`ApiSummarizer`]: OpenAI-compatible or Anthropic chat endpoint
//! - [`MockSummarizer`]: deterministic, offline

mod api;
mod mock;

pub use api::{ApiSummarizer, ApiSummarizerConfig};
pub use mock::MockSummarizer;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Error type for summarization operations.
#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("Rate limited by summary provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Summary provider unavailable: {0}")]
    Unavailable(String),

    #[error("Summary provider returned an empty response")]
    EmptyResponse,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SummarizerError {
    /// Server-suggested wait if this is a rate-limit error.
    pub fn retry_hint(&self) -> Option<Option<Duration>> {
        match self {
            SummarizerError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SummarizerError::RateLimited { .. })
    }
}

/// Pluggable page summarizer.
#[async_trait]
pub trait SummaryClient: Send + Sync {
    /// Summarize one page.
    ///
    /// `highlight_excerpts` are the passages the user marked on the page, if
    /// any; implementations should let them steer the summary.
    async fn summarize(
        &self,
        raw_text: &str,
        highlight_excerpts: Option<&[String]>,
    ) -> Result<String, SummarizerError>;
}

/// Trim a model reply down to the summary text.
///
/// Removes surrounding code fences and quotes. Returns `None` for blank output.
pub(crate) fn clean_summary(reply: &str) -> Option<String> {
    let mut text = reply.trim();
    if let Some(inner) = text.strip_prefix("```") {
        let inner = inner.split_once('\n').map(|(_, rest)| rest).unwrap_or(inner);
        text = inner.strip_suffix("```").unwrap_or(inner).trim();
    }
    let text = text.trim_matches('"').trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
