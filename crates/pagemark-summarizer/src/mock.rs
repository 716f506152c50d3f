//! Mock summarizer for testing and offline use.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::{SummarizerError, SummaryClient};

const MAX_SENTENCE_CHARS: usize = 200;
const MAX_KEYWORDS: usize = 5;

/// Mock summarizer that generates deterministic summaries.
///
/// The summary is the first sentence of the page followed by its most
/// frequent longer words (highlighted passages count double).
pub struct MockSummarizer {
    max_keywords: usize,
}

impl MockSummarizer {
    /// Create a new mock summarizer.
    pub fn new() -> Self {
        Self {
            max_keywords: MAX_KEYWORDS,
        }
    }

    pub fn with_max_keywords(max_keywords: usize) -> Self {
        Self { max_keywords }
    }

    fn keywords(&self, raw_text: &str, highlight_excerpts: &[String]) -> Vec<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut add = |text: &str, weight: usize| {
            for word in text.split(|c: char| !c.is_alphanumeric()) {
                if word.chars().count() > 4 {
                    *counts.entry(word.to_lowercase()).or_default() += weight;
                }
            }
        };
        add(raw_text, 1);
        for excerpt in highlight_excerpts {
            add(excerpt, 2);
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(self.max_keywords)
            .map(|(word, _)| word)
            .collect()
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

/// First sentence of `text`, cut at a character boundary.
fn first_sentence(text: &str) -> String {
    let trimmed = text.trim();
    let end = trimmed
        .find(['.', '!', '?'])
        .map(|i| i + 1)
        .unwrap_or(trimmed.len());
    trimmed[..end]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_SENTENCE_CHARS)
        .collect()
}

#[async_trait]
impl SummaryClient for MockSummarizer {
    async fn summarize(
        &self,
        raw_text: &str,
        highlight_excerpts: Option<&[String]>,
    ) -> Result<String, SummarizerError> {
        if raw_text.trim().is_empty() {
            return Err(SummarizerError::EmptyResponse);
        }

        let sentence = first_sentence(raw_text);
        let keywords = self.keywords(raw_text, highlight_excerpts.unwrap_or_default());
        if keywords.is_empty() {
            Ok(sentence)
        } else {
            Ok(format!("{} Keywords: {}", sentence, keywords.join(", ")))
        }
    }
}
