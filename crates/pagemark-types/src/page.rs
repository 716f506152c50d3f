//! Page-level identity and content.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one bookmarked page.
///
/// Ordered by document key, then page index. This is the only link between
/// the document index and the pending-task queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageKey {
    /// Stable document identity (e.g. the source filename)
    pub document_key: String,
    /// Zero-based page index within the document
    pub page_index: u32,
}

impl PageKey {
    pub fn new(document_key: impl Into<String>, page_index: u32) -> Self {
        Self {
            document_key: document_key.into(),
            page_index,
        }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document_key, self.page_index)
    }
}

/// Search-relevant content of one bookmarked page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageIndexEntry {
    /// Zero-based page index
    pub page_index: u32,
    /// Short search-oriented summary of the page text
    pub summary: String,
    /// Highlighted passages on the page, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_excerpts: Option<Vec<String>>,
}

impl PageIndexEntry {
    pub fn new(page_index: u32, summary: impl Into<String>) -> Self {
        Self {
            page_index,
            summary: summary.into(),
            highlight_excerpts: None,
        }
    }

    /// Attach highlight excerpts (builder pattern). Empty lists are stored as `None`.
    pub fn with_excerpts(mut self, excerpts: Vec<String>) -> Self {
        self.highlight_excerpts = if excerpts.is_empty() {
            None
        } else {
            Some(excerpts)
        };
        self
    }

    /// Highlight excerpts as a slice (empty when there are none).
    pub fn excerpts(&self) -> &[String] {
        self.highlight_excerpts.as_deref().unwrap_or(&[])
    }

    /// Text used to represent this page on its own: summary followed by excerpts.
    pub fn representation(&self) -> String {
        let mut text = self.summary.trim().to_string();
        for excerpt in self.excerpts() {
            let excerpt = excerpt.trim();
            if excerpt.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(excerpt);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_key_ordering() {
        let mut keys = vec![
            PageKey::new("b.pdf", 1),
            PageKey::new("a.pdf", 9),
            PageKey::new("a.pdf", 2),
        ];
        keys.sort();
        assert_eq!(keys[0], PageKey::new("a.pdf", 2));
        assert_eq!(keys[1], PageKey::new("a.pdf", 9));
        assert_eq!(keys[2], PageKey::new("b.pdf", 1));
    }

    #[test]
    fn test_page_key_display() {
        assert_eq!(PageKey::new("book.pdf", 5).to_string(), "book.pdf#5");
    }

    #[test]
    fn test_empty_excerpts_become_none() {
        let entry = PageIndexEntry::new(0, "summary").with_excerpts(Vec::new());
        assert!(entry.highlight_excerpts.is_none());
        assert!(entry.excerpts().is_empty());
    }

    #[test]
    fn test_representation_appends_excerpts() {
        let entry = PageIndexEntry::new(2, "Backpropagation basics")
            .with_excerpts(vec!["chain rule".to_string(), "  ".to_string()]);
        assert_eq!(entry.representation(), "Backpropagation basics\nchain rule");
    }

    #[test]
    fn test_entry_serialization_skips_missing_excerpts() {
        let entry = PageIndexEntry::new(1, "x");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("highlight_excerpts"));

        let decoded: PageIndexEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, entry);
    }
}
