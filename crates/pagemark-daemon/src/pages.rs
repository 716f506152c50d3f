//! Page text read from a directory tree.
//!
//! Layout: `<root>/<document_key>/<page_index>.txt` holds the extracted
//! text of a page; an optional `<page_index>.highlights.txt` next to it
//! holds one highlighted passage per line.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use pagemark_service::{PageTextSource, TextSourceError};
use pagemark_types::PageKey;

pub struct DirectoryTextSource {
    root: PathBuf,
}

impl DirectoryTextSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn page_file(&self, key: &PageKey, suffix: &str) -> Result<PathBuf, TextSourceError> {
        let doc = Path::new(&key.document_key);
        let plain = doc
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.document_key.is_empty() || !plain {
            return Err(TextSourceError::Unavailable(format!(
                "unsupported document key: {}",
                key.document_key
            )));
        }
        Ok(self
            .root
            .join(doc)
            .join(format!("{}{}", key.page_index, suffix)))
    }
}

#[async_trait]
impl PageTextSource for DirectoryTextSource {
    async fn page_text(&self, key: &PageKey) -> Result<String, TextSourceError> {
        let path = self.page_file(key, ".txt")?;
        debug!(page = %key, path = ?path, "Reading page text");
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| TextSourceError::Unavailable(format!("{}: {}", path.display(), e)))
    }

    async fn highlight_excerpts(&self, key: &PageKey) -> Option<Vec<String>> {
        let path = self.page_file(key, ".highlights.txt").ok()?;
        let raw = tokio::fs::read_to_string(&path).await.ok()?;
        let lines: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if lines.is_empty() {
            None
        } else {
            Some(lines)
        }
    }
}
