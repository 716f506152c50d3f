//! Key encoding and decoding for storage layer.
//!
//! Page key format: `{document_key}\0{page_index:010}`
//! - document_key: raw UTF-8 (may contain any character except NUL)
//! - page_index: zero-padded to 10 digits so pages of a document sort numerically
//!
//! Document keys are stored as their raw UTF-8 bytes.

use pagemark_types::PageKey;

use crate::error::StorageError;

/// Meta key holding the schema version tag
pub const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";

const SEPARATOR: char = '\0';

/// Encode a page key to bytes for storage
pub fn encode_page_key(key: &PageKey) -> Result<Vec<u8>, StorageError> {
    if key.document_key.contains(SEPARATOR) {
        return Err(StorageError::Key(format!(
            "Document key contains NUL: {:?}",
            key.document_key
        )));
    }
    Ok(format!("{}{}{:010}", key.document_key, SEPARATOR, key.page_index).into_bytes())
}

/// Decode a page key from bytes
pub fn decode_page_key(bytes: &[u8]) -> Result<PageKey, StorageError> {
    let s = std::str::from_utf8(bytes)
        .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
    let (document_key, page) = s
        .rsplit_once(SEPARATOR)
        .ok_or_else(|| StorageError::Key(format!("Invalid page key format: {:?}", s)))?;
    let page_index: u32 = page
        .parse()
        .map_err(|e| StorageError::Key(format!("Invalid page index: {}", e)))?;
    Ok(PageKey::new(document_key, page_index))
}

/// Encode a document key to bytes for storage
pub fn encode_document_key(document_key: &str) -> Vec<u8> {
    document_key.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_key_roundtrip() {
        let key = PageKey::new("notes/chapter:1.pdf", 42);
        let bytes = encode_page_key(&key).unwrap();
        assert_eq!(decode_page_key(&bytes).unwrap(), key);
    }

    #[test]
    fn test_page_keys_sort_numerically() {
        let k2 = encode_page_key(&PageKey::new("a.pdf", 2)).unwrap();
        let k10 = encode_page_key(&PageKey::new("a.pdf", 10)).unwrap();
        assert!(k2 < k10);
    }

    #[test]
    fn test_nul_in_document_key_rejected() {
        let key = PageKey::new("bad\0name", 1);
        assert!(matches!(encode_page_key(&key), Err(StorageError::Key(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_page_key(b"no-separator").is_err());
        assert!(decode_page_key(b"a.pdf\0xyz").is_err());
    }
}
