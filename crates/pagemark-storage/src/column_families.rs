//! Column family definitions for RocksDB.
//!
//! Each column family isolates one record collection:
//! - documents: aggregated per-document index records (keyed by document key)
//! - pending_tasks: delayed indexing tasks (keyed by page key)
//! - legacy_pages: flat per-page records awaiting migration (keyed by page key)
//! - bookmarks: the host's bookmark set, used by the CLI (keyed by page key)
//! - meta: schema version and other singleton values

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for aggregated document index records
pub const CF_DOCUMENTS: &str = "documents";

/// Column family name for pending indexing tasks
pub const CF_PENDING_TASKS: &str = "pending_tasks";

/// Column family name for legacy flat per-page records
pub const CF_LEGACY_PAGES: &str = "legacy_pages";

/// Column family name for bookmarks
pub const CF_BOOKMARKS: &str = "bookmarks";

/// Column family name for singleton metadata values
pub const CF_META: &str = "meta";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_DOCUMENTS,
    CF_PENDING_TASKS,
    CF_LEGACY_PAGES,
    CF_BOOKMARKS,
    CF_META,
];

/// Document records are rewritten wholesale, compress them
fn documents_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_DOCUMENTS, documents_options()),
        ColumnFamilyDescriptor::new(CF_PENDING_TASKS, Options::default()),
        ColumnFamilyDescriptor::new(CF_LEGACY_PAGES, Options::default()),
        ColumnFamilyDescriptor::new(CF_BOOKMARKS, Options::default()),
        ColumnFamilyDescriptor::new(CF_META, Options::default()),
    ]
}
