//! RocksDB wrapper for pagemark storage.
//!
//! Provides:
//! - Database open/close with column family setup
//! - Whole-collection replacement in one synced write batch
//! - Schema version tag reads and writes
//! - Bookmark set used by the command line host

use std::path::Path;

use rocksdb::{ColumnFamily, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use tracing::{debug, info};

use pagemark_types::{DocumentIndex, LegacyPageRecord, PageKey, PendingIndexTask, SchemaVersion};

use crate::column_families::{
    build_cf_descriptors, CF_BOOKMARKS, CF_DOCUMENTS, CF_LEGACY_PAGES, CF_META, CF_PENDING_TASKS,
};
use crate::error::StorageError;
use crate::keys::{decode_page_key, encode_document_key, encode_page_key, SCHEMA_VERSION_KEY};
use crate::metadata::MetadataStore;

/// Main storage interface for pagemark
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(2);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    fn synced() -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(true);
        opts
    }

    /// Read every value of a column family in key order.
    fn values(&self, cf_name: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            values.push(value.to_vec());
        }
        Ok(values)
    }

    /// Queue deletion of every existing key of a column family.
    fn clear_into(&self, batch: &mut WriteBatch, cf_name: &str) -> Result<usize, StorageError> {
        let cf = self.cf(cf_name)?;
        let mut cleared = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            batch.delete_cf(cf, key);
            cleared += 1;
        }
        Ok(cleared)
    }

    fn put_documents_into(
        &self,
        batch: &mut WriteBatch,
        documents: &[DocumentIndex],
    ) -> Result<(), StorageError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        for doc in documents {
            batch.put_cf(cf, encode_document_key(&doc.document_key), doc.to_bytes()?);
        }
        Ok(())
    }

    fn put_legacy_into(
        &self,
        batch: &mut WriteBatch,
        records: &[LegacyPageRecord],
    ) -> Result<(), StorageError> {
        let cf = self.cf(CF_LEGACY_PAGES)?;
        for record in records {
            batch.put_cf(cf, encode_page_key(&record.key())?, record.to_bytes()?);
        }
        Ok(())
    }

    /// Store one legacy flat per-page record.
    ///
    /// Only used to seed stores written by the old layout (and by tests).
    pub fn put_legacy_page(&self, record: &LegacyPageRecord) -> Result<(), StorageError> {
        let cf = self.cf(CF_LEGACY_PAGES)?;
        self.db
            .put_cf_opt(cf, encode_page_key(&record.key())?, record.to_bytes()?, &Self::synced())?;
        Ok(())
    }

    /// Add a bookmark. Returns `false` if it was already present.
    pub fn add_bookmark(&self, key: &PageKey) -> Result<bool, StorageError> {
        let cf = self.cf(CF_BOOKMARKS)?;
        let raw = encode_page_key(key)?;
        if self.db.get_cf(cf, &raw)?.is_some() {
            return Ok(false);
        }
        let added_at = chrono::Utc::now().timestamp_millis().to_be_bytes();
        self.db.put_cf_opt(cf, raw, added_at, &Self::synced())?;
        debug!(page = %key, "Bookmark added");
        Ok(true)
    }

    /// Remove a bookmark. Returns `false` if it was not present.
    pub fn remove_bookmark(&self, key: &PageKey) -> Result<bool, StorageError> {
        let cf = self.cf(CF_BOOKMARKS)?;
        let raw = encode_page_key(key)?;
        if self.db.get_cf(cf, &raw)?.is_none() {
            return Ok(false);
        }
        self.db.delete_cf_opt(cf, raw, &Self::synced())?;
        debug!(page = %key, "Bookmark removed");
        Ok(true)
    }

    pub fn is_bookmarked(&self, key: &PageKey) -> Result<bool, StorageError> {
        let cf = self.cf(CF_BOOKMARKS)?;
        Ok(self.db.get_cf(cf, encode_page_key(key)?)?.is_some())
    }

    /// All bookmarks, ordered by document then page.
    pub fn list_bookmarks(&self) -> Result<Vec<PageKey>, StorageError> {
        let cf = self.cf(CF_BOOKMARKS)?;
        let mut keys = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            keys.push(decode_page_key(&key)?);
        }
        Ok(keys)
    }

    /// Flush all memtables to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in crate::column_families::ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    /// Get storage statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            document_count: self.count_cf_entries(CF_DOCUMENTS)?,
            pending_task_count: self.count_cf_entries(CF_PENDING_TASKS)?,
            legacy_page_count: self.count_cf_entries(CF_LEGACY_PAGES)?,
            bookmark_count: self.count_cf_entries(CF_BOOKMARKS)?,
            schema_version: self.schema_version()?,
            disk_usage_bytes: self.get_disk_usage(),
        })
    }

    fn count_cf_entries(&self, cf_name: &str) -> Result<u64, StorageError> {
        let cf = self.cf(cf_name)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> u64 {
        let mut total_size = 0u64;
        if let Ok(entries) = std::fs::read_dir(self.db.path()) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }
        total_size
    }
}

impl MetadataStore for Storage {
    fn load_documents(&self) -> Result<Vec<DocumentIndex>, StorageError> {
        self.values(CF_DOCUMENTS)?
            .iter()
            .map(|bytes| DocumentIndex::from_bytes(bytes).map_err(StorageError::from))
            .collect()
    }

    fn replace_documents(&self, documents: &[DocumentIndex]) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        self.clear_into(&mut batch, CF_DOCUMENTS)?;
        self.put_documents_into(&mut batch, documents)?;
        self.db.write_opt(batch, &Self::synced())?;
        debug!(count = documents.len(), "Replaced document records");
        Ok(())
    }

    fn load_pending_tasks(&self) -> Result<Vec<PendingIndexTask>, StorageError> {
        self.values(CF_PENDING_TASKS)?
            .iter()
            .map(|bytes| PendingIndexTask::from_bytes(bytes).map_err(StorageError::from))
            .collect()
    }

    fn replace_pending_tasks(&self, tasks: &[PendingIndexTask]) -> Result<(), StorageError> {
        let cf = self.cf(CF_PENDING_TASKS)?;
        let mut batch = WriteBatch::default();
        self.clear_into(&mut batch, CF_PENDING_TASKS)?;
        for task in tasks {
            batch.put_cf(cf, encode_page_key(&task.key())?, task.to_bytes()?);
        }
        self.db.write_opt(batch, &Self::synced())?;
        debug!(count = tasks.len(), "Replaced pending tasks");
        Ok(())
    }

    fn load_legacy_pages(&self) -> Result<Vec<LegacyPageRecord>, StorageError> {
        self.values(CF_LEGACY_PAGES)?
            .iter()
            .map(|bytes| LegacyPageRecord::from_bytes(bytes).map_err(StorageError::from))
            .collect()
    }

    fn commit_migration_step(
        &self,
        documents: &[DocumentIndex],
        remaining_legacy: &[LegacyPageRecord],
    ) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        self.clear_into(&mut batch, CF_DOCUMENTS)?;
        self.put_documents_into(&mut batch, documents)?;
        self.clear_into(&mut batch, CF_LEGACY_PAGES)?;
        self.put_legacy_into(&mut batch, remaining_legacy)?;
        self.db.write_opt(batch, &Self::synced())?;
        debug!(
            documents = documents.len(),
            remaining_legacy = remaining_legacy.len(),
            "Committed migration step"
        );
        Ok(())
    }

    fn schema_version(&self) -> Result<Option<SchemaVersion>, StorageError> {
        let cf = self.cf(CF_META)?;
        let Some(raw) = self.db.get_cf(cf, SCHEMA_VERSION_KEY)? else {
            return Ok(None);
        };
        let bytes: [u8; 4] = raw
            .as_slice()
            .try_into()
            .map_err(|_| StorageError::Serialization("Malformed schema version tag".to_string()))?;
        let value = u32::from_be_bytes(bytes);
        SchemaVersion::from_u32(value)
            .map(Some)
            .ok_or_else(|| StorageError::Serialization(format!("Unknown schema version {}", value)))
    }

    fn set_schema_version(&self, version: SchemaVersion) -> Result<(), StorageError> {
        let cf = self.cf(CF_META)?;
        self.db.put_cf_opt(
            cf,
            SCHEMA_VERSION_KEY,
            version.as_u32().to_be_bytes(),
            &Self::synced(),
        )?;
        info!(%version, "Schema version written");
        Ok(())
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    /// Number of aggregated document records
    pub document_count: u64,
    /// Number of pending indexing tasks
    pub pending_task_count: u64,
    /// Number of legacy per-page records awaiting migration
    pub legacy_page_count: u64,
    /// Number of bookmarks
    pub bookmark_count: u64,
    /// Schema version tag, if written
    pub schema_version: Option<SchemaVersion>,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}
