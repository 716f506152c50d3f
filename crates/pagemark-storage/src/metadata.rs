//! Metadata store contract.
//!
//! Every collection is loaded whole at startup and replaced whole on each
//! mutation. A replacement is all-or-nothing and durable once it returns.

use pagemark_types::{DocumentIndex, LegacyPageRecord, PendingIndexTask, SchemaVersion};

use crate::error::StorageError;

/// Durable storage for document index records and pending-task records.
///
/// Implementations must be thread-safe. Callers serialize writers of the same
/// collection; implementations do not need to merge concurrent replacements.
pub trait MetadataStore: Send + Sync {
    /// Load every aggregated document record.
    fn load_documents(&self) -> Result<Vec<DocumentIndex>, StorageError>;

    /// Replace the full document record set.
    fn replace_documents(&self, documents: &[DocumentIndex]) -> Result<(), StorageError>;

    /// Load every pending indexing task.
    fn load_pending_tasks(&self) -> Result<Vec<PendingIndexTask>, StorageError>;

    /// Replace the full pending-task set.
    fn replace_pending_tasks(&self, tasks: &[PendingIndexTask]) -> Result<(), StorageError>;

    /// Load every legacy flat per-page record.
    fn load_legacy_pages(&self) -> Result<Vec<LegacyPageRecord>, StorageError>;

    /// Atomically replace both the document set and the legacy set.
    ///
    /// Used by migration so that a document group moves from the legacy
    /// layout to the aggregated layout in one write.
    fn commit_migration_step(
        &self,
        documents: &[DocumentIndex],
        remaining_legacy: &[LegacyPageRecord],
    ) -> Result<(), StorageError>;

    /// Read the schema version tag, `None` if it was never written.
    fn schema_version(&self) -> Result<Option<SchemaVersion>, StorageError>;

    /// Write the schema version tag.
    fn set_schema_version(&self, version: SchemaVersion) -> Result<(), StorageError>;
}
