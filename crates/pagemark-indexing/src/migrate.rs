//! One-time upgrade from the flat per-page layout to per-document aggregates.
//!
//! Guarded by the persisted schema version tag. While the tag says
//! [`SchemaVersion::FlatPages`], each legacy group (all records of one
//! document) is folded into its document and committed together with the
//! shrunken legacy set in one write; the group's per-page vectors are deleted
//! afterwards. A group that fails stays in the legacy set and is retried on
//! the next run. The tag moves to [`SchemaVersion::AggregatedDocuments`] once
//! the legacy set is empty.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use pagemark_storage::MetadataStore;
use pagemark_types::{LegacyPageRecord, SchemaVersion};

use crate::error::IndexingError;
use crate::store::DocumentIndexStore;

/// Outcome of one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Documents written from legacy groups
    pub documents_migrated: usize,
    /// Legacy page records folded into documents
    pub pages_migrated: usize,
    /// Groups left in the legacy set for the next run
    pub groups_failed: usize,
    /// Legacy per-page vectors removed from the vector index
    pub legacy_vectors_deleted: usize,
}

/// Runs the flat-to-aggregated layout migration.
pub struct SchemaMigrator {
    metadata: Arc<dyn MetadataStore>,
    store: Arc<DocumentIndexStore>,
}

impl SchemaMigrator {
    pub fn new(metadata: Arc<dyn MetadataStore>, store: Arc<DocumentIndexStore>) -> Self {
        Self { metadata, store }
    }

    /// Persisted layout version, inferring and writing it on first use.
    ///
    /// A store without a tag is legacy if it holds any legacy records.
    pub fn detect_version(&self) -> Result<SchemaVersion, IndexingError> {
        if let Some(version) = self.metadata.schema_version()? {
            return Ok(version);
        }

        let version = if self.metadata.load_legacy_pages()?.is_empty() {
            SchemaVersion::AggregatedDocuments
        } else {
            SchemaVersion::FlatPages
        };
        self.metadata.set_schema_version(version)?;
        info!(%version, "Inferred schema version");
        Ok(version)
    }

    /// Migrate every pending legacy group. Idempotent.
    pub async fn run(&self) -> Result<MigrationReport, IndexingError> {
        let mut report = MigrationReport::default();
        if self.detect_version()? >= SchemaVersion::AggregatedDocuments {
            return Ok(report);
        }

        let mut remaining = self.metadata.load_legacy_pages()?;
        let mut groups: BTreeMap<String, Vec<LegacyPageRecord>> = BTreeMap::new();
        for record in &remaining {
            groups
                .entry(record.document_key.clone())
                .or_default()
                .push(record.clone());
        }
        info!(
            groups = groups.len(),
            records = remaining.len(),
            "Migrating legacy page index"
        );

        for (document_key, records) in groups {
            let after: Vec<LegacyPageRecord> = remaining
                .iter()
                .filter(|r| r.document_key != document_key)
                .cloned()
                .collect();

            match self
                .store
                .merge_legacy_group(&document_key, &records, &after)
                .await
            {
                Ok(()) => {
                    remaining = after;
                    report.documents_migrated += 1;
                    report.pages_migrated += records.len();
                    for record in &records {
                        match self.store.vectors().delete(record.vector_id) {
                            Ok(true) => report.legacy_vectors_deleted += 1,
                            Ok(false) => {}
                            Err(e) => warn!(
                                vector_id = record.vector_id,
                                error = %e,
                                "Failed to delete legacy vector"
                            ),
                        }
                    }
                }
                Err(e) => {
                    report.groups_failed += 1;
                    warn!(document_key = %document_key, error = %e, "Legacy group not migrated");
                }
            }
        }
        self.store.save_vectors();

        if remaining.is_empty() {
            self.metadata
                .set_schema_version(SchemaVersion::AggregatedDocuments)?;
        }

        info!(
            documents = report.documents_migrated,
            pages = report.pages_migrated,
            failed = report.groups_failed,
            vectors_deleted = report.legacy_vectors_deleted,
            "Migration run complete"
        );
        Ok(report)
    }
}
