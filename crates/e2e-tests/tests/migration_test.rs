//! Schema migration E2E tests: completeness, resumption and idempotence.

use pretty_assertions::assert_eq;

use e2e_tests::{legacy_record, TestHarness};
use pagemark_storage::MetadataStore;
use pagemark_types::SchemaVersion;
use pagemark_vector::VectorIndex;

fn legacy_layout() -> Vec<pagemark_types::LegacyPageRecord> {
    vec![
        legacy_record(1, "paper.pdf", 3, "discusses gradient descent"),
        legacy_record(2, "paper.pdf", 1, "introduces the loss function"),
        legacy_record(3, "paper.pdf", 7, "reports benchmark results"),
        legacy_record(4, "novel.pdf", 10, "a storm at sea"),
        legacy_record(5, "novel.pdf", 2, "the crew assembles"),
        legacy_record(6, "atlas.pdf", 40, "mountain ranges of central asia"),
    ]
}

#[tokio::test]
async fn test_legacy_pages_fold_into_documents() {
    let mut harness = TestHarness::new();
    let records = legacy_layout();
    harness.seed_legacy(&records).await;
    harness.restart().await;

    let report = harness.index.initialize().await.unwrap();
    assert_eq!(report.migration.documents_migrated, 3);
    assert_eq!(report.migration.pages_migrated, 6);
    assert_eq!(report.migration.groups_failed, 0);
    assert_eq!(report.migration.legacy_vectors_deleted, 6);

    let documents = harness.storage.load_documents().unwrap();
    assert_eq!(documents.len(), 3);
    let total_pages: usize = documents.iter().map(|d| d.pages.len()).sum();
    assert_eq!(total_pages, records.len());

    let paper = harness.index.store().get("paper.pdf").unwrap();
    let pages: Vec<u32> = paper.pages.iter().map(|p| p.page_index).collect();
    assert_eq!(pages, vec![1, 3, 7]);

    assert!(harness.storage.load_legacy_pages().unwrap().is_empty());
    assert_eq!(
        harness.storage.schema_version().unwrap(),
        Some(SchemaVersion::AggregatedDocuments)
    );
    // Only the three aggregate vectors remain
    assert_eq!(harness.vectors.len(), 3);
    for record in &records {
        assert!(!documents.iter().any(|d| d.id == record.vector_id));
    }

    let hits = harness.index.search("optimization algorithm", 5).await.unwrap();
    assert_eq!(hits[0].document_key, "paper.pdf");
    assert_eq!(hits[0].page_index, 3);
}

#[tokio::test]
async fn test_migration_runs_once() {
    let mut harness = TestHarness::new();
    harness.seed_legacy(&legacy_layout()).await;
    harness.restart().await;
    harness.index.initialize().await.unwrap();
    let documents = harness.storage.load_documents().unwrap();

    harness.restart().await;
    let report = harness.index.initialize().await.unwrap();
    assert_eq!(report.migration.documents_migrated, 0);
    assert_eq!(harness.storage.load_documents().unwrap(), documents);
}

#[tokio::test]
async fn test_failed_group_is_retried_next_startup() {
    let mut harness = TestHarness::new();
    harness.seed_legacy(&legacy_layout()).await;
    harness.restart().await;

    harness.embedder.set_down(true);
    let report = harness.index.initialize().await.unwrap();
    assert_eq!(report.migration.groups_failed, 3);
    assert_eq!(harness.storage.load_legacy_pages().unwrap().len(), 6);
    assert_eq!(
        harness.storage.schema_version().unwrap(),
        Some(SchemaVersion::FlatPages)
    );

    harness.embedder.set_down(false);
    harness.restart().await;
    let report = harness.index.initialize().await.unwrap();
    assert_eq!(report.migration.documents_migrated, 3);
    assert!(harness.storage.load_legacy_pages().unwrap().is_empty());
    assert_eq!(
        harness.storage.schema_version().unwrap(),
        Some(SchemaVersion::CURRENT)
    );
}

#[tokio::test]
async fn test_fresh_store_is_tagged_current() {
    let harness = TestHarness::new();
    let report = harness.index.initialize().await.unwrap();
    assert_eq!(report.migration.documents_migrated, 0);
    assert_eq!(
        harness.storage.schema_version().unwrap(),
        Some(SchemaVersion::CURRENT)
    );
}
