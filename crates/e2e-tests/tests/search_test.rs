//! Query surface E2E tests: concept search, ordering and short-circuits.

use pretty_assertions::assert_eq;

use e2e_tests::TestHarness;
use pagemark_search::SearchError;

#[tokio::test]
async fn test_optimization_query_finds_gradient_descent_page() {
    let harness = TestHarness::new();
    harness.index.initialize().await.unwrap();
    let store = harness.index.store();
    store
        .add_page("paper.pdf", 3, "discusses gradient descent", None)
        .await
        .unwrap();
    store
        .add_page("cookbook.pdf", 12, "slow roasted vegetables with herbs", None)
        .await
        .unwrap();
    store
        .add_page("atlas.pdf", 40, "mountain ranges of central asia", None)
        .await
        .unwrap();

    let hits = harness
        .index
        .search("optimization algorithm", 5)
        .await
        .unwrap();
    let paper = hits
        .iter()
        .find(|h| h.document_key == "paper.pdf" && h.page_index == 3)
        .expect("paper.pdf page 3 in top 5");
    assert!(paper.score > 0.0);
    assert_eq!(hits[0].document_key, "paper.pdf");
}

#[tokio::test]
async fn test_rerank_is_deterministic() {
    let harness = TestHarness::new();
    harness.index.initialize().await.unwrap();
    let store = harness.index.store();
    for (doc, page, summary) in [
        ("a.pdf", 7, "gradient descent step size"),
        ("a.pdf", 2, "gradient descent step size"),
        ("b.pdf", 1, "gradient descent momentum"),
        ("b.pdf", 4, "sailing boats"),
        ("c.pdf", 0, "gradient descent step size"),
    ] {
        store.add_page(doc, page, summary, None).await.unwrap();
    }

    let first = harness.index.search("gradient descent", 10).await.unwrap();
    let second = harness.index.search("gradient descent", 10).await.unwrap();
    assert_eq!(first, second);

    assert!(first.windows(2).all(|w| w[0].score >= w[1].score));
    // Equal scores within one document keep ascending page order
    let a_pages: Vec<u32> = first
        .iter()
        .filter(|h| h.document_key == "a.pdf")
        .map(|h| h.page_index)
        .collect();
    assert_eq!(a_pages, vec![2, 7]);
}

#[tokio::test]
async fn test_blank_query_and_zero_k_make_no_provider_calls() {
    let harness = TestHarness::new();
    harness.index.initialize().await.unwrap();
    harness
        .index
        .store()
        .add_page("a.pdf", 0, "anything", None)
        .await
        .unwrap();
    let calls = harness.embedder.calls();

    assert!(harness.index.search("", 5).await.unwrap().is_empty());
    assert!(harness.index.search(" \t ", 5).await.unwrap().is_empty());
    assert!(harness.index.search("anything", 0).await.unwrap().is_empty());
    assert_eq!(harness.embedder.calls(), calls);
}

#[tokio::test]
async fn test_search_before_initialize_and_during_outage() {
    let harness = TestHarness::new();
    assert!(matches!(
        harness.index.search("query", 5).await,
        Err(SearchError::NotInitialized)
    ));

    harness.index.initialize().await.unwrap();
    harness.embedder.set_down(true);
    let err = harness.index.search("query", 5).await.unwrap_err();
    assert_eq!(err.to_string(), "search unavailable");
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn test_hits_carry_highlights() {
    let harness = TestHarness::new();
    harness.index.initialize().await.unwrap();
    harness
        .index
        .store()
        .add_page(
            "paper.pdf",
            5,
            "convergence of gradient descent",
            Some(vec!["learning rate schedule".to_string()]),
        )
        .await
        .unwrap();

    let hits = harness.index.search("gradient", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(
        hits[0].highlight_excerpts,
        vec!["learning rate schedule".to_string()]
    );
}
