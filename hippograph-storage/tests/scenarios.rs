//! End-to-end scenarios wiring a real [`LibsqlStore`] into a [`Hippograph`]:
//! dedup, auto-linking, hub penalty, temporal query, sleep-compute
//! consolidation, and anchor protection.

use std::sync::Arc;

use chrono::{Duration, Utc};
use hippograph_core::config::Config;
use hippograph_core::embeddings::MockEmbeddingProvider;
use hippograph_core::entity_extractor::EntityExtractor;
use hippograph_core::ingestion::IngestOutcome;
use hippograph_core::memory::Hippograph;
use hippograph_core::retrieval::SearchOptions;
use hippograph_core::store::StoreBackend;
use hippograph_core::types::EdgeType;
use hippograph_storage::LibsqlStore;

/// Opens a fresh file-backed store so a scenario can, if it needs to,
/// open a second raw connection to the same database (an in-memory
/// connection is only visible to the connection that created it).
async fn harness() -> (Hippograph, tempfile::TempDir, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("hippograph.db");
    let path_str = path.to_str().expect("utf8 path").to_string();

    let store = LibsqlStore::new(&format!("file:{path_str}"), "").await.expect("connect");
    store.initialize_schema().await.expect("init schema");

    let embedder = Arc::new(MockEmbeddingProvider::default_dimension("scenario-test"));
    let hippo = Hippograph::new(Arc::new(store), embedder, EntityExtractor::new(), Config::default())
        .await
        .expect("build hippograph");

    (hippo, dir, path_str)
}

async fn create(hippo: &Hippograph, category: &str, content: &str) -> i64 {
    match hippo
        .add_note(content.to_string(), Some(category.to_string()), None, false, None)
        .await
        .expect("add_note")
    {
        IngestOutcome::Created { id, .. } => id,
        IngestOutcome::Duplicate { existing_id, .. } => existing_id,
    }
}

#[tokio::test]
async fn duplicate_content_is_rejected_without_force() {
    let (hippo, _dir, _path) = harness().await;

    let first = hippo
        .add_note("The quarterly report is due Friday.".to_string(), None, None, false, None)
        .await
        .expect("first add_note");
    let IngestOutcome::Created { id: first_id, .. } = first else {
        panic!("expected first insert to be created, got {first:?}");
    };

    let second = hippo
        .add_note("The quarterly report is due Friday.".to_string(), None, None, false, None)
        .await
        .expect("second add_note");
    match second {
        IngestOutcome::Duplicate { existing_id, similarity } => {
            assert_eq!(existing_id, first_id);
            assert!(similarity >= 0.95, "expected similarity >= 0.95, got {similarity}");
        }
        IngestOutcome::Created { .. } => panic!("expected a duplicate, got a new note"),
    }

    let forced = hippo
        .add_note("The quarterly report is due Friday.".to_string(), None, None, true, None)
        .await
        .expect("forced add_note");
    match forced {
        IngestOutcome::Created { id, .. } => assert_ne!(id, first_id),
        IngestOutcome::Duplicate { .. } => panic!("force=true must bypass dedup"),
    }
}

#[tokio::test]
async fn related_notes_are_auto_linked() {
    let (hippo, _dir, _path) = harness().await;

    let p = create(&hippo, "general", "FAISS with Python is a great way to do ANN search.").await;
    let q = create(&hippo, "general", "Using FAISS for ANN indexing in a retrieval pipeline.").await;

    let graph = hippo.get_graph(q).await.expect("get_graph");
    let link = graph
        .connections
        .iter()
        .find(|c| c.id == p)
        .unwrap_or_else(|| panic!("expected note {q} to be linked to note {p}, got {:?}", graph.connections));

    assert!(
        link.edge_type == "entity" || link.edge_type == "semantic",
        "unexpected edge type: {}",
        link.edge_type
    );
    assert!(link.weight >= 0.5, "expected link weight >= 0.5, got {}", link.weight);
}

#[tokio::test]
async fn hub_notes_are_penalized_against_a_specific_match() {
    let (hippo, _dir, _path) = harness().await;

    for i in 0..30 {
        create(&hippo, "general", &format!("Note {i} about the system's common eviction policy discussion.")).await;
    }
    let specific = create(&hippo, "general", "The eviction policy is LRU.").await;

    let outcome = hippo
        .search("eviction policy LRU", 10, SearchOptions::default())
        .await
        .expect("search");

    let top = outcome.results.first().expect("at least one result");
    assert_eq!(top.note_id, specific, "expected the specific note to rank first, got {:?}", outcome.results);
}

#[tokio::test]
async fn temporal_query_surfaces_the_dated_note() {
    let (hippo, _dir, _path) = harness().await;

    for i in 0..20 {
        create(&hippo, "general", &format!("Unrelated note number {i} about lunch and weather.")).await;
    }
    let incident = create(
        &hippo,
        "general",
        "On 2026-02-04 we discovered a security incident affecting the login service.",
    )
    .await;

    let outcome = hippo
        .search("when was the security incident", 10, SearchOptions::default())
        .await
        .expect("search");

    let top = outcome.results.first().expect("at least one result");
    assert_eq!(top.note_id, incident, "expected the incident note to rank first, got {:?}", outcome.results);

    let (_, is_temporal, direction) = hippograph_core::query_decomposer::decompose("when was the security incident");
    assert!(is_temporal);
    assert_eq!(direction, hippograph_core::types::Direction::When);
}

#[tokio::test]
async fn sleep_compute_chains_consecutive_project_notes() {
    let (hippo, _dir, _path) = harness().await;

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(create(&hippo, "project-x", &format!("Project X update {i}: progress continues on schedule.")).await);
    }

    let report = hippo.sleep_compute(false, None).await.expect("sleep_compute");
    assert!(!report.any_critical_failure, "sleep-compute reported a failure: {:?}", report.steps);

    let mut found_chain = false;
    for &id in &ids {
        let graph = hippo.get_graph(id).await.expect("get_graph");
        if graph.connections.iter().any(|c| c.edge_type == "temporal_chain") {
            found_chain = true;
            break;
        }
    }
    assert!(found_chain, "expected at least one temporal_chain edge among consecutive project-x notes");
}

#[tokio::test]
async fn anchor_category_edges_are_protected_from_decay() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("anchor.db");
    let path_str = path.to_str().expect("utf8 path").to_string();

    let store = Arc::new(LibsqlStore::new(&format!("file:{path_str}"), "").await.expect("connect"));
    store.initialize_schema().await.expect("init schema");
    let embedder = Arc::new(MockEmbeddingProvider::default_dimension("anchor-test"));
    let hippo = Hippograph::new(store.clone(), embedder, EntityExtractor::new(), Config::default())
        .await
        .expect("build hippograph");

    let a = create(&hippo, "anchor", "Core identity note about who I am.").await;
    let b = create(&hippo, "anchor", "A related anchor note about my deepest values.").await;

    let edge_type = EdgeType::Relation("related_to".to_string());
    store.create_edge(a, b, 0.6, edge_type.clone()).await.expect("create_edge");

    // Backdate the edge well past stale_edge_days (default 90) via a second
    // raw connection, since `StoreBackend` intentionally exposes no way to
    // set an edge's `created_at` (only sleep-compute and ingestion mint
    // edges, always at "now").
    let raw = libsql::Builder::new_local(&path_str)
        .build()
        .await
        .expect("open raw connection")
        .connect()
        .expect("connect");
    let backdated = (Utc::now() - Duration::days(180)).timestamp();
    raw.execute(
        "UPDATE edges SET created_at = ? WHERE source_id = ? AND target_id = ?",
        libsql::params![backdated, a, b],
    )
    .await
    .expect("backdate edge");

    let report = hippo.sleep_compute(false, None).await.expect("sleep_compute");
    assert!(!report.any_critical_failure, "sleep-compute reported a failure: {:?}", report.steps);

    let graph = hippo.get_graph(a).await.expect("get_graph");
    let edge = graph
        .connections
        .iter()
        .find(|c| c.id == b)
        .expect("edge to b should still exist");
    assert!((edge.weight - 0.6).abs() < f32::EPSILON, "anchor edge weight must not decay, got {}", edge.weight);

    let note_a = hippo.get_graph(a).await.expect("get_graph").node;
    let note_b = hippo.get_graph(b).await.expect("get_graph").node;
    assert_eq!(note_a.importance, hippograph_core::types::Importance::Critical);
    assert_eq!(note_b.importance, hippograph_core::types::Importance::Critical);
}
