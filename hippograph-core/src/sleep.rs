//! Sleep-compute consolidation: thematic clustering, temporal chains,
//! typed-relation extraction, edge decay, anchor-note protection, and
//! orphan/duplicate detection. Every step is individually fallible and
//! reported rather than aborting the whole cycle.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::adjacency::AdjacencyCache;
use crate::config::Config;
use crate::embeddings::cosine_similarity;
use crate::error::Result;
use crate::graph_metrics::GraphMetrics;
use crate::store::StoreBackend;
use crate::types::{EdgeHistoryEntry, EdgeType, EntityType, Importance, Note, is_protected_category};

const CONSOLIDATION_SIMILARITY: f32 = 0.75;
const CONSOLIDATION_MIN_CLUSTER: usize = 3;
const CONSOLIDATION_WEIGHT: f32 = 0.9;
const CHAIN_MAX_GAP_DAYS: i64 = 7;
const CHAIN_MIN_LENGTH: usize = 3;
const CHAIN_WEIGHT: f32 = 0.95;
const STALE_DECAY_FACTOR: f32 = 0.95;
const DUPLICATE_SCAN_WINDOW: usize = 50;
const DUPLICATE_SCAN_THRESHOLD: f32 = 0.95;
const RELATION_EDGE_WEIGHT: f32 = 0.6;
const RELATION_CANDIDATE_CAP: usize = 3;

/// A `(subject_entity, relation, object_entity)` triple from a model-based
/// extractor. A real zero-shot model is out of scope here; this trait lets
/// one be plugged in without touching [`run`].
#[async_trait]
pub trait RelationExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> anyhow::Result<Vec<(String, String, String)>>;
}

/// Rule table for heuristic typed-relation extraction:
/// `(subject_type, object_type) -> relation`.
const TYPE_RELATION_RULES: &[((EntityType, EntityType), &str)] = &[
    ((EntityType::Person, EntityType::Organization), "works_for"),
    ((EntityType::Tech, EntityType::Tech), "depends_on"),
    ((EntityType::Person, EntityType::Project), "works_on"),
    ((EntityType::Tech, EntityType::Project), "used_by"),
];

fn rule_relation(a: EntityType, b: EntityType) -> Option<&'static str> {
    TYPE_RELATION_RULES
        .iter()
        .find(|((x, y), _)| (*x == a && *y == b) || (*x == b && *y == a))
        .map(|(_, rel)| *rel)
}

/// Per-step outcome: ok with a human-readable summary, or an error message
/// that did not abort the cycle.
#[derive(Debug, Clone)]
pub enum StepResult {
    Ok(String),
    Failed(String),
}

/// Full sleep-compute report.
#[derive(Debug, Clone, Default)]
pub struct SleepReport {
    pub snapshot_path: Option<String>,
    pub steps: Vec<(&'static str, String)>,
    pub any_critical_failure: bool,
    pub orphan_note_ids: Vec<i64>,
    pub duplicate_pairs: Vec<(i64, i64, f32)>,
}

fn record(report: &mut SleepReport, name: &'static str, result: StepResult) {
    match result {
        StepResult::Ok(msg) => report.steps.push((name, msg)),
        StepResult::Failed(msg) => {
            report.any_critical_failure = true;
            report.steps.push((name, format!("FAILED: {msg}")));
        }
    }
}

/// Run one full sleep-compute cycle. `snapshot` writes a
/// timestamped JSON copy of every note under `cfg.snapshot_dir`, pruning to
/// `cfg.max_snapshots`; pass `dry_run=true` to skip it and every
/// destructive step, running only steps that are safe to preview (graph
/// metrics, orphan/duplicate detection).
pub async fn run(
    store: &dyn StoreBackend,
    adjacency: &RwLock<AdjacencyCache>,
    graph_metrics: &RwLock<GraphMetrics>,
    relation_extractor: Option<&dyn RelationExtractor>,
    cfg: &Config,
    dry_run: bool,
    since: Option<DateTime<Utc>>,
) -> Result<SleepReport> {
    let mut report = SleepReport::default();
    let now = Utc::now();

    if !dry_run {
        match snapshot(store, cfg).await {
            Ok(path) => {
                report.snapshot_path = Some(path.clone());
                record(&mut report, "snapshot", StepResult::Ok(path));
            }
            Err(err) => record(&mut report, "snapshot", StepResult::Failed(err.to_string())),
        }
    }

    let all_nodes = store.get_all_nodes().await?;
    let node_by_id: HashMap<i64, &Note> = all_nodes.iter().map(|n| (n.id, n)).collect();

    if !dry_run {
        match consolidate(store, adjacency, &all_nodes).await {
            Ok(n) => record(&mut report, "consolidation", StepResult::Ok(format!("{n} consolidation/chain edges created"))),
            Err(err) => record(&mut report, "consolidation", StepResult::Failed(err.to_string())),
        }
    }

    {
        let node_ids: Vec<i64> = all_nodes.iter().map(|n| n.id).collect();
        let edges = store.get_all_edges().await?;
        graph_metrics.write().recompute(&node_ids, &edges);
        let community_count = graph_metrics.read().community_count();
        record(&mut report, "graph_metrics", StepResult::Ok(format!("{community_count} communities")));
    }

    if !dry_run {
        match extract_rule_relations(store, adjacency).await {
            Ok(n) => record(&mut report, "typed_relations_rule", StepResult::Ok(format!("{n} edges inserted"))),
            Err(err) => record(&mut report, "typed_relations_rule", StepResult::Failed(err.to_string())),
        }

        match extract_model_relations(store, adjacency, relation_extractor, &all_nodes, since).await {
            Ok(n) => record(&mut report, "typed_relations_model", StepResult::Ok(format!("{n} edges inserted"))),
            Err(err) => record(&mut report, "typed_relations_model", StepResult::Failed(err.to_string())),
        }
    }

    {
        let adjacency = adjacency.read();
        let orphans: Vec<i64> = all_nodes
            .iter()
            .filter(|n| adjacency.neighbors(n.id).len() <= cfg.orphan_min_links)
            .map(|n| n.id)
            .collect();
        drop(adjacency);
        report.orphan_note_ids = orphans.clone();
        record(&mut report, "orphan_detection", StepResult::Ok(format!("{} orphans", orphans.len())));
    }

    if !dry_run {
        match decay_stale_edges(store, &node_by_id, cfg, now).await {
            Ok(n) => record(&mut report, "stale_edge_decay", StepResult::Ok(format!("{n} edges decayed"))),
            Err(err) => record(&mut report, "stale_edge_decay", StepResult::Failed(err.to_string())),
        }

        match anchor_boost(store, &all_nodes).await {
            Ok(n) => record(&mut report, "anchor_boost", StepResult::Ok(format!("{n} notes promoted"))),
            Err(err) => record(&mut report, "anchor_boost", StepResult::Failed(err.to_string())),
        }
    }

    {
        let pairs = duplicate_scan(&all_nodes);
        report.duplicate_pairs = pairs.clone();
        record(&mut report, "duplicate_scan", StepResult::Ok(format!("{} pairs", pairs.len())));
    }

    if !dry_run {
        match store.set_metadata("last_sleep_at", &now.to_rfc3339()).await {
            Ok(()) => record(&mut report, "metadata", StepResult::Ok("last_sleep_at updated".to_string())),
            Err(err) => record(&mut report, "metadata", StepResult::Failed(err.to_string())),
        }
    }

    Ok(report)
}

async fn snapshot(store: &dyn StoreBackend, cfg: &Config) -> Result<String> {
    let nodes = store.get_all_nodes().await?;
    let dir = std::path::Path::new(&cfg.snapshot_dir);
    std::fs::create_dir_all(dir)?;
    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let path = dir.join(format!("snapshot-{timestamp}.json"));
    let bytes = serde_json::to_vec(&nodes)?;
    std::fs::write(&path, bytes)?;
    prune_old_snapshots(dir, cfg.max_snapshots)?;
    Ok(path.display().to_string())
}

fn prune_old_snapshots(dir: &std::path::Path, keep: usize) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("snapshot-"))
        .collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);
    while entries.len() > keep {
        let oldest = entries.remove(0);
        let _ = std::fs::remove_file(oldest.path());
    }
    Ok(())
}

async fn consolidate(store: &dyn StoreBackend, adjacency: &RwLock<AdjacencyCache>, nodes: &[Note]) -> Result<usize> {
    let mut created = 0usize;
    let embedded: Vec<(&Note, &Vec<f32>)> = nodes.iter().filter_map(|n| n.embedding.as_ref().map(|e| (n, e))).collect();

    // Thematic clusters: connected components under a similarity threshold.
    let mut parent: HashMap<i64, i64> = embedded.iter().map(|(n, _)| (n.id, n.id)).collect();
    fn find(parent: &mut HashMap<i64, i64>, x: i64) -> i64 {
        let p = parent[&x];
        if p == x {
            x
        } else {
            let root = find(parent, p);
            parent.insert(x, root);
            root
        }
    }
    for (i, (a, a_embedding)) in embedded.iter().enumerate() {
        for (b, b_embedding) in &embedded[i + 1..] {
            let sim = cosine_similarity(a_embedding, b_embedding);
            if sim >= CONSOLIDATION_SIMILARITY {
                let ra = find(&mut parent, a.id);
                let rb = find(&mut parent, b.id);
                if ra != rb {
                    parent.insert(ra, rb);
                }
            }
        }
    }
    let mut clusters: HashMap<i64, Vec<i64>> = HashMap::new();
    for (n, _) in &embedded {
        let root = find(&mut parent, n.id);
        clusters.entry(root).or_default().push(n.id);
    }
    for members in clusters.values().filter(|m| m.len() >= CONSOLIDATION_MIN_CLUSTER) {
        for (i, &a) in members.iter().enumerate() {
            for &b in &members[i + 1..] {
                store.create_edge(a, b, CONSOLIDATION_WEIGHT, EdgeType::Consolidation).await?;
                store.create_edge(b, a, CONSOLIDATION_WEIGHT, EdgeType::Consolidation).await?;
                adjacency.write().add_edge(a, b, CONSOLIDATION_WEIGHT, EdgeType::Consolidation);
                adjacency.write().add_edge(b, a, CONSOLIDATION_WEIGHT, EdgeType::Consolidation);
                created += 1;
            }
        }
    }

    // Temporal chains: per-category sequences with small gaps.
    let mut by_category: HashMap<&str, Vec<&Note>> = HashMap::new();
    for n in nodes {
        by_category.entry(n.category.as_str()).or_default().push(n);
    }
    for members in by_category.values_mut() {
        members.sort_by_key(|n| n.created_at);
        let mut run: Vec<&Note> = Vec::new();
        for pair in members.windows(2) {
            let gap = (pair[1].created_at - pair[0].created_at).num_days();
            if run.is_empty() {
                run.push(pair[0]);
            }
            if gap <= CHAIN_MAX_GAP_DAYS {
                run.push(pair[1]);
            } else {
                if run.len() >= CHAIN_MIN_LENGTH {
                    created += link_chain(store, adjacency, &run).await?;
                }
                run.clear();
                run.push(pair[1]);
            }
        }
        if run.len() >= CHAIN_MIN_LENGTH {
            created += link_chain(store, adjacency, &run).await?;
        }
    }

    Ok(created)
}

async fn link_chain(store: &dyn StoreBackend, adjacency: &RwLock<AdjacencyCache>, run: &[&Note]) -> Result<usize> {
    let mut created = 0usize;
    for pair in run.windows(2) {
        store.create_edge(pair[0].id, pair[1].id, CHAIN_WEIGHT, EdgeType::TemporalChain).await?;
        store.create_edge(pair[1].id, pair[0].id, CHAIN_WEIGHT, EdgeType::TemporalChain).await?;
        adjacency.write().add_edge(pair[0].id, pair[1].id, CHAIN_WEIGHT, EdgeType::TemporalChain);
        adjacency.write().add_edge(pair[1].id, pair[0].id, CHAIN_WEIGHT, EdgeType::TemporalChain);
        created += 1;
    }
    Ok(created)
}

async fn extract_rule_relations(store: &dyn StoreBackend, adjacency: &RwLock<AdjacencyCache>) -> Result<usize> {
    let entities = store.get_all_entities().await?;
    let mut created = 0usize;
    for (i, a) in entities.iter().enumerate() {
        for b in &entities[i + 1..] {
            let Some(relation) = rule_relation(a.entity_type, b.entity_type) else { continue };
            let notes_a = store.get_nodes_by_entity(a.id).await?;
            let notes_b = store.get_nodes_by_entity(b.id).await?;
            for &source in &notes_a {
                for &target in &notes_b {
                    if source == target {
                        continue;
                    }
                    let existing = store.get_connected_nodes(source).await?;
                    if existing.iter().any(|(n, _, _)| *n == target) {
                        continue;
                    }
                    let edge_type = EdgeType::Relation(relation.to_string());
                    store.create_edge(source, target, RELATION_EDGE_WEIGHT, edge_type.clone()).await?;
                    adjacency.write().add_edge(source, target, RELATION_EDGE_WEIGHT, edge_type);
                    created += 1;
                }
            }
        }
    }
    Ok(created)
}

async fn extract_model_relations(
    store: &dyn StoreBackend,
    adjacency: &RwLock<AdjacencyCache>,
    relation_extractor: Option<&dyn RelationExtractor>,
    nodes: &[Note],
    since: Option<DateTime<Utc>>,
) -> Result<usize> {
    let Some(extractor) = relation_extractor else {
        tracing::warn!("relation extraction model unavailable, skipping model-based typed-relation extraction");
        return Ok(0);
    };

    let recent: Vec<&Note> = nodes
        .iter()
        .filter(|n| since.is_none_or(|cutoff| n.created_at >= cutoff))
        .collect();
    let entities = store.get_all_entities().await?;
    let mut created = 0usize;

    for note in recent {
        let triples = match extractor.extract(&note.content).await {
            Ok(t) => t,
            Err(err) => {
                tracing::warn!(error = %err, note_id = note.id, "relation extraction failed for note");
                continue;
            }
        };
        for (subject, relation, object) in triples {
            let subject_entities: Vec<_> = entities
                .iter()
                .filter(|e| e.name.eq_ignore_ascii_case(&subject))
                .take(RELATION_CANDIDATE_CAP)
                .collect();
            let object_entities: Vec<_> = entities
                .iter()
                .filter(|e| e.name.eq_ignore_ascii_case(&object))
                .take(RELATION_CANDIDATE_CAP)
                .collect();

            for subject_entity in &subject_entities {
                for object_entity in &object_entities {
                    let sources = store.get_nodes_by_entity(subject_entity.id).await?;
                    let targets = store.get_nodes_by_entity(object_entity.id).await?;
                    for &source in sources.iter().take(RELATION_CANDIDATE_CAP) {
                        for &target in targets.iter().take(RELATION_CANDIDATE_CAP) {
                            if source == target {
                                continue;
                            }
                            let existing = store.get_connected_nodes(source).await?;
                            if let Some((_, _, existing_type)) = existing.iter().find(|(n, _, _)| *n == target) {
                                if *existing_type != EdgeType::Relation(relation.clone()) {
                                    store
                                        .append_edge_history(EdgeHistoryEntry {
                                            source_id: source,
                                            target_id: target,
                                            existing_type: existing_type.clone(),
                                            conflicting_type: EdgeType::Relation(relation.clone()),
                                            recorded_at: Utc::now(),
                                        })
                                        .await?;
                                }
                                continue;
                            }
                            let edge_type = EdgeType::Relation(relation.clone());
                            store.create_edge(source, target, RELATION_EDGE_WEIGHT, edge_type.clone()).await?;
                            adjacency.write().add_edge(source, target, RELATION_EDGE_WEIGHT, edge_type);
                            created += 1;
                        }
                    }
                }
            }
        }
    }
    Ok(created)
}

async fn decay_stale_edges(
    store: &dyn StoreBackend,
    node_by_id: &HashMap<i64, &Note>,
    cfg: &Config,
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut decayed = 0usize;
    let cutoff = now - Duration::days(cfg.stale_edge_days);
    for edge in store.get_all_edges().await? {
        if edge.created_at > cutoff || edge.weight <= 0.3 {
            continue;
        }
        let source_protected = node_by_id.get(&edge.source_id).is_some_and(|n| is_protected_category(&n.category));
        let target_protected = node_by_id.get(&edge.target_id).is_some_and(|n| is_protected_category(&n.category));
        if source_protected || target_protected {
            continue;
        }
        store
            .set_edge_weight(edge.source_id, edge.target_id, &edge.edge_type, edge.weight * STALE_DECAY_FACTOR)
            .await?;
        decayed += 1;
    }
    Ok(decayed)
}

async fn anchor_boost(store: &dyn StoreBackend, nodes: &[Note]) -> Result<usize> {
    let mut promoted = 0usize;
    for note in nodes {
        if is_protected_category(&note.category) && note.importance != Importance::Critical {
            store.set_importance(note.id, Importance::Critical).await?;
            promoted += 1;
        }
    }
    Ok(promoted)
}

fn duplicate_scan(nodes: &[Note]) -> Vec<(i64, i64, f32)> {
    let mut sorted: Vec<(&Note, &Vec<f32>)> = nodes.iter().filter_map(|n| n.embedding.as_ref().map(|e| (n, e))).collect();
    sorted.sort_by_key(|(n, _)| n.id);
    let mut pairs = Vec::new();
    for (i, (a, a_embedding)) in sorted.iter().enumerate() {
        for (b, b_embedding) in sorted.iter().skip(i + 1).take(DUPLICATE_SCAN_WINDOW) {
            let sim = cosine_similarity(a_embedding, b_embedding);
            if sim >= DUPLICATE_SCAN_THRESHOLD {
                pairs.push((a.id, b.id, sim));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: i64, category: &str, importance: Importance, embedding: Option<Vec<f32>>) -> Note {
        Note {
            id,
            content: String::new(),
            category: category.to_string(),
            created_at: Utc::now(),
            last_accessed: Utc::now(),
            access_count: 0,
            importance,
            embedding,
            emotional: None,
            event_start: None,
            event_end: None,
            temporal_expressions: vec![],
        }
    }

    #[test]
    fn rule_relation_matches_regardless_of_argument_order() {
        assert_eq!(rule_relation(EntityType::Person, EntityType::Organization), Some("works_for"));
        assert_eq!(rule_relation(EntityType::Organization, EntityType::Person), Some("works_for"));
        assert_eq!(rule_relation(EntityType::Location, EntityType::Event), None);
    }

    #[test]
    fn duplicate_scan_flags_near_identical_embeddings() {
        let nodes = vec![
            note(1, "general", Importance::Normal, Some(vec![1.0, 0.0, 0.0])),
            note(2, "general", Importance::Normal, Some(vec![0.999, 0.001, 0.0])),
            note(3, "general", Importance::Normal, Some(vec![0.0, 1.0, 0.0])),
        ];
        let pairs = duplicate_scan(&nodes);
        assert!(pairs.iter().any(|&(a, b, _)| (a, b) == (1, 2)));
        assert!(!pairs.iter().any(|&(a, b, _)| (a, b) == (1, 3)));
    }
}
