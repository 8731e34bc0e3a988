//! [`Hippograph`]: the orchestrator wiring the store, in-RAM caches, and
//! pipelines together behind the public API — holding shared
//! collaborators behind a lock and exposing one call per operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;

use crate::adjacency::AdjacencyCache;
use crate::ann::AnnIndex;
use crate::bm25::Bm25Index;
use crate::config::Config;
use crate::embeddings::EmbeddingProvider;
use crate::entity_extractor::EntityExtractor;
use crate::error::{Error, Result};
use crate::fusion;
use crate::graph_metrics::GraphMetrics;
use crate::ingestion::{self, IngestDraft, IngestOutcome};
use crate::query_decomposer;
use crate::reranker::Reranker;
use crate::retrieval::{self, SearchOptions, SearchOutcome};
use crate::search_logger::SearchLogger;
use crate::sleep::{self, RelationExtractor, SleepReport};
use crate::store::{NoteUpdate, StoreBackend, StoreStats};
use crate::types::{EmotionalContext, Importance, Note, NoteVersion};

/// Connection summary returned by `get_graph`.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: i64,
    pub content: String,
    pub weight: f32,
    pub edge_type: String,
}

/// Result of `get_graph(id)`.
#[derive(Debug, Clone)]
pub struct GraphView {
    pub node: Note,
    pub connections: Vec<Connection>,
}

/// Result of `delete_note(id)`.
#[derive(Debug, Clone)]
pub struct DeleteSummary {
    pub category: String,
    pub content_preview: String,
}

/// One `find_similar` hit.
#[derive(Debug, Clone)]
pub struct SimilarNote {
    pub id: i64,
    pub similarity: f32,
    pub content: String,
}

/// Aggregate system stats, extending [`StoreStats`] with the in-RAM
/// graph-metrics view.
#[derive(Debug, Clone)]
pub struct Stats {
    pub store: StoreStats,
    pub communities: usize,
    pub top_pagerank: Vec<(i64, f32)>,
}

/// The retrieval core's public facade. Holds the durable store, the
/// embedding/entity/rerank/relation-extraction collaborators, and every
/// in-RAM cache behind `parking_lot::RwLock` (short, CPU-bound critical
/// sections). Writes to the store are additionally serialized behind
/// `write_lock`; reads race freely.
pub struct Hippograph {
    store: Arc<dyn StoreBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: EntityExtractor,
    reranker: Option<Arc<dyn Reranker>>,
    relation_extractor: Option<Arc<dyn RelationExtractor>>,
    config: Config,

    ann: RwLock<AnnIndex>,
    bm25: RwLock<Bm25Index>,
    adjacency: RwLock<AdjacencyCache>,
    graph_metrics: RwLock<GraphMetrics>,

    write_lock: AsyncMutex<()>,
    notes_since_sleep: AtomicU64,
}

impl Hippograph {
    /// Build a fresh instance, populating every in-RAM index from the
    /// store's current contents. The ANN index is reconstructed from
    /// `nodes.embedding` rather than persisted separately.
    pub async fn new(
        store: Arc<dyn StoreBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: EntityExtractor,
        config: Config,
    ) -> Result<Self> {
        let nodes = store.get_all_nodes().await?;
        let edges = store.get_all_edges().await?;

        let mut ann = AnnIndex::new(config.embedding_dimension);
        ann.build(&nodes);

        let mut bm25 = Bm25Index::default();
        bm25.build(&nodes.iter().map(|n| (n.id, n.content.clone())).collect::<Vec<_>>());

        let mut adjacency = AdjacencyCache::new();
        adjacency.build(&edges);

        let node_ids: Vec<i64> = nodes.iter().map(|n| n.id).collect();
        let mut graph_metrics = GraphMetrics::default();
        graph_metrics.recompute(&node_ids, &edges);

        Ok(Self {
            store,
            embedder,
            extractor,
            reranker: None,
            relation_extractor: None,
            config,
            ann: RwLock::new(ann),
            bm25: RwLock::new(bm25),
            adjacency: RwLock::new(adjacency),
            graph_metrics: RwLock::new(graph_metrics),
            write_lock: AsyncMutex::new(()),
            notes_since_sleep: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    #[must_use]
    pub fn with_relation_extractor(mut self, extractor: Arc<dyn RelationExtractor>) -> Self {
        self.relation_extractor = Some(extractor);
        self
    }

    /// Ingest a note. The outcome tracks newly-added notes since the last
    /// sleep-compute cycle, so callers can drive the threshold-triggered
    /// scheduler.
    pub async fn add_note(
        &self,
        content: String,
        category: Option<String>,
        importance: Option<Importance>,
        force: bool,
        emotional: Option<EmotionalContext>,
    ) -> Result<IngestOutcome> {
        if content.trim().is_empty() {
            return Err(Error::Validation("content must not be empty".to_string()));
        }
        let _guard = self.write_lock.lock().await;

        let outcome = ingestion::ingest(
            IngestDraft {
                content,
                category,
                importance,
                force,
                emotional,
            },
            self.store.as_ref(),
            self.embedder.as_ref(),
            &self.extractor,
            &self.ann,
            &self.bm25,
            &self.adjacency,
            &self.config,
        )
        .await?;

        if matches!(outcome, IngestOutcome::Created { .. }) {
            self.notes_since_sleep.fetch_add(1, Ordering::Relaxed);
        }
        Ok(outcome)
    }

    /// Whether the threshold-triggered sleep scheduler should fire now, i.e.
    /// enough notes have been added since the last cycle. Callers check this
    /// after `add_note` and invoke `sleep_compute` out of band; this type
    /// does not itself spawn a background task.
    #[must_use]
    pub fn sleep_due_by_count(&self) -> bool {
        self.notes_since_sleep.load(Ordering::Relaxed) >= self.config.sleep_note_threshold
    }

    /// Run the full retrieval pipeline for `query` and log the result.
    pub async fn search(&self, query: &str, limit: usize, options: SearchOptions) -> Result<SearchOutcome> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".to_string()));
        }
        let outcome = retrieval::search(
            query,
            limit,
            options,
            self.store.as_ref(),
            self.embedder.as_ref(),
            &self.ann,
            &self.adjacency,
            &self.bm25,
            self.reranker.as_deref(),
            &self.config,
        )
        .await?;

        let (cleaned, is_temporal, direction) = query_decomposer::decompose(query);
        if let Err(err) = SearchLogger::record(self.store.as_ref(), query, &cleaned, is_temporal, direction, &outcome).await {
            tracing::warn!(error = %err, "failed to persist search log entry");
        }

        Ok(outcome)
    }

    /// Update a note's content and/or category. A content change snapshots
    /// the prior version (store-side, invariant 3) and re-indexes the
    /// embedding/BM25 entry so the caches stay consistent with the new
    /// content.
    pub async fn update_note(&self, id: i64, content: Option<String>, category: Option<String>) -> Result<Note> {
        let _guard = self.write_lock.lock().await;
        let content_changed = content.is_some();
        let new_content = content.clone();

        let note = self
            .store
            .update_node(
                id,
                NoteUpdate {
                    content,
                    category,
                },
            )
            .await?;

        if content_changed {
            if let Some(text) = new_content {
                let embedding = self.embedder.encode(&text).await?;
                self.ann.write().add_vector(id, embedding);
                self.bm25.write().add_document(id, &text);
            }
        }
        Ok(note)
    }

    /// Delete a note and cascade the removal to every in-RAM index
    /// (invariant 6: no edge or entity link survives referencing a deleted
    /// note).
    pub async fn delete_note(&self, id: i64) -> Result<DeleteSummary> {
        let _guard = self.write_lock.lock().await;
        let note = self.store.delete_node(id).await?.ok_or_else(|| Error::not_found(id))?;

        self.ann.write().remove_vector(id);
        self.bm25.write().remove_document(id);
        self.adjacency.write().remove_node(id);

        let preview: String = note.content.chars().take(150).collect();
        Ok(DeleteSummary {
            category: note.category,
            content_preview: preview,
        })
    }

    pub async fn set_importance(&self, id: i64, importance: Importance) -> Result<()> {
        self.store.set_importance(id, importance).await
    }

    /// Find notes whose embedding is within `threshold` cosine similarity
    /// of `content`'s.
    pub async fn find_similar(&self, content: &str, threshold: f32, limit: usize) -> Result<Vec<SimilarNote>> {
        let embedding = self.embedder.encode(content).await?;
        let hits = self.ann.read().search(&embedding, limit, threshold);
        let mut out = Vec::with_capacity(hits.len());
        for (id, similarity) in hits {
            if let Some(note) = self.store.get_node(id).await? {
                out.push(SimilarNote {
                    id,
                    similarity,
                    content: note.content,
                });
            }
        }
        Ok(out)
    }

    /// Fetch a note and its immediate graph neighborhood.
    pub async fn get_graph(&self, id: i64) -> Result<GraphView> {
        let node = self.store.get_node(id).await?.ok_or_else(|| Error::not_found(id))?;
        let connected = self.store.get_connected_nodes(id).await?;
        let mut connections = Vec::with_capacity(connected.len());
        for (neighbor_id, weight, edge_type) in connected {
            if let Some(neighbor) = self.store.get_node(neighbor_id).await? {
                connections.push(Connection {
                    id: neighbor_id,
                    content: neighbor.content,
                    weight,
                    edge_type: edge_type.to_string(),
                });
            }
        }
        Ok(GraphView { node, connections })
    }

    /// Aggregate store and in-RAM graph-metrics stats.
    pub async fn stats(&self) -> Result<Stats> {
        let store_stats = self.store.get_stats().await?;
        let graph_metrics = self.graph_metrics.read();
        Ok(Stats {
            communities: graph_metrics.community_count(),
            top_pagerank: graph_metrics.top_pagerank(10),
            store: store_stats,
        })
    }

    pub async fn history(&self, id: i64, limit: Option<usize>) -> Result<Vec<NoteVersion>> {
        self.store.get_note_history(id, limit).await
    }

    /// Restore a prior version's content, re-embed, and re-index so
    /// ANN/BM25 stay consistent with the restored text.
    pub async fn restore_version(&self, id: i64, version_number: u32) -> Result<Note> {
        let _guard = self.write_lock.lock().await;
        let note = self.store.restore_note_version(id, version_number).await?;
        let embedding = self.embedder.encode(&note.content).await?;
        self.ann.write().add_vector(id, embedding);
        self.bm25.write().add_document(id, &note.content);
        Ok(note)
    }

    pub async fn search_stats(&self, day: DateTime<Utc>) -> Result<crate::store::DailySearchStats> {
        SearchLogger::daily_stats(self.store.as_ref(), day).await
    }

    /// Run a sleep-compute cycle. Resets the threshold counter on a real
    /// (non-dry-run) cycle.
    pub async fn sleep_compute(&self, dry_run: bool, since: Option<DateTime<Utc>>) -> Result<SleepReport> {
        let _guard = self.write_lock.lock().await;

        let report = sleep::run(
            self.store.as_ref(),
            &self.adjacency,
            &self.graph_metrics,
            self.relation_extractor.as_deref(),
            &self.config,
            dry_run,
            since,
        )
        .await?;

        if !dry_run {
            self.notes_since_sleep.store(0, Ordering::Relaxed);
        }
        Ok(report)
    }

    /// Recompute the hub-penalty entity-count batch for an arbitrary set of
    /// notes — exposed for callers building custom scoring on top of the
    /// facade (e.g. tests, admin tooling).
    pub async fn entity_counts(&self, note_ids: &[i64]) -> Result<HashMap<i64, usize>> {
        self.store.get_entity_counts_batch(note_ids).await
    }

    /// Min-max normalize an arbitrary score map using the same helper the
    /// retrieval pipeline uses internally.
    #[must_use]
    pub fn normalize_scores(scores: &HashMap<i64, f32>) -> HashMap<i64, f32> {
        fusion::normalize(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_due_by_count_respects_threshold() {
        let cfg = Config {
            sleep_note_threshold: 2,
            ..Config::default()
        };
        assert_eq!(cfg.sleep_note_threshold, 2);
    }
}
