//! The [`StoreBackend`] trait: the persistence contract. A concrete
//! implementation (e.g. `hippograph-storage`, the libSQL-backed crate)
//! provides durable storage; the retrieval/ingestion pipelines here depend
//! only on this trait — indices are injected collaborators, not
//! lazily-created globals.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    EdgeHistoryEntry, EdgeType, EmotionalContext, Entity, EntityType, Importance, Note,
    NoteVersion, SearchLogEntry, TemporalExpression,
};

/// Everything needed to create a new note, prior to the store assigning it
/// an id.
#[derive(Debug, Clone)]
pub struct NewNote {
    pub content: String,
    pub category: String,
    pub importance: Importance,
    pub embedding: Option<Vec<f32>>,
    pub emotional: Option<EmotionalContext>,
    pub event_start: Option<DateTime<Utc>>,
    pub event_end: Option<DateTime<Utc>>,
    pub temporal_expressions: Vec<TemporalExpression>,
}

/// Partial update applied by `update_note`. Content changes trigger a
/// version snapshot of the prior state (invariant 3); category changes do
/// not.
#[derive(Debug, Clone, Default)]
pub struct NoteUpdate {
    pub content: Option<String>,
    pub category: Option<String>,
}

/// Aggregate counts returned by `stats()`.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub total_entities: usize,
    pub nodes_by_category: HashMap<String, usize>,
    pub edges_by_type: HashMap<String, usize>,
}

/// Daily aggregate of search-log rows.
#[derive(Debug, Clone, Default)]
pub struct DailySearchStats {
    pub query_count: usize,
    pub zero_result_count: usize,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub avg_top1_score: f64,
    pub avg_embedding_ms: f64,
    pub avg_ann_ms: f64,
    pub avg_spreading_ms: f64,
    pub avg_bm25_ms: f64,
    pub avg_temporal_ms: f64,
    pub avg_rerank_ms: f64,
    pub avg_filters_ms: f64,
}

/// Persistent store of notes, edges, entities, note-entity links, note
/// versions, edge history, and search logs. Single-writer discipline:
/// implementations must serialize writes behind one lock or queue; reads
/// may be concurrent.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Assigns a new monotonic id and persists the note.
    async fn create_node(&self, draft: NewNote) -> Result<Note>;

    async fn get_node(&self, id: i64) -> Result<Option<Note>>;

    /// Applies `update`, first snapshotting the prior state into
    /// `note_versions` if `content` changes (invariant 3, capped at
    /// [`crate::types::MAX_NOTE_VERSIONS`], invariant 7).
    async fn update_node(&self, id: i64, update: NoteUpdate) -> Result<Note>;

    /// Cascades to edges and `node_entities` rows referencing `id`
    /// (invariant 1, invariant 6 of the round-trip tests).
    async fn delete_node(&self, id: i64) -> Result<Option<Note>>;

    /// Updates `last_accessed` to now and increments `access_count`.
    async fn touch_node(&self, id: i64) -> Result<()>;

    async fn set_importance(&self, id: i64, importance: Importance) -> Result<()>;

    /// Upserts the edge: on conflict with an existing `(source, target,
    /// type)` row, keeps the maximum weight (decay only ever lowers
    /// weight; ingestion only ever raises it — invariant 5).
    async fn create_edge(
        &self,
        source_id: i64,
        target_id: i64,
        weight: f32,
        edge_type: EdgeType,
    ) -> Result<()>;

    /// Directly overwrites an edge's weight — used only by the sleep-compute
    /// decay step, which is explicitly allowed to lower weight outside the
    /// upsert-max rule `create_edge` enforces.
    async fn set_edge_weight(
        &self,
        source_id: i64,
        target_id: i64,
        edge_type: &EdgeType,
        weight: f32,
    ) -> Result<()>;

    async fn get_connected_nodes(&self, id: i64) -> Result<Vec<(i64, f32, EdgeType)>>;

    async fn get_all_edges(&self) -> Result<Vec<crate::types::Edge>>;

    async fn get_or_create_entity(&self, name: &str, entity_type: EntityType) -> Result<Entity>;

    async fn link_node_to_entity(&self, note_id: i64, entity_id: i64) -> Result<()>;

    async fn get_nodes_by_entity(&self, entity_id: i64) -> Result<Vec<i64>>;

    async fn get_all_entities(&self) -> Result<Vec<Entity>>;

    /// Removes the entity row; callers must have already confirmed no
    /// surviving `node_entities` link.
    async fn delete_entity(&self, entity_id: i64) -> Result<()>;

    async fn entity_link_count(&self, entity_id: i64) -> Result<usize>;

    /// Returns `note_id -> entity_count`, used by the hub penalty.
    async fn get_entity_counts_batch(&self, note_ids: &[i64]) -> Result<HashMap<i64, usize>>;

    async fn get_all_nodes(&self) -> Result<Vec<Note>>;

    async fn save_note_version(&self, version: NoteVersion) -> Result<()>;

    async fn get_note_history(&self, note_id: i64, limit: Option<usize>) -> Result<Vec<NoteVersion>>;

    /// Restores the content/category/importance of `version_number`,
    /// first snapshotting the pre-restore state as a new version.
    async fn restore_note_version(&self, note_id: i64, version_number: u32) -> Result<Note>;

    async fn append_edge_history(&self, entry: EdgeHistoryEntry) -> Result<()>;

    async fn append_search_log(&self, entry: SearchLogEntry) -> Result<()>;

    async fn daily_search_stats(&self, day: DateTime<Utc>) -> Result<DailySearchStats>;

    async fn get_stats(&self) -> Result<StoreStats>;

    async fn set_metadata(&self, key: &str, value: &str) -> Result<()>;

    async fn get_metadata(&self, key: &str) -> Result<Option<String>>;
}
