//! SQL schema for the libSQL-backed store.

/// SQL to create the `nodes` table.
pub const CREATE_NODES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    category TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    last_accessed INTEGER NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    importance TEXT NOT NULL,
    embedding TEXT,
    emotional TEXT,
    event_start INTEGER,
    event_end INTEGER,
    temporal_expressions TEXT NOT NULL DEFAULT '[]'
)
"#;

/// Index on `nodes.category` for category-filtered retrieval and the
/// protected-category sweep.
pub const CREATE_NODES_CATEGORY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_nodes_category
ON nodes(category)
"#;

/// SQL to create the `edges` table. `(source_id, target_id, edge_type)` is
/// the upsert key `create_edge` conflicts on (invariant 5).
pub const CREATE_EDGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS edges (
    source_id INTEGER NOT NULL,
    target_id INTEGER NOT NULL,
    edge_type TEXT NOT NULL,
    weight REAL NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (source_id, target_id, edge_type)
)
"#;

/// Index on `edges.source_id` for adjacency lookups.
pub const CREATE_EDGES_SOURCE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_edges_source
ON edges(source_id)
"#;

/// SQL to create the `entities` table.
pub const CREATE_ENTITIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    entity_type TEXT NOT NULL
)
"#;

/// SQL to create the `node_entities` many-to-many link table.
pub const CREATE_NODE_ENTITIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS node_entities (
    note_id INTEGER NOT NULL,
    entity_id INTEGER NOT NULL,
    PRIMARY KEY (note_id, entity_id)
)
"#;

/// Index on `node_entities.entity_id`, used by `get_nodes_by_entity` and
/// `entity_link_count`.
pub const CREATE_NODE_ENTITIES_ENTITY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_node_entities_entity
ON node_entities(entity_id)
"#;

/// SQL to create the `note_versions` table. Capped client-side at
/// [`hippograph_core::types::MAX_NOTE_VERSIONS`] per note (invariant 7).
pub const CREATE_NOTE_VERSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS note_versions (
    note_id INTEGER NOT NULL,
    version_number INTEGER NOT NULL,
    content TEXT NOT NULL,
    category TEXT NOT NULL,
    importance TEXT NOT NULL,
    recorded_at INTEGER NOT NULL,
    PRIMARY KEY (note_id, version_number)
)
"#;

/// SQL to create the `edge_history` table — conflicting relation assertions
/// discovered during sleep-compute, never overwriting the existing edge.
pub const CREATE_EDGE_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS edge_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL,
    target_id INTEGER NOT NULL,
    existing_type TEXT NOT NULL,
    conflicting_type TEXT NOT NULL,
    recorded_at INTEGER NOT NULL
)
"#;

/// SQL to create the `search_logs` table.
pub const CREATE_SEARCH_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS search_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    cleaned_query TEXT NOT NULL,
    is_temporal INTEGER NOT NULL,
    direction TEXT NOT NULL,
    result_count INTEGER NOT NULL,
    total_activated INTEGER NOT NULL,
    top1_score REAL,
    top5_avg_score REAL,
    embedding_ms REAL NOT NULL,
    ann_ms REAL NOT NULL,
    spreading_ms REAL NOT NULL,
    bm25_ms REAL NOT NULL,
    temporal_ms REAL NOT NULL,
    rerank_ms REAL NOT NULL,
    filters_ms REAL NOT NULL,
    total_ms REAL NOT NULL,
    recorded_at INTEGER NOT NULL
)
"#;

/// Index on `search_logs.recorded_at` for the daily-aggregate query.
pub const CREATE_SEARCH_LOGS_RECORDED_AT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_search_logs_recorded_at
ON search_logs(recorded_at)
"#;

/// SQL to create the `metadata` key-value table — sleep-compute's
/// last-run timestamp and other small singleton facts.
pub const CREATE_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)
"#;

/// All DDL statements, in dependency order, for [`crate::LibsqlStore::initialize_schema`].
#[must_use]
pub fn initialize_schema_sql() -> &'static [&'static str] {
    &[
        CREATE_NODES_TABLE,
        CREATE_NODES_CATEGORY_INDEX,
        CREATE_EDGES_TABLE,
        CREATE_EDGES_SOURCE_INDEX,
        CREATE_ENTITIES_TABLE,
        CREATE_NODE_ENTITIES_TABLE,
        CREATE_NODE_ENTITIES_ENTITY_INDEX,
        CREATE_NOTE_VERSIONS_TABLE,
        CREATE_EDGE_HISTORY_TABLE,
        CREATE_SEARCH_LOGS_TABLE,
        CREATE_SEARCH_LOGS_RECORDED_AT_INDEX,
        CREATE_METADATA_TABLE,
    ]
}
