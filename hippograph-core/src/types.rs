//! The data model: [`Note`], [`Edge`], [`Entity`], [`NoteEntity`],
//! [`NoteVersion`], [`EdgeHistoryEntry`], [`SearchLogEntry`], and the small
//! closed-set tagged unions (`Importance`, `EdgeType`, `EntityType`,
//! `DetailMode`, `FusionMethod`, `Direction`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Importance tier. `critical > normal > low` in the retrieval multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Critical,
    Normal,
    Low,
}

impl Importance {
    /// Multiplier applied during the per-node boost stage.
    #[must_use]
    pub fn factor(self) -> f32 {
        match self {
            Importance::Critical => 1.5,
            Importance::Normal => 1.0,
            Importance::Low => 0.7,
        }
    }
}

impl Default for Importance {
    fn default() -> Self {
        Importance::Normal
    }
}

impl std::str::FromStr for Importance {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Importance::Critical),
            "normal" => Ok(Importance::Normal),
            "low" => Ok(Importance::Low),
            other => Err(crate::error::Error::Validation(format!(
                "unknown importance: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Importance::Critical => "critical",
            Importance::Normal => "normal",
            Importance::Low => "low",
        };
        f.write_str(s)
    }
}

/// Directed edge types. Semantically undirected in scoring — both
/// directions are stored explicitly (invariant 2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Semantic,
    Entity,
    Consolidation,
    TemporalChain,
    /// A typed relation produced by sleep-compute relation extraction
    /// (`works_for`, `uses`, `depends_on`, `related_to`, …). Open
    /// vocabulary: the name is carried as a string rather than enumerated
    /// further since the rule table and the zero-shot extractor both mint
    /// new relation names.
    Relation(String),
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeType::Semantic => f.write_str("semantic"),
            EdgeType::Entity => f.write_str("entity"),
            EdgeType::Consolidation => f.write_str("consolidation"),
            EdgeType::TemporalChain => f.write_str("temporal_chain"),
            EdgeType::Relation(name) => f.write_str(name),
        }
    }
}

impl EdgeType {
    /// Parse a persisted edge-type string back into the tagged union.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "semantic" => EdgeType::Semantic,
            "entity" => EdgeType::Entity,
            "consolidation" => EdgeType::Consolidation,
            "temporal_chain" => EdgeType::TemporalChain,
            other => EdgeType::Relation(other.to_string()),
        }
    }
}

/// Entity categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Tech,
    Concept,
    Product,
    Project,
    Event,
    Temporal,
    CreativeWork,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Tech => "tech",
            EntityType::Concept => "concept",
            EntityType::Product => "product",
            EntityType::Project => "project",
            EntityType::Event => "event",
            EntityType::Temporal => "temporal",
            EntityType::CreativeWork => "creative_work",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for EntityType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "person" => EntityType::Person,
            "organization" => EntityType::Organization,
            "location" => EntityType::Location,
            "tech" => EntityType::Tech,
            "concept" => EntityType::Concept,
            "product" => EntityType::Product,
            "project" => EntityType::Project,
            "event" => EntityType::Event,
            "temporal" => EntityType::Temporal,
            "creative_work" => EntityType::CreativeWork,
            other => {
                return Err(crate::error::Error::Validation(format!(
                    "unknown entity type: {other}"
                )));
            }
        })
    }
}

/// Result detail level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailMode {
    Brief,
    Full,
}

impl Default for DetailMode {
    fn default() -> Self {
        DetailMode::Full
    }
}

/// Fusion strategy. Equivalent-semantics, different-robustness options —
/// both are first-class, not a default vs a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    Blend,
    Rrf,
}

impl Default for FusionMethod {
    fn default() -> Self {
        FusionMethod::Blend
    }
}

/// Temporal query direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    When,
    Before,
    After,
    Order,
    None,
}

/// A single resolved (or unresolved) temporal expression found in a note's
/// text — a typed sidecar rather than an ad-hoc JSON blob column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalExpression {
    /// The literal substring matched in the source text.
    pub literal: String,
    /// Which extractor category produced it (see
    /// [`crate::temporal_extractor::TemporalKind`]).
    pub kind: String,
    /// The interval it resolved to, if any.
    pub resolved: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// The optional emotional triple, populated when `ENABLE_EMOTIONAL_MEMORY`
/// is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalContext {
    pub tone: String,
    /// Intensity on a 0..=10 scale.
    pub intensity: u8,
    pub reflection: String,
}

/// Primary knowledge unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub content: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub importance: Importance,
    /// Absent transiently: a note can exist in the store for a moment
    /// before its embedding has been computed and attached.
    pub embedding: Option<Vec<f32>>,
    pub emotional: Option<EmotionalContext>,
    pub event_start: Option<DateTime<Utc>>,
    pub event_end: Option<DateTime<Utc>>,
    pub temporal_expressions: Vec<TemporalExpression>,
}

impl Note {
    /// `last_accessed`, falling back to `created_at` — the timestamp the
    /// recency boost decays against.
    #[must_use]
    pub fn recency_anchor(&self) -> DateTime<Utc> {
        self.last_accessed
    }
}

/// The fixed set of categories immune to edge decay and periodically
/// upgraded to `critical` importance (invariant 6).
pub const PROTECTED_CATEGORIES: &[&str] = &[
    "anchor",
    "self-reflection",
    "relational-context",
    "gratitude",
    "milestone",
    "protocol",
    "security",
    "breakthrough",
];

/// Whether `category` is in the protected set.
#[must_use]
pub fn is_protected_category(category: &str) -> bool {
    PROTECTED_CATEGORIES.contains(&category)
}

/// Default category for notes that don't specify one.
pub const DEFAULT_CATEGORY: &str = "general";

/// Directed typed relation between two notes. Weight is only ever
/// decreased by decay and only ever increased by explicit ingestion
/// (invariant 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: i64,
    pub target_id: i64,
    pub weight: f32,
    pub edge_type: EdgeType,
    pub created_at: DateTime<Utc>,
}

/// `(id, name, type)`. `name` is unique, case-preserved but matched
/// case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    pub entity_type: EntityType,
}

/// Many-to-many link `(note_id, entity_id)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NoteEntity {
    pub note_id: i64,
    pub entity_id: i64,
}

/// Append-only history row, keyed by `(note_id, version_number)`. At most
/// 5 retained per note (invariant 7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteVersion {
    pub note_id: i64,
    pub version_number: u32,
    pub content: String,
    pub category: String,
    pub importance: Importance,
    pub recorded_at: DateTime<Utc>,
}

/// Maximum number of versions retained per note (invariant 7).
pub const MAX_NOTE_VERSIONS: u32 = 5;

/// A conflicting relation assertion discovered during deep sleep. Never
/// overwrites the existing edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeHistoryEntry {
    pub source_id: i64,
    pub target_id: i64,
    pub existing_type: EdgeType,
    pub conflicting_type: EdgeType,
    pub recorded_at: DateTime<Utc>,
}

/// Per-query record persisted by the search logger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchLogEntry {
    pub query: String,
    pub cleaned_query: String,
    pub is_temporal: bool,
    pub direction: Direction,
    pub result_count: usize,
    pub total_activated: usize,
    pub top1_score: Option<f32>,
    pub top5_avg_score: Option<f32>,
    pub latency: PhaseLatencies,
    pub recorded_at: DateTime<Utc>,
}

/// Per-phase latency breakdown, all in milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PhaseLatencies {
    pub embedding_ms: f64,
    pub ann_ms: f64,
    pub spreading_ms: f64,
    pub bm25_ms: f64,
    pub temporal_ms: f64,
    pub rerank_ms: f64,
    pub filters_ms: f64,
    pub total_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_ordering() {
        assert!(Importance::Critical.factor() > Importance::Normal.factor());
        assert!(Importance::Normal.factor() > Importance::Low.factor());
    }

    #[test]
    fn edge_type_roundtrip() {
        for s in ["semantic", "entity", "consolidation", "temporal_chain", "works_for"] {
            assert_eq!(EdgeType::parse(s).to_string(), s);
        }
    }

    #[test]
    fn protected_categories_contains_anchor() {
        assert!(is_protected_category("anchor"));
        assert!(!is_protected_category("general"));
    }

    #[test]
    fn importance_from_str_rejects_unknown() {
        assert!("bogus".parse::<Importance>().is_err());
        assert_eq!("critical".parse::<Importance>().unwrap(), Importance::Critical);
    }
}
