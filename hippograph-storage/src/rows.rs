//! Row <-> domain-type conversions shared by the `StoreBackend` methods.

use chrono::{DateTime, Utc};
use hippograph_core::error::{Error, Result};
use hippograph_core::types::{
    EdgeType, EmotionalContext, Entity, EntityType, Importance, Note, NoteVersion,
    TemporalExpression,
};

fn timestamp_to_datetime(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::Corruption(format!("invalid timestamp: {secs}")))
}

pub(crate) fn datetime_to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

/// `SELECT id, content, category, created_at, last_accessed, access_count,
/// importance, embedding, emotional, event_start, event_end,
/// temporal_expressions FROM nodes ...`
pub(crate) fn row_to_note(row: &libsql::Row) -> Result<Note> {
    let id: i64 = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
    let content: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
    let category: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
    let created_at: i64 = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
    let last_accessed: i64 = row.get(4).map_err(|e| Error::Storage(e.to_string()))?;
    let access_count: i64 = row.get(5).map_err(|e| Error::Storage(e.to_string()))?;
    let importance: String = row.get(6).map_err(|e| Error::Storage(e.to_string()))?;
    let embedding_json: Option<String> = row.get(7).ok();
    let emotional_json: Option<String> = row.get(8).ok();
    let event_start: Option<i64> = row.get(9).ok();
    let event_end: Option<i64> = row.get(10).ok();
    let temporal_expressions_json: String =
        row.get(11).map_err(|e| Error::Storage(e.to_string()))?;

    let embedding = embedding_json
        .map(|s| serde_json::from_str::<Vec<f32>>(&s))
        .transpose()?;
    let emotional = emotional_json
        .map(|s| serde_json::from_str::<EmotionalContext>(&s))
        .transpose()?;
    let temporal_expressions: Vec<TemporalExpression> =
        serde_json::from_str(&temporal_expressions_json)?;

    Ok(Note {
        id,
        content,
        category,
        created_at: timestamp_to_datetime(created_at)?,
        last_accessed: timestamp_to_datetime(last_accessed)?,
        #[allow(clippy::cast_sign_loss)]
        access_count: access_count as u64,
        importance: importance
            .parse()
            .map_err(|_| Error::Corruption(format!("bad importance in row: {importance}")))?,
        embedding,
        emotional,
        event_start: event_start.map(timestamp_to_datetime).transpose()?,
        event_end: event_end.map(timestamp_to_datetime).transpose()?,
        temporal_expressions,
    })
}

/// `SELECT source_id, target_id, edge_type, weight, created_at FROM edges ...`
pub(crate) fn row_to_edge(row: &libsql::Row) -> Result<hippograph_core::types::Edge> {
    let source_id: i64 = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
    let target_id: i64 = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
    let edge_type: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
    let weight: f64 = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
    let created_at: i64 = row.get(4).map_err(|e| Error::Storage(e.to_string()))?;

    Ok(hippograph_core::types::Edge {
        source_id,
        target_id,
        #[allow(clippy::cast_possible_truncation)]
        weight: weight as f32,
        edge_type: EdgeType::parse(&edge_type),
        created_at: timestamp_to_datetime(created_at)?,
    })
}

/// `SELECT id, name, entity_type FROM entities ...`
pub(crate) fn row_to_entity(row: &libsql::Row) -> Result<Entity> {
    let id: i64 = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
    let name: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
    let entity_type: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;

    Ok(Entity {
        id,
        name,
        entity_type: entity_type
            .parse::<EntityType>()
            .map_err(|_| Error::Corruption(format!("bad entity type in row: {entity_type}")))?,
    })
}

/// `SELECT note_id, version_number, content, category, importance,
/// recorded_at FROM note_versions ...`
pub(crate) fn row_to_note_version(row: &libsql::Row) -> Result<NoteVersion> {
    let note_id: i64 = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
    let version_number: i64 = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
    let content: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
    let category: String = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
    let importance: String = row.get(4).map_err(|e| Error::Storage(e.to_string()))?;
    let recorded_at: i64 = row.get(5).map_err(|e| Error::Storage(e.to_string()))?;

    Ok(NoteVersion {
        note_id,
        #[allow(clippy::cast_sign_loss)]
        version_number: version_number as u32,
        content,
        category,
        importance: importance
            .parse()
            .map_err(|_| Error::Corruption(format!("bad importance in row: {importance}")))?,
        recorded_at: timestamp_to_datetime(recorded_at)?,
    })
}

pub(crate) fn importance_to_string(importance: Importance) -> String {
    importance.to_string()
}
