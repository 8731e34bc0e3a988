//! [`hippograph_core::StoreBackend`] implementation for [`crate::LibsqlStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hippograph_core::error::{Error, Result};
use hippograph_core::search_logger::percentile;
use hippograph_core::store::{DailySearchStats, NewNote, NoteUpdate, StoreBackend, StoreStats};
use hippograph_core::types::{
    Edge, EdgeHistoryEntry, EdgeType, Entity, EntityType, Importance, Note, NoteVersion,
    SearchLogEntry, MAX_NOTE_VERSIONS,
};

use crate::rows::{
    datetime_to_timestamp, importance_to_string, row_to_edge, row_to_entity, row_to_note,
    row_to_note_version,
};
use crate::LibsqlStore;

/// Placeholder sequence `?,?,...,?` of length `n`, for dynamic `IN (...)` clauses.
fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(",")
}

#[async_trait]
impl StoreBackend for LibsqlStore {
    async fn create_node(&self, draft: NewNote) -> Result<Note> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connection()?;
        let now = Utc::now();

        let embedding_json = draft.embedding.as_ref().map(serde_json::to_string).transpose()?;
        let emotional_json = draft.emotional.as_ref().map(serde_json::to_string).transpose()?;
        let temporal_expressions_json = serde_json::to_string(&draft.temporal_expressions)?;

        conn.execute(
            r#"
            INSERT INTO nodes (
                content, category, created_at, last_accessed, access_count,
                importance, embedding, emotional, event_start, event_end,
                temporal_expressions
            ) VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?)
            "#,
            libsql::params![
                draft.content.clone(),
                draft.category.clone(),
                datetime_to_timestamp(now),
                datetime_to_timestamp(now),
                importance_to_string(draft.importance),
                embedding_json,
                emotional_json,
                draft.event_start.map(datetime_to_timestamp),
                draft.event_end.map(datetime_to_timestamp),
                temporal_expressions_json,
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to insert node: {e}")))?;

        let id = conn.last_insert_rowid();

        Ok(Note {
            id,
            content: draft.content,
            category: draft.category,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            importance: draft.importance,
            embedding: draft.embedding,
            emotional: draft.emotional,
            event_start: draft.event_start,
            event_end: draft.event_end,
            temporal_expressions: draft.temporal_expressions,
        })
    }

    async fn get_node(&self, id: i64) -> Result<Option<Note>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                r#"
                SELECT id, content, category, created_at, last_accessed, access_count,
                       importance, embedding, emotional, event_start, event_end,
                       temporal_expressions
                FROM nodes WHERE id = ?
                "#,
                libsql::params![id],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to query node: {e}")))?;

        match rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            Some(row) => Ok(Some(row_to_note(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_node(&self, id: i64, update: NoteUpdate) -> Result<Note> {
        let _guard = self.write_lock.lock().await;
        let existing = self.get_node(id).await?.ok_or(Error::NotFound(id))?;

        if let Some(ref new_content) = update.content {
            if *new_content != existing.content {
                self.snapshot_version(&existing).await?;
            }
        }

        let content = update.content.unwrap_or(existing.content);
        let category = update.category.unwrap_or(existing.category);

        let conn = self.connection()?;
        conn.execute(
            "UPDATE nodes SET content = ?, category = ? WHERE id = ?",
            libsql::params![content.clone(), category.clone(), id],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to update node: {e}")))?;

        Ok(Note {
            content,
            category,
            ..existing
        })
    }

    async fn delete_node(&self, id: i64) -> Result<Option<Note>> {
        let _guard = self.write_lock.lock().await;
        let Some(existing) = self.get_node(id).await? else {
            return Ok(None);
        };

        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM edges WHERE source_id = ? OR target_id = ?",
            libsql::params![id, id],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to delete edges: {e}")))?;
        conn.execute(
            "DELETE FROM node_entities WHERE note_id = ?",
            libsql::params![id],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to delete node_entities: {e}")))?;
        conn.execute(
            "DELETE FROM note_versions WHERE note_id = ?",
            libsql::params![id],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to delete note_versions: {e}")))?;
        conn.execute("DELETE FROM nodes WHERE id = ?", libsql::params![id])
            .await
            .map_err(|e| Error::Storage(format!("failed to delete node: {e}")))?;

        Ok(Some(existing))
    }

    async fn touch_node(&self, id: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connection()?;
        conn.execute(
            "UPDATE nodes SET last_accessed = ?, access_count = access_count + 1 WHERE id = ?",
            libsql::params![datetime_to_timestamp(Utc::now()), id],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to touch node: {e}")))?;
        Ok(())
    }

    async fn set_importance(&self, id: i64, importance: Importance) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connection()?;
        conn.execute(
            "UPDATE nodes SET importance = ? WHERE id = ?",
            libsql::params![importance_to_string(importance), id],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to set importance: {e}")))?;
        Ok(())
    }

    async fn create_edge(
        &self,
        source_id: i64,
        target_id: i64,
        weight: f32,
        edge_type: EdgeType,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO edges (source_id, target_id, edge_type, weight, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(source_id, target_id, edge_type)
            DO UPDATE SET weight = MAX(weight, excluded.weight)
            "#,
            libsql::params![
                source_id,
                target_id,
                edge_type.to_string(),
                f64::from(weight),
                datetime_to_timestamp(Utc::now()),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to upsert edge: {e}")))?;
        Ok(())
    }

    async fn set_edge_weight(
        &self,
        source_id: i64,
        target_id: i64,
        edge_type: &EdgeType,
        weight: f32,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connection()?;
        conn.execute(
            "UPDATE edges SET weight = ? WHERE source_id = ? AND target_id = ? AND edge_type = ?",
            libsql::params![f64::from(weight), source_id, target_id, edge_type.to_string()],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to set edge weight: {e}")))?;
        Ok(())
    }

    async fn get_connected_nodes(&self, id: i64) -> Result<Vec<(i64, f32, EdgeType)>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT target_id, weight, edge_type FROM edges WHERE source_id = ?",
                libsql::params![id],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to query edges: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let target_id: i64 = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let weight: f64 = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            let edge_type: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
            #[allow(clippy::cast_possible_truncation)]
            out.push((target_id, weight as f32, EdgeType::parse(&edge_type)));
        }
        Ok(out)
    }

    async fn get_all_edges(&self) -> Result<Vec<Edge>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT source_id, target_id, edge_type, weight, created_at FROM edges",
                (),
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to query edges: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            out.push(row_to_edge(&row)?);
        }
        Ok(out)
    }

    async fn get_or_create_entity(&self, name: &str, entity_type: EntityType) -> Result<Entity> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connection()?;

        let mut rows = conn
            .query(
                "SELECT id, name, entity_type FROM entities WHERE name = ? COLLATE NOCASE",
                libsql::params![name],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to query entity: {e}")))?;

        if let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            return row_to_entity(&row);
        }

        conn.execute(
            "INSERT INTO entities (name, entity_type) VALUES (?, ?)",
            libsql::params![name.to_string(), entity_type.to_string()],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to insert entity: {e}")))?;

        Ok(Entity {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            entity_type,
        })
    }

    async fn link_node_to_entity(&self, note_id: i64, entity_id: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR IGNORE INTO node_entities (note_id, entity_id) VALUES (?, ?)",
            libsql::params![note_id, entity_id],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to link node to entity: {e}")))?;
        Ok(())
    }

    async fn get_nodes_by_entity(&self, entity_id: i64) -> Result<Vec<i64>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT note_id FROM node_entities WHERE entity_id = ?",
                libsql::params![entity_id],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to query node_entities: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            out.push(row.get(0).map_err(|e| Error::Storage(e.to_string()))?);
        }
        Ok(out)
    }

    async fn get_all_entities(&self) -> Result<Vec<Entity>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query("SELECT id, name, entity_type FROM entities", ())
            .await
            .map_err(|e| Error::Storage(format!("failed to query entities: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            out.push(row_to_entity(&row)?);
        }
        Ok(out)
    }

    async fn delete_entity(&self, entity_id: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM entities WHERE id = ?",
            libsql::params![entity_id],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to delete entity: {e}")))?;
        Ok(())
    }

    async fn entity_link_count(&self, entity_id: i64) -> Result<usize> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM node_entities WHERE entity_id = ?",
                libsql::params![entity_id],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to count entity links: {e}")))?;

        let count: i64 = match rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            Some(row) => row.get(0).map_err(|e| Error::Storage(e.to_string()))?,
            None => 0,
        };
        #[allow(clippy::cast_sign_loss)]
        Ok(count as usize)
    }

    async fn get_entity_counts_batch(&self, note_ids: &[i64]) -> Result<HashMap<i64, usize>> {
        let mut out = HashMap::new();
        if note_ids.is_empty() {
            return Ok(out);
        }

        let conn = self.connection()?;
        let sql = format!(
            "SELECT note_id, COUNT(*) FROM node_entities WHERE note_id IN ({}) GROUP BY note_id",
            placeholders(note_ids.len())
        );
        let params: Vec<libsql::Value> = note_ids.iter().map(|id| libsql::Value::Integer(*id)).collect();
        let mut rows = conn
            .query(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| Error::Storage(format!("failed to batch-count entities: {e}")))?;

        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let note_id: i64 = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let count: i64 = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            #[allow(clippy::cast_sign_loss)]
            out.insert(note_id, count as usize);
        }
        Ok(out)
    }

    async fn get_all_nodes(&self) -> Result<Vec<Note>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                r#"
                SELECT id, content, category, created_at, last_accessed, access_count,
                       importance, embedding, emotional, event_start, event_end,
                       temporal_expressions
                FROM nodes
                "#,
                (),
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to query nodes: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            out.push(row_to_note(&row)?);
        }
        Ok(out)
    }

    async fn save_note_version(&self, version: NoteVersion) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.insert_version(&version).await?;
        self.trim_versions(version.note_id).await
    }

    async fn get_note_history(&self, note_id: i64, limit: Option<usize>) -> Result<Vec<NoteVersion>> {
        let conn = self.connection()?;
        let sql = match limit {
            Some(n) => format!(
                "SELECT note_id, version_number, content, category, importance, recorded_at \
                 FROM note_versions WHERE note_id = ? ORDER BY version_number DESC LIMIT {n}"
            ),
            None => "SELECT note_id, version_number, content, category, importance, recorded_at \
                      FROM note_versions WHERE note_id = ? ORDER BY version_number DESC"
                .to_string(),
        };
        let mut rows = conn
            .query(&sql, libsql::params![note_id])
            .await
            .map_err(|e| Error::Storage(format!("failed to query note history: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            out.push(row_to_note_version(&row)?);
        }
        Ok(out)
    }

    async fn restore_note_version(&self, note_id: i64, version_number: u32) -> Result<Note> {
        let _guard = self.write_lock.lock().await;
        let current = self.get_node(note_id).await?.ok_or(Error::NotFound(note_id))?;

        let target = self
            .get_version(note_id, version_number)
            .await?
            .ok_or_else(|| {
                Error::Validation(format!(
                    "note {note_id} has no version {version_number}"
                ))
            })?;

        self.snapshot_version(&current).await?;

        let conn = self.connection()?;
        conn.execute(
            "UPDATE nodes SET content = ?, category = ?, importance = ? WHERE id = ?",
            libsql::params![
                target.content.clone(),
                target.category.clone(),
                importance_to_string(target.importance),
                note_id,
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to restore node: {e}")))?;

        Ok(Note {
            content: target.content,
            category: target.category,
            importance: target.importance,
            ..current
        })
    }

    async fn append_edge_history(&self, entry: EdgeHistoryEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO edge_history (
                source_id, target_id, existing_type, conflicting_type, recorded_at
            ) VALUES (?, ?, ?, ?, ?)
            "#,
            libsql::params![
                entry.source_id,
                entry.target_id,
                entry.existing_type.to_string(),
                entry.conflicting_type.to_string(),
                datetime_to_timestamp(entry.recorded_at),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to append edge history: {e}")))?;
        Ok(())
    }

    async fn append_search_log(&self, entry: SearchLogEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO search_logs (
                query, cleaned_query, is_temporal, direction, result_count, total_activated,
                top1_score, top5_avg_score, embedding_ms, ann_ms, spreading_ms, bm25_ms,
                temporal_ms, rerank_ms, filters_ms, total_ms, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            libsql::params![
                entry.query,
                entry.cleaned_query,
                i64::from(entry.is_temporal),
                format!("{:?}", entry.direction).to_lowercase(),
                i64::try_from(entry.result_count).unwrap_or(i64::MAX),
                i64::try_from(entry.total_activated).unwrap_or(i64::MAX),
                entry.top1_score.map(f64::from),
                entry.top5_avg_score.map(f64::from),
                entry.latency.embedding_ms,
                entry.latency.ann_ms,
                entry.latency.spreading_ms,
                entry.latency.bm25_ms,
                entry.latency.temporal_ms,
                entry.latency.rerank_ms,
                entry.latency.filters_ms,
                entry.latency.total_ms,
                datetime_to_timestamp(entry.recorded_at),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to append search log: {e}")))?;
        Ok(())
    }

    async fn daily_search_stats(&self, day: DateTime<Utc>) -> Result<DailySearchStats> {
        let start = day
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| Error::Corruption("invalid day boundary".to_string()))?
            .and_utc();
        let end = start + Duration::days(1);

        let conn = self.connection()?;
        let mut rows = conn
            .query(
                r#"
                SELECT result_count, top1_score, total_ms, embedding_ms, ann_ms, spreading_ms,
                       bm25_ms, temporal_ms, rerank_ms, filters_ms
                FROM search_logs WHERE recorded_at >= ? AND recorded_at < ?
                "#,
                libsql::params![datetime_to_timestamp(start), datetime_to_timestamp(end)],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to query search logs: {e}")))?;

        let mut query_count = 0usize;
        let mut zero_result_count = 0usize;
        let mut top1_scores = Vec::new();
        let mut total_ms = Vec::new();
        let (mut embedding_ms, mut ann_ms, mut spreading_ms) = (Vec::new(), Vec::new(), Vec::new());
        let (mut bm25_ms, mut temporal_ms, mut rerank_ms, mut filters_ms) =
            (Vec::new(), Vec::new(), Vec::new(), Vec::new());

        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let result_count: i64 = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let top1_score: Option<f64> = row.get(1).ok();
            let total: f64 = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;

            query_count += 1;
            if result_count == 0 {
                zero_result_count += 1;
            }
            if let Some(score) = top1_score {
                top1_scores.push(score);
            }
            total_ms.push(total);
            let embedding: f64 = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
            let ann: f64 = row.get(4).map_err(|e| Error::Storage(e.to_string()))?;
            let spreading: f64 = row.get(5).map_err(|e| Error::Storage(e.to_string()))?;
            let bm25: f64 = row.get(6).map_err(|e| Error::Storage(e.to_string()))?;
            let temporal: f64 = row.get(7).map_err(|e| Error::Storage(e.to_string()))?;
            let rerank: f64 = row.get(8).map_err(|e| Error::Storage(e.to_string()))?;
            let filters: f64 = row.get(9).map_err(|e| Error::Storage(e.to_string()))?;
            embedding_ms.push(embedding);
            ann_ms.push(ann);
            spreading_ms.push(spreading);
            bm25_ms.push(bm25);
            temporal_ms.push(temporal);
            rerank_ms.push(rerank);
            filters_ms.push(filters);
        }

        let avg = |values: &[f64]| -> f64 {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        };

        let mut sorted_total = total_ms.clone();
        sorted_total.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        Ok(DailySearchStats {
            query_count,
            zero_result_count,
            p50_latency_ms: percentile(&sorted_total, 50.0),
            p95_latency_ms: percentile(&sorted_total, 95.0),
            p99_latency_ms: percentile(&sorted_total, 99.0),
            avg_top1_score: avg(&top1_scores),
            avg_embedding_ms: avg(&embedding_ms),
            avg_ann_ms: avg(&ann_ms),
            avg_spreading_ms: avg(&spreading_ms),
            avg_bm25_ms: avg(&bm25_ms),
            avg_temporal_ms: avg(&temporal_ms),
            avg_rerank_ms: avg(&rerank_ms),
            avg_filters_ms: avg(&filters_ms),
        })
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        let conn = self.connection()?;

        let total_nodes = self.scalar_count(&conn, "SELECT COUNT(*) FROM nodes").await?;
        let total_edges = self.scalar_count(&conn, "SELECT COUNT(*) FROM edges").await?;
        let total_entities = self.scalar_count(&conn, "SELECT COUNT(*) FROM entities").await?;

        let mut nodes_by_category = HashMap::new();
        let mut rows = conn
            .query("SELECT category, COUNT(*) FROM nodes GROUP BY category", ())
            .await
            .map_err(|e| Error::Storage(format!("failed to count nodes by category: {e}")))?;
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let category: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let count: i64 = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            #[allow(clippy::cast_sign_loss)]
            nodes_by_category.insert(category, count as usize);
        }

        let mut edges_by_type = HashMap::new();
        let mut rows = conn
            .query("SELECT edge_type, COUNT(*) FROM edges GROUP BY edge_type", ())
            .await
            .map_err(|e| Error::Storage(format!("failed to count edges by type: {e}")))?;
        while let Some(row) = rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            let edge_type: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let count: i64 = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            #[allow(clippy::cast_sign_loss)]
            edges_by_type.insert(edge_type, count as usize);
        }

        Ok(StoreStats {
            total_nodes,
            total_edges,
            total_entities,
            nodes_by_category,
            edges_by_type,
        })
    }

    async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            libsql::params![key.to_string(), value.to_string()],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to set metadata: {e}")))?;
        Ok(())
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT value FROM metadata WHERE key = ?",
                libsql::params![key.to_string()],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to query metadata: {e}")))?;

        match rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            Some(row) => Ok(Some(row.get(0).map_err(|e| Error::Storage(e.to_string()))?)),
            None => Ok(None),
        }
    }
}

impl LibsqlStore {
    async fn scalar_count(&self, conn: &libsql::Connection, sql: &str) -> Result<usize> {
        let mut rows = conn
            .query(sql, ())
            .await
            .map_err(|e| Error::Storage(format!("failed to run count query: {e}")))?;
        let count: i64 = match rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            Some(row) => row.get(0).map_err(|e| Error::Storage(e.to_string()))?,
            None => 0,
        };
        #[allow(clippy::cast_sign_loss)]
        Ok(count as usize)
    }

    async fn insert_version(&self, version: &NoteVersion) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO note_versions (
                note_id, version_number, content, category, importance, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
            libsql::params![
                version.note_id,
                i64::from(version.version_number),
                version.content.clone(),
                version.category.clone(),
                importance_to_string(version.importance),
                datetime_to_timestamp(version.recorded_at),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to save note version: {e}")))?;
        Ok(())
    }

    /// Drops the oldest versions beyond [`MAX_NOTE_VERSIONS`] (invariant 7).
    async fn trim_versions(&self, note_id: i64) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            r#"
            DELETE FROM note_versions
            WHERE note_id = ? AND version_number NOT IN (
                SELECT version_number FROM note_versions
                WHERE note_id = ?
                ORDER BY version_number DESC
                LIMIT ?
            )
            "#,
            libsql::params![note_id, note_id, i64::from(MAX_NOTE_VERSIONS)],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to trim note versions: {e}")))?;
        Ok(())
    }

    async fn get_version(&self, note_id: i64, version_number: u32) -> Result<Option<NoteVersion>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT note_id, version_number, content, category, importance, recorded_at \
                 FROM note_versions WHERE note_id = ? AND version_number = ?",
                libsql::params![note_id, i64::from(version_number)],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to query note version: {e}")))?;

        match rows.next().await.map_err(|e| Error::Storage(e.to_string()))? {
            Some(row) => Ok(Some(row_to_note_version(&row)?)),
            None => Ok(None),
        }
    }

    /// Snapshots `note`'s current state as a new version row, then enforces
    /// the retention cap (invariant 3 + invariant 7).
    async fn snapshot_version(&self, note: &Note) -> Result<()> {
        let history = self.get_note_history(note.id, Some(1)).await?;
        let next_version = history.first().map_or(1, |v| v.version_number + 1);

        self.insert_version(&NoteVersion {
            note_id: note.id,
            version_number: next_version,
            content: note.content.clone(),
            category: note.category.clone(),
            importance: note.importance,
            recorded_at: Utc::now(),
        })
        .await?;
        self.trim_versions(note.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hippograph_core::store::NewNote;
    use hippograph_core::types::DEFAULT_CATEGORY;

    async fn fixture() -> LibsqlStore {
        let store = LibsqlStore::new(":memory:", "").await.expect("connect");
        store.initialize_schema().await.expect("init schema");
        store
    }

    fn draft(content: &str) -> NewNote {
        NewNote {
            content: content.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            importance: Importance::Normal,
            embedding: Some(vec![0.1, 0.2, 0.3]),
            emotional: None,
            event_start: None,
            event_end: None,
            temporal_expressions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let store = fixture().await;
        let created = store.create_node(draft("hello world")).await.expect("create");
        let fetched = store.get_node(created.id).await.expect("get").expect("present");
        assert_eq!(fetched.content, "hello world");
        assert_eq!(fetched.embedding, Some(vec![0.1, 0.2, 0.3]));
    }

    #[tokio::test]
    async fn update_node_snapshots_prior_content() {
        let store = fixture().await;
        let created = store.create_node(draft("first draft")).await.expect("create");

        store
            .update_node(
                created.id,
                NoteUpdate {
                    content: Some("second draft".to_string()),
                    category: None,
                },
            )
            .await
            .expect("update");

        let history = store.get_note_history(created.id, None).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "first draft");

        let current = store.get_node(created.id).await.expect("get").expect("present");
        assert_eq!(current.content, "second draft");
    }

    #[tokio::test]
    async fn note_history_is_capped_at_max_versions() {
        let store = fixture().await;
        let created = store.create_node(draft("v0")).await.expect("create");

        for i in 1..=(MAX_NOTE_VERSIONS + 3) {
            store
                .update_node(
                    created.id,
                    NoteUpdate {
                        content: Some(format!("v{i}")),
                        category: None,
                    },
                )
                .await
                .expect("update");
        }

        let history = store.get_note_history(created.id, None).await.expect("history");
        assert_eq!(history.len(), MAX_NOTE_VERSIONS as usize);
    }

    #[tokio::test]
    async fn delete_node_cascades_edges_and_entities() {
        let store = fixture().await;
        let a = store.create_node(draft("a")).await.expect("create a");
        let b = store.create_node(draft("b")).await.expect("create b");
        store
            .create_edge(a.id, b.id, 0.8, EdgeType::Semantic)
            .await
            .expect("create edge");
        let entity = store
            .get_or_create_entity("Acme", EntityType::Organization)
            .await
            .expect("entity");
        store.link_node_to_entity(a.id, entity.id).await.expect("link");

        let deleted = store.delete_node(a.id).await.expect("delete").expect("existed");
        assert_eq!(deleted.id, a.id);

        let edges = store.get_connected_nodes(a.id).await.expect("edges");
        assert!(edges.is_empty());
        let linked_notes = store.get_nodes_by_entity(entity.id).await.expect("linked");
        assert!(linked_notes.is_empty());
    }

    #[tokio::test]
    async fn create_edge_upsert_keeps_max_weight() {
        let store = fixture().await;
        let a = store.create_node(draft("a")).await.expect("create a");
        let b = store.create_node(draft("b")).await.expect("create b");

        store
            .create_edge(a.id, b.id, 0.4, EdgeType::Semantic)
            .await
            .expect("first edge");
        store
            .create_edge(a.id, b.id, 0.9, EdgeType::Semantic)
            .await
            .expect("second edge");
        store
            .create_edge(a.id, b.id, 0.1, EdgeType::Semantic)
            .await
            .expect("lower-weight edge is ignored by MAX");

        let neighbors = store.get_connected_nodes(a.id).await.expect("neighbors");
        assert_eq!(neighbors.len(), 1);
        assert!((neighbors[0].1 - 0.9).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn entity_lookup_is_case_insensitive() {
        let store = fixture().await;
        let first = store
            .get_or_create_entity("Rust", EntityType::Tech)
            .await
            .expect("create");
        let second = store
            .get_or_create_entity("rust", EntityType::Tech)
            .await
            .expect("lookup");
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn stats_reflects_inserted_rows() {
        let store = fixture().await;
        store.create_node(draft("a")).await.expect("create a");
        store.create_node(draft("b")).await.expect("create b");

        let stats = store.get_stats().await.expect("stats");
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.nodes_by_category.get(DEFAULT_CATEGORY), Some(&2));
    }
}
