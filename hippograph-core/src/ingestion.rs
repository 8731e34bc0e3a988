//! The ingestion pipeline: dedup is the only step allowed to abort;
//! everything after persistence is best-effort and reported as warnings
//! rather than propagated.

use chrono::Utc;
use parking_lot::RwLock;

use crate::adjacency::AdjacencyCache;
use crate::ann::AnnIndex;
use crate::bm25::Bm25Index;
use crate::config::Config;
use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::entity_extractor::EntityExtractor;
use crate::error::Result;
use crate::store::{NewNote, StoreBackend};
use crate::temporal_extractor;
use crate::types::{EdgeType, EmotionalContext, Importance, DEFAULT_CATEGORY};

/// Input to [`ingest`].
#[derive(Debug, Clone)]
pub struct IngestDraft {
    pub content: String,
    pub category: Option<String>,
    pub importance: Option<Importance>,
    pub force: bool,
    pub emotional: Option<EmotionalContext>,
}

/// Result of [`ingest`].
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Created {
        id: i64,
        entity_count: usize,
        entity_links: usize,
        semantic_links: usize,
        warnings: Vec<String>,
    },
    Duplicate {
        existing_id: i64,
        similarity: f32,
    },
}

/// Build the text whose embedding is stored: content plus emotional
/// tone/reflection, if present, so the vector reflects the full note.
fn text_to_embed(content: &str, emotional: Option<&EmotionalContext>) -> String {
    match emotional {
        Some(e) => format!("{content} {} {}", e.tone, e.reflection),
        None => content.to_string(),
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn ingest(
    draft: IngestDraft,
    store: &dyn StoreBackend,
    embedder: &dyn EmbeddingProvider,
    extractor: &EntityExtractor,
    ann: &RwLock<AnnIndex>,
    bm25: &RwLock<Bm25Index>,
    adjacency: &RwLock<AdjacencyCache>,
    cfg: &Config,
) -> Result<IngestOutcome> {
    // Step 1-2: build embedding text and encode.
    let to_embed = text_to_embed(&draft.content, draft.emotional.as_ref());
    let embedding = embedder.encode(&to_embed).await?;

    // Step 3: dedup.
    let dedup_hits = ann.read().search(&embedding, 5, 0.0);
    if let Some(&(existing_id, similarity)) = dedup_hits
        .iter()
        .find(|&&(_, sim)| sim >= cfg.duplicate_threshold)
    {
        if !draft.force {
            return Ok(IngestOutcome::Duplicate { existing_id, similarity });
        }
    }

    // Step 4: temporal expressions + entities.
    let now = Utc::now();
    let (event_start, event_end, temporal_expressions) = temporal_extractor::extract(&draft.content, now);
    let extracted_entities = extractor.extract(&draft.content).await;

    // Step 5: persist.
    let note = store
        .create_node(NewNote {
            content: draft.content.clone(),
            category: draft.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            importance: draft.importance.unwrap_or_default(),
            embedding: Some(embedding.clone()),
            emotional: draft.emotional,
            event_start,
            event_end,
            temporal_expressions,
        })
        .await?;

    let mut warnings = Vec::new();

    // Step 6: incremental index updates.
    ann.write().add_vector(note.id, embedding.clone());
    bm25.write().add_document(note.id, &draft.content);

    // Step 7: entity linking.
    let mut entity_links = 0usize;
    for extracted in &extracted_entities {
        match link_entity(store, adjacency, note.id, extracted).await {
            Ok(links) => entity_links += links,
            Err(err) => {
                tracing::error!(error = %err, note_id = note.id, entity = %extracted.surface, "entity linking failed");
                warnings.push(format!("entity linking failed for '{}': {err}", extracted.surface));
            }
        }
    }

    // Step 8: semantic links.
    let semantic_links = match link_semantic_neighbors(store, ann, adjacency, cfg, note.id, &embedding).await {
        Ok((count, near_duplicate)) => {
            if near_duplicate {
                warnings.push(format!(
                    "note {} is highly similar to an existing note (>= {:.2})",
                    note.id, cfg.similar_threshold
                ));
            }
            count
        }
        Err(err) => {
            tracing::error!(error = %err, note_id = note.id, "semantic linking failed");
            warnings.push(format!("semantic linking failed: {err}"));
            0
        }
    };

    Ok(IngestOutcome::Created {
        id: note.id,
        entity_count: extracted_entities.len(),
        entity_links,
        semantic_links,
        warnings,
    })
}

async fn link_entity(
    store: &dyn StoreBackend,
    adjacency: &RwLock<AdjacencyCache>,
    note_id: i64,
    extracted: &crate::entity_extractor::ExtractedEntity,
) -> Result<usize> {
    let entity = store
        .get_or_create_entity(&extracted.surface, extracted.entity_type)
        .await?;
    store.link_node_to_entity(note_id, entity.id).await?;

    let mut links = 0usize;
    for other_id in store.get_nodes_by_entity(entity.id).await? {
        if other_id == note_id {
            continue;
        }
        store.create_edge(note_id, other_id, 0.6, EdgeType::Entity).await?;
        store.create_edge(other_id, note_id, 0.6, EdgeType::Entity).await?;
        adjacency.write().add_edge(note_id, other_id, 0.6, EdgeType::Entity);
        adjacency.write().add_edge(other_id, note_id, 0.6, EdgeType::Entity);
        links += 1;
    }
    Ok(links)
}

/// Returns `(links_created, any_near_duplicate)`.
async fn link_semantic_neighbors(
    store: &dyn StoreBackend,
    ann: &RwLock<AnnIndex>,
    adjacency: &RwLock<AdjacencyCache>,
    cfg: &Config,
    note_id: i64,
    embedding: &[f32],
) -> Result<(usize, bool)> {
    let hits = ann.read().search(embedding, 2 * cfg.max_semantic_links, cfg.similarity_threshold);
    let mut near_duplicate = false;
    let mut created = 0usize;
    for &(candidate_id, similarity) in hits.iter().take(cfg.max_semantic_links) {
        if candidate_id == note_id {
            continue;
        }
        if similarity >= cfg.similar_threshold {
            near_duplicate = true;
        }
        store.create_edge(note_id, candidate_id, similarity, EdgeType::Semantic).await?;
        store.create_edge(candidate_id, note_id, similarity, EdgeType::Semantic).await?;
        adjacency.write().add_edge(note_id, candidate_id, similarity, EdgeType::Semantic);
        adjacency.write().add_edge(candidate_id, note_id, similarity, EdgeType::Semantic);
        created += 1;
    }
    Ok((created, near_duplicate))
}

/// Exposed so callers can reuse the same embedding/dedup math elsewhere
/// (e.g. `find_similar`) without re-deriving the cosine similarity math.
#[must_use]
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::mock::MockEmbeddingProvider;
    use crate::error::Error;
    use crate::store::{DailySearchStats, NoteUpdate, StoreStats};
    use crate::types::{Edge, Entity, EntityType, Note, NoteVersion, SearchLogEntry, EdgeHistoryEntry};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        notes: Mutex<HashMap<i64, Note>>,
        entities: Mutex<HashMap<String, Entity>>,
        note_entities: Mutex<Vec<(i64, i64)>>,
        edges: Mutex<Vec<Edge>>,
        next_note_id: Mutex<i64>,
        next_entity_id: Mutex<i64>,
    }

    #[async_trait]
    impl StoreBackend for FakeStore {
        async fn create_node(&self, draft: NewNote) -> Result<Note> {
            let mut next = self.next_note_id.lock().unwrap();
            *next += 1;
            let id = *next;
            let note = Note {
                id,
                content: draft.content,
                category: draft.category,
                created_at: Utc::now(),
                last_accessed: Utc::now(),
                access_count: 0,
                importance: draft.importance,
                embedding: draft.embedding,
                emotional: draft.emotional,
                event_start: draft.event_start,
                event_end: draft.event_end,
                temporal_expressions: draft.temporal_expressions,
            };
            self.notes.lock().unwrap().insert(id, note.clone());
            Ok(note)
        }

        async fn get_node(&self, id: i64) -> Result<Option<Note>> {
            Ok(self.notes.lock().unwrap().get(&id).cloned())
        }

        async fn update_node(&self, _id: i64, _update: NoteUpdate) -> Result<Note> {
            unimplemented!("not exercised in this test")
        }

        async fn delete_node(&self, id: i64) -> Result<Option<Note>> {
            Ok(self.notes.lock().unwrap().remove(&id))
        }

        async fn touch_node(&self, _id: i64) -> Result<()> {
            Ok(())
        }

        async fn set_importance(&self, _id: i64, _importance: Importance) -> Result<()> {
            Ok(())
        }

        async fn create_edge(&self, source_id: i64, target_id: i64, weight: f32, edge_type: EdgeType) -> Result<()> {
            self.edges.lock().unwrap().push(Edge {
                source_id,
                target_id,
                weight,
                edge_type,
                created_at: Utc::now(),
            });
            Ok(())
        }

        async fn set_edge_weight(&self, _source_id: i64, _target_id: i64, _edge_type: &EdgeType, _weight: f32) -> Result<()> {
            Ok(())
        }

        async fn get_connected_nodes(&self, _id: i64) -> Result<Vec<(i64, f32, EdgeType)>> {
            Ok(Vec::new())
        }

        async fn get_all_edges(&self) -> Result<Vec<Edge>> {
            Ok(self.edges.lock().unwrap().clone())
        }

        async fn get_or_create_entity(&self, name: &str, entity_type: EntityType) -> Result<Entity> {
            let mut entities = self.entities.lock().unwrap();
            if let Some(existing) = entities.get(name) {
                return Ok(existing.clone());
            }
            let mut next = self.next_entity_id.lock().unwrap();
            *next += 1;
            let entity = Entity {
                id: *next,
                name: name.to_string(),
                entity_type,
            };
            entities.insert(name.to_string(), entity.clone());
            Ok(entity)
        }

        async fn link_node_to_entity(&self, note_id: i64, entity_id: i64) -> Result<()> {
            self.note_entities.lock().unwrap().push((note_id, entity_id));
            Ok(())
        }

        async fn get_nodes_by_entity(&self, entity_id: i64) -> Result<Vec<i64>> {
            Ok(self
                .note_entities
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, e)| *e == entity_id)
                .map(|(n, _)| *n)
                .collect())
        }

        async fn get_all_entities(&self) -> Result<Vec<Entity>> {
            Ok(self.entities.lock().unwrap().values().cloned().collect())
        }

        async fn delete_entity(&self, _entity_id: i64) -> Result<()> {
            Ok(())
        }

        async fn entity_link_count(&self, entity_id: i64) -> Result<usize> {
            Ok(self.get_nodes_by_entity(entity_id).await?.len())
        }

        async fn get_entity_counts_batch(&self, _note_ids: &[i64]) -> Result<HashMap<i64, usize>> {
            Ok(HashMap::new())
        }

        async fn get_all_nodes(&self) -> Result<Vec<Note>> {
            Ok(self.notes.lock().unwrap().values().cloned().collect())
        }

        async fn save_note_version(&self, _version: NoteVersion) -> Result<()> {
            Ok(())
        }

        async fn get_note_history(&self, _note_id: i64, _limit: Option<usize>) -> Result<Vec<NoteVersion>> {
            Ok(Vec::new())
        }

        async fn restore_note_version(&self, note_id: i64, _version_number: u32) -> Result<Note> {
            self.get_node(note_id).await?.ok_or(Error::not_found(note_id))
        }

        async fn append_edge_history(&self, _entry: EdgeHistoryEntry) -> Result<()> {
            Ok(())
        }

        async fn append_search_log(&self, _entry: SearchLogEntry) -> Result<()> {
            Ok(())
        }

        async fn daily_search_stats(&self, _day: chrono::DateTime<Utc>) -> Result<DailySearchStats> {
            Ok(DailySearchStats::default())
        }

        async fn get_stats(&self) -> Result<StoreStats> {
            Ok(StoreStats::default())
        }

        async fn set_metadata(&self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }

        async fn get_metadata(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn harness() -> (FakeStore, MockEmbeddingProvider, EntityExtractor, RwLock<AnnIndex>, RwLock<Bm25Index>, RwLock<AdjacencyCache>, Config) {
        (
            FakeStore::default(),
            MockEmbeddingProvider::new("test-mock", 16),
            EntityExtractor::new(),
            RwLock::new(AnnIndex::new(16)),
            RwLock::new(Bm25Index::default()),
            RwLock::new(AdjacencyCache::new()),
            Config {
                embedding_dimension: 16,
                ..Config::default()
            },
        )
    }

    #[tokio::test]
    async fn first_ingest_creates_a_note() {
        let (store, embedder, extractor, ann, bm25, adjacency, cfg) = harness();
        let outcome = ingest(
            IngestDraft {
                content: "Learned Docker networking basics today".to_string(),
                category: None,
                importance: None,
                force: false,
                emotional: None,
            },
            &store,
            &embedder,
            &extractor,
            &ann,
            &bm25,
            &adjacency,
            &cfg,
        )
        .await
        .unwrap();

        match outcome {
            IngestOutcome::Created { id, .. } => assert_eq!(id, 1),
            IngestOutcome::Duplicate { .. } => panic!("expected Created"),
        }
        assert_eq!(ann.read().len(), 1);
        assert_eq!(bm25.read().doc_count(), 1);
    }

    #[tokio::test]
    async fn exact_duplicate_is_rejected_without_force() {
        let (store, embedder, extractor, ann, bm25, adjacency, cfg) = harness();
        let draft = || IngestDraft {
            content: "The exact same note content".to_string(),
            category: None,
            importance: None,
            force: false,
            emotional: None,
        };
        ingest(draft(), &store, &embedder, &extractor, &ann, &bm25, &adjacency, &cfg)
            .await
            .unwrap();
        let second = ingest(draft(), &store, &embedder, &extractor, &ann, &bm25, &adjacency, &cfg)
            .await
            .unwrap();
        assert!(matches!(second, IngestOutcome::Duplicate { .. }));
        assert_eq!(ann.read().len(), 1);
    }

    #[tokio::test]
    async fn force_bypasses_duplicate_check() {
        let (store, embedder, extractor, ann, bm25, adjacency, cfg) = harness();
        let mut draft = IngestDraft {
            content: "Forced duplicate content".to_string(),
            category: None,
            importance: None,
            force: false,
            emotional: None,
        };
        ingest(draft.clone(), &store, &embedder, &extractor, &ann, &bm25, &adjacency, &cfg)
            .await
            .unwrap();
        draft.force = true;
        let second = ingest(draft, &store, &embedder, &extractor, &ann, &bm25, &adjacency, &cfg)
            .await
            .unwrap();
        assert!(matches!(second, IngestOutcome::Created { .. }));
        assert_eq!(ann.read().len(), 2);
    }

    #[tokio::test]
    async fn shared_entity_creates_mirrored_edges() {
        let (store, embedder, extractor, ann, bm25, adjacency, cfg) = harness();
        ingest(
            IngestDraft {
                content: "Set up Docker for local development".to_string(),
                category: None,
                importance: None,
                force: false,
                emotional: None,
            },
            &store,
            &embedder,
            &extractor,
            &ann,
            &bm25,
            &adjacency,
            &cfg,
        )
        .await
        .unwrap();
        let second = ingest(
            IngestDraft {
                content: "Debugging a Docker networking issue".to_string(),
                category: None,
                importance: None,
                force: false,
                emotional: None,
            },
            &store,
            &embedder,
            &extractor,
            &ann,
            &bm25,
            &adjacency,
            &cfg,
        )
        .await
        .unwrap();

        match second {
            IngestOutcome::Created { entity_links, .. } => assert!(entity_links >= 1),
            IngestOutcome::Duplicate { .. } => panic!("expected Created"),
        }
        assert!(!adjacency.read().neighbors(1).is_empty());
        assert!(!adjacency.read().neighbors(2).is_empty());
    }
}
