//! Incremental cosine-space ANN index over note embeddings.
//!
//! At the node counts this targets, a flat scan with a partial sort beats
//! the complexity of a real approximate index while still satisfying the
//! `add_vector` / `search` contract, with incremental inserts and on-disk
//! persistence layered on top.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::embeddings::cosine_similarity;
use crate::error::Result;
use crate::types::Note;

/// One indexed vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    node_id: i64,
    embedding: Vec<f32>,
}

/// Incremental, in-memory cosine ANN index.
#[derive(Debug, Default)]
pub struct AnnIndex {
    dimension: usize,
    entries: Vec<Entry>,
    position: HashMap<i64, usize>,
}

/// On-disk representation for `save`/`load`.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    dimension: usize,
    entries: Vec<Entry>,
}

impl AnnIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
            position: HashMap::new(),
        }
    }

    /// Bulk-initialize from the full node set, skipping notes lacking an
    /// embedding of the expected dimension.
    pub fn build(&mut self, nodes: &[Note]) {
        self.entries.clear();
        self.position.clear();
        for note in nodes {
            if let Some(emb) = &note.embedding {
                if emb.len() == self.dimension {
                    self.add_vector(note.id, emb.clone());
                }
            }
        }
    }

    /// Add or replace a single vector, immediately searchable.
    pub fn add_vector(&mut self, node_id: i64, embedding: Vec<f32>) {
        if embedding.len() != self.dimension {
            return;
        }
        if let Some(&idx) = self.position.get(&node_id) {
            self.entries[idx].embedding = embedding;
            return;
        }
        self.position.insert(node_id, self.entries.len());
        self.entries.push(Entry { node_id, embedding });
    }

    /// Remove a vector (used when a note is deleted; removing eagerly keeps
    /// the index tight).
    pub fn remove_vector(&mut self, node_id: i64) {
        if let Some(idx) = self.position.remove(&node_id) {
            self.entries.swap_remove(idx);
            if idx < self.entries.len() {
                let moved_id = self.entries[idx].node_id;
                self.position.insert(moved_id, idx);
            }
        }
    }

    /// `k` nearest neighbors to `query` at similarity `>= min_sim`, sorted
    /// descending. Ties break by ascending `node_id` for a stable,
    /// deterministic order within a process.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize, min_sim: f32) -> Vec<(i64, f32)> {
        let mut scored: Vec<(i64, f32)> = self
            .entries
            .iter()
            .map(|e| (e.node_id, cosine_similarity(query, &e.embedding)))
            .filter(|(_, sim)| *sim >= min_sim)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Persist to `path` as JSON. Purely a warm-start optimization — `build`
    /// can always reconstruct the index from `nodes.embedding`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            dimension: self.dimension,
            entries: self.entries.clone(),
        };
        let bytes = serde_json::to_vec(&snapshot)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        let mut index = Self::new(snapshot.dimension);
        for entry in snapshot.entries {
            index.add_vector(entry.node_id, entry.embedding);
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_with_embedding(id: i64, embedding: Vec<f32>) -> Note {
        Note {
            id,
            content: String::new(),
            category: "general".into(),
            created_at: chrono::Utc::now(),
            last_accessed: chrono::Utc::now(),
            access_count: 0,
            importance: crate::types::Importance::Normal,
            embedding: Some(embedding),
            emotional: None,
            event_start: None,
            event_end: None,
            temporal_expressions: vec![],
        }
    }

    #[test]
    fn exact_match_scores_near_one() {
        let mut idx = AnnIndex::new(3);
        idx.add_vector(1, vec![1.0, 0.0, 0.0]);
        let hits = idx.search(&[1.0, 0.0, 0.0], 1, 0.0);
        assert_eq!(hits[0].0, 1);
        assert!(hits[0].1 >= 0.999);
    }

    #[test]
    fn build_skips_notes_without_matching_dimension() {
        let notes = vec![
            note_with_embedding(1, vec![1.0, 0.0]),
            note_with_embedding(2, vec![1.0, 0.0, 0.0]), // wrong dim
        ];
        let mut idx = AnnIndex::new(2);
        idx.build(&notes);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn add_vector_is_immediately_searchable() {
        let mut idx = AnnIndex::new(2);
        idx.add_vector(42, vec![0.0, 1.0]);
        let hits = idx.search(&[0.0, 1.0], 5, 0.0);
        assert!(hits.iter().any(|(id, _)| *id == 42));
    }

    #[test]
    fn remove_then_search_excludes_node() {
        let mut idx = AnnIndex::new(2);
        idx.add_vector(1, vec![1.0, 0.0]);
        idx.add_vector(2, vec![0.0, 1.0]);
        idx.remove_vector(1);
        let hits = idx.search(&[1.0, 0.0], 5, 0.0);
        assert!(!hits.iter().any(|(id, _)| *id == 1));
    }

    #[test]
    fn save_and_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ann.json");
        let mut idx = AnnIndex::new(2);
        idx.add_vector(7, vec![0.3, 0.4]);
        idx.save(&path).unwrap();
        let loaded = AnnIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        let hits = loaded.search(&[0.3, 0.4], 1, 0.0);
        assert_eq!(hits[0].0, 7);
    }
}
