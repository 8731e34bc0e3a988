//! In-RAM bidirectional neighbor map. Never the source of truth — a
//! rebuild must reproduce it from the store; this is a pure cache in
//! front of the relational edge table.

use std::collections::HashMap;

use crate::types::{Edge, EdgeType};

/// `node_id -> [(neighbor_id, weight, type)]`, O(1) lookup, updated in
/// lock-step with edge insertion during ingestion.
#[derive(Debug, Default)]
pub struct AdjacencyCache {
    neighbors: HashMap<i64, Vec<(i64, f32, EdgeType)>>,
}

impl AdjacencyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild entirely from the full edge set — must stay consistent with
    /// the store after a successful add_note/update_note/delete_note
    /// returns; callers rebuild or patch incrementally.
    pub fn build(&mut self, edges: &[Edge]) {
        self.neighbors.clear();
        for edge in edges {
            self.insert_directed(edge.source_id, edge.target_id, edge.weight, edge.edge_type.clone());
        }
    }

    fn insert_directed(&mut self, from: i64, to: i64, weight: f32, edge_type: EdgeType) {
        let list = self.neighbors.entry(from).or_default();
        if let Some(existing) = list.iter_mut().find(|(n, _, t)| *n == to && *t == edge_type) {
            existing.1 = existing.1.max(weight);
        } else {
            list.push((to, weight, edge_type));
        }
    }

    /// Incrementally add one edge. Per invariant 2, ingestion always mints
    /// the mirror pair; this only inserts the one direction given — call
    /// twice for a mirrored pair, matching how `create_edge` is invoked by
    /// the ingestion pipeline.
    pub fn add_edge(&mut self, source_id: i64, target_id: i64, weight: f32, edge_type: EdgeType) {
        self.insert_directed(source_id, target_id, weight, edge_type);
    }

    #[must_use]
    pub fn neighbors(&self, node_id: i64) -> &[(i64, f32, EdgeType)] {
        self.neighbors.get(&node_id).map_or(&[], Vec::as_slice)
    }

    /// Drop every edge touching `node_id`, both as source and as a
    /// neighbor entry in another node's list — used after `delete_node`.
    pub fn remove_node(&mut self, node_id: i64) {
        self.neighbors.remove(&node_id);
        for list in self.neighbors.values_mut() {
            list.retain(|(n, _, _)| *n != node_id);
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.neighbors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(s: i64, t: i64, w: f32) -> Edge {
        Edge {
            source_id: s,
            target_id: t,
            weight: w,
            edge_type: EdgeType::Semantic,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn build_reflects_stored_edges() {
        let mut cache = AdjacencyCache::new();
        cache.build(&[edge(1, 2, 0.8), edge(2, 1, 0.8)]);
        assert_eq!(cache.neighbors(1).len(), 1);
        assert_eq!(cache.neighbors(2).len(), 1);
    }

    #[test]
    fn missing_node_is_empty_not_panic() {
        let cache = AdjacencyCache::new();
        assert!(cache.neighbors(999).is_empty());
    }

    #[test]
    fn remove_node_clears_both_directions() {
        let mut cache = AdjacencyCache::new();
        cache.build(&[edge(1, 2, 0.5), edge(2, 1, 0.5)]);
        cache.remove_node(1);
        assert!(cache.neighbors(1).is_empty());
        assert!(cache.neighbors(2).is_empty());
    }

    #[test]
    fn duplicate_edge_of_same_type_keeps_max_weight() {
        let mut cache = AdjacencyCache::new();
        cache.add_edge(1, 2, 0.3, EdgeType::Entity);
        cache.add_edge(1, 2, 0.6, EdgeType::Entity);
        assert_eq!(cache.neighbors(1), &[(2, 0.6, EdgeType::Entity)]);
    }
}
