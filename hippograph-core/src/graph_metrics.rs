//! Cached PageRank scores and community labels over the undirected
//! projection of the graph. Recomputed at startup and during sleep;
//! cached in RAM only, never persisted.

use std::collections::{HashMap, HashSet};

use crate::types::Edge;

const DAMPING: f32 = 0.85;
const MAX_ITERATIONS: usize = 100;
const CONVERGENCE_EPSILON: f32 = 1e-6;

/// Cached graph-wide metrics.
#[derive(Debug, Default, Clone)]
pub struct GraphMetrics {
    pagerank: HashMap<i64, f32>,
    community: HashMap<i64, i64>,
}

impl GraphMetrics {
    #[must_use]
    pub fn pagerank(&self, node_id: i64) -> f32 {
        self.pagerank.get(&node_id).copied().unwrap_or(0.0)
    }

    /// Isolated nodes (and any node absent from the last computation) get
    /// community `-1`.
    #[must_use]
    pub fn community(&self, node_id: i64) -> i64 {
        self.community.get(&node_id).copied().unwrap_or(-1)
    }

    #[must_use]
    pub fn top_pagerank(&self, n: usize) -> Vec<(i64, f32)> {
        let mut v: Vec<(i64, f32)> = self.pagerank.iter().map(|(&k, &s)| (k, s)).collect();
        v.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        v.truncate(n);
        v
    }

    #[must_use]
    pub fn community_count(&self) -> usize {
        self.community
            .values()
            .filter(|&&c| c >= 0)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Recompute both metrics from the full node/edge set. `node_ids` must
    /// include isolated nodes (nodes with no edges) so they receive a
    /// baseline PageRank and community `-1`.
    pub fn recompute(&mut self, node_ids: &[i64], edges: &[Edge]) {
        self.pagerank = weighted_pagerank(node_ids, edges);
        self.community = greedy_communities(node_ids, edges);
    }
}

/// Build an undirected weighted adjacency map: `node -> [(neighbor,
/// weight)]`, collapsing the mirrored directed edge pairs invariant 2
/// guarantees into one undirected weight per pair.
fn undirected_adjacency(edges: &[Edge]) -> HashMap<i64, Vec<(i64, f32)>> {
    let mut adj: HashMap<i64, Vec<(i64, f32)>> = HashMap::new();
    let mut seen: HashSet<(i64, i64)> = HashSet::new();
    for e in edges {
        let key = (e.source_id.min(e.target_id), e.source_id.max(e.target_id));
        if seen.contains(&key) {
            continue;
        }
        seen.insert(key);
        adj.entry(e.source_id).or_default().push((e.target_id, e.weight));
        adj.entry(e.target_id).or_default().push((e.source_id, e.weight));
    }
    adj
}

fn weighted_pagerank(node_ids: &[i64], edges: &[Edge]) -> HashMap<i64, f32> {
    if node_ids.is_empty() {
        return HashMap::new();
    }
    let adj = undirected_adjacency(edges);
    let n = node_ids.len() as f32;
    let mut scores: HashMap<i64, f32> = node_ids.iter().map(|&id| (id, 1.0 / n)).collect();

    let out_weight: HashMap<i64, f32> = node_ids
        .iter()
        .map(|&id| {
            let w: f32 = adj.get(&id).map_or(0.0, |v| v.iter().map(|(_, w)| w).sum());
            (id, w)
        })
        .collect();

    for _ in 0..MAX_ITERATIONS {
        let mut next: HashMap<i64, f32> = node_ids.iter().map(|&id| (id, (1.0 - DAMPING) / n)).collect();
        for &id in node_ids {
            let Some(neighbors) = adj.get(&id) else { continue };
            let total_out = out_weight.get(&id).copied().unwrap_or(0.0);
            if total_out <= 0.0 {
                continue;
            }
            let contribution = scores.get(&id).copied().unwrap_or(0.0) * DAMPING;
            for &(neighbor, w) in neighbors {
                *next.entry(neighbor).or_insert(0.0) += contribution * (w / total_out);
            }
        }
        let delta: f32 = node_ids
            .iter()
            .map(|id| (next.get(id).copied().unwrap_or(0.0) - scores.get(id).copied().unwrap_or(0.0)).abs())
            .sum();
        scores = next;
        if delta < CONVERGENCE_EPSILON {
            break;
        }
    }

    let max = scores.values().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        for v in scores.values_mut() {
            *v /= max;
        }
    }
    scores
}

/// Greedy label-propagation community detection over the undirected
/// projection of the largest connected component; isolated nodes (and
/// nodes outside the largest component, in this simplified
/// implementation) get community `-1`.
fn greedy_communities(node_ids: &[i64], edges: &[Edge]) -> HashMap<i64, i64> {
    let adj = undirected_adjacency(edges);

    // Connected components via union-find.
    let mut parent: HashMap<i64, i64> = node_ids.iter().map(|&id| (id, id)).collect();
    fn find(parent: &mut HashMap<i64, i64>, x: i64) -> i64 {
        let p = parent[&x];
        if p == x {
            return x;
        }
        let root = find(parent, p);
        parent.insert(x, root);
        root
    }
    for &id in node_ids {
        if let Some(neighbors) = adj.get(&id) {
            for &(n, _) in neighbors {
                let ra = find(&mut parent, id);
                let rb = find(&mut parent, n);
                if ra != rb {
                    parent.insert(ra, rb);
                }
            }
        }
    }

    let mut components: HashMap<i64, Vec<i64>> = HashMap::new();
    for &id in node_ids {
        let root = find(&mut parent, id);
        components.entry(root).or_default().push(id);
    }

    let largest_root = components
        .iter()
        .filter(|(_, members)| members.len() > 1)
        .max_by_key(|(_, members)| members.len())
        .map(|(root, _)| *root);

    let mut labels: HashMap<i64, i64> = node_ids.iter().map(|&id| (id, -1)).collect();
    let Some(largest_root) = largest_root else {
        return labels;
    };
    let members = &components[&largest_root];

    // Label propagation: each node adopts the most frequent label among its
    // neighbors, seeded with one label per node, iterated to convergence or
    // a bounded number of passes.
    let mut current: HashMap<i64, i64> = members.iter().enumerate().map(|(i, &id)| (id, i as i64)).collect();
    for _ in 0..20 {
        let mut changed = false;
        for &id in members {
            let Some(neighbors) = adj.get(&id) else { continue };
            let mut counts: HashMap<i64, usize> = HashMap::new();
            for &(n, _) in neighbors {
                if let Some(&label) = current.get(&n) {
                    *counts.entry(label).or_insert(0) += 1;
                }
            }
            if let Some((&best_label, _)) = counts.iter().max_by_key(|(label, count)| (**count, -**label)) {
                if current[&id] != best_label {
                    current.insert(id, best_label);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    // Renumber labels to a compact 0..k range for readability.
    let mut renumber: HashMap<i64, i64> = HashMap::new();
    let mut next_label = 0i64;
    for &id in members {
        let raw = current[&id];
        let label = *renumber.entry(raw).or_insert_with(|| {
            let l = next_label;
            next_label += 1;
            l
        });
        labels.insert(id, label);
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(s: i64, t: i64, w: f32) -> Edge {
        Edge {
            source_id: s,
            target_id: t,
            weight: w,
            edge_type: crate::types::EdgeType::Semantic,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn top_pagerank_score_is_normalized_to_one() {
        let nodes = [1, 2, 3];
        let edges = vec![edge(1, 2, 1.0), edge(2, 1, 1.0), edge(2, 3, 1.0), edge(3, 2, 1.0)];
        let mut metrics = GraphMetrics::default();
        metrics.recompute(&nodes, &edges);
        let top = metrics.top_pagerank(1);
        assert!((top[0].1 - 1.0).abs() < 1e-4);
    }

    #[test]
    fn isolated_node_gets_community_negative_one() {
        let nodes = [1, 2, 3, 4];
        let edges = vec![edge(1, 2, 1.0), edge(2, 1, 1.0)];
        let mut metrics = GraphMetrics::default();
        metrics.recompute(&nodes, &edges);
        assert_eq!(metrics.community(3), -1);
        assert_eq!(metrics.community(4), -1);
    }

    #[test]
    fn connected_pair_shares_a_community() {
        let nodes = [1, 2, 3];
        let edges = vec![edge(1, 2, 1.0), edge(2, 1, 1.0)];
        let mut metrics = GraphMetrics::default();
        metrics.recompute(&nodes, &edges);
        assert_eq!(metrics.community(1), metrics.community(2));
        assert_ne!(metrics.community(1), -1);
        assert_eq!(metrics.community(3), -1);
    }
}
