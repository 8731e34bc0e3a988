//! Signal fusion: weighted blend and reciprocal-rank fusion, kept as two
//! first-class, equivalent-semantics strategies rather than a default and
//! a fallback.

use std::collections::{HashMap, HashSet};

use crate::config::Config;

/// One named scoring signal over a subset of candidate node ids.
pub struct Signal<'a> {
    pub name: &'static str,
    pub scores: &'a HashMap<i64, f32>,
}

/// Blend fusion: `score = α·sem + β·spread + γ·bm25 + δ·temporal`.
/// Missing look-ups contribute zero.
#[must_use]
pub fn blend_fuse(
    sem: &HashMap<i64, f32>,
    spread: &HashMap<i64, f32>,
    bm25: &HashMap<i64, f32>,
    temporal: &HashMap<i64, f32>,
    cfg: &Config,
    effective_delta: f32,
) -> HashMap<i64, f32> {
    let beta = cfg.blend_beta();
    let candidates = union_ids(&[sem, spread, bm25, temporal]);
    candidates
        .into_iter()
        .map(|id| {
            let score = cfg.blend_alpha * sem.get(&id).copied().unwrap_or(0.0)
                + beta * spread.get(&id).copied().unwrap_or(0.0)
                + cfg.blend_gamma * bm25.get(&id).copied().unwrap_or(0.0)
                + effective_delta * temporal.get(&id).copied().unwrap_or(0.0);
            (id, score)
        })
        .collect()
}

/// Reciprocal-rank fusion: rank each non-empty signal independently
/// (descending score, ties broken by ascending id) and sum `1 / (k +
/// rank)` contributions, `rank` 1-indexed.
#[must_use]
pub fn rrf_fuse(signals: &[Signal<'_>], k: f32) -> HashMap<i64, f32> {
    let mut totals: HashMap<i64, f32> = HashMap::new();
    for signal in signals {
        if signal.scores.is_empty() {
            continue;
        }
        let mut ranked: Vec<(i64, f32)> = signal.scores.iter().map(|(&id, &s)| (id, s)).collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        for (rank, (id, _)) in ranked.into_iter().enumerate() {
            *totals.entry(id).or_insert(0.0) += 1.0 / (k + rank as f32 + 1.0);
        }
    }
    totals
}

fn union_ids(maps: &[&HashMap<i64, f32>]) -> HashSet<i64> {
    let mut ids = HashSet::new();
    for m in maps {
        ids.extend(m.keys().copied());
    }
    ids
}

/// Min-max normalize `scores` to `[0, 1]`; a constant input normalizes to
/// all-zero rather than dividing by zero.
#[must_use]
pub fn normalize(scores: &HashMap<i64, f32>) -> HashMap<i64, f32> {
    if scores.is_empty() {
        return HashMap::new();
    }
    let min = scores.values().copied().fold(f32::INFINITY, f32::min);
    let max = scores.values().copied().fold(f32::NEG_INFINITY, f32::max);
    let span = max - min;
    scores
        .iter()
        .map(|(&id, &s)| {
            let normalized = if span > 0.0 { (s - min) / span } else { 0.0 };
            (id, normalized)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_respects_default_alpha_only_weighting() {
        let cfg = Config::default();
        let sem = HashMap::from([(1, 0.8)]);
        let empty = HashMap::new();
        let fused = blend_fuse(&sem, &empty, &empty, &empty, &cfg, 0.0);
        assert!((fused[&1] - 0.8 * cfg.blend_alpha).abs() < 1e-6);
    }

    #[test]
    fn missing_signal_contributes_zero() {
        let cfg = Config::default();
        let sem = HashMap::from([(1, 0.5)]);
        let spread = HashMap::from([(2, 0.9)]);
        let empty = HashMap::new();
        let fused = blend_fuse(&sem, &spread, &empty, &empty, &cfg, 0.0);
        assert!(fused.contains_key(&1));
        assert!(fused.contains_key(&2));
    }

    #[test]
    fn rrf_favors_item_ranked_first_across_signals() {
        let sem = HashMap::from([(1, 0.9), (2, 0.1)]);
        let bm25 = HashMap::from([(1, 5.0), (2, 1.0)]);
        let fused = rrf_fuse(
            &[
                Signal { name: "sem", scores: &sem },
                Signal { name: "bm25", scores: &bm25 },
            ],
            60.0,
        );
        assert!(fused[&1] > fused[&2]);
    }

    #[test]
    fn empty_signal_is_skipped_without_contribution() {
        let sem = HashMap::from([(1, 0.9)]);
        let empty = HashMap::new();
        let fused = rrf_fuse(
            &[
                Signal { name: "sem", scores: &sem },
                Signal { name: "bm25", scores: &empty },
            ],
            60.0,
        );
        assert_eq!(fused.len(), 1);
    }

    #[test]
    fn normalize_constant_input_is_all_zero() {
        let scores = HashMap::from([(1, 0.5), (2, 0.5)]);
        let normalized = normalize(&scores);
        assert_eq!(normalized[&1], 0.0);
        assert_eq!(normalized[&2], 0.0);
    }
}
