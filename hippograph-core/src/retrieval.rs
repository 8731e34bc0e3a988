//! The retrieval pipeline: decompose, embed, seed from ANN, spread, boost,
//! normalize, lexical, temporal, fuse, hub-penalty, optional rerank,
//! filter, touch, budget — fourteen stages in a fixed order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::adjacency::AdjacencyCache;
use crate::ann::AnnIndex;
use crate::bm25::Bm25Index;
use crate::config::Config;
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::fusion::{self, Signal};
use crate::query_decomposer::{self, order_score};
use crate::reranker::Reranker;
use crate::store::StoreBackend;
use crate::temporal_extractor::overlap;
use crate::types::{EntityType, Note, PhaseLatencies};

/// Search-time options.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub max_results: Option<usize>,
    pub detail_mode: crate::types::DetailMode,
    pub category_filter: Option<String>,
    pub time_after: Option<DateTime<Utc>>,
    pub time_before: Option<DateTime<Utc>>,
    pub entity_type_filter: Option<EntityType>,
    pub query_time: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// One scored, budgeted result.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub note_id: i64,
    pub score: f32,
    pub content: Option<String>,
    pub brief: Option<BriefContent>,
    pub category: String,
    pub importance: crate::types::Importance,
}

/// `detail_mode = brief` content summary.
#[derive(Debug, Clone)]
pub struct BriefContent {
    pub first_line: String,
    pub full_length: usize,
    pub total_lines: usize,
}

/// Search-level metadata returned alongside `results`.
#[derive(Debug, Clone, Default)]
pub struct SearchMetadata {
    pub total_activated: usize,
    pub returned: usize,
    pub estimated_tokens: usize,
    pub truncated: bool,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub metadata: SearchMetadata,
    pub latencies: PhaseLatencies,
}

fn brief_of(content: &str) -> BriefContent {
    let first_line_raw = content.lines().next().unwrap_or_default();
    let first_line: String = first_line_raw.chars().take(150).collect();
    BriefContent {
        first_line,
        full_length: content.chars().count(),
        total_lines: content.lines().count().max(1),
    }
}

fn recency_factor(anchor: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f32) -> f32 {
    let age_days = (now - anchor).num_seconds() as f32 / 86_400.0;
    let age_days = age_days.max(0.0);
    let factor = 0.5f32.powf(age_days / half_life_days.max(1e-6));
    factor.max(0.1)
}

fn importance_factor(note: &Note) -> f32 {
    note.importance.factor() + (note.access_count as f32 * 0.01).min(0.2)
}

#[allow(clippy::too_many_arguments)]
pub async fn search(
    query: &str,
    limit: usize,
    options: SearchOptions,
    store: &dyn StoreBackend,
    embedder: &dyn EmbeddingProvider,
    ann: &RwLock<AnnIndex>,
    adjacency: &RwLock<AdjacencyCache>,
    bm25: &RwLock<Bm25Index>,
    reranker: Option<&dyn Reranker>,
    cfg: &Config,
) -> Result<SearchOutcome> {
    let mut latencies = PhaseLatencies::default();
    let total_start = std::time::Instant::now();

    // Stage 1: decompose.
    let (content_query, is_temporal, direction) = query_decomposer::decompose(query);

    // Stage 2: embed.
    let embed_start = std::time::Instant::now();
    let query_embedding = embedder.encode(&content_query).await?;
    latencies.embedding_ms = embed_start.elapsed().as_secs_f64() * 1000.0;

    // Stage 3: initial activation.
    let ann_start = std::time::Instant::now();
    let seed_hits = ann.read().search(&query_embedding, 3 * limit.max(1), 0.0);
    let sem_score: HashMap<i64, f32> = seed_hits.into_iter().collect();
    latencies.ann_ms = ann_start.elapsed().as_secs_f64() * 1000.0;

    // Stage 4: spreading activation. Held for the whole sweep (synchronous,
    // CPU-bound, no await inside — a short critical section is about not
    // suspending while locked, not about call count).
    let spread_start = std::time::Instant::now();
    let mut activation = sem_score.clone();
    {
        let adjacency = adjacency.read();
        for _ in 0..cfg.activation_iterations {
            let mut next: HashMap<i64, f32> = HashMap::new();
            for (&node_id, &a) in &activation {
                if a < 0.01 {
                    continue;
                }
                *next.entry(node_id).or_insert(0.0) += a * cfg.activation_decay;
                for &(neighbor, weight, _) in adjacency.neighbors(node_id) {
                    *next.entry(neighbor).or_insert(0.0) += a * weight * cfg.activation_decay;
                }
            }
            let max = next.values().copied().fold(0.0f32, f32::max);
            if max > 0.0 {
                for v in next.values_mut() {
                    *v /= max;
                }
            }
            activation = next;
        }
    }
    latencies.spreading_ms = spread_start.elapsed().as_secs_f64() * 1000.0;

    // Stage 5: per-node boosts. Requires note metadata; fetch candidates.
    let candidate_ids: Vec<i64> = activation
        .keys()
        .chain(sem_score.keys())
        .copied()
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .collect();

    let mut notes: HashMap<i64, Note> = HashMap::new();
    for &id in &candidate_ids {
        if let Some(note) = store.get_node(id).await? {
            notes.insert(id, note);
        }
    }

    let now = Utc::now();
    for (&id, a) in activation.iter_mut() {
        let Some(note) = notes.get(&id) else { continue };
        let recency = recency_factor(note.recency_anchor(), now, cfg.half_life_days);
        *a *= recency * importance_factor(note);
    }

    // Stage 6: independent normalization.
    let activation = fusion::normalize(&activation);
    let sem_score = fusion::normalize(&sem_score);

    // Stage 7: lexical signal.
    let bm25_start = std::time::Instant::now();
    let bm25_scores = if cfg.blend_gamma > 0.0 {
        fusion::normalize(&bm25.read().search(&content_query, 3 * limit.max(1)))
    } else {
        HashMap::new()
    };
    latencies.bm25_ms = bm25_start.elapsed().as_secs_f64() * 1000.0;

    // Stage 8: temporal signal.
    let temporal_start = std::time::Instant::now();
    let mut effective_delta = cfg.blend_delta;
    let mut temporal_scores: HashMap<i64, f32> = HashMap::new();
    let query_interval = options.query_time.or_else(|| {
        let (start, end, _) = crate::temporal_extractor::extract(query, now);
        start.zip(end)
    });
    if let Some((q_start, q_end)) = query_interval {
        for (&id, note) in &notes {
            if let (Some(n_start), Some(n_end)) = (note.event_start, note.event_end) {
                temporal_scores.insert(id, overlap(q_start, q_end, n_start, n_end));
            }
        }
    }
    if is_temporal {
        let all_ts: Vec<i64> = notes.values().map(|n| n.recency_anchor().timestamp()).collect();
        for (&id, note) in &notes {
            let order = order_score(note.recency_anchor().timestamp(), direction, &all_ts);
            let entry = temporal_scores.entry(id).or_insert(0.0);
            *entry = entry.max(order);
        }
        if effective_delta == 0.0 {
            effective_delta = 0.15;
        }
    }
    latencies.temporal_ms = temporal_start.elapsed().as_secs_f64() * 1000.0;

    // Stage 9: fusion.
    let mut fused = if cfg.fusion_method == crate::types::FusionMethod::Rrf {
        fusion::rrf_fuse(
            &[
                Signal { name: "sem", scores: &sem_score },
                Signal { name: "spread", scores: &activation },
                Signal { name: "bm25", scores: &bm25_scores },
                Signal { name: "temporal", scores: &temporal_scores },
            ],
            cfg.rrf_k,
        )
    } else {
        fusion::blend_fuse(&sem_score, &activation, &bm25_scores, &temporal_scores, cfg, effective_delta)
    };

    // Stage 10: hub penalty.
    let entity_counts = store.get_entity_counts_batch(&candidate_ids).await?;
    for (&id, score) in fused.iter_mut() {
        if let Some(&count) = entity_counts.get(&id) {
            if count > cfg.hub_penalty_threshold {
                *score *= cfg.hub_penalty_threshold as f32 / count as f32;
            }
        }
    }

    let total_activated = fused.len();

    // Stage 11: optional rerank.
    let rerank_start = std::time::Instant::now();
    if cfg.rerank_enabled {
        if let Some(reranker) = reranker {
            let mut ranked: Vec<(i64, f32)> = fused.iter().map(|(&id, &s)| (id, s)).collect();
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
            ranked.truncate(cfg.rerank_top_n);
            let candidates: Vec<(i64, String)> = ranked
                .iter()
                .filter_map(|&(id, _)| notes.get(&id).map(|n| (id, n.content.clone())))
                .collect();
            if let Ok(rerank_scores) = reranker.score(query, &candidates).await {
                fused = crate::reranker::blend_rerank(&fused, &rerank_scores, cfg.rerank_weight);
            }
        }
    }
    latencies.rerank_ms = rerank_start.elapsed().as_secs_f64() * 1000.0;

    // Stage 12: filters.
    let filters_start = std::time::Instant::now();
    let mut ranked: Vec<(i64, f32)> = fused.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));

    let entity_type_members: Option<std::collections::HashSet<i64>> = match options.entity_type_filter {
        Some(entity_type) => {
            let all_entities = store.get_all_entities().await?;
            let mut members = std::collections::HashSet::new();
            for entity in all_entities.iter().filter(|e| e.entity_type == entity_type) {
                members.extend(store.get_nodes_by_entity(entity.id).await?);
            }
            Some(members)
        }
        None => None,
    };

    let mut filtered = Vec::new();
    for (id, score) in ranked {
        let Some(note) = notes.get(&id) else { continue };
        if let Some(category) = &options.category_filter {
            if &note.category != category {
                continue;
            }
        }
        if let Some(after) = options.time_after {
            if note.created_at < after {
                continue;
            }
        }
        if let Some(before) = options.time_before {
            if note.created_at > before {
                continue;
            }
        }
        if let Some(members) = &entity_type_members {
            if !members.contains(&id) {
                continue;
            }
        }
        filtered.push((id, score));
    }
    latencies.filters_ms = filters_start.elapsed().as_secs_f64() * 1000.0;

    let max_results = options.max_results.unwrap_or(usize::MAX).min(limit);
    let truncated = filtered.len() > max_results || total_activated > max_results;
    filtered.truncate(max_results);

    // Stage 13: access tracking.
    for (id, _) in &filtered {
        store.touch_node(*id).await?;
    }

    // Stage 14: budgeting.
    let detail_mode = options.detail_mode;
    let results: Vec<SearchResult> = filtered
        .into_iter()
        .filter_map(|(id, score)| {
            let note = notes.get(&id)?;
            let (content, brief) = match detail_mode {
                crate::types::DetailMode::Full => (Some(note.content.clone()), None),
                crate::types::DetailMode::Brief => (None, Some(brief_of(&note.content))),
            };
            Some(SearchResult {
                note_id: id,
                score,
                content,
                brief,
                category: note.category.clone(),
                importance: note.importance,
            })
        })
        .collect();

    let estimated_tokens: usize = results
        .iter()
        .map(|r| {
            let chars = r
                .content
                .as_ref()
                .map(String::len)
                .or_else(|| r.brief.as_ref().map(|b| b.full_length))
                .unwrap_or(0);
            chars / 4
        })
        .sum();

    latencies.total_ms = total_start.elapsed().as_secs_f64() * 1000.0;

    let returned = results.len();
    Ok(SearchOutcome {
        results,
        metadata: SearchMetadata {
            total_activated,
            returned,
            estimated_tokens,
            truncated,
            has_more: total_activated > returned,
        },
        latencies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_factor_decays_with_age_and_floors_at_point_one() {
        let now = Utc::now();
        let fresh = recency_factor(now, now, 30.0);
        let old = recency_factor(now - chrono::Duration::days(365), now, 30.0);
        assert!((fresh - 1.0).abs() < 1e-3);
        assert!(old >= 0.1);
        assert!(old < fresh);
    }

    #[test]
    fn brief_content_truncates_first_line() {
        let long_line = "a".repeat(300);
        let brief = brief_of(&long_line);
        assert_eq!(brief.first_line.chars().count(), 150);
        assert_eq!(brief.full_length, 300);
    }

    #[test]
    fn importance_factor_caps_access_bonus_at_point_two() {
        let mut note = Note {
            id: 1,
            content: String::new(),
            category: "general".into(),
            created_at: Utc::now(),
            last_accessed: Utc::now(),
            access_count: 1000,
            importance: crate::types::Importance::Normal,
            embedding: None,
            emotional: None,
            event_start: None,
            event_end: None,
            temporal_expressions: vec![],
        };
        assert!((importance_factor(&note) - 1.2).abs() < 1e-6);
        note.access_count = 0;
        assert!((importance_factor(&note) - 1.0).abs() < 1e-6);
    }
}
