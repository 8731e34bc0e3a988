//! Optional cross-encoder rerank stage: a real cross-encoder is a
//! model-internal collaborator out of scope here, but the trait boundary
//! lets one be plugged in without touching the retrieval pipeline.

use async_trait::async_trait;

/// A `(query, content)` pair scorer. Implementations may call out to a
/// real cross-encoder; callers only depend on this trait.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn score(&self, query: &str, candidates: &[(i64, String)]) -> anyhow::Result<Vec<(i64, f32)>>;
}

/// A lexical-overlap stand-in satisfying the [`Reranker`] contract without
/// a model dependency: Jaccard similarity over lowercased token sets. Not
/// a cross-encoder, but exercises the full rerank stage end to end:
/// min-max normalize, blend with prior by `w`.
#[derive(Debug, Default)]
pub struct LexicalOverlapReranker;

#[async_trait]
impl Reranker for LexicalOverlapReranker {
    async fn score(&self, query: &str, candidates: &[(i64, String)]) -> anyhow::Result<Vec<(i64, f32)>> {
        let query_tokens: std::collections::HashSet<String> =
            crate::bm25::tokenize(query).into_iter().collect();
        Ok(candidates
            .iter()
            .map(|(id, content)| {
                let content_tokens: std::collections::HashSet<String> =
                    crate::bm25::tokenize(content).into_iter().collect();
                let intersection = query_tokens.intersection(&content_tokens).count();
                let union = query_tokens.union(&content_tokens).count();
                let score = if union == 0 { 0.0 } else { intersection as f32 / union as f32 };
                (*id, score)
            })
            .collect())
    }
}

/// Min-max normalize rerank scores, then blend with the prior score:
/// `final = (1 - w)·prior + w·rerank`.
#[must_use]
pub fn blend_rerank(
    prior: &std::collections::HashMap<i64, f32>,
    rerank_scores: &[(i64, f32)],
    weight: f32,
) -> std::collections::HashMap<i64, f32> {
    if rerank_scores.is_empty() {
        return prior.clone();
    }
    let min = rerank_scores.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
    let max = rerank_scores.iter().map(|(_, s)| *s).fold(f32::NEG_INFINITY, f32::max);
    let span = max - min;

    let normalized: std::collections::HashMap<i64, f32> = rerank_scores
        .iter()
        .map(|&(id, s)| {
            let n = if span > 0.0 { (s - min) / span } else { 0.0 };
            (id, n)
        })
        .collect();

    prior
        .iter()
        .map(|(&id, &p)| {
            let r = normalized.get(&id).copied().unwrap_or(0.0);
            (id, (1.0 - weight) * p + weight * r)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lexical_overlap_scores_exact_match_highest() {
        let reranker = LexicalOverlapReranker;
        let candidates = vec![
            (1, "docker compose networking".to_string()),
            (2, "completely unrelated text".to_string()),
        ];
        let scores = reranker.score("docker compose networking", &candidates).await.unwrap();
        let score_1 = scores.iter().find(|(id, _)| *id == 1).unwrap().1;
        let score_2 = scores.iter().find(|(id, _)| *id == 2).unwrap().1;
        assert!(score_1 > score_2);
    }

    #[test]
    fn blend_rerank_respects_weight() {
        let prior = std::collections::HashMap::from([(1, 0.5), (2, 0.5)]);
        let rerank_scores = vec![(1, 1.0), (2, 0.0)];
        let blended = blend_rerank(&prior, &rerank_scores, 1.0);
        assert!((blended[&1] - 1.0).abs() < 1e-6);
        assert!((blended[&2] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn empty_rerank_scores_leaves_prior_unchanged() {
        let prior = std::collections::HashMap::from([(1, 0.5)]);
        let blended = blend_rerank(&prior, &[], 0.3);
        assert_eq!(blended, prior);
    }
}
