//! Runtime configuration, loaded from the environment: a plain struct with
//! a `Default` impl, plus a `from_env()` loader that overrides individual
//! fields from named environment variables.

use crate::types::FusionMethod;

/// Top-level configuration for the retrieval core.
#[derive(Debug, Clone)]
pub struct Config {
    pub embedding_dimension: usize,

    pub activation_iterations: u32,
    pub activation_decay: f32,

    pub similarity_threshold: f32,
    pub max_semantic_links: usize,

    pub duplicate_threshold: f32,
    pub similar_threshold: f32,

    pub blend_alpha: f32,
    pub blend_gamma: f32,
    pub blend_delta: f32,
    pub fusion_method: FusionMethod,
    pub rrf_k: f32,

    pub half_life_days: f32,

    pub rerank_enabled: bool,
    pub rerank_top_n: usize,
    pub rerank_weight: f32,

    pub stale_edge_days: i64,
    pub orphan_min_links: usize,
    pub max_snapshots: usize,
    pub snapshot_dir: String,

    pub sleep_interval_hours: u64,
    pub sleep_note_threshold: u64,

    pub enable_emotional_memory: bool,

    pub hub_penalty_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding_dimension: 384,

            activation_iterations: 3,
            activation_decay: 0.7,

            similarity_threshold: 0.5,
            max_semantic_links: 5,

            duplicate_threshold: 0.95,
            similar_threshold: 0.90,

            blend_alpha: 0.6,
            blend_gamma: 0.0,
            blend_delta: 0.0,
            fusion_method: FusionMethod::Blend,
            rrf_k: 60.0,

            half_life_days: 30.0,

            rerank_enabled: false,
            rerank_top_n: 20,
            rerank_weight: 0.3,

            stale_edge_days: 90,
            orphan_min_links: 1,
            max_snapshots: 7,
            snapshot_dir: "./snapshots".to_string(),

            sleep_interval_hours: 6,
            sleep_note_threshold: 50,

            enable_emotional_memory: false,

            hub_penalty_threshold: 20,
        }
    }
}

impl Config {
    /// The computed β weight so that `α + β + γ + δ = 1` always holds. β is
    /// never stored.
    #[must_use]
    pub fn blend_beta(&self) -> f32 {
        (1.0 - self.blend_alpha - self.blend_gamma - self.blend_delta).max(0.0)
    }

    /// Load configuration from environment variables, falling back to
    /// [`Config::default`] for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        let env_f32 = |key: &str, default: f32| -> f32 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_usize = |key: &str, default: usize| -> usize {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_u32 = |key: &str, default: u32| -> u32 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_u64 = |key: &str, default: u64| -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_bool = |key: &str, default: bool| -> bool {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        cfg.embedding_dimension = env_usize("EMBEDDING_DIMENSION", cfg.embedding_dimension);
        cfg.activation_iterations = env_u32("ACTIVATION_ITERATIONS", cfg.activation_iterations);
        cfg.activation_decay = env_f32("ACTIVATION_DECAY", cfg.activation_decay);
        cfg.similarity_threshold = env_f32("SIMILARITY_THRESHOLD", cfg.similarity_threshold);
        cfg.max_semantic_links = env_usize("MAX_SEMANTIC_LINKS", cfg.max_semantic_links);
        cfg.duplicate_threshold = env_f32("DUPLICATE_THRESHOLD", cfg.duplicate_threshold);
        cfg.similar_threshold = env_f32("SIMILAR_THRESHOLD", cfg.similar_threshold);
        cfg.blend_alpha = env_f32("BLEND_ALPHA", cfg.blend_alpha);
        cfg.blend_gamma = env_f32("BLEND_GAMMA", cfg.blend_gamma);
        cfg.blend_delta = env_f32("BLEND_DELTA", cfg.blend_delta);
        cfg.fusion_method = match std::env::var("FUSION_METHOD").as_deref() {
            Ok("rrf") => FusionMethod::Rrf,
            Ok("blend") => FusionMethod::Blend,
            _ => cfg.fusion_method,
        };
        cfg.rrf_k = env_f32("RRF_K", cfg.rrf_k);
        cfg.half_life_days = env_f32("HALF_LIFE_DAYS", cfg.half_life_days);
        cfg.rerank_enabled = env_bool("RERANK_ENABLED", cfg.rerank_enabled);
        cfg.rerank_top_n = env_usize("RERANK_TOP_N", cfg.rerank_top_n);
        cfg.rerank_weight = env_f32("RERANK_WEIGHT", cfg.rerank_weight);
        cfg.stale_edge_days = std::env::var("STALE_EDGE_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.stale_edge_days);
        cfg.orphan_min_links = env_usize("ORPHAN_MIN_LINKS", cfg.orphan_min_links);
        cfg.max_snapshots = env_usize("MAX_SNAPSHOTS", cfg.max_snapshots);
        cfg.snapshot_dir = std::env::var("SNAPSHOT_DIR").unwrap_or(cfg.snapshot_dir);
        cfg.sleep_interval_hours = env_u64("SLEEP_INTERVAL_HOURS", cfg.sleep_interval_hours);
        cfg.sleep_note_threshold = env_u64("SLEEP_NOTE_THRESHOLD", cfg.sleep_note_threshold);
        cfg.enable_emotional_memory =
            env_bool("ENABLE_EMOTIONAL_MEMORY", cfg.enable_emotional_memory);

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_blend_beta_is_point_four() {
        let cfg = Config::default();
        assert!((cfg.blend_beta() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn weights_always_sum_to_one() {
        let cfg = Config {
            blend_alpha: 0.3,
            blend_gamma: 0.2,
            blend_delta: 0.1,
            ..Config::default()
        };
        let sum = cfg.blend_alpha + cfg.blend_beta() + cfg.blend_gamma + cfg.blend_delta;
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn beta_floors_at_zero_when_others_exceed_one() {
        let cfg = Config {
            blend_alpha: 0.8,
            blend_gamma: 0.5,
            blend_delta: 0.0,
            ..Config::default()
        };
        assert_eq!(cfg.blend_beta(), 0.0);
    }
}
