//! Entity extraction: rule-based extraction always runs; pretrained/
//! zero-shot NER are optional capabilities behind the [`NerModel`] trait —
//! when none is configured, extraction degrades to rule-based + dictionary
//! only.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::types::EntityType;

/// One extracted mention.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    pub surface: String,
    pub entity_type: EntityType,
    pub confidence: f32,
}

/// A pluggable NER backend. A real transformer-backed implementation is
/// out of scope here — model internals are external collaborators — but
/// anything satisfying this trait can be plugged in without touching
/// [`EntityExtractor`].
#[async_trait]
pub trait NerModel: Send + Sync {
    async fn extract(&self, text: &str) -> anyhow::Result<Vec<ExtractedEntity>>;
}

const MIN_SURFACE_LEN: usize = 2;
const MAX_SURFACE_TOKENS: usize = 4;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "this", "that", "these", "those", "is", "are", "was", "were", "and", "or",
    "but", "of", "in", "on", "at", "to", "for", "with", "as", "by", "from",
    "и", "в", "на", "с", "по", "для", "это", "как", "что", "а", "но",
];

/// Known entities layered on top of statistical extraction at confidence
/// 1.0, whole-word matched to avoid short-key false positives.
const KNOWN_ENTITIES: &[(&str, EntityType)] = &[
    ("docker", EntityType::Tech),
    ("python", EntityType::Tech),
    ("rust", EntityType::Tech),
    ("sqlite", EntityType::Tech),
    ("faiss", EntityType::Tech),
    ("postgres", EntityType::Tech),
    ("postgresql", EntityType::Tech),
    ("redis", EntityType::Tech),
    ("kubernetes", EntityType::Tech),
    ("anthropic", EntityType::Organization),
    ("openai", EntityType::Organization),
    ("google", EntityType::Organization),
];

/// Rule+NER hybrid entity extractor.
pub struct EntityExtractor {
    ner: Option<Box<dyn NerModel>>,
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self { ner: None }
    }
}

impl EntityExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_ner_model(ner: Box<dyn NerModel>) -> Self {
        Self { ner: Some(ner) }
    }

    /// Fraction of Cyrillic characters among letters, used to route
    /// between an English and a multilingual model — purely a routing
    /// signal for `ner`, not a correctness gate on the rule-based path,
    /// which handles both scripts already.
    #[must_use]
    pub fn is_cyrillic_dominant(text: &str) -> bool {
        let mut cyr = 0usize;
        let mut latin = 0usize;
        for ch in text.chars() {
            if ('\u{0400}'..='\u{04FF}').contains(&ch) {
                cyr += 1;
            } else if ch.is_ascii_alphabetic() {
                latin += 1;
            }
        }
        cyr > latin
    }

    /// Extract entities from `text`, merging rule-based, dictionary, and
    /// (if configured) model-based hits. Missing NER is logged once and
    /// skipped, not propagated as an error.
    pub async fn extract(&self, text: &str) -> Vec<ExtractedEntity> {
        let mut found = rule_based_extract(text);
        found.extend(dictionary_extract(text));

        if let Some(ner) = &self.ner {
            match ner.extract(text).await {
                Ok(hits) => found.extend(hits),
                Err(err) => {
                    tracing::warn!(error = %err, "NER model unavailable, degrading to rule-based extraction");
                }
            }
        }

        dedup_by_surface(found)
    }
}

fn is_noise(surface: &str) -> bool {
    let lower = surface.to_lowercase();
    if surface.chars().count() < MIN_SURFACE_LEN {
        return true;
    }
    if STOPWORDS.contains(&lower.as_str()) {
        return true;
    }
    let token_count = surface.split_whitespace().count();
    token_count == 0 || token_count > MAX_SURFACE_TOKENS
}

/// Heuristic capitalized-run extraction: consecutive capitalized words form
/// a candidate proper-noun surface, classified `concept` by default unless
/// a simple suffix/context cue suggests otherwise. This purposefully stays
/// conservative — precision over recall — since it is the always-on path.
fn rule_based_extract(text: &str) -> Vec<ExtractedEntity> {
    let mut out = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    let flush = |run: &mut Vec<&str>, out: &mut Vec<ExtractedEntity>| {
        if run.is_empty() {
            return;
        }
        let surface = run.join(" ");
        if !is_noise(&surface) {
            out.push(ExtractedEntity {
                surface,
                entity_type: EntityType::Concept,
                confidence: 0.55,
            });
        }
        run.clear();
    };

    for word in text.split_whitespace() {
        let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric());
        if trimmed.is_empty() {
            flush(&mut run, &mut out);
            continue;
        }
        let starts_upper = trimmed.chars().next().is_some_and(char::is_uppercase);
        if starts_upper {
            run.push(trimmed);
        } else {
            flush(&mut run, &mut out);
        }
    }
    flush(&mut run, &mut out);
    out
}

fn dictionary_extract(text: &str) -> Vec<ExtractedEntity> {
    let lower = text.to_lowercase();
    let mut out = Vec::new();
    for (name, entity_type) in KNOWN_ENTITIES {
        if whole_word_contains(&lower, name) {
            out.push(ExtractedEntity {
                surface: (*name).to_string(),
                entity_type: *entity_type,
                confidence: 1.0,
            });
        }
    }
    out
}

fn whole_word_contains(haystack: &str, needle: &str) -> bool {
    haystack.split(|c: char| !c.is_alphanumeric()).any(|w| w == needle)
}

/// Collapse duplicate surfaces (case-insensitive), keeping the
/// highest-confidence hit per surface.
fn dedup_by_surface(entities: Vec<ExtractedEntity>) -> Vec<ExtractedEntity> {
    let mut best: std::collections::HashMap<String, ExtractedEntity> = std::collections::HashMap::new();
    for e in entities {
        let key = e.surface.to_lowercase();
        best.entry(key)
            .and_modify(|existing| {
                if e.confidence > existing.confidence {
                    *existing = e.clone();
                }
            })
            .or_insert(e);
    }
    let mut seen: HashSet<String> = HashSet::new();
    best.into_values()
        .filter(|e| seen.insert(e.surface.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dictionary_hit_has_full_confidence() {
        let extractor = EntityExtractor::new();
        let hits = extractor.extract("Using FAISS for ANN indexing").await;
        let faiss = hits.iter().find(|e| e.surface == "faiss").unwrap();
        assert_eq!(faiss.confidence, 1.0);
        assert_eq!(faiss.entity_type, EntityType::Tech);
    }

    #[tokio::test]
    async fn dictionary_match_is_whole_word_only() {
        let extractor = EntityExtractor::new();
        let hits = extractor.extract("rustacean community post").await;
        assert!(!hits.iter().any(|e| e.surface == "rust"));
    }

    #[test]
    fn stopword_runs_are_suppressed() {
        let hits = rule_based_extract("The Is Are");
        assert!(hits.is_empty());
    }

    #[test]
    fn cyrillic_detection() {
        assert!(EntityExtractor::is_cyrillic_dominant("привет как дела"));
        assert!(!EntityExtractor::is_cyrillic_dominant("hello there"));
    }

    #[test]
    fn overly_long_capitalized_run_is_suppressed() {
        let hits = rule_based_extract("Alpha Bravo Charlie Delta Echo Foxtrot");
        assert!(hits.is_empty());
    }
}
