//! Okapi BM25 inverted-index lexical scorer: lowercase tokenizer (split on
//! non-alphanumeric including common Cyrillic ranges) and smoothed IDF.

use std::collections::HashMap;

/// Default BM25 term-frequency saturation parameter.
pub const DEFAULT_K1: f32 = 1.5;
/// Default BM25 length-normalization parameter.
pub const DEFAULT_B: f32 = 0.75;

/// Lowercases and splits on anything that isn't a Latin/Cyrillic letter or
/// ASCII digit.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in lowered.chars() {
        let is_word_char = ch.is_ascii_alphanumeric()
            || ('\u{0400}'..='\u{04FF}').contains(&ch) // Cyrillic
            || ('\u{0500}'..='\u{052F}').contains(&ch); // Cyrillic Supplement
        if is_word_char {
            current.push(ch);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[derive(Debug, Clone, Default)]
struct Document {
    term_freqs: HashMap<String, u32>,
    length: u32,
}

/// Okapi BM25 inverted index with incremental document addition.
#[derive(Debug)]
pub struct Bm25Index {
    k1: f32,
    b: f32,
    documents: HashMap<i64, Document>,
    /// Postings: term -> set of document ids containing it (used for df).
    postings: HashMap<String, std::collections::HashSet<i64>>,
    total_length: u64,
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new(DEFAULT_K1, DEFAULT_B)
    }
}

impl Bm25Index {
    #[must_use]
    pub fn new(k1: f32, b: f32) -> Self {
        Self {
            k1,
            b,
            documents: HashMap::new(),
            postings: HashMap::new(),
            total_length: 0,
        }
    }

    /// Bulk initialize from `(id, text)` pairs.
    pub fn build(&mut self, docs: &[(i64, String)]) {
        self.documents.clear();
        self.postings.clear();
        self.total_length = 0;
        for (id, text) in docs {
            self.add_document(*id, text);
        }
    }

    /// Index (or re-index) one document, immediately searchable.
    pub fn add_document(&mut self, id: i64, text: &str) {
        self.remove_document(id);
        let tokens = tokenize(text);
        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        for t in &tokens {
            *term_freqs.entry(t.clone()).or_insert(0) += 1;
        }
        let length = tokens.len() as u32;
        for term in term_freqs.keys() {
            self.postings.entry(term.clone()).or_default().insert(id);
        }
        self.total_length += u64::from(length);
        self.documents.insert(id, Document { term_freqs, length });
    }

    /// Remove a document (used on note deletion/content update).
    pub fn remove_document(&mut self, id: i64) {
        if let Some(doc) = self.documents.remove(&id) {
            self.total_length -= u64::from(doc.length);
            for term in doc.term_freqs.keys() {
                if let Some(set) = self.postings.get_mut(term) {
                    set.remove(&id);
                    if set.is_empty() {
                        self.postings.remove(term);
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn doc_count(&self) -> usize {
        self.documents.len()
    }

    fn avg_doc_length(&self) -> f32 {
        if self.documents.is_empty() {
            0.0
        } else {
            self.total_length as f32 / self.documents.len() as f32
        }
    }

    /// Smoothed IDF: `log((N - df + 0.5) / (df + 0.5) + 1)` so that terms
    /// present in every document still contribute a small positive value.
    fn idf(&self, term: &str) -> f32 {
        let n = self.documents.len() as f32;
        let df = self.postings.get(term).map_or(0, std::collections::HashSet::len) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Score every document against `query`, returning only the
    /// `top_k` positive scores.
    #[must_use]
    pub fn search(&self, query: &str, top_k: usize) -> HashMap<i64, f32> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.documents.is_empty() {
            return HashMap::new();
        }
        let avg_len = self.avg_doc_length();
        let mut scores: HashMap<i64, f32> = HashMap::new();

        for term in &query_terms {
            let idf = self.idf(term);
            let Some(doc_ids) = self.postings.get(term) else {
                continue;
            };
            for &doc_id in doc_ids {
                let Some(doc) = self.documents.get(&doc_id) else {
                    continue;
                };
                let tf = *doc.term_freqs.get(term).unwrap_or(&0) as f32;
                if tf == 0.0 {
                    continue;
                }
                let denom = tf + self.k1 * (1.0 - self.b + self.b * (doc.length as f32 / avg_len.max(1.0)));
                let score = idf * (tf * (self.k1 + 1.0)) / denom;
                *scores.entry(doc_id).or_insert(0.0) += score;
            }
        }

        scores.retain(|_, score| *score > 0.0);
        let mut ranked: Vec<(i64, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        ranked.truncate(top_k);
        ranked.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("Artem's Docker-setup!"),
            vec!["artem", "s", "docker", "setup"]
        );
    }

    #[test]
    fn tokenize_keeps_cyrillic_words_whole() {
        assert_eq!(tokenize("привет мир"), vec!["привет", "мир"]);
    }

    #[test]
    fn exact_term_match_scores_positive() {
        let mut idx = Bm25Index::default();
        idx.build(&[
            (1, "the eviction policy is lru".to_string()),
            (2, "docker compose networking basics".to_string()),
        ]);
        let scores = idx.search("eviction policy lru", 10);
        assert!(scores.get(&1).copied().unwrap_or(0.0) > 0.0);
        assert!(!scores.contains_key(&2));
    }

    #[test]
    fn common_term_in_every_doc_still_contributes_small_positive_value() {
        let mut idx = Bm25Index::default();
        idx.build(&[
            (1, "common word alpha".to_string()),
            (2, "common word beta".to_string()),
            (3, "common word gamma".to_string()),
        ]);
        let scores = idx.search("common", 10);
        assert!(scores.values().all(|&s| s > 0.0));
    }

    #[test]
    fn remove_document_drops_it_from_results() {
        let mut idx = Bm25Index::default();
        idx.build(&[(1, "unique keyword xylophone".to_string())]);
        idx.remove_document(1);
        assert!(idx.search("xylophone", 10).is_empty());
        assert_eq!(idx.doc_count(), 0);
    }

    #[test]
    fn empty_query_returns_empty() {
        let mut idx = Bm25Index::default();
        idx.build(&[(1, "some text".to_string())]);
        assert!(idx.search("!!!", 10).is_empty());
    }
}
