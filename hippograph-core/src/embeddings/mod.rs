//! The embedding provider contract. A single process-wide instance;
//! deterministic for a given model id so stored embeddings remain valid
//! across restarts.

mod mock;

pub use mock::MockEmbeddingProvider;

use async_trait::async_trait;

/// Fixed-dimension dense text encoder.
///
/// Implementations must be deterministic for a given model id: the same
/// input text always yields the same vector, so previously stored
/// embeddings remain comparable to freshly computed query embeddings. If
/// the configured model changes, a re-index tool must re-encode every
/// note — this trait does not attempt to detect that itself.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Encode `text` into a `dimension()`-length vector. Not required to be
    /// L2-normalized; callers normalize as needed.
    async fn encode(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Batch convenience; default implementation just loops, which is fine
    /// for local/deterministic providers but should be overridden by a
    /// network-backed provider to batch the request.
    async fn encode_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.encode(t).await?);
        }
        Ok(out)
    }

    /// The fixed dimension this provider produces.
    fn dimension(&self) -> usize;

    /// Identifier of the active model, used to detect when stored
    /// embeddings need a re-index.
    fn model_id(&self) -> &str;
}

/// Cosine similarity between two vectors of equal length, mapped to
/// `[0, 1]` the way the ANN index reports it (`1 - cosine distance`,
/// clamped). Returns `0.0` for mismatched lengths or zero-length vectors
/// rather than panicking — missing/invalid embeddings are zero
/// contributions throughout the scoring stages.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cos = dot / (norm_a.sqrt() * norm_b.sqrt());
    ((cos + 1.0) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_are_maximally_similar() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn orthogonal_vectors_score_half() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn mismatched_lengths_are_zero_not_panic() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
