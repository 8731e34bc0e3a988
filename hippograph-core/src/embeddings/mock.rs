//! Deterministic hash-based embedding provider, used as the default
//! in-process provider and in tests. A real network- or ONNX-backed
//! provider is out of scope here but would implement the same
//! [`super::EmbeddingProvider`] trait.

use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use super::EmbeddingProvider;

/// Deterministic mock encoder: mean-pools a simple hash-based PRNG over the
/// input text, producing a fixed-dimension vector that is stable across
/// runs for the same input. Not semantically meaningful — not for
/// production use.
pub struct MockEmbeddingProvider {
    name: String,
    dimension: usize,
}

impl MockEmbeddingProvider {
    #[must_use]
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
        }
    }

    /// Build with the default dimension (384).
    #[must_use]
    pub fn default_dimension(name: impl Into<String>) -> Self {
        Self::new(name, 384)
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut hasher);
        let seed0 = hasher.finish();

        let mut embedding = Vec::with_capacity(self.dimension);
        let mut seed = seed0 | 1; // avoid a degenerate all-zero sequence
        for _ in 0..self.dimension {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let value = ((seed >> 16) as f32) / 32768.0 - 1.0;
            embedding.push(value);
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn encode(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.generate(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_input_is_deterministic() {
        let p = MockEmbeddingProvider::default_dimension("mock-v1");
        let a = p.encode("Artem configured Docker on Mac Studio").await.unwrap();
        let b = p.encode("Artem configured Docker on Mac Studio").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }

    #[tokio::test]
    async fn different_inputs_differ() {
        let p = MockEmbeddingProvider::default_dimension("mock-v1");
        let a = p.encode("alpha").await.unwrap();
        let b = p.encode("beta").await.unwrap();
        assert_ne!(a, b);
    }
}
