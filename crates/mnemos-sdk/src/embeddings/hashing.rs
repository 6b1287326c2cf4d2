//! Deterministic feature-hashing embedder.
//!
//! Each token is hashed with SHA-256 into a signed bucket; the bag of buckets
//! is L2-normalised. Texts sharing words end up with positive cosine
//! similarity, which is enough for development and reproducible tests.

use super::{tokenize, EmbeddingProvider};
use crate::SDKResult;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Family prefix of hashing model ids
pub const HASHING_MODEL_FAMILY: &str = "feature-hashing-v1";

/// Model id recorded for hashing vectors of `dimensions` buckets
///
/// Vectors of different widths are not comparable, so the width is part of
/// the id and a change of dimensions puts every item back in the backlog.
pub fn hashing_model_id(dimensions: usize) -> String {
    format!("{HASHING_MODEL_FAMILY}-{}", dimensions.max(1))
}

/// Offline embedder based on the hashing trick
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_id: hashing_model_id(dimensions),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a single text synchronously
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize % self.dimensions;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, texts: &[String]) -> SDKResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalised() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed_text("blue apples bought at the market");
        let b = embedder.embed_text("blue apples bought at the market");
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_words_are_closer() {
        let embedder = HashingEmbedder::default();
        let a1 = embedder.embed_text("blue apples bought at the market");
        let a2 = embedder.embed_text("blue apples from the market are interesting");
        let park = embedder.embed_text("sunny tomorrow, go to the park");

        assert!(cosine_similarity(&a1, &a2) > cosine_similarity(&a1, &park));
        assert!(cosine_similarity(&a1, &a2) > cosine_similarity(&a2, &park));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed_text("").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_model_id_tracks_dimensions() {
        assert_eq!(HashingEmbedder::default().model_id(), "feature-hashing-v1-384");
        assert_eq!(HashingEmbedder::new(256).model_id(), "feature-hashing-v1-256");
        assert_eq!(HashingEmbedder::new(0).model_id(), "feature-hashing-v1-1");
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let embedder = HashingEmbedder::new(16);
        let texts = vec!["one".to_string(), "two".to_string()];
        let vectors = embedder.embed(&texts).await.unwrap();
        assert_eq!(vectors[0], embedder.embed_text("one"));
        assert_eq!(vectors[1], embedder.embed_text("two"));
    }
}
