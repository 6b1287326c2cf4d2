//! Embedding Providers
//!
//! The indexer and retriever talk to an [`EmbeddingProvider`]: an
//! order-preserving `embed(texts) -> vectors` call tied to one model id.
//!
//! Three adapters are provided:
//!
//! - [`HashingEmbedder`] - deterministic feature hashing, no network, used for
//!   development and tests
//! - [`HttpEmbeddingProvider`] - OpenAI-compatible `/v1/embeddings`
//! - `FastEmbedProvider` - local all-MiniLM-L6-v2 inference (feature
//!   `local-embeddings`)

mod hashing;
mod http;
#[cfg(feature = "local-embeddings")]
mod local;

pub use hashing::{hashing_model_id, HashingEmbedder, HASHING_MODEL_FAMILY};
pub use http::HttpEmbeddingProvider;
#[cfg(feature = "local-embeddings")]
pub use local::FastEmbedProvider;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::{SDKError, SDKResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Source of text embeddings
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier stored alongside every produced vector
    fn model_id(&self) -> &str;

    /// Embed `texts`, returning one vector per input in the same order.
    ///
    /// Failure is per call, never per text.
    async fn embed(&self, texts: &[String]) -> SDKResult<Vec<Vec<f32>>>;
}

/// Build the provider selected by the configuration
pub fn provider_from_config(config: &EmbeddingConfig) -> SDKResult<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingProviderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimensions))),
        EmbeddingProviderKind::Http => {
            let base_url = config
                .base_url
                .clone()
                .ok_or_else(|| SDKError::embedding("embedding.base_url is required for the http provider"))?;
            Ok(Arc::new(HttpEmbeddingProvider::new(
                base_url,
                config.model.clone(),
                config.api_key.clone(),
            )))
        }
        #[cfg(feature = "local-embeddings")]
        EmbeddingProviderKind::Local => Ok(Arc::new(FastEmbedProvider::new())),
        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingProviderKind::Local => Err(SDKError::embedding(
            "Local embeddings not enabled. Compile with --features local-embeddings",
        )),
    }
}

/// Compute cosine similarity between two vectors
///
/// Returns a value between -1.0 and 1.0. Mismatched lengths and zero
/// vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Lowercase alphanumeric tokens of `text`
///
/// Shared by the hashing embedder and lexical scoring so both see the same
/// words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
