//! Local embeddings using `fastembed` (all-MiniLM-L6-v2, 384 dimensions).
//!
//! The model is loaded lazily on first use and shared behind a lock.

use super::EmbeddingProvider;
use crate::{SDKError, SDKResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Model id recorded for fastembed vectors
pub const LOCAL_MODEL_ID: &str = "all-MiniLM-L6-v2";

/// In-process embedding model
pub struct FastEmbedProvider {
    model: Arc<RwLock<Option<fastembed::TextEmbedding>>>,
}

impl Default for FastEmbedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FastEmbedProvider {
    pub fn new() -> Self {
        Self {
            model: Arc::new(RwLock::new(None)),
        }
    }

    async fn ensure_model(&self) -> SDKResult<()> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        if self.model.read().await.is_some() {
            return Ok(());
        }

        let mut model_guard = self.model.write().await;
        if model_guard.is_some() {
            return Ok(());
        }

        tracing::info!(model = LOCAL_MODEL_ID, "loading embedding model");
        let start = std::time::Instant::now();

        let mut init_options = InitOptions::default();
        init_options.model_name = EmbeddingModel::AllMiniLML6V2;
        init_options.show_download_progress = false;

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| SDKError::embedding(format!("failed to load embedding model: {e}")))?;

        tracing::info!(elapsed = ?start.elapsed(), "embedding model loaded");
        *model_guard = Some(model);
        Ok(())
    }

    /// Check if the model is loaded
    pub async fn is_loaded(&self) -> bool {
        self.model.read().await.is_some()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    fn model_id(&self) -> &str {
        LOCAL_MODEL_ID
    }

    async fn embed(&self, texts: &[String]) -> SDKResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.ensure_model().await?;

        let model_guard = self.model.read().await;
        let model = model_guard
            .as_ref()
            .ok_or_else(|| SDKError::embedding("embedding model not initialized"))?;

        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        model
            .embed(inputs, None)
            .map_err(|e| SDKError::embedding(format!("failed to generate embeddings: {e}")))
    }
}
