//! Embedding Indexer
//!
//! Turns memory items into stored vectors. Items are embedded in bounded
//! batches; when a whole batch fails the indexer falls back to one call per
//! item with linear backoff. Items that still fail are left in the backlog
//! for the next sweep rather than being marked as failed.

use crate::config::EmbeddingConfig;
use crate::embeddings::EmbeddingProvider;
use crate::{SDKError, SDKResult};
use mnemos_core::types::MemoryItem;
use mnemos_core::Database;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one page of a reindex walk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReindexPage {
    /// Active ids read in this page
    pub scanned: usize,
    /// Ids embedded and stored
    pub indexed: usize,
    /// Resume point; None once the walk reached the end
    pub next_cursor: Option<String>,
}

/// Totals for a full reindex
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReindexReport {
    pub pages: usize,
    pub scanned: usize,
    pub indexed: usize,
    pub skipped: usize,
}

/// Embeds memory items and upserts the vectors into the store
pub struct EmbeddingIndexer {
    db: Arc<Database>,
    provider: Arc<dyn EmbeddingProvider>,
    config: EmbeddingConfig,
}

impl EmbeddingIndexer {
    pub fn new(db: Arc<Database>, provider: Arc<dyn EmbeddingProvider>, config: EmbeddingConfig) -> Self {
        Self { db, provider, config }
    }

    /// Model id vectors are written under
    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Embed and store the given items; returns how many were indexed
    ///
    /// Unknown and non-active ids are skipped. Store failures abort the call;
    /// upserts committed before the failure stand.
    pub async fn index_items(&self, memory_ids: &[String]) -> SDKResult<usize> {
        let items: Vec<MemoryItem> = self
            .db
            .get_many(memory_ids)?
            .into_iter()
            .filter(MemoryItem::is_active)
            .collect();

        if items.len() < memory_ids.len() {
            debug!(
                requested = memory_ids.len(),
                active = items.len(),
                "skipping unknown or inactive items"
            );
        }

        let mut indexed = 0;
        for batch in items.chunks(self.config.batch_size.max(1)) {
            indexed += self.index_batch(batch).await?;
        }
        Ok(indexed)
    }

    /// Index up to `limit` items that have no embedding from the current model
    pub async fn sweep_backlog(&self, limit: usize) -> SDKResult<usize> {
        let ids = self.db.backlog_ids(self.model_id(), limit)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let indexed = self.index_items(&ids).await?;
        info!(pending = ids.len(), indexed, model = self.model_id(), "backlog sweep finished");
        Ok(indexed)
    }

    /// [`EmbeddingIndexer::sweep_backlog`] over a single owner's items
    pub async fn sweep_owner_backlog(&self, owner_id: &str, limit: usize) -> SDKResult<usize> {
        let ids = self.db.owner_backlog_ids(owner_id, self.model_id(), limit)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let indexed = self.index_items(&ids).await?;
        info!(owner_id, pending = ids.len(), indexed, model = self.model_id(), "owner backlog sweep finished");
        Ok(indexed)
    }

    /// Re-embed one page of active items in id order, starting after `cursor`
    ///
    /// Existing embeddings are overwritten regardless of model. Feed the
    /// returned cursor back in to continue; each page only holds the store
    /// lock for its own reads and upserts.
    pub async fn reindex_page(&self, cursor: Option<&str>, page_size: usize) -> SDKResult<ReindexPage> {
        let page_size = page_size.max(1);
        let ids = self.db.active_ids_page(cursor, page_size)?;
        let indexed = self.index_items(&ids).await?;

        let next_cursor = if ids.len() < page_size {
            None
        } else {
            ids.last().cloned()
        };

        Ok(ReindexPage {
            scanned: ids.len(),
            indexed,
            next_cursor,
        })
    }

    /// Walk every active item and re-embed it (model migrations)
    pub async fn reindex_all(&self) -> SDKResult<ReindexReport> {
        let mut report = ReindexReport::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.reindex_page(cursor.as_deref(), self.config.batch_size).await?;
            report.pages += 1;
            report.scanned += page.scanned;
            report.indexed += page.indexed;

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        report.skipped = report.scanned - report.indexed;
        info!(
            pages = report.pages,
            scanned = report.scanned,
            indexed = report.indexed,
            skipped = report.skipped,
            model = self.model_id(),
            "reindex finished"
        );
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn index_batch(&self, batch: &[MemoryItem]) -> SDKResult<usize> {
        let inputs: Vec<String> = batch.iter().map(MemoryItem::embedding_input).collect();

        match self.embed_with_timeout(&inputs).await {
            Ok(vectors) => {
                for (item, vector) in batch.iter().zip(vectors.iter()) {
                    self.db.upsert_embedding(&item.id, vector, self.model_id())?;
                }
                debug!(count = batch.len(), "batch indexed");
                Ok(batch.len())
            }
            Err(e) => {
                warn!(
                    error = %e,
                    batch_size = batch.len(),
                    "batch embedding failed, falling back to single items"
                );
                let mut indexed = 0;
                for (item, input) in batch.iter().zip(inputs.iter()) {
                    if self.index_single(item, input).await? {
                        indexed += 1;
                    }
                }
                Ok(indexed)
            }
        }
    }

    /// Returns false when the item exhausted its attempts or hit a
    /// permanent error
    async fn index_single(&self, item: &MemoryItem, input: &str) -> SDKResult<bool> {
        let max_attempts = self.config.max_attempts.max(1);
        let texts = [input.to_string()];

        for attempt in 1..=max_attempts {
            match self.embed_with_timeout(&texts).await {
                Ok(mut vectors) => {
                    let vector = vectors.pop().unwrap_or_default();
                    self.db.upsert_embedding(&item.id, &vector, self.model_id())?;
                    return Ok(true);
                }
                Err(e) if !e.is_transient() => {
                    warn!(memory_id = %item.id, error = %e, "permanent embedding error, leaving item in backlog");
                    return Ok(false);
                }
                Err(e) if attempt < max_attempts => {
                    let delay = Duration::from_millis(self.config.retry_delay_ms * attempt as u64);
                    warn!(
                        memory_id = %item.id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying embedding"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(memory_id = %item.id, error = %e, "embedding failed, leaving item in backlog");
                }
            }
        }
        Ok(false)
    }

    async fn embed_with_timeout(&self, texts: &[String]) -> SDKResult<Vec<Vec<f32>>> {
        let limit = Duration::from_secs(self.config.timeout_secs);
        let vectors = tokio::time::timeout(limit, self.provider.embed(texts))
            .await
            .map_err(|_| SDKError::timeout(limit.as_millis() as u64))??;

        if vectors.len() != texts.len() {
            return Err(SDKError::embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        if vectors.iter().any(Vec::is_empty) {
            return Err(SDKError::embedding("service returned an empty vector"));
        }
        Ok(vectors)
    }
}
