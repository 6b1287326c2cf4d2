//! Main SDK Entry Point
//!
//! Provides the [`Mnemos`] facade that wires the store and the services
//! together from a single [`MnemosConfig`].

use std::sync::Arc;

use mnemos_core::types::{EventType, MemoryItem, MemoryStats, NewMemoryItem, content_hash};
use mnemos_core::Database;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheBackend, InMemoryCacheBackend, ShortTermCache};
use crate::clustering::ClusterDiscovery;
use crate::embeddings::{provider_from_config, EmbeddingProvider};
use crate::events::EventTracker;
use crate::indexer::EmbeddingIndexer;
use crate::retrieval::{HybridRetriever, ScoredMemory};
use crate::topics::{AutoClusteringResult, FallbackTopicNamer, HttpCompletionClient, LlmTopicNamer, TopicNamer, TopicOrchestrator};
use crate::{MnemosConfig, SDKResult};

/// Outcome of [`Mnemos::maintain`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Items embedded by the backlog sweep
    pub indexed: usize,
    pub clustering: AutoClusteringResult,
}

/// Mnemos - Main entry point
///
/// # Example
///
/// ```rust,no_run
/// use mnemos_sdk::{Mnemos, MnemosConfig};
/// use mnemos_sdk::types::NewMemoryItem;
///
/// async fn example() -> anyhow::Result<()> {
///     let mnemos = Mnemos::open(MnemosConfig::new("mnemos.db"))?;
///
///     mnemos.remember(NewMemoryItem::new("user-123", "Blue apples are sold at the market")).await?;
///     let hits = mnemos.recall("user-123", "apples", 5).await?;
///
///     Ok(())
/// }
/// ```
pub struct Mnemos {
    config: MnemosConfig,
    db: Arc<Database>,
    indexer: EmbeddingIndexer,
    cache: ShortTermCache,
    retriever: HybridRetriever,
    orchestrator: TopicOrchestrator,
    events: EventTracker,
}

impl Mnemos {
    /// Open the store and build every service from `config`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The database cannot be opened
    /// - The configured embedding provider is unavailable
    pub fn open(config: MnemosConfig) -> SDKResult<Self> {
        config.validate()?;

        if let Some(parent) = config.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Arc::new(Database::open_path(&config.database_path)?);
        let provider = provider_from_config(&config.embedding)?;

        let namer: Arc<dyn TopicNamer> = match HttpCompletionClient::from_config(&config.naming) {
            Some(client) => Arc::new(LlmTopicNamer::new(Arc::new(client), &config.naming)),
            None => Arc::new(FallbackTopicNamer),
        };

        info!(
            database = %config.database_path.display(),
            model = provider.model_id(),
            naming = config.naming.enabled,
            "mnemos opened"
        );
        Ok(Self::with_components(config, db, provider, namer, Arc::new(InMemoryCacheBackend::new())))
    }

    /// Assemble from explicit parts (tests, embedding hosts with their own adapters)
    pub fn with_components(
        config: MnemosConfig,
        db: Arc<Database>,
        provider: Arc<dyn EmbeddingProvider>,
        namer: Arc<dyn TopicNamer>,
        cache_backend: Arc<dyn CacheBackend>,
    ) -> Self {
        let indexer = EmbeddingIndexer::new(db.clone(), provider.clone(), config.embedding.clone());
        let retriever = HybridRetriever::new(db.clone(), provider.clone(), config.retrieval.clone(), &config.embedding);
        let discovery = ClusterDiscovery::new(db.clone(), &config.clustering).with_model(provider.model_id());
        let orchestrator = TopicOrchestrator::new(db.clone(), discovery, namer, &config.clustering);
        let cache = ShortTermCache::new(cache_backend, config.cache.clone());
        let events = EventTracker::new(db.clone());

        Self {
            config,
            db,
            indexer,
            cache,
            retriever,
            orchestrator,
            events,
        }
    }

    pub fn config(&self) -> &MnemosConfig {
        &self.config
    }

    /// The durable store
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn indexer(&self) -> &EmbeddingIndexer {
        &self.indexer
    }

    pub fn cache(&self) -> &ShortTermCache {
        &self.cache
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn orchestrator(&self) -> &TopicOrchestrator {
        &self.orchestrator
    }

    pub fn events(&self) -> &EventTracker {
        &self.events
    }

    /// Store an item and try to index it right away
    ///
    /// Content already stored for the owner returns the existing item. A
    /// failed index leaves the item in the backlog for the next sweep.
    pub async fn remember(&self, input: NewMemoryItem) -> SDKResult<MemoryItem> {
        let hash = content_hash(&input.content);
        if let Some(existing) = self.db.find_by_hash(&input.owner_id, &hash)? {
            debug!(memory_id = %existing.id, "duplicate content, returning existing item");
            return Ok(existing);
        }

        let id = self.db.put(&input)?;
        if let Err(e) = self.indexer.index_items(std::slice::from_ref(&id)).await {
            warn!(memory_id = %id, error = %e, "immediate indexing failed");
        }
        Ok(self.db.get(&id)?)
    }

    /// Search and record that the hits were recalled
    pub async fn recall(&self, owner_id: &str, query: &str, limit: usize) -> SDKResult<Vec<ScoredMemory>> {
        let hits = self.retriever.search(owner_id, query, limit).await?;
        if hits.is_empty() {
            return Ok(hits);
        }

        let ids: Vec<String> = hits.iter().map(|h| h.item.id.clone()).collect();
        self.events
            .log_usage(owner_id, &ids, EventType::Recalled, None, Some(query))
            .await?;
        self.events.increment_usage_count(&ids).await?;
        Ok(hits)
    }

    /// Sweep the owner's embedding backlog, then re-cluster their items
    ///
    /// Other owners' backlogs are left to the worker.
    pub async fn maintain(&self, owner_id: &str) -> SDKResult<MaintenanceReport> {
        let indexed = self
            .indexer
            .sweep_owner_backlog(owner_id, self.config.worker.backlog_batch)
            .await?;
        let clustering = self.orchestrator.run_auto_clustering(owner_id, None).await?;
        Ok(MaintenanceReport { indexed, clustering })
    }

    /// Counts for one owner under the current embedding model
    pub fn stats(&self, owner_id: &str) -> SDKResult<MemoryStats> {
        Ok(self.db.memory_stats(owner_id, self.indexer.model_id())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::topics::RunStatus;
    use tempfile::TempDir;

    fn in_memory() -> Mnemos {
        Mnemos::with_components(
            MnemosConfig::default(),
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(HashingEmbedder::default()),
            Arc::new(FallbackTopicNamer),
            Arc::new(InMemoryCacheBackend::new()),
        )
    }

    #[tokio::test]
    async fn test_open_creates_database_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("mnemos.db");

        let mnemos = Mnemos::open(MnemosConfig::new(&path)).unwrap();
        mnemos.remember(NewMemoryItem::new("owner-1", "hello")).await.unwrap();

        assert!(path.exists());
        assert_eq!(mnemos.stats("owner-1").unwrap().embedded, 1);
    }

    #[tokio::test]
    async fn test_remember_indexes_and_dedupes() {
        let mnemos = in_memory();

        let first = mnemos.remember(NewMemoryItem::new("owner-1", "blue apples")).await.unwrap();
        let again = mnemos.remember(NewMemoryItem::new("owner-1", "blue apples")).await.unwrap();
        let other_owner = mnemos.remember(NewMemoryItem::new("owner-2", "blue apples")).await.unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other_owner.id);
        assert!(mnemos.db().get_embedding(&first.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_recall_logs_events_and_usage() {
        let mnemos = in_memory();
        let item = mnemos.remember(NewMemoryItem::new("owner-1", "blue apples")).await.unwrap();
        mnemos.remember(NewMemoryItem::new("owner-1", "green pears")).await.unwrap();

        let hits = mnemos.recall("owner-1", "apples", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.id, item.id);

        let events = mnemos.db().events_for_memory(&item.id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Recalled);
        assert_eq!(events[0].context.as_deref(), Some("apples"));
        assert_eq!(mnemos.db().get(&item.id).unwrap().usage_count, 1);
    }

    #[tokio::test]
    async fn test_maintain_sweeps_backlog() {
        let mnemos = in_memory();
        for i in 0..3 {
            mnemos.db().put(&NewMemoryItem::new("owner-1", format!("note {i}"))).unwrap();
        }

        let other = mnemos.db().put(&NewMemoryItem::new("owner-2", "not mine")).unwrap();

        let report = mnemos.maintain("owner-1").await.unwrap();
        assert_eq!(report.indexed, 3);
        assert_eq!(report.clustering.status, RunStatus::NoClustersFound);
        assert_eq!(mnemos.stats("owner-1").unwrap().backlog, 0);
        assert_eq!(mnemos.stats("owner-2").unwrap().backlog, 1);
        assert!(mnemos.db().get_embedding(&other).unwrap().is_none());
    }
}
