//! Background job loop
//!
//! Each tick sweeps the embedding backlog when the store changed since the
//! last sweep or items are still waiting (e.g. after a provider outage),
//! drops expired cache entries, then re-clusters every owner whose last
//! clustering run is older than the configured interval.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use mnemos_sdk::{Mnemos, RunStatus, SDKResult};
use tokio::time::Instant;
use tracing::{debug, error, info};

/// What one tick did
#[derive(Debug, Default)]
pub struct TickReport {
    pub swept: bool,
    pub indexed: usize,
    pub cache_purged: usize,
    pub owners_clustered: usize,
    pub topics_created: usize,
}

pub struct Worker {
    mnemos: Mnemos,
    clustering_interval: Duration,
    backlog_batch: usize,
    last_dirty_version: Option<i64>,
    last_clustered: HashMap<String, Instant>,
}

impl Worker {
    pub fn new(mnemos: Mnemos) -> Self {
        let worker_config = mnemos.config().worker.clone();
        Self {
            mnemos,
            clustering_interval: Duration::from_secs(worker_config.clustering_interval_secs),
            backlog_batch: worker_config.backlog_batch.max(1),
            last_dirty_version: None,
            last_clustered: HashMap::new(),
        }
    }

    pub fn mnemos(&self) -> &Mnemos {
        &self.mnemos
    }

    /// Run one round of maintenance
    ///
    /// A failing owner is logged and skipped; only store failures that stop
    /// the sweep itself are returned.
    pub async fn tick(&mut self) -> SDKResult<TickReport> {
        let mut report = TickReport::default();

        let version = self.mnemos.db().dirty_version()?;
        let pending = self.mnemos.db().backlog_count(self.mnemos.indexer().model_id())?;
        if self.last_dirty_version != Some(version) || pending > 0 {
            report.swept = true;
            loop {
                let indexed = self.mnemos.indexer().sweep_backlog(self.backlog_batch).await?;
                report.indexed += indexed;
                if indexed < self.backlog_batch {
                    break;
                }
            }
            // Our own upserts moved the version; record it after the sweep
            self.last_dirty_version = Some(self.mnemos.db().dirty_version()?);
        }

        report.cache_purged = self.mnemos.cache().purge_expired().await;
        if report.cache_purged > 0 {
            debug!(purged = report.cache_purged, "expired cache entries dropped");
        }

        let now = Instant::now();
        let owners = self.mnemos.db().owners_with_active_items()?;
        let active: HashSet<&String> = owners.iter().collect();
        self.last_clustered.retain(|owner_id, _| active.contains(owner_id));

        for owner_id in owners {
            let due = self
                .last_clustered
                .get(&owner_id)
                .is_none_or(|last| now.duration_since(*last) >= self.clustering_interval);
            if !due {
                continue;
            }

            match self.mnemos.orchestrator().run_auto_clustering(&owner_id, None).await {
                Ok(result) => {
                    report.owners_clustered += 1;
                    report.topics_created += result.topics_created;
                    if result.status == RunStatus::Completed {
                        debug!(owner_id = %owner_id, run_id = %result.run_id, "owner clustered");
                    }
                }
                Err(e) => error!(owner_id = %owner_id, error = %e, "auto-clustering failed"),
            }
            self.last_clustered.insert(owner_id, now);
        }

        if report.swept || report.owners_clustered > 0 {
            info!(
                indexed = report.indexed,
                owners_clustered = report.owners_clustered,
                topics_created = report.topics_created,
                "tick finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mnemos_sdk::cache::CacheNamespace;
    use mnemos_sdk::topics::FallbackTopicNamer;
    use mnemos_sdk::types::NewMemoryItem;
    use mnemos_sdk::{Database, EmbeddingProvider, HashingEmbedder, InMemoryCacheBackend, MnemosConfig, SDKError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns 503 for the first `outage` calls, then embeds normally
    struct RecoveringProvider {
        inner: HashingEmbedder,
        outage: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for RecoveringProvider {
        fn model_id(&self) -> &str {
            "recovering"
        }

        async fn embed(&self, texts: &[String]) -> SDKResult<Vec<Vec<f32>>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.outage {
                return Err(SDKError::http(Some(503), "unavailable"));
            }
            self.inner.embed(texts).await
        }
    }

    fn worker_with(provider: Arc<dyn EmbeddingProvider>) -> Worker {
        let mut config = MnemosConfig::default();
        config.worker.backlog_batch = 2;
        config.worker.clustering_interval_secs = 60;

        Worker::new(Mnemos::with_components(
            config,
            Arc::new(Database::open_in_memory().unwrap()),
            provider,
            Arc::new(FallbackTopicNamer),
            Arc::new(InMemoryCacheBackend::new()),
        ))
    }

    fn worker() -> Worker {
        worker_with(Arc::new(HashingEmbedder::default()))
    }

    fn backlog(worker: &Worker) -> i64 {
        let model = worker.mnemos().indexer().model_id().to_string();
        worker.mnemos().db().backlog_count(&model).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_only_when_store_changed() {
        let mut worker = worker();
        for i in 0..5 {
            worker.mnemos().db().put(&NewMemoryItem::new("owner-1", format!("note {i}"))).unwrap();
        }

        let first = worker.tick().await.unwrap();
        assert!(first.swept);
        assert_eq!(first.indexed, 5);
        assert_eq!(backlog(&worker), 0);

        let idle = worker.tick().await.unwrap();
        assert!(!idle.swept);

        worker.mnemos().db().put(&NewMemoryItem::new("owner-1", "one more")).unwrap();
        let after_write = worker.tick().await.unwrap();
        assert!(after_write.swept);
        assert_eq!(after_write.indexed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_items_left_by_an_outage_are_retried() {
        // 1 batch call + 3 single attempts fail during the first tick
        let provider = Arc::new(RecoveringProvider {
            inner: HashingEmbedder::default(),
            outage: 4,
            calls: AtomicUsize::new(0),
        });
        let mut worker = worker_with(provider.clone());
        worker.mnemos().db().put(&NewMemoryItem::new("owner-1", "during the outage")).unwrap();

        let first = worker.tick().await.unwrap();
        assert!(first.swept);
        assert_eq!(first.indexed, 0);
        assert_eq!(backlog(&worker), 1);

        tokio::time::advance(Duration::from_secs(3600)).await;
        let second = worker.tick().await.unwrap();
        assert!(second.swept);
        assert_eq!(second.indexed, 1);
        assert_eq!(backlog(&worker), 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);

        assert!(!worker.tick().await.unwrap().swept);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_purges_expired_cache_entries() {
        let mut worker = worker();
        let cache = worker.mnemos().cache().clone();
        cache.set(CacheNamespace::Buffer, "scratch", serde_json::json!("draft")).await;
        cache.set(CacheNamespace::Session, "state", serde_json::json!({"step": 1})).await;

        assert_eq!(worker.tick().await.unwrap().cache_purged, 0);

        // Past the buffer TTL, well within the session TTL
        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(worker.tick().await.unwrap().cache_purged, 1);
        assert_eq!(cache.get(CacheNamespace::Session, "state").await, serde_json::json!({"step": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clustering_respects_interval() {
        let mut worker = worker();
        worker.mnemos().db().put(&NewMemoryItem::new("owner-1", "note")).unwrap();
        worker.mnemos().db().put(&NewMemoryItem::new("owner-2", "note")).unwrap();

        assert_eq!(worker.tick().await.unwrap().owners_clustered, 2);
        assert_eq!(worker.tick().await.unwrap().owners_clustered, 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(worker.tick().await.unwrap().owners_clustered, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_owners_without_items_are_forgotten() {
        let mut worker = worker();
        let gone = worker.mnemos().db().put(&NewMemoryItem::new("owner-1", "note")).unwrap();
        worker.mnemos().db().put(&NewMemoryItem::new("owner-2", "note")).unwrap();

        worker.tick().await.unwrap();
        assert_eq!(worker.last_clustered.len(), 2);

        worker.mnemos().db().soft_delete(&gone).unwrap();
        worker.tick().await.unwrap();
        assert_eq!(worker.last_clustered.len(), 1);
        assert!(worker.last_clustered.contains_key("owner-2"));
    }
}
