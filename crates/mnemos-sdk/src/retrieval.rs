//! Hybrid Retriever
//!
//! Ranks an owner's active memory items against a free-text query. Each
//! candidate gets a weighted blend of three signals in [0, 1]:
//!
//! - **vector**: cosine similarity between the query embedding and the stored
//!   vector, negatives clamped to 0
//! - **lexical**: fraction of distinct query tokens found in content + summary
//! - **recency**: `0.5^(age_days / half_life_days)`
//!
//! Candidates come from a brute-force cosine scan over vectors of the current
//! model plus a LIKE search on the query tokens. If the query cannot be
//! embedded the search degrades to lexical + recency instead of failing.

use crate::config::{EmbeddingConfig, RetrievalConfig};
use crate::embeddings::{cosine_similarity, tokenize, EmbeddingProvider};
use crate::{SDKError, SDKResult};
use chrono::{DateTime, Utc};
use mnemos_core::types::MemoryItem;
use mnemos_core::Database;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub item: MemoryItem,
    pub score: f64,
}

/// Blends vector, lexical and recency signals
pub struct HybridRetriever {
    db: Arc<Database>,
    provider: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
    embed_timeout: Duration,
}

impl HybridRetriever {
    pub fn new(
        db: Arc<Database>,
        provider: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
        embedding: &EmbeddingConfig,
    ) -> Self {
        Self {
            db,
            provider,
            config,
            embed_timeout: Duration::from_secs(embedding.timeout_secs.max(1)),
        }
    }

    /// Top `limit` items for `query`, best first
    ///
    /// Results are unique by id and strictly ordered by score, ties going to
    /// the newer item.
    pub async fn search(&self, owner_id: &str, query: &str, limit: usize) -> SDKResult<Vec<ScoredMemory>> {
        let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();
        if limit == 0 || query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let pool = self.config.candidate_pool.max(limit);
        let vector_scores = match self.embed_query(query).await {
            Ok(query_vector) => self.vector_candidates(owner_id, &query_vector, pool)?,
            Err(e) => {
                warn!(owner_id, error = %e, "query embedding failed, using lexical ranking only");
                HashMap::new()
            }
        };

        let mut terms: Vec<String> = query_tokens.iter().cloned().collect();
        terms.sort();
        let mut candidates: HashMap<String, MemoryItem> = self
            .db
            .lexical_candidates(owner_id, &terms, pool)?
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();

        let missing: Vec<String> = vector_scores
            .keys()
            .filter(|id| !candidates.contains_key(*id))
            .cloned()
            .collect();
        for item in self.db.get_many(&missing)? {
            if item.is_active() {
                candidates.insert(item.id.clone(), item);
            }
        }

        let now = Utc::now();
        let mut results: Vec<ScoredMemory> = candidates
            .into_values()
            .map(|item| {
                let vector = vector_scores.get(&item.id).copied().unwrap_or(0.0);
                let score = self.blend(vector, &item, &query_tokens, now);
                ScoredMemory { item, score }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.item.created_at.cmp(&a.item.created_at))
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        results.truncate(limit);

        debug!(owner_id, hits = results.len(), vector_candidates = vector_scores.len(), "search finished");
        Ok(results)
    }

    async fn embed_query(&self, query: &str) -> SDKResult<Vec<f32>> {
        let texts = [query.to_string()];
        let vectors = tokio::time::timeout(self.embed_timeout, self.provider.embed(&texts))
            .await
            .map_err(|_| SDKError::timeout(self.embed_timeout.as_millis() as u64))??;

        vectors
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SDKError::embedding("provider returned no vector for the query"))
    }

    /// Best `pool` stored vectors by similarity, keyed by memory id
    fn vector_candidates(&self, owner_id: &str, query_vector: &[f32], pool: usize) -> SDKResult<HashMap<String, f64>> {
        let rows = self.db.active_embeddings(owner_id, Some(self.provider.model_id()))?;

        let mut scored: Vec<(String, f64)> = rows
            .into_iter()
            .map(|(id, vector)| {
                let similarity = f64::from(cosine_similarity(query_vector, &vector)).max(0.0);
                (id, similarity)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(pool);

        Ok(scored.into_iter().collect())
    }

    fn blend(&self, vector: f64, item: &MemoryItem, query_tokens: &HashSet<String>, now: DateTime<Utc>) -> f64 {
        let lexical = lexical_overlap(query_tokens, item);
        let recency = recency_decay(item.created_at, now, self.config.recency_half_life_days);

        self.config.vector_weight * vector + self.config.lexical_weight * lexical + self.config.recency_weight * recency
    }
}

/// Fraction of query tokens present in the item's content or summary
pub fn lexical_overlap(query_tokens: &HashSet<String>, item: &MemoryItem) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }

    let mut item_tokens: HashSet<String> = tokenize(&item.content).into_iter().collect();
    if let Some(summary) = &item.summary {
        item_tokens.extend(tokenize(summary));
    }

    let hits = query_tokens.iter().filter(|t| item_tokens.contains(*t)).count();
    hits as f64 / query_tokens.len() as f64
}

/// Exponential half-life decay; future timestamps count as brand new
pub fn recency_decay(created_at: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 0.0;
    }
    let age_days = (now - created_at).num_milliseconds().max(0) as f64 / 86_400_000.0;
    0.5_f64.powf(age_days / half_life_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::indexer::EmbeddingIndexer;
    use async_trait::async_trait;
    use mnemos_core::types::NewMemoryItem;

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn model_id(&self) -> &str {
            "feature-hashing-v1-384"
        }

        async fn embed(&self, _texts: &[String]) -> SDKResult<Vec<Vec<f32>>> {
            Err(SDKError::http(Some(503), "unavailable"))
        }
    }

    async fn seeded(contents: &[&str]) -> (Arc<Database>, Vec<String>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ids: Vec<String> = contents
            .iter()
            .map(|c| db.put(&NewMemoryItem::new("owner-1", *c)).unwrap())
            .collect();

        let indexer = EmbeddingIndexer::new(db.clone(), Arc::new(HashingEmbedder::default()), EmbeddingConfig::default());
        indexer.index_items(&ids).await.unwrap();
        (db, ids)
    }

    fn retriever(db: Arc<Database>, provider: Arc<dyn EmbeddingProvider>) -> HybridRetriever {
        HybridRetriever::new(db, provider, RetrievalConfig::default(), &EmbeddingConfig::default())
    }

    #[test]
    fn test_recency_decay() {
        let now = Utc::now();
        assert!((recency_decay(now, now, 30.0) - 1.0).abs() < 1e-9);
        assert!((recency_decay(now - chrono::Duration::days(30), now, 30.0) - 0.5).abs() < 1e-6);
        assert!((recency_decay(now + chrono::Duration::days(1), now, 30.0) - 1.0).abs() < 1e-9);
        assert_eq!(recency_decay(now, now, 0.0), 0.0);
    }

    #[tokio::test]
    async fn test_lexical_overlap_counts_distinct_tokens() {
        let (db, ids) = seeded(&["Blue apples, bought at the market"]).await;
        let item = db.get(&ids[0]).unwrap();

        let tokens: HashSet<String> = ["blue", "apples", "pears"].iter().map(|s| s.to_string()).collect();
        assert!((lexical_overlap(&tokens, &item) - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(lexical_overlap(&HashSet::new(), &item), 0.0);
    }

    #[tokio::test]
    async fn test_search_ranks_matching_items_first() {
        let (db, ids) = seeded(&[
            "blue apples bought at the market",
            "sunny tomorrow, go to the park",
            "blue apples from the market are interesting",
        ])
        .await;

        let results = retriever(db, Arc::new(HashingEmbedder::default()))
            .search("owner-1", "blue apples", 5)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        let top: HashSet<&str> = results[..2].iter().map(|r| r.item.id.as_str()).collect();
        assert!(top.contains(ids[0].as_str()));
        assert!(top.contains(ids[2].as_str()));
        assert_eq!(results[2].item.id, ids[1]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_search_respects_limit_and_owner() {
        let (db, _) = seeded(&["apples one", "apples two", "apples three"]).await;
        db.put(&NewMemoryItem::new("owner-2", "apples elsewhere")).unwrap();

        let retriever = retriever(db, Arc::new(HashingEmbedder::default()));
        let results = retriever.search("owner-1", "apples", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.item.owner_id == "owner-1"));

        assert!(retriever.search("owner-1", "apples", 0).await.unwrap().is_empty());
        assert!(retriever.search("owner-1", "  ?! ", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_items_are_not_returned() {
        let (db, ids) = seeded(&["apples one", "apples two"]).await;
        db.soft_delete(&ids[0]).unwrap();

        let results = retriever(db, Arc::new(HashingEmbedder::default()))
            .search("owner-1", "apples", 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item.id, ids[1]);
    }

    #[tokio::test]
    async fn test_failed_query_embedding_falls_back_to_lexical() {
        let (db, ids) = seeded(&["blue apples", "green pears"]).await;

        let results = retriever(db, Arc::new(FailingProvider))
            .search("owner-1", "apples", 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item.id, ids[0]);
    }
}
