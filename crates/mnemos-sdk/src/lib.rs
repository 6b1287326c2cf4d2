//! Mnemos SDK - Memory retrieval and self-organizing topics
//!
//! This crate provides the async services on top of the `mnemos-core`
//! store. All functionality is reachable through the [`Mnemos`] facade or
//! the individual services:
//!
//! # Core Modules (from mnemos-core)
//!
//! - **db** - Direct SQLite database access (the MemoryStore)
//! - **types** - Memory items, embeddings, topics, links and events
//!
//! # SDK Modules
//!
//! - **embeddings** - Embedding provider trait and adapters (hashing, HTTP, local)
//! - **indexer** - Batch embedding with per-item fallback and backlog sweeps
//! - **cache** - Short-term session, chat and buffer cache with TTLs
//! - **clustering** - HDBSCAN density clustering over stored vectors
//! - **topics** - Cluster naming and topic upserts
//! - **retrieval** - Hybrid vector + lexical + recency search
//! - **events** - Usage log and outcome counters
//!
//! # Example
//!
//! ```rust,no_run
//! use mnemos_sdk::{Mnemos, MnemosConfig};
//! use mnemos_sdk::types::NewMemoryItem;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let mnemos = Mnemos::open(MnemosConfig::new("mnemos.db"))?;
//!
//!     mnemos.remember(NewMemoryItem::new("user-123", "Blue apples bought at the market")).await?;
//!
//!     // Group related memories into named topics
//!     let report = mnemos.maintain("user-123").await?;
//!     println!("{} topics created", report.clustering.topics_created);
//!
//!     for hit in mnemos.recall("user-123", "apples", 5).await? {
//!         println!("{:.2} {}", hit.score, hit.item.content);
//!     }
//!
//!     Ok(())
//! }
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// Re-export core modules from mnemos-core
// ─────────────────────────────────────────────────────────────────────────────

/// Database access
pub use mnemos_core::db;

/// Core types (MemoryItem, Topic, NewMemoryItem, etc.)
pub use mnemos_core::types;

/// Error types from core
pub use mnemos_core::error as core_error;

pub use mnemos_core::Database;

// ─────────────────────────────────────────────────────────────────────────────
// SDK-specific modules
// ─────────────────────────────────────────────────────────────────────────────

pub mod cache;
pub mod clustering;
pub mod embeddings;
pub mod events;
pub mod indexer;
pub mod retrieval;
pub mod topics;

mod config;
mod error;
mod sdk;

// Re-export main SDK types
pub use config::{
    CacheConfig, ClusteringConfig, ConfigValidationError, EmbeddingConfig, EmbeddingProviderKind, MnemosConfig,
    NamingConfig, RetrievalConfig, WorkerConfig,
};
pub use error::{SDKError, SDKResult};
pub use sdk::{MaintenanceReport, Mnemos};

pub use cache::{CacheBackend, CacheNamespace, ChatMessage, InMemoryCacheBackend, ShortTermCache};
pub use clustering::{Cluster, ClusterDiscovery, HdbscanParams};
pub use embeddings::{EmbeddingProvider, HashingEmbedder};
pub use events::EventTracker;
pub use indexer::{EmbeddingIndexer, ReindexPage, ReindexReport};
pub use retrieval::{HybridRetriever, ScoredMemory};
pub use topics::{AutoClusteringResult, RunStatus, TopicLabel, TopicNamer, TopicOrchestrator};
