//! SDK Configuration
//!
//! Configuration is loaded with precedence:
//! 1. Environment variables (MNEMOS_*)
//! 2. Config file (~/.mnemos/config.toml)
//! 3. Default values

use crate::SDKResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MnemosConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Embedding service settings
    pub embedding: EmbeddingConfig,

    /// Topic naming service settings
    pub naming: NamingConfig,

    /// Density clustering parameters
    pub clustering: ClusteringConfig,

    /// Hybrid ranking weights
    pub retrieval: RetrievalConfig,

    /// Short-term cache TTLs
    pub cache: CacheConfig,

    /// Background worker schedule
    pub worker: WorkerConfig,
}

impl Default for MnemosConfig {
    fn default() -> Self {
        Self {
            database_path: default_data_dir().join("mnemos.db"),
            embedding: EmbeddingConfig::default(),
            naming: NamingConfig::default(),
            clustering: ClusteringConfig::default(),
            retrieval: RetrievalConfig::default(),
            cache: CacheConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

/// Which embedding adapter to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Deterministic feature hashing, no external service
    Hashing,
    /// OpenAI-compatible `/v1/embeddings`
    Http,
    /// In-process fastembed model (`local-embeddings` feature)
    Local,
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,

    /// Model identifier stored next to every vector
    pub model: String,

    /// Base URL of the HTTP embedding service
    pub base_url: Option<String>,

    pub api_key: Option<String>,

    /// Vector length for the hashing embedder (default: 384)
    pub dimensions: usize,

    /// Texts per embedding call (default: 20)
    pub batch_size: usize,

    /// Attempts per item in the one-by-one fallback (default: 3)
    pub max_attempts: u32,

    /// Base retry delay; attempt n waits n times this (default: 1000ms)
    pub retry_delay_ms: u64,

    /// Per-call timeout (default: 30s)
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Hashing,
            model: crate::embeddings::hashing_model_id(384),
            base_url: None,
            api_key: None,
            dimensions: 384,
            batch_size: 20,
            max_attempts: 3,
            retry_delay_ms: 1000,
            timeout_secs: 30,
        }
    }
}

/// Generative naming service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Call the naming service; when false every cluster gets the fallback label
    pub enabled: bool,

    pub base_url: Option<String>,

    pub model: String,

    pub api_key: Option<String>,

    /// Member texts shown to the service per cluster (default: 10)
    pub max_samples: usize,

    pub max_tokens: u32,

    pub temperature: f32,

    /// Per-call timeout (default: 30s)
    pub timeout_secs: u64,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            max_samples: 10,
            max_tokens: 256,
            temperature: 0.2,
            timeout_secs: 30,
        }
    }
}

/// Density clustering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Smallest group that counts as a cluster (default: 5)
    pub min_cluster_size: usize,

    /// Neighbourhood size for core distances (default: 3)
    pub min_samples: usize,

    /// Allow the whole dataset to be returned as one cluster
    pub allow_single_cluster: bool,

    /// Confidence stored on clustering links (default: 0.9)
    pub link_confidence: f64,

    /// Characters of the owner id used in auto-topic slugs (default: 8)
    pub owner_prefix_len: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 5,
            min_samples: 3,
            allow_single_cluster: false,
            link_confidence: 0.9,
            owner_prefix_len: 8,
        }
    }
}

/// Hybrid retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub vector_weight: f64,
    pub lexical_weight: f64,
    pub recency_weight: f64,

    /// Age at which the recency signal halves (default: 30 days)
    pub recency_half_life_days: f64,

    /// Candidates pulled from each source before ranking (default: 50)
    pub candidate_pool: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            lexical_weight: 0.2,
            recency_weight: 0.1,
            recency_half_life_days: 30.0,
            candidate_pool: 50,
        }
    }
}

/// Short-term cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Session state TTL in seconds (default: 3600 = 1 hour)
    pub session_ttl_secs: u64,

    /// Chat history TTL in seconds (default: 86400 = 24 hours)
    pub chat_ttl_secs: u64,

    /// Scratch buffer TTL in seconds (default: 300 = 5 minutes)
    pub buffer_ttl_secs: u64,

    /// Messages kept per chat session (default: 200)
    pub max_chat_messages: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 3600,   // 1 hour
            chat_ttl_secs: 86_400,    // 24 hours
            buffer_ttl_secs: 300,     // 5 minutes
            max_chat_messages: 200,
        }
    }
}

/// Background worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Tick interval in seconds (default: 30)
    pub interval_secs: u64,

    /// Minimum seconds between clustering runs per owner (default: 3600)
    pub clustering_interval_secs: u64,

    /// Items indexed per backlog sweep (default: 200)
    pub backlog_batch: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            clustering_interval_secs: 3600,
            backlog_batch: 200,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mnemos")
}

impl MnemosConfig {
    /// Create a config for the given database path
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    /// Set embedding configuration
    pub fn with_embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.embedding = embedding;
        self
    }

    /// Set naming configuration
    pub fn with_naming(mut self, naming: NamingConfig) -> Self {
        self.naming = naming;
        self
    }

    /// Set clustering configuration
    pub fn with_clustering(mut self, clustering: ClusteringConfig) -> Self {
        self.clustering = clustering;
        self
    }

    /// Set retrieval configuration
    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        default_data_dir().join("config.toml")
    }

    /// Load from a TOML file, falling back to defaults when it does not exist,
    /// then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> SDKResult<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| ConfigValidationError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Write as pretty TOML, creating the parent directory if needed
    pub fn save(&self, path: impl AsRef<Path>) -> SDKResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| ConfigValidationError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply MNEMOS_* environment variables on top of the loaded values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("MNEMOS_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("MNEMOS_EMBEDDING_URL") {
            self.embedding.base_url = Some(url);
            self.embedding.provider = EmbeddingProviderKind::Http;
        }
        if let Ok(url) = std::env::var("MNEMOS_NAMING_URL") {
            self.naming.base_url = Some(url);
            self.naming.enabled = true;
        }
        if let Ok(key) = std::env::var("MNEMOS_API_KEY") {
            self.embedding.api_key.get_or_insert_with(|| key.clone());
            self.naming.api_key.get_or_insert(key);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingDatabasePath);
        }

        if self.embedding.model.trim().is_empty() {
            return Err(invalid("embedding.model", "must not be empty"));
        }
        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size", "must be greater than 0"));
        }
        if self.embedding.max_attempts == 0 {
            return Err(invalid("embedding.max_attempts", "must be greater than 0"));
        }
        if self.embedding.provider == EmbeddingProviderKind::Hashing && self.embedding.dimensions == 0 {
            return Err(invalid("embedding.dimensions", "must be greater than 0"));
        }
        if self.embedding.provider == EmbeddingProviderKind::Http && self.embedding.base_url.is_none() {
            return Err(invalid("embedding.base_url", "required for the http provider"));
        }

        if self.naming.enabled && self.naming.base_url.is_none() {
            return Err(invalid("naming.base_url", "required when naming is enabled"));
        }
        if self.naming.max_samples == 0 {
            return Err(invalid("naming.max_samples", "must be greater than 0"));
        }

        if self.clustering.min_cluster_size < 2 {
            return Err(invalid("clustering.min_cluster_size", "must be at least 2"));
        }
        if self.clustering.min_samples == 0 {
            return Err(invalid("clustering.min_samples", "must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.clustering.link_confidence) {
            return Err(invalid("clustering.link_confidence", "must be between 0 and 1"));
        }

        let r = &self.retrieval;
        if [r.vector_weight, r.lexical_weight, r.recency_weight].iter().any(|w| *w < 0.0) {
            return Err(invalid("retrieval", "weights must not be negative"));
        }
        if r.vector_weight + r.lexical_weight + r.recency_weight <= 0.0 {
            return Err(invalid("retrieval", "at least one weight must be positive"));
        }
        if r.recency_half_life_days <= 0.0 {
            return Err(invalid("retrieval.recency_half_life_days", "must be greater than 0"));
        }

        if self.cache.max_chat_messages == 0 {
            return Err(invalid("cache.max_chat_messages", "must be greater than 0"));
        }
        if self.worker.interval_secs == 0 {
            return Err(invalid("worker.interval_secs", "must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigValidationError {
    ConfigValidationError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("database_path is required")]
    MissingDatabasePath,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}
