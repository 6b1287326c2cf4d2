//! Short-Term Cache
//!
//! Namespaced, TTL-bound scratch storage for session state, chat history and
//! transient buffers. The cache is never the source of truth: every
//! operation swallows backend failures (logged at `warn`) and reads of
//! missing or expired keys return an empty value, so callers rebuild from the
//! durable store instead of failing.
//!
//! TTLs slide only on writes (`set`, `update`, `append_message`) and explicit
//! `touch` calls; reads never extend an entry's life.

use crate::config::CacheConfig;
use crate::SDKResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::warn;

/// Upper bound on a single backend call
const OP_TIMEOUT: Duration = Duration::from_millis(500);

// ─────────────────────────────────────────────────────────────────────────────
// Backend
// ─────────────────────────────────────────────────────────────────────────────

/// Primitive operations a cache store has to offer
///
/// Kept separate from the durable store on purpose: nothing written here is
/// guaranteed to be readable later.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Scalar value at `key`, None when missing or expired
    async fn get(&self, key: &str) -> SDKResult<Option<Value>>;

    /// Store a scalar value with a TTL, replacing whatever was there
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> SDKResult<()>;

    /// Reset the TTL of an existing key; false if the key is absent
    async fn expire(&self, key: &str, ttl: Duration) -> SDKResult<bool>;

    async fn delete(&self, key: &str) -> SDKResult<()>;

    /// Push onto the list at `key`, keep only the newest `max_len` entries
    /// and reset the TTL; returns the resulting length
    async fn append_trim(&self, key: &str, value: Value, max_len: usize, ttl: Duration) -> SDKResult<usize>;

    /// List stored at `key`, oldest first
    async fn list(&self, key: &str) -> SDKResult<Vec<Value>>;

    /// Drop expired entries; returns how many were removed
    async fn purge_expired(&self) -> SDKResult<usize>;
}

#[derive(Debug, Clone)]
enum StoredValue {
    Scalar(Value),
    List(VecDeque<Value>),
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process cache backend
///
/// Uses tokio's clock so expiry follows a paused runtime in tests.
#[derive(Default)]
pub struct InMemoryCacheBackend {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> SDKResult<Option<Value>> {
        let entries = self.entries.read().await;
        Ok(match entries.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => match &entry.value {
                StoredValue::Scalar(v) => Some(v.clone()),
                StoredValue::List(items) => Some(Value::Array(items.iter().cloned().collect())),
            },
            _ => None,
        })
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> SDKResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            StoredEntry {
                value: StoredValue::Scalar(value),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> SDKResult<bool> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> SDKResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn append_trim(&self, key: &str, value: Value, max_len: usize, ttl: Duration) -> SDKResult<usize> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        let fresh = || StoredEntry {
            value: StoredValue::List(VecDeque::new()),
            expires_at: None,
        };
        let entry = entries.entry(key.to_string()).or_insert_with(fresh);
        if entry.is_expired(now) || !matches!(entry.value, StoredValue::List(_)) {
            *entry = fresh();
        }
        entry.expires_at = Some(now + ttl);

        match &mut entry.value {
            StoredValue::List(items) => {
                items.push_back(value);
                while items.len() > max_len {
                    items.pop_front();
                }
                Ok(items.len())
            }
            StoredValue::Scalar(_) => Ok(0),
        }
    }

    async fn list(&self, key: &str) -> SDKResult<Vec<Value>> {
        let entries = self.entries.read().await;
        Ok(match entries.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => match &entry.value {
                StoredValue::List(items) => items.iter().cloned().collect(),
                StoredValue::Scalar(_) => Vec::new(),
            },
            _ => Vec::new(),
        })
    }

    async fn purge_expired(&self) -> SDKResult<usize> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Namespaced cache
// ─────────────────────────────────────────────────────────────────────────────

/// Cache namespace; each has its own TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    Session,
    Chat,
    Buffer,
}

impl CacheNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Chat => "chat",
            Self::Buffer => "buffer",
        }
    }
}

impl std::fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chat message kept in short-term history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Loss-tolerant short-term memory on top of a [`CacheBackend`]
#[derive(Clone)]
pub struct ShortTermCache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
}

impl ShortTermCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self { backend, config }
    }

    /// Cache backed by an [`InMemoryCacheBackend`]
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(Arc::new(InMemoryCacheBackend::new()), config)
    }

    /// TTL applied to writes in a namespace
    pub fn ttl(&self, namespace: CacheNamespace) -> Duration {
        Duration::from_secs(match namespace {
            CacheNamespace::Session => self.config.session_ttl_secs,
            CacheNamespace::Chat => self.config.chat_ttl_secs,
            CacheNamespace::Buffer => self.config.buffer_ttl_secs,
        })
    }

    fn key(namespace: CacheNamespace, key: &str) -> String {
        format!("mnemos:{}:{}", namespace.as_str(), key)
    }

    /// Value under `key`, or `Value::Null` when missing, expired or unreachable
    pub async fn get(&self, namespace: CacheNamespace, key: &str) -> Value {
        let full_key = Self::key(namespace, key);
        guarded("get", &full_key, self.backend.get(&full_key))
            .await
            .flatten()
            .unwrap_or(Value::Null)
    }

    /// Store a value and restart the namespace TTL
    pub async fn set(&self, namespace: CacheNamespace, key: &str, value: Value) {
        let full_key = Self::key(namespace, key);
        guarded("set", &full_key, self.backend.set(&full_key, value, self.ttl(namespace))).await;
    }

    /// Shallow merge of `patch` into the object stored under `key`
    ///
    /// Only the supplied top-level fields are overwritten; nested objects are
    /// replaced, not merged. A missing or non-object value starts from an
    /// empty object. Returns the merged value.
    pub async fn update(&self, namespace: CacheNamespace, key: &str, patch: Map<String, Value>) -> Value {
        let mut merged = match self.get(namespace, key).await {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        merged.extend(patch);

        let value = Value::Object(merged);
        self.set(namespace, key, value.clone()).await;
        value
    }

    /// Restart the namespace TTL of an existing key; false if it is gone
    pub async fn touch(&self, namespace: CacheNamespace, key: &str) -> bool {
        let full_key = Self::key(namespace, key);
        guarded("expire", &full_key, self.backend.expire(&full_key, self.ttl(namespace)))
            .await
            .unwrap_or(false)
    }

    /// Remove a key
    pub async fn clear(&self, namespace: CacheNamespace, key: &str) {
        let full_key = Self::key(namespace, key);
        guarded("delete", &full_key, self.backend.delete(&full_key)).await;
    }

    /// Append a chat message, keep the newest messages, refresh the chat TTL
    ///
    /// Returns the number of retained messages (0 if the backend failed).
    pub async fn append_message(&self, session_id: &str, role: &str, content: &str, agent: Option<&str>) -> usize {
        let full_key = Self::key(CacheNamespace::Chat, session_id);
        let message = ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
            agent: agent.map(str::to_string),
            timestamp: Utc::now(),
        };
        let value = match serde_json::to_value(&message) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %full_key, error = %e, "failed to encode chat message");
                return 0;
            }
        };

        guarded(
            "append",
            &full_key,
            self.backend.append_trim(
                &full_key,
                value,
                self.config.max_chat_messages,
                self.ttl(CacheNamespace::Chat),
            ),
        )
        .await
        .unwrap_or(0)
    }

    /// Chat history of a session, oldest first; empty when lost or expired
    pub async fn chat_history(&self, session_id: &str) -> Vec<ChatMessage> {
        let full_key = Self::key(CacheNamespace::Chat, session_id);
        guarded("list", &full_key, self.backend.list(&full_key))
            .await
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect()
    }

    /// Drop expired entries from the backend
    pub async fn purge_expired(&self) -> usize {
        guarded("purge", "*", self.backend.purge_expired()).await.unwrap_or(0)
    }
}

/// Run a backend call with a latency bound, turning failure into None
async fn guarded<T>(op: &str, key: &str, fut: impl Future<Output = SDKResult<T>>) -> Option<T> {
    match tokio::time::timeout(OP_TIMEOUT, fut).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(op, key, error = %e, "cache operation failed");
            None
        }
        Err(_) => {
            warn!(op, key, timeout_ms = OP_TIMEOUT.as_millis() as u64, "cache operation timed out");
            None
        }
    }
}
