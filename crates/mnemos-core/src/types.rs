//! Entity types for the memory layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ─────────────────────────────────────────────────────────────────────────────
// Enumerations
// ─────────────────────────────────────────────────────────────────────────────

/// Type tag of a memory item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Fact,
    Decision,
    Insight,
    Thought,
    Preference,
    Observation,
    Other,
}

impl MemoryKind {
    /// Convert to string for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Decision => "decision",
            Self::Insight => "insight",
            Self::Thought => "thought",
            Self::Preference => "preference",
            Self::Observation => "observation",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(Self::Fact),
            "decision" => Ok(Self::Decision),
            "insight" => Ok(Self::Insight),
            "thought" => Ok(Self::Thought),
            "preference" => Ok(Self::Preference),
            "observation" => Ok(Self::Observation),
            "other" => Ok(Self::Other),
            _ => Err(format!("Invalid memory kind: {}", s)),
        }
    }
}

/// Lifecycle status of a memory item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    Active,
    Archived,
    Deleted,
}

impl MemoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!("Invalid memory status: {}", s)),
        }
    }
}

/// Kind of usage event recorded against a memory item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Recalled,
    Used,
    Rejected,
    Archived,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recalled => "recalled",
            Self::Used => "used",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recalled" => Ok(Self::Recalled),
            "used" => Ok(Self::Used),
            "rejected" => Ok(Self::Rejected),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("Invalid event type: {}", s)),
        }
    }
}

/// Outcome attached to a usage event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Positive,
    Neutral,
    Negative,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            "negative" => Ok(Self::Negative),
            _ => Err(format!("Invalid outcome: {}", s)),
        }
    }
}

/// Provenance of a memory/topic link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    Clustering,
    Manual,
}

impl LinkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clustering => "clustering",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for LinkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LinkSource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clustering" => Ok(Self::Clustering),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Invalid link source: {}", s)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity Types
// ─────────────────────────────────────────────────────────────────────────────

/// A durable memory record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub owner_id: String,
    pub kind: MemoryKind,
    pub content: String,
    pub summary: Option<String>,
    pub content_hash: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub status: MemoryStatus,
    pub usage_count: i64,
    pub positive_outcomes: i64,
    pub negative_outcomes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryItem {
    /// Text submitted to the embedding service.
    ///
    /// The summary is appended after the content so literal detail survives
    /// next to the compressed meaning.
    pub fn embedding_input(&self) -> String {
        match self.summary.as_deref().map(str::trim) {
            Some(summary) if !summary.is_empty() => format!("{}\n\n{}", self.content, summary),
            _ => self.content.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MemoryStatus::Active
    }
}

/// Input for creating a memory item
#[derive(Debug, Clone)]
pub struct NewMemoryItem {
    pub owner_id: String,
    pub kind: MemoryKind,
    pub content: String,
    pub summary: Option<String>,
    pub confidence: Option<f64>,
}

impl NewMemoryItem {
    pub fn new(owner_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            kind: MemoryKind::Fact,
            content: content.into(),
            summary: None,
            confidence: None,
        }
    }

    pub fn with_kind(mut self, kind: MemoryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Filter for listing an owner's items
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    /// Restrict to these kinds (empty = all)
    pub kinds: Vec<MemoryKind>,
    /// Restrict to these statuses (empty = active only)
    pub statuses: Vec<MemoryStatus>,
    /// Only items created strictly after this instant
    pub created_after: Option<DateTime<Utc>>,
}

/// Stored vector for a memory item (1:1)
#[derive(Debug, Clone)]
pub struct MemoryEmbedding {
    pub memory_id: String,
    pub model: String,
    pub vector: Vec<f32>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryEmbedding {
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// A named grouping of memory items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    /// None for system-defined topics
    pub owner_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub is_auto_generated: bool,
    pub cluster_run_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Many-to-many join between an item and a topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryTopicLink {
    pub memory_id: String,
    pub topic_id: String,
    pub confidence: f64,
    pub assigned_by: LinkSource,
    pub created_at: DateTime<Utc>,
}

/// Append-only usage log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub id: String,
    pub memory_id: String,
    pub owner_id: String,
    pub event_type: EventType,
    pub outcome: Option<Outcome>,
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One topic to write during an auto-clustering run
#[derive(Debug, Clone)]
pub struct TopicDraft {
    pub owner_id: String,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub member_ids: Vec<String>,
    pub link_confidence: f64,
}

/// What happened to a single draft when a run was applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedTopic {
    pub topic_id: String,
    pub slug: String,
    pub name: String,
    pub created: bool,
    /// The owner deactivated this topic; it was left alone
    pub skipped: bool,
    pub links_created: usize,
    pub member_count: usize,
}

/// Per-owner store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub count_by_status: std::collections::HashMap<String, i64>,
    pub count_by_kind: std::collections::HashMap<String, i64>,
    pub embedded: i64,
    pub backlog: i64,
    pub topics: i64,
}

/// Compute SHA-256 hash of content and return as hex string
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
