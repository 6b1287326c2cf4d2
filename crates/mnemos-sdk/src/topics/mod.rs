//! Self-organizing topics
//!
//! - **namer**: labels a cluster from sample texts
//! - **orchestrator**: turns discovered clusters into persisted topics

pub mod namer;
pub mod orchestrator;

pub use namer::{
    CompletionClient, FallbackTopicNamer, HttpCompletionClient, LlmTopicNamer, TopicLabel, TopicNamer,
};
pub use orchestrator::{auto_topic_slug, slugify, AutoClusteringResult, RunStatus, TopicOrchestrator};
