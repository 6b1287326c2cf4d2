//! Topic Orchestrator
//!
//! One auto-clustering run for an owner: discover clusters, name each one,
//! then write topics and links in a single transaction. Topic identity is the
//! owner plus the slug derived from the name, so re-running converges on the
//! same topics instead of accumulating duplicates. All naming calls finish
//! before the store is touched.
//!
//! A cluster that only got the fallback label is named after its most common
//! words so that unnamed clusters do not collapse into one topic.

use super::namer::{TopicLabel, TopicNamer};
use crate::clustering::ClusterDiscovery;
use crate::config::ClusteringConfig;
use crate::embeddings::tokenize;
use crate::SDKResult;
use mnemos_core::types::{AppliedTopic, TopicDraft};
use mnemos_core::Database;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const MAX_SLUG_NAME_CHARS: usize = 50;
const FALLBACK_KEYWORDS: usize = 3;

const STOP_WORDS: &[&str] = &[
    "about", "all", "and", "any", "are", "but", "can", "for", "from", "had", "has", "have", "into", "its", "not",
    "our", "that", "the", "their", "there", "this", "was", "were", "what", "when", "will", "with", "you", "your",
];

/// Final state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Not enough dense structure (or items); a successful outcome
    NoClustersFound,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NoClustersFound => "no_clusters_found",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`TopicOrchestrator::run_auto_clustering`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoClusteringResult {
    pub run_id: String,
    pub status: RunStatus,
    pub topics_created: usize,
    pub topics_updated: usize,
    /// Matched topics the owner had deactivated
    pub topics_skipped: usize,
    pub links_created: usize,
    pub details: Vec<AppliedTopic>,
}

impl AutoClusteringResult {
    fn empty(run_id: String) -> Self {
        Self {
            run_id,
            status: RunStatus::NoClustersFound,
            topics_created: 0,
            topics_updated: 0,
            topics_skipped: 0,
            links_created: 0,
            details: Vec::new(),
        }
    }
}

/// Turns clusters into persisted topics
pub struct TopicOrchestrator {
    db: Arc<Database>,
    discovery: ClusterDiscovery,
    namer: Arc<dyn TopicNamer>,
    link_confidence: f64,
    owner_prefix_len: usize,
}

impl TopicOrchestrator {
    pub fn new(
        db: Arc<Database>,
        discovery: ClusterDiscovery,
        namer: Arc<dyn TopicNamer>,
        config: &ClusteringConfig,
    ) -> Self {
        Self {
            db,
            discovery,
            namer,
            link_confidence: config.link_confidence,
            owner_prefix_len: config.owner_prefix_len.max(1),
        }
    }

    /// Cluster an owner's memories and upsert one topic per cluster
    ///
    /// Safe to re-invoke: topics are matched by owner and slug, existing links
    /// are left untouched and deactivated topics stay deactivated.
    pub async fn run_auto_clustering(&self, owner_id: &str, run_id: Option<String>) -> SDKResult<AutoClusteringResult> {
        let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let clusters = self.discovery.discover(owner_id).await?;
        if clusters.is_empty() {
            info!(owner_id, run_id = %run_id, "no clusters found");
            return Ok(AutoClusteringResult::empty(run_id));
        }

        let mut drafts = Vec::with_capacity(clusters.len());
        let mut slugs = HashSet::new();
        for cluster in &clusters {
            let samples: Vec<String> = self
                .db
                .get_many(&cluster.members)?
                .into_iter()
                .map(|item| item.content)
                .collect();
            let mut label = self.namer.name(&samples).await;
            if label.name == TopicLabel::fallback().name {
                label = keyword_label(&samples);
            }

            // Two clusters of one run may still end up with the same name
            let base = auto_topic_slug(owner_id, &label.name, self.owner_prefix_len);
            let mut slug = base.clone();
            let mut suffix = 2;
            while !slugs.insert(slug.clone()) {
                slug = format!("{base}-{suffix}");
                suffix += 1;
            }

            drafts.push(TopicDraft {
                owner_id: owner_id.to_string(),
                slug,
                name: label.name,
                description: label.description,
                keywords: label.keywords,
                member_ids: cluster.members.clone(),
                link_confidence: self.link_confidence,
            });
        }

        let details = self.db.apply_topic_run(&run_id, &drafts)?;
        let topics_created = details.iter().filter(|d| d.created).count();
        let topics_skipped = details.iter().filter(|d| d.skipped).count();
        let links_created = details.iter().map(|d| d.links_created).sum();

        let result = AutoClusteringResult {
            run_id,
            status: RunStatus::Completed,
            topics_created,
            topics_updated: details.len() - topics_created - topics_skipped,
            topics_skipped,
            links_created,
            details,
        };

        info!(
            owner_id,
            run_id = %result.run_id,
            clusters = clusters.len(),
            topics_created = result.topics_created,
            topics_updated = result.topics_updated,
            topics_skipped = result.topics_skipped,
            links_created = result.links_created,
            "auto-clustering finished"
        );
        Ok(result)
    }
}

/// Fallback label carrying the cluster's most common words
fn keyword_label(samples: &[String]) -> TopicLabel {
    let mut label = TopicLabel::fallback();
    let keywords = top_keywords(samples, FALLBACK_KEYWORDS);
    if !keywords.is_empty() {
        label.name = format!("{} ({})", label.name, keywords.join(", "));
        label.keywords = keywords;
    }
    label
}

/// Words found in the most samples, ties broken alphabetically
pub fn top_keywords(samples: &[String], limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for sample in samples {
        let distinct: HashSet<String> = tokenize(sample)
            .into_iter()
            .filter(|t| t.chars().count() >= 3)
            .filter(|t| !t.chars().all(|c| c.is_numeric()))
            .filter(|t| !STOP_WORDS.contains(&t.as_str()))
            .collect();
        for token in distinct {
            *counts.entry(token).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(token, _)| token).collect()
}

/// Lowercase, non-alphanumerics collapsed into single dashes, trimmed
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// `auto_<owner prefix>_<slugified name>`
pub fn auto_topic_slug(owner_id: &str, name: &str, owner_prefix_len: usize) -> String {
    let owner_prefix: String = owner_id.chars().take(owner_prefix_len).collect();
    let owner_prefix = slugify(&owner_prefix);

    let mut name_slug: String = slugify(name).chars().take(MAX_SLUG_NAME_CHARS).collect();
    name_slug.truncate(name_slug.trim_end_matches('-').len());
    if name_slug.is_empty() {
        name_slug.push_str("topic");
    }

    format!("auto_{owner_prefix}_{name_slug}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::namer::{FallbackTopicNamer, TopicLabel};
    use async_trait::async_trait;
    use mnemos_core::types::NewMemoryItem;

    /// Names a cluster after the first word of its first sample
    struct FirstWordNamer;

    #[async_trait]
    impl TopicNamer for FirstWordNamer {
        async fn name(&self, samples: &[String]) -> TopicLabel {
            let word = samples
                .first()
                .and_then(|s| s.split_whitespace().next())
                .unwrap_or("none");
            TopicLabel {
                name: format!("{word} things"),
                description: format!("Notes about {word}"),
                keywords: vec![word.to_lowercase()],
            }
        }
    }

    fn seed(db: &Database, owner: &str, groups: &[(&str, [f32; 3])]) {
        for (word, vector) in groups {
            for i in 0..5 {
                let id = db.put(&NewMemoryItem::new(owner, format!("{word} note {i}"))).unwrap();
                db.upsert_embedding(&id, vector, "test-model").unwrap();
            }
        }
    }

    fn orchestrator(db: Arc<Database>, namer: Arc<dyn TopicNamer>) -> TopicOrchestrator {
        let config = ClusteringConfig::default();
        let discovery = ClusterDiscovery::new(db.clone(), &config);
        TopicOrchestrator::new(db, discovery, namer, &config)
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Fruit & Market Trips!"), "fruit-market-trips");
        assert_eq!(slugify("  --Hello--  "), "hello");
        assert_eq!(slugify("Ünïcode Names"), "ünïcode-names");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_auto_topic_slug() {
        assert_eq!(auto_topic_slug("user-123456789", "Fruit Shopping", 8), "auto_user-123_fruit-shopping");
        assert_eq!(auto_topic_slug("abc", "???", 8), "auto_abc_topic");

        let long = "word ".repeat(30);
        let slug = auto_topic_slug("abc", &long, 8);
        assert!(slug.len() <= "auto_abc_".len() + MAX_SLUG_NAME_CHARS);
        assert!(!slug.ends_with('-'));
    }

    #[tokio::test]
    async fn test_run_creates_topics_and_links() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed(&db, "owner-1", &[("apples", [1.0, 0.0, 0.0]), ("weather", [0.0, 1.0, 0.0])]);

        let result = orchestrator(db.clone(), Arc::new(FirstWordNamer))
            .run_auto_clustering("owner-1", Some("run-1".into()))
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.topics_created, 2);
        assert_eq!(result.links_created, 10);

        let topic = db
            .find_topic_by_slug(Some("owner-1"), "auto_owner-1_apples-things")
            .unwrap()
            .unwrap();
        assert!(topic.is_auto_generated);
        assert_eq!(topic.cluster_run_id.as_deref(), Some("run-1"));

        let links = db.topic_members(&topic.id).unwrap();
        assert_eq!(links.len(), 5);
        assert!(links.iter().all(|l| (l.confidence - 0.9).abs() < 1e-9));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed(&db, "owner-1", &[("apples", [1.0, 0.0, 0.0]), ("weather", [0.0, 1.0, 0.0])]);
        let orchestrator = orchestrator(db.clone(), Arc::new(FirstWordNamer));

        orchestrator.run_auto_clustering("owner-1", None).await.unwrap();
        let topics_after_first = db.list_topics("owner-1").unwrap().len();
        let links_after_first = db.link_count().unwrap();

        let second = orchestrator.run_auto_clustering("owner-1", None).await.unwrap();
        assert_eq!(second.topics_created, 0);
        assert_eq!(second.topics_updated, 2);
        assert_eq!(second.links_created, 0);
        assert_eq!(db.list_topics("owner-1").unwrap().len(), topics_after_first);
        assert_eq!(db.link_count().unwrap(), links_after_first);
    }

    #[tokio::test]
    async fn test_too_few_items_is_no_clusters_found() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        for i in 0..4 {
            let id = db.put(&NewMemoryItem::new("owner-1", format!("note {i}"))).unwrap();
            db.upsert_embedding(&id, &[1.0, 0.0], "test-model").unwrap();
        }

        let result = orchestrator(db.clone(), Arc::new(FallbackTopicNamer))
            .run_auto_clustering("owner-1", None)
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::NoClustersFound);
        assert_eq!(result.topics_created, 0);
        assert!(db.list_topics("owner-1").unwrap().is_empty());
    }

    #[test]
    fn test_top_keywords() {
        let samples = vec![
            "The blue apples at the market".to_string(),
            "apples and pears, 2024".to_string(),
            "market day".to_string(),
        ];
        assert_eq!(top_keywords(&samples, 3), vec!["apples", "market", "blue"]);
        assert!(top_keywords(&[], 3).is_empty());
    }

    #[tokio::test]
    async fn test_fallback_names_keep_clusters_apart() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed(&db, "owner-1", &[("apples", [1.0, 0.0, 0.0]), ("weather", [0.0, 1.0, 0.0])]);

        let result = orchestrator(db.clone(), Arc::new(FallbackTopicNamer))
            .run_auto_clustering("owner-1", None)
            .await
            .unwrap();

        assert_eq!(result.topics_created, 2);
        assert_eq!(result.links_created, 10);

        let mut slugs: Vec<String> = result.details.iter().map(|d| d.slug.clone()).collect();
        slugs.sort();
        assert_eq!(
            slugs,
            vec!["auto_owner-1_auto-topic-apples-note", "auto_owner-1_auto-topic-note-weather"]
        );
        assert_eq!(db.list_topics("owner-1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_same_name_twice_in_one_run_gets_two_topics() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        // Both groups start with "apples", so FirstWordNamer names them alike
        seed(&db, "owner-1", &[("apples", [1.0, 0.0, 0.0]), ("apples", [0.0, 1.0, 0.0])]);

        let result = orchestrator(db.clone(), Arc::new(FirstWordNamer))
            .run_auto_clustering("owner-1", None)
            .await
            .unwrap();

        assert_eq!(result.topics_created, 2);
        let mut slugs: Vec<String> = result.details.iter().map(|d| d.slug.clone()).collect();
        slugs.sort();
        assert_eq!(slugs, vec!["auto_owner-1_apples-things", "auto_owner-1_apples-things-2"]);
    }

    #[tokio::test]
    async fn test_owners_sharing_a_prefix_get_their_own_topics() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed(&db, "customer-alice", &[("apples", [1.0, 0.0, 0.0])]);
        seed(&db, "customer-bob", &[("apples", [1.0, 0.0, 0.0])]);

        let config = ClusteringConfig {
            allow_single_cluster: true,
            ..Default::default()
        };
        let discovery = ClusterDiscovery::new(db.clone(), &config);
        let orchestrator = TopicOrchestrator::new(db.clone(), discovery, Arc::new(FallbackTopicNamer), &config);

        let alice = orchestrator.run_auto_clustering("customer-alice", None).await.unwrap();
        let bob = orchestrator.run_auto_clustering("customer-bob", None).await.unwrap();
        assert_eq!(alice.topics_created, 1);
        assert_eq!(bob.topics_created, 1);
        assert_eq!(alice.details[0].slug, bob.details[0].slug);
        assert_ne!(alice.details[0].topic_id, bob.details[0].topic_id);

        for (owner, result) in [("customer-alice", &alice), ("customer-bob", &bob)] {
            let topic = db.get_topic(&result.details[0].topic_id).unwrap();
            assert_eq!(topic.owner_id.as_deref(), Some(owner));

            let members = db.topic_members(&topic.id).unwrap();
            assert_eq!(members.len(), 5);
            for link in members {
                assert_eq!(db.get(&link.memory_id).unwrap().owner_id, owner);
            }
        }
    }

    fn single_cluster_orchestrator(db: Arc<Database>) -> TopicOrchestrator {
        let config = ClusteringConfig {
            allow_single_cluster: true,
            ..Default::default()
        };
        let discovery = ClusterDiscovery::new(db.clone(), &config);
        TopicOrchestrator::new(db, discovery, Arc::new(FallbackTopicNamer), &config)
    }

    fn manual_topic(db: &Database, member: &str) -> mnemos_core::types::Topic {
        let topic = db
            .create_topic(&mnemos_core::db::NewTopic {
                owner_id: Some("owner-1".into()),
                name: "Apples".into(),
                slug: "auto_owner-1_auto-topic-apples-note".into(),
                description: String::new(),
                keywords: vec![],
            })
            .unwrap();
        db.link_memory(member, &topic.id, 1.0, mnemos_core::types::LinkSource::Manual).unwrap();
        topic
    }

    #[tokio::test]
    async fn test_existing_topic_and_manual_link_are_reused() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed(&db, "owner-1", &[("apples", [1.0, 0.0, 0.0])]);
        let member = db.list_by_owner("owner-1", &Default::default(), 1, 0).unwrap()[0].id.clone();
        let manual = manual_topic(&db, &member);

        let result = single_cluster_orchestrator(db.clone())
            .run_auto_clustering("owner-1", None)
            .await
            .unwrap();
        assert_eq!(result.topics_created, 0);
        assert_eq!(result.topics_updated, 1);
        assert_eq!(result.links_created, 4);

        let links = db.topic_members(&manual.id).unwrap();
        let kept = links.iter().find(|l| l.memory_id == member).unwrap();
        assert_eq!(kept.assigned_by, mnemos_core::types::LinkSource::Manual);
        assert!((kept.confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_deactivated_topic_stays_inactive() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed(&db, "owner-1", &[("apples", [1.0, 0.0, 0.0])]);
        let member = db.list_by_owner("owner-1", &Default::default(), 1, 0).unwrap()[0].id.clone();
        let manual = manual_topic(&db, &member);
        db.deactivate_topic(&manual.id).unwrap();

        let result = single_cluster_orchestrator(db.clone())
            .run_auto_clustering("owner-1", None)
            .await
            .unwrap();
        assert_eq!(result.topics_created, 0);
        assert_eq!(result.topics_updated, 0);
        assert_eq!(result.topics_skipped, 1);
        assert_eq!(result.links_created, 0);

        let topic = db.get_topic(&manual.id).unwrap();
        assert!(!topic.is_active);
        assert_eq!(topic.name, "Apples");
        assert_eq!(db.topic_members(&manual.id).unwrap().len(), 1);
    }
}
