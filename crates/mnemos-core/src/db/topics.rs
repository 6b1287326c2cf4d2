//! Topic and link persistence.

use super::{millis_to_datetime, Database};
use crate::error::{Error, Result};
use crate::types::*;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

const TOPIC_COLUMNS: &str = "id, owner_id, name, slug, description, keywords_json, is_auto_generated,
     cluster_run_id, is_active, created_at, updated_at";

/// Input for a manually created topic
#[derive(Debug, Clone)]
pub struct NewTopic {
    /// None for a system-defined topic
    pub owner_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub keywords: Vec<String>,
}

impl Database {
    /// Create a manual topic. Slugs are unique per owner.
    pub fn create_topic(&self, input: &NewTopic) -> Result<Topic> {
        if input.slug.trim().is_empty() || input.name.trim().is_empty() {
            return Err(Error::InvalidInput("topic name and slug are required".into()));
        }

        let conn = self.conn()?;
        if Self::topic_by_slug(&conn, input.owner_id.as_deref(), &input.slug)?.is_some() {
            return Err(Error::InvalidInput(format!("topic slug already exists: {}", input.slug)));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO topics (id, owner_id, name, slug, description, keywords_json, is_auto_generated,
                                 cluster_run_id, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, 1, ?7, ?7)",
            params![
                &id,
                &input.owner_id,
                &input.name,
                &input.slug,
                &input.description,
                serde_json::to_string(&input.keywords)?,
                now,
            ],
        )?;

        Self::topic_by_id(&conn, &id)?.ok_or_else(|| Error::not_found("Topic", &id))
    }

    /// Get a topic by ID
    pub fn get_topic(&self, id: &str) -> Result<Topic> {
        let conn = self.conn()?;
        Self::topic_by_id(&conn, id)?.ok_or_else(|| Error::not_found("Topic", id))
    }

    /// Look a topic up by slug within one owner (None for system topics)
    pub fn find_topic_by_slug(&self, owner_id: Option<&str>, slug: &str) -> Result<Option<Topic>> {
        let conn = self.conn()?;
        Self::topic_by_slug(&conn, owner_id, slug)
    }

    /// Active topics visible to an owner: their own plus system topics
    pub fn list_topics(&self, owner_id: &str) -> Result<Vec<Topic>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOPIC_COLUMNS} FROM topics
             WHERE is_active = 1 AND (owner_id = ?1 OR owner_id IS NULL)
             ORDER BY name ASC"
        ))?;
        let topics = stmt
            .query_map(params![owner_id], Self::map_topic)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(topics)
    }

    /// Hide a topic without dropping its links
    pub fn deactivate_topic(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE topics SET is_active = 0, updated_at = ?1 WHERE id = ?2",
            params![Utc::now().timestamp_millis(), id],
        )?;
        if updated == 0 {
            return Err(Error::not_found("Topic", id));
        }
        Ok(())
    }

    /// Link an item to a topic; returns false if the link already existed
    pub fn link_memory(&self, memory_id: &str, topic_id: &str, confidence: f64, source: LinkSource) -> Result<bool> {
        let conn = self.conn()?;
        let item_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM memory_items WHERE id = ?1)",
            params![memory_id],
            |row| row.get(0),
        )?;
        if !item_exists {
            return Err(Error::not_found("MemoryItem", memory_id));
        }
        if Self::topic_by_id(&conn, topic_id)?.is_none() {
            return Err(Error::not_found("Topic", topic_id));
        }

        let created = Self::insert_link(&conn, memory_id, topic_id, confidence, source)?;
        Ok(created)
    }

    /// Links pointing at a topic
    pub fn topic_members(&self, topic_id: &str) -> Result<Vec<MemoryTopicLink>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT memory_id, topic_id, confidence, assigned_by, created_at
             FROM memory_topic_links WHERE topic_id = ?1 ORDER BY memory_id",
        )?;
        let links = stmt
            .query_map(params![topic_id], |row| {
                Ok(MemoryTopicLink {
                    memory_id: row.get(0)?,
                    topic_id: row.get(1)?,
                    confidence: row.get(2)?,
                    assigned_by: row.get::<_, String>(3)?.parse().unwrap_or(LinkSource::Manual),
                    created_at: millis_to_datetime(row.get(4)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(links)
    }

    /// Active topics an item belongs to
    pub fn topics_for_memory(&self, memory_id: &str) -> Result<Vec<Topic>> {
        let conn = self.conn()?;
        let columns = TOPIC_COLUMNS
            .split(',')
            .map(|c| format!("t.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {columns} FROM topics t
             JOIN memory_topic_links l ON l.topic_id = t.id
             WHERE l.memory_id = ?1 AND t.is_active = 1
             ORDER BY t.name ASC"
        ))?;
        let topics = stmt
            .query_map(params![memory_id], Self::map_topic)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(topics)
    }

    /// Total number of item/topic links
    pub fn link_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM memory_topic_links", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Write the result of one clustering run atomically
    ///
    /// Each draft is upserted by (owner, slug): an existing active topic has
    /// its name, description, keywords and run id refreshed, otherwise a new
    /// auto-generated topic is created. A topic the owner deactivated is
    /// skipped and gets no new links. Links are only inserted when absent,
    /// so applying the same drafts twice creates nothing new. Any failure
    /// rolls back the whole run. The write lock is taken up front so
    /// concurrent runs serialize on the slug lookup.
    pub fn apply_topic_run(&self, run_id: &str, drafts: &[TopicDraft]) -> Result<Vec<AppliedTopic>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().timestamp_millis();
        let mut applied = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let keywords_json = serde_json::to_string(&draft.keywords)?;
            let existing = Self::topic_by_slug(&tx, Some(draft.owner_id.as_str()), &draft.slug)?;

            let (topic_id, created) = match existing {
                Some(topic) if !topic.is_active => {
                    applied.push(AppliedTopic {
                        topic_id: topic.id,
                        slug: draft.slug.clone(),
                        name: topic.name,
                        created: false,
                        skipped: true,
                        links_created: 0,
                        member_count: draft.member_ids.len(),
                    });
                    continue;
                }
                Some(topic) => {
                    tx.execute(
                        "UPDATE topics SET name = ?1, description = ?2, keywords_json = ?3,
                                           cluster_run_id = ?4, updated_at = ?5
                         WHERE id = ?6",
                        params![&draft.name, &draft.description, &keywords_json, run_id, now, &topic.id],
                    )?;
                    (topic.id, false)
                }
                None => {
                    let id = Uuid::new_v4().to_string();
                    tx.execute(
                        "INSERT INTO topics (id, owner_id, name, slug, description, keywords_json,
                                             is_auto_generated, cluster_run_id, is_active, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, 1, ?8, ?8)",
                        params![
                            &id,
                            &draft.owner_id,
                            &draft.name,
                            &draft.slug,
                            &draft.description,
                            &keywords_json,
                            run_id,
                            now,
                        ],
                    )?;
                    (id, true)
                }
            };

            let mut links_created = 0;
            for memory_id in &draft.member_ids {
                if Self::insert_link(&tx, memory_id, &topic_id, draft.link_confidence, LinkSource::Clustering)? {
                    links_created += 1;
                }
            }

            applied.push(AppliedTopic {
                topic_id,
                slug: draft.slug.clone(),
                name: draft.name.clone(),
                created,
                skipped: false,
                links_created,
                member_count: draft.member_ids.len(),
            });
        }

        tx.commit()?;
        Ok(applied)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_link(
        conn: &Connection,
        memory_id: &str,
        topic_id: &str,
        confidence: f64,
        source: LinkSource,
    ) -> rusqlite::Result<bool> {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO memory_topic_links (memory_id, topic_id, confidence, assigned_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                memory_id,
                topic_id,
                confidence.clamp(0.0, 1.0),
                source.as_str(),
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(inserted > 0)
    }

    fn topic_by_id(conn: &Connection, id: &str) -> Result<Option<Topic>> {
        let topic = conn
            .query_row(
                &format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE id = ?1"),
                params![id],
                Self::map_topic,
            )
            .optional()?;
        Ok(topic)
    }

    fn topic_by_slug(conn: &Connection, owner_id: Option<&str>, slug: &str) -> Result<Option<Topic>> {
        let topic = conn
            .query_row(
                &format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE owner_id IS ?1 AND slug = ?2"),
                params![owner_id, slug],
                Self::map_topic,
            )
            .optional()?;
        Ok(topic)
    }

    fn map_topic(row: &Row) -> rusqlite::Result<Topic> {
        let keywords_json: String = row.get(5)?;
        Ok(Topic {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            slug: row.get(3)?,
            description: row.get(4)?,
            keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
            is_auto_generated: row.get::<_, i64>(6)? != 0,
            cluster_run_id: row.get(7)?,
            is_active: row.get::<_, i64>(8)? != 0,
            created_at: millis_to_datetime(row.get(9)?),
            updated_at: millis_to_datetime(row.get(10)?),
        })
    }
}
