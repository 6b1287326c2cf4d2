//! Direct SQLite database access for Mnemos.
//!
//! This module is the MemoryStore: it owns identity and status lifecycle of
//! memory items, their embeddings, topics, links and the usage event log.
//!
//! Every item or embedding mutation bumps the `dirty_version` counter inside
//! the same transaction, so background indexers can detect new work by
//! polling instead of being pushed to.

mod events;
mod topics;

pub use topics::NewTopic;

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Memory tables SQL (001)
pub const MEMORY_TABLES_SQL: &str = include_str!("migrations/001_memory_tables.sql");

const ITEM_COLUMNS: &str = "id, owner_id, kind, content, summary, content_hash, confidence, status,
     usage_count, positive_outcomes, negative_outcomes, created_at, updated_at";

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open database at specific path, creating the schema if needed
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(Error::Database)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init(conn)
    }

    /// Open a private in-memory database (tests, ephemeral tooling)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(MEMORY_TABLES_SQL)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dirty Marker
    // ─────────────────────────────────────────────────────────────────────────

    /// Monotonic counter bumped by every item or embedding mutation
    pub fn dirty_version(&self) -> Result<i64> {
        let conn = self.conn()?;
        let version = conn.query_row(
            "SELECT value FROM store_meta WHERE key = 'dirty_version'",
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }

    fn bump_dirty(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE store_meta SET value = value + 1 WHERE key = 'dirty_version'",
            [],
        )?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Memory Item Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new memory item and return its id
    pub fn put(&self, input: &NewMemoryItem) -> Result<String> {
        if input.owner_id.trim().is_empty() {
            return Err(Error::InvalidInput("owner_id is required".into()));
        }
        if input.content.trim().is_empty() {
            return Err(Error::InvalidInput("content cannot be empty".into()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();
        let confidence = input.confidence.unwrap_or(0.5).clamp(0.0, 1.0);

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO memory_items (id, owner_id, kind, content, summary, content_hash, confidence,
                                       status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8, ?8)",
            params![
                &id,
                &input.owner_id,
                input.kind.as_str(),
                &input.content,
                &input.summary,
                content_hash(&input.content),
                confidence,
                now,
            ],
        )?;
        Self::bump_dirty(&tx)?;
        tx.commit()?;

        tracing::debug!(memory_id = %id, owner_id = %input.owner_id, "memory item stored");
        Ok(id)
    }

    /// Get a memory item by ID, failing with NotFound when absent
    pub fn get(&self, id: &str) -> Result<MemoryItem> {
        self.find(id)?.ok_or_else(|| Error::not_found("MemoryItem", id))
    }

    /// Get a memory item by ID
    pub fn find(&self, id: &str) -> Result<Option<MemoryItem>> {
        let conn = self.conn()?;
        let item = conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM memory_items WHERE id = ?1"),
                params![id],
                Self::map_item,
            )
            .optional()?;
        Ok(item)
    }

    /// Fetch several items, preserving the order of `ids` and skipping unknown ones
    pub fn get_many(&self, ids: &[String]) -> Result<Vec<MemoryItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {ITEM_COLUMNS} FROM memory_items WHERE id = ?1"))?;

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = stmt.query_row(params![id], Self::map_item).optional()? {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// List an owner's items, newest first
    pub fn list_by_owner(
        &self,
        owner_id: &str,
        filter: &MemoryFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MemoryItem>> {
        let mut sql = format!("SELECT {ITEM_COLUMNS} FROM memory_items WHERE owner_id = ?");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(owner_id.to_string())];

        let statuses: Vec<&str> = if filter.statuses.is_empty() {
            vec![MemoryStatus::Active.as_str()]
        } else {
            filter.statuses.iter().map(|s| s.as_str()).collect()
        };
        sql.push_str(&format!(
            " AND status IN ({})",
            statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",")
        ));
        for status in statuses {
            params_vec.push(Box::new(status.to_string()));
        }

        if !filter.kinds.is_empty() {
            sql.push_str(&format!(
                " AND kind IN ({})",
                filter.kinds.iter().map(|_| "?").collect::<Vec<_>>().join(",")
            ));
            for kind in &filter.kinds {
                params_vec.push(Box::new(kind.as_str().to_string()));
            }
        }

        if let Some(after) = filter.created_after {
            sql.push_str(" AND created_at > ?");
            params_vec.push(Box::new(after.timestamp_millis()));
        }

        sql.push_str(" ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?");
        params_vec.push(Box::new(limit as i64));
        params_vec.push(Box::new(offset as i64));

        let conn = self.conn()?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(param_refs.as_slice(), Self::map_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Mark an item deleted. Rows are kept so topic links stay valid.
    pub fn soft_delete(&self, id: &str) -> Result<()> {
        self.update_status(id, MemoryStatus::Deleted)
    }

    /// Move an item between active / archived / deleted
    pub fn update_status(&self, id: &str, status: MemoryStatus) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE memory_items SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().timestamp_millis(), id],
        )?;
        if updated == 0 {
            return Err(Error::not_found("MemoryItem", id));
        }
        Self::bump_dirty(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Find an owner's live item with identical content
    pub fn find_by_hash(&self, owner_id: &str, hash: &str) -> Result<Option<MemoryItem>> {
        let conn = self.conn()?;
        let item = conn
            .query_row(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM memory_items
                     WHERE owner_id = ?1 AND content_hash = ?2 AND status != 'deleted'
                     ORDER BY created_at ASC LIMIT 1"
                ),
                params![owner_id, hash],
                Self::map_item,
            )
            .optional()?;
        Ok(item)
    }

    /// Owners that have at least one active item
    pub fn owners_with_active_items(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT owner_id FROM memory_items WHERE status = 'active' ORDER BY owner_id",
        )?;
        let owners = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(owners)
    }

    /// Active items whose content or summary contains any of `terms`
    ///
    /// Terms are matched case-insensitively with LIKE; callers pass
    /// already-tokenized words.
    pub fn lexical_candidates(&self, owner_id: &str, terms: &[String], limit: usize) -> Result<Vec<MemoryItem>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT {ITEM_COLUMNS} FROM memory_items WHERE owner_id = ? AND status = 'active' AND ("
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(owner_id.to_string())];
        let clauses: Vec<&str> = terms
            .iter()
            .map(|_| "lower(content) LIKE ? ESCAPE '\\' OR lower(coalesce(summary, '')) LIKE ? ESCAPE '\\'")
            .collect();
        sql.push_str(&clauses.join(" OR "));
        sql.push_str(") ORDER BY created_at DESC LIMIT ?");

        for term in terms {
            let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
            params_vec.push(Box::new(pattern.clone()));
            params_vec.push(Box::new(pattern));
        }
        params_vec.push(Box::new(limit as i64));

        let conn = self.conn()?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(param_refs.as_slice(), Self::map_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Aggregate counts for one owner
    pub fn memory_stats(&self, owner_id: &str, model: &str) -> Result<MemoryStats> {
        let mut stats = MemoryStats::default();
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM memory_items WHERE owner_id = ?1 GROUP BY status")?;
        let rows = stmt.query_map(params![owner_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (status, count) = row?;
            stats.count_by_status.insert(status, count);
        }

        let mut stmt = conn.prepare(
            "SELECT kind, COUNT(*) FROM memory_items WHERE owner_id = ?1 AND status = 'active' GROUP BY kind",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (kind, count) = row?;
            stats.count_by_kind.insert(kind, count);
        }

        stats.embedded = conn.query_row(
            "SELECT COUNT(*) FROM memory_embeddings e JOIN memory_items m ON m.id = e.memory_id
             WHERE m.owner_id = ?1 AND m.status = 'active'",
            params![owner_id],
            |row| row.get(0),
        )?;
        stats.backlog = conn.query_row(
            "SELECT COUNT(*) FROM memory_items m LEFT JOIN memory_embeddings e ON e.memory_id = m.id
             WHERE m.owner_id = ?1 AND m.status = 'active' AND (e.memory_id IS NULL OR e.model != ?2)",
            params![owner_id, model],
            |row| row.get(0),
        )?;
        stats.topics = conn.query_row(
            "SELECT COUNT(*) FROM topics WHERE owner_id = ?1 AND is_active = 1",
            params![owner_id],
            |row| row.get(0),
        )?;

        Ok(stats)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Embedding Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the embedding of an item in one statement
    ///
    /// A reader never observes a state where the old vector is gone and the
    /// new one not yet written.
    pub fn upsert_embedding(&self, memory_id: &str, vector: &[f32], model: &str) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::InvalidInput("embedding vector is empty".into()));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM memory_items WHERE id = ?1)",
            params![memory_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(Error::not_found("MemoryItem", memory_id));
        }

        tx.execute(
            "INSERT INTO memory_embeddings (memory_id, model, dimensions, vector, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(memory_id) DO UPDATE SET
                model = excluded.model,
                dimensions = excluded.dimensions,
                vector = excluded.vector,
                updated_at = excluded.updated_at",
            params![
                memory_id,
                model,
                vector.len() as i64,
                vector_to_bytes(vector),
                Utc::now().timestamp_millis(),
            ],
        )?;
        Self::bump_dirty(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Get the stored embedding for an item
    pub fn get_embedding(&self, memory_id: &str) -> Result<Option<MemoryEmbedding>> {
        let conn = self.conn()?;
        let embedding = conn
            .query_row(
                "SELECT memory_id, model, vector, updated_at FROM memory_embeddings WHERE memory_id = ?1",
                params![memory_id],
                |row| {
                    Ok(MemoryEmbedding {
                        memory_id: row.get(0)?,
                        model: row.get(1)?,
                        vector: bytes_to_vector(&row.get::<_, Vec<u8>>(2)?),
                        updated_at: millis_to_datetime(row.get(3)?),
                    })
                },
            )
            .optional()?;
        Ok(embedding)
    }

    /// All vectors of an owner's active items, ordered by item id
    ///
    /// When `model` is given only vectors produced by that model are returned,
    /// so spaces from different models are never mixed.
    pub fn active_embeddings(&self, owner_id: &str, model: Option<&str>) -> Result<Vec<(String, Vec<f32>)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT e.memory_id, e.vector FROM memory_embeddings e
             JOIN memory_items m ON m.id = e.memory_id
             WHERE m.owner_id = ?1 AND m.status = 'active' AND (?2 IS NULL OR e.model = ?2)
             ORDER BY e.memory_id",
        )?;
        let rows = stmt
            .query_map(params![owner_id, model], |row| {
                Ok((row.get::<_, String>(0)?, bytes_to_vector(&row.get::<_, Vec<u8>>(1)?)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Total number of stored embeddings
    pub fn embedding_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM memory_embeddings", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Active items without an embedding from `model`, oldest first
    pub fn backlog_ids(&self, model: &str, limit: usize) -> Result<Vec<String>> {
        self.backlog_page(None, model, limit)
    }

    /// Like [`Database::backlog_ids`], restricted to one owner's items
    pub fn owner_backlog_ids(&self, owner_id: &str, model: &str, limit: usize) -> Result<Vec<String>> {
        self.backlog_page(Some(owner_id), model, limit)
    }

    fn backlog_page(&self, owner_id: Option<&str>, model: &str, limit: usize) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT m.id FROM memory_items m LEFT JOIN memory_embeddings e ON e.memory_id = m.id
             WHERE m.status = 'active' AND (e.memory_id IS NULL OR e.model != ?1)
               AND (?3 IS NULL OR m.owner_id = ?3)
             ORDER BY m.created_at ASC, m.id ASC LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![model, limit as i64, owner_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Number of active items without an embedding from `model`
    pub fn backlog_count(&self, model: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM memory_items m LEFT JOIN memory_embeddings e ON e.memory_id = m.id
             WHERE m.status = 'active' AND (e.memory_id IS NULL OR e.model != ?1)",
            params![model],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// A page of active item ids strictly after `cursor`, in id order
    pub fn active_ids_page(&self, cursor: Option<&str>, limit: usize) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM memory_items WHERE status = 'active' AND (?1 IS NULL OR id > ?1)
             ORDER BY id ASC LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![cursor, limit as i64], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Row Mappers
    // ─────────────────────────────────────────────────────────────────────────

    fn map_item(row: &Row) -> rusqlite::Result<MemoryItem> {
        Ok(MemoryItem {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            kind: row.get::<_, String>(2)?.parse().unwrap_or(MemoryKind::Other),
            content: row.get(3)?,
            summary: row.get(4)?,
            content_hash: row.get(5)?,
            confidence: row.get(6)?,
            status: row.get::<_, String>(7)?.parse().unwrap_or(MemoryStatus::Active),
            usage_count: row.get(8)?,
            positive_outcomes: row.get(9)?,
            negative_outcomes: row.get(10)?,
            created_at: millis_to_datetime(row.get(11)?),
            updated_at: millis_to_datetime(row.get(12)?),
        })
    }
}

/// Encode a vector as little-endian f32 bytes
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes; a trailing partial chunk is ignored
pub fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_put_and_get() {
        let db = setup();
        let id = db
            .put(&NewMemoryItem::new("user-1", "git status shows clean tree").with_summary("clean repo"))
            .unwrap();

        let item = db.get(&id).unwrap();
        assert_eq!(item.owner_id, "user-1");
        assert_eq!(item.kind, MemoryKind::Fact);
        assert_eq!(item.status, MemoryStatus::Active);
        assert_eq!(item.summary.as_deref(), Some("clean repo"));
        assert_eq!(item.content_hash, content_hash("git status shows clean tree"));
        assert_eq!(item.usage_count, 0);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let db = setup();
        let err = db.get("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_put_rejects_empty_content() {
        let db = setup();
        assert!(matches!(db.put(&NewMemoryItem::new("user-1", "  ")), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_confidence_is_clamped() {
        let db = setup();
        let id = db.put(&NewMemoryItem::new("user-1", "x").with_confidence(4.0)).unwrap();
        assert_eq!(db.get(&id).unwrap().confidence, 1.0);
    }

    #[test]
    fn test_list_by_owner_filters() {
        let db = setup();
        db.put(&NewMemoryItem::new("user-1", "a").with_kind(MemoryKind::Decision)).unwrap();
        let archived = db.put(&NewMemoryItem::new("user-1", "b")).unwrap();
        db.put(&NewMemoryItem::new("user-2", "c")).unwrap();
        db.update_status(&archived, MemoryStatus::Archived).unwrap();

        let active = db.list_by_owner("user-1", &MemoryFilter::default(), 10, 0).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].content, "a");

        let filter = MemoryFilter {
            statuses: vec![MemoryStatus::Archived],
            ..Default::default()
        };
        let archived_items = db.list_by_owner("user-1", &filter, 10, 0).unwrap();
        assert_eq!(archived_items.len(), 1);

        let filter = MemoryFilter {
            kinds: vec![MemoryKind::Insight],
            ..Default::default()
        };
        assert!(db.list_by_owner("user-1", &filter, 10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_soft_delete_keeps_row() {
        let db = setup();
        let id = db.put(&NewMemoryItem::new("user-1", "temporary")).unwrap();
        db.soft_delete(&id).unwrap();

        let item = db.get(&id).unwrap();
        assert_eq!(item.status, MemoryStatus::Deleted);
        assert!(db.soft_delete("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_upsert_embedding_replaces() {
        let db = setup();
        let id = db.put(&NewMemoryItem::new("user-1", "vector me")).unwrap();

        db.upsert_embedding(&id, &[1.0, 0.0, 0.0], "model-a").unwrap();
        db.upsert_embedding(&id, &[0.0, 1.0], "model-b").unwrap();

        assert_eq!(db.embedding_count().unwrap(), 1);
        let embedding = db.get_embedding(&id).unwrap().unwrap();
        assert_eq!(embedding.model, "model-b");
        assert_eq!(embedding.vector, vec![0.0, 1.0]);
        assert_eq!(embedding.dimensions(), 2);
    }

    #[test]
    fn test_upsert_embedding_unknown_item() {
        let db = setup();
        assert!(db.upsert_embedding("ghost", &[1.0], "m").unwrap_err().is_not_found());
    }

    #[test]
    fn test_dirty_version_increments() {
        let db = setup();
        let v0 = db.dirty_version().unwrap();
        let id = db.put(&NewMemoryItem::new("user-1", "one")).unwrap();
        let v1 = db.dirty_version().unwrap();
        db.upsert_embedding(&id, &[0.5], "m").unwrap();
        let v2 = db.dirty_version().unwrap();
        assert!(v0 < v1 && v1 < v2);
    }

    #[test]
    fn test_backlog_tracks_model() {
        let db = setup();
        let a = db.put(&NewMemoryItem::new("user-1", "a")).unwrap();
        let b = db.put(&NewMemoryItem::new("user-1", "b")).unwrap();
        assert_eq!(db.backlog_count("m1").unwrap(), 2);

        db.upsert_embedding(&a, &[1.0], "m1").unwrap();
        assert_eq!(db.backlog_ids("m1", 10).unwrap(), vec![b.clone()]);

        // A model switch puts everything back in the backlog
        assert_eq!(db.backlog_count("m2").unwrap(), 2);

        db.soft_delete(&b).unwrap();
        assert_eq!(db.backlog_count("m1").unwrap(), 0);
    }

    #[test]
    fn test_owner_backlog_ids() {
        let db = setup();
        let mine = db.put(&NewMemoryItem::new("user-1", "mine")).unwrap();
        db.put(&NewMemoryItem::new("user-2", "theirs")).unwrap();

        assert_eq!(db.backlog_ids("m1", 10).unwrap().len(), 2);
        assert_eq!(db.owner_backlog_ids("user-1", "m1", 10).unwrap(), vec![mine.clone()]);

        db.upsert_embedding(&mine, &[1.0], "m1").unwrap();
        assert!(db.owner_backlog_ids("user-1", "m1", 10).unwrap().is_empty());
        assert_eq!(db.owner_backlog_ids("user-2", "m1", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_active_ids_page_is_resumable() {
        let db = setup();
        for i in 0..5 {
            db.put(&NewMemoryItem::new("user-1", format!("item {i}"))).unwrap();
        }
        let first = db.active_ids_page(None, 3).unwrap();
        let second = db.active_ids_page(first.last().map(String::as_str), 3).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);
        assert!(first.iter().all(|id| !second.contains(id)));
    }

    #[test]
    fn test_lexical_candidates() {
        let db = setup();
        db.put(&NewMemoryItem::new("user-1", "Blue apples at the market")).unwrap();
        db.put(&NewMemoryItem::new("user-1", "Park tomorrow").with_summary("apples picnic")).unwrap();
        db.put(&NewMemoryItem::new("user-1", "Nothing relevant")).unwrap();

        let hits = db.lexical_candidates("user-1", &["apples".to_string()], 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(db.lexical_candidates("user-1", &[], 10).unwrap().is_empty());
    }

    #[test]
    fn test_vector_bytes_roundtrip() {
        let v = vec![0.25_f32, -1.5, 3.0];
        assert_eq!(bytes_to_vector(&vector_to_bytes(&v)), v);
    }

    #[test]
    fn test_memory_stats() {
        let db = setup();
        let a = db.put(&NewMemoryItem::new("user-1", "a")).unwrap();
        db.put(&NewMemoryItem::new("user-1", "b").with_kind(MemoryKind::Insight)).unwrap();
        db.upsert_embedding(&a, &[1.0], "m").unwrap();

        let stats = db.memory_stats("user-1", "m").unwrap();
        assert_eq!(stats.count_by_status.get("active"), Some(&2));
        assert_eq!(stats.count_by_kind.get("insight"), Some(&1));
        assert_eq!(stats.embedded, 1);
        assert_eq!(stats.backlog, 1);
        assert_eq!(stats.topics, 0);
    }

    #[test]
    fn test_open_path_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mnemos.db");
        let id = {
            let db = Database::open_path(&path).unwrap();
            db.put(&NewMemoryItem::new("user-1", "durable")).unwrap()
        };
        let db = Database::open_path(&path).unwrap();
        assert_eq!(db.get(&id).unwrap().content, "durable");
    }
}
