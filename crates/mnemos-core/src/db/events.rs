//! Usage event log and outcome counters.

use super::{millis_to_datetime, Database};
use crate::error::Result;
use crate::types::*;
use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

impl Database {
    /// Append one event per memory id; returns the number of rows written
    pub fn insert_events(
        &self,
        owner_id: &str,
        memory_ids: &[String],
        event_type: EventType,
        outcome: Option<Outcome>,
        context: Option<&str>,
    ) -> Result<usize> {
        if memory_ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().timestamp_millis();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO memory_events (id, memory_id, owner_id, event_type, outcome, context, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for memory_id in memory_ids {
                stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    memory_id,
                    owner_id,
                    event_type.as_str(),
                    outcome.map(|o| o.as_str()),
                    context,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(memory_ids.len())
    }

    /// Add one to `usage_count` of each item; returns the number of items touched
    pub fn increment_usage_count(&self, memory_ids: &[String]) -> Result<usize> {
        self.bump_counter("usage_count", memory_ids)
    }

    /// Aggregate an outcome into the item counters
    ///
    /// Neutral outcomes carry no direction and leave the counters alone.
    pub fn record_outcome(&self, memory_ids: &[String], outcome: Outcome) -> Result<usize> {
        match outcome {
            Outcome::Positive => self.bump_counter("positive_outcomes", memory_ids),
            Outcome::Negative => self.bump_counter("negative_outcomes", memory_ids),
            Outcome::Neutral => Ok(0),
        }
    }

    /// Events recorded against an item, oldest first
    pub fn events_for_memory(&self, memory_id: &str) -> Result<Vec<MemoryEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, memory_id, owner_id, event_type, outcome, context, created_at
             FROM memory_events WHERE memory_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let events = stmt
            .query_map(params![memory_id], |row| {
                Ok(MemoryEvent {
                    id: row.get(0)?,
                    memory_id: row.get(1)?,
                    owner_id: row.get(2)?,
                    event_type: row.get::<_, String>(3)?.parse().unwrap_or(EventType::Used),
                    outcome: row.get::<_, Option<String>>(4)?.and_then(|o| o.parse().ok()),
                    context: row.get(5)?,
                    created_at: millis_to_datetime(row.get(6)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    // `column` is always one of the fixed counter names above
    fn bump_counter(&self, column: &str, memory_ids: &[String]) -> Result<usize> {
        if memory_ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().timestamp_millis();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut touched = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "UPDATE memory_items SET {column} = {column} + 1, updated_at = ?1 WHERE id = ?2"
            ))?;
            for memory_id in memory_ids {
                touched += stmt.execute(params![now, memory_id])?;
            }
        }
        if touched > 0 {
            Self::bump_dirty(&tx)?;
        }
        tx.commit()?;
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, Vec<String>) {
        let db = Database::open_in_memory().unwrap();
        let ids = vec![
            db.put(&NewMemoryItem::new("owner-1", "first")).unwrap(),
            db.put(&NewMemoryItem::new("owner-1", "second")).unwrap(),
        ];
        (db, ids)
    }

    #[test]
    fn test_neutral_outcome_is_noop() {
        let (db, ids) = setup();
        assert_eq!(db.record_outcome(&ids, Outcome::Neutral).unwrap(), 0);

        for id in &ids {
            let item = db.get(id).unwrap();
            assert_eq!(item.positive_outcomes, 0);
            assert_eq!(item.negative_outcomes, 0);
        }
    }

    #[test]
    fn test_outcome_counters() {
        let (db, ids) = setup();
        db.record_outcome(&ids, Outcome::Positive).unwrap();
        db.record_outcome(&ids[..1], Outcome::Negative).unwrap();
        db.record_outcome(&ids[..1], Outcome::Positive).unwrap();

        let first = db.get(&ids[0]).unwrap();
        assert_eq!(first.positive_outcomes, 2);
        assert_eq!(first.negative_outcomes, 1);
        assert_eq!(db.get(&ids[1]).unwrap().positive_outcomes, 1);
    }

    #[test]
    fn test_usage_count_skips_unknown_ids() {
        let (db, mut ids) = setup();
        ids.push("unknown".into());
        assert_eq!(db.increment_usage_count(&ids).unwrap(), 2);
        assert_eq!(db.get(&ids[0]).unwrap().usage_count, 1);
    }

    #[test]
    fn test_insert_and_read_events() {
        let (db, ids) = setup();
        db.insert_events("owner-1", &ids, EventType::Recalled, None, Some("query: first")).unwrap();
        db.insert_events("owner-1", &ids[..1], EventType::Used, Some(Outcome::Positive), None)
            .unwrap();

        let events = db.events_for_memory(&ids[0]).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::Recalled);
        assert_eq!(events[0].context.as_deref(), Some("query: first"));
        assert_eq!(events[1].outcome, Some(Outcome::Positive));
        assert_eq!(db.events_for_memory(&ids[1]).unwrap().len(), 1);
    }
}
