//! Event Tracker
//!
//! Usage logging and outcome feedback for memory items. Events are an
//! append-only log; counters on the items are the aggregated view. The two
//! are written by separate calls so callers decide whether feedback is also
//! worth an event row.

use crate::SDKResult;
use mnemos_core::types::{EventType, Outcome};
use mnemos_core::Database;
use std::sync::Arc;
use tracing::debug;

/// Records how memory items are used
#[derive(Clone)]
pub struct EventTracker {
    db: Arc<Database>,
}

impl EventTracker {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one event per id; returns the number of events written
    pub async fn log_usage(
        &self,
        owner_id: &str,
        memory_ids: &[String],
        event_type: EventType,
        outcome: Option<Outcome>,
        context: Option<&str>,
    ) -> SDKResult<usize> {
        let written = self
            .db
            .insert_events(owner_id, memory_ids, event_type, outcome, context)?;
        debug!(owner_id, event_type = %event_type, written, "usage logged");
        Ok(written)
    }

    /// Add one to each item's usage count; unknown ids are ignored
    pub async fn increment_usage_count(&self, memory_ids: &[String]) -> SDKResult<usize> {
        Ok(self.db.increment_usage_count(memory_ids)?)
    }

    /// Fold an outcome into the item counters
    ///
    /// Positive and negative each bump their own counter; neutral changes
    /// nothing and returns 0.
    pub async fn record_outcome(&self, memory_ids: &[String], outcome: Outcome) -> SDKResult<usize> {
        let touched = self.db.record_outcome(memory_ids, outcome)?;
        debug!(outcome = %outcome, touched, "outcome recorded");
        Ok(touched)
    }
}
