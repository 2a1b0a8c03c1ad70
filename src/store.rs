//! The event store seam between the reconciler and a calendar backend.
//!
//! The orchestrator works exclusively through this trait; the Google
//! implementation lives in `providers::gcal`, and tests drive the same
//! orchestrator with an in-memory store.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::event::Event;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// List events overlapping the given window, ordered by start ascending.
    ///
    /// Recurring events come back expanded to single occurrences, and
    /// date-only (all-day) events are excluded. `query` is a free-text
    /// match, not an exact filter: callers that need exact titles must
    /// re-check equality on the results.
    async fn list(
        &self,
        calendar_id: &str,
        time_min: Option<DateTime<Utc>>,
        time_max: Option<DateTime<Utc>>,
        query: Option<&str>,
    ) -> Result<Vec<Event>>;

    /// Insert an event and return it with its store-assigned identifier.
    async fn insert(&self, calendar_id: &str, event: &Event) -> Result<Event>;

    /// Delete an event by identifier.
    ///
    /// Deleting an identifier that no longer exists succeeds: a concurrent
    /// or earlier partial run may already have removed it, and the
    /// reconciler's safety under double-runs depends on that being harmless.
    async fn delete(&self, calendar_id: &str, event_id: &str) -> Result<()>;

    /// True iff an event with exactly this (start, end, title) exists.
    async fn exists_exact(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        title: &str,
    ) -> Result<bool>;
}
