use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A calendar event with concrete start and end instants.
///
/// Date-only (all-day) events never reach this type: the store adapter
/// drops them when converting provider responses, so every event here
/// has second-precision UTC instants and exact instant equality applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Store-assigned identifier; `None` for events not yet inserted
    pub id: Option<String>,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}
