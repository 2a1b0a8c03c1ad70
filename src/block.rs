//! Block event construction and recognition.
//!
//! A block event is a synthetic entry marking buffer time adjacent to a
//! source event. Blocks are recognized purely by their title matching the
//! configured marker; everything here is pure and does no I/O.

use chrono::{DateTime, Duration, Utc};

use crate::event::Event;

/// Default marker title for block events
pub const DEFAULT_BLOCK_TITLE: &str = "↕";

/// Build an unsaved block event covering [start, end) with the marker title.
pub fn make_block(start: DateTime<Utc>, end: DateTime<Utc>, title: &str) -> Event {
    Event {
        id: None,
        summary: title.to_string(),
        start,
        end,
    }
}

/// True iff the event carries the marker as its exact title.
///
/// Exact equality, not substring: the text query used to fetch blocks is a
/// free-text search, so callers re-filter with this after every fetch.
pub fn is_block_match(event: &Event, title: &str) -> bool {
    event.summary == title
}

/// Canonical pre-block interval for a source event: [start − buffer, start)
pub fn pre_block_interval(event: &Event, buffer: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
    (event.start - buffer, event.start)
}

/// Canonical post-block interval for a source event: [end, end + buffer)
pub fn post_block_interval(event: &Event, buffer: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
    (event.end, event.end + buffer)
}
