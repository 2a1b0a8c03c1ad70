//! Pure reconciliation passes over source events and existing blocks.
//!
//! Each pass takes immutable snapshots and returns the actions to perform
//! without applying any of them. All passes are deterministic: `now` is
//! threaded in explicitly and never read from the clock, so the same inputs
//! always produce the same plan.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::block::{make_block, post_block_interval, pre_block_interval};
use crate::event::Event;

/// Source events starting this many days or more in the future are ignored
/// for block creation.
pub const LOOKAHEAD_DAYS: i64 = 90;

/// Find duplicate blocks: for every group sharing (start, end, title), the
/// first block in input order survives and the rest are returned for
/// deletion.
///
/// Identifiers shift once deletions land, so the orchestrator re-fetches and
/// re-runs this pass until it returns nothing.
pub fn duplicate_blocks(blocks: &[Event]) -> Vec<Event> {
    let mut seen: HashSet<(DateTime<Utc>, DateTime<Utc>, String)> = HashSet::new();
    let mut duplicates = Vec::new();

    for block in blocks {
        let key = (block.start, block.end, block.summary.clone());
        if !seen.insert(key) {
            duplicates.push(block.clone());
        }
    }

    duplicates
}

/// Compute the blocks that need to be inserted so every source event inside
/// the lookahead window has its canonical pre- and post-block.
///
/// Events that already started, and events starting at or beyond the 90-day
/// horizon, are skipped. Queued insertions are visible to later events in
/// the same pass, so two events sharing a canonical interval produce a
/// single insertion.
pub fn missing_blocks(
    source_events: &[Event],
    blocks: &[Event],
    now: DateTime<Utc>,
    buffer: Duration,
    title: &str,
) -> Vec<Event> {
    let horizon = now + Duration::days(LOOKAHEAD_DAYS);
    let mut queued: Vec<Event> = Vec::new();

    for event in source_events {
        if event.start <= now || event.start >= horizon {
            continue;
        }

        let intervals = [
            pre_block_interval(event, buffer),
            post_block_interval(event, buffer),
        ];

        for (start, end) in intervals {
            let present = blocks
                .iter()
                .chain(queued.iter())
                .any(|b| b.start == start && b.end == end);

            if !present {
                queued.push(make_block(start, end, title));
            }
        }
    }

    queued
}

/// Find blocks that are no longer the canonical pre- or post-block of any
/// source event.
///
/// A block relates to an event iff it exactly matches one of the two
/// canonical intervals. This pass deliberately applies no lookahead filter:
/// it judges against exactly the source set it is handed.
pub fn orphaned_blocks(source_events: &[Event], blocks: &[Event], buffer: Duration) -> Vec<Event> {
    blocks
        .iter()
        .filter(|block| {
            let related = source_events.iter().any(|event| {
                (event.start - buffer == block.start && event.start == block.end)
                    || (event.end + buffer == block.end && event.end == block.start)
            });
            !related
        })
        .cloned()
        .collect()
}

/// Find blocks whose end instant is strictly before `now`.
///
/// Only meaningful on a block list fetched with no lower time bound: a
/// "from now" query would never return the blocks this pass exists to
/// clean up.
pub fn expired_blocks(blocks: &[Event], now: DateTime<Utc>) -> Vec<Event> {
    blocks.iter().filter(|b| b.end < now).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TITLE: &str = "↕";

    fn instant(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, h, m, 0).unwrap()
    }

    fn event(id: &str, summary: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event {
            id: Some(id.to_string()),
            summary: summary.to_string(),
            start,
            end,
        }
    }

    fn block(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        event(id, TITLE, start, end)
    }

    fn buffer() -> Duration {
        Duration::minutes(30)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn duplicates_keep_first_in_input_order() {
        let blocks = vec![
            block("a", instant(1, 9, 30), instant(1, 10, 0)),
            block("b", instant(1, 9, 30), instant(1, 10, 0)),
            block("c", instant(1, 9, 30), instant(1, 10, 0)),
            block("d", instant(1, 9, 30), instant(1, 10, 0)),
        ];

        let dups = duplicate_blocks(&blocks);

        assert_eq!(dups.len(), 3);
        assert!(dups.iter().all(|d| d.id != Some("a".to_string())));
    }

    #[test]
    fn distinct_intervals_are_not_duplicates() {
        let blocks = vec![
            block("a", instant(1, 9, 30), instant(1, 10, 0)),
            block("b", instant(1, 11, 0), instant(1, 11, 30)),
        ];

        assert!(duplicate_blocks(&blocks).is_empty());
    }

    #[test]
    fn same_interval_different_title_is_not_a_duplicate() {
        let blocks = vec![
            block("a", instant(1, 9, 30), instant(1, 10, 0)),
            event("b", "Standup", instant(1, 9, 30), instant(1, 10, 0)),
        ];

        assert!(duplicate_blocks(&blocks).is_empty());
    }

    #[test]
    fn missing_blocks_pad_both_sides() {
        let source = vec![event("e1", "Meeting", instant(1, 10, 0), instant(1, 11, 0))];

        let additions = missing_blocks(&source, &[], now(), buffer(), TITLE);

        assert_eq!(additions.len(), 2);
        assert_eq!(additions[0].start, instant(1, 9, 30));
        assert_eq!(additions[0].end, instant(1, 10, 0));
        assert_eq!(additions[1].start, instant(1, 11, 0));
        assert_eq!(additions[1].end, instant(1, 11, 30));
        assert!(additions.iter().all(|b| b.summary == TITLE && b.id.is_none()));
    }

    #[test]
    fn existing_blocks_are_not_reinserted() {
        let source = vec![event("e1", "Meeting", instant(1, 10, 0), instant(1, 11, 0))];
        let blocks = vec![
            block("a", instant(1, 9, 30), instant(1, 10, 0)),
            block("b", instant(1, 11, 0), instant(1, 11, 30)),
        ];

        assert!(missing_blocks(&source, &blocks, now(), buffer(), TITLE).is_empty());
    }

    #[test]
    fn events_outside_the_window_are_skipped() {
        let reference = now();
        let past = event(
            "past",
            "Already started",
            reference - Duration::hours(1),
            reference + Duration::hours(1),
        );
        let at_now = event(
            "at-now",
            "Starts exactly now",
            reference,
            reference + Duration::hours(1),
        );
        let beyond = event(
            "far",
            "Beyond horizon",
            reference + Duration::days(LOOKAHEAD_DAYS),
            reference + Duration::days(LOOKAHEAD_DAYS) + Duration::hours(1),
        );

        let additions = missing_blocks(&[past, at_now, beyond], &[], reference, buffer(), TITLE);

        assert!(additions.is_empty());
    }

    #[test]
    fn shared_interval_between_two_events_is_inserted_once() {
        // e1's post-block and e2's pre-block are the same [11:00, 11:30)
        let source = vec![
            event("e1", "First", instant(1, 10, 0), instant(1, 11, 0)),
            event("e2", "Second", instant(1, 11, 30), instant(1, 12, 30)),
        ];

        let additions = missing_blocks(&source, &[], now(), buffer(), TITLE);

        let shared: Vec<_> = additions
            .iter()
            .filter(|b| b.start == instant(1, 11, 0) && b.end == instant(1, 11, 30))
            .collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(additions.len(), 3);
    }

    #[test]
    fn related_blocks_survive_orphan_pass() {
        let source = vec![event("e1", "Meeting", instant(1, 10, 0), instant(1, 11, 0))];
        let blocks = vec![
            block("pre", instant(1, 9, 30), instant(1, 10, 0)),
            block("post", instant(1, 11, 0), instant(1, 11, 30)),
        ];

        assert!(orphaned_blocks(&source, &blocks, buffer()).is_empty());
    }

    #[test]
    fn unrelated_blocks_are_orphaned() {
        let source = vec![event("e1", "Meeting", instant(1, 10, 0), instant(1, 11, 0))];
        // Off by one minute on each side of what would be canonical
        let blocks = vec![
            block("skewed", instant(1, 9, 31), instant(1, 10, 0)),
            block("stray", instant(2, 14, 0), instant(2, 14, 30)),
        ];

        let orphans = orphaned_blocks(&source, &blocks, buffer());

        assert_eq!(orphans.len(), 2);
    }

    #[test]
    fn orphan_pass_removes_everything_when_source_is_empty() {
        let blocks = vec![
            block("pre", instant(1, 9, 30), instant(1, 10, 0)),
            block("post", instant(1, 11, 0), instant(1, 11, 30)),
        ];

        let orphans = orphaned_blocks(&[], &blocks, buffer());

        assert_eq!(orphans.len(), 2);
    }

    #[test]
    fn expired_boundary_is_strict() {
        let reference = now();
        let blocks = vec![
            block(
                "just-past",
                reference - Duration::minutes(30) - Duration::seconds(1),
                reference - Duration::seconds(1),
            ),
            block(
                "just-ahead",
                reference - Duration::minutes(30) + Duration::seconds(1),
                reference + Duration::seconds(1),
            ),
            block(
                "ends-at-now",
                reference - Duration::minutes(30),
                reference,
            ),
        ];

        let expired = expired_blocks(&blocks, reference);

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, Some("just-past".to_string()));
    }
}
