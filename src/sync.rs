//! Run orchestration: sequences the reconciliation passes against a store.
//!
//! Every run is computed fresh from the two calendars' current content; no
//! cursor or state survives between runs. A run that dies part-way leaves
//! the calendars in a state the next run repairs toward the invariants, so
//! the whole thing is safe to re-run on a timer.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::block;
use crate::event::Event;
use crate::reconcile;
use crate::store::EventStore;

/// Safety cap on dedup rounds, in case concurrent runs keep reintroducing
/// duplicates faster than we delete them.
const MAX_DEDUP_ROUNDS: usize = 10;

/// Statistics from a reconcile run
pub struct RunStats {
    pub inserted: usize,
    pub deleted: usize,
}

/// Options for a reconcile run
pub struct RunOptions {
    /// Calendar to read busy events from
    pub source_calendar: String,
    /// Calendar block events are written to
    pub block_calendar: String,
    /// Padding applied before and after each source event
    pub buffer: Duration,
    /// Marker title block events carry
    pub block_title: String,
}

/// Fetch block events: text query on the marker, then re-filter to exact
/// title equality since the query is a substring match.
async fn fetch_blocks<S: EventStore>(
    store: &S,
    opts: &RunOptions,
    time_min: Option<DateTime<Utc>>,
    time_max: Option<DateTime<Utc>>,
) -> Result<Vec<Event>> {
    let events = store
        .list(&opts.block_calendar, time_min, time_max, Some(&opts.block_title))
        .await?;

    Ok(events
        .into_iter()
        .filter(|e| block::is_block_match(e, &opts.block_title))
        .collect())
}

/// Reconcile the block calendar against the source calendar.
///
/// Phases, in order: dedup to fixpoint, insert missing blocks, delete
/// orphaned blocks, prune past blocks. `now` is sampled once by the caller
/// and threaded through every pass.
pub async fn reconcile<S: EventStore>(
    store: &S,
    opts: &RunOptions,
    now: DateTime<Utc>,
) -> Result<RunStats> {
    let horizon = now + Duration::days(reconcile::LOOKAHEAD_DAYS);

    let mut stats = RunStats {
        inserted: 0,
        deleted: 0,
    };

    // Source events inside the lookahead window, minus anything carrying
    // the marker title (guards against two calendars pointing at each other)
    let source_events: Vec<Event> = store
        .list(&opts.source_calendar, Some(now), Some(horizon), None)
        .await?
        .into_iter()
        .filter(|e| !block::is_block_match(e, &opts.block_title))
        .collect();

    let mut blocks = fetch_blocks(store, opts, Some(now), Some(horizon)).await?;

    // Remove duplicate blocks until none remain. Identifiers shift as
    // deletions land, so the block list is re-fetched after every batch.
    for _ in 0..MAX_DEDUP_ROUNDS {
        let duplicates = reconcile::duplicate_blocks(&blocks);
        if duplicates.is_empty() {
            break;
        }

        for dup in &duplicates {
            if let Some(id) = &dup.id {
                println!("  Deleting duplicate block: {} – {}", dup.start, dup.end);
                store.delete(&opts.block_calendar, id).await?;
                stats.deleted += 1;
            }
        }

        blocks = fetch_blocks(store, opts, Some(now), Some(horizon)).await?;
    }

    // Insert missing blocks. Existence is re-checked right before each
    // insert so overlapping runs don't double-insert from stale snapshots.
    let additions =
        reconcile::missing_blocks(&source_events, &blocks, now, opts.buffer, &opts.block_title);

    for addition in &additions {
        let exists = store
            .exists_exact(
                &opts.block_calendar,
                addition.start,
                addition.end,
                &addition.summary,
            )
            .await?;

        if exists {
            println!("  Block already exists: {} – {}", addition.start, addition.end);
            continue;
        }

        println!("  Inserting block: {} – {}", addition.start, addition.end);
        store.insert(&opts.block_calendar, addition).await?;
        stats.inserted += 1;
    }

    // Orphans are judged against the same snapshot the additions used,
    // not a re-fetch
    let orphans = reconcile::orphaned_blocks(&source_events, &blocks, opts.buffer);

    for orphan in &orphans {
        if let Some(id) = &orphan.id {
            println!("  Deleting orphaned block: {} – {}", orphan.start, orphan.end);
            store.delete(&opts.block_calendar, id).await?;
            stats.deleted += 1;
        }
    }

    // Past blocks only show up with an unbounded lower fetch; a "from now"
    // query would never see them
    let all_blocks = fetch_blocks(store, opts, None, Some(horizon)).await?;
    let expired = reconcile::expired_blocks(&all_blocks, now);

    for past in &expired {
        if let Some(id) = &past.id {
            println!("  Deleting past block: {} – {}", past.start, past.end);
            store.delete(&opts.block_calendar, id).await?;
            stats.deleted += 1;
        }
    }

    Ok(stats)
}
