//! Reminder ladder computation and bulk seeding.

use chrono::{DateTime, Datelike, Duration, Local, TimeZone, Utc};
use rally_core::Result;
use rally_store::{DocStore, ReminderRecord};
use serde::{Deserialize, Serialize};

/// Local hour production-mode reminders anchor to.
pub const ANCHOR_HOUR: u32 = 9;
/// Default spacing between production-mode reminders.
pub const DEFAULT_INTERVAL_DAYS: i64 = 3;
/// Test mode always emits this many timestamps.
const TEST_MODE_COUNT: i64 = 6;

/// Seeding input for one event.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedRequest {
    pub uid: String,
    pub event_id: String,
    pub event_title: String,
    pub event_date: DateTime<Utc>,
    pub interval_days: Option<i64>,
    pub test_every_minutes: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SeedOutcome {
    pub created: usize,
}

/// Compute the send-at ladder for an event.
///
/// Test mode (`test_every_minutes > 0`): exactly six timestamps at
/// `now + k * test_every_minutes` minutes, k = 1..6.
///
/// Production mode: start from today's [`ANCHOR_HOUR`] (next day if that
/// instant is already past), step by `interval_days`, emitting while
/// strictly before `event − 1 day`; then one final entry at
/// `event − 2 hours` if that is still ahead of `now`. An event already
/// inside the two-hour window gets no final entry, and possibly no
/// entries at all.
pub fn reminder_times<Tz: TimeZone>(
    now: DateTime<Tz>,
    event: DateTime<Tz>,
    interval_days: i64,
    test_every_minutes: Option<i64>,
) -> Vec<DateTime<Tz>> {
    if let Some(step) = test_every_minutes.filter(|m| *m > 0) {
        return (1..=TEST_MODE_COUNT)
            .map(|k| now.clone() + Duration::minutes(k * step))
            .collect();
    }

    let mut out = Vec::new();
    // A zero or negative interval would never advance the cursor.
    let interval = interval_days.max(1);
    let cutoff = event.clone() - Duration::days(1);

    // A 09:00 that falls inside a DST gap has no local representation;
    // skip the ladder rather than guess.
    let anchor = now
        .timezone()
        .with_ymd_and_hms(now.year(), now.month(), now.day(), ANCHOR_HOUR, 0, 0)
        .earliest();
    if let Some(anchor) = anchor {
        let mut cursor = if anchor <= now {
            anchor + Duration::days(1)
        } else {
            anchor
        };
        while cursor < cutoff {
            out.push(cursor.clone());
            cursor = cursor + Duration::days(interval);
        }
    }

    let last_call = event - Duration::hours(2);
    if last_call > now {
        out.push(last_call);
    }
    out
}

/// Seed pending reminder rows for an event. All rows are written in a
/// single transaction.
pub fn seed_event_reminders(store: &DocStore, req: &SeedRequest) -> Result<SeedOutcome> {
    let now = Local::now();
    let times = reminder_times(
        now,
        req.event_date.with_timezone(&Local),
        req.interval_days.unwrap_or(DEFAULT_INTERVAL_DAYS),
        req.test_every_minutes,
    );

    let records: Vec<ReminderRecord> = times
        .iter()
        .map(|t| {
            ReminderRecord::pending(
                &req.uid,
                &req.event_id,
                &req.event_title,
                t.with_timezone(&Utc),
            )
        })
        .collect();
    store.insert_reminders(&records)?;

    tracing::info!(
        event_id = %req.event_id,
        created = records.len(),
        "reminders seeded"
    );
    Ok(SeedOutcome {
        created: records.len(),
    })
}
