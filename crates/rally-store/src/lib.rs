//! # Rally Store
//!
//! SQLite-backed document store for the rally service — one database file,
//! one table per collection: users (device tokens), events, attendances,
//! notifications, reminders.
//!
//! The connection lives behind an in-process mutex; WAL mode keeps
//! concurrent readers cheap. Schema migration runs on open. Timestamps are
//! stored as UTC RFC 3339 text with a uniform millisecond format so
//! lexicographic comparison in SQL matches chronological order.

pub mod model;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rally_core::{RallyError, Result};
use rusqlite::{Connection, OptionalExtension, params};

pub use model::{EventRecord, NotificationRecord, ReminderRecord, ReminderStatus};

/// Document store — owns the SQLite handle for every collection.
pub struct DocStore {
    conn: Mutex<Connection>,
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl DocStore {
    /// Open or create the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| RallyError::Storage(format!("open {}: {e}", path.display())))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store for tests and local experiments.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RallyError::Storage(format!("open :memory:: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RallyError::Storage(format!("lock: {e}")))
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                uid TEXT PRIMARY KEY,
                push_token TEXT NOT NULL,
                token_updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                organizer_uid TEXT
            );

            CREATE TABLE IF NOT EXISTS attendances (
                event_id TEXT NOT NULL,
                uid TEXT NOT NULL,
                PRIMARY KEY (event_id, uid)
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                uid TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                payload TEXT NOT NULL DEFAULT '{}',
                read INTEGER NOT NULL DEFAULT 0,
                sent_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_uid_sent
                ON notifications (uid, sent_at DESC, id DESC);

            CREATE TABLE IF NOT EXISTS reminders (
                id TEXT PRIMARY KEY,
                uid TEXT NOT NULL,
                event_id TEXT NOT NULL,
                event_title TEXT NOT NULL,
                send_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                sent_at TEXT,
                error TEXT,
                updated_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_reminders_due
                ON reminders (status, send_at);
            ",
        )
        .map_err(|e| RallyError::Storage(format!("migration: {e}")))?;
        Ok(())
    }

    // ─── Users / device tokens ──────────────────────────────

    /// Register or replace a user's push token.
    pub fn upsert_device_token(&self, uid: &str, token: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (uid, push_token, token_updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(uid) DO UPDATE SET push_token = ?2, token_updated_at = ?3",
            params![uid, token, fmt_ts(Utc::now())],
        )
        .map_err(|e| RallyError::Storage(format!("upsert token: {e}")))?;
        Ok(())
    }

    /// Device tokens for a uid list, in input order. Uids with no stored
    /// token are skipped; duplicate tokens are preserved as-is.
    pub fn device_tokens_for(&self, uids: &[String]) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT push_token FROM users WHERE uid = ?1")
            .map_err(|e| RallyError::Storage(format!("prepare token query: {e}")))?;

        let mut tokens = Vec::new();
        for uid in uids {
            let found: Option<String> = stmt
                .query_row([uid.as_str()], |row| row.get(0))
                .optional()
                .map_err(|e| RallyError::Storage(format!("token query: {e}")))?;
            if let Some(token) = found
                && !token.is_empty()
            {
                tokens.push(token);
            }
        }
        Ok(tokens)
    }

    // ─── Events & attendances (written by the wider platform) ─────

    pub fn put_event(&self, event: &EventRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO events (id, title, organizer_uid) VALUES (?1, ?2, ?3)",
            params![event.id, event.title, event.organizer_uid],
        )
        .map_err(|e| RallyError::Storage(format!("put event: {e}")))?;
        Ok(())
    }

    pub fn get_event(&self, id: &str) -> Result<Option<EventRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, title, organizer_uid FROM events WHERE id = ?1",
            [id],
            |row| {
                Ok(EventRecord {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    organizer_uid: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| RallyError::Storage(format!("get event: {e}")))
    }

    pub fn add_attendance(&self, event_id: &str, uid: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO attendances (event_id, uid) VALUES (?1, ?2)",
            params![event_id, uid],
        )
        .map_err(|e| RallyError::Storage(format!("add attendance: {e}")))?;
        Ok(())
    }

    /// Every registered attendee of an event. Empty when none.
    pub fn attendee_uids(&self, event_id: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT uid FROM attendances WHERE event_id = ?1")
            .map_err(|e| RallyError::Storage(format!("prepare attendance query: {e}")))?;
        let rows = stmt
            .query_map([event_id], |row| row.get::<_, String>(0))
            .map_err(|e| RallyError::Storage(format!("attendance query: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| RallyError::Storage(format!("attendance rows: {e}")))
    }

    // ─── Notifications ──────────────────────────────────────

    pub fn insert_notification(&self, rec: &NotificationRecord) -> Result<()> {
        let payload = serde_json::to_string(&rec.payload)
            .map_err(|e| RallyError::Storage(format!("serialize payload: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO notifications (id, uid, title, body, payload, read, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                rec.id,
                rec.uid,
                rec.title,
                rec.body,
                payload,
                rec.read as i32,
                fmt_ts(rec.sent_at),
            ],
        )
        .map_err(|e| RallyError::Storage(format!("insert notification: {e}")))?;
        Ok(())
    }

    /// One page of a user's notifications, newest first. `before` is a
    /// record id marking the exclusive start of the page; an unknown id
    /// falls back to the first page.
    pub fn notifications_for(
        &self,
        uid: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<NotificationRecord>> {
        let conn = self.lock()?;

        let cursor: Option<(String, String)> = match before {
            Some(id) => conn
                .query_row(
                    "SELECT id, sent_at FROM notifications WHERE id = ?1",
                    [id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| RallyError::Storage(format!("cursor lookup: {e}")))?,
            None => None,
        };
        let (cursor_id, cursor_ts) = match cursor {
            Some((id, ts)) => (Some(id), Some(ts)),
            None => (None, None),
        };

        let mut stmt = conn
            .prepare(
                "SELECT id, uid, title, body, payload, read, sent_at
                   FROM notifications
                  WHERE uid = ?1
                    AND (?2 IS NULL OR sent_at < ?3 OR (sent_at = ?3 AND id < ?2))
                  ORDER BY sent_at DESC, id DESC
                  LIMIT ?4",
            )
            .map_err(|e| RallyError::Storage(format!("prepare notification query: {e}")))?;
        let rows = stmt
            .query_map(
                params![uid, cursor_id, cursor_ts, limit as i64],
                notification_from_row,
            )
            .map_err(|e| RallyError::Storage(format!("notification query: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| RallyError::Storage(format!("notification rows: {e}")))
    }

    // ─── Reminders ──────────────────────────────────────────

    /// Write a seeding batch in one transaction — all rows become visible
    /// together or none do.
    pub fn insert_reminders(&self, recs: &[ReminderRecord]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| RallyError::Storage(format!("begin reminder batch: {e}")))?;
        for rec in recs {
            tx.execute(
                "INSERT INTO reminders
                 (id, uid, event_id, event_title, send_at, status, created_at, sent_at, error, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    rec.id,
                    rec.uid,
                    rec.event_id,
                    rec.event_title,
                    fmt_ts(rec.send_at),
                    rec.status.as_str(),
                    fmt_ts(rec.created_at),
                    rec.sent_at.map(fmt_ts),
                    rec.error,
                    rec.updated_at.map(fmt_ts),
                ],
            )
            .map_err(|e| RallyError::Storage(format!("insert reminder: {e}")))?;
        }
        tx.commit()
            .map_err(|e| RallyError::Storage(format!("commit reminder batch: {e}")))?;
        Ok(())
    }

    /// Pending reminders due at or before `now`, up to `limit`. No ordering
    /// guarantee beyond eligibility.
    pub fn due_reminders(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ReminderRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, uid, event_id, event_title, send_at, status,
                        created_at, sent_at, error, updated_at
                   FROM reminders
                  WHERE status = 'pending' AND send_at <= ?1
                  LIMIT ?2",
            )
            .map_err(|e| RallyError::Storage(format!("prepare due query: {e}")))?;
        let rows = stmt
            .query_map(params![fmt_ts(now), limit as i64], reminder_from_row)
            .map_err(|e| RallyError::Storage(format!("due query: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| RallyError::Storage(format!("due rows: {e}")))
    }

    /// Atomically claim a reminder for processing. The conditional update
    /// succeeds for exactly one caller; everyone else sees `false`.
    pub fn claim_reminder(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE reminders SET status = 'processing', updated_at = ?1
                  WHERE id = ?2 AND status = 'pending'",
                params![fmt_ts(Utc::now()), id],
            )
            .map_err(|e| RallyError::Storage(format!("claim reminder: {e}")))?;
        Ok(changed == 1)
    }

    pub fn mark_reminder_sent(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE reminders SET status = 'sent', sent_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![fmt_ts(at), id],
        )
        .map_err(|e| RallyError::Storage(format!("mark sent: {e}")))?;
        Ok(())
    }

    pub fn mark_reminder_failed(&self, id: &str, error: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE reminders SET status = 'failed', error = ?1, updated_at = ?2 WHERE id = ?3",
            params![error, fmt_ts(at), id],
        )
        .map_err(|e| RallyError::Storage(format!("mark failed: {e}")))?;
        Ok(())
    }

    pub fn get_reminder(&self, id: &str) -> Result<Option<ReminderRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, uid, event_id, event_title, send_at, status,
                    created_at, sent_at, error, updated_at
               FROM reminders WHERE id = ?1",
            [id],
            reminder_from_row,
        )
        .optional()
        .map_err(|e| RallyError::Storage(format!("get reminder: {e}")))
    }
}

fn notification_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRecord> {
    let payload_str: String = row.get(4)?;
    let sent_at_str: String = row.get(6)?;
    Ok(NotificationRecord {
        id: row.get(0)?,
        uid: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        payload: serde_json::from_str(&payload_str).unwrap_or_default(),
        read: row.get::<_, i32>(5)? != 0,
        sent_at: parse_ts(&sent_at_str),
    })
}

fn reminder_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReminderRecord> {
    let send_at_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let created_at_str: String = row.get(6)?;
    let sent_at_str: Option<String> = row.get(7)?;
    let updated_at_str: Option<String> = row.get(9)?;
    Ok(ReminderRecord {
        id: row.get(0)?,
        uid: row.get(1)?,
        event_id: row.get(2)?,
        event_title: row.get(3)?,
        send_at: parse_ts(&send_at_str),
        status: ReminderStatus::parse(&status_str),
        created_at: parse_ts(&created_at_str),
        sent_at: sent_at_str.as_deref().map(parse_ts),
        error: row.get(8)?,
        updated_at: updated_at_str.as_deref().map(parse_ts),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rally_core::Payload;

    fn store() -> DocStore {
        DocStore::open_in_memory().unwrap()
    }

    #[test]
    fn open_on_disk_and_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocStore::open(&dir.path().join("rally.db")).unwrap();
        assert!(store.device_tokens_for(&["u1".into()]).unwrap().is_empty());
    }

    #[test]
    fn token_upsert_replaces() {
        let store = store();
        store.upsert_device_token("u1", "tok-a").unwrap();
        store.upsert_device_token("u1", "tok-b").unwrap();
        let tokens = store.device_tokens_for(&["u1".into()]).unwrap();
        assert_eq!(tokens, vec!["tok-b"]);
    }

    #[test]
    fn tokens_skip_missing_and_keep_duplicates() {
        let store = store();
        store.upsert_device_token("u1", "tok-shared").unwrap();
        store.upsert_device_token("u2", "tok-shared").unwrap();
        let tokens = store
            .device_tokens_for(&["u1".into(), "ghost".into(), "u2".into()])
            .unwrap();
        assert_eq!(tokens, vec!["tok-shared", "tok-shared"]);
    }

    #[test]
    fn event_and_attendance_roundtrip() {
        let store = store();
        store
            .put_event(&EventRecord {
                id: "evt-1".into(),
                title: "Launch party".into(),
                organizer_uid: Some("org-1".into()),
            })
            .unwrap();
        store.add_attendance("evt-1", "u1").unwrap();
        store.add_attendance("evt-1", "u2").unwrap();
        store.add_attendance("evt-1", "u2").unwrap();

        let event = store.get_event("evt-1").unwrap().unwrap();
        assert_eq!(event.organizer_uid.as_deref(), Some("org-1"));
        let mut uids = store.attendee_uids("evt-1").unwrap();
        uids.sort();
        assert_eq!(uids, vec!["u1", "u2"]);
        assert!(store.get_event("nope").unwrap().is_none());
        assert!(store.attendee_uids("empty-evt").unwrap().is_empty());
    }

    fn notification_at(uid: &str, title: &str, sent_at: DateTime<Utc>) -> NotificationRecord {
        let mut rec = NotificationRecord::new(uid, title, "body", &Payload::new());
        rec.sent_at = sent_at;
        rec
    }

    #[test]
    fn notifications_page_newest_first_with_cursor() {
        let store = store();
        let base = Utc::now();
        let oldest = notification_at("u1", "first", base - Duration::minutes(3));
        let middle = notification_at("u1", "second", base - Duration::minutes(2));
        let newest = notification_at("u1", "third", base - Duration::minutes(1));
        let other = notification_at("u2", "noise", base);
        for rec in [&oldest, &middle, &newest, &other] {
            store.insert_notification(rec).unwrap();
        }

        let page = store.notifications_for("u1", 2, None).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].title, "third");
        assert_eq!(page[1].title, "second");

        let next = store
            .notifications_for("u1", 2, Some(page[1].id.as_str()))
            .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].title, "first");

        // Unknown cursor falls back to the first page.
        let fallback = store.notifications_for("u1", 10, Some("missing")).unwrap();
        assert_eq!(fallback.len(), 3);
    }

    fn due_reminder(uid: &str) -> ReminderRecord {
        let mut rec = ReminderRecord::pending(uid, "evt-1", "Launch party", Utc::now());
        rec.send_at = Utc::now() - Duration::minutes(5);
        rec
    }

    #[test]
    fn due_selection_respects_limit_and_eligibility() {
        let store = store();
        let mut recs: Vec<ReminderRecord> = (0..5).map(|i| due_reminder(&format!("u{i}"))).collect();
        // One future reminder must never be selected.
        let mut future = ReminderRecord::pending("u9", "evt-1", "Launch party", Utc::now());
        future.send_at = Utc::now() + Duration::hours(1);
        recs.push(future);
        store.insert_reminders(&recs).unwrap();

        let due = store.due_reminders(Utc::now(), 2).unwrap();
        assert_eq!(due.len(), 2);
        let all_due = store.due_reminders(Utc::now(), 50).unwrap();
        assert_eq!(all_due.len(), 5);
    }

    #[test]
    fn claim_succeeds_exactly_once() {
        let store = store();
        let rec = due_reminder("u1");
        store.insert_reminders(std::slice::from_ref(&rec)).unwrap();

        assert!(store.claim_reminder(&rec.id).unwrap());
        assert!(!store.claim_reminder(&rec.id).unwrap());
        let loaded = store.get_reminder(&rec.id).unwrap().unwrap();
        assert_eq!(loaded.status, ReminderStatus::Processing);
    }

    #[test]
    fn terminal_states_are_never_reselected() {
        let store = store();
        let sent = due_reminder("u1");
        let failed = due_reminder("u2");
        store
            .insert_reminders(&[sent.clone(), failed.clone()])
            .unwrap();

        store.mark_reminder_sent(&sent.id, Utc::now()).unwrap();
        store
            .mark_reminder_failed(&failed.id, "gateway down", Utc::now())
            .unwrap();

        assert!(store.due_reminders(Utc::now(), 50).unwrap().is_empty());
        let failed = store.get_reminder(&failed.id).unwrap().unwrap();
        assert_eq!(failed.status, ReminderStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("gateway down"));
        assert!(failed.updated_at.is_some());
    }

    #[test]
    fn reminder_batch_roundtrips_fields() {
        let store = store();
        let rec = ReminderRecord::pending("u1", "evt-9", "Demo day", Utc::now());
        store.insert_reminders(std::slice::from_ref(&rec)).unwrap();
        let loaded = store.get_reminder(&rec.id).unwrap().unwrap();
        assert_eq!(loaded.uid, "u1");
        assert_eq!(loaded.event_id, "evt-9");
        assert_eq!(loaded.event_title, "Demo day");
        assert_eq!(loaded.status, ReminderStatus::Pending);
        assert!(loaded.sent_at.is_none());
        assert!(loaded.error.is_none());
    }
}
