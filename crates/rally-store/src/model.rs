//! Stored record types for the rally collections.

use chrono::{DateTime, Utc};
use rally_core::Payload;
use serde::{Deserialize, Serialize};

/// A persisted notification — one per recipient per dispatch attempt.
/// Immutable after creation except `read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub uid: String,
    pub title: String,
    pub body: String,
    pub payload: Payload,
    pub read: bool,
    pub sent_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Create a fresh unread record stamped with the current time.
    pub fn new(uid: &str, title: &str, body: &str, payload: &Payload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            uid: uid.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            payload: payload.clone(),
            read: false,
            sent_at: Utc::now(),
        }
    }
}

/// Reminder lifecycle status. `processing` is the transient claim state
/// between selection and the terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Processing => "processing",
            ReminderStatus::Sent => "sent",
            ReminderStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "processing" => ReminderStatus::Processing,
            "sent" => ReminderStatus::Sent,
            "failed" => ReminderStatus::Failed,
            _ => ReminderStatus::Pending,
        }
    }
}

/// A scheduled reminder row. Seeded in bulk as `pending`; the runner moves
/// each row through `processing` to `sent` or `failed`, never back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: String,
    pub uid: String,
    pub event_id: String,
    pub event_title: String,
    pub send_at: DateTime<Utc>,
    pub status: ReminderStatus,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReminderRecord {
    /// Create a new pending reminder.
    pub fn pending(uid: &str, event_id: &str, event_title: &str, send_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            uid: uid.to_string(),
            event_id: event_id.to_string(),
            event_title: event_title.to_string(),
            send_at,
            status: ReminderStatus::Pending,
            created_at: Utc::now(),
            sent_at: None,
            error: None,
            updated_at: None,
        }
    }
}

/// An event row. Written by the wider platform; read-only in this service.
/// Attendances and device tokens stay at the row level — the store hands
/// out uid and token lists directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub title: String,
    pub organizer_uid: Option<String>,
}
