//! Event-driven fan-out: organizer and attendee notifications.

use rally_core::{Payload, Result};

use crate::dispatch::{DispatchReport, Dispatcher};
use crate::resolve;

/// Why a notify call dispatched nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoOrganizer,
    NoAttendees,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoOrganizer => "no_organizer",
            SkipReason::NoAttendees => "no_attendees",
        }
    }
}

/// Result of an event-driven notify call. An empty audience is a skip, not
/// an error.
#[derive(Debug)]
pub enum NotifyOutcome {
    Sent(DispatchReport),
    Skipped(SkipReason),
}

impl Dispatcher {
    /// Tell an event's organizer that someone registered.
    pub async fn notify_organizer_registration(
        &self,
        event_id: &str,
        actor_uid: &str,
        actor_name: &str,
        event_title: &str,
    ) -> Result<NotifyOutcome> {
        let Some(organizer) = resolve::organizer_of(&self.store, event_id)? else {
            tracing::debug!(event_id, "no organizer to notify");
            return Ok(NotifyOutcome::Skipped(SkipReason::NoOrganizer));
        };

        let body = format!("{actor_name} signed up for \"{event_title}\"");
        let payload = Payload::new()
            .with("kind", "event_registration")
            .with("event_id", event_id)
            .with("actor_uid", actor_uid);
        let report = self
            .send_to_uids(&[organizer], "New event registration", &body, &payload, true)
            .await?;
        Ok(NotifyOutcome::Sent(report))
    }

    /// Tell every attendee that an event changed.
    pub async fn notify_event_change(
        &self,
        event_id: &str,
        event_title: &str,
        message: Option<&str>,
        new_date: Option<&str>,
    ) -> Result<NotifyOutcome> {
        let attendees = resolve::attendees_of(&self.store, event_id)?;
        if attendees.is_empty() {
            tracing::debug!(event_id, "no attendees to notify");
            return Ok(NotifyOutcome::Skipped(SkipReason::NoAttendees));
        }

        let body = match message {
            Some(text) => text.to_string(),
            None => format!("\"{event_title}\" was updated"),
        };
        let payload = Payload::new()
            .with("kind", "event_change")
            .with("event_id", event_id)
            .with("new_date", new_date.unwrap_or(""));
        let report = self
            .send_to_uids(&attendees, "Event update", &body, &payload, true)
            .await?;
        Ok(NotifyOutcome::Sent(report))
    }
}
