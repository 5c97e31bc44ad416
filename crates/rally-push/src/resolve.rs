//! Recipient and token resolution against the document store.
//!
//! Absence is not an error here: a missing event, an event without an
//! organizer, and a uid without a stored token all resolve to empty
//! results.

use rally_core::Result;
use rally_store::DocStore;

/// Organizer uid for an event, if both the event and the field exist.
pub fn organizer_of(store: &DocStore, event_id: &str) -> Result<Option<String>> {
    Ok(store.get_event(event_id)?.and_then(|event| event.organizer_uid))
}

/// Every registered attendee of an event. Order is not meaningful.
pub fn attendees_of(store: &DocStore, event_id: &str) -> Result<Vec<String>> {
    store.attendee_uids(event_id)
}

/// Push tokens for a uid list. Uids without a token are skipped; duplicate
/// tokens are preserved so the gateway sees one entry per registered
/// device.
pub fn tokens_for(store: &DocStore, uids: &[String]) -> Result<Vec<String>> {
    store.device_tokens_for(uids)
}
