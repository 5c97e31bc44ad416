//! Due-reminder runner — periodic scan, claim, dispatch, transition.

use std::sync::Arc;

use chrono::Utc;
use rally_core::{Payload, Result};
use rally_push::Dispatcher;
use rally_store::DocStore;
use serde::Serialize;

/// Outcome of one scan: how many reminders were dispatched and marked sent.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProcessReport {
    pub processed: usize,
}

/// Scans for due pending reminders and pushes each through the dispatcher.
pub struct ReminderRunner {
    store: Arc<DocStore>,
    dispatcher: Arc<Dispatcher>,
    batch_limit: usize,
}

impl ReminderRunner {
    pub fn new(store: Arc<DocStore>, dispatcher: Arc<Dispatcher>, batch_limit: usize) -> Self {
        Self {
            store,
            dispatcher,
            batch_limit,
        }
    }

    /// Process up to `batch_limit` due reminders. Each record is claimed
    /// before dispatch so concurrent runner instances never double-send;
    /// a record that fails moves to `failed` and the scan continues with
    /// the rest of the batch.
    pub async fn process_due(&self) -> Result<ProcessReport> {
        let due = self.store.due_reminders(Utc::now(), self.batch_limit)?;
        if due.is_empty() {
            return Ok(ProcessReport { processed: 0 });
        }

        let mut processed = 0;
        for reminder in due {
            if !self.store.claim_reminder(&reminder.id)? {
                // Another runner instance won this record.
                continue;
            }

            let body = format!("\"{}\" is coming up", reminder.event_title);
            let payload = Payload::new()
                .with("kind", "event_reminder")
                .with("event_id", reminder.event_id.as_str());

            match self
                .dispatcher
                .send_to_uids(
                    std::slice::from_ref(&reminder.uid),
                    "Event reminder",
                    &body,
                    &payload,
                    true,
                )
                .await
            {
                Ok(_) => match self.store.mark_reminder_sent(&reminder.id, Utc::now()) {
                    Ok(()) => processed += 1,
                    Err(e) => {
                        // Dispatched, but the row is stuck in `processing`.
                        // The claim keeps it from being re-sent.
                        tracing::warn!(id = %reminder.id, error = %e, "sent but status update failed");
                    }
                },
                Err(e) => {
                    tracing::warn!(id = %reminder.id, error = %e, "reminder dispatch failed");
                    if let Err(mark_err) =
                        self.store
                            .mark_reminder_failed(&reminder.id, &e.to_string(), Utc::now())
                    {
                        tracing::warn!(id = %reminder.id, error = %mark_err, "failed to record reminder failure");
                    }
                }
            }
        }
        Ok(ProcessReport { processed })
    }
}

/// Run `process_due` forever on a fixed cadence. Spawn with `tokio::spawn`.
pub async fn spawn_runner(runner: Arc<ReminderRunner>, interval_secs: u64) {
    tracing::info!(interval_secs, "⏰ reminder runner started");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    loop {
        interval.tick().await;
        match runner.process_due().await {
            Ok(report) if report.processed > 0 => {
                tracing::info!(processed = report.processed, "📣 due reminders dispatched");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "due-reminder scan failed"),
        }
    }
}
