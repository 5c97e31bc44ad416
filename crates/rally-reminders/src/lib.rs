//! # Rally Reminders
//!
//! Reminder scheduling and due-reminder dispatch. Seeding computes a
//! future send-at ladder for an event and writes pending rows in one
//! atomic batch; the runner scans for due rows on a fixed cadence, pushes
//! each one through the notification dispatcher, and tracks per-record
//! status.

pub mod runner;
pub mod schedule;

pub use runner::{ProcessReport, ReminderRunner, spawn_runner};
pub use schedule::{SeedOutcome, SeedRequest, reminder_times, seed_event_reminders};
