//! Google Calendar synchronization layer.
//!
//! Pushes local tasks to Google Calendar one event at a time. A failed
//! event does not stop the batch; a rejected token does.

pub mod engine;
pub mod types;

#[cfg(test)]
mod engine_tests;

pub use engine::{build_event_request, sync_pending, CalendarSyncEngine};
pub use types::{SyncError, SyncOutcome, SyncReport};
