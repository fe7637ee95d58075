//! Local task records.
//!
//! A [`Task`] is a [`TaskDraft`] that has been given an id and a
//! [`SyncState`]. The sync state carries the remote event id, so a task can
//! never claim to be synced without one.

mod store;

pub use store::{TaskStore, DEFAULT_BREAK_KEY, DEFAULT_BREAK_MINUTES, TASKS_KEY};

use chrono::{NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::schedule::ClockTime;

/// How long a claim holds a task before another sweep may take it over.
///
/// Claims are persisted so that separate processes see them; a claim left
/// behind by a crashed run expires after this long.
pub const CLAIM_LEASE_MS: i64 = 10 * 60 * 1000;

/// Remote sync lifecycle of a single task.
///
///   Idle ──claim──> Pending ──ok──> Synced { event_id }
///    ^                 |
///    |                 +──error──> Failed { reason } ──claim──> Pending
///    +──released (batch aborted before this task)──+
///
/// `Synced` is terminal for the sync engine: nothing moves a task out of it
/// except removal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    Pending { claimed_at_ms: i64 },
    Synced { event_id: String },
    Failed { reason: String },
}

impl SyncState {
    /// Whether a sweep running at `now_ms` may pick this task up.
    pub fn is_eligible_at(&self, now_ms: i64) -> bool {
        match self {
            SyncState::Idle | SyncState::Failed { .. } => true,
            SyncState::Pending { claimed_at_ms } => now_ms - claimed_at_ms >= CLAIM_LEASE_MS,
            SyncState::Synced { .. } => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SyncState::Pending { .. })
    }
}

/// A task before it is stored: no id, no sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// On-calendar span in minutes.
    pub duration: u32,
    /// Gap after this task before the next one in the same batch.
    #[serde(default)]
    pub break_after: u32,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub calendar_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_color: Option<String>,
}

impl TaskDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        Ok(())
    }

    /// Wall-clock end, wrapping at midnight.
    pub fn end_time(&self) -> ClockTime {
        self.start_time.wrapping_add(u64::from(self.duration))
    }
}

/// A stored task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TaskRecord", into = "TaskRecord")]
pub struct Task {
    pub id: String,
    pub draft: TaskDraft,
    pub sync: SyncState,
}

impl Task {
    pub fn from_draft(id: impl Into<String>, draft: TaskDraft) -> Self {
        Self {
            id: id.into(),
            draft,
            sync: SyncState::Idle,
        }
    }

    pub fn title(&self) -> &str {
        &self.draft.title
    }

    pub fn synced(&self) -> bool {
        matches!(self.sync, SyncState::Synced { .. })
    }

    pub fn remote_event_id(&self) -> Option<&str> {
        match &self.sync {
            SyncState::Synced { event_id } => Some(event_id),
            _ => None,
        }
    }

    pub fn last_sync_error(&self) -> Option<&str> {
        match &self.sync {
            SyncState::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// On-disk shape of a task: flat `synced` flag plus the event id, matching
/// the JSON the task list has always been persisted in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRecord {
    id: String,
    #[serde(flatten)]
    draft: TaskDraft,
    #[serde(default)]
    synced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    google_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sync_error: Option<String>,
    /// Set while a sweep holds the task, epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    claimed_at: Option<i64>,
}

impl From<TaskRecord> for Task {
    fn from(record: TaskRecord) -> Self {
        let sync = match (
            record.synced,
            record.google_event_id,
            record.sync_error,
            record.claimed_at,
        ) {
            (true, Some(event_id), _, _) => SyncState::Synced { event_id },
            (_, _, _, Some(claimed_at_ms)) => SyncState::Pending { claimed_at_ms },
            (_, _, Some(reason), _) => SyncState::Failed { reason },
            _ => SyncState::Idle,
        };
        Task {
            id: record.id,
            draft: record.draft,
            sync,
        }
    }
}

impl From<Task> for TaskRecord {
    fn from(task: Task) -> Self {
        let (synced, google_event_id, sync_error, claimed_at) = match task.sync {
            SyncState::Synced { event_id } => (true, Some(event_id), None, None),
            SyncState::Failed { reason } => (false, None, Some(reason), None),
            SyncState::Pending { claimed_at_ms } => (false, None, None, Some(claimed_at_ms)),
            SyncState::Idle => (false, None, None, None),
        };
        TaskRecord {
            id: task.id,
            draft: task.draft,
            synced,
            google_event_id,
            sync_error,
            claimed_at,
        }
    }
}

const ID_SUFFIX_LEN: usize = 7;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a local task id: epoch millis followed by a random base36 suffix.
pub fn generate_task_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}{}", Utc::now().timestamp_millis(), suffix)
}
