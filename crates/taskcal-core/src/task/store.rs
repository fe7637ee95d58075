//! Authoritative local task collection.
//!
//! Every mutation takes the backend lock, re-reads the persisted list, applies
//! the change by task id and rewrites the full collection, so several
//! processes can share one data directory without dropping each other's
//! writes.

use std::collections::HashSet;

use chrono::Utc;

use crate::auth::AuthSession;
use crate::calendar::CalendarApi;
use crate::error::{ApiError, CoreError, StoreError};
use crate::storage::KeyValueStore;
use crate::sync::SyncReport;

use super::{generate_task_id, SyncState, Task, TaskDraft};

pub const TASKS_KEY: &str = "tasks";
pub const DEFAULT_BREAK_KEY: &str = "defaultBreakTime";
pub const DEFAULT_BREAK_MINUTES: u32 = 15;

/// Ordered task list plus the default break preference.
pub struct TaskStore<S: KeyValueStore> {
    backend: S,
    tasks: Vec<Task>,
    default_break: u32,
}

fn load_tasks<S: KeyValueStore>(backend: &S) -> Result<Vec<Task>, StoreError> {
    match backend.get(TASKS_KEY)? {
        Some(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            key: TASKS_KEY.to_string(),
            source,
        }),
        None => Ok(Vec::new()),
    }
}

impl<S: KeyValueStore> TaskStore<S> {
    /// Load tasks and the default break from `backend`.
    pub fn open(backend: S) -> Result<Self, StoreError> {
        let tasks = load_tasks(&backend)?;
        let default_break = match backend.get(DEFAULT_BREAK_KEY)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                key: DEFAULT_BREAK_KEY.to_string(),
                source,
            })?,
            None => DEFAULT_BREAK_MINUTES,
        };
        tracing::debug!(count = tasks.len(), default_break, "task store loaded");

        Ok(Self {
            backend,
            tasks,
            default_break,
        })
    }

    /// Re-read the task list written by other handles on the same backend.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        self.tasks = load_tasks(&self.backend)?;
        Ok(())
    }

    /// Locked read-modify-write over the persisted list.
    ///
    /// `apply` returns its result and whether anything changed; unchanged
    /// lists are not rewritten.
    fn update<T>(&mut self, apply: impl FnOnce(&mut Vec<Task>) -> (T, bool)) -> Result<T, StoreError> {
        let _lock = self.backend.lock()?;
        self.tasks = load_tasks(&self.backend)?;
        let (out, changed) = apply(&mut self.tasks);
        if changed {
            let raw = serde_json::to_string(&self.tasks)?;
            self.backend.set(TASKS_KEY, &raw)?;
        }
        Ok(out)
    }

    /// Store a single draft with a fresh id.
    pub fn add(&mut self, draft: TaskDraft) -> Result<Task, StoreError> {
        draft.validate()?;
        let task = Task::from_draft(generate_task_id(), draft);
        self.update(|tasks| {
            tasks.push(task.clone());
            (task, true)
        })
    }

    /// Store several drafts in order, persisting once.
    ///
    /// Every draft is validated first; one bad draft stores nothing.
    pub fn add_batch(&mut self, drafts: Vec<TaskDraft>) -> Result<Vec<Task>, StoreError> {
        for draft in &drafts {
            draft.validate()?;
        }
        let added: Vec<Task> = drafts
            .into_iter()
            .map(|draft| Task::from_draft(generate_task_id(), draft))
            .collect();
        self.update(|tasks| {
            tasks.extend(added.iter().cloned());
            (added, true)
        })
    }

    /// Delete by id. Returns the removed task; absent ids are a no-op.
    pub fn remove(&mut self, id: &str) -> Result<Option<Task>, StoreError> {
        self.update(|tasks| match tasks.iter().position(|t| t.id == id) {
            Some(pos) => (Some(tasks.remove(pos)), true),
            None => (None, false),
        })
    }

    /// Delete by id, removing the remote event first when the task was synced.
    ///
    /// A remote 404/410 means the event is already gone and is not an error.
    /// Any other remote failure leaves the local task in place.
    pub async fn remove_with_remote<A: CalendarApi + ?Sized>(
        &mut self,
        id: &str,
        api: &A,
        session: &AuthSession,
    ) -> Result<Option<Task>, CoreError> {
        self.reload()?;
        let Some(task) = self.get(id) else {
            return Ok(None);
        };
        if let Some(event_id) = task.remote_event_id() {
            let event_id = event_id.to_string();
            let calendar_id = task.draft.calendar_id.clone();
            let token = session.get_valid_access_token().await?;
            match api.delete_event(&token, &calendar_id, &event_id).await {
                Ok(()) => tracing::debug!(%event_id, "remote event deleted"),
                Err(ApiError::NotFound) => {
                    tracing::debug!(%event_id, "remote event already gone")
                }
                Err(e) => {
                    if matches!(e, ApiError::Unauthorized(_)) {
                        session.invalidate(&token).await;
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(self.remove(id)?)
    }

    /// Attach a remote event id. Returns false when the id is unknown.
    ///
    /// An already-synced task keeps its original event id.
    pub fn mark_synced(&mut self, id: &str, event_id: &str) -> Result<bool, StoreError> {
        self.update(|tasks| {
            let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
                return (false, false);
            };
            if task.synced() {
                return (true, false);
            }
            task.sync = SyncState::Synced {
                event_id: event_id.to_string(),
            };
            (true, true)
        })
    }

    pub fn all(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn unsynced(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| !t.synced()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Move eligible tasks to `Pending`, persist the claim and return
    /// snapshots of the claimed tasks.
    ///
    /// With `ids = None` every `Idle`/`Failed` task is claimed; otherwise only
    /// the listed ones. Tasks `Pending` under a live claim (another sweep,
    /// possibly in another process) or `Synced` are skipped, so overlapping
    /// sweeps never submit the same task.
    pub fn claim_for_sync(&mut self, ids: Option<&[String]>) -> Result<Vec<Task>, StoreError> {
        self.claim_at(ids, Utc::now().timestamp_millis())
    }

    pub(crate) fn claim_at(&mut self, ids: Option<&[String]>, now_ms: i64) -> Result<Vec<Task>, StoreError> {
        let wanted: Option<HashSet<&str>> = ids.map(|ids| ids.iter().map(String::as_str).collect());
        self.update(|tasks| {
            let mut claimed = Vec::new();
            for task in tasks.iter_mut() {
                let selected = wanted
                    .as_ref()
                    .map_or(true, |set| set.contains(task.id.as_str()));
                if selected && task.sync.is_eligible_at(now_ms) {
                    task.sync = SyncState::Pending {
                        claimed_at_ms: now_ms,
                    };
                    claimed.push(task.clone());
                }
            }
            let changed = !claimed.is_empty();
            (claimed, changed)
        })
    }

    /// Return claimed-but-unsubmitted tasks to `Idle`.
    pub fn release(&mut self, ids: &[String]) -> Result<(), StoreError> {
        self.update(|tasks| ((), release_in(tasks, ids)))
    }

    /// Fold a sync report back into the collection and persist.
    ///
    /// Successes become `Synced`, failures `Failed`, and any task in
    /// `claimed` without a result (batch aborted before reaching it) goes
    /// back to `Idle`. A `Synced` task is never downgraded. Results are
    /// merged by id into the list as currently persisted.
    pub fn apply_report(&mut self, claimed: &[String], report: &SyncReport) -> Result<(), StoreError> {
        self.update(|tasks| {
            for outcome in &report.results {
                let Some(task) = tasks.iter_mut().find(|t| t.id == outcome.local_id) else {
                    tracing::warn!(local_id = %outcome.local_id, "sync result for a task that no longer exists");
                    continue;
                };
                if task.synced() {
                    continue;
                }
                task.sync = match (&outcome.event_id, outcome.success) {
                    (Some(event_id), true) => SyncState::Synced {
                        event_id: event_id.clone(),
                    },
                    _ => SyncState::Failed {
                        reason: outcome
                            .error
                            .clone()
                            .unwrap_or_else(|| "unknown error".to_string()),
                    },
                };
            }

            let attempted: HashSet<&str> = report.results.iter().map(|r| r.local_id.as_str()).collect();
            let unattempted: Vec<String> = claimed
                .iter()
                .filter(|id| !attempted.contains(id.as_str()))
                .cloned()
                .collect();
            release_in(tasks, &unattempted);
            ((), true)
        })
    }

    pub fn default_break_minutes(&self) -> u32 {
        self.default_break
    }

    pub fn set_default_break_minutes(&mut self, minutes: u32) -> Result<(), StoreError> {
        self.default_break = minutes;
        self.backend
            .set(DEFAULT_BREAK_KEY, &serde_json::to_string(&minutes)?)
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }
}

fn release_in(tasks: &mut [Task], ids: &[String]) -> bool {
    let mut changed = false;
    for task in tasks.iter_mut() {
        if task.sync.is_pending() && ids.contains(&task.id) {
            task.sync = SyncState::Idle;
            changed = true;
        }
    }
    changed
}
