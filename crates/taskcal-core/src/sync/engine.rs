//! Sequential event creation with per-task outcomes.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tokio::sync::Mutex;

use crate::auth::AuthSession;
use crate::calendar::{CalendarApi, EventDateTime, EventRequest};
use crate::error::ApiError;
use crate::storage::KeyValueStore;
use crate::task::{Task, TaskStore};

use super::types::{SyncError, SyncOutcome, SyncReport};

const EVENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Event for `task`, in local wall-clock time tagged with `time_zone`.
///
/// The end is `start + duration` and may fall on the next day.
pub fn build_event_request(task: &Task, time_zone: &str) -> EventRequest {
    let draft = &task.draft;
    let start = NaiveDateTime::new(draft.date, draft.start_time.to_naive_time());
    let end = start + Duration::minutes(i64::from(draft.duration));
    let at = |dt: NaiveDateTime| EventDateTime {
        date_time: dt.format(EVENT_TIME_FORMAT).to_string(),
        time_zone: time_zone.to_string(),
    };
    EventRequest {
        local_id: task.id.clone(),
        summary: draft.title.clone(),
        description: draft.description.clone(),
        start: at(start),
        end: at(end),
        calendar_id: draft.calendar_id.clone(),
    }
}

/// Submits events through a [`CalendarApi`] using tokens from an
/// [`AuthSession`]. Never touches the task store.
pub struct CalendarSyncEngine<A: CalendarApi> {
    api: Arc<A>,
    session: Arc<AuthSession>,
}

impl<A: CalendarApi> CalendarSyncEngine<A> {
    pub fn new(api: Arc<A>, session: Arc<AuthSession>) -> Self {
        Self { api, session }
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// Create one event per task, in order.
    pub async fn sync_batch(&self, tasks: &[Task], time_zone: &str) -> Result<SyncReport, SyncError> {
        let events: Vec<EventRequest> = tasks
            .iter()
            .map(|task| build_event_request(task, time_zone))
            .collect();
        self.create_events(&events).await
    }

    /// Submit prepared events strictly one after another.
    ///
    /// A failing event is recorded and the batch continues. An
    /// authentication failure is recorded for that event and ends the batch
    /// with `auth_aborted` set; later events are never attempted.
    pub async fn create_events(&self, events: &[EventRequest]) -> Result<SyncReport, SyncError> {
        if events.is_empty() {
            return Err(SyncError::EmptyBatch);
        }

        let mut report = SyncReport::default();
        for event in events {
            let result = match self.session.get_valid_access_token().await {
                Ok(token) => {
                    let result = self.api.insert_event(&token, event).await;
                    if let Err(ApiError::Unauthorized(_)) = &result {
                        // provider rejected an unexpired token; force a refresh next time
                        self.session.invalidate(&token).await;
                    }
                    result
                }
                Err(e) => Err(ApiError::Auth(e)),
            };

            match result {
                Ok(event_id) => {
                    tracing::debug!(local_id = %event.local_id, %event_id, "event created");
                    report.created_count += 1;
                    report
                        .results
                        .push(SyncOutcome::created(&event.local_id, event_id, &event.summary));
                }
                Err(e) => {
                    let auth_failure = e.is_auth_failure();
                    tracing::warn!(local_id = %event.local_id, summary = %event.summary, "event creation failed: {e}");
                    report
                        .results
                        .push(SyncOutcome::failed(&event.local_id, e.to_string(), &event.summary));
                    if auth_failure {
                        tracing::error!(
                            attempted = report.results.len(),
                            total = events.len(),
                            "authentication rejected, aborting batch"
                        );
                        report.auth_aborted = true;
                        break;
                    }
                }
            }
        }

        tracing::info!(
            created = report.created_count,
            total = events.len(),
            "processed {} events",
            report.results.len()
        );
        Ok(report)
    }
}

/// Claim unsynced tasks, push them, and fold the outcomes back into the store.
///
/// With `ids` only the listed tasks are considered. Tasks already claimed by
/// a concurrent sweep are skipped. Returns an empty report when there is
/// nothing to do.
pub async fn sync_pending<S, A>(
    store: &Mutex<TaskStore<S>>,
    engine: &CalendarSyncEngine<A>,
    time_zone: &str,
    ids: Option<&[String]>,
) -> Result<SyncReport, SyncError>
where
    S: KeyValueStore,
    A: CalendarApi,
{
    let claimed = store.lock().await.claim_for_sync(ids)?;
    if claimed.is_empty() {
        tracing::debug!("nothing to sync");
        return Ok(SyncReport::default());
    }
    let claimed_ids: Vec<String> = claimed.iter().map(|t| t.id.clone()).collect();

    let report = match engine.sync_batch(&claimed, time_zone).await {
        Ok(report) => report,
        Err(e) => {
            if let Err(release) = store.lock().await.release(&claimed_ids) {
                tracing::warn!("failed to release claimed tasks: {release}");
            }
            return Err(e);
        }
    };

    store.lock().await.apply_report(&claimed_ids, &report)?;
    Ok(report)
}
