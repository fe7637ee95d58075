use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::auth::{AuthSession, ProviderGrant, TokenRefresher};
use crate::calendar::{CalendarApi, CalendarItem, EventRequest};
use crate::error::{ApiError, AuthError};
use crate::storage::{JsonFileStore, MemoryStore};
use crate::task::{SyncState, Task, TaskDraft, TaskStore};

use super::*;

/// Fake provider. Summaries decide the response: "401" is an auth
/// rejection, "bad" a 400, anything else succeeds.
#[derive(Default)]
struct ScriptedApi {
    inserted: StdMutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedApi {
    fn inserted(&self) -> Vec<String> {
        self.inserted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarApi for ScriptedApi {
    async fn list_calendars(&self, _: &str) -> Result<Vec<CalendarItem>, ApiError> {
        Ok(Vec::new())
    }

    async fn insert_event(&self, _: &str, event: &EventRequest) -> Result<String, ApiError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inserted.lock().unwrap().push(event.summary.clone());
        if event.summary.contains("401") {
            return Err(ApiError::Unauthorized("Invalid Credentials".into()));
        }
        if event.summary.contains("bad") {
            return Err(ApiError::Rejected {
                status: 400,
                message: "Bad Request".into(),
            });
        }
        Ok(format!("evt-{}", event.local_id))
    }

    async fn delete_event(&self, _: &str, _: &str, _: &str) -> Result<(), ApiError> {
        Ok(())
    }
}

struct NoRefresh;

#[async_trait]
impl TokenRefresher for NoRefresh {
    async fn refresh(&self, _: &str) -> Result<ProviderGrant, AuthError> {
        Err(AuthError::TokenRefresh("refresh disabled".into()))
    }
}

async fn signed_in() -> Arc<AuthSession> {
    let session = Arc::new(AuthSession::new(Arc::new(NoRefresh)));
    session
        .issue(ProviderGrant {
            access_token: "tok".into(),
            refresh_token: None,
            expires_at: None,
            expires_in: Some(3600),
        })
        .await
        .unwrap();
    session
}

fn draft(title: &str) -> TaskDraft {
    TaskDraft {
        title: title.into(),
        description: None,
        duration: 60,
        break_after: 15,
        date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        start_time: "09:00".parse().unwrap(),
        calendar_id: "primary".into(),
        calendar_name: None,
        calendar_color: None,
    }
}

fn tasks(titles: &[&str]) -> Vec<Task> {
    titles
        .iter()
        .enumerate()
        .map(|(i, t)| Task::from_draft(format!("t{i}"), draft(t)))
        .collect()
}

#[test]
fn event_request_uses_local_time_and_zone() {
    let mut task = Task::from_draft("t1", draft("Reunión"));
    task.draft.description = Some("agenda".into());
    let req = build_event_request(&task, "Europe/Madrid");
    assert_eq!(req.local_id, "t1");
    assert_eq!(req.summary, "Reunión");
    assert_eq!(req.description.as_deref(), Some("agenda"));
    assert_eq!(req.start.date_time, "2024-06-01T09:00:00");
    assert_eq!(req.end.date_time, "2024-06-01T10:00:00");
    assert_eq!(req.start.time_zone, "Europe/Madrid");
    assert_eq!(req.calendar_id, "primary");
}

#[test]
fn event_end_may_cross_midnight() {
    let mut task = Task::from_draft("t1", draft("Late"));
    task.draft.start_time = "23:30".parse().unwrap();
    let req = build_event_request(&task, "UTC");
    assert_eq!(req.end.date_time, "2024-06-02T00:30:00");
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let engine = CalendarSyncEngine::new(Arc::new(ScriptedApi::default()), signed_in().await);
    assert!(matches!(
        engine.sync_batch(&[], "UTC").await,
        Err(SyncError::EmptyBatch)
    ));
}

#[tokio::test]
async fn per_task_failures_do_not_stop_the_batch() {
    let api = Arc::new(ScriptedApi::default());
    let engine = CalendarSyncEngine::new(api.clone(), signed_in().await);
    let batch = tasks(&["A", "bad B", "C"]);

    let report = engine.sync_batch(&batch, "UTC").await.unwrap();
    assert_eq!(report.results.len(), batch.len());
    assert_eq!(report.created_count, 2);
    assert!(!report.auth_aborted);
    assert!(report.results[0].success);
    assert_eq!(report.results[1].error.as_deref(), Some("Request rejected (400): Bad Request"));
    assert_eq!(report.results[2].event_id.as_deref(), Some("evt-t2"));
    let ids: Vec<&str> = report.results.iter().map(|r| r.local_id.as_str()).collect();
    assert_eq!(ids, vec!["t0", "t1", "t2"]);
}

#[tokio::test]
async fn auth_failure_aborts_remaining_tasks() {
    let api = Arc::new(ScriptedApi::default());
    let engine = CalendarSyncEngine::new(api.clone(), signed_in().await);

    let report = engine
        .sync_batch(&tasks(&["A", "B 401", "C"]), "UTC")
        .await
        .unwrap();
    assert!(report.auth_aborted);
    assert_eq!(report.created_count, 1);
    assert_eq!(report.results.len(), 2);
    assert!(report.results[0].success);
    assert!(!report.results[1].success);
    // third task never reached the provider
    assert_eq!(api.inserted(), vec!["A", "B 401"]);
}

#[tokio::test]
async fn dead_session_aborts_before_any_request() {
    let api = Arc::new(ScriptedApi::default());
    let session = Arc::new(AuthSession::new(Arc::new(NoRefresh)));
    let engine = CalendarSyncEngine::new(api.clone(), session);

    let report = engine.sync_batch(&tasks(&["A", "B"]), "UTC").await.unwrap();
    assert!(report.auth_aborted);
    assert_eq!(report.results.len(), 1);
    assert!(api.inserted().is_empty());
}

#[tokio::test]
async fn sync_pending_marks_tasks_and_never_resubmits() {
    let api = Arc::new(ScriptedApi::default());
    let engine = CalendarSyncEngine::new(api.clone(), signed_in().await);
    let store = Mutex::new(TaskStore::open(MemoryStore::new()).unwrap());
    store
        .lock()
        .await
        .add_batch(vec![draft("A"), draft("bad B")])
        .unwrap();

    let first = sync_pending(&store, &engine, "UTC", None).await.unwrap();
    assert_eq!(first.created_count, 1);
    {
        let guard = store.lock().await;
        assert!(guard.all()[0].synced());
        assert_eq!(
            guard.all()[1].sync,
            SyncState::Failed {
                reason: "Request rejected (400): Bad Request".into()
            }
        );
    }

    // only the failed task is retried
    sync_pending(&store, &engine, "UTC", None).await.unwrap();
    assert_eq!(api.inserted(), vec!["A", "bad B", "bad B"]);
    assert!(store.lock().await.all()[0].synced());
}

#[tokio::test]
async fn aborted_sweep_returns_unattempted_tasks_to_idle() {
    let api = Arc::new(ScriptedApi::default());
    let engine = CalendarSyncEngine::new(api.clone(), signed_in().await);
    let store = Mutex::new(TaskStore::open(MemoryStore::new()).unwrap());
    store
        .lock()
        .await
        .add_batch(vec![draft("A"), draft("B 401"), draft("C")])
        .unwrap();

    let report = sync_pending(&store, &engine, "UTC", None).await.unwrap();
    assert!(report.auth_aborted);
    let guard = store.lock().await;
    assert!(guard.all()[0].synced());
    assert!(guard.all()[1].last_sync_error().is_some());
    assert_eq!(guard.all()[2].sync, SyncState::Idle);
}

#[tokio::test]
async fn overlapping_sweeps_submit_each_task_once() {
    let api = Arc::new(ScriptedApi {
        delay: Some(Duration::from_millis(10)),
        ..ScriptedApi::default()
    });
    let engine = CalendarSyncEngine::new(api.clone(), signed_in().await);
    let store = Mutex::new(TaskStore::open(MemoryStore::new()).unwrap());
    store
        .lock()
        .await
        .add_batch(vec![draft("A"), draft("B"), draft("C")])
        .unwrap();

    let (a, b) = tokio::join!(
        sync_pending(&store, &engine, "UTC", None),
        sync_pending(&store, &engine, "UTC", None)
    );
    let created = a.unwrap().created_count + b.unwrap().created_count;
    assert_eq!(created, 3);
    let mut inserted = api.inserted();
    inserted.sort();
    assert_eq!(inserted, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn nothing_to_sync_is_an_empty_report() {
    let engine = CalendarSyncEngine::new(Arc::new(ScriptedApi::default()), signed_in().await);
    let store = Mutex::new(TaskStore::open(MemoryStore::new()).unwrap());
    let report = sync_pending(&store, &engine, "UTC", None).await.unwrap();
    assert_eq!(report, crate::sync::SyncReport::default());
}

#[tokio::test]
async fn sweeps_from_separate_handles_share_one_directory() {
    let dir = tempfile::tempdir().unwrap();
    let open = || TaskStore::open(JsonFileStore::open(dir.path()).unwrap()).unwrap();
    let api = Arc::new(ScriptedApi {
        delay: Some(Duration::from_millis(10)),
        ..ScriptedApi::default()
    });
    let engine = CalendarSyncEngine::new(api.clone(), signed_in().await);

    let mut writer = open();
    writer.add_batch(vec![draft("A"), draft("B")]).unwrap();
    // both handles are opened before C exists
    let first = Mutex::new(open());
    let second = Mutex::new(open());
    writer.add(draft("C")).unwrap();

    let (a, b) = tokio::join!(
        sync_pending(&first, &engine, "UTC", None),
        sync_pending(&second, &engine, "UTC", None)
    );
    assert_eq!(a.unwrap().created_count + b.unwrap().created_count, 3);
    let mut inserted = api.inserted();
    inserted.sort();
    assert_eq!(inserted, vec!["A", "B", "C"]);

    let on_disk = open();
    assert_eq!(on_disk.len(), 3);
    assert!(on_disk.all().iter().all(Task::synced));
}

struct RefreshToFresh;

#[async_trait]
impl TokenRefresher for RefreshToFresh {
    async fn refresh(&self, _: &str) -> Result<ProviderGrant, AuthError> {
        Ok(ProviderGrant {
            access_token: "fresh".into(),
            refresh_token: None,
            expires_at: None,
            expires_in: Some(3600),
        })
    }
}

#[tokio::test]
async fn provider_401_forces_refresh_before_next_sweep() {
    let session = Arc::new(AuthSession::new(Arc::new(RefreshToFresh)));
    session
        .issue(ProviderGrant {
            access_token: "revoked".into(),
            refresh_token: Some("r".into()),
            expires_at: None,
            expires_in: Some(3600),
        })
        .await
        .unwrap();
    let engine = CalendarSyncEngine::new(Arc::new(ScriptedApi::default()), session.clone());

    let report = engine.sync_batch(&tasks(&["A 401", "B"]), "UTC").await.unwrap();
    assert!(report.auth_aborted);
    assert_eq!(session.get_valid_access_token().await.unwrap(), "fresh");
}
