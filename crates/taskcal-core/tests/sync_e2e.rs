//! End-to-end sync against a mocked Google: token endpoint plus Calendar v3.
//!
//! Covers the whole path a bulk import takes: pasted text, schedule, file
//! store, session refresh, event creation, and the store after reload.

use std::sync::Arc;

use chrono::NaiveDate;
use mockito::{Matcher, Server};
use serde_json::json;
use tokio::sync::Mutex;

use taskcal_core::auth::{AuthSession, OAuthClient, ProviderGrant};
use taskcal_core::calendar::GoogleCalendarClient;
use taskcal_core::storage::GoogleConfig;
use taskcal_core::sync::{sync_pending, CalendarSyncEngine};
use taskcal_core::task::SyncState;
use taskcal_core::workflow::{ImportFlow, ImportState};
use taskcal_core::{JsonFileStore, TaskStore};

const PASTED: &str = "- [ ] Reunión [1 hora]\n- [ ] Llamada [30 min]\n";

fn google_config(server: &Server) -> GoogleConfig {
    GoogleConfig {
        client_id: "cid".into(),
        client_secret: "secret".into(),
        token_url: format!("{}/token", server.url()),
        api_base: server.url(),
        ..GoogleConfig::default()
    }
}

async fn expired_session(server: &Server) -> Arc<AuthSession> {
    let http = reqwest::Client::new();
    let oauth = OAuthClient::from_config(&google_config(server), http).unwrap();
    let session = Arc::new(AuthSession::new(Arc::new(oauth)));
    session
        .issue(ProviderGrant {
            access_token: "stale".into(),
            refresh_token: Some("refresh-1".into()),
            expires_at: Some(1),
            expires_in: None,
        })
        .await
        .unwrap();
    session
}

fn engine(server: &Server, session: Arc<AuthSession>) -> CalendarSyncEngine<GoogleCalendarClient> {
    let api = GoogleCalendarClient::new(reqwest::Client::new(), server.url());
    CalendarSyncEngine::new(Arc::new(api), session)
}

fn june_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

#[tokio::test]
async fn import_refreshes_once_and_creates_events() {
    let mut server = Server::new_async().await;
    let refresh = server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()))
        .with_status(200)
        .with_body(r#"{"access_token":"fresh","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;
    let reunion = server
        .mock("POST", "/calendars/primary/events")
        .match_header("authorization", "Bearer fresh")
        .match_body(Matcher::PartialJson(json!({
            "summary": "Reunión",
            "start": {"dateTime": "2024-06-01T09:00:00", "timeZone": "Europe/Madrid"},
            "end": {"dateTime": "2024-06-01T10:00:00", "timeZone": "Europe/Madrid"}
        })))
        .with_status(200)
        .with_body(r#"{"id":"evt-reunion"}"#)
        .expect(1)
        .create_async()
        .await;
    let llamada = server
        .mock("POST", "/calendars/primary/events")
        .match_body(Matcher::PartialJson(json!({
            "summary": "Llamada",
            "start": {"dateTime": "2024-06-01T10:15:00"},
            "end": {"dateTime": "2024-06-01T10:45:00"}
        })))
        .with_status(200)
        .with_body(r#"{"id":"evt-llamada"}"#)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Mutex::new(TaskStore::open(JsonFileStore::open(dir.path()).unwrap()).unwrap());
    let engine = engine(&server, expired_session(&server).await);

    let mut flow = ImportFlow::new(june_first(), "09:00".parse().unwrap());
    flow.parse(PASTED, 15, "primary").unwrap();
    let schedule = flow.begin_submit().unwrap();
    assert!(!schedule.overflows());

    let ids: Vec<String> = store
        .lock()
        .await
        .add_batch(schedule.into_drafts())
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    let report = sync_pending(&store, &engine, "Europe/Madrid", Some(ids.as_slice()))
        .await
        .unwrap();
    flow.finish(report.clone()).unwrap();

    assert_eq!(report.created_count, 2);
    assert_eq!(report.results.len(), 2);
    assert!(matches!(flow.state(), ImportState::Done(_)));
    refresh.assert_async().await;
    reunion.assert_async().await;
    llamada.assert_async().await;

    let reopened = TaskStore::open(JsonFileStore::open(dir.path()).unwrap()).unwrap();
    let events: Vec<Option<&str>> = reopened.all().iter().map(|t| t.remote_event_id()).collect();
    assert_eq!(events, vec![Some("evt-reunion"), Some("evt-llamada")]);
}

#[tokio::test]
async fn unauthorized_event_stops_the_batch() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(200)
        .with_body(r#"{"access_token":"fresh","expires_in":3600}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/calendars/primary/events")
        .match_body(Matcher::PartialJson(json!({"summary": "A"})))
        .with_status(200)
        .with_body(r#"{"id":"evt-a"}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/calendars/primary/events")
        .match_body(Matcher::PartialJson(json!({"summary": "B"})))
        .with_status(401)
        .with_body(r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#)
        .create_async()
        .await;
    let never = server
        .mock("POST", "/calendars/primary/events")
        .match_body(Matcher::PartialJson(json!({"summary": "C"})))
        .expect(0)
        .create_async()
        .await;

    let store = Mutex::new(TaskStore::open(taskcal_core::MemoryStore::new()).unwrap());
    let engine = engine(&server, expired_session(&server).await);

    let text = "- [ ] A [10 min]\n- [ ] B [10 min]\n- [ ] C [10 min]";
    let mut flow = ImportFlow::new(june_first(), "08:00".parse().unwrap());
    flow.parse(text, 0, "primary").unwrap();
    let drafts = flow.begin_submit().unwrap().into_drafts();
    store.lock().await.add_batch(drafts).unwrap();

    let report = sync_pending(&store, &engine, "UTC", None).await.unwrap();
    assert!(report.auth_aborted);
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.created_count, 1);
    assert_eq!(
        report.results[1].error.as_deref(),
        Some("Unauthorized: Invalid Credentials")
    );
    never.assert_async().await;

    let guard = store.lock().await;
    assert!(guard.all()[0].synced());
    assert!(matches!(guard.all()[1].sync, SyncState::Failed { .. }));
    assert_eq!(guard.all()[2].sync, SyncState::Idle);
}

#[tokio::test]
async fn revoked_refresh_token_fails_without_calling_calendar() {
    let mut server = Server::new_async().await;
    let refresh = server
        .mock("POST", "/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant"}"#)
        .expect(1)
        .create_async()
        .await;
    let events = server
        .mock("POST", Matcher::Regex("^/calendars/".into()))
        .expect(0)
        .create_async()
        .await;

    let store = Mutex::new(TaskStore::open(taskcal_core::MemoryStore::new()).unwrap());
    let session = expired_session(&server).await;
    let engine = engine(&server, session.clone());

    let mut flow = ImportFlow::new(june_first(), "09:00".parse().unwrap());
    flow.parse(PASTED, 15, "primary").unwrap();
    store
        .lock()
        .await
        .add_batch(flow.begin_submit().unwrap().into_drafts())
        .unwrap();

    let report = sync_pending(&store, &engine, "UTC", None).await.unwrap();
    assert!(report.auth_aborted);
    assert_eq!(report.results.len(), 1);

    // a second sweep fails fast without another refresh attempt
    let again = sync_pending(&store, &engine, "UTC", None).await.unwrap();
    assert!(again.auth_aborted);
    refresh.assert_async().await;
    events.assert_async().await;
    assert!(!session.snapshot().await.authenticated);
}

#[tokio::test]
async fn revoked_access_token_is_refreshed_on_the_next_sweep() {
    let mut server = Server::new_async().await;
    let refresh = server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()))
        .with_status(200)
        .with_body(r#"{"access_token":"fresh","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;
    let rejected = server
        .mock("POST", "/calendars/primary/events")
        .match_header("authorization", "Bearer revoked")
        .with_status(401)
        .with_body(r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("POST", "/calendars/primary/events")
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_body(r#"{"id":"evt-a"}"#)
        .expect(1)
        .create_async()
        .await;

    let http = reqwest::Client::new();
    let oauth = OAuthClient::from_config(&google_config(&server), http).unwrap();
    let session = Arc::new(AuthSession::new(Arc::new(oauth)));
    // unexpired locally, but revoked on the provider side
    session
        .issue(ProviderGrant {
            access_token: "revoked".into(),
            refresh_token: Some("refresh-1".into()),
            expires_at: None,
            expires_in: Some(3600),
        })
        .await
        .unwrap();
    let engine = engine(&server, session);

    let store = Mutex::new(TaskStore::open(taskcal_core::MemoryStore::new()).unwrap());
    let mut flow = ImportFlow::new(june_first(), "09:00".parse().unwrap());
    flow.parse("- [ ] A [10 min]", 0, "primary").unwrap();
    store
        .lock()
        .await
        .add_batch(flow.begin_submit().unwrap().into_drafts())
        .unwrap();

    let first = sync_pending(&store, &engine, "UTC", None).await.unwrap();
    assert!(first.auth_aborted);
    assert_eq!(first.created_count, 0);

    let second = sync_pending(&store, &engine, "UTC", None).await.unwrap();
    assert!(!second.auth_aborted);
    assert_eq!(second.created_count, 1);
    assert_eq!(
        store.lock().await.all()[0].remote_event_id(),
        Some("evt-a")
    );
    refresh.assert_async().await;
    rejected.assert_async().await;
    accepted.assert_async().await;
}
