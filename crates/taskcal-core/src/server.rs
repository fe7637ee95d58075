//! HTTP surface over the sync engine and calendar catalog.
//!
//! - `POST /sync/create-events`: 201 when every event was created, 207 on a
//!   mixed result, 401 when the batch stopped on an auth failure (partial
//!   results attached), 400 on a malformed or empty body.
//! - `GET /calendars`: writable calendars, 401 when the session is unusable.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::calendar::{CalendarApi, CalendarCatalog, CalendarItem, EventRequest};
use crate::sync::{CalendarSyncEngine, SyncError, SyncOutcome, SyncReport};

pub const GOOGLE_AUTH_ERROR: &str = "GoogleAuthError";
pub const AUTH_ERROR: &str = "AuthError";

/// Shared handler state.
pub struct AppState<A: CalendarApi> {
    pub engine: Arc<CalendarSyncEngine<A>>,
    pub catalog: Arc<CalendarCatalog<A>>,
}

impl<A: CalendarApi> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

impl<A: CalendarApi> AppState<A> {
    pub fn new(api: Arc<A>, session: Arc<crate::auth::AuthSession>) -> Self {
        Self {
            engine: Arc::new(CalendarSyncEngine::new(api.clone(), session.clone())),
            catalog: Arc::new(CalendarCatalog::new(api, session)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateEventsBody {
    #[serde(default)]
    events: Vec<EventRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateEventsResponse {
    created_count: usize,
    results: Vec<SyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_type: Option<&'static str>,
}

impl CreateEventsResponse {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            created_count: 0,
            results: Vec::new(),
            message: Some(message.into()),
            error_type: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct CalendarsResponse {
    calendars: Vec<CalendarItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_type: Option<&'static str>,
}

pub fn router<A: CalendarApi + 'static>(state: AppState<A>) -> Router {
    Router::new()
        .route("/sync/create-events", post(create_events::<A>))
        .route("/calendars", get(list_calendars::<A>))
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<A, F>(listener: TcpListener, state: AppState<A>, shutdown: F) -> std::io::Result<()>
where
    A: CalendarApi + 'static,
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

fn report_status(report: &SyncReport) -> StatusCode {
    if report.auth_aborted {
        StatusCode::UNAUTHORIZED
    } else if report.all_succeeded() {
        StatusCode::CREATED
    } else {
        StatusCode::MULTI_STATUS
    }
}

async fn create_events<A: CalendarApi + 'static>(
    State(state): State<AppState<A>>,
    body: Result<Json<CreateEventsBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!("rejected create-events body: {rejection}");
            return (
                StatusCode::BAD_REQUEST,
                Json(CreateEventsResponse::rejected("Invalid JSON request body.")),
            )
                .into_response();
        }
    };

    let total = body.events.len();
    match state.engine.create_events(&body.events).await {
        Ok(report) => {
            let status = report_status(&report);
            let (message, error_type) = if report.auth_aborted {
                (
                    "Google token invalid or expired while creating events. Some events may not have been created. Sign in again.".to_string(),
                    Some(GOOGLE_AUTH_ERROR),
                )
            } else {
                (
                    format!(
                        "Processed {total} events. Created successfully: {}.",
                        report.created_count
                    ),
                    None,
                )
            };
            let response = CreateEventsResponse {
                created_count: report.created_count,
                results: report.results,
                message: Some(message),
                error_type,
            };
            (status, Json(response)).into_response()
        }
        Err(SyncError::EmptyBatch) => (
            StatusCode::BAD_REQUEST,
            Json(CreateEventsResponse::rejected("No events provided.")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("create-events failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CreateEventsResponse::rejected(e.to_string())),
            )
                .into_response()
        }
    }
}

async fn list_calendars<A: CalendarApi + 'static>(State(state): State<AppState<A>>) -> Response {
    match state.catalog.list().await {
        Ok(calendars) => (StatusCode::OK, Json(CalendarsResponse { calendars })).into_response(),
        Err(e) if e.is_auth_failure() => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                message: format!("Invalid token or expired session. Sign in again. ({e})"),
                error_type: Some(AUTH_ERROR),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("calendar list failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    message: format!("Failed to fetch the calendar list: {e}"),
                    error_type: None,
                }),
            )
                .into_response()
        }
    }
}
