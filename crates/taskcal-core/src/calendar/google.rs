//! Google Calendar v3 REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::storage::HttpConfig;

use super::{CalendarApi, CalendarItem, EventDateTime, EventRequest};

pub const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Minimum access role for calendars offered as sync targets.
const MIN_ACCESS_ROLE: &str = "writer";

#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http: Client,
    api_base: String,
}

/// Event body as the API expects it: no local id, no calendar id.
#[derive(Serialize)]
struct EventResource<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    start: &'a EventDateTime,
    end: &'a EventDateTime,
}

#[derive(Deserialize)]
struct InsertedEvent {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListEntry {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    summary_override: Option<String>,
    #[serde(default)]
    background_color: Option<String>,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    access_role: Option<String>,
}

impl From<CalendarListEntry> for CalendarItem {
    fn from(entry: CalendarListEntry) -> Self {
        let name = entry
            .summary_override
            .or(entry.summary)
            .unwrap_or_else(|| entry.id.clone());
        CalendarItem {
            id: entry.id,
            name,
            color: entry.background_color,
            primary: entry.primary,
            access_role: entry.access_role,
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Shared HTTP client with the configured request timeout.
pub fn http_client(config: &HttpConfig) -> Result<Client, ApiError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

impl GoogleCalendarClient {
    pub fn new(http: Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!("{}/calendars/{}/events", self.api_base, encode(calendar_id))
    }
}

/// Map a non-success response to an [`ApiError`], preferring the provider's
/// `error.message`.
async fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| {
            if body.is_empty() {
                status.to_string()
            } else {
                body
            }
        });

    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
        StatusCode::NOT_FOUND | StatusCode::GONE => ApiError::NotFound,
        other => ApiError::Rejected {
            status: other.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    async fn list_calendars(&self, access_token: &str) -> Result<Vec<CalendarItem>, ApiError> {
        let url = format!("{}/users/me/calendarList", self.api_base);
        tracing::debug!(%url, "listing calendars");
        let resp = self
            .http
            .get(&url)
            .query(&[("minAccessRole", MIN_ACCESS_ROLE)])
            .bearer_auth(access_token)
            .send()
            .await?;
        let body = check_status(resp).await?.text().await?;
        let list: CalendarListResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::Contract(format!("calendar list: {e}")))?;
        Ok(list.items.into_iter().map(CalendarItem::from).collect())
    }

    async fn insert_event(&self, access_token: &str, event: &EventRequest) -> Result<String, ApiError> {
        let url = self.events_url(&event.calendar_id);
        tracing::debug!(calendar_id = %event.calendar_id, summary = %event.summary, "creating event");
        let resource = EventResource {
            summary: &event.summary,
            description: event.description.as_deref(),
            start: &event.start,
            end: &event.end,
        };
        let resp = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&resource)
            .send()
            .await?;
        let body = check_status(resp).await?.text().await?;
        let created: InsertedEvent = serde_json::from_str(&body)
            .map_err(|e| ApiError::Contract(format!("event insert: {e}")))?;
        created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Contract("event created without an id".into()))
    }

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), ApiError> {
        let url = format!("{}/{}", self.events_url(calendar_id), encode(event_id));
        tracing::debug!(%calendar_id, %event_id, "deleting event");
        let resp = self
            .http
            .delete(&url)
            .bearer_auth(access_token)
            .send()
            .await?;
        check_status(resp).await.map(|_| ())
    }
}

/// Percent-encode one path segment.
fn encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
