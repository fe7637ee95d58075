//! Google Calendar access.
//!
//! [`CalendarApi`] is the seam between the sync engine and the provider;
//! [`GoogleCalendarClient`] is the REST implementation. [`CalendarCatalog`]
//! lists the calendars a user can write to.

mod google;

pub use google::{http_client, GoogleCalendarClient, GOOGLE_CALENDAR_API_BASE};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::AuthSession;
use crate::error::ApiError;
use crate::schedule::PRIMARY_CALENDAR_ID;

/// Catalog failures are provider failures.
pub type CalendarError = ApiError;

/// A calendar the user may add events to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_role: Option<String>,
}

/// Local wall-clock time tagged with an IANA zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    /// `YYYY-MM-DDTHH:MM:SS`, no offset.
    pub date_time: String,
    pub time_zone: String,
}

/// One event to create, tied back to the local task it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub local_id: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventDateTime,
    pub end: EventDateTime,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
}

fn default_calendar_id() -> String {
    PRIMARY_CALENDAR_ID.to_string()
}

/// Remote calendar operations. Every call takes the bearer token to use.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// Calendars with at least writer access.
    async fn list_calendars(&self, access_token: &str) -> Result<Vec<CalendarItem>, ApiError>;

    /// Create an event and return its remote id.
    async fn insert_event(&self, access_token: &str, event: &EventRequest) -> Result<String, ApiError>;

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), ApiError>;
}

/// Read-only view of the user's writable calendars. Does not cache.
pub struct CalendarCatalog<A: CalendarApi> {
    api: Arc<A>,
    session: Arc<AuthSession>,
}

impl<A: CalendarApi> CalendarCatalog<A> {
    pub fn new(api: Arc<A>, session: Arc<AuthSession>) -> Self {
        Self { api, session }
    }

    pub async fn list(&self) -> Result<Vec<CalendarItem>, CalendarError> {
        let token = self.session.get_valid_access_token().await?;
        let items = match self.api.list_calendars(&token).await {
            Ok(items) => items,
            Err(e) => {
                if matches!(e, ApiError::Unauthorized(_)) {
                    self.session.invalidate(&token).await;
                }
                return Err(e);
            }
        };
        tracing::debug!(count = items.len(), "calendar list fetched");
        Ok(items)
    }
}

/// Default selection: the primary calendar, else the first, else `"primary"`.
pub fn primary_or_first(items: &[CalendarItem]) -> String {
    items
        .iter()
        .find(|c| c.primary)
        .or_else(|| items.first())
        .map_or_else(default_calendar_id, |c| c.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ProviderGrant, TokenRefresher};
    use crate::error::AuthError;

    fn item(id: &str, primary: bool) -> CalendarItem {
        CalendarItem {
            id: id.into(),
            name: id.into(),
            color: None,
            primary,
            access_role: Some("owner".into()),
        }
    }

    #[test]
    fn default_selection_prefers_primary() {
        assert_eq!(
            primary_or_first(&[item("work", false), item("me@example.com", true)]),
            "me@example.com"
        );
        assert_eq!(primary_or_first(&[item("work", false)]), "work");
        assert_eq!(primary_or_first(&[]), "primary");
    }

    #[test]
    fn event_request_defaults_calendar() {
        let req: EventRequest = serde_json::from_value(serde_json::json!({
            "localId": "1",
            "summary": "Reunión",
            "start": {"dateTime": "2024-06-01T09:00:00", "timeZone": "Europe/Madrid"},
            "end": {"dateTime": "2024-06-01T10:00:00", "timeZone": "Europe/Madrid"}
        }))
        .unwrap();
        assert_eq!(req.calendar_id, "primary");
        assert!(req.description.is_none());
    }

    struct NoRefresh;

    #[async_trait]
    impl TokenRefresher for NoRefresh {
        async fn refresh(&self, _: &str) -> Result<ProviderGrant, AuthError> {
            Err(AuthError::TokenRefresh("unexpected".into()))
        }
    }

    struct StaticCalendars;

    #[async_trait]
    impl CalendarApi for StaticCalendars {
        async fn list_calendars(&self, access_token: &str) -> Result<Vec<CalendarItem>, ApiError> {
            assert_eq!(access_token, "tok");
            Ok(vec![item("primary-id", true)])
        }

        async fn insert_event(&self, _: &str, _: &EventRequest) -> Result<String, ApiError> {
            unreachable!()
        }

        async fn delete_event(&self, _: &str, _: &str, _: &str) -> Result<(), ApiError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn catalog_requires_session() {
        let session = Arc::new(AuthSession::new(Arc::new(NoRefresh)));
        let catalog = CalendarCatalog::new(Arc::new(StaticCalendars), session.clone());
        assert!(catalog.list().await.unwrap_err().is_auth_failure());

        session
            .issue(ProviderGrant {
                access_token: "tok".into(),
                refresh_token: None,
                expires_at: None,
                expires_in: Some(3600),
            })
            .await
            .unwrap();
        let items = catalog.list().await.unwrap();
        assert_eq!(items[0].id, "primary-id");
    }

    struct FreshRefresh;

    #[async_trait]
    impl TokenRefresher for FreshRefresh {
        async fn refresh(&self, _: &str) -> Result<ProviderGrant, AuthError> {
            Ok(ProviderGrant {
                access_token: "fresh".into(),
                refresh_token: None,
                expires_at: None,
                expires_in: Some(3600),
            })
        }
    }

    /// Rejects every token except "fresh".
    struct RevokingCalendars;

    #[async_trait]
    impl CalendarApi for RevokingCalendars {
        async fn list_calendars(&self, access_token: &str) -> Result<Vec<CalendarItem>, ApiError> {
            if access_token == "fresh" {
                Ok(vec![item("primary-id", true)])
            } else {
                Err(ApiError::Unauthorized("Invalid Credentials".into()))
            }
        }

        async fn insert_event(&self, _: &str, _: &EventRequest) -> Result<String, ApiError> {
            unreachable!()
        }

        async fn delete_event(&self, _: &str, _: &str, _: &str) -> Result<(), ApiError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn revoked_token_is_refreshed_after_401() {
        let session = Arc::new(AuthSession::new(Arc::new(FreshRefresh)));
        session
            .issue(ProviderGrant {
                access_token: "revoked".into(),
                refresh_token: Some("r".into()),
                expires_at: None,
                expires_in: Some(3600),
            })
            .await
            .unwrap();
        let catalog = CalendarCatalog::new(Arc::new(RevokingCalendars), session.clone());

        assert!(matches!(
            catalog.list().await,
            Err(ApiError::Unauthorized(_))
        ));
        let items = catalog.list().await.unwrap();
        assert_eq!(items[0].id, "primary-id");
        assert_eq!(session.get_valid_access_token().await.unwrap(), "fresh");
    }
}
