//! Google OAuth2 session.
//!
//! [`AuthSession`] owns the current token and is the only thing that
//! refreshes it. Remote-facing components hold an `Arc<AuthSession>` and ask
//! for a valid access token before each request.

mod oauth;
mod vault;

pub use oauth::{OAuthClient, PendingAuthorization, GOOGLE_SCOPES, OAUTH_CONNECT_TIMEOUT_SECS};
pub use vault::{KeyringVault, TokenVault, KEYRING_SERVICE};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::AuthError;

/// Lifetime assumed when the provider omits both `expires_at` and `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Why the stored token can no longer be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message")]
pub enum TokenFailure {
    RefreshFailed(String),
    NoRefreshToken,
}

impl From<&TokenFailure> for AuthError {
    fn from(failure: &TokenFailure) -> Self {
        match failure {
            TokenFailure::RefreshFailed(msg) => AuthError::TokenRefresh(msg.clone()),
            TokenFailure::NoRefreshToken => AuthError::NoRefreshToken,
        }
    }
}

/// Stored credentials for the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub expires_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TokenFailure>,
}

impl AuthToken {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Token material as returned by the provider's token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// Seconds from now.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl ProviderGrant {
    /// Convert to a stored token. `previous_refresh` is kept when the grant
    /// does not carry a new refresh token.
    pub fn into_token(self, now_ms: i64, previous_refresh: Option<String>) -> AuthToken {
        let expires_at_ms = match (self.expires_at, self.expires_in) {
            (Some(at), _) => at.saturating_mul(1000),
            (None, Some(secs)) => now_ms.saturating_add(secs.saturating_mul(1000)),
            (None, None) => now_ms + DEFAULT_TOKEN_LIFETIME_SECS * 1000,
        };
        AuthToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at_ms,
            error: None,
        }
    }
}

/// Exchanges a refresh token for a new grant.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<ProviderGrant, AuthError>;
}

/// Non-secret view of the session for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    pub expires_at_ms: Option<i64>,
    pub has_refresh_token: bool,
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn from_token(token: Option<&AuthToken>) -> Self {
        match token {
            Some(token) => Self {
                authenticated: token.error.is_none(),
                expires_at_ms: Some(token.expires_at_ms),
                has_refresh_token: token.refresh_token.is_some(),
                error: token.error.as_ref().map(|f| AuthError::from(f).to_string()),
            },
            None => Self {
                authenticated: false,
                expires_at_ms: None,
                has_refresh_token: false,
                error: None,
            },
        }
    }
}

/// Owner of the access token.
///
/// The token sits behind an async mutex that stays locked for the whole
/// refresh exchange, so concurrent callers that all see an expired token
/// wait for one refresh instead of starting their own.
pub struct AuthSession {
    token: Mutex<Option<AuthToken>>,
    refresher: Arc<dyn TokenRefresher>,
    vault: Option<Box<dyn TokenVault>>,
}

impl AuthSession {
    /// Empty, in-memory session.
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            token: Mutex::new(None),
            refresher,
            vault: None,
        }
    }

    /// Session backed by `vault`, starting from whatever it holds.
    pub fn restore(
        refresher: Arc<dyn TokenRefresher>,
        vault: Box<dyn TokenVault>,
    ) -> Result<Self, AuthError> {
        let token = vault.load()?;
        tracing::debug!(restored = token.is_some(), "auth session opened");
        Ok(Self {
            token: Mutex::new(token),
            refresher,
            vault: Some(vault),
        })
    }

    fn persist(&self, token: &AuthToken) {
        if let Some(vault) = &self.vault {
            if let Err(e) = vault.save(token) {
                tracing::warn!("failed to persist token: {e}");
            }
        }
    }

    /// Store a fresh grant, clearing any recorded failure.
    pub async fn issue(&self, grant: ProviderGrant) -> Result<(), AuthError> {
        let mut guard = self.token.lock().await;
        let previous_refresh = guard.as_ref().and_then(|t| t.refresh_token.clone());
        let token = grant.into_token(now_ms(), previous_refresh);
        if let Some(vault) = &self.vault {
            vault.save(&token)?;
        }
        *guard = Some(token);
        tracing::info!("access token issued");
        Ok(())
    }

    /// Return a usable access token, refreshing it first if it has expired.
    ///
    /// A failed refresh is remembered: later calls return the same error
    /// without contacting the provider until [`issue`](Self::issue) is
    /// called again.
    pub async fn get_valid_access_token(&self) -> Result<String, AuthError> {
        let mut guard = self.token.lock().await;
        let token = guard.as_mut().ok_or(AuthError::NotAuthenticated)?;

        if let Some(failure) = &token.error {
            return Err(failure.into());
        }
        if !token.is_expired_at(now_ms()) {
            return Ok(token.access_token.clone());
        }

        let Some(refresh_token) = token.refresh_token.clone() else {
            tracing::warn!("access token expired with no refresh token");
            token.error = Some(TokenFailure::NoRefreshToken);
            self.persist(token);
            return Err(AuthError::NoRefreshToken);
        };

        tracing::debug!("refreshing expired access token");
        match self.refresher.refresh(&refresh_token).await {
            Ok(grant) => {
                *token = grant.into_token(now_ms(), Some(refresh_token));
                self.persist(token);
                tracing::info!("access token refreshed");
                Ok(token.access_token.clone())
            }
            Err(e) => {
                let message = match e {
                    AuthError::TokenRefresh(message) => message,
                    other => other.to_string(),
                };
                tracing::warn!(%message, "token refresh failed");
                token.error = Some(TokenFailure::RefreshFailed(message.clone()));
                self.persist(token);
                Err(AuthError::TokenRefresh(message))
            }
        }
    }

    /// Mark `rejected` as expired after the provider refused it with a 401.
    ///
    /// The next [`get_valid_access_token`](Self::get_valid_access_token)
    /// refreshes instead of handing the same token out again. Returns false
    /// when the session already holds a different token, which means
    /// another caller refreshed in the meantime.
    pub async fn invalidate(&self, rejected: &str) -> bool {
        let mut guard = self.token.lock().await;
        let Some(token) = guard.as_mut() else {
            return false;
        };
        if token.access_token != rejected {
            return false;
        }
        tracing::warn!("provider rejected access token, forcing refresh");
        token.expires_at_ms = 0;
        self.persist(token);
        true
    }

    pub async fn snapshot(&self) -> AuthStatus {
        AuthStatus::from_token(self.token.lock().await.as_ref())
    }

    /// Forget the token here and in the vault.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let mut guard = self.token.lock().await;
        *guard = None;
        if let Some(vault) = &self.vault {
            vault.clear()?;
        }
        Ok(())
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
