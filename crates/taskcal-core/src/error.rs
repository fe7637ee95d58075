//! Core error types for taskcal-core.
//!
//! One `thiserror` enum per concern, folded into [`CoreError`] for callers
//! that only need to report a failure.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for taskcal-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Authentication / token lifecycle errors
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Remote calendar API errors
    #[error("Calendar API error: {0}")]
    Api(#[from] ApiError),

    /// Local task store errors
    #[error("Task store error: {0}")]
    Store(#[from] StoreError),

    /// Sync engine errors
    #[error("Sync error: {0}")]
    Sync(#[from] crate::sync::SyncError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// OAuth and token lifecycle errors.
///
/// `NoRefreshToken` and `TokenRefresh` are terminal for the session: the
/// user has to sign in again before any remote call can succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No token has been issued yet
    #[error("Not authenticated with Google")]
    NotAuthenticated,

    /// Access token expired and there is nothing to refresh it with
    #[error("Access token expired and no refresh token available")]
    NoRefreshToken,

    /// Refresh exchange rejected or failed in transport
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Authorization code exchange failed
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// Callback did not carry a usable code
    #[error("Invalid OAuth callback: {0}")]
    InvalidCallback(String),

    /// No callback arrived in time
    #[error("OAuth callback timeout: no callback received within {timeout_secs} seconds")]
    CallbackTimeout { timeout_secs: u64 },

    /// Client id / secret missing
    #[error("OAuth credentials not configured. Set GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET")]
    CredentialsNotConfigured,

    /// OS keyring failure
    #[error("Keyring error: {0}")]
    Keyring(String),
}

impl AuthError {
    /// Whether the session must be re-established by signing in again.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            AuthError::NotAuthenticated | AuthError::NoRefreshToken | AuthError::TokenRefresh(_)
        )
    }
}

/// Errors from the remote calendar provider.
#[derive(Error, Debug)]
pub enum ApiError {
    /// 401 from the provider: token expired or revoked
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource does not exist (404 / 410)
    #[error("Not found")]
    NotFound,

    /// Any other non-success status, with the provider's message
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Unexpected response shape: {0}")]
    Contract(String),

    /// Transport failure
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Could not obtain a token for the request
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ApiError {
    /// Whether this failure means the current token is dead.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ApiError::Unauthorized(_) => true,
            ApiError::Auth(e) => e.requires_reauth(),
            _ => false,
        }
    }

    /// Whether this is a transport or 5xx failure.
    pub fn is_server_or_network(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Local task store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt value under key '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Store at {path} is locked by another process")]
    Locked { path: PathBuf },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Wall-clock time not in `HH:mm`
    #[error("Invalid time '{0}': expected HH:mm")]
    InvalidTime(String),

    /// Date not in `YYYY-MM-DD`
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Task title cannot be empty")]
    EmptyTitle,

    #[error("Task duration must be positive, got {0}")]
    InvalidDuration(u32),

    /// Batch runs past midnight of its start date
    #[error("Schedule overflows the day: {total_minutes} minutes from the start time")]
    ScheduleOverflow { total_minutes: u32 },

    /// Pasted text contained no recognizable task lines
    #[error("No tasks found in the text")]
    ParseEmpty,

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_that_need_reauth() {
        assert!(AuthError::NoRefreshToken.requires_reauth());
        assert!(AuthError::TokenRefresh("invalid_grant".into()).requires_reauth());
        assert!(AuthError::NotAuthenticated.requires_reauth());
        assert!(!AuthError::CredentialsNotConfigured.requires_reauth());
    }

    #[test]
    fn api_error_classification() {
        assert!(ApiError::Unauthorized("expired".into()).is_auth_failure());
        assert!(ApiError::Auth(AuthError::NoRefreshToken).is_auth_failure());
        assert!(!ApiError::NotFound.is_auth_failure());

        let server = ApiError::Rejected {
            status: 503,
            message: "backend".into(),
        };
        assert!(server.is_server_or_network());
        let client = ApiError::Rejected {
            status: 400,
            message: "bad summary".into(),
        };
        assert!(!client.is_server_or_network());
    }

    #[test]
    fn overflow_message_mentions_minutes() {
        let err = ValidationError::ScheduleOverflow { total_minutes: 1500 };
        assert!(err.to_string().contains("1500"));
    }
}
