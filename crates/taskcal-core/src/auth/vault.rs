//! Token persistence.

use crate::error::AuthError;

use super::AuthToken;

pub const KEYRING_SERVICE: &str = "taskcal";
const KEYRING_ACCOUNT: &str = "google_calendar";

/// Somewhere an [`AuthToken`] survives between runs.
pub trait TokenVault: Send + Sync {
    fn load(&self) -> Result<Option<AuthToken>, AuthError>;
    fn save(&self, token: &AuthToken) -> Result<(), AuthError>;
    fn clear(&self) -> Result<(), AuthError>;
}

/// Thin wrapper around the OS keyring. The token is stored as JSON.
#[derive(Debug, Clone)]
pub struct KeyringVault {
    service: String,
    account: String,
}

impl Default for KeyringVault {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE, KEYRING_ACCOUNT)
    }
}

impl KeyringVault {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, AuthError> {
        keyring::Entry::new(&self.service, &self.account).map_err(keyring_error)
    }
}

fn keyring_error(e: keyring::Error) -> AuthError {
    AuthError::Keyring(e.to_string())
}

impl TokenVault for KeyringVault {
    fn load(&self) -> Result<Option<AuthToken>, AuthError> {
        let raw = match self.entry()?.get_password() {
            Ok(pw) => pw,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(keyring_error(e)),
        };
        match serde_json::from_str(&raw) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::warn!("ignoring unreadable stored token: {e}");
                Ok(None)
            }
        }
    }

    fn save(&self, token: &AuthToken) -> Result<(), AuthError> {
        let raw = serde_json::to_string(token).map_err(|e| AuthError::Keyring(e.to_string()))?;
        self.entry()?.set_password(&raw).map_err(keyring_error)
    }

    fn clear(&self) -> Result<(), AuthError> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(keyring_error(e)),
        }
    }
}
