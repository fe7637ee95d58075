//! OAuth2 Authorization Code flow against Google.
//!
//! 1. Bind a loopback listener and build the authorization URL
//! 2. The user approves in the browser, which redirects to `/callback`
//! 3. Validate `state`, then exchange the code for a [`ProviderGrant`]
//!
//! The same client performs refresh-token exchanges for [`AuthSession`].
//!
//! [`AuthSession`]: super::AuthSession

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use reqwest::Client;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::AuthError;
use crate::storage::GoogleConfig;

use super::{ProviderGrant, TokenRefresher};

pub const GOOGLE_SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "https://www.googleapis.com/auth/calendar.events",
    "https://www.googleapis.com/auth/calendar.readonly",
];

pub const OAUTH_CONNECT_TIMEOUT_SECS: u64 = 180;

/// Google OAuth client credentials plus endpoints.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    redirect_port: u16,
}

/// A started authorization: the URL to open and the listener waiting for
/// the browser redirect.
pub struct PendingAuthorization {
    pub url: String,
    state: String,
    listener: TcpListener,
}

impl PendingAuthorization {
    /// Try to open the authorization URL in the default browser.
    pub fn open_in_browser(&self) -> bool {
        match open::that(&self.url) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("could not open browser: {e}");
                false
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl OAuthClient {
    /// Build from config, rejecting missing or placeholder credentials.
    pub fn from_config(config: &GoogleConfig, http: Client) -> Result<Self, AuthError> {
        let (client_id, client_secret) = config.credentials();
        validate_credentials(&client_id, &client_secret)?;
        Ok(Self {
            http,
            client_id,
            client_secret,
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            redirect_port: config.redirect_port,
        })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.redirect_port)
    }

    pub fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            self.auth_url,
            encode(&self.client_id),
            encode(&self.redirect_uri()),
            encode(&GOOGLE_SCOPES.join(" ")),
            encode(state),
        )
    }

    /// Bind the callback listener and generate the authorization URL.
    pub async fn begin_authorization(&self) -> Result<PendingAuthorization, AuthError> {
        let state = generate_csrf_state()?;
        let listener = TcpListener::bind(("127.0.0.1", self.redirect_port))
            .await
            .map_err(|e| {
                AuthError::InvalidCallback(format!(
                    "cannot listen on port {}: {e}",
                    self.redirect_port
                ))
            })?;
        Ok(PendingAuthorization {
            url: self.authorization_url(&state),
            state,
            listener,
        })
    }

    /// Wait for the browser redirect and exchange its code.
    pub async fn complete_authorization(
        &self,
        pending: PendingAuthorization,
        timeout: Duration,
    ) -> Result<ProviderGrant, AuthError> {
        let code = tokio::time::timeout(
            timeout,
            wait_for_callback(&pending.listener, &pending.state),
        )
        .await
        .map_err(|_| AuthError::CallbackTimeout {
            timeout_secs: timeout.as_secs(),
        })??;
        drop(pending);
        self.exchange_code(&code).await
    }

    /// Exchange an authorization code for a grant.
    pub async fn exchange_code(&self, code: &str) -> Result<ProviderGrant, AuthError> {
        let redirect_uri = self.redirect_uri();
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        self.post_token_form(&params)
            .await
            .map_err(AuthError::TokenExchange)
    }

    async fn post_token_form(&self, params: &[(&str, &str)]) -> Result<ProviderGrant, String> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {e}"))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {e}"))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<TokenErrorBody>(&body) {
                Ok(TokenErrorBody {
                    error,
                    error_description: Some(desc),
                }) => format!("{error}: {desc}"),
                Ok(TokenErrorBody { error, .. }) => error,
                Err(_) => format!("{status}: {body}"),
            });
        }

        serde_json::from_str(&body).map_err(|e| format!("Failed to parse token response: {e}"))
    }
}

#[async_trait]
impl TokenRefresher for OAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<ProviderGrant, AuthError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let mut grant = self
            .post_token_form(&params)
            .await
            .map_err(AuthError::TokenRefresh)?;
        // Google usually omits the refresh token on refresh
        grant
            .refresh_token
            .get_or_insert_with(|| refresh_token.to_string());
        Ok(grant)
    }
}

fn validate_credentials(client_id: &str, client_secret: &str) -> Result<(), AuthError> {
    let missing = |v: &str, placeholder: &str| v.trim().is_empty() || v == placeholder;
    if missing(client_id, "YOUR_CLIENT_ID") || missing(client_secret, "YOUR_CLIENT_SECRET") {
        return Err(AuthError::CredentialsNotConfigured);
    }
    Ok(())
}

/// Generate a random state parameter for CSRF protection.
fn generate_csrf_state() -> Result<String, AuthError> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| AuthError::InvalidCallback(format!("failed to generate state: {e}")))?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(bytes))
}

async fn wait_for_callback(listener: &TcpListener, expected_state: &str) -> Result<String, AuthError> {
    loop {
        let (mut stream, _addr) = listener
            .accept()
            .await
            .map_err(|e| AuthError::InvalidCallback(format!("listener error: {e}")))?;

        let mut buf = [0u8; 8192];
        let size = stream
            .read(&mut buf)
            .await
            .map_err(|e| AuthError::InvalidCallback(format!("failed to read callback: {e}")))?;
        if size == 0 {
            continue;
        }

        let request = String::from_utf8_lossy(&buf[..size]);
        match check_callback(&request, expected_state) {
            Ok(Some(code)) => {
                send_html(&mut stream, "200 OK", "Connected", "Google Calendar authentication succeeded.").await;
                return Ok(code);
            }
            Ok(None) => {
                send_html(&mut stream, "404 Not Found", "OAuth Error", "Callback endpoint not found.").await;
            }
            Err(e) => {
                send_html(&mut stream, "400 Bad Request", "OAuth Error", &e.to_string()).await;
                return Err(e);
            }
        }
    }
}

/// Inspect a raw callback request.
///
/// `Ok(None)` means the request was not for `/callback` and should be
/// ignored; errors end the flow.
fn check_callback(request: &str, expected_state: &str) -> Result<Option<String>, AuthError> {
    let first_line = request.lines().next().unwrap_or_default();
    let mut parts = first_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();

    if method != "GET" {
        return Ok(None);
    }
    let Ok(parsed) = url::Url::parse(&format!("http://localhost{target}")) else {
        return Ok(None);
    };
    if parsed.path() != "/callback" {
        return Ok(None);
    }

    let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();

    if let Some(err) = params.get("error") {
        let msg = params.get("error_description").unwrap_or(err);
        return Err(AuthError::InvalidCallback(format!("provider returned error: {msg}")));
    }

    let state = params
        .get("state")
        .ok_or_else(|| AuthError::InvalidCallback("missing state".into()))?;
    if state != expected_state {
        return Err(AuthError::InvalidCallback("state mismatch".into()));
    }

    params
        .get("code")
        .cloned()
        .map(Some)
        .ok_or_else(|| AuthError::InvalidCallback("missing code".into()))
}

async fn send_html(stream: &mut TcpStream, status: &str, title: &str, message: &str) {
    let body = format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title></head><body><h2>{title}</h2><p>{message}</p><p>You can close this tab and return to taskcal.</p></body></html>"
    );
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;
}

fn encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
