use std::time::Duration;

use chrono::{DateTime, Local};
use clap::Subcommand;
use taskcal_core::auth::{AuthStatus, KeyringVault, TokenVault, OAUTH_CONNECT_TIMEOUT_SECS};
use taskcal_core::Config;

use super::{connect, runtime, CliResult};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Sign in to Google in the browser
    Login {
        /// OAuth client ID (saved to the config file)
        #[arg(long)]
        client_id: Option<String>,
        /// OAuth client secret (saved to the config file)
        #[arg(long)]
        client_secret: Option<String>,
        /// Print the URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Forget the stored Google token
    Logout,
    /// Check authentication status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: AuthAction) -> CliResult {
    match action {
        AuthAction::Login {
            client_id,
            client_secret,
            no_browser,
        } => login(client_id, client_secret, no_browser),
        AuthAction::Logout => logout(),
        AuthAction::Status { json } => {
            let status = AuthStatus::from_token(KeyringVault::default().load()?.as_ref());
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
            Ok(())
        }
    }
}

fn login(client_id: Option<String>, client_secret: Option<String>, no_browser: bool) -> CliResult {
    let mut config = Config::load()?;
    if client_id.is_some() || client_secret.is_some() {
        if let Some(id) = client_id {
            config.google.client_id = id;
        }
        if let Some(secret) = client_secret {
            config.google.client_secret = secret;
        }
        config.save()?;
    }

    let remote = connect(&config)?;
    runtime()?.block_on(async {
        let pending = remote.oauth.begin_authorization().await?;
        println!("Open this URL to authorize taskcal:\n\n  {}\n", pending.url);
        if !no_browser {
            pending.open_in_browser();
        }
        println!("Waiting for the browser redirect...");
        let grant = remote
            .oauth
            .complete_authorization(pending, Duration::from_secs(OAUTH_CONNECT_TIMEOUT_SECS))
            .await?;
        remote.session.issue(grant).await
    })?;
    println!("Google authenticated");
    Ok(())
}

fn logout() -> CliResult {
    let config = Config::load()?;
    match connect(&config) {
        Ok(remote) => runtime()?.block_on(remote.session.logout())?,
        // no OAuth client configured: nothing can refresh, just drop what is stored
        Err(e) => {
            tracing::debug!("logging out without a session: {e}");
            KeyringVault::default().clear()?;
        }
    }
    println!("Google disconnected");
    Ok(())
}

fn print_status(status: &AuthStatus) {
    if status.authenticated {
        println!("authenticated");
    } else {
        println!("not authenticated");
    }
    if let Some(expires) = status
        .expires_at_ms
        .and_then(DateTime::from_timestamp_millis)
    {
        println!("token expires: {}", expires.with_timezone(&Local));
    }
    if status.has_refresh_token {
        println!("refresh token: stored");
    }
    if let Some(error) = &status.error {
        println!("last error: {error}");
    }
}
