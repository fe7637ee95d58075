pub mod auth;
pub mod calendars;
pub mod config;
pub mod import;
pub mod serve;
pub mod sync;
pub mod task;

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use taskcal_core::auth::{AuthSession, KeyringVault, OAuthClient};
use taskcal_core::calendar::{http_client, GoogleCalendarClient};
use taskcal_core::schedule::{parse_date, ClockTime};
use taskcal_core::storage::data_dir;
use taskcal_core::{Config, JsonFileStore, SyncReport, TaskStore};

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

pub fn open_store() -> CliResult<TaskStore<JsonFileStore>> {
    let backend = JsonFileStore::open(data_dir()?)?;
    Ok(TaskStore::open(backend)?)
}

/// Everything needed to talk to Google on behalf of the signed-in user.
pub struct Remote {
    pub oauth: OAuthClient,
    pub session: Arc<AuthSession>,
    pub api: Arc<GoogleCalendarClient>,
}

pub fn connect(config: &Config) -> CliResult<Remote> {
    let http = http_client(&config.http)?;
    let oauth = OAuthClient::from_config(&config.google, http.clone())?;
    let session = AuthSession::restore(Arc::new(oauth.clone()), Box::new(KeyringVault::default()))?;
    let api = GoogleCalendarClient::new(http, config.google.api_base.as_str());
    Ok(Remote {
        oauth,
        session: Arc::new(session),
        api: Arc::new(api),
    })
}

/// `--date` value, or today in local time.
pub fn date_or_today(value: Option<&str>) -> CliResult<NaiveDate> {
    match value {
        Some(s) => Ok(parse_date(s)?),
        None => Ok(Local::now().date_naive()),
    }
}

/// `--start` value, or the configured default start time.
pub fn start_or_default(value: Option<&str>, config: &Config) -> CliResult<ClockTime> {
    let raw = value.unwrap_or(&config.schedule.default_start_time);
    Ok(raw.parse()?)
}

pub fn print_report(report: &SyncReport) {
    for outcome in &report.results {
        let label = outcome.summary.as_deref().unwrap_or(&outcome.local_id);
        match (&outcome.event_id, &outcome.error) {
            (Some(event_id), _) if outcome.success => println!("  ok    {label} -> {event_id}"),
            (_, Some(error)) => println!("  fail  {label}: {error}"),
            _ => println!("  fail  {label}"),
        }
    }
    println!(
        "{} created, {} failed",
        report.created_count,
        report.failed_count()
    );
    if report.auth_aborted {
        println!("sync stopped: Google session expired, run `taskcal auth login`");
    }
}
