use clap::Args;
use taskcal_core::sync::{sync_pending, CalendarSyncEngine};
use taskcal_core::Config;

use super::{connect, open_store, print_report, runtime, CliResult};

#[derive(Args)]
pub struct SyncArgs {
    /// IANA time zone for created events
    #[arg(long)]
    pub time_zone: Option<String>,
    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Push every unsynced or previously failed task.
pub fn run(args: SyncArgs) -> CliResult {
    let config = Config::load()?;
    let time_zone = args.time_zone.unwrap_or(config.sync.time_zone.clone());
    let remote = connect(&config)?;
    let engine = CalendarSyncEngine::new(remote.api, remote.session);
    let store = tokio::sync::Mutex::new(open_store()?);

    let report = runtime()?.block_on(sync_pending(&store, &engine, &time_zone, None))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.results.is_empty() {
        println!("Nothing to sync.");
    } else {
        print_report(&report);
    }

    if report.auth_aborted {
        return Err("sync aborted: authentication required".into());
    }
    Ok(())
}
