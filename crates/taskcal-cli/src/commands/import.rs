use std::io::Read;

use clap::Args;
use taskcal_core::sync::{sync_pending, CalendarSyncEngine};
use taskcal_core::workflow::WorkflowError;
use taskcal_core::{Config, ImportFlow, ValidationError};

use super::{connect, date_or_today, open_store, print_report, runtime, start_or_default, CliResult};

#[derive(Args)]
pub struct ImportArgs {
    /// Checklist file (`- [ ] Title [30 min]` per line), or `-` for stdin
    pub file: String,
    /// Date (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    pub date: Option<String>,
    /// Start time of the first task (HH:mm)
    #[arg(long)]
    pub start: Option<String>,
    /// Break after every task, in minutes (defaults to the stored default break)
    #[arg(long)]
    pub break_after: Option<u32>,
    /// Target calendar id for every task
    #[arg(long)]
    pub calendar: Option<String>,
    /// Push the imported tasks to Google Calendar
    #[arg(long)]
    pub sync: bool,
    /// Print the schedule without storing anything
    #[arg(long)]
    pub dry_run: bool,
    /// IANA time zone for created events
    #[arg(long)]
    pub time_zone: Option<String>,
}

pub fn run(args: ImportArgs) -> CliResult {
    let config = Config::load()?;
    let text = read_input(&args.file)?;
    let mut store = open_store()?;

    let date = date_or_today(args.date.as_deref())?;
    let start = start_or_default(args.start.as_deref(), &config)?;
    let break_after = args
        .break_after
        .unwrap_or_else(|| store.default_break_minutes());
    let calendar_id = args
        .calendar
        .unwrap_or_else(|| config.sync.default_calendar_id.clone());

    let mut flow = ImportFlow::new(date, start);
    let count = match flow.parse(&text, break_after, &calendar_id) {
        Ok(count) => count,
        Err(WorkflowError::Validation(ValidationError::ParseEmpty)) => {
            println!("No tasks found. Expected lines like `- [ ] Title [30 min]`.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let schedule = flow.preview()?;

    println!("{count} task(s) on {date}:");
    for draft in &schedule.drafts {
        println!(
            "  {}-{}  {} ({} min)",
            draft.start_time,
            draft.end_time(),
            draft.title,
            draft.duration
        );
    }
    if schedule.overflows() {
        if config.schedule.reject_overflow {
            schedule.ensure_fits_day()?;
        }
        eprintln!("warning: the schedule runs past midnight; late start times wrapped around");
    }
    if args.dry_run {
        return Ok(());
    }

    let schedule = flow.begin_submit()?;
    let added = store.add_batch(schedule.into_drafts())?;
    println!("Imported {} task(s).", added.len());
    if !args.sync {
        return Ok(());
    }

    let ids: Vec<String> = added.into_iter().map(|t| t.id).collect();
    let time_zone = args
        .time_zone
        .unwrap_or_else(|| config.sync.time_zone.clone());
    let remote = connect(&config)?;
    let engine = CalendarSyncEngine::new(remote.api, remote.session);
    let store = tokio::sync::Mutex::new(store);

    let result = runtime()?.block_on(sync_pending(
        &store,
        &engine,
        &time_zone,
        Some(ids.as_slice()),
    ));
    match result {
        Ok(report) => {
            print_report(&report);
            let aborted = report.auth_aborted;
            flow.finish(report)?;
            if aborted {
                return Err("sync aborted: authentication required".into());
            }
        }
        Err(e) => {
            flow.fail(e.to_string())?;
            return Err(e.into());
        }
    }
    tracing::debug!(state = ?flow.state(), "import finished");
    Ok(())
}

fn read_input(file: &str) -> CliResult<String> {
    if file == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(std::fs::read_to_string(file)?)
    }
}
