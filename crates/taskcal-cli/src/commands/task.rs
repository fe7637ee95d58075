use clap::Subcommand;
use taskcal_core::{Config, SyncState, Task, TaskDraft, ValidationError};

use super::{connect, date_or_today, open_store, runtime, start_or_default, CliResult};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a single task
    Add {
        /// Task title
        title: String,
        /// Duration in minutes
        #[arg(long, default_value_t = 30)]
        duration: u32,
        /// Break after the task, in minutes (defaults to the stored default break)
        #[arg(long)]
        break_after: Option<u32>,
        /// Date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Start time (HH:mm)
        #[arg(long)]
        start: Option<String>,
        /// Target calendar id
        #[arg(long)]
        calendar: Option<String>,
        /// Event description
        #[arg(long)]
        description: Option<String>,
    },
    /// List tasks
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a task (and its calendar event, if synced)
    Remove {
        /// Task ID
        id: String,
        /// Keep the calendar event, only forget the local task
        #[arg(long)]
        local_only: bool,
    },
    /// Show or set the default break between imported tasks
    DefaultBreak {
        /// New default in minutes
        minutes: Option<u32>,
    },
}

pub fn run(action: TaskAction) -> CliResult {
    match action {
        TaskAction::Add {
            title,
            duration,
            break_after,
            date,
            start,
            calendar,
            description,
        } => {
            if duration == 0 {
                return Err(ValidationError::InvalidDuration(duration).into());
            }
            let config = Config::load()?;
            let mut store = open_store()?;
            let draft = TaskDraft {
                title,
                description,
                duration,
                break_after: break_after.unwrap_or_else(|| store.default_break_minutes()),
                date: date_or_today(date.as_deref())?,
                start_time: start_or_default(start.as_deref(), &config)?,
                calendar_id: calendar.unwrap_or(config.sync.default_calendar_id),
                calendar_name: None,
                calendar_color: None,
            };
            draft.validate()?;
            let task = store.add(draft)?;
            println!("Task added: {}", task.id);
            println!("{}", describe(&task));
        }
        TaskAction::List { json } => {
            let store = open_store()?;
            if json {
                println!("{}", serde_json::to_string_pretty(store.all())?);
            } else if store.is_empty() {
                println!("No tasks.");
            } else {
                for task in store.all() {
                    println!("{}  {}", task.id, describe(task));
                }
            }
        }
        TaskAction::Remove { id, local_only } => {
            let mut store = open_store()?;
            let synced = match store.get(&id) {
                Some(task) => task.synced(),
                None => return Err(format!("task not found: {id}").into()),
            };
            let removed = if local_only || !synced {
                store.remove(&id)?
            } else {
                let config = Config::load()?;
                let remote = connect(&config)?;
                runtime()?.block_on(store.remove_with_remote(
                    &id,
                    remote.api.as_ref(),
                    &remote.session,
                ))?
            };
            if let Some(task) = removed {
                println!("Task removed: {} ({})", task.id, task.title());
            }
        }
        TaskAction::DefaultBreak { minutes } => {
            let mut store = open_store()?;
            if let Some(minutes) = minutes {
                store.set_default_break_minutes(minutes)?;
            }
            println!("{}", store.default_break_minutes());
        }
    }
    Ok(())
}

fn describe(task: &Task) -> String {
    let draft = &task.draft;
    let status = match &task.sync {
        SyncState::Synced { .. } => "synced".to_string(),
        SyncState::Failed { reason } => format!("failed: {reason}"),
        SyncState::Pending { .. } => "pending".to_string(),
        SyncState::Idle => "not synced".to_string(),
    };
    format!(
        "{} {}-{}  {} ({} min) [{}] {}",
        draft.date,
        draft.start_time,
        draft.end_time(),
        draft.title,
        draft.duration,
        draft.calendar_id,
        status
    )
}
