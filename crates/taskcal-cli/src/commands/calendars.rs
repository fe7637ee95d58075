use clap::Args;
use taskcal_core::{CalendarCatalog, Config};

use super::{connect, runtime, CliResult};

#[derive(Args)]
pub struct CalendarsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: CalendarsArgs) -> CliResult {
    let config = Config::load()?;
    let remote = connect(&config)?;
    let catalog = CalendarCatalog::new(remote.api, remote.session);
    let calendars = runtime()?.block_on(catalog.list())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&calendars)?);
        return Ok(());
    }
    for calendar in &calendars {
        let marker = if calendar.primary { "*" } else { " " };
        println!("{marker} {}  {}", calendar.id, calendar.name);
    }
    Ok(())
}
