use anyhow::{Context, Result};
use chrono::Utc;
use console::style;
use oxiwatch::config::Settings;
use oxiwatch::report::ReportGenerator;
use oxiwatch::scheduler::parse_timezone;
use oxiwatch::storage::SqliteStore;
use std::sync::Arc;

use crate::args::StatsCommands;

pub(crate) async fn cmd_stats(command: Option<StatsCommands>) -> Result<()> {
    let settings = Settings::load().context("failed to load config")?;
    let store = Arc::new(open_store(&settings)?);
    let tz = parse_timezone(&settings.daily_report_timezone)?;
    let reports = ReportGenerator::new(Arc::clone(&store), settings.server_name.clone(), tz);

    let now = Utc::now();
    let output = match command.unwrap_or(StatsCommands::Today) {
        StatsCommands::Today => reports.stats_report(1, now),
        StatsCommands::Report { days } => reports.stats_report(days, now),
        StatsCommands::Logins { days } => reports.logins_report(days, now),
    }
    .context("failed to generate report")?;

    print!("{output}");
    store.close_connection()?;
    Ok(())
}

pub(crate) async fn cmd_cleanup() -> Result<()> {
    let settings = Settings::load().context("failed to load config")?;
    let store = open_store(&settings)?;

    let deleted = store
        .cleanup_older_than(settings.retention_days)
        .context("cleanup failed")?;
    store.close_connection()?;

    println!(
        "{} Deleted {} records older than {} days",
        style("✓").green(),
        style(deleted).bold(),
        settings.retention_days
    );
    Ok(())
}

fn open_store(settings: &Settings) -> Result<SqliteStore> {
    SqliteStore::open(&settings.database_path).with_context(|| {
        format!("failed to open database {}", settings.database_path.display())
    })
}
