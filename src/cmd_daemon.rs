use anyhow::{Context, Result};
use console::style;
use oxiwatch::config::Settings;
use oxiwatch::daemon::{self, shutdown_signal};
use oxiwatch::source::JournalSource;
use oxiwatch::{clienv, logging};

pub(crate) async fn cmd_daemon() -> Result<()> {
    let settings = Settings::load().context("failed to load config")?;
    logging::init(&settings.log_level);
    settings.validate().context("invalid config")?;

    println!(
        "{} Monitoring SSH logins on {} (Ctrl+C to stop)",
        style("→").cyan(),
        style(&settings.server_name).bold()
    );
    println!(
        "  Config:   {}",
        style(clienv::config_path().display()).dim()
    );
    println!(
        "  Database: {}",
        style(settings.database_path.display()).dim()
    );

    let source_config = settings.source_config();
    let runtime = daemon::build(settings).await?;
    let source = JournalSource::new(source_config, runtime.daemon.stats());

    runtime
        .daemon
        .run(Box::new(source), runtime.scheduler, shutdown_signal())
        .await
        .context("daemon stopped with an error")
}
