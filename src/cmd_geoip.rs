use anyhow::{Context, Result};
use chrono::DateTime;
use console::style;
use oxiwatch::config::Settings;
use oxiwatch::geoip::{GeoIpResolver, GeoIpUpdater};
use oxiwatch::report::format_location;

use crate::args::GeoipCommands;

pub(crate) async fn cmd_geoip(command: GeoipCommands) -> Result<()> {
    let settings = Settings::load().context("failed to load config")?;
    let updater = GeoIpUpdater::new(&settings.geoip_database_path)?;

    match command {
        GeoipCommands::Update => cmd_geoip_update(&updater).await,
        GeoipCommands::Status => cmd_geoip_status(&updater).await,
        GeoipCommands::Lookup { ip } => cmd_geoip_lookup(&updater, &ip),
    }
}

async fn cmd_geoip_update(updater: &GeoIpUpdater) -> Result<()> {
    println!("{}", style("Downloading GeoIP database...").cyan());
    let version = updater
        .update()
        .await
        .context("failed to update GeoIP database")?;
    println!(
        "{} GeoIP database {} installed at {}",
        style("✓").green(),
        style(version).bold(),
        updater.db_path().display()
    );
    Ok(())
}

async fn cmd_geoip_status(updater: &GeoIpUpdater) -> Result<()> {
    if !updater.database_exists() {
        println!("GeoIP database: {}", style("not found").yellow());
        println!("Path: {}", updater.db_path().display());
        println!();
        println!("Run 'oxiwatch geoip update' to download the database");
        return Ok(());
    }

    let info = updater
        .database_info()
        .context("failed to read database info")?;
    let local = info.version();

    println!("GeoIP database: {}", style("installed").green());
    println!("Path: {}", updater.db_path().display());
    println!("Size: {:.2} MB", info.size as f64 / 1024.0 / 1024.0);
    println!("Local version: {local}");
    println!("Last modified: {}", info.modified.format("%Y-%m-%d %H:%M:%S"));

    match GeoIpResolver::open(updater.db_path()) {
        Ok(resolver) => {
            let built = i64::try_from(resolver.build_epoch())
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("Type: {} (built {built})", resolver.database_type());
        }
        Err(e) => println!("Type: {} ({e})", style("unreadable").red()),
    }
    println!();

    println!("Remote check:");
    match updater.latest_remote_version().await {
        Ok(remote) => {
            println!("  Latest available: {remote}");
            if remote > local {
                println!("  Status: {}", style("Update available").yellow());
                println!("  Run 'oxiwatch geoip update' to download the latest version");
            } else {
                println!("  Status: {}", style("Up to date").green());
            }
        }
        Err(e) => println!("  Failed to check remote: {e}"),
    }
    Ok(())
}

fn cmd_geoip_lookup(updater: &GeoIpUpdater, ip: &str) -> Result<()> {
    let resolver = GeoIpResolver::open(updater.db_path()).with_context(|| {
        format!("failed to open GeoIP database {}", updater.db_path().display())
    })?;

    match resolver.lookup(ip)? {
        Some(location) => println!(
            "{} {}",
            style(ip).bold(),
            format_location(&location.country, &location.city)
        ),
        None => println!("{} {}", style(ip).bold(), style("no location").dim()),
    }
    Ok(())
}
