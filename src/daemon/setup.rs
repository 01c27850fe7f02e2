use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use super::server::{Collaborators, Daemon};
use crate::clienv;
use crate::collab::{GeoLookup, NoGeoLookup};
use crate::config::Settings;
use crate::geoip::{GeoIpService, GeoIpUpdater};
use crate::notifier::TelegramNotifier;
use crate::report::ReportGenerator;
use crate::scheduler::{parse_timezone, Scheduler};
use crate::self_update::{VersionChecker, CURRENT_VERSION};
use crate::storage::SqliteStore;

/// What the monthly refresh job needs: a downloader and the live service
/// to reload afterwards.
pub struct GeoIpMaintenance {
    pub updater: GeoIpUpdater,
    pub service: Arc<GeoIpService>,
}

/// A daemon wired to the real collaborators, plus its scheduler with every
/// task registered.
pub struct Runtime {
    pub daemon: Daemon,
    pub scheduler: Scheduler,
}

/// Open storage, load (or first download) the GeoIP database and build the
/// Telegram and report collaborators from `settings`.
pub async fn build(settings: Settings) -> Result<Runtime> {
    let store = Arc::new(
        SqliteStore::open(&settings.database_path).with_context(|| {
            format!("failed to open database {}", settings.database_path.display())
        })?,
    );
    info!(path = %settings.database_path.display(), "event database ready");

    let (geo, maintenance): (Arc<dyn GeoLookup>, Option<GeoIpMaintenance>) =
        if settings.geoip_enabled {
            let (service, maintenance) = init_geoip(&settings).await?;
            (service as Arc<dyn GeoLookup>, Some(maintenance))
        } else {
            info!("GeoIP enrichment disabled");
            (Arc::new(NoGeoLookup) as Arc<dyn GeoLookup>, None)
        };

    let notifier = TelegramNotifier::new(
        &settings.telegram_bot_token,
        &settings.telegram_chat_id,
        &settings.server_name,
    )?;

    let tz = parse_timezone(&settings.daily_report_timezone)?;
    let mut reports = ReportGenerator::new(Arc::clone(&store), settings.server_name.clone(), tz);
    match VersionChecker::new(CURRENT_VERSION, clienv::release_repo()) {
        Ok(checker) => reports = reports.with_update_checker(checker),
        Err(e) => warn!(error = %e, "update checks disabled"),
    }

    let collab = Collaborators {
        geo,
        store,
        notifier: Arc::new(notifier),
        reports: Arc::new(reports),
    };

    let daemon = Daemon::new(settings, collab);
    let mut scheduler = Scheduler::new().with_stats(daemon.stats());
    daemon
        .register_tasks(&mut scheduler, maintenance)
        .context("failed to register scheduled tasks")?;

    Ok(Runtime { daemon, scheduler })
}

/// A missing database is downloaded once at startup; if that fails the
/// daemon runs without enrichment until the monthly refresh succeeds.
async fn init_geoip(settings: &Settings) -> Result<(Arc<GeoIpService>, GeoIpMaintenance)> {
    let updater = GeoIpUpdater::new(&settings.geoip_database_path)?;

    if !updater.database_exists() {
        info!("GeoIP database not found, downloading");
        if let Err(e) = updater.update().await {
            warn!(error = %e, "failed to download GeoIP database, continuing without geo lookup");
        }
    }

    let service = Arc::new(GeoIpService::open_if_present(&settings.geoip_database_path));
    Ok((
        Arc::clone(&service),
        GeoIpMaintenance { updater, service },
    ))
}
