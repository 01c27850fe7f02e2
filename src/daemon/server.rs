use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::setup::GeoIpMaintenance;
use super::tasks;
use crate::collab::{EventStore, GeoLookup, Location, Notifier, ReportRenderer};
use crate::config::Settings;
use crate::error::WatchError;
use crate::event::Event;
use crate::scheduler::{parse_timezone, Scheduler};
use crate::source::LogSource;
use crate::stats::PipelineStats;
use crate::Result;

const RETENTION_TASK_TIME: &str = "03:00";
const GEOIP_TASK_TIME: &str = "04:00";
const MAINTENANCE_TIMEZONE: &str = "UTC";

#[derive(Clone)]
pub struct Collaborators {
    pub geo: Arc<dyn GeoLookup>,
    pub store: Arc<dyn EventStore>,
    pub notifier: Arc<dyn Notifier>,
    pub reports: Arc<dyn ReportRenderer>,
}

pub struct Daemon {
    settings: Settings,
    collab: Collaborators,
    stats: Arc<PipelineStats>,
}

impl Daemon {
    pub fn new(settings: Settings, collab: Collaborators) -> Self {
        Self {
            settings,
            collab,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn with_stats(mut self, stats: Arc<PipelineStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Register the recurring jobs: the daily report (if enabled), retention
    /// cleanup every day at 03:00 UTC, and the GeoIP refresh on the last day
    /// of each month at 04:00 UTC when enrichment is on.
    pub fn register_tasks(
        &self,
        scheduler: &mut Scheduler,
        geoip: Option<GeoIpMaintenance>,
    ) -> Result<()> {
        if self.settings.daily_report_enabled {
            let tz = parse_timezone(&self.settings.daily_report_timezone)?;
            let reports = Arc::clone(&self.collab.reports);
            let notifier = Arc::clone(&self.collab.notifier);
            scheduler.add_daily_task(
                "daily-report",
                &self.settings.daily_report_time,
                &self.settings.daily_report_timezone,
                move || tasks::send_daily_report(Arc::clone(&reports), Arc::clone(&notifier), tz),
            )?;
        }

        let store = Arc::clone(&self.collab.store);
        let retention_days = self.settings.retention_days;
        scheduler.add_daily_task(
            "retention-cleanup",
            RETENTION_TASK_TIME,
            MAINTENANCE_TIMEZONE,
            move || tasks::run_cleanup(Arc::clone(&store), retention_days),
        )?;

        if self.settings.geoip_enabled {
            if let Some(maintenance) = geoip {
                let maintenance = Arc::new(maintenance);
                scheduler.add_monthly_last_day_task(
                    "geoip-update",
                    GEOIP_TASK_TIME,
                    MAINTENANCE_TIMEZONE,
                    move || tasks::refresh_geoip(Arc::clone(&maintenance)),
                )?;
            }
        }

        Ok(())
    }

    /// Run until `shutdown` resolves or the event stream closes, then tear
    /// everything down. Failing to start the source is returned as-is after
    /// the collaborators are closed.
    pub async fn run<S>(
        self,
        mut source: Box<dyn LogSource>,
        scheduler: Scheduler,
        shutdown: S,
    ) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let cancel = CancellationToken::new();

        let Some(mut events) = source.events() else {
            let err = WatchError::Config("event channel was already taken".into());
            error!(error = %err, "cannot read from log source");
            let _ = self.teardown(source, None, cancel).await;
            return Err(err);
        };

        if let Err(e) = source.start(cancel.clone()).await {
            error!(error = %e, "failed to start log source");
            let _ = self.teardown(source, None, cancel).await;
            return Err(e);
        }
        info!(unit = %self.settings.journal_unit, "started monitoring SSH journal");

        let scheduler_handle = tokio::spawn(scheduler.run(cancel.child_token()));
        info!(server = %self.settings.server_name, "daemon started");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.process_event(&event).await,
                    None => {
                        info!("journal stream closed");
                        break;
                    }
                }
            }
        }

        drop(events);
        self.teardown(source, Some(scheduler_handle), cancel).await
    }

    /// Enrich, persist and (for successful logins) alert. Nothing here is
    /// fatal; failures are logged and counted.
    pub async fn process_event(&self, event: &Event) {
        PipelineStats::incr(&self.stats.events_processed);

        let location = match self.collab.geo.lookup(&event.ip).await {
            Ok(found) => found.unwrap_or_default(),
            Err(e) => {
                warn!(ip = %event.ip, error = %e, "GeoIP lookup failed");
                PipelineStats::incr(&self.stats.geo_failures);
                Location::default()
            }
        };

        if let Err(e) = self
            .collab
            .store
            .insert(event, &location.country, &location.city)
            .await
        {
            error!(error = %e, user = %event.username, ip = %event.ip, "failed to store event");
            PipelineStats::incr(&self.stats.store_failures);
            return;
        }

        if !event.is_success() {
            debug!(
                user = %event.username,
                ip = %event.ip,
                invalid_user = event.invalid_user,
                "failed SSH attempt"
            );
            return;
        }

        info!(
            user = %event.username,
            ip = %event.ip,
            method = %event.method,
            country = %location.country,
            city = %location.city,
            "successful SSH login"
        );
        if let Err(e) = self
            .collab
            .notifier
            .send_login_alert(event, &location.country, &location.city)
            .await
        {
            error!(error = %e, "failed to send Telegram alert");
            PipelineStats::incr(&self.stats.notify_failures);
        }
    }

    /// Cancel, stop the source, wait for a running task to finish, close
    /// GeoIP, close storage. Every step runs even if an earlier one failed;
    /// the first error is returned.
    async fn teardown(
        &self,
        mut source: Box<dyn LogSource>,
        scheduler: Option<JoinHandle<()>>,
        cancel: CancellationToken,
    ) -> Result<()> {
        info!("shutting down");
        cancel.cancel();

        let mut first_error: Option<WatchError> = None;
        let mut record = |step: &str, result: Result<()>| {
            if let Err(e) = result {
                error!(step, error = %e, "shutdown step failed");
                first_error.get_or_insert(e);
            }
        };

        record("stop log source", source.stop().await);

        if let Some(handle) = scheduler {
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduler task ended abnormally");
            }
        }

        record("close geoip", self.collab.geo.close().await);
        record("close storage", self.collab.store.close().await);

        let snapshot = self.stats.snapshot();
        info!(
            processed = snapshot.events_processed,
            skipped = snapshot.records_skipped,
            geo_failures = snapshot.geo_failures,
            store_failures = snapshot.store_failures,
            notify_failures = snapshot.notify_failures,
            task_failures = snapshot.task_failures,
            "daemon stopped"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Resolves on the first SIGTERM or SIGINT.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "failed to install signal handlers, falling back to Ctrl+C");
            }
        }
    }

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C");
    }
}
