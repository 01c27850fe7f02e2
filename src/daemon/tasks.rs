//! Bodies of the scheduled jobs. Each takes its own `Arc` handles so the
//! returned future is `'static`.

use anyhow::Context;
use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{info, warn};

use super::setup::GeoIpMaintenance;
use crate::collab::{EventStore, Notifier, ReportRenderer};

/// Render yesterday's report (in the report timezone) and send it.
pub async fn send_daily_report(
    reports: Arc<dyn ReportRenderer>,
    notifier: Arc<dyn Notifier>,
    tz: Tz,
) -> anyhow::Result<()> {
    let today = Utc::now().with_timezone(&tz).date_naive();
    let yesterday = today.pred_opt().unwrap_or(today);

    let text = reports
        .generate_daily_report(yesterday)
        .await
        .with_context(|| format!("failed to generate report for {yesterday}"))?;
    notifier
        .send_daily_report(&text)
        .await
        .context("failed to send daily report")?;

    info!(date = %yesterday, "daily report sent");
    Ok(())
}

pub async fn run_cleanup(store: Arc<dyn EventStore>, retention_days: u32) -> anyhow::Result<()> {
    let deleted = store
        .cleanup(retention_days)
        .await
        .context("retention cleanup failed")?;
    if deleted > 0 {
        info!(deleted, retention_days, "retention cleanup completed");
    }
    Ok(())
}

/// Download a newer GeoIP database if one was published and reload the
/// resolver. Failing to reach the server is only a warning.
pub async fn refresh_geoip(maintenance: Arc<GeoIpMaintenance>) -> anyhow::Result<()> {
    let needs_update = match maintenance.updater.needs_update().await {
        Ok(needed) => needed,
        Err(e) => {
            warn!(error = %e, "failed to check for GeoIP update");
            return Ok(());
        }
    };
    if !needs_update {
        info!("GeoIP database is up to date");
        return Ok(());
    }

    maintenance
        .updater
        .update()
        .await
        .context("GeoIP download failed")?;
    maintenance
        .service
        .reload()
        .context("failed to load updated GeoIP database")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatchError;
    use crate::event::Event;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
        rendered: Mutex<Vec<NaiveDate>>,
        fail_render: bool,
    }

    #[async_trait]
    impl ReportRenderer for Recorder {
        async fn generate_daily_report(&self, date: NaiveDate) -> crate::Result<String> {
            if self.fail_render {
                return Err(WatchError::StoreClosed);
            }
            self.rendered.lock().unwrap().push(date);
            Ok(format!("report for {date}"))
        }
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn send_login_alert(&self, _: &Event, _: &str, _: &str) -> crate::Result<()> {
            Ok(())
        }

        async fn send_daily_report(&self, text: &str) -> crate::Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn daily_report_is_for_yesterday() {
        let rec = Arc::new(Recorder::default());
        send_daily_report(rec.clone(), rec.clone(), Tz::UTC).await.unwrap();

        let expected = Utc::now().date_naive().pred_opt().unwrap();
        assert_eq!(*rec.rendered.lock().unwrap(), vec![expected]);
        assert_eq!(rec.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn render_failure_sends_nothing() {
        let rec = Arc::new(Recorder {
            fail_render: true,
            ..Recorder::default()
        });
        assert!(send_daily_report(rec.clone(), rec.clone(), Tz::UTC).await.is_err());
        assert!(rec.sent.lock().unwrap().is_empty());
    }

    struct CountingStore(Mutex<Vec<u32>>);

    #[async_trait]
    impl EventStore for CountingStore {
        async fn insert(&self, _: &Event, _: &str, _: &str) -> crate::Result<()> {
            Ok(())
        }

        async fn cleanup(&self, retention_days: u32) -> crate::Result<u64> {
            self.0.lock().unwrap().push(retention_days);
            Ok(3)
        }

        async fn close(&self) -> crate::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn cleanup_uses_configured_retention() {
        let store = Arc::new(CountingStore(Mutex::new(Vec::new())));
        run_cleanup(store.clone(), 30).await.unwrap();
        assert_eq!(*store.0.lock().unwrap(), vec![30]);
    }
}
