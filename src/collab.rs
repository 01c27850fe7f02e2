//! Interfaces the daemon core calls out to.
//!
//! Every implementation is shared between the event loop and scheduled
//! task actions, which run on different tokio tasks, so all of them must be
//! `Send + Sync` and do their own synchronization.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::event::Event;
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub country: String,
    pub city: String,
}

/// IP enrichment. A miss is `Ok(None)`; callers treat errors as a miss too.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<Option<Location>>;

    /// Release the underlying database. Later lookups miss.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert(&self, event: &Event, country: &str, city: &str) -> Result<()>;

    /// Delete events older than `retention_days`, returning how many went.
    async fn cleanup(&self, retention_days: u32) -> Result<u64>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_login_alert(&self, event: &Event, country: &str, city: &str) -> Result<()>;

    async fn send_daily_report(&self, text: &str) -> Result<()>;
}

#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn generate_daily_report(&self, date: NaiveDate) -> Result<String>;
}

/// GeoLookup used when enrichment is disabled.
pub struct NoGeoLookup;

#[async_trait]
impl GeoLookup for NoGeoLookup {
    async fn lookup(&self, _ip: &str) -> Result<Option<Location>> {
        Ok(None)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
