//! IP geolocation backed by a local DB-IP database that is refreshed
//! monthly.

mod resolver;
mod updater;

pub use resolver::GeoIpResolver;
pub use updater::{DatabaseInfo, DbVersion, GeoIpUpdater, DBIP_BASE_URL};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

use crate::collab::{GeoLookup, Location};
use crate::Result;

/// Shared, reloadable resolver. Lookups take a read lock; `reload` and
/// `close` swap the reader under the write lock. With no database loaded
/// every lookup misses.
pub struct GeoIpService {
    path: PathBuf,
    resolver: RwLock<Option<GeoIpResolver>>,
}

impl GeoIpService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            resolver: RwLock::new(None),
        }
    }

    /// Load the database if the file exists. A missing or broken file is
    /// logged and leaves the service empty.
    pub fn open_if_present(path: impl Into<PathBuf>) -> Self {
        let service = Self::new(path);
        if service.path.is_file() {
            if let Err(e) = service.reload() {
                warn!(path = %service.path.display(), error = %e, "failed to load GeoIP database");
            }
        }
        service
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.read().is_some()
    }

    /// Reopen the database from disk, replacing the current reader.
    pub fn reload(&self) -> Result<()> {
        let resolver = GeoIpResolver::open(&self.path)?;
        *self.write() = Some(resolver);
        info!(path = %self.path.display(), "GeoIP database loaded");
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<GeoIpResolver>> {
        self.resolver.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<GeoIpResolver>> {
        self.resolver.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl GeoLookup for GeoIpService {
    async fn lookup(&self, ip: &str) -> Result<Option<Location>> {
        match self.read().as_ref() {
            Some(resolver) => resolver.lookup(ip),
            None => Ok(None),
        }
    }

    async fn close(&self) -> Result<()> {
        self.write().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_service_misses() {
        let dir = tempfile::tempdir().unwrap();
        let service = GeoIpService::open_if_present(dir.path().join("none.mmdb"));
        assert!(!service.is_loaded());
        assert_eq!(service.lookup("8.8.8.8").await.unwrap(), None);
    }

    #[tokio::test]
    async fn broken_file_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mmdb");
        std::fs::write(&path, b"junk").unwrap();

        let service = GeoIpService::open_if_present(&path);
        assert!(!service.is_loaded());
        assert!(service.reload().is_err());
        service.close().await.unwrap();
        assert_eq!(service.lookup("1.1.1.1").await.unwrap(), None);
    }
}
