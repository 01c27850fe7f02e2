use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use flate2::read::GzDecoder;
use reqwest::StatusCode;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::WatchError;
use crate::Result;

pub const DBIP_BASE_URL: &str = "https://download.db-ip.com/free";

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Calendar month of a database release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DbVersion {
    pub year: i32,
    pub month: u32,
}

impl DbVersion {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }
}

impl std::fmt::Display for DbVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseInfo {
    pub modified: DateTime<Local>,
    pub size: u64,
}

impl DatabaseInfo {
    pub fn version(&self) -> DbVersion {
        DbVersion::of(self.modified.date_naive())
    }
}

/// Downloads the free DB-IP city database. DB-IP publishes one file per
/// month; early in a month the current file may not exist yet, so the
/// previous month is tried on 404.
pub struct GeoIpUpdater {
    db_path: PathBuf,
    base_url: String,
    client: reqwest::Client,
}

impl GeoIpUpdater {
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("oxiwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            db_path: db_path.into(),
            base_url: DBIP_BASE_URL.to_string(),
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn url_for(&self, version: DbVersion) -> String {
        format!(
            "{}/dbip-city-lite-{}-{:02}.mmdb.gz",
            self.base_url, version.year, version.month
        )
    }

    pub fn database_exists(&self) -> bool {
        self.db_path.is_file()
    }

    pub fn database_info(&self) -> Result<DatabaseInfo> {
        let meta = fs::metadata(&self.db_path)?;
        Ok(DatabaseInfo {
            modified: DateTime::<Local>::from(meta.modified()?),
            size: meta.len(),
        })
    }

    /// Month the local file was written in.
    pub fn local_version(&self) -> Result<DbVersion> {
        Ok(self.database_info()?.version())
    }

    pub async fn latest_remote_version(&self) -> Result<DbVersion> {
        self.latest_remote_version_at(Utc::now().date_naive()).await
    }

    pub async fn latest_remote_version_at(&self, today: NaiveDate) -> Result<DbVersion> {
        let current = DbVersion::of(today);
        for version in [current, current.previous()] {
            let url = self.url_for(version);
            let status = self.client.head(&url).send().await?.status();
            debug!(%url, %status, "probed GeoIP release");
            if status.is_success() {
                return Ok(version);
            }
        }
        Err(WatchError::Download("no remote GeoIP database found".into()))
    }

    pub async fn needs_update(&self) -> Result<bool> {
        self.needs_update_at(Utc::now().date_naive()).await
    }

    /// A missing or unreadable local file always needs an update.
    pub async fn needs_update_at(&self, today: NaiveDate) -> Result<bool> {
        if !self.database_exists() {
            return Ok(true);
        }
        let Ok(local) = self.local_version() else {
            return Ok(true);
        };
        let remote = self.latest_remote_version_at(today).await?;
        Ok(remote > local)
    }

    pub async fn update(&self) -> Result<DbVersion> {
        self.update_at(Utc::now().date_naive()).await
    }

    /// Download, decompress and atomically move the database into place.
    pub async fn update_at(&self, today: NaiveDate) -> Result<DbVersion> {
        let mut version = DbVersion::of(today);
        info!(%version, "downloading GeoIP database from DB-IP");

        let mut response = self.client.get(self.url_for(version)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            version = version.previous();
            debug!(%version, "current month not published, trying previous");
            response = self.client.get(self.url_for(version)).send().await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(WatchError::Download(format!(
                "GeoIP download failed with status {status}"
            )));
        }
        let compressed = response.bytes().await?;

        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || install_gzip(&compressed, &db_path))
            .await
            .map_err(|e| WatchError::Download(format!("extraction task failed: {e}")))??;

        info!(path = %self.db_path.display(), %version, "GeoIP database updated");
        Ok(version)
    }
}

fn install_gzip(compressed: &[u8], dest: &Path) -> Result<()> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;

    let tmp = dest.with_extension("mmdb.tmp");
    let written = (|| -> io::Result<()> {
        let mut out = fs::File::create(&tmp)?;
        io::copy(&mut GzDecoder::new(compressed), &mut out)?;
        out.sync_all()
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(WatchError::Download(format!("failed to extract database: {e}")));
    }

    fs::rename(&tmp, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn previous_month_wraps_year() {
        let jan = DbVersion { year: 2026, month: 1 };
        assert_eq!(jan.previous(), DbVersion { year: 2025, month: 12 });
        assert_eq!(DbVersion { year: 2026, month: 7 }.previous().month, 6);
        assert!(DbVersion { year: 2026, month: 1 } > DbVersion { year: 2025, month: 12 });
    }

    #[test]
    fn download_url_format() {
        let updater = GeoIpUpdater::new("/tmp/x.mmdb").unwrap();
        assert_eq!(
            updater.url_for(DbVersion { year: 2026, month: 3 }),
            "https://download.db-ip.com/free/dbip-city-lite-2026-03.mmdb.gz"
        );
    }

    #[tokio::test]
    async fn update_falls_back_to_previous_month() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dbip-city-lite-2026-01.mmdb.gz"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dbip-city-lite-2025-12.mmdb.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(b"mmdb-payload")))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("geo").join("city.mmdb");
        let updater = GeoIpUpdater::new(&db).unwrap().with_base_url(server.uri());

        let version = updater.update_at(date(2026, 1, 2)).await.unwrap();
        assert_eq!(version, DbVersion { year: 2025, month: 12 });
        assert_eq!(fs::read(&db).unwrap(), b"mmdb-payload");
        assert!(!db.with_extension("mmdb.tmp").exists());
    }

    #[tokio::test]
    async fn update_reports_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let updater = GeoIpUpdater::new(dir.path().join("city.mmdb"))
            .unwrap()
            .with_base_url(server.uri());
        let err = updater.update_at(date(2026, 5, 10)).await.unwrap_err();
        assert!(matches!(err, WatchError::Download(_)));
        assert!(!updater.database_exists());
    }

    #[tokio::test]
    async fn corrupt_archive_leaves_existing_database() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not gzip".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("city.mmdb");
        fs::write(&db, b"old").unwrap();
        let updater = GeoIpUpdater::new(&db).unwrap().with_base_url(server.uri());

        assert!(updater.update_at(date(2026, 5, 10)).await.is_err());
        assert_eq!(fs::read(&db).unwrap(), b"old");
    }

    #[tokio::test]
    async fn missing_database_needs_update_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let updater = GeoIpUpdater::new(dir.path().join("absent.mmdb"))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        assert!(updater.needs_update().await.unwrap());
    }

    #[tokio::test]
    async fn fresh_database_is_up_to_date() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("city.mmdb");
        fs::write(&db, b"db").unwrap();
        let updater = GeoIpUpdater::new(&db).unwrap().with_base_url(server.uri());

        let today = Local::now().date_naive();
        assert_eq!(updater.local_version().unwrap(), DbVersion::of(today));
        assert!(!updater.needs_update_at(today).await.unwrap());

        // A release published next month makes the local copy stale.
        let next_month = today + chrono::Months::new(1);
        assert!(updater.needs_update_at(next_month).await.unwrap());
    }

    #[tokio::test]
    async fn remote_version_probes_previous_month() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/dbip-city-lite-2026-03.mmdb.gz"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/dbip-city-lite-2026-02.mmdb.gz"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let updater = GeoIpUpdater::new("/tmp/unused.mmdb")
            .unwrap()
            .with_base_url(server.uri());
        assert_eq!(
            updater.latest_remote_version_at(date(2026, 3, 1)).await.unwrap(),
            DbVersion { year: 2026, month: 2 }
        );
    }
}
