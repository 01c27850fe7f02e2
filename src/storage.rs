//! SQLite event store.
//!
//! One table, `ssh_events`, written by the daemon and read by the report
//! and `stats` commands. Timestamps are UTC epoch seconds.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::collab::EventStore;
use crate::error::WatchError;
use crate::event::Event;
use crate::Result;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS ssh_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    username TEXT NOT NULL,
    ip TEXT NOT NULL,
    port INTEGER,
    method TEXT NOT NULL,
    country TEXT,
    city TEXT,
    invalid_user INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER))
);

CREATE INDEX IF NOT EXISTS idx_timestamp ON ssh_events(timestamp);
CREATE INDEX IF NOT EXISTS idx_event_type ON ssh_events(event_type);
CREATE INDEX IF NOT EXISTS idx_ip ON ssh_events(ip);
CREATE INDEX IF NOT EXISTS idx_username ON ssh_events(username);
";

const RECORD_COLUMNS: &str = "id, timestamp, event_type, username, ip, port, method, \
     COALESCE(country, ''), COALESCE(city, ''), invalid_user, created_at";

/// A stored event as read back for reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub username: String,
    pub ip: String,
    pub port: u16,
    pub method: String,
    pub country: String,
    pub city: String,
    pub invalid_user: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailedStats {
    pub total_attempts: u64,
    pub unique_ips: u64,
    pub unique_usernames: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverallStats {
    pub success_count: u64,
    pub failed_count: u64,
    pub unique_ips: u64,
    pub unique_usernames: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameCount {
    pub username: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpCount {
    pub ip: String,
    pub country: String,
    pub city: String,
    pub count: u64,
}

/// Thread-safe via an internal `Mutex`. `close` drops the connection and
/// every later call fails with [`WatchError::StoreClosed`].
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened event database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(WatchError::StoreClosed)?;
        Ok(f(conn)?)
    }

    pub fn insert_event(&self, event: &Event, country: &str, city: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ssh_events \
                 (timestamp, event_type, username, ip, port, method, country, city, invalid_user) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event.timestamp.timestamp(),
                    event.kind.as_str(),
                    event.username,
                    event.ip,
                    event.port,
                    event.method.as_str(),
                    non_empty(country),
                    non_empty(city),
                    event.invalid_user,
                ],
            )
            .map(|_| ())
        })
    }

    /// Successful logins in `[since, until)`, newest first.
    pub fn successful_logins(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<EventRecord>> {
        self.events_of_type("success", since, until)
    }

    /// Failed attempts in `[since, until)`, newest first.
    pub fn failed_attempts(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<EventRecord>> {
        self.events_of_type("failure", since, until)
    }

    fn events_of_type(
        &self,
        event_type: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM ssh_events \
                 WHERE event_type = ?1 AND timestamp >= ?2 AND timestamp < ?3 \
                 ORDER BY timestamp DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![event_type, since.timestamp(), until.timestamp()],
                row_to_record,
            )?;
            rows.collect()
        })
    }

    pub fn last_login_for_user(&self, username: &str) -> Result<Option<EventRecord>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM ssh_events \
                 WHERE event_type = 'success' AND username = ?1 \
                 ORDER BY timestamp DESC, id DESC LIMIT 1"
            );
            conn.query_row(&sql, params![username], row_to_record).optional()
        })
    }

    pub fn failed_stats(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<FailedStats> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT ip), COUNT(DISTINCT username) \
                 FROM ssh_events \
                 WHERE event_type = 'failure' AND timestamp >= ?1 AND timestamp < ?2",
                params![since.timestamp(), until.timestamp()],
                |row| {
                    Ok(FailedStats {
                        total_attempts: row.get(0)?,
                        unique_ips: row.get(1)?,
                        unique_usernames: row.get(2)?,
                    })
                },
            )
        })
    }

    /// Most-tried usernames among failed attempts.
    pub fn top_usernames(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<UsernameCount>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, COUNT(*) AS count FROM ssh_events \
                 WHERE event_type = 'failure' AND timestamp >= ?1 AND timestamp < ?2 \
                 GROUP BY username ORDER BY count DESC, username ASC LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![since.timestamp(), until.timestamp(), limit], |row| {
                Ok(UsernameCount {
                    username: row.get(0)?,
                    count: row.get(1)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Noisiest source addresses among failed attempts, with the most
    /// recently stored location for each.
    pub fn top_ips(&self, since: DateTime<Utc>, until: DateTime<Utc>, limit: u32) -> Result<Vec<IpCount>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT ip, COALESCE(MAX(country), ''), COALESCE(MAX(city), ''), COUNT(*) AS count \
                 FROM ssh_events \
                 WHERE event_type = 'failure' AND timestamp >= ?1 AND timestamp < ?2 \
                 GROUP BY ip ORDER BY count DESC, ip ASC LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![since.timestamp(), until.timestamp(), limit], |row| {
                Ok(IpCount {
                    ip: row.get(0)?,
                    country: row.get(1)?,
                    city: row.get(2)?,
                    count: row.get(3)?,
                })
            })?;
            rows.collect()
        })
    }

    pub fn success_count(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM ssh_events \
                 WHERE event_type = 'success' AND timestamp >= ?1 AND timestamp < ?2",
                params![since.timestamp(), until.timestamp()],
                |row| row.get(0),
            )
        })
    }

    pub fn overall_stats(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<OverallStats> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT \
                    COUNT(CASE WHEN event_type = 'success' THEN 1 END), \
                    COUNT(CASE WHEN event_type = 'failure' THEN 1 END), \
                    COUNT(DISTINCT ip), \
                    COUNT(DISTINCT username) \
                 FROM ssh_events WHERE timestamp >= ?1 AND timestamp < ?2",
                params![since.timestamp(), until.timestamp()],
                |row| {
                    Ok(OverallStats {
                        success_count: row.get(0)?,
                        failed_count: row.get(1)?,
                        unique_ips: row.get(2)?,
                        unique_usernames: row.get(3)?,
                    })
                },
            )
        })
    }

    /// Delete everything older than `retention_days` before now.
    pub fn cleanup_older_than(&self, retention_days: u32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        self.delete_before(cutoff)
    }

    pub fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM ssh_events WHERE timestamp < ?1",
                params![cutoff.timestamp()],
            )
        })?;
        Ok(deleted as u64)
    }

    pub fn close_connection(&self) -> Result<()> {
        if let Some(conn) = self.lock().take() {
            conn.close().map_err(|(_, e)| WatchError::Sqlite(e))?;
            debug!("event database closed");
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn insert(&self, event: &Event, country: &str, city: &str) -> Result<()> {
        self.insert_event(event, country, city)
    }

    async fn cleanup(&self, retention_days: u32) -> Result<u64> {
        self.cleanup_older_than(retention_days)
    }

    async fn close(&self) -> Result<()> {
        self.close_connection()
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

fn epoch_to_utc(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    let port: Option<i64> = row.get(5)?;
    Ok(EventRecord {
        id: row.get(0)?,
        timestamp: epoch_to_utc(row.get(1)?),
        event_type: row.get(2)?,
        username: row.get(3)?,
        ip: row.get(4)?,
        port: port.and_then(|p| u16::try_from(p).ok()).unwrap_or(0),
        method: row.get(6)?,
        country: row.get(7)?,
        city: row.get(8)?,
        invalid_user: row.get(9)?,
        created_at: epoch_to_utc(row.get(10)?),
    })
}
