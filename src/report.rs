//! Daily Telegram report and the plain-text `stats` output.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

use crate::collab::ReportRenderer;
use crate::notifier::escape_markdown;
use crate::self_update::VersionChecker;
use crate::storage::{FailedStats, IpCount, SqliteStore, UsernameCount};
use crate::Result;

const TOP_N: u32 = 10;

/// `1234567` → `1,234,567`.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `City, Country`, or whichever half is known.
pub fn format_location(country: &str, city: &str) -> String {
    match (city.is_empty(), country.is_empty()) {
        (false, false) => format!("{city}, {country}"),
        (true, false) => country.to_string(),
        (false, true) => city.to_string(),
        (true, true) => String::new(),
    }
}

/// UTC bounds of a local calendar day in `tz`.
pub fn day_bounds(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let start_of = |d: NaiveDate| {
        let midnight = d.and_time(chrono::NaiveTime::MIN);
        tz.from_local_datetime(&midnight)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| midnight.and_utc())
    };
    let next = date.succ_opt().unwrap_or(date);
    (start_of(date), start_of(next))
}

pub struct ReportGenerator {
    store: Arc<SqliteStore>,
    server_name: String,
    timezone: Tz,
    update_checker: Option<VersionChecker>,
}

impl ReportGenerator {
    pub fn new(store: Arc<SqliteStore>, server_name: impl Into<String>, timezone: Tz) -> Self {
        Self {
            store,
            server_name: server_name.into(),
            timezone,
            update_checker: None,
        }
    }

    /// Append an "update available" footer to daily reports.
    pub fn with_update_checker(mut self, checker: VersionChecker) -> Self {
        self.update_checker = Some(checker);
        self
    }

    pub async fn daily_report(&self, date: NaiveDate) -> Result<String> {
        let (since, until) = day_bounds(date, self.timezone);
        let stats = self.store.failed_stats(since, until)?;
        let users = self.store.top_usernames(since, until, TOP_N)?;
        let ips = self.store.top_ips(since, until, TOP_N)?;
        let successes = self.store.success_count(since, until)?;

        let mut text = self.format_daily(date, &stats, &users, &ips, successes);
        if let Some(footer) = self.update_footer().await {
            text.push_str(&footer);
        }
        Ok(text)
    }

    fn format_daily(
        &self,
        date: NaiveDate,
        stats: &FailedStats,
        users: &[UsernameCount],
        ips: &[IpCount],
        successes: u64,
    ) -> String {
        let num = |n: u64| escape_markdown(&format_number(n));
        let mut buf = String::new();

        let _ = writeln!(buf, "📊 *Daily SSH Report*");
        let _ = writeln!(buf, "🖥️ Server: {}", escape_markdown(&self.server_name));
        let _ = writeln!(buf, "📅 {}\n", escape_markdown(&date.format("%Y-%m-%d").to_string()));

        let _ = writeln!(buf, "📈 *Summary*");
        let _ = writeln!(buf, "• Successful logins: {}", num(successes));
        let _ = writeln!(buf, "• Failed attempts: {}", num(stats.total_attempts));
        let _ = writeln!(buf, "• Unique IPs: {}", num(stats.unique_ips));
        let _ = writeln!(buf, "• Unique usernames: {}\n", num(stats.unique_usernames));

        if !users.is_empty() {
            let _ = writeln!(buf, "👤 *Top 10 Usernames*");
            for (i, u) in users.iter().enumerate() {
                let _ = writeln!(buf, "{}\\. {} \\- {}", i + 1, escape_markdown(&u.username), num(u.count));
            }
            buf.push('\n');
        }

        if !ips.is_empty() {
            let _ = writeln!(buf, "🌐 *Top 10 IPs*");
            for (i, ip) in ips.iter().enumerate() {
                let location = format_location(&ip.country, &ip.city);
                if location.is_empty() {
                    let _ = writeln!(buf, "{}\\. {} \\- {}", i + 1, escape_markdown(&ip.ip), num(ip.count));
                } else {
                    let _ = writeln!(
                        buf,
                        "{}\\. {} \\({}\\) \\- {}",
                        i + 1,
                        escape_markdown(&ip.ip),
                        escape_markdown(&location),
                        num(ip.count)
                    );
                }
            }
        }

        buf
    }

    async fn update_footer(&self) -> Option<String> {
        let checker = self.update_checker.as_ref()?;
        let latest = match checker.check_for_update().await {
            Ok(latest) => latest?,
            Err(e) => {
                debug!(error = %e, "update check failed, omitting footer");
                return None;
            }
        };
        Some(format!(
            "\n⬆️ *Update Available*\nCurrent: {} \\| Latest: {}\nRun: `sudo oxiwatch upgrade`\n",
            escape_markdown(checker.current()),
            escape_markdown(&latest)
        ))
    }

    /// Plain-text totals for the last `days` days.
    pub fn stats_report(&self, days: u32, now: DateTime<Utc>) -> Result<String> {
        let since = now - Duration::days(i64::from(days));
        let stats = self.store.overall_stats(since, now)?;

        let mut buf = String::new();
        let _ = writeln!(buf, "SSH Statistics (last {days} days)");
        let _ = writeln!(buf, "Server: {}\n", self.server_name);
        let _ = writeln!(buf, "Successful logins: {}", format_number(stats.success_count));
        let _ = writeln!(buf, "Failed attempts: {}", format_number(stats.failed_count));
        let _ = writeln!(buf, "Unique IPs: {}", format_number(stats.unique_ips));
        let _ = writeln!(buf, "Unique usernames: {}", format_number(stats.unique_usernames));
        Ok(buf)
    }

    /// Plain-text list of successful logins in the last `days` days.
    pub fn logins_report(&self, days: u32, now: DateTime<Utc>) -> Result<String> {
        let since = now - Duration::days(i64::from(days));
        let logins = self.store.successful_logins(since, now)?;

        let mut buf = String::new();
        let _ = writeln!(buf, "Successful SSH Logins (last {days} days)");
        let _ = writeln!(buf, "Server: {}\n", self.server_name);

        if logins.is_empty() {
            buf.push_str("No successful logins in this period.\n");
            return Ok(buf);
        }

        for login in &logins {
            let when = login.timestamp.with_timezone(&self.timezone).format("%Y-%m-%d %H:%M:%S");
            let location = format_location(&login.country, &login.city);
            let _ = write!(buf, "{when}  {:<15}  {:<12}  {}", login.username, login.method, login.ip);
            if !location.is_empty() {
                let _ = write!(buf, " ({location})");
            }
            buf.push('\n');
        }
        Ok(buf)
    }
}

#[async_trait]
impl ReportRenderer for ReportGenerator {
    async fn generate_daily_report(&self, date: NaiveDate) -> Result<String> {
        self.daily_report(date).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AuthMethod, Event, EventKind};

    fn event(kind: EventKind, user: &str, ip: &str, ts: DateTime<Utc>) -> Event {
        Event {
            timestamp: ts,
            kind,
            username: user.into(),
            ip: ip.into(),
            port: 22,
            method: AuthMethod::Password,
            invalid_user: kind == EventKind::Failure,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(100000), "100,000");
    }

    #[test]
    fn location_formatting() {
        assert_eq!(format_location("Germany", "Berlin"), "Berlin, Germany");
        assert_eq!(format_location("Germany", ""), "Germany");
        assert_eq!(format_location("", "Berlin"), "Berlin");
        assert_eq!(format_location("", ""), "");
    }

    #[test]
    fn day_bounds_follow_timezone() {
        let (start, end) = day_bounds(date(2026, 1, 15), Tz::UTC);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap());
        assert_eq!(end - start, Duration::days(1));

        let (start, _) = day_bounds(date(2026, 1, 15), Tz::Europe__Berlin);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 1, 14, 23, 0, 0).unwrap());

        // Spring-forward day is 23 hours long.
        let (start, end) = day_bounds(date(2026, 3, 29), Tz::Europe__Berlin);
        assert_eq!(end - start, Duration::hours(23));
    }

    #[tokio::test]
    async fn daily_report_covers_only_that_day() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let noon = Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap();
        store
            .insert_event(&event(EventKind::Success, "alice", "10.0.0.1", noon), "", "")
            .unwrap();
        for _ in 0..3 {
            store
                .insert_event(&event(EventKind::Failure, "root", "1.2.3.4", noon), "China", "Beijing")
                .unwrap();
        }
        store
            .insert_event(&event(EventKind::Failure, "test_user", "5.6.7.8", noon), "", "")
            .unwrap();
        store
            .insert_event(
                &event(EventKind::Failure, "tomorrow", "9.9.9.9", noon + Duration::days(1)),
                "",
                "",
            )
            .unwrap();

        let generator = ReportGenerator::new(Arc::clone(&store), "web-01", Tz::UTC);
        let text = generator.generate_daily_report(date(2026, 4, 1)).await.unwrap();

        assert!(text.starts_with("📊 *Daily SSH Report*\n"));
        assert!(text.contains("Server: web\\-01"));
        assert!(text.contains("📅 2026\\-04\\-01"));
        assert!(text.contains("• Successful logins: 1\n"));
        assert!(text.contains("• Failed attempts: 4\n"));
        assert!(text.contains("• Unique IPs: 2\n"));
        assert!(text.contains("1\\. root \\- 3\n"));
        assert!(text.contains("2\\. test\\_user \\- 1\n"));
        assert!(text.contains("1\\. 1\\.2\\.3\\.4 \\(Beijing, China\\) \\- 3\n"));
        assert!(text.contains("2\\. 5\\.6\\.7\\.8 \\- 1\n"));
        assert!(!text.contains("tomorrow"));
        assert!(!text.contains("Update Available"));
    }

    #[tokio::test]
    async fn empty_day_has_summary_only() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let generator = ReportGenerator::new(store, "host", Tz::UTC);
        let text = generator.daily_report(date(2026, 4, 1)).await.unwrap();
        assert!(text.contains("• Failed attempts: 0"));
        assert!(!text.contains("Top 10"));
    }

    #[test]
    fn plain_text_reports() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let now = Utc.with_ymd_and_hms(2026, 4, 10, 12, 0, 0).unwrap();
        store
            .insert_event(
                &event(EventKind::Success, "alice", "10.0.0.1", now - Duration::hours(2)),
                "Germany",
                "Berlin",
            )
            .unwrap();
        store
            .insert_event(&event(EventKind::Failure, "root", "1.2.3.4", now - Duration::hours(1)), "", "")
            .unwrap();
        store
            .insert_event(&event(EventKind::Success, "old", "10.0.0.9", now - Duration::days(30)), "", "")
            .unwrap();

        let generator = ReportGenerator::new(store, "host", Tz::UTC);

        let stats = generator.stats_report(1, now).unwrap();
        assert!(stats.starts_with("SSH Statistics (last 1 days)\n"));
        assert!(stats.contains("Successful logins: 1\n"));
        assert!(stats.contains("Failed attempts: 1\n"));

        let logins = generator.logins_report(7, now).unwrap();
        assert!(logins.contains("2026-04-10 10:00:00  alice"));
        assert!(logins.contains("10.0.0.1 (Berlin, Germany)"));
        assert!(!logins.contains("old"));

        let none = generator.logins_report(7, now - Duration::days(60)).unwrap();
        assert!(none.contains("No successful logins in this period."));
    }
}
