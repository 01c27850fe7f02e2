//! sshd log message parsing.
//!
//! Pure functions only: no I/O, no state. The journal path hands us the
//! message text and an absolute instant; the classic syslog path hands us
//! the whole line and the year to assume for its year-less timestamp.

use chrono::{DateTime, Datelike, Local, TimeZone, Utc};
use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::event::{AuthMethod, Event, EventKind};

static SUCCESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Accepted\s+(password|publickey)\s+for\s+(\S+)\s+from\s+(\S+)\s+port\s+(\S+)")
        .expect("success pattern is valid")
});

static FAILURE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^Failed\s+(password|publickey)\s+for\s+(invalid user\s+)?(\S+)\s+from\s+(\S+)\s+port\s+(\S+)",
    )
    .expect("failure pattern is valid")
});

static SYSLOG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([A-Z][a-z]{2})\s+(\d{1,2})\s+(\d{2}):(\d{2}):(\d{2})\s+\S+\s+sshd\[\d+\]:\s+(.*)$",
    )
    .expect("syslog pattern is valid")
});

/// Where the event timestamp comes from.
#[derive(Debug, Clone, Copy)]
pub enum TimestampSource {
    /// Absolute instant carried by the record (journald). The raw text is
    /// the bare sshd message.
    Instant(DateTime<Utc>),
    /// Year to assume for a `Mon D HH:MM:SS` fragment. The raw text is a
    /// full syslog line; the time is read in the host's local timezone.
    Year(i32),
}

/// Parse one raw log entry. Anything that is not an sshd accept/fail
/// message yields `None`.
pub fn parse_line(raw: &str, source: TimestampSource) -> Option<Event> {
    match source {
        TimestampSource::Instant(ts) => parse_message(raw, ts),
        TimestampSource::Year(year) => parse_syslog_line(raw, year),
    }
}

/// Parse a bare sshd message (the journald `MESSAGE` field).
pub fn parse_message(message: &str, timestamp: DateTime<Utc>) -> Option<Event> {
    parse_success(message, timestamp).or_else(|| parse_failure(message, timestamp))
}

/// Parse a `Jan  5 09:12:00 host sshd[123]: ...` line.
pub fn parse_syslog_line(line: &str, year: i32) -> Option<Event> {
    let caps = SYSLOG_PATTERN.captures(line)?;
    let timestamp = syslog_timestamp(&caps, year)?;
    parse_message(caps.get(6)?.as_str(), timestamp)
}

/// Year to assume for a year-less syslog timestamp in `month`.
///
/// A fragment from a month later than the current one can only come from
/// last year (a December entry read in January).
pub fn infer_syslog_year(now: DateTime<Local>, month: u32) -> i32 {
    if month > now.month() {
        now.year() - 1
    } else {
        now.year()
    }
}

/// Month number of a syslog line's timestamp, if the line has one.
pub fn syslog_month(line: &str) -> Option<u32> {
    let caps = SYSLOG_PATTERN.captures(line)?;
    month_number(caps.get(1)?.as_str())
}

fn parse_success(message: &str, timestamp: DateTime<Utc>) -> Option<Event> {
    let caps = SUCCESS_PATTERN.captures(message)?;
    Some(Event {
        timestamp,
        kind: EventKind::Success,
        method: AuthMethod::from_sshd(&caps[1])?,
        username: caps[2].to_string(),
        ip: caps[3].to_string(),
        port: parse_port(&caps[4]),
        invalid_user: false,
    })
}

fn parse_failure(message: &str, timestamp: DateTime<Utc>) -> Option<Event> {
    let caps = FAILURE_PATTERN.captures(message)?;
    Some(Event {
        timestamp,
        kind: EventKind::Failure,
        method: AuthMethod::from_sshd(&caps[1])?,
        invalid_user: caps.get(2).is_some(),
        username: caps[3].to_string(),
        ip: caps[4].to_string(),
        port: parse_port(&caps[5]),
    })
}

// Lossy on purpose: a garbled port should not cost us the whole event.
fn parse_port(s: &str) -> u16 {
    s.parse().unwrap_or(0)
}

fn syslog_timestamp(caps: &Captures<'_>, year: i32) -> Option<DateTime<Utc>> {
    let month = month_number(caps.get(1)?.as_str())?;
    let day: u32 = caps[2].parse().ok()?;
    let hour: u32 = caps[3].parse().ok()?;
    let minute: u32 = caps[4].parse().ok()?;
    let second: u32 = caps[5].parse().ok()?;

    Local
        .with_ymd_and_hms(year, month, day, hour, minute, second)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

fn month_number(abbrev: &str) -> Option<u32> {
    let n = match abbrev {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    Some(n)
}
