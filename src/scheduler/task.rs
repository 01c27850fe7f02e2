use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::error::WatchError;
use crate::Result;

pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// No-argument callback run when a task is due.
pub type TaskAction = Box<dyn Fn() -> TaskFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Daily,
    /// Daily trigger that only fires on the last calendar day of the month.
    MonthlyLastDay,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => f.write_str("daily"),
            Self::MonthlyLastDay => f.write_str("monthly (last day)"),
        }
    }
}

pub struct ScheduledTask {
    pub name: String,
    pub kind: TaskKind,
    pub hour: u32,
    pub minute: u32,
    pub timezone: Tz,
    /// Local date of the last attempt, successful or not. In memory only.
    pub last_fired: Option<NaiveDate>,
    pub(crate) action: TaskAction,
}

impl ScheduledTask {
    pub fn new(
        name: impl Into<String>,
        kind: TaskKind,
        trigger: &str,
        timezone: &str,
        action: TaskAction,
    ) -> Result<Self> {
        let (hour, minute) = parse_trigger_time(trigger)?;
        Ok(Self {
            name: name.into(),
            kind,
            hour,
            minute,
            timezone: parse_timezone(timezone)?,
            last_fired: None,
            action,
        })
    }

    /// Local calendar date of `now` in this task's timezone.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        if local.hour() != self.hour || local.minute() != self.minute {
            return false;
        }

        let today = local.date_naive();
        if self.last_fired.is_some_and(|fired| fired >= today) {
            return false;
        }

        match self.kind {
            TaskKind::Daily => true,
            TaskKind::MonthlyLastDay => is_last_day_of_month(today),
        }
    }

    pub fn trigger(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("trigger", &self.trigger())
            .field("timezone", &self.timezone)
            .field("last_fired", &self.last_fired)
            .finish_non_exhaustive()
    }
}

/// True when tomorrow falls in a different month.
pub fn is_last_day_of_month(date: NaiveDate) -> bool {
    date.succ_opt().map_or(true, |tomorrow| tomorrow.month() != date.month())
}

/// Parse `HH:MM` (24h).
pub fn parse_trigger_time(s: &str) -> Result<(u32, u32)> {
    let time = NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| WatchError::InvalidTriggerTime(s.to_string()))?;
    Ok((time.hour(), time.minute()))
}

/// Parse an IANA timezone name such as `Europe/Berlin` or `UTC`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| WatchError::InvalidTimezone {
            name: name.to_string(),
            reason: e.to_string(),
        })
}
