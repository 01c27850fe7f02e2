//! Wall-clock task scheduler.
//!
//! Tasks are polled on a fixed interval and fire at most once per local
//! calendar day, in their own timezone. Due tasks run one after another in
//! registration order; a failing task is logged and still counts as fired
//! for the day.

mod task;

pub use task::{
    is_last_day_of_month, parse_timezone, parse_trigger_time, ScheduledTask, TaskAction,
    TaskFuture, TaskKind,
};

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::WatchError;
use crate::stats::PipelineStats;
use crate::Result;

pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    poll_interval: Duration,
    stats: Option<Arc<PipelineStats>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            poll_interval: POLL_INTERVAL,
            stats: None,
        }
    }

    pub fn with_stats(mut self, stats: Arc<PipelineStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Fire `action` every day at `trigger` (`HH:MM`) in `timezone`.
    pub fn add_daily_task<F, Fut>(
        &mut self,
        name: &str,
        trigger: &str,
        timezone: &str,
        action: F,
    ) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add(name, TaskKind::Daily, trigger, timezone, boxed(action))
    }

    /// Fire `action` at `trigger` on the last day of each month.
    pub fn add_monthly_last_day_task<F, Fut>(
        &mut self,
        name: &str,
        trigger: &str,
        timezone: &str,
        action: F,
    ) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add(name, TaskKind::MonthlyLastDay, trigger, timezone, boxed(action))
    }

    fn add(
        &mut self,
        name: &str,
        kind: TaskKind,
        trigger: &str,
        timezone: &str,
        action: TaskAction,
    ) -> Result<()> {
        if self.tasks.iter().any(|t| t.name == name) {
            return Err(WatchError::DuplicateTask(name.to_string()));
        }
        let task = ScheduledTask::new(name, kind, trigger, timezone, action)?;
        info!(
            task = %task.name,
            kind = %task.kind,
            at = %task.trigger(),
            timezone = %task.timezone,
            "scheduled task registered"
        );
        self.tasks.push(task);
        Ok(())
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task due at `now`, in registration order. Returns the
    /// names of the tasks that fired.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut fired = Vec::new();

        for task in self.tasks.iter_mut() {
            if !task.is_due(now) {
                continue;
            }

            info!(task = %task.name, "running scheduled task");
            match (task.action)().await {
                Ok(()) => info!(task = %task.name, "scheduled task completed"),
                Err(e) => {
                    error!(task = %task.name, error = %e, "scheduled task failed");
                    if let Some(stats) = &self.stats {
                        PipelineStats::incr(&stats.task_failures);
                    }
                }
            }

            task.last_fired = Some(task.local_date(now));
            fired.push(task.name.clone());
        }

        fired
    }

    /// Poll until `cancel` fires. A task already running is allowed to
    /// finish before the loop observes cancellation.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tasks = self.tasks.len(),
            interval_secs = self.poll_interval.as_secs(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let fired = self.tick(Utc::now()).await;
                    if !fired.is_empty() {
                        debug!(?fired, "scheduler tick");
                    }
                }
            }
        }

        info!("scheduler stopped");
    }
}

fn boxed<F, Fut>(action: F) -> TaskAction
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move || Box::pin(action()))
}
