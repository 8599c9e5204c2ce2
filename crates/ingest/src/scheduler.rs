//! Cycle scheduler
//!
//! A single background task that starts scrape cycles from three triggers:
//! the initial run after start-up, the cron schedule, and manual triggers
//! through [`SchedulerHandle::trigger`]. Every trigger goes through the
//! [`CycleGuard`]; a trigger that arrives while a cycle is running is a
//! no-op.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cycle::CycleGuard;
use crate::runner::{CycleReport, CycleRunner};

/// Daily at midnight UTC
pub const DEFAULT_SCHEDULE: &str = "0 0 * * *";

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cron expression, 5 fields (`min hour dom month dow`) or 6 with seconds
    pub schedule: String,

    /// Run a cycle shortly after start-up, independent of the schedule
    pub run_on_start: bool,

    /// Delay before the start-up cycle
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,

    /// Upper bound on one cycle; in-flight fetches are cancelled when hit
    #[serde(with = "duration_millis")]
    pub cycle_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schedule: DEFAULT_SCHEDULE.to_string(),
            run_on_start: true,
            initial_delay: Duration::ZERO,
            cycle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = schedule.into();
        self
    }

    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.cycle_timeout = timeout;
        self
    }
}

/// Scheduler errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid cron expression `{expr}`: {reason}")]
    InvalidSchedule { expr: String, reason: String },

    #[error("scheduler is not running")]
    Stopped,
}

/// Parse a cron expression, prepending a seconds field to 5-field input.
///
/// The `cron` crate wants `sec min hour dom month dow`; most people write
/// the classic 5-field form.
pub fn parse_schedule(expr: &str) -> Result<Schedule, SchedulerError> {
    let trimmed = expr.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };

    Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidSchedule {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// What a trigger did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A new cycle was started
    Started,

    /// A cycle was already running; nothing happened
    Skipped,
}

type TriggerRequest = oneshot::Sender<TriggerOutcome>;

/// Owns the schedule loop until [`Scheduler::start`] hands it to a task
pub struct Scheduler {
    runner: CycleRunner,
    guard: CycleGuard,
    schedule: Schedule,
    config: SchedulerConfig,
    reports: Arc<watch::Sender<Option<Arc<CycleReport>>>>,
    shutdown_rx: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
    in_flight: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(runner: CycleRunner, config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let schedule = parse_schedule(&config.schedule)?;
        let (reports, _) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            runner,
            guard: CycleGuard::new(),
            schedule,
            config,
            reports: Arc::new(reports),
            shutdown_rx,
            shutdown_tx,
            in_flight: None,
        })
    }

    /// Next scheduled fire time after `after`
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Spawn the schedule loop
    pub fn start(self) -> SchedulerHandle {
        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        let guard = self.guard.clone();
        let reports = self.reports.subscribe();
        let shutdown_tx = self.shutdown_tx.clone();

        info!(
            schedule = %self.config.schedule,
            run_on_start = self.config.run_on_start,
            initial_delay_secs = self.config.initial_delay.as_secs(),
            "scheduler started"
        );

        let join = tokio::spawn(self.run(trigger_rx));

        SchedulerHandle {
            trigger_tx,
            shutdown_tx,
            guard,
            reports,
            join,
        }
    }

    async fn run(mut self, mut trigger_rx: mpsc::Receiver<TriggerRequest>) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut initial_at = self
            .config
            .run_on_start
            .then(|| tokio::time::Instant::now() + self.config.initial_delay);
        let mut last_tick: Option<DateTime<Utc>> = None;

        loop {
            let now = Utc::now();
            let from = last_tick.map_or(now, |tick| tick.max(now));
            let next_tick = self.next_fire_after(from);
            let until_tick = next_tick.map(|tick| (tick - now).to_std().unwrap_or(Duration::ZERO));

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => break,

                _ = sleep_until_opt(initial_at) => {
                    initial_at = None;
                    self.fire("initial");
                }

                _ = sleep_opt(until_tick) => {
                    last_tick = next_tick;
                    self.fire("schedule");
                }

                request = trigger_rx.recv() => match request {
                    Some(reply) => {
                        let outcome = self.fire("manual");
                        let _ = reply.send(outcome);
                    }
                    None => break,
                },
            }
        }

        info!("scheduler stopping");
        if let Some(cycle) = self.in_flight.take() {
            if let Err(e) = cycle.await {
                error!(error = %e, "scrape cycle task failed");
            }
        }
    }

    /// Start a cycle unless one is already running
    fn fire(&mut self, trigger: &'static str) -> TriggerOutcome {
        let Some(permit) = self.guard.acquire() else {
            debug!(trigger, "scrape cycle already running, trigger ignored");
            return TriggerOutcome::Skipped;
        };

        info!(trigger, "starting scrape cycle");

        let runner = self.runner.clone();
        let reports = self.reports.clone();
        let timeout = self.config.cycle_timeout;
        let mut shutdown_rx = self.shutdown_rx.clone();

        self.in_flight = Some(tokio::spawn(async move {
            let _permit = permit;
            tokio::select! {
                result = tokio::time::timeout(timeout, runner.run_cycle()) => match result {
                    Ok(report) => {
                        reports.send_replace(Some(Arc::new(report)));
                    }
                    Err(_) => {
                        warn!(
                            trigger,
                            timeout_secs = timeout.as_secs(),
                            "scrape cycle timed out and was cancelled"
                        );
                    }
                },
                _ = shutdown_rx.changed() => {
                    info!(trigger, "shutdown requested, scrape cycle cancelled");
                }
            }
        }));

        TriggerOutcome::Started
    }
}

async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn sleep_opt(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// Control surface of a running scheduler.
///
/// Dropping the handle stops the scheduler.
pub struct SchedulerHandle {
    trigger_tx: mpsc::Sender<TriggerRequest>,
    shutdown_tx: watch::Sender<bool>,
    guard: CycleGuard,
    reports: watch::Receiver<Option<Arc<CycleReport>>>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask for a cycle now
    pub async fn trigger(&self) -> Result<TriggerOutcome, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.trigger_tx
            .send(reply_tx)
            .await
            .map_err(|_| SchedulerError::Stopped)?;
        reply_rx.await.map_err(|_| SchedulerError::Stopped)
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Receiver of the most recent completed cycle report
    pub fn reports(&self) -> watch::Receiver<Option<Arc<CycleReport>>> {
        self.reports.clone()
    }

    /// Stop scheduling, cancel any running cycle and wait for both to end
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "scheduler task failed");
        }
        info!("scheduler stopped");
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
