//! Environment configuration for the ingest service

use std::str::FromStr;
use std::time::Duration;

use sydevents_catalog::SweepConfig;

use crate::adapter::{FetchConfig, DEFAULT_USER_AGENT};
use crate::retry::RetryPolicy;
use crate::runner::RunnerConfig;
use crate::scheduler::{parse_schedule, SchedulerConfig, DEFAULT_SCHEDULE};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got `{value}`")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must be at least {min}, got {value}")]
    OutOfRange {
        var: &'static str,
        min: u64,
        value: u64,
    },

    #[error("SCRAPE_SCHEDULE is invalid: {0}")]
    InvalidSchedule(String),
}

/// Everything the ingest binary reads from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    /// PostgreSQL url; `None` runs against the in-memory store
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub scheduler: SchedulerConfig,
    pub runner: RunnerConfig,
    pub fetch: FetchConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 5,
            scheduler: SchedulerConfig::default(),
            runner: RunnerConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `DATABASE_URL`: PostgreSQL url (unset: in-memory dev mode)
    /// - `DB_MAX_CONNECTIONS`: pool size (default: 5)
    /// - `SCRAPE_SCHEDULE`: cron expression (default: "0 0 * * *")
    /// - `SCRAPE_INITIAL_DELAY_SECS`: delay before the start-up cycle (default: 0)
    /// - `SCRAPE_COOLDOWN_SECS`: pause between sources (default: 10)
    /// - `STALENESS_WINDOW_SECS`: sweep window (default: 3600)
    /// - `CYCLE_TIMEOUT_SECS`: overall cycle timeout (default: 1800)
    /// - `FETCH_TIMEOUT_SECS`: per-request timeout (default: 90)
    /// - `FETCH_MAX_ATTEMPTS`: fetch attempts per source per cycle (default: 1)
    /// - `SCRAPE_USER_AGENT`: HTTP user agent (default: desktop Chrome)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable lookup; `from_env` uses the process
    /// environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let schedule = get("SCRAPE_SCHEDULE").unwrap_or_else(|| DEFAULT_SCHEDULE.to_string());
        parse_schedule(&schedule).map_err(|e| ConfigError::InvalidSchedule(e.to_string()))?;

        let number = |var: &'static str, default: u64| parse_number(var, get(var), default);
        let secs = |var: &'static str, default: u64| number(var, default).map(Duration::from_secs);

        let max_attempts = at_least("FETCH_MAX_ATTEMPTS", number("FETCH_MAX_ATTEMPTS", 1)?, 1)?;
        let db_max_connections =
            at_least("DB_MAX_CONNECTIONS", number("DB_MAX_CONNECTIONS", 5)?, 1)?;
        let fetch_timeout = at_least("FETCH_TIMEOUT_SECS", number("FETCH_TIMEOUT_SECS", 90)?, 1)?;
        let cycle_timeout = at_least("CYCLE_TIMEOUT_SECS", number("CYCLE_TIMEOUT_SECS", 1800)?, 1)?;

        let retry = if max_attempts > 1 {
            RetryPolicy::exponential().with_max_attempts(max_attempts.min(u32::MAX as u64) as u32)
        } else {
            RetryPolicy::no_retry()
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            db_max_connections: db_max_connections.min(u32::MAX as u64) as u32,
            scheduler: SchedulerConfig::new()
                .with_schedule(schedule)
                .with_initial_delay(secs("SCRAPE_INITIAL_DELAY_SECS", 0)?)
                .with_cycle_timeout(Duration::from_secs(cycle_timeout)),
            runner: RunnerConfig::new()
                .with_cooldown(secs("SCRAPE_COOLDOWN_SECS", 10)?)
                .with_retry(retry)
                .with_sweep(
                    SweepConfig::new()
                        .with_staleness_window(secs("STALENESS_WINDOW_SECS", 3600)?),
                ),
            fetch: FetchConfig::default()
                .with_timeout(Duration::from_secs(fetch_timeout))
                .with_user_agent(
                    get("SCRAPE_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
                ),
        })
    }
}

fn parse_number(var: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => u64::from_str(raw.trim()).map_err(|_| ConfigError::InvalidNumber {
            var,
            value: raw,
        }),
    }
}

fn at_least(var: &'static str, value: u64, min: u64) -> Result<u64, ConfigError> {
    if value < min {
        return Err(ConfigError::OutOfRange { var, min, value });
    }
    Ok(value)
}
