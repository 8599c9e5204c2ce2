//! Scrape cycle runner
//!
//! One cycle walks the configured adapters in order:
//!
//! ```text
//! for each adapter (cool-down between adapters):
//!     fetch (with retry policy) ──failed──▶ FetchFailed, no sweep
//!         │ ok (possibly empty)
//!         ▼
//!     normalize ──▶ reconcile batch ──▶ sweep source ──▶ Completed
//!                        (failed writes are kept out of the sweep)
//! ```
//!
//! A failing source never affects the others.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use sydevents_catalog::{
    normalize, BatchReport, EventStore, RawCandidate, Reconciler, SourceId, StoreError,
    SweepConfig, Sweeper,
};

use crate::adapter::{FetchError, SourceAdapter};
use crate::retry::RetryPolicy;

/// Runner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Pause between consecutive adapters
    #[serde(with = "duration_millis")]
    pub cooldown: Duration,

    pub retry: RetryPolicy,

    pub sweep: SweepConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            sweep: SweepConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sweep(mut self, sweep: SweepConfig) -> Self {
        self.sweep = sweep;
        self
    }
}

/// What happened to one source during a cycle
#[derive(Debug)]
pub enum SourceOutcome {
    /// Fetched, reconciled and swept
    Completed {
        fetched: usize,
        batch: BatchReport,
        swept: u64,
    },

    /// Fetch failed on every attempt; nothing was written and no sweep ran
    FetchFailed { error: FetchError, attempts: u32 },

    /// Reconciled, but the sweep itself failed
    SweepFailed {
        fetched: usize,
        batch: BatchReport,
        error: StoreError,
    },
}

#[derive(Debug)]
pub struct SourceReport {
    pub source_id: SourceId,
    pub outcome: SourceOutcome,
}

impl SourceReport {
    pub fn batch(&self) -> Option<&BatchReport> {
        match &self.outcome {
            SourceOutcome::Completed { batch, .. } | SourceOutcome::SweepFailed { batch, .. } => {
                Some(batch)
            }
            SourceOutcome::FetchFailed { .. } => None,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(&self.outcome, SourceOutcome::Completed { batch, .. } if batch.is_clean())
    }
}

/// Result of one full cycle
#[derive(Debug)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
}

impl CycleReport {
    pub fn source(&self, source_id: &SourceId) -> Option<&SourceReport> {
        self.sources.iter().find(|s| &s.source_id == source_id)
    }

    pub fn is_clean(&self) -> bool {
        self.sources.iter().all(SourceReport::is_clean)
    }

    /// Sources whose fetch failed
    pub fn failed_sources(&self) -> Vec<&SourceId> {
        self.sources
            .iter()
            .filter(|s| matches!(s.outcome, SourceOutcome::FetchFailed { .. }))
            .map(|s| &s.source_id)
            .collect()
    }

    fn log_summary(&self) {
        let (mut inserted, mut updated, mut refreshed, mut sticky, mut write_failures) =
            (0, 0, 0, 0, 0);
        for batch in self.sources.iter().filter_map(SourceReport::batch) {
            inserted += batch.inserted;
            updated += batch.updated;
            refreshed += batch.refreshed;
            sticky += batch.sticky;
            write_failures += batch.failures.len();
        }

        info!(
            sources = self.sources.len(),
            failed_sources = self.failed_sources().len(),
            inserted,
            updated,
            refreshed,
            sticky,
            write_failures,
            elapsed_ms = (self.finished_at - self.started_at).num_milliseconds(),
            "scrape cycle finished"
        );
    }
}

/// Runs scrape cycles over a fixed adapter list
#[derive(Clone)]
pub struct CycleRunner {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    reconciler: Reconciler,
    sweeper: Sweeper,
    config: RunnerConfig,
}

impl CycleRunner {
    pub fn new(
        store: Arc<dyn EventStore>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            adapters,
            reconciler: Reconciler::new(store.clone()),
            sweeper: Sweeper::new(store, config.sweep.clone()),
            config,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run every adapter once, sequentially
    #[instrument(skip(self), fields(adapters = self.adapters.len()))]
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();
        info!("scrape cycle started");

        let mut sources = Vec::with_capacity(self.adapters.len());
        for (index, adapter) in self.adapters.iter().enumerate() {
            if index > 0 && !self.config.cooldown.is_zero() {
                debug!(cooldown_ms = self.config.cooldown.as_millis() as u64, "cooling down");
                tokio::time::sleep(self.config.cooldown).await;
            }
            sources.push(self.run_source(adapter.as_ref()).await);
        }

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            sources,
        };
        report.log_summary();
        report
    }

    #[instrument(skip(self, adapter), fields(source_id = %adapter.source().id))]
    async fn run_source(&self, adapter: &dyn SourceAdapter) -> SourceReport {
        let source = adapter.source();

        let candidates = match self.fetch_with_retry(adapter).await {
            Ok(candidates) => candidates,
            Err((error, attempts)) => {
                warn!(
                    source_id = %source.id,
                    kind = error.kind(),
                    %error,
                    attempts,
                    "fetch failed, skipping source for this cycle"
                );
                return SourceReport {
                    source_id: source.id.clone(),
                    outcome: SourceOutcome::FetchFailed { error, attempts },
                };
            }
        };

        let fetched = candidates.len();
        let records = normalize(source, candidates);
        let observed_at = Utc::now();
        let batch = self.reconciler.reconcile_batch(&records, observed_at).await;

        info!(
            source_id = %source.id,
            fetched,
            records = records.len(),
            inserted = batch.inserted,
            updated = batch.updated,
            refreshed = batch.refreshed,
            sticky = batch.sticky,
            failures = batch.failures.len(),
            "source reconciled"
        );

        // Listed this pass but not written; absence would be the wrong verdict
        let keep: Vec<String> = batch
            .failures
            .iter()
            .map(|failure| failure.original_url.clone())
            .collect();
        let cutoff = self.sweeper.config().cutoff(observed_at);

        let outcome = match self.sweeper.sweep_excluding(&source.id, cutoff, &keep).await {
            Ok(swept) => SourceOutcome::Completed {
                fetched,
                batch,
                swept,
            },
            Err(error) => {
                warn!(source_id = %source.id, %error, "staleness sweep failed");
                SourceOutcome::SweepFailed {
                    fetched,
                    batch,
                    error,
                }
            }
        };

        SourceReport {
            source_id: source.id.clone(),
            outcome,
        }
    }

    async fn fetch_with_retry(
        &self,
        adapter: &dyn SourceAdapter,
    ) -> Result<Vec<RawCandidate>, (FetchError, u32)> {
        let policy = &self.config.retry;
        let mut attempt = 1;

        loop {
            match adapter.fetch().await {
                Ok(candidates) => return Ok(candidates),
                Err(error) if policy.should_retry(&error) && policy.has_attempts_remaining(attempt) => {
                    attempt += 1;
                    let delay = policy.delay_for_attempt(attempt);
                    debug!(
                        source_id = %adapter.source().id,
                        %error,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying fetch"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err((error, attempt)),
            }
        }
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
