//! # Event Ingest
//!
//! Scrape cycle driving the event catalog: adapters fetch listing pages,
//! the runner feeds each source's candidates through normalization,
//! reconciliation and the staleness sweep, and the scheduler decides when a
//! cycle runs.
//!
//! ## Architecture
//!
//! ```text
//!  cron tick ─┐
//!  start-up  ─┼──▶ Scheduler ──▶ CycleGuard (idle/running) ──▶ CycleRunner
//!  trigger() ─┘                                                   │
//!                                       ┌─────────────────────────┘
//!                                       ▼
//!                 SourceAdapter::fetch ──▶ normalize ──▶ Reconciler ──▶ Sweeper
//!                 (one source at a time, cool-down in between)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sydevents_catalog::{EventStore, InMemoryEventStore};
//! use sydevents_ingest::prelude::*;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
//! let adapters = build_adapters(builtin_sources(), &FetchConfig::default())?;
//!
//! let runner = CycleRunner::new(store, adapters, RunnerConfig::default());
//! let handle = Scheduler::new(runner, SchedulerConfig::default())?.start();
//!
//! handle.trigger().await?;
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub mod adapter;
pub mod config;
pub mod cycle;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod telemetry;

/// Prelude for common imports
pub mod prelude {
    pub use crate::adapter::{
        builtin_sources, FetchConfig, FetchError, HtmlListingAdapter, ListingSelectors,
        SourceAdapter, SourceConfig,
    };
    pub use crate::build_adapters;
    pub use crate::config::{ConfigError, IngestConfig};
    pub use crate::cycle::{CycleGuard, CyclePermit};
    pub use crate::retry::RetryPolicy;
    pub use crate::runner::{CycleReport, CycleRunner, RunnerConfig, SourceOutcome, SourceReport};
    pub use crate::scheduler::{
        Scheduler, SchedulerConfig, SchedulerError, SchedulerHandle, TriggerOutcome,
    };
}

// Re-export key types at crate root
pub use adapter::{FetchError, HtmlListingAdapter, SourceAdapter, SourceConfig};
pub use config::{ConfigError, IngestConfig};
pub use cycle::{CycleGuard, CyclePermit};
pub use retry::RetryPolicy;
pub use runner::{CycleReport, CycleRunner, RunnerConfig, SourceOutcome, SourceReport};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError, SchedulerHandle, TriggerOutcome};

/// Build one HTML adapter per source config, in order
pub fn build_adapters(
    sources: Vec<SourceConfig>,
    fetch: &adapter::FetchConfig,
) -> Result<Vec<Arc<dyn SourceAdapter>>, adapter::AdapterBuildError> {
    sources
        .into_iter()
        .map(|source| {
            HtmlListingAdapter::new(source, fetch)
                .map(|adapter| Arc::new(adapter) as Arc<dyn SourceAdapter>)
        })
        .collect()
}
