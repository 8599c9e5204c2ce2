//! Staleness sweeper
//!
//! After a source's batch is reconciled, records of that source that were
//! not re-observed within the staleness window are marked inactive.
//! Imported and already-inactive records are never touched. Sweeping is
//! idempotent for a fixed cutoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::persistence::{EventStore, StoreError};
use crate::source::SourceId;

/// Sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepConfig {
    /// How long a record may go unobserved before it is considered gone
    #[serde(with = "duration_millis")]
    pub staleness_window: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            staleness_window: Duration::from_secs(60 * 60),
        }
    }
}

impl SweepConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the staleness window
    pub fn with_staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    /// `now` minus the staleness window
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let window = chrono::Duration::from_std(self.staleness_window)
            .unwrap_or_else(|_| chrono::Duration::MAX);
        now.checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Marks unobserved records inactive, one source at a time
#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn EventStore>,
    config: SweepConfig,
}

impl Sweeper {
    pub fn new(store: Arc<dyn EventStore>, config: SweepConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Mark records of `source_id` last observed before `cutoff` inactive.
    ///
    /// Returns the number of records that changed.
    pub async fn sweep(&self, source_id: &SourceId, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.sweep_excluding(source_id, cutoff, &[]).await
    }

    /// Like [`sweep`](Self::sweep), leaving the records for `keep` alone.
    ///
    /// Used after a batch whose writes partly failed: those records were
    /// listed, only their `last_scraped_at` could not be advanced.
    #[instrument(skip(self, source_id, keep), fields(source_id = %source_id, keep = keep.len()))]
    pub async fn sweep_excluding(
        &self,
        source_id: &SourceId,
        cutoff: DateTime<Utc>,
        keep: &[String],
    ) -> Result<u64, StoreError> {
        let changed = self.store.mark_stale(source_id, cutoff, keep).await?;
        if changed > 0 {
            info!(source_id = %source_id, changed, %cutoff, "marked stale records inactive");
        }
        Ok(changed)
    }

    /// Sweep with the cutoff derived from `now` and the configured window
    pub async fn sweep_at(&self, source_id: &SourceId, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.sweep(source_id, self.config.cutoff(now)).await
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

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::candidate::CanonicalRecord;
    use crate::persistence::InMemoryEventStore;
    use crate::record::EventStatus;

    fn canonical(url: &str) -> CanonicalRecord {
        CanonicalRecord {
            original_url: url.to_string(),
            title: "Jazz Night".to_string(),
            venue_name: "Opera House".to_string(),
            description: None,
            image_url: None,
            date: None,
            source_id: SourceId::new("city-of-sydney"),
            source_name: "City of Sydney".to_string(),
            city: "Sydney".to_string(),
        }
    }

    #[test]
    fn test_default_window_is_one_hour() {
        let config = SweepConfig::default();
        assert_eq!(config.staleness_window, Duration::from_secs(3600));

        let now = Utc::now();
        assert_eq!(config.cutoff(now), now - ChronoDuration::hours(1));
    }

    #[test]
    fn test_config_serializes_window_as_millis() {
        let config = SweepConfig::new().with_staleness_window(Duration::from_secs(90));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json, serde_json::json!({ "staleness_window": 90_000 }));

        let back: SweepConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let config = SweepConfig::new().with_staleness_window(Duration::from_secs(u64::MAX));
        assert!(config.cutoff(Utc::now()) < Utc::now());
    }

    #[tokio::test]
    async fn test_sweep_marks_only_stale_records() {
        let store = Arc::new(InMemoryEventStore::new());
        let now = Utc::now();

        store
            .reconcile(&canonical("https://x/e/old"), now - ChronoDuration::hours(2))
            .await
            .unwrap();
        store
            .reconcile(&canonical("https://x/e/fresh"), now)
            .await
            .unwrap();

        let sweeper = Sweeper::new(store.clone(), SweepConfig::default());
        let changed = sweeper
            .sweep_at(&SourceId::new("city-of-sydney"), now)
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let old = store.find_by_url("https://x/e/old").await.unwrap().unwrap();
        let fresh = store.find_by_url("https://x/e/fresh").await.unwrap().unwrap();
        assert_eq!(old.status, EventStatus::Inactive);
        assert_eq!(fresh.status, EventStatus::New);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let store = Arc::new(InMemoryEventStore::new());
        let now = Utc::now();
        store
            .reconcile(&canonical("https://x/e/1"), now - ChronoDuration::hours(3))
            .await
            .unwrap();

        let sweeper = Sweeper::new(store.clone(), SweepConfig::default());
        let source = SourceId::new("city-of-sydney");
        let cutoff = now - ChronoDuration::hours(1);

        assert_eq!(sweeper.sweep(&source, cutoff).await.unwrap(), 1);
        let after_first = store.records();

        assert_eq!(sweeper.sweep(&source, cutoff).await.unwrap(), 0);
        let after_second = store.records();

        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn test_sweep_excluding_leaves_kept_urls() {
        let store = Arc::new(InMemoryEventStore::new());
        let now = Utc::now();
        for url in ["https://x/e/gone", "https://x/e/listed"] {
            store
                .reconcile(&canonical(url), now - ChronoDuration::hours(2))
                .await
                .unwrap();
        }

        let sweeper = Sweeper::new(store.clone(), SweepConfig::default());
        let cutoff = sweeper.config().cutoff(now);
        let keep = vec!["https://x/e/listed".to_string()];

        let changed = sweeper
            .sweep_excluding(&SourceId::new("city-of-sydney"), cutoff, &keep)
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let gone = store.find_by_url("https://x/e/gone").await.unwrap().unwrap();
        let listed = store.find_by_url("https://x/e/listed").await.unwrap().unwrap();
        assert_eq!(gone.status, EventStatus::Inactive);
        assert_eq!(listed.status, EventStatus::New);
    }
}
