//! In-memory implementation of EventStore for dev mode and testing

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::store::*;
use crate::candidate::CanonicalRecord;
use crate::curation::ImportRequest;
use crate::reconcile::{self, ReconcileOutcome};
use crate::record::{EventRecord, EventStatus};
use crate::source::SourceId;

/// In-memory implementation of EventStore
///
/// Stores all records in a map keyed by `original_url` and provides the
/// same semantics as the PostgreSQL implementation. Every write holds the
/// write lock for its whole read-decide-write step.
///
/// # Example
///
/// ```
/// use sydevents_catalog::InMemoryEventStore;
///
/// let store = InMemoryEventStore::new();
/// assert_eq!(store.len(), 0);
/// ```
pub struct InMemoryEventStore {
    records: RwLock<HashMap<String, EventRecord>>,
    failing_urls: RwLock<HashSet<String>>,
}

impl InMemoryEventStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            failing_urls: RwLock::new(HashSet::new()),
        }
    }

    /// Get the number of records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Snapshot of every record, ordered by url
    pub fn records(&self) -> Vec<EventRecord> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.original_url.cmp(&b.original_url));
        records
    }

    /// Make every subsequent write for `original_url` fail with a database
    /// error (for testing failure isolation)
    pub fn fail_writes_for(&self, original_url: impl Into<String>) {
        self.failing_urls.write().insert(original_url.into());
    }

    fn check_writable(&self, original_url: &str) -> Result<(), StoreError> {
        if self.failing_urls.read().contains(original_url) {
            return Err(StoreError::Database(format!(
                "injected write failure for {original_url}"
            )));
        }
        Ok(())
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn find_by_url(&self, original_url: &str) -> Result<Option<EventRecord>, StoreError> {
        Ok(self.records.read().get(original_url).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<EventRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .values()
            .find(|record| record.id == id)
            .cloned())
    }

    async fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|record| filter.matches(record))
            .count() as u64)
    }

    async fn reconcile(
        &self,
        record: &CanonicalRecord,
        observed_at: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, StoreError> {
        self.check_writable(&record.original_url)?;

        let mut records = self.records.write();
        let outcome = reconcile::decide(records.get(&record.original_url), record);

        match records.get_mut(&record.original_url) {
            Some(existing) => reconcile::apply(outcome, existing, record, observed_at),
            None => {
                records.insert(
                    record.original_url.clone(),
                    reconcile::new_record(record, observed_at),
                );
            }
        }

        Ok(outcome)
    }

    async fn mark_stale(
        &self,
        source_id: &SourceId,
        cutoff: DateTime<Utc>,
        keep: &[String],
    ) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut records = self.records.write();
        let mut changed = 0;

        for record in records.values_mut() {
            if &record.source_id == source_id
                && record.last_scraped_at < cutoff
                && !matches!(record.status, EventStatus::Imported | EventStatus::Inactive)
                && !keep.contains(&record.original_url)
            {
                record.status = EventStatus::Inactive;
                record.updated_at = now;
                changed += 1;
            }
        }

        Ok(changed)
    }

    async fn mark_imported(
        &self,
        id: Uuid,
        request: &ImportRequest,
        imported_at: DateTime<Utc>,
    ) -> Result<EventRecord, StoreError> {
        let mut records = self.records.write();
        let record = records
            .values_mut()
            .find(|record| record.id == id)
            .ok_or(StoreError::NotFound(id))?;

        record.status = EventStatus::Imported;
        record.imported_at = Some(imported_at);
        record.imported_by = Some(request.imported_by);
        record.import_notes = Some(request.notes.clone().unwrap_or_default());
        record.updated_at = imported_at;

        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn canonical(url: &str, title: &str, venue: &str) -> CanonicalRecord {
        CanonicalRecord {
            original_url: url.to_string(),
            title: title.to_string(),
            venue_name: venue.to_string(),
            description: None,
            image_url: None,
            date: None,
            source_id: SourceId::new("city-of-sydney"),
            source_name: "City of Sydney".to_string(),
            city: "Sydney".to_string(),
        }
    }

    #[tokio::test]
    async fn test_reconcile_inserts_then_refreshes() {
        let store = InMemoryEventStore::new();
        let record = canonical("https://x/e/1", "Jazz Night", "Opera House");
        let t0 = Utc::now();

        let outcome = store.reconcile(&record, t0).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Inserted);
        assert_eq!(store.len(), 1);

        let outcome = store
            .reconcile(&record, t0 + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Refreshed);
        assert_eq!(store.len(), 1);

        let stored = store.find_by_url("https://x/e/1").await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::New);
        assert_eq!(stored.last_scraped_at, t0 + Duration::minutes(1));
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let store = InMemoryEventStore::new();
        store
            .reconcile(&canonical("https://x/e/1", "A", "B"), Utc::now())
            .await
            .unwrap();

        let by_url = store.find_by_url("https://x/e/1").await.unwrap().unwrap();
        let by_id = store.find_by_id(by_url.id).await.unwrap().unwrap();
        assert_eq!(by_id, by_url);

        assert!(store.find_by_id(Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_injected_failure_leaves_no_record() {
        let store = InMemoryEventStore::new();
        store.fail_writes_for("https://x/e/1");

        let result = store
            .reconcile(&canonical("https://x/e/1", "A", "B"), Utc::now())
            .await;

        assert!(matches!(result, Err(StoreError::Database(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_mark_stale_scoped_by_source() {
        let store = InMemoryEventStore::new();
        let old = Utc::now() - Duration::hours(2);

        store
            .reconcile(&canonical("https://x/e/1", "A", "B"), old)
            .await
            .unwrap();

        let mut other = canonical("https://y/e/1", "C", "D");
        other.source_id = SourceId::new("eventbrite-sydney");
        store.reconcile(&other, old).await.unwrap();

        let changed = store
            .mark_stale(&SourceId::new("city-of-sydney"), Utc::now() - Duration::hours(1), &[])
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let other = store.find_by_url("https://y/e/1").await.unwrap().unwrap();
        assert_eq!(other.status, EventStatus::New);
    }

    #[tokio::test]
    async fn test_mark_imported_unknown_id() {
        let store = InMemoryEventStore::new();
        let id = Uuid::now_v7();
        let result = store
            .mark_imported(id, &ImportRequest::new(Uuid::now_v7()), Utc::now())
            .await;

        assert!(matches!(result, Err(StoreError::NotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn test_count_with_filter() {
        let store = InMemoryEventStore::new();
        let now = Utc::now();

        store
            .reconcile(&canonical("https://x/e/1", "A", "B"), now - Duration::days(2))
            .await
            .unwrap();
        store
            .reconcile(&canonical("https://x/e/2", "C", "D"), now)
            .await
            .unwrap();

        assert_eq!(store.count(&RecordFilter::all()).await.unwrap(), 2);
        assert_eq!(
            store
                .count(&RecordFilter::all().scraped_since(now - Duration::days(1)))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .count(&RecordFilter::all().with_status(EventStatus::Imported))
                .await
                .unwrap(),
            0
        );
    }
}
