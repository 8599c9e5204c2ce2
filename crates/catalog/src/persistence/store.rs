//! EventStore trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::candidate::CanonicalRecord;
use crate::curation::ImportRequest;
use crate::reconcile::ReconcileOutcome;
use crate::record::{EventRecord, EventStatus};
use crate::source::SourceId;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Record not found
    #[error("event record not found: {0}")]
    NotFound(Uuid),

    /// A concurrent writer kept winning the race for the same url
    #[error("concurrency conflict on {0}")]
    ConcurrencyConflict(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Stored data could not be decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Predicate for counting records
///
/// Every `None` field matches all records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub status: Option<EventStatus>,
    pub source_id: Option<SourceId>,
    pub scraped_since: Option<DateTime<Utc>>,
}

impl RecordFilter {
    /// Match every record
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source_id: SourceId) -> Self {
        self.source_id = Some(source_id);
        self
    }

    /// Only records observed at or after `since`
    pub fn scraped_since(mut self, since: DateTime<Utc>) -> Self {
        self.scraped_since = Some(since);
        self
    }

    pub fn matches(&self, record: &EventRecord) -> bool {
        self.status.map_or(true, |s| record.status == s)
            && self
                .source_id
                .as_ref()
                .map_or(true, |id| &record.source_id == id)
            && self
                .scraped_since
                .map_or(true, |since| record.last_scraped_at >= since)
    }
}

/// Store for catalog records
///
/// Records are keyed by `original_url`; implementations must enforce its
/// uniqueness. Implementations must be thread-safe and support concurrent
/// access; in particular [`reconcile`](EventStore::reconcile),
/// [`mark_stale`](EventStore::mark_stale) and
/// [`mark_imported`](EventStore::mark_imported) must each be atomic so that
/// the `imported` check is made against the state being overwritten.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    // =========================================================================
    // Lookups
    // =========================================================================

    /// Find a record by its natural key
    async fn find_by_url(&self, original_url: &str) -> Result<Option<EventRecord>, StoreError>;

    /// Find a record by surrogate id
    async fn find_by_id(&self, id: Uuid) -> Result<Option<EventRecord>, StoreError>;

    /// Count records matching a predicate
    async fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError>;

    // =========================================================================
    // Pipeline Writes
    // =========================================================================

    /// Atomically read the current state for `record.original_url`, decide
    /// with [`reconcile::decide`](crate::reconcile::decide) and write the
    /// result.
    ///
    /// On error nothing is written.
    async fn reconcile(
        &self,
        record: &CanonicalRecord,
        observed_at: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, StoreError>;

    /// Mark every record of `source_id` last observed before `cutoff` as
    /// inactive, skipping records that are imported or already inactive and
    /// any record whose url is in `keep`.
    ///
    /// `keep` carries urls observed this pass whose write failed; their
    /// stored `last_scraped_at` is stale but they are still listed.
    ///
    /// Returns the number of records changed.
    async fn mark_stale(
        &self,
        source_id: &SourceId,
        cutoff: DateTime<Utc>,
        keep: &[String],
    ) -> Result<u64, StoreError>;

    // =========================================================================
    // Curator Writes
    // =========================================================================

    /// Set `status = imported` together with the import fields, atomically
    async fn mark_imported(
        &self,
        id: Uuid,
        request: &ImportRequest,
        imported_at: DateTime<Utc>,
    ) -> Result<EventRecord, StoreError>;
}
