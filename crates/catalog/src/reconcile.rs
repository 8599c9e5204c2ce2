//! Reconciliation engine
//!
//! Decides, per canonical record, how the persisted catalog changes:
//!
//! ```text
//! persisted       comparison              outcome
//! ─────────────   ─────────────────────   ───────────────────────────────────────
//! none            -                       Inserted  (status = new)
//! not imported    title + venue equal     Refreshed (last_scraped_at only)
//! not imported    title or venue differ   Updated   (content, status = updated)
//! imported        any                     Sticky    (last_scraped_at only)
//! ```
//!
//! The decision itself is the pure [`decide`] function. Stores apply it
//! inside their atomic read-decide-write operation
//! ([`EventStore::reconcile`]), so stickiness is re-evaluated against the
//! state at write time rather than a stale read.
//!
//! The engine never assigns `inactive`; that is the sweeper's job.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::candidate::CanonicalRecord;
use crate::persistence::{EventStore, StoreError};
use crate::record::{EventRecord, EventStatus};

/// What reconciling one record did (or will do) to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// First observation; inserted with status `new`
    Inserted,

    /// Title or venue changed; content rewritten and status set to `updated`
    Updated,

    /// Unchanged re-observation; only `last_scraped_at` advanced
    Refreshed,

    /// Imported record re-observed; only `last_scraped_at` advanced
    Sticky,
}

impl std::fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inserted => write!(f, "inserted"),
            Self::Updated => write!(f, "updated"),
            Self::Refreshed => write!(f, "refreshed"),
            Self::Sticky => write!(f, "sticky"),
        }
    }
}

/// Decide how `incoming` reconciles against the persisted record, if any
pub fn decide(existing: Option<&EventRecord>, incoming: &CanonicalRecord) -> ReconcileOutcome {
    match existing {
        None => ReconcileOutcome::Inserted,
        Some(record) if record.status.is_sticky() => ReconcileOutcome::Sticky,
        Some(record) if content_changed(record, incoming) => ReconcileOutcome::Updated,
        Some(_) => ReconcileOutcome::Refreshed,
    }
}

/// Narrow change detection: only title and venue count.
///
/// Image urls, descriptions and dates are volatile on most listing pages and
/// would otherwise re-surface records a curator already triaged.
pub fn content_changed(existing: &EventRecord, incoming: &CanonicalRecord) -> bool {
    existing.title != incoming.title || existing.venue_name != incoming.venue_name
}

/// Next `last_scraped_at` for a re-observed record.
///
/// Always strictly later than `previous`; when the clock has not moved past
/// it, advances by one microsecond (PostgreSQL timestamp precision).
pub fn advance_scraped_at(previous: DateTime<Utc>, observed_at: DateTime<Utc>) -> DateTime<Utc> {
    let floor = previous + Duration::microseconds(1);
    if observed_at >= floor {
        observed_at
    } else {
        floor
    }
}

/// Build the record inserted on first observation
pub fn new_record(incoming: &CanonicalRecord, observed_at: DateTime<Utc>) -> EventRecord {
    EventRecord {
        id: Uuid::now_v7(),
        original_url: incoming.original_url.clone(),
        title: incoming.title.clone(),
        date: incoming.date,
        venue_name: incoming.venue_name.clone(),
        description: incoming.description.clone(),
        image_url: incoming.image_url.clone(),
        source_id: incoming.source_id.clone(),
        source_name: incoming.source_name.clone(),
        city: incoming.city.clone(),
        status: EventStatus::New,
        last_scraped_at: observed_at,
        imported_at: None,
        imported_by: None,
        import_notes: None,
        created_at: observed_at,
        updated_at: observed_at,
    }
}

/// Apply an `Updated`, `Refreshed` or `Sticky` outcome to an existing record.
///
/// `Inserted` has nothing to apply to and leaves the record untouched.
pub fn apply(
    outcome: ReconcileOutcome,
    record: &mut EventRecord,
    incoming: &CanonicalRecord,
    observed_at: DateTime<Utc>,
) {
    match outcome {
        ReconcileOutcome::Inserted => return,
        ReconcileOutcome::Updated => {
            record.title = incoming.title.clone();
            record.venue_name = incoming.venue_name.clone();
            record.description = incoming.description.clone();
            record.image_url = incoming.image_url.clone();
            record.date = incoming.date;
            record.status = EventStatus::Updated;
        }
        ReconcileOutcome::Refreshed | ReconcileOutcome::Sticky => {}
    }

    record.last_scraped_at = advance_scraped_at(record.last_scraped_at, observed_at);
    record.updated_at = observed_at;
}

/// A record whose write failed; it stays in its prior persisted state
#[derive(Debug)]
pub struct RecordFailure {
    pub original_url: String,
    pub error: StoreError,
}

/// Tally of one source's reconciliation batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub inserted: usize,
    pub updated: usize,
    pub refreshed: usize,
    pub sticky: usize,
    pub failures: Vec<RecordFailure>,
}

impl BatchReport {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Inserted => self.inserted += 1,
            ReconcileOutcome::Updated => self.updated += 1,
            ReconcileOutcome::Refreshed => self.refreshed += 1,
            ReconcileOutcome::Sticky => self.sticky += 1,
        }
    }

    /// Records successfully reconciled
    pub fn succeeded(&self) -> usize {
        self.inserted + self.updated + self.refreshed + self.sticky
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs reconciliation batches against a store
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn EventStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Reconcile a single record
    pub async fn reconcile(
        &self,
        record: &CanonicalRecord,
        observed_at: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, StoreError> {
        self.store.reconcile(record, observed_at).await
    }

    /// Reconcile a batch in discovery order.
    ///
    /// A failing write never aborts the batch; failures are collected in the
    /// returned report.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn reconcile_batch(
        &self,
        records: &[CanonicalRecord],
        observed_at: DateTime<Utc>,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for record in records {
            match self.reconcile(record, observed_at).await {
                Ok(outcome) => {
                    debug!(url = %record.original_url, %outcome, "reconciled record");
                    report.record(outcome);
                }
                Err(error) => {
                    warn!(url = %record.original_url, %error, "failed to reconcile record");
                    report.failures.push(RecordFailure {
                        original_url: record.original_url.clone(),
                        error,
                    });
                }
            }
        }

        report
    }
}
