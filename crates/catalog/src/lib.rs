//! # Event Catalog
//!
//! Record model and reconciliation core for the aggregated event catalog.
//!
//! ## Features
//!
//! - **Natural-key dedup**: one record per source URL, regardless of how many times it is scraped
//! - **Reconciliation state machine**: new, updated and refreshed transitions applied atomically per record
//! - **Sticky curation**: records a curator imported are never reverted by the pipeline
//! - **Staleness sweeps**: records absent from their source past a window are marked inactive
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         normalize                            │
//! │  (RawCandidate batch -> CanonicalRecord, dedup by url)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Reconciler                            │
//! │  (per-record decide + atomic write, failures accumulated)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        EventStore                            │
//! │  (PostgreSQL: catalog_events; in-memory for dev and tests)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Sweeper                              │
//! │  (per source: last_scraped_at < cutoff -> inactive)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use chrono::Utc;
//! use sydevents_catalog::prelude::*;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
//! let source = SourceDescriptor::new("city-of-sydney", "City of Sydney", "Sydney");
//!
//! let raw = vec![RawCandidate::new("Jazz Night", "https://x/e/1", "Opera House", "City of Sydney")];
//! let records = normalize(&source, raw);
//!
//! let report = Reconciler::new(store.clone())
//!     .reconcile_batch(&records, Utc::now())
//!     .await;
//! assert_eq!(report.inserted, 1);
//! # });
//! ```

pub mod candidate;
pub mod curation;
pub mod normalize;
pub mod persistence;
pub mod reconcile;
pub mod record;
pub mod source;
pub mod stats;
pub mod sweep;

/// Prelude for common imports
pub mod prelude {
    pub use crate::candidate::{CanonicalRecord, RawCandidate};
    pub use crate::curation::{import_record, ImportRequest};
    pub use crate::normalize::normalize;
    pub use crate::persistence::{
        EventStore, InMemoryEventStore, PostgresEventStore, RecordFilter, StoreError,
    };
    pub use crate::reconcile::{BatchReport, ReconcileOutcome, Reconciler};
    pub use crate::record::{EventRecord, EventStatus};
    pub use crate::source::{SourceDescriptor, SourceId};
    pub use crate::stats::CatalogStats;
    pub use crate::sweep::{SweepConfig, Sweeper};
}

// Re-export key types at crate root
pub use candidate::{CanonicalRecord, RawCandidate};
pub use curation::{import_record, ImportRequest};
pub use normalize::normalize;
pub use persistence::{
    EventStore, InMemoryEventStore, PostgresEventStore, RecordFilter, StoreError,
};
pub use reconcile::{BatchReport, ReconcileOutcome, RecordFailure, Reconciler};
pub use record::{EventRecord, EventStatus};
pub use source::{SourceDescriptor, SourceId};
pub use stats::CatalogStats;
pub use sweep::{SweepConfig, Sweeper};
