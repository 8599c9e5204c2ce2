//! Catalog statistics for dashboards

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::persistence::{EventStore, RecordFilter, StoreError};
use crate::record::EventStatus;

/// Window used for `recently_scraped`
pub const RECENT_WINDOW_HOURS: i64 = 24;

/// Headline counts over the whole catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total: u64,
    pub new: u64,
    pub updated: u64,
    pub inactive: u64,
    pub imported: u64,
    /// Records observed within the last 24 hours
    pub recently_scraped: u64,
}

impl CatalogStats {
    pub async fn collect(store: &dyn EventStore, now: DateTime<Utc>) -> Result<Self, StoreError> {
        let by_status = |status| RecordFilter::all().with_status(status);

        Ok(Self {
            total: store.count(&RecordFilter::all()).await?,
            new: store.count(&by_status(EventStatus::New)).await?,
            updated: store.count(&by_status(EventStatus::Updated)).await?,
            inactive: store.count(&by_status(EventStatus::Inactive)).await?,
            imported: store.count(&by_status(EventStatus::Imported)).await?,
            recently_scraped: store
                .count(
                    &RecordFilter::all().scraped_since(now - Duration::hours(RECENT_WINDOW_HOURS)),
                )
                .await?,
        })
    }
}
