//! Curator import action
//!
//! The only path that sets `status = imported`. Authorization is the
//! caller's responsibility; this module trusts `imported_by`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::persistence::{EventStore, StoreError};
use crate::record::EventRecord;

/// A curator's decision to import a record into the curated catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    /// Curator user id
    pub imported_by: Uuid,

    /// Free-form notes; stored as an empty string when absent
    #[serde(default)]
    pub notes: Option<String>,
}

impl ImportRequest {
    pub fn new(imported_by: Uuid) -> Self {
        Self {
            imported_by,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Import record `id`, stamping `imported_at` with `at`.
///
/// Re-importing an already imported record overwrites the import fields.
pub async fn import_record(
    store: &dyn EventStore,
    id: Uuid,
    request: &ImportRequest,
    at: DateTime<Utc>,
) -> Result<EventRecord, StoreError> {
    let record = store.mark_imported(id, request, at).await?;
    info!(
        record_id = %record.id,
        url = %record.original_url,
        imported_by = %request.imported_by,
        "record imported"
    );
    Ok(record)
}
