//! Catalog record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::source::SourceId;

/// Lifecycle status of a catalog record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// First observed by the pipeline, not yet triaged
    New,

    /// Title or venue changed since the record was last observed
    Updated,

    /// No longer listed by its source
    Inactive,

    /// Accepted by a curator; sticky against pipeline transitions
    Imported,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Updated => "updated",
            Self::Inactive => "inactive",
            Self::Imported => "imported",
        }
    }

    /// Imported records may only be changed by a curator
    pub fn is_sticky(&self) -> bool {
        matches!(self, Self::Imported)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "updated" => Ok(Self::Updated),
            "inactive" => Ok(Self::Inactive),
            "imported" => Ok(Self::Imported),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Returned when a stored status string is not one of the known values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event status: {0}")]
pub struct UnknownStatus(pub String);

/// One event listing in the catalog
///
/// `original_url` is the natural key: the pipeline dedups on it and the
/// store enforces its uniqueness. `id` exists for the curator-facing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub original_url: String,

    // Content
    pub title: String,
    pub date: Option<DateTime<Utc>>,
    pub venue_name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub source_id: SourceId,
    pub source_name: String,
    pub city: String,

    // Lifecycle
    pub status: EventStatus,
    pub last_scraped_at: DateTime<Utc>,
    pub imported_at: Option<DateTime<Utc>>,
    pub imported_by: Option<Uuid>,
    pub import_notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
