//! Candidate records produced by source adapters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::SourceId;

/// An unverified listing extracted from a source page
///
/// Adapters emit these as-is; nothing about them has been checked beyond
/// what the adapter chose to extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub title: String,
    pub url: String,
    pub venue_hint: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub source_name: String,
}

impl RawCandidate {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        venue_hint: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            venue_hint: venue_hint.into(),
            image_url: None,
            description: None,
            date: None,
            source_name: source_name.into(),
        }
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// A candidate needs a url and a non-blank title to be reconciled
    pub fn is_usable(&self) -> bool {
        !self.url.trim().is_empty() && !self.title.trim().is_empty()
    }
}

/// A deduplicated candidate ready for reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub original_url: String,
    pub title: String,
    pub venue_name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub source_id: SourceId,
    pub source_name: String,
    pub city: String,
}
