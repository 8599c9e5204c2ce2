//! Source identity
//!
//! Staleness sweeps are scoped by [`SourceId`], a stable identifier chosen
//! when the source is configured. The display name is carried on records
//! for presentation only and never used to scope a sweep.

use serde::{Deserialize, Serialize};

/// Stable identifier of an external listing source (e.g. `"eventbrite-sydney"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// What the catalog needs to know about a source when ingesting its listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Stable id used to scope sweeps
    pub id: SourceId,

    /// Human readable name stored on each record
    pub name: String,

    /// City every listing of this source belongs to
    pub city: String,
}

impl SourceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            id: SourceId::new(id),
            name: name.into(),
            city: city.into(),
        }
    }
}
