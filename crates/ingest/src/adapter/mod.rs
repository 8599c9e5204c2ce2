//! Source adapters
//!
//! An adapter knows how to pull listing candidates out of one external
//! source. Adapters never retry and never touch the catalog; the cycle
//! runner decides what to do with their output or failure.

mod html;
mod sources;

pub use html::{
    AdapterBuildError, FetchConfig, HtmlListingAdapter, ListingSelectors, DEFAULT_USER_AGENT,
};
pub use sources::{builtin_sources, city_of_sydney, eventbrite_sydney, SourceConfig};

use std::time::Duration;

use async_trait::async_trait;
use sydevents_catalog::{RawCandidate, SourceDescriptor};

/// Why a fetch produced nothing usable
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request did not complete within the fetch timeout
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Transport failure or non-success HTTP status
    #[error("network error: {0}")]
    Network(String),

    /// The page loaded but its readiness selector matched nothing
    #[error("readiness selector `{0}` matched nothing")]
    SelectorNotFound(String),
}

impl FetchError {
    /// Short label for logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network",
            Self::SelectorNotFound(_) => "selector_not_found",
        }
    }
}

/// Pulls raw candidates from one external source
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The source this adapter reads
    fn source(&self) -> &SourceDescriptor;

    /// Fetch the current listings.
    ///
    /// A page with no usable listings is `Ok(vec![])`, not an error.
    async fn fetch(&self) -> Result<Vec<RawCandidate>, FetchError>;
}
