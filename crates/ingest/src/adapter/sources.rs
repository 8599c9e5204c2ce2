//! Built-in listing sources

use serde::{Deserialize, Serialize};
use sydevents_catalog::SourceDescriptor;

use super::html::ListingSelectors;

/// Everything needed to build an adapter for one listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub descriptor: SourceDescriptor,

    /// Page the listings are scraped from
    pub listing_url: String,

    pub selectors: ListingSelectors,

    /// Venue recorded for every listing; listing pages rarely expose one
    pub venue_hint: String,
}

impl SourceConfig {
    pub fn new(
        descriptor: SourceDescriptor,
        listing_url: impl Into<String>,
        selectors: ListingSelectors,
    ) -> Self {
        let venue_hint = descriptor.city.clone();
        Self {
            descriptor,
            listing_url: listing_url.into(),
            selectors,
            venue_hint,
        }
    }

    pub fn with_venue_hint(mut self, venue_hint: impl Into<String>) -> Self {
        self.venue_hint = venue_hint.into();
        self
    }

    pub fn with_listing_url(mut self, listing_url: impl Into<String>) -> Self {
        self.listing_url = listing_url.into();
        self
    }
}

/// City of Sydney "What's On" search results
pub fn city_of_sydney() -> SourceConfig {
    SourceConfig::new(
        SourceDescriptor::new("city-of-sydney", "City of Sydney", "Sydney"),
        "https://whatson.cityofsydney.nsw.gov.au/search/advanced?q=&categories=&date_from=&date_to=&location=",
        ListingSelectors::new(r#"article, a[href*="/events/"]"#, r#"a[href*="/events/"]"#, "article"),
    )
}

/// Eventbrite's Sydney discovery page
pub fn eventbrite_sydney() -> SourceConfig {
    SourceConfig::new(
        SourceDescriptor::new("eventbrite-sydney", "Eventbrite Sydney", "Sydney"),
        "https://www.eventbrite.com.au/d/australia--sydney/events/",
        ListingSelectors::new(r#"a[href*="/e/"], .event-card"#, r#"a[href*="/e/"]"#, "section")
            .with_min_title_len(6),
    )
}

/// Sources scraped every cycle, in cycle order
pub fn builtin_sources() -> Vec<SourceConfig> {
    vec![city_of_sydney(), eventbrite_sydney()]
}
