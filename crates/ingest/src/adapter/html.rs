//! Selector-driven HTML listing adapter
//!
//! Fetches a listing page over HTTP and extracts one candidate per listing
//! link:
//!
//! ```text
//! page ──GET──▶ readiness selector? ──no──▶ SelectorNotFound
//!                     │ yes
//!                     ▼
//!              link selector ──▶ title (link text), url (href resolved)
//!                     │
//!                     ▼
//!     closest container (or grandparent) ──▶ img src, time[datetime]
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use sydevents_catalog::{RawCandidate, SourceDescriptor};

use super::sources::SourceConfig;
use super::{FetchError, SourceAdapter};

/// Desktop browser user agent; several listing sites serve bots a stub page
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// CSS selectors describing a listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSelectors {
    /// Must match for the page to count as loaded
    pub ready: String,

    /// One match per listing; its text is the title, its href the url
    pub link: String,

    /// Closest ancestor of a link holding the listing's image and date
    pub container: String,

    /// Links with shorter (trimmed) text are navigation, not listings
    #[serde(default)]
    pub min_title_len: usize,
}

impl ListingSelectors {
    pub fn new(
        ready: impl Into<String>,
        link: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            ready: ready.into(),
            link: link.into(),
            container: container.into(),
            min_title_len: 1,
        }
    }

    /// Set the minimum title length, in characters
    pub fn with_min_title_len(mut self, min_title_len: usize) -> Self {
        self.min_title_len = min_title_len;
        self
    }

    fn compile(&self) -> Result<CompiledSelectors, AdapterBuildError> {
        Ok(CompiledSelectors {
            ready: parse_selector(&self.ready)?,
            link: parse_selector(&self.link)?,
            container: parse_selector(&self.container)?,
            image: parse_selector("img")?,
            time: parse_selector("time[datetime]")?,
            min_title_len: self.min_title_len.max(1),
        })
    }
}

/// HTTP settings shared by all HTML adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Whole-request timeout (connect, headers and body)
    #[serde(with = "duration_millis")]
    pub timeout: Duration,

    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Adapter construction errors
#[derive(Debug, thiserror::Error)]
pub enum AdapterBuildError {
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("invalid listing url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

fn parse_selector(css: &str) -> Result<Selector, AdapterBuildError> {
    Selector::parse(css).map_err(|e| AdapterBuildError::InvalidSelector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone)]
struct CompiledSelectors {
    ready: Selector,
    link: Selector,
    container: Selector,
    image: Selector,
    time: Selector,
    min_title_len: usize,
}

/// Adapter for a server-rendered listing page
pub struct HtmlListingAdapter {
    config: SourceConfig,
    listing_url: Url,
    selectors: CompiledSelectors,
    client: reqwest::Client,
    timeout: Duration,
}

impl HtmlListingAdapter {
    /// Build an adapter, validating the listing url and selectors up front
    pub fn new(config: SourceConfig, fetch: &FetchConfig) -> Result<Self, AdapterBuildError> {
        let listing_url =
            Url::parse(&config.listing_url).map_err(|e| AdapterBuildError::InvalidUrl {
                url: config.listing_url.clone(),
                reason: e.to_string(),
            })?;
        let selectors = config.selectors.compile()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(fetch.user_agent.clone())
            .timeout(fetch.timeout)
            .build()
            .map_err(|e| AdapterBuildError::Client(e.to_string()))?;

        Ok(Self {
            config,
            listing_url,
            selectors,
            client,
            timeout: fetch.timeout,
        })
    }

    /// Extract candidates from an already fetched page.
    ///
    /// Fails only when the readiness selector matches nothing; malformed
    /// listings are skipped.
    pub fn extract(&self, html: &str) -> Result<Vec<RawCandidate>, FetchError> {
        extract_candidates(html, &self.listing_url, &self.selectors, &self.config)
    }

    fn classify(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl SourceAdapter for HtmlListingAdapter {
    fn source(&self) -> &SourceDescriptor {
        &self.config.descriptor
    }

    #[instrument(skip(self), fields(source_id = %self.config.descriptor.id))]
    async fn fetch(&self) -> Result<Vec<RawCandidate>, FetchError> {
        debug!(url = %self.listing_url, "fetching listing page");

        let response = self
            .client
            .get(self.listing_url.clone())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Network(format!(
                "{} returned HTTP {}",
                self.listing_url, status
            )));
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        let candidates = self.extract(&body)?;

        if candidates.is_empty() {
            warn!(
                url = %self.listing_url,
                "listing page loaded but yielded no usable candidates"
            );
        } else {
            info!(count = candidates.len(), "extracted listing candidates");
        }

        Ok(candidates)
    }
}

fn extract_candidates(
    html: &str,
    page_url: &Url,
    selectors: &CompiledSelectors,
    config: &SourceConfig,
) -> Result<Vec<RawCandidate>, FetchError> {
    let document = Html::parse_document(html);

    if document.select(&selectors.ready).next().is_none() {
        return Err(FetchError::SelectorNotFound(config.selectors.ready.clone()));
    }

    let mut candidates = Vec::new();
    for link in document.select(&selectors.link) {
        let title = collapse_whitespace(link.text());
        if title.chars().count() < selectors.min_title_len {
            trace!(%title, "skipping link with short title");
            continue;
        }

        let Some(url) = link
            .value()
            .attr("href")
            .and_then(|href| resolve(page_url, href))
        else {
            trace!(%title, "skipping link without a usable href");
            continue;
        };

        let container = closest(link, &selectors.container)
            .or_else(|| grandparent(link))
            .unwrap_or(link);

        let mut candidate = RawCandidate::new(
            title,
            url,
            config.venue_hint.clone(),
            config.descriptor.name.clone(),
        );
        if let Some(image_url) = image_of(container, selectors, page_url) {
            candidate = candidate.with_image_url(image_url);
        }
        if let Some(date) = date_of(container, selectors) {
            candidate = candidate.with_date(date);
        }

        candidates.push(candidate);
    }

    Ok(candidates)
}

fn collapse_whitespace<'a>(text: impl Iterator<Item = &'a str>) -> String {
    text.flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve `href` against the page; only http(s) targets are listings
fn resolve(page_url: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let mut url = page_url.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.into())
}

fn closest<'a>(element: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| selector.matches(ancestor))
}

fn grandparent(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .parent()
        .and_then(|parent| parent.parent())
        .and_then(ElementRef::wrap)
}

fn image_of(
    container: ElementRef<'_>,
    selectors: &CompiledSelectors,
    page_url: &Url,
) -> Option<String> {
    let img = container.select(&selectors.image).next()?;
    let src = img
        .value()
        .attr("src")
        .filter(|src| !src.trim().is_empty() && !src.starts_with("data:"))
        .or_else(|| img.value().attr("data-src"))?;
    resolve(page_url, src)
}

/// `time[datetime]` as RFC 3339, or a bare date taken as midnight UTC
fn date_of(container: ElementRef<'_>, selectors: &CompiledSelectors) -> Option<DateTime<Utc>> {
    let raw = container
        .select(&selectors.time)
        .next()?
        .value()
        .attr("datetime")?
        .trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
