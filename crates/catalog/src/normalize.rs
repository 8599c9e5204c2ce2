//! Record normalization
//!
//! Shapes the raw candidates of a single fetch pass into canonical records:
//! one per distinct url, in the order each url was first discovered.
//! Pure and deterministic; performs no I/O.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::candidate::{CanonicalRecord, RawCandidate};
use crate::source::SourceDescriptor;

/// Deduplicate and canonicalize one adapter's output
///
/// Duplicates within the pass are merged last-write-wins per field. An
/// absent optional field on a later duplicate does not erase a value seen
/// earlier. Unusable candidates (blank url or title) are dropped.
///
/// Source identity, display name and city come from `source`, so that every
/// record of a source is stored under the same [`SourceId`](crate::SourceId)
/// regardless of what the adapter put in `source_name`.
pub fn normalize(source: &SourceDescriptor, candidates: Vec<RawCandidate>) -> Vec<CanonicalRecord> {
    let mut order: Vec<String> = Vec::with_capacity(candidates.len());
    let mut by_url: HashMap<String, CanonicalRecord> = HashMap::with_capacity(candidates.len());

    for candidate in candidates {
        if !candidate.is_usable() {
            continue;
        }

        let url = candidate.url.trim().to_string();
        match by_url.entry(url) {
            Entry::Occupied(mut existing) => merge(existing.get_mut(), candidate),
            Entry::Vacant(slot) => {
                order.push(slot.key().clone());
                slot.insert(canonicalize(source, candidate));
            }
        }
    }

    order
        .into_iter()
        .filter_map(|url| by_url.remove(&url))
        .collect()
}

fn canonicalize(source: &SourceDescriptor, candidate: RawCandidate) -> CanonicalRecord {
    CanonicalRecord {
        original_url: candidate.url.trim().to_string(),
        title: candidate.title.trim().to_string(),
        venue_name: candidate.venue_hint.trim().to_string(),
        description: non_blank(candidate.description),
        image_url: non_blank(candidate.image_url),
        date: candidate.date,
        source_id: source.id.clone(),
        source_name: source.name.clone(),
        city: source.city.clone(),
    }
}

fn merge(record: &mut CanonicalRecord, candidate: RawCandidate) {
    record.title = candidate.title.trim().to_string();
    record.venue_name = candidate.venue_hint.trim().to_string();

    if let Some(description) = non_blank(candidate.description) {
        record.description = Some(description);
    }
    if let Some(image_url) = non_blank(candidate.image_url) {
        record.image_url = Some(image_url);
    }
    if let Some(date) = candidate.date {
        record.date = Some(date);
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceDescriptor {
        SourceDescriptor::new("city-of-sydney", "City of Sydney", "Sydney")
    }

    fn candidate(title: &str, url: &str) -> RawCandidate {
        RawCandidate::new(title, url, "Sydney", "City of Sydney")
    }

    #[test]
    fn test_one_record_per_url_in_discovery_order() {
        let records = normalize(
            &source(),
            vec![
                candidate("B", "https://x/e/2"),
                candidate("A", "https://x/e/1"),
                candidate("B again", "https://x/e/2"),
                candidate("C", "https://x/e/3"),
            ],
        );

        let urls: Vec<_> = records.iter().map(|r| r.original_url.as_str()).collect();
        assert_eq!(urls, vec!["https://x/e/2", "https://x/e/1", "https://x/e/3"]);
    }

    #[test]
    fn test_duplicates_are_last_write_wins() {
        let records = normalize(
            &source(),
            vec![
                candidate("Early title", "https://x/e/1").with_image_url("https://img/1.jpg"),
                candidate("Late title", "https://x/e/1"),
            ],
        );

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Late title");
        // a missing optional field on the later duplicate keeps the earlier value
        assert_eq!(records[0].image_url.as_deref(), Some("https://img/1.jpg"));
    }

    #[test]
    fn test_unusable_candidates_are_dropped() {
        let records = normalize(
            &source(),
            vec![
                candidate("   ", "https://x/e/1"),
                candidate("No url", ""),
                candidate("Kept", "https://x/e/2"),
            ],
        );

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Kept");
    }

    #[test]
    fn test_fields_are_trimmed_and_blanks_cleared() {
        let records = normalize(
            &source(),
            vec![candidate("  Jazz Night \n", " https://x/e/1 ")
                .with_image_url("")
                .with_description("  ")],
        );

        let record = &records[0];
        assert_eq!(record.title, "Jazz Night");
        assert_eq!(record.original_url, "https://x/e/1");
        assert_eq!(record.image_url, None);
        assert_eq!(record.description, None);
    }

    #[test]
    fn test_source_identity_comes_from_descriptor() {
        let records = normalize(
            &source(),
            vec![RawCandidate::new("Gig", "https://x/e/9", "Town Hall", "somewhere else")],
        );

        assert_eq!(records[0].source_id.as_str(), "city-of-sydney");
        assert_eq!(records[0].source_name, "City of Sydney");
        assert_eq!(records[0].city, "Sydney");
        assert_eq!(records[0].venue_name, "Town Hall");
    }

    #[test]
    fn test_is_deterministic() {
        let input = vec![
            candidate("A", "https://x/e/1"),
            candidate("B", "https://x/e/2"),
            candidate("A2", "https://x/e/1"),
        ];

        assert_eq!(
            normalize(&source(), input.clone()),
            normalize(&source(), input)
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize(&source(), vec![]).is_empty());
    }
}
