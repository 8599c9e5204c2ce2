//! Record lifecycle tests against the in-memory store
//!
//! Exercises reconciliation, sweeping and curator imports together the way
//! a scrape cycle drives them.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use sydevents_catalog::prelude::*;

const SOURCE: &str = "city-of-sydney";

fn source() -> SourceDescriptor {
    SourceDescriptor::new(SOURCE, "City of Sydney", "Sydney")
}

fn jazz_night() -> RawCandidate {
    RawCandidate::new("Jazz Night", "https://x/e/1", "Opera House", "City of Sydney")
}

struct Harness {
    store: Arc<InMemoryEventStore>,
    reconciler: Reconciler,
    sweeper: Sweeper,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        Self {
            reconciler: Reconciler::new(store.clone()),
            sweeper: Sweeper::new(store.clone(), SweepConfig::default()),
            store,
        }
    }

    async fn observe(&self, candidates: Vec<RawCandidate>, at: DateTime<Utc>) -> BatchReport {
        let records = normalize(&source(), candidates);
        self.reconciler.reconcile_batch(&records, at).await
    }

    async fn sweep(&self, now: DateTime<Utc>) -> u64 {
        self.sweeper
            .sweep_at(&SourceId::new(SOURCE), now)
            .await
            .expect("sweep failed")
    }

    async fn get(&self, url: &str) -> EventRecord {
        self.store
            .find_by_url(url)
            .await
            .expect("lookup failed")
            .expect("record missing")
    }
}

// ============================================
// Reconciliation
// ============================================

#[tokio::test]
async fn test_unseen_url_is_inserted_as_new() {
    let h = Harness::new();
    let now = Utc::now();

    let report = h.observe(vec![jazz_night()], now).await;

    assert_eq!(report.inserted, 1);
    let record = h.get("https://x/e/1").await;
    assert_eq!(record.status, EventStatus::New);
    assert_eq!(record.last_scraped_at, now);
    assert_eq!(record.title, "Jazz Night");
    assert_eq!(record.venue_name, "Opera House");
    assert_eq!(record.source_id, SourceId::new(SOURCE));
}

#[tokio::test]
async fn test_unchanged_twice_keeps_status_and_advances_timestamp() {
    let h = Harness::new();
    let t0 = Utc::now();
    h.observe(vec![jazz_night()], t0).await;

    let first = {
        h.observe(vec![jazz_night()], t0).await;
        h.get("https://x/e/1").await
    };
    let second = {
        h.observe(vec![jazz_night()], t0).await;
        h.get("https://x/e/1").await
    };

    assert_eq!(first.status, EventStatus::New);
    assert_eq!(second.status, EventStatus::New);
    // the same observed_at three times still yields strictly increasing values
    assert!(first.last_scraped_at > t0);
    assert!(second.last_scraped_at > first.last_scraped_at);
}

#[tokio::test]
async fn test_title_change_marks_updated() {
    let h = Harness::new();
    let t0 = Utc::now();
    h.observe(vec![jazz_night()], t0).await;

    let renamed = RawCandidate::new("Jazz Night (Late Show)", "https://x/e/1", "Opera House", "");
    let report = h.observe(vec![renamed], t0 + Duration::minutes(5)).await;

    assert_eq!(report.updated, 1);
    let record = h.get("https://x/e/1").await;
    assert_eq!(record.status, EventStatus::Updated);
    assert_eq!(record.title, "Jazz Night (Late Show)");
}

#[tokio::test]
async fn test_venue_change_marks_updated() {
    let h = Harness::new();
    let t0 = Utc::now();
    h.observe(vec![jazz_night()], t0).await;

    let moved = RawCandidate::new("Jazz Night", "https://x/e/1", "Town Hall", "");
    h.observe(vec![moved], t0 + Duration::minutes(5)).await;

    let record = h.get("https://x/e/1").await;
    assert_eq!(record.status, EventStatus::Updated);
    assert_eq!(record.venue_name, "Town Hall");
}

#[tokio::test]
async fn test_new_image_alone_does_not_change_status() {
    let h = Harness::new();
    let t0 = Utc::now();
    h.observe(vec![jazz_night().with_image_url("https://img/a.jpg")], t0)
        .await;

    let report = h
        .observe(
            vec![jazz_night().with_image_url("https://img/b.jpg")],
            t0 + Duration::minutes(5),
        )
        .await;

    assert_eq!(report.refreshed, 1);
    let record = h.get("https://x/e/1").await;
    assert_eq!(record.status, EventStatus::New);
    assert_eq!(record.image_url.as_deref(), Some("https://img/a.jpg"));
}

#[tokio::test]
async fn test_new_image_on_updated_record_keeps_updated() {
    let h = Harness::new();
    let t0 = Utc::now();
    h.observe(vec![jazz_night()], t0).await;
    h.observe(
        vec![RawCandidate::new("Jazz Night", "https://x/e/1", "Town Hall", "")],
        t0 + Duration::minutes(1),
    )
    .await;

    h.observe(
        vec![RawCandidate::new("Jazz Night", "https://x/e/1", "Town Hall", "")
            .with_image_url("https://img/new.jpg")],
        t0 + Duration::minutes(2),
    )
    .await;

    assert_eq!(h.get("https://x/e/1").await.status, EventStatus::Updated);
}

#[tokio::test]
async fn test_one_record_per_url_across_cycles() {
    let h = Harness::new();
    let t0 = Utc::now();

    for i in 0..3 {
        h.observe(
            vec![jazz_night(), jazz_night()],
            t0 + Duration::minutes(i),
        )
        .await;
    }

    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn test_write_failures_are_isolated_per_record() {
    let h = Harness::new();
    h.store.fail_writes_for("https://x/e/2");

    let report = h
        .observe(
            vec![
                RawCandidate::new("One", "https://x/e/1", "A", ""),
                RawCandidate::new("Two", "https://x/e/2", "B", ""),
                RawCandidate::new("Three", "https://x/e/3", "C", ""),
            ],
            Utc::now(),
        )
        .await;

    assert_eq!(report.inserted, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].original_url, "https://x/e/2");
    assert!(matches!(report.failures[0].error, StoreError::Database(_)));
    assert!(h.store.find_by_url("https://x/e/2").await.unwrap().is_none());
    assert!(h.store.find_by_url("https://x/e/3").await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_update_leaves_prior_state() {
    let h = Harness::new();
    let t0 = Utc::now();
    h.observe(vec![jazz_night()], t0).await;
    let before = h.get("https://x/e/1").await;

    h.store.fail_writes_for("https://x/e/1");
    let report = h
        .observe(
            vec![RawCandidate::new("Renamed", "https://x/e/1", "Elsewhere", "")],
            t0 + Duration::minutes(5),
        )
        .await;

    assert_eq!(report.failures.len(), 1);
    assert_eq!(h.get("https://x/e/1").await, before);
}

// ============================================
// Staleness
// ============================================

#[tokio::test]
async fn test_absent_for_two_hours_becomes_inactive() {
    let h = Harness::new();
    let now = Utc::now();

    h.observe(vec![jazz_night()], now - Duration::hours(2)).await;
    let changed = h.sweep(now).await;

    assert_eq!(changed, 1);
    assert_eq!(h.get("https://x/e/1").await.status, EventStatus::Inactive);
}

#[tokio::test]
async fn test_observed_within_window_stays_active() {
    let h = Harness::new();
    let now = Utc::now();

    h.observe(vec![jazz_night()], now - Duration::minutes(30)).await;
    assert_eq!(h.sweep(now).await, 0);
    assert_eq!(h.get("https://x/e/1").await.status, EventStatus::New);
}

#[tokio::test]
async fn test_reobserved_inactive_record_with_changes_is_updated() {
    let h = Harness::new();
    let now = Utc::now();

    h.observe(vec![jazz_night()], now - Duration::hours(2)).await;
    h.sweep(now).await;

    h.observe(
        vec![RawCandidate::new("Jazz Night", "https://x/e/1", "Town Hall", "")],
        now,
    )
    .await;

    let record = h.get("https://x/e/1").await;
    assert_eq!(record.status, EventStatus::Updated);
    assert_eq!(record.last_scraped_at, now);
}

#[tokio::test]
async fn test_sweep_twice_equals_sweep_once() {
    let h = Harness::new();
    let now = Utc::now();
    h.observe(
        vec![
            jazz_night(),
            RawCandidate::new("Other", "https://x/e/2", "Somewhere", ""),
        ],
        now - Duration::hours(4),
    )
    .await;

    let cutoff = now - Duration::hours(1);
    let source = SourceId::new(SOURCE);
    h.sweeper.sweep(&source, cutoff).await.unwrap();
    let once = h.store.records();
    h.sweeper.sweep(&source, cutoff).await.unwrap();

    assert_eq!(h.store.records(), once);
}

// ============================================
// Curation
// ============================================

#[tokio::test]
async fn test_imported_record_survives_absence() {
    let h = Harness::new();
    let now = Utc::now();

    // observed, absent two hours, swept
    h.observe(vec![jazz_night()], now - Duration::hours(4)).await;
    h.sweep(now - Duration::hours(2)).await;
    assert_eq!(h.get("https://x/e/1").await.status, EventStatus::Inactive);

    // curator imports it, then two more hours pass without observation
    let id = h.get("https://x/e/1").await.id;
    import_record(
        h.store.as_ref(),
        id,
        &ImportRequest::new(Uuid::now_v7()),
        now - Duration::hours(2),
    )
    .await
    .unwrap();
    h.sweep(now).await;

    assert_eq!(h.get("https://x/e/1").await.status, EventStatus::Imported);
}

#[tokio::test]
async fn test_pipeline_never_touches_import_fields() {
    let h = Harness::new();
    let t0 = Utc::now() - Duration::hours(10);
    let curator = Uuid::now_v7();

    h.observe(vec![jazz_night()], t0).await;
    let id = h.get("https://x/e/1").await.id;
    let imported = import_record(
        h.store.as_ref(),
        id,
        &ImportRequest::new(curator).with_notes("featured"),
        t0 + Duration::minutes(1),
    )
    .await
    .unwrap();

    // a mix of changed, unchanged and absent observations interleaved with sweeps
    let steps: Vec<(Option<RawCandidate>, i64)> = vec![
        (Some(RawCandidate::new("Renamed", "https://x/e/1", "Elsewhere", "")), 1),
        (None, 3),
        (Some(jazz_night().with_image_url("https://img/z.jpg")), 4),
        (None, 8),
    ];

    let mut last_scraped = imported.last_scraped_at;
    for (candidate, hours) in steps {
        let at = t0 + Duration::hours(hours);
        if let Some(candidate) = candidate {
            let report = h.observe(vec![candidate], at).await;
            assert_eq!(report.sticky, 1);
        }
        h.sweep(at).await;

        let record = h.get("https://x/e/1").await;
        assert_eq!(record.status, EventStatus::Imported);
        assert_eq!(record.imported_at, imported.imported_at);
        assert_eq!(record.imported_by, Some(curator));
        assert_eq!(record.import_notes.as_deref(), Some("featured"));
        assert_eq!(record.title, "Jazz Night");
        assert_eq!(record.venue_name, "Opera House");
        assert!(record.last_scraped_at >= last_scraped);
        last_scraped = record.last_scraped_at;
    }
}

#[tokio::test]
async fn test_stats_reflect_lifecycle() {
    let h = Harness::new();
    let now = Utc::now();

    h.observe(vec![jazz_night()], now - Duration::hours(2)).await;
    h.observe(
        vec![RawCandidate::new("Fresh", "https://x/e/2", "Town Hall", "")],
        now,
    )
    .await;
    h.sweep(now).await;

    let stats = CatalogStats::collect(h.store.as_ref(), now).await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.new, 1);
    assert_eq!(stats.inactive, 1);
    assert_eq!(stats.recently_scraped, 2);
}
