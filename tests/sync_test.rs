//! Integration tests for the sync engine.

mod common;

use std::sync::Arc;

use approval_relay::db::Db;
use approval_relay::engine::{SyncConfig, SyncEngine};
use chrono::{Duration, TimeZone, Utc};
use common::{FakeSource, detail};

const CODE: &str = "PROC-CLAIM";

async fn setup() -> (Arc<Db>, Arc<FakeSource>, SyncEngine) {
    let db = Arc::new(Db::in_memory().await.unwrap());
    let source = Arc::new(FakeSource::new());
    let engine = SyncEngine::new(Arc::clone(&db), source.clone());
    (db, source, engine)
}

fn completed() -> Vec<String> {
    vec!["COMPLETED".to_string()]
}

#[tokio::test]
async fn follows_cursors_and_caches_new_ids() {
    let (db, source, engine) = setup().await;
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
    let created = now - Duration::days(1);

    source.page(None, &["a", "b"], Some("p2"));
    source.page(Some("p2"), &["c"], None);
    for id in ["a", "b", "c"] {
        source.set_detail(detail(id, "COMPLETED", Some("agree"), created));
    }

    let report = engine.sync_at(CODE, &completed(), now).await.unwrap();

    assert_eq!(report.pages, 2);
    assert_eq!(report.cached, 3);
    assert_eq!(
        report.candidates.iter().map(String::as_str).collect::<Vec<_>>(),
        ["a", "b", "c"]
    );
    assert_eq!(source.list_calls(), 2);
    assert_eq!(
        source.last_since_ms(),
        Some((now - Duration::days(5)).timestamp_millis())
    );
    assert_eq!(db.cached_instances(CODE).await.unwrap()[&"a".to_string()], created);
}

#[tokio::test]
async fn second_sync_makes_no_detail_calls() {
    let (_db, source, engine) = setup().await;
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();

    source.page(None, &["a", "b"], None);
    source.set_detail(detail("a", "COMPLETED", Some("agree"), now));
    source.set_detail(detail("b", "COMPLETED", Some("agree"), now));

    engine.sync_at(CODE, &completed(), now).await.unwrap();
    assert_eq!(source.detail_calls().len(), 2);

    source.reset_calls();
    let report = engine.sync_at(CODE, &completed(), now).await.unwrap();
    assert!(source.detail_calls().is_empty());
    assert_eq!(report.detail_fetches, 0);
    assert_eq!(report.candidates.len(), 2);
}

#[tokio::test]
async fn empty_status_filter_means_completed() {
    let (_db, source, engine) = setup().await;
    engine.sync(CODE, &[]).await.unwrap();
    assert_eq!(source.last_statuses(), ["COMPLETED"]);
}

#[tokio::test]
async fn retention_evicts_old_entries_only() {
    let (db, source, engine) = setup().await;
    let now = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();

    db.cache_instance(CODE, "stale", now - Duration::days(91))
        .await
        .unwrap();
    db.cache_instance(CODE, "fresh", now - Duration::days(89))
        .await
        .unwrap();
    source.page(None, &[], None);

    let report = engine.sync_at(CODE, &completed(), now).await.unwrap();

    assert_eq!(report.evicted, 1);
    assert!(report.candidates.contains("fresh"));
    assert!(!report.candidates.contains("stale"));
    assert!(!db.is_cached(CODE, "stale").await.unwrap());
}

#[tokio::test]
async fn unreadable_details_are_skipped_and_retried() {
    let (db, source, engine) = setup().await;
    let now = Utc::now();

    source.page(None, &["ok", "missing", "broken", "undated"], None);
    source.set_detail(detail("ok", "COMPLETED", Some("agree"), now));
    source.fail_detail("broken");
    let mut undated = detail("undated", "COMPLETED", Some("agree"), now);
    undated.created_at = None;
    source.set_detail(undated);

    let report = engine.sync(CODE, &completed()).await.unwrap();
    assert_eq!(report.detail_fetches, 4);
    assert_eq!(report.cached, 1);
    assert_eq!(
        report.candidates.iter().map(String::as_str).collect::<Vec<_>>(),
        ["ok"]
    );

    // Skipped IDs are fetched again on the next pass.
    source.reset_calls();
    source.set_detail(detail("missing", "COMPLETED", Some("agree"), now));
    let report = engine.sync(CODE, &completed()).await.unwrap();
    assert_eq!(source.detail_calls().len(), 3);
    assert!(db.is_cached(CODE, "missing").await.unwrap());
    assert_eq!(report.candidates.len(), 2);
}

#[tokio::test]
async fn failed_page_is_retried_with_same_cursor() {
    let (_db, source, engine) = setup().await;
    let now = Utc::now();

    source.page(None, &["a"], Some("p2"));
    source.page(Some("p2"), &["b"], None);
    source.fail_page(Some("p2"), 2);
    source.set_detail(detail("a", "COMPLETED", Some("agree"), now));
    source.set_detail(detail("b", "COMPLETED", Some("agree"), now));

    let report = engine.sync(CODE, &completed()).await.unwrap();

    assert_eq!(report.page_failures, 2);
    assert_eq!(report.pages, 2);
    assert_eq!(source.list_calls(), 4);
    assert_eq!(report.candidates.len(), 2);
}

#[tokio::test]
async fn persistent_page_failure_still_returns_cache() {
    let (db, source, engine) = setup().await;
    let now = Utc::now();

    db.cache_instance(CODE, "known", now - Duration::days(1))
        .await
        .unwrap();
    source.fail_page(None, u32::MAX);

    let report = engine.sync(CODE, &completed()).await.unwrap();

    assert_eq!(report.pages, 0);
    assert_eq!(report.page_failures, 3);
    assert_eq!(source.list_calls(), 3);
    assert!(report.candidates.contains("known"));
}

#[tokio::test]
async fn page_cap_bounds_endless_cursor() {
    let db = Arc::new(Db::in_memory().await.unwrap());
    let source = Arc::new(FakeSource::new());
    source.set_endless();
    let engine = SyncEngine::with_config(
        Arc::clone(&db),
        source.clone(),
        SyncConfig {
            max_pages: 7,
            ..Default::default()
        },
    );

    let report = engine.sync(CODE, &completed()).await.unwrap();
    assert_eq!(report.pages, 7);
    assert_eq!(source.list_calls(), 7);
}

#[tokio::test]
async fn default_config_matches_documented_constants() {
    let config = SyncConfig::default();
    assert_eq!(config.trailing_window, Duration::days(5));
    assert_eq!(config.page_size, 20);
    assert_eq!(config.retention, Duration::days(90));
    assert_eq!(config.max_pages, 1000);
    assert_eq!(config.max_consecutive_page_failures, 3);
}
