//! Integration tests for the SQLite store.

use approval_relay::db::Db;
use approval_relay::model::NewTask;
use chrono::{Duration, TimeZone, Utc};

async fn test_db() -> Db {
    Db::in_memory().await.unwrap()
}

#[tokio::test]
async fn connects_and_migrates() {
    let db = test_db().await;
    assert!(db.health_check().await.is_ok());
}

#[tokio::test]
async fn file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("relay.db");

    {
        let db = Db::connect(&path).await.unwrap();
        db.migrate().await.unwrap();
        db.record_dedup("inst-1", "COMPLETED").await.unwrap();
        db.enqueue_task(&NewTask::new("inst-1", "COMPLETED", "claim", "Claim"))
            .await
            .unwrap();
    }

    let db = Db::connect(&path).await.unwrap();
    db.migrate().await.unwrap();
    assert!(db.dedup_exists("inst-1", "COMPLETED").await.unwrap());
    assert_eq!(db.list_tasks().await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Dedup records
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dedup_insert_is_idempotent() {
    let db = test_db().await;

    assert!(db.record_dedup("inst-1", "COMPLETED").await.unwrap());
    assert!(!db.record_dedup("inst-1", "COMPLETED").await.unwrap());
    assert!(db.record_dedup("inst-1", "RUNNING").await.unwrap());

    let records = db.list_dedup_records().await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(db.dedup_exists("inst-1", "RUNNING").await.unwrap());
    assert!(!db.dedup_exists("inst-2", "COMPLETED").await.unwrap());
}

// ---------------------------------------------------------------------------
// Instance cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cache_keeps_first_seen_time() {
    let db = test_db().await;
    let first = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
    let later = first + Duration::days(3);

    assert!(db.cache_instance("PROC-A", "inst-1", first).await.unwrap());
    assert!(!db.cache_instance("PROC-A", "inst-1", later).await.unwrap());

    let cached = db.cached_instances("PROC-A").await.unwrap();
    assert_eq!(cached.get("inst-1"), Some(&first));
}

#[tokio::test]
async fn cache_is_scoped_per_workflow_code() {
    let db = test_db().await;
    let ts = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();

    db.cache_instance("PROC-A", "inst-1", ts).await.unwrap();
    db.cache_instance("PROC-B", "inst-2", ts).await.unwrap();

    assert!(db.is_cached("PROC-A", "inst-1").await.unwrap());
    assert!(!db.is_cached("PROC-A", "inst-2").await.unwrap());
    assert_eq!(db.cached_instances("PROC-B").await.unwrap().len(), 1);
}

#[tokio::test]
async fn eviction_is_strictly_before_threshold() {
    let db = test_db().await;
    let threshold = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

    db.cache_instance("PROC-A", "old", threshold - Duration::milliseconds(1))
        .await
        .unwrap();
    db.cache_instance("PROC-A", "edge", threshold).await.unwrap();
    db.cache_instance("PROC-B", "other", threshold - Duration::days(10))
        .await
        .unwrap();

    let evicted = db.evict_cached_before("PROC-A", threshold).await.unwrap();
    assert_eq!(evicted, 1);
    assert!(!db.is_cached("PROC-A", "old").await.unwrap());
    assert!(db.is_cached("PROC-A", "edge").await.unwrap());
    // Other workflow codes are untouched.
    assert!(db.is_cached("PROC-B", "other").await.unwrap());
}

// ---------------------------------------------------------------------------
// Task queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enqueue_is_unique_per_instance_and_status() {
    let db = test_db().await;
    let task = NewTask::new("inst-1", "COMPLETED", "claim", "Claim");

    assert!(db.enqueue_task(&task).await.unwrap());
    assert!(!db.enqueue_task(&task).await.unwrap());
    assert!(
        db.enqueue_task(&NewTask::new("inst-1", "RUNNING", "claim", "Claim"))
            .await
            .unwrap()
    );

    assert_eq!(db.list_tasks().await.unwrap().len(), 2);
    assert!(db.task_exists("inst-1", "COMPLETED").await.unwrap());
}

#[tokio::test]
async fn tasks_list_in_fifo_order_and_delete() {
    let db = test_db().await;
    for id in ["a", "b", "c"] {
        db.enqueue_task(&NewTask::new(id, "COMPLETED", "claim", id))
            .await
            .unwrap();
    }

    let tasks = db.list_tasks().await.unwrap();
    let ids: Vec<_> = tasks.iter().map(|t| t.instance_id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);

    assert!(db.delete_task(tasks[1].id).await.unwrap());
    assert!(!db.delete_task(tasks[1].id).await.unwrap());

    let ids: Vec<_> = db
        .list_tasks()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.instance_id)
        .collect();
    assert_eq!(ids, ["a", "c"]);
}

#[tokio::test]
async fn latest_job_prefers_completed_instances() {
    let db = test_db().await;

    db.enqueue_task(&NewTask::new("done", "COMPLETED", "claim", "Done"))
        .await
        .unwrap();
    db.record_dedup("done", "COMPLETED").await.unwrap();
    db.enqueue_task(&NewTask::new("running", "RUNNING", "claim", "Running"))
        .await
        .unwrap();
    db.enqueue_task(&NewTask::new("leave", "COMPLETED", "leave", "Leave"))
        .await
        .unwrap();

    let jobs = db.latest_job_per_kind().await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].workflow_kind, "claim");
    assert_eq!(jobs[0].instance_id, "done");
    assert_eq!(jobs[1].workflow_kind, "leave");
    assert_eq!(jobs[1].instance_id, "leave");
}

#[tokio::test]
async fn job_log_outlives_queue_rows() {
    let db = test_db().await;
    db.enqueue_task(&NewTask::new("inst-1", "COMPLETED", "claim", "Claim"))
        .await
        .unwrap();
    let task = db.list_tasks().await.unwrap().remove(0);
    db.delete_task(task.id).await.unwrap();

    let jobs = db.latest_job_per_kind().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].instance_id, "inst-1");
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stats_cover_state_tables() {
    let db = test_db().await;
    db.record_dedup("inst-1", "COMPLETED").await.unwrap();
    db.record_dedup("inst-2", "COMPLETED").await.unwrap();

    let stats = db.table_stats().await.unwrap();
    let tables: Vec<_> = stats.iter().map(|s| s.table).collect();
    assert_eq!(tables, ["dedup_records", "instance_cache", "task_queue"]);
    assert_eq!(stats[0].count, 2);
    assert!(stats[0].oldest.is_some());
    assert_eq!(stats[1].count, 0);
    assert!(stats[1].oldest.is_none());
}

#[tokio::test]
async fn rollback_dry_run_leaves_data_intact() {
    let db = test_db().await;
    let since = Utc::now() - Duration::hours(1);
    db.record_dedup("inst-1", "COMPLETED").await.unwrap();
    db.enqueue_task(&NewTask::new("inst-1", "COMPLETED", "claim", "Claim"))
        .await
        .unwrap();

    let report = db.rollback_since(since, true).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.dedup_records, 1);
    assert_eq!(report.task_queue, 1);
    assert!(db.dedup_exists("inst-1", "COMPLETED").await.unwrap());
    assert_eq!(db.list_tasks().await.unwrap().len(), 1);
}

#[tokio::test]
async fn rollback_apply_removes_recent_rows_only() {
    let db = test_db().await;
    db.record_dedup("inst-1", "COMPLETED").await.unwrap();

    // Everything so far is older than a cutoff in the future.
    let future = Utc::now() + Duration::hours(1);
    let report = db.rollback_since(future, false).await.unwrap();
    assert_eq!(report.dedup_records, 0);
    assert!(db.dedup_exists("inst-1", "COMPLETED").await.unwrap());

    let past = Utc::now() - Duration::hours(1);
    let report = db.rollback_since(past, false).await.unwrap();
    assert_eq!(report.dedup_records, 1);
    assert!(!db.dedup_exists("inst-1", "COMPLETED").await.unwrap());
}
