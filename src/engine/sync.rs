//! Sync engine: discover instances changed in a trailing window and keep
//! the instance cache current.
//!
//! Only IDs the cache has never seen cost a detail fetch. After pagination
//! the retention sweep drops entries past the retention window, and the
//! surviving cache keys become the dispatch candidates.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use opentelemetry::KeyValue;
use tracing::{debug, info, warn};

use crate::db::Db;
use crate::error::Result;
use crate::model::STATUS_COMPLETED;
use crate::source::InstanceSource;
use crate::telemetry::metrics;

/// How far back each listing starts.
pub const TRAILING_WINDOW_DAYS: i64 = 5;
pub const PAGE_SIZE: u32 = 20;
/// Cache entries older than this are evicted.
pub const RETENTION_DAYS: i64 = 90;
/// Upper bound on listing requests per pass.
pub const MAX_PAGES: u32 = 1000;
pub const MAX_CONSECUTIVE_PAGE_FAILURES: u32 = 3;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub trailing_window: TimeDelta,
    pub page_size: u32,
    pub retention: TimeDelta,
    pub max_pages: u32,
    pub max_consecutive_page_failures: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            trailing_window: TimeDelta::days(TRAILING_WINDOW_DAYS),
            page_size: PAGE_SIZE,
            retention: TimeDelta::days(RETENTION_DAYS),
            max_pages: MAX_PAGES,
            max_consecutive_page_failures: MAX_CONSECUTIVE_PAGE_FAILURES,
        }
    }
}

/// What one sync pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Cache keys for the workflow after eviction.
    pub candidates: BTreeSet<String>,
    /// Listing pages fetched successfully.
    pub pages: u32,
    pub detail_fetches: u32,
    /// New cache entries written.
    pub cached: u32,
    pub evicted: u64,
    pub page_failures: u32,
}

pub struct SyncEngine {
    db: Arc<Db>,
    source: Arc<dyn InstanceSource>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(db: Arc<Db>, source: Arc<dyn InstanceSource>) -> Self {
        Self::with_config(db, source, SyncConfig::default())
    }

    pub fn with_config(db: Arc<Db>, source: Arc<dyn InstanceSource>, config: SyncConfig) -> Self {
        Self { db, source, config }
    }

    /// Sync `workflow_code` as of now.
    pub async fn sync(&self, workflow_code: &str, statuses: &[String]) -> Result<SyncReport> {
        self.sync_at(workflow_code, statuses, Utc::now()).await
    }

    /// Sync `workflow_code` with `now` as the reference time for the
    /// trailing window and the retention threshold.
    ///
    /// Listing and detail failures are logged and absorbed. Only store
    /// failures during eviction or the final cache read are returned.
    pub async fn sync_at(
        &self,
        workflow_code: &str,
        statuses: &[String],
        now: DateTime<Utc>,
    ) -> Result<SyncReport> {
        let statuses: Vec<String> = if statuses.is_empty() {
            vec![STATUS_COMPLETED.to_string()]
        } else {
            statuses.to_vec()
        };
        let since_ms = (now - self.config.trailing_window).timestamp_millis();
        let labels = [KeyValue::new("workflow", workflow_code.to_string())];

        let mut report = SyncReport::default();
        let mut cursor: Option<String> = None;
        let mut consecutive_failures = 0;
        let mut requests = 0;

        loop {
            if requests >= self.config.max_pages {
                warn!(workflow_code, requests, "page cap reached, stopping pagination");
                break;
            }
            requests += 1;

            let page = match self
                .source
                .list_instance_ids(
                    workflow_code,
                    &statuses,
                    since_ms,
                    cursor.as_deref(),
                    self.config.page_size,
                )
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    report.page_failures += 1;
                    consecutive_failures += 1;
                    metrics::sync_pages().add(1, &with_result(&labels, "error"));
                    warn!(
                        workflow_code,
                        cursor = cursor.as_deref().unwrap_or(""),
                        consecutive_failures,
                        error = %e,
                        "page fetch failed"
                    );
                    if consecutive_failures >= self.config.max_consecutive_page_failures {
                        warn!(workflow_code, "giving up on pagination for this pass");
                        break;
                    }
                    continue;
                }
            };
            consecutive_failures = 0;
            report.pages += 1;
            metrics::sync_pages().add(1, &with_result(&labels, "ok"));

            for id in &page.ids {
                self.cache_if_new(workflow_code, id, &labels, &mut report)
                    .await;
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let threshold = now - self.config.retention;
        report.evicted = self.db.evict_cached_before(workflow_code, threshold).await?;
        if report.evicted > 0 {
            metrics::cache_evictions().add(report.evicted, &labels);
        }

        report.candidates = self
            .db
            .cached_instances(workflow_code)
            .await?
            .into_keys()
            .collect();

        info!(
            workflow_code,
            pages = report.pages,
            detail_fetches = report.detail_fetches,
            cached = report.cached,
            evicted = report.evicted,
            candidates = report.candidates.len(),
            "sync finished"
        );
        Ok(report)
    }

    /// Fetch detail and cache `id` unless it is already cached. Every
    /// failure skips the ID; it is retried on the next pass.
    async fn cache_if_new(
        &self,
        workflow_code: &str,
        id: &str,
        labels: &[KeyValue],
        report: &mut SyncReport,
    ) {
        match self.db.is_cached(workflow_code, id).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!(workflow_code, instance_id = id, error = %e, "cache lookup failed");
                return;
            }
        }

        report.detail_fetches += 1;
        let created_at = match self.source.get_detail(id).await {
            Ok(Some(detail)) => match detail.require_created_at() {
                Ok(ts) => ts,
                Err(e) => {
                    metrics::sync_detail_fetches().add(1, &with_result(labels, "skipped"));
                    warn!(workflow_code, instance_id = id, error = %e, "skipping instance");
                    return;
                }
            },
            Ok(None) => {
                metrics::sync_detail_fetches().add(1, &with_result(labels, "skipped"));
                warn!(workflow_code, instance_id = id, "empty detail, skipping instance");
                return;
            }
            Err(e) => {
                metrics::sync_detail_fetches().add(1, &with_result(labels, "error"));
                warn!(workflow_code, instance_id = id, error = %e, "detail fetch failed");
                return;
            }
        };

        match self.db.cache_instance(workflow_code, id, created_at).await {
            Ok(written) => {
                if written {
                    report.cached += 1;
                }
                metrics::sync_detail_fetches().add(1, &with_result(labels, "cached"));
                debug!(workflow_code, instance_id = id, %created_at, "instance cached");
            }
            Err(e) => {
                warn!(workflow_code, instance_id = id, error = %e, "cache insert failed");
            }
        }
    }
}

fn with_result(labels: &[KeyValue], result: &'static str) -> Vec<KeyValue> {
    let mut out = labels.to_vec();
    out.push(KeyValue::new("result", result));
    out
}
