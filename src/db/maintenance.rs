//! Operator maintenance: table statistics and time-based rollback.
//!
//! Rollback undoes everything the relay recorded after a point in time, so
//! a bad deploy or a misconfigured workflow can be re-evaluated from scratch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::Result;

use super::{from_millis, to_millis};

/// Tables that carry relay state. The job log is history and is left alone.
const STATE_TABLES: [&str; 3] = ["dedup_records", "instance_cache", "task_queue"];

/// Row count and creation-time range of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub table: &'static str,
    pub count: i64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Rows removed (or that would be removed) by a rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub since: DateTime<Utc>,
    pub dry_run: bool,
    pub dedup_records: u64,
    pub instance_cache: u64,
    pub task_queue: u64,
}

impl RollbackReport {
    fn set(&mut self, table: &str, rows: u64) {
        match table {
            "dedup_records" => self.dedup_records = rows,
            "instance_cache" => self.instance_cache = rows,
            _ => self.task_queue = rows,
        }
    }
}

impl super::Db {
    pub async fn table_stats(&self) -> Result<Vec<TableStats>> {
        let mut stats = Vec::with_capacity(STATE_TABLES.len());
        for table in STATE_TABLES {
            let (count, oldest, newest): (i64, Option<i64>, Option<i64>) = sqlx::query_as(
                &format!("SELECT COUNT(*), MIN(created_at), MAX(created_at) FROM {table}"),
            )
            .fetch_one(self.pool())
            .await?;
            stats.push(TableStats {
                table,
                count,
                oldest: oldest.map(from_millis),
                newest: newest.map(from_millis),
            });
        }
        Ok(stats)
    }

    /// Remove every state row created at or after `since`.
    ///
    /// With `dry_run` nothing is deleted and the report carries the counts
    /// that would have been removed. The deletes commit as one transaction.
    pub async fn rollback_since(&self, since: DateTime<Utc>, dry_run: bool) -> Result<RollbackReport> {
        let mut report = RollbackReport {
            since,
            dry_run,
            ..Default::default()
        };
        let since_ms = to_millis(since);

        if dry_run {
            for table in STATE_TABLES {
                let count: i64 = sqlx::query_scalar(&format!(
                    "SELECT COUNT(*) FROM {table} WHERE created_at >= ?1"
                ))
                .bind(since_ms)
                .fetch_one(self.pool())
                .await?;
                report.set(table, count as u64);
            }
            return Ok(report);
        }

        let mut tx = self.pool().begin().await?;
        for table in STATE_TABLES {
            let deleted = sqlx::query(&format!("DELETE FROM {table} WHERE created_at >= ?1"))
                .bind(since_ms)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            report.set(table, deleted);
        }
        tx.commit().await?;

        info!(
            since = %since,
            dedup_records = report.dedup_records,
            instance_cache = report.instance_cache,
            task_queue = report.task_queue,
            "rollback applied"
        );
        Ok(report)
    }
}
