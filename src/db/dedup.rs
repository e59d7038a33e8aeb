//! Dedup records: append-only `(instance_id, status)` markers.

use crate::error::Result;
use crate::model::DedupRecord;

use super::{from_millis, now_millis};

impl super::Db {
    /// Mark `(instance_id, status)` as evaluated.
    ///
    /// Idempotent. Returns `true` only when this call wrote the record.
    pub async fn record_dedup(&self, instance_id: &str, status: &str) -> Result<bool> {
        let written = sqlx::query(
            "INSERT INTO dedup_records (instance_id, status, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (instance_id, status) DO NOTHING",
        )
        .bind(instance_id)
        .bind(status)
        .bind(now_millis())
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(written > 0)
    }

    /// Has `(instance_id, status)` been evaluated before?
    pub async fn dedup_exists(&self, instance_id: &str, status: &str) -> Result<bool> {
        let hit: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM dedup_records WHERE instance_id = ?1 AND status = ?2 LIMIT 1",
        )
        .bind(instance_id)
        .bind(status)
        .fetch_optional(self.pool())
        .await?;
        Ok(hit.is_some())
    }

    /// All dedup records, oldest first.
    pub async fn list_dedup_records(&self) -> Result<Vec<DedupRecord>> {
        let rows: Vec<DedupRow> = sqlx::query_as(
            "SELECT instance_id, status, created_at FROM dedup_records
             ORDER BY created_at ASC, instance_id ASC, status ASC",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(DedupRecord::from).collect())
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct DedupRow {
    instance_id: String,
    status: String,
    created_at: i64,
}

impl From<DedupRow> for DedupRecord {
    fn from(row: DedupRow) -> Self {
        Self {
            instance_id: row.instance_id,
            status: row.status,
            created_at: from_millis(row.created_at),
        }
    }
}
