//! Instance cache: which instance IDs have already had their detail fetched.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::Result;

use super::{from_millis, now_millis, to_millis};

impl super::Db {
    /// Remember that `instance_id` was seen under `workflow_code`.
    ///
    /// `first_seen` is fixed at creation; re-inserting an existing key is a
    /// no-op and returns `false`.
    pub async fn cache_instance(
        &self,
        workflow_code: &str,
        instance_id: &str,
        first_seen: DateTime<Utc>,
    ) -> Result<bool> {
        let written = sqlx::query(
            "INSERT INTO instance_cache (workflow_code, instance_id, first_seen_ms, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (workflow_code, instance_id) DO NOTHING",
        )
        .bind(workflow_code)
        .bind(instance_id)
        .bind(to_millis(first_seen))
        .bind(now_millis())
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(written > 0)
    }

    pub async fn is_cached(&self, workflow_code: &str, instance_id: &str) -> Result<bool> {
        let hit: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM instance_cache WHERE workflow_code = ?1 AND instance_id = ?2 LIMIT 1",
        )
        .bind(workflow_code)
        .bind(instance_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(hit.is_some())
    }

    /// Every cached instance for a workflow, with its first-seen time.
    pub async fn cached_instances(
        &self,
        workflow_code: &str,
    ) -> Result<BTreeMap<String, DateTime<Utc>>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT instance_id, first_seen_ms FROM instance_cache WHERE workflow_code = ?1",
        )
        .bind(workflow_code)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, ms)| (id, from_millis(ms)))
            .collect())
    }

    /// Delete entries for `workflow_code` first seen strictly before
    /// `threshold`. Returns the number of evicted entries.
    pub async fn evict_cached_before(
        &self,
        workflow_code: &str,
        threshold: DateTime<Utc>,
    ) -> Result<u64> {
        let evicted = sqlx::query(
            "DELETE FROM instance_cache WHERE workflow_code = ?1 AND first_seen_ms < ?2",
        )
        .bind(workflow_code)
        .bind(to_millis(threshold))
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(evicted)
    }
}
