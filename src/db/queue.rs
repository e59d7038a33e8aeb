//! Task queue operations: insert-if-absent, FIFO listing, delete on delivery.

use crate::error::Result;
use crate::model::{JobRecord, NewTask, QueuedTask, STATUS_COMPLETED};

use super::{from_millis, now_millis};

impl super::Db {
    /// Enqueue a job unless one already exists for `(instance_id, status)`.
    ///
    /// The queue row and its job-log entry commit together. Returns `true`
    /// when a new row was written.
    pub async fn enqueue_task(&self, task: &NewTask) -> Result<bool> {
        let mut tx = self.pool().begin().await?;
        let now = now_millis();

        let written = sqlx::query(
            "INSERT INTO task_queue (instance_id, status, workflow_kind, title, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (instance_id, status) DO NOTHING",
        )
        .bind(&task.instance_id)
        .bind(&task.status)
        .bind(&task.workflow_kind)
        .bind(&task.title)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if written > 0 {
            sqlx::query(
                "INSERT INTO job_log (instance_id, status, workflow_kind, title, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&task.instance_id)
            .bind(&task.status)
            .bind(&task.workflow_kind)
            .bind(&task.title)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(written > 0)
    }

    pub async fn task_exists(&self, instance_id: &str, status: &str) -> Result<bool> {
        let hit: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM task_queue WHERE instance_id = ?1 AND status = ?2 LIMIT 1",
        )
        .bind(instance_id)
        .bind(status)
        .fetch_optional(self.pool())
        .await?;
        Ok(hit.is_some())
    }

    /// All pending jobs, oldest first.
    pub async fn list_tasks(&self) -> Result<Vec<QueuedTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT id, instance_id, status, workflow_kind, title, created_at
             FROM task_queue ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(QueuedTask::from).collect())
    }

    /// Delete a delivered job. Returns `false` if the row was already gone.
    pub async fn delete_task(&self, id: i64) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM task_queue WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    /// The most recent logged job for every workflow kind.
    ///
    /// Jobs whose instance reached a completed dedup mark win over newer
    /// in-flight ones.
    pub async fn latest_job_per_kind(&self) -> Result<Vec<JobRecord>> {
        let kinds: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT workflow_kind FROM job_log ORDER BY workflow_kind ASC",
        )
        .fetch_all(self.pool())
        .await?;

        let mut jobs = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let row: Option<JobRow> = sqlx::query_as(
                "SELECT j.instance_id, j.status, j.workflow_kind, j.title, j.created_at
                 FROM job_log j
                 WHERE j.workflow_kind = ?1
                 ORDER BY EXISTS (
                     SELECT 1 FROM dedup_records d
                     WHERE d.instance_id = j.instance_id AND d.status = ?2
                 ) DESC, j.created_at DESC, j.id DESC
                 LIMIT 1",
            )
            .bind(&kind)
            .bind(STATUS_COMPLETED)
            .fetch_optional(self.pool())
            .await?;
            jobs.extend(row.map(JobRecord::from));
        }
        Ok(jobs)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    instance_id: String,
    status: String,
    workflow_kind: String,
    title: String,
    created_at: i64,
}

impl From<TaskRow> for QueuedTask {
    fn from(row: TaskRow) -> Self {
        Self {
            id: row.id,
            instance_id: row.instance_id,
            status: row.status,
            workflow_kind: row.workflow_kind,
            title: row.title,
            created_at: from_millis(row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    instance_id: String,
    status: String,
    workflow_kind: String,
    title: String,
    created_at: i64,
}

impl From<JobRow> for JobRecord {
    fn from(row: JobRow) -> Self {
        Self {
            instance_id: row.instance_id,
            status: row.status,
            workflow_kind: row.workflow_kind,
            title: row.title,
            created_at: from_millis(row.created_at),
        }
    }
}
