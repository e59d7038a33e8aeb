//! Task queue rows, dedup markers, and the job log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pending render/print job. Unique per `(instance_id, status)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTask {
    /// Queue-local row id. Monotonic, used for deletion and FIFO tie-breaks.
    pub id: i64,
    pub instance_id: String,
    /// Status the instance had when the job was created.
    pub status: String,
    /// Selects the renderer.
    pub workflow_kind: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for enqueueing a job.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub(crate) instance_id: String,
    pub(crate) status: String,
    pub(crate) workflow_kind: String,
    pub(crate) title: String,
}

impl NewTask {
    pub fn new(
        instance_id: impl Into<String>,
        status: impl Into<String>,
        workflow_kind: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            status: status.into(),
            workflow_kind: workflow_kind.into(),
            title: title.into(),
        }
    }
}

/// Marker meaning "this (instance, status) pair has been evaluated".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub instance_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// A historical job from the append-only job log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub instance_id: String,
    pub status: String,
    pub workflow_kind: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}
