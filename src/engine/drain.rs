//! Queue drain: hand pending jobs to their renderers.
//!
//! The queue is snapshotted once and processed in FIFO order, one job at a
//! time. A row is deleted only after its renderer reports success. Anything
//! else leaves it for the next cycle; there is no failed state.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::{Instrument, error, info, warn};

use crate::config::RunMode;
use crate::db::Db;
use crate::error::Result;
use crate::model::QueuedTask;
use crate::render::{RenderJob, RendererRegistry};
use crate::telemetry::cycle::{record_outcome, start_job_span};
use crate::telemetry::metrics;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Jobs rendered and removed from the queue.
    pub delivered: usize,
    /// Jobs whose renderer declined or failed. Left queued.
    pub failed: usize,
    /// Jobs with no renderer for their kind. Left queued.
    pub unroutable: usize,
    /// Jobs rendered whose row could not be deleted.
    pub store_errors: usize,
}

/// Replay result for one workflow kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub workflow_kind: String,
    pub instance_id: String,
    pub delivered: bool,
}

#[derive(Clone)]
pub struct QueueDrain {
    db: Arc<Db>,
    renderers: Arc<RendererRegistry>,
    mode: RunMode,
}

impl QueueDrain {
    pub fn new(db: Arc<Db>, renderers: Arc<RendererRegistry>, mode: RunMode) -> Self {
        Self {
            db,
            renderers,
            mode,
        }
    }

    /// Process every row present at the start of the call.
    ///
    /// Only the initial listing can fail; per-row problems are counted.
    pub async fn drain(&self) -> Result<DrainReport> {
        let tasks = self.db.list_tasks().await?;
        let mut report = DrainReport::default();

        for task in &tasks {
            let span = start_job_span(&task.workflow_kind, &task.instance_id, &task.status);
            let outcome = self.deliver(task).instrument(span.clone()).await;
            match outcome {
                JobOutcome::Delivered => report.delivered += 1,
                JobOutcome::Failed => report.failed += 1,
                JobOutcome::Unroutable => report.unroutable += 1,
                JobOutcome::StoreError => report.store_errors += 1,
            }
            record_outcome(&span, outcome.as_str());
            metrics::drain_outcomes().add(
                1,
                &[
                    KeyValue::new("kind", task.workflow_kind.clone()),
                    KeyValue::new("outcome", outcome.as_str()),
                ],
            );
        }

        if !tasks.is_empty() {
            info!(
                pending = tasks.len(),
                delivered = report.delivered,
                failed = report.failed,
                unroutable = report.unroutable,
                "drain finished"
            );
        }
        Ok(report)
    }

    async fn deliver(&self, task: &QueuedTask) -> JobOutcome {
        let Some(handler) = self.renderers.get(&task.workflow_kind) else {
            warn!(kind = %task.workflow_kind, instance_id = %task.instance_id, "no renderer for kind, leaving job queued");
            return JobOutcome::Unroutable;
        };

        let job = RenderJob::from_task(task, self.mode.no_print);
        match handler.handle(&job).await {
            Ok(true) => match self.db.delete_task(task.id).await {
                Ok(_) => {
                    info!(instance_id = %task.instance_id, title = %task.title, "job delivered");
                    JobOutcome::Delivered
                }
                Err(e) => {
                    // Rendered but still queued: it will print again next cycle.
                    error!(instance_id = %task.instance_id, error = %e, "delete after render failed");
                    JobOutcome::StoreError
                }
            },
            Ok(false) => {
                warn!(instance_id = %task.instance_id, "renderer declined job, will retry");
                JobOutcome::Failed
            }
            Err(e) => {
                warn!(instance_id = %task.instance_id, error = %e, "render failed, will retry");
                JobOutcome::Failed
            }
        }
    }

    /// Re-render the most recent job of every kind ever queued.
    ///
    /// The queue is not touched. Used to exercise renderers against real
    /// data in debug runs.
    pub async fn replay_latest(&self) -> Result<Vec<ReplayOutcome>> {
        let jobs = self.db.latest_job_per_kind().await?;
        let mut outcomes = Vec::with_capacity(jobs.len());

        for record in jobs {
            let Some(handler) = self.renderers.get(&record.workflow_kind) else {
                warn!(kind = %record.workflow_kind, "no renderer for kind, skipping replay");
                continue;
            };
            let job = RenderJob {
                instance_id: record.instance_id.clone(),
                workflow_kind: record.workflow_kind.clone(),
                status: record.status.clone(),
                title: record.title.clone(),
                no_print: self.mode.no_print,
            };
            let span = start_job_span(&record.workflow_kind, &record.instance_id, &record.status);
            let delivered = match handler.handle(&job).instrument(span.clone()).await {
                Ok(delivered) => delivered,
                Err(e) => {
                    warn!(kind = %record.workflow_kind, error = %e, "replay failed");
                    false
                }
            };
            record_outcome(&span, if delivered { "replayed" } else { "failed" });
            outcomes.push(ReplayOutcome {
                workflow_kind: record.workflow_kind,
                instance_id: record.instance_id,
                delivered,
            });
        }
        Ok(outcomes)
    }
}

#[derive(Debug, Clone, Copy)]
enum JobOutcome {
    Delivered,
    Failed,
    Unroutable,
    StoreError,
}

impl JobOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Unroutable => "unroutable",
            Self::StoreError => "store_error",
        }
    }
}
