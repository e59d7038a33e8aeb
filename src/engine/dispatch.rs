//! Dispatch engine: decide once per `(instance, status)` whether an
//! instance needs a print job.
//!
//! Candidates are evaluated in order against the workflow policy:
//!
//! 1. a `COMPLETED` dedup mark retires the instance for good
//! 2. the current detail is fetched; unreadable instances are retried later
//! 3. with several valid statuses, a dedup mark for the current status skips
//! 4. a status outside the policy skips; the abort status is also marked
//! 5. a result outside the policy is marked and skipped
//! 6. a dedup mark with no queue row means the job was delivered; skip
//! 7. otherwise the job row is inserted, then the dedup mark is written
//!
//! The row goes in before the mark. A crash between the two leaves a row
//! without a mark; the next pass finds the row present, writes the mark,
//! and enqueues nothing new.

use std::collections::BTreeSet;
use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::{debug, info, warn};

use crate::db::Db;
use crate::error::Result;
use crate::model::{NewTask, STATUS_COMPLETED};
use crate::source::InstanceSource;
use crate::telemetry::metrics;
use crate::workflow::WorkflowPolicy;

/// How one candidate was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A `COMPLETED` dedup mark already exists.
    CompletedBefore,
    /// Detail was absent. Nothing recorded.
    Unreadable,
    /// The current status was already evaluated.
    StatusSeen,
    /// Status not (yet) one the policy acts on. Nothing recorded.
    StatusPending,
    /// Instance reached the abort status. Marked.
    Aborted,
    /// Result not accepted by the policy. Marked.
    ResultRejected,
    Enqueued,
    /// The row was already there; the mark was (re)written.
    AlreadyQueued,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompletedBefore => "completed_before",
            Self::Unreadable => "unreadable",
            Self::StatusSeen => "status_seen",
            Self::StatusPending => "status_pending",
            Self::Aborted => "aborted",
            Self::ResultRejected => "result_rejected",
            Self::Enqueued => "enqueued",
            Self::AlreadyQueued => "already_queued",
        }
    }
}

/// Outcome counts for one dispatch pass (or several, merged).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub candidates: usize,
    pub enqueued: usize,
    pub already_queued: usize,
    pub completed_before: usize,
    pub status_seen: usize,
    pub status_pending: usize,
    pub aborted: usize,
    pub result_rejected: usize,
    pub unreadable: usize,
    /// Candidates skipped because of a fetch, integrity or store error.
    pub errors: usize,
}

impl DispatchReport {
    fn count(&mut self, disposition: Disposition) {
        let slot = match disposition {
            Disposition::CompletedBefore => &mut self.completed_before,
            Disposition::Unreadable => &mut self.unreadable,
            Disposition::StatusSeen => &mut self.status_seen,
            Disposition::StatusPending => &mut self.status_pending,
            Disposition::Aborted => &mut self.aborted,
            Disposition::ResultRejected => &mut self.result_rejected,
            Disposition::Enqueued => &mut self.enqueued,
            Disposition::AlreadyQueued => &mut self.already_queued,
        };
        *slot += 1;
    }

    pub fn merge(&mut self, other: &DispatchReport) {
        self.candidates += other.candidates;
        self.enqueued += other.enqueued;
        self.already_queued += other.already_queued;
        self.completed_before += other.completed_before;
        self.status_seen += other.status_seen;
        self.status_pending += other.status_pending;
        self.aborted += other.aborted;
        self.result_rejected += other.result_rejected;
        self.unreadable += other.unreadable;
        self.errors += other.errors;
    }
}

pub struct Dispatcher {
    db: Arc<Db>,
    source: Arc<dyn InstanceSource>,
}

impl Dispatcher {
    pub fn new(db: Arc<Db>, source: Arc<dyn InstanceSource>) -> Self {
        Self { db, source }
    }

    /// Evaluate every candidate. Per-candidate errors are logged and
    /// counted; the pass always runs to the end.
    pub async fn dispatch(
        &self,
        policy: &WorkflowPolicy,
        candidates: &BTreeSet<String>,
    ) -> DispatchReport {
        let mut report = DispatchReport {
            candidates: candidates.len(),
            ..Default::default()
        };

        for id in candidates {
            let outcome = match self.evaluate(policy, id).await {
                Ok(disposition) => {
                    report.count(disposition);
                    disposition.as_str()
                }
                Err(e) => {
                    report.errors += 1;
                    warn!(workflow = %policy.name, instance_id = %id, error = %e, "dispatch skipped instance");
                    "error"
                }
            };
            metrics::dispatch_outcomes().add(
                1,
                &[
                    KeyValue::new("workflow", policy.name.clone()),
                    KeyValue::new("outcome", outcome),
                ],
            );
        }

        info!(
            workflow = %policy.name,
            candidates = report.candidates,
            enqueued = report.enqueued,
            errors = report.errors,
            "dispatch finished"
        );
        report
    }

    /// Classify one candidate and apply its side effects.
    pub async fn evaluate(&self, policy: &WorkflowPolicy, id: &str) -> Result<Disposition> {
        // Irreversible, even if other valid statuses were never seen.
        if self.db.dedup_exists(id, STATUS_COMPLETED).await? {
            return Ok(Disposition::CompletedBefore);
        }

        let Some(detail) = self.source.get_detail(id).await? else {
            warn!(workflow = %policy.name, instance_id = id, "detail missing, will retry");
            return Ok(Disposition::Unreadable);
        };
        let status = detail.status.as_str();

        if policy.statuses.len() > 1 && self.db.dedup_exists(id, status).await? {
            return Ok(Disposition::StatusSeen);
        }

        if !policy.statuses.contains(status) {
            if status == policy.abort_status {
                self.db.record_dedup(id, status).await?;
                debug!(instance_id = id, status, "instance aborted");
                return Ok(Disposition::Aborted);
            }
            return Ok(Disposition::StatusPending);
        }

        let accepted = detail
            .result
            .as_deref()
            .is_some_and(|r| policy.results.contains(r));
        if !accepted {
            self.db.record_dedup(id, status).await?;
            debug!(
                instance_id = id,
                status,
                result = detail.result.as_deref().unwrap_or(""),
                "result not accepted"
            );
            return Ok(Disposition::ResultRejected);
        }

        // A mark with no row means the job was already delivered. A row with
        // no mark falls through so the mark gets written.
        if self.db.dedup_exists(id, status).await? && !self.db.task_exists(id, status).await? {
            return Ok(Disposition::StatusSeen);
        }

        let task = NewTask::new(id, status, &policy.kind, &detail.title);
        let written = self.db.enqueue_task(&task).await?;
        self.db.record_dedup(id, status).await?;

        if written {
            info!(
                workflow = %policy.name,
                instance_id = id,
                status,
                title = %detail.title,
                "job enqueued"
            );
            Ok(Disposition::Enqueued)
        } else {
            debug!(instance_id = id, status, "job already queued, mark written");
            Ok(Disposition::AlreadyQueued)
        }
    }
}
