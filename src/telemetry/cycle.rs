//! Span helpers for cycles and render jobs.

use tracing::Span;
use uuid::Uuid;

/// Span covering one full sync, dispatch and drain cycle.
pub fn start_cycle_span(cycle_id: &Uuid) -> Span {
    tracing::info_span!("relay.cycle", "cycle.id" = %cycle_id)
}

/// Span for handing one queued job to its renderer.
///
/// `job.outcome` is declared empty and filled in by [`record_outcome`].
pub fn start_job_span(kind: &str, instance_id: &str, status: &str) -> Span {
    tracing::info_span!(
        "relay.job",
        "job.kind" = kind,
        "job.instance_id" = instance_id,
        "job.status" = status,
        "job.outcome" = tracing::field::Empty,
    )
}

/// Record how a job ended, on the span and as an event inside it.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("job.outcome", outcome);
    span.in_scope(|| {
        tracing::info!(outcome, "job_outcome");
    });
}
