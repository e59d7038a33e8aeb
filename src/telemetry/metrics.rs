//! Metric instrument factories.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op and recording
//! costs nothing.

use opentelemetry::metrics::{Counter, Histogram, Meter};

use super::SERVICE_NAME;

fn meter() -> Meter {
    opentelemetry::global::meter(SERVICE_NAME)
}

/// Counter: listing pages requested from the instance source.
/// Labels: `workflow`, `result` ("ok" | "error").
pub fn sync_pages() -> Counter<u64> {
    meter()
        .u64_counter("relay.sync.pages")
        .with_description("Instance listing pages requested")
        .build()
}

/// Counter: detail fetches made by the sync engine for unseen IDs.
/// Labels: `workflow`, `result` ("cached" | "skipped" | "error").
pub fn sync_detail_fetches() -> Counter<u64> {
    meter()
        .u64_counter("relay.sync.detail_fetches")
        .with_description("Detail fetches for newly seen instances")
        .build()
}

/// Counter: cache entries evicted by the retention sweep.
/// Labels: `workflow`.
pub fn cache_evictions() -> Counter<u64> {
    meter()
        .u64_counter("relay.cache.evictions")
        .with_description("Instance cache entries evicted past retention")
        .build()
}

/// Counter: dispatch decisions per candidate.
/// Labels: `workflow`, `outcome`.
pub fn dispatch_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("relay.dispatch.outcomes")
        .with_description("Dispatch decisions per candidate instance")
        .build()
}

/// Counter: queue rows processed by the drain loop.
/// Labels: `kind`, `outcome` ("delivered" | "failed" | "unroutable").
pub fn drain_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("relay.drain.outcomes")
        .with_description("Queue rows processed by the drain loop")
        .build()
}

/// Histogram: full cycle duration in milliseconds.
pub fn cycle_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("relay.cycle.duration_ms")
        .with_description("Cycle duration in milliseconds")
        .with_unit("ms")
        .build()
}
