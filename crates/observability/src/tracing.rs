//! Tracing/logging initialization.
//!
//! JSON lines with timestamps and targets, filtered by `RUST_LOG`
//! (default `info`). Stuck-outbox alerts use the `outpost::stuck_head` target
//! so they can be routed or filtered on their own.

use ::tracing::Span;
use tracing_subscriber::EnvFilter;

use outpost_core::{CorrelationContext, JobId};

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(true)
        .try_init();
}

/// Span re-establishing a request's correlation context around a fired job.
///
/// Events logged inside carry `correlation_id`, `caller` and `job_id`.
pub fn correlation_span(ctx: &CorrelationContext, job_id: &JobId) -> Span {
    ::tracing::info_span!(
        "scheduled_job",
        correlation_id = ctx.correlation_id().map(|c| c.as_str()).unwrap_or_default(),
        caller = ctx.caller().unwrap_or_default(),
        job_id = %job_id,
    )
}
