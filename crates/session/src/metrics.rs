//! Metrics recording helpers
//!
//! Thin wrappers over the `metrics` facade so call sites stay one line.
//! No exporter is wired here; the embedding binary installs whichever
//! recorder it wants before calling [`init_metrics`].

use std::time::Duration;

/// Register metric descriptions with the installed recorder
pub fn init_metrics() {
    metrics::describe_counter!(
        "callstream_sessions_started_total",
        "Call sessions that reached the active state"
    );
    metrics::describe_counter!(
        "callstream_sessions_ended_total",
        "Call sessions that ended for any reason"
    );
    metrics::describe_counter!(
        "callstream_heartbeat_timeouts_total",
        "Sessions closed because the transport stopped acking heartbeats"
    );
    metrics::describe_histogram!(
        "callstream_session_duration_seconds",
        "Wall-clock session length"
    );
    metrics::describe_counter!(
        "callstream_requests_superseded_total",
        "In-flight requests cancelled by a newer submission"
    );
    metrics::describe_counter!(
        "callstream_requests_interrupted_total",
        "In-flight requests cancelled by an explicit interrupt"
    );
    metrics::describe_counter!(
        "callstream_requests_completed_total",
        "Requests that streamed a response"
    );
    metrics::describe_counter!(
        "callstream_requests_failed_total",
        "Requests that failed in a pipeline stage"
    );
    metrics::describe_counter!(
        "callstream_empty_transcripts_total",
        "Requests answered with the canned fallback"
    );
    metrics::describe_counter!(
        "callstream_synthesis_failures_total",
        "Responses degraded to text-only"
    );
    metrics::describe_histogram!(
        "callstream_request_duration_seconds",
        "End-to-end request pipeline latency"
    );
}

pub fn record_session_started() {
    metrics::counter!("callstream_sessions_started_total").increment(1);
}

pub fn record_session_ended(uptime: Duration) {
    metrics::counter!("callstream_sessions_ended_total").increment(1);
    metrics::histogram!("callstream_session_duration_seconds").record(uptime.as_secs_f64());
}

pub fn record_heartbeat_timeout() {
    metrics::counter!("callstream_heartbeat_timeouts_total").increment(1);
}
