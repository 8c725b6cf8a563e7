//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Install the Prometheus recorder behind the `metrics` facade
//! - Turn breaker and dispatch events into counters, histograms and gauges
//! - Track HTTP traffic at the gateway edge
//! - Render the text exposition served on `/metrics`
//!
//! # Metrics
//! - `circuit_breaker_requests_total` (counter): calls by breaker name, result
//! - `circuit_breaker_call_duration_seconds` (histogram): call latency by breaker name
//! - `circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `http_requests_total` (counter): requests by method, endpoint, status code
//! - `http_request_duration_seconds` (histogram): edge latency
//! - `http_requests_in_flight` (gauge): requests currently being served
//!
//! # Design Decisions
//! - Metric handles are atomic; recording never blocks and never fails the request
//! - Labels for breaker name, result, endpoint and status code
//! - Histogram buckets tuned for typical web latencies

use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::Next,
    response::Response,
};
use dashmap::{mapref::entry::Entry, DashMap};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Gauge, Unit};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use crate::resilience::{BreakerObserver, BreakerState, CallObservation, StateChange};

pub const BREAKER_REQUESTS_TOTAL: &str = "circuit_breaker_requests_total";
pub const BREAKER_CALL_DURATION: &str = "circuit_breaker_call_duration_seconds";
pub const BREAKER_STATE: &str = "circuit_breaker_state";
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";
pub const HTTP_REQUESTS_IN_FLIGHT: &str = "http_requests_in_flight";

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Build a Prometheus recorder with the gateway's histogram buckets.
pub fn build_recorder() -> Result<PrometheusRecorder, BuildError> {
    Ok(PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(BREAKER_CALL_DURATION.to_string()), LATENCY_BUCKETS)?
        .set_buckets_for_metric(Matcher::Full(HTTP_REQUEST_DURATION.to_string()), LATENCY_BUCKETS)?
        .build_recorder())
}

/// Install the process-wide recorder and return its handle.
///
/// Safe to call more than once; later calls return the handle installed first.
pub fn install() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = HANDLE.get() {
        return Ok(handle.clone());
    }

    let recorder = build_recorder()?;
    let handle = recorder.handle();
    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("A global metrics recorder is already installed, gateway metrics may not be exported");
    }
    describe();

    Ok(HANDLE.get_or_init(|| handle).clone())
}

/// Register metric descriptions with the active recorder.
pub fn describe() {
    describe_counter!(BREAKER_REQUESTS_TOTAL, "Total number of calls through a circuit breaker");
    describe_histogram!(BREAKER_CALL_DURATION, Unit::Seconds, "Duration of guarded calls in seconds");
    describe_gauge!(BREAKER_STATE, "Circuit breaker state (0=closed, 1=half-open, 2=open)");
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests by method, endpoint, and status code");
    describe_histogram!(HTTP_REQUEST_DURATION, Unit::Seconds, "Duration of HTTP requests in seconds");
    describe_gauge!(HTTP_REQUESTS_IN_FLIGHT, "Current number of HTTP requests being processed");
}

/// Feeds breaker and dispatch events into the installed recorder.
///
/// Remembers the last generation applied per breaker so a state change that
/// arrives late never overwrites a newer one.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    latest: DashMap<String, u64>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

fn set_state(name: &str, state: BreakerState) {
    gauge!(BREAKER_STATE, "name" => name.to_string()).set(f64::from(state.ordinal()));
}

impl BreakerObserver for MetricsRecorder {
    fn breaker_created(&self, name: &str) {
        set_state(name, BreakerState::Closed);
    }

    fn state_changed(&self, change: &StateChange) {
        match self.latest.entry(change.name.clone()) {
            Entry::Occupied(mut seen) => {
                if *seen.get() >= change.generation {
                    tracing::trace!(
                        breaker = %change.name,
                        generation = change.generation,
                        latest = *seen.get(),
                        "Ignoring out-of-order state change"
                    );
                    return;
                }
                // Gauge is set while the entry is held so racing updates apply in order.
                seen.insert(change.generation);
                set_state(&change.name, change.to);
            }
            Entry::Vacant(slot) => {
                let _held = slot.insert(change.generation);
                set_state(&change.name, change.to);
            }
        }
    }

    fn call_observed(&self, call: &CallObservation) {
        counter!(
            BREAKER_REQUESTS_TOTAL,
            "name" => call.target.clone(),
            "result" => call.outcome.as_str()
        )
        .increment(1);
        histogram!(BREAKER_CALL_DURATION, "name" => call.target.clone())
            .record(call.elapsed.as_secs_f64());
    }
}

/// Holds one slot of `http_requests_in_flight` until dropped, including when
/// the request future is cancelled.
struct InFlight(Gauge);

impl InFlight {
    fn enter() -> Self {
        let gauge = gauge!(HTTP_REQUESTS_IN_FLIGHT);
        gauge.increment(1.0);
        Self(gauge)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.decrement(1.0);
    }
}

/// Axum middleware recording edge traffic.
///
/// Requests that hit no fixed endpoint are labelled `proxy` to keep label
/// cardinality bounded.
pub async fn track_http(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "proxy".to_string());

    let in_flight = InFlight::enter();
    let response = next.run(request).await;
    drop(in_flight);

    let status = response.status().as_u16().to_string();
    let labels = [
        ("method", method),
        ("endpoint", endpoint),
        ("status_code", status),
    ];
    counter!(HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(HTTP_REQUEST_DURATION, &labels).record(start.elapsed().as_secs_f64());

    response
}
