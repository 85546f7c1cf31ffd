//! Prometheus collectors for transport activity.
//!
//! Collectors are process-wide and registered into [`REGISTRY`] on first
//! use. Rendering is left to the embedding application through
//! [`gather_metrics`]; nothing here serves HTTP.


use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::warn;

use crate::Error;

lazy_static! {
    pub static ref OPERATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("transport_operations_total", "Completed transport operations by outcome"),
        &["op", "outcome"]
    )
    .expect("metric can not be created");

    pub static ref OPERATION_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("transport_operation_latency_ms", "Operation latency in ms")
            .buckets(exponential_buckets(0.5, 2.0, 14).expect("valid buckets")),
        &["op"]
    )
    .expect("metric can not be created");

    pub static ref STALE_WRITES: IntCounter = IntCounter::new(
        "transport_stale_writes_total",
        "Writes rejected by the timestamp check"
    )
    .expect("metric can not be created");

    pub static ref NOTICES_DISPATCHED: IntCounter = IntCounter::new(
        "transport_notices_dispatched_total",
        "Change notices delivered to watchers"
    )
    .expect("metric can not be created");

    pub static ref NOTICES_DROPPED: IntCounter = IntCounter::new(
        "transport_notices_dropped_total",
        "Change notices dropped because a watcher buffer was full"
    )
    .expect("metric can not be created");

    pub static ref ACTIVE_WATCHERS: IntGauge = IntGauge::new(
        "transport_active_watchers",
        "Registered change watchers"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        if let Err(e) = register_metrics(&registry) {
            warn!(error = %e, "failed to register transport metrics");
        }
        registry
    };
}

pub fn register_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(OPERATIONS.clone()))?;
    registry.register(Box::new(OPERATION_LATENCY.clone()))?;
    registry.register(Box::new(STALE_WRITES.clone()))?;
    registry.register(Box::new(NOTICES_DISPATCHED.clone()))?;
    registry.register(Box::new(NOTICES_DROPPED.clone()))?;
    registry.register(Box::new(ACTIVE_WATCHERS.clone()))?;
    Ok(())
}

/// Renders [`REGISTRY`] in the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        warn!(error = %e, "could not encode transport metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Counts one finished operation under its outcome label.
pub(crate) fn record_outcome<T>(
    op: &'static str,
    result: &Result<T, Error>,
) {
    OPERATIONS.with_label_values(&[op, outcome_label(result)]).inc();
}

pub(crate) fn outcome_label<T>(result: &Result<T, Error>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(Error::StaleWrite { .. }) => "stale",
        Err(Error::ConnectionUnavailable(_)) => "unavailable",
        Err(Error::NotImplemented { .. }) => "not_implemented",
        Err(Error::InvalidRequest(_)) => "invalid",
        Err(Error::ScanFailure(_)) => "scan_failure",
        Err(_) => "error",
    }
}
