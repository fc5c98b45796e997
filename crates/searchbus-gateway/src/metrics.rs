//! Prometheus metrics for searchbus gateway
//!
//! Exposes metrics for monitoring dispatch throughput and bootstrap health.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Gauge, HistogramVec,
};

lazy_static! {
    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Envelopes handled by action
    pub static ref REQUESTS_TOTAL: CounterVec =
        register_counter_vec!(
            "searchbus_requests_total",
            "Envelopes handled by action",
            &["action"]
        )
        .unwrap();

    /// Failure replies by action and kind
    pub static ref FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "searchbus_failures_total",
        "Failure replies by action and kind",
        &["action", "kind"]
    ).unwrap();

    /// Dispatch latency by action
    pub static ref DISPATCH_LATENCY: HistogramVec = register_histogram_vec!(
        "searchbus_dispatch_latency_seconds",
        "Dispatch latency in seconds",
        &["action"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    ).unwrap();

    // ============================================================================
    // Bootstrap Metrics
    // ============================================================================

    /// Index templates acknowledged during bootstrap
    pub static ref TEMPLATES_REGISTERED: Counter =
        register_counter!(
            "searchbus_templates_registered_total",
            "Index templates registered during bootstrap"
        )
        .unwrap();

    /// 1 once bootstrap reached Ready
    pub static ref BOOTSTRAP_READY: Gauge =
        register_gauge!("searchbus_bootstrap_ready", "Whether bootstrap has completed").unwrap();
}

/// Label used when an envelope carries no recognizable action
pub const UNKNOWN_ACTION: &str = "unknown";

/// Export metrics in Prometheus format
pub fn export() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
}
