//! Metrics collection and export for Beacon.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "beacon_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "beacon_connections_active";
    pub const INVOCATIONS_TOTAL: &str = "beacon_invocations_total";
    pub const FAULTS_TOTAL: &str = "beacon_faults_total";
    pub const MESSAGES_BYTES: &str = "beacon_messages_bytes";
    pub const PUSHES_TOTAL: &str = "beacon_pushes_total";
    pub const CHANNELS_ACTIVE: &str = "beacon_channels_active";
    pub const INVOKE_LATENCY_SECONDS: &str = "beacon_invoke_latency_seconds";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(
        names::INVOCATIONS_TOTAL,
        "Total number of topic method invocations"
    );
    metrics::describe_counter!(names::FAULTS_TOTAL, "Total number of invocation faults");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of frames processed");
    metrics::describe_counter!(names::PUSHES_TOTAL, "Total number of pushed client messages");
    metrics::describe_gauge!(names::CHANNELS_ACTIVE, "Current number of active channels");
    metrics::describe_histogram!(
        names::INVOKE_LATENCY_SECONDS,
        "Topic method invocation latency in seconds"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a topic method invocation.
pub fn record_invocation(topic: &str) {
    counter!(names::INVOCATIONS_TOTAL, "topic" => topic.to_string()).increment(1);
}

/// Record an invocation fault.
pub fn record_fault(kind: &str) {
    counter!(names::FAULTS_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// Record frame bytes.
pub fn record_message(bytes: usize, direction: &str) {
    counter!(names::MESSAGES_BYTES, "direction" => direction.to_string()).increment(bytes as u64);
}

/// Record a pushed client message.
pub fn record_push() {
    counter!(names::PUSHES_TOTAL).increment(1);
}

/// Record invocation latency.
pub fn record_invoke_latency(seconds: f64) {
    histogram!(names::INVOKE_LATENCY_SECONDS).record(seconds);
}

/// Update active channel count.
pub fn set_active_channels(count: usize) {
    gauge!(names::CHANNELS_ACTIVE).set(count as f64);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
