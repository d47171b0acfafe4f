//! Metrics collection and exposition.
//!
//! # Metrics
//! - `udp_log_datagrams_sent_total` (counter)
//! - `udp_log_bytes_sent_total` (counter)
//! - `udp_log_transport_errors_total` (counter): by kind (connect, send)
//! - `udp_log_connects_total` (counter)
//! - `udp_log_sockets_released_total` (counter)
//! - `http_requests_total` (counter): by method, status
//! - `http_request_duration_seconds` (histogram)
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Prometheus exposition only when enabled in config

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_datagram_sent(bytes: usize) {
    counter!("udp_log_datagrams_sent_total").increment(1);
    counter!("udp_log_bytes_sent_total").increment(bytes as u64);
}

pub fn record_transport_error(kind: &'static str) {
    counter!("udp_log_transport_errors_total", "kind" => kind).increment(1);
}

pub fn record_connect() {
    counter!("udp_log_connects_total").increment(1);
}

pub fn record_socket_released() {
    counter!("udp_log_sockets_released_total").increment(1);
}

pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());
}
