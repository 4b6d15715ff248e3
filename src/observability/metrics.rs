//! Metrics collection and exposition.
//!
//! # Metrics
//! - `chat_connections_opened_total` (counter)
//! - `chat_connections_closed_total` (counter): labelled `clean="true|false"`
//! - `chat_connections_rejected_total` (counter)
//! - `chat_handshake_failures_total` (counter)
//! - `chat_messages_routed_total` (counter)
//! - `chat_message_bytes` (histogram): payload size of routed messages
//! - `chat_fanout_recipients` (histogram): recipients per routed message
//! - `chat_active_connections` (gauge)
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - The Prometheus endpoint is optional and off by default

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with an HTTP scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn connection_opened() {
    metrics::counter!("chat_connections_opened_total").increment(1);
    metrics::gauge!("chat_active_connections").increment(1.0);
}

pub fn connection_closed(clean: bool) {
    let clean = if clean { "true" } else { "false" };
    metrics::counter!("chat_connections_closed_total", "clean" => clean).increment(1);
    metrics::gauge!("chat_active_connections").decrement(1.0);
}

pub fn connection_rejected() {
    metrics::counter!("chat_connections_rejected_total").increment(1);
}

pub fn handshake_failed() {
    metrics::counter!("chat_handshake_failures_total").increment(1);
}

pub fn message_routed(len: usize, recipients: usize) {
    metrics::counter!("chat_messages_routed_total").increment(1);
    metrics::histogram!("chat_message_bytes").record(len as f64);
    metrics::histogram!("chat_fanout_recipients").record(recipients as f64);
}
