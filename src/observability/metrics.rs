//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_updates_total` (counter): processed messages by content `kind`
//! - `relay_rejected_total` (counter): refused webhook calls by `reason`
//! - `relay_replies_total` (counter): `sendMessage` calls by `outcome`
//!
//! Without an exporter installed the macros are no-ops.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Serve Prometheus metrics on `addr`. Must run inside the Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_update(kind: &'static str) {
    ::metrics::counter!("relay_updates_total", "kind" => kind).increment(1);
}

pub fn record_rejected(reason: &'static str) {
    ::metrics::counter!("relay_rejected_total", "reason" => reason).increment(1);
}

pub fn record_reply(outcome: &'static str) {
    ::metrics::counter!("relay_replies_total", "outcome" => outcome).increment(1);
}
