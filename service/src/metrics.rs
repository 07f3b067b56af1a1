//! Ingestion and query metrics.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `order_ingest.messages.acked` - Messages processed and acknowledged
//! - `order_ingest.messages.nacked{reason}` - Messages rejected (`decode`, `store`)
//! - `order_ingest.items.inserted` - Line items appended
//! - `order_ingest.items.skipped` - Line items skipped for an invalid product id
//! - `order_ingest.store.errors{operation}` - Failed store statements
//!
//! ## Histograms
//! - `order_ingest.process.duration` - Seconds from receipt to acknowledgement
//! - `order_ingest.query.duration` - Seconds spent in the order query

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Register descriptions for every metric this service records.
///
/// Call once at startup, after the recorder is installed.
pub fn describe_metrics() {
    describe_counter!(
        "order_ingest.messages.acked",
        "Messages processed and acknowledged"
    );
    describe_counter!(
        "order_ingest.messages.nacked",
        "Messages negatively acknowledged, by reason (decode, store)"
    );
    describe_counter!(
        "order_ingest.items.inserted",
        "Line items appended to orders"
    );
    describe_counter!(
        "order_ingest.items.skipped",
        "Line items skipped because the product id is not an integer"
    );
    describe_counter!(
        "order_ingest.store.errors",
        "Failed store statements, by operation"
    );
    describe_histogram!(
        "order_ingest.process.duration",
        metrics::Unit::Seconds,
        "Time from receiving a message to acknowledging it"
    );
    describe_histogram!(
        "order_ingest.query.duration",
        metrics::Unit::Seconds,
        "Time spent running the order query"
    );

    tracing::debug!("Metric descriptions registered");
}

/// Install the Prometheus recorder with its own HTTP listener on `address`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`BuildError`] if the listener cannot be bound or a recorder is
/// already installed.
pub fn install_exporter(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(address).install()?;
    describe_metrics();
    tracing::info!(%address, "Prometheus metrics available at /metrics");
    Ok(())
}
