//! Observability metrics for the collection pipeline
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed. [`init_metrics`] installs a Prometheus exporter
//! with a scrape endpoint.
//!
//! ## Metrics
//!
//! - `pipeline_items_queued_total{queue}` - records enqueued
//! - `pipeline_items_saved_total{queue}` - records persisted
//! - `pipeline_bytes_written_total{queue}` - bytes appended to output files
//! - `pipeline_flushes_total{queue}` - flush operations
//! - `collector_items_total{outcome}` - per-item outcomes
//! - `limiter_start_wait_seconds` - time spent waiting for a start slot
//! - `limiter_in_flight` - operations currently running

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Initialize the metrics system with a Prometheus exporter
///
/// Idempotent: later calls are no-ops.
///
/// # Arguments
/// * `addr` - Socket address for the scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "pipeline_items_queued_total",
        Unit::Count,
        "Records enqueued into a pipeline queue"
    );
    describe_counter!(
        "pipeline_items_saved_total",
        Unit::Count,
        "Records persisted to an output file"
    );
    describe_counter!(
        "pipeline_bytes_written_total",
        Unit::Bytes,
        "Bytes appended to output files"
    );
    describe_counter!(
        "pipeline_flushes_total",
        Unit::Count,
        "Queue flush operations"
    );
    describe_counter!(
        "collector_items_total",
        Unit::Count,
        "Collected items by outcome"
    );
    describe_histogram!(
        "limiter_start_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for a start slot"
    );
    describe_gauge!(
        "limiter_in_flight",
        Unit::Count,
        "Operations currently running under the limiter"
    );

    *initialized = true;
    info!("Metrics system initialized");
    Ok(())
}

/// Check if the metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Record an enqueue into `queue`
pub fn record_queued(queue: &'static str) {
    counter!("pipeline_items_queued_total", "queue" => queue).increment(1);
}

/// Record a completed flush of `queue`
pub fn record_flush(queue: &'static str, items: u64, bytes: u64) {
    counter!("pipeline_flushes_total", "queue" => queue).increment(1);
    counter!("pipeline_items_saved_total", "queue" => queue).increment(items);
    counter!("pipeline_bytes_written_total", "queue" => queue).increment(bytes);
}

/// Record one item outcome (`"success"` or `"failure"`)
pub fn record_outcome(outcome: &'static str) {
    counter!("collector_items_total", "outcome" => outcome).increment(1);
}

/// Record the wait before an operation was allowed to start
pub fn record_start_wait(waited: Duration) {
    histogram!("limiter_start_wait_seconds").record(waited.as_secs_f64());
    if waited.as_millis() > 100 {
        debug!(wait_ms = waited.as_millis(), "Start slot acquired after wait");
    }
}

/// Adjust the in-flight gauge by `delta`
pub fn record_in_flight(delta: f64) {
    if delta >= 0.0 {
        gauge!("limiter_in_flight").increment(delta);
    } else {
        gauge!("limiter_in_flight").decrement(-delta);
    }
}
