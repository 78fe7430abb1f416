//! Prometheus metrics for the projection pipeline.
//!
//! This module provides metric collection for:
//! - Queue depth and enqueued events
//! - Projection outcomes per projector and discovery type
//! - Projection latency
//!
//! # Example
//!
//! ```rust,no_run
//! use discovery_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serve metrics on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and start serving `/metrics`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or the recorder cannot be
    /// installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs a
    /// warning and leaves the existing recorder in place.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        // Register all metric descriptions
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            // Configure histogram buckets for latency measurements
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                tokio::spawn(async move {
                    // `ExporterError` implements neither `Display` nor `Debug`.
                    if exporter.await.is_err() {
                        tracing::error!("Metrics exporter stopped");
                    }
                });
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Queue
    describe_counter!(
        "pipeline_events_enqueued_total",
        "Total number of events accepted by the ingestion queue"
    );
    describe_gauge!(
        "pipeline_queue_depth",
        "Events waiting in the ingestion queue"
    );

    // Projection
    describe_counter!(
        "projector_events_applied_total",
        "Events whose cursor and read-model writes were committed"
    );
    describe_counter!(
        "projector_events_skipped_total",
        "Events a projector did not apply (not interested or stale)"
    );
    describe_counter!(
        "projector_events_failed_total",
        "Events whose projection was rolled back"
    );
    describe_histogram!(
        "projector_project_duration_seconds",
        "Time taken to project one event with one projector"
    );

    // Event store
    describe_counter!(
        "event_store_events_appended_total",
        "Total number of discovery events appended to the event store"
    );
    describe_counter!(
        "event_store_events_pruned_total",
        "Total number of discovery events pruned from the event store"
    );
}

/// Pipeline metrics recorder.
pub struct PipelineMetrics;

impl PipelineMetrics {
    /// Record an accepted event and the resulting queue depth.
    pub fn record_enqueued(depth: usize) {
        counter!("pipeline_events_enqueued_total").increment(1);
        Self::record_queue_depth(depth);
    }

    /// Record the queue depth.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_queue_depth(depth: usize) {
        gauge!("pipeline_queue_depth").set(depth as f64);
    }

    /// Record a committed projection.
    pub fn record_applied(projector: &str, discovery_type: &str, duration: Duration) {
        counter!(
            "projector_events_applied_total",
            "projector" => projector.to_string(),
            "discovery_type" => discovery_type.to_string()
        )
        .increment(1);
        Self::record_duration(projector, duration);
    }

    /// Record an event a projector did not apply.
    ///
    /// `reason` is `not_interested` or `stale`.
    pub fn record_skipped(projector: &str, discovery_type: &str, reason: &'static str) {
        counter!(
            "projector_events_skipped_total",
            "projector" => projector.to_string(),
            "discovery_type" => discovery_type.to_string(),
            "reason" => reason
        )
        .increment(1);
    }

    /// Record a rolled back projection.
    pub fn record_failed(
        projector: &str,
        discovery_type: &str,
        kind: &'static str,
        duration: Duration,
    ) {
        counter!(
            "projector_events_failed_total",
            "projector" => projector.to_string(),
            "discovery_type" => discovery_type.to_string(),
            "error" => kind
        )
        .increment(1);
        Self::record_duration(projector, duration);
    }

    fn record_duration(projector: &str, duration: Duration) {
        histogram!(
            "projector_project_duration_seconds",
            "projector" => projector.to_string()
        )
        .record(duration.as_secs_f64());
    }
}
