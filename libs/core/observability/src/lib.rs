//! Observability utilities for the cloudscan workspace.
//!
//! This crate provides:
//! - Prometheus metrics recording and export
//! - Custom metrics for discovery runs, the inventory store, and analysis
//!
//! # Example
//!
//! ```rust,ignore
//! use observability::{init_metrics, DiscoveryMetrics};
//!
//! // Initialize metrics recorder
//! init_metrics();
//!
//! // Record discovery operations
//! DiscoveryMetrics::record_run("succeeded", 420, 12_500);
//! DiscoveryMetrics::record_provider_error("aws", "rate_limit");
//! ```

pub mod analysis;
pub mod discovery;

pub use analysis::{AnalysisMetrics, AnalysisTimer};
pub use discovery::DiscoveryMetrics;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup.
/// Returns the PrometheusHandle for rendering metrics.
pub fn init_metrics() -> &'static PrometheusHandle {
    METRICS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        info!("Prometheus metrics recorder initialized");

        register_metric_descriptions();

        handle
    })
}

/// Render the current metrics in Prometheus text exposition format.
///
/// Surfaced by the scanner's `status --metrics` flag.
pub fn render_metrics() -> String {
    match METRICS_HANDLE.get() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

/// Register metric descriptions for documentation
fn register_metric_descriptions() {
    use metrics::describe_counter;
    use metrics::describe_gauge;
    use metrics::describe_histogram;

    // Discovery metrics
    describe_counter!(
        "discovery_runs_total",
        "Discovery runs by final status"
    );
    describe_counter!(
        "discovery_errors_total",
        "Discovery errors by provider and error kind"
    );
    describe_counter!(
        "discovery_resources_total",
        "Resources discovered, by provider"
    );
    describe_histogram!(
        "discovery_run_duration_seconds",
        "Wall-clock duration of discovery runs"
    );
    describe_gauge!(
        "discovery_accounts_in_flight",
        "Per-account discovery tasks currently executing"
    );

    // Store metrics
    describe_counter!(
        "store_resources_upserted_total",
        "Resource rows written by the inventory store"
    );
    describe_counter!(
        "store_changes_recorded_total",
        "Change journal rows appended"
    );
    describe_counter!(
        "query_cache_events_total",
        "Query cache lookups by outcome (hit/miss)"
    );

    // Analysis metrics
    describe_counter!(
        "analysis_runs_total",
        "Analysis passes by analyzer and outcome"
    );
    describe_histogram!(
        "analysis_duration_seconds",
        "Duration of each analysis pass"
    );
    describe_gauge!(
        "analysis_findings_total",
        "Findings produced by the most recent security analysis"
    );
}
