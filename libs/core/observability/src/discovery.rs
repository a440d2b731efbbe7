//! Discovery-specific metrics.

use metrics::{counter, gauge, histogram};

/// Discovery metrics recorder
pub struct DiscoveryMetrics;

impl DiscoveryMetrics {
    /// Record a completed discovery run
    pub fn record_run(status: &str, resource_count: usize, duration_ms: u64) {
        counter!("discovery_runs_total", "status" => status.to_string()).increment(1);
        counter!("discovery_resources_total").increment(resource_count as u64);
        histogram!("discovery_run_duration_seconds").record(duration_ms as f64 / 1000.0);

        tracing::debug!(
            status = status,
            resources = resource_count,
            duration_ms = duration_ms,
            "Discovery run recorded"
        );
    }

    /// Record resources discovered for one provider
    pub fn record_provider_resources(provider: &str, count: usize) {
        counter!("discovery_resources_total", "provider" => provider.to_string())
            .increment(count as u64);
    }

    /// Record a captured discovery error
    pub fn record_provider_error(provider: &str, kind: &str) {
        counter!(
            "discovery_errors_total",
            "provider" => provider.to_string(),
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    /// Set the number of per-account tasks currently executing
    pub fn set_accounts_in_flight(count: usize) {
        gauge!("discovery_accounts_in_flight").set(count as f64);
    }

    /// Record rows written by the inventory store
    pub fn record_resources_upserted(count: usize) {
        counter!("store_resources_upserted_total").increment(count as u64);
    }

    /// Record change journal rows appended
    pub fn record_changes_recorded(count: usize) {
        counter!("store_changes_recorded_total").increment(count as u64);
    }

    /// Record a query cache lookup
    pub fn record_cache_event(hit: bool) {
        let outcome = if hit { "hit" } else { "miss" };
        counter!("query_cache_events_total", "outcome" => outcome.to_string()).increment(1);
    }
}
