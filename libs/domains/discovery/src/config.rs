//! Discovery run options.

use domain_inventory::DiscoveryMode;
use std::time::Duration;

/// Options for one discovery invocation.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Breadth of the scan.
    pub mode: DiscoveryMode,

    /// Width of the per-account worker pool. 0 means "pick for me":
    /// `max(1, available_parallelism)`.
    pub max_parallel: usize,

    /// Width of the per-region fan-out inside one account task.
    pub region_parallel: usize,

    /// Prefer the provider's aggregated inventory path when it is offered
    /// and reports available.
    pub use_native_tools: bool,

    /// Deadline for the whole run.
    pub timeout: Duration,

    /// Restrict the direct path to these regions. Empty = provider defaults.
    pub regions: Vec<String>,

    /// Restrict the run to these providers. Empty = all configured.
    pub providers: Vec<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::Standard,
            max_parallel: 0,
            region_parallel: 4,
            use_native_tools: true,
            timeout: Duration::from_secs(300),
            regions: Vec::new(),
            providers: Vec::new(),
        }
    }
}

impl DiscoveryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: DiscoveryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_native_tools(mut self, use_native_tools: bool) -> Self {
        self.use_native_tools = use_native_tools;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }

    pub fn with_providers(mut self, providers: Vec<String>) -> Self {
        self.providers = providers;
        self
    }

    /// The worker-pool width actually used: the configured value, or
    /// `max(1, available_parallelism)` when left at 0.
    pub fn effective_parallelism(&self) -> usize {
        if self.max_parallel > 0 {
            return self.max_parallel;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .max(1)
    }

    /// Whether this run should compute and persist dependency edges.
    pub fn maps_dependencies(&self) -> bool {
        self.mode == DiscoveryMode::Deep
    }

    /// Whether enrichment runs at all (standard and deep).
    pub fn enriches(&self) -> bool {
        self.mode != DiscoveryMode::Quick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_parallelism_defaults_to_cpus() {
        let options = DiscoveryOptions::default();
        assert!(options.effective_parallelism() >= 1);

        let options = DiscoveryOptions::default().with_max_parallel(3);
        assert_eq!(options.effective_parallelism(), 3);
    }

    #[test]
    fn test_mode_gates() {
        assert!(!DiscoveryOptions::default()
            .with_mode(DiscoveryMode::Quick)
            .enriches());
        assert!(DiscoveryOptions::default()
            .with_mode(DiscoveryMode::Standard)
            .enriches());
        assert!(!DiscoveryOptions::default()
            .with_mode(DiscoveryMode::Standard)
            .maps_dependencies());
        assert!(DiscoveryOptions::default()
            .with_mode(DiscoveryMode::Deep)
            .maps_dependencies());
    }
}
