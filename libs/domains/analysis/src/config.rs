//! Analysis pipeline options.

use std::time::Duration;

/// Options for the analysis orchestrator.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub enable_dependency: bool,
    pub enable_security: bool,
    pub enable_cost: bool,

    /// Memoise the resource snapshot and serve it to all analyzers.
    pub cache_results: bool,

    /// TTL for the shared snapshot (key `all_resources`).
    pub cache_ttl: Duration,

    /// Run the three analyzers concurrently.
    pub parallel: bool,

    /// Resources per batch inside each analyzer.
    pub batch_size: usize,

    /// Concurrent batches per analyzer. 0 means `available_parallelism`.
    pub max_workers: usize,

    /// Deadline for the whole composite pass.
    pub timeout: Duration,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            enable_dependency: true,
            enable_security: true,
            enable_cost: true,
            cache_results: true,
            cache_ttl: Duration::from_secs(300),
            parallel: true,
            batch_size: 100,
            max_workers: 0,
            timeout: Duration::from_secs(120),
        }
    }
}

impl AnalysisOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_dependency(mut self) -> Self {
        self.enable_dependency = false;
        self
    }

    pub fn without_security(mut self) -> Self {
        self.enable_security = false;
        self
    }

    pub fn without_cost(mut self) -> Self {
        self.enable_cost = false;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache_results = false;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Concurrent batches actually used.
    pub fn effective_workers(&self) -> usize {
        if self.max_workers > 0 {
            return self.max_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = AnalysisOptions::default();
        assert!(options.enable_dependency && options.enable_security && options.enable_cost);
        assert_eq!(options.batch_size, 100);
        assert_eq!(options.cache_ttl, Duration::from_secs(300));
        assert!(options.effective_workers() >= 1);
    }

    #[test]
    fn test_batch_size_floor() {
        assert_eq!(AnalysisOptions::default().with_batch_size(0).batch_size, 1);
    }
}
