//! Parallel composition of the three analyzers with a shared snapshot.
//!
//! The snapshot is fetched once per pass (TTL-cached under the key
//! `all_resources`), handed to each enabled analyzer, and each analyzer
//! chunks its per-resource work over a bounded worker pool. A failing
//! sub-analyzer leaves its report absent and marks the composite partial;
//! the others still return.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AnalysisOptions;
use crate::cost::CostAnalyzer;
use crate::dependency::DependencyAnalyzer;
use crate::models::{
    AnalysisSummary, AnalyzerPhase, ComprehensiveReport, CostReport, DependencyReport,
    PhaseTracker, SecurityReport,
};
use crate::security::SecurityAnalyzer;
use domain_inventory::{InventoryStore, Resource, ResourceFilter};
use observability::{AnalysisMetrics, AnalysisTimer, DiscoveryMetrics};
use resilience::{RetryPolicy, ScanError, ScanResult, TtlCache, retry_with_policy};

/// Cache key for the shared snapshot.
const SNAPSHOT_KEY: &str = "all_resources";

/// Runs dependency, security, and cost analysis over the stored inventory.
pub struct AnalysisOrchestrator {
    store: InventoryStore,
    cache: Arc<TtlCache<String, Vec<Resource>>>,
    options: AnalysisOptions,
    dependency: Arc<DependencyAnalyzer>,
    security: Arc<SecurityAnalyzer>,
    cost: Arc<CostAnalyzer>,
}

impl AnalysisOrchestrator {
    /// `cache` is the process-wide snapshot cache shared with the query
    /// engine, so a warm query snapshot feeds analysis for free.
    pub fn new(
        store: InventoryStore,
        cache: Arc<TtlCache<String, Vec<Resource>>>,
        options: AnalysisOptions,
    ) -> Self {
        Self {
            store,
            cache,
            options,
            dependency: Arc::new(DependencyAnalyzer::new()),
            security: Arc::new(SecurityAnalyzer::new()),
            cost: Arc::new(CostAnalyzer::new()),
        }
    }

    /// Run every enabled analyzer and compose the results.
    pub async fn analyze_all(&self, cancel: CancellationToken) -> ScanResult<ComprehensiveReport> {
        let started = Instant::now();
        let cancel = cancel.child_token();

        let watchdog = {
            let cancel = cancel.clone();
            let timeout = self.options.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!(timeout_secs = timeout.as_secs(), "analysis deadline reached");
                cancel.cancel();
            })
        };

        let snapshot = self.fetch_snapshot().await?;
        info!(resources = snapshot.len(), "analysis snapshot ready");

        let policy = RetryPolicy::analysis();
        let (dependency, security, cost) = if self.options.parallel {
            let dep_task = self.options.enable_dependency.then(|| {
                let analyzer = Arc::clone(&self.dependency);
                let snapshot = Arc::clone(&snapshot);
                let cancel = cancel.clone();
                let policy = policy.clone();
                tokio::spawn(async move {
                    run_dependency(analyzer, snapshot, policy, cancel).await
                })
            });
            let sec_task = self.options.enable_security.then(|| {
                let analyzer = Arc::clone(&self.security);
                let snapshot = Arc::clone(&snapshot);
                let options = self.options.clone();
                let cancel = cancel.clone();
                let policy = policy.clone();
                tokio::spawn(async move {
                    run_security(analyzer, snapshot, options, policy, cancel).await
                })
            });
            let cost_task = self.options.enable_cost.then(|| {
                let analyzer = Arc::clone(&self.cost);
                let snapshot = Arc::clone(&snapshot);
                let options = self.options.clone();
                let cancel = cancel.clone();
                let policy = policy.clone();
                tokio::spawn(
                    async move { run_cost(analyzer, snapshot, options, policy, cancel).await },
                )
            });

            // A panicking analyzer is just a failed analyzer; the composite
            // still returns.
            let dependency = match dep_task {
                Some(handle) => Some(handle.await.unwrap_or_else(|e| {
                    Err(ScanError::internal("dependency analyzer task aborted").with_source(e))
                })),
                None => None,
            };
            let security = match sec_task {
                Some(handle) => Some(handle.await.unwrap_or_else(|e| {
                    Err(ScanError::internal("security analyzer task aborted").with_source(e))
                })),
                None => None,
            };
            let cost = match cost_task {
                Some(handle) => Some(handle.await.unwrap_or_else(|e| {
                    Err(ScanError::internal("cost analyzer task aborted").with_source(e))
                })),
                None => None,
            };
            (dependency, security, cost)
        } else {
            let dependency = match self.options.enable_dependency {
                true => Some(
                    run_dependency(
                        Arc::clone(&self.dependency),
                        Arc::clone(&snapshot),
                        policy.clone(),
                        cancel.clone(),
                    )
                    .await,
                ),
                false => None,
            };
            let security = match self.options.enable_security {
                true => Some(
                    run_security(
                        Arc::clone(&self.security),
                        Arc::clone(&snapshot),
                        self.options.clone(),
                        policy.clone(),
                        cancel.clone(),
                    )
                    .await,
                ),
                false => None,
            };
            let cost = match self.options.enable_cost {
                true => Some(
                    run_cost(
                        Arc::clone(&self.cost),
                        Arc::clone(&snapshot),
                        self.options.clone(),
                        policy.clone(),
                        cancel.clone(),
                    )
                    .await,
                ),
                false => None,
            };
            (dependency, security, cost)
        };

        watchdog.abort();

        // A failed sub-analyzer leaves its slot empty; the composite still
        // carries whatever succeeded.
        let mut partial = false;
        let dependency = flatten("dependency", dependency, &mut partial);
        let security = flatten("security", security, &mut partial);
        let cost = flatten("cost", cost, &mut partial);

        if let Some(report) = &security {
            for severity in ["critical", "high", "medium", "low"] {
                let count = report
                    .findings
                    .iter()
                    .filter(|f| f.severity.to_string() == severity)
                    .count();
                AnalysisMetrics::set_findings(severity, count);
            }
        }

        let summary = AnalysisSummary {
            total_resources: snapshot.len(),
            total_dependencies: dependency
                .as_ref()
                .map_or(0, |r| r.stats.total_dependencies),
            risk_score: security.as_ref().map_or(0, |r| r.risk_score),
            compliance_score: security.as_ref().map_or(100.0, |r| r.compliance_score),
            total_monthly_cost: cost.as_ref().map_or(0.0, |r| r.total_monthly_cost),
            potential_savings: cost.as_ref().map_or(0.0, |r| r.potential_savings()),
        };

        info!(
            partial,
            risk = summary.risk_score,
            monthly_cost = summary.total_monthly_cost,
            duration_ms = started.elapsed().as_millis() as u64,
            "analysis complete"
        );

        Ok(ComprehensiveReport {
            summary,
            dependency,
            security,
            cost,
            partial,
            generated_at: Utc::now(),
        })
    }

    /// Fetch the shared snapshot, preferring the cache.
    async fn fetch_snapshot(&self) -> ScanResult<Arc<Vec<Resource>>> {
        if self.options.cache_results {
            if let Some(snapshot) = self.cache.get(&SNAPSHOT_KEY.to_string()) {
                DiscoveryMetrics::record_cache_event(true);
                return Ok(Arc::new(snapshot));
            }
            DiscoveryMetrics::record_cache_event(false);
        }

        let snapshot = self.store.get_resources(&ResourceFilter::default()).await?;
        if self.options.cache_results {
            self.cache.put_with_ttl(
                SNAPSHOT_KEY.to_string(),
                snapshot.clone(),
                self.options.cache_ttl,
            );
        }
        Ok(Arc::new(snapshot))
    }
}

fn flatten<T>(analyzer: &'static str, slot: Option<ScanResult<T>>, partial: &mut bool) -> Option<T> {
    match slot {
        Some(Ok(report)) => Some(report),
        Some(Err(error)) => {
            warn!(analyzer, error = %error, "sub-analyzer failed");
            AnalysisMetrics::record_pass(analyzer, "failed");
            *partial = true;
            None
        }
        None => None,
    }
}

/// Map each `batch_size` chunk of the snapshot through `work`, at most
/// `workers` chunks in flight.
async fn map_batches<T, F>(
    snapshot: Arc<Vec<Resource>>,
    batch_size: usize,
    workers: usize,
    cancel: &CancellationToken,
    work: F,
) -> ScanResult<Vec<T>>
where
    T: Send + 'static,
    F: Fn(&[Resource]) -> T + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut join_set: JoinSet<T> = JoinSet::new();

    let total = snapshot.len();
    let mut start = 0;
    while start < total {
        if cancel.is_cancelled() {
            join_set.shutdown().await;
            return Err(ScanError::cancelled());
        }
        let end = (start + batch_size).min(total);
        let snapshot = Arc::clone(&snapshot);
        let work = Arc::clone(&work);
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            work(&snapshot[start..end])
        });
        start = end;
    }

    let mut results = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(value) => results.push(value),
            Err(e) => {
                return Err(ScanError::internal("analysis batch aborted").with_source(e));
            }
        }
    }
    Ok(results)
}

/// Dependency pass. Extraction and statistics need the whole edge set, so
/// the graph is built in one worker off the async runtime.
async fn run_dependency(
    analyzer: Arc<DependencyAnalyzer>,
    snapshot: Arc<Vec<Resource>>,
    policy: RetryPolicy,
    cancel: CancellationToken,
) -> ScanResult<DependencyReport> {
    let _timer = AnalysisTimer::new("dependency");
    let mut phase = PhaseTracker::new("dependency");
    phase.advance(AnalyzerPhase::Fetching);

    let result = retry_with_policy(&policy, &cancel, || {
        let analyzer = Arc::clone(&analyzer);
        let snapshot = Arc::clone(&snapshot);
        async move {
            tokio::task::spawn_blocking(move || analyzer.analyze(&snapshot))
                .await
                .map_err(|e| ScanError::internal("dependency worker aborted").with_source(e))
        }
    })
    .await;

    match result {
        Ok(report) => {
            phase.advance(AnalyzerPhase::Done);
            AnalysisMetrics::record_pass("dependency", "ok");
            Ok(report)
        }
        Err(error) => {
            phase.advance(AnalyzerPhase::Failed);
            Err(error)
        }
    }
}

/// Security pass: evaluate per batch, score the merged findings.
async fn run_security(
    analyzer: Arc<SecurityAnalyzer>,
    snapshot: Arc<Vec<Resource>>,
    options: AnalysisOptions,
    policy: RetryPolicy,
    cancel: CancellationToken,
) -> ScanResult<SecurityReport> {
    let _timer = AnalysisTimer::new("security");
    let mut phase = PhaseTracker::new("security");
    phase.advance(AnalyzerPhase::Batching);
    phase.advance(AnalyzerPhase::Analyzing);

    let result = retry_with_policy(&policy, &cancel, || {
        let analyzer = Arc::clone(&analyzer);
        let snapshot = Arc::clone(&snapshot);
        let cancel = cancel.clone();
        let batch_size = options.batch_size;
        let workers = options.effective_workers();
        async move {
            let evaluator = Arc::clone(&analyzer);
            let batches = map_batches(
                Arc::clone(&snapshot),
                batch_size,
                workers,
                &cancel,
                move |chunk| evaluator.evaluate(chunk),
            )
            .await?;
            Ok(analyzer.score(batches.into_iter().flatten().collect(), !snapshot.is_empty()))
        }
    })
    .await;

    match result {
        Ok(report) => {
            phase.advance(AnalyzerPhase::Aggregating);
            phase.advance(AnalyzerPhase::Done);
            AnalysisMetrics::record_pass("security", "ok");
            Ok(report)
        }
        Err(error) => {
            phase.advance(AnalyzerPhase::Failed);
            Err(error)
        }
    }
}

/// Cost pass: estimate per batch; optimisations need the whole snapshot
/// (the oversized check is percentile-based within a peer class).
async fn run_cost(
    analyzer: Arc<CostAnalyzer>,
    snapshot: Arc<Vec<Resource>>,
    options: AnalysisOptions,
    policy: RetryPolicy,
    cancel: CancellationToken,
) -> ScanResult<CostReport> {
    let _timer = AnalysisTimer::new("cost");
    let mut phase = PhaseTracker::new("cost");
    phase.advance(AnalyzerPhase::Batching);
    phase.advance(AnalyzerPhase::Analyzing);

    let result = retry_with_policy(&policy, &cancel, || {
        let analyzer = Arc::clone(&analyzer);
        let snapshot = Arc::clone(&snapshot);
        let cancel = cancel.clone();
        let batch_size = options.batch_size;
        let workers = options.effective_workers();
        async move {
            let estimator = Arc::clone(&analyzer);
            let batches = map_batches(
                Arc::clone(&snapshot),
                batch_size,
                workers,
                &cancel,
                move |chunk| estimator.estimate_batch(chunk),
            )
            .await?;

            let mut estimates = Vec::new();
            let mut unpriced = Vec::new();
            for (batch_estimates, batch_unpriced) in batches {
                estimates.extend(batch_estimates);
                unpriced.extend(batch_unpriced);
            }
            let optimizations = analyzer.optimizations(&snapshot);
            Ok(analyzer.assemble(estimates, unpriced, optimizations))
        }
    })
    .await;

    match result {
        Ok(report) => {
            phase.advance(AnalyzerPhase::Aggregating);
            phase.advance(AnalyzerPhase::Done);
            AnalysisMetrics::record_pass("cost", "ok");
            Ok(report)
        }
        Err(error) => {
            phase.advance(AnalyzerPhase::Failed);
            Err(error)
        }
    }
}
