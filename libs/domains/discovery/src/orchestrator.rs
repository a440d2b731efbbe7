//! The two-phase discovery fan-out engine.
//!
//! Phase 1 enumerates accounts on every configured provider in parallel;
//! phase 2 schedules one task per account through a semaphore-bounded pool,
//! preferring the provider's native inventory path when enabled and
//! available, otherwise fanning out per region. Resources and captured
//! errors flow to a single collector over dedicated channels; the channels
//! close only once every account task has been joined.
//!
//! Failures never propagate between providers, accounts, or regions: each
//! is captured into the run's error list and the run is graded
//! succeeded / partial / failed at the end. Every phase observes the
//! caller's cancellation scope.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DiscoveryOptions;
use crate::provider::{ProviderRegistry, ResourceProvider};
use domain_inventory::{
    Account, DiscoveryResult, DiscoveryRun, ErrorRecord, InventoryStore, Resource, RunStatus,
};
use observability::DiscoveryMetrics;
use resilience::{RetryPolicy, ScanError, ScanResult, retry_with_policy};

/// Hook invoked between collection and persistence (standard and deep
/// modes). The dependency analyzer is wired in here by the application.
#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn enrich(
        &self,
        resources: &mut Vec<Resource>,
        options: &DiscoveryOptions,
        cancel: &CancellationToken,
    ) -> ScanResult<()>;
}

/// Coordinates provider enumeration, bounded per-account workers, and
/// persistence of the collected run.
pub struct DiscoveryOrchestrator {
    registry: ProviderRegistry,
    store: InventoryStore,
    enrichers: Vec<Arc<dyn Enricher>>,
    retry_policy: RetryPolicy,
}

impl DiscoveryOrchestrator {
    pub fn new(registry: ProviderRegistry, store: InventoryStore) -> Self {
        Self {
            registry,
            store,
            enrichers: Vec::new(),
            retry_policy: RetryPolicy::discovery(),
        }
    }

    /// Add an enrichment hook. Hooks run in registration order.
    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enrichers.push(enricher);
        self
    }

    /// Override the provider-call retry policy (tests use tight delays).
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Run one discovery pass.
    ///
    /// The returned result is always populated: on partial failure it holds
    /// everything that was collected plus the captured errors, and callers
    /// inspect `result.errors()` to decide what to do.
    pub async fn discover(
        &self,
        options: &DiscoveryOptions,
        cancel: CancellationToken,
    ) -> ScanResult<DiscoveryResult> {
        let started = Instant::now();
        let cancel = cancel.child_token();

        // Deadline watchdog: the whole run shares one cancellation scope.
        let watchdog = {
            let cancel = cancel.clone();
            let timeout = options.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!(timeout_secs = timeout.as_secs(), "discovery deadline reached");
                cancel.cancel();
            })
        };

        let providers = self.selected_providers(options);
        let mut run = DiscoveryRun::begin(
            options.mode,
            providers.iter().map(|p| p.name().to_string()).collect(),
        );

        info!(
            run_id = %run.id,
            providers = providers.len(),
            mode = %options.mode,
            max_parallel = options.effective_parallelism(),
            "starting discovery"
        );

        let mut errors: Vec<ScanError> = Vec::new();

        // Phase 1: account enumeration, one task per provider.
        let work = self.enumerate_accounts(&providers, &cancel, &mut errors).await;

        // Phases 2-3: bounded per-account fan-out plus collection.
        let (mut resources, resource_errors) =
            self.enumerate_resources(work, options, &cancel).await;
        errors.extend(resource_errors);

        // Phase 4: enrichment hooks (standard and deep only).
        if options.enriches() && !cancel.is_cancelled() {
            for enricher in &self.enrichers {
                if let Err(error) = enricher.enrich(&mut resources, options, &cancel).await {
                    warn!(enricher = enricher.name(), error = %error, "enrichment failed");
                    errors.push(error.with_context("enricher", enricher.name()));
                }
            }
        }

        let cancelled = cancel.is_cancelled();
        watchdog.abort();

        if cancelled {
            errors.push(ScanError::timeout("discovery cancelled before completion"));
        }

        for error in &errors {
            let provider = error
                .context()
                .get("provider")
                .map(String::as_str)
                .unwrap_or("unknown");
            DiscoveryMetrics::record_provider_error(provider, &error.kind().to_string());
        }

        run.ended_at = Some(Utc::now());
        run.resource_count = resources.len();
        run.errors = errors.iter().map(ErrorRecord::from_error).collect();
        run.status = grade(resources.len(), run.errors.len(), cancelled);

        let mut result = DiscoveryResult { run, resources };

        // Phase 5: persistence. A storage failure is recorded, not fatal to
        // the in-memory result.
        if let Err(error) = self.store.store_discovery(&result).await {
            warn!(error = %error, "failed to persist discovery run");
            result.run.errors.push(ErrorRecord::from_error(&error));
            result.run.status = grade(
                result.resources.len(),
                result.run.errors.len(),
                cancelled,
            );
        }

        DiscoveryMetrics::record_run(
            &result.run.status.to_string(),
            result.resources.len(),
            started.elapsed().as_millis() as u64,
        );

        info!(
            run_id = %result.run.id,
            status = %result.run.status,
            resources = result.resources.len(),
            errors = result.run.errors.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "discovery finished"
        );

        Ok(result)
    }

    fn selected_providers(&self, options: &DiscoveryOptions) -> Vec<Arc<dyn ResourceProvider>> {
        self.registry
            .configured_providers()
            .into_iter()
            .filter(|p| {
                options.providers.is_empty()
                    || options.providers.iter().any(|name| name == p.name())
            })
            .collect()
    }

    /// Phase 1: enumerate accounts on every provider in parallel. A failing
    /// provider never blocks the others; its error is captured.
    async fn enumerate_accounts(
        &self,
        providers: &[Arc<dyn ResourceProvider>],
        cancel: &CancellationToken,
        errors: &mut Vec<ScanError>,
    ) -> Vec<(Arc<dyn ResourceProvider>, Account)> {
        let mut join_set = JoinSet::new();

        for provider in providers {
            let provider = provider.clone();
            let cancel = cancel.clone();
            let policy = self.retry_policy.clone();
            join_set.spawn(async move {
                let outcome = async {
                    retry_with_policy(&policy, &cancel, || provider.validate_credentials())
                        .await?;
                    retry_with_policy(&policy, &cancel, || provider.discover_accounts()).await
                }
                .await;
                (provider, outcome)
            });
        }

        let mut work = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((provider, Ok(accounts))) => {
                    debug!(
                        provider = provider.name(),
                        accounts = accounts.len(),
                        "accounts enumerated"
                    );
                    for account in accounts {
                        work.push((provider.clone(), account));
                    }
                }
                Ok((provider, Err(error))) => {
                    warn!(provider = provider.name(), error = %error, "account enumeration failed");
                    errors.push(error.with_context("provider", provider.name()));
                }
                Err(join_error) => {
                    errors.push(
                        ScanError::internal("account enumeration task aborted")
                            .with_source(join_error),
                    );
                }
            }
        }

        work
    }

    /// Phases 2-3: one task per account through the bounded pool, results
    /// and errors emitted on dedicated channels, drained by the collector
    /// only after every task has been joined.
    async fn enumerate_resources(
        &self,
        work: Vec<(Arc<dyn ResourceProvider>, Account)>,
        options: &DiscoveryOptions,
        cancel: &CancellationToken,
    ) -> (Vec<Resource>, Vec<ScanError>) {
        let width = options.effective_parallelism();
        let semaphore = Arc::new(Semaphore::new(width));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let (resource_tx, mut resource_rx) = mpsc::unbounded_channel::<Vec<Resource>>();
        let (error_tx, mut error_rx) = mpsc::unbounded_channel::<ScanError>();

        let mut tasks: JoinSet<()> = JoinSet::new();
        for (provider, account) in work {
            let semaphore = Arc::clone(&semaphore);
            let in_flight = Arc::clone(&in_flight);
            let cancel = cancel.clone();
            let options = options.clone();
            let policy = self.retry_policy.clone();
            let resource_tx = resource_tx.clone();
            let error_tx = error_tx.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if cancel.is_cancelled() {
                    return;
                }

                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                DiscoveryMetrics::set_accounts_in_flight(current);

                discover_account(provider, account, options, policy, cancel, resource_tx, error_tx)
                    .await;

                let current = in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
                DiscoveryMetrics::set_accounts_in_flight(current);
            });
        }
        drop(resource_tx);
        drop(error_tx);

        // Join all account tasks; on cancellation stop admitting and drain
        // in-flight work best-effort.
        let mut join_errors: Vec<ScanError> = Vec::new();
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(join_error)) => {
                        join_errors.push(
                            ScanError::internal("account worker aborted").with_source(join_error),
                        );
                    }
                    None => break,
                },
                _ = cancel.cancelled() => {
                    tasks.shutdown().await;
                    break;
                }
            }
        }

        // Collector: all senders are gone, so both channels terminate.
        let mut resources = Vec::new();
        while let Some(batch) = resource_rx.recv().await {
            resources.extend(batch);
        }
        let mut errors = join_errors;
        while let Some(error) = error_rx.recv().await {
            errors.push(error);
        }

        (resources, errors)
    }
}

/// One account's discovery: native path when preferred and available,
/// otherwise the direct path with its own per-region fan-out. Regional
/// failures are logged and skipped; the surviving regions still report.
async fn discover_account(
    provider: Arc<dyn ResourceProvider>,
    account: Account,
    options: DiscoveryOptions,
    policy: RetryPolicy,
    cancel: CancellationToken,
    resource_tx: mpsc::UnboundedSender<Vec<Resource>>,
    error_tx: mpsc::UnboundedSender<ScanError>,
) {
    let provider_name = provider.name();

    if options.use_native_tools {
        if let Some(native) = provider.native_inventory() {
            if native.is_available(&account).await {
                debug!(
                    provider = provider_name,
                    account = %account.id,
                    "using native inventory path"
                );
                match retry_with_policy(&policy, &cancel, || native.discover(&account)).await {
                    Ok(resources) => {
                        DiscoveryMetrics::record_provider_resources(provider_name, resources.len());
                        let _ = resource_tx.send(resources);
                    }
                    Err(error) => {
                        let _ = error_tx.send(
                            error
                                .with_context("provider", provider_name)
                                .with_context("account_id", &account.id),
                        );
                    }
                }
                return;
            }
        }
    }

    let regions = if !options.regions.is_empty() {
        options.regions.clone()
    } else {
        provider.regions()
    };

    // Global providers (or a single region) need no inner fan-out.
    if regions.len() <= 1 {
        let scoped = options.clone().with_regions(regions);
        match retry_with_policy(&policy, &cancel, || {
            provider.discover_resources(&account, &scoped)
        })
        .await
        {
            Ok(resources) => {
                DiscoveryMetrics::record_provider_resources(provider_name, resources.len());
                let _ = resource_tx.send(resources);
            }
            Err(error) => {
                let _ = error_tx.send(
                    error
                        .with_context("provider", provider_name)
                        .with_context("account_id", &account.id),
                );
            }
        }
        return;
    }

    let inner = Arc::new(Semaphore::new(options.region_parallel.max(1)));
    let mut region_tasks: JoinSet<()> = JoinSet::new();

    for region in regions {
        let inner = Arc::clone(&inner);
        let provider = provider.clone();
        let account = account.clone();
        let options = options.clone();
        let policy = policy.clone();
        let cancel = cancel.clone();
        let resource_tx = resource_tx.clone();
        let error_tx = error_tx.clone();

        region_tasks.spawn(async move {
            let Ok(_permit) = inner.acquire_owned().await else {
                return;
            };
            if cancel.is_cancelled() {
                return;
            }

            let scoped = options.clone().with_regions(vec![region.clone()]);
            match retry_with_policy(&policy, &cancel, || {
                provider.discover_resources(&account, &scoped)
            })
            .await
            {
                Ok(resources) => {
                    DiscoveryMetrics::record_provider_resources(provider.name(), resources.len());
                    let _ = resource_tx.send(resources);
                }
                Err(error) => {
                    warn!(
                        provider = provider.name(),
                        account = %account.id,
                        region = %region,
                        error = %error,
                        "regional discovery failed, skipping region"
                    );
                    let _ = error_tx.send(
                        error
                            .with_context("provider", provider.name())
                            .with_context("account_id", &account.id)
                            .with_context("region", &region),
                    );
                }
            }
        });
    }

    while region_tasks.join_next().await.is_some() {}
}

/// Completeness policy: partial when anything failed but something was
/// found; failed when nothing was found and something failed; cancelled
/// runs always come back partial with whatever was collected.
fn grade(resource_count: usize, error_count: usize, cancelled: bool) -> RunStatus {
    if cancelled {
        return RunStatus::Partial;
    }
    if error_count == 0 {
        RunStatus::Succeeded
    } else if resource_count > 0 {
        RunStatus::Partial
    } else {
        RunStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_matrix() {
        assert_eq!(grade(0, 0, false), RunStatus::Succeeded);
        assert_eq!(grade(5, 0, false), RunStatus::Succeeded);
        assert_eq!(grade(5, 1, false), RunStatus::Partial);
        assert_eq!(grade(0, 1, false), RunStatus::Failed);
        assert_eq!(grade(3, 0, true), RunStatus::Partial);
        assert_eq!(grade(0, 2, true), RunStatus::Partial);
    }
}
