//! A scriptable provider plugin for orchestrator tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use domain_discovery::{DiscoveryOptions, NativeInventory, ResourceProvider};
use domain_inventory::{Account, AccountKind, Resource};
use resilience::{ErrorKind, ScanError, ScanResult};

/// Call counters shared between a mock provider and the test body.
#[derive(Default)]
pub struct MockCounters {
    pub validate_calls: AtomicUsize,
    pub account_calls: AtomicUsize,
    pub direct_calls: AtomicUsize,
    pub native_checks: AtomicUsize,
    pub native_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockCounters {
    /// High-water mark of concurrent `discover_resources` calls.
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MockNative {
    available: bool,
    resources: Vec<Resource>,
    counters: Arc<MockCounters>,
}

#[async_trait]
impl NativeInventory for MockNative {
    async fn is_available(&self, _account: &Account) -> bool {
        self.counters.native_checks.fetch_add(1, Ordering::SeqCst);
        self.available
    }

    async fn discover(&self, _account: &Account) -> ScanResult<Vec<Resource>> {
        self.counters.native_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.resources.clone())
    }
}

/// Scriptable [`ResourceProvider`].
///
/// Accounts and resources are fixed up front; failures are injected per
/// capability. Every call is counted so tests can assert which paths ran.
pub struct MockProvider {
    name: &'static str,
    accounts: Vec<Account>,
    resources: HashMap<String, Vec<Resource>>,
    regions: Vec<String>,
    validate_failure: Option<(ErrorKind, String)>,
    accounts_failure: Option<(ErrorKind, String)>,
    discovery_failure: Option<(ErrorKind, String)>,
    /// Fail this many `discover_resources` calls with a network error
    /// before succeeding (retry scenarios).
    transient_failures: AtomicUsize,
    native: Option<MockNative>,
    delay: Duration,
    counters: Arc<MockCounters>,
}

impl MockProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            accounts: Vec::new(),
            resources: HashMap::new(),
            regions: Vec::new(),
            validate_failure: None,
            accounts_failure: None,
            discovery_failure: None,
            transient_failures: AtomicUsize::new(0),
            native: None,
            delay: Duration::ZERO,
            counters: Arc::new(MockCounters::default()),
        }
    }

    /// Add an account with no scripted resources yet.
    pub fn with_account(mut self, id: &str, name: &str) -> Self {
        self.accounts
            .push(Account::new(self.name, id, name, AccountKind::Account));
        self
    }

    /// Script the direct-path resources for one account.
    pub fn with_resources(mut self, account_id: &str, resources: Vec<Resource>) -> Self {
        self.resources.insert(account_id.to_string(), resources);
        self
    }

    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }

    pub fn with_validate_failure(mut self, kind: ErrorKind, message: &str) -> Self {
        self.validate_failure = Some((kind, message.to_string()));
        self
    }

    pub fn with_accounts_failure(mut self, kind: ErrorKind, message: &str) -> Self {
        self.accounts_failure = Some((kind, message.to_string()));
        self
    }

    pub fn with_discovery_failure(mut self, kind: ErrorKind, message: &str) -> Self {
        self.discovery_failure = Some((kind, message.to_string()));
        self
    }

    pub fn with_transient_failures(self, count: usize) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Offer the native-inventory capability.
    pub fn with_native(mut self, available: bool, resources: Vec<Resource>) -> Self {
        self.native = Some(MockNative {
            available,
            resources,
            counters: Arc::clone(&self.counters),
        });
        self
    }

    /// Simulate per-account work (used by bounded-parallelism tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn counters(&self) -> Arc<MockCounters> {
        Arc::clone(&self.counters)
    }
}

#[async_trait]
impl ResourceProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn regions(&self) -> Vec<String> {
        self.regions.clone()
    }

    async fn validate_credentials(&self) -> ScanResult<()> {
        self.counters.validate_calls.fetch_add(1, Ordering::SeqCst);
        match &self.validate_failure {
            Some((kind, message)) => Err(ScanError::new(*kind, message.clone())),
            None => Ok(()),
        }
    }

    async fn discover_accounts(&self) -> ScanResult<Vec<Account>> {
        self.counters.account_calls.fetch_add(1, Ordering::SeqCst);
        match &self.accounts_failure {
            Some((kind, message)) => Err(ScanError::new(*kind, message.clone())),
            None => Ok(self.accounts.clone()),
        }
    }

    async fn discover_resources(
        &self,
        account: &Account,
        options: &DiscoveryOptions,
    ) -> ScanResult<Vec<Resource>> {
        self.counters.direct_calls.fetch_add(1, Ordering::SeqCst);
        self.counters.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.counters.leave();

        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ScanError::network("connection reset by peer"));
        }

        if let Some((kind, message)) = &self.discovery_failure {
            return Err(ScanError::new(*kind, message.clone()));
        }

        let scripted = self
            .resources
            .get(&account.id)
            .cloned()
            .unwrap_or_default();

        // Honour the orchestrator's per-region scoping.
        if options.regions.is_empty() {
            Ok(scripted)
        } else {
            Ok(scripted
                .into_iter()
                .filter(|r| options.regions.contains(&r.region))
                .collect())
        }
    }

    fn native_inventory(&self) -> Option<&dyn NativeInventory> {
        self.native.as_ref().map(|n| n as &dyn NativeInventory)
    }
}
