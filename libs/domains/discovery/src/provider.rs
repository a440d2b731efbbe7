//! The capability set every provider plugin implements.
//!
//! Providers own their SDK clients, pagination, and parsing; they hand back
//! fully-populated [`Account`] and [`Resource`] values. The native-inventory
//! path is an optional adjunct discovered through a capability probe, not a
//! subtype requirement.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::DiscoveryOptions;
use domain_inventory::{Account, Resource};
use resilience::ScanResult;

/// Uniform capability set for one cloud provider.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Stable provider name ("aws", "azure", "gcp", ...).
    fn name(&self) -> &'static str;

    /// Whether credentials/configuration are present at all. Unconfigured
    /// providers are skipped silently rather than reported as failures.
    fn is_configured(&self) -> bool {
        true
    }

    /// Regions the direct path should fan out over. An empty list means the
    /// provider is global (one enumeration pass).
    fn regions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Verify that the configured credentials actually work.
    async fn validate_credentials(&self) -> ScanResult<()>;

    /// Enumerate the accounts / subscriptions / projects visible to the
    /// configured credentials.
    async fn discover_accounts(&self) -> ScanResult<Vec<Account>>;

    /// Enumerate resources in one account. When `options.regions` is
    /// non-empty the provider must restrict itself to those regions; the
    /// orchestrator uses this to run one subtask per region.
    async fn discover_resources(
        &self,
        account: &Account,
        options: &DiscoveryOptions,
    ) -> ScanResult<Vec<Resource>>;

    /// Capability probe for the pre-aggregated inventory path. Preferred
    /// when available because it answers in one round-trip instead of N
    /// service-specific calls.
    fn native_inventory(&self) -> Option<&dyn NativeInventory> {
        None
    }

    /// Connectivity probe surfaced through the status command.
    async fn health_check(&self) -> ScanResult<bool> {
        Ok(true)
    }
}

/// Optional provider capability: an aggregated one-shot inventory view.
#[async_trait]
pub trait NativeInventory: Send + Sync {
    /// Whether the aggregated view is enabled for this account.
    async fn is_available(&self, account: &Account) -> bool;

    /// Fetch the pre-aggregated inventory for the account.
    async fn discover(&self, account: &Account) -> ScanResult<Vec<Resource>>;
}

/// Registry of all provider plugins.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ResourceProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn ResourceProvider>) {
        self.providers.push(provider);
    }

    pub fn get_provider(&self, name: &str) -> Option<Arc<dyn ResourceProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    /// Providers with usable configuration.
    pub fn configured_providers(&self) -> Vec<Arc<dyn ResourceProvider>> {
        self.providers
            .iter()
            .filter(|p| p.is_configured())
            .cloned()
            .collect()
    }

    pub fn all_providers(&self) -> &[Arc<dyn ResourceProvider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
