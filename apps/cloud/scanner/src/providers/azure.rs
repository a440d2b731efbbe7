//! Azure discovery provider
//!
//! Enumerates subscriptions and their resources. Production would walk the
//! Azure Resource Manager API (one `resources` listing per subscription);
//! without live credentials the provider serves a deterministic sample
//! inventory shaped like ARM responses.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::AzureConfig;
use domain_discovery::{DiscoveryOptions, ResourceProvider};
use domain_inventory::{Account, AccountKind, DiscoveryMode, Resource};
use resilience::{ScanError, ScanResult};

/// Reachability probe target.
const AZURE_STATUS_ENDPOINT: &str = "https://status.azure.com/status";

const SAMPLE_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000001";

pub struct AzureProvider {
    config: AzureConfig,
    client: Client,
}

impl AzureProvider {
    pub fn new(config: AzureConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn subscriptions(&self) -> Vec<String> {
        if self.config.subscription_ids.is_empty() {
            vec![SAMPLE_SUBSCRIPTION.to_string()]
        } else {
            self.config.subscription_ids.clone()
        }
    }

    fn has_credentials(&self) -> bool {
        self.config.tenant_id.is_some()
            && self.config.client_id.is_some()
            && self.config.client_secret.is_some()
    }

    fn resource_uri(&self, subscription: &str, kind: &str, name: &str) -> String {
        format!("/subscriptions/{subscription}/providers/{kind}/{name}")
    }

    fn sample_region_inventory(
        &self,
        account: &Account,
        region: &str,
        mode: DiscoveryMode,
    ) -> Vec<Resource> {
        let now = Utc::now();
        let mut resources = Vec::new();

        let vm_id = format!("vm-{region}-0");
        let mut vm = Resource::new(&account.provider, &account.id, &vm_id, "compute", "vm", &vm_id);
        vm.arn = Some(self.resource_uri(&account.id, "Microsoft.Compute/virtualMachines", &vm_id));
        vm.region = region.to_string();
        vm.created_at = Some(now - Duration::days(90));
        vm.encrypted = true;
        vm.configuration = json!({
            "vm_size": "Standard_D2s_v3",
            "state": "running",
            "network": format!("vnet-{region}"),
        });
        vm.tags.insert("Name".to_string(), vm_id.clone());
        vm.tags.insert("Environment".to_string(), "production".to_string());
        resources.push(vm);

        let storage_id = format!("appdata{}", region.replace('-', ""));
        let mut storage = Resource::new(
            &account.provider,
            &account.id,
            &storage_id,
            "storage",
            "bucket",
            &storage_id,
        );
        storage.arn =
            Some(self.resource_uri(&account.id, "Microsoft.Storage/storageAccounts", &storage_id));
        storage.region = region.to_string();
        storage.encrypted = true;
        storage.public_access = false;
        storage.configuration = json!({"size_gb": 60, "sku": "Standard_LRS"});
        resources.push(storage);

        let db_id = format!("orders-{region}");
        let mut db = Resource::new(
            &account.provider,
            &account.id,
            &db_id,
            "sql",
            "database",
            &db_id,
        );
        db.arn = Some(self.resource_uri(&account.id, "Microsoft.Sql/servers/databases", &db_id));
        db.region = region.to_string();
        db.encrypted = false;
        db.configuration = json!({"tier": "GeneralPurpose", "allocated_storage": 50});
        resources.push(db);

        if mode == DiscoveryMode::Quick {
            return resources;
        }

        let lb_id = format!("lb-{region}");
        let mut lb = Resource::new(
            &account.provider,
            &account.id,
            &lb_id,
            "network",
            "load_balancer",
            &lb_id,
        );
        lb.arn = Some(self.resource_uri(&account.id, "Microsoft.Network/loadBalancers", &lb_id));
        lb.region = region.to_string();
        lb.encrypted = true;
        lb.configuration = json!({"backends": [vm_id]});
        resources.push(lb);

        if mode != DiscoveryMode::Deep {
            return resources;
        }

        let fw_id = format!("nsg-{region}");
        let mut firewall = Resource::new(
            &account.provider,
            &account.id,
            &fw_id,
            "network",
            "firewall",
            &fw_id,
        );
        firewall.arn =
            Some(self.resource_uri(&account.id, "Microsoft.Network/networkSecurityGroups", &fw_id));
        firewall.region = region.to_string();
        firewall.encrypted = true;
        firewall.configuration = json!({"ingress_rules": [{"cidr": "10.1.0.0/16", "port": 443}]});
        resources.push(firewall);

        resources
    }
}

#[async_trait]
impl ResourceProvider for AzureProvider {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn is_configured(&self) -> bool {
        self.config.enabled
    }

    fn regions(&self) -> Vec<String> {
        self.config.regions.clone()
    }

    async fn validate_credentials(&self) -> ScanResult<()> {
        if !self.has_credentials() {
            debug!("no Azure credentials configured, running against sample inventory");
            return Ok(());
        }
        if self.config.client_secret.as_deref().is_some_and(str::is_empty) {
            return Err(ScanError::auth("Azure client secret is empty"));
        }
        Ok(())
    }

    async fn discover_accounts(&self) -> ScanResult<Vec<Account>> {
        let accounts: Vec<Account> = self
            .subscriptions()
            .into_iter()
            .map(|subscription| {
                let mut account = Account::new(
                    "azure",
                    &subscription,
                    format!("subscription-{subscription}"),
                    AccountKind::Subscription,
                );
                if let Some(secret) = &self.config.client_secret {
                    account.credentials.insert("client_secret", secret.clone());
                }
                account
            })
            .collect();

        info!(subscriptions = accounts.len(), "Azure subscriptions enumerated");
        Ok(accounts)
    }

    async fn discover_resources(
        &self,
        account: &Account,
        options: &DiscoveryOptions,
    ) -> ScanResult<Vec<Resource>> {
        let regions = if options.regions.is_empty() {
            self.config.regions.clone()
        } else {
            options.regions.clone()
        };

        let mut resources = Vec::new();
        for region in &regions {
            debug!(region = %region, subscription = %account.id, "enumerating Azure region");
            resources.extend(self.sample_region_inventory(account, region, options.mode));
        }
        Ok(resources)
    }

    async fn health_check(&self) -> ScanResult<bool> {
        match self
            .client
            .get(AZURE_STATUS_ENDPOINT)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                warn!(error = %e, "Azure status probe unreachable");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_each_subscription_becomes_an_account() {
        let provider = AzureProvider::new(AzureConfig {
            subscription_ids: vec!["sub-a".to_string(), "sub-b".to_string()],
            enabled: true,
            ..Default::default()
        });

        let accounts = provider.discover_accounts().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts.iter().all(|a| a.kind == AccountKind::Subscription));
    }

    #[tokio::test]
    async fn test_unencrypted_database_present_in_sample() {
        let provider = AzureProvider::new(AzureConfig {
            regions: vec!["eastus".to_string()],
            enabled: true,
            ..Default::default()
        });
        let account = provider.discover_accounts().await.unwrap().remove(0);

        let resources = provider
            .discover_resources(&account, &DiscoveryOptions::default())
            .await
            .unwrap();

        assert!(resources
            .iter()
            .any(|r| r.resource_type == "database" && !r.encrypted));
    }
}
