//! GCP discovery provider
//!
//! Enumerates projects and their resources. Production would use Cloud
//! Asset Inventory per project; without live credentials the provider
//! serves a deterministic sample inventory shaped like asset listings.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::GcpConfig;
use domain_discovery::{DiscoveryOptions, ResourceProvider};
use domain_inventory::{Account, AccountKind, DiscoveryMode, Resource};
use resilience::{ScanError, ScanResult};

/// Reachability probe target.
const GCP_STATUS_ENDPOINT: &str = "https://status.cloud.google.com/incidents.json";

const SAMPLE_PROJECT: &str = "sample-project";

pub struct GcpProvider {
    config: GcpConfig,
    client: Client,
}

impl GcpProvider {
    pub fn new(config: GcpConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn projects(&self) -> Vec<String> {
        if self.config.project_ids.is_empty() {
            vec![SAMPLE_PROJECT.to_string()]
        } else {
            self.config.project_ids.clone()
        }
    }

    fn asset_uri(&self, project: &str, service: &str, kind: &str, name: &str) -> String {
        format!("//{service}.googleapis.com/projects/{project}/{kind}/{name}")
    }

    fn sample_region_inventory(
        &self,
        account: &Account,
        region: &str,
        mode: DiscoveryMode,
    ) -> Vec<Resource> {
        let now = Utc::now();
        let mut resources = Vec::new();

        let vm_id = format!("worker-{region}-0");
        let mut vm = Resource::new(
            &account.provider,
            &account.id,
            &vm_id,
            "compute",
            "instance",
            &vm_id,
        );
        vm.arn = Some(self.asset_uri(&account.id, "compute", "instances", &vm_id));
        vm.region = region.to_string();
        vm.created_at = Some(now - Duration::days(60));
        vm.encrypted = true;
        vm.configuration = json!({
            "machine_type": "n2-standard-2",
            "status": "running",
            "network": format!("net-{region}"),
        });
        vm.tags.insert("Name".to_string(), vm_id.clone());
        vm.tags.insert("Environment".to_string(), "production".to_string());
        resources.push(vm);

        let bucket_id = format!("{}-artifacts-{region}", account.id);
        let mut bucket = Resource::new(
            &account.provider,
            &account.id,
            &bucket_id,
            "gcs",
            "bucket",
            &bucket_id,
        );
        bucket.arn = Some(self.asset_uri(&account.id, "storage", "buckets", &bucket_id));
        bucket.region = region.to_string();
        bucket.encrypted = true;
        bucket.public_access = false;
        bucket.configuration = json!({"size_gb": 45, "storage_class": "STANDARD"});
        resources.push(bucket);

        let db_id = format!("ledger-{region}");
        let mut db = Resource::new(
            &account.provider,
            &account.id,
            &db_id,
            "cloudsql",
            "db_instance",
            &db_id,
        );
        db.arn = Some(self.asset_uri(&account.id, "sqladmin", "instances", &db_id));
        db.region = region.to_string();
        db.encrypted = true;
        db.configuration = json!({"tier": "db-custom-2-8192", "allocated_storage": 80});
        resources.push(db);

        if mode == DiscoveryMode::Quick {
            return resources;
        }

        let fn_id = format!("resizer-{region}");
        let mut function = Resource::new(
            &account.provider,
            &account.id,
            &fn_id,
            "cloudfunctions",
            "function",
            &fn_id,
        );
        function.arn = Some(self.asset_uri(&account.id, "cloudfunctions", "functions", &fn_id));
        function.region = region.to_string();
        function.encrypted = true;
        function.configuration = json!({
            "memory_mb": 256,
            "service_account": format!("{}@appspot.gserviceaccount.com", account.id),
            "triggers": [bucket_id],
        });
        resources.push(function);

        if mode != DiscoveryMode::Deep {
            return resources;
        }

        let topic_id = format!("events-{region}");
        let mut topic = Resource::new(
            &account.provider,
            &account.id,
            &topic_id,
            "pubsub",
            "topic",
            &topic_id,
        );
        topic.arn = Some(self.asset_uri(&account.id, "pubsub", "topics", &topic_id));
        topic.region = region.to_string();
        topic.encrypted = true;
        topic.configuration = json!({"subscribers": [fn_id]});
        resources.push(topic);

        resources
    }
}

#[async_trait]
impl ResourceProvider for GcpProvider {
    fn name(&self) -> &'static str {
        "gcp"
    }

    fn is_configured(&self) -> bool {
        self.config.enabled
    }

    fn regions(&self) -> Vec<String> {
        self.config.regions.clone()
    }

    async fn validate_credentials(&self) -> ScanResult<()> {
        match &self.config.service_account_key {
            Some(key) if key.is_empty() => {
                Err(ScanError::auth("GCP service account key is empty"))
            }
            Some(_) | None => {
                debug!("GCP provider ready (sample inventory without live credentials)");
                Ok(())
            }
        }
    }

    async fn discover_accounts(&self) -> ScanResult<Vec<Account>> {
        let accounts: Vec<Account> = self
            .projects()
            .into_iter()
            .map(|project| {
                let mut account =
                    Account::new("gcp", &project, project.clone(), AccountKind::Project);
                if let Some(key) = &self.config.service_account_key {
                    account.credentials.insert("service_account_key", key.clone());
                }
                account
            })
            .collect();

        info!(projects = accounts.len(), "GCP projects enumerated");
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
            debug!(region = %region, project = %account.id, "enumerating GCP region");
            resources.extend(self.sample_region_inventory(account, region, options.mode));
        }
        Ok(resources)
    }

    async fn health_check(&self) -> ScanResult<bool> {
        match self
            .client
            .get(GCP_STATUS_ENDPOINT)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                warn!(error = %e, "GCP status probe unreachable");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_each_project_becomes_an_account() {
        let provider = GcpProvider::new(GcpConfig {
            project_ids: vec!["proj-a".to_string(), "proj-b".to_string()],
            enabled: true,
            ..Default::default()
        });

        let accounts = provider.discover_accounts().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts.iter().all(|a| a.kind == AccountKind::Project));
    }

    #[tokio::test]
    async fn test_deep_mode_adds_messaging() {
        let provider = GcpProvider::new(GcpConfig {
            regions: vec!["us-central1".to_string()],
            enabled: true,
            ..Default::default()
        });
        let account = provider.discover_accounts().await.unwrap().remove(0);

        let standard = provider
            .discover_resources(&account, &DiscoveryOptions::default())
            .await
            .unwrap();
        assert!(!standard.iter().any(|r| r.resource_type == "topic"));

        let deep = provider
            .discover_resources(
                &account,
                &DiscoveryOptions::default().with_mode(DiscoveryMode::Deep),
            )
            .await
            .unwrap();
        assert!(deep.iter().any(|r| r.resource_type == "topic"));
    }
}
