//! Fixture builders for normalised resources.

use chrono::{Duration, Utc};
use domain_inventory::{DiscoveryMethod, Resource};
use serde_json::Value as JsonValue;

/// Fluent builder for test resources.
///
/// Defaults are deliberately boring (private, encrypted, zero cost) so each
/// test only states what it cares about.
pub struct ResourceBuilder {
    resource: Resource,
}

impl ResourceBuilder {
    pub fn new(
        provider: impl Into<String>,
        account_id: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let mut resource = Resource::new(provider, account_id, id.clone(), "ec2", "instance", id);
        resource.region = "us-east-1".to_string();
        resource.encrypted = true;
        Self { resource }
    }

    pub fn arn(mut self, arn: impl Into<String>) -> Self {
        self.resource.arn = Some(arn.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.resource.service = service.into();
        self
    }

    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource.resource_type = resource_type.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.resource.name = name.into();
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.resource.region = region.into();
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resource.tags.insert(key.into(), value.into());
        self
    }

    pub fn configuration(mut self, configuration: JsonValue) -> Self {
        self.resource.configuration = configuration;
        self
    }

    pub fn public(mut self) -> Self {
        self.resource.public_access = true;
        self
    }

    pub fn unencrypted(mut self) -> Self {
        self.resource.encrypted = false;
        self
    }

    pub fn monthly_cost(mut self, monthly_cost: f64) -> Self {
        self.resource.monthly_cost = monthly_cost;
        self
    }

    pub fn depends_on(mut self, target: impl Into<String>) -> Self {
        self.resource.dependencies.push(target.into());
        self
    }

    pub fn discovered_via(mut self, method: DiscoveryMethod) -> Self {
        self.resource.discovery_method = method;
        self
    }

    /// Backdate `created_at` by the given number of days (stale-resource
    /// scenarios).
    pub fn created_days_ago(mut self, days: i64) -> Self {
        self.resource.created_at = Some(Utc::now() - Duration::days(days));
        self
    }

    pub fn build(self) -> Resource {
        self.resource
    }
}
