//! Canonical inventory models shared by discovery, storage, and analysis.

use chrono::{DateTime, Utc};
use resilience::{ErrorKind, ScanError};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

/// How a resource was obtained from its provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscoveryMethod {
    /// Service-by-service API enumeration
    #[default]
    DirectApi,
    /// Provider-offered aggregated inventory service
    NativeTool,
    /// A cross-account aggregator view
    Aggregator,
}

/// Breadth of a discovery run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscoveryMode {
    /// Critical resource types only: compute instances, public object
    /// stores, database instances
    Quick,
    /// Most service categories
    #[default]
    Standard,
    /// All categories plus dependency mapping
    Deep,
}

/// Provider-native unit of resource ownership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccountKind {
    #[default]
    Account,
    Subscription,
    Project,
}

/// Final status of a discovery run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Succeeded,
    /// Some resources were discovered, but at least one error was captured
    Partial,
    /// No resources at all, and at least one fatal error
    Failed,
}

/// Kind of entry in the change journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

/// Typed tag on an inferred dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RelationshipKind {
    UsesSecurityGroup,
    RunsInVpc,
    UsesSubnetGroup,
    UsesRole,
    TriggeredBy,
    Targets,
    SubscribedBy,
    AttachedTo,
    /// Declared in the resource's own dependency list
    DependsOn,
    /// Heuristic grouping by shared environment/project tags
    SameStack,
}

/// Direction of a dependency edge relative to its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    #[default]
    Outbound,
    Inbound,
}

/// The unit of inventory: one normalised cloud resource.
///
/// `(provider, account_id, id)` is unique across the store; `arn` is the
/// preferred relationship key when present.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Resource {
    /// Provider-local identifier
    pub id: String,
    /// Globally unique identifier (ARN / resource URI), when the provider
    /// assigns one
    pub arn: Option<String>,
    pub provider: String,
    pub account_id: String,
    /// Region, or `"global"` for regionless services
    pub region: String,
    pub service: String,
    pub resource_type: String,
    #[validate(length(min = 1))]
    pub name: String,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub discovered_at: DateTime<Utc>,
    pub discovery_method: DiscoveryMethod,

    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Provider-specific structured data, opaque to the store
    #[serde(default)]
    pub configuration: JsonValue,

    #[serde(default)]
    pub public_access: bool,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub compliance: Vec<String>,

    /// Estimated monthly cost in USD
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub monthly_cost: f64,

    /// Target keys (preferably ARNs) this resource depends on
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Derived at analysis time, never persisted
    #[serde(default)]
    pub dependents: Vec<String>,
}

impl Resource {
    /// Create a resource with the identity fields set and everything else
    /// defaulted.
    pub fn new(
        provider: impl Into<String>,
        account_id: impl Into<String>,
        id: impl Into<String>,
        service: impl Into<String>,
        resource_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            arn: None,
            provider: provider.into(),
            account_id: account_id.into(),
            region: "global".to_string(),
            service: service.into(),
            resource_type: resource_type.into(),
            name: name.into(),
            created_at: None,
            updated_at: None,
            discovered_at: Utc::now(),
            discovery_method: DiscoveryMethod::DirectApi,
            tags: HashMap::new(),
            configuration: JsonValue::Null,
            public_access: false,
            encrypted: false,
            compliance: Vec::new(),
            monthly_cost: 0.0,
            dependencies: Vec::new(),
            dependents: Vec::new(),
        }
    }

    /// The store's primary key: the ARN when present, otherwise the
    /// identity triple joined into one string.
    pub fn storage_id(&self) -> String {
        match &self.arn {
            Some(arn) if !arn.is_empty() => arn.clone(),
            _ => format!("{}:{}:{}", self.provider, self.account_id, self.id),
        }
    }

    /// Preferred key for relationship edges (same as `storage_id`).
    pub fn relationship_key(&self) -> String {
        self.storage_id()
    }

    /// A tag value, if set.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Check the model invariants beyond what the derive covers: non-empty
    /// tag keys and a non-negative monthly cost.
    pub fn check_invariants(&self) -> Result<(), ScanError> {
        self.validate().map_err(|e| {
            ScanError::validation(format!("resource {} failed validation: {e}", self.id))
        })?;
        if self.tags.keys().any(|k| k.is_empty()) {
            return Err(ScanError::validation(format!(
                "resource {} has an empty tag key",
                self.id
            )));
        }
        Ok(())
    }
}

/// Opaque credentials handle.
///
/// Holds provider-specific secrets resolved by the credential chain. It is
/// intentionally excluded from `Serialize`/`Debug` output so it can never
/// reach the store or the logs.
#[derive(Clone, Default)]
pub struct Credentials(HashMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials(<{} entries redacted>)", self.0.len())
    }
}

/// A provider-native ownership unit (account, subscription, or project).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub provider: String,
    pub name: String,
    pub kind: AccountKind,
    pub region: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Never serialised or persisted
    #[serde(skip)]
    pub credentials: Credentials,
}

impl Account {
    pub fn new(
        provider: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
        kind: AccountKind,
    ) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            name: name.into(),
            kind,
            region: None,
            tags: HashMap::new(),
            credentials: Credentials::default(),
        }
    }
}

/// One captured failure, attributed to where it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub provider: Option<String>,
    pub account_id: Option<String>,
    pub region: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorRecord {
    /// Capture a `ScanError`, lifting the well-known context keys into
    /// dedicated columns.
    pub fn from_error(error: &ScanError) -> Self {
        let ctx = error.context();
        Self {
            provider: ctx.get("provider").cloned(),
            account_id: ctx.get("account_id").cloned(),
            region: ctx.get("region").cloned(),
            kind: error.kind(),
            message: error.to_string(),
            occurred_at: error.timestamp(),
        }
    }
}

/// Summary row for one discovery invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub resource_count: usize,
    pub providers: Vec<String>,
    pub mode: DiscoveryMode,
    pub status: RunStatus,
    pub errors: Vec<ErrorRecord>,
}

impl DiscoveryRun {
    pub fn begin(mode: DiscoveryMode, providers: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            resource_count: 0,
            providers,
            mode,
            status: RunStatus::Succeeded,
            errors: Vec::new(),
        }
    }
}

/// In-memory artifact of one discovery run. Always populated, even when
/// partial, so callers can inspect what was accomplished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub run: DiscoveryRun,
    pub resources: Vec<Resource>,
}

impl DiscoveryResult {
    pub fn status(&self) -> RunStatus {
        self.run.status
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.run.errors
    }
}

/// Change journal row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    pub resource_id: String,
    pub change_type: ChangeType,
    pub changed_at: DateTime<Utc>,
    pub old_configuration: Option<String>,
    pub new_configuration: Option<String>,
}

/// In-memory dependency edge between two resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub source_arn: String,
    pub target_arn: String,
    pub relationship: RelationshipKind,
    pub direction: Direction,
    /// Lower when the target was not present in the snapshot
    pub confidence: f64,
}

impl Dependency {
    pub fn new(
        source_arn: impl Into<String>,
        target_arn: impl Into<String>,
        relationship: RelationshipKind,
    ) -> Self {
        Self {
            source_arn: source_arn.into(),
            target_arn: target_arn.into(),
            relationship,
            direction: Direction::Outbound,
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// Filter for store reads. All fields are conjunctive; `None` means "any".
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    pub provider: Option<String>,
    pub account_id: Option<String>,
    pub region: Option<String>,
    pub service: Option<String>,
    pub resource_type: Option<String>,
    pub public_access: Option<bool>,
    pub encrypted: Option<bool>,
    pub min_monthly_cost: Option<f64>,
    pub limit: Option<u64>,
}

impl ResourceFilter {
    pub fn for_provider(provider: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
            ..Self::default()
        }
    }
}

/// Aggregate view over the stored inventory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub total_resources: u64,
    pub by_provider: HashMap<String, u64>,
    pub by_service: HashMap<String, u64>,
    pub by_type: HashMap<String, u64>,
    pub by_region: HashMap<String, u64>,
    pub total_monthly_cost: f64,
    pub cost_by_provider: HashMap<String, f64>,
    pub public_resources: u64,
    pub unencrypted_resources: u64,
}

/// Most recent run, or the never-ran sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DiscoveryStatus {
    NeverRun,
    LastRun(DiscoveryRun),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_storage_id_prefers_arn() {
        let mut resource = Resource::new("aws", "111122223333", "i-0abc", "ec2", "instance", "web");
        assert_eq!(resource.storage_id(), "aws:111122223333:i-0abc");

        resource.arn = Some("arn:aws:ec2:us-east-1:111122223333:instance/i-0abc".to_string());
        assert_eq!(
            resource.storage_id(),
            "arn:aws:ec2:us-east-1:111122223333:instance/i-0abc"
        );

        // An empty ARN is treated as absent.
        resource.arn = Some(String::new());
        assert_eq!(resource.storage_id(), "aws:111122223333:i-0abc");
    }

    #[test]
    fn test_check_invariants() {
        let mut resource = Resource::new("aws", "111122223333", "i-0abc", "ec2", "instance", "web");
        resource.tags.insert("Environment".to_string(), "prod".to_string());
        assert!(resource.check_invariants().is_ok());

        resource.monthly_cost = -1.0;
        assert!(resource.check_invariants().is_err());

        resource.monthly_cost = 10.0;
        resource.tags.insert(String::new(), "oops".to_string());
        let err = resource.check_invariants().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_credentials_never_serialize_or_debug() {
        let mut account = Account::new("gcp", "my-project", "My Project", AccountKind::Project);
        account.credentials.insert("service_account_key", "super-secret");

        let serialized = serde_json::to_string(&account).unwrap();
        assert!(!serialized.contains("super-secret"));

        let debugged = format!("{:?}", account);
        assert!(!debugged.contains("super-secret"));
        assert!(debugged.contains("redacted"));
    }

    #[test]
    fn test_enums_round_trip_lowercase() {
        assert_eq!(DiscoveryMethod::NativeTool.to_string(), "native_tool");
        assert_eq!(
            "native_tool".parse::<DiscoveryMethod>().unwrap(),
            DiscoveryMethod::NativeTool
        );
        assert_eq!(DiscoveryMode::Deep.to_string(), "deep");
        assert_eq!(RunStatus::Partial.to_string(), "partial");
        assert_eq!(
            RelationshipKind::UsesSecurityGroup.to_string(),
            "uses_security_group"
        );
    }

    #[test]
    fn test_error_record_lifts_context() {
        let error = resilience::ScanError::rate_limit("throttled")
            .with_context("provider", "aws")
            .with_context("account_id", "111122223333")
            .with_context("region", "us-east-1");

        let record = ErrorRecord::from_error(&error);
        assert_eq!(record.provider.as_deref(), Some("aws"));
        assert_eq!(record.account_id.as_deref(), Some("111122223333"));
        assert_eq!(record.region.as_deref(), Some("us-east-1"));
        assert_eq!(record.kind, ErrorKind::RateLimit);
    }

    #[test]
    fn test_dependency_confidence_is_clamped() {
        let edge = Dependency::new("a", "b", RelationshipKind::Targets).with_confidence(1.7);
        assert_eq!(edge.confidence, 1.0);

        let edge = Dependency::new("a", "b", RelationshipKind::Targets).with_confidence(-0.2);
        assert_eq!(edge.confidence, 0.0);
    }

    #[test]
    fn test_resource_serde_defaults() {
        let parsed: Resource = serde_json::from_value(json!({
            "id": "vol-1",
            "arn": null,
            "provider": "aws",
            "account_id": "111122223333",
            "region": "us-east-1",
            "service": "ebs",
            "resource_type": "volume",
            "name": "data",
            "created_at": null,
            "updated_at": null,
            "discovered_at": "2026-07-01T00:00:00Z",
            "discovery_method": "direct_api"
        }))
        .unwrap();

        assert!(parsed.tags.is_empty());
        assert!(!parsed.public_access);
        assert_eq!(parsed.monthly_cost, 0.0);
        assert!(parsed.dependencies.is_empty());
    }
}
