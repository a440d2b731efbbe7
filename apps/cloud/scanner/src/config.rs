//! Configuration for the cloud scanner

use core_config::{env_list, env_or_default, env_parse_or, ConfigError};
use database::sqlite::SqliteConfig;
use domain_inventory::DiscoveryMode;
use eyre::Result;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub database: SqliteConfig,
    pub aws: AwsConfig,
    pub azure: AzureConfig,
    pub gcp: GcpConfig,
    pub discovery: DiscoveryConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Default)]
pub struct AwsConfig {
    /// Account the credentials belong to
    pub account_id: Option<String>,

    /// Use IAM role (preferred) or access keys
    pub role_arn: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,

    /// Aggregator name enabling the native inventory path
    pub config_aggregator: Option<String>,

    /// Regions to enumerate
    pub regions: Vec<String>,

    /// Enable AWS discovery
    pub enabled: bool,
}

fn default_aws_regions() -> Vec<String> {
    vec![
        "us-east-1".to_string(),
        "us-west-2".to_string(),
        "eu-west-1".to_string(),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct AzureConfig {
    /// Azure tenant ID
    pub tenant_id: Option<String>,
    /// Azure client ID
    pub client_id: Option<String>,
    /// Azure client secret
    pub client_secret: Option<String>,
    /// Azure subscription IDs to enumerate
    pub subscription_ids: Vec<String>,

    /// Regions to enumerate
    pub regions: Vec<String>,

    /// Enable Azure discovery
    pub enabled: bool,
}

fn default_azure_regions() -> Vec<String> {
    vec!["eastus".to_string(), "westeurope".to_string()]
}

#[derive(Debug, Clone, Default)]
pub struct GcpConfig {
    /// GCP project IDs to enumerate
    pub project_ids: Vec<String>,
    /// Service account key JSON (base64 encoded or file path)
    pub service_account_key: Option<String>,

    /// Regions to enumerate
    pub regions: Vec<String>,

    /// Enable GCP discovery
    pub enabled: bool,
}

fn default_gcp_regions() -> Vec<String> {
    vec!["us-central1".to_string(), "europe-west1".to_string()]
}

/// Discovery knobs surfaced through the environment.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub mode: DiscoveryMode,
    pub max_parallel: usize,
    pub use_native_tools: bool,
    pub timeout: Duration,
}

/// Analysis toggles surfaced through the environment.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub enable_dependency: bool,
    pub enable_security: bool,
    pub enable_cost: bool,
    pub cache_results: bool,
    pub cache_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Config {
            environment: env_or_default("APP_ENV", "development"),
            database: SqliteConfig::from_env()?,
            aws: AwsConfig {
                account_id: std::env::var("AWS_ACCOUNT_ID").ok(),
                role_arn: std::env::var("AWS_ROLE_ARN").ok(),
                access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
                secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
                config_aggregator: std::env::var("AWS_CONFIG_AGGREGATOR").ok(),
                regions: env_list(
                    "AWS_REGIONS",
                    &default_aws_regions().iter().map(String::as_str).collect::<Vec<_>>(),
                ),
                enabled: env_parse_or("AWS_ENABLED", true)?,
            },
            azure: AzureConfig {
                tenant_id: std::env::var("AZURE_TENANT_ID").ok(),
                client_id: std::env::var("AZURE_CLIENT_ID").ok(),
                client_secret: std::env::var("AZURE_CLIENT_SECRET").ok(),
                subscription_ids: env_list("AZURE_SUBSCRIPTION_IDS", &[]),
                regions: env_list(
                    "AZURE_REGIONS",
                    &default_azure_regions().iter().map(String::as_str).collect::<Vec<_>>(),
                ),
                enabled: env_parse_or("AZURE_ENABLED", true)?,
            },
            gcp: GcpConfig {
                project_ids: env_list("GCP_PROJECT_IDS", &[]),
                service_account_key: std::env::var("GCP_SERVICE_ACCOUNT_KEY").ok(),
                regions: env_list(
                    "GCP_REGIONS",
                    &default_gcp_regions().iter().map(String::as_str).collect::<Vec<_>>(),
                ),
                enabled: env_parse_or("GCP_ENABLED", true)?,
            },
            discovery: DiscoveryConfig {
                mode: env_or_default("SCAN_MODE", "standard")
                    .parse()
                    .map_err(|_| {
                        ConfigError::invalid("SCAN_MODE", "expected quick, standard, or deep")
                    })?,
                max_parallel: env_parse_or("SCAN_MAX_PARALLEL", 0)?,
                use_native_tools: env_parse_or("SCAN_USE_NATIVE_TOOLS", true)?,
                timeout: Duration::from_secs(env_parse_or("SCAN_TIMEOUT_SECS", 300u64)?),
            },
            analysis: AnalysisConfig {
                enable_dependency: env_parse_or("ANALYSIS_DEPENDENCY", true)?,
                enable_security: env_parse_or("ANALYSIS_SECURITY", true)?,
                enable_cost: env_parse_or("ANALYSIS_COST", true)?,
                cache_results: env_parse_or("ANALYSIS_CACHE", true)?,
                cache_ttl: Duration::from_secs(env_parse_or("ANALYSIS_CACHE_TTL_SECS", 300u64)?),
            },
        };

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        temp_env::with_vars_unset(
            ["SCAN_MODE", "SCAN_MAX_PARALLEL", "AWS_REGIONS", "AWS_ENABLED"],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.discovery.mode, DiscoveryMode::Standard);
                assert_eq!(config.discovery.max_parallel, 0);
                assert!(config.aws.enabled);
                assert_eq!(config.aws.regions, default_aws_regions());
            },
        );
    }

    #[test]
    fn test_overrides() {
        temp_env::with_vars(
            [
                ("SCAN_MODE", Some("deep")),
                ("SCAN_MAX_PARALLEL", Some("8")),
                ("AWS_REGIONS", Some("us-east-1")),
                ("AZURE_ENABLED", Some("false")),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.discovery.mode, DiscoveryMode::Deep);
                assert_eq!(config.discovery.max_parallel, 8);
                assert_eq!(config.aws.regions, vec!["us-east-1"]);
                assert!(!config.azure.enabled);
            },
        );
    }

    #[test]
    fn test_bad_mode_is_an_error() {
        temp_env::with_var("SCAN_MODE", Some("everything"), || {
            assert!(Config::from_env().is_err());
        });
    }
}
