//! Cloud Scanner
//!
//! Discovers resources across AWS, Azure, and GCP, persists them into the
//! SQLite inventory, and runs the dependency / security / cost analysis
//! pipeline over the stored snapshot.

use clap::{Parser, Subcommand};
use core_config::Environment;
use core_config::tracing::{init_tracing, install_color_eyre};
use eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod config;
mod enrich;
mod providers;

use config::Config;
use domain_analysis::{AnalysisOptions, AnalysisOrchestrator};
use domain_discovery::{DiscoveryOptions, DiscoveryOrchestrator, ProviderRegistry};
use domain_inventory::{InventoryStore, QueryEngine, Resource};
use enrich::DependencyEnricher;
use providers::{AwsProvider, AzureProvider, GcpProvider};
use resilience::TtlCache;

#[derive(Parser)]
#[command(name = "cloud-scanner")]
#[command(about = "Discover and analyze cloud resources across AWS, Azure, and GCP")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a discovery pass and persist the inventory
    Discover {
        /// Providers to scan (aws, azure, gcp). Defaults to all configured.
        #[arg(short, long, value_delimiter = ',')]
        providers: Option<Vec<String>>,

        /// Scan breadth: quick, standard, or deep
        #[arg(short, long)]
        mode: Option<String>,

        /// Per-account worker pool width (0 = number of CPUs)
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Prefer provider-native aggregated inventories
        #[arg(long)]
        native: Option<bool>,
    },

    /// Run the analysis pipeline over the stored inventory
    Analyze {
        /// Skip the dependency graph pass
        #[arg(long)]
        skip_dependency: bool,

        /// Skip the security pass
        #[arg(long)]
        skip_security: bool,

        /// Skip the cost pass
        #[arg(long)]
        skip_cost: bool,
    },

    /// Query the inventory (ad-hoc SELECT or a named template)
    Query {
        /// SQL SELECT statement to run
        sql: Option<String>,

        /// Named template (public_resources, unencrypted_databases, ...)
        #[arg(short, long)]
        template: Option<String>,
    },

    /// Print the aggregate inventory summary
    Summary,

    /// Show the most recent discovery run and provider health
    Status {
        /// Also dump process metrics in Prometheus text exposition format
        #[arg(long)]
        metrics: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    let environment = Environment::from_env();
    init_tracing(&environment);

    observability::init_metrics();

    let cli = Cli::parse();

    info!(path = %config.database.path, "Opening inventory store");
    let db = database::sqlite::connect_from_config_with_retry(config.database.clone(), None)
        .await
        .map_err(|e| eyre::eyre!("failed to open inventory store: {e}"))?;

    let store = InventoryStore::new(db);
    store
        .initialize()
        .await
        .map_err(|e| eyre::eyre!("failed to initialize schema: {e}"))?;

    // Process-wide snapshot cache, shared by queries and analysis.
    let cache: Arc<TtlCache<String, Vec<Resource>>> =
        Arc::new(TtlCache::new(config.analysis.cache_ttl));

    let registry = build_registry(&config);
    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Discover {
            providers,
            mode,
            max_parallel,
            native,
        } => {
            let mut options = DiscoveryOptions::default()
                .with_mode(config.discovery.mode)
                .with_max_parallel(config.discovery.max_parallel)
                .with_native_tools(config.discovery.use_native_tools)
                .with_timeout(config.discovery.timeout);
            if let Some(mode) = mode {
                options = options.with_mode(
                    mode.parse()
                        .map_err(|_| eyre::eyre!("unknown mode '{mode}'"))?,
                );
            }
            if let Some(max_parallel) = max_parallel {
                options = options.with_max_parallel(max_parallel);
            }
            if let Some(native) = native {
                options = options.with_native_tools(native);
            }
            if let Some(providers) = providers {
                options = options.with_providers(providers);
            }

            let orchestrator = DiscoveryOrchestrator::new(registry, store.clone())
                .with_enricher(Arc::new(DependencyEnricher::new(store.clone())));

            let result = orchestrator
                .discover(&options, cancel)
                .await
                .map_err(|e| eyre::eyre!("discovery failed: {e}"))?;

            info!(
                status = %result.run.status,
                resources = result.resources.len(),
                errors = result.errors().len(),
                "Discovery complete"
            );
            println!("{}", serde_json::to_string_pretty(&result.run)?);
        }

        Commands::Analyze {
            skip_dependency,
            skip_security,
            skip_cost,
        } => {
            let mut options = AnalysisOptions::default().with_cache_ttl(config.analysis.cache_ttl);
            options.enable_dependency = config.analysis.enable_dependency && !skip_dependency;
            options.enable_security = config.analysis.enable_security && !skip_security;
            options.enable_cost = config.analysis.enable_cost && !skip_cost;
            options.cache_results = config.analysis.cache_results;

            let orchestrator = AnalysisOrchestrator::new(store.clone(), cache, options);
            let report = orchestrator
                .analyze_all(cancel)
                .await
                .map_err(|e| eyre::eyre!("analysis failed: {e}"))?;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Query { sql, template } => {
            let engine = QueryEngine::new(store.clone(), cache);
            let resources = match (sql, template) {
                (Some(sql), None) => engine
                    .query(&sql)
                    .await
                    .map_err(|e| eyre::eyre!("query rejected: {e}"))?,
                (None, Some(template)) => engine
                    .query_template(&template)
                    .await
                    .map_err(|e| eyre::eyre!("template failed: {e}"))?,
                _ => {
                    return Err(eyre::eyre!("pass either a SQL statement or --template, not both"));
                }
            };
            println!("{}", serde_json::to_string_pretty(&resources)?);
        }

        Commands::Summary => {
            let engine = QueryEngine::new(store.clone(), cache);
            let summary = engine
                .summary()
                .await
                .map_err(|e| eyre::eyre!("summary failed: {e}"))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Status { metrics } => {
            let status = store
                .get_discovery_status()
                .await
                .map_err(|e| eyre::eyre!("status failed: {e}"))?;
            println!("{}", serde_json::to_string_pretty(&status)?);

            for line in registry_health(&registry).await {
                println!("{line}");
            }

            if metrics {
                print!("{}", observability::render_metrics());
            }
        }
    }

    Ok(())
}

fn build_registry(config: &Config) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(AwsProvider::new(config.aws.clone())));
    registry.register(Arc::new(AzureProvider::new(config.azure.clone())));
    registry.register(Arc::new(GcpProvider::new(config.gcp.clone())));
    registry
}

/// Probe each configured provider with a short deadline.
async fn registry_health(registry: &ProviderRegistry) -> Vec<String> {
    let mut lines = Vec::new();

    for provider in registry.configured_providers() {
        let healthy = tokio::time::timeout(Duration::from_secs(6), provider.health_check())
            .await
            .ok()
            .and_then(|r| r.ok())
            .unwrap_or(false);
        lines.push(format!(
            "{}: {}",
            provider.name(),
            if healthy { "reachable" } else { "unreachable" }
        ));
    }

    lines
}
