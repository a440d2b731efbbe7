//! Discovery Domain
//!
//! The provider contract and the fan-out engine that turns a set of
//! configured providers into a normalised inventory snapshot.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ DiscoveryOrchestrator│  ← two-phase fan-out, partial-failure capture
//! └───────┬──────────────┘
//!         │
//! ┌───────▼──────────────┐
//! │   ProviderRegistry   │  ← registered ResourceProvider plugins
//! └───────┬──────────────┘
//!         │
//! ┌───────▼──────────────┐
//! │  ResourceProvider    │  ← accounts, resources, optional native path
//! └──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_discovery::{DiscoveryOptions, DiscoveryOrchestrator, ProviderRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register(std::sync::Arc::new(AwsProvider::new(config.aws.clone())));
//!
//! let orchestrator = DiscoveryOrchestrator::new(registry, store);
//! let result = orchestrator
//!     .discover(&DiscoveryOptions::default(), CancellationToken::new())
//!     .await?;
//! println!("{} resources, {} errors", result.resources.len(), result.errors().len());
//! ```

pub mod config;
pub mod orchestrator;
pub mod provider;

pub use config::DiscoveryOptions;
pub use orchestrator::{DiscoveryOrchestrator, Enricher};
pub use provider::{NativeInventory, ProviderRegistry, ResourceProvider};
