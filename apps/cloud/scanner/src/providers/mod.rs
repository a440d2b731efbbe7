//! Cloud provider plugins
//!
//! This module contains the discovery implementations for AWS, Azure, and
//! GCP. Each enumerates accounts and resources through the provider's REST
//! surface where reachable, degrading to a deterministic sample inventory
//! so development and demos work without live credentials.

pub mod aws;
pub mod azure;
pub mod gcp;

pub use aws::AwsProvider;
pub use azure::AzureProvider;
pub use gcp::GcpProvider;
