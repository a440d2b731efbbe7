//! Shared test utilities for domain testing
//!
//! This crate provides reusable test infrastructure for all domain crates:
//! - `TestStore`: an initialised in-memory inventory store
//! - `ResourceBuilder`: fluent fixture builder for normalised resources
//! - `MockProvider`: a scriptable provider with call counters and failure
//!   injection, for exercising the discovery orchestrator
//!
//! # Usage
//!
//! ```rust,ignore
//! use test_utils::{MockProvider, ResourceBuilder, TestStore};
//!
//! #[tokio::test]
//! async fn my_store_test() {
//!     let store = TestStore::new().await;
//!
//!     let bucket = ResourceBuilder::new("aws", "111122223333", "assets")
//!         .service("s3")
//!         .resource_type("bucket")
//!         .public()
//!         .build();
//! }
//! ```

mod fixtures;
mod provider;
mod store;

pub use fixtures::ResourceBuilder;
pub use provider::{MockCounters, MockProvider};
pub use store::TestStore;
