//! Resilience primitives shared by every cloudscan service.
//!
//! This crate provides:
//! - `ScanError` / `ErrorKind` - the error taxonomy used across discovery,
//!   storage, querying, and analysis
//! - `RetryPolicy` / `retry_with_policy` - policy-driven exponential backoff
//!   with jitter and cooperative cancellation
//! - `TtlCache` - a thread-safe in-process cache with per-entry expiry
//!
//! # Example
//!
//! ```rust,ignore
//! use resilience::{retry_with_policy, RetryPolicy, ScanError};
//! use tokio_util::sync::CancellationToken;
//!
//! let policy = RetryPolicy::discovery();
//! let cancel = CancellationToken::new();
//!
//! let accounts = retry_with_policy(&policy, &cancel, || async {
//!     provider.discover_accounts().await
//! })
//! .await?;
//! ```

pub mod cache;
pub mod error;
pub mod retry;

pub use cache::TtlCache;
pub use error::{ErrorKind, ScanError, ScanResult, is_retryable_message};
pub use retry::{RetryPolicy, retry_with_policy};
