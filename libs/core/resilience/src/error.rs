//! The cloudscan error taxonomy.
//!
//! This module provides:
//! - `ErrorKind` - the closed set of error categories (stable, do not collapse)
//! - `ScanError` - the error value carried through every fallible operation
//! - retry classification: which errors are worth retrying, delegating to the
//!   wrapped cause for the conditionally-retryable kinds

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Result alias used across the workspace.
pub type ScanResult<T> = Result<T, ScanError>;

/// Message fragments that mark an otherwise-unclassified error as transient.
///
/// Matched case-insensitively as substrings, typically against the rendered
/// message of a foreign (non-`ScanError`) cause.
const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "connection refused",
    "connection reset",
    "rate limit",
    "throttle",
    "service unavailable",
    "internal server error",
    "bad gateway",
    "gateway timeout",
    "too many requests",
];

/// Error categories.
///
/// The set is closed and stable: storage rows, metrics labels, and run
/// records all key on the lowercase names, so variants must not be renamed
/// or merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Auth,
    Network,
    RateLimit,
    NotFound,
    Internal,
    Timeout,
    Validation,
    Storage,
    Provider,
}

impl ErrorKind {
    /// Whether errors of this kind are retryable on their own, without
    /// consulting a wrapped cause.
    ///
    /// `Internal`, `Storage`, and `Provider` are conditional: their
    /// retryability is delegated to the cause (see [`ScanError::is_retryable`]).
    pub fn is_intrinsically_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::Timeout)
    }

    /// Whether errors of this kind are terminal regardless of cause.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Auth | Self::Config | Self::Validation | Self::NotFound
        )
    }
}

/// The error value used across discovery, storage, querying, and analysis.
///
/// Carries a kind tag, a human message, an optional wrapped cause, a context
/// map, and a creation timestamp. Multi-unit operations that complete with
/// some failures aggregate them via [`ScanError::aggregate`]; rate-limited
/// operations may attach a server-provided [`retry_after`](Self::retry_after)
/// hint.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct ScanError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    context: HashMap<String, String>,
    timestamp: DateTime<Utc>,
    retry_after: Option<Duration>,
    related: Vec<ScanError>,
}

impl ScanError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            context: HashMap::new(),
            timestamp: Utc::now(),
            retry_after: None,
            related: Vec::new(),
        }
    }

    /// Configuration error (missing or inconsistent settings).
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Authentication or authorization failure.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    /// Network-level failure (DNS, connect, TLS, mid-stream disconnect).
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Throttling by an upstream service.
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    /// A referenced entity does not exist.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Unexpected internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Deadline expiry or cooperative cancellation.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Input rejected before any work was attempted.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Failure in the inventory store.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    /// Failure reported by a provider plugin.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Provider, message)
    }

    /// The error returned when a caller's cancellation scope fires.
    ///
    /// Cancellation always wins over retry accounting, so this is distinct
    /// from "max retries exceeded".
    pub fn cancelled() -> Self {
        Self::timeout("operation cancelled")
    }

    /// Aggregate the failures of a partially-successful multi-unit operation.
    ///
    /// The aggregate adopts the kind of the first member so that retry
    /// classification keeps working; the members stay reachable via
    /// [`related`](Self::related).
    pub fn aggregate(operation: impl Into<String>, errors: Vec<ScanError>) -> Self {
        let operation = operation.into();
        let kind = errors.first().map_or(ErrorKind::Internal, |e| e.kind);
        let mut err = Self::new(
            kind,
            format!("{}: {} of the attempted units failed", operation, errors.len()),
        );
        err.related = errors;
        err
    }

    /// Attach the underlying cause.
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach a context key/value pair (provider, account, region, ...).
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach a server-provided retry-after hint.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Errors aggregated into this one by [`ScanError::aggregate`].
    pub fn related(&self) -> &[ScanError] {
        &self.related
    }

    /// Retry classification.
    ///
    /// - `network`, `rate_limit`, `timeout`: retryable
    /// - `auth`, `config`, `validation`, `not_found`: terminal
    /// - `internal`, `storage`, `provider`: delegated to the wrapped cause
    ///   (recursing through `ScanError` causes, substring heuristic for
    ///   foreign causes); terminal when no cause is attached
    pub fn is_retryable(&self) -> bool {
        if self.kind.is_intrinsically_retryable() {
            return true;
        }
        if self.kind.is_terminal() {
            return false;
        }
        match &self.source {
            Some(cause) => match cause.downcast_ref::<ScanError>() {
                Some(inner) => inner.is_retryable(),
                None => is_retryable_message(&cause.to_string()),
            },
            None => false,
        }
    }
}

/// Case-insensitive substring check against the transient-failure patterns.
///
/// Used to classify foreign errors that carry no structured kind.
pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p))
}
