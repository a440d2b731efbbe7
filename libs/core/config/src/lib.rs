//! Environment-variable configuration for the scanner workspace.
//!
//! Every setting comes from the process environment (there is no config
//! file layer); this crate carries the small shared vocabulary for that:
//! the deployment-environment switch, the error type, and typed variable
//! readers used by the store and app configs.

pub mod tracing;

use std::env;
use std::str::FromStr;
use thiserror::Error;

/// A configuration variable that could not be used.
#[derive(Error, Debug)]
#[error("environment variable '{key}': {problem}")]
pub struct ConfigError {
    key: String,
    problem: String,
}

impl ConfigError {
    /// The variable was set to something unusable.
    pub fn invalid(key: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            problem: problem.into(),
        }
    }
}

/// Deployment flavour, switched by `APP_ENV`.
///
/// Anything other than `production` (case-insensitive) counts as
/// development, including the variable being unset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        match env::var("APP_ENV") {
            Ok(value) if value.eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Read `key`, treating unset and blank the same way and falling back to
/// `default`.
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Read and parse `key` into any `FromStr` value.
///
/// Unset uses `default`; a set-but-unparsable value is an error rather
/// than a silent fallback.
pub fn env_parse_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = env::var(key) else {
        return Ok(default);
    };
    raw.parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string()))
}

/// Read `key` as a comma-separated list, trimming whitespace and dropping
/// empty items. Unset falls back to `default`.
pub fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => default.iter().map(|item| item.to_string()).collect(),
    }
}
