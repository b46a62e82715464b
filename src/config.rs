//! Environment-driven configuration shared across the API.

use std::env;

use thiserror::Error;

use crate::store::VERSION_FIELD;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(String),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: String, value: String },
}

pub(crate) fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing(key.to_string()))
}

pub(crate) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

pub(crate) fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

const DEFAULT_LIMIT: u64 = 3;
const DEFAULT_MAX_LIMIT: u64 = 100;
/// Filter keys a client may repeat to match any of several values.
pub const DEFAULT_REPEATABLE_KEYS: &[&str] =
    &["duration", "ratingsAverage", "ratingsQuantity", "maxGroupSize"];

/// Defaults and bounds for the list-query pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Page size used when the client sends no usable `limit`.
    pub default_limit: u64,
    /// Upper bound on `limit`; `None` leaves it unbounded.
    pub max_limit: Option<u64>,
    /// Internal field dropped from results unless explicitly requested.
    pub version_field: String,
    /// Filter keys whose repeated values are all kept; other keys keep the last value.
    pub repeatable_keys: Vec<String>,
}

impl QueryConfig {
    pub fn from_env() -> Self {
        let default_limit = env_u64("QUERY_DEFAULT_LIMIT", DEFAULT_LIMIT).max(1);
        let max_limit = match env::var("QUERY_MAX_LIMIT") {
            Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
                "" | "0" | "none" => None,
                other => Some(other.parse::<u64>().unwrap_or(DEFAULT_MAX_LIMIT).max(1)),
            },
            Err(_) => Some(DEFAULT_MAX_LIMIT),
        };

        let repeatable_keys = match env_optional("QUERY_REPEATABLE_KEYS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string)
                .collect(),
            None => default_repeatable_keys(),
        };

        Self {
            default_limit,
            max_limit,
            version_field: VERSION_FIELD.to_string(),
            repeatable_keys,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: Some(DEFAULT_MAX_LIMIT),
            version_field: VERSION_FIELD.to_string(),
            repeatable_keys: default_repeatable_keys(),
        }
    }
}

fn default_repeatable_keys() -> Vec<String> {
    DEFAULT_REPEATABLE_KEYS.iter().map(|key| key.to_string()).collect()
}
