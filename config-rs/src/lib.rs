//! config-rs/lib.rs
//! Shared key/value configuration source for the remediation services.
//! Provides standardized lookup over process environment with `.env` support.

use std::env;
use std::str::FromStr;
use std::sync::Once;

static LOAD_DOTENV: Once = Once::new();

/// Error raised for missing or malformed configuration values.
///
/// Construction-time configuration problems are fatal by design: callers
/// are expected to surface these immediately rather than default silently.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required configuration key '{0}' is not set")]
    Missing(String),

    #[error("configuration key '{key}' has invalid value '{value}': {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Read-only key/value configuration source.
///
/// Implementations may be backed by process environment, an in-memory map
/// (tests), or a remote configuration service.
pub trait ConfigSource: Send + Sync {
    /// Get a value, falling back to `default` when the key is unset or empty.
    fn get(&self, key: &str, default: &str) -> String;

    /// Get a value, failing when the key is unset or empty.
    fn get_required(&self, key: &str) -> Result<String, ConfigError>;
}

/// Environment-backed configuration source.
///
/// Loads `.env` once on first use so local development picks up the same
/// values as container deployments.
#[derive(Debug, Default, Clone)]
pub struct EnvConfigSource;

impl EnvConfigSource {
    pub fn new() -> Self {
        LOAD_DOTENV.call_once(|| {
            // Missing .env is fine; environment variables still apply.
            if dotenv::dotenv().is_err() {
                log::debug!("no .env file found; using process environment only");
            }
        });
        Self
    }
}

impl ConfigSource for EnvConfigSource {
    fn get(&self, key: &str, default: &str) -> String {
        match env::var(key) {
            Ok(val) if !val.trim().is_empty() => val,
            _ => default.to_string(),
        }
    }

    fn get_required(&self, key: &str) -> Result<String, ConfigError> {
        match env::var(key) {
            Ok(val) if !val.trim().is_empty() => Ok(val),
            _ => Err(ConfigError::Missing(key.to_string())),
        }
    }
}

/// In-memory configuration source for tests and embedded callers.
#[derive(Debug, Default, Clone)]
pub struct MapConfigSource {
    values: std::collections::HashMap<String, String>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl ConfigSource for MapConfigSource {
    fn get(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(val) if !val.trim().is_empty() => val.clone(),
            _ => default.to_string(),
        }
    }

    fn get_required(&self, key: &str) -> Result<String, ConfigError> {
        match self.values.get(key) {
            Some(val) if !val.trim().is_empty() => Ok(val.clone()),
            _ => Err(ConfigError::Missing(key.to_string())),
        }
    }
}

/// Parse a typed value with a default, logging when a present value is bad.
///
/// Absent keys silently take the default; malformed values are logged so a
/// typo in deployment config is visible without failing startup paths that
/// can tolerate the default.
pub fn get_parsed<T: FromStr>(source: &dyn ConfigSource, key: &str, default: T) -> T
where
    T: std::fmt::Display,
{
    let raw = source.get(key, "");
    if raw.is_empty() {
        return default;
    }
    match raw.parse::<T>() {
        Ok(val) => val,
        Err(_) => {
            log::warn!("Invalid value in {}, using default {}", key, default);
            default
        }
    }
}

/// Parse a typed value, failing fast on malformed input.
///
/// Absent keys take the default; present-but-unparseable values are a
/// configuration error, never silently defaulted.
pub fn get_parsed_strict<T: FromStr>(
    source: &dyn ConfigSource,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    let raw = source.get(key, "");
    if raw.is_empty() {
        return Ok(default);
    }
    raw.parse::<T>().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: raw,
        reason: "not parseable as the expected type".to_string(),
    })
}

/// Conservative truthy parsing for feature flags.
///
/// Accepts "1", "true", "yes", "on" (case-insensitive); anything else,
/// including an unset key, is false unless `default` says otherwise.
pub fn get_flag(source: &dyn ConfigSource, key: &str, default: bool) -> bool {
    let raw = source.get(key, "");
    if raw.is_empty() {
        return default;
    }
    let v = raw.trim().to_ascii_lowercase();
    matches!(v.as_str(), "1" | "true" | "yes" | "on")
}
