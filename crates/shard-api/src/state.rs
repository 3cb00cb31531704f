//! # Application State
//!
//! Configuration read from the environment and the shared state handed to
//! every handler.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use shard_dist::{DistributionService, ServiceConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_SESSION_TTL};
use thiserror::Error;

/// An environment variable that is set but unusable.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid value {value:?} for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Bearer secret. `None` disables authentication.
    pub auth_token: Option<String>,
    pub data_root: PathBuf,
    /// Defaults to `<data_root>/metadata.json`.
    pub metadata_file: Option<PathBuf>,
    pub session_ttl: Duration,
    pub verify_disk_on_hit: bool,
    /// Requests per caller per minute. Zero disables rate limiting.
    pub rate_limit_per_minute: u64,
    /// Byte budget of the in-process blob cache.
    pub cache_max_bytes: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("data_root", &self.data_root)
            .field("metadata_file", &self.metadata_file)
            .field("session_ttl", &self.session_ttl)
            .field("verify_disk_on_hit", &self.verify_disk_on_hit)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("cache_max_bytes", &self.cache_max_bytes)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            data_root: PathBuf::from("./data"),
            metadata_file: None,
            session_ttl: DEFAULT_SESSION_TTL,
            verify_disk_on_hit: true,
            rate_limit_per_minute: 60,
            cache_max_bytes: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`. Unset variables take defaults;
    /// set but unparsable ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(v) => parse_num("PORT", &v)?,
            None => defaults.port,
        };
        let session_ttl = match get("SHARD_SESSION_TTL_SECS") {
            Some(v) => {
                let secs: u64 = parse_num("SHARD_SESSION_TTL_SECS", &v)?;
                if secs == 0 {
                    return Err(ConfigError {
                        var: "SHARD_SESSION_TTL_SECS",
                        value: v,
                        reason: "must be positive".into(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => defaults.session_ttl,
        };
        let verify_disk_on_hit = match get("SHARD_VERIFY_DISK_ON_HIT") {
            Some(v) => parse_bool("SHARD_VERIFY_DISK_ON_HIT", &v)?,
            None => defaults.verify_disk_on_hit,
        };
        let rate_limit_per_minute = match get("SHARD_RATE_LIMIT_PER_MINUTE") {
            Some(v) => parse_num("SHARD_RATE_LIMIT_PER_MINUTE", &v)?,
            None => defaults.rate_limit_per_minute,
        };
        let cache_max_bytes = match get("SHARD_CACHE_MAX_BYTES") {
            Some(v) => parse_num("SHARD_CACHE_MAX_BYTES", &v)?,
            None => defaults.cache_max_bytes,
        };

        Ok(Self {
            port,
            auth_token: get("AUTH_TOKEN"),
            data_root: get("SHARD_DATA_ROOT").map(PathBuf::from).unwrap_or(defaults.data_root),
            metadata_file: get("SHARD_METADATA_FILE").map(PathBuf::from),
            session_ttl,
            verify_disk_on_hit,
            rate_limit_per_minute,
            cache_max_bytes,
        })
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            data_root: self.data_root.clone(),
            metadata_file: self.metadata_file.clone(),
            session_ttl: self.session_ttl,
            verify_disk_on_hit: self.verify_disk_on_hit,
        }
    }
}

fn parse_num<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            var,
            value: value.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DistributionService>,
    pub config: Arc<AppConfig>,
    /// Present when the Prometheus recorder is installed; mounts `/metrics`.
    pub prometheus: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("prometheus", &self.prometheus.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(config: AppConfig, service: DistributionService) -> Self {
        Self {
            service: Arc::new(service),
            config: Arc::new(config),
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}
