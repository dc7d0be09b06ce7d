//! Configuration management for the tenant limiter.

use serde::{Deserialize, Serialize};

use crate::error::{LimiterError, Result};
use crate::ratelimit::DEFAULT_RULE_CACHE_TTL_SECS;

/// Prefix for environment variable overrides, e.g.
/// `TENANT_LIMITER__COUNTER_STORE__BACKEND=redis`.
pub const ENV_PREFIX: &str = "TENANT_LIMITER";

/// Main configuration for the tenant limiter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Rule loading and caching configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Counter store configuration
    #[serde(default)]
    pub counter_store: CounterStoreConfig,
}

/// Rule loading and caching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to the YAML rules document
    #[serde(default)]
    pub rules_path: Option<String>,

    /// Lifetime of a cached tenant rule set in seconds
    #[serde(default = "default_rule_cache_ttl")]
    pub rule_cache_ttl_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            rule_cache_ttl_secs: default_rule_cache_ttl(),
        }
    }
}

fn default_rule_cache_ttl() -> u64 {
    DEFAULT_RULE_CACHE_TTL_SECS
}

/// Which counter store backs the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterBackend {
    /// Process-local counters; only suitable for a single instance
    #[default]
    Memory,
    /// Counters shared through Redis
    Redis,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterStoreConfig {
    #[serde(default)]
    pub backend: CounterBackend,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Maximum number of pooled Redis connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Upper bound on a single counter store command in milliseconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,
}

impl Default for CounterStoreConfig {
    fn default() -> Self {
        Self {
            backend: CounterBackend::default(),
            redis_url: default_redis_url(),
            max_connections: default_max_connections(),
            command_timeout_ms: default_command_timeout(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_max_connections() -> usize {
    16
}

fn default_command_timeout() -> u64 {
    250
}

impl LimiterConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| LimiterError::Config(e.to_string()))
    }

    /// Load configuration from an optional file layered under
    /// `TENANT_LIMITER__*` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }

        builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| LimiterError::Config(e.to_string()))
    }
}
