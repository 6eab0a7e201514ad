//! Sentinela configuration system.
//!
//! TOML file + environment variable overrides, one nested struct per
//! subsystem named in the engine's configuration surface: store,
//! upstream client, cache, rate limiter/circuit breaker, event bus,
//! verification engine, conversation engine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub store: StoreConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    pub events: EventBusConfig,
    pub verification: VerificationConfig,
    pub conversation: ConversationConfig,

    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            store: StoreConfig::default(),
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            scheduler: SchedulerConfig::default(),
            events: EventBusConfig::default(),
            verification: VerificationConfig::default(),
            conversation: ConversationConfig::default(),
            dev_mode: false,
        }
    }
}

/// HTTP surface used for health/metrics only (§1 Non-goals excludes the
/// chat front-end itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: String,
    pub retention_horizon_days: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "./data/sentinela.db".to_string(),
            retention_horizon_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub request_timeout_seconds: u64,
    pub max_requests_per_minute: u32,
    pub burst_limit: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.hubsoft.example.com".to_string(),
            username: String::new(),
            password: String::new(),
            request_timeout_seconds: 30,
            max_requests_per_minute: 30,
            burst_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub default_ttl_seconds: u64,
    pub max_size: usize,
    pub cleanup_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 300,
            max_size: 10_000,
            cleanup_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_probe_interval_seconds: u64,
    pub max_retries_default: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_threshold: 5,
            circuit_breaker_probe_interval_seconds: 5,
            max_retries_default: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    pub max_concurrent_handlers: usize,
    pub handler_timeout_seconds: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_concurrent_handlers: 10,
            handler_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub expiry_hours: i64,
    pub max_attempts: u32,
    pub per_user_24h_cap: u32,
    pub cpf_hash_salt: String,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            expiry_hours: 24,
            max_attempts: 3,
            per_user_24h_cap: 5,
            cpf_hash_salt: "sentinela-default-salt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub idle_timeout_minutes: i64,
    pub attachment_cap: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: 30,
            attachment_cap: 3,
        }
    }
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    pub fn example_toml() -> String {
        r#"# Sentinela configuration
# Environment variables prefixed SENTINELA_ override these settings

[http]
port = 8080
host = "0.0.0.0"

[store]
database_path = "./data/sentinela.db"
retention_horizon_days = 30

[upstream]
base_url = "https://api.hubsoft.example.com"
username = ""
password = ""
request_timeout_seconds = 30
max_requests_per_minute = 30
burst_limit = 5

[cache]
default_ttl_seconds = 300
max_size = 10000
cleanup_interval_seconds = 60

[scheduler]
circuit_breaker_threshold = 5
circuit_breaker_probe_interval_seconds = 5
max_retries_default = 3

[events]
max_concurrent_handlers = 10
handler_timeout_seconds = 30

[verification]
expiry_hours = 24
max_attempts = 3
per_user_24h_cap = 5
cpf_hash_salt = ""

[conversation]
idle_timeout_minutes = 30
attachment_cap = 3

dev_mode = false
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.verification.max_attempts, 3);
        assert_eq!(cfg.verification.expiry_hours, 24);
        assert_eq!(cfg.upstream.max_requests_per_minute, 30);
        assert_eq!(cfg.scheduler.circuit_breaker_threshold, 5);
        assert_eq!(cfg.events.max_concurrent_handlers, 10);
        assert_eq!(cfg.conversation.idle_timeout_minutes, 30);
    }

    #[test]
    fn example_toml_parses_back_to_defaults() {
        let toml_str = AppConfig::example_toml();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.verification.max_attempts, 3);
    }
}
