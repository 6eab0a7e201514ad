//! Configuration loader with file and environment variable support.

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "sentinela.toml",
    "./config/config.toml",
    "/etc/sentinela/config.toml",
];

pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("SENTINELA_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    fn apply_env_overrides(&self, config: &mut AppConfig) {
        if let Ok(val) = env::var("SENTINELA_HTTP_PORT") {
            if let Ok(port) = val.parse() {
                config.http.port = port;
            }
        }
        if let Ok(val) = env::var("SENTINELA_HTTP_HOST") {
            config.http.host = val;
        }

        if let Ok(val) = env::var("SENTINELA_DATABASE_PATH") {
            config.store.database_path = val;
        }
        if let Ok(val) = env::var("SENTINELA_RETENTION_HORIZON_DAYS") {
            if let Ok(v) = val.parse() {
                config.store.retention_horizon_days = v;
            }
        }

        if let Ok(val) = env::var("SENTINELA_UPSTREAM_BASE_URL") {
            config.upstream.base_url = val;
        }
        if let Ok(val) = env::var("SENTINELA_UPSTREAM_USERNAME") {
            config.upstream.username = val;
        }
        if let Ok(val) = env::var("SENTINELA_UPSTREAM_PASSWORD") {
            config.upstream.password = val;
        }
        if let Ok(val) = env::var("SENTINELA_UPSTREAM_TIMEOUT_SECONDS") {
            if let Ok(v) = val.parse() {
                config.upstream.request_timeout_seconds = v;
            }
        }
        if let Ok(val) = env::var("SENTINELA_UPSTREAM_MAX_RPM") {
            if let Ok(v) = val.parse() {
                config.upstream.max_requests_per_minute = v;
            }
        }
        if let Ok(val) = env::var("SENTINELA_UPSTREAM_BURST_LIMIT") {
            if let Ok(v) = val.parse() {
                config.upstream.burst_limit = v;
            }
        }

        if let Ok(val) = env::var("SENTINELA_CACHE_TTL_SECONDS") {
            if let Ok(v) = val.parse() {
                config.cache.default_ttl_seconds = v;
            }
        }
        if let Ok(val) = env::var("SENTINELA_CACHE_MAX_SIZE") {
            if let Ok(v) = val.parse() {
                config.cache.max_size = v;
            }
        }
        if let Ok(val) = env::var("SENTINELA_CACHE_CLEANUP_INTERVAL_SECONDS") {
            if let Ok(v) = val.parse() {
                config.cache.cleanup_interval_seconds = v;
            }
        }

        if let Ok(val) = env::var("SENTINELA_CIRCUIT_BREAKER_THRESHOLD") {
            if let Ok(v) = val.parse() {
                config.scheduler.circuit_breaker_threshold = v;
            }
        }
        if let Ok(val) = env::var("SENTINELA_CIRCUIT_BREAKER_PROBE_INTERVAL_SECONDS") {
            if let Ok(v) = val.parse() {
                config.scheduler.circuit_breaker_probe_interval_seconds = v;
            }
        }

        if let Ok(val) = env::var("SENTINELA_EVENT_BUS_MAX_CONCURRENT_HANDLERS") {
            if let Ok(v) = val.parse() {
                config.events.max_concurrent_handlers = v;
            }
        }
        if let Ok(val) = env::var("SENTINELA_EVENT_BUS_HANDLER_TIMEOUT_SECONDS") {
            if let Ok(v) = val.parse() {
                config.events.handler_timeout_seconds = v;
            }
        }

        if let Ok(val) = env::var("SENTINELA_VERIFICATION_EXPIRY_HOURS") {
            if let Ok(v) = val.parse() {
                config.verification.expiry_hours = v;
            }
        }
        if let Ok(val) = env::var("SENTINELA_VERIFICATION_MAX_ATTEMPTS") {
            if let Ok(v) = val.parse() {
                config.verification.max_attempts = v;
            }
        }
        if let Ok(val) = env::var("SENTINELA_VERIFICATION_PER_USER_24H_CAP") {
            if let Ok(v) = val.parse() {
                config.verification.per_user_24h_cap = v;
            }
        }
        if let Ok(val) = env::var("SENTINELA_CPF_HASH_SALT") {
            config.verification.cpf_hash_salt = val;
        }

        if let Ok(val) = env::var("SENTINELA_CONVERSATION_IDLE_TIMEOUT_MINUTES") {
            if let Ok(v) = val.parse() {
                config.conversation.idle_timeout_minutes = v;
            }
        }
        if let Ok(val) = env::var("SENTINELA_CONVERSATION_ATTACHMENT_CAP") {
            if let Ok(v) = val.parse() {
                config.conversation.attachment_cap = v;
            }
        }

        if let Ok(val) = env::var("SENTINELA_DEV_MODE") {
            config.dev_mode = val.parse().unwrap_or(false);
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn env_override_wins_over_file_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, "[upstream]\nmax_requests_per_minute = 30\n").unwrap();

        std::env::set_var("SENTINELA_UPSTREAM_MAX_RPM", "77");
        let loader = ConfigLoader::with_path(&path);
        let cfg = loader.load().unwrap();
        std::env::remove_var("SENTINELA_UPSTREAM_MAX_RPM");

        assert_eq!(cfg.upstream.max_requests_per_minute, 77);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let loader = ConfigLoader::with_path("/nonexistent/path/config.toml");
        let cfg = loader.load().unwrap();
        assert_eq!(cfg.verification.max_attempts, 3);
    }
}
