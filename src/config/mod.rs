//! Configuration module for the edge gateway

mod auth;
mod rate_limit;
mod server;
mod store;
mod telemetry;
mod upstream;

pub use auth::AuthConfig;
pub use rate_limit::{
    AdaptiveConfig, LimitStrategy, QuotaConfig, RateLimitConfig, RateLimitPolicy,
};
pub use server::ServerConfig;
pub use store::{StoreBackend, StoreConfig};
pub use telemetry::TelemetryConfig;
pub use upstream::{ServiceEntry, UpstreamConfig};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration structure for the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Deployment environment name, echoed by `/api/version`
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,

    /// Quota configuration
    pub quota: QuotaConfig,

    /// Upstream backend configuration
    pub upstream: UpstreamConfig,

    /// Telemetry configuration
    pub telemetry: TelemetryConfig,

    /// KV store configuration
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            quota: QuotaConfig::default(),
            upstream: UpstreamConfig::default(),
            telemetry: TelemetryConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, `GATEWAY_*`
    /// environment variables and the well-known plain variables
    /// (`ENVIRONMENT`, `API_KEYS`, `BACKEND_URL`).
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let figment = match config_path {
            Some(path) => Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file(path))
                .merge(Env::prefixed("GATEWAY_").split("__")),
            None => Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("gateway.toml"))
                .merge(Env::prefixed("GATEWAY_").split("__")),
        };

        let mut config: Config = figment.extract().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        config.apply_plain_env();
        Ok(config)
    }

    /// Apply the bare (unprefixed) environment variables of the deployment
    /// contract on top of whatever the file and `GATEWAY_*` variables set.
    fn apply_plain_env(&mut self) {
        if let Ok(environment) = std::env::var("ENVIRONMENT") {
            if !environment.is_empty() {
                self.environment = environment;
            }
        }

        // Empty or absent API_KEYS leaves key gating disabled
        if let Ok(keys) = std::env::var("API_KEYS") {
            self.auth.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(backend_url) = std::env::var("BACKEND_URL") {
            if !backend_url.is_empty() {
                self.upstream.backend_url = backend_url;
            }
        }
    }

    /// Generate example configuration file
    pub fn generate_example() -> Result<String> {
        let config = Self::default();
        toml::to_string_pretty(&config).map_err(|e| Error::Config {
            message: format!("failed to serialize config: {e}"),
        })
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout)
    }

    /// Get upstream health check interval as Duration
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.upstream.health_check_interval_seconds)
    }

    /// Get upstream health probe timeout as Duration
    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream.health_timeout_ms)
    }

    /// Get adaptive sampler interval as Duration
    pub fn adaptive_update_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit.adaptive.update_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind_address.port(), 8080);
        assert_eq!(config.environment, "development");
        assert!(config.auth.api_keys.is_empty());
        assert!(!config.auth.strict);
        assert_eq!(config.rate_limit.path_prefix, "/api");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(config.server.bind_address, deserialized.server.bind_address);
        assert_eq!(config.upstream.backend_url, deserialized.upstream.backend_url);
    }

    #[test]
    fn test_duration_conversions() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.health_check_interval(), Duration::from_secs(30));
        assert_eq!(config.health_check_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_generate_example_is_parseable() {
        let example = Config::generate_example().unwrap();
        let parsed: Config = toml::from_str(&example).unwrap();
        assert_eq!(parsed.telemetry.max_metrics, 10_000);
    }
}
