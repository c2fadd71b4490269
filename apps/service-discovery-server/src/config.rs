use std::path::Path;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use service_discovery::ServiceDiscoveryConfig;

/// Environment variable holding the shared credential.
pub const API_KEY_ENV: &str = "SERVICE_DISCOVERY_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub discovery: ServiceDiscoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:6500".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub dsn: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: "sqlite://service_discovery.db?mode=rwc".to_owned(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `service_discovery=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Layered load: defaults, then the YAML file, then `APP__*` variables
    /// (`__` separates sections), then [`API_KEY_ENV`].
    ///
    /// # Errors
    /// Fails on unreadable files, malformed values or unknown keys.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment
            .merge(Env::prefixed("APP__").split("__"))
            .merge(
                Env::raw()
                    .only(&[API_KEY_ENV])
                    .map(|_| "discovery.api_key".into()),
            );

        figment
            .extract()
            .context("failed to load configuration")
    }

    pub fn apply_cli_overrides(&mut self, bind: Option<&str>) {
        if let Some(bind) = bind {
            self.server.bind_addr = bind.to_owned();
        }
    }

    /// Copy safe to print: the API key is masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.discovery.api_key.is_empty() {
            copy.discovery.api_key = "***".to_owned();
        }
        copy
    }
}
