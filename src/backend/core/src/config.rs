//! Process configuration.
//!
//! Routing and worker settings are not here; they live in the settings
//! document managed by [`crate::settings::ConfigStore`].

use serde::Deserialize;
use std::path::PathBuf;

use crate::execution::HttpBackendConfig;
use crate::jobs::QueueConfig;
use crate::telemetry::LoggingConfig;

/// Environment variable prefix, e.g. `TIERFLOW__BACKEND__BASE_URL`.
pub const ENV_PREFIX: &str = "TIERFLOW";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where settings and queue state are kept
    #[serde(default)]
    pub storage: StorageConfig,

    /// Execution backend
    #[serde(default)]
    pub backend: HttpBackendConfig,

    /// Queue limits
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Routing + worker settings document (TOML)
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,

    /// Queue snapshot file; the queue is memory-only when unset
    #[serde(default)]
    pub queue_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            settings_path: default_settings_path(),
            queue_path: None,
        }
    }
}

fn default_settings_path() -> PathBuf { PathBuf::from("tierflow.toml") }

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: AppConfig = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides on top.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: AppConfig = config.try_deserialize()?;
        Ok(cfg)
    }
}
