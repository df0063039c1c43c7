//! Configuration Loader
//!
//! Environment-aware loading: defaults, then `legatus.toml`, then
//! `legatus.<env>.toml`, then `LEGATUS_*` variables.

use super::error::{ConfigResult, ConfigurationError};
use super::LegatusConfig;
use crate::constants::system::{CONFIG_FILE_STEM, ENV_PREFIX};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Loaded configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: LegatusConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful in tests that must not touch process-wide variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::check_environment_name(environment)?;

        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);
        if !config_directory.is_dir() {
            return Err(ConfigurationError::directory_not_found(config_directory));
        }

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let mut config = Self::layer_sources(&config_directory, environment)?;
        config.environment = environment.to_string();
        config.validate()?;

        info!(
            environment = %environment,
            directory = %config_directory.display(),
            unit_of_work_mode = %config.unit_of_work.mode,
            log_format = %config.logging.format,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Manager over built-in defaults, used when nothing can be loaded
    pub fn with_defaults(environment: &str) -> ConfigManager {
        ConfigManager {
            config: LegatusConfig {
                environment: environment.to_string(),
                ..LegatusConfig::default()
            },
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }
    }

    pub fn config(&self) -> &LegatusConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// JSON view of the effective configuration
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_else(|e| {
            warn!("Failed to serialize configuration for debugging: {e}");
            serde_json::Value::Null
        })
    }

    /// `LEGATUS_ENV || APP_ENV || "development"`, lowercased
    pub fn detect_environment() -> String {
        env::var(format!("{ENV_PREFIX}_ENV"))
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        PathBuf::from("config")
    }

    /// Path of the environment overlay file inside `config_directory`
    pub fn environment_file(config_directory: &Path, environment: &str) -> PathBuf {
        config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"))
    }

    /// Path of the base file inside `config_directory`
    pub fn base_file(config_directory: &Path) -> PathBuf {
        config_directory.join(format!("{CONFIG_FILE_STEM}.toml"))
    }

    fn check_environment_name(environment: &str) -> ConfigResult<()> {
        if environment.is_empty() {
            return Err(ConfigurationError::EnvironmentConfigError {
                environment: environment.to_string(),
                error: "environment name is empty".to_string(),
            });
        }
        if let Some(bad) = environment
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(ConfigurationError::EnvironmentConfigError {
                environment: environment.to_string(),
                error: format!("unexpected character '{bad}'"),
            });
        }
        Ok(())
    }

    fn layer_sources(config_directory: &Path, environment: &str) -> ConfigResult<LegatusConfig> {
        let defaults = LegatusConfig {
            environment: environment.to_string(),
            ..LegatusConfig::default()
        };

        let base = Self::base_file(config_directory);
        let overlay = Self::environment_file(config_directory, environment);
        debug!(
            base = %base.display(),
            base_present = base.is_file(),
            overlay = %overlay.display(),
            overlay_present = overlay.is_file(),
            "Layering configuration sources"
        );

        let layered = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::File::from(base.clone()).required(false))
            .add_source(config::File::from(overlay.clone()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(overlay.display().to_string(), e))?;

        layered
            .try_deserialize()
            .map_err(|e| ConfigurationError::load_error(base.display().to_string(), e))
    }
}

static GLOBAL_CONFIG: OnceLock<Arc<ConfigManager>> = OnceLock::new();

impl ConfigManager {
    /// Process-wide configuration, loaded on first access. A failed load
    /// falls back to defaults and is logged.
    pub fn global() -> Arc<ConfigManager> {
        GLOBAL_CONFIG
            .get_or_init(|| {
                ConfigManager::load().unwrap_or_else(|e| {
                    warn!("Configuration loading failed, using defaults: {e}");
                    Arc::new(ConfigManager::with_defaults(&Self::detect_environment()))
                })
            })
            .clone()
    }
}
