//! # Legatus Configuration
//!
//! Settings consumed by the directive engine, loaded by layering:
//!
//! 1. built-in defaults
//! 2. `<dir>/legatus.toml`
//! 3. `<dir>/legatus.<environment>.toml`
//! 4. `LEGATUS_*` environment variables, nested with `__`
//!    (`LEGATUS_DIRECTIVE__REQUIRED_MESSAGE`)
//!
//! Both files are optional. The environment comes from `LEGATUS_ENV`, then
//! `APP_ENV`, and defaults to `development`.
//!
//! ```rust,no_run
//! use legatus_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let settings = manager.config().directive_settings();
//! println!("required message: {}", settings.required_message);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::directive::DirectiveSettings;
use crate::unit_of_work::UnitOfWorkMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing_subscriber::EnvFilter;

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegatusConfig {
    pub environment: String,
    pub logging: LoggingConfig,
    pub directive: DirectiveSettings,
    pub unit_of_work: UnitOfWorkConfig,
}

impl Default for LegatusConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            logging: LoggingConfig::default(),
            directive: DirectiveSettings::default(),
            unit_of_work: UnitOfWorkConfig::default(),
        }
    }
}

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; when unset the level follows the environment
    pub level: Option<String>,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitOfWorkConfig {
    pub mode: UnitOfWorkMode,
}

impl LegatusConfig {
    /// Settings handed to directive schemas, with the unit-of-work mode
    /// taken from the `unit_of_work` section
    pub fn directive_settings(&self) -> DirectiveSettings {
        DirectiveSettings {
            unit_of_work_mode: self.unit_of_work.mode,
            ..self.directive.clone()
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.environment.trim().is_empty() {
            return Err(ConfigurationError::validation_error("environment must not be blank"));
        }

        if self.directive.required_message.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "directive.required_message",
                self.directive.required_message.clone(),
                "must not be blank",
            ));
        }

        let suffix = &self.directive.nested_attributes_suffix;
        if suffix.len() < 2 || !suffix.starts_with('_') {
            return Err(ConfigurationError::invalid_value(
                "directive.nested_attributes_suffix",
                suffix.clone(),
                "must start with '_' and name the nested input",
            ));
        }

        if let Some(level) = &self.logging.level {
            if let Err(e) = EnvFilter::try_new(level) {
                return Err(ConfigurationError::invalid_value(
                    "logging.level",
                    level.clone(),
                    e.to_string(),
                ));
            }
        }

        Ok(())
    }
}
