//! Configuration Error Types
//!
//! Errors raised while layering configuration sources and validating the
//! result.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The configuration directory does not exist
    #[error("Configuration directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// A source could not be read or parsed
    #[error("Failed to load configuration from {source_name}: {error}")]
    LoadError { source_name: String, error: String },

    /// Environment names are used in file names, so they are restricted
    #[error("Invalid environment name '{environment}': {error}")]
    EnvironmentConfigError { environment: String, error: String },

    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    #[error("Configuration validation failed: {error}")]
    ValidationError { error: String },
}

impl ConfigurationError {
    pub fn directory_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DirectoryNotFound { path: path.into() }
    }

    pub fn load_error<S: Into<String>, E: std::fmt::Display>(source_name: S, error: E) -> Self {
        Self::LoadError {
            source_name: source_name.into(),
            error: error.to_string(),
        }
    }

    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    pub fn validation_error<E: Into<String>>(error: E) -> Self {
        Self::ValidationError {
            error: error.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(error: config::ConfigError) -> Self {
        Self::load_error("layered sources", error)
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
