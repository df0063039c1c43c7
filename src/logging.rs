//! # Structured Logging Module
//!
//! Environment-aware structured logging for directive runs. Console output
//! is pretty by default and JSON when configured; the level comes from the
//! configuration, then `RUST_LOG`, then the environment.

use crate::config::{LogFormat, LoggingConfig};
use crate::constants::system::LEGATUS_CORE_VERSION;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process
pub fn init_structured_logging(config: &LoggingConfig, environment: &str) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = build_filter(config, environment);

        let layer = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .boxed(),
        };

        // Embedders may already own the global subscriber
        if tracing_subscriber::registry()
            .with(layer.with_filter(filter))
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            version = LEGATUS_CORE_VERSION,
            environment = %environment,
            format = %config.format,
            "STRUCTURED LOGGING: Initialized"
        );
    });
}

fn build_filter(config: &LoggingConfig, environment: &str) -> EnvFilter {
    if let Some(level) = &config.level {
        if let Ok(filter) = EnvFilter::try_new(level) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(get_log_level(environment)))
}

/// Default level for an environment
pub fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for a lifecycle stage
pub fn log_stage_operation(
    directive: &str,
    run_id: &str,
    stage: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        directive = %directive,
        run_id = %run_id,
        stage = %stage,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "STAGE_OPERATION"
    );
}

/// Log structured data for unit-of-work commits and rollbacks
pub fn log_persistence_operation(operation: &str, mode: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        mode = %mode,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "PERSISTENCE_OPERATION"
    );
}

/// Log structured data for registry operations
pub fn log_registry_operation(
    operation: &str,
    action: &str,
    directive: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        action = %action,
        directive = %directive,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "REGISTRY_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_configured_level_wins() {
        let config = LoggingConfig {
            level: Some("warn".to_string()),
            format: LogFormat::Json,
        };
        assert_eq!(build_filter(&config, "development").to_string(), "warn");
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        init_structured_logging(&config, "test");
        init_structured_logging(&config, "test");
        log_stage_operation("create_note", "run", "clean", "completed", None);
    }
}
