//! Error types for the Legatus directive engine.
//!

use crate::chain::ChainError;
use crate::config::ConfigurationError;
use crate::directive::ExecutionError;
use crate::storage::StorageError;
use crate::unit_of_work::PersistenceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LegatusError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Registry error: {0}")]
    Registry(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LegatusError {
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, LegatusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_error_conversion() {
        let err: LegatusError = ChainError::UnknownOperation {
            name: "frobnicate".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Chain error: Unknown chain operation: frobnicate"
        );
    }

    #[test]
    fn test_schema_helper() {
        let err = LegatusError::schema("duplicate property: name");
        assert!(matches!(err, LegatusError::Schema(_)));
        assert_eq!(err.to_string(), "Schema error: duplicate property: name");
    }
}
