use crate::storage::StorageError;
use thiserror::Error;

/// Why a unit of work rolled back
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    /// An operation returned false; `position` is its 1-based queue index
    #[error("Operation {action} (#{position}) did not complete")]
    OperationFailed { action: String, position: usize },

    #[error("Transaction handler failed: {reason}")]
    HandlerFailed { reason: String },

    #[error("Unknown association {association} on {table}")]
    UnknownAssociation { table: String, association: String },

    #[error("Cannot aggregate {field}: {reason}")]
    AggregateFailed { field: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PersistenceError {
    pub fn handler_failed(reason: impl Into<String>) -> Self {
        Self::HandlerFailed {
            reason: reason.into(),
        }
    }
}

pub type PersistResult<T> = Result<T, PersistenceError>;
