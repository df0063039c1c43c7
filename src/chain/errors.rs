use thiserror::Error;

/// Errors raised while building or evaluating a property chain
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("Unknown chain operation: {name}")]
    UnknownOperation { name: String },

    #[error("Operation {operation} expected {expected}, found {found}")]
    TypeMismatch {
        operation: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid arguments for {operation}: {reason}")]
    InvalidArguments { operation: String, reason: String },

    #[error("Operation {operation} requires a callback chain")]
    CallbackRequired { operation: String },

    #[error("Property {property} could not be computed: {reason}")]
    PropertyFailed { property: String, reason: String },
}

pub type ChainResult<T> = Result<T, ChainError>;

/// Helper function to create type mismatch errors
pub fn type_mismatch(
    operation: impl Into<String>,
    expected: &'static str,
    found: &serde_json::Value,
) -> ChainError {
    ChainError::TypeMismatch {
        operation: operation.into(),
        expected,
        found: crate::utils::type_name(found),
    }
}

/// Helper function to create argument errors
pub fn invalid_arguments(operation: impl Into<String>, reason: impl Into<String>) -> ChainError {
    ChainError::InvalidArguments {
        operation: operation.into(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_messages() {
        let err = type_mismatch("strip", "string", &json!(5));
        assert_eq!(err.to_string(), "Operation strip expected string, found number");

        let err = ChainError::CallbackRequired {
            operation: "map".to_string(),
        };
        assert_eq!(err.to_string(), "Operation map requires a callback chain");
    }
}
