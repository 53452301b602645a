//! Error types reported by engine implementations

use crate::value::{EngineValue, ValueType};

/// Result type for engine calls
pub type EngineResult<T> = Result<T, EngineError>;

/// Failure reported by the underlying engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Called without the engine's context current on this thread
    #[error("No engine context is current on this thread")]
    NoCurrentContext,

    /// Handle does not refer to a live engine value
    #[error("Invalid engine value {0:?}")]
    InvalidValue(EngineValue),

    /// Value has a different runtime type than the operation requires
    #[error("Type mismatch: expected {expected}, got {found}")]
    TypeMismatch {
        /// Type the operation required
        expected: ValueType,
        /// Type the value actually has
        found: ValueType,
    },

    /// Script raised an error
    #[error("Script error: {message}")]
    Script {
        /// Error message reported by the script
        message: String,
    },

    /// Any other engine failure
    #[error("{0}")]
    Operation(String),
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Operation(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Operation(s.to_string())
    }
}
