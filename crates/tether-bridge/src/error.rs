//! Bridge error types

use std::sync::Arc;

use tether_sdk::{EngineError, PinToken};

/// A host-side error that may travel through the engine and back.
pub type HostError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors raised by the value bridge and the command serializer
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// No converter registered for the requested host type
    #[error("No converter registered for type {type_name}")]
    UnregisteredType {
        /// Rust type name of the requested type
        type_name: &'static str,
    },

    /// Engine value has the wrong shape for the requested host type
    #[error("Conversion failed: expected {expected}, got {found}")]
    Conversion {
        /// What the converter required
        expected: String,
        /// What the engine value actually was
        found: String,
    },

    /// Engine value carries no host object reference
    #[error("Engine value is not a proxy for a host object")]
    NotAProxy,

    /// Engine value refers to a pin the arena no longer holds
    #[error("Engine value refers to released {0}")]
    ReleasedPin(PinToken),

    /// Command submitted after the serializer stopped accepting work
    #[error("Command queue is closed")]
    QueueClosed,

    /// Engine context is held by another thread
    #[error("Engine context is owned by another thread")]
    ContextBusy,

    /// Underlying engine call failed
    #[error("Engine operation failed: {0}")]
    Engine(#[from] EngineError),

    /// Host error recovered from an engine error value
    #[error("Host error: {0}")]
    Host(HostError),

    /// Command action panicked on the worker
    #[error("Command panicked: {0}")]
    CommandPanicked(String),

    /// Worker dropped the command without completing it
    #[error("Command worker terminated before completing the command")]
    WorkerGone,

    /// Worker thread could not be started
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

impl BridgeError {
    /// Build a conversion error
    pub fn conversion(expected: impl Into<String>, found: impl Into<String>) -> Self {
        BridgeError::Conversion {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
