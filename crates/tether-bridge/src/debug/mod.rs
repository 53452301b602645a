//! Debugger access through a serialized command queue

mod engine;
mod queue;

pub use engine::{DebugEngine, DebugEngineOptions, DEFAULT_PROPERTY_RANGE_END};
pub use queue::{CommandSerializer, PendingResult, SerializerState};
