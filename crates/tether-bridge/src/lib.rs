//! Tether Bridge - host/script value bridge
//!
//! Moves values between host code and an embedded script engine while
//! keeping the engine's threading and lifetime rules:
//!
//! - [`ExecutionContext`]: exclusive, re-entrant entry into the engine context
//! - [`ConverterRegistry`]: per-type conversion functions
//! - [`PinArena`]: keeps host objects alive while the engine references them
//! - [`Bridge`]: primitive, struct, proxy, array and error conversions
//! - [`DebugEngine`]: debugger calls serialized onto one worker thread
//! - [`MemoryEngine`] / [`MemoryDebugger`]: in-process reference engine
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_bridge::{Bridge, MemoryEngine};
//!
//! let engine = Arc::new(MemoryEngine::new());
//! let bridge = Bridge::new(engine.clone(), engine.context_id());
//!
//! let value = bridge.to_engine_value(&"hello".to_string())?;
//! let text: String = bridge.from_engine_value(value)?;
//! ```

#![warn(missing_docs)]

pub mod bridge;
pub mod context;
pub mod convert;
pub mod debug;
pub mod engine;
pub mod error;
pub mod lifetime;
pub mod registry;

pub use bridge::{Bridge, BridgeOptions, Scope};
pub use context::{Entered, ExecutionContext};
pub use convert::{FromEngineObject, ObjectView, ToEngineObject};
pub use debug::{
    CommandSerializer, DebugEngine, DebugEngineOptions, PendingResult, SerializerState,
};
pub use engine::{MemoryDebugger, MemoryEngine};
pub use error::{BridgeError, BridgeResult, HostError};
pub use lifetime::{PinArena, PinHandle, PinStats};
pub use registry::{Converter, ConverterRegistry};
