//! Tether SDK - engine-facing contracts for the host/script bridge
//!
//! This crate defines what a script engine must provide for the bridge to
//! drive it, without depending on the bridge itself:
//!
//! - [`EngineValue`], [`ContextId`], [`ExternalData`] and [`PinToken`]
//! - [`ScriptEngine`], the raw value API
//! - [`DebugService`] and the debugger value records

#![warn(missing_docs)]

pub mod context;
pub mod debug;
pub mod error;
pub mod value;

pub use context::{Finalizer, ScriptEngine};
pub use debug::{
    Breakpoint, DebugService, SourceCode, StackFrame, StackProperties, StepType, Variable,
    VariableProperties,
};
pub use error::{EngineError, EngineResult};
pub use value::{ContextId, EngineValue, ExternalData, PinToken, ValueType};
