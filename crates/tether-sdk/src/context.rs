//! ScriptEngine trait: the engine's raw value API
//!
//! Defines the interface a script engine exposes to the host bridge. The
//! bridge programs against this trait only; it never depends on engine
//! internals.
//!
//! Every value operation requires the engine's context to be current on the
//! calling thread. Implementations report `EngineError::NoCurrentContext`
//! otherwise.

use std::sync::Arc;

use crate::error::EngineResult;
use crate::value::{ContextId, EngineValue, ExternalData, ValueType};

/// Callback invoked by the engine when it reclaims an external object.
///
/// Receives the collected value and the contents of its external-data slot
/// at collection time.
pub type Finalizer = Arc<dyn Fn(EngineValue, ExternalData) + Send + Sync>;

/// Raw value API of a script engine.
pub trait ScriptEngine: Send + Sync {
    // ========================================================================
    // Context
    // ========================================================================

    /// Context currently active on the calling thread, if any
    fn current_context(&self) -> Option<ContextId>;

    /// Make `context` current on the calling thread (`None` clears it)
    fn set_current_context(&self, context: Option<ContextId>) -> EngineResult<()>;

    // ========================================================================
    // Value Creation
    // ========================================================================

    /// Get the `undefined` value
    fn create_undefined(&self) -> EngineResult<EngineValue>;

    /// Get the `null` value
    fn create_null(&self) -> EngineResult<EngineValue>;

    /// Box a boolean
    fn create_bool(&self, value: bool) -> EngineResult<EngineValue>;

    /// Box a number
    fn create_number(&self, value: f64) -> EngineResult<EngineValue>;

    /// Allocate a string
    fn create_string(&self, value: &str) -> EngineResult<EngineValue>;

    /// Allocate an empty object
    fn create_object(&self) -> EngineResult<EngineValue>;

    /// Allocate an array of `len` undefined elements
    fn create_array(&self, len: u32) -> EngineResult<EngineValue>;

    /// Allocate an error object with the given message value
    fn create_error(&self, message: EngineValue) -> EngineResult<EngineValue>;

    /// Allocate an opaque external object.
    ///
    /// The engine calls `finalizer` once when it collects the object.
    fn create_external_object(
        &self,
        data: ExternalData,
        finalizer: Option<Finalizer>,
    ) -> EngineResult<EngineValue>;

    // ========================================================================
    // Value Reading
    // ========================================================================

    /// Runtime type of a value
    fn value_type(&self, value: EngineValue) -> EngineResult<ValueType>;

    /// Unbox a boolean
    fn read_bool(&self, value: EngineValue) -> EngineResult<bool>;

    /// Unbox a number
    fn read_number(&self, value: EngineValue) -> EngineResult<f64>;

    /// Copy string contents out of the engine
    fn read_string(&self, value: EngineValue) -> EngineResult<String>;

    // ========================================================================
    // Property Access
    // ========================================================================

    /// Read a named property (`undefined` if absent)
    fn get_property(&self, object: EngineValue, name: &str) -> EngineResult<EngineValue>;

    /// Write a named property
    fn set_property(&self, object: EngineValue, name: &str, value: EngineValue)
        -> EngineResult<()>;

    /// Read an indexed element (`undefined` if absent)
    fn get_indexed(&self, object: EngineValue, index: u32) -> EngineResult<EngineValue>;

    /// Write an indexed element
    fn set_indexed(&self, object: EngineValue, index: u32, value: EngineValue)
        -> EngineResult<()>;

    // ========================================================================
    // External Data
    // ========================================================================

    /// Read the external-data slot
    fn external_data(&self, value: EngineValue) -> EngineResult<ExternalData>;

    /// Write the external-data slot (external objects only)
    fn set_external_data(&self, value: EngineValue, data: ExternalData) -> EngineResult<()>;

    /// Check whether the value carries external data
    fn has_external_data(&self, value: EngineValue) -> EngineResult<bool> {
        Ok(!self.external_data(value)?.is_none())
    }
}
