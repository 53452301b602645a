//! Engine value handles
//!
//! An `EngineValue` is an opaque reference into the engine's heap. The host
//! never owns what it points to: a handle is only meaningful while the
//! owning context is current, and only as long as the engine keeps the
//! value alive.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle to a value living in the engine heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EngineValue(u64);

impl EngineValue {
    /// Create from raw handle bits (engine implementations only)
    #[inline(always)]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Get raw handle bits
    #[inline(always)]
    pub const fn to_bits(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EngineValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineValue({:#x})", self.0)
    }
}

/// Identifier of an engine execution context.
///
/// Each engine instance owns exactly one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a new process-unique context ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

/// Runtime type of an engine value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean,
    /// IEEE 754 double
    Number,
    /// String
    String,
    /// Plain object (including external objects)
    Object,
    /// Array
    Array,
    /// Error object
    Error,
    /// Callable function
    Function,
}

impl ValueType {
    /// Lowercase name used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Undefined => "undefined",
            ValueType::Null => "null",
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Object => "object",
            ValueType::Array => "array",
            ValueType::Error => "error",
            ValueType::Function => "function",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Token identifying a host object pinned on behalf of the engine.
///
/// The token is what the engine stores; the host keeps the mapping from
/// token to object in its own arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinToken(u64);

impl PinToken {
    /// Create a token from its raw value
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw token value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PinToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin#{}", self.0)
    }
}

/// Contents of an engine value's external-data slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExternalData {
    /// Slot is empty
    #[default]
    None,
    /// Slot carries a pinned host reference
    Pinned(PinToken),
}

impl ExternalData {
    /// Check if the slot is empty
    pub fn is_none(&self) -> bool {
        matches!(self, ExternalData::None)
    }

    /// Get the pin token, if any
    pub fn token(&self) -> Option<PinToken> {
        match self {
            ExternalData::Pinned(token) => Some(*token),
            ExternalData::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_ids_are_unique() {
        let a = ContextId::new();
        let b = ContextId::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_external_data_token() {
        assert_eq!(ExternalData::None.token(), None);
        assert!(ExternalData::default().is_none());

        let token = PinToken::from_u64(7);
        let data = ExternalData::Pinned(token);
        assert_eq!(data.token(), Some(token));
        assert!(!data.is_none());
        assert_eq!(token.to_string(), "pin#7");
    }

    #[test]
    fn test_engine_value_bits() {
        let v = EngineValue::from_bits(0x2a);
        assert_eq!(v.to_bits(), 0x2a);
        assert_eq!(format!("{:?}", v), "EngineValue(0x2a)");
    }
}
