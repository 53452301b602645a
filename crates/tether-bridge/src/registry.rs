//! Type converter registry
//!
//! Maps a host type to the pair of functions converting it to and from
//! engine values. Lookups for unregistered types fail with
//! `BridgeError::UnregisteredType`; there is no reflective fallback.
//! Registering a type again replaces the previous entry.

use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tether_sdk::EngineValue;
use tracing::debug;

use crate::bridge::Scope;
use crate::error::{BridgeError, BridgeResult};

/// Host -> engine conversion function
pub type ToEngineFn<T> = Arc<dyn Fn(&Scope<'_>, &T) -> BridgeResult<EngineValue> + Send + Sync>;

/// Engine -> host conversion function
pub type FromEngineFn<T> = Arc<dyn Fn(&Scope<'_>, EngineValue) -> BridgeResult<T> + Send + Sync>;

/// Conversion functions for one host type
pub struct Converter<T> {
    to_engine: ToEngineFn<T>,
    from_engine: FromEngineFn<T>,
    copy_semantics: bool,
}

impl<T> Converter<T> {
    /// Convert a host value inside an entered scope
    pub fn to_engine(&self, scope: &Scope<'_>, value: &T) -> BridgeResult<EngineValue> {
        (self.to_engine)(scope, value)
    }

    /// Convert an engine value inside an entered scope
    pub fn from_engine(&self, scope: &Scope<'_>, value: EngineValue) -> BridgeResult<T> {
        (self.from_engine)(scope, value)
    }

    /// Whether the engine value is an independent copy of the host value
    pub fn copy_semantics(&self) -> bool {
        self.copy_semantics
    }
}

impl<T> Clone for Converter<T> {
    fn clone(&self) -> Self {
        Self {
            to_engine: Arc::clone(&self.to_engine),
            from_engine: Arc::clone(&self.from_engine),
            copy_semantics: self.copy_semantics,
        }
    }
}

struct ConversionEntry {
    type_name: &'static str,
    copy_semantics: bool,
    /// `Converter<T>` for the entry's type
    converter: Box<dyn Any + Send + Sync>,
}

/// Registry of converters keyed by host type
pub struct ConverterRegistry {
    entries: RwLock<FxHashMap<TypeId, ConversionEntry>>,
}

impl ConverterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register converters for `T`, replacing any previous registration
    pub fn register<T: 'static>(
        &self,
        to_engine: impl Fn(&Scope<'_>, &T) -> BridgeResult<EngineValue> + Send + Sync + 'static,
        from_engine: impl Fn(&Scope<'_>, EngineValue) -> BridgeResult<T> + Send + Sync + 'static,
        copy_semantics: bool,
    ) {
        let converter = Converter::<T> {
            to_engine: Arc::new(to_engine),
            from_engine: Arc::new(from_engine),
            copy_semantics,
        };
        let replaced = self
            .entries
            .write()
            .insert(
                TypeId::of::<T>(),
                ConversionEntry {
                    type_name: type_name::<T>(),
                    copy_semantics,
                    converter: Box::new(converter),
                },
            )
            .is_some();
        debug!(type_name = type_name::<T>(), copy_semantics, replaced, "registered converter");
    }

    /// Look up the converter for `T`
    pub fn get<T: 'static>(&self) -> BridgeResult<Converter<T>> {
        let entries = self.entries.read();
        entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.converter.downcast_ref::<Converter<T>>())
            .cloned()
            .ok_or(BridgeError::UnregisteredType {
                type_name: type_name::<T>(),
            })
    }

    /// Check if `T` has a converter
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.read().contains_key(&TypeId::of::<T>())
    }

    /// Copy semantics of the registered converter for `T`
    pub fn copy_semantics<T: 'static>(&self) -> Option<bool> {
        self.entries
            .read()
            .get(&TypeId::of::<T>())
            .map(|entry| entry.copy_semantics)
    }

    /// Names of all registered types
    pub fn type_names(&self) -> Vec<&'static str> {
        self.entries.read().values().map(|entry| entry.type_name).collect()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
