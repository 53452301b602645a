//! Value bridge
//!
//! `Bridge` ties together the pieces a host needs to exchange values with one
//! engine context: the context guard, the converter registry and the pin
//! arena. Each bridge owns its registry; nothing is process-global.
//!
//! Public conversions resolve the converter first (so an unregistered type
//! fails before touching the engine), then enter the context once and run
//! the converter with a [`Scope`]. Converters that need other converters go
//! through the scope and never re-enter the context.

use std::marker::PhantomData;
use std::sync::Arc;

use tether_sdk::{ContextId, EngineValue, ScriptEngine};

use crate::context::{Entered, ExecutionContext};
use crate::convert::{self, BindingFn, FromEngineObject, ObjectView, ToEngineObject};
use crate::error::{BridgeError, BridgeResult, HostError};
use crate::lifetime::PinArena;
use crate::registry::ConverterRegistry;

/// Options for creating a Bridge
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Property of an engine error object that carries the host error
    pub exception_property: String,

    /// Property holding an array's length
    pub length_property: String,

    /// Register the primitive and host error converters on creation
    pub register_builtins: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            exception_property: "exception".to_string(),
            length_property: "length".to_string(),
            register_builtins: true,
        }
    }
}

/// Conversion scope: the engine context is current on this thread.
///
/// Only created inside [`Bridge::with_context`]; every converter receives
/// one.
pub struct Scope<'a> {
    entered: &'a Entered<'a>,
    bridge: &'a Bridge,
    _not_send: PhantomData<*const ()>,
}

impl<'a> Scope<'a> {
    /// Engine whose context is current
    pub fn engine(&self) -> &'a dyn ScriptEngine {
        self.entered.engine()
    }

    /// Bridge this scope belongs to
    pub fn bridge(&self) -> &'a Bridge {
        self.bridge
    }

    /// Pin arena of the bridge
    pub fn pins(&self) -> &'a Arc<PinArena> {
        &self.bridge.pins
    }

    /// Bridge options
    pub fn options(&self) -> &'a BridgeOptions {
        &self.bridge.options
    }

    /// Convert a nested host value with its registered converter
    pub fn to_engine<T: 'static>(&self, value: &T) -> BridgeResult<EngineValue> {
        self.bridge.registry.get::<T>()?.to_engine(self, value)
    }

    /// Convert a nested engine value with the registered converter for `T`
    pub fn from_engine<T: 'static>(&self, value: EngineValue) -> BridgeResult<T> {
        self.bridge.registry.get::<T>()?.from_engine(self, value)
    }
}

/// Host side of one engine context.
pub struct Bridge {
    context: Arc<ExecutionContext>,
    registry: ConverterRegistry,
    pins: Arc<PinArena>,
    options: BridgeOptions,
}

impl Bridge {
    /// Create a bridge for context `id` of `engine` with default options
    pub fn new(engine: Arc<dyn ScriptEngine>, id: ContextId) -> Self {
        Self::with_options(engine, id, BridgeOptions::default())
    }

    /// Create a bridge with options
    pub fn with_options(
        engine: Arc<dyn ScriptEngine>,
        id: ContextId,
        options: BridgeOptions,
    ) -> Self {
        let bridge = Self {
            context: Arc::new(ExecutionContext::new(engine, id)),
            registry: ConverterRegistry::new(),
            pins: Arc::new(PinArena::new()),
            options,
        };
        if bridge.options.register_builtins {
            convert::register_primitives(&bridge.registry);
            convert::register_host_error(&bridge.registry);
        }
        bridge
    }

    /// Execution context guarded by this bridge
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// Converter registry
    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// Pin arena
    pub fn pins(&self) -> &Arc<PinArena> {
        &self.pins
    }

    /// Bridge options
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Run `f` with the engine context current
    pub fn with_context<T>(
        &self,
        f: impl FnOnce(&Scope<'_>) -> BridgeResult<T>,
    ) -> BridgeResult<T> {
        self.context.with_context(|entered| {
            let scope = Scope {
                entered,
                bridge: self,
                _not_send: PhantomData,
            };
            f(&scope)
        })
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register converters for `T` with copy semantics
    pub fn register_converter<T: 'static>(
        &self,
        to_engine: impl Fn(&Scope<'_>, &T) -> BridgeResult<EngineValue> + Send + Sync + 'static,
        from_engine: impl Fn(&Scope<'_>, EngineValue) -> BridgeResult<T> + Send + Sync + 'static,
    ) {
        self.register_converter_with(to_engine, from_engine, true);
    }

    /// Register converters for `T`.
    ///
    /// `copy_semantics` is false when the engine value shares state with the
    /// host value instead of being an independent copy.
    pub fn register_converter_with<T: 'static>(
        &self,
        to_engine: impl Fn(&Scope<'_>, &T) -> BridgeResult<EngineValue> + Send + Sync + 'static,
        from_engine: impl Fn(&Scope<'_>, EngineValue) -> BridgeResult<T> + Send + Sync + 'static,
        copy_semantics: bool,
    ) {
        self.registry.register(to_engine, from_engine, copy_semantics);
    }

    /// Register a struct converter built from a field writer and reader
    pub fn register_struct_converter<T: 'static>(
        &self,
        writer: impl Fn(&ObjectView<'_>, &T) -> BridgeResult<()> + Send + Sync + 'static,
        reader: impl Fn(&ObjectView<'_>) -> BridgeResult<T> + Send + Sync + 'static,
    ) {
        convert::register_struct(&self.registry, writer, reader);
    }

    /// Register a struct converter from its object mapping traits
    pub fn register_object_type<T>(&self)
    where
        T: ToEngineObject + FromEngineObject + 'static,
    {
        convert::register_struct(
            &self.registry,
            |object, value: &T| value.write_fields(object),
            T::from_engine_object,
        );
    }

    /// Register `Arc<T>` as a proxy type.
    ///
    /// `binding_setup` runs once per host object, when it first crosses into
    /// the engine, to define properties on the proxy.
    pub fn register_proxy_converter<T: Send + Sync + 'static>(
        &self,
        binding_setup: impl Fn(&ObjectView<'_>, &Arc<T>) -> BridgeResult<()>
            + Send
            + Sync
            + 'static,
    ) {
        let binding: BindingFn<T> = Arc::new(binding_setup);
        convert::register_proxy(&self.registry, Some(binding));
    }

    /// Register `Arc<T>` as a proxy type with no bindings
    pub fn register_proxy_type<T: Send + Sync + 'static>(&self) {
        convert::register_proxy::<T>(&self.registry, None);
    }

    /// Register `Vec<T>` as an array of `T`
    pub fn register_array_converter<T: 'static>(&self) {
        convert::register_array::<T>(&self.registry);
    }

    // ========================================================================
    // Conversion
    // ========================================================================

    /// Convert a host value to an engine value
    pub fn to_engine_value<T: 'static>(&self, value: &T) -> BridgeResult<EngineValue> {
        let converter = self.registry.get::<T>()?;
        self.with_context(|scope| converter.to_engine(scope, value))
    }

    /// Convert an engine value to a host value
    pub fn from_engine_value<T: 'static>(&self, value: EngineValue) -> BridgeResult<T> {
        let converter = self.registry.get::<T>()?;
        self.with_context(|scope| converter.from_engine(scope, value))
    }

    /// Build an engine error carrying `error` as a pinned proxy
    pub fn to_engine_error(&self, error: &HostError) -> BridgeResult<EngineValue> {
        self.with_context(|scope| convert::to_engine_error(scope, error))
    }

    /// Recover the host error attached to an engine error value
    pub fn recover_host_error(&self, value: EngineValue) -> BridgeResult<Option<HostError>> {
        self.with_context(|scope| convert::recover_host_error(scope, value))
    }

    /// Turn an engine error value into a `BridgeError`.
    ///
    /// Yields `BridgeError::Host` with the original error when one is
    /// attached, otherwise the script error message.
    pub fn error_from_engine(&self, value: EngineValue) -> BridgeError {
        self.with_context(|scope| Ok(convert::error_from_engine(scope, value)))
            .unwrap_or_else(|err| err)
    }

    /// Number of host objects currently pinned by the engine
    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("context", &self.context.id())
            .field("converters", &self.registry.len())
            .field("pins", &self.pins.len())
            .finish()
    }
}
