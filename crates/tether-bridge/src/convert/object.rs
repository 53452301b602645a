//! Struct converters
//!
//! Structs cross the boundary by value: converting to the engine allocates a
//! fresh object and lets a field writer fill it; converting back builds a new
//! host value from a field reader. No identity survives a round trip.

use tether_sdk::{EngineValue, ValueType};

use crate::bridge::Scope;
use crate::convert::primitive::expect_type;
use crate::error::BridgeResult;
use crate::registry::ConverterRegistry;

/// Named-property access to an engine object.
///
/// Field values go through the registered converter of their type.
pub struct ObjectView<'a> {
    scope: &'a Scope<'a>,
    value: EngineValue,
}

impl<'a> ObjectView<'a> {
    /// View `value` inside `scope`
    pub fn new(scope: &'a Scope<'a>, value: EngineValue) -> Self {
        Self { scope, value }
    }

    /// Read property `name` as `T`
    pub fn get<T: 'static>(&self, name: &str) -> BridgeResult<T> {
        let raw = self.scope.engine().get_property(self.value, name)?;
        self.scope.from_engine(raw)
    }

    /// Write property `name` from a host value
    pub fn set<T: 'static>(&self, name: &str, value: &T) -> BridgeResult<()> {
        let raw = self.scope.to_engine(value)?;
        self.set_raw(name, raw)
    }

    /// Read property `name` without conversion
    pub fn get_raw(&self, name: &str) -> BridgeResult<EngineValue> {
        Ok(self.scope.engine().get_property(self.value, name)?)
    }

    /// Write property `name` without conversion
    pub fn set_raw(&self, name: &str, value: EngineValue) -> BridgeResult<()> {
        Ok(self.scope.engine().set_property(self.value, name, value)?)
    }

    /// The viewed engine value
    pub fn value(&self) -> EngineValue {
        self.value
    }

    /// Scope the view lives in
    pub fn scope(&self) -> &'a Scope<'a> {
        self.scope
    }
}

/// Write a struct's fields onto an engine object.
///
/// # Example
///
/// ```ignore
/// struct Point { x: f64, y: f64 }
///
/// impl ToEngineObject for Point {
///     fn write_fields(&self, object: &ObjectView<'_>) -> BridgeResult<()> {
///         object.set("x", &self.x)?;
///         object.set("y", &self.y)
///     }
/// }
/// ```
pub trait ToEngineObject {
    /// Write fields onto a freshly allocated engine object
    fn write_fields(&self, object: &ObjectView<'_>) -> BridgeResult<()>;
}

/// Build a struct from an engine object's fields.
pub trait FromEngineObject: Sized {
    /// Read fields from an engine object
    fn from_engine_object(object: &ObjectView<'_>) -> BridgeResult<Self>;
}

/// Register a by-value struct converter for `T`
pub fn register_struct<T: 'static>(
    registry: &ConverterRegistry,
    writer: impl Fn(&ObjectView<'_>, &T) -> BridgeResult<()> + Send + Sync + 'static,
    reader: impl Fn(&ObjectView<'_>) -> BridgeResult<T> + Send + Sync + 'static,
) {
    registry.register::<T>(
        move |scope, value| {
            let object = scope.engine().create_object()?;
            writer(&ObjectView::new(scope, object), value)?;
            Ok(object)
        },
        move |scope, value| {
            expect_type(scope, value, ValueType::Object, std::any::type_name::<T>())?;
            reader(&ObjectView::new(scope, value))
        },
        true,
    );
}
