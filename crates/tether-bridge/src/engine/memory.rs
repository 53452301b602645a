//! In-process reference engine
//!
//! `MemoryEngine` keeps every value in a host-side heap keyed by handle.
//! It enforces the same context rule a real engine does: value operations
//! fail with `NoCurrentContext` unless the engine's context is current on
//! the calling thread. Collection is explicit through [`MemoryEngine::collect`],
//! which runs the value's finalizer the way a garbage collector would.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tether_sdk::{
    ContextId, EngineError, EngineResult, EngineValue, ExternalData, Finalizer, ScriptEngine,
    ValueType,
};
use tracing::trace;

thread_local! {
    /// Context current on this thread
    static CURRENT_CONTEXT: Cell<Option<ContextId>> = const { Cell::new(None) };
}

const UNDEFINED: u64 = 1;
const NULL: u64 = 2;
const GLOBAL: u64 = 3;
const FIRST_DYNAMIC: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    Plain,
    Array,
    Error,
    External,
}

struct ObjectData {
    kind: ObjectKind,
    properties: FxHashMap<String, EngineValue>,
    elements: Vec<EngineValue>,
    external: ExternalData,
    finalizer: Option<Finalizer>,
}

impl ObjectData {
    fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            properties: FxHashMap::default(),
            elements: Vec::new(),
            external: ExternalData::None,
            finalizer: None,
        }
    }
}

enum HeapValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(ObjectData),
}

impl HeapValue {
    fn value_type(&self) -> ValueType {
        match self {
            HeapValue::Undefined => ValueType::Undefined,
            HeapValue::Null => ValueType::Null,
            HeapValue::Bool(_) => ValueType::Boolean,
            HeapValue::Number(_) => ValueType::Number,
            HeapValue::String(_) => ValueType::String,
            HeapValue::Object(object) => match object.kind {
                ObjectKind::Plain | ObjectKind::External => ValueType::Object,
                ObjectKind::Array => ValueType::Array,
                ObjectKind::Error => ValueType::Error,
            },
        }
    }
}

/// Heap-backed script engine with a single context.
pub struct MemoryEngine {
    context: ContextId,
    heap: Mutex<FxHashMap<u64, HeapValue>>,
    next_handle: AtomicU64,
    switches: AtomicU64,
}

impl MemoryEngine {
    /// Create an engine with a fresh context
    pub fn new() -> Self {
        let mut heap = FxHashMap::default();
        heap.insert(UNDEFINED, HeapValue::Undefined);
        heap.insert(NULL, HeapValue::Null);
        heap.insert(GLOBAL, HeapValue::Object(ObjectData::new(ObjectKind::Plain)));

        Self {
            context: ContextId::new(),
            heap: Mutex::new(heap),
            next_handle: AtomicU64::new(FIRST_DYNAMIC),
            switches: AtomicU64::new(0),
        }
    }

    /// The engine's context
    pub fn context_id(&self) -> ContextId {
        self.context
    }

    /// Number of `set_current_context` calls so far
    pub fn context_switches(&self) -> u64 {
        self.switches.load(Ordering::Relaxed)
    }

    /// Fail unless this engine's context is current on the calling thread
    pub fn ensure_current(&self) -> EngineResult<()> {
        if CURRENT_CONTEXT.with(Cell::get) == Some(self.context) {
            Ok(())
        } else {
            Err(EngineError::NoCurrentContext)
        }
    }

    /// The global object
    pub fn global_object(&self) -> EngineValue {
        EngineValue::from_bits(GLOBAL)
    }

    /// Number of values on the heap, including the preallocated ones
    pub fn live_values(&self) -> usize {
        self.heap.lock().len()
    }

    /// Reclaim `value` as the garbage collector would.
    ///
    /// Runs the value's finalizer, if any, after the heap lock is released.
    /// Does not require the context to be current.
    pub fn collect(&self, value: EngineValue) -> EngineResult<()> {
        let handle = value.to_bits();
        if handle < FIRST_DYNAMIC {
            return Err(EngineError::Operation(format!(
                "{:?} is permanent and cannot be collected",
                value
            )));
        }

        let removed = self
            .heap
            .lock()
            .remove(&handle)
            .ok_or(EngineError::InvalidValue(value))?;
        trace!(?value, "collected engine value");

        if let HeapValue::Object(ObjectData {
            external,
            finalizer: Some(finalizer),
            ..
        }) = removed
        {
            finalizer(value, external);
        }
        Ok(())
    }

    fn alloc(&self, value: HeapValue) -> EngineResult<EngineValue> {
        self.ensure_current()?;
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.heap.lock().insert(handle, value);
        Ok(EngineValue::from_bits(handle))
    }

    /// Run `f` on a live heap value with the context current
    fn read<T>(
        &self,
        value: EngineValue,
        f: impl FnOnce(&HeapValue) -> EngineResult<T>,
    ) -> EngineResult<T> {
        self.ensure_current()?;
        let heap = self.heap.lock();
        let slot = heap
            .get(&value.to_bits())
            .ok_or(EngineError::InvalidValue(value))?;
        f(slot)
    }

    fn write<T>(
        &self,
        value: EngineValue,
        f: impl FnOnce(&mut HeapValue) -> EngineResult<T>,
    ) -> EngineResult<T> {
        self.ensure_current()?;
        let mut heap = self.heap.lock();
        let slot = heap
            .get_mut(&value.to_bits())
            .ok_or(EngineError::InvalidValue(value))?;
        f(slot)
    }

    fn check_live(&self, value: EngineValue) -> EngineResult<()> {
        self.read(value, |_| Ok(()))
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a property read
enum Property {
    Stored(EngineValue),
    /// Array `length`, synthesized on read
    ArrayLength(usize),
}

fn mismatch(expected: ValueType, found: &HeapValue) -> EngineError {
    EngineError::TypeMismatch {
        expected,
        found: found.value_type(),
    }
}

impl ScriptEngine for MemoryEngine {
    fn current_context(&self) -> Option<ContextId> {
        CURRENT_CONTEXT.with(Cell::get)
    }

    fn set_current_context(&self, context: Option<ContextId>) -> EngineResult<()> {
        CURRENT_CONTEXT.with(|current| current.set(context));
        self.switches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn create_undefined(&self) -> EngineResult<EngineValue> {
        self.ensure_current()?;
        Ok(EngineValue::from_bits(UNDEFINED))
    }

    fn create_null(&self) -> EngineResult<EngineValue> {
        self.ensure_current()?;
        Ok(EngineValue::from_bits(NULL))
    }

    fn create_bool(&self, value: bool) -> EngineResult<EngineValue> {
        self.alloc(HeapValue::Bool(value))
    }

    fn create_number(&self, value: f64) -> EngineResult<EngineValue> {
        self.alloc(HeapValue::Number(value))
    }

    fn create_string(&self, value: &str) -> EngineResult<EngineValue> {
        self.alloc(HeapValue::String(value.to_string()))
    }

    fn create_object(&self) -> EngineResult<EngineValue> {
        self.alloc(HeapValue::Object(ObjectData::new(ObjectKind::Plain)))
    }

    fn create_array(&self, len: u32) -> EngineResult<EngineValue> {
        let mut array = ObjectData::new(ObjectKind::Array);
        array.elements = vec![EngineValue::from_bits(UNDEFINED); len as usize];
        self.alloc(HeapValue::Object(array))
    }

    fn create_error(&self, message: EngineValue) -> EngineResult<EngineValue> {
        self.check_live(message)?;
        let mut error = ObjectData::new(ObjectKind::Error);
        error.properties.insert("message".to_string(), message);
        self.alloc(HeapValue::Object(error))
    }

    fn create_external_object(
        &self,
        data: ExternalData,
        finalizer: Option<Finalizer>,
    ) -> EngineResult<EngineValue> {
        let mut object = ObjectData::new(ObjectKind::External);
        object.external = data;
        object.finalizer = finalizer;
        self.alloc(HeapValue::Object(object))
    }

    fn value_type(&self, value: EngineValue) -> EngineResult<ValueType> {
        self.read(value, |slot| Ok(slot.value_type()))
    }

    fn read_bool(&self, value: EngineValue) -> EngineResult<bool> {
        self.read(value, |slot| match slot {
            HeapValue::Bool(b) => Ok(*b),
            other => Err(mismatch(ValueType::Boolean, other)),
        })
    }

    fn read_number(&self, value: EngineValue) -> EngineResult<f64> {
        self.read(value, |slot| match slot {
            HeapValue::Number(n) => Ok(*n),
            other => Err(mismatch(ValueType::Number, other)),
        })
    }

    fn read_string(&self, value: EngineValue) -> EngineResult<String> {
        self.read(value, |slot| match slot {
            HeapValue::String(s) => Ok(s.clone()),
            other => Err(mismatch(ValueType::String, other)),
        })
    }

    fn get_property(&self, object: EngineValue, name: &str) -> EngineResult<EngineValue> {
        let found = self.read(object, |slot| match slot {
            HeapValue::Object(data) if data.kind == ObjectKind::Array && name == "length" => {
                Ok(Property::ArrayLength(data.elements.len()))
            }
            HeapValue::Object(data) => Ok(Property::Stored(
                data.properties
                    .get(name)
                    .copied()
                    .unwrap_or(EngineValue::from_bits(UNDEFINED)),
            )),
            other => Err(mismatch(ValueType::Object, other)),
        })?;
        match found {
            Property::Stored(value) => Ok(value),
            // allocated after the heap lock drops
            Property::ArrayLength(len) => self.create_number(len as f64),
        }
    }

    fn set_property(
        &self,
        object: EngineValue,
        name: &str,
        value: EngineValue,
    ) -> EngineResult<()> {
        self.check_live(value)?;
        self.write(object, |slot| match slot {
            HeapValue::Object(data) => {
                data.properties.insert(name.to_string(), value);
                Ok(())
            }
            other => Err(mismatch(ValueType::Object, other)),
        })
    }

    fn get_indexed(&self, object: EngineValue, index: u32) -> EngineResult<EngineValue> {
        self.read(object, |slot| match slot {
            HeapValue::Object(data) => Ok(data
                .elements
                .get(index as usize)
                .copied()
                .unwrap_or(EngineValue::from_bits(UNDEFINED))),
            other => Err(mismatch(ValueType::Object, other)),
        })
    }

    fn set_indexed(&self, object: EngineValue, index: u32, value: EngineValue) -> EngineResult<()> {
        self.check_live(value)?;
        self.write(object, |slot| match slot {
            HeapValue::Object(data) => {
                let index = index as usize;
                if index >= data.elements.len() {
                    data.elements
                        .resize(index + 1, EngineValue::from_bits(UNDEFINED));
                }
                data.elements[index] = value;
                Ok(())
            }
            other => Err(mismatch(ValueType::Object, other)),
        })
    }

    fn external_data(&self, value: EngineValue) -> EngineResult<ExternalData> {
        self.read(value, |slot| match slot {
            HeapValue::Object(data) => Ok(data.external),
            _ => Ok(ExternalData::None),
        })
    }

    fn set_external_data(&self, value: EngineValue, data: ExternalData) -> EngineResult<()> {
        self.write(value, |slot| match slot {
            HeapValue::Object(object) if object.kind == ObjectKind::External => {
                object.external = data;
                Ok(())
            }
            _ => Err(EngineError::Operation(format!(
                "{:?} is not an external object",
                value
            ))),
        })
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("context", &self.context)
            .field("live_values", &self.live_values())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tether_sdk::PinToken;

    fn entered() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine.set_current_context(Some(engine.context_id())).unwrap();
        engine
    }

    #[test]
    fn test_requires_current_context() {
        let engine = MemoryEngine::new();
        assert_eq!(engine.create_number(1.0), Err(EngineError::NoCurrentContext));

        engine.set_current_context(Some(ContextId::new())).unwrap();
        assert_eq!(engine.create_object(), Err(EngineError::NoCurrentContext));
        engine.set_current_context(None).unwrap();
    }

    #[test]
    fn test_values_and_types() {
        let engine = entered();
        let n = engine.create_number(2.5).unwrap();
        let s = engine.create_string("hi").unwrap();
        let u = engine.create_undefined().unwrap();

        assert_eq!(engine.value_type(n).unwrap(), ValueType::Number);
        assert_eq!(engine.read_number(n).unwrap(), 2.5);
        assert_eq!(engine.read_string(s).unwrap(), "hi");
        assert_eq!(engine.value_type(u).unwrap(), ValueType::Undefined);
        assert_eq!(
            engine.read_bool(n),
            Err(EngineError::TypeMismatch {
                expected: ValueType::Boolean,
                found: ValueType::Number,
            })
        );
        engine.set_current_context(None).unwrap();
    }

    #[test]
    fn test_array_length_property() {
        let engine = entered();
        let array = engine.create_array(2).unwrap();
        let one = engine.create_number(1.0).unwrap();
        engine.set_indexed(array, 3, one).unwrap();

        let len = engine.get_property(array, "length").unwrap();
        assert_eq!(engine.read_number(len).unwrap(), 4.0);
        let hole = engine.get_indexed(array, 1).unwrap();
        assert_eq!(engine.value_type(hole).unwrap(), ValueType::Undefined);

        // only arrays synthesize a length; other objects read what was stored
        let object = engine.create_object().unwrap();
        let missing = engine.get_property(object, "length").unwrap();
        assert_eq!(engine.value_type(missing).unwrap(), ValueType::Undefined);
        engine.set_property(object, "length", one).unwrap();
        assert_eq!(engine.get_property(object, "length").unwrap(), one);
        engine.set_current_context(None).unwrap();
    }

    #[test]
    fn test_collect_runs_finalizer_once() {
        let engine = entered();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let finalizer: Finalizer = Arc::new(move |_, data| {
            assert_eq!(data, ExternalData::Pinned(PinToken::from_u64(9)));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let value = engine.create_external_object(ExternalData::None, Some(finalizer)).unwrap();
        engine
            .set_external_data(value, ExternalData::Pinned(PinToken::from_u64(9)))
            .unwrap();

        engine.collect(value).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.collect(value), Err(EngineError::InvalidValue(value)));
        assert_eq!(engine.value_type(value), Err(EngineError::InvalidValue(value)));
        engine.set_current_context(None).unwrap();
    }

    #[test]
    fn test_external_data_only_on_external_objects() {
        let engine = entered();
        let plain = engine.create_object().unwrap();
        assert_eq!(engine.external_data(plain).unwrap(), ExternalData::None);
        assert!(!engine.has_external_data(plain).unwrap());
        assert!(engine
            .set_external_data(plain, ExternalData::Pinned(PinToken::from_u64(1)))
            .is_err());
        engine.set_current_context(None).unwrap();
    }
}
