//! Array converters
//!
//! `Vec<T>` maps to an engine array. Reading copies every element into a new
//! host vector in one context entry, so later access needs no engine context
//! and host mutations never reach the engine array.

use std::any::type_name;

use tether_sdk::ValueType;

use crate::convert::primitive::{expect_type, read_integer};
use crate::error::{BridgeError, BridgeResult};
use crate::registry::ConverterRegistry;

/// Register `Vec<T>` as an engine array of `T`.
///
/// `T` needs its own converter by the time a `Vec<T>` is converted.
pub fn register_array<T: 'static>(registry: &ConverterRegistry) {
    registry.register::<Vec<T>>(
        |scope, items| {
            // resolve the element converter before allocating anything
            let element = scope.bridge().registry().get::<T>()?;
            let len = u32::try_from(items.len()).map_err(|_| {
                BridgeError::conversion("at most u32::MAX elements", items.len().to_string())
            })?;

            let engine = scope.engine();
            let array = engine.create_array(len)?;
            for (index, item) in (0..len).zip(items) {
                let value = element.to_engine(scope, item)?;
                engine.set_indexed(array, index, value)?;
            }
            Ok(array)
        },
        |scope, value| {
            let element = scope.bridge().registry().get::<T>()?;
            expect_type(scope, value, ValueType::Array, type_name::<Vec<T>>())?;

            let engine = scope.engine();
            let length = engine.get_property(value, &scope.options().length_property)?;
            // decoded here so arrays do not depend on a registered u32 converter
            let len = read_integer(scope, length, "array length", 0, u32::MAX as i64)? as u32;

            let mut items = Vec::with_capacity(len as usize);
            for index in 0..len {
                let raw = engine.get_indexed(value, index)?;
                items.push(element.from_engine(scope, raw)?);
            }
            Ok(items)
        },
        false,
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::bridge::{Bridge, BridgeOptions};
    use crate::engine::MemoryEngine;
    use crate::error::BridgeError;

    fn setup() -> (Arc<MemoryEngine>, Bridge) {
        let engine = Arc::new(MemoryEngine::new());
        let id = engine.context_id();
        let bridge = Bridge::new(engine.clone(), id);
        (engine, bridge)
    }

    #[test]
    fn test_array_round_trip_preserves_order() {
        let (_engine, bridge) = setup();
        bridge.register_array_converter::<i32>();

        let items = vec![3, 1, 2];
        let array = bridge.to_engine_value(&items).unwrap();
        let back: Vec<i32> = bridge.from_engine_value(array).unwrap();
        assert_eq!(back, items);
    }

    #[test]
    fn test_empty_array() {
        let (_engine, bridge) = setup();
        bridge.register_array_converter::<String>();

        let array = bridge.to_engine_value(&Vec::<String>::new()).unwrap();
        assert!(bridge.from_engine_value::<Vec<String>>(array).unwrap().is_empty());
    }

    #[test]
    fn test_nested_arrays() {
        let (_engine, bridge) = setup();
        bridge.register_array_converter::<u8>();
        bridge.register_array_converter::<Vec<u8>>();

        let items = vec![vec![0x00, 0xff], vec![], vec![7]];
        let array = bridge.to_engine_value(&items).unwrap();
        assert_eq!(bridge.from_engine_value::<Vec<Vec<u8>>>(array).unwrap(), items);
    }

    #[test]
    fn test_unregistered_element_allocates_nothing() {
        struct Opaque;
        let (engine, bridge) = setup();
        bridge.register_array_converter::<Opaque>();

        let live = engine.live_values();
        let result = bridge.to_engine_value(&vec![Opaque]);
        assert!(matches!(result, Err(BridgeError::UnregisteredType { .. })));
        assert_eq!(engine.live_values(), live);
    }

    #[test]
    fn test_round_trip_without_builtins() {
        let engine = Arc::new(MemoryEngine::new());
        let id = engine.context_id();
        let options = BridgeOptions {
            register_builtins: false,
            ..BridgeOptions::default()
        };
        let bridge = Bridge::with_options(engine, id, options);
        bridge.register_converter::<bool>(
            |scope, v| Ok(scope.engine().create_bool(*v)?),
            |scope, v| Ok(scope.engine().read_bool(v)?),
        );
        bridge.register_array_converter::<bool>();
        assert!(!bridge.registry().contains::<u32>());

        let array = bridge.to_engine_value(&vec![true, false]).unwrap();
        assert_eq!(bridge.from_engine_value::<Vec<bool>>(array).unwrap(), vec![true, false]);
    }

    #[test]
    fn test_non_array_rejected() {
        let (_engine, bridge) = setup();
        bridge.register_array_converter::<i32>();

        let object = bridge
            .with_context(|scope| Ok(scope.engine().create_object()?))
            .unwrap();
        assert!(matches!(
            bridge.from_engine_value::<Vec<i32>>(object),
            Err(BridgeError::Conversion { .. })
        ));
    }

    #[test]
    fn test_element_type_mismatch() {
        let (_engine, bridge) = setup();
        bridge.register_array_converter::<i32>();
        bridge.register_array_converter::<String>();

        let strings = bridge.to_engine_value(&vec!["a".to_string()]).unwrap();
        assert!(matches!(
            bridge.from_engine_value::<Vec<i32>>(strings),
            Err(BridgeError::Conversion { .. })
        ));
    }
}
