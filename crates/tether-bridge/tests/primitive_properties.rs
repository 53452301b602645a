//! Property tests for primitive conversions

use std::sync::Arc;

use proptest::prelude::*;
use tether_bridge::convert::MAX_SAFE_INTEGER;
use tether_bridge::{Bridge, BridgeError, MemoryEngine};

fn bridge() -> Bridge {
    let engine = Arc::new(MemoryEngine::new());
    let id = engine.context_id();
    Bridge::new(engine, id)
}

fn round_trip<T: 'static>(bridge: &Bridge, value: &T) -> Result<T, BridgeError> {
    let engine_value = bridge.to_engine_value(value)?;
    bridge.from_engine_value(engine_value)
}

proptest! {
    #[test]
    fn string_round_trip(s in ".*") {
        let bridge = bridge();
        prop_assert_eq!(round_trip(&bridge, &s).unwrap(), s);
    }

    #[test]
    fn i32_round_trip(n in any::<i32>()) {
        let bridge = bridge();
        prop_assert_eq!(round_trip(&bridge, &n).unwrap(), n);
    }

    #[test]
    fn u32_round_trip(n in any::<u32>()) {
        let bridge = bridge();
        prop_assert_eq!(round_trip(&bridge, &n).unwrap(), n);
    }

    #[test]
    fn safe_i64_round_trip(n in -MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER) {
        let bridge = bridge();
        prop_assert_eq!(round_trip(&bridge, &n).unwrap(), n);
    }

    #[test]
    fn unsafe_i64_rejected(n in (MAX_SAFE_INTEGER + 1)..=i64::MAX) {
        let bridge = bridge();
        let too_small = bridge.to_engine_value(&-n);
        let too_big = bridge.to_engine_value(&n);
        prop_assert!(matches!(too_big, Err(BridgeError::Conversion { .. })), "expected Conversion error");
        prop_assert!(matches!(too_small, Err(BridgeError::Conversion { .. })), "expected Conversion error");
    }

    #[test]
    fn f64_round_trip_is_bit_exact(
        n in any::<f64>().prop_filter("NaN payloads differ", |n| !n.is_nan())
    ) {
        let bridge = bridge();
        prop_assert_eq!(round_trip(&bridge, &n).unwrap().to_bits(), n.to_bits());
    }

    #[test]
    fn f32_round_trip(n in any::<f32>().prop_filter("NaN compares unequal", |n| !n.is_nan())) {
        let bridge = bridge();
        prop_assert_eq!(round_trip(&bridge, &n).unwrap(), n);
    }

    #[test]
    fn fractional_numbers_are_not_integers(n in -1.0e6f64..1.0e6, frac in 0.01f64..0.99) {
        let bridge = bridge();
        let value = bridge.to_engine_value(&(n.trunc() + frac.copysign(n))).unwrap();
        prop_assert!(bridge.from_engine_value::<i32>(value).is_err());
        prop_assert!(bridge.from_engine_value::<i64>(value).is_err());
    }

    #[test]
    fn numbers_outside_u8_rejected(n in 256u32..=u32::MAX) {
        let bridge = bridge();
        let value = bridge.to_engine_value(&n).unwrap();
        prop_assert!(matches!(
            bridge.from_engine_value::<u8>(value),
            Err(BridgeError::Conversion { .. })
        ), "expected Conversion error");
    }
}
