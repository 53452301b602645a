//! Primitive converters
//!
//! Engine numbers are IEEE doubles. Reads never coerce between engine types,
//! and integer targets only accept integral values inside their range:
//!
//! | Host  | Engine    | Accepted on read                         |
//! |-------|-----------|------------------------------------------|
//! | bool  | boolean   | boolean only                             |
//! | u8    | number    | integral, 0..=255                        |
//! | i32   | number    | integral, i32 range                      |
//! | u32   | number    | integral, u32 range                      |
//! | i64   | number    | integral, ±(2^53 - 1)                    |
//! | f32   | number    | NaN, ±Infinity, finite within f32 range  |
//! | f64   | number    | any, NaN and ±Infinity unchanged         |
//! | String| string    | string only                              |
//! | ()    | undefined | undefined only                           |

use tether_sdk::{EngineValue, ValueType};

use crate::bridge::Scope;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::ConverterRegistry;

/// Largest integer an engine number represents exactly
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Fail unless `value` has runtime type `expected`
pub(crate) fn expect_type(
    scope: &Scope<'_>,
    value: EngineValue,
    expected: ValueType,
    host: &str,
) -> BridgeResult<()> {
    let found = scope.engine().value_type(value)?;
    if found != expected {
        return Err(BridgeError::conversion(host, found.name()));
    }
    Ok(())
}

fn read_number(scope: &Scope<'_>, value: EngineValue, host: &str) -> BridgeResult<f64> {
    expect_type(scope, value, ValueType::Number, host)?;
    Ok(scope.engine().read_number(value)?)
}

pub(crate) fn read_integer(
    scope: &Scope<'_>,
    value: EngineValue,
    host: &str,
    min: i64,
    max: i64,
) -> BridgeResult<i64> {
    let n = read_number(scope, value, host)?;
    if !n.is_finite() || n.fract() != 0.0 || n < min as f64 || n > max as f64 {
        return Err(BridgeError::conversion(host, format!("number {}", n)));
    }
    Ok(n as i64)
}

/// Register converters for the primitive host types
pub fn register_primitives(registry: &ConverterRegistry) {
    registry.register::<bool>(
        |scope, v| Ok(scope.engine().create_bool(*v)?),
        |scope, v| {
            expect_type(scope, v, ValueType::Boolean, "bool")?;
            Ok(scope.engine().read_bool(v)?)
        },
        true,
    );

    registry.register::<u8>(
        |scope, v| Ok(scope.engine().create_number(f64::from(*v))?),
        |scope, v| Ok(read_integer(scope, v, "u8", 0, u8::MAX as i64)? as u8),
        true,
    );

    registry.register::<i32>(
        |scope, v| Ok(scope.engine().create_number(f64::from(*v))?),
        |scope, v| {
            Ok(read_integer(scope, v, "i32", i32::MIN as i64, i32::MAX as i64)? as i32)
        },
        true,
    );

    registry.register::<u32>(
        |scope, v| Ok(scope.engine().create_number(f64::from(*v))?),
        |scope, v| Ok(read_integer(scope, v, "u32", 0, u32::MAX as i64)? as u32),
        true,
    );

    registry.register::<i64>(
        |scope, v| {
            if !(-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(v) {
                return Err(BridgeError::conversion("i64 within ±(2^53 - 1)", v.to_string()));
            }
            Ok(scope.engine().create_number(*v as f64)?)
        },
        |scope, v| read_integer(scope, v, "i64", -MAX_SAFE_INTEGER, MAX_SAFE_INTEGER),
        true,
    );

    registry.register::<f32>(
        |scope, v| Ok(scope.engine().create_number(f64::from(*v))?),
        |scope, v| {
            let n = read_number(scope, v, "f32")?;
            if n.is_finite() && n.abs() > f32::MAX as f64 {
                return Err(BridgeError::conversion("f32", format!("number {}", n)));
            }
            Ok(n as f32)
        },
        true,
    );

    registry.register::<f64>(
        |scope, v| Ok(scope.engine().create_number(*v)?),
        |scope, v| read_number(scope, v, "f64"),
        true,
    );

    registry.register::<String>(
        |scope, v| Ok(scope.engine().create_string(v)?),
        |scope, v| {
            expect_type(scope, v, ValueType::String, "String")?;
            Ok(scope.engine().read_string(v)?)
        },
        true,
    );

    registry.register::<()>(
        |scope, _| Ok(scope.engine().create_undefined()?),
        |scope, v| expect_type(scope, v, ValueType::Undefined, "()"),
        true,
    );
}
