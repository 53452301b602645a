//! Error converter
//!
//! A host error thrown into script becomes an engine error object whose
//! message is the host error's text. The host error itself rides along as a
//! pinned proxy under the reserved exception property, so when the script
//! error comes back out the original host error can be rethrown unchanged.

use std::sync::Arc;

use tether_sdk::{EngineError, EngineValue, ExternalData, ValueType};
use tracing::debug;

use crate::bridge::Scope;
use crate::error::{BridgeError, BridgeResult, HostError};
use crate::lifetime::PinnedObject;
use crate::registry::ConverterRegistry;

/// Build an engine error that carries `error`
pub fn to_engine_error(scope: &Scope<'_>, error: &HostError) -> BridgeResult<EngineValue> {
    let engine = scope.engine();
    let message = engine.create_string(&error.to_string())?;
    let error_value = engine.create_error(message)?;

    let wrapper =
        engine.create_external_object(ExternalData::None, Some(scope.pins().finalizer()))?;
    let pinned: PinnedObject = Arc::new(Arc::clone(error));
    let handle = scope.pins().pin(pinned, wrapper, None);
    if let Err(err) = engine.set_external_data(wrapper, ExternalData::Pinned(handle.token())) {
        scope.pins().release(handle.token());
        return Err(err.into());
    }

    engine.set_property(error_value, &scope.options().exception_property, wrapper)?;
    debug!(token = %handle.token(), "attached host error to engine error");
    Ok(error_value)
}

/// Get the host error attached to an engine error value, if any
pub fn recover_host_error(
    scope: &Scope<'_>,
    value: EngineValue,
) -> BridgeResult<Option<HostError>> {
    let engine = scope.engine();
    match engine.value_type(value)? {
        ValueType::Error | ValueType::Object => {}
        _ => return Ok(None),
    }

    let wrapper = engine.get_property(value, &scope.options().exception_property)?;
    let Some(token) = engine.external_data(wrapper)?.token() else {
        return Ok(None);
    };
    let object = scope
        .pins()
        .resolve(token)
        .ok_or(BridgeError::ReleasedPin(token))?;
    Ok(object
        .downcast::<HostError>()
        .ok()
        .map(|error| Arc::clone(&*error)))
}

/// Turn an engine error value into a `BridgeError`
pub fn error_from_engine(scope: &Scope<'_>, value: EngineValue) -> BridgeError {
    match recover_host_error(scope, value) {
        Ok(Some(error)) => BridgeError::Host(error),
        Ok(None) => match script_message(scope, value) {
            Ok(message) => BridgeError::Engine(EngineError::Script { message }),
            Err(err) => err,
        },
        Err(err) => err,
    }
}

fn script_message(scope: &Scope<'_>, value: EngineValue) -> BridgeResult<String> {
    let engine = scope.engine();
    let message = match engine.value_type(value)? {
        ValueType::Error | ValueType::Object => engine.get_property(value, "message")?,
        _ => value,
    };
    match engine.value_type(message)? {
        ValueType::String => Ok(engine.read_string(message)?),
        other => Ok(other.name().to_string()),
    }
}

/// Register the `HostError` converter.
///
/// Reading a `HostError` back requires an error value built by
/// `to_engine_error`; anything else is `NotAProxy`.
pub fn register_host_error(registry: &ConverterRegistry) {
    registry.register::<HostError>(
        to_engine_error,
        |scope, value| recover_host_error(scope, value)?.ok_or(BridgeError::NotAProxy),
        false,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Bridge;
    use crate::engine::MemoryEngine;

    #[derive(Debug, thiserror::Error)]
    #[error("disk full")]
    struct DiskFull;

    fn setup() -> (Arc<MemoryEngine>, Bridge) {
        let engine = Arc::new(MemoryEngine::new());
        let id = engine.context_id();
        let bridge = Bridge::new(engine.clone(), id);
        (engine, bridge)
    }

    #[test]
    fn test_host_error_survives_round_trip() {
        let (_engine, bridge) = setup();
        let error: HostError = Arc::new(DiskFull);

        let value = bridge.to_engine_error(&error).unwrap();
        let recovered = bridge.recover_host_error(value).unwrap().unwrap();
        assert!(Arc::ptr_eq(&recovered, &error));
    }

    #[test]
    fn test_engine_error_message_is_host_text() {
        let (_engine, bridge) = setup();
        let error: HostError = Arc::new(DiskFull);
        let value = bridge.to_engine_error(&error).unwrap();

        let message = bridge
            .with_context(|scope| {
                let raw = scope.engine().get_property(value, "message")?;
                scope.from_engine::<String>(raw)
            })
            .unwrap();
        assert_eq!(message, "disk full");
    }

    #[test]
    fn test_error_from_engine_prefers_host_error() {
        let (_engine, bridge) = setup();
        let error: HostError = Arc::new(DiskFull);
        let value = bridge.to_engine_error(&error).unwrap();

        match bridge.error_from_engine(value) {
            BridgeError::Host(host) => assert_eq!(host.to_string(), "disk full"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_script_error_without_host_error() {
        let (_engine, bridge) = setup();
        let value = bridge
            .with_context(|scope| {
                let message = scope.engine().create_string("bad input")?;
                Ok(scope.engine().create_error(message)?)
            })
            .unwrap();

        assert!(bridge.recover_host_error(value).unwrap().is_none());
        match bridge.error_from_engine(value) {
            BridgeError::Engine(EngineError::Script { message }) => {
                assert_eq!(message, "bad input")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_host_error_converter() {
        let (_engine, bridge) = setup();
        let error: HostError = Arc::new(DiskFull);
        let value = bridge.to_engine_value(&error).unwrap();
        let back: HostError = bridge.from_engine_value(value).unwrap();
        assert!(Arc::ptr_eq(&back, &error));

        let plain = bridge.to_engine_value(&1i32).unwrap();
        assert!(matches!(
            bridge.from_engine_value::<HostError>(plain),
            Err(BridgeError::NotAProxy)
        ));
    }
}
