//! Proxy converters
//!
//! A proxy exposes a host object (`Arc<T>`) to script as an opaque external
//! object. The engine value carries only a pin token; the object itself stays
//! in the bridge's pin arena until the engine collects the value.
//!
//! Identity is preserved: a host object that is already pinned converts to
//! the engine value it was first given, and converting that value back yields
//! the same `Arc`.

use std::any::type_name;
use std::sync::Arc;

use tether_sdk::{EngineValue, ExternalData, PinToken};
use tracing::{debug, warn};

use crate::bridge::Scope;
use crate::convert::object::ObjectView;
use crate::error::{BridgeError, BridgeResult};
use crate::lifetime::PinnedObject;
use crate::registry::ConverterRegistry;

/// Binding setup run once per host object when its proxy is created
pub type BindingFn<T> = Arc<dyn Fn(&ObjectView<'_>, &Arc<T>) -> BridgeResult<()> + Send + Sync>;

/// Identity key of a host object: the address of its allocation
fn identity_of<T>(object: &Arc<T>) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

/// Create (or reuse) the proxy for `object`
pub fn proxy_to_engine<T: Send + Sync + 'static>(
    scope: &Scope<'_>,
    object: &Arc<T>,
    binding: Option<&BindingFn<T>>,
) -> BridgeResult<EngineValue> {
    let identity = identity_of(object);
    if let Some(existing) = scope.pins().lookup(identity) {
        return Ok(existing.value());
    }

    let engine = scope.engine();
    let value =
        engine.create_external_object(ExternalData::None, Some(scope.pins().finalizer()))?;
    let pinned: PinnedObject = Arc::clone(object) as PinnedObject;
    let handle = scope.pins().pin(pinned, value, Some(identity));

    if let Err(err) = engine.set_external_data(value, ExternalData::Pinned(handle.token())) {
        scope.pins().release(handle.token());
        return Err(err.into());
    }
    debug!(type_name = type_name::<T>(), token = %handle.token(), "created proxy");

    if let Some(setup) = binding {
        if let Err(err) = setup(&ObjectView::new(scope, value), object) {
            // unbound proxies are never reused; the next conversion starts over
            unpin(scope, value, handle.token());
            return Err(err);
        }
    }
    Ok(value)
}

/// Detach a half-built proxy from its host object
fn unpin(scope: &Scope<'_>, value: EngineValue, token: PinToken) {
    if let Err(err) = scope.engine().set_external_data(value, ExternalData::None) {
        warn!(%token, ?value, %err, "failed to clear external data of unbound proxy");
    }
    scope.pins().release(token);
}

/// Resolve the host object behind a proxy value
pub fn proxy_from_engine<T: Send + Sync + 'static>(
    scope: &Scope<'_>,
    value: EngineValue,
) -> BridgeResult<Arc<T>> {
    let token = match scope.engine().external_data(value)? {
        ExternalData::Pinned(token) => token,
        ExternalData::None => return Err(BridgeError::NotAProxy),
    };
    let object = scope
        .pins()
        .resolve(token)
        .ok_or(BridgeError::ReleasedPin(token))?;
    object
        .downcast::<T>()
        .map_err(|_| BridgeError::conversion(type_name::<T>(), "proxy of another host type"))
}

/// Register `Arc<T>` as a proxy type
pub fn register_proxy<T: Send + Sync + 'static>(
    registry: &ConverterRegistry,
    binding: Option<BindingFn<T>>,
) {
    registry.register::<Arc<T>>(
        move |scope, object| proxy_to_engine(scope, object, binding.as_ref()),
        proxy_from_engine::<T>,
        false,
    );
}
