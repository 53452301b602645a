//! Lifetime synchronizer
//!
//! Keeps host objects alive for as long as the engine can still reach them.
//! Pinning stores a strong reference in the arena and gives the engine a
//! `PinToken` to keep in the value's external-data slot. When the engine
//! collects that value its finalizer hands the token back and the arena
//! drops the strong reference.
//!
//! A pin that the engine never finalizes (process teardown without a clean
//! engine shutdown) stays in the arena until the process exits.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tether_sdk::{EngineValue, ExternalData, Finalizer, PinToken};
use tracing::{debug, warn};

/// Strongly held host object
pub type PinnedObject = Arc<dyn Any + Send + Sync>;

/// Association between a pinned host object and its engine value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinHandle {
    token: PinToken,
    value: EngineValue,
}

impl PinHandle {
    /// Token stored in the engine value's external-data slot
    pub fn token(&self) -> PinToken {
        self.token
    }

    /// Engine value the pin is attached to
    pub fn value(&self) -> EngineValue {
        self.value
    }
}

struct PinSlot {
    object: PinnedObject,
    value: EngineValue,
    identity: Option<usize>,
}

#[derive(Default)]
struct ArenaState {
    slots: FxHashMap<PinToken, PinSlot>,
    /// Host object address -> token, for proxies whose identity is tracked
    by_identity: FxHashMap<usize, PinToken>,
}

/// Pin counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinStats {
    /// Pins currently held
    pub live: usize,
    /// Pins created since the arena was built
    pub pinned: u64,
    /// Pins released since the arena was built
    pub released: u64,
}

/// Arena mapping pin tokens to host objects.
pub struct PinArena {
    state: Mutex<ArenaState>,
    next_token: AtomicU64,
    released: AtomicU64,
}

impl PinArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ArenaState::default()),
            next_token: AtomicU64::new(1),
            released: AtomicU64::new(0),
        }
    }

    /// Pin `object` to `value`.
    ///
    /// With `identity` set, later `lookup(identity)` calls find this pin until
    /// it is released.
    pub fn pin(
        &self,
        object: PinnedObject,
        value: EngineValue,
        identity: Option<usize>,
    ) -> PinHandle {
        let token = PinToken::from_u64(self.next_token.fetch_add(1, Ordering::Relaxed));
        let mut state = self.state.lock();
        if let Some(identity) = identity {
            state.by_identity.insert(identity, token);
        }
        state.slots.insert(
            token,
            PinSlot {
                object,
                value,
                identity,
            },
        );
        debug!(%token, ?value, "pinned host object");
        PinHandle { token, value }
    }

    /// Find the live pin for a host object identity
    pub fn lookup(&self, identity: usize) -> Option<PinHandle> {
        let state = self.state.lock();
        let token = *state.by_identity.get(&identity)?;
        state.slots.get(&token).map(|slot| PinHandle {
            token,
            value: slot.value,
        })
    }

    /// Get the host object behind a token
    pub fn resolve(&self, token: PinToken) -> Option<PinnedObject> {
        self.state
            .lock()
            .slots
            .get(&token)
            .map(|slot| Arc::clone(&slot.object))
    }

    /// Release a pin.
    ///
    /// Returns `false` if the token was not pinned; a pin is never released
    /// twice.
    pub fn release(&self, token: PinToken) -> bool {
        let slot = {
            let mut state = self.state.lock();
            let Some(slot) = state.slots.remove(&token) else {
                return false;
            };
            if let Some(identity) = slot.identity {
                if state.by_identity.get(&identity) == Some(&token) {
                    state.by_identity.remove(&identity);
                }
            }
            slot
        };
        self.released.fetch_add(1, Ordering::Relaxed);
        debug!(%token, value = ?slot.value, "released host object pin");
        // host object drops here, outside the lock
        drop(slot);
        true
    }

    /// Engine finalization callback: `value` has been collected.
    pub fn on_engine_value_collected(&self, value: EngineValue, data: ExternalData) {
        let Some(token) = data.token() else {
            return;
        };

        let owner = self.state.lock().slots.get(&token).map(|slot| slot.value);
        match owner {
            Some(pinned) if pinned == value => {
                self.release(token);
            }
            Some(pinned) => {
                warn!(%token, ?value, ?pinned, "finalizer value does not own pin, ignoring");
            }
            None => {
                warn!(%token, ?value, "finalizer for an already released pin");
            }
        }
    }

    /// Build the finalizer to hand to the engine.
    ///
    /// The finalizer holds the arena weakly so the engine does not keep it
    /// alive; after the arena is gone it does nothing.
    pub fn finalizer(self: &Arc<Self>) -> Finalizer {
        let arena: Weak<PinArena> = Arc::downgrade(self);
        Arc::new(move |value, data| {
            if let Some(arena) = arena.upgrade() {
                arena.on_engine_value_collected(value, data);
            }
        })
    }

    /// Check whether a token is pinned
    pub fn is_pinned(&self, token: PinToken) -> bool {
        self.state.lock().slots.contains_key(&token)
    }

    /// Number of live pins
    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Check if there are no live pins
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the pin counters
    pub fn stats(&self) -> PinStats {
        PinStats {
            live: self.len(),
            pinned: self.next_token.load(Ordering::Relaxed) - 1,
            released: self.released.load(Ordering::Relaxed),
        }
    }
}

impl Default for PinArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(bits: u64) -> EngineValue {
        EngineValue::from_bits(bits)
    }

    #[test]
    fn test_pin_and_resolve() {
        let arena = PinArena::new();
        let object = Arc::new(String::from("host"));
        let handle = arena.pin(object.clone(), value(10), None);

        assert!(arena.is_pinned(handle.token()));
        assert_eq!(handle.value(), value(10));

        let resolved = arena.resolve(handle.token()).unwrap();
        let resolved = resolved.downcast::<String>().unwrap();
        assert!(Arc::ptr_eq(&resolved, &object));
    }

    #[test]
    fn test_release_drops_strong_reference() {
        let arena = PinArena::new();
        let object = Arc::new(5u32);
        let handle = arena.pin(object.clone(), value(1), None);
        assert_eq!(Arc::strong_count(&object), 2);

        assert!(arena.release(handle.token()));
        assert_eq!(Arc::strong_count(&object), 1);
        assert!(!arena.is_pinned(handle.token()));
    }

    #[test]
    fn test_double_release_is_rejected() {
        let arena = PinArena::new();
        let handle = arena.pin(Arc::new(()), value(1), None);

        assert!(arena.release(handle.token()));
        assert!(!arena.release(handle.token()));
        assert_eq!(arena.stats().released, 1);
    }

    #[test]
    fn test_identity_lookup_cleared_on_release() {
        let arena = PinArena::new();
        let handle = arena.pin(Arc::new(1u8), value(7), Some(0xbeef));

        assert_eq!(arena.lookup(0xbeef), Some(handle));
        arena.release(handle.token());
        assert_eq!(arena.lookup(0xbeef), None);
    }

    #[test]
    fn test_collection_callback_requires_matching_value() {
        let arena = Arc::new(PinArena::new());
        let handle = arena.pin(Arc::new(1u8), value(7), None);
        let finalize = arena.finalizer();

        finalize(value(8), ExternalData::Pinned(handle.token()));
        assert!(arena.is_pinned(handle.token()));

        finalize(value(7), ExternalData::Pinned(handle.token()));
        assert!(!arena.is_pinned(handle.token()));

        // repeated callback is a no-op
        finalize(value(7), ExternalData::Pinned(handle.token()));
        assert_eq!(arena.stats().released, 1);
    }

    #[test]
    fn test_finalizer_outlives_arena() {
        let arena = Arc::new(PinArena::new());
        let handle = arena.pin(Arc::new(1u8), value(7), None);
        let finalize = arena.finalizer();
        drop(arena);

        finalize(value(7), ExternalData::Pinned(handle.token()));
    }

    #[test]
    fn test_stats() {
        let arena = PinArena::new();
        let a = arena.pin(Arc::new(1u8), value(1), None);
        let _b = arena.pin(Arc::new(2u8), value(2), None);
        arena.release(a.token());

        assert_eq!(
            arena.stats(),
            PinStats {
                live: 1,
                pinned: 2,
                released: 1,
            }
        );
    }
}
