//! Execution context guard
//!
//! The engine only accepts calls while its context is current on the calling
//! thread. `ExecutionContext` owns that context and hands out exclusive,
//! re-entrant access to it:
//!
//! - The first entry on a thread claims the ownership token, saves whatever
//!   context was current and switches to ours (skipped if already current).
//! - Nested entries on the owning thread only bump a depth counter.
//! - Entry from any other thread while the token is held fails fast with
//!   `BridgeError::ContextBusy`.
//! - Leaving the outermost entry restores the saved context, on success,
//!   error and panic alike.

use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tether_sdk::{ContextId, ScriptEngine};
use tracing::{trace, warn};

use crate::error::{BridgeError, BridgeResult};

/// Ownership state of the context
#[derive(Debug, Default)]
struct Ownership {
    /// Thread holding the token
    thread: Option<ThreadId>,
    /// Nesting depth on the owning thread
    depth: usize,
    /// Context that was current before the outermost entry
    previous: Option<ContextId>,
    /// Whether the outermost entry switched contexts
    switched: bool,
}

/// An engine context with exclusive, re-entrant entry.
pub struct ExecutionContext {
    engine: Arc<dyn ScriptEngine>,
    id: ContextId,
    owner: Mutex<Ownership>,
}

impl ExecutionContext {
    /// Wrap the context `id` of `engine`
    pub fn new(engine: Arc<dyn ScriptEngine>, id: ContextId) -> Self {
        Self {
            engine,
            id,
            owner: Mutex::new(Ownership::default()),
        }
    }

    /// Get the context ID
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Get the engine this context belongs to
    pub fn engine(&self) -> &Arc<dyn ScriptEngine> {
        &self.engine
    }

    /// Run `f` with this context current on the calling thread.
    ///
    /// Nested calls on the same thread reuse the outer entry.
    pub fn with_context<T>(
        &self,
        f: impl FnOnce(&Entered<'_>) -> BridgeResult<T>,
    ) -> BridgeResult<T> {
        let entered = self.enter()?;
        f(&entered)
    }

    /// Check whether the calling thread currently holds the context
    pub fn is_held_by_current_thread(&self) -> bool {
        self.owner.lock().thread == Some(thread::current().id())
    }

    /// Check whether any thread holds the context
    pub fn is_held(&self) -> bool {
        self.owner.lock().thread.is_some()
    }

    fn enter(&self) -> BridgeResult<Entered<'_>> {
        let me = thread::current().id();
        let mut owner = self.owner.lock();

        match owner.thread {
            Some(thread) if thread == me => {
                owner.depth += 1;
                return Ok(Entered::new(self));
            }
            Some(_) => return Err(BridgeError::ContextBusy),
            None => {}
        }

        let previous = self.engine.current_context();
        let switched = previous != Some(self.id);
        if switched {
            self.engine.set_current_context(Some(self.id))?;
            trace!(context = self.id.as_u64(), ?previous, "entered engine context");
        }

        owner.thread = Some(me);
        owner.depth = 1;
        owner.previous = previous;
        owner.switched = switched;
        Ok(Entered::new(self))
    }

    fn leave(&self) {
        let mut owner = self.owner.lock();
        owner.depth -= 1;
        if owner.depth > 0 {
            return;
        }

        if owner.switched {
            if let Err(err) = self.engine.set_current_context(owner.previous) {
                warn!(
                    context = self.id.as_u64(),
                    %err,
                    "failed to restore previous engine context"
                );
            } else {
                trace!(
                    context = self.id.as_u64(),
                    previous = ?owner.previous,
                    "left engine context"
                );
            }
        }

        *owner = Ownership::default();
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("owner", &*self.owner.lock())
            .finish()
    }
}

/// Proof that the context is current on this thread.
///
/// Leaving scope releases one level of nesting. Not `Send`: the entry belongs
/// to the thread that made it.
pub struct Entered<'a> {
    context: &'a ExecutionContext,
    _not_send: PhantomData<*const ()>,
}

impl<'a> Entered<'a> {
    fn new(context: &'a ExecutionContext) -> Self {
        Self {
            context,
            _not_send: PhantomData,
        }
    }

    /// Engine whose context is current
    pub fn engine(&self) -> &'a dyn ScriptEngine {
        &*self.context.engine
    }

    /// The entered context
    pub fn context(&self) -> &'a ExecutionContext {
        self.context
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        self.context.leave();
    }
}
