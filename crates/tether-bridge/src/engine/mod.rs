//! Reference engine
//!
//! A deterministic, in-process implementation of the SDK traits, used by the
//! test suites and by hosts that need an engine double.

mod debugger;
mod memory;

pub use debugger::{MemoryDebugger, ATTRIBUTE_HAVE_CHILDREN};
pub use memory::MemoryEngine;
