//! Value converters
//!
//! Built-in converter families for the registry:
//! - `primitive`: bool, integers, floats, strings and unit
//! - `object`: structs copied field by field
//! - `proxy`: shared host objects exposed by reference
//! - `array`: `Vec<T>` as engine arrays
//! - `error`: host errors carried through engine error values

mod array;
mod error;
mod object;
mod primitive;
mod proxy;

pub use array::register_array;
pub use error::{error_from_engine, recover_host_error, register_host_error, to_engine_error};
pub use object::{register_struct, FromEngineObject, ObjectView, ToEngineObject};
pub use primitive::{register_primitives, MAX_SAFE_INTEGER};
pub use proxy::{proxy_from_engine, proxy_to_engine, register_proxy, BindingFn};
