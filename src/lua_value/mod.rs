//! The tagged value model shared by the VM, compiler and standard library.
//!
//! See `spec.md` §3 ("Value", "Cell", "Closure", "Table", "Coroutine") for
//! the contract this module implements.

mod closure;
mod coroutine;
mod table;
mod value;

pub use closure::{Cell, Closure};
pub use coroutine::{Coroutine, CoroutineStatus};
pub use table::LuaTable;
pub use value::LuaValue;
