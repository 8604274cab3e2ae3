//! Standard library surface (spec.md §4.6): `basic`/`_G`, `coroutine`,
//! `table`, `string`, `math`, `io`, `os`, `debug`, `package`. Each module
//! installs its functions with `LuaVM::register_foreign`; this file wires
//! them into a fresh VM's globals the way the teacher's
//! `lib_registry::LibraryRegistry::load_all` wires its own
//! `LibraryModule`s, minus the macro layer since `register_foreign`
//! already gives a plain function-registration entry point.

pub mod basic;
pub mod coroutine;
pub mod debug;
pub mod io;
pub mod math;
pub mod os;
pub mod package;
pub mod string;
pub mod table;

use std::cell::RefCell;
use std::rc::Rc;

use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{LuaError, LuaVM};

pub fn open_libs(vm: &mut LuaVM) {
    basic::install(vm);

    let coroutine_tbl = new_lib_table(vm, "coroutine");
    coroutine::install(&coroutine_tbl);

    let table_tbl = new_lib_table(vm, "table");
    table::install(&table_tbl);

    let string_tbl = new_lib_table(vm, "string");
    string::install(&string_tbl);

    let math_tbl = new_lib_table(vm, "math");
    math::install(&math_tbl);

    let io_tbl = new_lib_table(vm, "io");
    io::install(&io_tbl);

    let os_tbl = new_lib_table(vm, "os");
    os::install(&os_tbl);

    let debug_tbl = new_lib_table(vm, "debug");
    debug::install(&debug_tbl);

    package::install(vm);
}

fn new_lib_table(vm: &mut LuaVM, name: &str) -> Rc<RefCell<LuaTable>> {
    let table = Rc::new(RefCell::new(LuaTable::new()));
    vm.globals.borrow_mut().set(LuaValue::string(name), LuaValue::Table(table.clone()));
    table
}

pub(crate) fn arg(args: &[LuaValue], n: usize) -> LuaValue {
    args.get(n).cloned().unwrap_or(LuaValue::Nil)
}

pub(crate) fn check_table(
    vm: &mut LuaVM,
    args: &[LuaValue],
    n: usize,
    fname: &str,
) -> Result<Rc<RefCell<LuaTable>>, LuaError> {
    match arg(args, n) {
        LuaValue::Table(t) => Ok(t),
        other => Err(vm.raise_message(format!(
            "bad argument #{} to '{}' (table expected, got {})",
            n + 1,
            fname,
            other.type_name()
        ))),
    }
}

pub(crate) fn check_string(vm: &mut LuaVM, args: &[LuaValue], n: usize, fname: &str) -> Result<String, LuaError> {
    match arg(args, n) {
        LuaValue::Str(s) => Ok(s.to_string()),
        LuaValue::Int(_) | LuaValue::Float(_) => Ok(arg(args, n).display_string()),
        other => Err(vm.raise_message(format!(
            "bad argument #{} to '{}' (string expected, got {})",
            n + 1,
            fname,
            other.type_name()
        ))),
    }
}

pub(crate) fn check_number(vm: &mut LuaVM, args: &[LuaValue], n: usize, fname: &str) -> Result<f64, LuaError> {
    arg(args, n)
        .as_f64()
        .ok_or_else(|| vm.raise_message(format!("bad argument #{} to '{}' (number expected)", n + 1, fname)))
}

pub(crate) fn check_int(vm: &mut LuaVM, args: &[LuaValue], n: usize, fname: &str) -> Result<i64, LuaError> {
    arg(args, n)
        .as_i64()
        .ok_or_else(|| vm.raise_message(format!("bad argument #{} to '{}' (number expected)", n + 1, fname)))
}

pub(crate) fn opt_int(args: &[LuaValue], n: usize, default: i64) -> i64 {
    match arg(args, n) {
        LuaValue::Nil => default,
        v => v.as_i64().unwrap_or(default),
    }
}

pub(crate) fn opt_string(args: &[LuaValue], n: usize, default: &str) -> String {
    match arg(args, n) {
        LuaValue::Str(s) => s.to_string(),
        LuaValue::Nil => default.to_string(),
        v => v.display_string(),
    }
}

/// `tostring()` coercion honoring a table's `__tostring` metamethod
/// (spec.md §4 metamethod list); shared by `print`, `basic.tostring` and
/// `string.format`'s `%s`.
pub(crate) fn tostring_value(vm: &mut LuaVM, value: &LuaValue) -> Result<String, LuaError> {
    if let Some(mt) = value.metatable_of() {
        let handler = mt.borrow().get(&LuaValue::string("__tostring"));
        if !handler.is_nil() {
            let mut results = vm.call_value_nested(handler, vec![value.clone()])?;
            return Ok(results.drain(..).next().unwrap_or(LuaValue::Nil).display_string());
        }
    }
    Ok(value.display_string())
}
