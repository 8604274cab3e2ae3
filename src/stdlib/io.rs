//! `io.*` (spec.md §4.6, sandboxing note): `write`/`read`/`flush` only.
//! Grounded on the teacher's `stdlib::io`, which prints straight to the
//! process's stdout — here `write` instead appends to `vm.output`, the
//! same sandboxed sink `print` uses, since this VM has no real terminal
//! to talk to and no file handles to open.

use std::cell::RefCell;
use std::rc::Rc;

use super::{arg, tostring_value};
use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{LuaError, LuaVM};

pub fn install(table: &Rc<RefCell<LuaTable>>) {
    LuaVM::register_foreign(table, "write", io_write);
    LuaVM::register_foreign(table, "read", io_read);
    LuaVM::register_foreign(table, "flush", io_flush);
}

fn io_write(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let mut chunk = String::new();
    for a in args {
        chunk.push_str(&tostring_value(vm, a)?);
    }
    vm.output.push(chunk);
    Ok(Vec::new())
}

/// `io.read` always returns nil: there is no standard input attached to
/// a sandboxed VM run.
fn io_read(_args: &[LuaValue], _vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let _ = arg(_args, 0);
    Ok(vec![LuaValue::Nil])
}

fn io_flush(_args: &[LuaValue], _vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(Vec::new())
}
