//! `debug.*` (spec.md §4.6): `traceback`/`getinfo` only. Grounded on the
//! teacher's `stdlib::debug` (there an explicit stub returning the raw
//! message or nil unconditionally) — here wired to `LuaVM::format_traceback`
//! and `current_line`, both already built for error reporting.

use std::cell::RefCell;
use std::rc::Rc;

use super::{arg, opt_int};
use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{LuaError, LuaVM};

pub fn install(table: &Rc<RefCell<LuaTable>>) {
    LuaVM::register_foreign(table, "traceback", debug_traceback);
    LuaVM::register_foreign(table, "getinfo", debug_getinfo);
}

/// `debug.traceback([thread,] [message,] [level])`. A leading thread
/// argument targets that coroutine's saved frames instead of the running
/// call stack; a trailing integer level skips that many innermost frames.
fn debug_traceback(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let mut idx = 0;
    let thread = match arg(args, idx) {
        LuaValue::Coroutine(co) => {
            idx += 1;
            Some(co)
        }
        _ => None,
    };
    let message = match arg(args, idx) {
        LuaValue::Nil => None,
        LuaValue::Str(s) => {
            idx += 1;
            Some(s.to_string())
        }
        other => {
            idx += 1;
            Some(other.display_string())
        }
    };
    let level = opt_int(args, idx, 0).max(0) as usize;
    let body = match &thread {
        Some(co) => vm.format_traceback_for_coroutine(&co.borrow(), level),
        None => vm.format_traceback(level),
    };
    let rendered = match message {
        Some(m) => format!("{}\n{}", m, body),
        None => body,
    };
    Ok(vec![LuaValue::string(rendered)])
}

fn debug_getinfo(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let _ = arg(args, 0);
    let t = Rc::new(RefCell::new(LuaTable::new()));
    {
        let mut tb = t.borrow_mut();
        tb.set(LuaValue::string("currentline"), LuaValue::Int(vm.current_line() as i64));
        tb.set(LuaValue::string("source"), LuaValue::string(format!("@{}", vm.source_name)));
        tb.set(LuaValue::string("short_src"), LuaValue::string(vm.source_name.to_string()));
        tb.set(LuaValue::string("what"), LuaValue::string("Lua"));
    }
    Ok(vec![LuaValue::Table(t)])
}
