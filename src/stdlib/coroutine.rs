//! `coroutine.*` (spec.md §4.3), a thin Lua-callable wrapper around the
//! scheduler primitives in `lua_vm::scheduler`. Grounded on the teacher's
//! `stdlib::coroutine` (there a stub returning `nil`/`false`/`"dead"`
//! unconditionally) — here wired to the scheduler this crate actually
//! built.

use std::cell::RefCell;
use std::rc::Rc;

use super::arg;
use crate::lua_value::{CoroutineStatus, LuaTable, LuaValue};
use crate::lua_vm::{Foreign, LuaError, LuaVM};

pub fn install(table: &Rc<RefCell<LuaTable>>) {
    LuaVM::register_foreign(table, "create", co_create);
    LuaVM::register_foreign(table, "resume", co_resume);
    LuaVM::register_foreign(table, "yield", co_yield);
    LuaVM::register_foreign(table, "status", co_status);
    LuaVM::register_foreign(table, "wrap", co_wrap);
    LuaVM::register_foreign(table, "running", co_running);
    LuaVM::register_foreign(table, "isyieldable", co_isyieldable);
    LuaVM::register_foreign(table, "close", co_close);
}

fn co_create(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    match arg(args, 0) {
        LuaValue::Closure(c) => Ok(vec![vm.coroutine_create(c)]),
        _ => Err(vm.raise_message("bad argument #1 to 'create' (function expected)")),
    }
}

fn co_resume(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let co = match arg(args, 0) {
        LuaValue::Coroutine(c) => c,
        _ => return Err(vm.raise_message("bad argument #1 to 'resume' (coroutine expected)")),
    };
    let rest = if args.len() > 1 { args[1..].to_vec() } else { Vec::new() };
    let (ok, mut values) = vm.coroutine_resume(co, rest);
    let mut out = vec![LuaValue::Bool(ok)];
    out.append(&mut values);
    Ok(out)
}

fn co_yield(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    vm.check_yieldable()?;
    Err(vm.begin_yield(args.to_vec()))
}

fn co_status(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let co = match arg(args, 0) {
        LuaValue::Coroutine(c) => c,
        _ => return Err(vm.raise_message("bad argument #1 to 'status' (coroutine expected)")),
    };
    Ok(vec![LuaValue::string(vm.coroutine_status(&co))])
}

/// `coroutine.wrap(f)`: like `create` but returns a plain function that
/// resumes on every call and re-raises the coroutine's error on failure
/// instead of returning `false, err`.
fn co_wrap(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let entry = match arg(args, 0) {
        LuaValue::Closure(c) => c,
        _ => return Err(vm.raise_message("bad argument #1 to 'wrap' (function expected)")),
    };
    let co = match vm.coroutine_create(entry) {
        LuaValue::Coroutine(c) => c,
        _ => unreachable!("coroutine_create always returns a Coroutine value"),
    };
    let wrapped = Foreign::new("coroutine.wrap", move |call_args: &[LuaValue], vm: &mut LuaVM| {
        let (ok, mut values) = vm.coroutine_resume(co.clone(), call_args.to_vec());
        if ok {
            Ok(values)
        } else {
            let errval = if values.is_empty() { LuaValue::Nil } else { values.remove(0) };
            Err(vm.raise(errval))
        }
    });
    Ok(vec![LuaValue::Foreign(Rc::new(wrapped))])
}

fn co_running(_args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let (co, is_main) = vm.coroutine_running();
    Ok(vec![co, LuaValue::Bool(is_main)])
}

fn co_isyieldable(_args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::Bool(vm.coroutine_isyieldable())])
}

/// `coroutine.close(co)`: only valid on a suspended or already-dead
/// coroutine (spec.md Open Question: implemented as a direct status
/// transition, no drop-handler/to-be-closed-variable support).
fn co_close(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let co = match arg(args, 0) {
        LuaValue::Coroutine(c) => c,
        _ => return Err(vm.raise_message("bad argument #1 to 'close' (coroutine expected)")),
    };
    match vm.coroutine_status(&co) {
        "suspended" | "dead" => {
            co.borrow_mut().status = CoroutineStatus::Dead;
            Ok(vec![LuaValue::Bool(true)])
        }
        _ => Ok(vec![LuaValue::Bool(false), LuaValue::string("cannot close a running coroutine")]),
    }
}
