//! `package.*` (spec.md §4.6). Grounded on the teacher's `stdlib::package`,
//! scoped down to what a filesystem-free VM can meaningfully offer:
//! `loaded`/`preload`/`path`/`cpath`/`config` as static fields, plus
//! `sandbox` and `load`, both of which spec.md §9 describes as
//! filesystem-free ("`sandbox` builds a new table with selected entries",
//! "`load` compiles a chunk string via the existing `compile()` entry
//! point"). `require`, `searchers`, `loadfile` and `dofile` stay out — they
//! all bottom out in resolving a module *name* to source text via a
//! filesystem or a host-supplied searcher, and this VM has neither (see
//! DESIGN.md's Open Question resolution).

use std::cell::RefCell;
use std::rc::Rc;

use super::{arg, check_table, opt_string};
use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{LuaError, LuaVM};

pub fn install(vm: &mut LuaVM) {
    let package = Rc::new(RefCell::new(LuaTable::new()));
    {
        let mut tb = package.borrow_mut();
        tb.set(LuaValue::string("loaded"), LuaValue::Table(Rc::new(RefCell::new(LuaTable::new()))));
        tb.set(LuaValue::string("preload"), LuaValue::Table(Rc::new(RefCell::new(LuaTable::new()))));
        tb.set(LuaValue::string("path"), LuaValue::string("./?.lua;./?/init.lua"));
        tb.set(LuaValue::string("cpath"), LuaValue::string(""));
        let config = if cfg!(windows) { "\\\n;\n?\n!\n-" } else { "/\n;\n?\n!\n-" };
        tb.set(LuaValue::string("config"), LuaValue::string(config));
    }
    LuaVM::register_foreign(&package, "sandbox", package_sandbox);
    vm.globals.borrow_mut().set(LuaValue::string("package"), LuaValue::Table(package));
    let g = vm.globals.clone();
    LuaVM::register_foreign(&g, "load", lua_load);
}

/// `package.sandbox(name, env, inherit)`: builds a fresh table, optionally
/// pre-populated with `env`'s current entries (or the real globals' if
/// `env` is nil) when `inherit` is truthy, and caches it under
/// `package.loaded[name]` so a second `sandbox` call with the same `name`
/// is visible there too. A bare `sandbox(name)` with no `env`/`inherit`
/// yields an empty table — the strictest sandbox, nothing inherited.
fn package_sandbox(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let name = opt_string(args, 0, "sandbox");
    let inherit = arg(args, 2).truthy();
    let sandboxed = Rc::new(RefCell::new(LuaTable::new()));
    if inherit {
        let source = match arg(args, 1) {
            LuaValue::Table(t) => t,
            LuaValue::Nil => vm.globals.clone(),
            other => return Err(vm.raise_message(format!("bad argument #2 to 'sandbox' (table expected, got {})", other.type_name()))),
        };
        let mut entries = Vec::new();
        let mut cursor = LuaValue::Nil;
        while let Some((k, v)) = source.borrow().next_key(&cursor) {
            entries.push((k.clone(), v));
            cursor = k;
        }
        let mut dst = sandboxed.borrow_mut();
        for (k, v) in entries {
            dst.set(k, v);
        }
    }
    let package = vm.globals.borrow().get(&LuaValue::string("package"));
    if let LuaValue::Table(package) = package {
        let loaded = package.borrow().get(&LuaValue::string("loaded"));
        if let LuaValue::Table(loaded) = loaded {
            loaded.borrow_mut().set(LuaValue::string(name), LuaValue::Table(sandboxed.clone()));
        }
    }
    Ok(vec![LuaValue::Table(sandboxed)])
}

/// `load(chunk, chunkname?, env?)`: compiles `chunk` as a standalone chunk
/// and returns a callable closure over it, or `(nil, message)` on a
/// compile error — the third and fourth Lua-reference arguments
/// (`mode`/an actual `env` beyond what's described below) aren't offered
/// since this VM's `_ENV` is a per-call dynamic fallback rather than a
/// captured upvalue (see `Closure::env`'s doc comment); `env` here only
/// scopes the chunk's own top-level statements, not functions it defines.
fn lua_load(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let chunk = match arg(args, 0) {
        LuaValue::Str(s) => s.to_string(),
        other => {
            return Ok(vec![
                LuaValue::Nil,
                LuaValue::string(format!("load: only string chunks are supported, got {}", other.type_name())),
            ])
        }
    };
    let chunk_name = opt_string(args, 1, "=(load)");
    let env = match arg(args, 2) {
        LuaValue::Nil => None,
        LuaValue::Table(_) => Some(check_table(vm, args, 2, "load")?),
        other => return Err(vm.raise_message(format!("bad argument #3 to 'load' (table expected, got {})", other.type_name()))),
    };
    match vm.load_chunk_as_closure(&chunk, &chunk_name, env) {
        Ok(closure) => Ok(vec![closure]),
        Err(e) => Ok(vec![LuaValue::Nil, LuaValue::string(e.to_string())]),
    }
}
