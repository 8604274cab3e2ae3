//! `_G` global functions (spec.md §4.5/§4.6): `print`, `type`, `assert`,
//! `error`, `tonumber`, `tostring`, `select`, `pairs`/`ipairs`/`next`,
//! `pcall`/`xpcall`, `setmetatable`/`getmetatable`, and the `raw*`
//! family. Grounded on the teacher's `stdlib::basic`, adapted to this
//! VM's slice-of-args foreign-function calling convention instead of
//! its register-frame one.

use std::rc::Rc;

use super::{arg, check_table, tostring_value};
use crate::lua_value::LuaValue;
use crate::lua_vm::{Foreign, LuaError, LuaVM};

pub fn install(vm: &mut LuaVM) {
    let g = vm.globals.clone();
    LuaVM::register_foreign(&g, "print", lua_print);
    LuaVM::register_foreign(&g, "type", lua_type);
    LuaVM::register_foreign(&g, "assert", lua_assert);
    LuaVM::register_foreign(&g, "error", lua_error);
    LuaVM::register_foreign(&g, "tonumber", lua_tonumber);
    LuaVM::register_foreign(&g, "tostring", lua_tostring);
    LuaVM::register_foreign(&g, "select", lua_select);
    LuaVM::register_foreign(&g, "pairs", lua_pairs);
    LuaVM::register_foreign(&g, "ipairs", lua_ipairs);
    LuaVM::register_foreign(&g, "next", lua_next);
    LuaVM::register_foreign(&g, "pcall", lua_pcall);
    LuaVM::register_foreign(&g, "xpcall", lua_xpcall);
    LuaVM::register_foreign(&g, "setmetatable", lua_setmetatable);
    LuaVM::register_foreign(&g, "getmetatable", lua_getmetatable);
    LuaVM::register_foreign(&g, "rawget", lua_rawget);
    LuaVM::register_foreign(&g, "rawset", lua_rawset);
    LuaVM::register_foreign(&g, "rawequal", lua_rawequal);
    LuaVM::register_foreign(&g, "rawlen", lua_rawlen);
    g.borrow_mut().set(LuaValue::string("_VERSION"), LuaValue::string("Lua 5.4 (register VM subset)"));
    g.borrow_mut().set(LuaValue::string("_G"), LuaValue::Table(g.clone()));
}

fn lua_print(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let mut parts = Vec::with_capacity(args.len());
    for v in args {
        parts.push(tostring_value(vm, v)?);
    }
    vm.output.push(parts.join("\t"));
    Ok(Vec::new())
}

fn lua_type(args: &[LuaValue], _vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::string(arg(args, 0).type_name())])
}

fn lua_assert(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    if arg(args, 0).truthy() {
        Ok(args.to_vec())
    } else {
        let message = if args.len() > 1 { args[1].clone() } else { LuaValue::string("assertion failed!") };
        Err(vm.raise(message))
    }
}

/// `error(message [, level])`: a string message gets a `source:line:`
/// prefix naming the level-th calling frame — level 1 (the default) is
/// wherever `error` itself was called from, level 2 is that function's own
/// caller, and so on; level 0 suppresses the prefix entirely.
fn lua_error(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let message = arg(args, 0);
    let level = match arg(args, 1) {
        LuaValue::Nil => 1,
        v => v.as_i64().unwrap_or(1),
    };
    if let LuaValue::Str(s) = &message {
        if let Some(location) = location_at_level(vm, level) {
            return Err(vm.raise(LuaValue::string(format!("{}: {}", location, s))));
        }
    }
    Err(vm.raise(message))
}

/// Resolves the source location for `error`'s `level` argument. Level 1 is
/// the frame that called `error` — exactly where `current_line` already
/// points while still inside `error`'s own foreign frame. Level 2 is that
/// frame's caller, found by skipping `error`'s foreign frame on the call
/// stack and reading the next frame's `return_pc - 1` (the line of the call
/// instruction that invoked it). Higher levels walk further up. `None` for
/// level 0 or a level deeper than the live call stack, matching reference
/// Lua's behavior of dropping the prefix rather than erroring.
fn location_at_level(vm: &LuaVM, level: i64) -> Option<String> {
    if level <= 0 {
        return None;
    }
    if level == 1 {
        return Some(format!("{}:{}", vm.source_name, vm.current_line()));
    }
    let mut frames = vm.call_stack.iter().rev();
    frames.next()?; // `error`'s own foreign frame
    let mut frame = frames.next()?;
    for _ in 0..(level - 2) {
        frame = frames.next()?;
    }
    let line = vm.code.get(frame.return_pc.saturating_sub(1)).map(|i| i.debug.line).unwrap_or(0);
    Some(format!("{}:{}", vm.source_name, line))
}

fn lua_tonumber(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let value = arg(args, 0);
    match arg(args, 1) {
        LuaValue::Nil => Ok(vec![value.to_number().unwrap_or(LuaValue::Nil)]),
        base_val => {
            let base = base_val
                .as_i64()
                .ok_or_else(|| vm.raise_message("bad argument #2 to 'tonumber' (number expected)"))?;
            if !(2..=36).contains(&base) {
                return Err(vm.raise_message("bad argument #2 to 'tonumber' (base out of range)"));
            }
            let text = match &value {
                LuaValue::Str(s) => s.as_str().trim().to_string(),
                _ => return Err(vm.raise_message("bad argument #1 to 'tonumber' (string expected)")),
            };
            let negative = text.starts_with('-');
            let digits = text.trim_start_matches(['+', '-']);
            let parsed = i64::from_str_radix(digits, base as u32).ok().map(|n| if negative { -n } else { n });
            Ok(vec![parsed.map(LuaValue::Int).unwrap_or(LuaValue::Nil)])
        }
    }
}

fn lua_tostring(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let s = tostring_value(vm, &arg(args, 0))?;
    Ok(vec![LuaValue::string(s)])
}

fn lua_select(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    if args.is_empty() {
        return Err(vm.raise_message("bad argument #1 to 'select' (number expected)"));
    }
    if let LuaValue::Str(s) = &args[0] {
        if s.as_str() == "#" {
            return Ok(vec![LuaValue::Int((args.len() - 1) as i64)]);
        }
    }
    let n = args[0]
        .as_i64()
        .ok_or_else(|| vm.raise_message("bad argument #1 to 'select' (number expected)"))?;
    let rest = &args[1..];
    if n == 0 {
        return Err(vm.raise_message("bad argument #1 to 'select' (index out of range)"));
    }
    let start = if n > 0 {
        (n - 1) as usize
    } else {
        let from_end = rest.len() as i64 + n;
        if from_end < 0 {
            return Err(vm.raise_message("bad argument #1 to 'select' (index out of range)"));
        }
        from_end as usize
    };
    Ok(rest.get(start..).map(|s| s.to_vec()).unwrap_or_default())
}

fn lua_pairs(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let t = check_table(vm, args, 0, "pairs")?;
    let next_fn = vm.globals.borrow().get(&LuaValue::string("next"));
    Ok(vec![next_fn, LuaValue::Table(t), LuaValue::Nil])
}

fn lua_ipairs(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let t = check_table(vm, args, 0, "ipairs")?;
    let iter = LuaValue::Foreign(Rc::new(Foreign::new("ipairs_iterator", ipairs_next)));
    Ok(vec![iter, LuaValue::Table(t), LuaValue::Int(0)])
}

fn ipairs_next(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let t = check_table(vm, args, 0, "ipairs iterator")?;
    let i = arg(args, 1).as_i64().unwrap_or(0) + 1;
    let v = t.borrow().get(&LuaValue::Int(i));
    if v.is_nil() {
        Ok(vec![LuaValue::Nil])
    } else {
        Ok(vec![LuaValue::Int(i), v])
    }
}

fn lua_next(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let t = check_table(vm, args, 0, "next")?;
    let result = t.borrow().next_key(&arg(args, 1));
    match result {
        Some((k, v)) => Ok(vec![k, v]),
        None => Ok(vec![LuaValue::Nil]),
    }
}

fn lua_pcall(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    if args.is_empty() {
        return Err(vm.raise_message("bad argument #1 to 'pcall' (value expected)"));
    }
    match vm.call_value_nested(args[0].clone(), args[1..].to_vec()) {
        Ok(mut results) => {
            let mut out = vec![LuaValue::Bool(true)];
            out.append(&mut results);
            Ok(out)
        }
        Err(_) => {
            let errval = vm.pending_error.take().unwrap_or(LuaValue::Nil);
            vm.pending_traceback = None;
            Ok(vec![LuaValue::Bool(false), errval])
        }
    }
}

fn lua_xpcall(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    if args.len() < 2 {
        return Err(vm.raise_message("bad argument #2 to 'xpcall' (value expected)"));
    }
    let handler = args[1].clone();
    match vm.call_value_nested(args[0].clone(), args[2..].to_vec()) {
        Ok(mut results) => {
            let mut out = vec![LuaValue::Bool(true)];
            out.append(&mut results);
            Ok(out)
        }
        Err(_) => {
            let errval = vm.pending_error.take().unwrap_or(LuaValue::Nil);
            vm.pending_traceback = None;
            let handled = vm.call_value_nested(handler, vec![errval])?;
            let mut out = vec![LuaValue::Bool(false)];
            out.extend(handled);
            Ok(out)
        }
    }
}

fn lua_setmetatable(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let t = check_table(vm, args, 0, "setmetatable")?;
    if let Some(existing) = t.borrow().metatable.clone() {
        if !existing.borrow().get(&LuaValue::string("__metatable")).is_nil() {
            return Err(vm.raise_message("cannot change a protected metatable"));
        }
    }
    match arg(args, 1) {
        LuaValue::Nil => t.borrow_mut().metatable = None,
        LuaValue::Table(mt) => t.borrow_mut().metatable = Some(mt),
        _ => return Err(vm.raise_message("bad argument #2 to 'setmetatable' (nil or table expected)")),
    }
    Ok(vec![LuaValue::Table(t)])
}

fn lua_getmetatable(args: &[LuaValue], _vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    match arg(args, 0).metatable_of() {
        Some(mt) => {
            let protected = mt.borrow().get(&LuaValue::string("__metatable"));
            if protected.is_nil() {
                Ok(vec![LuaValue::Table(mt)])
            } else {
                Ok(vec![protected])
            }
        }
        None => Ok(vec![LuaValue::Nil]),
    }
}

fn lua_rawget(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let t = check_table(vm, args, 0, "rawget")?;
    let value = t.borrow().get(&arg(args, 1));
    Ok(vec![value])
}

fn lua_rawset(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let t = check_table(vm, args, 0, "rawset")?;
    let key = arg(args, 1);
    if key.is_nil() {
        return Err(vm.raise_message("table index is nil"));
    }
    t.borrow_mut().set(key, arg(args, 2));
    Ok(vec![LuaValue::Table(t)])
}

fn lua_rawequal(args: &[LuaValue], _vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::Bool(arg(args, 0).raw_eq(&arg(args, 1)))])
}

fn lua_rawlen(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    match arg(args, 0) {
        LuaValue::Table(t) => Ok(vec![LuaValue::Int(t.borrow().len())]),
        LuaValue::Str(s) => Ok(vec![LuaValue::Int(s.as_str().len() as i64)]),
        _ => Err(vm.raise_message("table or string expected")),
    }
}
