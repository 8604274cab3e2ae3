//! `table.*` (spec.md §4.6): `concat insert move pack remove sort
//! unpack`. Grounded on the teacher's `stdlib::table`, reworked around
//! `LuaTable::insert_at`/`remove_at`/`sort_array` instead of the
//! teacher's `insert_array_at`/`remove_array_at`.

use std::cell::RefCell;
use std::rc::Rc;

use super::{arg, check_int, check_table, opt_int, opt_string};
use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{LuaError, LuaVM};

pub fn install(table: &Rc<RefCell<LuaTable>>) {
    LuaVM::register_foreign(table, "concat", table_concat);
    LuaVM::register_foreign(table, "insert", table_insert);
    LuaVM::register_foreign(table, "remove", table_remove);
    LuaVM::register_foreign(table, "sort", table_sort);
    LuaVM::register_foreign(table, "pack", table_pack);
    LuaVM::register_foreign(table, "unpack", table_unpack);
    LuaVM::register_foreign(table, "move", table_move);
}

fn table_concat(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let t = check_table(vm, args, 0, "concat")?;
    let sep = opt_string(args, 1, "");
    let len = t.borrow().len();
    let i = opt_int(args, 2, 1);
    let j = opt_int(args, 3, len);
    let mut parts = Vec::new();
    let mut idx = i;
    while idx <= j {
        let v = t.borrow().get(&LuaValue::Int(idx));
        match v.concat_string() {
            Some(s) => parts.push(s.to_string()),
            None => {
                return Err(vm.raise_message(format!(
                    "invalid value (at index {}) in table for 'concat'",
                    idx
                )))
            }
        }
        idx += 1;
    }
    Ok(vec![LuaValue::string(parts.join(&sep))])
}

fn table_insert(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let t = check_table(vm, args, 0, "insert")?;
    let len = t.borrow().len();
    match args.len() {
        2 => {
            t.borrow_mut().insert_at(len as usize + 1, args[1].clone());
            Ok(Vec::new())
        }
        3 => {
            let pos = check_int(vm, args, 1, "insert")?;
            if pos < 1 || pos > len + 1 {
                return Err(vm.raise_message("bad argument #2 to 'insert' (position out of bounds)"));
            }
            t.borrow_mut().insert_at(pos as usize, args[2].clone());
            Ok(Vec::new())
        }
        _ => Err(vm.raise_message("wrong number of arguments to 'insert'")),
    }
}

fn table_remove(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let t = check_table(vm, args, 0, "remove")?;
    let len = t.borrow().len();
    if len == 0 {
        return Ok(vec![LuaValue::Nil]);
    }
    let pos = opt_int(args, 1, len);
    if pos < 1 || pos > len {
        return Err(vm.raise_message("bad argument #2 to 'remove' (position out of bounds)"));
    }
    let removed = t.borrow_mut().remove_at(pos as usize);
    Ok(vec![removed])
}

/// `table.sort(list [, comp])`: the comparator may itself raise; since
/// `LuaTable::sort_array`'s closure can't propagate a `Result`, a raised
/// error is stashed and re-raised once the sort returns.
fn table_sort(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let t = check_table(vm, args, 0, "sort")?;
    let comp = arg(args, 1);
    let mut error = None;
    t.borrow_mut().sort_array(|a, b| {
        if error.is_some() {
            return false;
        }
        if comp.is_nil() {
            match default_less(a, b) {
                Ok(less) => less,
                Err(msg) => {
                    error = Some(vm.raise_message(msg));
                    false
                }
            }
        } else {
            match vm.call_value_nested(comp.clone(), vec![a.clone(), b.clone()]) {
                Ok(results) => results.first().map(|v| v.truthy()).unwrap_or(false),
                Err(e) => {
                    error = Some(e);
                    false
                }
            }
        }
    });
    match error {
        Some(e) => Err(e),
        None => Ok(Vec::new()),
    }
}

fn default_less(a: &LuaValue, b: &LuaValue) -> Result<bool, String> {
    match (a, b) {
        (LuaValue::Str(x), LuaValue::Str(y)) => Ok(x < y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(x < y),
            _ => Err(format!(
                "attempt to compare {} with {}",
                a.type_name(),
                b.type_name()
            )),
        },
    }
}

fn table_pack(args: &[LuaValue], _vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let t = Rc::new(RefCell::new(LuaTable::new()));
    {
        let mut tb = t.borrow_mut();
        for v in args {
            tb.append(v.clone());
        }
        tb.set(LuaValue::string("n"), LuaValue::Int(args.len() as i64));
    }
    Ok(vec![LuaValue::Table(t)])
}

fn table_unpack(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let t = check_table(vm, args, 0, "unpack")?;
    let len = t.borrow().len();
    let i = opt_int(args, 1, 1);
    let j = opt_int(args, 2, len);
    let mut out = Vec::new();
    let mut idx = i;
    while idx <= j {
        out.push(t.borrow().get(&LuaValue::Int(idx)));
        idx += 1;
    }
    Ok(out)
}

fn table_move(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let src = check_table(vm, args, 0, "move")?;
    let f = check_int(vm, args, 1, "move")?;
    let e = check_int(vm, args, 2, "move")?;
    let dest_pos = check_int(vm, args, 3, "move")?;
    let dst = match arg(args, 4) {
        LuaValue::Nil => src.clone(),
        LuaValue::Table(t) => t,
        _ => return Err(vm.raise_message("bad argument #5 to 'move' (table expected)")),
    };
    if e >= f {
        let mut buffer = Vec::new();
        let mut idx = f;
        while idx <= e {
            buffer.push(src.borrow().get(&LuaValue::Int(idx)));
            idx += 1;
        }
        for (offset, v) in buffer.into_iter().enumerate() {
            dst.borrow_mut().set(LuaValue::Int(dest_pos + offset as i64), v);
        }
    }
    Ok(vec![LuaValue::Table(dst)])
}
