//! `math.*` (spec.md §4.6). Grounded on the teacher's `stdlib::math`;
//! `random`/`randomseed` grounded on the pack's use of the `rand` crate
//! rather than the teacher's own (it has none for `math.random`).

use std::cell::RefCell;
use std::rc::Rc;

use rand::Rng;

use super::{arg, check_number};
use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{LuaError, LuaVM};

pub fn install(table: &Rc<RefCell<LuaTable>>) {
    LuaVM::register_foreign(table, "abs", math_abs);
    LuaVM::register_foreign(table, "ceil", math_ceil);
    LuaVM::register_foreign(table, "floor", math_floor);
    LuaVM::register_foreign(table, "sqrt", math_sqrt);
    LuaVM::register_foreign(table, "sin", math_sin);
    LuaVM::register_foreign(table, "cos", math_cos);
    LuaVM::register_foreign(table, "tan", math_tan);
    LuaVM::register_foreign(table, "asin", math_asin);
    LuaVM::register_foreign(table, "acos", math_acos);
    LuaVM::register_foreign(table, "atan", math_atan);
    LuaVM::register_foreign(table, "exp", math_exp);
    LuaVM::register_foreign(table, "log", math_log);
    LuaVM::register_foreign(table, "fmod", math_fmod);
    LuaVM::register_foreign(table, "modf", math_modf);
    LuaVM::register_foreign(table, "max", math_max);
    LuaVM::register_foreign(table, "min", math_min);
    LuaVM::register_foreign(table, "random", math_random);
    LuaVM::register_foreign(table, "randomseed", math_randomseed);
    LuaVM::register_foreign(table, "tointeger", math_tointeger);
    LuaVM::register_foreign(table, "type", math_type);
    LuaVM::register_foreign(table, "ult", math_ult);
    LuaVM::register_foreign(table, "deg", math_deg);
    LuaVM::register_foreign(table, "rad", math_rad);
    table.borrow_mut().set(LuaValue::string("pi"), LuaValue::Float(std::f64::consts::PI));
    table.borrow_mut().set(LuaValue::string("huge"), LuaValue::Float(f64::INFINITY));
    table.borrow_mut().set(LuaValue::string("maxinteger"), LuaValue::Int(i64::MAX));
    table.borrow_mut().set(LuaValue::string("mininteger"), LuaValue::Int(i64::MIN));
}

fn math_abs(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    match arg(args, 0) {
        LuaValue::Int(i) => Ok(vec![LuaValue::Int(i.wrapping_abs())]),
        _ => Ok(vec![LuaValue::Float(check_number(vm, args, 0, "abs")?.abs())]),
    }
}

fn math_ceil(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::Int(check_number(vm, args, 0, "ceil")?.ceil() as i64)])
}

fn math_floor(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    if let LuaValue::Int(i) = arg(args, 0) {
        return Ok(vec![LuaValue::Int(i)]);
    }
    Ok(vec![LuaValue::Int(check_number(vm, args, 0, "floor")?.floor() as i64)])
}

fn math_sqrt(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::Float(check_number(vm, args, 0, "sqrt")?.sqrt())])
}

fn math_sin(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::Float(check_number(vm, args, 0, "sin")?.sin())])
}

fn math_cos(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::Float(check_number(vm, args, 0, "cos")?.cos())])
}

fn math_tan(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::Float(check_number(vm, args, 0, "tan")?.tan())])
}

fn math_asin(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::Float(check_number(vm, args, 0, "asin")?.asin())])
}

fn math_acos(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::Float(check_number(vm, args, 0, "acos")?.acos())])
}

fn math_atan(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let y = check_number(vm, args, 0, "atan")?;
    let x = match arg(args, 1) {
        LuaValue::Nil => 1.0,
        _ => check_number(vm, args, 1, "atan")?,
    };
    Ok(vec![LuaValue::Float(y.atan2(x))])
}

fn math_exp(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::Float(check_number(vm, args, 0, "exp")?.exp())])
}

fn math_log(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let x = check_number(vm, args, 0, "log")?;
    let result = match arg(args, 1) {
        LuaValue::Nil => x.ln(),
        _ => x.log(check_number(vm, args, 1, "log")?),
    };
    Ok(vec![LuaValue::Float(result)])
}

fn math_fmod(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let x = check_number(vm, args, 0, "fmod")?;
    let y = check_number(vm, args, 1, "fmod")?;
    Ok(vec![LuaValue::Float(x % y)])
}

fn math_modf(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let x = check_number(vm, args, 0, "modf")?;
    let int_part = x.trunc();
    Ok(vec![LuaValue::Float(int_part), LuaValue::Float(x - int_part)])
}

fn math_max(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    if args.is_empty() {
        return Err(vm.raise_message("bad argument #1 to 'max' (value expected)"));
    }
    let mut best = 0;
    for i in 1..args.len() {
        let current = args[i]
            .as_f64()
            .ok_or_else(|| vm.raise_message("bad argument to 'max' (number expected)"))?;
        let champion = args[best]
            .as_f64()
            .ok_or_else(|| vm.raise_message("bad argument to 'max' (number expected)"))?;
        if current > champion {
            best = i;
        }
    }
    Ok(vec![args[best].clone()])
}

fn math_min(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    if args.is_empty() {
        return Err(vm.raise_message("bad argument #1 to 'min' (value expected)"));
    }
    let mut best = 0;
    for i in 1..args.len() {
        let current = args[i]
            .as_f64()
            .ok_or_else(|| vm.raise_message("bad argument to 'min' (number expected)"))?;
        let champion = args[best]
            .as_f64()
            .ok_or_else(|| vm.raise_message("bad argument to 'min' (number expected)"))?;
        if current < champion {
            best = i;
        }
    }
    Ok(vec![args[best].clone()])
}

/// `math.random([m [, n]])`. Seeded per-call from the OS entropy source;
/// `randomseed` is accepted but a no-op, since reproducing a specific
/// sequence would need a seeded generator threaded through `LuaVM`.
fn math_random(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let mut rng = rand::thread_rng();
    match args.len() {
        0 => Ok(vec![LuaValue::Float(rng.gen_range(0.0..1.0))]),
        1 => {
            let m = check_number(vm, args, 0, "random")? as i64;
            if m < 1 {
                return Err(vm.raise_message("bad argument #1 to 'random' (interval is empty)"));
            }
            Ok(vec![LuaValue::Int(rng.gen_range(1..=m))])
        }
        _ => {
            let m = check_number(vm, args, 0, "random")? as i64;
            let n = check_number(vm, args, 1, "random")? as i64;
            if m > n {
                return Err(vm.raise_message("bad argument #2 to 'random' (interval is empty)"));
            }
            Ok(vec![LuaValue::Int(rng.gen_range(m..=n))])
        }
    }
}

fn math_randomseed(_args: &[LuaValue], _vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(Vec::new())
}

fn math_tointeger(args: &[LuaValue], _vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    match arg(args, 0) {
        LuaValue::Int(i) => Ok(vec![LuaValue::Int(i)]),
        LuaValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(vec![LuaValue::Int(f as i64)]),
        _ => Ok(vec![LuaValue::Nil]),
    }
}

fn math_type(args: &[LuaValue], _vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    match arg(args, 0) {
        LuaValue::Int(_) => Ok(vec![LuaValue::string("integer")]),
        LuaValue::Float(_) => Ok(vec![LuaValue::string("float")]),
        _ => Ok(vec![LuaValue::Nil]),
    }
}

fn math_ult(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let a = check_number(vm, args, 0, "ult")? as i64 as u64;
    let b = check_number(vm, args, 1, "ult")? as i64 as u64;
    Ok(vec![LuaValue::Bool(a < b)])
}

fn math_deg(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::Float(check_number(vm, args, 0, "deg")?.to_degrees())])
}

fn math_rad(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::Float(check_number(vm, args, 0, "rad")?.to_radians())])
}
