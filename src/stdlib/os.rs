//! `os.*` (spec.md §4.6, sandboxing note extended from `io.*`):
//! `clock time date difftime`. Grounded on the teacher's `stdlib::os`
//! (itself a raw-`SystemTime` stub), reworked to use `chrono` — this
//! crate's fixed dependency for calendar handling — instead of hand
//! rolling a civil-calendar conversion. `os.exit` is not implemented and
//! `os.getenv` always returns nil, per the spec's sandboxing note.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Timelike, Utc};

use super::{arg, opt_int, opt_string};
use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{LuaError, LuaVM};

pub fn install(table: &Rc<RefCell<LuaTable>>) {
    LuaVM::register_foreign(table, "clock", os_clock);
    LuaVM::register_foreign(table, "time", os_time);
    LuaVM::register_foreign(table, "date", os_date);
    LuaVM::register_foreign(table, "difftime", os_difftime);
    LuaVM::register_foreign(table, "getenv", os_getenv);
}

fn os_clock(_args: &[LuaValue], _vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    Ok(vec![LuaValue::Float(secs)])
}

fn os_time(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    if let LuaValue::Table(fields) = arg(args, 0) {
        let year = field_int(&fields, "year", 1970);
        let month = field_int(&fields, "month", 1);
        let day = field_int(&fields, "day", 1);
        let hour = field_int(&fields, "hour", 12);
        let min = field_int(&fields, "min", 0);
        let sec = field_int(&fields, "sec", 0);
        let date = chrono::NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            .and_then(|d| d.and_hms_opt(hour as u32, min as u32, sec as u32))
            .ok_or_else(|| vm.raise_message("field 'day' out of range"))?;
        return Ok(vec![LuaValue::Int(date.and_utc().timestamp())]);
    }
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Ok(vec![LuaValue::Int(secs as i64)])
}

fn field_int(t: &Rc<RefCell<LuaTable>>, name: &str, default: i64) -> i64 {
    t.borrow().get(&LuaValue::string(name)).as_i64().unwrap_or(default)
}

/// `os.date([format [, time]])`. A leading `!` forces UTC (this VM has
/// no local timezone database, so every call is effectively UTC); a
/// format of `"*t"`/`"!*t"` returns a broken-down table instead of a
/// string.
fn os_date(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let mut fmt = opt_string(args, 0, "%c");
    if let Some(stripped) = fmt.strip_prefix('!') {
        fmt = stripped.to_string();
    }
    let when = match opt_int(args, 1, -1) {
        -1 => Utc::now(),
        secs => DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_else(Utc::now),
    };
    if fmt == "*t" {
        let t = Rc::new(RefCell::new(LuaTable::new()));
        {
            let mut tb = t.borrow_mut();
            tb.set(LuaValue::string("year"), LuaValue::Int(when.year() as i64));
            tb.set(LuaValue::string("month"), LuaValue::Int(when.month() as i64));
            tb.set(LuaValue::string("day"), LuaValue::Int(when.day() as i64));
            tb.set(LuaValue::string("hour"), LuaValue::Int(when.hour() as i64));
            tb.set(LuaValue::string("min"), LuaValue::Int(when.minute() as i64));
            tb.set(LuaValue::string("sec"), LuaValue::Int(when.second() as i64));
            tb.set(LuaValue::string("wday"), LuaValue::Int(when.weekday().num_days_from_sunday() as i64 + 1));
            tb.set(LuaValue::string("yday"), LuaValue::Int(when.ordinal() as i64));
            tb.set(LuaValue::string("isdst"), LuaValue::Bool(false));
        }
        return Ok(vec![LuaValue::Table(t)]);
    }
    let rendered = when.format(&fmt).to_string();
    Ok(vec![LuaValue::string(rendered)])
}

fn os_difftime(args: &[LuaValue], vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    let t2 = super::check_number(vm, args, 0, "difftime")?;
    let t1 = super::check_number(vm, args, 1, "difftime")?;
    Ok(vec![LuaValue::Float(t2 - t1)])
}

fn os_getenv(_args: &[LuaValue], _vm: &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> {
    Ok(vec![LuaValue::Nil])
}
