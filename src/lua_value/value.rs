use std::cell::RefCell;
use std::rc::Rc;

use smol_str::SmolStr;

use super::{Cell, Closure, Coroutine, LuaTable};
use crate::lua_vm::{Foreign, LuaError};

/// A tagged Lua value.
///
/// Equality is by identity for the handle-carrying variants (`Table`,
/// `Closure`, `Coroutine`, `Foreign`, `Cell`) and by value for everything
/// else, matching spec.md §3.
#[derive(Clone)]
pub enum LuaValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(SmolStr),
    Table(Rc<RefCell<LuaTable>>),
    Closure(Rc<Closure>),
    Coroutine(Rc<RefCell<Coroutine>>),
    Foreign(Rc<Foreign>),
    Cell(Rc<RefCell<Cell>>),
    /// Multi-return carrier. Never stored in a table or register except as
    /// the transient result of a call; expanded by PARAM_EXPAND, VARARG,
    /// RESULT_LIST and the tail position of RETURN_MULTI / TABLE_EXTEND.
    List(Rc<Vec<LuaValue>>),
}

impl Default for LuaValue {
    fn default() -> Self {
        LuaValue::Nil
    }
}

impl LuaValue {
    pub fn string(s: impl Into<SmolStr>) -> Self {
        LuaValue::Str(s.into())
    }

    pub fn list(values: Vec<LuaValue>) -> Self {
        LuaValue::List(Rc::new(values))
    }

    /// Only Nil and Bool(false) are falsy; everything else, including 0 and
    /// the empty string, is truthy.
    pub fn truthy(&self) -> bool {
        !matches!(self, LuaValue::Nil | LuaValue::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LuaValue::Nil => "nil",
            LuaValue::Bool(_) => "boolean",
            LuaValue::Int(_) | LuaValue::Float(_) => "number",
            LuaValue::Str(_) => "string",
            LuaValue::Table(_) => "table",
            LuaValue::Closure(_) | LuaValue::Foreign(_) => "function",
            LuaValue::Coroutine(_) => "thread",
            LuaValue::Cell(_) => "cell",
            LuaValue::List(_) => "list",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    pub fn as_table(&self) -> Option<&Rc<RefCell<LuaTable>>> {
        match self {
            LuaValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_coroutine(&self) -> Option<&Rc<RefCell<Coroutine>>> {
        match self {
            LuaValue::Coroutine(c) => Some(c),
            _ => None,
        }
    }

    /// Numeric coercion used by arithmetic opcodes: strings that look like
    /// numbers coerce, everything else does not.
    pub fn to_number(&self) -> Option<LuaValue> {
        match self {
            LuaValue::Int(_) | LuaValue::Float(_) => Some(self.clone()),
            LuaValue::Str(s) => parse_numeric(s.trim()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.to_number()? {
            LuaValue::Int(i) => Some(i as f64),
            LuaValue::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.to_number()? {
            LuaValue::Int(i) => Some(i),
            LuaValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(f as i64),
            _ => None,
        }
    }

    /// `..` coercion: numbers, and only numbers, coerce alongside strings.
    pub fn concat_string(&self) -> Option<SmolStr> {
        match self {
            LuaValue::Str(s) => Some(s.clone()),
            LuaValue::Int(_) | LuaValue::Float(_) => Some(SmolStr::new(self.display_string())),
            _ => None,
        }
    }

    /// `tostring` formatting, shared by PRINT, CONCAT fallback and
    /// `string.format`'s `%s`.
    pub fn display_string(&self) -> String {
        match self {
            LuaValue::Nil => "nil".to_string(),
            LuaValue::Bool(b) => b.to_string(),
            LuaValue::Int(i) => {
                let mut buf = itoa::Buffer::new();
                buf.format(*i).to_string()
            }
            LuaValue::Float(f) => format_lua_float(*f),
            LuaValue::Str(s) => s.to_string(),
            LuaValue::Table(t) => format!("table: {:#x}", Rc::as_ptr(t) as usize),
            LuaValue::Closure(c) => format!("function: {:#x}", Rc::as_ptr(c) as usize),
            LuaValue::Foreign(f) => format!("function: builtin: {:#x}", Rc::as_ptr(f) as usize),
            LuaValue::Coroutine(c) => format!("thread: {:#x}", Rc::as_ptr(c) as usize),
            LuaValue::Cell(c) => format!("cell: {:#x}", Rc::as_ptr(c) as usize),
            LuaValue::List(_) => "list".to_string(),
        }
    }

    /// Raw (metamethod-free) equality, as used by `EQ` before metamethod
    /// dispatch and by `rawequal`.
    pub fn raw_eq(&self, other: &LuaValue) -> bool {
        use LuaValue::*;
        match (self, other) {
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (Str(a), Str(b)) => a == b,
            (Table(a), Table(b)) => Rc::ptr_eq(a, b),
            (Closure(a), Closure(b)) => Rc::ptr_eq(a, b),
            (Coroutine(a), Coroutine(b)) => Rc::ptr_eq(a, b),
            (Foreign(a), Foreign(b)) => Rc::ptr_eq(a, b),
            (Cell(a), Cell(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn metatable_of(&self) -> Option<Rc<RefCell<LuaTable>>> {
        match self {
            LuaValue::Table(t) => t.borrow().metatable.clone(),
            _ => None,
        }
    }
}

fn format_lua_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if f == f.trunc() && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        let s = format!("{:.14e}", f);
        // Fall back to a compact %.14g-style rendering.
        let direct = format!("{}", f);
        if direct.parse::<f64>() == Ok(f) && !direct.contains('e') {
            direct
        } else {
            s
        }
    }
}

fn parse_numeric(s: &str) -> Option<LuaValue> {
    if s.is_empty() {
        return None;
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok().map(LuaValue::Int);
    }
    if let Some(hex) = s.strip_prefix("-0x").or_else(|| s.strip_prefix("-0X")) {
        return i64::from_str_radix(hex, 16).ok().map(|i| LuaValue::Int(-i));
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(LuaValue::Int(i));
    }
    s.parse::<f64>().ok().map(LuaValue::Float)
}

pub type ForeignFn = dyn Fn(&[LuaValue], &mut crate::lua_vm::LuaVM) -> Result<Vec<LuaValue>, LuaError>;

impl std::fmt::Debug for LuaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_string())
    }
}
