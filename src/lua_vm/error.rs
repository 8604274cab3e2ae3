use std::fmt;

use crate::lua_value::LuaValue;

/// Lightweight, `Copy` error tag. The actual raised value and any captured
/// traceback live on the VM (`LuaVM::pending_error` /
/// `LuaVM::pending_traceback`) and are pulled together by
/// `LuaVM::into_full_error`, the way `lua_vm::lua_error` in the teacher
/// crate keeps `Result` small in the hot dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaError {
    /// Runtime error: message/value lives in `LuaVM::pending_error`.
    Runtime,
    /// `coroutine.yield` unwound the dispatch loop; values are in
    /// `LuaVM::pending_yield`.
    Yield,
    StackOverflow,
    /// Resume of a non-suspended coroutine, or yield across a foreign
    /// frame / from the main thread.
    Concurrency,
    /// Top-level `HALT` or coroutine entry-function return.
    Exit,
}

impl fmt::Display for LuaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaError::Runtime => write!(f, "runtime error"),
            LuaError::Yield => write!(f, "coroutine yield"),
            LuaError::StackOverflow => write!(f, "stack overflow"),
            LuaError::Concurrency => write!(f, "concurrency error"),
            LuaError::Exit => write!(f, "vm exit"),
        }
    }
}

impl std::error::Error for LuaError {}

/// The rich error produced once a `LuaError::Runtime` escapes uncaught: the
/// raised value plus a formatted traceback (spec.md §4.7).
#[derive(Debug, Clone)]
pub struct LuaErrorValue {
    pub value: LuaValue,
    pub traceback: Option<String>,
}

impl fmt::Display for LuaErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value.display_string())?;
        if let Some(tb) = &self.traceback {
            write!(f, "\n{}", tb)?;
        }
        Ok(())
    }
}

impl std::error::Error for LuaErrorValue {}

/// Syntax/analysis failure surfaced by the compiler, reported with a
/// location and never convertible into a runtime-catchable value (spec.md
/// §7, "CompileError").
#[derive(Debug, Clone)]
pub struct CompileError {
    pub message: String,
    pub source_name: String,
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: {}", self.source_name, self.line, self.col, self.message)
    }
}

impl std::error::Error for CompileError {}
