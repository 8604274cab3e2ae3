use std::collections::HashMap;
use std::rc::Rc;
use std::cell::RefCell;

use smol_str::SmolStr;

use super::closure::{Cell, Closure};
use super::value::LuaValue;
use crate::lua_vm::CallFrame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoroutineStatus {
    Suspended,
    Running,
    Normal,
    Dead,
}

impl CoroutineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CoroutineStatus::Suspended => "suspended",
            CoroutineStatus::Running => "running",
            CoroutineStatus::Normal => "normal",
            CoroutineStatus::Dead => "dead",
        }
    }
}

/// `{ id, status, entry_closure, saved_frames, saved_registers, saved_pc,
/// last_resume_args, last_yield_values, last_error, function_name,
/// parent_id }` from spec.md §3.
pub struct Coroutine {
    pub id: u64,
    pub status: CoroutineStatus,
    pub entry_closure: Option<Rc<Closure>>,
    pub saved_frames: Vec<CallFrame>,
    pub saved_registers: HashMap<SmolStr, LuaValue>,
    pub saved_upvalues: Vec<Rc<RefCell<Cell>>>,
    pub saved_pc: usize,
    /// True once the coroutine's entry call has been pushed onto its frame
    /// stack; distinguishes "first resume" from subsequent ones.
    pub started: bool,
    pub last_resume_args: Vec<LuaValue>,
    pub last_yield_values: Vec<LuaValue>,
    pub last_error: Option<LuaValue>,
    pub function_name: Option<SmolStr>,
    pub parent_id: Option<u64>,
}

impl Coroutine {
    pub fn new(id: u64, entry: Rc<Closure>, parent_id: Option<u64>) -> Self {
        Coroutine {
            id,
            status: CoroutineStatus::Suspended,
            function_name: entry.name.clone(),
            entry_closure: Some(entry),
            saved_frames: Vec::new(),
            saved_registers: HashMap::new(),
            saved_upvalues: Vec::new(),
            saved_pc: 0,
            started: false,
            last_resume_args: Vec::new(),
            last_yield_values: Vec::new(),
            last_error: None,
            parent_id,
        }
    }

    /// The main-thread sentinel is coroutine id 0; it has no entry closure
    /// and is never resumed like a normal coroutine.
    pub fn main_thread() -> Self {
        Coroutine {
            id: 0,
            status: CoroutineStatus::Running,
            function_name: None,
            entry_closure: None,
            saved_frames: Vec::new(),
            saved_registers: HashMap::new(),
            saved_upvalues: Vec::new(),
            saved_pc: 0,
            started: true,
            last_resume_args: Vec::new(),
            last_yield_values: Vec::new(),
            last_error: None,
            parent_id: None,
        }
    }
}
