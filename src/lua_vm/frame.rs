use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use smol_str::SmolStr;

use crate::lua_value::{Cell, LuaValue};

/// A suspended caller, pushed by `CALL`/`CALL_VALUE` and popped by a
/// `RETURN`/`RETURN_MULTI` (or by coroutine suspend/resume bookkeeping).
/// Mirrors spec.md §3, "Call Frame".
pub struct CallFrame {
    pub return_pc: usize,
    pub saved_registers: HashMap<SmolStr, LuaValue>,
    pub saved_upvalues: Vec<Rc<RefCell<Cell>>>,
    pub pending_params_snapshot: VecDeque<LuaValue>,
    /// Registers the caller's `RESULT*` opcodes will ultimately write to.
    /// Populated for documentation/debugging parity with spec.md's data
    /// model; alignment itself is performed directly by the `RESULT*`
    /// dispatch handlers against `LuaVM::last_return`.
    pub result_targets: Vec<SmolStr>,
    pub function_label: SmolStr,
    pub source_span_cursor: usize,
    pub is_foreign: bool,
}

impl CallFrame {
    pub fn new(return_pc: usize, function_label: SmolStr) -> Self {
        CallFrame {
            return_pc,
            saved_registers: HashMap::new(),
            saved_upvalues: Vec::new(),
            pending_params_snapshot: VecDeque::new(),
            result_targets: Vec::new(),
            function_label,
            source_span_cursor: 0,
            is_foreign: false,
        }
    }

    pub fn foreign(return_pc: usize, function_label: SmolStr) -> Self {
        let mut frame = CallFrame::new(return_pc, function_label);
        frame.is_foreign = true;
        frame
    }
}

/// A sentinel pushed at a coroutine's resume boundary; the yieldable check
/// walks outward from the live frame to this marker (spec.md, GLOSSARY:
/// "Resume boundary").
pub const RESUME_BOUNDARY_LABEL: &str = "<resume-boundary>";

impl CallFrame {
    pub fn is_resume_boundary(&self) -> bool {
        self.function_label == RESUME_BOUNDARY_LABEL
    }

    pub fn resume_boundary(return_pc: usize) -> Self {
        CallFrame::new(return_pc, SmolStr::new(RESUME_BOUNDARY_LABEL))
    }
}
