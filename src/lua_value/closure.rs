use std::cell::RefCell;
use std::rc::Rc;

use smol_str::SmolStr;

use super::table::LuaTable;
use super::value::LuaValue;

/// A mutable single-slot box, shared by every closure and frame that holds
/// it. The shared-ownership lifetime equals the longest holder (spec.md
/// §3, "Cell").
#[derive(Default)]
pub struct Cell(pub LuaValue);

impl Cell {
    pub fn new(value: LuaValue) -> Rc<RefCell<Cell>> {
        Rc::new(RefCell::new(Cell(value)))
    }

    pub fn get(&self) -> LuaValue {
        self.0.clone()
    }

    pub fn set(&mut self, value: LuaValue) {
        self.0 = value;
    }
}

/// An immutable closure descriptor: an entry label plus the ordered list of
/// upvalue cells it captured at `CLOSURE` time (spec.md §3, "Closure").
/// Distinct closures may share upvalue cells; that sharing is the whole
/// closure-capture mechanism.
pub struct Closure {
    pub code_label: SmolStr,
    pub upvalues: Vec<Rc<RefCell<Cell>>>,
    pub parameter_count: usize,
    pub is_vararg: bool,
    /// User-declared name, for traceback display; `None` for anonymous
    /// function literals.
    pub name: Option<SmolStr>,
    /// Override for this closure's `_ENV` lookups, set by `load(chunk,
    /// chunkname, env)`. `None` for every ordinarily-compiled closure,
    /// which resolves globals the normal way. Only the closure's own
    /// top-level frame sees the override — nested function literals it
    /// creates get a fresh call frame with no `_ENV` register set, so they
    /// fall back to the real globals rather than inheriting it; this VM
    /// models `_ENV` as a per-call dynamic fallback, not a lexically
    /// captured upvalue, so true lexical inheritance isn't available here.
    pub env: Option<Rc<RefCell<LuaTable>>>,
}
