//! The bytecode virtual machine: register model, call frames, closures,
//! metamethod dispatch and coroutine scheduling (spec.md §4.2).

mod calls;
mod dispatch_arith;
mod dispatch_control;
mod dispatch_table;
mod error;
mod event;
mod foreign;
mod frame;
mod metamethod;
mod opcode;
mod program;
mod scheduler;
mod traceback;

pub use error::{CompileError, LuaError, LuaErrorValue};
pub use event::{Event, EventBuffer, EventKind};
pub use foreign::Foreign;
pub use frame::CallFrame;
pub use opcode::{DebugInfo, Instruction, OpCode, Operand};
pub use program::Program;

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use ahash::AHashMap;
use smol_str::SmolStr;

use crate::lua_value::{Cell, Closure, Coroutine, CoroutineStatus, LuaTable, LuaValue};

/// Knobs a host can tune when constructing a VM (spec.md §9: "Global
/// state"/"Dynamic dispatch" notes call out the chain-walk depth; the
/// event buffer capacity and step budget are this crate's own additions,
/// see SPEC_FULL.md §2).
#[derive(Clone, Copy)]
pub struct VmOptions {
    pub event_buffer_capacity: usize,
    pub metatable_chain_depth: usize,
    pub step_budget: Option<u64>,
}

impl Default for VmOptions {
    fn default() -> Self {
        VmOptions { event_buffer_capacity: 4096, metatable_chain_depth: 200, step_budget: None }
    }
}

/// Snapshot of one coroutine for `LuaVM::snapshot` (spec.md §6).
pub struct CoroutineSnapshot {
    pub id: u64,
    pub status: &'static str,
    pub function_name: Option<SmolStr>,
}

pub struct Snapshot {
    pub coroutines: Vec<CoroutineSnapshot>,
    pub pc: usize,
    pub current_coroutine_id: u64,
    pub stack_depth: usize,
}

/// The virtual machine. Owns the register file, pending-parameter queue,
/// call stack, and all coroutine records for one program run.
pub struct LuaVM {
    pub(crate) code: Vec<Instruction>,
    pub(crate) labels: AHashMap<SmolStr, usize>,
    pub(crate) constants: Vec<LuaValue>,

    pub(crate) pc: usize,
    pub(crate) registers: HashMap<SmolStr, LuaValue>,
    pub(crate) pending_params: VecDeque<LuaValue>,
    pub(crate) last_return: Vec<LuaValue>,
    pub(crate) data_stack: Vec<LuaValue>,
    pub(crate) call_stack: Vec<CallFrame>,
    pub(crate) current_upvalues: Vec<Rc<RefCell<Cell>>>,
    pub(crate) current_function_label: SmolStr,

    pub globals: Rc<RefCell<LuaTable>>,
    /// Captured `print`/`io.write` output, one entry per call (spec.md §6
    /// test harness convenience; a real terminal would stream this
    /// instead).
    pub output: Vec<String>,
    pub halted: bool,

    pub(crate) events: EventBuffer,
    pub(crate) source_name: Rc<str>,

    pub(crate) coroutines: Vec<Rc<RefCell<Coroutine>>>,
    pub(crate) current_coroutine: Rc<RefCell<Coroutine>>,
    pub(crate) main_thread: Rc<RefCell<Coroutine>>,
    pub(crate) next_coroutine_id: u64,

    pub(crate) pending_error: Option<LuaValue>,
    pub(crate) pending_traceback: Option<String>,
    pub(crate) pending_yield: Vec<LuaValue>,

    pub(crate) options: VmOptions,
    pub(crate) steps_taken: u64,
    pub(crate) load_counter: u64,
}

impl LuaVM {
    pub fn new() -> Self {
        Self::with_options(VmOptions::default())
    }

    pub fn with_options(options: VmOptions) -> Self {
        let main_thread = Rc::new(RefCell::new(Coroutine::main_thread()));
        LuaVM {
            code: Vec::new(),
            labels: AHashMap::new(),
            constants: Vec::new(),
            pc: 0,
            registers: HashMap::new(),
            pending_params: VecDeque::new(),
            last_return: Vec::new(),
            data_stack: Vec::new(),
            call_stack: Vec::new(),
            current_upvalues: Vec::new(),
            current_function_label: SmolStr::new("main"),
            globals: Rc::new(RefCell::new(LuaTable::new())),
            output: Vec::new(),
            halted: false,
            events: EventBuffer::new(options.event_buffer_capacity),
            source_name: Rc::from("chunk"),
            coroutines: vec![main_thread.clone()],
            current_coroutine: main_thread.clone(),
            main_thread,
            next_coroutine_id: 1,
            pending_error: None,
            pending_traceback: None,
            pending_yield: Vec::new(),
            options,
            steps_taken: 0,
            load_counter: 0,
        }
    }

    /// §6 "Compile": parses and lowers `source`, loading the result into
    /// this VM's code vector and label table. Does not run anything.
    pub fn compile(&mut self, source: &str, source_name: &str) -> Result<(), CompileError> {
        let program = crate::compiler::compile(source, source_name)?;
        self.load(program);
        Ok(())
    }

    pub fn load(&mut self, program: Program) {
        self.source_name = Rc::from(program.source_name.as_str());
        self.labels = program.labels;
        self.constants = program.constants;
        self.code = program.code;
        self.pc = 0;
    }

    /// Compiles `source` as its own chunk and splices it onto the end of
    /// this VM's existing code/constants/labels, returning a callable
    /// closure over it — the mechanism behind `load`/`package.sandbox`'s
    /// `load`-on-demand use (spec.md §4.6, §9: "`load` compiles a chunk
    /// string via the existing `compile()` entry point"). `self.labels`
    /// and `self.constants` are flat, VM-wide tables shared by every
    /// loaded chunk, so every label the fresh compile produced (including
    /// each nested function's entry/end labels) gets a chunk-unique
    /// namespace prefix and every `Const` operand gets rebased — two
    /// independently compiled chunks otherwise both start their label and
    /// constant counters from zero. Register names need no such treatment:
    /// `push_closure_call` swaps `self.registers` out wholesale per call,
    /// so two functions never have their registers live at once regardless
    /// of naming.
    pub fn load_chunk_as_closure(
        &mut self,
        source: &str,
        chunk_name: &str,
        env: Option<Rc<RefCell<LuaTable>>>,
    ) -> Result<LuaValue, CompileError> {
        let program = crate::compiler::compile(source, chunk_name)?;
        self.load_counter += 1;
        let ns = format!("ld{}$", self.load_counter);
        let const_offset = self.constants.len();
        let code_offset = self.code.len();

        let mut code = program.code;
        for instr in &mut code {
            for op in &mut instr.operands {
                match op {
                    Operand::Label(name) => *name = namespaced(&ns, name),
                    Operand::Const(idx) => *idx += const_offset,
                    _ => {}
                }
            }
        }

        for (name, pc) in program.labels {
            self.labels.insert(namespaced(&ns, &name), pc + code_offset);
        }
        self.constants.extend(program.constants);
        self.code.extend(code);

        let entry_label = namespaced(&ns, &SmolStr::new("main"));
        self.labels.insert(entry_label.clone(), code_offset);

        Ok(LuaValue::Closure(Rc::new(Closure {
            code_label: entry_label,
            upvalues: Vec::new(),
            parameter_count: 0,
            is_vararg: true,
            name: Some(SmolStr::new(chunk_name)),
            env,
        })))
    }

    /// §6 "register_foreign": installs a host function under `name` in the
    /// given table (typically the globals table or a library table).
    pub fn register_foreign(
        table: &Rc<RefCell<LuaTable>>,
        name: &str,
        func: impl Fn(&[LuaValue], &mut LuaVM) -> Result<Vec<LuaValue>, LuaError> + 'static,
    ) {
        let foreign = LuaValue::Foreign(Rc::new(Foreign::new(name, func)));
        table.borrow_mut().set(LuaValue::string(name), foreign);
    }

    pub fn open_libs(&mut self) {
        crate::stdlib::open_libs(self);
    }

    /// §6 "Execute": runs from PC 0 until `HALT`, an uncaught error, or the
    /// top-level chunk returns.
    pub fn execute(&mut self) -> Result<(), LuaErrorValue> {
        self.pc = 0;
        self.halted = false;
        match self.drive_until(|vm| vm.halted || vm.call_stack.is_empty() && vm.pc >= vm.code.len()) {
            Ok(()) => Ok(()),
            Err(LuaError::Exit) => Ok(()),
            Err(e) => Err(self.into_full_error(e)),
        }
    }

    /// Runs `step()` until `done` reports true or an error/yield escapes.
    pub(crate) fn drive_until(&mut self, done: impl Fn(&LuaVM) -> bool) -> Result<(), LuaError> {
        while !done(self) {
            if let Some(budget) = self.options.step_budget {
                if self.steps_taken >= budget {
                    return Err(self.raise_message("step budget exceeded"));
                }
            }
            self.step()?;
        }
        Ok(())
    }

    pub(crate) fn step(&mut self) -> Result<(), LuaError> {
        if self.pc >= self.code.len() {
            self.halted = true;
            return Ok(());
        }
        self.steps_taken += 1;
        let instr = self.code[self.pc].clone();
        self.events.emit(
            self.current_coroutine.borrow().id,
            self.pc,
            EventKind::InstructionStep { opcode: opcode_name(instr.opcode) },
        );
        self.dispatch(&instr)
    }

    fn dispatch(&mut self, instr: &Instruction) -> Result<(), LuaError> {
        use OpCode::*;
        let mut advance = true;
        match instr.opcode {
            Label => {}
            LoadImm | Mov | LoadConst | Clr | CmpImm => self.dispatch_load(instr)?,
            Add | Sub | Mul | Div | Idiv | Mod | Pow | Neg | Concat => {
                self.dispatch_arith(instr)?
            }
            Eq | Lt | Gt | And | Or | Not => self.dispatch_compare(instr)?,
            AndBit | OrBit | Xor | NotBit | Shl | Shr | Sar => self.dispatch_bitwise(instr)?,
            Jmp | Jz | Jnz | JmpRel => {
                advance = self.dispatch_jump(instr)?;
            }
            Param | ParamExpand | Arg | Vararg | VarargFirst | BindUpvalue => {
                self.dispatch_param(instr)?
            }
            Call | CallValue => {
                advance = self.dispatch_call(instr)?;
            }
            Return | ReturnMulti => {
                advance = self.dispatch_return(instr)?;
            }
            Result | ResultMulti | ResultList => self.dispatch_result(instr)?,
            MakeCell | CellGet | CellSet | MakeClosure => self.dispatch_closure_ops(instr)?,
            TableNew | TableSet | TableGet | TableAppend | TableExtend | ListGet => {
                self.dispatch_table(instr)?
            }
            ArrInit | ArrSet | ArrGet | ArrCopy | Len | Push | Pop => {
                self.dispatch_collection(instr)?
            }
            IsObj | IsArr | IsNull | Coalesce => self.dispatch_predicate(instr)?,
            Print => self.dispatch_print(instr)?,
            Halt => {
                self.halted = true;
                advance = false;
            }
        }
        if advance {
            self.pc += 1;
        }
        Ok(())
    }

    // ---- register access helpers ----

    pub(crate) fn reg_get(&self, name: &SmolStr) -> LuaValue {
        if name.as_str() == "_ENV" && !self.registers.contains_key(name) {
            return LuaValue::Table(self.globals.clone());
        }
        self.registers.get(name).cloned().unwrap_or(LuaValue::Nil)
    }

    pub(crate) fn reg_set(&mut self, name: &SmolStr, value: LuaValue) {
        self.registers.insert(name.clone(), value);
    }

    pub(crate) fn operand_value(&self, op: &Operand) -> LuaValue {
        match op {
            Operand::Reg(r) => self.reg_get(r),
            Operand::Int(i) => LuaValue::Int(*i),
            Operand::Float(f) => LuaValue::Float(*f),
            Operand::Const(idx) => self.constants.get(*idx).cloned().unwrap_or(LuaValue::Nil),
            Operand::Label(_) | Operand::Index(_) => LuaValue::Nil,
        }
    }

    // ---- error raising ----

    pub fn raise(&mut self, value: LuaValue) -> LuaError {
        self.pending_error = Some(value);
        self.pending_traceback = Some(self.format_traceback(0));
        LuaError::Runtime
    }

    pub fn raise_message(&mut self, message: impl Into<String>) -> LuaError {
        let located = format!("{}:{}: {}", self.source_name, self.current_line(), message.into());
        self.raise(LuaValue::string(located))
    }

    pub fn into_full_error(&mut self, kind: LuaError) -> LuaErrorValue {
        let value = self.pending_error.take().unwrap_or(LuaValue::Nil);
        let traceback = self.pending_traceback.take();
        let _ = kind;
        LuaErrorValue { value, traceback }
    }

    pub(crate) fn current_line(&self) -> u32 {
        self.code.get(self.pc).map(|i| i.debug.line).unwrap_or(0)
    }

    // ---- introspection surface (spec.md §6) ----

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            coroutines: self
                .coroutines
                .iter()
                .map(|c| {
                    let c = c.borrow();
                    CoroutineSnapshot {
                        id: c.id,
                        status: c.status.as_str(),
                        function_name: c.function_name.clone(),
                    }
                })
                .collect(),
            pc: self.pc,
            current_coroutine_id: self.current_coroutine.borrow().id,
            stack_depth: self.call_stack.len(),
        }
    }

    pub fn is_main_thread(&self) -> bool {
        Rc::ptr_eq(&self.current_coroutine, &self.main_thread)
    }
}

impl Default for LuaVM {
    fn default() -> Self {
        LuaVM::new()
    }
}

fn opcode_name(op: OpCode) -> &'static str {
    use OpCode::*;
    match op {
        LoadImm => "LOAD_IMM",
        Mov => "MOV",
        LoadConst => "LOAD_CONST",
        Clr => "CLR",
        CmpImm => "CMP_IMM",
        Add => "ADD",
        Sub => "SUB",
        Mul => "MUL",
        Div => "DIV",
        Idiv => "IDIV",
        Mod => "MOD",
        Pow => "POW",
        Neg => "NEG",
        Concat => "CONCAT",
        Eq => "EQ",
        Lt => "LT",
        Gt => "GT",
        And => "AND",
        Or => "OR",
        Not => "NOT",
        AndBit => "AND_BIT",
        OrBit => "OR_BIT",
        Xor => "XOR",
        NotBit => "NOT_BIT",
        Shl => "SHL",
        Shr => "SHR",
        Sar => "SAR",
        Label => "LABEL",
        Jmp => "JMP",
        Jz => "JZ",
        Jnz => "JNZ",
        JmpRel => "JMP_REL",
        Param => "PARAM",
        ParamExpand => "PARAM_EXPAND",
        Call => "CALL",
        CallValue => "CALL_VALUE",
        Arg => "ARG",
        Return => "RETURN",
        ReturnMulti => "RETURN_MULTI",
        Result => "RESULT",
        ResultMulti => "RESULT_MULTI",
        ResultList => "RESULT_LIST",
        Vararg => "VARARG",
        VarargFirst => "VARARG_FIRST",
        BindUpvalue => "BIND_UPVALUE",
        MakeCell => "MAKE_CELL",
        CellGet => "CELL_GET",
        CellSet => "CELL_SET",
        MakeClosure => "CLOSURE",
        TableNew => "TABLE_NEW",
        TableSet => "TABLE_SET",
        TableGet => "TABLE_GET",
        TableAppend => "TABLE_APPEND",
        TableExtend => "TABLE_EXTEND",
        ListGet => "LIST_GET",
        ArrInit => "ARR_INIT",
        ArrSet => "ARR_SET",
        ArrGet => "ARR_GET",
        ArrCopy => "ARR_COPY",
        Len => "LEN",
        Push => "PUSH",
        Pop => "POP",
        IsObj => "IS_OBJ",
        IsArr => "IS_ARR",
        IsNull => "IS_NULL",
        Coalesce => "COALESCE",
        Print => "PRINT",
        Halt => "HALT",
    }
}

fn namespaced(prefix: &str, name: &SmolStr) -> SmolStr {
    SmolStr::new(format!("{}{}", prefix, name))
}
