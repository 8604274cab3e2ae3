use std::rc::Rc;

use smol_str::SmolStr;

/// The full opcode contract from spec.md §4.1, grouped as documented
/// there. `Label` is a load-time-only marker: the loader resolves every
/// `Label` to a PC and the executing dispatch loop never sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    // Load/Move
    LoadImm,
    Mov,
    LoadConst,
    Clr,
    CmpImm,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Idiv,
    Mod,
    Pow,
    Neg,
    Concat,

    // Compare/Logic
    Eq,
    Lt,
    Gt,
    And,
    Or,
    Not,

    // Bitwise
    AndBit,
    OrBit,
    Xor,
    NotBit,
    Shl,
    Shr,
    Sar,

    // Jumps
    Label,
    Jmp,
    Jz,
    Jnz,
    JmpRel,

    // Calls/Returns
    Param,
    ParamExpand,
    Call,
    CallValue,
    Arg,
    Return,
    ReturnMulti,
    Result,
    ResultMulti,
    ResultList,
    Vararg,
    VarargFirst,
    BindUpvalue,

    // Closure
    MakeCell,
    CellGet,
    CellSet,
    MakeClosure,

    // Tables
    TableNew,
    TableSet,
    TableGet,
    TableAppend,
    TableExtend,
    ListGet,

    // Collections/Arrays (legacy; reused by the jq front-end)
    ArrInit,
    ArrSet,
    ArrGet,
    ArrCopy,
    Len,
    Push,
    Pop,

    // Predicates/Coalesce
    IsObj,
    IsArr,
    IsNull,
    Coalesce,

    // Output/Halt
    Print,
    Halt,
}

/// A single instruction operand. The compiler emits symbolic register
/// names (spec.md §4.2: "register map ... keyed by symbolic name") rather
/// than numeric stack slots.
#[derive(Debug, Clone)]
pub enum Operand {
    Reg(SmolStr),
    Int(i64),
    Float(f64),
    Const(usize),
    Label(SmolStr),
    Index(usize),
}

impl Operand {
    pub fn reg(&self) -> &SmolStr {
        match self {
            Operand::Reg(r) => r,
            other => panic!("expected register operand, got {:?}", other),
        }
    }

    pub fn label(&self) -> &SmolStr {
        match self {
            Operand::Label(l) => l,
            other => panic!("expected label operand, got {:?}", other),
        }
    }

    pub fn int(&self) -> i64 {
        match self {
            Operand::Int(i) => *i,
            other => panic!("expected int operand, got {:?}", other),
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Operand::Index(i) => *i,
            Operand::Const(i) => *i,
            other => panic!("expected index operand, got {:?}", other),
        }
    }
}

/// Per-instruction debug metadata: file/line/column span plus the
/// enclosing function's display label, carried through to traceback
/// formatting (spec.md §4.7).
#[derive(Debug, Clone)]
pub struct DebugInfo {
    pub file: Rc<str>,
    pub line: u32,
    pub col: u32,
    pub function_label: SmolStr,
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: OpCode,
    pub operands: Vec<Operand>,
    pub debug: DebugInfo,
}

impl Instruction {
    pub fn new(opcode: OpCode, operands: Vec<Operand>, debug: DebugInfo) -> Self {
        Instruction { opcode, operands, debug }
    }
}
