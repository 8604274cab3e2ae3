//! Syntax tree produced by the parser and consumed by codegen. Names
//! stay as source identifiers (`SmolStr`) all the way through; register
//! allocation happens in codegen, not here.

use smol_str::SmolStr;

#[derive(Debug, Clone)]
pub struct Block {
    pub stats: Vec<Stat>,
}

#[derive(Debug, Clone)]
pub enum Stat {
    Local { names: Vec<SmolStr>, exprs: Vec<Expr>, line: u32 },
    Assign { targets: Vec<Expr>, exprs: Vec<Expr>, line: u32 },
    Call(Expr),
    Do(Block),
    While { cond: Expr, body: Block },
    Repeat { body: Block, cond: Expr },
    If { arms: Vec<(Expr, Block)>, else_block: Option<Block> },
    NumericFor { var: SmolStr, start: Expr, stop: Expr, step: Option<Expr>, body: Block, line: u32 },
    GenericFor { names: Vec<SmolStr>, exprs: Vec<Expr>, body: Block, line: u32 },
    FunctionDecl { target: Expr, is_method: bool, body: FunctionBody, line: u32 },
    LocalFunction { name: SmolStr, body: FunctionBody, line: u32 },
    Return { exprs: Vec<Expr>, line: u32 },
    Break,
    Goto { label: SmolStr, line: u32 },
    Label(SmolStr),
}

#[derive(Debug, Clone)]
pub struct FunctionBody {
    pub params: Vec<SmolStr>,
    pub is_vararg: bool,
    pub block: Block,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Nil,
    True,
    False,
    Int(i64),
    Float(f64),
    Str(SmolStr),
    Vararg,
    Name(SmolStr),
    Index { target: Box<Expr>, key: Box<Expr> },
    Call { target: Box<Expr>, args: Vec<Expr>, line: u32 },
    MethodCall { target: Box<Expr>, method: SmolStr, args: Vec<Expr>, line: u32 },
    Function(Box<FunctionBody>),
    Table { array: Vec<Expr>, fields: Vec<(Expr, Expr)> },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr>, line: u32 },
    Unary { op: UnOp, expr: Box<Expr>, line: u32 },
    Paren(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add, Sub, Mul, Div, IDiv, Mod, Pow, Concat,
    Eq, Ne, Lt, Le, Gt, Ge,
    And, Or,
    BAnd, BOr, BXor, Shl, Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg, Not, Len, BNot,
}
