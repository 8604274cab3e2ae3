use ahash::AHashMap;
use smol_str::SmolStr;

use super::opcode::Instruction;
use crate::lua_value::LuaValue;

/// The loadable output of the compiler: a flat instruction vector, the
/// label-to-PC table `LABEL` markers resolve to, and the constant pool
/// `LOAD_CONST`/`TABLE_GET` indices address (spec.md §4.2, "Labels are
/// resolved to PCs at load time").
pub struct Program {
    pub source_name: String,
    pub code: Vec<Instruction>,
    pub labels: AHashMap<SmolStr, usize>,
    pub constants: Vec<LuaValue>,
}

impl Program {
    pub fn new(source_name: impl Into<String>) -> Self {
        Program {
            source_name: source_name.into(),
            code: Vec::new(),
            labels: AHashMap::new(),
            constants: Vec::new(),
        }
    }
}
