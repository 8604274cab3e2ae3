//! Metamethod lookup and dispatch (spec.md §4.1 "Arithmetic"/"Tables"
//! notes, §9 "Dynamic dispatch"). Chain-walking is bounded by
//! `VmOptions::metatable_chain_depth` to turn a cyclic `__index` chain
//! into a catchable error instead of a host stack overflow.

use super::error::LuaError;
use super::LuaVM;
use crate::lua_value::LuaValue;

const ARITH_METAMETHODS: &[(&str, &str)] = &[
    ("__add", "add"),
    ("__sub", "sub"),
    ("__mul", "mul"),
    ("__div", "div"),
    ("__idiv", "idiv"),
    ("__mod", "mod"),
    ("__pow", "pow"),
];

impl LuaVM {
    fn metamethod(&self, value: &LuaValue, name: &str) -> Option<LuaValue> {
        let mt = value.metatable_of()?;
        let handler = mt.borrow().get(&LuaValue::string(name));
        if handler.is_nil() {
            None
        } else {
            Some(handler)
        }
    }

    /// Looks up a binary arithmetic metamethod on either operand, Lua's
    /// left-then-right order.
    pub(crate) fn arith_metamethod(&self, op_index: usize, a: &LuaValue, b: &LuaValue) -> Option<LuaValue> {
        let name = ARITH_METAMETHODS[op_index].0;
        self.metamethod(a, name).or_else(|| self.metamethod(b, name))
    }

    pub(crate) fn dispatch_binary_metamethod(
        &mut self,
        handler: LuaValue,
        a: LuaValue,
        b: LuaValue,
    ) -> Result<LuaValue, LuaError> {
        let mut results = self.call_value_nested(handler, vec![a, b])?;
        Ok(if results.is_empty() { LuaValue::Nil } else { results.remove(0) })
    }

    pub(crate) fn unm_metamethod(&self, v: &LuaValue) -> Option<LuaValue> {
        self.metamethod(v, "__unm")
    }

    pub(crate) fn concat_metamethod(&self, a: &LuaValue, b: &LuaValue) -> Option<LuaValue> {
        self.metamethod(a, "__concat").or_else(|| self.metamethod(b, "__concat"))
    }

    pub(crate) fn len_metamethod(&self, v: &LuaValue) -> Option<LuaValue> {
        self.metamethod(v, "__len")
    }

    pub(crate) fn eq_metamethod(&self, a: &LuaValue, b: &LuaValue) -> Option<LuaValue> {
        self.metamethod(a, "__eq").or_else(|| self.metamethod(b, "__eq"))
    }

    /// `__index` chain walk: table lookups that miss the raw table fall
    /// through to the metatable's `__index`, which may itself be a table
    /// (walk again) or a function (call it with `(table, key)`).
    pub fn index_get(&mut self, table_val: LuaValue, key: LuaValue) -> Result<LuaValue, LuaError> {
        let mut current = table_val;
        for _ in 0..self.options.metatable_chain_depth {
            let table = match &current {
                LuaValue::Table(t) => t.clone(),
                other => {
                    return Err(self.raise_message(format!(
                        "attempt to index a {} value",
                        other.type_name()
                    )))
                }
            };
            let raw = table.borrow().get(&key);
            if !raw.is_nil() {
                return Ok(raw);
            }
            let handler = self.metamethod(&current, "__index");
            match handler {
                None => return Ok(LuaValue::Nil),
                Some(LuaValue::Table(_)) => {
                    current = handler.unwrap();
                    continue;
                }
                Some(f) => {
                    let mut results = self.call_value_nested(f, vec![current, key])?;
                    return Ok(if results.is_empty() { LuaValue::Nil } else { results.remove(0) });
                }
            }
        }
        Err(self.raise_message("'__index' chain too long; possible loop"))
    }

    /// `__newindex` chain walk, mirroring `index_get`.
    pub fn index_set(&mut self, table_val: LuaValue, key: LuaValue, value: LuaValue) -> Result<(), LuaError> {
        let mut current = table_val;
        for _ in 0..self.options.metatable_chain_depth {
            let table = match &current {
                LuaValue::Table(t) => t.clone(),
                other => {
                    return Err(self.raise_message(format!(
                        "attempt to index a {} value",
                        other.type_name()
                    )))
                }
            };
            let has_raw = !table.borrow().get(&key).is_nil();
            if has_raw {
                table.borrow_mut().set(key, value);
                return Ok(());
            }
            let handler = self.metamethod(&current, "__newindex");
            match handler {
                None => {
                    table.borrow_mut().set(key, value);
                    return Ok(());
                }
                Some(LuaValue::Table(_)) => {
                    current = handler.unwrap();
                    continue;
                }
                Some(f) => {
                    self.call_value_nested(f, vec![current, key, value])?;
                    return Ok(());
                }
            }
        }
        Err(self.raise_message("'__newindex' chain too long; possible loop"))
    }

}

pub(crate) fn arith_op_index(opcode: super::opcode::OpCode) -> usize {
    use super::opcode::OpCode::*;
    match opcode {
        Add => 0,
        Sub => 1,
        Mul => 2,
        Div => 3,
        Idiv => 4,
        Mod => 5,
        Pow => 6,
        other => panic!("not an arithmetic opcode: {:?}", other),
    }
}
