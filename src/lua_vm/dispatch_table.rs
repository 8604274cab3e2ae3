//! Tables, the jq-derived collection/array opcodes, predicates and
//! output (spec.md §4.1 "Tables"/"Collections"/"Predicates"/"Output").
//! The Array group uses 0-based indices, the convention the jq opcode
//! set it was reused from uses, deliberately distinct from Lua tables'
//! 1-based indexing (see DESIGN.md).

use std::cell::RefCell;
use std::rc::Rc;

use super::error::LuaError;
use super::opcode::{Instruction, OpCode};
use super::LuaVM;
use crate::lua_value::{LuaTable, LuaValue};

impl LuaVM {
    pub(crate) fn dispatch_table(&mut self, instr: &Instruction) -> Result<(), LuaError> {
        match instr.opcode {
            OpCode::TableNew => {
                let dst = instr.operands[0].reg().clone();
                self.reg_set(&dst, LuaValue::Table(Rc::new(RefCell::new(LuaTable::new()))));
            }
            OpCode::TableSet => {
                let target = self.reg_get(instr.operands[0].reg());
                let key = self.operand_value(&instr.operands[1]);
                let value = self.operand_value(&instr.operands[2]);
                self.index_set(target, key, value)?;
            }
            OpCode::TableGet => {
                let dst = instr.operands[0].reg().clone();
                let target = self.reg_get(instr.operands[1].reg());
                let key = self.operand_value(&instr.operands[2]);
                let value = self.index_get(target, key)?;
                self.reg_set(&dst, value);
            }
            OpCode::TableAppend => {
                let target = self.reg_get(instr.operands[0].reg());
                let value = self.operand_value(&instr.operands[1]);
                match target {
                    LuaValue::Table(t) => t.borrow_mut().append(value),
                    other => {
                        return Err(self.raise_message(format!(
                            "attempt to append to a {} value",
                            other.type_name()
                        )))
                    }
                }
            }
            OpCode::TableExtend => {
                let target = self.reg_get(instr.operands[0].reg());
                let values = self.reg_get(instr.operands[1].reg());
                let items: Vec<LuaValue> = match values {
                    LuaValue::List(items) => items.as_ref().clone(),
                    other => vec![other],
                };
                match target {
                    LuaValue::Table(t) => t.borrow_mut().extend(&items),
                    other => {
                        return Err(self.raise_message(format!(
                            "attempt to extend a {} value",
                            other.type_name()
                        )))
                    }
                }
            }
            OpCode::ListGet => {
                let dst = instr.operands[0].reg().clone();
                let list = self.reg_get(instr.operands[1].reg());
                let idx = self.operand_value(&instr.operands[2]).as_i64().unwrap_or(0);
                let value = match list {
                    LuaValue::List(items) => items.get(idx as usize).cloned().unwrap_or(LuaValue::Nil),
                    _ => LuaValue::Nil,
                };
                self.reg_set(&dst, value);
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    pub(crate) fn dispatch_collection(&mut self, instr: &Instruction) -> Result<(), LuaError> {
        match instr.opcode {
            OpCode::ArrInit => {
                let dst = instr.operands[0].reg().clone();
                self.reg_set(&dst, LuaValue::list(Vec::new()));
            }
            OpCode::ArrSet => {
                let dst = instr.operands[0].reg().clone();
                let idx = self.operand_value(&instr.operands[1]).as_i64().unwrap_or(0) as usize;
                let value = self.operand_value(&instr.operands[2]);
                let current = self.reg_get(&dst);
                let mut items = match current {
                    LuaValue::List(items) => items.as_ref().clone(),
                    _ => Vec::new(),
                };
                if idx >= items.len() {
                    items.resize(idx + 1, LuaValue::Nil);
                }
                items[idx] = value;
                self.reg_set(&dst, LuaValue::list(items));
            }
            OpCode::ArrGet => {
                let dst = instr.operands[0].reg().clone();
                let arr = self.reg_get(instr.operands[1].reg());
                let idx = self.operand_value(&instr.operands[2]).as_i64().unwrap_or(0);
                let value = match arr {
                    LuaValue::List(items) if idx >= 0 => {
                        items.get(idx as usize).cloned().unwrap_or(LuaValue::Nil)
                    }
                    _ => LuaValue::Nil,
                };
                self.reg_set(&dst, value);
            }
            OpCode::ArrCopy => {
                let dst = instr.operands[0].reg().clone();
                let src = self.reg_get(instr.operands[1].reg());
                let copy = match src {
                    LuaValue::List(items) => LuaValue::list(items.as_ref().clone()),
                    other => other,
                };
                self.reg_set(&dst, copy);
            }
            OpCode::Push => {
                let dst = instr.operands[0].reg().clone();
                let value = self.operand_value(&instr.operands[1]);
                let current = self.reg_get(&dst);
                let mut items = match current {
                    LuaValue::List(items) => items.as_ref().clone(),
                    _ => Vec::new(),
                };
                items.push(value);
                self.reg_set(&dst, LuaValue::list(items));
            }
            OpCode::Pop => {
                let dst = instr.operands[0].reg().clone();
                let out = instr.operands[1].reg().clone();
                let current = self.reg_get(&dst);
                let mut items = match current {
                    LuaValue::List(items) => items.as_ref().clone(),
                    _ => Vec::new(),
                };
                let popped = items.pop().unwrap_or(LuaValue::Nil);
                self.reg_set(&dst, LuaValue::list(items));
                self.reg_set(&out, popped);
            }
            OpCode::Len => {
                let dst = instr.operands[0].reg().clone();
                let src = self.reg_get(instr.operands[1].reg());
                let value = self.compute_len(src)?;
                self.reg_set(&dst, value);
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    fn compute_len(&mut self, src: LuaValue) -> Result<LuaValue, LuaError> {
        match &src {
            LuaValue::Str(s) => Ok(LuaValue::Int(s.len() as i64)),
            LuaValue::List(items) => Ok(LuaValue::Int(items.len() as i64)),
            LuaValue::Table(t) => {
                if let Some(handler) = self.len_metamethod(&src) {
                    self.call_value_nested(handler, vec![src.clone()])
                        .map(|mut r| if r.is_empty() { LuaValue::Nil } else { r.remove(0) })
                } else {
                    Ok(LuaValue::Int(t.borrow().len()))
                }
            }
            other => Err(self.raise_message(format!("attempt to get length of a {} value", other.type_name()))),
        }
    }

    pub(crate) fn dispatch_predicate(&mut self, instr: &Instruction) -> Result<(), LuaError> {
        match instr.opcode {
            OpCode::IsObj => {
                let dst = instr.operands[0].reg().clone();
                let v = self.reg_get(instr.operands[1].reg());
                self.reg_set(&dst, LuaValue::Bool(matches!(v, LuaValue::Table(_))));
            }
            OpCode::IsArr => {
                let dst = instr.operands[0].reg().clone();
                let v = self.reg_get(instr.operands[1].reg());
                self.reg_set(&dst, LuaValue::Bool(matches!(v, LuaValue::List(_))));
            }
            OpCode::IsNull => {
                let dst = instr.operands[0].reg().clone();
                let v = self.reg_get(instr.operands[1].reg());
                self.reg_set(&dst, LuaValue::Bool(v.is_nil()));
            }
            OpCode::Coalesce => {
                let dst = instr.operands[0].reg().clone();
                let a = self.operand_value(&instr.operands[1]);
                let b = self.operand_value(&instr.operands[2]);
                self.reg_set(&dst, if a.is_nil() { b } else { a });
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    pub(crate) fn dispatch_print(&mut self, instr: &Instruction) -> Result<(), LuaError> {
        match instr.opcode {
            OpCode::Print => {
                let parts: Vec<String> =
                    instr.operands.iter().map(|op| self.operand_value(op).display_string()).collect();
                self.output.push(parts.join("\t"));
            }
            _ => unreachable!(),
        }
        Ok(())
    }
}
