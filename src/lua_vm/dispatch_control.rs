//! Jumps, the call/return protocol, varargs and closure-cell opcodes
//! (spec.md §4.1 "Jumps"/"Calls/Returns"/"Closure", §4.2).

use std::rc::Rc;

use super::error::LuaError;
use super::frame::CallFrame;
use super::opcode::{Instruction, OpCode, Operand};
use super::LuaVM;
use crate::lua_value::{Cell, Closure, LuaValue};

impl LuaVM {
    /// Returns `true` if the caller should still advance PC by one
    /// (ordinary fallthrough), `false` if this opcode already set PC
    /// itself.
    pub(crate) fn dispatch_jump(&mut self, instr: &Instruction) -> Result<bool, LuaError> {
        match instr.opcode {
            OpCode::Jmp => {
                self.pc = self.resolve_label(instr.operands[0].label())?;
                Ok(false)
            }
            OpCode::Jz => {
                let cond = self.reg_get(instr.operands[0].reg());
                if !cond.truthy() {
                    self.pc = self.resolve_label(instr.operands[1].label())?;
                    Ok(false)
                } else {
                    Ok(true)
                }
            }
            OpCode::Jnz => {
                let cond = self.reg_get(instr.operands[0].reg());
                if cond.truthy() {
                    self.pc = self.resolve_label(instr.operands[1].label())?;
                    Ok(false)
                } else {
                    Ok(true)
                }
            }
            OpCode::JmpRel => {
                let delta = instr.operands[0].int();
                self.pc = ((self.pc as i64) + delta) as usize;
                Ok(false)
            }
            _ => unreachable!(),
        }
    }

    fn resolve_label(&mut self, label: &smol_str::SmolStr) -> Result<usize, LuaError> {
        match self.labels.get(label).copied() {
            Some(pc) => Ok(pc),
            None => {
                let label = label.clone();
                Err(self.raise_message(format!("unresolved label '{}'", label)))
            }
        }
    }

    pub(crate) fn dispatch_param(&mut self, instr: &Instruction) -> Result<(), LuaError> {
        match instr.opcode {
            OpCode::Param => {
                let v = self.reg_get(instr.operands[0].reg());
                self.pending_params.push_back(v);
            }
            OpCode::ParamExpand => {
                let v = self.reg_get(instr.operands[0].reg());
                if let LuaValue::List(items) = v {
                    for item in items.iter() {
                        self.pending_params.push_back(item.clone());
                    }
                } else {
                    self.pending_params.push_back(v);
                }
            }
            OpCode::Arg => {
                let dst = instr.operands[0].reg().clone();
                let v = self.pending_params.pop_front().unwrap_or(LuaValue::Nil);
                self.reg_set(&dst, v);
            }
            OpCode::Vararg => {
                let dst = instr.operands[0].reg().clone();
                let rest: Vec<LuaValue> = self.pending_params.drain(..).collect();
                self.reg_set(&dst, LuaValue::list(rest));
            }
            OpCode::VarargFirst => {
                let dst = instr.operands[0].reg().clone();
                let v = self.pending_params.front().cloned().unwrap_or(LuaValue::Nil);
                self.reg_set(&dst, v);
            }
            OpCode::BindUpvalue => {
                let dst = instr.operands[0].reg().clone();
                let idx = instr.operands[1].index();
                match self.current_upvalues.get(idx).cloned() {
                    Some(cell) => self.reg_set(&dst, LuaValue::Cell(cell)),
                    None => {
                        return Err(self.raise_message(format!("unresolved upvalue index {}", idx)))
                    }
                }
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    pub(crate) fn dispatch_call(&mut self, instr: &Instruction) -> Result<bool, LuaError> {
        match instr.opcode {
            OpCode::Call => {
                let label = instr.operands[0].label().clone();
                let entry = self.resolve_label(&label)?;
                if self.call_stack.len() >= 200 {
                    return Err(self.raise_message("stack overflow"));
                }
                let caller_label = self.current_function_label.clone();
                let mut frame = CallFrame::new(self.pc + 1, caller_label);
                frame.saved_registers = std::mem::take(&mut self.registers);
                frame.saved_upvalues = std::mem::take(&mut self.current_upvalues);
                self.call_stack.push(frame);
                self.current_function_label = label;
                self.pc = entry;
                Ok(false)
            }
            OpCode::CallValue => {
                let callee = self.reg_get(instr.operands[0].reg());
                self.dispatch_call_value(callee)
            }
            _ => unreachable!(),
        }
    }

    pub(crate) fn dispatch_call_value(&mut self, callee: LuaValue) -> Result<bool, LuaError> {
        match callee {
            LuaValue::Closure(closure) => {
                self.push_closure_call(&closure)?;
                Ok(false)
            }
            LuaValue::Foreign(f) => {
                let args = self.drain_params();
                let result = self.invoke_foreign(f, args)?;
                self.last_return = result;
                Ok(true)
            }
            LuaValue::Table(t) => {
                let call_fn = self.lookup_call_metamethod(&t)?;
                let mut args = self.drain_params();
                args.insert(0, LuaValue::Table(t));
                self.pending_params = args.into();
                self.dispatch_call_value(call_fn)
            }
            other => Err(self.raise_message(format!("attempt to call a {} value", other.type_name()))),
        }
    }

    pub(crate) fn dispatch_return(&mut self, instr: &Instruction) -> Result<bool, LuaError> {
        let values = self.collect_return_values(instr);
        self.last_return = values;
        match self.call_stack.pop() {
            None => {
                self.halted = true;
                Ok(false)
            }
            Some(frame) if frame.is_resume_boundary() => Err(LuaError::Exit),
            Some(frame) => {
                self.registers = frame.saved_registers;
                self.current_upvalues = frame.saved_upvalues;
                self.current_function_label = frame.function_label;
                self.pc = frame.return_pc;
                Ok(false)
            }
        }
    }

    fn collect_return_values(&self, instr: &Instruction) -> Vec<LuaValue> {
        let mut values: Vec<LuaValue> = instr.operands.iter().map(|op| self.operand_value(op)).collect();
        if matches!(instr.opcode, OpCode::ReturnMulti) {
            if let Some(LuaValue::List(items)) = values.last().cloned() {
                values.pop();
                values.extend(items.iter().cloned());
            }
        }
        values
    }

    pub(crate) fn dispatch_result(&mut self, instr: &Instruction) -> Result<(), LuaError> {
        match instr.opcode {
            OpCode::Result => {
                let dst = instr.operands[0].reg().clone();
                let v = self.last_return.first().cloned().unwrap_or(LuaValue::Nil);
                self.reg_set(&dst, v);
            }
            OpCode::ResultMulti => {
                for (i, op) in instr.operands.iter().enumerate() {
                    let dst = op.reg().clone();
                    let v = self.last_return.get(i).cloned().unwrap_or(LuaValue::Nil);
                    self.reg_set(&dst, v);
                }
            }
            OpCode::ResultList => {
                let dst = instr.operands[0].reg().clone();
                self.reg_set(&dst, LuaValue::list(self.last_return.clone()));
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    pub(crate) fn dispatch_closure_ops(&mut self, instr: &Instruction) -> Result<(), LuaError> {
        match instr.opcode {
            OpCode::MakeCell => {
                let dst = instr.operands[0].reg().clone();
                let src = self.reg_get(instr.operands[1].reg());
                self.reg_set(&dst, LuaValue::Cell(Cell::new(src)));
            }
            OpCode::CellGet => {
                let dst = instr.operands[0].reg().clone();
                let cell = self.reg_get(instr.operands[1].reg());
                let value = match cell {
                    LuaValue::Cell(c) => c.borrow().get(),
                    other => other,
                };
                self.reg_set(&dst, value);
            }
            OpCode::CellSet => {
                let cell = self.reg_get(instr.operands[0].reg());
                let value = self.reg_get(instr.operands[1].reg());
                if let LuaValue::Cell(c) = cell {
                    c.borrow_mut().set(value);
                }
            }
            OpCode::MakeClosure => {
                let dst = instr.operands[0].reg().clone();
                let label = instr.operands[1].label().clone();
                let param_count = instr.operands[2].int() as usize;
                let is_vararg = instr.operands[3].int() != 0;
                let name = match &instr.operands[4] {
                    Operand::Const(idx) => match self.constants.get(*idx) {
                        Some(LuaValue::Str(s)) => Some(s.clone()),
                        _ => None,
                    },
                    _ => None,
                };
                let upvalues = instr.operands[5..]
                    .iter()
                    .map(|op| match self.reg_get(op.reg()) {
                        LuaValue::Cell(c) => c,
                        other => Cell::new(other),
                    })
                    .collect();
                let closure =
                    Closure { code_label: label, upvalues, parameter_count: param_count, is_vararg, name, env: None };
                self.reg_set(&dst, LuaValue::Closure(Rc::new(closure)));
            }
            _ => unreachable!(),
        }
        Ok(())
    }
}
