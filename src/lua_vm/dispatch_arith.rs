//! Arithmetic, comparison and bitwise opcode groups (spec.md §4.1).

use super::error::LuaError;
use super::metamethod::arith_op_index;
use super::opcode::{Instruction, OpCode};
use super::LuaVM;
use crate::lua_value::LuaValue;

impl LuaVM {
    pub(crate) fn dispatch_arith(&mut self, instr: &Instruction) -> Result<(), LuaError> {
        let dst = instr.operands[0].reg().clone();
        let a = self.operand_value(&instr.operands[1]);
        match instr.opcode {
            OpCode::Neg => {
                let result = match a.to_number() {
                    Some(LuaValue::Int(i)) => LuaValue::Int(-i),
                    Some(LuaValue::Float(f)) => LuaValue::Float(-f),
                    _ => {
                        if let Some(handler) = self.unm_metamethod(&a) {
                            self.dispatch_binary_metamethod(handler, a.clone(), a)?
                        } else {
                            return Err(self.type_error_arith(&a, &a));
                        }
                    }
                };
                self.reg_set(&dst, result);
                return Ok(());
            }
            OpCode::Concat => {
                let b = self.operand_value(&instr.operands[2]);
                let result = match (a.concat_string(), b.concat_string()) {
                    (Some(sa), Some(sb)) => LuaValue::string(format!("{}{}", sa, sb)),
                    _ => {
                        if let Some(handler) = self.concat_metamethod(&a, &b) {
                            self.dispatch_binary_metamethod(handler, a.clone(), b.clone())?
                        } else {
                            return Err(self.type_error_concat(&a, &b));
                        }
                    }
                };
                self.reg_set(&dst, result);
                return Ok(());
            }
            _ => {}
        }

        let b = self.operand_value(&instr.operands[2]);
        let result = self.numeric_binop(instr.opcode, &a, &b)?;
        self.reg_set(&dst, result);
        Ok(())
    }

    fn numeric_binop(&mut self, op: OpCode, a: &LuaValue, b: &LuaValue) -> Result<LuaValue, LuaError> {
        let na = a.to_number();
        let nb = b.to_number();
        if let (Some(na), Some(nb)) = (na, nb) {
            return apply_numeric(self, op, &na, &nb);
        }
        let idx = arith_op_index(op);
        if let Some(handler) = self.arith_metamethod(idx, a, b) {
            return self.dispatch_binary_metamethod(handler, a.clone(), b.clone());
        }
        Err(self.type_error_arith(a, b))
    }

    fn type_error_arith(&mut self, a: &LuaValue, b: &LuaValue) -> LuaError {
        let culprit = if a.to_number().is_none() { a } else { b };
        self.raise_message(format!("attempt to perform arithmetic on a {} value", culprit.type_name()))
    }

    fn type_error_concat(&mut self, a: &LuaValue, b: &LuaValue) -> LuaError {
        let culprit = if a.concat_string().is_none() { a } else { b };
        self.raise_message(format!("attempt to concatenate a {} value", culprit.type_name()))
    }

    pub(crate) fn dispatch_compare(&mut self, instr: &Instruction) -> Result<(), LuaError> {
        let dst = instr.operands[0].reg().clone();
        match instr.opcode {
            OpCode::Not => {
                let a = self.operand_value(&instr.operands[1]);
                self.reg_set(&dst, LuaValue::Bool(!a.truthy()));
            }
            OpCode::And => {
                let a = self.operand_value(&instr.operands[1]);
                let b = self.operand_value(&instr.operands[2]);
                self.reg_set(&dst, LuaValue::Bool(a.truthy() && b.truthy()));
            }
            OpCode::Or => {
                let a = self.operand_value(&instr.operands[1]);
                let b = self.operand_value(&instr.operands[2]);
                self.reg_set(&dst, LuaValue::Bool(a.truthy() || b.truthy()));
            }
            OpCode::Eq => {
                let a = self.operand_value(&instr.operands[1]);
                let b = self.operand_value(&instr.operands[2]);
                let result = self.values_equal(&a, &b)?;
                self.reg_set(&dst, LuaValue::Bool(result));
            }
            OpCode::Lt | OpCode::Gt => {
                let a = self.operand_value(&instr.operands[1]);
                let b = self.operand_value(&instr.operands[2]);
                let (a, b) = if matches!(instr.opcode, OpCode::Gt) { (b, a) } else { (a, b) };
                let result = self.values_less_than(&a, &b)?;
                self.reg_set(&dst, LuaValue::Bool(result));
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    fn values_equal(&mut self, a: &LuaValue, b: &LuaValue) -> Result<bool, LuaError> {
        if a.raw_eq(b) {
            return Ok(true);
        }
        if matches!((a, b), (LuaValue::Table(_), LuaValue::Table(_))) {
            if let Some(handler) = self.eq_metamethod(a, b) {
                let result = self.dispatch_binary_metamethod(handler, a.clone(), b.clone())?;
                return Ok(result.truthy());
            }
        }
        Ok(false)
    }

    fn values_less_than(&mut self, a: &LuaValue, b: &LuaValue) -> Result<bool, LuaError> {
        match (a, b) {
            (LuaValue::Int(_) | LuaValue::Float(_), LuaValue::Int(_) | LuaValue::Float(_)) => {
                Ok(a.as_f64().unwrap() < b.as_f64().unwrap())
            }
            (LuaValue::Str(sa), LuaValue::Str(sb)) => Ok(sa < sb),
            _ => {
                if let Some(handler) = self.metamethod_lt(a, b) {
                    let result = self.dispatch_binary_metamethod(handler, a.clone(), b.clone())?;
                    Ok(result.truthy())
                } else {
                    Err(self.raise_message(format!(
                        "attempt to compare {} with {}",
                        a.type_name(),
                        b.type_name()
                    )))
                }
            }
        }
    }

    fn metamethod_lt(&self, a: &LuaValue, b: &LuaValue) -> Option<LuaValue> {
        a.metatable_of()
            .and_then(|mt| {
                let h = mt.borrow().get(&LuaValue::string("__lt"));
                if h.is_nil() { None } else { Some(h) }
            })
            .or_else(|| {
                b.metatable_of().and_then(|mt| {
                    let h = mt.borrow().get(&LuaValue::string("__lt"));
                    if h.is_nil() { None } else { Some(h) }
                })
            })
    }

    pub(crate) fn dispatch_bitwise(&mut self, instr: &Instruction) -> Result<(), LuaError> {
        let dst = instr.operands[0].reg().clone();
        let a = self.operand_value(&instr.operands[1]);
        if matches!(instr.opcode, OpCode::NotBit) {
            let ia = self.to_bitwise_int(&a)?;
            self.reg_set(&dst, LuaValue::Int(!ia));
            return Ok(());
        }
        let b = self.operand_value(&instr.operands[2]);
        let ia = self.to_bitwise_int(&a)?;
        let ib = self.to_bitwise_int(&b)?;
        let result = match instr.opcode {
            OpCode::AndBit => ia & ib,
            OpCode::OrBit => ia | ib,
            OpCode::Xor => ia ^ ib,
            OpCode::Shl => shift_left(ia, ib),
            OpCode::Shr => shift_right_logical(ia, ib),
            OpCode::Sar => shift_right_arith(ia, ib),
            _ => unreachable!(),
        };
        self.reg_set(&dst, LuaValue::Int(result));
        Ok(())
    }

    fn to_bitwise_int(&mut self, v: &LuaValue) -> Result<i64, LuaError> {
        match v.as_i64() {
            Some(i) => Ok(i),
            None => Err(self.raise_message(format!(
                "attempt to perform bitwise operation on a {} value",
                v.type_name()
            ))),
        }
    }

    pub(crate) fn dispatch_load(&mut self, instr: &Instruction) -> Result<(), LuaError> {
        match instr.opcode {
            OpCode::LoadImm => {
                let dst = instr.operands[0].reg().clone();
                let value = self.operand_value(&instr.operands[1]);
                self.reg_set(&dst, value);
            }
            OpCode::Mov => {
                let dst = instr.operands[0].reg().clone();
                let value = self.operand_value(&instr.operands[1]);
                self.reg_set(&dst, value);
            }
            OpCode::LoadConst => {
                let dst = instr.operands[0].reg().clone();
                let idx = instr.operands[1].index();
                let value = self.constants.get(idx).cloned().unwrap_or(LuaValue::Nil);
                self.reg_set(&dst, value);
            }
            OpCode::Clr => {
                let dst = instr.operands[0].reg().clone();
                self.reg_set(&dst, LuaValue::Nil);
            }
            OpCode::CmpImm => {
                let dst = instr.operands[0].reg().clone();
                let a = self.operand_value(&instr.operands[1]);
                let imm = self.operand_value(&instr.operands[2]);
                self.reg_set(&dst, LuaValue::Bool(a.raw_eq(&imm)));
            }
            _ => unreachable!(),
        }
        Ok(())
    }
}

/// Floor division on integers: matches Lua's `luai_numidiv`, which floors
/// toward negative infinity rather than truncating toward zero.
fn int_floor_div(ia: i64, ib: i64) -> i64 {
    let q = ia / ib;
    let r = ia % ib;
    if r != 0 && (r < 0) != (ib < 0) { q - 1 } else { q }
}

/// Floor modulo on integers: matches Lua's `luai_nummod`, whose result
/// always carries the sign of the divisor.
fn int_floor_mod(ia: i64, ib: i64) -> i64 {
    let r = ia % ib;
    if r != 0 && (r < 0) != (ib < 0) { r + ib } else { r }
}

fn apply_numeric(vm: &mut LuaVM, op: OpCode, a: &LuaValue, b: &LuaValue) -> Result<LuaValue, LuaError> {
    let both_int = matches!((a, b), (LuaValue::Int(_), LuaValue::Int(_)));
    let result = match op {
        OpCode::Add if both_int => LuaValue::Int(a.as_i64().unwrap().wrapping_add(b.as_i64().unwrap())),
        OpCode::Add => LuaValue::Float(a.as_f64().unwrap() + b.as_f64().unwrap()),
        OpCode::Sub if both_int => LuaValue::Int(a.as_i64().unwrap().wrapping_sub(b.as_i64().unwrap())),
        OpCode::Sub => LuaValue::Float(a.as_f64().unwrap() - b.as_f64().unwrap()),
        OpCode::Mul if both_int => LuaValue::Int(a.as_i64().unwrap().wrapping_mul(b.as_i64().unwrap())),
        OpCode::Mul => LuaValue::Float(a.as_f64().unwrap() * b.as_f64().unwrap()),
        OpCode::Div if both_int => {
            let (ia, ib) = (a.as_i64().unwrap(), b.as_i64().unwrap());
            if ib == 0 {
                return Err(vm.raise_message("attempt to perform 'n/0'"));
            }
            LuaValue::Int(int_floor_div(ia, ib))
        }
        OpCode::Div => LuaValue::Float(a.as_f64().unwrap() / b.as_f64().unwrap()),
        OpCode::Pow => LuaValue::Float(a.as_f64().unwrap().powf(b.as_f64().unwrap())),
        OpCode::Idiv if both_int => {
            let (ia, ib) = (a.as_i64().unwrap(), b.as_i64().unwrap());
            if ib == 0 {
                return Err(vm.raise_message("attempt to perform 'n//0'"));
            }
            LuaValue::Int(int_floor_div(ia, ib))
        }
        OpCode::Idiv => LuaValue::Float((a.as_f64().unwrap() / b.as_f64().unwrap()).floor()),
        OpCode::Mod if both_int => {
            let (ia, ib) = (a.as_i64().unwrap(), b.as_i64().unwrap());
            if ib == 0 {
                return Err(vm.raise_message("attempt to perform 'n%%0'"));
            }
            LuaValue::Int(int_floor_mod(ia, ib))
        }
        OpCode::Mod => {
            let (fa, fb) = (a.as_f64().unwrap(), b.as_f64().unwrap());
            LuaValue::Float(fa - (fa / fb).floor() * fb)
        }
        _ => unreachable!(),
    };
    Ok(result)
}

fn shift_left(a: i64, b: i64) -> i64 {
    if b <= -64 || b >= 64 {
        0
    } else if b >= 0 {
        ((a as u64) << b) as i64
    } else {
        ((a as u64) >> -b) as i64
    }
}

fn shift_right_logical(a: i64, b: i64) -> i64 {
    shift_left(a, -b)
}

fn shift_right_arith(a: i64, b: i64) -> i64 {
    if b <= -64 || b >= 64 {
        if a < 0 { -1 } else { 0 }
    } else if b >= 0 {
        a >> b
    } else {
        shift_left(a, -b)
    }
}
