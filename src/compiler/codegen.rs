//! Single-pass codegen: lowers the AST directly into the flat
//! instruction vector the whole program shares (spec.md §4.2: "Labels
//! are resolved to PCs at load time"). Every Lua local is compiled as a
//! register holding a `Cell`, read and written through
//! `CELL_GET`/`CELL_SET`; that sidesteps back-patching a local into a
//! cell only after a later nested function is found to capture it.

use std::collections::HashMap;
use std::rc::Rc;

use ahash::AHashMap;
use smol_str::SmolStr;

use super::ast::*;
use super::CompileError;
use crate::lua_value::LuaValue;
use crate::lua_vm::{DebugInfo, Instruction, OpCode, Operand, Program};

enum NameRef {
    Local(SmolStr),
    Upvalue(usize),
    Global,
}

enum UpvalueSource {
    ParentLocal(SmolStr),
    ParentUpvalue(usize),
}

struct FuncCtx {
    label: SmolStr,
    blocks: Vec<HashMap<SmolStr, SmolStr>>,
    upvalue_index: HashMap<SmolStr, usize>,
    upvalue_sources: Vec<UpvalueSource>,
    reg_counter: u32,
    loop_stack: Vec<SmolStr>,
}

impl FuncCtx {
    fn new(label: SmolStr) -> Self {
        FuncCtx {
            label,
            blocks: vec![HashMap::new()],
            upvalue_index: HashMap::new(),
            upvalue_sources: Vec::new(),
            reg_counter: 0,
            loop_stack: Vec::new(),
        }
    }

    fn fresh_reg(&mut self, tag: &str) -> SmolStr {
        let n = self.reg_counter;
        self.reg_counter += 1;
        SmolStr::new(format!("{}_{}{}", self.label, tag, n))
    }

    fn push_block(&mut self) {
        self.blocks.push(HashMap::new());
    }

    fn pop_block(&mut self) {
        self.blocks.pop();
    }

    fn declare_local(&mut self, name: &SmolStr) -> SmolStr {
        let reg = self.fresh_reg("loc");
        self.blocks.last_mut().unwrap().insert(name.clone(), reg.clone());
        reg
    }

    fn lookup_local(&self, name: &SmolStr) -> Option<SmolStr> {
        for block in self.blocks.iter().rev() {
            if let Some(r) = block.get(name) {
                return Some(r.clone());
            }
        }
        None
    }
}

fn resolve(funcs: &mut [FuncCtx], level: usize, name: &SmolStr) -> NameRef {
    if let Some(reg) = funcs[level].lookup_local(name) {
        return NameRef::Local(reg);
    }
    if let Some(&idx) = funcs[level].upvalue_index.get(name) {
        return NameRef::Upvalue(idx);
    }
    if level == 0 {
        return NameRef::Global;
    }
    match resolve(funcs, level - 1, name) {
        NameRef::Local(parent_reg) => {
            let idx = funcs[level].upvalue_sources.len();
            funcs[level].upvalue_sources.push(UpvalueSource::ParentLocal(parent_reg));
            funcs[level].upvalue_index.insert(name.clone(), idx);
            NameRef::Upvalue(idx)
        }
        NameRef::Upvalue(parent_idx) => {
            let idx = funcs[level].upvalue_sources.len();
            funcs[level].upvalue_sources.push(UpvalueSource::ParentUpvalue(parent_idx));
            funcs[level].upvalue_index.insert(name.clone(), idx);
            NameRef::Upvalue(idx)
        }
        NameRef::Global => NameRef::Global,
    }
}

pub struct CodeGen {
    code: Vec<Instruction>,
    labels: AHashMap<SmolStr, usize>,
    constants: Vec<LuaValue>,
    source_name_rc: Rc<str>,
    source_name: String,
    funcs: Vec<FuncCtx>,
    label_counter: u32,
    func_counter: u32,
    nil_const: Option<usize>,
    true_const: Option<usize>,
    false_const: Option<usize>,
}

const ENV_REG: &str = "_ENV";

impl CodeGen {
    pub fn new(source_name_rc: Rc<str>, source_name: String) -> Self {
        CodeGen {
            code: Vec::new(),
            labels: AHashMap::new(),
            constants: Vec::new(),
            source_name_rc,
            source_name,
            funcs: Vec::new(),
            label_counter: 0,
            func_counter: 0,
            nil_const: None,
            true_const: None,
            false_const: None,
        }
    }

    pub fn finish(self) -> Program {
        Program {
            source_name: self.source_name,
            code: self.code,
            labels: self.labels,
            constants: self.constants,
        }
    }

    pub fn compile_chunk(&mut self, block: &Block) -> Result<(), CompileError> {
        self.check_gotos(block)?;
        self.funcs.push(FuncCtx::new(SmolStr::new("main")));
        self.compile_block(block)?;
        self.emit(OpCode::Return, vec![], 0);
        self.funcs.pop();
        Ok(())
    }

    /// Validates every `goto` in a function body before any code for it is
    /// emitted (spec.md §4.4): the target label must be visible from the
    /// goto's block or one of its enclosing blocks within the *same*
    /// function, and a forward goto may not skip over a local declared
    /// between it and the label. Nested function literals get their own
    /// call to this, since goto/label never cross a function boundary.
    fn check_gotos(&self, block: &Block) -> Result<(), CompileError> {
        let mut stack = Vec::new();
        validate_block(block, &mut stack).map_err(|(message, line)| CompileError {
            message,
            source_name: self.source_name.clone(),
            line,
            col: 1,
        })
    }

    // ---- low-level emission helpers ----

    fn cur(&mut self) -> &mut FuncCtx {
        self.funcs.last_mut().unwrap()
    }

    fn cur_label(&self) -> SmolStr {
        self.funcs.last().unwrap().label.clone()
    }

    fn emit(&mut self, op: OpCode, operands: Vec<Operand>, line: u32) {
        let label = self.cur_label();
        let debug = DebugInfo { file: self.source_name_rc.clone(), line, col: 1, function_label: label };
        self.code.push(Instruction::new(op, operands, debug));
    }

    fn mark_label(&mut self, label: &SmolStr) {
        self.labels.insert(label.clone(), self.code.len());
    }

    fn new_label(&mut self, tag: &str) -> SmolStr {
        self.label_counter += 1;
        SmolStr::new(format!("{}_{}{}", self.cur_label(), tag, self.label_counter))
    }

    fn mangled_goto_label(&self, name: &SmolStr) -> SmolStr {
        SmolStr::new(format!("{}_lbl_{}", self.cur_label(), name))
    }

    fn const_index(&mut self, v: LuaValue) -> usize {
        self.constants.push(v);
        self.constants.len() - 1
    }

    fn const_str(&mut self, s: &str) -> usize {
        self.const_index(LuaValue::string(s))
    }

    fn nil_const(&mut self) -> usize {
        if let Some(i) = self.nil_const {
            return i;
        }
        let i = self.const_index(LuaValue::Nil);
        self.nil_const = Some(i);
        i
    }

    fn bool_const(&mut self, b: bool) -> usize {
        if b {
            if let Some(i) = self.true_const {
                return i;
            }
            let i = self.const_index(LuaValue::Bool(true));
            self.true_const = Some(i);
            i
        } else {
            if let Some(i) = self.false_const {
                return i;
            }
            let i = self.const_index(LuaValue::Bool(false));
            self.false_const = Some(i);
            i
        }
    }

    fn resolve_name(&mut self, name: &SmolStr) -> NameRef {
        let level = self.funcs.len() - 1;
        resolve(&mut self.funcs, level, name)
    }

    // ---- names ----

    fn compile_name_read(&mut self, name: &SmolStr, line: u32) -> SmolStr {
        match self.resolve_name(name) {
            NameRef::Local(reg) => {
                let dst = self.cur().fresh_reg("v");
                self.emit(OpCode::CellGet, vec![Operand::Reg(dst.clone()), Operand::Reg(reg)], line);
                dst
            }
            NameRef::Upvalue(idx) => {
                let tmp = self.cur().fresh_reg("uv");
                self.emit(OpCode::BindUpvalue, vec![Operand::Reg(tmp.clone()), Operand::Index(idx)], line);
                let dst = self.cur().fresh_reg("v");
                self.emit(OpCode::CellGet, vec![Operand::Reg(dst.clone()), Operand::Reg(tmp)], line);
                dst
            }
            NameRef::Global => {
                let dst = self.cur().fresh_reg("g");
                let idx = self.const_str(name);
                self.emit(
                    OpCode::TableGet,
                    vec![Operand::Reg(dst.clone()), Operand::Reg(SmolStr::new(ENV_REG)), Operand::Const(idx)],
                    line,
                );
                dst
            }
        }
    }

    fn compile_store_name(&mut self, name: &SmolStr, value_reg: &SmolStr, line: u32) {
        match self.resolve_name(name) {
            NameRef::Local(reg) => {
                self.emit(OpCode::CellSet, vec![Operand::Reg(reg), Operand::Reg(value_reg.clone())], line);
            }
            NameRef::Upvalue(idx) => {
                let tmp = self.cur().fresh_reg("uv");
                self.emit(OpCode::BindUpvalue, vec![Operand::Reg(tmp.clone()), Operand::Index(idx)], line);
                self.emit(OpCode::CellSet, vec![Operand::Reg(tmp), Operand::Reg(value_reg.clone())], line);
            }
            NameRef::Global => {
                let idx = self.const_str(name);
                self.emit(
                    OpCode::TableSet,
                    vec![Operand::Reg(SmolStr::new(ENV_REG)), Operand::Const(idx), Operand::Reg(value_reg.clone())],
                    line,
                );
            }
        }
    }

    fn compile_store_target(&mut self, target: &Expr, value_reg: &SmolStr, line: u32) -> Result<(), CompileError> {
        match target {
            Expr::Name(n) => {
                self.compile_store_name(n, value_reg, line);
                Ok(())
            }
            Expr::Index { target, key } => {
                let t = self.compile_expr(target)?;
                let key_op = self.compile_key_operand(key)?;
                self.emit(
                    OpCode::TableSet,
                    vec![Operand::Reg(t), key_op, Operand::Reg(value_reg.clone())],
                    line,
                );
                Ok(())
            }
            _ => Err(CompileError {
                message: "cannot assign to this expression".into(),
                source_name: self.source_name.clone(),
                line,
                col: 1,
            }),
        }
    }

    fn compile_key_operand(&mut self, key: &Expr) -> Result<Operand, CompileError> {
        if let Expr::Str(s) = key {
            Ok(Operand::Const(self.const_str(s)))
        } else {
            let reg = self.compile_expr(key)?;
            Ok(Operand::Reg(reg))
        }
    }

    // ---- statements ----

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        self.cur().push_block();
        for stat in &block.stats {
            self.compile_stat(stat)?;
        }
        self.cur().pop_block();
        Ok(())
    }

    fn compile_stat(&mut self, stat: &Stat) -> Result<(), CompileError> {
        match stat {
            Stat::Local { names, exprs, line } => {
                let values = self.compile_exprlist_adjusted(exprs, names.len())?;
                for (name, value_reg) in names.iter().zip(values.iter()) {
                    let reg = self.cur().declare_local(name);
                    self.emit(OpCode::MakeCell, vec![Operand::Reg(reg), Operand::Reg(value_reg.clone())], *line);
                }
                Ok(())
            }
            Stat::Assign { targets, exprs, line } => {
                let values = self.compile_exprlist_adjusted(exprs, targets.len())?;
                for (target, value_reg) in targets.iter().zip(values.iter()) {
                    self.compile_store_target(target, value_reg, *line)?;
                }
                Ok(())
            }
            Stat::Call(e) => {
                self.compile_call_as_list(e)?;
                Ok(())
            }
            Stat::Do(block) => self.compile_block(block),
            Stat::While { cond, body } => {
                let start = self.new_label("while_start");
                let end = self.new_label("while_end");
                self.mark_label(&start);
                let cond_reg = self.compile_expr(cond)?;
                self.emit(OpCode::Jz, vec![Operand::Reg(cond_reg), Operand::Label(end.clone())], 0);
                self.cur().loop_stack.push(end.clone());
                self.compile_block(body)?;
                self.cur().loop_stack.pop();
                self.emit(OpCode::Jmp, vec![Operand::Label(start)], 0);
                self.mark_label(&end);
                Ok(())
            }
            Stat::Repeat { body, cond } => {
                let start = self.new_label("repeat_start");
                let end = self.new_label("repeat_end");
                self.mark_label(&start);
                self.cur().push_block();
                self.cur().loop_stack.push(end.clone());
                for s in &body.stats {
                    self.compile_stat(s)?;
                }
                self.cur().loop_stack.pop();
                let cond_reg = self.compile_expr(cond)?;
                self.cur().pop_block();
                self.emit(OpCode::Jz, vec![Operand::Reg(cond_reg), Operand::Label(start)], 0);
                self.mark_label(&end);
                Ok(())
            }
            Stat::If { arms, else_block } => {
                let end = self.new_label("if_end");
                for (cond, block) in arms {
                    let next = self.new_label("if_next");
                    let cond_reg = self.compile_expr(cond)?;
                    self.emit(OpCode::Jz, vec![Operand::Reg(cond_reg), Operand::Label(next.clone())], 0);
                    self.compile_block(block)?;
                    self.emit(OpCode::Jmp, vec![Operand::Label(end.clone())], 0);
                    self.mark_label(&next);
                }
                if let Some(block) = else_block {
                    self.compile_block(block)?;
                }
                self.mark_label(&end);
                Ok(())
            }
            Stat::NumericFor { var, start, stop, step, body, line } => {
                self.compile_numeric_for(var, start, stop, step.as_ref(), body, *line)
            }
            Stat::GenericFor { names, exprs, body, line } => {
                self.compile_generic_for(names, exprs, body, *line)
            }
            Stat::FunctionDecl { target, body, line, .. } => {
                let closure_reg = self.compile_function_literal(body, None)?;
                self.compile_store_target(target, &closure_reg, *line)
            }
            Stat::LocalFunction { name, body, line } => {
                let reg = self.cur().declare_local(name);
                let nil_idx = self.nil_const();
                self.emit(OpCode::MakeCell, vec![Operand::Reg(reg.clone()), Operand::Const(nil_idx)], *line);
                let closure_reg = self.compile_function_literal(body, Some(name.clone()))?;
                self.emit(OpCode::CellSet, vec![Operand::Reg(reg), Operand::Reg(closure_reg)], *line);
                Ok(())
            }
            Stat::Return { exprs, line } => self.compile_return(exprs, *line),
            Stat::Break => {
                let target = self
                    .cur()
                    .loop_stack
                    .last()
                    .cloned()
                    .ok_or_else(|| CompileError {
                        message: "break outside a loop".into(),
                        source_name: self.source_name.clone(),
                        line: 0,
                        col: 1,
                    })?;
                self.emit(OpCode::Jmp, vec![Operand::Label(target)], 0);
                Ok(())
            }
            Stat::Goto { label, line } => {
                let target = self.mangled_goto_label(label);
                self.emit(OpCode::Jmp, vec![Operand::Label(target)], *line);
                Ok(())
            }
            Stat::Label(name) => {
                let target = self.mangled_goto_label(name);
                self.mark_label(&target);
                Ok(())
            }
        }
    }

    fn compile_numeric_for(
        &mut self,
        var: &SmolStr,
        start: &Expr,
        stop: &Expr,
        step: Option<&Expr>,
        body: &Block,
        line: u32,
    ) -> Result<(), CompileError> {
        let start_reg = self.compile_expr(start)?;
        let stop_reg = self.compile_expr(stop)?;
        let step_reg = match step {
            Some(e) => self.compile_expr(e)?,
            None => {
                let r = self.cur().fresh_reg("step");
                self.emit(OpCode::LoadImm, vec![Operand::Reg(r.clone()), Operand::Int(1)], line);
                r
            }
        };
        let i_reg = self.cur().fresh_reg("i");
        self.emit(OpCode::Mov, vec![Operand::Reg(i_reg.clone()), Operand::Reg(start_reg)], line);

        let loop_start = self.new_label("for_start");
        let loop_end = self.new_label("for_end");
        self.mark_label(&loop_start);

        let zero_reg = self.cur().fresh_reg("zero");
        self.emit(OpCode::LoadImm, vec![Operand::Reg(zero_reg.clone()), Operand::Int(0)], line);
        let step_pos = self.cur().fresh_reg("steppos");
        self.emit(
            OpCode::Gt,
            vec![Operand::Reg(step_pos.clone()), Operand::Reg(step_reg.clone()), Operand::Reg(zero_reg)],
            line,
        );
        let gt1 = self.cur().fresh_reg("gt1");
        self.emit(
            OpCode::Gt,
            vec![Operand::Reg(gt1.clone()), Operand::Reg(i_reg.clone()), Operand::Reg(stop_reg.clone())],
            line,
        );
        let le_reg = self.cur().fresh_reg("le");
        self.emit(OpCode::Not, vec![Operand::Reg(le_reg.clone()), Operand::Reg(gt1)], line);
        let gt2 = self.cur().fresh_reg("gt2");
        self.emit(
            OpCode::Gt,
            vec![Operand::Reg(gt2.clone()), Operand::Reg(stop_reg), Operand::Reg(i_reg.clone())],
            line,
        );
        let ge_reg = self.cur().fresh_reg("ge");
        self.emit(OpCode::Not, vec![Operand::Reg(ge_reg.clone()), Operand::Reg(gt2)], line);
        let a1 = self.cur().fresh_reg("a1");
        self.emit(
            OpCode::And,
            vec![Operand::Reg(a1.clone()), Operand::Reg(step_pos.clone()), Operand::Reg(le_reg)],
            line,
        );
        let not_step_pos = self.cur().fresh_reg("nsp");
        self.emit(OpCode::Not, vec![Operand::Reg(not_step_pos.clone()), Operand::Reg(step_pos)], line);
        let a2 = self.cur().fresh_reg("a2");
        self.emit(
            OpCode::And,
            vec![Operand::Reg(a2.clone()), Operand::Reg(not_step_pos), Operand::Reg(ge_reg)],
            line,
        );
        let cond = self.cur().fresh_reg("cond");
        self.emit(OpCode::Or, vec![Operand::Reg(cond.clone()), Operand::Reg(a1), Operand::Reg(a2)], line);
        self.emit(OpCode::Jz, vec![Operand::Reg(cond), Operand::Label(loop_end.clone())], line);

        self.cur().push_block();
        let var_reg = self.cur().declare_local(var);
        self.emit(OpCode::MakeCell, vec![Operand::Reg(var_reg), Operand::Reg(i_reg.clone())], line);
        self.cur().loop_stack.push(loop_end.clone());
        for s in &body.stats {
            self.compile_stat(s)?;
        }
        self.cur().loop_stack.pop();
        self.cur().pop_block();

        self.emit(OpCode::Add, vec![Operand::Reg(i_reg.clone()), Operand::Reg(i_reg), Operand::Reg(step_reg)], line);
        self.emit(OpCode::Jmp, vec![Operand::Label(loop_start)], line);
        self.mark_label(&loop_end);
        Ok(())
    }

    fn compile_generic_for(
        &mut self,
        names: &[SmolStr],
        exprs: &[Expr],
        body: &Block,
        line: u32,
    ) -> Result<(), CompileError> {
        let vals = self.compile_exprlist_adjusted(exprs, 3)?;
        let f_reg = vals[0].clone();
        let s_reg = vals[1].clone();
        let control_reg = self.cur().fresh_reg("ctrl");
        self.emit(OpCode::Mov, vec![Operand::Reg(control_reg.clone()), Operand::Reg(vals[2].clone())], line);

        let loop_start = self.new_label("gfor_start");
        let loop_end = self.new_label("gfor_end");
        self.mark_label(&loop_start);

        self.emit(OpCode::Param, vec![Operand::Reg(s_reg.clone())], line);
        self.emit(OpCode::Param, vec![Operand::Reg(control_reg.clone())], line);
        self.emit(OpCode::CallValue, vec![Operand::Reg(f_reg.clone())], line);

        let mut result_regs = Vec::new();
        let mut result_operands = Vec::new();
        for name in names {
            let r = self.cur().fresh_reg("res");
            result_operands.push(Operand::Reg(r.clone()));
            result_regs.push((name.clone(), r));
        }
        if result_regs.is_empty() {
            let r = self.cur().fresh_reg("res");
            result_operands.push(Operand::Reg(r));
        }
        self.emit(OpCode::ResultMulti, result_operands, line);

        let first_reg = result_regs
            .first()
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| self.cur().fresh_reg("discard"));
        let is_nil = self.cur().fresh_reg("isnil");
        self.emit(OpCode::IsNull, vec![Operand::Reg(is_nil.clone()), Operand::Reg(first_reg.clone())], line);
        self.emit(OpCode::Jnz, vec![Operand::Reg(is_nil), Operand::Label(loop_end.clone())], line);
        self.emit(OpCode::Mov, vec![Operand::Reg(control_reg), Operand::Reg(first_reg)], line);

        self.cur().push_block();
        for (name, value_reg) in &result_regs {
            let reg = self.cur().declare_local(name);
            self.emit(OpCode::MakeCell, vec![Operand::Reg(reg), Operand::Reg(value_reg.clone())], line);
        }
        self.cur().loop_stack.push(loop_end.clone());
        for s in &body.stats {
            self.compile_stat(s)?;
        }
        self.cur().loop_stack.pop();
        self.cur().pop_block();

        self.emit(OpCode::Jmp, vec![Operand::Label(loop_start)], line);
        self.mark_label(&loop_end);
        Ok(())
    }

    fn compile_return(&mut self, exprs: &[Expr], line: u32) -> Result<(), CompileError> {
        if exprs.is_empty() {
            self.emit(OpCode::Return, vec![], line);
            return Ok(());
        }
        let mut operands = Vec::new();
        for (i, e) in exprs.iter().enumerate() {
            let is_last = i == exprs.len() - 1;
            if is_last && matches!(e, Expr::Call { .. } | Expr::MethodCall { .. }) {
                let list = self.compile_call_as_list(e)?;
                operands.push(Operand::Reg(list));
                self.emit(OpCode::ReturnMulti, operands, line);
                return Ok(());
            }
            if is_last && matches!(e, Expr::Vararg) {
                let list = self.cur().fresh_reg("va");
                self.emit(OpCode::Vararg, vec![Operand::Reg(list.clone())], line);
                operands.push(Operand::Reg(list));
                self.emit(OpCode::ReturnMulti, operands, line);
                return Ok(());
            }
            let r = self.compile_expr(e)?;
            operands.push(Operand::Reg(r));
        }
        self.emit(OpCode::Return, operands, line);
        Ok(())
    }

    // ---- expression lists ----

    fn compile_exprlist_adjusted(&mut self, exprs: &[Expr], want: usize) -> Result<Vec<SmolStr>, CompileError> {
        let mut regs = Vec::new();
        for (i, e) in exprs.iter().enumerate() {
            let is_last = i == exprs.len() - 1;
            if is_last && want > regs.len() + 1 && matches!(e, Expr::Call { .. } | Expr::MethodCall { .. }) {
                let list = self.compile_call_as_list(e)?;
                let need = want - regs.len();
                for idx in 0..need {
                    let r = self.cur().fresh_reg("adj");
                    self.emit(
                        OpCode::ListGet,
                        vec![Operand::Reg(r.clone()), Operand::Reg(list.clone()), Operand::Int(idx as i64)],
                        0,
                    );
                    regs.push(r);
                }
                break;
            }
            if is_last && want > regs.len() + 1 && matches!(e, Expr::Vararg) {
                let list = self.cur().fresh_reg("va");
                self.emit(OpCode::Vararg, vec![Operand::Reg(list.clone())], 0);
                let need = want - regs.len();
                for idx in 0..need {
                    let r = self.cur().fresh_reg("adj");
                    self.emit(
                        OpCode::ListGet,
                        vec![Operand::Reg(r.clone()), Operand::Reg(list.clone()), Operand::Int(idx as i64)],
                        0,
                    );
                    regs.push(r);
                }
                break;
            }
            let r = self.compile_expr(e)?;
            regs.push(r);
        }
        while regs.len() < want {
            let r = self.cur().fresh_reg("nil");
            let idx = self.nil_const();
            self.emit(OpCode::LoadConst, vec![Operand::Reg(r.clone()), Operand::Const(idx)], 0);
            regs.push(r);
        }
        regs.truncate(want);
        Ok(regs)
    }

    fn compile_args(&mut self, args: &[Expr], line: u32) -> Result<(), CompileError> {
        for (i, a) in args.iter().enumerate() {
            let is_last = i == args.len() - 1;
            if is_last && matches!(a, Expr::Call { .. } | Expr::MethodCall { .. }) {
                let list = self.compile_call_as_list(a)?;
                self.emit(OpCode::ParamExpand, vec![Operand::Reg(list)], line);
            } else if is_last && matches!(a, Expr::Vararg) {
                let list = self.cur().fresh_reg("va");
                self.emit(OpCode::Vararg, vec![Operand::Reg(list.clone())], line);
                self.emit(OpCode::ParamExpand, vec![Operand::Reg(list)], line);
            } else {
                let r = self.compile_expr(a)?;
                self.emit(OpCode::Param, vec![Operand::Reg(r)], line);
            }
        }
        Ok(())
    }

    fn compile_call_as_list(&mut self, e: &Expr) -> Result<SmolStr, CompileError> {
        match e {
            Expr::Call { target, args, line } => {
                let callee = self.compile_expr(target)?;
                self.compile_args(args, *line)?;
                self.emit(OpCode::CallValue, vec![Operand::Reg(callee)], *line);
                let dst = self.cur().fresh_reg("rl");
                self.emit(OpCode::ResultList, vec![Operand::Reg(dst.clone())], *line);
                Ok(dst)
            }
            Expr::MethodCall { target, method, args, line } => {
                let obj = self.compile_expr(target)?;
                let key_idx = self.const_str(method);
                let method_reg = self.cur().fresh_reg("m");
                self.emit(
                    OpCode::TableGet,
                    vec![Operand::Reg(method_reg.clone()), Operand::Reg(obj.clone()), Operand::Const(key_idx)],
                    *line,
                );
                self.emit(OpCode::Param, vec![Operand::Reg(obj)], *line);
                self.compile_args(args, *line)?;
                self.emit(OpCode::CallValue, vec![Operand::Reg(method_reg)], *line);
                let dst = self.cur().fresh_reg("rl");
                self.emit(OpCode::ResultList, vec![Operand::Reg(dst.clone())], *line);
                Ok(dst)
            }
            _ => unreachable!("compile_call_as_list called on a non-call expression"),
        }
    }

    // ---- expressions ----

    fn compile_expr(&mut self, e: &Expr) -> Result<SmolStr, CompileError> {
        match e {
            Expr::Nil => {
                let dst = self.cur().fresh_reg("nil");
                let idx = self.nil_const();
                self.emit(OpCode::LoadConst, vec![Operand::Reg(dst.clone()), Operand::Const(idx)], 0);
                Ok(dst)
            }
            Expr::True => {
                let dst = self.cur().fresh_reg("b");
                let idx = self.bool_const(true);
                self.emit(OpCode::LoadConst, vec![Operand::Reg(dst.clone()), Operand::Const(idx)], 0);
                Ok(dst)
            }
            Expr::False => {
                let dst = self.cur().fresh_reg("b");
                let idx = self.bool_const(false);
                self.emit(OpCode::LoadConst, vec![Operand::Reg(dst.clone()), Operand::Const(idx)], 0);
                Ok(dst)
            }
            Expr::Int(i) => {
                let dst = self.cur().fresh_reg("n");
                self.emit(OpCode::LoadImm, vec![Operand::Reg(dst.clone()), Operand::Int(*i)], 0);
                Ok(dst)
            }
            Expr::Float(f) => {
                let dst = self.cur().fresh_reg("n");
                self.emit(OpCode::LoadImm, vec![Operand::Reg(dst.clone()), Operand::Float(*f)], 0);
                Ok(dst)
            }
            Expr::Str(s) => {
                let dst = self.cur().fresh_reg("s");
                let idx = self.const_str(s);
                self.emit(OpCode::LoadConst, vec![Operand::Reg(dst.clone()), Operand::Const(idx)], 0);
                Ok(dst)
            }
            Expr::Vararg => {
                let dst = self.cur().fresh_reg("va1");
                self.emit(OpCode::VarargFirst, vec![Operand::Reg(dst.clone())], 0);
                Ok(dst)
            }
            Expr::Name(n) => Ok(self.compile_name_read(n, 0)),
            Expr::Index { target, key } => {
                let t = self.compile_expr(target)?;
                let key_op = self.compile_key_operand(key)?;
                let dst = self.cur().fresh_reg("idx");
                self.emit(OpCode::TableGet, vec![Operand::Reg(dst.clone()), Operand::Reg(t), key_op], 0);
                Ok(dst)
            }
            Expr::Call { .. } | Expr::MethodCall { .. } => {
                let list = self.compile_call_as_list(e)?;
                let dst = self.cur().fresh_reg("c");
                self.emit(OpCode::ListGet, vec![Operand::Reg(dst.clone()), Operand::Reg(list), Operand::Int(0)], 0);
                Ok(dst)
            }
            Expr::Function(body) => self.compile_function_literal(body, None),
            Expr::Table { array, fields } => self.compile_table(array, fields),
            Expr::Binary { op, lhs, rhs, line } => self.compile_binary(*op, lhs, rhs, *line),
            Expr::Unary { op, expr, line } => self.compile_unary(*op, expr, *line),
            Expr::Paren(inner) => self.compile_expr(inner),
        }
    }

    fn compile_table(&mut self, array: &[Expr], fields: &[(Expr, Expr)]) -> Result<SmolStr, CompileError> {
        let dst = self.cur().fresh_reg("t");
        self.emit(OpCode::TableNew, vec![Operand::Reg(dst.clone())], 0);
        for (i, e) in array.iter().enumerate() {
            let is_last = i == array.len() - 1;
            if is_last && matches!(e, Expr::Call { .. } | Expr::MethodCall { .. }) {
                let list = self.compile_call_as_list(e)?;
                self.emit(OpCode::TableExtend, vec![Operand::Reg(dst.clone()), Operand::Reg(list)], 0);
            } else if is_last && matches!(e, Expr::Vararg) {
                let list = self.cur().fresh_reg("va");
                self.emit(OpCode::Vararg, vec![Operand::Reg(list.clone())], 0);
                self.emit(OpCode::TableExtend, vec![Operand::Reg(dst.clone()), Operand::Reg(list)], 0);
            } else {
                let r = self.compile_expr(e)?;
                self.emit(OpCode::TableAppend, vec![Operand::Reg(dst.clone()), Operand::Reg(r)], 0);
            }
        }
        for (key, value) in fields {
            let key_op = self.compile_key_operand(key)?;
            let v = self.compile_expr(value)?;
            self.emit(OpCode::TableSet, vec![Operand::Reg(dst.clone()), key_op, Operand::Reg(v)], 0);
        }
        Ok(dst)
    }

    fn compile_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, line: u32) -> Result<SmolStr, CompileError> {
        match op {
            BinOp::And => {
                let a = self.compile_expr(lhs)?;
                let dst = self.cur().fresh_reg("and");
                let false_label = self.new_label("and_false");
                let end_label = self.new_label("and_end");
                self.emit(OpCode::Jz, vec![Operand::Reg(a.clone()), Operand::Label(false_label.clone())], line);
                let b = self.compile_expr(rhs)?;
                self.emit(OpCode::Mov, vec![Operand::Reg(dst.clone()), Operand::Reg(b)], line);
                self.emit(OpCode::Jmp, vec![Operand::Label(end_label.clone())], line);
                self.mark_label(&false_label);
                self.emit(OpCode::Mov, vec![Operand::Reg(dst.clone()), Operand::Reg(a)], line);
                self.mark_label(&end_label);
                Ok(dst)
            }
            BinOp::Or => {
                let a = self.compile_expr(lhs)?;
                let dst = self.cur().fresh_reg("or");
                let true_label = self.new_label("or_true");
                let end_label = self.new_label("or_end");
                self.emit(OpCode::Jnz, vec![Operand::Reg(a.clone()), Operand::Label(true_label.clone())], line);
                let b = self.compile_expr(rhs)?;
                self.emit(OpCode::Mov, vec![Operand::Reg(dst.clone()), Operand::Reg(b)], line);
                self.emit(OpCode::Jmp, vec![Operand::Label(end_label.clone())], line);
                self.mark_label(&true_label);
                self.emit(OpCode::Mov, vec![Operand::Reg(dst.clone()), Operand::Reg(a)], line);
                self.mark_label(&end_label);
                Ok(dst)
            }
            BinOp::Div => {
                let a = self.compile_expr(lhs)?;
                let b = self.compile_expr(rhs)?;
                let coerced = self.cur().fresh_reg("fdiv");
                self.emit(
                    OpCode::Add,
                    vec![Operand::Reg(coerced.clone()), Operand::Reg(a), Operand::Float(0.0)],
                    line,
                );
                let dst = self.cur().fresh_reg("div");
                self.emit(OpCode::Div, vec![Operand::Reg(dst.clone()), Operand::Reg(coerced), Operand::Reg(b)], line);
                Ok(dst)
            }
            BinOp::Ne => {
                let a = self.compile_expr(lhs)?;
                let b = self.compile_expr(rhs)?;
                let eq = self.cur().fresh_reg("eq");
                self.emit(OpCode::Eq, vec![Operand::Reg(eq.clone()), Operand::Reg(a), Operand::Reg(b)], line);
                let dst = self.cur().fresh_reg("ne");
                self.emit(OpCode::Not, vec![Operand::Reg(dst.clone()), Operand::Reg(eq)], line);
                Ok(dst)
            }
            BinOp::Le => {
                let a = self.compile_expr(lhs)?;
                let b = self.compile_expr(rhs)?;
                let gt = self.cur().fresh_reg("gt");
                self.emit(OpCode::Gt, vec![Operand::Reg(gt.clone()), Operand::Reg(a), Operand::Reg(b)], line);
                let dst = self.cur().fresh_reg("le");
                self.emit(OpCode::Not, vec![Operand::Reg(dst.clone()), Operand::Reg(gt)], line);
                Ok(dst)
            }
            BinOp::Ge => {
                let a = self.compile_expr(lhs)?;
                let b = self.compile_expr(rhs)?;
                let lt = self.cur().fresh_reg("lt");
                self.emit(OpCode::Lt, vec![Operand::Reg(lt.clone()), Operand::Reg(a), Operand::Reg(b)], line);
                let dst = self.cur().fresh_reg("ge");
                self.emit(OpCode::Not, vec![Operand::Reg(dst.clone()), Operand::Reg(lt)], line);
                Ok(dst)
            }
            _ => {
                let a = self.compile_expr(lhs)?;
                let b = self.compile_expr(rhs)?;
                let opcode = match op {
                    BinOp::Add => OpCode::Add,
                    BinOp::Sub => OpCode::Sub,
                    BinOp::Mul => OpCode::Mul,
                    BinOp::IDiv => OpCode::Idiv,
                    BinOp::Mod => OpCode::Mod,
                    BinOp::Pow => OpCode::Pow,
                    BinOp::Concat => OpCode::Concat,
                    BinOp::Eq => OpCode::Eq,
                    BinOp::Lt => OpCode::Lt,
                    BinOp::Gt => OpCode::Gt,
                    BinOp::BAnd => OpCode::AndBit,
                    BinOp::BOr => OpCode::OrBit,
                    BinOp::BXor => OpCode::Xor,
                    BinOp::Shl => OpCode::Shl,
                    BinOp::Shr => OpCode::Shr,
                    _ => unreachable!(),
                };
                let dst = self.cur().fresh_reg("bin");
                self.emit(opcode, vec![Operand::Reg(dst.clone()), Operand::Reg(a), Operand::Reg(b)], line);
                Ok(dst)
            }
        }
    }

    fn compile_unary(&mut self, op: UnOp, expr: &Expr, line: u32) -> Result<SmolStr, CompileError> {
        let a = self.compile_expr(expr)?;
        let opcode = match op {
            UnOp::Neg => OpCode::Neg,
            UnOp::Not => OpCode::Not,
            UnOp::Len => OpCode::Len,
            UnOp::BNot => OpCode::NotBit,
        };
        let dst = self.cur().fresh_reg("un");
        self.emit(opcode, vec![Operand::Reg(dst.clone()), Operand::Reg(a)], line);
        Ok(dst)
    }

    fn compile_function_literal(&mut self, fb: &FunctionBody, name: Option<SmolStr>) -> Result<SmolStr, CompileError> {
        self.func_counter += 1;
        let func_label = SmolStr::new(format!("f{}", self.func_counter));
        let over_label = self.new_label("fend");
        let line = fb.line;

        self.check_gotos(&fb.block)?;
        self.emit(OpCode::Jmp, vec![Operand::Label(over_label.clone())], line);
        self.mark_label(&func_label);
        self.funcs.push(FuncCtx::new(func_label.clone()));

        for p in &fb.params {
            let reg = self.cur().declare_local(p);
            let tmp = self.cur().fresh_reg("arg");
            self.emit(OpCode::Arg, vec![Operand::Reg(tmp.clone())], line);
            self.emit(OpCode::MakeCell, vec![Operand::Reg(reg), Operand::Reg(tmp)], line);
        }

        self.compile_block(&fb.block)?;
        self.emit(OpCode::Return, vec![], line);

        let ctx = self.funcs.pop().unwrap();
        self.mark_label(&over_label);

        let dst = self.cur().fresh_reg("clo");
        let mut operands = vec![
            Operand::Reg(dst.clone()),
            Operand::Label(func_label),
            Operand::Int(fb.params.len() as i64),
            Operand::Int(if fb.is_vararg { 1 } else { 0 }),
        ];
        match name {
            Some(n) => {
                let idx = self.const_str(&n);
                operands.push(Operand::Const(idx));
            }
            None => operands.push(Operand::Int(0)),
        }
        for src in &ctx.upvalue_sources {
            let reg = match src {
                UpvalueSource::ParentLocal(parent_reg) => parent_reg.clone(),
                UpvalueSource::ParentUpvalue(parent_idx) => {
                    let tmp = self.cur().fresh_reg("puv");
                    self.emit(OpCode::BindUpvalue, vec![Operand::Reg(tmp.clone()), Operand::Index(*parent_idx)], line);
                    tmp
                }
            };
            operands.push(Operand::Reg(reg));
        }
        self.emit(OpCode::MakeClosure, operands, line);
        Ok(dst)
    }
}

/// Walks one function body's blocks, checking every `goto` as it's found.
/// `stack` holds, for each enclosing block outward from `block`, the block
/// itself and the index of the statement through which control descends
/// into the next block in — the frame a label lookup climbs through.
fn validate_block<'a>(block: &'a Block, stack: &mut Vec<(&'a Block, usize)>) -> Result<(), (String, u32)> {
    for (idx, stat) in block.stats.iter().enumerate() {
        match stat {
            Stat::Goto { label, line } => resolve_goto(block, idx, stack, label, *line)?,
            Stat::Do(inner) => {
                stack.push((block, idx));
                let r = validate_block(inner, stack);
                stack.pop();
                r?;
            }
            Stat::While { body, .. } | Stat::NumericFor { body, .. } | Stat::GenericFor { body, .. } => {
                stack.push((block, idx));
                let r = validate_block(body, stack);
                stack.pop();
                r?;
            }
            Stat::Repeat { body, .. } => {
                stack.push((block, idx));
                let r = validate_block(body, stack);
                stack.pop();
                r?;
            }
            Stat::If { arms, else_block } => {
                stack.push((block, idx));
                let mut result = Ok(());
                for (_, arm_block) in arms {
                    result = validate_block(arm_block, stack);
                    if result.is_err() {
                        break;
                    }
                }
                if result.is_ok() {
                    if let Some(else_block) = else_block {
                        result = validate_block(else_block, stack);
                    }
                }
                stack.pop();
                result?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn resolve_goto(
    block: &Block,
    goto_idx: usize,
    stack: &[(&Block, usize)],
    label: &SmolStr,
    line: u32,
) -> Result<(), (String, u32)> {
    if let Some(label_idx) = find_label(block, label) {
        return check_forward_violation(block, goto_idx, label_idx, line);
    }
    for &(ancestor, descend_idx) in stack.iter().rev() {
        if let Some(label_idx) = find_label(ancestor, label) {
            return check_forward_violation(ancestor, descend_idx, label_idx, line);
        }
    }
    Err((format!("no visible label '{}' for goto", label), line))
}

fn find_label(block: &Block, label: &SmolStr) -> Option<usize> {
    block.stats.iter().position(|s| matches!(s, Stat::Label(n) if n == label))
}

/// A forward goto (label textually after the point it departs from, within
/// the block that resolves it) may not skip a local declaration — that
/// would let the label's code see an uninitialized local.
fn check_forward_violation(block: &Block, from_idx: usize, label_idx: usize, line: u32) -> Result<(), (String, u32)> {
    if label_idx > from_idx {
        for stat in &block.stats[from_idx + 1..label_idx] {
            if matches!(stat, Stat::Local { .. } | Stat::LocalFunction { .. }) {
                return Err(("goto jumps into the scope of a local variable".to_string(), line));
            }
        }
    }
    Ok(())
}
