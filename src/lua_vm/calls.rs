//! Shared call machinery used by the `CALL_VALUE` dispatch handler, by
//! metamethod dispatch, and by stdlib functions that invoke a Lua value
//! synchronously (`pcall`, `table.sort`'s comparator, `string.gsub`'s
//! replacement function). See spec.md §4.2 points 1-3 and §5 scenario 3.

use std::rc::Rc;

use smol_str::SmolStr;

use super::error::LuaError;
use super::foreign::Foreign;
use super::frame::CallFrame;
use super::LuaVM;
use crate::lua_value::{Closure, LuaTable, LuaValue};

impl LuaVM {
    /// Drains the entire pending-parameter queue into a plain vector, the
    /// calling convention foreign functions receive (spec.md §4.2 point 1).
    pub(crate) fn drain_params(&mut self) -> Vec<LuaValue> {
        self.pending_params.drain(..).collect()
    }

    /// Pushes a suspended-caller frame and jumps PC to the closure's entry
    /// label. Does not run anything; the enclosing dispatch loop's next
    /// `step()` continues inside the callee.
    pub(crate) fn push_closure_call(&mut self, closure: &Rc<Closure>) -> Result<(), LuaError> {
        let entry = match self.labels.get(&closure.code_label).copied() {
            Some(pc) => pc,
            None => {
                let label = closure.code_label.clone();
                return Err(self.make_raise(format!("unresolved function label '{}'", label)));
            }
        };
        if self.call_stack.len() >= 200 {
            return Err(self.make_raise("stack overflow"));
        }
        let caller_label = self.current_function_label.clone();
        let mut frame = CallFrame::new(self.pc + 1, caller_label);
        frame.saved_registers = std::mem::take(&mut self.registers);
        frame.saved_upvalues = std::mem::take(&mut self.current_upvalues);
        self.call_stack.push(frame);
        if let Some(env) = &closure.env {
            self.registers.insert(SmolStr::new("_ENV"), LuaValue::Table(env.clone()));
        }
        self.current_upvalues = closure.upvalues.clone();
        self.current_function_label = closure.name.clone().unwrap_or_else(|| closure.code_label.clone());
        self.pc = entry;
        Ok(())
    }

    fn make_raise(&mut self, message: impl Into<String>) -> LuaError {
        self.raise_message(message)
    }

    /// Runs a foreign function with an `is_foreign` marker frame pushed
    /// around the call, so a nested `coroutine.yield` sees the boundary.
    pub(crate) fn invoke_foreign(
        &mut self,
        foreign: Rc<Foreign>,
        args: Vec<LuaValue>,
    ) -> Result<Vec<LuaValue>, LuaError> {
        let label = SmolStr::new(foreign.name.as_str());
        self.call_stack.push(CallFrame::foreign(self.pc, label));
        let result = foreign.call(&args, self);
        self.call_stack.pop();
        result
    }

    /// Resolves `__call` chains, ordinary closures, and foreign functions
    /// into an actual invocation, blocking on the result. Used wherever a
    /// single opcode (arithmetic/index metamethod, `pcall`, sort
    /// comparator) needs a value back before it can continue, as opposed
    /// to `CALL_VALUE`'s own iterative push-and-continue.
    pub fn call_value_nested(
        &mut self,
        callee: LuaValue,
        args: Vec<LuaValue>,
    ) -> Result<Vec<LuaValue>, LuaError> {
        match callee {
            LuaValue::Closure(closure) => {
                let base_len = self.call_stack.len();
                self.push_closure_call(&closure)?;
                self.bind_args(&closure, args);
                let result = loop {
                    if self.call_stack.len() <= base_len {
                        break Ok(std::mem::take(&mut self.last_return));
                    }
                    match self.step() {
                        Ok(()) => continue,
                        Err(e) => break Err(e),
                    }
                };
                match &result {
                    Err(LuaError::Yield) | Err(LuaError::Exit) => {}
                    _ => {
                        while self.call_stack.len() > base_len {
                            let frame = self.call_stack.pop().unwrap();
                            self.registers = frame.saved_registers;
                            self.current_upvalues = frame.saved_upvalues;
                            self.pc = frame.return_pc;
                        }
                    }
                }
                result
            }
            LuaValue::Foreign(f) => self.invoke_foreign(f, args),
            LuaValue::Table(t) => {
                let call_fn = self.lookup_call_metamethod(&t)?;
                let mut new_args = Vec::with_capacity(args.len() + 1);
                new_args.push(LuaValue::Table(t));
                new_args.extend(args);
                self.call_value_nested(call_fn, new_args)
            }
            other => Err(self.make_raise(format!("attempt to call a {} value", other.type_name()))),
        }
    }

    pub(crate) fn lookup_call_metamethod(
        &mut self,
        table: &Rc<std::cell::RefCell<LuaTable>>,
    ) -> Result<LuaValue, LuaError> {
        let meta = table.borrow().metatable.clone();
        match meta {
            Some(mt) => {
                let handler = mt.borrow().get(&LuaValue::string("__call"));
                if handler.is_nil() {
                    Err(self.make_raise("attempt to call a table value"))
                } else {
                    Ok(handler)
                }
            }
            None => Err(self.make_raise("attempt to call a table value")),
        }
    }

    /// Binds the ARG/BIND_UPVALUE-visible parameter queue for a nested
    /// call. `CALL_VALUE`'s own closure path leaves `pending_params`
    /// untouched for the callee's prolog to drain; here we must seed it
    /// explicitly since the nested caller isn't itself mid-prolog.
    pub(crate) fn bind_args(&mut self, _closure: &Rc<Closure>, args: Vec<LuaValue>) {
        self.pending_params = args.into();
    }
}
