//! Coroutine create/resume/yield scheduling (spec.md §4.3). Resume swaps
//! the VM's live register file, upvalue list, call stack and PC with the
//! target coroutine's saved state; yield unwinds the dispatch loop with
//! `LuaError::Yield` without touching that live state, so whatever was
//! mid-flight is exactly what gets saved back.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use crate::lua_value::{Closure, Coroutine, CoroutineStatus, LuaValue};

use super::error::LuaError;
use super::event::EventKind;
use super::frame::CallFrame;
use super::LuaVM;

impl LuaVM {
    pub fn coroutine_create(&mut self, entry: Rc<Closure>) -> LuaValue {
        let id = self.next_coroutine_id;
        self.next_coroutine_id += 1;
        let parent_id = self.current_coroutine.borrow().id;
        let co = Rc::new(RefCell::new(Coroutine::new(id, entry, Some(parent_id))));
        self.coroutines.push(co.clone());
        self.events.emit(id, self.pc, EventKind::CoroutineCreated);
        LuaValue::Coroutine(co)
    }

    pub fn coroutine_status(&self, co: &Rc<RefCell<Coroutine>>) -> &'static str {
        if Rc::ptr_eq(co, &self.current_coroutine) {
            "running"
        } else {
            co.borrow().status.as_str()
        }
    }

    pub fn coroutine_running(&self) -> (LuaValue, bool) {
        (LuaValue::Coroutine(self.current_coroutine.clone()), self.is_main_thread())
    }

    pub fn coroutine_isyieldable(&mut self) -> bool {
        self.check_yieldable().is_ok()
    }

    /// The check `coroutine.yield`'s stdlib body runs before actually
    /// suspending (spec.md §5 scenario 3). Skips the yield call's own
    /// foreign marker frame, which `invoke_foreign` always pushes.
    pub fn check_yieldable(&mut self) -> Result<(), LuaError> {
        if self.is_main_thread() {
            return Err(self.raise_message("attempt to yield from outside a coroutine"));
        }
        for frame in self.call_stack.iter().rev().skip(1) {
            if frame.is_resume_boundary() {
                break;
            }
            if frame.is_foreign {
                return Err(self.raise_message("attempt to yield across a C-call boundary"));
            }
        }
        Ok(())
    }

    /// `coroutine.yield`'s actual suspension step, called only after
    /// `check_yieldable` passed. Stashes `values` and unwinds.
    pub fn begin_yield(&mut self, values: Vec<LuaValue>) -> LuaError {
        self.pending_yield = values;
        LuaError::Yield
    }

    /// `coroutine.resume`: switches the live VM state to `co`, runs it
    /// until it yields, finishes, or errors, then switches back. Returns
    /// `(ok, values)` exactly as the stdlib wrapper reports it.
    pub fn coroutine_resume(&mut self, co: Rc<RefCell<Coroutine>>, args: Vec<LuaValue>) -> (bool, Vec<LuaValue>) {
        if Rc::ptr_eq(&co, &self.current_coroutine) {
            return (false, vec![LuaValue::string("cannot resume non-suspended coroutine")]);
        }
        if co.borrow().status != CoroutineStatus::Suspended {
            return (false, vec![LuaValue::string("cannot resume non-suspended coroutine")]);
        }

        let caller = self.current_coroutine.clone();
        caller.borrow_mut().status = CoroutineStatus::Normal;
        caller.borrow_mut().saved_frames = mem::take(&mut self.call_stack);
        caller.borrow_mut().saved_registers = mem::take(&mut self.registers);
        caller.borrow_mut().saved_upvalues = mem::take(&mut self.current_upvalues);
        caller.borrow_mut().saved_pc = self.pc;

        self.current_coroutine = co.clone();
        {
            let mut c = co.borrow_mut();
            c.status = CoroutineStatus::Running;
            self.call_stack = mem::take(&mut c.saved_frames);
            self.registers = mem::take(&mut c.saved_registers);
            self.current_upvalues = mem::take(&mut c.saved_upvalues);
            self.pc = c.saved_pc;
            if !c.started {
                c.started = true;
                let entry = c.entry_closure.clone().expect("non-main coroutine has an entry closure");
                drop(c);
                self.call_stack.push(CallFrame::resume_boundary(0));
                self.current_function_label =
                    entry.name.clone().unwrap_or_else(|| entry.code_label.clone());
                self.current_upvalues = entry.upvalues.clone();
                self.pc = *self.labels.get(&entry.code_label).unwrap_or(&0);
                self.pending_params = args.into();
            } else {
                drop(c);
                // Completes the CALL_VALUE that invoked `coroutine.yield`,
                // which never got to run its own post-call bookkeeping
                // because it unwound via `LuaError::Yield` instead.
                self.last_return = args;
                self.pc += 1;
            }
        }

        self.events.emit(co.borrow().id, self.pc, EventKind::CoroutineResumed);
        let outcome = self.drive_coroutine_body();

        let result = match outcome {
            Ok(()) => (true, mem::take(&mut self.last_return)),
            Err(LuaError::Yield) => {
                let values = mem::take(&mut self.pending_yield);
                self.save_live_state_into(&co);
                co.borrow_mut().status = CoroutineStatus::Suspended;
                self.events.emit(co.borrow().id, self.pc, EventKind::CoroutineYielded);
                (true, values)
            }
            Err(LuaError::Exit) => {
                let values = mem::take(&mut self.last_return);
                co.borrow_mut().status = CoroutineStatus::Dead;
                self.events.emit(co.borrow().id, self.pc, EventKind::CoroutineCompleted { ok: true });
                (true, values)
            }
            Err(_runtime) => {
                let errval = self.pending_error.take().unwrap_or(LuaValue::Nil);
                co.borrow_mut().status = CoroutineStatus::Dead;
                co.borrow_mut().last_error = Some(errval.clone());
                self.events.emit(co.borrow().id, self.pc, EventKind::CoroutineCompleted { ok: false });
                (false, vec![errval])
            }
        };

        self.current_coroutine = caller.clone();
        self.call_stack = mem::take(&mut caller.borrow_mut().saved_frames);
        self.registers = mem::take(&mut caller.borrow_mut().saved_registers);
        self.current_upvalues = mem::take(&mut caller.borrow_mut().saved_upvalues);
        self.pc = caller.borrow().saved_pc;
        caller.borrow_mut().status = CoroutineStatus::Running;

        result
    }

    fn save_live_state_into(&mut self, co: &Rc<RefCell<Coroutine>>) {
        let mut c = co.borrow_mut();
        c.saved_frames = mem::take(&mut self.call_stack);
        c.saved_registers = mem::take(&mut self.registers);
        c.saved_upvalues = mem::take(&mut self.current_upvalues);
        c.saved_pc = self.pc;
    }

    fn drive_coroutine_body(&mut self) -> Result<(), LuaError> {
        loop {
            if self.halted {
                return Ok(());
            }
            self.step()?;
        }
    }
}
