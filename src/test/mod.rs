//! Integration-style tests against the compiler+VM+stdlib pipeline, one
//! file per concern (spec.md §6 test harness), mirroring the teacher's
//! own `src/test/` tree shape.

mod test_closures;
mod test_control_flow;
mod test_coroutine;
mod test_metamethods;
mod test_operators;
mod test_stdlib;

use crate::{LuaVM, LuaValue};

/// Compiles and runs `source` against a fresh VM with the standard
/// library loaded, panicking with the Lua error message on failure.
fn run_ok(source: &str) -> LuaVM {
    let mut vm = LuaVM::new();
    vm.open_libs();
    vm.compile(source, "test").expect("compile error");
    if let Err(e) = vm.execute() {
        panic!("runtime error: {}", e.value.display_string());
    }
    vm
}

/// Like `run_ok` but returns the runtime error's `Display`ed message
/// instead of panicking, for tests asserting on failure.
fn run_err(source: &str) -> String {
    let mut vm = LuaVM::new();
    vm.open_libs();
    vm.compile(source, "test").expect("compile error");
    match vm.execute() {
        Ok(()) => panic!("expected a runtime error, got success"),
        Err(e) => e.value.display_string(),
    }
}

/// Compiles `source` and returns the `CompileError`'s message, panicking
/// if it compiles cleanly, for tests asserting on a rejected program.
fn compile_err(source: &str) -> String {
    let mut vm = LuaVM::new();
    match vm.compile(source, "test") {
        Ok(()) => panic!("expected a compile error, got success"),
        Err(e) => e.message,
    }
}

fn assert_global_true(vm: &LuaVM, name: &str) {
    let v = vm.globals.borrow().get(&LuaValue::string(name));
    assert!(v.truthy(), "expected global '{}' to be truthy, got {:?}", name, v.display_string());
}
