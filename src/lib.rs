//! A register-based Lua 5.4 subset: lexer/parser/codegen pipeline, a
//! bytecode VM with metamethod dispatch and cooperative coroutines, and
//! a standard library surface (`_G`, `coroutine`, `table`, `string`,
//! `math`, `io`, `os`, `debug`, `package`).

#[cfg(test)]
mod test;

pub mod compiler;
pub mod lua_pattern;
pub mod lua_value;
pub mod lua_vm;
pub mod stdlib;

pub use compiler::compile;
pub use lua_value::{Cell, Closure, Coroutine, CoroutineStatus, LuaTable, LuaValue};
pub use lua_vm::{
    CompileError, Event, EventBuffer, EventKind, Foreign, LuaError, LuaErrorValue, LuaVM,
    Snapshot, VmOptions,
};

/// Convenience wrapper used by the test tree and the `lua` binary: builds
/// a fresh VM, opens the standard library, compiles and runs `source`,
/// and returns the captured `print`/`io.write` output on success.
pub fn run(source: &str, source_name: &str) -> Result<Vec<String>, LuaErrorValue> {
    let mut vm = LuaVM::new();
    vm.open_libs();
    vm.compile(source, source_name)
        .map_err(|e| LuaErrorValue { value: LuaValue::string(e.to_string()), traceback: None })?;
    vm.execute()?;
    Ok(vm.output.clone())
}
