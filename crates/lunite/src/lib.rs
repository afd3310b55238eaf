// lunite - a compact, embeddable Lua 5.3 runtime
// Single-pass compiler, register-based VM, incremental tri-color GC.

#[cfg(test)]
mod test;

pub mod compiler;
pub mod gc;
pub mod lib_registry;
pub mod lua_value;
pub mod lua_vm;
pub mod stdlib;

pub use lib_registry::LibraryModule;
pub use lua_value::{LuaTable, LuaThread, LuaValue, LuaValueKind, Proto, ThreadStatus};
pub use lua_vm::{
    CFunction, Instruction, LuaError, LuaResult, LuaVM, OpCode, TmKind, VmOptions,
};

/// One-shot convenience: run a chunk in a fresh state with the core
/// libraries open and return its first result.
pub fn execute(source: &str) -> LuaResult<LuaValue> {
    let mut vm = LuaVM::new(VmOptions::default());
    vm.open_libs()?;
    let results = vm.execute_string(source)?;
    Ok(results.into_iter().next().unwrap_or_else(LuaValue::nil))
}

/// Run a chunk in an existing state and return all results.
pub fn execute_with_vm(vm: &mut LuaVM, source: &str) -> LuaResult<Vec<LuaValue>> {
    vm.execute_string(source)
}
