// Test organization: every module spins up a fresh state per test and
// runs Lua source with in-language asserts, plus targeted unit checks on
// the host surface.

pub mod test_api;
pub mod test_arithmetic;
pub mod test_basic;
pub mod test_closures;
pub mod test_control_flow;
pub mod test_coroutine;
pub mod test_errors;
pub mod test_gc;
pub mod test_metamethods;
pub mod test_table;

use crate::{LuaResult, LuaVM, LuaValue, VmOptions};

pub fn new_vm() -> Box<LuaVM> {
    let mut vm = LuaVM::new(VmOptions::default());
    vm.open_libs().expect("core libraries");
    vm
}

pub fn run(source: &str) -> LuaResult<Vec<LuaValue>> {
    let mut vm = new_vm();
    vm.execute_string(source)
}

/// Run a chunk that validates itself through `assert`.
#[track_caller]
pub fn run_ok(source: &str) {
    let mut vm = new_vm();
    if let Err(e) = vm.execute_string(source) {
        panic!("chunk failed ({:?}): {}", e, vm.error_text());
    }
}

#[track_caller]
pub fn eval(source: &str) -> Vec<LuaValue> {
    let mut vm = new_vm();
    match vm.execute_string(source) {
        Ok(r) => r,
        Err(e) => panic!("chunk failed ({:?}): {}", e, vm.error_text()),
    }
}
