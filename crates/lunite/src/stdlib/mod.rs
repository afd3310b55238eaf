// Core-adjacent library: the base functions and the coroutine module
// (lbaselib.c / lcorolib.c). The full standard library (string, math,
// table, io, os, utf8, debug) lives outside the runtime core.

pub mod basic;
pub mod coroutine;

use crate::lua_vm::{LuaResult, LuaVM};

impl LuaVM {
    /// Install the base functions and the coroutine module.
    pub fn open_libs(&mut self) -> LuaResult<()> {
        crate::lib_registry::register(self, basic::create_base_lib())?;
        crate::lib_registry::register(self, coroutine::create_coroutine_lib())?;
        Ok(())
    }
}
