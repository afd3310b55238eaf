// Library registration: a declarative table of name -> host function,
// installed either into the globals (base library) or into a named module
// table.

use crate::lua_vm::{CFunction, LuaResult, LuaVM};

pub struct LibraryModule {
    /// "_G" installs entries directly as globals.
    pub name: &'static str,
    pub entries: Vec<(&'static str, CFunction)>,
}

impl LibraryModule {
    pub const fn new(name: &'static str) -> Self {
        LibraryModule {
            name,
            entries: Vec::new(),
        }
    }

    pub fn with_function(mut self, name: &'static str, f: CFunction) -> Self {
        self.entries.push((name, f));
        self
    }
}

/// Terse module construction:
/// `lib_module!("coroutine", { "create" => co_create, ... })`.
#[macro_export]
macro_rules! lib_module {
    ($name:expr, { $($fname:expr => $f:expr),* $(,)? }) => {{
        let mut module = $crate::lib_registry::LibraryModule::new($name);
        $( module.entries.push(($fname, $f)); )*
        module
    }};
}

pub fn register(vm: &mut LuaVM, module: LibraryModule) -> LuaResult<()> {
    if module.name == "_G" {
        for (name, f) in module.entries {
            let v = crate::lua_value::LuaValue::cfunction(f);
            vm.set_global(name, v);
        }
        return Ok(());
    }
    let t = vm.new_table(0, module.entries.len());
    let tid = t.as_table_id().expect("new_table returns a table");
    for (name, f) in module.entries {
        let v = crate::lua_value::LuaValue::cfunction(f);
        vm.raw_set_field(tid, name, v);
    }
    vm.set_global(module.name, t);
    Ok(())
}
