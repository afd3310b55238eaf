// Value representation and the object shapes behind collectable values.

pub mod lua_function;
pub mod lua_string;
pub mod lua_table;
pub mod lua_thread;
pub mod lua_userdata;
#[allow(clippy::module_inception)]
pub mod lua_value;

pub use lua_function::{Closure, HostClosure, LocVar, LuaClosure, Proto, UpvalDesc};
pub use lua_string::{str_hash, LuaString};
pub use lua_table::{LuaTable, TableError};
pub use lua_thread::{LuaThread, ThreadStatus, MASK_CALL, MASK_COUNT, MASK_LINE, MASK_RET};
pub use lua_userdata::LuaUserdata;
pub use lua_value::{float_to_int_exact, LuaValue, LuaValueKind};
