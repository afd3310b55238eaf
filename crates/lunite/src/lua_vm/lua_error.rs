// Error kinds are a bare enum so LuaResult stays one machine word on the
// hot paths; the error payload (any Lua value, usually a string) is parked
// in the VM and fetched by whoever catches the error.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LuaError {
    /// Typed misuse at run time; payload in vm.error_value.
    #[error("runtime error")]
    Runtime,
    /// Compile-time failure; payload carries chunk name and line.
    #[error("syntax error")]
    Syntax,
    /// Allocation pressure survived an emergency collection; the payload
    /// is a pinned, pre-interned message so reporting cannot allocate.
    #[error("not enough memory")]
    Memory,
    /// A finalizer raised; payload is the inner error, prefixed.
    #[error("error in __gc metamethod")]
    GcMetamethod,
    /// The message handler of a protected call itself raised.
    #[error("error in error handling")]
    Handler,
    /// Internal control flow: a coroutine is yielding. Never escapes to
    /// the host as an error.
    #[error("attempt to yield")]
    Yield,
}

impl LuaError {
    /// Host-visible status code (lua.h): ok and yield are 0 and 1.
    pub fn status_code(self) -> i32 {
        match self {
            LuaError::Yield => 1,
            LuaError::Runtime => 2,
            LuaError::Syntax => 3,
            LuaError::Memory => 4,
            LuaError::GcMetamethod => 5,
            LuaError::Handler => 6,
        }
    }
}

pub type LuaResult<T> = Result<T, LuaError>;
