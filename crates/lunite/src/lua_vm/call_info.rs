// Per-call frame record (CallInfo in lstate.h). Frames live in a Vec on
// the owning thread; indices replace the C doubly-linked list.

use crate::lua_vm::CFunction;
use crate::lua_value::LuaValue;

/// Call status flags (CIST_* in lstate.h).
pub mod call_status {
    /// Frame is running a Lua closure.
    pub const CIST_LUA: u8 = 1 << 0;
    /// Frame is running a host function.
    pub const CIST_C: u8 = 1 << 1;
    /// Frame entered through a tail call (no frame of its own was pushed).
    pub const CIST_TAIL: u8 = 1 << 2;
    /// Protected frame that may be yielded across.
    pub const CIST_YPCALL: u8 = 1 << 3;
    /// Frame started a fresh dispatch-loop invocation.
    pub const CIST_FRESH: u8 = 1 << 4;
    /// A hook is running in this frame.
    pub const CIST_HOOKED: u8 = 1 << 5;
}

#[derive(Clone)]
pub struct CallInfo {
    /// The callee value.
    pub func: LuaValue,
    /// Stack slot holding the callee.
    pub func_slot: usize,
    /// First register of this frame.
    pub base: usize,
    /// One past the highest slot this frame may use.
    pub top: usize,
    /// Saved program counter (Lua frames).
    pub pc: u32,
    /// Results expected by the caller; -1 = all.
    pub nresults: i32,
    pub call_status: u8,
    /// Varargs sitting between func_slot and base.
    pub num_varargs: u32,
    /// Continuation for host frames that yielded: invoked with the resume
    /// status instead of re-entering the original function.
    pub continuation: Option<(CFunction, i64)>,
}

impl CallInfo {
    pub fn new_lua(func: LuaValue, func_slot: usize, base: usize, top: usize) -> Self {
        CallInfo {
            func,
            func_slot,
            base,
            top,
            pc: 0,
            nresults: -1,
            call_status: call_status::CIST_LUA,
            num_varargs: 0,
            continuation: None,
        }
    }

    pub fn new_host(func: LuaValue, func_slot: usize, base: usize, top: usize) -> Self {
        CallInfo {
            func,
            func_slot,
            base,
            top,
            pc: 0,
            nresults: -1,
            call_status: call_status::CIST_C,
            num_varargs: 0,
            continuation: None,
        }
    }

    #[inline(always)]
    pub fn is_lua(&self) -> bool {
        self.call_status & call_status::CIST_LUA != 0
    }

    #[inline(always)]
    pub fn is_host(&self) -> bool {
        self.call_status & call_status::CIST_C != 0
    }

    #[inline(always)]
    pub fn is_tail(&self) -> bool {
        self.call_status & call_status::CIST_TAIL != 0
    }

    #[inline(always)]
    pub fn set_tail(&mut self) {
        self.call_status |= call_status::CIST_TAIL;
    }

    #[inline(always)]
    pub fn is_yieldable_pcall(&self) -> bool {
        self.call_status & call_status::CIST_YPCALL != 0
    }
}
