// Introspection over the running call stack (ldebug.c, reduced to the
// queryable surface: no line-by-line stepping UI, just the facts a host
// needs for error reports and hooks).

use crate::lua_value::{Closure, MASK_CALL, MASK_COUNT, MASK_LINE, MASK_RET};
use crate::lua_vm::{CFunction, LuaVM};

/// What lua_getinfo reports for one activation record.
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    /// Chunk name the function came from; "=[C]" for host functions.
    pub source: String,
    /// Current line, 0 when unavailable.
    pub current_line: u32,
    /// Best-effort function name from the call site.
    pub name: Option<String>,
    /// "Lua", "C" or "main".
    pub what: &'static str,
    pub num_params: u8,
    pub num_upvalues: usize,
    pub is_vararg: bool,
    pub is_tailcall: bool,
    pub line_defined: u32,
}

impl LuaVM {
    /// Information about the frame `level` calls below the top (0 = the
    /// running function).
    pub fn debug_info(&self, level: usize) -> Option<DebugInfo> {
        let th = self.th();
        let depth = th.call_depth();
        if level >= depth {
            return None;
        }
        let ci = &th.frames[depth - 1 - level];
        let mut info = DebugInfo {
            is_tailcall: ci.is_tail(),
            ..DebugInfo::default()
        };
        if ci.is_host() {
            info.source = "=[C]".to_string();
            info.what = "C";
            if let Some(fid) = ci.func.as_function_id() {
                if let Some(Closure::Host(h)) = self.object_pool.closure(fid) {
                    info.num_upvalues = h.upvalues.len();
                }
            }
            return Some(info);
        }
        let fid = ci.func.as_function_id()?;
        let Closure::Lua(lc) = self.object_pool.closure(fid)? else {
            return None;
        };
        let proto = self.object_pool.proto(lc.proto)?;
        info.num_upvalues = lc.upvalues.len();
        info.num_params = proto.num_params;
        info.is_vararg = proto.is_vararg;
        info.line_defined = proto.line_defined;
        info.what = if proto.line_defined == 0 { "main" } else { "Lua" };
        info.source = proto
            .source
            .and_then(|s| self.object_pool.string(s))
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "?".to_string());
        // the frame pc points at the next instruction
        let pc = (ci.pc as usize).saturating_sub(1);
        info.current_line = proto.line_at(pc);
        info.name = self.call_site_name(depth - 1 - level);
        Some(info)
    }

    /// Infer a function's name from its caller's instruction: a GETTABUP
    /// or GETTABLE feeding the call usually names it (getfuncname).
    fn call_site_name(&self, frame_index: usize) -> Option<String> {
        if frame_index == 0 {
            return None;
        }
        let th = self.th();
        let caller = &th.frames[frame_index - 1];
        if !caller.is_lua() {
            return None;
        }
        let fid = caller.func.as_function_id()?;
        let Closure::Lua(lc) = self.object_pool.closure(fid)? else {
            return None;
        };
        let proto = self.object_pool.proto(lc.proto)?;
        let call_pc = (caller.pc as usize).checked_sub(1)?;
        // scan back for the instruction that loaded the callee register
        let callee_reg = th.frames[frame_index].func_slot.checked_sub(caller.base)? as u32;
        for pc in (0..call_pc).rev() {
            let inst = proto.code[pc];
            use crate::lua_vm::OpCode::*;
            match inst.opcode() {
                GetTabUp | GetTable | Self_ if inst.a() == callee_reg => {
                    let c = inst.c();
                    if crate::lua_vm::opcode::is_k(c) {
                        let k = proto.constants[crate::lua_vm::opcode::index_k(c) as usize];
                        return k
                            .as_string_id()
                            .and_then(|s| self.object_pool.string(s))
                            .map(|s| s.as_str().to_string());
                    }
                    return None;
                }
                Move if inst.a() == callee_reg => return None,
                _ => {}
            }
        }
        None
    }

    /// Install a debug hook on the current thread. The mask combines the
    /// MASK_* bits; `count` applies to MASK_COUNT.
    pub fn set_hook(&mut self, hook: Option<CFunction>, mask: u8, count: u32) {
        let th = self.th_mut();
        th.hook = hook;
        th.hook_mask = if hook.is_some() { mask } else { 0 };
        th.hook_count = count;
        th.hook_last_line = 0;
    }

    pub fn hook_mask_bits(call: bool, ret: bool, line: bool, count: bool) -> u8 {
        let mut m = 0;
        if call {
            m |= MASK_CALL;
        }
        if ret {
            m |= MASK_RET;
        }
        if line {
            m |= MASK_LINE;
        }
        if count {
            m |= MASK_COUNT;
        }
        m
    }
}
