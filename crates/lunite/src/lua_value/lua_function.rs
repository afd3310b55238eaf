// Function prototypes and closures.
//
// A Proto is the compiled form of one lexical function: code, constants,
// inner prototypes and debug tables. It is not itself callable; closures
// pair a prototype with captured upvalue cells. Sibling closures created
// in a loop share cells through the thread's open-upvalue list.

use std::cell::Cell;

use crate::gc::{FunctionId, ProtoId, StringId, UpvalueId};
use crate::lua_value::LuaValue;
use crate::lua_vm::{CFunction, Instruction};

/// Upvalue descriptor: where the closure instruction finds the cell.
#[derive(Debug, Clone, Copy)]
pub struct UpvalDesc {
    pub name: Option<StringId>,
    /// True: capture from the enclosing frame's registers; false: copy the
    /// enclosing closure's upvalue reference.
    pub in_stack: bool,
    pub index: u8,
}

/// Local-variable debug record: active between start_pc and end_pc.
#[derive(Debug, Clone, Copy)]
pub struct LocVar {
    pub name: StringId,
    pub start_pc: u32,
    pub end_pc: u32,
}

pub struct Proto {
    pub constants: Vec<LuaValue>,
    pub code: Vec<Instruction>,
    pub protos: Vec<ProtoId>,
    pub upvalues: Vec<UpvalDesc>,
    pub num_params: u8,
    pub is_vararg: bool,
    pub max_stack_size: u8,
    pub source: Option<StringId>,
    /// Line of the instruction at the same index (debug info).
    pub line_info: Vec<u32>,
    pub loc_vars: Vec<LocVar>,
    pub line_defined: u32,
    pub last_line_defined: u32,
    /// One-slot closure cache: the last closure built from this prototype,
    /// reused when all its upvalues still match (lvm.c pushclosure).
    pub cache: Cell<Option<FunctionId>>,
}

impl Proto {
    pub fn new() -> Self {
        Proto {
            constants: Vec::new(),
            code: Vec::new(),
            protos: Vec::new(),
            upvalues: Vec::new(),
            num_params: 0,
            is_vararg: false,
            max_stack_size: 2,
            source: None,
            line_info: Vec::new(),
            loc_vars: Vec::new(),
            line_defined: 0,
            last_line_defined: 0,
            cache: Cell::new(None),
        }
    }

    /// Source line of the instruction at pc, for error messages and hooks.
    #[inline]
    pub fn line_at(&self, pc: usize) -> u32 {
        self.line_info.get(pc).copied().unwrap_or(0)
    }

    /// Name of the local in register `reg` active at `pc`, if debug info
    /// survived.
    pub fn local_name(&self, reg: usize, pc: u32) -> Option<StringId> {
        let mut idx = 0;
        for lv in &self.loc_vars {
            if lv.start_pc <= pc && pc < lv.end_pc {
                if idx == reg {
                    return Some(lv.name);
                }
                idx += 1;
            }
        }
        None
    }

    pub fn mem_size(&self) -> usize {
        std::mem::size_of::<Proto>()
            + self.constants.len() * std::mem::size_of::<LuaValue>()
            + self.code.len() * std::mem::size_of::<Instruction>()
            + self.protos.len() * std::mem::size_of::<ProtoId>()
            + self.line_info.len() * 4
    }
}

impl Default for Proto {
    fn default() -> Self {
        Proto::new()
    }
}

/// A scripted closure: prototype plus shared upvalue cells.
pub struct LuaClosure {
    pub proto: ProtoId,
    pub upvalues: Vec<UpvalueId>,
}

/// A host closure: C function plus embedded upvalue values. No sharing and
/// no open/closed distinction.
pub struct HostClosure {
    pub f: CFunction,
    pub upvalues: Vec<LuaValue>,
}

pub enum Closure {
    Lua(LuaClosure),
    Host(HostClosure),
}

impl Closure {
    #[inline]
    pub fn as_lua(&self) -> Option<&LuaClosure> {
        match self {
            Closure::Lua(c) => Some(c),
            _ => None,
        }
    }

    #[inline]
    pub fn as_host(&self) -> Option<&HostClosure> {
        match self {
            Closure::Host(c) => Some(c),
            _ => None,
        }
    }

    pub fn mem_size(&self) -> usize {
        std::mem::size_of::<Closure>()
            + match self {
                Closure::Lua(c) => c.upvalues.len() * std::mem::size_of::<UpvalueId>(),
                Closure::Host(c) => c.upvalues.len() * std::mem::size_of::<LuaValue>(),
            }
    }
}
