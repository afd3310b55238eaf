// Per-function compilation state (FuncState in lparser.h). One of these
// per lexical function, stacked while inner functions compile; the
// finished Proto is detached when the function body closes.

use std::collections::HashMap;

use crate::gc::StringId;
use crate::lua_value::{LuaValue, Proto};

/// Constant deduplication key. Integers and integral floats are distinct
/// keys (1 and 1.0 are different constants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstKey {
    Nil,
    Bool(bool),
    Int(i64),
    FloatBits(u64),
    Str(StringId),
}

impl ConstKey {
    pub fn of(v: LuaValue) -> ConstKey {
        if v.is_nil() {
            ConstKey::Nil
        } else if let Some(b) = v.as_boolean() {
            ConstKey::Bool(b)
        } else if let Some(i) = v.as_integer() {
            ConstKey::Int(i)
        } else if v.is_float() {
            ConstKey::FloatBits(v.secondary)
        } else if let Some(s) = v.as_string_id() {
            ConstKey::Str(s)
        } else {
            ConstKey::Nil
        }
    }
}

/// An active local variable: name plus the register that holds it.
#[derive(Debug, Clone, Copy)]
pub struct ActiveVar {
    pub name: StringId,
    /// Index into proto.loc_vars, for the debug end_pc patch.
    pub loc_var: usize,
}

/// A pending goto or an active label (labeldesc in lparser.c).
#[derive(Debug, Clone)]
pub struct LabelDesc {
    pub name: String,
    pub pc: usize,
    pub line: u32,
    pub nactvar: u8,
}

/// Lexical block (BlockCnt in lparser.c).
#[derive(Debug)]
pub struct BlockCnt {
    pub previous: Option<Box<BlockCnt>>,
    /// Index of the first active label of this block.
    pub first_label: usize,
    /// Index of the first pending goto issued inside this block.
    pub first_goto: usize,
    pub nactvar: u8,
    /// Some local in this block is captured as an upvalue.
    pub upval: bool,
    pub is_loop: bool,
}

pub struct FuncState {
    pub proto: Proto,
    pub const_map: HashMap<ConstKey, u32>,
    pub block: Option<Box<BlockCnt>>,
    pub actvar: Vec<ActiveVar>,
    pub gotos: Vec<LabelDesc>,
    pub labels: Vec<LabelDesc>,
    /// First free register (strict stack discipline above the locals).
    pub freereg: u8,
    /// Pending jumps to the next emitted instruction (jpc in lcode.c).
    pub jpc: i32,
    /// pc of the last jump target, to keep peepholes from crossing labels.
    pub last_target: i32,
    /// Line currently attributed to emitted instructions.
    pub cur_line: u32,
    /// Set when a limit blew up mid-expression; the parser reports it at
    /// the next statement boundary ("too many X (limit is N)").
    pub overflow: Option<String>,
}

impl FuncState {
    pub fn new(is_vararg: bool, source: Option<StringId>) -> Self {
        let mut proto = Proto::new();
        proto.is_vararg = is_vararg;
        proto.source = source;
        FuncState {
            proto,
            const_map: HashMap::new(),
            block: None,
            actvar: Vec::new(),
            gotos: Vec::new(),
            labels: Vec::new(),
            freereg: 0,
            jpc: crate::compiler::expdesc::NO_JUMP,
            last_target: 0,
            cur_line: 0,
            overflow: None,
        }
    }

    #[inline(always)]
    pub fn pc(&self) -> usize {
        self.proto.code.len()
    }

    #[inline(always)]
    pub fn nactvar(&self) -> u8 {
        self.actvar.len() as u8
    }

    pub fn enter_block(&mut self, is_loop: bool) {
        let bl = BlockCnt {
            previous: self.block.take(),
            first_label: self.labels.len(),
            first_goto: self.gotos.len(),
            nactvar: self.nactvar(),
            upval: false,
            is_loop,
        };
        self.block = Some(Box::new(bl));
    }

    /// Register of the innermost active local with this name, searching
    /// from the most recent.
    pub fn search_var(&self, name: StringId) -> Option<u8> {
        for (i, v) in self.actvar.iter().enumerate().rev() {
            if v.name == name {
                return Some(i as u8);
            }
        }
        None
    }

    /// Mark the enclosing block whose locals include `reg` as having an
    /// upvalue capture, so break/goto out of it emit a close.
    pub fn mark_upval_block(&mut self, reg: u8) {
        let mut bl = self.block.as_mut();
        while let Some(b) = bl {
            if b.nactvar <= reg {
                b.upval = true;
                return;
            }
            bl = b.previous.as_mut();
        }
    }
}
