// Expression descriptors (expdesc in lparser.h). A parsed sub-expression
// is classified but not yet materialized; code is emitted only when the
// descriptor is discharged into a register or a store target. That delay
// is what enables constant folding, register/constant operand selection
// and short-circuit jump-list threading.

pub const NO_JUMP: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpKind {
    /// No value.
    Void,
    Nil,
    True,
    False,
    /// Constant-pool entry; info = index.
    K,
    /// Float literal; nval holds it.
    KFlt,
    /// Integer literal; ival holds it.
    KInt,
    /// Value sits in a fixed register; info = register.
    NonReloc,
    /// Local variable; info = register.
    Local,
    /// Upvalue; info = upvalue index.
    Upval,
    /// Indexed access; ind_t / ind_idx / ind_on_upval.
    Indexed,
    /// Result of a comparison; info = pc of the jump.
    Jmp,
    /// Instruction whose A operand is still free; info = pc.
    Reloc,
    /// Open call; info = pc of the CALL.
    Call,
    /// Open vararg; info = pc of the VARARG.
    Vararg,
}

#[derive(Debug, Clone, Copy)]
pub struct ExpDesc {
    pub kind: ExpKind,
    pub info: u32,
    pub ival: i64,
    pub nval: f64,
    /// Indexed: table register or upvalue index.
    pub ind_t: u32,
    /// Indexed: RK-encoded key.
    pub ind_idx: u32,
    /// Indexed: table is an upvalue (GETTABUP/SETTABUP).
    pub ind_on_upval: bool,
    /// Patch list: jumps taken when the expression is true.
    pub t: i32,
    /// Patch list: jumps taken when the expression is false.
    pub f: i32,
}

impl ExpDesc {
    pub fn new(kind: ExpKind, info: u32) -> Self {
        ExpDesc {
            kind,
            info,
            ival: 0,
            nval: 0.0,
            ind_t: 0,
            ind_idx: 0,
            ind_on_upval: false,
            t: NO_JUMP,
            f: NO_JUMP,
        }
    }

    pub fn int(i: i64) -> Self {
        let mut e = ExpDesc::new(ExpKind::KInt, 0);
        e.ival = i;
        e
    }

    pub fn float(f: f64) -> Self {
        let mut e = ExpDesc::new(ExpKind::KFlt, 0);
        e.nval = f;
        e
    }

    #[inline]
    pub fn has_jumps(&self) -> bool {
        self.t != self.f
    }

    /// Literal number with no pending jumps: a constant-folding operand.
    #[inline]
    pub fn is_numeral(&self) -> bool {
        matches!(self.kind, ExpKind::KInt | ExpKind::KFlt) && !self.has_jumps()
    }

    /// Discharged into a register already?
    #[inline]
    pub fn is_in_register(&self) -> bool {
        matches!(self.kind, ExpKind::NonReloc | ExpKind::Local)
    }

    /// Open call or vararg (result count still adjustable).
    #[inline]
    pub fn is_multiret(&self) -> bool {
        matches!(self.kind, ExpKind::Call | ExpKind::Vararg)
    }
}
