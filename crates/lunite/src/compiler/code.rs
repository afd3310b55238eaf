// Code generation (lcode.c) as methods on FuncState. Instructions are
// emitted only when a descriptor is discharged; forward branches carry
// their jump-list link in the sBx field until patched.

use crate::compiler::expdesc::{ExpDesc, ExpKind, NO_JUMP};
use crate::compiler::func_state::{ConstKey, FuncState};
use crate::gc::StringId;
use crate::lua_value::LuaValue;
use crate::lua_vm::opcode::{
    int2fb, is_k, rk_as_k, Instruction, OpCode, MAXARG_A, MAXARG_B, MAXARG_BX, MAXARG_C,
    MAXINDEXRK,
};

/// Marker for "no register" in test patching.
const NO_REG: u32 = MAXARG_A;

/// Binary operators in parse order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpr {
    Add,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Concat,
    Eq,
    Lt,
    Le,
    Ne,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOpr {
    Minus,
    BNot,
    Not,
    Len,
}

/// Left/right binding priorities (priority table in lparser.c). `^` and
/// `..` are right-associative: right priority below left.
pub fn binop_priority(op: BinOpr) -> (u8, u8) {
    match op {
        BinOpr::Or => (1, 1),
        BinOpr::And => (2, 2),
        BinOpr::Lt | BinOpr::Gt | BinOpr::Le | BinOpr::Ge | BinOpr::Ne | BinOpr::Eq => (3, 3),
        BinOpr::BOr => (4, 4),
        BinOpr::BXor => (5, 5),
        BinOpr::BAnd => (6, 6),
        BinOpr::Shl | BinOpr::Shr => (7, 7),
        BinOpr::Concat => (9, 8),
        BinOpr::Add | BinOpr::Sub => (10, 10),
        BinOpr::Mul | BinOpr::Mod | BinOpr::Div | BinOpr::IDiv => (11, 11),
        BinOpr::Pow => (14, 13),
    }
}

pub const UNARY_PRIORITY: u8 = 12;

fn arith_opcode(op: BinOpr) -> OpCode {
    match op {
        BinOpr::Add => OpCode::Add,
        BinOpr::Sub => OpCode::Sub,
        BinOpr::Mul => OpCode::Mul,
        BinOpr::Mod => OpCode::Mod,
        BinOpr::Pow => OpCode::Pow,
        BinOpr::Div => OpCode::Div,
        BinOpr::IDiv => OpCode::IDiv,
        BinOpr::BAnd => OpCode::BAnd,
        BinOpr::BOr => OpCode::BOr,
        BinOpr::BXor => OpCode::BXor,
        BinOpr::Shl => OpCode::Shl,
        BinOpr::Shr => OpCode::Shr,
        _ => unreachable!("not an arithmetic operator"),
    }
}

impl FuncState {
    // ============ Emission ============

    fn emit(&mut self, inst: Instruction) -> usize {
        self.discharge_jpc();
        self.proto.code.push(inst);
        self.proto.line_info.push(self.cur_line);
        self.pc() - 1
    }

    pub fn emit_abc(&mut self, op: OpCode, a: u32, b: u32, c: u32) -> usize {
        self.emit(Instruction::abc(op, a, b, c))
    }

    pub fn emit_abx(&mut self, op: OpCode, a: u32, bx: u32) -> usize {
        self.emit(Instruction::abx(op, a, bx))
    }

    pub fn emit_asbx(&mut self, op: OpCode, a: u32, sbx: i32) -> usize {
        self.emit(Instruction::asbx(op, a, sbx))
    }

    pub fn fix_line(&mut self, line: u32) {
        if let Some(l) = self.proto.line_info.last_mut() {
            *l = line;
        }
    }

    // ============ Constants ============

    pub fn add_constant(&mut self, v: LuaValue) -> u32 {
        let key = ConstKey::of(v);
        if let Some(&i) = self.const_map.get(&key) {
            return i;
        }
        let i = self.proto.constants.len() as u32;
        self.proto.constants.push(v);
        self.const_map.insert(key, i);
        i
    }

    pub fn string_k(&mut self, s: StringId) -> u32 {
        self.add_constant(LuaValue::string(s))
    }

    // ============ Registers ============

    pub fn check_stack(&mut self, n: u8) {
        let needed = self.freereg as usize + n as usize;
        if needed > self.proto.max_stack_size as usize {
            if needed > MAXARG_A as usize {
                self.overflow = Some(format!(
                    "too many registers (limit is {})",
                    MAXARG_A
                ));
                return;
            }
            self.proto.max_stack_size = needed as u8;
        }
    }

    pub fn reserve_regs(&mut self, n: u8) {
        self.check_stack(n);
        self.freereg += n;
    }

    fn free_reg(&mut self, reg: u32) {
        if !is_k(reg) && reg >= self.nactvar() as u32 {
            self.freereg -= 1;
            debug_assert_eq!(reg, self.freereg as u32);
        }
    }

    pub fn free_exp(&mut self, e: &ExpDesc) {
        if e.kind == ExpKind::NonReloc {
            self.free_reg(e.info);
        }
    }

    /// Free both operand registers, higher one first so the stack
    /// discipline holds.
    fn free_exps(&mut self, e1: &ExpDesc, e2: &ExpDesc) {
        let r1 = if e1.kind == ExpKind::NonReloc {
            e1.info as i64
        } else {
            -1
        };
        let r2 = if e2.kind == ExpKind::NonReloc {
            e2.info as i64
        } else {
            -1
        };
        if r1 > r2 {
            self.free_exp(e1);
            self.free_exp(e2);
        } else {
            self.free_exp(e2);
            self.free_exp(e1);
        }
    }

    // ============ Jumps ============

    pub fn jump(&mut self) -> i32 {
        let old_jpc = self.jpc;
        self.jpc = NO_JUMP;
        let mut j = self.emit_asbx(OpCode::Jmp, 0, 0) as i32;
        self.fix_jump_link(j, NO_JUMP);
        self.concat_jump(&mut j, old_jpc);
        j
    }

    /// Mark the current pc as a jump target, blocking peepholes across it.
    pub fn get_label(&mut self) -> i32 {
        self.last_target = self.pc() as i32;
        self.last_target
    }

    fn get_jump(&self, pc: i32) -> i32 {
        let offset = self.proto.code[pc as usize].sbx();
        if offset == NO_JUMP {
            NO_JUMP
        } else {
            pc + 1 + offset
        }
    }

    fn fix_jump_link(&mut self, pc: i32, dest: i32) {
        let offset = if dest == NO_JUMP {
            NO_JUMP
        } else {
            dest - (pc + 1)
        };
        self.proto.code[pc as usize].set_sbx(offset);
    }

    /// Append list l2 onto list *l1 (luaK_concat).
    pub fn concat_jump(&mut self, l1: &mut i32, l2: i32) {
        if l2 == NO_JUMP {
            return;
        }
        if *l1 == NO_JUMP {
            *l1 = l2;
            return;
        }
        let mut list = *l1;
        loop {
            let next = self.get_jump(list);
            if next == NO_JUMP {
                break;
            }
            list = next;
        }
        self.fix_jump_link(list, l2);
    }

    /// Instruction controlling a jump: the test immediately before it, if
    /// any (getjumpcontrol).
    fn jump_control_pc(&self, pc: i32) -> i32 {
        if pc >= 1 {
            let prev = self.proto.code[(pc - 1) as usize].opcode();
            if matches!(
                prev,
                OpCode::Eq | OpCode::Lt | OpCode::Le | OpCode::Test | OpCode::TestSet
            ) {
                return pc - 1;
            }
        }
        pc
    }

    /// Retarget a TESTSET whose value is unused (patchtestreg).
    fn patch_test_reg(&mut self, node: i32, reg: u32) -> bool {
        let ctrl = self.jump_control_pc(node);
        let inst = self.proto.code[ctrl as usize];
        if inst.opcode() != OpCode::TestSet {
            return false;
        }
        if reg != NO_REG && reg != inst.b() {
            self.proto.code[ctrl as usize].set_a(reg);
        } else {
            self.proto.code[ctrl as usize] =
                Instruction::abc(OpCode::Test, inst.b(), 0, inst.c());
        }
        true
    }

    fn patch_list_aux(&mut self, mut list: i32, vtarget: i32, reg: u32, dtarget: i32) {
        while list != NO_JUMP {
            let next = self.get_jump(list);
            if self.patch_test_reg(list, reg) {
                self.fix_jump_link(list, vtarget);
            } else {
                self.fix_jump_link(list, dtarget);
            }
            list = next;
        }
    }

    fn discharge_jpc(&mut self) {
        let jpc = self.jpc;
        self.jpc = NO_JUMP;
        let here = self.pc() as i32;
        self.patch_list_aux(jpc, here, NO_REG, here);
    }

    pub fn patch_list(&mut self, list: i32, target: i32) {
        if target == self.pc() as i32 {
            self.patch_to_here(list);
        } else {
            debug_assert!(target < self.pc() as i32);
            self.patch_list_aux(list, target, NO_REG, target);
        }
    }

    pub fn patch_to_here(&mut self, list: i32) {
        self.get_label();
        let mut jpc = self.jpc;
        self.concat_jump(&mut jpc, list);
        self.jpc = jpc;
    }

    /// Make every JMP in the list close upvalues down to `level`
    /// (patchclose).
    pub fn patch_close(&mut self, mut list: i32, level: u8) {
        while list != NO_JUMP {
            let next = self.get_jump(list);
            self.proto.code[list as usize].set_a(level as u32 + 1);
            list = next;
        }
    }

    // ============ Discharge ============

    /// Turn variable references into readable values (luaK_dischargevars).
    pub fn discharge_vars(&mut self, e: &mut ExpDesc) {
        match e.kind {
            ExpKind::Local => {
                e.kind = ExpKind::NonReloc;
            }
            ExpKind::Upval => {
                e.info = self.emit_abc(OpCode::GetUpval, 0, e.info, 0) as u32;
                e.kind = ExpKind::Reloc;
            }
            ExpKind::Indexed => {
                self.free_reg(e.ind_idx);
                let op = if e.ind_on_upval {
                    OpCode::GetTabUp
                } else {
                    self.free_reg(e.ind_t);
                    OpCode::GetTable
                };
                e.info = self.emit_abc(op, 0, e.ind_t, e.ind_idx) as u32;
                e.kind = ExpKind::Reloc;
            }
            ExpKind::Call => {
                self.set_one_ret(e);
            }
            ExpKind::Vararg => {
                self.proto.code[e.info as usize].set_b(2);
                e.kind = ExpKind::Reloc;
            }
            _ => {}
        }
    }

    fn discharge_to_reg(&mut self, e: &mut ExpDesc, reg: u32) {
        self.discharge_vars(e);
        match e.kind {
            ExpKind::Nil => {
                self.nil(reg, 1);
            }
            ExpKind::False => {
                self.emit_abc(OpCode::LoadBool, reg, 0, 0);
            }
            ExpKind::True => {
                self.emit_abc(OpCode::LoadBool, reg, 1, 0);
            }
            ExpKind::K => {
                self.load_constant(reg, e.info);
            }
            ExpKind::KFlt => {
                let k = self.add_constant(LuaValue::float(e.nval));
                self.load_constant(reg, k);
            }
            ExpKind::KInt => {
                let k = self.add_constant(LuaValue::integer(e.ival));
                self.load_constant(reg, k);
            }
            ExpKind::Reloc => {
                self.proto.code[e.info as usize].set_a(reg);
            }
            ExpKind::NonReloc => {
                if e.info != reg {
                    self.emit_abc(OpCode::Move, reg, e.info, 0);
                }
            }
            _ => {
                debug_assert!(matches!(e.kind, ExpKind::Void | ExpKind::Jmp));
                return;
            }
        }
        e.info = reg;
        e.kind = ExpKind::NonReloc;
    }

    fn load_constant(&mut self, reg: u32, k: u32) {
        if k <= MAXARG_BX {
            self.emit_abx(OpCode::LoadK, reg, k);
        } else {
            self.emit_abx(OpCode::LoadKX, reg, 0);
            self.emit(Instruction::ax(OpCode::ExtraArg, k));
        }
    }

    fn discharge_to_any_reg(&mut self, e: &mut ExpDesc) {
        if e.kind != ExpKind::NonReloc {
            self.reserve_regs(1);
            let reg = self.freereg - 1;
            self.discharge_to_reg(e, reg as u32);
        }
    }

    fn need_value(&self, mut list: i32) -> bool {
        while list != NO_JUMP {
            let ctrl = self.jump_control_pc(list);
            if self.proto.code[ctrl as usize].opcode() != OpCode::TestSet {
                return true;
            }
            list = self.get_jump(list);
        }
        false
    }

    fn code_loadbool(&mut self, reg: u32, b: u32, jump: u32) -> i32 {
        self.get_label(); // these instructions may be jump targets
        self.emit_abc(OpCode::LoadBool, reg, b, jump) as i32
    }

    fn exp2reg(&mut self, e: &mut ExpDesc, reg: u32) {
        self.discharge_to_reg(e, reg);
        if e.kind == ExpKind::Jmp {
            let mut t = e.t;
            self.concat_jump(&mut t, e.info as i32);
            e.t = t;
        }
        if e.has_jumps() {
            let mut p_f = NO_JUMP;
            let mut p_t = NO_JUMP;
            if self.need_value(e.t) || self.need_value(e.f) {
                let fj = if e.kind == ExpKind::Jmp {
                    NO_JUMP
                } else {
                    self.jump()
                };
                p_f = self.code_loadbool(reg, 0, 1);
                p_t = self.code_loadbool(reg, 1, 0);
                self.patch_to_here(fj);
            }
            let final_pc = self.get_label();
            self.patch_list_aux(e.f, final_pc, reg, p_f);
            self.patch_list_aux(e.t, final_pc, reg, p_t);
        }
        e.f = NO_JUMP;
        e.t = NO_JUMP;
        e.info = reg;
        e.kind = ExpKind::NonReloc;
    }

    pub fn exp2nextreg(&mut self, e: &mut ExpDesc) {
        self.discharge_vars(e);
        self.free_exp(e);
        self.reserve_regs(1);
        let reg = (self.freereg - 1) as u32;
        self.exp2reg(e, reg);
    }

    pub fn exp2anyreg(&mut self, e: &mut ExpDesc) -> u32 {
        self.discharge_vars(e);
        if e.kind == ExpKind::NonReloc {
            if !e.has_jumps() {
                return e.info;
            }
            if e.info >= self.nactvar() as u32 {
                let reg = e.info;
                self.exp2reg(e, reg);
                return e.info;
            }
        }
        self.exp2nextreg(e);
        e.info
    }

    /// Register or upvalue, for a table about to be indexed.
    pub fn exp2anyregup(&mut self, e: &mut ExpDesc) {
        if e.kind != ExpKind::Upval || e.has_jumps() {
            self.exp2anyreg(e);
        }
    }

    pub fn exp2val(&mut self, e: &mut ExpDesc) {
        if e.has_jumps() {
            self.exp2anyreg(e);
        } else {
            self.discharge_vars(e);
        }
    }

    /// Register-or-constant operand (luaK_exp2RK).
    pub fn exp2rk(&mut self, e: &mut ExpDesc) -> u32 {
        self.exp2val(e);
        let k = match e.kind {
            ExpKind::True => Some(self.add_constant(LuaValue::boolean(true))),
            ExpKind::False => Some(self.add_constant(LuaValue::boolean(false))),
            ExpKind::Nil => Some(self.add_constant(LuaValue::nil())),
            ExpKind::KInt => Some(self.add_constant(LuaValue::integer(e.ival))),
            ExpKind::KFlt => Some(self.add_constant(LuaValue::float(e.nval))),
            ExpKind::K => Some(e.info),
            _ => None,
        };
        if let Some(k) = k {
            if k <= MAXINDEXRK {
                e.info = k;
                e.kind = ExpKind::K;
                return rk_as_k(k);
            }
        }
        self.exp2anyreg(e)
    }

    // ============ Stores, indexing ============

    pub fn store_var(&mut self, var: &ExpDesc, ex: &mut ExpDesc) {
        match var.kind {
            ExpKind::Local => {
                self.free_exp(ex);
                self.exp2reg(ex, var.info);
            }
            ExpKind::Upval => {
                let r = self.exp2anyreg(ex);
                self.emit_abc(OpCode::SetUpval, r, var.info, 0);
                self.free_exp(ex);
            }
            ExpKind::Indexed => {
                let rk = self.exp2rk(ex);
                let op = if var.ind_on_upval {
                    OpCode::SetTabUp
                } else {
                    OpCode::SetTable
                };
                self.emit_abc(op, var.ind_t, var.ind_idx, rk);
                self.free_exp(ex);
            }
            _ => unreachable!("invalid store target"),
        }
    }

    /// Build an indexed descriptor t[k] (luaK_indexed); `t` is already in
    /// a register or an upvalue.
    pub fn indexed(&mut self, t: &mut ExpDesc, k: &mut ExpDesc) {
        t.ind_idx = self.exp2rk(k);
        if t.kind == ExpKind::Upval {
            t.ind_t = t.info;
            t.ind_on_upval = true;
        } else {
            t.ind_t = t.info;
            t.ind_on_upval = false;
        }
        t.kind = ExpKind::Indexed;
    }

    /// OP_SELF: e becomes the method, key stays a constant/register.
    pub fn op_self(&mut self, e: &mut ExpDesc, key: &mut ExpDesc) {
        self.exp2anyreg(e);
        let obj = e.info;
        self.free_exp(e);
        let base = self.freereg as u32;
        self.reserve_regs(2);
        let rk = self.exp2rk(key);
        self.free_exp(key);
        self.emit_abc(OpCode::Self_, base, obj, rk);
        e.info = base;
        e.kind = ExpKind::NonReloc;
    }

    // ============ Multi-result adjustment ============

    pub fn set_returns(&mut self, e: &ExpDesc, nresults: i32) {
        match e.kind {
            ExpKind::Call => {
                self.proto.code[e.info as usize].set_c((nresults + 1) as u32);
            }
            ExpKind::Vararg => {
                let fr = self.freereg as u32;
                self.proto.code[e.info as usize].set_b((nresults + 1) as u32);
                self.proto.code[e.info as usize].set_a(fr);
                self.reserve_regs(1);
            }
            _ => {}
        }
    }

    pub fn set_one_ret(&mut self, e: &mut ExpDesc) {
        match e.kind {
            ExpKind::Call => {
                e.kind = ExpKind::NonReloc;
                e.info = self.proto.code[e.info as usize].a();
            }
            ExpKind::Vararg => {
                self.proto.code[e.info as usize].set_b(2);
                e.kind = ExpKind::Reloc;
            }
            _ => {}
        }
    }

    // ============ Control-flow values ============

    fn invert_jump(&mut self, e: &ExpDesc) {
        let ctrl = self.jump_control_pc(e.info as i32);
        let inst = self.proto.code[ctrl as usize];
        debug_assert!(matches!(
            inst.opcode(),
            OpCode::Eq | OpCode::Lt | OpCode::Le
        ));
        self.proto.code[ctrl as usize].set_a(if inst.a() == 0 { 1 } else { 0 });
    }

    fn jump_on_cond(&mut self, e: &mut ExpDesc, cond: bool) -> i32 {
        if e.kind == ExpKind::Reloc {
            let inst = self.proto.code[e.info as usize];
            if inst.opcode() == OpCode::Not {
                // remove the NOT and invert the test
                self.proto.code.pop();
                self.proto.line_info.pop();
                let ib = inst.b();
                self.emit_abc(OpCode::Test, ib, 0, if cond { 0 } else { 1 });
                return self.jump();
            }
        }
        self.discharge_to_any_reg(e);
        self.free_exp(e);
        self.emit_abc(
            OpCode::TestSet,
            NO_REG,
            e.info,
            if cond { 1 } else { 0 },
        );
        self.jump()
    }

    /// Emit code so that control falls through when e is true
    /// (luaK_goiftrue); false-jumps collect on e.f.
    pub fn go_if_true(&mut self, e: &mut ExpDesc) {
        self.discharge_vars(e);
        let pc = match e.kind {
            ExpKind::Jmp => {
                self.invert_jump(e);
                e.info as i32
            }
            ExpKind::K | ExpKind::KFlt | ExpKind::KInt | ExpKind::True => NO_JUMP,
            _ => self.jump_on_cond(e, false),
        };
        let mut f = e.f;
        self.concat_jump(&mut f, pc);
        e.f = f;
        self.patch_to_here(e.t);
        e.t = NO_JUMP;
    }

    /// Fall through when e is false (luaK_goiffalse).
    pub fn go_if_false(&mut self, e: &mut ExpDesc) {
        self.discharge_vars(e);
        let pc = match e.kind {
            ExpKind::Jmp => e.info as i32,
            ExpKind::Nil | ExpKind::False => NO_JUMP,
            _ => self.jump_on_cond(e, true),
        };
        let mut t = e.t;
        self.concat_jump(&mut t, pc);
        e.t = t;
        self.patch_to_here(e.f);
        e.f = NO_JUMP;
    }

    fn code_not(&mut self, e: &mut ExpDesc) {
        self.discharge_vars(e);
        match e.kind {
            ExpKind::Nil | ExpKind::False => {
                e.kind = ExpKind::True;
            }
            ExpKind::K | ExpKind::KFlt | ExpKind::KInt | ExpKind::True => {
                e.kind = ExpKind::False;
            }
            ExpKind::Jmp => {
                self.invert_jump(e);
            }
            ExpKind::Reloc | ExpKind::NonReloc => {
                self.discharge_to_any_reg(e);
                self.free_exp(e);
                e.info = self.emit_abc(OpCode::Not, 0, e.info, 0) as u32;
                e.kind = ExpKind::Reloc;
            }
            _ => unreachable!(),
        }
        std::mem::swap(&mut e.t, &mut e.f);
        // the value produced by jumps in the lists is now irrelevant
        self.remove_test_values(e.f);
        self.remove_test_values(e.t);
    }

    fn remove_test_values(&mut self, mut list: i32) {
        while list != NO_JUMP {
            self.patch_test_reg(list, NO_REG);
            list = self.get_jump(list);
        }
    }

    // ============ Operators ============

    pub fn prefix(&mut self, op: UnOpr, e: &mut ExpDesc, line: u32) {
        match op {
            UnOpr::Minus => {
                if e.is_numeral() {
                    // fold
                    match e.kind {
                        ExpKind::KInt => {
                            e.ival = e.ival.wrapping_neg();
                            return;
                        }
                        ExpKind::KFlt => {
                            e.nval = -e.nval;
                            return;
                        }
                        _ => {}
                    }
                }
                self.code_unary(OpCode::Unm, e, line);
            }
            UnOpr::BNot => {
                if e.kind == ExpKind::KInt && !e.has_jumps() {
                    e.ival = !e.ival;
                    return;
                }
                self.code_unary(OpCode::BNot, e, line);
            }
            UnOpr::Not => self.code_not(e),
            UnOpr::Len => self.code_unary(OpCode::Len, e, line),
        }
    }

    fn code_unary(&mut self, op: OpCode, e: &mut ExpDesc, line: u32) {
        let r = self.exp2anyreg(e);
        self.free_exp(e);
        e.info = self.emit_abc(op, 0, r, 0) as u32;
        e.kind = ExpKind::Reloc;
        self.fix_line(line);
    }

    /// First-operand preparation before the right side parses
    /// (luaK_infix).
    pub fn infix(&mut self, op: BinOpr, e: &mut ExpDesc) {
        match op {
            BinOpr::And => self.go_if_true(e),
            BinOpr::Or => self.go_if_false(e),
            BinOpr::Concat => self.exp2nextreg(e),
            BinOpr::Eq | BinOpr::Ne | BinOpr::Lt | BinOpr::Le | BinOpr::Gt | BinOpr::Ge => {
                self.exp2rk(e);
            }
            _ => {
                if !e.is_numeral() {
                    self.exp2rk(e);
                }
            }
        }
    }

    pub fn posfix(&mut self, op: BinOpr, e1: &mut ExpDesc, e2: &mut ExpDesc, line: u32) {
        match op {
            BinOpr::And => {
                debug_assert_eq!(e1.t, NO_JUMP);
                self.discharge_vars(e2);
                let mut f = e2.f;
                self.concat_jump(&mut f, e1.f);
                e2.f = f;
                *e1 = *e2;
            }
            BinOpr::Or => {
                debug_assert_eq!(e1.f, NO_JUMP);
                self.discharge_vars(e2);
                let mut t = e2.t;
                self.concat_jump(&mut t, e1.t);
                e2.t = t;
                *e1 = *e2;
            }
            BinOpr::Concat => {
                self.exp2val(e2);
                let merged = if e2.kind == ExpKind::Reloc {
                    let inst = self.proto.code[e2.info as usize];
                    inst.opcode() == OpCode::Concat
                } else {
                    false
                };
                if merged {
                    // chain into the existing CONCAT to the right
                    debug_assert_eq!(
                        e1.info,
                        self.proto.code[e2.info as usize].b() - 1
                    );
                    self.free_exp(e1);
                    let b = e1.info;
                    self.proto.code[e2.info as usize].set_b(b);
                    e1.kind = ExpKind::Reloc;
                    e1.info = e2.info;
                } else {
                    self.exp2nextreg(e2);
                    self.code_binary(OpCode::Concat, e1, e2, line);
                }
            }
            BinOpr::Eq | BinOpr::Ne | BinOpr::Lt | BinOpr::Le | BinOpr::Gt | BinOpr::Ge => {
                self.code_comparison(op, e1, e2);
            }
            _ => {
                if self.const_fold(op, e1, e2) {
                    return;
                }
                self.code_binary(arith_opcode(op), e1, e2, line);
            }
        }
    }

    fn code_binary(&mut self, op: OpCode, e1: &mut ExpDesc, e2: &mut ExpDesc, line: u32) {
        let o2 = self.exp2rk(e2);
        let o1 = self.exp2rk(e1);
        self.free_exps(e1, e2);
        e1.info = self.emit_abc(op, 0, o1, o2) as u32;
        e1.kind = ExpKind::Reloc;
        self.fix_line(line);
    }

    fn code_comparison(&mut self, op: BinOpr, e1: &mut ExpDesc, e2: &mut ExpDesc) {
        let rk1 = if e1.kind == ExpKind::K {
            rk_as_k(e1.info)
        } else {
            self.exp2rk(e1)
        };
        let rk2 = self.exp2rk(e2);
        self.free_exps(e1, e2);
        let (opc, a, b, c) = match op {
            BinOpr::Eq => (OpCode::Eq, 1, rk1, rk2),
            BinOpr::Ne => (OpCode::Eq, 0, rk1, rk2),
            BinOpr::Lt => (OpCode::Lt, 1, rk1, rk2),
            BinOpr::Le => (OpCode::Le, 1, rk1, rk2),
            // a > b  ==  b < a
            BinOpr::Gt => (OpCode::Lt, 1, rk2, rk1),
            BinOpr::Ge => (OpCode::Le, 1, rk2, rk1),
            _ => unreachable!(),
        };
        self.emit_abc(opc, a, b, c);
        e1.info = self.jump() as u32;
        e1.kind = ExpKind::Jmp;
    }

    /// Compile-time arithmetic on two numeric literals; skipped when the
    /// operation would raise or change observable NaN/-0 behavior.
    fn const_fold(&mut self, op: BinOpr, e1: &mut ExpDesc, e2: &ExpDesc) -> bool {
        if !e1.is_numeral() || !e2.is_numeral() {
            return false;
        }
        let as_int = |e: &ExpDesc| -> Option<i64> {
            match e.kind {
                ExpKind::KInt => Some(e.ival),
                ExpKind::KFlt => crate::lua_value::float_to_int_exact(e.nval),
                _ => None,
            }
        };
        let as_flt = |e: &ExpDesc| -> f64 {
            if e.kind == ExpKind::KInt {
                e.ival as f64
            } else {
                e.nval
            }
        };
        match op {
            BinOpr::BAnd | BinOpr::BOr | BinOpr::BXor | BinOpr::Shl | BinOpr::Shr => {
                let (Some(a), Some(b)) = (as_int(e1), as_int(e2)) else {
                    return false;
                };
                let r = match op {
                    BinOpr::BAnd => a & b,
                    BinOpr::BOr => a | b,
                    BinOpr::BXor => a ^ b,
                    BinOpr::Shl => shift_fold(a, b),
                    BinOpr::Shr => shift_fold(a, b.wrapping_neg()),
                    _ => unreachable!(),
                };
                *e1 = ExpDesc::int(r);
                true
            }
            BinOpr::Add | BinOpr::Sub | BinOpr::Mul | BinOpr::Mod | BinOpr::IDiv => {
                if e1.kind == ExpKind::KInt && e2.kind == ExpKind::KInt {
                    let (a, b) = (e1.ival, e2.ival);
                    let r = match op {
                        BinOpr::Add => a.wrapping_add(b),
                        BinOpr::Sub => a.wrapping_sub(b),
                        BinOpr::Mul => a.wrapping_mul(b),
                        BinOpr::Mod => {
                            if b == 0 {
                                return false; // raises at run time
                            }
                            crate::lua_vm::execute::metamethod::int_floor_mod(a, b)
                        }
                        BinOpr::IDiv => {
                            if b == 0 {
                                return false;
                            }
                            crate::lua_vm::execute::metamethod::int_floor_div(a, b)
                        }
                        _ => unreachable!(),
                    };
                    *e1 = ExpDesc::int(r);
                    return true;
                }
                let (a, b) = (as_flt(e1), as_flt(e2));
                let r = match op {
                    BinOpr::Add => a + b,
                    BinOpr::Sub => a - b,
                    BinOpr::Mul => a * b,
                    BinOpr::Mod => crate::lua_vm::execute::metamethod::float_floor_mod(a, b),
                    BinOpr::IDiv => (a / b).floor(),
                    _ => unreachable!(),
                };
                self.fold_float_result(e1, r)
            }
            BinOpr::Div => {
                let r = as_flt(e1) / as_flt(e2);
                self.fold_float_result(e1, r)
            }
            BinOpr::Pow => {
                let r = as_flt(e1).powf(as_flt(e2));
                self.fold_float_result(e1, r)
            }
            _ => false,
        }
    }

    fn fold_float_result(&mut self, e1: &mut ExpDesc, r: f64) -> bool {
        // keep NaN and -0 productions at run time
        if r.is_nan() || r == 0.0 {
            return false;
        }
        *e1 = ExpDesc::float(r);
        true
    }

    // ============ Statement helpers ============

    /// LOADNIL with merge into a previous adjacent LOADNIL (luaK_nil).
    pub fn nil(&mut self, from: u32, n: u32) {
        let pc = self.pc();
        if pc as i32 > self.last_target && pc > 0 && self.jpc == NO_JUMP {
            let prev = self.proto.code[pc - 1];
            if prev.opcode() == OpCode::LoadNil {
                let pfrom = prev.a();
                let pl = pfrom + prev.b();
                if (pfrom <= from && from <= pl + 1) || (from <= pfrom && pfrom <= from + n) {
                    let nfrom = pfrom.min(from);
                    let nlast = (pl).max(from + n - 1);
                    self.proto.code[pc - 1].set_a(nfrom);
                    self.proto.code[pc - 1].set_b(nlast - nfrom);
                    return;
                }
            }
        }
        self.emit_abc(OpCode::LoadNil, from, n - 1, 0);
    }

    pub fn ret(&mut self, first: u32, nret: i32) {
        self.emit_abc(OpCode::Return, first, (nret + 1) as u32, 0);
    }

    /// SETLIST flush (luaK_setlist); `tostore` == -1 means "up to top".
    pub fn set_list(&mut self, base: u32, nelems: usize, tostore: i32) {
        let batch = (nelems as u32 - 1) / crate::lua_vm::execute::FIELDS_PER_FLUSH as u32 + 1;
        let b = if tostore == -1 { 0 } else { tostore as u32 };
        if batch <= MAXARG_C {
            self.emit_abc(OpCode::SetList, base, b, batch);
        } else {
            self.emit_abc(OpCode::SetList, base, b, 0);
            self.emit(Instruction::ax(OpCode::ExtraArg, batch));
        }
        self.freereg = base as u8 + 1;
    }

    pub fn new_table_code(&mut self, reg: u32, narr: usize, nrec: usize) -> usize {
        self.emit_abc(
            OpCode::NewTable,
            reg,
            int2fb(narr as u32).min(MAXARG_B),
            int2fb(nrec as u32).min(MAXARG_C),
        )
    }
}

/// Shift folding mirrors the runtime rule (out-of-range becomes 0).
fn shift_fold(a: i64, n: i64) -> i64 {
    if n >= 64 || n <= -64 {
        0
    } else if n >= 0 {
        ((a as u64) << n) as i64
    } else {
        ((a as u64) >> (-n)) as i64
    }
}

