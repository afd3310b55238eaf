// Statement parsing: blocks, control flow, assignments, function
// definitions, and goto/label resolution (the statement half of
// lparser.c).

use crate::compiler::expdesc::{ExpDesc, ExpKind, NO_JUMP};
use crate::compiler::func_state::LabelDesc;
use crate::compiler::token::Token;
use crate::compiler::Parser;
use crate::lua_vm::opcode::{Instruction, OpCode};
use crate::lua_vm::LuaResult;

/// Hard cap on chained assignment targets, to bound the recursion.
const MAX_ASSIGN_TARGETS: usize = 200;

impl<'a> Parser<'a> {
    pub fn stat_list(&mut self) -> LuaResult<()> {
        loop {
            if self.block_follow(true) {
                return Ok(());
            }
            if self.cur().is(&Token::Return) {
                self.ret_stat()?;
                return Ok(());
            }
            self.statement()?;
        }
    }

    fn block_follow(&self, with_until: bool) -> bool {
        match self.cur() {
            Token::Else | Token::ElseIf | Token::End | Token::Eof => true,
            Token::Until => with_until,
            _ => false,
        }
    }

    pub fn statement(&mut self) -> LuaResult<()> {
        let line = self.cur_line();
        match self.cur() {
            Token::Semi => {
                self.advance();
            }
            Token::If => self.if_stat(line)?,
            Token::While => self.while_stat(line)?,
            Token::Do => {
                self.advance();
                self.block()?;
                self.check_match(Token::End, Token::Do, line)?;
            }
            Token::For => self.for_stat(line)?,
            Token::Repeat => self.repeat_stat(line)?,
            Token::Function => self.func_stat(line)?,
            Token::Local => {
                self.advance();
                if self.test_next(Token::Function) {
                    self.local_func(line)?;
                } else {
                    self.local_stat()?;
                }
            }
            Token::DColon => {
                self.advance();
                let name = self.expect_name()?;
                self.label_stat(name, line)?;
            }
            Token::Break => {
                self.advance();
                self.goto_named("break", line)?;
            }
            Token::Goto => {
                self.advance();
                let name = self.expect_name()?;
                let text = self
                    .vm
                    .object_pool
                    .string(name)
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default();
                self.goto_named(&text, line)?;
            }
            _ => self.expr_stat()?,
        }
        self.check_limits()?;
        // temporaries die at statement boundaries
        let fs = self.fs_mut();
        debug_assert!(fs.freereg >= fs.nactvar());
        fs.freereg = fs.nactvar();
        Ok(())
    }

    // ============ Blocks & scopes ============

    pub fn block(&mut self) -> LuaResult<()> {
        self.fs_mut().enter_block(false);
        self.stat_list()?;
        self.leave_block()
    }

    pub fn leave_block(&mut self) -> LuaResult<()> {
        let (has_prev, upval, is_loop, nactvar, first_label, first_goto) = {
            let bl = self
                .fs_ref()
                .block
                .as_ref()
                .expect("block nesting underflow");
            (
                bl.previous.is_some(),
                bl.upval,
                bl.is_loop,
                bl.nactvar,
                bl.first_label,
                bl.first_goto,
            )
        };
        if has_prev && upval {
            // the block is ending: close its captured locals on the way
            let j = self.fs_mut().jump();
            self.fs_mut().patch_close(j, nactvar);
            self.fs_mut().patch_to_here(j);
        }
        if is_loop {
            // resolve pending breaks while this block is still current,
            // so only this loop's breaks bind here
            self.break_label()?;
        }
        let bl = self.fs_mut().block.take().expect("block nesting underflow");
        self.fs_mut().block = bl.previous;
        self.leave_block_vars(nactvar);
        self.fs_mut().labels.truncate(first_label);
        if has_prev {
            self.move_gotos_out(first_goto, nactvar, upval)?;
        } else if first_goto < self.fs_ref().gotos.len() {
            let g = self.fs_ref().gotos[first_goto].clone();
            let msg = if g.name == "break" {
                format!("break outside a loop at line {}", g.line)
            } else {
                format!("no visible label '{}' for goto at line {}", g.name, g.line)
            };
            return Err(self.err(&msg));
        }
        Ok(())
    }

    // ============ goto / label ============

    fn goto_named(&mut self, name: &str, line: u32) -> LuaResult<()> {
        let pc = self.fs_mut().jump();
        let nactvar = self.fs_ref().nactvar();
        self.fs_mut().gotos.push(LabelDesc {
            name: name.to_string(),
            pc: pc as usize,
            line,
            nactvar,
        });
        let g = self.fs_ref().gotos.len() - 1;
        self.find_label(g)?;
        Ok(())
    }

    fn label_stat(&mut self, name: crate::gc::StringId, line: u32) -> LuaResult<()> {
        self.expect_next(Token::DColon)?;
        let text = self
            .vm
            .object_pool
            .string(name)
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();
        // no duplicate labels in the same block
        let first = self
            .fs_ref()
            .block
            .as_ref()
            .map(|b| b.first_label)
            .unwrap_or(0);
        if self.fs_ref().labels[first..].iter().any(|l| l.name == text) {
            return Err(self.err(&format!("label '{}' already defined", text)));
        }
        // skip following no-ops so the label's scope matches its target
        while self.cur().is(&Token::Semi) {
            self.advance();
        }
        let nactvar = if self.block_follow(false) {
            // label at block end: locals are already out of scope there
            self.fs_ref()
                .block
                .as_ref()
                .map(|b| b.nactvar)
                .unwrap_or(0)
        } else {
            self.fs_ref().nactvar()
        };
        let pc = self.fs_mut().get_label() as usize;
        self.fs_mut().labels.push(LabelDesc {
            name: text,
            pc,
            line,
            nactvar,
        });
        let l = self.fs_ref().labels.len() - 1;
        self.match_gotos_to_label(l)?;
        Ok(())
    }

    /// End-of-loop target for pending breaks (breaklabel).
    fn break_label(&mut self) -> LuaResult<()> {
        let pc = self.fs_mut().get_label() as usize;
        let nactvar = self.fs_ref().nactvar();
        self.fs_mut().labels.push(LabelDesc {
            name: "break".to_string(),
            pc,
            line: 0,
            nactvar,
        });
        let l = self.fs_ref().labels.len() - 1;
        self.match_gotos_to_label(l)
    }

    /// Try to bind pending goto `g` to a label of the current block
    /// (findlabel). Returns true when bound.
    fn find_label(&mut self, g: usize) -> LuaResult<bool> {
        let first_label = self
            .fs_ref()
            .block
            .as_ref()
            .map(|b| b.first_label)
            .unwrap_or(0);
        let gname = self.fs_ref().gotos[g].name.clone();
        for l in first_label..self.fs_ref().labels.len() {
            if self.fs_ref().labels[l].name == gname {
                self.close_goto(g, l)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Bind every pending goto of the current block that names label `l`
    /// (findgotos).
    fn match_gotos_to_label(&mut self, l: usize) -> LuaResult<()> {
        let first_goto = self
            .fs_ref()
            .block
            .as_ref()
            .map(|b| b.first_goto)
            .unwrap_or(0);
        let mut g = first_goto;
        while g < self.fs_ref().gotos.len() {
            if self.fs_ref().gotos[g].name == self.fs_ref().labels[l].name {
                self.close_goto(g, l)?;
            } else {
                g += 1;
            }
        }
        Ok(())
    }

    fn close_goto(&mut self, g: usize, l: usize) -> LuaResult<()> {
        let gt = self.fs_ref().gotos[g].clone();
        let label = self.fs_ref().labels[l].clone();
        if gt.nactvar < label.nactvar {
            // the jump would skip a local's initialization
            let msg = format!(
                "<goto {}> at line {} jumps into the scope of a local",
                gt.name, gt.line
            );
            return Err(self.err(&msg));
        }
        self.fs_mut().patch_list(gt.pc as i32, label.pc as i32);
        self.fs_mut().gotos.remove(g);
        Ok(())
    }

    /// Re-home pending gotos of a closing block into the enclosing block
    /// (movegotosout).
    fn move_gotos_out(&mut self, first_goto: usize, nactvar: u8, upval: bool) -> LuaResult<()> {
        let mut i = first_goto;
        while i < self.fs_ref().gotos.len() {
            let (pc, needs_close) = {
                let gt = &mut self.fs_mut().gotos[i];
                let needs = gt.nactvar > nactvar;
                if needs {
                    gt.nactvar = nactvar;
                }
                (gt.pc, needs && upval)
            };
            if needs_close {
                self.fs_mut().patch_close(pc as i32, nactvar);
            }
            if !self.find_label(i)? {
                i += 1;
            }
        }
        Ok(())
    }

    // ============ Control statements ============

    /// Condition expression; nil folds to false so `while nil` emits a
    /// plain jump.
    fn cond(&mut self) -> LuaResult<i32> {
        let mut v = ExpDesc::new(ExpKind::Void, 0);
        self.expr(&mut v)?;
        if v.kind == ExpKind::Nil {
            v.kind = ExpKind::False;
        }
        self.fs_mut().go_if_true(&mut v);
        Ok(v.f)
    }

    fn if_stat(&mut self, line: u32) -> LuaResult<()> {
        let mut escape = NO_JUMP;
        self.test_then_block(&mut escape)?;
        while self.cur().is(&Token::ElseIf) {
            self.test_then_block(&mut escape)?;
        }
        if self.test_next(Token::Else) {
            self.block()?;
        }
        self.check_match(Token::End, Token::If, line)?;
        self.fs_mut().patch_to_here(escape);
        Ok(())
    }

    fn test_then_block(&mut self, escape: &mut i32) -> LuaResult<()> {
        self.advance(); // skip IF or ELSEIF
        let mut v = ExpDesc::new(ExpKind::Void, 0);
        self.expr(&mut v)?;
        self.expect_next(Token::Then)?;
        self.fs_mut().go_if_true(&mut v);
        let false_exit = v.f;
        self.fs_mut().enter_block(false);
        self.stat_list()?;
        self.leave_block()?;
        if matches!(self.cur(), Token::Else | Token::ElseIf) {
            let j = self.fs_mut().jump();
            let fs = self.fs_mut();
            let mut e = *escape;
            fs.concat_jump(&mut e, j);
            *escape = e;
        }
        self.fs_mut().patch_to_here(false_exit);
        Ok(())
    }

    fn while_stat(&mut self, line: u32) -> LuaResult<()> {
        self.advance();
        let while_init = self.fs_mut().get_label();
        let cond_exit = self.cond()?;
        self.fs_mut().enter_block(true);
        self.expect_next(Token::Do)?;
        self.block()?;
        let j = self.fs_mut().jump();
        self.fs_mut().patch_list(j, while_init);
        self.check_match(Token::End, Token::While, line)?;
        self.leave_block()?;
        self.fs_mut().patch_to_here(cond_exit);
        Ok(())
    }

    fn repeat_stat(&mut self, line: u32) -> LuaResult<()> {
        self.advance();
        let repeat_init = self.fs_mut().get_label();
        self.fs_mut().enter_block(true); // loop block
        self.fs_mut().enter_block(false); // scope block
        self.stat_list()?;
        self.check_match(Token::Until, Token::Repeat, line)?;
        // the condition still sees the body's locals
        let cond_exit = self.cond()?;
        let scope_upval = self
            .fs_ref()
            .block
            .as_ref()
            .map(|b| b.upval)
            .unwrap_or(false);
        let scope_nactvar = self
            .fs_ref()
            .block
            .as_ref()
            .map(|b| b.nactvar)
            .unwrap_or(0);
        if scope_upval {
            self.fs_mut().patch_close(cond_exit, scope_nactvar);
        }
        self.leave_block()?; // scope
        self.fs_mut().patch_list(cond_exit, repeat_init);
        self.leave_block()?; // loop
        Ok(())
    }

    fn for_stat(&mut self, line: u32) -> LuaResult<()> {
        self.advance();
        self.fs_mut().enter_block(true); // loop block for breaks
        let name = self.expect_name()?;
        match self.cur() {
            Token::Assign => self.for_num(name, line)?,
            Token::Comma | Token::In => self.for_list(name)?,
            _ => return Err(self.err("'=' or 'in' expected")),
        }
        self.check_match(Token::End, Token::For, line)?;
        self.leave_block()
    }

    fn for_num(&mut self, name: crate::gc::StringId, line: u32) -> LuaResult<()> {
        let base = self.fs_ref().freereg as u32;
        let idx_name = self.vm.intern_id(b"(for index)");
        let lim_name = self.vm.intern_id(b"(for limit)");
        let step_name = self.vm.intern_id(b"(for step)");
        self.new_localvar(idx_name);
        self.new_localvar(lim_name);
        self.new_localvar(step_name);
        self.new_localvar(name);
        self.expect_next(Token::Assign)?;
        self.expr_to_next_reg()?; // initial value
        self.expect_next(Token::Comma)?;
        self.expr_to_next_reg()?; // limit
        if self.test_next(Token::Comma) {
            self.expr_to_next_reg()?; // step
        } else {
            // default step 1
            let fs = self.fs_mut();
            let k = fs.add_constant(crate::lua_value::LuaValue::integer(1));
            let reg = fs.freereg as u32;
            fs.emit_abx(OpCode::LoadK, reg, k);
            fs.reserve_regs(1);
        }
        self.for_body(base, line, 1, true)
    }

    fn for_list(&mut self, first_name: crate::gc::StringId) -> LuaResult<()> {
        let base = self.fs_ref().freereg as u32;
        let gen_name = self.vm.intern_id(b"(for generator)");
        let state_name = self.vm.intern_id(b"(for state)");
        let ctrl_name = self.vm.intern_id(b"(for control)");
        self.new_localvar(gen_name);
        self.new_localvar(state_name);
        self.new_localvar(ctrl_name);
        self.new_localvar(first_name);
        let mut nvars = 1;
        while self.test_next(Token::Comma) {
            let n = self.expect_name()?;
            self.new_localvar(n);
            nvars += 1;
        }
        self.expect_next(Token::In)?;
        let line = self.cur_line();
        let mut e = ExpDesc::new(ExpKind::Void, 0);
        let nexps = self.exp_list(&mut e)?;
        self.adjust_assign(3, nexps, &mut e);
        self.fs_mut().check_stack(3); // the call frame of the iterator
        self.for_body(base, line, nvars, false)
    }

    fn for_body(&mut self, base: u32, line: u32, nvars: usize, is_num: bool) -> LuaResult<()> {
        self.adjust_local_vars(3); // control variables
        self.expect_next(Token::Do)?;
        let prep = if is_num {
            self.fs_mut().emit_asbx(OpCode::ForPrep, base, NO_JUMP) as i32
        } else {
            self.fs_mut().jump()
        };
        self.fs_mut().enter_block(false);
        self.adjust_local_vars(nvars);
        self.fs_mut().reserve_regs(nvars as u8);
        self.block_body()?;
        self.leave_block()?;
        self.fs_mut().patch_to_here_prep(prep, is_num);
        let end_for = if is_num {
            self.fs_mut().emit_asbx(OpCode::ForLoop, base, 0) as i32
        } else {
            let fs = self.fs_mut();
            fs.emit_abc(OpCode::TForCall, base, 0, nvars as u32);
            fs.fix_line(line);
            fs.emit_asbx(OpCode::TForLoop, base + 2, 0) as i32
        };
        let fs = self.fs_mut();
        let dest = prep + 1;
        let offset = dest - (end_for + 1);
        fs.proto.code[end_for as usize].set_sbx(offset);
        fs.fix_line(line);
        Ok(())
    }

    fn block_body(&mut self) -> LuaResult<()> {
        self.stat_list()
    }

    fn expr_to_next_reg(&mut self) -> LuaResult<()> {
        let mut e = ExpDesc::new(ExpKind::Void, 0);
        self.expr(&mut e)?;
        self.fs_mut().exp2nextreg(&mut e);
        Ok(())
    }

    // ============ Functions ============

    fn func_stat(&mut self, line: u32) -> LuaResult<()> {
        self.advance();
        let (v, is_method) = self.func_name()?;
        let mut b = ExpDesc::new(ExpKind::Void, 0);
        self.body(&mut b, is_method, line)?;
        self.fs_mut().store_var(&v, &mut b);
        self.fs_mut().fix_line(line);
        Ok(())
    }

    fn func_name(&mut self) -> LuaResult<(ExpDesc, bool)> {
        let name = self.expect_name()?;
        let mut e = ExpDesc::new(ExpKind::Void, 0);
        self.single_var(name, &mut e)?;
        while self.cur().is(&Token::Dot) {
            self.field_sel(&mut e)?;
        }
        let mut is_method = false;
        if self.cur().is(&Token::Colon) {
            is_method = true;
            self.field_sel(&mut e)?;
        }
        Ok((e, is_method))
    }

    fn local_func(&mut self, line: u32) -> LuaResult<()> {
        let name = self.expect_name()?;
        self.new_localvar(name);
        // activate before the body so the function can call itself; its
        // register is the one the CLOSURE discharge allocates
        self.adjust_local_vars(1);
        let mut b = ExpDesc::new(ExpKind::Void, 0);
        self.body(&mut b, false, line)?;
        debug_assert_eq!(b.kind, ExpKind::NonReloc);
        Ok(())
    }

    fn local_stat(&mut self) -> LuaResult<()> {
        let mut nvars = 0;
        loop {
            let name = self.expect_name()?;
            self.new_localvar(name);
            nvars += 1;
            if !self.test_next(Token::Comma) {
                break;
            }
        }
        let mut e = ExpDesc::new(ExpKind::Void, 0);
        let nexps = if self.test_next(Token::Assign) {
            self.exp_list(&mut e)?
        } else {
            0
        };
        self.adjust_assign(nvars, nexps, &mut e);
        self.adjust_local_vars(nvars);
        Ok(())
    }

    /// Function body: parameters, block, CLOSURE emission (body +
    /// codeclosure).
    pub fn body(&mut self, e: &mut ExpDesc, is_method: bool, line: u32) -> LuaResult<()> {
        self.open_func(false);
        self.fs_mut().proto.line_defined = line;
        self.expect_next(Token::LParen)?;
        if is_method {
            let self_id = self.vm.intern_id(b"self");
            self.new_localvar(self_id);
            self.adjust_local_vars(1);
        }
        self.par_list()?;
        self.expect_next(Token::RParen)?;
        self.stat_list()?;
        let last_line = self.cur_line();
        self.check_match(Token::End, Token::Function, line)?;
        let mut proto = self.close_func()?;
        proto.last_line_defined = last_line;
        let pid = self.vm.object_pool.alloc_proto(proto, &mut self.vm.gc);
        let fs = self.fs_mut();
        fs.proto.protos.push(pid);
        let idx = (fs.proto.protos.len() - 1) as u32;
        let pc = fs.emit_abx(OpCode::Closure, 0, idx);
        *e = ExpDesc::new(ExpKind::Reloc, pc as u32);
        fs.exp2nextreg(e);
        fs.fix_line(line);
        Ok(())
    }

    fn par_list(&mut self) -> LuaResult<()> {
        let mut nparams = 0;
        if !self.cur().is(&Token::RParen) {
            loop {
                match self.cur() {
                    Token::Name(n) => {
                        self.advance();
                        self.new_localvar(n);
                        nparams += 1;
                    }
                    Token::Ellipsis => {
                        self.advance();
                        self.fs_mut().proto.is_vararg = true;
                        break;
                    }
                    _ => return Err(self.err("<name> expected")),
                }
                if !self.test_next(Token::Comma) {
                    break;
                }
            }
        }
        self.adjust_local_vars(nparams);
        let fs = self.fs_mut();
        fs.proto.num_params = fs.nactvar();
        let n = fs.nactvar();
        fs.reserve_regs(n);
        Ok(())
    }

    // ============ Assignment & expression statements ============

    fn expr_stat(&mut self) -> LuaResult<()> {
        let mut e = ExpDesc::new(ExpKind::Void, 0);
        self.suffixed_exp(&mut e)?;
        if self.cur().is(&Token::Assign) || self.cur().is(&Token::Comma) {
            let mut targets = vec![e];
            self.rest_assign(&mut targets)
        } else {
            if e.kind != ExpKind::Call {
                return Err(self.err("syntax error"));
            }
            // a bare call keeps no results
            let fs = self.fs_mut();
            fs.proto.code[e.info as usize].set_c(1);
            Ok(())
        }
    }

    fn rest_assign(&mut self, targets: &mut Vec<ExpDesc>) -> LuaResult<()> {
        let last = targets.last().expect("assignment target");
        if !matches!(
            last.kind,
            ExpKind::Local | ExpKind::Upval | ExpKind::Indexed
        ) {
            return Err(self.err("cannot assign to this expression"));
        }
        if self.test_next(Token::Comma) {
            if targets.len() >= MAX_ASSIGN_TARGETS {
                return Err(self.err("too many assignment targets"));
            }
            let mut nv = ExpDesc::new(ExpKind::Void, 0);
            self.suffixed_exp(&mut nv)?;
            if nv.kind != ExpKind::Indexed {
                self.check_conflict(targets, &nv);
            }
            targets.push(nv);
            return self.rest_assign(targets);
        }
        self.expect_next(Token::Assign)?;
        let mut e = ExpDesc::new(ExpKind::Void, 0);
        let nexps = self.exp_list(&mut e)?;
        let nvars = targets.len();
        if nexps != nvars {
            self.adjust_assign(nvars, nexps, &mut e);
        } else {
            self.fs_mut().set_one_ret(&mut e);
            let target = targets.pop().expect("assignment target");
            self.fs_mut().store_var(&target, &mut e);
        }
        // remaining targets take the stacked values, right to left
        while let Some(t) = targets.pop() {
            let reg = self.fs_ref().freereg as u32 - 1;
            let mut v = ExpDesc::new(ExpKind::NonReloc, reg);
            self.fs_mut().store_var(&t, &mut v);
        }
        Ok(())
    }

    /// A later assignment target aliases a table or index that an earlier
    /// Indexed target reads: copy the aliased value to a fresh register
    /// so the earlier store still sees the old value (check_conflict).
    fn check_conflict(&mut self, targets: &mut [ExpDesc], nv: &ExpDesc) {
        let extra = self.fs_ref().freereg as u32;
        let mut conflict = false;
        for t in targets.iter_mut() {
            if t.kind != ExpKind::Indexed {
                continue;
            }
            let nv_is_local = nv.kind == ExpKind::Local;
            let nv_is_upval = nv.kind == ExpKind::Upval;
            if ((t.ind_on_upval && nv_is_upval) || (!t.ind_on_upval && nv_is_local))
                && t.ind_t == nv.info
            {
                conflict = true;
                t.ind_on_upval = false;
                t.ind_t = extra;
            }
            if nv_is_local && t.ind_idx == nv.info {
                conflict = true;
                t.ind_idx = extra;
            }
        }
        if conflict {
            let op = if nv.kind == ExpKind::Local {
                OpCode::Move
            } else {
                OpCode::GetUpval
            };
            self.fs_mut().emit_abc(op, extra, nv.info, 0);
            self.fs_mut().reserve_regs(1);
        }
    }

    /// Balance a value list against a variable list (adjust_assign).
    pub fn adjust_assign(&mut self, nvars: usize, nexps: usize, e: &mut ExpDesc) {
        let fs_extra = nvars as i64 - nexps as i64;
        if e.is_multiret() {
            // the open expression supplies the shortfall plus itself
            let extra = (fs_extra + 1).max(0) as i32;
            self.fs_mut().set_returns(e, extra);
            if extra > 1 {
                self.fs_mut().reserve_regs(extra as u8 - 1);
            }
        } else {
            if e.kind != ExpKind::Void {
                self.fs_mut().exp2nextreg(e);
            }
            if fs_extra > 0 {
                let fs = self.fs_mut();
                let reg = fs.freereg as u32;
                fs.reserve_regs(fs_extra as u8);
                fs.nil(reg, fs_extra as u32);
            }
        }
        if nexps > nvars {
            self.fs_mut().freereg -= (nexps - nvars) as u8;
        }
    }

    // ============ return ============

    fn ret_stat(&mut self) -> LuaResult<()> {
        self.advance(); // skip RETURN
        let mut first = self.fs_ref().nactvar() as u32;
        let nret: i32;
        if self.block_follow(true) || self.cur().is(&Token::Semi) {
            nret = 0;
        } else {
            let mut e = ExpDesc::new(ExpKind::Void, 0);
            let n = self.exp_list(&mut e)?;
            if e.is_multiret() {
                self.set_multret(&e);
                if e.kind == ExpKind::Call && n == 1 {
                    // lone call in return position becomes a tail call
                    let fs = self.fs_mut();
                    let inst = fs.proto.code[e.info as usize];
                    fs.proto.code[e.info as usize] =
                        Instruction::abc(OpCode::TailCall, inst.a(), inst.b(), 0);
                }
                nret = -1;
            } else if n == 1 {
                first = self.fs_mut().exp2anyreg(&mut e);
                nret = 1;
            } else {
                self.fs_mut().exp2nextreg(&mut e);
                debug_assert_eq!(
                    self.fs_ref().freereg as u32,
                    first + n as u32
                );
                nret = n as i32;
            }
        }
        self.fs_mut().ret(first, nret);
        self.test_next(Token::Semi);
        Ok(())
    }
}

impl crate::compiler::func_state::FuncState {
    /// Patch a loop's prep jump to the current position: FORPREP encodes
    /// its target in sBx directly, a plain JMP goes through the list
    /// machinery.
    pub fn patch_to_here_prep(&mut self, prep: i32, is_num: bool) {
        if is_num {
            let dest = self.pc() as i32;
            let offset = dest - (prep + 1);
            self.proto.code[prep as usize].set_sbx(offset);
            self.last_target = dest;
        } else {
            self.patch_to_here(prep);
        }
    }
}
