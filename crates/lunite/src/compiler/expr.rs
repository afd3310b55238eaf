// Expression parsing: precedence climbing over the binop table, suffixed
// expressions, function calls and table constructors (the expression half
// of lparser.c).

use crate::compiler::code::{binop_priority, BinOpr, UnOpr, UNARY_PRIORITY};
use crate::compiler::expdesc::{ExpDesc, ExpKind};
use crate::compiler::token::Token;
use crate::compiler::Parser;
use crate::lua_vm::opcode::{Instruction, OpCode, MAXARG_B, MAXARG_C};
use crate::lua_vm::LuaResult;

fn unop_of(t: Token) -> Option<UnOpr> {
    match t {
        Token::Minus => Some(UnOpr::Minus),
        Token::Not => Some(UnOpr::Not),
        Token::Hash => Some(UnOpr::Len),
        Token::Tilde => Some(UnOpr::BNot),
        _ => None,
    }
}

fn binop_of(t: Token) -> Option<BinOpr> {
    match t {
        Token::Plus => Some(BinOpr::Add),
        Token::Minus => Some(BinOpr::Sub),
        Token::Star => Some(BinOpr::Mul),
        Token::Slash => Some(BinOpr::Div),
        Token::DSlash => Some(BinOpr::IDiv),
        Token::Percent => Some(BinOpr::Mod),
        Token::Caret => Some(BinOpr::Pow),
        Token::Concat => Some(BinOpr::Concat),
        Token::Amp => Some(BinOpr::BAnd),
        Token::Pipe => Some(BinOpr::BOr),
        Token::Tilde => Some(BinOpr::BXor),
        Token::Shl => Some(BinOpr::Shl),
        Token::Shr => Some(BinOpr::Shr),
        Token::Ne => Some(BinOpr::Ne),
        Token::Eq => Some(BinOpr::Eq),
        Token::Lt => Some(BinOpr::Lt),
        Token::Le => Some(BinOpr::Le),
        Token::Gt => Some(BinOpr::Gt),
        Token::Ge => Some(BinOpr::Ge),
        Token::And => Some(BinOpr::And),
        Token::Or => Some(BinOpr::Or),
        _ => None,
    }
}

impl<'a> Parser<'a> {
    pub fn expr(&mut self, e: &mut ExpDesc) -> LuaResult<()> {
        self.subexpr(e, 0)
    }

    /// Precedence climbing (subexpr): operators bind while their left
    /// priority exceeds `limit`; `^` and `..` are right-associative
    /// through their asymmetric priorities.
    fn subexpr(&mut self, e: &mut ExpDesc, limit: u8) -> LuaResult<()> {
        if let Some(u) = unop_of(self.cur()) {
            let line = self.cur_line();
            self.advance();
            self.subexpr(e, UNARY_PRIORITY)?;
            self.fs_mut().prefix(u, e, line);
        } else {
            self.simple_exp(e)?;
        }
        while let Some(op) = binop_of(self.cur()) {
            let (left, right) = binop_priority(op);
            if left <= limit {
                break;
            }
            let line = self.cur_line();
            self.advance();
            self.fs_mut().infix(op, e);
            let mut e2 = ExpDesc::new(ExpKind::Void, 0);
            self.subexpr(&mut e2, right)?;
            self.fs_mut().posfix(op, e, &mut e2, line);
        }
        Ok(())
    }

    fn simple_exp(&mut self, e: &mut ExpDesc) -> LuaResult<()> {
        match self.cur() {
            Token::Int(i) => {
                *e = ExpDesc::int(i);
                self.advance();
            }
            Token::Float(f) => {
                *e = ExpDesc::float(f);
                self.advance();
            }
            Token::Str(s) => {
                let k = self.fs_mut().string_k(s);
                *e = ExpDesc::new(ExpKind::K, k);
                self.advance();
            }
            Token::Nil => {
                *e = ExpDesc::new(ExpKind::Nil, 0);
                self.advance();
            }
            Token::True => {
                *e = ExpDesc::new(ExpKind::True, 0);
                self.advance();
            }
            Token::False => {
                *e = ExpDesc::new(ExpKind::False, 0);
                self.advance();
            }
            Token::Ellipsis => {
                if !self.fs_ref().proto.is_vararg {
                    return Err(self.err("cannot use '...' outside a vararg function"));
                }
                let pc = self.fs_mut().emit_abc(OpCode::Vararg, 0, 1, 0);
                *e = ExpDesc::new(ExpKind::Vararg, pc as u32);
                self.advance();
            }
            Token::LBrace => {
                self.constructor(e)?;
            }
            Token::Function => {
                let line = self.cur_line();
                self.advance();
                self.body(e, false, line)?;
            }
            _ => {
                self.suffixed_exp(e)?;
            }
        }
        Ok(())
    }

    pub fn primary_exp(&mut self, e: &mut ExpDesc) -> LuaResult<()> {
        match self.cur() {
            Token::LParen => {
                let line = self.cur_line();
                self.advance();
                self.expr(e)?;
                self.check_match(Token::RParen, Token::LParen, line)?;
                // parentheses truncate multiple results to one
                self.fs_mut().discharge_vars(e);
                Ok(())
            }
            Token::Name(n) => {
                self.advance();
                self.single_var(n, e)
            }
            _ => Err(self.err("unexpected symbol")),
        }
    }

    pub fn suffixed_exp(&mut self, e: &mut ExpDesc) -> LuaResult<()> {
        let line = self.cur_line();
        self.primary_exp(e)?;
        loop {
            match self.cur() {
                Token::Dot => {
                    self.field_sel(e)?;
                }
                Token::LBracket => {
                    self.fs_mut().exp2anyregup(e);
                    self.advance();
                    let mut key = ExpDesc::new(ExpKind::Void, 0);
                    self.expr(&mut key)?;
                    self.fs_mut().exp2val(&mut key);
                    self.expect_next(Token::RBracket)?;
                    self.fs_mut().indexed(e, &mut key);
                }
                Token::Colon => {
                    self.advance();
                    let name = self.expect_name()?;
                    let k = self.fs_mut().string_k(name);
                    let mut key = ExpDesc::new(ExpKind::K, k);
                    self.fs_mut().op_self(e, &mut key);
                    self.func_args(e, line)?;
                }
                Token::LParen | Token::Str(_) | Token::LBrace => {
                    self.fs_mut().exp2nextreg(e);
                    self.func_args(e, line)?;
                }
                _ => return Ok(()),
            }
        }
    }

    /// `.name` selection.
    pub fn field_sel(&mut self, e: &mut ExpDesc) -> LuaResult<()> {
        self.fs_mut().exp2anyregup(e);
        self.advance(); // skip '.' (or ':')
        let name = self.expect_name()?;
        let k = self.fs_mut().string_k(name);
        let mut key = ExpDesc::new(ExpKind::K, k);
        self.fs_mut().indexed(e, &mut key);
        Ok(())
    }

    /// Comma-separated expressions; returns the count, with the last one
    /// left undischarged in `e`.
    pub fn exp_list(&mut self, e: &mut ExpDesc) -> LuaResult<usize> {
        let mut n = 1;
        self.expr(e)?;
        while self.test_next(Token::Comma) {
            self.fs_mut().exp2nextreg(e);
            self.expr(e)?;
            n += 1;
        }
        Ok(n)
    }

    fn func_args(&mut self, e: &mut ExpDesc, line: u32) -> LuaResult<()> {
        let mut args = ExpDesc::new(ExpKind::Void, 0);
        match self.cur() {
            Token::LParen => {
                self.advance();
                if self.cur().is(&Token::RParen) {
                    args.kind = ExpKind::Void;
                } else {
                    self.exp_list(&mut args)?;
                    self.fs_mut().set_returns(&args, -1);
                }
                self.check_match(Token::RParen, Token::LParen, line)?;
            }
            Token::Str(s) => {
                let k = self.fs_mut().string_k(s);
                args = ExpDesc::new(ExpKind::K, k);
                self.advance();
            }
            Token::LBrace => {
                self.constructor(&mut args)?;
            }
            _ => return Err(self.err("function arguments expected")),
        }
        debug_assert_eq!(e.kind, ExpKind::NonReloc);
        let base = e.info;
        let nparams = if args.is_multiret() {
            // LUA_MULTRET: B = 0
            u32::MAX
        } else {
            if args.kind != ExpKind::Void {
                self.fs_mut().exp2nextreg(&mut args);
            }
            self.fs_ref().freereg as u32 - (base + 1)
        };
        let b = if nparams == u32::MAX { 0 } else { nparams + 1 };
        let pc = self.fs_mut().emit_abc(OpCode::Call, base, b, 2);
        self.fs_mut().fix_line(line);
        *e = ExpDesc::new(ExpKind::Call, pc as u32);
        // the call slot is reusable once the call completes
        self.fs_mut().freereg = base as u8 + 1;
        Ok(())
    }

    /// Multi-result expressions keep all results when they end a list.
    pub fn set_multret(&mut self, e: &ExpDesc) {
        self.fs_mut().set_returns(e, -1);
    }

    // ============ Table constructors ============

    pub fn constructor(&mut self, e: &mut ExpDesc) -> LuaResult<()> {
        let line = self.cur_line();
        let pc = {
            let fs = self.fs_mut();
            let reg = fs.freereg as u32;
            let pc = fs.new_table_code(reg, 0, 0);
            *e = ExpDesc::new(ExpKind::NonReloc, reg);
            fs.reserve_regs(1);
            pc
        };
        let mut na = 0usize; // array items
        let mut nh = 0usize; // hash items
        let mut tostore = 0i32; // array items pending a SETLIST flush
        let mut last = ExpDesc::new(ExpKind::Void, 0);
        self.expect_next(Token::LBrace)?;
        loop {
            if self.cur().is(&Token::RBrace) {
                break;
            }
            // flush a full batch before parsing the next item
            if last.kind != ExpKind::Void {
                self.fs_mut().exp2nextreg(&mut last);
                last.kind = ExpKind::Void;
                if tostore == crate::lua_vm::execute::FIELDS_PER_FLUSH as i32 {
                    let base = e.info;
                    self.fs_mut().set_list(base, na, tostore);
                    tostore = 0;
                }
            }
            match self.cur() {
                Token::Name(n) if self.peek_is_assign() => {
                    self.advance();
                    self.advance(); // '='
                    let k = self.fs_mut().string_k(n);
                    let mut key = ExpDesc::new(ExpKind::K, k);
                    self.rec_field(e, &mut key)?;
                    nh += 1;
                }
                Token::LBracket => {
                    self.advance();
                    let mut key = ExpDesc::new(ExpKind::Void, 0);
                    self.expr(&mut key)?;
                    self.fs_mut().exp2val(&mut key);
                    self.expect_next(Token::RBracket)?;
                    self.expect_next(Token::Assign)?;
                    self.rec_field(e, &mut key)?;
                    nh += 1;
                }
                _ => {
                    self.expr(&mut last)?;
                    na += 1;
                    tostore += 1;
                }
            }
            if !self.test_next(Token::Comma) && !self.test_next(Token::Semi) {
                break;
            }
        }
        self.check_match(Token::RBrace, Token::LBrace, line)?;
        // last list item may supply multiple values
        if last.kind != ExpKind::Void {
            if last.is_multiret() {
                self.set_multret(&last);
                let base = e.info;
                self.fs_mut().set_list(base, na, -1);
                na -= 1; // the multi-value item is not counted in the hint
            } else {
                self.fs_mut().exp2nextreg(&mut last);
                let base = e.info;
                self.fs_mut().set_list(base, na, tostore);
            }
        } else if tostore > 0 {
            let base = e.info;
            self.fs_mut().set_list(base, na, tostore);
        }
        // patch the size hints now that the counts are known
        let fs = self.fs_mut();
        let narr_fb = crate::lua_vm::opcode::int2fb(na as u32).min(MAXARG_B);
        let nrec_fb = crate::lua_vm::opcode::int2fb(nh as u32).min(MAXARG_C);
        fs.proto.code[pc] =
            Instruction::abc(OpCode::NewTable, e.info, narr_fb, nrec_fb);
        Ok(())
    }

    fn peek_is_assign(&self) -> bool {
        self.tokens
            .get(self.pos + 1)
            .map(|t| t.token.is(&Token::Assign))
            .unwrap_or(false)
    }

    /// `key = value` inside a constructor; both go out as RK operands.
    fn rec_field(&mut self, table: &ExpDesc, key: &mut ExpDesc) -> LuaResult<()> {
        let free_before = self.fs_ref().freereg;
        let rk_key = self.fs_mut().exp2rk(key);
        let mut val = ExpDesc::new(ExpKind::Void, 0);
        self.expr(&mut val)?;
        let rk_val = self.fs_mut().exp2rk(&mut val);
        let t = table.info;
        self.fs_mut().emit_abc(OpCode::SetTable, t, rk_key, rk_val);
        self.fs_mut().freereg = free_before;
        Ok(())
    }
}
