// Single-pass compiler: lexer + recursive-descent parser emitting
// register-allocated bytecode (lparser.c shape). One FuncState per
// lexical function, stacked; globals resolve through the _ENV upvalue.

pub mod code;
pub mod expdesc;
pub mod expr;
pub mod func_state;
pub mod lexer;
pub mod parse_number;
pub mod stmt;
pub mod token;

pub use lexer::intern_reserved_words;
pub use parse_number::parse_number;

use crate::compiler::expdesc::{ExpDesc, ExpKind};
use crate::compiler::func_state::{ActiveVar, FuncState};
use crate::compiler::token::{Token, TokenData};
use crate::gc::{ProtoId, StringId};
use crate::lua_value::{LocVar, UpvalDesc};
use crate::lua_vm::{LuaError, LuaResult, LuaVM};

/// Compile a source chunk into a prototype. The main function is always
/// vararg and captures _ENV as its single upvalue.
pub fn compile(vm: &mut LuaVM, source: &str, chunk_name: &str) -> LuaResult<ProtoId> {
    let tokens = lexer::tokenize(vm, source, chunk_name)?;
    let source_id = vm.intern_id(chunk_name.as_bytes());
    let env_id = vm.intern_id(b"_ENV");
    let mut p = Parser {
        vm,
        tokens,
        pos: 0,
        chunk_name: chunk_name.to_string(),
        fs: Vec::new(),
        pending_locals: Vec::new(),
        source_id,
        env_id,
    };
    p.main_func()
}

pub(crate) struct Parser<'a> {
    pub vm: &'a mut LuaVM,
    tokens: Vec<TokenData>,
    pos: usize,
    chunk_name: String,
    /// Function states, innermost last.
    pub fs: Vec<FuncState>,
    /// Locals declared but not yet activated (new_localvar before
    /// adjustlocalvars).
    pending_locals: Vec<StringId>,
    source_id: StringId,
    env_id: StringId,
}

/// Where a name resolved (singlevaraux).
enum VarPlace {
    Local(u8),
    Upval(u8),
    Global,
}

impl<'a> Parser<'a> {
    // ============ Token plumbing ============

    #[inline]
    pub fn cur(&self) -> Token {
        self.tokens[self.pos].token
    }

    #[inline]
    pub fn cur_line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    #[inline]
    pub fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        let line = self.cur_line();
        if let Some(fs) = self.fs.last_mut() {
            fs.cur_line = line;
        }
    }

    pub fn test_next(&mut self, t: Token) -> bool {
        if self.cur().is(&t) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect_next(&mut self, t: Token) -> LuaResult<()> {
        if self.cur().is(&t) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(&format!("'{}' expected", t.describe())))
        }
    }

    /// Closing-token check; `who` is the opening construct, named in the
    /// message when it sits on an earlier line.
    pub fn check_match(&mut self, what: Token, who: Token, line: u32) -> LuaResult<()> {
        if self.test_next(what) {
            return Ok(());
        }
        if line == self.cur_line() {
            Err(self.err(&format!("'{}' expected", what.describe())))
        } else {
            Err(self.err(&format!(
                "'{}' expected (to close '{}' at line {})",
                what.describe(),
                who.describe(),
                line
            )))
        }
    }

    pub fn expect_name(&mut self) -> LuaResult<StringId> {
        match self.cur() {
            Token::Name(id) => {
                self.advance();
                Ok(id)
            }
            _ => Err(self.err("<name> expected")),
        }
    }

    pub fn err(&mut self, msg: &str) -> LuaError {
        let near = self.cur().describe();
        let line = self.cur_line();
        self.vm
            .syntax_error(format!("{}:{}: {} near '{}'", self.chunk_name, line, msg, near))
    }

    #[inline]
    pub fn fs_mut(&mut self) -> &mut FuncState {
        self.fs.last_mut().expect("active function state")
    }

    #[inline]
    pub fn fs_ref(&self) -> &FuncState {
        self.fs.last().expect("active function state")
    }

    // ============ Function open/close ============

    fn main_func(&mut self) -> LuaResult<ProtoId> {
        self.open_func(true);
        // the main closure's single upvalue is _ENV
        let env_id = self.env_id;
        self.fs_mut().proto.upvalues.push(UpvalDesc {
            name: Some(env_id),
            in_stack: false,
            index: 0,
        });
        let line = self.cur_line();
        self.fs_mut().cur_line = line;
        self.stat_list()?;
        if !self.cur().is(&Token::Eof) {
            return Err(self.err("'<eof>' expected"));
        }
        let proto = self.close_func()?;
        Ok(self.vm.object_pool.alloc_proto(proto, &mut self.vm.gc))
    }

    pub fn open_func(&mut self, is_vararg: bool) {
        let mut fs = FuncState::new(is_vararg, Some(self.source_id));
        fs.cur_line = self.cur_line();
        self.fs.push(fs);
        self.fs_mut().enter_block(false);
    }

    /// Final return, scope close (undefined gotos surface here), detach
    /// the finished prototype.
    pub fn close_func(&mut self) -> LuaResult<crate::lua_value::Proto> {
        self.fs_mut().ret(0, 0); // implicit final return, no values
        self.leave_block()?;
        let fs = self.fs.pop().expect("active function state");
        Ok(fs.proto)
    }

    /// Patch end_pc of locals down to `level` active vars.
    pub fn leave_block_vars(&mut self, level: u8) {
        let pc = self.fs_ref().pc() as u32;
        let fs = self.fs_mut();
        while fs.actvar.len() > level as usize {
            let v = fs.actvar.pop().expect("active var");
            fs.proto.loc_vars[v.loc_var].end_pc = pc;
        }
        fs.freereg = fs.actvar.len() as u8;
    }

    // ============ Local variables ============

    pub fn new_localvar(&mut self, name: StringId) {
        self.pending_locals.push(name);
    }

    pub fn adjust_local_vars(&mut self, n: usize) {
        let pc = self.fs_ref().pc() as u32;
        let start = self.pending_locals.len() - n;
        for i in 0..n {
            let name = self.pending_locals[start + i];
            let fs = self.fs_mut();
            let loc_var = fs.proto.loc_vars.len();
            fs.proto.loc_vars.push(LocVar {
                name,
                start_pc: pc,
                end_pc: 0,
            });
            fs.actvar.push(ActiveVar { name, loc_var });
        }
        self.pending_locals.truncate(start);
    }

    // ============ Name resolution ============

    /// Resolve a name at nesting level `level`, creating upvalue
    /// descriptors down the chain (singlevaraux).
    fn resolve_var(&mut self, level: usize, name: StringId) -> VarPlace {
        if let Some(reg) = self.fs[level].search_var(name) {
            if level < self.fs.len() - 1 {
                // captured from an inner function: the owning block must
                // close it on exit
                self.fs[level].mark_upval_block(reg);
            }
            return VarPlace::Local(reg);
        }
        // known upvalue at this level?
        if let Some(idx) = self.fs[level]
            .proto
            .upvalues
            .iter()
            .position(|u| u.name == Some(name))
        {
            return VarPlace::Upval(idx as u8);
        }
        if level == 0 {
            return VarPlace::Global;
        }
        match self.resolve_var(level - 1, name) {
            VarPlace::Global => VarPlace::Global,
            outer => {
                let (in_stack, index) = match outer {
                    VarPlace::Local(r) => (true, r),
                    VarPlace::Upval(i) => (false, i),
                    VarPlace::Global => unreachable!(),
                };
                let ups = &mut self.fs[level].proto.upvalues;
                let idx = ups.len() as u8;
                ups.push(UpvalDesc {
                    name: Some(name),
                    in_stack,
                    index,
                });
                VarPlace::Upval(idx)
            }
        }
    }

    /// A bare name: local, upvalue, or _ENV.name (singlevar).
    pub fn single_var(&mut self, name: StringId, e: &mut ExpDesc) -> LuaResult<()> {
        let top = self.fs.len() - 1;
        match self.resolve_var(top, name) {
            VarPlace::Local(reg) => {
                *e = ExpDesc::new(ExpKind::Local, reg as u32);
            }
            VarPlace::Upval(idx) => {
                *e = ExpDesc::new(ExpKind::Upval, idx as u32);
            }
            VarPlace::Global => {
                // _ENV is always resolvable: the main function carries it
                let env = self.env_id;
                let mut env_e = ExpDesc::new(ExpKind::Void, 0);
                match self.resolve_var(top, env) {
                    VarPlace::Local(reg) => env_e = ExpDesc::new(ExpKind::Local, reg as u32),
                    VarPlace::Upval(idx) => env_e = ExpDesc::new(ExpKind::Upval, idx as u32),
                    VarPlace::Global => {
                        return Err(self.err("chunk has no _ENV"));
                    }
                }
                self.fs_mut().exp2anyregup(&mut env_e);
                let k = self.fs_mut().string_k(name);
                let mut key = ExpDesc::new(ExpKind::K, k);
                self.fs_mut().indexed(&mut env_e, &mut key);
                *e = env_e;
            }
        }
        Ok(())
    }

    /// Raise a pending register-overflow diagnostic at a statement edge.
    pub fn check_limits(&mut self) -> LuaResult<()> {
        if let Some(msg) = self.fs_mut().overflow.take() {
            let line = self.cur_line();
            return Err(self
                .vm
                .syntax_error(format!("{}:{}: {}", self.chunk_name, line, msg)));
        }
        Ok(())
    }
}
