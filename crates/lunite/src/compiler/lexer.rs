// Hand-written lexer (llex.c). Produces the whole token stream up front;
// names and string literals are interned as they are scanned, and reserved
// words are recognized through the `extra` byte the startup code left on
// their interned strings.

use crate::compiler::parse_number::parse_number;
use crate::compiler::token::{Token, TokenData, RESERVED};
use crate::lua_vm::{LuaResult, LuaVM};

pub struct Lexer<'s> {
    src: &'s [u8],
    pos: usize,
    line: u32,
    chunk_name: String,
}

/// Intern the reserved words and stamp their lexer codes; called once at
/// state startup.
pub fn intern_reserved_words(vm: &mut LuaVM) {
    for (i, (word, _)) in RESERVED.iter().enumerate() {
        let id = vm.intern_id(word.as_bytes());
        if let Some(s) = vm.object_pool.strings.get_mut(id.0) {
            s.data.extra = (i + 1) as u8;
        }
        vm.object_pool.fix(crate::gc::GcId::String(id));
    }
}

pub fn tokenize(vm: &mut LuaVM, source: &str, chunk_name: &str) -> LuaResult<Vec<TokenData>> {
    let mut lx = Lexer {
        src: source.as_bytes(),
        pos: 0,
        line: 1,
        chunk_name: chunk_name.to_string(),
    };
    let mut tokens = Vec::new();
    // a leading '#!' line is skipped (shebang convention)
    if lx.src.starts_with(b"#") {
        while !lx.at_end() && lx.cur() != b'\n' {
            lx.pos += 1;
        }
    }
    loop {
        let t = lx.next_token(vm)?;
        let is_eof = t.token.is(&Token::Eof);
        tokens.push(t);
        if is_eof {
            break;
        }
    }
    Ok(tokens)
}

impl<'s> Lexer<'s> {
    #[inline(always)]
    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    #[inline(always)]
    fn cur(&self) -> u8 {
        self.src[self.pos]
    }

    #[inline(always)]
    fn peek(&self, n: usize) -> u8 {
        *self.src.get(self.pos + n).unwrap_or(&0)
    }

    fn error<T>(&self, vm: &mut LuaVM, msg: &str) -> LuaResult<T> {
        Err(vm.syntax_error(format!("{}:{}: {}", self.chunk_name, self.line, msg)))
    }

    /// Consume one end-of-line sequence (\n, \r, \n\r or \r\n).
    fn newline(&mut self) {
        let first = self.cur();
        self.pos += 1;
        if !self.at_end() && (self.cur() == b'\n' || self.cur() == b'\r') && self.cur() != first {
            self.pos += 1;
        }
        self.line += 1;
    }

    fn next_token(&mut self, vm: &mut LuaVM) -> LuaResult<TokenData> {
        loop {
            if self.at_end() {
                return Ok(TokenData {
                    token: Token::Eof,
                    line: self.line,
                });
            }
            match self.cur() {
                b'\n' | b'\r' => self.newline(),
                b' ' | b'\t' | 0x0b | 0x0c => self.pos += 1,
                b'-' if self.peek(1) == b'-' => {
                    self.pos += 2;
                    // long comment?
                    if !self.at_end() && self.cur() == b'[' {
                        if let Some(level) = self.long_bracket_level() {
                            self.skip_long_bracket(vm, level)?;
                            continue;
                        }
                    }
                    while !self.at_end() && self.cur() != b'\n' && self.cur() != b'\r' {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let line = self.line;
        let token = self.scan(vm)?;
        Ok(TokenData { token, line })
    }

    fn scan(&mut self, vm: &mut LuaVM) -> LuaResult<Token> {
        let c = self.cur();
        match c {
            b'+' => self.take(Token::Plus),
            b'-' => self.take(Token::Minus),
            b'*' => self.take(Token::Star),
            b'/' => {
                if self.peek(1) == b'/' {
                    self.take2(Token::DSlash)
                } else {
                    self.take(Token::Slash)
                }
            }
            b'%' => self.take(Token::Percent),
            b'^' => self.take(Token::Caret),
            b'#' => self.take(Token::Hash),
            b'&' => self.take(Token::Amp),
            b'~' => {
                if self.peek(1) == b'=' {
                    self.take2(Token::Ne)
                } else {
                    self.take(Token::Tilde)
                }
            }
            b'|' => self.take(Token::Pipe),
            b'<' => match self.peek(1) {
                b'<' => self.take2(Token::Shl),
                b'=' => self.take2(Token::Le),
                _ => self.take(Token::Lt),
            },
            b'>' => match self.peek(1) {
                b'>' => self.take2(Token::Shr),
                b'=' => self.take2(Token::Ge),
                _ => self.take(Token::Gt),
            },
            b'=' => {
                if self.peek(1) == b'=' {
                    self.take2(Token::Eq)
                } else {
                    self.take(Token::Assign)
                }
            }
            b'(' => self.take(Token::LParen),
            b')' => self.take(Token::RParen),
            b'{' => self.take(Token::LBrace),
            b'}' => self.take(Token::RBrace),
            b']' => self.take(Token::RBracket),
            b';' => self.take(Token::Semi),
            b':' => {
                if self.peek(1) == b':' {
                    self.take2(Token::DColon)
                } else {
                    self.take(Token::Colon)
                }
            }
            b',' => self.take(Token::Comma),
            b'.' => {
                if self.peek(1) == b'.' {
                    if self.peek(2) == b'.' {
                        self.pos += 3;
                        Ok(Token::Ellipsis)
                    } else {
                        self.take2(Token::Concat)
                    }
                } else if self.peek(1).is_ascii_digit() {
                    self.read_number(vm)
                } else {
                    self.take(Token::Dot)
                }
            }
            b'[' => {
                if let Some(level) = self.long_bracket_level() {
                    let s = self.read_long_string(vm, level)?;
                    Ok(Token::Str(s))
                } else {
                    self.take(Token::LBracket)
                }
            }
            b'"' | b'\'' => self.read_short_string(vm),
            b'0'..=b'9' => self.read_number(vm),
            c if c == b'_' || c.is_ascii_alphabetic() => self.read_name(vm),
            _ => {
                let msg = format!("unexpected symbol near '{}'", c as char);
                self.error(vm, &msg)
            }
        }
    }

    #[inline]
    fn take(&mut self, t: Token) -> LuaResult<Token> {
        self.pos += 1;
        Ok(t)
    }

    #[inline]
    fn take2(&mut self, t: Token) -> LuaResult<Token> {
        self.pos += 2;
        Ok(t)
    }

    fn read_name(&mut self, vm: &mut LuaVM) -> LuaResult<Token> {
        let start = self.pos;
        while !self.at_end() && (self.cur() == b'_' || self.cur().is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        let id = vm.intern_id(&self.src[start..self.pos]);
        let code = vm
            .object_pool
            .string(id)
            .map(|s| s.extra)
            .unwrap_or(0);
        if code > 0 {
            Ok(RESERVED[(code - 1) as usize].1)
        } else {
            Ok(Token::Name(id))
        }
    }

    fn read_number(&mut self, vm: &mut LuaVM) -> LuaResult<Token> {
        let start = self.pos;
        let hex = self.cur() == b'0' && matches!(self.peek(1), b'x' | b'X');
        if hex {
            self.pos += 2;
        }
        let exp_chars: [u8; 2] = if hex { [b'p', b'P'] } else { [b'e', b'E'] };
        while !self.at_end() {
            let c = self.cur();
            let is_digit = if hex {
                c.is_ascii_hexdigit()
            } else {
                c.is_ascii_digit()
            };
            if is_digit || c == b'.' {
                self.pos += 1;
            } else if exp_chars.contains(&c) {
                self.pos += 1;
                if !self.at_end() && (self.cur() == b'+' || self.cur() == b'-') {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        match parse_number(text) {
            Some(v) => {
                if let Some(i) = v.as_integer() {
                    Ok(Token::Int(i))
                } else {
                    Ok(Token::Float(f64::from_bits(v.secondary)))
                }
            }
            None => {
                let msg = format!("malformed number near '{}'", text);
                self.error(vm, &msg)
            }
        }
    }

    /// At a '[': count the '='s of a long-bracket opener; None if this is
    /// just a plain bracket.
    fn long_bracket_level(&self) -> Option<usize> {
        let mut n = 1;
        while self.peek(n) == b'=' {
            n += 1;
        }
        if self.peek(n) == b'[' {
            Some(n - 1)
        } else {
            None
        }
    }

    /// Long comment body: same bracket scan, nothing interned.
    fn skip_long_bracket(&mut self, vm: &mut LuaVM, level: usize) -> LuaResult<()> {
        self.pos += level + 2;
        loop {
            if self.at_end() {
                return self.error(vm, "unfinished long comment");
            }
            match self.cur() {
                b']' => {
                    let mut n = 1;
                    while self.peek(n) == b'=' {
                        n += 1;
                    }
                    if n - 1 == level && self.peek(n) == b']' {
                        self.pos += level + 2;
                        return Ok(());
                    }
                    self.pos += 1;
                }
                b'\n' | b'\r' => self.newline(),
                _ => self.pos += 1,
            }
        }
    }

    /// Long string body `[==[ ... ]==]`; a newline right after the opener
    /// is dropped.
    fn read_long_string(
        &mut self,
        vm: &mut LuaVM,
        level: usize,
    ) -> LuaResult<crate::gc::StringId> {
        self.pos += level + 2; // skip [==[
        if !self.at_end() && (self.cur() == b'\n' || self.cur() == b'\r') {
            self.newline();
        }
        let start = self.pos;
        loop {
            if self.at_end() {
                return self.error(vm, "unfinished long string");
            }
            match self.cur() {
                b']' => {
                    let mut n = 1;
                    while self.peek(n) == b'=' {
                        n += 1;
                    }
                    if n - 1 == level && self.peek(n) == b']' {
                        let body = &self.src[start..self.pos];
                        self.pos += level + 2;
                        return Ok(vm.intern_id(body));
                    }
                    self.pos += 1;
                }
                b'\n' | b'\r' => self.newline(),
                _ => self.pos += 1,
            }
        }
    }

    fn read_short_string(&mut self, vm: &mut LuaVM) -> LuaResult<Token> {
        let quote = self.cur();
        self.pos += 1;
        let mut out: Vec<u8> = Vec::new();
        loop {
            if self.at_end() {
                return self.error(vm, "unfinished string");
            }
            match self.cur() {
                b'\n' | b'\r' => return self.error(vm, "unfinished string"),
                c if c == quote => {
                    self.pos += 1;
                    return Ok(Token::Str(vm.intern_id(&out)));
                }
                b'\\' => {
                    self.pos += 1;
                    if self.at_end() {
                        return self.error(vm, "unfinished string");
                    }
                    match self.cur() {
                        b'a' => {
                            out.push(0x07);
                            self.pos += 1;
                        }
                        b'b' => {
                            out.push(0x08);
                            self.pos += 1;
                        }
                        b'f' => {
                            out.push(0x0c);
                            self.pos += 1;
                        }
                        b'n' => {
                            out.push(b'\n');
                            self.pos += 1;
                        }
                        b'r' => {
                            out.push(b'\r');
                            self.pos += 1;
                        }
                        b't' => {
                            out.push(b'\t');
                            self.pos += 1;
                        }
                        b'v' => {
                            out.push(0x0b);
                            self.pos += 1;
                        }
                        b'\\' => {
                            out.push(b'\\');
                            self.pos += 1;
                        }
                        b'"' => {
                            out.push(b'"');
                            self.pos += 1;
                        }
                        b'\'' => {
                            out.push(b'\'');
                            self.pos += 1;
                        }
                        b'\n' | b'\r' => {
                            self.newline();
                            out.push(b'\n');
                        }
                        b'x' => {
                            self.pos += 1;
                            let mut v: u32 = 0;
                            for _ in 0..2 {
                                let d = hex_value(if self.at_end() { 0 } else { self.cur() });
                                match d {
                                    Some(d) => {
                                        v = v * 16 + d as u32;
                                        self.pos += 1;
                                    }
                                    None => {
                                        return self
                                            .error(vm, "hexadecimal digit expected")
                                    }
                                }
                            }
                            out.push(v as u8);
                        }
                        b'z' => {
                            // skip following whitespace, newlines included
                            self.pos += 1;
                            while !self.at_end() {
                                match self.cur() {
                                    b'\n' | b'\r' => self.newline(),
                                    b' ' | b'\t' | 0x0b | 0x0c => self.pos += 1,
                                    _ => break,
                                }
                            }
                        }
                        b'u' => {
                            self.pos += 1;
                            if self.at_end() || self.cur() != b'{' {
                                return self.error(vm, "missing '{' in \\u{xxxx}");
                            }
                            self.pos += 1;
                            let mut cp: u32 = 0;
                            let mut any = false;
                            while let Some(d) =
                                hex_value(if self.at_end() { 0 } else { self.cur() })
                            {
                                any = true;
                                cp = cp.saturating_mul(16).saturating_add(d as u32);
                                if cp > 0x10FFFF {
                                    return self.error(vm, "UTF-8 value too large");
                                }
                                self.pos += 1;
                            }
                            if !any {
                                return self.error(vm, "hexadecimal digit expected");
                            }
                            if self.at_end() || self.cur() != b'}' {
                                return self.error(vm, "missing '}' in \\u{xxxx}");
                            }
                            self.pos += 1;
                            push_utf8(&mut out, cp);
                        }
                        d if d.is_ascii_digit() => {
                            // up to three decimal digits
                            let mut v: u32 = 0;
                            for _ in 0..3 {
                                if self.at_end() || !self.cur().is_ascii_digit() {
                                    break;
                                }
                                v = v * 10 + (self.cur() - b'0') as u32;
                                self.pos += 1;
                            }
                            if v > 255 {
                                return self.error(vm, "decimal escape too large");
                            }
                            out.push(v as u8);
                        }
                        _ => return self.error(vm, "invalid escape sequence"),
                    }
                }
                c => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}

#[inline]
fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Encode a code point as UTF-8 bytes (\u{...} escapes may produce any
/// byte sequence, so this avoids char conversion).
fn push_utf8(out: &mut Vec<u8>, cp: u32) {
    if cp < 0x80 {
        out.push(cp as u8);
    } else if cp < 0x800 {
        out.push(0xC0 | (cp >> 6) as u8);
        out.push(0x80 | (cp & 0x3F) as u8);
    } else if cp < 0x10000 {
        out.push(0xE0 | (cp >> 12) as u8);
        out.push(0x80 | ((cp >> 6) & 0x3F) as u8);
        out.push(0x80 | (cp & 0x3F) as u8);
    } else {
        out.push(0xF0 | (cp >> 18) as u8);
        out.push(0x80 | ((cp >> 12) & 0x3F) as u8);
        out.push(0x80 | ((cp >> 6) & 0x3F) as u8);
        out.push(0x80 | (cp & 0x3F) as u8);
    }
}
