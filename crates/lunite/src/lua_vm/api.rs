// Stack-based embedding surface (lapi.c). The host manipulates values
// through slot indices on the current thread: positive indices count from
// the running frame's base, negative from the top, and two pseudo-index
// ranges address the registry and the running host closure's upvalues.
//
// Readers never raise for a wrong type - they return an Option or a
// default. Operations that can run Lua code (arith, compare, gets through
// __index, calls) return LuaResult.

use crate::gc::{GcId, TableId, ThreadId};
use crate::lua_value::{Closure, LuaValue, LuaValueKind, ThreadStatus};
use crate::lua_vm::execute::metamethod::number_to_string;
use crate::lua_vm::{LuaError, LuaResult, LuaVM, TmKind};

/// First pseudo-index; everything below it addresses upvalues.
pub const REGISTRY_INDEX: i32 = -1_001_000;

/// Pseudo-index of the running host closure's i-th upvalue (1-based).
pub const fn upvalue_index(i: i32) -> i32 {
    REGISTRY_INDEX - i
}

/// Argument pack for push_fstring.
pub enum FmtArg {
    Str(String),
    Char(u8),
    Int(i64),
    Float(f64),
    Ptr(usize),
    Utf8(u32),
}

impl LuaVM {
    // ============ Index resolution ============

    /// Base of the running host frame (0 when called outside any frame).
    fn frame_base(&self) -> usize {
        self.th()
            .current_frame()
            .filter(|ci| ci.is_host())
            .map(|ci| ci.base)
            .unwrap_or(0)
    }

    /// Read the value at an acceptable index; nil for empty slots.
    pub fn index2value(&self, idx: i32) -> LuaValue {
        if idx > 0 {
            let slot = self.frame_base() + idx as usize - 1;
            if slot < self.th().top() {
                self.th().get(slot)
            } else {
                LuaValue::nil()
            }
        } else if idx > REGISTRY_INDEX {
            let top = self.th().top() as i64;
            let slot = top + idx as i64;
            if slot >= self.frame_base() as i64 {
                self.th().get(slot as usize)
            } else {
                LuaValue::nil()
            }
        } else if idx == REGISTRY_INDEX {
            LuaValue::table(self.registry)
        } else {
            // upvalue of the running host closure
            let n = (REGISTRY_INDEX - idx - 1) as usize;
            let func = self
                .th()
                .current_frame()
                .map(|ci| ci.func)
                .unwrap_or_else(LuaValue::nil);
            match func.as_function_id().and_then(|f| self.object_pool.closure(f)) {
                Some(Closure::Host(h)) => {
                    h.upvalues.get(n).copied().unwrap_or_else(LuaValue::nil)
                }
                _ => LuaValue::nil(),
            }
        }
    }

    /// Absolute stack slot of a (non-pseudo) index, if it is in range.
    fn index2slot(&self, idx: i32) -> Option<usize> {
        if idx > 0 {
            let slot = self.frame_base() + idx as usize - 1;
            (slot < self.th().top()).then_some(slot)
        } else if idx > REGISTRY_INDEX {
            let slot = self.th().top() as i64 + idx as i64;
            (slot >= self.frame_base() as i64).then(|| slot as usize)
        } else {
            None
        }
    }

    /// lua_absindex.
    pub fn abs_index(&self, idx: i32) -> i32 {
        if idx > 0 || idx <= REGISTRY_INDEX {
            idx
        } else {
            (self.th().top() - self.frame_base()) as i32 + idx + 1
        }
    }

    // ============ Stack manipulation ============

    pub fn get_top(&self) -> i32 {
        (self.th().top() - self.frame_base()) as i32
    }

    pub fn api_set_top(&mut self, idx: i32) {
        let base = self.frame_base();
        let new_top = if idx >= 0 {
            base + idx as usize
        } else {
            (self.th().top() as i64 + idx as i64 + 1).max(base as i64) as usize
        };
        self.th_mut().set_top(new_top);
    }

    pub fn push(&mut self, v: LuaValue) {
        self.th_mut().push(v);
    }

    pub fn pop(&mut self, n: i32) {
        self.api_set_top(-n - 1);
    }

    pub fn push_value(&mut self, idx: i32) {
        let v = self.index2value(idx);
        self.push(v);
    }

    /// lua_rotate: rotate the slice [idx, top] by n positions.
    pub fn rotate(&mut self, idx: i32, n: i32) {
        let Some(start) = self.index2slot(idx) else { return };
        let top = self.th().top();
        let len = top - start;
        if len == 0 {
            return;
        }
        let shift = n.rem_euclid(len as i32) as usize;
        let th = self.th_mut();
        th.stack[start..top].rotate_right(shift);
    }

    pub fn insert(&mut self, idx: i32) {
        self.rotate(idx, 1);
    }

    pub fn remove(&mut self, idx: i32) {
        self.rotate(idx, -1);
        self.pop(1);
    }

    pub fn replace(&mut self, idx: i32) {
        self.copy(-1, idx);
        self.pop(1);
    }

    /// lua_copy: overwrite `to` with the value at `from`.
    pub fn copy(&mut self, from: i32, to: i32) {
        let v = self.index2value(from);
        if let Some(slot) = self.index2slot(to) {
            self.th_mut().set(slot, v);
        }
    }

    /// lua_checkstack.
    pub fn check_stack_slots(&mut self, n: usize) -> bool {
        let needed = self.th().top() + n;
        needed <= self.options.max_stack
    }

    /// Move n values from the top of the current thread to another one.
    pub fn xmove(&mut self, to: ThreadId, n: usize) {
        if to == self.current_thread {
            return;
        }
        let mut moved = Vec::with_capacity(n);
        for _ in 0..n {
            moved.push(self.th_mut().pop());
        }
        if let Some(th) = self.object_pool.thread_mut(to) {
            for v in moved.into_iter().rev() {
                th.push(v);
            }
        }
    }

    // ============ Readers ============

    pub fn value_type(&self, idx: i32) -> LuaValueKind {
        self.index2value(idx).kind()
    }

    pub fn is_nil(&self, idx: i32) -> bool {
        self.index2value(idx).is_nil()
    }

    pub fn is_number(&self, idx: i32) -> bool {
        self.index2value(idx).is_number()
    }

    pub fn is_string_at(&self, idx: i32) -> bool {
        let v = self.index2value(idx);
        v.is_string() || v.is_number()
    }

    pub fn is_function_at(&self, idx: i32) -> bool {
        self.index2value(idx).is_function()
    }

    /// lua_tonumberx: numbers pass, strings coerce.
    pub fn to_number(&self, idx: i32) -> Option<f64> {
        let v = self.index2value(idx);
        self.tonumber_value(v).and_then(|n| n.as_number())
    }

    /// lua_tointegerx: floats must be exact.
    pub fn to_integer(&self, idx: i32) -> Option<i64> {
        let v = self.index2value(idx);
        match self.tonumber_value(v) {
            Some(n) => {
                if let Some(i) = n.as_integer() {
                    Some(i)
                } else {
                    crate::lua_value::float_to_int_exact(n.as_float()?)
                }
            }
            None => None,
        }
    }

    pub fn to_boolean(&self, idx: i32) -> bool {
        self.index2value(idx).is_truthy()
    }

    /// lua_tolstring: strings return their bytes; numbers convert.
    pub fn to_lstring(&mut self, idx: i32) -> Option<Vec<u8>> {
        let v = self.index2value(idx);
        if let Some(b) = self.str_bytes(v) {
            return Some(b.to_vec());
        }
        if v.is_number() {
            return Some(number_to_string(v).into_bytes());
        }
        None
    }

    /// lua_rawlen: length without metamethods.
    pub fn raw_len(&self, idx: i32) -> usize {
        let v = self.index2value(idx);
        if let Some(b) = self.str_bytes(v) {
            return b.len();
        }
        if let Some(t) = v.as_table_id() {
            return self
                .object_pool
                .table(t)
                .map(|tbl| tbl.length() as usize)
                .unwrap_or(0);
        }
        if let Some(u) = v.as_userdata_id() {
            return self
                .object_pool
                .userdata_ref(u)
                .map(|ud| ud.len())
                .unwrap_or(0);
        }
        0
    }

    pub fn to_cfunction(&self, idx: i32) -> Option<crate::lua_vm::CFunction> {
        let v = self.index2value(idx);
        if let Some(f) = v.as_cfunction() {
            return Some(f);
        }
        match v.as_function_id().and_then(|f| self.object_pool.closure(f)) {
            Some(Closure::Host(h)) => Some(h.f),
            _ => None,
        }
    }

    pub fn to_thread(&self, idx: i32) -> Option<ThreadId> {
        self.index2value(idx).as_thread_id()
    }

    pub fn to_userdata_bytes(&self, idx: i32) -> Option<&[u8]> {
        let v = self.index2value(idx);
        if let Some(p) = v.as_light_userdata() {
            let _ = p;
            return None; // light pointers have no runtime-owned bytes
        }
        self.object_pool
            .userdata_ref(v.as_userdata_id()?)
            .map(|u| u.bytes())
    }

    /// lua_topointer: a stable identity for collectable values.
    pub fn to_pointer(&self, idx: i32) -> usize {
        let v = self.index2value(idx);
        if let Some(p) = v.as_light_userdata() {
            return p;
        }
        if v.is_cfunction() {
            return v.secondary as usize;
        }
        match v.as_gc_id() {
            Some(id) => (v.tag() >> 48) as usize * 0x1_0000_0000 + id.index() as usize,
            None => 0,
        }
    }

    // ============ Writers ============

    pub fn push_nil(&mut self) {
        self.push(LuaValue::nil());
    }

    pub fn push_boolean(&mut self, b: bool) {
        self.push(LuaValue::boolean(b));
    }

    pub fn push_integer(&mut self, i: i64) {
        self.push(LuaValue::integer(i));
    }

    pub fn push_number(&mut self, f: f64) {
        self.push(LuaValue::float(f));
    }

    pub fn push_str(&mut self, s: &str) {
        let v = self.new_string(s);
        self.push(v);
        self.check_gc();
    }

    pub fn push_lstring(&mut self, bytes: &[u8]) {
        let v = self.new_string_bytes(bytes);
        self.push(v);
        self.check_gc();
    }

    /// Literal push through the address-keyed cache.
    pub fn push_literal(&mut self, s: &'static str) {
        let v = self.literal(s);
        self.push(v);
    }

    pub fn push_light_userdata(&mut self, p: usize) {
        self.push(LuaValue::light_userdata(p));
    }

    pub fn push_cfunction(&mut self, f: crate::lua_vm::CFunction) {
        self.push(LuaValue::cfunction(f));
    }

    /// lua_pushcclosure: capture n values from the top as upvalues.
    pub fn push_cclosure(&mut self, f: crate::lua_vm::CFunction, n: usize) {
        if n == 0 {
            self.push_cfunction(f);
            return;
        }
        let mut ups = Vec::with_capacity(n);
        for _ in 0..n {
            ups.push(self.th_mut().pop());
        }
        ups.reverse();
        let id = self.object_pool.alloc_closure(
            Closure::Host(crate::lua_value::HostClosure { f, upvalues: ups }),
            &mut self.gc,
        );
        self.push(LuaValue::function(id));
        self.check_gc();
    }

    pub fn push_thread_value(&mut self, t: ThreadId) {
        self.push(LuaValue::thread(t));
    }

    /// lua_pushfstring with the supported directives:
    /// %s %c %d %I %f %p %U %%.
    pub fn push_fstring(&mut self, fmt: &str, args: &[FmtArg]) -> LuaValue {
        let mut out = String::new();
        let mut ai = 0;
        let mut it = fmt.chars().peekable();
        while let Some(c) = it.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            let spec = it.next().unwrap_or('%');
            match spec {
                '%' => out.push('%'),
                's' => {
                    if let Some(FmtArg::Str(s)) = args.get(ai) {
                        out.push_str(s);
                    }
                    ai += 1;
                }
                'c' => {
                    if let Some(FmtArg::Char(b)) = args.get(ai) {
                        out.push(*b as char);
                    }
                    ai += 1;
                }
                'd' | 'I' => {
                    if let Some(FmtArg::Int(i)) = args.get(ai) {
                        out.push_str(&i.to_string());
                    }
                    ai += 1;
                }
                'f' => {
                    if let Some(FmtArg::Float(f)) = args.get(ai) {
                        out.push_str(&number_to_string(LuaValue::float(*f)));
                    }
                    ai += 1;
                }
                'p' => {
                    if let Some(FmtArg::Ptr(p)) = args.get(ai) {
                        out.push_str(&format!("{:#x}", p));
                    }
                    ai += 1;
                }
                'U' => {
                    if let Some(FmtArg::Utf8(cp)) = args.get(ai) {
                        if let Some(ch) = char::from_u32(*cp) {
                            out.push(ch);
                        }
                    }
                    ai += 1;
                }
                other => out.push(other),
            }
        }
        let v = self.new_string(&out);
        self.push(v);
        v
    }

    // ============ Tables ============

    /// lua_gettable: key on top is replaced by t[key]; may call __index.
    pub fn get_table(&mut self, idx: i32) -> LuaResult<LuaValueKind> {
        let t = self.index2value(idx);
        let key = self.th_mut().pop();
        let v = self.index_value(t, key)?;
        self.push(v);
        Ok(v.kind())
    }

    pub fn set_table(&mut self, idx: i32) -> LuaResult<()> {
        let t = self.index2value(idx);
        let value = self.th_mut().pop();
        let key = self.th_mut().pop();
        self.set_index_value(t, key, value)
    }

    pub fn get_field(&mut self, idx: i32, name: &str) -> LuaResult<LuaValueKind> {
        let t = self.index2value(idx);
        let key = self.new_string(name);
        let v = self.index_value(t, key)?;
        self.push(v);
        Ok(v.kind())
    }

    pub fn set_field(&mut self, idx: i32, name: &str) -> LuaResult<()> {
        let t = self.index2value(idx);
        let key = self.new_string(name);
        let value = self.th_mut().pop();
        self.set_index_value(t, key, value)
    }

    pub fn get_i(&mut self, idx: i32, i: i64) -> LuaResult<LuaValueKind> {
        let t = self.index2value(idx);
        let v = self.index_value(t, LuaValue::integer(i))?;
        self.push(v);
        Ok(v.kind())
    }

    pub fn set_i(&mut self, idx: i32, i: i64) -> LuaResult<()> {
        let t = self.index2value(idx);
        let value = self.th_mut().pop();
        self.set_index_value(t, LuaValue::integer(i), value)
    }

    /// Raw variants (no metamethods). The table index must really hold a
    /// table.
    pub fn api_raw_get(&mut self, idx: i32) -> LuaValueKind {
        let t = self.index2value(idx).as_table_id();
        let key = self.th_mut().pop();
        let v = match t {
            Some(t) => self.raw_get(t, key),
            None => LuaValue::nil(),
        };
        self.push(v);
        v.kind()
    }

    pub fn api_raw_set(&mut self, idx: i32) -> LuaResult<()> {
        let value = self.th_mut().pop();
        let key = self.th_mut().pop();
        match self.index2value(idx).as_table_id() {
            Some(t) => self.raw_set_checked(t, key, value),
            None => Err(self.rt_error("table expected".to_string())),
        }
    }

    pub fn api_raw_get_i(&mut self, idx: i32, i: i64) -> LuaValueKind {
        let v = match self.index2value(idx).as_table_id() {
            Some(t) => self.raw_get_i(t, i),
            None => LuaValue::nil(),
        };
        self.push(v);
        v.kind()
    }

    pub fn api_raw_set_i(&mut self, idx: i32, i: i64) {
        let value = self.th_mut().pop();
        if let Some(t) = self.index2value(idx).as_table_id() {
            self.raw_set_i(t, i, value);
        }
    }

    /// Raw access keyed by a light pointer.
    pub fn api_raw_get_p(&mut self, idx: i32, p: usize) -> LuaValueKind {
        let key = LuaValue::light_userdata(p);
        let v = match self.index2value(idx).as_table_id() {
            Some(t) => self.raw_get(t, key),
            None => LuaValue::nil(),
        };
        self.push(v);
        v.kind()
    }

    pub fn api_raw_set_p(&mut self, idx: i32, p: usize) -> LuaResult<()> {
        let key = LuaValue::light_userdata(p);
        let value = self.th_mut().pop();
        match self.index2value(idx).as_table_id() {
            Some(t) => self.raw_set_checked(t, key, value),
            None => Err(self.rt_error("table expected".to_string())),
        }
    }

    pub fn create_table(&mut self, narr: usize, nrec: usize) {
        let t = self.new_table(narr, nrec);
        self.push(t);
    }

    /// lua_next: pops a key, pushes the next key/value pair; false at the
    /// end of the table.
    pub fn api_next(&mut self, idx: i32) -> LuaResult<bool> {
        let key = self.th_mut().pop();
        let Some(t) = self.index2value(idx).as_table_id() else {
            return Err(self.rt_error("table expected".to_string()));
        };
        let r = {
            let pool = &self.object_pool;
            match pool.table(t) {
                Some(tbl) => tbl.next(key, &pool.strings_view()),
                None => Ok(None),
            }
        };
        match r {
            Ok(Some((k, v))) => {
                self.push(k);
                self.push(v);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(self.table_error(e)),
        }
    }

    // ============ Metatables & user values ============

    pub fn api_get_metatable(&mut self, idx: i32) -> bool {
        let v = self.index2value(idx);
        match self.metatable_of(v) {
            Some(mt) => {
                self.push(LuaValue::table(mt));
                true
            }
            None => false,
        }
    }

    /// Pops a table (or nil) and installs it as the metatable.
    pub fn api_set_metatable(&mut self, idx: i32) -> LuaResult<()> {
        let v = self.index2value(idx);
        let mt = self.th_mut().pop();
        let mt_id = if mt.is_nil() {
            None
        } else {
            match mt.as_table_id() {
                Some(t) => Some(t),
                None => return Err(self.rt_error("table expected".to_string())),
            }
        };
        self.set_metatable(v, mt_id)
    }

    pub fn get_uservalue(&mut self, idx: i32) -> LuaValueKind {
        let v = self.index2value(idx);
        let uv = v
            .as_userdata_id()
            .and_then(|u| self.object_pool.userdata_ref(u))
            .map(|ud| ud.user_value)
            .unwrap_or_else(LuaValue::nil);
        self.push(uv);
        uv.kind()
    }

    pub fn set_uservalue(&mut self, idx: i32) -> LuaResult<()> {
        let v = self.index2value(idx);
        let value = self.th_mut().pop();
        let Some(u) = v.as_userdata_id() else {
            return Err(self.rt_error("userdata expected".to_string()));
        };
        if let Some(ud) = self.object_pool.userdata_mut(u) {
            ud.user_value = value;
        }
        self.gc
            .barrier_forward(&mut self.object_pool, GcId::Userdata(u), value);
        Ok(())
    }

    // ============ Calls & loading ============

    /// lua_call: callee and arguments on top of the stack. An error here
    /// is unprotected: the panic handler (if any) runs before the host is
    /// aborted.
    pub fn api_call(&mut self, nargs: usize, nresults: i32) -> LuaResult<()> {
        let func_slot = self.th().top() - nargs - 1;
        let results = match self.call_at(func_slot, nresults) {
            Ok(r) => r,
            Err(LuaError::Yield) => return Err(LuaError::Yield),
            Err(e) => {
                if let Some(panic) = self.panic {
                    let ev = self.error_value;
                    self.push(ev);
                    let _ = panic(self);
                    panic!("unprotected error in call to Lua API");
                }
                return Err(e);
            }
        };
        let wanted = if nresults < 0 {
            results.len()
        } else {
            nresults as usize
        };
        for i in 0..wanted {
            let v = results.get(i).copied().unwrap_or_else(LuaValue::nil);
            self.push(v);
        }
        Ok(())
    }

    /// lua_pcall: returns the status code; on error the error value is
    /// pushed in place of the results.
    pub fn api_pcall(&mut self, nargs: usize, nresults: i32, msgh: i32) -> i32 {
        let handler = if msgh == 0 {
            None
        } else {
            Some(self.index2value(msgh))
        };
        let func_slot = self.th().top() - nargs - 1;
        let f = self.th().get(func_slot);
        let args: Vec<LuaValue> = (0..nargs)
            .map(|i| self.th().get(func_slot + 1 + i))
            .collect();
        self.th_mut().set_top(func_slot);
        match self.call_value_protected(f, &args, handler) {
            Ok(results) => {
                let wanted = if nresults < 0 {
                    results.len()
                } else {
                    nresults as usize
                };
                for i in 0..wanted {
                    let v = results.get(i).copied().unwrap_or_else(LuaValue::nil);
                    self.push(v);
                }
                0
            }
            Err(e) => {
                let ev = self.take_error_value();
                self.push(ev);
                e.status_code()
            }
        }
    }

    /// lua_load for text chunks; binary ("b"-only mode) is out of scope
    /// and reports a syntax error.
    pub fn api_load(&mut self, source: &str, chunk_name: &str, mode: &str) -> i32 {
        if !mode.contains('t') && !mode.is_empty() && mode != "bt" {
            let msg = format!("attempt to load a binary chunk (mode is '{}')", mode);
            self.error_value = self.new_string(&msg);
            return LuaError::Syntax.status_code();
        }
        match self.load_chunk(source, chunk_name) {
            Ok(f) => {
                self.push(f);
                0
            }
            Err(e) => {
                let ev = self.take_error_value();
                self.push(ev);
                e.status_code()
            }
        }
    }

    /// lua_error: raise with the value on top.
    pub fn api_error(&mut self) -> LuaError {
        let v = self.th_mut().pop();
        self.raise(v)
    }

    // ============ Operations ============

    /// lua_concat: fold the n values on top into one.
    pub fn api_concat(&mut self, n: usize) -> LuaResult<()> {
        if n == 0 {
            self.push_literal("");
            return Ok(());
        }
        let top = self.th().top();
        let first = top - n;
        let mut acc = self.th().get(top - 1);
        for i in (first..top - 1).rev() {
            let lhs = self.th().get(i);
            acc = self.concat_pair(lhs, acc)?;
        }
        self.th_mut().set_top(first);
        self.push(acc);
        Ok(())
    }

    /// lua_len: honors __len; pushes the result.
    pub fn api_len(&mut self, idx: i32) -> LuaResult<()> {
        let v = self.index2value(idx);
        let l = self.length_of(v)?;
        self.push(l);
        Ok(())
    }

    /// lua_arith: pops operands (one for unary ops), pushes the result.
    pub fn api_arith(&mut self, op: TmKind) -> LuaResult<()> {
        let unary = matches!(op, TmKind::Unm | TmKind::BNot);
        let y = self.th_mut().pop();
        let x = if unary { y } else { self.th_mut().pop() };
        let r = self.arith(op, x, y)?;
        self.push(r);
        Ok(())
    }

    /// lua_compare with op in {Eq, Lt, Le}.
    pub fn api_compare(&mut self, i1: i32, i2: i32, op: TmKind) -> LuaResult<bool> {
        let a = self.index2value(i1);
        let b = self.index2value(i2);
        match op {
            TmKind::Eq => self.value_equals(a, b),
            TmKind::Lt => self.less_than(a, b),
            TmKind::Le => self.less_equal(a, b),
            _ => Err(self.rt_error("invalid compare operation".to_string())),
        }
    }

    pub fn api_raw_equal(&mut self, i1: i32, i2: i32) -> bool {
        let a = self.index2value(i1);
        let b = self.index2value(i2);
        if a.same(&b) {
            return true;
        }
        if a.is_number() && b.is_number() {
            return crate::lua_vm::execute::metamethod::numbers_equal(a, b);
        }
        if a.is_string() && b.is_string() {
            return self.str_bytes(a) == self.str_bytes(b);
        }
        false
    }

    /// lua_stringtonumber: pushes the number and returns the consumed
    /// length (0 on failure, like the C API).
    pub fn string_to_number(&mut self, s: &str) -> usize {
        match crate::compiler::parse_number(s) {
            Some(v) => {
                self.push(v);
                s.len()
            }
            None => 0,
        }
    }

    // ============ Coroutine surface ============

    pub fn api_status(&self) -> i32 {
        match self.th().status {
            ThreadStatus::Suspended => 1,
            _ => 0,
        }
    }

    pub fn is_yieldable(&self) -> bool {
        self.thread_chain.len() > 1
    }

    /// lua_yield: the n top values are the yield results. Returns the
    /// error to propagate out of the calling host function.
    pub fn api_yield(&mut self, nresults: usize) -> LuaError {
        let top = self.th().top();
        let values: Vec<LuaValue> = (top - nresults..top).map(|i| self.th().get(i)).collect();
        self.do_yield(values)
    }

    /// lua_yieldk: like api_yield, but `k` runs on resume in place of the
    /// suspended host function.
    pub fn api_yieldk(
        &mut self,
        nresults: usize,
        k: crate::lua_vm::CFunction,
        ctx: i64,
    ) -> LuaError {
        let top = self.th().top();
        let values: Vec<LuaValue> = (top - nresults..top).map(|i| self.th().get(i)).collect();
        self.do_yieldk(values, k, ctx)
    }

    // ============ GC control ============

    pub fn gc_stop(&mut self) {
        self.gc.stop();
    }

    pub fn gc_restart(&mut self) {
        self.gc.restart();
    }

    pub fn gc_collect(&mut self) {
        self.full_gc();
    }

    /// Heap size in kilobytes (lua_gc LUA_GCCOUNT).
    pub fn gc_count(&self) -> usize {
        self.gc.total_bytes() / 1024
    }

    pub fn gc_count_bytes(&self) -> usize {
        self.gc.total_bytes()
    }

    /// Drive the collector as if `kbytes` had been allocated.
    pub fn gc_step(&mut self, kbytes: usize) {
        self.gc.gc_debt += (kbytes * 1024) as isize + 1;
        self.check_gc();
    }

    pub fn gc_set_pause(&mut self, pause: usize) -> usize {
        self.gc.set_pause(pause)
    }

    pub fn gc_set_step_mul(&mut self, mul: usize) -> usize {
        self.gc.set_step_mul(mul)
    }

    pub fn gc_is_running(&self) -> bool {
        self.gc.is_running()
    }

    // ============ Misc ============

    pub fn version(&self) -> &'static str {
        crate::lua_vm::VERSION
    }

    /// Registry handle for hosts that want to pin values.
    pub fn registry_table(&self) -> TableId {
        self.registry
    }
}
