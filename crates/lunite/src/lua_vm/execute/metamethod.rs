// Metamethod slots and the generic (slow-path) operator semantics:
// arithmetic with coercions, comparisons, concatenation, length and the
// __index/__newindex chains (ltm.c + the luaV_* routines of lvm.c).

use crate::gc::TableId;
use crate::lua_value::{float_to_int_exact, LuaValue};
use crate::lua_vm::{LuaError, LuaResult, LuaVM};

/// Overridable events, in cache-bit order: the first six get a bit in the
/// metatable's absent-slot cache byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TmKind {
    Index = 0,
    NewIndex,
    Gc,
    Mode,
    Len,
    Eq,
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
    Unm,
    BNot,
    Concat,
    Lt,
    Le,
    Call,
    Close,
}

impl TmKind {
    pub const COUNT: usize = TmKind::Close as usize + 1;

    pub fn from_index(i: usize) -> TmKind {
        debug_assert!(i < Self::COUNT);
        unsafe { std::mem::transmute::<u8, TmKind>(i as u8) }
    }

    pub fn name(self) -> &'static str {
        match self {
            TmKind::Index => "__index",
            TmKind::NewIndex => "__newindex",
            TmKind::Gc => "__gc",
            TmKind::Mode => "__mode",
            TmKind::Len => "__len",
            TmKind::Eq => "__eq",
            TmKind::Add => "__add",
            TmKind::Sub => "__sub",
            TmKind::Mul => "__mul",
            TmKind::Mod => "__mod",
            TmKind::Pow => "__pow",
            TmKind::Div => "__div",
            TmKind::IDiv => "__idiv",
            TmKind::BAnd => "__band",
            TmKind::BOr => "__bor",
            TmKind::BXor => "__bxor",
            TmKind::Shl => "__shl",
            TmKind::Shr => "__shr",
            TmKind::Unm => "__unm",
            TmKind::BNot => "__bnot",
            TmKind::Concat => "__concat",
            TmKind::Lt => "__lt",
            TmKind::Le => "__le",
            TmKind::Call => "__call",
            TmKind::Close => "__close",
        }
    }

    /// Bit in the metatable's absent cache; 0 = not cached.
    #[inline(always)]
    pub fn cache_bit(self) -> u8 {
        let i = self as u8;
        if i < 6 {
            1 << i
        } else {
            0
        }
    }

    /// Event name for arithmetic error messages ("perform arithmetic on",
    /// "perform bitwise operation on", "concatenate").
    fn operation_phrase(self) -> &'static str {
        match self {
            TmKind::BAnd
            | TmKind::BOr
            | TmKind::BXor
            | TmKind::Shl
            | TmKind::Shr
            | TmKind::BNot => "perform bitwise operation on",
            TmKind::Concat => "concatenate",
            _ => "perform arithmetic on",
        }
    }
}

/// Numeric operand after coercion: preserves the integer/float split.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl LuaVM {
    /// Number coercion as a value, preserving the integer/float split.
    pub(crate) fn tonumber_value(&self, v: LuaValue) -> Option<LuaValue> {
        match self.coerce_number(v)? {
            Num::Int(i) => Some(LuaValue::integer(i)),
            Num::Float(f) => Some(LuaValue::float(f)),
        }
    }

    /// Coerce a value to a number for arithmetic: numbers pass through,
    /// strings parse with the full numeral syntax (luaV_tonumber_).
    fn coerce_number(&self, v: LuaValue) -> Option<Num> {
        if let Some(i) = v.as_integer() {
            return Some(Num::Int(i));
        }
        if let Some(f) = v.as_float() {
            return Some(Num::Float(f));
        }
        let text = self.str_text(v)?;
        match crate::compiler::parse_number(text.trim()) {
            Some(n) => {
                if let Some(i) = n.as_integer() {
                    Some(Num::Int(i))
                } else {
                    Some(Num::Float(f64::from_bits(n.secondary)))
                }
            }
            None => None,
        }
    }

    /// Coerce to an integer for bitwise operators: floats must be exact
    /// (luaV_tointeger).
    fn coerce_integer(&self, v: LuaValue) -> Option<i64> {
        match self.coerce_number(v)? {
            Num::Int(i) => Some(i),
            Num::Float(f) => float_to_int_exact(f),
        }
    }

    /// Generic binary arithmetic (luaT_trybinTM + luaO_arith): numeric
    /// fast path first, then the metamethod on either operand.
    pub(crate) fn arith(&mut self, op: TmKind, x: LuaValue, y: LuaValue) -> LuaResult<LuaValue> {
        match op {
            TmKind::BAnd | TmKind::BOr | TmKind::BXor | TmKind::Shl | TmKind::Shr => {
                if let (Some(a), Some(b)) = (self.coerce_integer(x), self.coerce_integer(y)) {
                    return Ok(LuaValue::integer(int_bitwise(op, a, b)));
                }
            }
            TmKind::BNot => {
                if let Some(a) = self.coerce_integer(x) {
                    return Ok(LuaValue::integer(!a));
                }
            }
            TmKind::Div | TmKind::Pow => {
                // always float
                if let (Some(a), Some(b)) = (self.coerce_number(x), self.coerce_number(y)) {
                    let (a, b) = (num_as_float(a), num_as_float(b));
                    let r = if op == TmKind::Div { a / b } else { a.powf(b) };
                    return Ok(LuaValue::float(r));
                }
            }
            TmKind::Unm => {
                match self.coerce_number(x) {
                    Some(Num::Int(a)) => return Ok(LuaValue::integer(a.wrapping_neg())),
                    Some(Num::Float(a)) => return Ok(LuaValue::float(-a)),
                    None => {}
                }
            }
            _ => {
                if let (Some(a), Some(b)) = (self.coerce_number(x), self.coerce_number(y)) {
                    return self.arith_numbers(op, a, b);
                }
            }
        }
        self.try_bin_tm(op, x, y)
    }

    fn arith_numbers(&mut self, op: TmKind, a: Num, b: Num) -> LuaResult<LuaValue> {
        if let (Num::Int(i), Num::Int(j)) = (a, b) {
            return match op {
                TmKind::Add => Ok(LuaValue::integer(i.wrapping_add(j))),
                TmKind::Sub => Ok(LuaValue::integer(i.wrapping_sub(j))),
                TmKind::Mul => Ok(LuaValue::integer(i.wrapping_mul(j))),
                TmKind::Mod => {
                    if j == 0 {
                        Err(self.rt_error("attempt to perform 'n%0'".to_string()))
                    } else {
                        Ok(LuaValue::integer(int_floor_mod(i, j)))
                    }
                }
                TmKind::IDiv => {
                    if j == 0 {
                        Err(self.rt_error("attempt to perform 'n//0'".to_string()))
                    } else {
                        Ok(LuaValue::integer(int_floor_div(i, j)))
                    }
                }
                _ => unreachable!("float-forcing ops handled by caller"),
            };
        }
        let (x, y) = (num_as_float(a), num_as_float(b));
        let r = match op {
            TmKind::Add => x + y,
            TmKind::Sub => x - y,
            TmKind::Mul => x * y,
            TmKind::Mod => float_floor_mod(x, y),
            TmKind::IDiv => (x / y).floor(),
            _ => unreachable!(),
        };
        Ok(LuaValue::float(r))
    }

    /// Arithmetic fell through to the metamethods: try operand 1, then
    /// operand 2, then report the offending operand.
    fn try_bin_tm(&mut self, op: TmKind, x: LuaValue, y: LuaValue) -> LuaResult<LuaValue> {
        let mm = {
            let m1 = self.get_metamethod(x, op);
            if m1.is_nil() {
                self.get_metamethod(y, op)
            } else {
                m1
            }
        };
        if !mm.is_nil() {
            let results = self.call_value(mm, &[x, y])?;
            return Ok(results.into_iter().next().unwrap_or_else(LuaValue::nil));
        }
        // name the operand that cannot be coerced
        let bad = if self.coerce_number(x).is_none() { x } else { y };
        let msg = format!(
            "attempt to {} a {} value",
            op.operation_phrase(),
            bad.type_name()
        );
        Err(self.rt_error(msg))
    }

    // ============ Comparison ============

    /// Primitive equality plus __eq when both operands are the same basic
    /// kind of table or userdata and not already identical (luaV_equalobj).
    pub(crate) fn value_equals(&mut self, x: LuaValue, y: LuaValue) -> LuaResult<bool> {
        if x.is_number() && y.is_number() {
            return Ok(numbers_equal(x, y));
        }
        if x.tag() != y.tag() {
            return Ok(false);
        }
        if x.same(&y) {
            return Ok(true);
        }
        if x.is_string() {
            // distinct ids can still be equal long strings
            let (Some(a), Some(b)) = (self.str_bytes(x), self.str_bytes(y)) else {
                return Ok(false);
            };
            return Ok(a == b);
        }
        if x.is_table() || x.is_userdata() {
            let mm = {
                let m1 = self.get_metamethod(x, TmKind::Eq);
                if m1.is_nil() {
                    self.get_metamethod(y, TmKind::Eq)
                } else {
                    m1
                }
            };
            if !mm.is_nil() {
                let r = self.call_value(mm, &[x, y])?;
                return Ok(r.first().map(|v| v.is_truthy()).unwrap_or(false));
            }
        }
        Ok(false)
    }

    /// `x < y` with numeric/string ordering and the __lt fallback.
    pub(crate) fn less_than(&mut self, x: LuaValue, y: LuaValue) -> LuaResult<bool> {
        if x.is_number() && y.is_number() {
            return Ok(numbers_less(x, y, false));
        }
        if x.is_string() && y.is_string() {
            let (Some(a), Some(b)) = (self.str_bytes(x), self.str_bytes(y)) else {
                return Ok(false);
            };
            return Ok(a < b);
        }
        self.order_tm(TmKind::Lt, x, y)
    }

    /// `x <= y`; 5.3 still falls back to `not (y < x)` through __lt when
    /// __le is absent.
    pub(crate) fn less_equal(&mut self, x: LuaValue, y: LuaValue) -> LuaResult<bool> {
        if x.is_number() && y.is_number() {
            return Ok(numbers_less(x, y, true));
        }
        if x.is_string() && y.is_string() {
            let (Some(a), Some(b)) = (self.str_bytes(x), self.str_bytes(y)) else {
                return Ok(false);
            };
            return Ok(a <= b);
        }
        let mm = {
            let m1 = self.get_metamethod(x, TmKind::Le);
            if m1.is_nil() {
                self.get_metamethod(y, TmKind::Le)
            } else {
                m1
            }
        };
        if !mm.is_nil() {
            let r = self.call_value(mm, &[x, y])?;
            return Ok(r.first().map(|v| v.is_truthy()).unwrap_or(false));
        }
        // not (y < x)
        Ok(!self.order_tm(TmKind::Lt, y, x)?)
    }

    fn order_tm(&mut self, op: TmKind, x: LuaValue, y: LuaValue) -> LuaResult<bool> {
        let mm = {
            let m1 = self.get_metamethod(x, op);
            if m1.is_nil() {
                self.get_metamethod(y, op)
            } else {
                m1
            }
        };
        if !mm.is_nil() {
            let r = self.call_value(mm, &[x, y])?;
            return Ok(r.first().map(|v| v.is_truthy()).unwrap_or(false));
        }
        let msg = format!(
            "attempt to compare {} with {}",
            x.type_name(),
            y.type_name()
        );
        Err(self.rt_error(msg))
    }

    // ============ Length, concat ============

    pub(crate) fn length_of(&mut self, v: LuaValue) -> LuaResult<LuaValue> {
        if let Some(bytes) = self.str_bytes(v) {
            return Ok(LuaValue::integer(bytes.len() as i64));
        }
        let mm = self.get_metamethod(v, TmKind::Len);
        if !mm.is_nil() {
            let r = self.call_value(mm, &[v])?;
            return Ok(r.into_iter().next().unwrap_or_else(LuaValue::nil));
        }
        if let Some(t) = v.as_table_id() {
            let len = self
                .object_pool
                .table(t)
                .map(|tbl| tbl.length())
                .unwrap_or(0);
            return Ok(LuaValue::integer(len));
        }
        let msg = format!("attempt to get length of a {} value", v.type_name());
        Err(self.rt_error(msg))
    }

    /// Concatenate two values (the VM folds CONCAT ranges right-to-left
    /// through this).
    pub(crate) fn concat_pair(&mut self, x: LuaValue, y: LuaValue) -> LuaResult<LuaValue> {
        let xs = self.concat_operand(x);
        let ys = self.concat_operand(y);
        let xs_was_none = xs.is_none();
        if let (Some(a), Some(b)) = (xs, ys) {
            // no collection here: the caller may hold intermediate results
            // outside the root set until the full chain lands in a register
            let mut bytes = Vec::with_capacity(a.len() + b.len());
            bytes.extend_from_slice(&a);
            bytes.extend_from_slice(&b);
            return Ok(self.new_string_bytes(&bytes));
        }
        let mm = {
            let m1 = self.get_metamethod(x, TmKind::Concat);
            if m1.is_nil() {
                self.get_metamethod(y, TmKind::Concat)
            } else {
                m1
            }
        };
        if !mm.is_nil() {
            let r = self.call_value(mm, &[x, y])?;
            return Ok(r.into_iter().next().unwrap_or_else(LuaValue::nil));
        }
        let bad = if xs_was_none { x } else { y };
        let msg = format!("attempt to concatenate a {} value", bad.type_name());
        Err(self.rt_error(msg))
    }

    /// Strings pass through; numbers convert to their text form.
    fn concat_operand(&self, v: LuaValue) -> Option<Vec<u8>> {
        if let Some(b) = self.str_bytes(v) {
            return Some(b.to_vec());
        }
        if v.is_number() {
            return Some(number_to_string(v).into_bytes());
        }
        None
    }

    // ============ Indexed access ============

    /// luaV_gettable / luaV_finishget: raw lookup with the absent-cache
    /// fast path, then a bounded walk of the __index chain.
    pub(crate) fn index_value(&mut self, t: LuaValue, key: LuaValue) -> LuaResult<LuaValue> {
        let mut obj = t;
        for _ in 0..self.options.index_chain_limit {
            if let Some(tid) = obj.as_table_id() {
                let v = self.raw_get(tid, key);
                if !v.is_nil() {
                    return Ok(v);
                }
                let mm = self.get_metamethod(obj, TmKind::Index);
                if mm.is_nil() {
                    return Ok(LuaValue::nil());
                }
                if mm.is_function() {
                    let r = self.call_value(mm, &[obj, key])?;
                    return Ok(r.into_iter().next().unwrap_or_else(LuaValue::nil));
                }
                obj = mm;
            } else {
                let mm = self.get_metamethod(obj, TmKind::Index);
                if mm.is_nil() {
                    let msg = format!("attempt to index a {} value", obj.type_name());
                    return Err(self.rt_error(msg));
                }
                if mm.is_function() {
                    let r = self.call_value(mm, &[obj, key])?;
                    return Ok(r.into_iter().next().unwrap_or_else(LuaValue::nil));
                }
                obj = mm;
            }
        }
        Err(self.rt_error("'__index' chain too long; possible loop".to_string()))
    }

    /// luaV_settable / luaV_finishset.
    pub(crate) fn set_index_value(
        &mut self,
        t: LuaValue,
        key: LuaValue,
        value: LuaValue,
    ) -> LuaResult<()> {
        let mut obj = t;
        for _ in 0..self.options.index_chain_limit {
            if let Some(tid) = obj.as_table_id() {
                let existing = self.raw_get(tid, key);
                if !existing.is_nil() {
                    return self.raw_set_checked(tid, key, value);
                }
                let mm = self.get_metamethod(obj, TmKind::NewIndex);
                if mm.is_nil() {
                    return self.raw_set_checked(tid, key, value);
                }
                if mm.is_function() {
                    self.call_value(mm, &[obj, key, value])?;
                    return Ok(());
                }
                obj = mm;
            } else {
                let mm = self.get_metamethod(obj, TmKind::NewIndex);
                if mm.is_nil() {
                    let msg = format!("attempt to index a {} value", obj.type_name());
                    return Err(self.rt_error(msg));
                }
                if mm.is_function() {
                    self.call_value(mm, &[obj, key, value])?;
                    return Ok(());
                }
                obj = mm;
            }
        }
        Err(self.rt_error("'__newindex' chain too long; possible loop".to_string()))
    }

    pub(crate) fn raw_set_checked(
        &mut self,
        t: TableId,
        key: LuaValue,
        value: LuaValue,
    ) -> LuaResult<()> {
        match self.raw_set(t, key, value) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.table_error(e)),
        }
    }

    pub(crate) fn table_error(&mut self, e: crate::lua_value::TableError) -> LuaError {
        use crate::lua_value::TableError as TE;
        let msg = match e {
            TE::NilIndex => "table index is nil",
            TE::NanIndex => "table index is NaN",
            TE::InvalidNext => "invalid key to 'next'",
            TE::Overflow => "table overflow",
        };
        self.rt_error(msg.to_string())
    }
}

// ============ Numeric helpers (no VM access) ============

#[inline(always)]
fn num_as_float(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}

fn int_bitwise(op: TmKind, a: i64, b: i64) -> i64 {
    match op {
        TmKind::BAnd => a & b,
        TmKind::BOr => a | b,
        TmKind::BXor => a ^ b,
        TmKind::Shl => shift_left(a, b),
        TmKind::Shr => shift_left(a, b.wrapping_neg()),
        _ => unreachable!(),
    }
}

/// Lua shifts: out-of-range counts produce 0, negative counts shift the
/// other way (luaV_shiftl).
fn shift_left(a: i64, n: i64) -> i64 {
    if n >= 64 {
        0
    } else if n >= 0 {
        ((a as u64) << n) as i64
    } else if n <= -64 {
        0
    } else {
        ((a as u64) >> (-n)) as i64
    }
}

/// Floor division (luaV_idiv): rounds toward negative infinity.
pub(crate) fn int_floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Floor modulo (luaV_mod): result takes the divisor's sign.
pub(crate) fn int_floor_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) {
        r + b
    } else {
        r
    }
}

pub(crate) fn float_floor_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

/// Cross-variant numeric equality: compares by mathematical value.
pub(crate) fn numbers_equal(x: LuaValue, y: LuaValue) -> bool {
    match (x.as_integer(), y.as_integer()) {
        (Some(a), Some(b)) => a == b,
        (Some(a), None) => (a as f64) == f64::from_bits(y.secondary) && exact_as_float(a),
        (None, Some(b)) => f64::from_bits(x.secondary) == (b as f64) && exact_as_float(b),
        (None, None) => f64::from_bits(x.secondary) == f64::from_bits(y.secondary),
    }
}

/// Whether an i64 survives the round trip through f64; mixed comparisons
/// must not conflate 2^63 with 2^63-1.
#[inline]
fn exact_as_float(i: i64) -> bool {
    float_to_int_exact(i as f64) == Some(i)
}

/// Numeric order across variants (luaV_lessthan/lessequal for numbers).
pub(crate) fn numbers_less(x: LuaValue, y: LuaValue, or_equal: bool) -> bool {
    match (x.as_integer(), y.as_integer()) {
        (Some(a), Some(b)) => {
            if or_equal {
                a <= b
            } else {
                a < b
            }
        }
        _ => {
            let a = x.as_number().unwrap_or(f64::NAN);
            let b = y.as_number().unwrap_or(f64::NAN);
            if or_equal {
                a <= b
            } else {
                a < b
            }
        }
    }
}

/// tostring for numbers: integers print as integers, floats keep a
/// trailing ".0" when integral (lobject.c tostringbuff).
pub fn number_to_string(v: LuaValue) -> String {
    if let Some(i) = v.as_integer() {
        return i.to_string();
    }
    let f = f64::from_bits(v.secondary);
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.floor() == f && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}
