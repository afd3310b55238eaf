// Hybrid table: contiguous array part for integer keys 1..=asize plus a
// chained-scatter hash part (ltable.c). Collision chains are threaded
// through relative `next` offsets inside the node array itself; a colliding
// key that is not in its main position gets displaced to a free slot found
// by the `last_free` cursor. On overflow the table is rehashed, choosing
// the array/hash split that keeps the array part at least half full.

use crate::gc::{Strings, TableId};
use crate::lua_value::lua_value::float_to_int_exact;
use crate::lua_value::LuaValue;

/// Largest power-of-two exponent for either table part (ltable.c MAXABITS).
const MAXBITS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// "table index is nil"
    NilIndex,
    /// "table index is NaN"
    NanIndex,
    /// "invalid key to 'next'"
    InvalidNext,
    /// "table overflow"
    Overflow,
}

/// Position of an entry in one of the two parts.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SlotRef {
    Array(usize),
    Node(usize),
}

#[derive(Clone, Copy)]
pub(crate) struct Node {
    pub(crate) key: LuaValue,
    pub(crate) value: LuaValue,
    /// Relative offset to the next node in this collision chain; 0 ends it.
    next: i32,
}

impl Node {
    #[inline(always)]
    fn empty() -> Self {
        Node {
            key: LuaValue::nil(),
            value: LuaValue::nil(),
            next: 0,
        }
    }
}

pub struct LuaTable {
    array: Vec<LuaValue>,
    node: Vec<Node>,
    /// One past the next candidate slot for free-position scans.
    last_free: u32,
    pub metatable: Option<TableId>,
    /// Absent-metamethod cache: bit n set means the metamethod with
    /// TmKind n is known to be missing. Cleared by every write.
    pub flags: u8,
}

/// Fold float keys with an exact integer value to integer keys, so 2.0 and
/// 2 address the same slot. Nil and NaN are rejected for writes.
#[inline]
fn check_key(key: LuaValue) -> Result<LuaValue, TableError> {
    if key.is_nil() {
        return Err(TableError::NilIndex);
    }
    if let Some(f) = key.as_float() {
        if let Some(i) = float_to_int_exact(f) {
            return Ok(LuaValue::integer(i));
        }
        if f.is_nan() {
            return Err(TableError::NanIndex);
        }
    }
    Ok(key)
}

/// Integer finalizer (splitmix64) for the key kinds without a stored hash.
#[inline(always)]
fn hash_mix(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^ (x >> 33)
}

fn key_hash(key: &LuaValue, strings: &Strings<'_>) -> u64 {
    if let Some(id) = key.as_string_id() {
        match strings.get(id) {
            Some(s) => s.hash(strings.seed),
            None => hash_mix(key.primary),
        }
    } else if key.is_integer() || key.is_boolean() {
        hash_mix(key.primary ^ key.secondary)
    } else if key.is_float() {
        hash_mix(key.secondary)
    } else if key.is_collectable() {
        hash_mix(key.primary)
    } else {
        // light userdata, C functions
        hash_mix(key.primary ^ key.secondary)
    }
}

/// Raw key equality inside the hash part. Keys are already normalized, so
/// the only non-identity case is two distinct long-string objects with the
/// same contents.
fn key_equals(a: &LuaValue, b: &LuaValue, strings: &Strings<'_>) -> bool {
    if a.same(b) {
        return true;
    }
    if let (Some(ia), Some(ib)) = (a.as_string_id(), b.as_string_id()) {
        if let (Some(sa), Some(sb)) = (strings.get(ia), strings.get(ib)) {
            return !sa.is_short() && !sb.is_short() && sa.as_bytes() == sb.as_bytes();
        }
    }
    false
}

impl LuaTable {
    pub fn new() -> Self {
        LuaTable {
            array: Vec::new(),
            node: Vec::new(),
            last_free: 0,
            metatable: None,
            flags: 0,
        }
    }

    /// Pre-sized table (OP_NEWTABLE hints, lua_createtable).
    pub fn with_capacity(narr: usize, nrec: usize) -> Self {
        let mut t = LuaTable::new();
        if narr > 0 {
            t.array.resize(narr.min(1 << MAXBITS), LuaValue::nil());
        }
        if nrec > 0 {
            t.set_node_size(nrec);
        }
        t
    }

    #[inline(always)]
    pub fn array_len(&self) -> usize {
        self.array.len()
    }

    #[inline(always)]
    fn size_node(&self) -> usize {
        self.node.len()
    }

    fn set_node_size(&mut self, n: usize) {
        if n == 0 {
            self.node = Vec::new();
            self.last_free = 0;
        } else {
            let size = n.next_power_of_two().min(1 << MAXBITS);
            self.node = vec![Node::empty(); size];
            self.last_free = size as u32;
        }
    }

    #[inline(always)]
    fn main_position(&self, key: &LuaValue, strings: &Strings<'_>) -> usize {
        (key_hash(key, strings) as usize) & (self.node.len() - 1)
    }

    // ============ Lookup ============

    /// Raw get with any key; never errors (bad keys simply miss).
    pub fn get(&self, key: LuaValue, strings: &Strings<'_>) -> LuaValue {
        let key = match check_key(key) {
            Ok(k) => k,
            Err(_) => return LuaValue::nil(),
        };
        if let Some(i) = key.as_integer() {
            return self.get_int(i);
        }
        match self.hash_find(&key, strings) {
            Some(pos) => self.node[pos].value,
            None => LuaValue::nil(),
        }
    }

    /// Raw get with an integer key (luaH_getint): array part first, then
    /// the hash part. Needs no string access.
    #[inline]
    pub fn get_int(&self, i: i64) -> LuaValue {
        if i >= 1 && (i as u64) <= self.array.len() as u64 {
            return self.array[(i - 1) as usize];
        }
        if self.node.is_empty() {
            return LuaValue::nil();
        }
        let key = LuaValue::integer(i);
        let mut pos = (hash_mix(key.primary ^ key.secondary) as usize) & (self.node.len() - 1);
        loop {
            let n = &self.node[pos];
            if n.key.is_integer() && n.key.secondary == key.secondary {
                return n.value;
            }
            if n.next == 0 {
                return LuaValue::nil();
            }
            pos = (pos as i64 + n.next as i64) as usize;
        }
    }

    /// Walk the collision chain from the key's main position.
    fn hash_find(&self, key: &LuaValue, strings: &Strings<'_>) -> Option<usize> {
        if self.node.is_empty() {
            return None;
        }
        let mut pos = self.main_position(key, strings);
        loop {
            let n = &self.node[pos];
            if key_equals(key, &n.key, strings) {
                return Some(pos);
            }
            if n.next == 0 {
                return None;
            }
            pos = (pos as i64 + n.next as i64) as usize;
        }
    }

    // ============ Assignment ============

    pub fn set(
        &mut self,
        key: LuaValue,
        value: LuaValue,
        strings: &Strings<'_>,
    ) -> Result<(), TableError> {
        let key = check_key(key)?;
        self.flags = 0;
        if let Some(i) = key.as_integer() {
            return self.set_int_checked(i, value, strings);
        }
        if let Some(pos) = self.hash_find(&key, strings) {
            self.node[pos].value = value;
            return Ok(());
        }
        if value.is_nil() {
            return Ok(()); // erasing a missing key is a no-op
        }
        self.new_key(key, value, strings)
    }

    /// Integer-key assignment (luaH_setint).
    pub fn set_int(
        &mut self,
        i: i64,
        value: LuaValue,
        strings: &Strings<'_>,
    ) -> Result<(), TableError> {
        self.flags = 0;
        self.set_int_checked(i, value, strings)
    }

    fn set_int_checked(
        &mut self,
        i: i64,
        value: LuaValue,
        strings: &Strings<'_>,
    ) -> Result<(), TableError> {
        if i >= 1 && (i as u64) <= self.array.len() as u64 {
            self.array[(i - 1) as usize] = value;
            return Ok(());
        }
        let key = LuaValue::integer(i);
        if let Some(pos) = self.hash_find(&key, strings) {
            self.node[pos].value = value;
            return Ok(());
        }
        if value.is_nil() {
            return Ok(());
        }
        self.new_key(key, value, strings)
    }

    /// Free slot search: the cursor only ever moves down, so the scan cost
    /// is amortized over the life of this node array (getfreepos).
    fn get_free_pos(&mut self) -> Option<usize> {
        while self.last_free > 0 {
            self.last_free -= 1;
            if self.node[self.last_free as usize].key.is_nil() {
                return Some(self.last_free as usize);
            }
        }
        None
    }

    /// Insert a key known to be missing (luaH_newkey). The chained-scatter
    /// step: if the main position holds a key that itself lives elsewhere
    /// (a displaced colliding key), that occupant moves to a free slot and
    /// the new key takes its main position; otherwise the new key goes to
    /// the free slot, linked after the occupant.
    fn new_key(
        &mut self,
        key: LuaValue,
        value: LuaValue,
        strings: &Strings<'_>,
    ) -> Result<(), TableError> {
        if self.node.is_empty() {
            self.rehash(&key, strings)?;
            return self.set(key, value, strings);
        }
        let mp = self.main_position(&key, strings);
        if !self.node[mp].value.is_nil() {
            let Some(f) = self.get_free_pos() else {
                self.rehash(&key, strings)?;
                return self.set(key, value, strings);
            };
            let othern = self.main_position(&self.node[mp].key.clone(), strings);
            if othern != mp {
                // occupant is displaced: move it to the free slot and
                // relink its chain, then claim the main position
                let mut prev = othern;
                loop {
                    let nx = self.node[prev].next;
                    let nxt = (prev as i64 + nx as i64) as usize;
                    if nxt == mp {
                        break;
                    }
                    prev = nxt;
                }
                self.node[prev].next = (f as i64 - prev as i64) as i32;
                self.node[f] = self.node[mp];
                if self.node[mp].next != 0 {
                    self.node[f].next =
                        (mp as i64 + self.node[mp].next as i64 - f as i64) as i32;
                }
                self.node[mp] = Node {
                    key,
                    value,
                    next: 0,
                };
            } else {
                // occupant owns its main position: new key goes to the
                // free slot, spliced right after it
                if self.node[mp].next != 0 {
                    self.node[f].next =
                        (mp as i64 + self.node[mp].next as i64 - f as i64) as i32;
                } else {
                    self.node[f].next = 0;
                }
                self.node[mp].next = (f as i64 - mp as i64) as i32;
                self.node[f].key = key;
                self.node[f].value = value;
            }
        } else {
            // free (or value-less) main position; keep its chain link
            self.node[mp].key = key;
            self.node[mp].value = value;
        }
        Ok(())
    }

    // ============ Rehash ============

    /// Count candidate integer keys per power-of-two bucket, then choose
    /// the largest array size that would be at least half full
    /// (rehash/computesizes in ltable.c).
    fn rehash(&mut self, extra: &LuaValue, strings: &Strings<'_>) -> Result<(), TableError> {
        let mut nums = [0usize; (MAXBITS + 1) as usize];
        let mut total = 0usize;
        let mut na = 0usize; // integer keys in range

        let mut count_int = |i: i64, nums: &mut [usize], na: &mut usize| -> bool {
            if i >= 1 && (i as u64) <= (1u64 << MAXBITS) {
                nums[ceil_log2(i as u64) as usize] += 1;
                *na += 1;
                true
            } else {
                false
            }
        };

        for (idx, v) in self.array.iter().enumerate() {
            if !v.is_nil() {
                count_int(idx as i64 + 1, &mut nums, &mut na);
                total += 1;
            }
        }
        for n in &self.node {
            if !n.value.is_nil() {
                total += 1;
                if let Some(i) = n.key.as_integer() {
                    count_int(i, &mut nums, &mut na);
                }
            }
        }
        total += 1;
        if let Some(i) = extra.as_integer() {
            count_int(i, &mut nums, &mut na);
        }

        // computesizes: pick the best array size
        let mut a = 0usize;
        let mut optimal = 0usize;
        let mut na_opt = 0usize;
        let mut twotoi = 1usize;
        let mut i = 0usize;
        while twotoi > 0 && na > twotoi / 2 {
            if nums[i] > 0 {
                a += nums[i];
                if a > twotoi / 2 {
                    optimal = twotoi;
                    na_opt = a;
                }
            }
            i += 1;
            if i > MAXBITS as usize {
                break;
            }
            twotoi *= 2;
        }

        self.resize(optimal, total - na_opt, strings)
    }

    /// Rebuild both parts with the given sizes, reinserting every live
    /// entry (luaH_resize).
    pub fn resize(
        &mut self,
        new_asize: usize,
        new_hsize: usize,
        strings: &Strings<'_>,
    ) -> Result<(), TableError> {
        if new_asize > (1 << MAXBITS) || new_hsize > (1 << MAXBITS) {
            return Err(TableError::Overflow);
        }
        let old_array = std::mem::take(&mut self.array);
        let old_node = std::mem::take(&mut self.node);

        self.array = vec![LuaValue::nil(); new_asize];
        self.set_node_size(new_hsize);

        for (idx, v) in old_array.into_iter().enumerate() {
            if !v.is_nil() {
                self.reinsert(LuaValue::integer(idx as i64 + 1), v, strings)?;
            }
        }
        for n in old_node {
            if !n.value.is_nil() {
                self.reinsert(n.key, n.value, strings)?;
            }
        }
        Ok(())
    }

    fn reinsert(
        &mut self,
        key: LuaValue,
        value: LuaValue,
        strings: &Strings<'_>,
    ) -> Result<(), TableError> {
        if let Some(i) = key.as_integer() {
            if i >= 1 && (i as u64) <= self.array.len() as u64 {
                self.array[(i - 1) as usize] = value;
                return Ok(());
            }
        }
        self.new_key(key, value, strings)
    }

    // ============ Length ============

    /// A border: `t[n]` non-nil and `t[n+1]` nil (luaH_getn).
    pub fn length(&self) -> i64 {
        let asize = self.array.len();
        if asize > 0 && self.array[asize - 1].is_nil() {
            let (mut lo, mut hi) = (0usize, asize);
            while hi - lo > 1 {
                let m = (lo + hi) / 2;
                if self.array[m - 1].is_nil() {
                    hi = m;
                } else {
                    lo = m;
                }
            }
            return lo as i64;
        }
        if self.node.is_empty() {
            return asize as i64;
        }
        // unbound search through the hash part
        let mut lo = asize as i64;
        let mut hi = lo + 1;
        while !self.get_int(hi).is_nil() {
            lo = hi;
            if hi > i64::MAX / 2 {
                let mut k = 1;
                while !self.get_int(k).is_nil() {
                    k += 1;
                }
                return k - 1;
            }
            hi *= 2;
        }
        while hi - lo > 1 {
            let m = (lo + hi) / 2;
            if self.get_int(m).is_nil() {
                hi = m;
            } else {
                lo = m;
            }
        }
        lo
    }

    // ============ Iteration ============

    /// Position of a key in the iteration order: 0 = before the first
    /// entry, 1..=asize = array part, asize+1+j = hash node j (findindex).
    fn find_index(&self, key: LuaValue, strings: &Strings<'_>) -> Result<usize, TableError> {
        if key.is_nil() {
            return Ok(0);
        }
        let key = check_key(key).map_err(|_| TableError::InvalidNext)?;
        if let Some(i) = key.as_integer() {
            if i >= 1 && (i as u64) <= self.array.len() as u64 {
                return Ok(i as usize);
            }
        }
        if self.node.is_empty() {
            return Err(TableError::InvalidNext);
        }
        let mut pos = self.main_position(&key, strings);
        loop {
            let n = &self.node[pos];
            // a key reclaimed by the collector is still findable by the
            // dead-key marker it left behind
            let found = key_equals(&key, &n.key, strings)
                || (n.key.is_dead_key() && n.key.secondary == key.primary);
            if found {
                return Ok(self.array.len() + 1 + pos);
            }
            if n.next == 0 {
                return Err(TableError::InvalidNext);
            }
            pos = (pos as i64 + n.next as i64) as usize;
        }
    }

    /// Stateless iteration (luaH_next): array part in ascending index
    /// order, then hash part in storage order.
    pub fn next(
        &self,
        key: LuaValue,
        strings: &Strings<'_>,
    ) -> Result<Option<(LuaValue, LuaValue)>, TableError> {
        let mut i = self.find_index(key, strings)?;
        while i < self.array.len() {
            if !self.array[i].is_nil() {
                return Ok(Some((LuaValue::integer(i as i64 + 1), self.array[i])));
            }
            i += 1;
        }
        let mut j = i - self.array.len();
        while j < self.node.len() {
            let n = &self.node[j];
            if !n.value.is_nil() {
                return Ok(Some((n.key, n.value)));
            }
            j += 1;
        }
        Ok(None)
    }

    /// Live entries, for the collector's traversal and for rehash counting.
    pub(crate) fn iter_entries(&self) -> impl Iterator<Item = (LuaValue, LuaValue)> + '_ {
        let arr = self
            .array
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nil())
            .map(|(i, v)| (LuaValue::integer(i as i64 + 1), *v));
        let hash = self
            .node
            .iter()
            .filter(|n| !n.value.is_nil())
            .map(|n| (n.key, n.value));
        arr.chain(hash)
    }

    /// Live entries with their storage positions, for the collector's
    /// weak-table clearing passes.
    pub(crate) fn entries_indexed(&self) -> Vec<(SlotRef, LuaValue, LuaValue)> {
        let mut out = Vec::new();
        for (i, v) in self.array.iter().enumerate() {
            if !v.is_nil() {
                out.push((SlotRef::Array(i), LuaValue::integer(i as i64 + 1), *v));
            }
        }
        for (j, n) in self.node.iter().enumerate() {
            if !n.value.is_nil() {
                out.push((SlotRef::Node(j), n.key, n.value));
            }
        }
        out
    }

    /// Remove an entry whose weak value died: the value goes nil and a
    /// collectable key becomes a dead key so chains stay walkable
    /// (removeentry in lgc.c).
    pub(crate) fn clear_slot(&mut self, r: SlotRef) {
        match r {
            SlotRef::Array(i) => self.array[i] = LuaValue::nil(),
            SlotRef::Node(j) => {
                if self.node[j].key.is_collectable() {
                    self.node[j].make_dead_key();
                } else {
                    self.node[j].value = LuaValue::nil();
                }
            }
        }
    }

    pub fn mem_size(&self) -> usize {
        std::mem::size_of::<LuaTable>()
            + self.array.capacity() * std::mem::size_of::<LuaValue>()
            + self.node.capacity() * std::mem::size_of::<Node>()
    }
}

impl Node {
    /// Clear a reclaimed key but keep the chain walkable (dead keys stay
    /// valid inputs to `next`).
    pub(crate) fn make_dead_key(&mut self) {
        let old = self.key;
        self.key = LuaValue {
            primary: crate::lua_value::lua_value::TAG_DEADKEY,
            secondary: old.primary,
        };
        self.value = LuaValue::nil();
    }

}

impl Default for LuaTable {
    fn default() -> Self {
        LuaTable::new()
    }
}

#[inline]
fn ceil_log2(x: u64) -> u32 {
    debug_assert!(x >= 1);
    if x == 1 {
        0
    } else {
        64 - (x - 1).leading_zeros()
    }
}
