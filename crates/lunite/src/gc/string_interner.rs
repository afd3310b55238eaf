// String interning. Short strings (len <= the configured bound) are
// deduplicated through a bucket map so equality is id equality; a string
// found dead-but-not-yet-swept is resurrected in place (lstring.c
// internshrstr). Long strings are plain objects, never interned.
//
// A second, small cache maps host literal addresses to interned strings:
// `&'static str` literals have stable addresses, so repeated pushes of the
// same literal skip hashing entirely (lstring.c luaS_newliteral cache).

use ahash::RandomState;
use std::collections::HashMap;

use crate::gc::{ObjectPool, StringId, GC};
use crate::lua_value::{str_hash, LuaString};

/// Literal cache geometry: N buckets of M ways.
const STRCACHE_N: usize = 53;
const STRCACHE_M: usize = 2;

#[derive(Clone, Copy)]
struct LiteralSlot {
    addr: usize,
    id: StringId,
}

pub struct StringInterner {
    /// Content hash -> interned short strings with that hash.
    map: HashMap<u64, Vec<StringId>, RandomState>,
    cache: [[Option<LiteralSlot>; STRCACHE_M]; STRCACHE_N],
    short_limit: usize,
    live_short: usize,
}

impl StringInterner {
    pub fn new(short_limit: usize) -> Self {
        StringInterner {
            map: HashMap::with_capacity_and_hasher(128, RandomState::new()),
            cache: [[None; STRCACHE_M]; STRCACHE_N],
            short_limit,
            live_short: 0,
        }
    }

    #[inline(always)]
    pub fn short_limit(&self) -> usize {
        self.short_limit
    }

    pub fn live_short_count(&self) -> usize {
        self.live_short
    }

    /// Intern or create a string from raw bytes.
    pub fn intern(&mut self, bytes: &[u8], pool: &mut ObjectPool, gc: &mut GC) -> StringId {
        let hash = str_hash(bytes, pool.seed);
        if bytes.len() > self.short_limit {
            return pool.alloc_string(LuaString::new_long(bytes), gc);
        }
        if let Some(ids) = self.map.get(&hash) {
            for &id in ids {
                if let Some(obj) = pool.strings.get_mut(id.0) {
                    if obj.data.as_bytes() == bytes {
                        // found: resurrect if it was condemned this cycle
                        if obj.header.is_dead(gc.other_white()) {
                            obj.header.make_white(gc.current_white());
                        }
                        return id;
                    }
                }
            }
        }
        let id = pool.alloc_string(LuaString::new_short(bytes, hash), gc);
        self.map.entry(hash).or_default().push(id);
        self.live_short += 1;
        id
    }

    /// Intern a host literal, going through the address-keyed cache.
    pub fn intern_literal(
        &mut self,
        s: &'static str,
        pool: &mut ObjectPool,
        gc: &mut GC,
    ) -> StringId {
        let addr = s.as_ptr() as usize;
        let bucket = addr % STRCACHE_N;
        for slot in self.cache[bucket].iter().flatten() {
            if slot.addr == addr {
                return slot.id;
            }
        }
        let id = self.intern(s.as_bytes(), pool, gc);
        // new entry evicts the older way
        self.cache[bucket][1] = self.cache[bucket][0];
        self.cache[bucket][0] = Some(LiteralSlot { addr, id });
        id
    }

    /// Drop cache entries whose string did not survive marking. Runs in
    /// the collector's atomic phase, before the string sweep.
    pub fn sweep_literal_cache(&mut self, pool: &ObjectPool) {
        for bucket in self.cache.iter_mut() {
            for slot in bucket.iter_mut() {
                let dead = match slot {
                    Some(s) => pool
                        .strings
                        .get(s.id.0)
                        .map(|o| o.header.is_white() && !o.header.is_fixed())
                        .unwrap_or(true),
                    None => false,
                };
                if dead {
                    *slot = None;
                }
            }
        }
    }

    /// Unlink a short string the sweep is about to free.
    pub fn remove_dead(&mut self, id: StringId, hash: u64) {
        if let Some(ids) = self.map.get_mut(&hash) {
            if let Some(pos) = ids.iter().position(|&i| i == id) {
                ids.swap_remove(pos);
                self.live_short -= 1;
            }
            if ids.is_empty() {
                self.map.remove(&hash);
            }
        }
    }
}
