// Incremental tri-color mark-and-sweep collector.
//
// Objects live in typed arenas (object_pool.rs); the collector drives a
// state machine over them, paying down an allocation debt in bounded work
// units. Colors follow lgc.c: two whites (flipped each cycle so the sweep
// can tell dead-this-cycle from born-this-cycle), gray for marked objects
// whose references are unscanned, black for fully scanned objects. The
// write barriers keep the no-black-to-white invariant during marking.
//
// Weak tables are parked on side lists during propagation and processed in
// the atomic phase; weak keys get ephemeron semantics (a pair survives only
// while its key is reachable from elsewhere). Finalizable objects found
// unreachable are resurrected onto `tobefnz` and handed to the VM, which
// runs their finalizers under protection.

mod gc_id;
mod gc_object;
mod object_pool;
mod string_interner;

pub use gc_id::*;
pub use gc_object::*;
pub use object_pool::*;
pub use string_interner::StringInterner;

use crate::lua_value::LuaValue;

/// Collector phases. Atomic runs to completion inside a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcState {
    Pause,
    Propagate,
    Sweep,
    Finalize,
}

/// Marking context supplied by the VM for each collector entry: the root
/// set and the canonical key strings the traversal needs.
pub struct GcParams {
    pub roots: Vec<LuaValue>,
    /// "__mode", for weak-table detection.
    pub mode_key: LuaValue,
}

/// Work/size tuning (lgc.c).
const GCSTEPSIZE: isize = 1024;
const STEPMULADJ: isize = 200;
const PAUSEADJ: usize = 100;
/// Arena slots swept per work unit batch.
const GCSWEEPMAX: usize = 80;
/// Finalizable objects handed back per step.
const GCFINMAX: usize = 10;

const ARENA_COUNT: usize = 7;

pub struct GC {
    state: GcState,
    current_white: u8,
    running: bool,

    gray: Vec<GcId>,
    grayagain: Vec<GcId>,
    weak: Vec<TableId>,
    ephemeron: Vec<TableId>,
    allweak: Vec<TableId>,

    /// Objects with a registered finalizer, not yet condemned.
    finobj: Vec<GcId>,
    /// Condemned finalizable objects owing a __gc call.
    tobefnz: Vec<GcId>,

    pub gc_debt: isize,
    total_bytes: usize,
    estimate: usize,

    pause: usize,
    step_mul: usize,

    sweep_arena: usize,
    sweep_slot: usize,
    in_emergency: bool,
}

impl GC {
    pub fn new(pause: usize, step_mul: usize) -> Self {
        GC {
            state: GcState::Pause,
            current_white: 0,
            running: true,
            gray: Vec::new(),
            grayagain: Vec::new(),
            weak: Vec::new(),
            ephemeron: Vec::new(),
            allweak: Vec::new(),
            finobj: Vec::new(),
            tobefnz: Vec::new(),
            gc_debt: 0,
            total_bytes: 0,
            estimate: 0,
            pause,
            step_mul,
            sweep_arena: 0,
            sweep_slot: 0,
            in_emergency: false,
        }
    }

    #[inline(always)]
    pub fn current_white(&self) -> u8 {
        self.current_white
    }

    #[inline(always)]
    pub fn other_white(&self) -> u8 {
        self.current_white ^ 1
    }

    #[inline(always)]
    pub fn state(&self) -> GcState {
        self.state
    }

    // ---- debt accounting (the allocator trampoline feeds this) ----

    #[inline]
    pub fn account_alloc(&mut self, size: usize) {
        self.total_bytes += size;
        self.gc_debt += size as isize;
    }

    #[inline]
    pub fn account_free(&mut self, size: usize) {
        self.total_bytes = self.total_bytes.saturating_sub(size);
    }

    #[inline]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    #[inline]
    pub fn should_step(&self) -> bool {
        self.running && self.gc_debt > 0
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn restart(&mut self) {
        self.running = true;
        self.gc_debt = 0;
    }

    pub fn set_pause(&mut self, pause: usize) -> usize {
        std::mem::replace(&mut self.pause, pause)
    }

    pub fn set_step_mul(&mut self, step_mul: usize) -> usize {
        std::mem::replace(&mut self.step_mul, step_mul)
    }

    // ---- marking ----

    #[inline]
    fn mark_value(&mut self, pool: &mut ObjectPool, v: LuaValue) {
        if let Some(id) = v.as_gc_id() {
            self.mark_object(pool, id);
        }
    }

    /// reallymarkobject: white -> gray (leaves go straight to black).
    fn mark_object(&mut self, pool: &mut ObjectPool, id: GcId) {
        let Some(h) = pool.header_mut(id) else { return };
        if !h.is_white() {
            return;
        }
        match id {
            GcId::String(_) => h.make_black(),
            _ => {
                h.make_gray();
                self.gray.push(id);
            }
        }
    }

    /// Register an object whose metatable carries a finalizer. Once an
    /// object has been through finalization it is never registered again.
    pub fn mark_finalizable(&mut self, pool: &mut ObjectPool, id: GcId) {
        if let Some(h) = pool.header_mut(id) {
            if !h.is_finalized() {
                h.set_finalized();
                self.finobj.push(id);
            }
        }
    }

    // ---- write barriers ----

    /// Forward barrier: a black object acquired a reference to a white
    /// one. During marking the white child is marked; during the sweep the
    /// parent is simply made current-white again (luaC_barrier_).
    pub fn barrier_forward(&mut self, pool: &mut ObjectPool, parent: GcId, child: LuaValue) {
        let Some(child_id) = child.as_gc_id() else { return };
        let parent_black = pool.header(parent).map(|h| h.is_black()).unwrap_or(false);
        let child_white = pool
            .header(child_id)
            .map(|h| h.is_white())
            .unwrap_or(false);
        if !(parent_black && child_white) {
            return;
        }
        if self.state == GcState::Propagate {
            self.mark_object(pool, child_id);
        } else {
            let cw = self.current_white;
            if let Some(h) = pool.header_mut(parent) {
                h.make_white(cw);
            }
        }
    }

    /// Backward barrier for tables, which are mutated too often to re-mark
    /// eagerly: repaint the black table gray and queue it for the next
    /// propagation slice (luaC_barrierback_).
    pub fn barrier_back(&mut self, pool: &mut ObjectPool, t: TableId) {
        let id = GcId::Table(t);
        let is_black = pool.header(id).map(|h| h.is_black()).unwrap_or(false);
        if is_black {
            if let Some(h) = pool.header_mut(id) {
                h.make_gray();
            }
            self.grayagain.push(id);
        }
    }

    // ---- stepping ----

    /// Run work units until the accumulated debt is paid. Returns objects
    /// whose finalizers the VM must now call.
    pub fn step(
        &mut self,
        pool: &mut ObjectPool,
        interner: &mut StringInterner,
        params: &GcParams,
    ) -> Vec<LuaValue> {
        let mut pending = Vec::new();
        if !self.running {
            self.gc_debt = -GCSTEPSIZE;
            return pending;
        }
        let mut debt = self.gc_debt / STEPMULADJ * self.step_mul as isize;
        loop {
            let work = self.single_step(pool, interner, params, &mut pending);
            debt -= work as isize;
            if self.state == GcState::Pause {
                self.set_pause_debt();
                break;
            }
            if debt <= -GCSTEPSIZE {
                self.gc_debt = debt * STEPMULADJ / self.step_mul as isize;
                break;
            }
        }
        pending
    }

    /// Full collection: finish any cycle in flight, then run a complete
    /// fresh cycle. Emergency collections skip finalizer separation.
    pub fn full_collect(
        &mut self,
        pool: &mut ObjectPool,
        interner: &mut StringInterner,
        params: &GcParams,
        emergency: bool,
    ) -> Vec<LuaValue> {
        self.in_emergency = emergency;
        let mut pending = Vec::new();
        // finish whatever phase is active
        while self.state != GcState::Pause {
            self.single_step(pool, interner, params, &mut pending);
        }
        // one full cycle
        loop {
            self.single_step(pool, interner, params, &mut pending);
            if self.state == GcState::Pause {
                break;
            }
        }
        self.set_pause_debt();
        self.in_emergency = false;
        pending
    }

    fn set_pause_debt(&mut self) {
        let estimate = (self.estimate / PAUSEADJ).max(1);
        let threshold = estimate.saturating_mul(self.pause);
        self.gc_debt = self.total_bytes as isize - threshold as isize;
    }

    fn single_step(
        &mut self,
        pool: &mut ObjectPool,
        interner: &mut StringInterner,
        params: &GcParams,
        pending: &mut Vec<LuaValue>,
    ) -> usize {
        match self.state {
            GcState::Pause => {
                self.restart_collection(pool, params);
                self.state = GcState::Propagate;
                self.gray.len() + 1
            }
            GcState::Propagate => {
                if let Some(id) = self.gray.pop() {
                    self.propagate_mark(pool, id, params, false)
                } else {
                    // marking done: run the atomic phase in one go
                    let work = self.atomic(pool, interner, params);
                    self.state = GcState::Sweep;
                    self.sweep_arena = 0;
                    self.sweep_slot = 0;
                    self.estimate = self.total_bytes;
                    work
                }
            }
            GcState::Sweep => {
                let work = self.sweep_batch(pool, interner);
                if self.sweep_arena >= ARENA_COUNT {
                    self.state = if self.tobefnz.is_empty() || self.in_emergency {
                        GcState::Pause
                    } else {
                        GcState::Finalize
                    };
                    tracing::debug!(
                        total_bytes = self.total_bytes,
                        objects = pool.total_objects(),
                        "gc sweep complete"
                    );
                }
                work
            }
            GcState::Finalize => {
                let mut n = 0;
                while n < GCFINMAX {
                    let Some(id) = self.tobefnz.pop() else { break };
                    if let Some(v) = object_value(id) {
                        pending.push(v);
                    }
                    n += 1;
                }
                if self.tobefnz.is_empty() {
                    self.state = GcState::Pause;
                }
                n * 10 + 1
            }
        }
    }

    /// Begin a cycle: everything is white, mark the roots.
    fn restart_collection(&mut self, pool: &mut ObjectPool, params: &GcParams) {
        self.gray.clear();
        self.grayagain.clear();
        self.weak.clear();
        self.ephemeron.clear();
        self.allweak.clear();
        for &v in &params.roots {
            self.mark_value(pool, v);
        }
        // objects awaiting finalization must stay alive
        let tobefnz = self.tobefnz.clone();
        for id in tobefnz {
            self.mark_object(pool, id);
        }
    }

    /// Traverse one gray object. `atomic` controls whether threads and
    /// weak tables are finished now or deferred to the atomic phase.
    fn propagate_mark(
        &mut self,
        pool: &mut ObjectPool,
        id: GcId,
        params: &GcParams,
        atomic: bool,
    ) -> usize {
        match id {
            GcId::Table(t) => self.traverse_table(pool, t, params, atomic),
            GcId::Proto(p) => self.traverse_proto(pool, p),
            GcId::Function(f) => self.traverse_closure(pool, f),
            GcId::Upvalue(u) => self.traverse_upvalue(pool, u),
            GcId::Userdata(u) => self.traverse_userdata(pool, u),
            GcId::Thread(t) => self.traverse_thread(pool, t, atomic),
            GcId::String(_) => 1,
        }
    }

    fn propagate_all(&mut self, pool: &mut ObjectPool, params: &GcParams, atomic: bool) -> usize {
        let mut work = 0;
        while let Some(id) = self.gray.pop() {
            work += self.propagate_mark(pool, id, params, atomic);
        }
        work
    }

    fn blacken(pool: &mut ObjectPool, id: GcId) {
        if let Some(h) = pool.header_mut(id) {
            h.make_black();
        }
    }

    /// Weak mode of a table, read from its metatable's __mode field.
    fn table_weakness(&self, pool: &ObjectPool, t: TableId, params: &GcParams) -> (bool, bool) {
        let Some(tbl) = pool.table(t) else { return (false, false) };
        let Some(mt) = tbl.metatable else { return (false, false) };
        let Some(meta) = pool.table(mt) else { return (false, false) };
        let mode = meta.get(params.mode_key, &pool.strings_view());
        let Some(id) = mode.as_string_id() else { return (false, false) };
        let Some(s) = pool.string(id) else { return (false, false) };
        let bytes = s.as_bytes();
        (bytes.contains(&b'k'), bytes.contains(&b'v'))
    }

    fn traverse_table(
        &mut self,
        pool: &mut ObjectPool,
        t: TableId,
        params: &GcParams,
        atomic: bool,
    ) -> usize {
        let mt = pool.table(t).and_then(|tbl| tbl.metatable);
        if let Some(mt) = mt {
            self.mark_object(pool, GcId::Table(mt));
        }
        let (weak_k, weak_v) = self.table_weakness(pool, t, params);
        let entries: Vec<(LuaValue, LuaValue)> = match pool.table(t) {
            Some(tbl) => tbl.iter_entries().collect(),
            None => return 1,
        };
        let work = entries.len() + 1;
        match (weak_k, weak_v) {
            (false, false) => {
                for (k, v) in entries {
                    self.mark_value(pool, k);
                    self.mark_value(pool, v);
                }
                Self::blacken(pool, GcId::Table(t));
            }
            (false, true) => {
                // weak values: keys are strong. The table stays gray and
                // is traversed again in the atomic phase, so keys added
                // mid-cycle are still marked (traverseweakvalue).
                for (k, _) in entries {
                    self.mark_value(pool, k);
                }
                if !atomic {
                    self.grayagain.push(GcId::Table(t));
                } else {
                    self.weak.push(t);
                }
            }
            (true, false) => {
                self.traverse_ephemeron(pool, t);
                if !atomic {
                    self.grayagain.push(GcId::Table(t));
                } else {
                    self.ephemeron.push(t);
                }
            }
            (true, true) => {
                self.allweak.push(t);
            }
        }
        work
    }

    /// Ephemeron pass: a value is marked only if its key is already
    /// reachable. Returns true if any value got marked (another pass may
    /// then make progress).
    fn traverse_ephemeron(&mut self, pool: &mut ObjectPool, t: TableId) -> bool {
        let entries: Vec<(LuaValue, LuaValue)> = match pool.table(t) {
            Some(tbl) => tbl.iter_entries().collect(),
            None => return false,
        };
        let mut marked = false;
        for (k, v) in entries {
            if !self.value_is_white(pool, k) && self.value_is_white(pool, v) {
                self.mark_value(pool, v);
                marked = true;
            }
        }
        marked
    }

    fn traverse_proto(&mut self, pool: &mut ObjectPool, p: ProtoId) -> usize {
        let Some(proto) = pool.proto(p) else { return 1 };
        // drop a cached closure that is about to die, so the one-slot
        // cache never resurrects a stale id (lgc.c traverseproto)
        if let Some(cached) = proto.cache.get() {
            let white = pool
                .header(GcId::Function(cached))
                .map(|h| h.is_white())
                .unwrap_or(true);
            if white {
                proto.cache.set(None);
            }
        }
        for &k in proto.constants.iter() {
            self.mark_value(pool, k);
        }
        for &inner in proto.protos.iter() {
            self.mark_object(pool, GcId::Proto(inner));
        }
        if let Some(src) = proto.source {
            self.mark_object(pool, GcId::String(src));
        }
        for uv in proto.upvalues.iter() {
            if let Some(name) = uv.name {
                self.mark_object(pool, GcId::String(name));
            }
        }
        for lv in proto.loc_vars.iter() {
            self.mark_object(pool, GcId::String(lv.name));
        }
        let work = proto.constants.len() + proto.protos.len() + 1;
        Self::blacken(pool, GcId::Proto(p));
        work
    }

    fn traverse_closure(&mut self, pool: &mut ObjectPool, f: FunctionId) -> usize {
        enum Refs {
            Lua(ProtoId, Vec<UpvalueId>),
            Host(Vec<LuaValue>),
        }
        let refs = match pool.closure(f) {
            Some(crate::lua_value::Closure::Lua(c)) => Refs::Lua(c.proto, c.upvalues.clone()),
            Some(crate::lua_value::Closure::Host(c)) => Refs::Host(c.upvalues.clone()),
            None => return 1,
        };
        let work;
        match refs {
            Refs::Lua(proto, upvals) => {
                work = upvals.len() + 2;
                self.mark_object(pool, GcId::Proto(proto));
                for uv in upvals {
                    self.mark_object(pool, GcId::Upvalue(uv));
                }
            }
            Refs::Host(upvals) => {
                work = upvals.len() + 1;
                for v in upvals {
                    self.mark_value(pool, v);
                }
            }
        }
        Self::blacken(pool, GcId::Function(f));
        work
    }

    fn traverse_upvalue(&mut self, pool: &mut ObjectPool, u: UpvalueId) -> usize {
        let closed = match pool.upvalue(u).map(|uv| &uv.state) {
            Some(UpvalueState::Closed(v)) => Some(*v),
            _ => None, // open: the stack slot is marked through the thread
        };
        if let Some(v) = closed {
            self.mark_value(pool, v);
        }
        Self::blacken(pool, GcId::Upvalue(u));
        1
    }

    fn traverse_userdata(&mut self, pool: &mut ObjectPool, u: UserdataId) -> usize {
        let (mt, uval) = match pool.userdata_ref(u) {
            Some(ud) => (ud.metatable, ud.user_value),
            None => return 1,
        };
        if let Some(mt) = mt {
            self.mark_object(pool, GcId::Table(mt));
        }
        self.mark_value(pool, uval);
        Self::blacken(pool, GcId::Userdata(u));
        1
    }

    /// Threads stay gray until the atomic phase: their stacks keep
    /// changing while the mutator runs.
    fn traverse_thread(&mut self, pool: &mut ObjectPool, t: ThreadId, atomic: bool) -> usize {
        let (values, upvals) = match pool.thread(t) {
            Some(th) => {
                let mut vs: Vec<LuaValue> = th.stack.clone();
                vs.extend(th.transfer.iter().copied());
                for ci in &th.frames {
                    vs.push(ci.func);
                }
                (vs, th.open_upvalues.clone())
            }
            None => return 1,
        };
        let work = values.len() + 1;
        for v in values {
            self.mark_value(pool, v);
        }
        for uv in upvals {
            self.mark_object(pool, GcId::Upvalue(uv));
        }
        if atomic {
            Self::blacken(pool, GcId::Thread(t));
        } else {
            self.grayagain.push(GcId::Thread(t));
        }
        work
    }

    // ---- atomic phase ----

    fn atomic(
        &mut self,
        pool: &mut ObjectPool,
        interner: &mut StringInterner,
        params: &GcParams,
    ) -> usize {
        let mut work = 0;
        // re-mark roots: registry and metatable writes since the cycle
        // started, plus the running thread
        for &v in &params.roots {
            self.mark_value(pool, v);
        }
        work += self.propagate_all(pool, params, true);

        // gray-again: tables hit by the backward barrier, threads
        let grayagain = std::mem::take(&mut self.grayagain);
        self.gray.extend(grayagain);
        work += self.propagate_all(pool, params, true);

        work += self.converge_ephemerons(pool, params);

        // weak-value entries dead at this point are gone even if a
        // finalizer later resurrects the value
        self.clear_weak_values(pool);

        if !self.in_emergency {
            work += self.separate_finalizable(pool, params);
        }

        work += self.converge_ephemerons(pool, params);
        self.clear_weak_keys(pool);
        self.clear_weak_values(pool);

        interner.sweep_literal_cache(pool);

        // flip: from here on the old white is the dead white
        self.current_white ^= 1;
        work
    }

    fn converge_ephemerons(&mut self, pool: &mut ObjectPool, params: &GcParams) -> usize {
        let mut work = 0;
        loop {
            let mut changed = false;
            let list = self.ephemeron.clone();
            for t in list {
                if self.traverse_ephemeron(pool, t) {
                    changed = true;
                }
                work += self.propagate_all(pool, params, true);
            }
            if !changed {
                break;
            }
        }
        work
    }

    /// Move unreachable finalizable objects to tobefnz and resurrect them
    /// (they become reachable again through the finalizer call).
    fn separate_finalizable(&mut self, pool: &mut ObjectPool, params: &GcParams) -> usize {
        let mut kept = Vec::with_capacity(self.finobj.len());
        let mut condemned = Vec::new();
        for id in std::mem::take(&mut self.finobj) {
            let white = pool.header(id).map(|h| h.is_white()).unwrap_or(false);
            if white {
                condemned.push(id);
            } else {
                kept.push(id);
            }
        }
        self.finobj = kept;
        let work = condemned.len();
        for id in condemned {
            self.mark_object(pool, id);
            self.tobefnz.push(id);
        }
        work + self.propagate_all(pool, params, true)
    }

    fn value_is_white(&self, pool: &ObjectPool, v: LuaValue) -> bool {
        match v.as_gc_id() {
            Some(id) => pool
                .header(id)
                .map(|h| h.is_white() && !h.is_fixed())
                .unwrap_or(false),
            None => false,
        }
    }

    /// iscleared: strings behave like primitive values in weak tables and
    /// are kept (and marked) rather than cleared.
    fn entry_is_dead(&mut self, pool: &mut ObjectPool, v: LuaValue) -> bool {
        if v.is_string() {
            self.mark_value(pool, v);
            return false;
        }
        self.value_is_white(pool, v)
    }

    /// clearvalues: drop entries whose (weak) value died this cycle.
    fn clear_weak_values(&mut self, pool: &mut ObjectPool) {
        let tables: Vec<TableId> = self.weak.iter().chain(self.allweak.iter()).copied().collect();
        for t in tables {
            let items = match pool.table(t) {
                Some(tbl) => tbl.entries_indexed(),
                None => continue,
            };
            for (slot, _k, v) in items {
                if self.entry_is_dead(pool, v) {
                    if let Some(tbl) = pool.table_mut(t) {
                        tbl.clear_slot(slot);
                    }
                }
            }
        }
    }

    /// clearkeys: drop entries whose (weak) key died this cycle. Only the
    /// hash part can hold such keys.
    fn clear_weak_keys(&mut self, pool: &mut ObjectPool) {
        let tables: Vec<TableId> = self
            .ephemeron
            .iter()
            .chain(self.allweak.iter())
            .copied()
            .collect();
        for t in tables {
            let items = match pool.table(t) {
                Some(tbl) => tbl.entries_indexed(),
                None => continue,
            };
            for (slot, k, _v) in items {
                if self.entry_is_dead(pool, k) {
                    if let Some(tbl) = pool.table_mut(t) {
                        tbl.clear_slot(slot);
                    }
                }
            }
        }
    }

    // ---- sweep ----

    fn sweep_batch(&mut self, pool: &mut ObjectPool, interner: &mut StringInterner) -> usize {
        let other = self.other_white();
        let cw = self.current_white;
        let mut done = 0;
        while done < GCSWEEPMAX && self.sweep_arena < ARENA_COUNT {
            let slot = self.sweep_slot as u32;
            let (advanced, freed_size) = sweep_one(pool, interner, self.sweep_arena, slot, other, cw);
            if let Some(size) = freed_size {
                self.account_free(size);
            }
            if advanced {
                self.sweep_slot += 1;
                done += 1;
            } else {
                self.sweep_arena += 1;
                self.sweep_slot = 0;
            }
        }
        done + 1
    }
}

/// Value form of a collectable id, for handing finalizable objects back to
/// the VM (only tables and userdata can carry finalizers).
fn object_value(id: GcId) -> Option<LuaValue> {
    match id {
        GcId::Table(t) => Some(LuaValue::table(t)),
        GcId::Userdata(u) => Some(LuaValue::userdata(u)),
        _ => None,
    }
}

/// Sweep a single arena slot: free it if dead, repaint to the new white if
/// alive. Returns (slot existed in this arena, freed size).
fn sweep_one(
    pool: &mut ObjectPool,
    interner: &mut StringInterner,
    arena: usize,
    slot: u32,
    other_white: u8,
    current_white: u8,
) -> (bool, Option<usize>) {
    macro_rules! sweep_arena {
        ($field:ident, $free:expr) => {{
            if (slot as usize) >= pool.$field.slot_count() {
                return (false, None);
            }
            let (dead, fixed) = match pool.$field.get(slot) {
                Some(o) => (o.header.is_dead(other_white), o.header.is_fixed()),
                None => return (true, None),
            };
            if dead && !fixed {
                let freed = $free(pool, interner, slot);
                (true, freed)
            } else {
                if let Some(o) = pool.$field.get_mut(slot) {
                    o.header.make_white(current_white);
                }
                (true, None)
            }
        }};
    }
    match arena {
        0 => sweep_arena!(strings, |pool: &mut ObjectPool, interner: &mut StringInterner, s: u32| {
            let obj = pool.strings.release(s)?;
            if obj.data.is_short() {
                let hash = obj.data.hash(pool.seed);
                interner.remove_dead(StringId(s), hash);
            }
            Some(obj.data.mem_size())
        }),
        1 => sweep_arena!(tables, |pool: &mut ObjectPool, _i: &mut StringInterner, s: u32| {
            pool.tables.release(s).map(|o| o.data.mem_size())
        }),
        2 => sweep_arena!(protos, |pool: &mut ObjectPool, _i: &mut StringInterner, s: u32| {
            pool.protos.release(s).map(|o| o.proto.mem_size())
        }),
        3 => sweep_arena!(functions, |pool: &mut ObjectPool, _i: &mut StringInterner, s: u32| {
            pool.functions.release(s).map(|o| o.data.mem_size())
        }),
        4 => sweep_arena!(upvalues, |pool: &mut ObjectPool, _i: &mut StringInterner, s: u32| {
            pool.upvalues
                .release(s)
                .map(|_| std::mem::size_of::<GcUpvalue>())
        }),
        5 => sweep_arena!(userdata, |pool: &mut ObjectPool, _i: &mut StringInterner, s: u32| {
            pool.userdata.release(s).map(|o| o.data.mem_size())
        }),
        6 => sweep_arena!(threads, |pool: &mut ObjectPool, _i: &mut StringInterner, s: u32| {
            pool.threads
                .release(s)
                .map(|_| std::mem::size_of::<GcThread>())
        }),
        _ => (false, None),
    }
}

