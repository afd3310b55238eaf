// Shared runtime state (global_State + the embedding surface).
//
// One LuaVM per logical runtime instance. Everything reachable hangs off
// the registry, the globals table, the per-kind metatables and the live
// thread chain; those form the collector's root set. There is no process
// global anywhere: several LuaVMs coexist freely in one host.

pub mod api;
mod call_info;
pub mod debug_info;
pub mod execute;
mod lua_error;
pub mod opcode;
mod safe_option;

pub use call_info::{call_status, CallInfo};
pub use execute::metamethod::TmKind;
pub use lua_error::{LuaError, LuaResult};
pub use opcode::{Instruction, OpCode};
pub use safe_option::VmOptions;

use std::hash::{BuildHasher, Hasher};

use crate::compiler;
use crate::gc::{
    GcId, GcParams, ObjectPool, ProtoId, StringId, StringInterner, TableId, ThreadId,
    UpvalueState, GC,
};
use crate::lua_value::{
    Closure, LuaClosure, LuaTable, LuaThread, LuaUserdata, LuaValue, TableError, ThreadStatus,
};

/// Host function: arguments start at the frame base of the current thread;
/// returns how many results were left on top of the stack.
pub type CFunction = fn(&mut LuaVM) -> LuaResult<u32>;

/// Number of basic kinds that can carry a per-kind metatable (nil through
/// thread, lua.h LUA_NUMTAGS).
pub const NUM_TYPE_METATABLES: usize = 9;

/// Registry slots (lua.h LUA_RIDX_*).
pub const RIDX_MAINTHREAD: i64 = 1;
pub const RIDX_GLOBALS: i64 = 2;

pub const VERSION: &str = "Lua 5.3";

pub struct LuaVM {
    pub(crate) object_pool: ObjectPool,
    pub(crate) gc: GC,
    pub(crate) interner: StringInterner,

    pub(crate) registry: TableId,
    pub(crate) globals: TableId,
    pub(crate) main_thread: ThreadId,
    pub(crate) current_thread: ThreadId,
    /// Resume nesting, main thread first.
    pub(crate) thread_chain: Vec<ThreadId>,
    /// Host-recursion depth recorded at each resume, for the
    /// yield-across-C-boundary check.
    pub(crate) chain_ncalls: Vec<usize>,

    /// Canonical metamethod name strings, interned and pinned at startup.
    pub(crate) tm_names: [LuaValue; TmKind::COUNT],
    /// Metatables for non-table, non-userdata kinds.
    pub(crate) type_metatables: [Option<TableId>; NUM_TYPE_METATABLES],

    /// Payload of the error currently unwinding.
    pub(crate) error_value: LuaValue,
    /// Pinned out-of-memory message, allocated up front.
    pub(crate) memerr_msg: LuaValue,
    pub(crate) panic: Option<CFunction>,

    pub(crate) options: VmOptions,
    /// Host-frame nesting depth (recursive dispatch entries).
    pub(crate) ncalls: usize,

    /// Last debug-hook event and line, readable from inside a hook.
    pub hook_event: u8,
    pub hook_line: u32,
}

impl LuaVM {
    pub fn new(options: VmOptions) -> Box<LuaVM> {
        let seed = ahash::RandomState::new().build_hasher().finish();
        let mut pool = ObjectPool::new(seed);
        let mut gc = GC::new(options.gc_pause, options.gc_step_mul);
        let interner = StringInterner::new(options.short_string_limit);

        let main_thread = pool.alloc_thread(LuaThread::new(), &mut gc);
        pool.fix(GcId::Thread(main_thread));

        let registry = pool.alloc_table(LuaTable::with_capacity(2, 2), &mut gc);
        pool.fix(GcId::Table(registry));
        let globals = pool.alloc_table(LuaTable::with_capacity(0, 16), &mut gc);

        let mut vm = Box::new(LuaVM {
            object_pool: pool,
            gc,
            interner,
            registry,
            globals,
            main_thread,
            current_thread: main_thread,
            thread_chain: vec![main_thread],
            chain_ncalls: vec![0],
            tm_names: [LuaValue::nil(); TmKind::COUNT],
            type_metatables: [None; NUM_TYPE_METATABLES],
            error_value: LuaValue::nil(),
            memerr_msg: LuaValue::nil(),
            panic: None,
            options,
            ncalls: 0,
            hook_event: 0,
            hook_line: 0,
        });

        // canonical metamethod names, pinned for the lifetime of the state
        for i in 0..TmKind::COUNT {
            let name = TmKind::from_index(i).name();
            let id = vm.intern_literal_id(name);
            vm.object_pool.fix(GcId::String(id));
            vm.tm_names[i] = LuaValue::string(id);
        }

        // pinned memory-error message: raising it must not allocate
        let memerr = vm.intern_id(b"not enough memory");
        vm.object_pool.fix(GcId::String(memerr));
        vm.memerr_msg = LuaValue::string(memerr);

        // reserved words get their lexer codes on the interned strings
        compiler::intern_reserved_words(&mut vm);

        // registry[1] = main thread, registry[2] = globals
        let mt = LuaValue::thread(main_thread);
        let gl = LuaValue::table(globals);
        vm.raw_set_i(registry, RIDX_MAINTHREAD, mt);
        vm.raw_set_i(registry, RIDX_GLOBALS, gl);
        vm.raw_set_field(globals, "_G", gl);
        let version = vm.new_string(VERSION);
        vm.raw_set_field(globals, "_VERSION", version);

        // startup objects are not a reason to collect immediately
        vm.gc.gc_debt = -(8 * 1024);
        vm
    }

    // ============ Strings ============

    pub(crate) fn intern_id(&mut self, bytes: &[u8]) -> StringId {
        self.interner
            .intern(bytes, &mut self.object_pool, &mut self.gc)
    }

    pub(crate) fn intern_literal_id(&mut self, s: &'static str) -> StringId {
        self.interner
            .intern_literal(s, &mut self.object_pool, &mut self.gc)
    }

    pub fn new_string(&mut self, s: &str) -> LuaValue {
        LuaValue::string(self.intern_id(s.as_bytes()))
    }

    pub fn new_string_bytes(&mut self, bytes: &[u8]) -> LuaValue {
        LuaValue::string(self.intern_id(bytes))
    }

    pub fn literal(&mut self, s: &'static str) -> LuaValue {
        LuaValue::string(self.intern_literal_id(s))
    }

    pub(crate) fn str_bytes(&self, v: LuaValue) -> Option<&[u8]> {
        self.object_pool
            .string(v.as_string_id()?)
            .map(|s| s.as_bytes())
    }

    /// Contents of a string value as UTF-8 (identifiers, messages).
    pub(crate) fn str_text(&self, v: LuaValue) -> Option<&str> {
        self.object_pool.string(v.as_string_id()?).map(|s| s.as_str())
    }

    // ============ Tables ============

    pub fn new_table(&mut self, narr: usize, nrec: usize) -> LuaValue {
        self.check_gc();
        let id = self
            .object_pool
            .alloc_table(LuaTable::with_capacity(narr, nrec), &mut self.gc);
        LuaValue::table(id)
    }

    #[inline]
    pub(crate) fn raw_get(&self, t: TableId, key: LuaValue) -> LuaValue {
        match self.object_pool.table(t) {
            Some(tbl) => tbl.get(key, &self.object_pool.strings_view()),
            None => LuaValue::nil(),
        }
    }

    #[inline]
    pub(crate) fn raw_get_i(&self, t: TableId, i: i64) -> LuaValue {
        match self.object_pool.table(t) {
            Some(tbl) => tbl.get_int(i),
            None => LuaValue::nil(),
        }
    }

    pub(crate) fn raw_set(
        &mut self,
        t: TableId,
        key: LuaValue,
        value: LuaValue,
    ) -> Result<(), TableError> {
        let pool = &mut self.object_pool;
        let (tables, rest_strings, seed) = (&mut pool.tables, &pool.strings, pool.seed);
        let strings = crate::gc::Strings {
            arena: rest_strings,
            seed,
        };
        match tables.get_mut(t.0) {
            Some(tbl) => tbl.data.set(key, value, &strings)?,
            None => return Ok(()),
        }
        self.gc.barrier_back(&mut self.object_pool, t);
        Ok(())
    }

    pub(crate) fn raw_set_i(&mut self, t: TableId, i: i64, value: LuaValue) {
        let pool = &mut self.object_pool;
        let (tables, rest_strings, seed) = (&mut pool.tables, &pool.strings, pool.seed);
        let strings = crate::gc::Strings {
            arena: rest_strings,
            seed,
        };
        if let Some(tbl) = tables.get_mut(t.0) {
            // integer keys cannot fail the key checks
            let _ = tbl.data.set_int(i, value, &strings);
        }
        self.gc.barrier_back(&mut self.object_pool, t);
    }

    pub(crate) fn raw_set_field(&mut self, t: TableId, name: &str, value: LuaValue) {
        let key = self.new_string(name);
        let _ = self.raw_set(t, key, value);
    }

    pub fn set_global(&mut self, name: &str, value: LuaValue) {
        let globals = self.globals;
        self.raw_set_field(globals, name, value);
    }

    pub fn get_global(&mut self, name: &str) -> LuaValue {
        let key = self.new_string(name);
        self.raw_get(self.globals, key)
    }

    // ============ Metatables ============

    /// Metatable of a value: per-instance for tables and userdata,
    /// per-kind otherwise.
    pub fn metatable_of(&self, v: LuaValue) -> Option<TableId> {
        if let Some(t) = v.as_table_id() {
            return self.object_pool.table(t).and_then(|tbl| tbl.metatable);
        }
        if let Some(u) = v.as_userdata_id() {
            return self.object_pool.userdata_ref(u).and_then(|ud| ud.metatable);
        }
        let idx = type_metatable_index(v);
        self.type_metatables[idx]
    }

    /// Metamethod lookup with the absent-slot cache (luaT_gettmbyobj +
    /// fasttm). The cache byte lives on the metatable itself.
    pub fn get_metamethod(&mut self, v: LuaValue, tm: TmKind) -> LuaValue {
        let Some(mt) = self.metatable_of(v) else {
            return LuaValue::nil();
        };
        self.get_metamethod_from(mt, tm)
    }

    pub(crate) fn get_metamethod_from(&mut self, mt: TableId, tm: TmKind) -> LuaValue {
        let bit = tm.cache_bit();
        if let Some(flags) = self.object_pool.table(mt).map(|t| t.flags) {
            if bit != 0 && flags & bit != 0 {
                return LuaValue::nil(); // cached absent
            }
        }
        let name = self.tm_names[tm as usize];
        let result = self.raw_get(mt, name);
        if result.is_nil() && bit != 0 {
            if let Some(tbl) = self.object_pool.table_mut(mt) {
                tbl.flags |= bit;
            }
        }
        result
    }

    /// lua_setmetatable, including finalizer registration: the first time
    /// an object gains a metatable with __gc, it enters the finalization
    /// set.
    pub fn set_metatable(&mut self, v: LuaValue, mt: Option<TableId>) -> LuaResult<()> {
        if let Some(m) = mt {
            // the metatable's own cache no longer holds
            if let Some(tbl) = self.object_pool.table_mut(m) {
                tbl.flags = 0;
            }
        }
        if let Some(t) = v.as_table_id() {
            if let Some(tbl) = self.object_pool.table_mut(t) {
                tbl.metatable = mt;
                tbl.flags = 0;
            }
            if let Some(m) = mt {
                self.gc
                    .barrier_forward(&mut self.object_pool, GcId::Table(t), LuaValue::table(m));
                self.check_finalizer(v, m);
            }
            return Ok(());
        }
        if let Some(u) = v.as_userdata_id() {
            if let Some(ud) = self.object_pool.userdata_mut(u) {
                ud.metatable = mt;
            }
            if let Some(m) = mt {
                self.gc.barrier_forward(
                    &mut self.object_pool,
                    GcId::Userdata(u),
                    LuaValue::table(m),
                );
                self.check_finalizer(v, m);
            }
            return Ok(());
        }
        let idx = type_metatable_index(v);
        self.type_metatables[idx] = mt;
        Ok(())
    }

    fn check_finalizer(&mut self, v: LuaValue, mt: TableId) {
        let gc_mm = self.get_metamethod_from(mt, TmKind::Gc);
        if !gc_mm.is_nil() {
            if let Some(id) = v.as_gc_id() {
                self.gc.mark_finalizable(&mut self.object_pool, id);
            }
        }
    }

    // ============ Userdata, threads ============

    pub fn new_userdata(&mut self, size: usize) -> LuaValue {
        self.check_gc();
        let id = self
            .object_pool
            .alloc_userdata(LuaUserdata::new(size), &mut self.gc);
        LuaValue::userdata(id)
    }

    pub fn new_thread(&mut self) -> LuaValue {
        self.check_gc();
        let id = self.object_pool.alloc_thread(LuaThread::new(), &mut self.gc);
        LuaValue::thread(id)
    }

    // ============ Current-thread stack shorthand ============

    #[inline(always)]
    pub(crate) fn th(&self) -> &LuaThread {
        self.object_pool
            .thread(self.current_thread)
            .expect("current thread must exist")
    }

    #[inline(always)]
    pub(crate) fn th_mut(&mut self) -> &mut LuaThread {
        self.object_pool
            .thread_mut(self.current_thread)
            .expect("current thread must exist")
    }

    /// Grow the current thread's stack to hold `needed` slots, against the
    /// hard limit.
    pub(crate) fn grow_stack(&mut self, needed: usize) -> LuaResult<()> {
        if needed > self.options.max_stack {
            return Err(self.rt_error("stack overflow".to_string()));
        }
        let th = self.th_mut();
        if th.stack.len() < needed {
            th.stack.resize(needed, LuaValue::nil());
        }
        Ok(())
    }

    // ============ Errors ============

    /// Raise a runtime error with a message string. Returns the error kind
    /// so call sites read `return Err(vm.rt_error(...))`.
    pub(crate) fn rt_error(&mut self, msg: String) -> LuaError {
        self.error_value = self.new_string(&msg);
        LuaError::Runtime
    }

    pub(crate) fn syntax_error(&mut self, msg: String) -> LuaError {
        self.error_value = self.new_string(&msg);
        LuaError::Syntax
    }

    pub(crate) fn memory_error(&mut self) -> LuaError {
        self.error_value = self.memerr_msg;
        LuaError::Memory
    }

    /// Raise with an arbitrary error value (the `error` builtin).
    pub(crate) fn raise(&mut self, value: LuaValue) -> LuaError {
        self.error_value = value;
        LuaError::Runtime
    }

    /// The payload of the error currently unwinding, consumed by whoever
    /// catches it.
    pub fn take_error_value(&mut self) -> LuaValue {
        std::mem::replace(&mut self.error_value, LuaValue::nil())
    }

    /// Human-readable error text, for hosts that only want a message.
    pub fn error_text(&mut self) -> String {
        let v = self.take_error_value();
        match self.str_text(v) {
            Some(s) => s.to_string(),
            None => format!("(error object is a {} value)", v.type_name()),
        }
    }

    pub fn set_panic(&mut self, handler: Option<CFunction>) -> Option<CFunction> {
        std::mem::replace(&mut self.panic, handler)
    }

    // ============ GC driving ============

    fn gc_params(&self) -> GcParams {
        let mut roots: Vec<LuaValue> = Vec::with_capacity(TmKind::COUNT + 16);
        roots.push(LuaValue::table(self.registry));
        roots.push(LuaValue::table(self.globals));
        roots.push(LuaValue::thread(self.main_thread));
        for &t in &self.thread_chain {
            roots.push(LuaValue::thread(t));
        }
        roots.extend_from_slice(&self.tm_names);
        for mt in self.type_metatables.iter().flatten() {
            roots.push(LuaValue::table(*mt));
        }
        roots.push(self.error_value);
        roots.push(self.memerr_msg);
        GcParams {
            roots,
            mode_key: self.tm_names[TmKind::Mode as usize],
        }
    }

    /// Collector safe point: allocation sites and the dispatch loop call
    /// this when debt is positive.
    pub(crate) fn check_gc(&mut self) {
        if !self.gc.should_step() {
            return;
        }
        let params = self.gc_params();
        let pending = self
            .gc
            .step(&mut self.object_pool, &mut self.interner, &params);
        self.run_finalizers(pending);
        if let Some(limit) = self.options.memory_limit {
            if self.gc.total_bytes() > limit {
                self.emergency_collect();
            }
        }
    }

    /// Heap still over the configured ceiling after an emergency
    /// collection: the next safe point raises a memory error.
    pub(crate) fn memory_exhausted(&self) -> bool {
        match self.options.memory_limit {
            Some(limit) => self.gc.total_bytes() > limit,
            None => false,
        }
    }

    /// Emergency collection: full cycle, finalizers suppressed.
    pub(crate) fn emergency_collect(&mut self) {
        tracing::debug!(total_bytes = self.gc.total_bytes(), "emergency collection");
        let params = self.gc_params();
        let _ = self
            .gc
            .full_collect(&mut self.object_pool, &mut self.interner, &params, true);
    }

    pub fn full_gc(&mut self) {
        let params = self.gc_params();
        let pending =
            self.gc
                .full_collect(&mut self.object_pool, &mut self.interner, &params, false);
        self.run_finalizers(pending);
    }

    /// Call __gc on each condemned object, under protection; a raising
    /// finalizer surfaces as a GcMetamethod error status on the next API
    /// boundary rather than unwinding the mutator.
    fn run_finalizers(&mut self, pending: Vec<LuaValue>) {
        for obj in pending {
            let mm = self.get_metamethod(obj, TmKind::Gc);
            if mm.is_nil() {
                continue;
            }
            if let Err(_e) = self.call_value_protected_quiet(mm, &[obj]) {
                let inner = self.take_error_value();
                let text = self
                    .str_text(inner)
                    .unwrap_or("(non-string error)")
                    .to_string();
                let msg = format!("error in __gc metamethod ({})", text);
                self.error_value = self.new_string(&msg);
                tracing::debug!(message = %msg, "finalizer raised");
            }
        }
    }

    // ============ Compilation & execution ============

    /// Compile a source chunk to a prototype.
    pub fn compile(&mut self, source: &str, chunk_name: &str) -> LuaResult<ProtoId> {
        compiler::compile(self, source, chunk_name)
    }

    /// Compile and wrap in a closure whose first upvalue (_ENV) is the
    /// globals table.
    pub fn load_chunk(&mut self, source: &str, chunk_name: &str) -> LuaResult<LuaValue> {
        let proto = self.compile(source, chunk_name)?;
        let env = LuaValue::table(self.globals);
        let env_cell = self
            .object_pool
            .alloc_upvalue(UpvalueState::Closed(env), &mut self.gc);
        let closure = Closure::Lua(LuaClosure {
            proto,
            upvalues: vec![env_cell],
        });
        let id = self.object_pool.alloc_closure(closure, &mut self.gc);
        Ok(LuaValue::function(id))
    }

    /// Compile and run a chunk on the main thread, returning its results.
    pub fn execute_string(&mut self, source: &str) -> LuaResult<Vec<LuaValue>> {
        let f = self.load_chunk(source, "chunk")?;
        self.call_value(f, &[])
    }

    /// Coroutine status of a thread value, for the host surface.
    pub fn thread_status(&self, v: LuaValue) -> Option<ThreadStatus> {
        Some(self.object_pool.thread(v.as_thread_id()?)?.status)
    }
}

/// Index into the per-kind metatable vector.
fn type_metatable_index(v: LuaValue) -> usize {
    use crate::lua_value::LuaValueKind as K;
    match v.kind() {
        K::Nil => 0,
        K::Boolean => 1,
        K::LightUserdata | K::Userdata => 2,
        K::Integer | K::Float => 3,
        K::String => 4,
        K::Table => 5,
        K::Function | K::CFunction => 6,
        K::Thread => 7,
        K::DeadKey => 8,
    }
}
