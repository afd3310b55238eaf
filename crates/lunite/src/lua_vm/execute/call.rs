// Call engine (ldo.c): frame setup and teardown, protected calls,
// upvalue capture/closing, and the resume/yield transfer between threads.
//
// Lua-to-Lua calls never recurse in Rust: the dispatch loop just pushes a
// frame and continues. Rust recursion happens only where a host function
// (or a metamethod invoked from an instruction) re-enters the dispatch
// loop; yields may not cross such a boundary unless the host frame left a
// continuation.

use crate::gc::{GcId, UpvalueId, UpvalueState};
use crate::lua_value::{Closure, LuaValue, ThreadStatus};
use crate::lua_vm::execute::lua_execute;
use crate::lua_vm::{CallInfo, CFunction, LuaError, LuaResult, LuaVM, TmKind};

enum Callee {
    Host(CFunction),
    Lua(crate::gc::FunctionId),
    NotCallable,
}

impl LuaVM {
    fn classify_callee(&self, f: LuaValue) -> Callee {
        if let Some(cf) = f.as_cfunction() {
            return Callee::Host(cf);
        }
        if let Some(fid) = f.as_function_id() {
            return match self.object_pool.closure(fid) {
                Some(Closure::Lua(_)) => Callee::Lua(fid),
                Some(Closure::Host(h)) => Callee::Host(h.f),
                None => Callee::NotCallable,
            };
        }
        Callee::NotCallable
    }

    /// Prepare a call to stack[func_slot] (luaD_precall). Returns true if
    /// a Lua frame was pushed for the dispatch loop to run; host functions
    /// execute right here.
    pub(crate) fn precall(&mut self, func_slot: usize, nresults: i32) -> LuaResult<bool> {
        loop {
            let f = self.th().get(func_slot);
            match self.classify_callee(f) {
                Callee::Host(host_fn) => {
                    if self.th().call_depth() >= self.options.max_call_depth {
                        return Err(self.rt_error("stack overflow".to_string()));
                    }
                    let base = func_slot + 1;
                    let mut ci = CallInfo::new_host(f, func_slot, base, self.th().top());
                    ci.nresults = nresults;
                    self.th_mut().frames.push(ci);
                    let r = self.enter_host(host_fn);
                    match r {
                        Ok(n) => {
                            self.finish_host_call(n as usize);
                            return Ok(false);
                        }
                        Err(LuaError::Yield) => {
                            self.suspend_host_frame();
                            return Err(LuaError::Yield);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Callee::Lua(fid) => {
                    if self.th().call_depth() >= self.options.max_call_depth {
                        return Err(self.rt_error("stack overflow".to_string()));
                    }
                    let proto = {
                        let c = self.object_pool.closure(fid);
                        let Some(Closure::Lua(lc)) = c else {
                            return Err(self.rt_error("corrupt closure".to_string()));
                        };
                        match self.object_pool.proto(lc.proto) {
                            Some(p) => p,
                            None => {
                                return Err(self.rt_error("corrupt closure".to_string()))
                            }
                        }
                    };
                    let nparams = proto.num_params as usize;
                    let maxstack = proto.max_stack_size as usize;
                    let mut n = self.th().top() - func_slot - 1;
                    while n < nparams {
                        self.th_mut().push(LuaValue::nil());
                        n += 1;
                    }
                    let (base, num_varargs) = if proto.is_vararg {
                        // move the fixed parameters above the varargs so
                        // registers stay contiguous (adjust_varargs)
                        let fixed_start = func_slot + 1;
                        for i in 0..nparams {
                            let v = self.th().get(fixed_start + i);
                            self.th_mut().push(v);
                            self.th_mut().set(fixed_start + i, LuaValue::nil());
                        }
                        (self.th().top() - nparams, (n - nparams) as u32)
                    } else {
                        (func_slot + 1, 0)
                    };
                    let top = base + maxstack;
                    self.grow_stack(top)?;
                    self.th_mut().set_top(top);
                    let mut ci = CallInfo::new_lua(f, func_slot, base, top);
                    ci.nresults = nresults;
                    ci.num_varargs = num_varargs;
                    self.th_mut().frames.push(ci);
                    return Ok(true);
                }
                Callee::NotCallable => {
                    // try __call: the original value becomes the first
                    // argument of the metamethod
                    let mm = self.get_metamethod(f, TmKind::Call);
                    if mm.is_nil() {
                        let msg = format!("attempt to call a {} value", f.type_name());
                        return Err(self.rt_error(msg));
                    }
                    self.th_mut().stack.insert(func_slot, mm);
                }
            }
        }
    }

    #[inline]
    fn enter_host(&mut self, host_fn: CFunction) -> LuaResult<u32> {
        if self.ncalls >= self.options.max_call_depth {
            return Err(self.rt_error("C stack overflow".to_string()));
        }
        self.ncalls += 1;
        let r = host_fn(self);
        self.ncalls -= 1;
        r
    }

    /// A host function yielded. If it registered a continuation the frame
    /// stays for the next resume; otherwise the frame dissolves and the
    /// resume values will stand in for the call's results.
    fn suspend_host_frame(&mut self) {
        let has_cont = self
            .th()
            .current_frame()
            .map(|ci| ci.continuation.is_some())
            .unwrap_or(false);
        if !has_cont {
            if let Some(ci) = self.th_mut().frames.pop() {
                let th = self.th_mut();
                th.resume_slot = ci.func_slot;
                th.resume_nresults = ci.nresults;
            }
        }
    }

    /// Collect a finished host call's results from the stack top and slot
    /// them in at the call position (luaD_poscall for C frames).
    pub(crate) fn finish_host_call(&mut self, n: usize) {
        let len = self.th().top();
        let first = len.saturating_sub(n);
        let results: Vec<LuaValue> = self.th().stack[first..len].to_vec();
        if let Some(ci) = self.th_mut().frames.pop() {
            self.deliver_results(ci.func_slot, ci.nresults, results);
        }
    }

    /// Place call results at `slot`, honoring the requested count, and
    /// restore the enclosing Lua frame's top when the count is fixed.
    pub(crate) fn deliver_results(&mut self, slot: usize, wanted: i32, results: Vec<LuaValue>) {
        let th = self.th_mut();
        th.set_top(slot);
        if wanted < 0 {
            for v in results {
                th.push(v);
            }
        } else {
            for i in 0..wanted as usize {
                th.push(results.get(i).copied().unwrap_or_else(LuaValue::nil));
            }
            let lua_top = th
                .current_frame()
                .filter(|ci| ci.is_lua())
                .map(|ci| ci.top);
            if let Some(top) = lua_top {
                th.set_top(top);
            }
        }
    }

    // ============ Host-facing call entry points ============

    /// Call a value with arguments, returning all results.
    pub fn call_value(&mut self, f: LuaValue, args: &[LuaValue]) -> LuaResult<Vec<LuaValue>> {
        let func_slot = self.th().top();
        self.th_mut().push(f);
        for &a in args {
            self.th_mut().push(a);
        }
        self.call_at(func_slot, -1)
    }

    /// Run the call set up at `func_slot`; on return the results have been
    /// removed from the stack.
    pub(crate) fn call_at(&mut self, func_slot: usize, nresults: i32) -> LuaResult<Vec<LuaValue>> {
        if self.ncalls >= self.options.max_call_depth {
            return Err(self.rt_error("C stack overflow".to_string()));
        }
        let depth = self.th().call_depth();
        if self.precall(func_slot, nresults)? {
            self.ncalls += 1;
            let r = lua_execute(self, depth);
            self.ncalls -= 1;
            r?;
        }
        let results: Vec<LuaValue> = self.th().stack[func_slot..].to_vec();
        self.th_mut().set_top(func_slot);
        Ok(results)
    }

    /// Protected call (luaD_pcall): on error, unwind the frames and stack
    /// to the recorded point, close upvalues above it, and run the
    /// optional message handler over the error value.
    pub fn call_value_protected(
        &mut self,
        f: LuaValue,
        args: &[LuaValue],
        handler: Option<LuaValue>,
    ) -> LuaResult<Vec<LuaValue>> {
        let saved_depth = self.th().call_depth();
        let saved_top = self.th().top();
        match self.call_value(f, args) {
            Ok(r) => Ok(r),
            Err(LuaError::Yield) => Err(LuaError::Yield),
            Err(e) => {
                self.close_upvalues(saved_top);
                self.th_mut().frames.truncate(saved_depth);
                self.th_mut().set_top(saved_top);
                let err_value = self.take_error_value();
                let (kind, final_value) = match handler {
                    Some(h) if e != LuaError::Memory => {
                        match self.call_value(h, &[err_value]) {
                            Ok(r) => (e, r.into_iter().next().unwrap_or_else(LuaValue::nil)),
                            Err(_) => {
                                // the handler itself raised
                                self.th_mut().frames.truncate(saved_depth);
                                self.th_mut().set_top(saved_top);
                                (LuaError::Handler, self.take_error_value())
                            }
                        }
                    }
                    _ => (e, err_value),
                };
                self.error_value = final_value;
                Err(kind)
            }
        }
    }

    /// Convenience used by finalizer dispatch: protected call discarding
    /// results.
    pub(crate) fn call_value_protected_quiet(
        &mut self,
        f: LuaValue,
        args: &[LuaValue],
    ) -> LuaResult<()> {
        self.call_value_protected(f, args, None).map(|_| ())
    }

    // ============ Upvalues ============

    pub(crate) fn upvalue_value(&self, id: UpvalueId) -> LuaValue {
        match self.object_pool.upvalue(id).map(|uv| &uv.state) {
            Some(UpvalueState::Open {
                thread,
                stack_index,
            }) => self
                .object_pool
                .thread(*thread)
                .map(|th| th.get(*stack_index))
                .unwrap_or_else(LuaValue::nil),
            Some(UpvalueState::Closed(v)) => *v,
            None => LuaValue::nil(),
        }
    }

    pub(crate) fn set_upvalue_value(&mut self, id: UpvalueId, v: LuaValue) {
        let state = self.object_pool.upvalue(id).map(|uv| uv.state.clone());
        match state {
            Some(UpvalueState::Open {
                thread,
                stack_index,
            }) => {
                if let Some(th) = self.object_pool.thread_mut(thread) {
                    th.set(stack_index, v);
                }
            }
            Some(UpvalueState::Closed(_)) => {
                if let Some(uv) = self.object_pool.upvalue_mut(id) {
                    uv.state = UpvalueState::Closed(v);
                }
                self.gc
                    .barrier_forward(&mut self.object_pool, GcId::Upvalue(id), v);
            }
            None => {}
        }
    }

    /// Find or create the open upvalue aliasing the current thread's
    /// stack slot `level` (luaF_findupval). The open list stays sorted by
    /// stack index, highest first.
    pub(crate) fn find_upvalue(&mut self, level: usize) -> UpvalueId {
        let open: Vec<UpvalueId> = self.th().open_upvalues.clone();
        let mut insert_at = open.len();
        for (i, &uv) in open.iter().enumerate() {
            match self.object_pool.upvalue(uv).and_then(|u| u.open_index()) {
                Some(idx) if idx == level => return uv,
                Some(idx) if idx < level => {
                    insert_at = i;
                    break;
                }
                _ => {}
            }
        }
        let thread = self.current_thread;
        let id = self.object_pool.alloc_upvalue(
            UpvalueState::Open {
                thread,
                stack_index: level,
            },
            &mut self.gc,
        );
        self.th_mut().open_upvalues.insert(insert_at, id);
        id
    }

    /// Close every open upvalue at or above `level` (luaF_close): the
    /// stack value moves into the cell.
    pub(crate) fn close_upvalues(&mut self, level: usize) {
        loop {
            let Some(&uv) = self.th().open_upvalues.first() else {
                return;
            };
            let idx = match self.object_pool.upvalue(uv).and_then(|u| u.open_index()) {
                Some(i) => i,
                None => {
                    self.th_mut().open_upvalues.remove(0);
                    continue;
                }
            };
            if idx < level {
                return;
            }
            let value = self.th().get(idx);
            self.th_mut().open_upvalues.remove(0);
            if let Some(u) = self.object_pool.upvalue_mut(uv) {
                u.state = UpvalueState::Closed(value);
            }
            self.gc
                .barrier_forward(&mut self.object_pool, GcId::Upvalue(uv), value);
        }
    }

    // ============ Coroutines ============

    /// Create a coroutine over a function value; the callee sits at the
    /// bottom of the new thread's stack until the first resume.
    pub fn create_coroutine(&mut self, f: LuaValue) -> LuaValue {
        let co = self.new_thread();
        if let Some(id) = co.as_thread_id() {
            if let Some(th) = self.object_pool.thread_mut(id) {
                th.push(f);
            }
        }
        co
    }

    /// Resume a coroutine. Returns (true, results|yields) on success,
    /// (false, [error]) on failure; only argument-shape errors raise.
    pub fn resume_thread(
        &mut self,
        co_val: LuaValue,
        args: Vec<LuaValue>,
    ) -> LuaResult<(bool, Vec<LuaValue>)> {
        let Some(co) = co_val.as_thread_id() else {
            return Err(self.rt_error("cannot resume a non-thread value".to_string()));
        };
        let (status, fresh) = match self.object_pool.thread(co) {
            Some(th) => (
                th.status,
                th.status == ThreadStatus::Ok && th.frames.is_empty() && !th.stack.is_empty(),
            ),
            None => (ThreadStatus::Dead, false),
        };
        let resumable = status == ThreadStatus::Suspended || fresh;
        if !resumable {
            let msg = match status {
                ThreadStatus::Dead | ThreadStatus::Ok => "cannot resume dead coroutine",
                _ => "cannot resume non-suspended coroutine",
            };
            let m = self.new_string(msg);
            return Ok((false, vec![m]));
        }

        // switch in
        let prev = self.current_thread;
        let prev_status = self
            .object_pool
            .thread(prev)
            .map(|t| t.status)
            .unwrap_or(ThreadStatus::Ok);
        if let Some(t) = self.object_pool.thread_mut(prev) {
            t.status = ThreadStatus::Normal;
        }
        self.current_thread = co;
        self.thread_chain.push(co);
        self.chain_ncalls.push(self.ncalls);
        if let Some(t) = self.object_pool.thread_mut(co) {
            t.status = ThreadStatus::Running;
        }

        let outcome = self.resume_body(fresh, args);

        // switch out
        self.thread_chain.pop();
        self.chain_ncalls.pop();
        self.current_thread = prev;
        if let Some(t) = self.object_pool.thread_mut(prev) {
            t.status = prev_status;
        }

        match outcome {
            Ok(()) => {
                let results = match self.object_pool.thread_mut(co) {
                    Some(t) => {
                        t.status = ThreadStatus::Dead;
                        std::mem::take(&mut t.stack)
                    }
                    None => Vec::new(),
                };
                Ok((true, results))
            }
            Err(LuaError::Yield) => {
                let results = match self.object_pool.thread_mut(co) {
                    Some(t) => {
                        t.status = ThreadStatus::Suspended;
                        std::mem::take(&mut t.transfer)
                    }
                    None => Vec::new(),
                };
                Ok((true, results))
            }
            Err(_e) => {
                if let Some(t) = self.object_pool.thread_mut(co) {
                    t.status = ThreadStatus::Dead;
                }
                let ev = self.take_error_value();
                Ok((false, vec![ev]))
            }
        }
    }

    fn resume_body(&mut self, fresh: bool, args: Vec<LuaValue>) -> LuaResult<()> {
        if fresh {
            for a in args {
                self.th_mut().push(a);
            }
            if self.precall(0, -1)? {
                lua_execute(self, 0)?;
            }
            return Ok(());
        }
        // suspended: three shapes, depending on where the yield happened
        let top_is_host_cont = self
            .th()
            .current_frame()
            .map(|ci| ci.is_host() && ci.continuation.is_some())
            .unwrap_or(false);
        if top_is_host_cont {
            for a in args {
                self.th_mut().push(a);
            }
            return self.run_continuations();
        }
        if self.th().call_depth() == 0 {
            // a bare host yield with no way to continue: the resume
            // values become the final results
            let th = self.th_mut();
            th.stack = args;
            return Ok(());
        }
        let (slot, wanted) = {
            let th = self.th();
            (th.resume_slot, th.resume_nresults)
        };
        self.deliver_results(slot, wanted, args);
        lua_execute(self, 0)
    }

    /// Drain host frames whose continuations are ready to run, then fall
    /// back into the dispatch loop.
    fn run_continuations(&mut self) -> LuaResult<()> {
        loop {
            let cont = match self.th().current_frame() {
                Some(ci) if ci.is_host() => ci.continuation,
                _ => break,
            };
            let Some((k, _ctx)) = cont else { break };
            if let Some(ci) = self.th_mut().current_frame_mut() {
                ci.continuation = None;
            }
            let r = self.enter_host(k);
            match r {
                Ok(n) => self.finish_host_call(n as usize),
                Err(LuaError::Yield) => {
                    self.suspend_host_frame();
                    return Err(LuaError::Yield);
                }
                Err(e) => return Err(e),
            }
        }
        if self.th().call_depth() > 0 {
            lua_execute(self, 0)
        } else {
            Ok(())
        }
    }

    /// A callee returned into a host frame left behind by yieldk: run its
    /// continuation as the rest of the original call.
    pub(crate) fn run_pending_continuation(&mut self) -> LuaResult<()> {
        let cont = self
            .th()
            .current_frame()
            .and_then(|ci| if ci.is_host() { ci.continuation } else { None });
        match cont {
            Some((k, _ctx)) => {
                if let Some(ci) = self.th_mut().current_frame_mut() {
                    ci.continuation = None;
                }
                match self.enter_host(k) {
                    Ok(n) => {
                        self.finish_host_call(n as usize);
                        Ok(())
                    }
                    Err(LuaError::Yield) => {
                        self.suspend_host_frame();
                        Err(LuaError::Yield)
                    }
                    Err(e) => Err(e),
                }
            }
            None => Err(self.rt_error("cannot execute a non-Lua frame".to_string())),
        }
    }

    /// Yield the running coroutine with the given values. Returns the
    /// error to raise (always `Yield` on the legal path).
    pub(crate) fn do_yield(&mut self, values: Vec<LuaValue>) -> LuaError {
        if self.thread_chain.len() <= 1 {
            return self.rt_error("attempt to yield from outside a coroutine".to_string());
        }
        let base = *self.chain_ncalls.last().unwrap_or(&0);
        // the yielding host function itself accounts for one level
        if self.ncalls != base + 1 {
            return self.rt_error("attempt to yield across a C-call boundary".to_string());
        }
        self.th_mut().transfer = values;
        LuaError::Yield
    }

    /// Yield with a continuation: the current host frame survives the
    /// suspension and `k` runs on resume (lua_yieldk).
    pub(crate) fn do_yieldk(
        &mut self,
        values: Vec<LuaValue>,
        k: CFunction,
        ctx: i64,
    ) -> LuaError {
        if let Some(ci) = self.th_mut().current_frame_mut() {
            ci.continuation = Some((k, ctx));
        }
        self.do_yield(values)
    }
}
