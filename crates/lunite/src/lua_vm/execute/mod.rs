// Bytecode dispatch loop (lvm.c).
//
// Single-loop architecture: a Lua-to-Lua call pushes a CallInfo and
// continues the outer loop with the callee's frame; returns pop and
// continue with the caller. No Rust recursion happens between two Lua
// frames, which is what lets a coroutine suspend mid-call-chain - the
// frame list carries everything needed to re-enter.
//
// The program counter is advanced before an instruction executes, so
// relative jumps are against the following instruction.

pub mod call;
pub mod metamethod;

use std::rc::Rc;

use crate::gc::{FunctionId, ProtoId, UpvalueId};
use crate::lua_value::{Closure, LuaClosure, LuaValue, Proto, MASK_CALL, MASK_LINE, MASK_RET};
use crate::lua_vm::opcode::{fb2int, index_k, is_k, OpCode};
use crate::lua_vm::{LuaResult, LuaVM, TmKind};

/// Array-part batch size for SETLIST (LFIELDS_PER_FLUSH).
pub const FIELDS_PER_FLUSH: usize = 50;

/// Hook event codes (lua.h LUA_HOOK*).
pub mod hook_event {
    pub const CALL: u8 = 0;
    pub const RET: u8 = 1;
    pub const LINE: u8 = 2;
    pub const COUNT: u8 = 3;
    pub const TAILCALL: u8 = 4;
}

#[inline(always)]
fn rk(vm: &LuaVM, k: &[LuaValue], base: usize, x: u32) -> LuaValue {
    if is_k(x) {
        k[index_k(x) as usize]
    } else {
        vm.th().stack[base + x as usize]
    }
}

#[inline(always)]
fn rget(vm: &LuaVM, i: usize) -> LuaValue {
    vm.th().stack[i]
}

#[inline(always)]
fn rset(vm: &mut LuaVM, i: usize, v: LuaValue) {
    vm.th_mut().stack[i] = v;
}

/// Execute the current thread until its call depth returns to
/// `target_depth` (luaV_execute; protected and nested entries pass the
/// depth they started from).
pub fn lua_execute(vm: &mut LuaVM, target_depth: usize) -> LuaResult<()> {
    'startfunc: loop {
        let depth = vm.th().call_depth();
        if depth <= target_depth {
            return Ok(());
        }

        // ===== load the running frame's context =====
        let (func, mut pc, base, num_varargs, is_host) = {
            let ci = match vm.th().current_frame() {
                Some(ci) => ci,
                None => return Ok(()),
            };
            (
                ci.func,
                ci.pc as usize,
                ci.base,
                ci.num_varargs as usize,
                ci.is_host(),
            )
        };
        if is_host {
            // a callee returned into a host frame suspended by yieldk:
            // its continuation finishes the call
            vm.run_pending_continuation()?;
            continue 'startfunc;
        }
        let Some(fid) = func.as_function_id() else {
            return Err(vm.rt_error("cannot execute a non-Lua frame".to_string()));
        };
        let (proto, upvals): (Rc<Proto>, Vec<UpvalueId>) = {
            match vm.object_pool.closure(fid) {
                Some(Closure::Lua(LuaClosure { proto, upvalues })) => {
                    match vm.object_pool.proto(*proto) {
                        Some(p) => (p, upvalues.clone()),
                        None => return Err(vm.rt_error("corrupt closure".to_string())),
                    }
                }
                _ => return Err(vm.rt_error("cannot execute a non-Lua frame".to_string())),
            }
        };
        let code = &proto.code;
        let k = &proto.constants;

        macro_rules! sync_pc {
            () => {
                if let Some(ci) = vm.th_mut().current_frame_mut() {
                    ci.pc = pc as u32;
                }
            };
        }

        // ===== instruction loop =====
        loop {
            if vm.gc.should_step() {
                sync_pc!();
                vm.check_gc();
                if vm.memory_exhausted() {
                    return Err(vm.memory_error());
                }
            }
            if vm.th().hook_mask != 0 {
                sync_pc!();
                fire_instruction_hooks(vm, &proto, pc)?;
            }

            let inst = code[pc];
            pc += 1;
            let a = inst.a() as usize;

            match inst.opcode() {
                OpCode::Move => {
                    let v = rget(vm, base + inst.b() as usize);
                    rset(vm, base + a, v);
                }
                OpCode::LoadK => {
                    rset(vm, base + a, k[inst.bx() as usize]);
                }
                OpCode::LoadKX => {
                    let ax = code[pc].ax_arg() as usize;
                    pc += 1;
                    rset(vm, base + a, k[ax]);
                }
                OpCode::LoadBool => {
                    rset(vm, base + a, LuaValue::boolean(inst.b() != 0));
                    if inst.c() != 0 {
                        pc += 1;
                    }
                }
                OpCode::LoadNil => {
                    for i in 0..=inst.b() as usize {
                        rset(vm, base + a + i, LuaValue::nil());
                    }
                }
                OpCode::GetUpval => {
                    let v = vm.upvalue_value(upvals[inst.b() as usize]);
                    rset(vm, base + a, v);
                }
                OpCode::SetUpval => {
                    let v = rget(vm, base + a);
                    vm.set_upvalue_value(upvals[inst.b() as usize], v);
                }
                OpCode::GetTabUp => {
                    let t = vm.upvalue_value(upvals[inst.b() as usize]);
                    let key = rk(vm, k, base, inst.c());
                    let v = vm.index_value(t, key)?;
                    rset(vm, base + a, v);
                }
                OpCode::GetTable => {
                    let t = rget(vm, base + inst.b() as usize);
                    let key = rk(vm, k, base, inst.c());
                    let v = vm.index_value(t, key)?;
                    rset(vm, base + a, v);
                }
                OpCode::SetTabUp => {
                    let t = vm.upvalue_value(upvals[a]);
                    let key = rk(vm, k, base, inst.b());
                    let v = rk(vm, k, base, inst.c());
                    vm.set_index_value(t, key, v)?;
                }
                OpCode::SetTable => {
                    let t = rget(vm, base + a);
                    let key = rk(vm, k, base, inst.b());
                    let v = rk(vm, k, base, inst.c());
                    vm.set_index_value(t, key, v)?;
                }
                OpCode::NewTable => {
                    let narr = fb2int(inst.b()) as usize;
                    let nrec = fb2int(inst.c()) as usize;
                    let t = vm.new_table(narr, nrec);
                    rset(vm, base + a, t);
                }
                OpCode::Self_ => {
                    let obj = rget(vm, base + inst.b() as usize);
                    rset(vm, base + a + 1, obj);
                    let key = rk(vm, k, base, inst.c());
                    let v = vm.index_value(obj, key)?;
                    rset(vm, base + a, v);
                }
                OpCode::Add => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let r = if let (Some(i), Some(j)) = (x.as_integer(), y.as_integer()) {
                        LuaValue::integer(i.wrapping_add(j))
                    } else if let (Some(i), Some(j)) = (x.as_number(), y.as_number()) {
                        LuaValue::float(i + j)
                    } else {
                        vm.arith(TmKind::Add, x, y)?
                    };
                    rset(vm, base + a, r);
                }
                OpCode::Sub => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let r = if let (Some(i), Some(j)) = (x.as_integer(), y.as_integer()) {
                        LuaValue::integer(i.wrapping_sub(j))
                    } else if let (Some(i), Some(j)) = (x.as_number(), y.as_number()) {
                        LuaValue::float(i - j)
                    } else {
                        vm.arith(TmKind::Sub, x, y)?
                    };
                    rset(vm, base + a, r);
                }
                OpCode::Mul => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let r = if let (Some(i), Some(j)) = (x.as_integer(), y.as_integer()) {
                        LuaValue::integer(i.wrapping_mul(j))
                    } else if let (Some(i), Some(j)) = (x.as_number(), y.as_number()) {
                        LuaValue::float(i * j)
                    } else {
                        vm.arith(TmKind::Mul, x, y)?
                    };
                    rset(vm, base + a, r);
                }
                OpCode::Mod => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let r = vm.arith(TmKind::Mod, x, y)?;
                    rset(vm, base + a, r);
                }
                OpCode::Pow => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let r = vm.arith(TmKind::Pow, x, y)?;
                    rset(vm, base + a, r);
                }
                OpCode::Div => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let r = if let (Some(i), Some(j)) = (x.as_number(), y.as_number()) {
                        LuaValue::float(i / j)
                    } else {
                        vm.arith(TmKind::Div, x, y)?
                    };
                    rset(vm, base + a, r);
                }
                OpCode::IDiv => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let r = vm.arith(TmKind::IDiv, x, y)?;
                    rset(vm, base + a, r);
                }
                OpCode::BAnd => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let r = vm.arith(TmKind::BAnd, x, y)?;
                    rset(vm, base + a, r);
                }
                OpCode::BOr => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let r = vm.arith(TmKind::BOr, x, y)?;
                    rset(vm, base + a, r);
                }
                OpCode::BXor => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let r = vm.arith(TmKind::BXor, x, y)?;
                    rset(vm, base + a, r);
                }
                OpCode::Shl => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let r = vm.arith(TmKind::Shl, x, y)?;
                    rset(vm, base + a, r);
                }
                OpCode::Shr => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let r = vm.arith(TmKind::Shr, x, y)?;
                    rset(vm, base + a, r);
                }
                OpCode::Unm => {
                    let x = rget(vm, base + inst.b() as usize);
                    let r = if let Some(i) = x.as_integer() {
                        LuaValue::integer(i.wrapping_neg())
                    } else if let Some(f) = x.as_float() {
                        LuaValue::float(-f)
                    } else {
                        vm.arith(TmKind::Unm, x, x)?
                    };
                    rset(vm, base + a, r);
                }
                OpCode::BNot => {
                    let x = rget(vm, base + inst.b() as usize);
                    let r = vm.arith(TmKind::BNot, x, x)?;
                    rset(vm, base + a, r);
                }
                OpCode::Not => {
                    let x = rget(vm, base + inst.b() as usize);
                    rset(vm, base + a, LuaValue::boolean(!x.is_truthy()));
                }
                OpCode::Len => {
                    let x = rget(vm, base + inst.b() as usize);
                    let r = vm.length_of(x)?;
                    rset(vm, base + a, r);
                }
                OpCode::Concat => {
                    let b = base + inst.b() as usize;
                    let c = base + inst.c() as usize;
                    let mut acc = rget(vm, c);
                    let mut i = c;
                    while i > b {
                        i -= 1;
                        let lhs = rget(vm, i);
                        acc = vm.concat_pair(lhs, acc)?;
                    }
                    rset(vm, base + a, acc);
                }
                OpCode::Jmp => {
                    pc = (pc as i64 + inst.sbx() as i64) as usize;
                    if a != 0 {
                        vm.close_upvalues(base + a - 1);
                    }
                }
                OpCode::Eq => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let cond = vm.value_equals(x, y)?;
                    if cond != (a != 0) {
                        pc += 1;
                    }
                }
                OpCode::Lt => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let cond = vm.less_than(x, y)?;
                    if cond != (a != 0) {
                        pc += 1;
                    }
                }
                OpCode::Le => {
                    let x = rk(vm, k, base, inst.b());
                    let y = rk(vm, k, base, inst.c());
                    let cond = vm.less_equal(x, y)?;
                    if cond != (a != 0) {
                        pc += 1;
                    }
                }
                OpCode::Test => {
                    let v = rget(vm, base + a);
                    if v.is_truthy() != (inst.c() != 0) {
                        pc += 1;
                    }
                }
                OpCode::TestSet => {
                    let v = rget(vm, base + inst.b() as usize);
                    if v.is_truthy() == (inst.c() != 0) {
                        rset(vm, base + a, v);
                    } else {
                        pc += 1;
                    }
                }
                OpCode::Call => {
                    let func_slot = base + a;
                    let b = inst.b();
                    if b != 0 {
                        vm.th_mut().set_top(func_slot + b as usize);
                    }
                    let nres = inst.c() as i32 - 1;
                    sync_pc!();
                    if vm.precall(func_slot, nres)? {
                        maybe_call_hook(vm)?;
                        continue 'startfunc;
                    }
                    // host call finished in place
                }
                OpCode::TailCall => {
                    let src = base + a;
                    let b = inst.b();
                    let nargs = if b == 0 {
                        vm.th().top() - src - 1
                    } else {
                        b as usize - 1
                    };
                    sync_pc!();
                    vm.close_upvalues(base);
                    let (func_slot, nres) = {
                        let ci = vm.th().current_frame().expect("frame exists");
                        (ci.func_slot, ci.nresults)
                    };
                    for i in 0..=nargs {
                        let v = rget(vm, src + i);
                        rset(vm, func_slot + i, v);
                    }
                    vm.th_mut().set_top(func_slot + nargs + 1);
                    vm.th_mut().frames.pop();
                    if vm.precall(func_slot, nres)? {
                        if let Some(ci) = vm.th_mut().current_frame_mut() {
                            ci.set_tail();
                        }
                        continue 'startfunc;
                    }
                    // a host tail call is a completed return
                    if vm.th().call_depth() <= target_depth {
                        return Ok(());
                    }
                    continue 'startfunc;
                }
                OpCode::Return => {
                    let first = base + a;
                    let b = inst.b();
                    let n = if b == 0 {
                        vm.th().top() - first
                    } else {
                        b as usize - 1
                    };
                    vm.close_upvalues(base);
                    maybe_return_hook(vm)?;
                    let results: Vec<LuaValue> =
                        vm.th().stack[first..first + n].to_vec();
                    let ci = match vm.th_mut().frames.pop() {
                        Some(ci) => ci,
                        None => return Ok(()),
                    };
                    vm.deliver_results(ci.func_slot, ci.nresults, results);
                    if vm.th().call_depth() <= target_depth {
                        return Ok(());
                    }
                    continue 'startfunc;
                }
                OpCode::ForLoop => {
                    let ra = base + a;
                    let (iv, lim, st) = (rget(vm, ra), rget(vm, ra + 1), rget(vm, ra + 2));
                    if let (Some(i), Some(limit), Some(step)) =
                        (iv.as_integer(), lim.as_integer(), st.as_integer())
                    {
                        if let Some(next) = i.checked_add(step) {
                            let cont = if step > 0 { next <= limit } else { next >= limit };
                            if cont {
                                rset(vm, ra, LuaValue::integer(next));
                                rset(vm, ra + 3, LuaValue::integer(next));
                                pc = (pc as i64 + inst.sbx() as i64) as usize;
                            }
                        }
                    } else {
                        let i = iv.as_number().unwrap_or(f64::NAN);
                        let limit = lim.as_number().unwrap_or(f64::NAN);
                        let step = st.as_number().unwrap_or(f64::NAN);
                        let next = i + step;
                        let cont = if step > 0.0 { next <= limit } else { next >= limit };
                        if cont {
                            rset(vm, ra, LuaValue::float(next));
                            rset(vm, ra + 3, LuaValue::float(next));
                            pc = (pc as i64 + inst.sbx() as i64) as usize;
                        }
                    }
                }
                OpCode::ForPrep => {
                    let ra = base + a;
                    prep_for_loop(vm, ra)?;
                    pc = (pc as i64 + inst.sbx() as i64) as usize;
                }
                OpCode::TForCall => {
                    let ra = base + a;
                    let cb = ra + 3;
                    let (f, s1, s2) = (rget(vm, ra), rget(vm, ra + 1), rget(vm, ra + 2));
                    vm.th_mut().set_top(cb + 3);
                    rset(vm, cb, f);
                    rset(vm, cb + 1, s1);
                    rset(vm, cb + 2, s2);
                    sync_pc!();
                    if vm.precall(cb, inst.c() as i32)? {
                        maybe_call_hook(vm)?;
                        continue 'startfunc;
                    }
                }
                OpCode::TForLoop => {
                    let ra = base + a;
                    let ctrl = rget(vm, ra + 1);
                    if !ctrl.is_nil() {
                        rset(vm, ra, ctrl);
                        pc = (pc as i64 + inst.sbx() as i64) as usize;
                    }
                }
                OpCode::SetList => {
                    let ra = base + a;
                    let mut n = inst.b() as usize;
                    let mut batch = inst.c() as usize;
                    if n == 0 {
                        n = vm.th().top() - ra - 1;
                    }
                    if batch == 0 {
                        batch = code[pc].ax_arg() as usize;
                        pc += 1;
                    }
                    let start = ((batch - 1) * FIELDS_PER_FLUSH) as i64;
                    let Some(tid) = rget(vm, ra).as_table_id() else {
                        return Err(vm.rt_error("SETLIST target is not a table".to_string()));
                    };
                    for i in 1..=n {
                        let v = rget(vm, ra + i);
                        vm.raw_set_i(tid, start + i as i64, v);
                    }
                    let frame_top = vm
                        .th()
                        .current_frame()
                        .map(|ci| ci.top)
                        .unwrap_or_else(|| vm.th().top());
                    vm.th_mut().set_top(frame_top);
                }
                OpCode::Closure => {
                    let pid = proto.protos[inst.bx() as usize];
                    let v = push_closure(vm, pid, &upvals, base)?;
                    rset(vm, base + a, v);
                }
                OpCode::Vararg => {
                    let ra = base + a;
                    let b = inst.b() as usize;
                    let src = base - num_varargs;
                    if b > 0 {
                        for i in 0..b - 1 {
                            let v = if i < num_varargs {
                                rget(vm, src + i)
                            } else {
                                LuaValue::nil()
                            };
                            rset(vm, ra + i, v);
                        }
                    } else {
                        vm.th_mut().set_top(ra + num_varargs);
                        for i in 0..num_varargs {
                            let v = rget(vm, src + i);
                            rset(vm, ra + i, v);
                        }
                    }
                }
                OpCode::ExtraArg => {
                    return Err(vm.rt_error("unexpected EXTRAARG".to_string()));
                }
            }
        }
    }
}

/// Numeric for-loop setup (OP_FORPREP): integer loops subtract the step up
/// front and clamp a float limit; anything non-numeric is an error.
fn prep_for_loop(vm: &mut LuaVM, ra: usize) -> LuaResult<()> {
    // numeric strings are accepted, like every arithmetic context
    let coerce = |vm: &mut LuaVM, i: usize, what: &str| -> LuaResult<LuaValue> {
        let v = rget(vm, i);
        match vm.tonumber_value(v) {
            Some(n) => Ok(n),
            None => Err(vm.rt_error(format!("'for' {} must be a number", what))),
        }
    };
    let init = coerce(vm, ra, "initial value")?;
    let limit = coerce(vm, ra + 1, "limit")?;
    let step = coerce(vm, ra + 2, "step")?;
    if init.is_integer() && step.is_integer() {
        // integer loop: a float limit clamps to the same iteration count
        let i = init.as_integer().unwrap_or(0);
        let st = step.as_integer().unwrap_or(0);
        if st == 0 {
            return Err(vm.rt_error("'for' step is zero".to_string()));
        }
        let lim = match limit.as_integer() {
            Some(l) => l,
            None => {
                let f = limit.as_float().unwrap_or(f64::NAN);
                if f.is_nan() {
                    // a NaN limit never satisfies the loop condition
                    if st > 0 { i64::MIN } else { i64::MAX }
                } else {
                    clamp_for_limit(f, st > 0)
                }
            }
        };
        let skip = if st > 0 { i > lim } else { i < lim };
        if skip {
            // state that fails the first FORLOOP test
            rset(vm, ra, LuaValue::integer(1));
            rset(vm, ra + 1, LuaValue::integer(0));
            rset(vm, ra + 2, LuaValue::integer(1));
            return Ok(());
        }
        if let Some(prepped) = i.checked_sub(st) {
            rset(vm, ra, LuaValue::integer(prepped));
            rset(vm, ra + 1, LuaValue::integer(lim));
            rset(vm, ra + 2, LuaValue::integer(st));
            return Ok(());
        }
        // init - step leaves the integer range; run the loop in floats
    }
    let i = init.as_number().unwrap_or(f64::NAN);
    let l = limit.as_number().unwrap_or(f64::NAN);
    let st = step.as_number().unwrap_or(f64::NAN);
    if st == 0.0 {
        return Err(vm.rt_error("'for' step is zero".to_string()));
    }
    rset(vm, ra, LuaValue::float(i - st));
    rset(vm, ra + 1, LuaValue::float(l));
    rset(vm, ra + 2, LuaValue::float(st));
    Ok(())
}

/// Clamp a float limit into i64 so an integer loop sees the same
/// iterations (forlimit in lvm.c).
fn clamp_for_limit(f: f64, step_positive: bool) -> i64 {
    let adjusted = if step_positive { f.floor() } else { f.ceil() };
    if adjusted >= 9.2233720368547758e18 {
        i64::MAX
    } else if adjusted <= -9.2233720368547758e18 {
        i64::MIN
    } else {
        adjusted as i64
    }
}

/// OP_CLOSURE (pushclosure in lvm.c): capture upvalues per descriptor,
/// reusing the prototype's one-slot cache when every cell still matches.
fn push_closure(
    vm: &mut LuaVM,
    pid: ProtoId,
    parent_upvals: &[UpvalueId],
    base: usize,
) -> LuaResult<LuaValue> {
    let proto = match vm.object_pool.proto(pid) {
        Some(p) => p,
        None => return Err(vm.rt_error("corrupt prototype".to_string())),
    };
    if let Some(cached) = proto.cache.get() {
        if cached_closure_matches(vm, cached, &proto, parent_upvals, base) {
            return Ok(LuaValue::function(cached));
        }
    }
    let mut ups = Vec::with_capacity(proto.upvalues.len());
    for desc in proto.upvalues.iter() {
        let cell = if desc.in_stack {
            vm.find_upvalue(base + desc.index as usize)
        } else {
            parent_upvals[desc.index as usize]
        };
        ups.push(cell);
    }
    vm.check_gc();
    let id = vm.object_pool.alloc_closure(
        Closure::Lua(LuaClosure {
            proto: pid,
            upvalues: ups,
        }),
        &mut vm.gc,
    );
    proto.cache.set(Some(id));
    Ok(LuaValue::function(id))
}

fn cached_closure_matches(
    vm: &LuaVM,
    cached: FunctionId,
    proto: &Proto,
    parent_upvals: &[UpvalueId],
    base: usize,
) -> bool {
    let Some(Closure::Lua(c)) = vm.object_pool.closure(cached) else {
        return false;
    };
    if c.upvalues.len() != proto.upvalues.len() {
        return false;
    }
    for (i, desc) in proto.upvalues.iter().enumerate() {
        if desc.in_stack {
            let want = base + desc.index as usize;
            let open_at = vm
                .object_pool
                .upvalue(c.upvalues[i])
                .and_then(|u| match u.state {
                    crate::gc::UpvalueState::Open {
                        thread,
                        stack_index,
                    } if thread == vm.current_thread => Some(stack_index),
                    _ => None,
                });
            if open_at != Some(want) {
                return false;
            }
        } else if c.upvalues[i] != parent_upvals[desc.index as usize] {
            return false;
        }
    }
    true
}

// ============ Hooks ============

fn fire_instruction_hooks(vm: &mut LuaVM, proto: &Proto, pc: usize) -> LuaResult<()> {
    let fire_count = vm.th_mut().tick_count_hook();
    if fire_count {
        call_hook(vm, hook_event::COUNT, 0)?;
    }
    if vm.th().hook_mask & MASK_LINE != 0 {
        let line = proto.line_at(pc);
        if line != 0 && line != vm.th().hook_last_line {
            vm.th_mut().hook_last_line = line;
            call_hook(vm, hook_event::LINE, line)?;
        }
    }
    Ok(())
}

fn maybe_call_hook(vm: &mut LuaVM) -> LuaResult<()> {
    if vm.th().hook_mask & MASK_CALL != 0 {
        let tail = vm
            .th()
            .current_frame()
            .map(|ci| ci.is_tail())
            .unwrap_or(false);
        let ev = if tail {
            hook_event::TAILCALL
        } else {
            hook_event::CALL
        };
        call_hook(vm, ev, 0)?;
    }
    Ok(())
}

fn maybe_return_hook(vm: &mut LuaVM) -> LuaResult<()> {
    if vm.th().hook_mask & MASK_RET != 0 {
        call_hook(vm, hook_event::RET, 0)?;
    }
    Ok(())
}

fn call_hook(vm: &mut LuaVM, event: u8, line: u32) -> LuaResult<()> {
    let Some(hook) = vm.th().hook else { return Ok(()) };
    vm.hook_event = event;
    vm.hook_line = line;
    // mask the hook while it runs so it cannot re-trigger itself
    let mask = std::mem::take(&mut vm.th_mut().hook_mask);
    let r = hook(vm);
    vm.th_mut().hook_mask = mask;
    r.map(|_| ())
}
