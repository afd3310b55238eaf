// Coroutine module (lcorolib.c): create, resume, yield, status, running,
// wrap, isyieldable.

use crate::lib_registry::LibraryModule;
use crate::lua_vm::api::upvalue_index;
use crate::lua_vm::{LuaError, LuaResult, LuaVM};
use crate::lua_value::{LuaValue, ThreadStatus};

pub fn create_coroutine_lib() -> LibraryModule {
    crate::lib_module!("coroutine", {
        "create" => co_create,
        "resume" => co_resume,
        "yield" => co_yield,
        "status" => co_status,
        "running" => co_running,
        "wrap" => co_wrap,
        "isyieldable" => co_isyieldable,
    })
}

fn co_create(vm: &mut LuaVM) -> LuaResult<u32> {
    let f = vm.index2value(1);
    if !f.is_function() {
        return Err(vm.rt_error(
            "bad argument #1 to 'create' (function expected)".to_string(),
        ));
    }
    let co = vm.create_coroutine(f);
    vm.push(co);
    Ok(1)
}

fn resume_args(vm: &LuaVM, first: usize) -> Vec<LuaValue> {
    let n = vm.get_top() as usize;
    (first..=n).map(|i| vm.index2value(i as i32)).collect()
}

fn co_resume(vm: &mut LuaVM) -> LuaResult<u32> {
    let co = vm.index2value(1);
    if !co.is_thread() {
        return Err(vm.rt_error(
            "bad argument #1 to 'resume' (coroutine expected)".to_string(),
        ));
    }
    let args = resume_args(vm, 2);
    let (ok, results) = vm.resume_thread(co, args)?;
    let count = results.len() as u32;
    vm.push_boolean(ok);
    for r in results {
        vm.push(r);
    }
    Ok(count + 1)
}

fn co_yield(vm: &mut LuaVM) -> LuaResult<u32> {
    let n = vm.get_top() as usize;
    Err(vm.api_yield(n))
}

fn co_status(vm: &mut LuaVM) -> LuaResult<u32> {
    let co = vm.index2value(1);
    let Some(id) = co.as_thread_id() else {
        return Err(vm.rt_error(
            "bad argument #1 to 'status' (coroutine expected)".to_string(),
        ));
    };
    let status = vm
        .thread_status(co)
        .unwrap_or(ThreadStatus::Dead);
    let text = if id == vm.current_thread {
        "running"
    } else {
        match status {
            ThreadStatus::Suspended => "suspended",
            ThreadStatus::Normal | ThreadStatus::Running => "normal",
            ThreadStatus::Dead => "dead",
            ThreadStatus::Ok => {
                // fresh if it still has its entry function, dead otherwise
                let fresh = vm
                    .object_pool
                    .thread(id)
                    .map(|t| !t.stack.is_empty())
                    .unwrap_or(false);
                if fresh {
                    "suspended"
                } else {
                    "dead"
                }
            }
        }
    };
    vm.push_str(text);
    Ok(1)
}

fn co_running(vm: &mut LuaVM) -> LuaResult<u32> {
    let cur = vm.current_thread;
    let is_main = cur == vm.main_thread;
    vm.push_thread_value(cur);
    vm.push_boolean(is_main);
    Ok(2)
}

fn co_isyieldable(vm: &mut LuaVM) -> LuaResult<u32> {
    let y = vm.is_yieldable();
    vm.push_boolean(y);
    Ok(1)
}

fn co_wrap(vm: &mut LuaVM) -> LuaResult<u32> {
    let f = vm.index2value(1);
    if !f.is_function() {
        return Err(vm.rt_error(
            "bad argument #1 to 'wrap' (function expected)".to_string(),
        ));
    }
    let co = vm.create_coroutine(f);
    vm.push(co);
    vm.push_cclosure(wrap_call, 1);
    Ok(1)
}

/// The wrapped entry: resumes the captured coroutine and re-raises its
/// errors in the caller.
fn wrap_call(vm: &mut LuaVM) -> LuaResult<u32> {
    let co = vm.index2value(upvalue_index(1));
    let args = resume_args(vm, 1);
    let (ok, results) = vm.resume_thread(co, args)?;
    if !ok {
        let err = results
            .into_iter()
            .next()
            .unwrap_or_else(LuaValue::nil);
        return Err(vm.raise(err));
    }
    let count = results.len() as u32;
    for r in results {
        vm.push(r);
    }
    Ok(count)
}

/// Yield status surfaced to hosts driving coroutines manually.
pub fn is_yield(e: &LuaError) -> bool {
    matches!(e, LuaError::Yield)
}
