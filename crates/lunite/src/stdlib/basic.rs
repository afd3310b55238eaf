// Base library (lbaselib.c): the functions every chunk assumes exist.
// Host functions follow the stack convention - arguments at indices
// 1..=get_top(), results pushed on top, count returned.

use crate::lib_registry::LibraryModule;
use crate::lua_vm::api::FmtArg;
use crate::lua_vm::execute::metamethod::number_to_string;
use crate::lua_vm::{LuaError, LuaResult, LuaVM};
use crate::lua_value::{LuaValue, LuaValueKind};

pub fn create_base_lib() -> LibraryModule {
    crate::lib_module!("_G", {
        "assert" => lua_assert,
        "collectgarbage" => lua_collectgarbage,
        "error" => lua_error,
        "getmetatable" => lua_getmetatable,
        "ipairs" => lua_ipairs,
        "next" => lua_next,
        "pairs" => lua_pairs,
        "pcall" => lua_pcall,
        "print" => lua_print,
        "rawequal" => lua_rawequal,
        "rawget" => lua_rawget,
        "rawlen" => lua_rawlen,
        "rawset" => lua_rawset,
        "select" => lua_select,
        "setmetatable" => lua_setmetatable,
        "tonumber" => lua_tonumber,
        "tostring" => lua_tostring,
        "type" => lua_type,
        "xpcall" => lua_xpcall,
    })
}

fn arg_count(vm: &LuaVM) -> usize {
    vm.get_top() as usize
}

fn check_arg(vm: &mut LuaVM, i: usize, fname: &str) -> LuaResult<LuaValue> {
    if i > arg_count(vm) {
        let msg = format!("bad argument #{} to '{}' (value expected)", i, fname);
        return Err(vm.rt_error(msg));
    }
    Ok(vm.index2value(i as i32))
}

fn check_table_arg(vm: &mut LuaVM, i: usize, fname: &str) -> LuaResult<crate::gc::TableId> {
    let v = check_arg(vm, i, fname)?;
    match v.as_table_id() {
        Some(t) => Ok(t),
        None => {
            let msg = format!(
                "bad argument #{} to '{}' (table expected, got {})",
                i,
                fname,
                v.type_name()
            );
            Err(vm.rt_error(msg))
        }
    }
}

/// tostring semantics shared by `tostring` and `print`: __tostring first,
/// then __name for tables/userdata, then the primitive form.
pub(crate) fn tostring_value(vm: &mut LuaVM, v: LuaValue) -> LuaResult<LuaValue> {
    let tostring = {
        let mt = vm.metatable_of(v);
        match mt {
            Some(mt) => {
                let key = vm.new_string("__tostring");
                vm.raw_get(mt, key)
            }
            None => LuaValue::nil(),
        }
    };
    if !tostring.is_nil() {
        let r = vm.call_value(tostring, &[v])?;
        let s = r.into_iter().next().unwrap_or_else(LuaValue::nil);
        if !s.is_string() {
            return Err(vm.rt_error("'__tostring' must return a string".to_string()));
        }
        return Ok(s);
    }
    let text = match v.kind() {
        LuaValueKind::Nil => "nil".to_string(),
        LuaValueKind::Boolean => {
            if v.is_truthy() {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        LuaValueKind::Integer | LuaValueKind::Float => number_to_string(v),
        LuaValueKind::String => return Ok(v),
        _ => {
            vm.push(v);
            let p = vm.to_pointer(-1);
            vm.pop(1);
            let s = vm.push_fstring(
                "%s: %p",
                &[FmtArg::Str(v.type_name().to_string()), FmtArg::Ptr(p)],
            );
            vm.pop(1);
            return Ok(s);
        }
    };
    Ok(vm.new_string(&text))
}

fn lua_print(vm: &mut LuaVM) -> LuaResult<u32> {
    let n = arg_count(vm);
    let mut line = String::new();
    for i in 1..=n {
        let v = vm.index2value(i as i32);
        let s = tostring_value(vm, v)?;
        if i > 1 {
            line.push('\t');
        }
        line.push_str(vm.str_text(s).unwrap_or("?"));
    }
    println!("{}", line);
    Ok(0)
}

fn lua_type(vm: &mut LuaVM) -> LuaResult<u32> {
    let v = check_arg(vm, 1, "type")?;
    vm.push_str(v.type_name());
    Ok(1)
}

fn lua_tostring(vm: &mut LuaVM) -> LuaResult<u32> {
    let v = check_arg(vm, 1, "tostring")?;
    let s = tostring_value(vm, v)?;
    vm.push(s);
    Ok(1)
}

fn lua_tonumber(vm: &mut LuaVM) -> LuaResult<u32> {
    let v = check_arg(vm, 1, "tonumber")?;
    if arg_count(vm) >= 2 {
        // explicit base: the value must be a string of digits
        let base = vm.to_integer(2).unwrap_or(10);
        if !(2..=36).contains(&base) {
            return Err(vm.rt_error("bad argument #2 to 'tonumber' (base out of range)".to_string()));
        }
        let text = match vm.str_text(v) {
            Some(s) => s.trim().to_string(),
            None => {
                return Err(vm.rt_error(
                    "bad argument #1 to 'tonumber' (string expected)".to_string(),
                ))
            }
        };
        match i64::from_str_radix(&text, base as u32) {
            Ok(i) => vm.push_integer(i),
            Err(_) => vm.push_nil(),
        }
        return Ok(1);
    }
    match vm.tonumber_value(v) {
        Some(n) => vm.push(n),
        None => vm.push_nil(),
    }
    Ok(1)
}

fn lua_ipairs(vm: &mut LuaVM) -> LuaResult<u32> {
    let v = check_arg(vm, 1, "ipairs")?;
    vm.push_cfunction(ipairs_iter);
    vm.push(v);
    vm.push_integer(0);
    Ok(3)
}

fn ipairs_iter(vm: &mut LuaVM) -> LuaResult<u32> {
    let t = vm.index2value(1);
    let i = vm.to_integer(2).unwrap_or(0) + 1;
    let v = vm.index_value(t, LuaValue::integer(i))?;
    if v.is_nil() {
        vm.push_nil();
        Ok(1)
    } else {
        vm.push_integer(i);
        vm.push(v);
        Ok(2)
    }
}

fn lua_next(vm: &mut LuaVM) -> LuaResult<u32> {
    let t = check_table_arg(vm, 1, "next")?;
    let key = vm.index2value(2);
    let r = {
        let pool = &vm.object_pool;
        match pool.table(t) {
            Some(tbl) => tbl.next(key, &pool.strings_view()),
            None => Ok(None),
        }
    };
    match r {
        Ok(Some((k, v))) => {
            vm.push(k);
            vm.push(v);
            Ok(2)
        }
        Ok(None) => {
            vm.push_nil();
            Ok(1)
        }
        Err(e) => Err(vm.table_error(e)),
    }
}

fn lua_pairs(vm: &mut LuaVM) -> LuaResult<u32> {
    let v = check_arg(vm, 1, "pairs")?;
    // __pairs overrides the default traversal
    let mm = {
        let mt = vm.metatable_of(v);
        match mt {
            Some(mt) => {
                let key = vm.new_string("__pairs");
                vm.raw_get(mt, key)
            }
            None => LuaValue::nil(),
        }
    };
    if !mm.is_nil() {
        let results = vm.call_value(mm, &[v])?;
        for i in 0..3 {
            let r = results.get(i).copied().unwrap_or_else(LuaValue::nil);
            vm.push(r);
        }
        return Ok(3);
    }
    vm.push_cfunction(lua_next);
    vm.push(v);
    vm.push_nil();
    Ok(3)
}

fn lua_select(vm: &mut LuaVM) -> LuaResult<u32> {
    let n = arg_count(vm);
    let first = check_arg(vm, 1, "select")?;
    if let Some(b) = vm.str_bytes(first) {
        if b == b"#" {
            vm.push_integer(n as i64 - 1);
            return Ok(1);
        }
    }
    let Some(mut i) = first.as_integer() else {
        return Err(vm.rt_error("bad argument #1 to 'select' (number expected)".to_string()));
    };
    if i < 0 {
        i += n as i64; // from the end
        if i < 1 {
            return Err(vm.rt_error(
                "bad argument #1 to 'select' (index out of range)".to_string(),
            ));
        }
    }
    if i < 1 {
        return Err(vm.rt_error("bad argument #1 to 'select' (index out of range)".to_string()));
    }
    let mut pushed = 0;
    for j in (i + 1)..=(n as i64) {
        vm.push_value(j as i32);
        pushed += 1;
    }
    Ok(pushed)
}

fn lua_rawget(vm: &mut LuaVM) -> LuaResult<u32> {
    let t = check_table_arg(vm, 1, "rawget")?;
    let key = check_arg(vm, 2, "rawget")?;
    let v = vm.raw_get(t, key);
    vm.push(v);
    Ok(1)
}

fn lua_rawset(vm: &mut LuaVM) -> LuaResult<u32> {
    let t = check_table_arg(vm, 1, "rawset")?;
    let key = check_arg(vm, 2, "rawset")?;
    let value = check_arg(vm, 3, "rawset")?;
    vm.raw_set_checked(t, key, value)?;
    vm.push_value(1);
    Ok(1)
}

fn lua_rawequal(vm: &mut LuaVM) -> LuaResult<u32> {
    check_arg(vm, 2, "rawequal")?;
    let eq = vm.api_raw_equal(1, 2);
    vm.push_boolean(eq);
    Ok(1)
}

fn lua_rawlen(vm: &mut LuaVM) -> LuaResult<u32> {
    let v = check_arg(vm, 1, "rawlen")?;
    if !v.is_table() && !v.is_string() {
        return Err(vm.rt_error(
            "table or string expected".to_string(),
        ));
    }
    let l = vm.raw_len(1);
    vm.push_integer(l as i64);
    Ok(1)
}

fn lua_setmetatable(vm: &mut LuaVM) -> LuaResult<u32> {
    let t = check_arg(vm, 1, "setmetatable")?;
    if !t.is_table() {
        return Err(vm.rt_error(
            "bad argument #1 to 'setmetatable' (table expected)".to_string(),
        ));
    }
    let mt = check_arg(vm, 2, "setmetatable")?;
    if !mt.is_nil() && !mt.is_table() {
        return Err(vm.rt_error(
            "bad argument #2 to 'setmetatable' (nil or table expected)".to_string(),
        ));
    }
    // a protected metatable cannot be replaced
    if let Some(cur) = vm.metatable_of(t) {
        let key = vm.new_string("__metatable");
        if !vm.raw_get(cur, key).is_nil() {
            return Err(vm.rt_error("cannot change a protected metatable".to_string()));
        }
    }
    vm.set_metatable(t, mt.as_table_id())?;
    vm.push(t);
    Ok(1)
}

fn lua_getmetatable(vm: &mut LuaVM) -> LuaResult<u32> {
    let v = check_arg(vm, 1, "getmetatable")?;
    match vm.metatable_of(v) {
        Some(mt) => {
            // honor __metatable protection
            let key = vm.new_string("__metatable");
            let protected = vm.raw_get(mt, key);
            if protected.is_nil() {
                vm.push(LuaValue::table(mt));
            } else {
                vm.push(protected);
            }
        }
        None => vm.push_nil(),
    }
    Ok(1)
}

fn lua_assert(vm: &mut LuaVM) -> LuaResult<u32> {
    let v = check_arg(vm, 1, "assert")?;
    if v.is_truthy() {
        // pass every argument through
        let n = arg_count(vm);
        for i in 1..=n {
            vm.push_value(i as i32);
        }
        return Ok(n as u32);
    }
    let msg = if arg_count(vm) >= 2 {
        vm.index2value(2)
    } else {
        vm.new_string("assertion failed!")
    };
    Err(vm.raise(msg))
}

fn lua_error(vm: &mut LuaVM) -> LuaResult<u32> {
    let v = vm.index2value(1);
    Err(vm.raise(v))
}

fn lua_pcall(vm: &mut LuaVM) -> LuaResult<u32> {
    let f = check_arg(vm, 1, "pcall")?;
    let n = arg_count(vm);
    let args: Vec<LuaValue> = (2..=n).map(|i| vm.index2value(i as i32)).collect();
    match vm.call_value_protected(f, &args, None) {
        Ok(results) => {
            let count = results.len() as u32;
            vm.push_boolean(true);
            for r in results {
                vm.push(r);
            }
            Ok(count + 1)
        }
        Err(LuaError::Yield) => Err(LuaError::Yield),
        Err(_) => {
            let ev = vm.take_error_value();
            vm.push_boolean(false);
            vm.push(ev);
            Ok(2)
        }
    }
}

fn lua_xpcall(vm: &mut LuaVM) -> LuaResult<u32> {
    let f = check_arg(vm, 1, "xpcall")?;
    let handler = check_arg(vm, 2, "xpcall")?;
    let n = arg_count(vm);
    let args: Vec<LuaValue> = (3..=n).map(|i| vm.index2value(i as i32)).collect();
    match vm.call_value_protected(f, &args, Some(handler)) {
        Ok(results) => {
            let count = results.len() as u32;
            vm.push_boolean(true);
            for r in results {
                vm.push(r);
            }
            Ok(count + 1)
        }
        Err(LuaError::Yield) => Err(LuaError::Yield),
        Err(_) => {
            let ev = vm.take_error_value();
            vm.push_boolean(false);
            vm.push(ev);
            Ok(2)
        }
    }
}

fn lua_collectgarbage(vm: &mut LuaVM) -> LuaResult<u32> {
    let opt = if arg_count(vm) >= 1 {
        vm.str_text(vm.index2value(1))
            .unwrap_or("collect")
            .to_string()
    } else {
        "collect".to_string()
    };
    match opt.as_str() {
        "collect" => {
            vm.gc_collect();
            vm.push_integer(0);
        }
        "stop" => {
            vm.gc_stop();
            vm.push_integer(0);
        }
        "restart" => {
            vm.gc_restart();
            vm.push_integer(0);
        }
        "count" => {
            let kb = vm.gc_count_bytes() as f64 / 1024.0;
            vm.push_number(kb);
        }
        "step" => {
            let kb = vm.to_integer(2).unwrap_or(0).max(0) as usize;
            vm.gc_step(kb);
            let running = vm.gc_is_running();
            vm.push_boolean(running);
        }
        "isrunning" => {
            let r = vm.gc_is_running();
            vm.push_boolean(r);
        }
        "setpause" => {
            let p = vm.to_integer(2).unwrap_or(200).max(0) as usize;
            let old = vm.gc_set_pause(p);
            vm.push_integer(old as i64);
        }
        "setstepmul" => {
            let m = vm.to_integer(2).unwrap_or(200).max(0) as usize;
            let old = vm.gc_set_step_mul(m);
            vm.push_integer(old as i64);
        }
        other => {
            let msg = format!("bad argument #1 to 'collectgarbage' (invalid option '{}')", other);
            return Err(vm.rt_error(msg));
        }
    }
    Ok(1)
}
