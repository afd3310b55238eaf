// Collector behavior observable from the language: reclamation, weak
// tables, finalizers, string interning identity.

use crate::gc::GcId;
use crate::lua_value::LuaValue;
use crate::test::{new_vm, run_ok};

#[test]
fn full_collection_reclaims_garbage() {
    run_ok(
        r#"
        collectgarbage("collect")
        local before = collectgarbage("count")
        do
            local junk = {}
            for i = 1, 1000 do junk[i] = { payload = i } end
        end
        collectgarbage("collect")
        collectgarbage("collect")
        local after = collectgarbage("count")
        -- the junk tables are unreachable and must have been freed
        assert(after < before + 50)
    "#,
    );
}

#[test]
fn reachable_data_survives_collection() {
    run_ok(
        r#"
        local keep = {}
        for i = 1, 100 do keep[i] = "value" .. i end
        collectgarbage("collect")
        for i = 1, 100 do assert(keep[i] == "value" .. i) end
    "#,
    );
}

#[test]
fn weak_values_are_cleared() {
    run_ok(
        r#"
        local cache = setmetatable({}, { __mode = "v" })
        cache.kept = { 1 }
        local anchor = cache.kept
        cache.dropped = { 2 }
        collectgarbage("collect")
        assert(cache.kept ~= nil)
        assert(cache.dropped == nil)
        assert(anchor[1] == 1)
    "#,
    );
}

#[test]
fn weak_keys_behave_as_ephemerons() {
    run_ok(
        r#"
        local t = setmetatable({}, { __mode = "k" })
        local live_key = {}
        t[live_key] = "stays"
        do
            local dead_key = {}
            t[dead_key] = "goes"
        end
        collectgarbage("collect")
        local count = 0
        for _ in pairs(t) do count = count + 1 end
        assert(count == 1)
        assert(t[live_key] == "stays")
    "#,
    );
}

#[test]
fn finalizers_run_for_unreachable_objects() {
    run_ok(
        r#"
        local finalized = 0
        do
            local obj = setmetatable({}, { __gc = function() finalized = finalized + 1 end })
        end
        collectgarbage("collect")
        collectgarbage("collect")
        assert(finalized == 1)
    "#,
    );
}

#[test]
fn finalizer_sees_the_object() {
    run_ok(
        r#"
        local tag
        do
            local obj = setmetatable({ name = "victim" }, {
                __gc = function(o) tag = o.name end,
            })
        end
        collectgarbage("collect")
        collectgarbage("collect")
        assert(tag == "victim")
    "#,
    );
}

#[test]
fn collector_can_stop_and_restart() {
    run_ok(
        r#"
        collectgarbage("stop")
        assert(collectgarbage("isrunning") == false)
        collectgarbage("restart")
        assert(collectgarbage("isrunning") == true)
        collectgarbage("step")
        collectgarbage("setpause", 150)
        collectgarbage("setstepmul", 300)
    "#,
    );
}

#[test]
fn incremental_steps_eventually_collect() {
    run_ok(
        r#"
        do
            local junk = {}
            for i = 1, 200 do junk[i] = { i } end
        end
        for i = 1, 1000 do collectgarbage("step", 4) end
        -- no assertion beyond surviving the churn with live data intact
        local t = { ok = true }
        collectgarbage("collect")
        assert(t.ok)
    "#,
    );
}

#[test]
fn short_strings_are_interned_once() {
    let mut vm = new_vm();
    let a = vm.new_string("interned-probe");
    let b = vm.new_string("interned-probe");
    assert!(a.same(&b), "same short string must be the same object");
    // long strings are separate objects with equal contents
    let long = "x".repeat(100);
    let c = vm.new_string(&long);
    let d = vm.new_string(&long);
    assert!(!c.same(&d));
    vm.push(c);
    vm.push(d);
    assert!(vm.api_raw_equal(-2, -1));
    vm.pop(2);
}

#[test]
fn interned_string_survives_collection_cycle() {
    let mut vm = new_vm();
    let v = vm.new_string("sticky");
    // anchor it in a global, collect, and re-intern
    vm.set_global("sticky_probe", v);
    vm.full_gc();
    let again = vm.new_string("sticky");
    assert!(v.same(&again));
}

#[test]
fn fixed_objects_never_move_or_die() {
    let mut vm = new_vm();
    let id = vm.intern_id(b"pinned-forever");
    vm.object_pool.fix(GcId::String(id));
    vm.full_gc();
    vm.full_gc();
    assert!(vm.object_pool.string(id).is_some());
    let v = LuaValue::string(id);
    assert_eq!(vm.str_text(v), Some("pinned-forever"));
}
