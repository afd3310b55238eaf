// Closures and upvalues: shared cells, closing on scope exit, tail-call
// frame economy.

use crate::test::{eval, run_ok};

#[test]
fn sibling_closures_share_an_upvalue() {
    let r = eval(
        r#"
        local function mk() local x = 0
          return function() x = x + 1; return x end,
                 function() return x end end
        local inc, get = mk()
        inc(); inc(); inc()
        return get()
    "#,
    );
    assert_eq!(r[0].as_integer(), Some(3));
}

#[test]
fn counters_are_independent() {
    run_ok(
        r#"
        local function counter()
            local n = 0
            return function() n = n + 1 return n end
        end
        local a, b = counter(), counter()
        a(); a(); b()
        assert(a() == 3)
        assert(b() == 2)
    "#,
    );
}

#[test]
fn loop_closures_capture_distinct_cells() {
    run_ok(
        r#"
        local fns = {}
        for i = 1, 3 do
            fns[i] = function() return i end
        end
        assert(fns[1]() == 1)
        assert(fns[2]() == 2)
        assert(fns[3]() == 3)
    "#,
    );
}

#[test]
fn upvalue_closes_when_scope_ends() {
    run_ok(
        r#"
        local f
        do
            local hidden = "kept"
            f = function() return hidden end
        end
        assert(f() == "kept")
    "#,
    );
}

#[test]
fn nested_capture_through_two_levels() {
    run_ok(
        r#"
        local function outer()
            local x = 10
            local function middle()
                local function inner() return x end
                return inner
            end
            return middle()
        end
        assert(outer()() == 10)
    "#,
    );
}

#[test]
fn assignment_through_upvalue_is_visible() {
    run_ok(
        r#"
        local x = 1
        local function set(v) x = v end
        local function get() return x end
        set(42)
        assert(x == 42)
        assert(get() == 42)
    "#,
    );
}

#[test]
fn tail_recursion_does_not_grow_frames() {
    // far deeper than the call-depth limit: only tail calls survive this
    run_ok(
        r#"
        local function loop(n)
            if n == 0 then return "done" end
            return loop(n - 1)
        end
        assert(loop(100000) == "done")
    "#,
    );
}

#[test]
fn recursion_without_tail_calls_hits_the_limit() {
    let r = crate::test::run(
        r#"
        local function f(n) return 1 + f(n + 1) end
        return f(0)
    "#,
    );
    assert!(r.is_err());
}

#[test]
fn vararg_functions() {
    run_ok(
        r#"
        local function sum(...)
            local t = { ... }
            local s = 0
            for i = 1, #t do s = s + t[i] end
            return s
        end
        assert(sum() == 0)
        assert(sum(1, 2, 3) == 6)
        local function first(...) return (...) end
        assert(first(7, 8) == 7)
    "#,
    );
}

#[test]
fn method_definitions_bind_self() {
    run_ok(
        r#"
        local obj = { value = 5 }
        function obj:get() return self.value end
        function obj.raw(o) return o.value end
        assert(obj:get() == 5)
        assert(obj.raw(obj) == 5)
    "#,
    );
}
