// Coroutines: the resume/yield value protocol, status transitions, wrap,
// and the C-boundary rule.

use crate::test::{eval, run_ok};

#[test]
fn yield_and_resume_preserve_state() {
    let r = eval(
        r#"
        local co = coroutine.create(function(a)
          local b = coroutine.yield(a + 1)
          return a + b end)
        local ok1, v1 = coroutine.resume(co, 10)
        local ok2, v2 = coroutine.resume(co, 100)
        return ok1, v1, ok2, v2
    "#,
    );
    assert_eq!(r[0].as_boolean(), Some(true));
    assert_eq!(r[1].as_integer(), Some(11));
    assert_eq!(r[2].as_boolean(), Some(true));
    assert_eq!(r[3].as_integer(), Some(110));
}

#[test]
fn multiple_yields_in_a_loop() {
    run_ok(
        r#"
        local co = coroutine.create(function()
            for i = 1, 3 do coroutine.yield(i) end
            return "end"
        end)
        local _, a = coroutine.resume(co)
        local _, b = coroutine.resume(co)
        local _, c = coroutine.resume(co)
        local _, d = coroutine.resume(co)
        assert(a == 1 and b == 2 and c == 3 and d == "end")
        assert(coroutine.status(co) == "dead")
    "#,
    );
}

#[test]
fn resume_passes_multiple_values() {
    run_ok(
        r#"
        local co = coroutine.create(function(a, b)
            local c, d = coroutine.yield(a + b, a - b)
            return c * d
        end)
        local ok, s, diff = coroutine.resume(co, 7, 3)
        assert(ok and s == 10 and diff == 4)
        local ok2, prod = coroutine.resume(co, 6, 7)
        assert(ok2 and prod == 42)
    "#,
    );
}

#[test]
fn status_transitions() {
    run_ok(
        r#"
        local co = coroutine.create(function() coroutine.yield() end)
        assert(coroutine.status(co) == "suspended")
        coroutine.resume(co)
        assert(coroutine.status(co) == "suspended")
        coroutine.resume(co)
        assert(coroutine.status(co) == "dead")
        local ok, msg = coroutine.resume(co)
        assert(ok == false)
        assert(msg == "cannot resume dead coroutine")
    "#,
    );
}

#[test]
fn errors_inside_coroutines_are_reported() {
    run_ok(
        r#"
        local co = coroutine.create(function() error("boom") end)
        local ok, msg = coroutine.resume(co)
        assert(ok == false)
        assert(type(msg) == "string" and msg ~= "")
    "#,
    );
}

#[test]
fn wrap_returns_values_and_raises_errors() {
    run_ok(
        r#"
        local gen = coroutine.wrap(function()
            coroutine.yield(1)
            coroutine.yield(2)
        end)
        assert(gen() == 1)
        assert(gen() == 2)
        local bad = coroutine.wrap(function() error("inner") end)
        local ok = pcall(bad)
        assert(ok == false)
    "#,
    );
}

#[test]
fn yield_from_main_thread_fails() {
    run_ok(
        r#"
        local ok, msg = pcall(coroutine.yield)
        assert(ok == false)
    "#,
    );
}

#[test]
fn isyieldable_inside_and_outside() {
    run_ok(
        r#"
        assert(coroutine.isyieldable() == false)
        local co = coroutine.create(function()
            return coroutine.isyieldable()
        end)
        local _, inside = coroutine.resume(co)
        assert(inside == true)
    "#,
    );
}

#[test]
fn running_identifies_the_current_thread() {
    run_ok(
        r#"
        local main, is_main = coroutine.running()
        assert(is_main == true)
        local co
        co = coroutine.create(function()
            local me, m = coroutine.running()
            assert(me == co)
            assert(m == false)
        end)
        assert(coroutine.resume(co))
    "#,
    );
}

#[test]
fn coroutines_keep_separate_stacks() {
    run_ok(
        r#"
        local function worker(tag)
            local acc = ""
            for i = 1, 2 do
                acc = acc .. tag .. i
                coroutine.yield(acc)
            end
            return acc
        end
        local a = coroutine.create(worker)
        local b = coroutine.create(worker)
        local _, ra1 = coroutine.resume(a, "A")
        local _, rb1 = coroutine.resume(b, "B")
        local _, ra2 = coroutine.resume(a)
        assert(ra1 == "A1")
        assert(rb1 == "B1")
        assert(ra2 == "A1A2")
    "#,
    );
}
