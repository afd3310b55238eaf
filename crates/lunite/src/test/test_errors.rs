// Error raising and recovery: pcall/xpcall, error values of any type,
// message content for the common runtime faults.

use crate::test::{eval, run, run_ok};
use crate::LuaError;

#[test]
fn pcall_recovers_from_arithmetic_on_nil() {
    let r = eval(r#"return pcall(function() return (nil)+1 end)"#);
    assert_eq!(r[0].as_boolean(), Some(false));
    let mut vm = crate::test::new_vm();
    let r = vm
        .execute_string(r#"local ok, msg = pcall(function() return (nil)+1 end) return msg"#)
        .expect("chunk runs");
    let msg = vm.str_text(r[0]).expect("message is a string");
    assert!(msg.contains("attempt to perform arithmetic"), "got: {}", msg);
}

#[test]
fn pcall_returns_results_on_success() {
    run_ok(
        r#"
        local ok, a, b = pcall(function() return 1, 2 end)
        assert(ok == true and a == 1 and b == 2)
    "#,
    );
}

#[test]
fn error_values_keep_their_type() {
    run_ok(
        r#"
        local ok, e = pcall(function() error({ code = 42 }) end)
        assert(ok == false)
        assert(type(e) == "table")
        assert(e.code == 42)
        local ok2, e2 = pcall(function() error(99) end)
        assert(ok2 == false and e2 == 99)
    "#,
    );
}

#[test]
fn xpcall_runs_the_handler() {
    run_ok(
        r#"
        local ok, out = xpcall(function() error("oops") end,
                               function(msg) return "handled:" .. msg end)
        assert(ok == false)
        assert(out == "handled:oops")
    "#,
    );
}

#[test]
fn nested_pcall() {
    run_ok(
        r#"
        local ok = pcall(function()
            local inner_ok, inner_err = pcall(function() error("inner") end)
            assert(inner_ok == false)
            error("outer")
        end)
        assert(ok == false)
    "#,
    );
}

#[test]
fn indexing_nil_is_an_error() {
    let r = run("local x = nil return x.field");
    assert!(matches!(r, Err(LuaError::Runtime)));
    let r = run("local x = nil x.field = 1");
    assert!(matches!(r, Err(LuaError::Runtime)));
    run_ok(
        r#"
        local ok, msg = pcall(function() local x return x.y end)
        assert(ok == false)
    "#,
    );
}

#[test]
fn calling_a_non_function_is_an_error() {
    run_ok(
        r#"
        local ok = pcall(function() local x = 5 return x() end)
        assert(ok == false)
    "#,
    );
}

#[test]
fn syntax_errors_carry_position() {
    let mut vm = crate::test::new_vm();
    let err = vm.execute_string("local = 5").unwrap_err();
    assert_eq!(err, LuaError::Syntax);
    let msg = vm.error_text();
    assert!(msg.contains("chunk:1:"), "got: {}", msg);
}

#[test]
fn assert_raises_with_custom_message() {
    run_ok(
        r#"
        local ok, msg = pcall(function() assert(false, "custom") end)
        assert(ok == false and msg == "custom")
        local ok2, msg2 = pcall(function() assert(nil) end)
        assert(ok2 == false and msg2 == "assertion failed!")
        assert(assert(1, "unused") == 1)
    "#,
    );
}

#[test]
fn errors_unwind_and_close_upvalues() {
    run_ok(
        r#"
        local captured
        local ok = pcall(function()
            local x = "alive"
            captured = function() return x end
            error("unwind")
        end)
        assert(ok == false)
        assert(captured() == "alive")
    "#,
    );
}

#[test]
fn stack_overflow_is_caught() {
    run_ok(
        r#"
        local function deep(n) return 1 + deep(n + 1) end
        local ok, msg = pcall(deep, 0)
        assert(ok == false)
    "#,
    );
}
