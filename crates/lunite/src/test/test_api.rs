// The host-facing stack API: index conventions, push/read round trips,
// table access, protected calls, the registry.

use crate::lua_vm::api::{FmtArg, REGISTRY_INDEX};
use crate::lua_vm::{LuaResult, LuaVM, TmKind, RIDX_GLOBALS, RIDX_MAINTHREAD};
use crate::lua_value::{LuaValue, LuaValueKind};
use crate::test::new_vm;

#[test]
fn push_and_read_round_trips() {
    let mut vm = new_vm();
    vm.push_integer(41);
    vm.push_number(2.5);
    vm.push_boolean(true);
    vm.push_str("hello");
    vm.push_nil();
    assert_eq!(vm.get_top(), 5);
    assert_eq!(vm.to_integer(1), Some(41));
    assert_eq!(vm.to_number(2), Some(2.5));
    assert!(vm.to_boolean(3));
    assert_eq!(vm.to_lstring(4).as_deref(), Some(b"hello".as_ref()));
    assert!(vm.is_nil(5));
    // negative indices count from the top
    assert!(vm.is_nil(-1));
    assert_eq!(vm.to_integer(-5), Some(41));
    assert_eq!(vm.abs_index(-5), 1);
}

#[test]
fn integer_round_trip_is_exact() {
    let mut vm = new_vm();
    for &n in &[0i64, 1, -1, i64::MAX, i64::MIN, 123456789012345] {
        vm.push_integer(n);
        assert_eq!(vm.to_integer(-1), Some(n));
        vm.pop(1);
    }
    for &x in &[0.5f64, -1.25, 1e300] {
        vm.push_number(x);
        assert_eq!(vm.to_number(-1), Some(x));
        vm.pop(1);
    }
}

#[test]
fn number_string_round_trip() {
    let mut vm = new_vm();
    assert_eq!(vm.string_to_number("42"), 2);
    assert_eq!(vm.to_integer(-1), Some(42));
    vm.pop(1);
    assert_eq!(vm.string_to_number("2.5"), 3);
    assert_eq!(vm.to_number(-1), Some(2.5));
    vm.pop(1);
    assert_eq!(vm.string_to_number("junk"), 0);
}

#[test]
fn string_coercion_rules() {
    let mut vm = new_vm();
    vm.push_str("17");
    assert_eq!(vm.to_integer(-1), Some(17));
    assert_eq!(vm.to_number(-1), Some(17.0));
    vm.pop(1);
    vm.push_number(2.5);
    // 2.5 has no exact integer form
    assert_eq!(vm.to_integer(-1), None);
    vm.pop(1);
    // numbers convert to strings on demand
    vm.push_integer(99);
    assert_eq!(vm.to_lstring(-1).as_deref(), Some(b"99".as_ref()));
}

#[test]
fn stack_shuffling() {
    let mut vm = new_vm();
    vm.push_integer(1);
    vm.push_integer(2);
    vm.push_integer(3);
    vm.insert(1); // 3 1 2
    assert_eq!(vm.to_integer(1), Some(3));
    assert_eq!(vm.to_integer(2), Some(1));
    vm.remove(1); // 1 2
    assert_eq!(vm.to_integer(1), Some(1));
    vm.push_value(1); // 1 2 1
    assert_eq!(vm.to_integer(-1), Some(1));
    vm.replace(2); // 1 1
    assert_eq!(vm.get_top(), 2);
    assert_eq!(vm.to_integer(2), Some(1));
    vm.api_set_top(0);
    assert_eq!(vm.get_top(), 0);
}

#[test]
fn table_access_through_the_api() -> LuaResult<()> {
    let mut vm = new_vm();
    vm.create_table(0, 4);
    vm.push_integer(7);
    vm.set_field(-2, "x")?;
    assert_eq!(vm.get_field(-1, "x")?, LuaValueKind::Integer);
    assert_eq!(vm.to_integer(-1), Some(7));
    vm.pop(1);
    vm.push_integer(100);
    vm.set_i(-2, 1)?;
    assert_eq!(vm.get_i(-1, 1)?, LuaValueKind::Integer);
    vm.pop(1);
    assert_eq!(vm.raw_len(-1), 1);
    // raw variants
    vm.push_str("k");
    vm.push_boolean(true);
    vm.api_raw_set(-3)?;
    vm.push_str("k");
    assert_eq!(vm.api_raw_get(-2), LuaValueKind::Boolean);
    vm.pop(2);
    Ok(())
}

#[test]
fn next_walks_a_table() -> LuaResult<()> {
    let mut vm = new_vm();
    vm.execute_string("probe = { a = 1, b = 2, c = 3 }")?;
    let t = vm.get_global("probe");
    vm.push(t);
    vm.push_nil();
    let mut count = 0;
    while vm.api_next(-2)? {
        count += 1;
        vm.pop(1); // drop the value, keep the key for the next round
    }
    assert_eq!(count, 3);
    vm.pop(1);
    Ok(())
}

#[test]
fn registry_holds_main_thread_and_globals() {
    let mut vm = new_vm();
    let reg = vm.index2value(REGISTRY_INDEX);
    let reg_id = reg.as_table_id().expect("registry is a table");
    let main = vm.raw_get_i(reg_id, RIDX_MAINTHREAD);
    assert!(main.is_thread());
    let globals = vm.raw_get_i(reg_id, RIDX_GLOBALS);
    assert!(globals.is_table());
    assert!(globals.same(&LuaValue::table(vm.globals)));
}

#[test]
fn api_calls_lua_functions() -> LuaResult<()> {
    let mut vm = new_vm();
    vm.execute_string("function double(n) return 2 * n end")?;
    let f = vm.get_global("double");
    vm.push(f);
    vm.push_integer(21);
    vm.api_call(1, 1)?;
    assert_eq!(vm.to_integer(-1), Some(42));
    vm.pop(1);
    Ok(())
}

#[test]
fn api_pcall_reports_status() {
    let mut vm = new_vm();
    vm.execute_string("function boom() error('x') end").unwrap();
    let f = vm.get_global("boom");
    vm.push(f);
    let status = vm.api_pcall(0, 0, 0);
    assert_eq!(status, 2); // runtime error
    vm.pop(1); // the error value replaced the results
    let f = vm.get_global("double_nothing");
    vm.push(f);
    let status = vm.api_pcall(0, 0, 0);
    assert_eq!(status, 2); // calling nil
}

#[test]
fn host_functions_and_upvalues() -> LuaResult<()> {
    fn adder(vm: &mut LuaVM) -> LuaResult<u32> {
        let bias = vm
            .index2value(crate::lua_vm::api::upvalue_index(1))
            .as_integer()
            .unwrap_or(0);
        let n = vm.to_integer(1).unwrap_or(0);
        vm.push_integer(n + bias);
        Ok(1)
    }
    let mut vm = new_vm();
    vm.push_integer(100);
    vm.push_cclosure(adder, 1);
    let f = vm.index2value(-1);
    vm.pop(1);
    vm.set_global("add100", f);
    let r = vm.execute_string("return add100(23)")?;
    assert_eq!(r[0].as_integer(), Some(123));
    Ok(())
}

#[test]
fn arith_and_compare_through_the_api() -> LuaResult<()> {
    let mut vm = new_vm();
    vm.push_integer(6);
    vm.push_integer(7);
    vm.api_arith(TmKind::Mul)?;
    assert_eq!(vm.to_integer(-1), Some(42));
    vm.pop(1);
    vm.push_integer(1);
    vm.push_integer(2);
    assert!(vm.api_compare(-2, -1, TmKind::Lt)?);
    assert!(!vm.api_compare(-2, -1, TmKind::Eq)?);
    vm.pop(2);
    vm.push_str("a");
    vm.push_str("b");
    vm.api_concat(2)?;
    assert_eq!(vm.to_lstring(-1).as_deref(), Some(b"ab".as_ref()));
    Ok(())
}

#[test]
fn push_fstring_directives() {
    let mut vm = new_vm();
    let v = vm.push_fstring(
        "%s=%d (%f) %c%%",
        &[
            FmtArg::Str("n".to_string()),
            FmtArg::Int(5),
            FmtArg::Float(1.5),
            FmtArg::Char(b'!'),
        ],
    );
    let text = vm.str_text(v).unwrap();
    assert_eq!(text, "n=5 (1.5) !%");
}

#[test]
fn load_rejects_binary_mode() {
    let mut vm = new_vm();
    let status = vm.api_load("return 1", "chunk", "b");
    assert_eq!(status, 3); // syntax error status
    vm.pop(1);
    let status = vm.api_load("return 1", "chunk", "t");
    assert_eq!(status, 0);
    vm.api_call(0, 1).unwrap();
    assert_eq!(vm.to_integer(-1), Some(1));
}

#[test]
fn multiple_states_are_independent() {
    let mut a = new_vm();
    let mut b = new_vm();
    a.execute_string("shared = 'from-a'").unwrap();
    b.execute_string("shared = 'from-b'").unwrap();
    let va = a.get_global("shared");
    let vb = b.get_global("shared");
    assert_eq!(a.str_text(va), Some("from-a"));
    assert_eq!(b.str_text(vb), Some("from-b"));
}
