// Arithmetic semantics: the integer/float split, wrap-around, floor
// division and modulo, bitwise operators, shifts, coercions.

use crate::test::{eval, run, run_ok};
use crate::LuaError;

#[test]
fn integer_float_split() {
    let r = eval("return 1+2, 1/2, 1//2, 1.0+2");
    assert_eq!(r[0].as_integer(), Some(3));
    assert_eq!(r[1].as_float(), Some(0.5));
    assert_eq!(r[2].as_integer(), Some(0));
    assert_eq!(r[3].as_float(), Some(3.0));
}

#[test]
fn division_always_float() {
    run_ok(
        r#"
        assert(4/2 == 2.0)
        assert(7 // 2 == 3)
        assert(-7 // 2 == -4)
        assert(7.0 // 2 == 3.0)
    "#,
    );
    // the quotient of / carries the float variant even when integral
    let r = eval("return 4/2");
    assert!(r[0].is_float());
}

#[test]
fn floor_modulo() {
    run_ok(
        r#"
        assert(5 % 3 == 2)
        assert(-5 % 3 == 1)
        assert(5 % -3 == -1)
        assert(-5 % -3 == -2)
        assert(5.5 % 2 == 1.5)
    "#,
    );
}

#[test]
fn integer_overflow_wraps() {
    run_ok(
        r#"
        local maxi = 0x7fffffffffffffff
        local mini = -maxi - 1
        assert(maxi + 1 == mini)
        assert(mini - 1 == maxi)
        assert(maxi * 2 == -2)
    "#,
    );
}

#[test]
fn division_by_zero() {
    // integer division and modulo by zero raise
    let r = run("return 1 // 0");
    assert!(matches!(r, Err(LuaError::Runtime)));
    let r = run("return 1 % 0");
    assert!(matches!(r, Err(LuaError::Runtime)));
    // float division by zero does not
    run_ok("assert(1/0 > 0) assert(-1/0 < 0) local nan = 0/0 assert(nan ~= nan)");
}

#[test]
fn bitwise_and_shifts() {
    run_ok(
        r#"
        assert(0xF0 & 0x0F == 0)
        assert(0xF0 | 0x0F == 0xFF)
        assert(0xFF ~ 0x0F == 0xF0)
        assert(~0 == -1)
        assert(1 << 4 == 16)
        assert(256 >> 4 == 16)
        assert(1 << 100 == 0)
        assert(1 >> 100 == 0)
        assert(1 << -4 == 1 >> 4)
        assert(-1 >> 1 == 0x7fffffffffffffff)
    "#,
    );
}

#[test]
fn string_coercion_in_arithmetic() {
    run_ok(
        r#"
        assert("10" + 5 == 15)
        assert("0x10" + 0 == 16)
        assert("3.5" * 2 == 7.0)
    "#,
    );
}

#[test]
fn mixed_comparisons() {
    run_ok(
        r#"
        assert(1 == 1.0)
        assert(1 < 1.5)
        assert(2 > 1.5)
        assert(not (1 < 1.0))
        assert("a" < "b")
        assert("abc" < "abd")
        assert(not ("b" < "a"))
    "#,
    );
}

#[test]
fn unary_operators() {
    run_ok(
        r#"
        assert(-(3) == -3)
        assert(-(3.5) == -3.5)
        assert(~5 == -6)
        assert(not nil == true)
        assert(not 0 == false)
        assert(#"hello" == 5)
        assert(#{1,2,3} == 3)
    "#,
    );
}

#[test]
fn concat_and_numbers() {
    run_ok(
        r#"
        assert("a" .. "b" == "ab")
        assert(1 .. 2 == "12")
        assert("x" .. 1 .. "y" == "x1y")
    "#,
    );
}

#[test]
fn power_is_float_and_right_assoc() {
    run_ok(
        r#"
        assert(2^10 == 1024.0)
        assert(2^3^2 == 512.0)
        assert(2^-1 == 0.5)
    "#,
    );
}
