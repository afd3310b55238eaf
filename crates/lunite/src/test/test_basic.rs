// Base library behavior.

use crate::test::{eval, run_ok};

#[test]
fn type_names() {
    run_ok(
        r#"
        assert(type(nil) == "nil")
        assert(type(true) == "boolean")
        assert(type(42) == "number")
        assert(type(3.14) == "number")
        assert(type("hello") == "string")
        assert(type({}) == "table")
        assert(type(print) == "function")
        assert(type(coroutine.create(print)) == "thread")
    "#,
    );
}

#[test]
fn tostring_and_tonumber() {
    run_ok(
        r#"
        assert(tostring(123) == "123")
        assert(tostring(true) == "true")
        assert(tostring(nil) == "nil")
        assert(type(tostring({})) == "string")
        assert(tonumber("123") == 123)
        assert(tonumber("2.5") == 2.5)
        assert(tonumber("0x1F") == 31)
        assert(tonumber("  8  ") == 8)
        assert(tonumber("nope") == nil)
        assert(tonumber(42) == 42)
        assert(tonumber("ff", 16) == 255)
        assert(tonumber("101", 2) == 5)
    "#,
    );
}

#[test]
fn number_string_round_trip_law() {
    run_ok(
        r#"
        for _, n in ipairs({0, 1, -1, 42, 1000000, -99999}) do
            assert(tonumber(tostring(n)) == n)
        end
        for _, x in ipairs({0.5, -2.25, 1e10}) do
            assert(tonumber(tostring(x)) == x)
        end
    "#,
    );
}

#[test]
fn globals_table_is_self_referential() {
    run_ok(
        r#"
        assert(_G._G == _G)
        assert(type(_VERSION) == "string")
        marker = "visible"
        assert(_G.marker == "visible")
        _G.other = 1
        assert(other == 1)
    "#,
    );
}

#[test]
fn print_does_not_fail() {
    run_ok(
        r#"
        print("smoke", 1, nil, true, {})
        print()
    "#,
    );
}

#[test]
fn chunk_results_are_returned_in_order() {
    let r = eval("return 1, 'two', 3.0, true");
    assert_eq!(r.len(), 4);
    assert_eq!(r[0].as_integer(), Some(1));
    assert_eq!(r[2].as_float(), Some(3.0));
    assert_eq!(r[3].as_boolean(), Some(true));
}

#[test]
fn long_strings_and_escapes() {
    run_ok(
        r#"
        local long = [[line1
line2]]
        assert(long == "line1\nline2")
        local lv = [==[has ]] inside]==]
        assert(#lv > 0)
        assert("\65\66\67" == "ABC")
        assert("\x41" == "A")
        assert("\u{48}\u{49}" == "HI")
        assert(#"\z
               " == 0)
        -- comments
        --[[ a long
             comment ]] local after = 1
        assert(after == 1)
    "#,
    );
}

#[test]
fn scoping_and_shadowing() {
    run_ok(
        r#"
        local x = 1
        do
            local x = 2
            assert(x == 2)
        end
        assert(x == 1)
        local y = 10
        local y = y + 1
        assert(y == 11)
    "#,
    );
}
