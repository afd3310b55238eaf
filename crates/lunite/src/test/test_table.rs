// Table semantics: constructors, the array/hash split, length border,
// iteration, key normalization, rehash behavior.

use crate::test::{eval, run, run_ok};
use crate::LuaError;

#[test]
fn mixed_constructor_and_length() {
    let r = eval(r#"local t={10,20,30; name="x"} t[4]=40 return #t, t.name, t[2]"#);
    assert_eq!(r[0].as_integer(), Some(4));
    assert_eq!(r[2].as_integer(), Some(20));
}

#[test]
fn basic_get_set() {
    run_ok(
        r#"
        local t = {}
        t[1] = "a"
        t["k"] = "b"
        t[2.5] = "c"
        t[true] = "d"
        assert(t[1] == "a")
        assert(t.k == "b")
        assert(t[2.5] == "c")
        assert(t[true] == "d")
        t[1] = nil
        assert(t[1] == nil)
    "#,
    );
}

#[test]
fn float_keys_normalize_to_integers() {
    run_ok(
        r#"
        local t = {}
        t[2.0] = "two"
        assert(t[2] == "two")
        t[3] = "three"
        assert(t[3.0] == "three")
    "#,
    );
}

#[test]
fn nil_and_nan_keys_raise() {
    let r = run("local t = {} t[nil] = 1");
    assert!(matches!(r, Err(LuaError::Runtime)));
    let r = run("local t = {} t[0/0] = 1");
    assert!(matches!(r, Err(LuaError::Runtime)));
    // reads just miss
    run_ok("local t = {} assert(t[0/0] == nil)");
}

#[test]
fn many_keys_force_rehash() {
    run_ok(
        r#"
        local t = {}
        for i = 1, 1000 do t[i] = i * 2 end
        for i = 1, 1000 do assert(t[i] == i * 2) end
        assert(#t == 1000)
        for i = 1, 1000 do t["k" .. i] = i end
        for i = 1, 1000 do assert(t["k" .. i] == i) end
        assert(#t == 1000)
    "#,
    );
}

#[test]
fn sparse_integer_keys() {
    run_ok(
        r#"
        local t = {}
        t[1] = 1
        t[1000000] = 2
        assert(t[1] == 1 and t[1000000] == 2)
    "#,
    );
}

#[test]
fn pairs_visits_every_entry_once() {
    run_ok(
        r#"
        local t = { 1, 2, 3, a = 4, b = 5 }
        local seen, count = {}, 0
        for k, v in pairs(t) do
            assert(seen[k] == nil)
            seen[k] = v
            count = count + 1
        end
        assert(count == 5)
        assert(seen[1] == 1 and seen[2] == 2 and seen[3] == 3)
        assert(seen.a == 4 and seen.b == 5)
    "#,
    );
}

#[test]
fn next_allows_clearing_current_key() {
    run_ok(
        r#"
        local t = { a = 1, b = 2, c = 3 }
        for k in pairs(t) do t[k] = nil end
        assert(next(t) == nil)
    "#,
    );
}

#[test]
fn ipairs_stops_at_first_hole() {
    run_ok(
        r#"
        local t = { 1, 2, nil, 4 }
        local n = 0
        for i, v in ipairs(t) do n = i end
        assert(n == 2)
    "#,
    );
}

#[test]
fn large_constructor_uses_setlist_batches() {
    // more entries than one SETLIST flush (50) can carry
    let mut src = String::from("local t = {");
    for i in 1..=120 {
        src.push_str(&format!("{},", i));
    }
    src.push_str("} assert(#t == 120) for i = 1, 120 do assert(t[i] == i) end");
    run_ok(&src);
}

#[test]
fn constructor_with_trailing_call_expands() {
    run_ok(
        r#"
        local function three() return 7, 8, 9 end
        local t = { 1, 2, three() }
        assert(#t == 5)
        assert(t[3] == 7 and t[4] == 8 and t[5] == 9)
        local u = { three(), 1 }
        assert(u[1] == 7 and u[2] == 1)
    "#,
    );
}

#[test]
fn length_border_with_holes() {
    // a border is any n with t[n] ~= nil and t[n+1] == nil
    run_ok(
        r#"
        local t = {1, 2, 3}
        assert(#t == 3)
        t[3] = nil
        local n = #t
        assert(n == 2 or n == 3)
    "#,
    );
}

#[test]
fn select_and_unpack_style_access() {
    run_ok(
        r#"
        local function pack(...) return select('#', ...), ... end
        local n, a, b = pack(10, 20)
        assert(n == 2 and a == 10 and b == 20)
        assert(select(2, "a", "b", "c") == "b")
        assert(select(-1, "a", "b", "c") == "c")
    "#,
    );
}
