// Control flow: branches, loops, break, goto, short-circuit evaluation.

use crate::test::run_ok;

#[test]
fn if_elseif_else() {
    run_ok(
        r#"
        local function classify(n)
            if n < 0 then return "neg"
            elseif n == 0 then return "zero"
            else return "pos" end
        end
        assert(classify(-5) == "neg")
        assert(classify(0) == "zero")
        assert(classify(9) == "pos")
    "#,
    );
}

#[test]
fn while_and_repeat() {
    run_ok(
        r#"
        local n, sum = 0, 0
        while n < 10 do n = n + 1 sum = sum + n end
        assert(sum == 55)
        local i = 0
        repeat i = i + 1 until i >= 3
        assert(i == 3)
        -- the until expression sees body locals
        local k = 0
        repeat local done = k > 1 k = k + 1 until done
        assert(k == 3)
    "#,
    );
}

#[test]
fn numeric_for_variants() {
    run_ok(
        r#"
        local sum = 0
        for i = 1, 5 do sum = sum + i end
        assert(sum == 15)
        local down = {}
        for i = 3, 1, -1 do down[#down + 1] = i end
        assert(down[1] == 3 and down[3] == 1)
        local count = 0
        for i = 1, 0 do count = count + 1 end
        assert(count == 0)
        local fsum = 0.0
        for x = 0.5, 2.5, 0.5 do fsum = fsum + x end
        assert(fsum == 7.5)
        -- the loop variable is a per-iteration copy
        local last
        for i = 1, 3 do last = i i = 100 end
        assert(last == 3)
    "#,
    );
}

#[test]
fn generic_for_over_ipairs_and_pairs() {
    run_ok(
        r#"
        local t = { "a", "b", "c" }
        local joined = ""
        for _, v in ipairs(t) do joined = joined .. v end
        assert(joined == "abc")
        local total = 0
        for k in pairs({ x = 1, y = 2 }) do total = total + 1 end
        assert(total == 2)
    "#,
    );
}

#[test]
fn break_exits_innermost_loop() {
    run_ok(
        r#"
        local hits = 0
        for i = 1, 10 do
            if i > 3 then break end
            hits = hits + 1
        end
        assert(hits == 3)
        local outer = 0
        for i = 1, 3 do
            for j = 1, 3 do
                if j == 2 then break end
                outer = outer + 1
            end
        end
        assert(outer == 3)
    "#,
    );
}

#[test]
fn goto_and_labels() {
    run_ok(
        r#"
        local n = 0
        ::again::
        n = n + 1
        if n < 5 then goto again end
        assert(n == 5)
        -- continue idiom
        local evens = 0
        for i = 1, 10 do
            if i % 2 == 1 then goto continue end
            evens = evens + 1
            ::continue::
        end
        assert(evens == 5)
    "#,
    );
}

#[test]
fn short_circuit_and_or() {
    run_ok(
        r#"
        local calls = 0
        local function bump(v) calls = calls + 1 return v end
        assert((false and bump(true)) == false)
        assert(calls == 0)
        assert((true or bump(true)) == true)
        assert(calls == 0)
        assert((nil or "default") == "default")
        assert((false or nil) == nil)
        assert((1 and 2) == 2)
        local x = nil
        assert((x and x.field) == nil)
    "#,
    );
}

#[test]
fn multiple_assignment() {
    run_ok(
        r#"
        local a, b, c = 1, 2
        assert(a == 1 and b == 2 and c == nil)
        a, b = b, a
        assert(a == 2 and b == 1)
        local t = { 1, 2 }
        t[1], t[2] = t[2], t[1]
        assert(t[1] == 2 and t[2] == 1)
        local function two() return 10, 20 end
        local x, y, z = two(), 30
        assert(x == 10 and y == 30 and z == nil)
        local p, q = 5, two()
        assert(p == 5 and q == 10)
    "#,
    );
}

#[test]
fn nested_function_statements() {
    run_ok(
        r#"
        local lib = {}
        lib.inner = {}
        function lib.inner.f() return "deep" end
        assert(lib.inner.f() == "deep")
    "#,
    );
}
