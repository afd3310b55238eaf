// Metamethod dispatch: operators, index chains, equality, call, tostring.

use crate::test::{eval, run_ok};

#[test]
fn add_metamethod_dispatch() {
    let r = eval(
        r#"
        local mt = { __add = function(a,b) return a.v + b.v end }
        local x = setmetatable({v=3}, mt)
        local y = setmetatable({v=4}, mt)
        return x + y
    "#,
    );
    assert_eq!(r[0].as_integer(), Some(7));
}

#[test]
fn arithmetic_falls_back_to_second_operand() {
    run_ok(
        r#"
        local mt = { __mul = function(a, b)
            if type(a) == "number" then return a * b.v end
            return a.v * b
        end }
        local x = setmetatable({ v = 6 }, mt)
        assert(2 * x == 12)
        assert(x * 3 == 18)
    "#,
    );
}

#[test]
fn index_function_and_table_chain() {
    run_ok(
        r#"
        local base = { greeting = "hi" }
        local derived = setmetatable({}, { __index = base })
        assert(derived.greeting == "hi")
        derived.greeting = "own"
        assert(derived.greeting == "own")
        assert(base.greeting == "hi")

        local logged = setmetatable({}, { __index = function(t, k)
            return "missing:" .. k
        end })
        assert(logged.anything == "missing:anything")

        -- two-level chain
        local top = setmetatable({}, { __index = derived })
        assert(top.greeting == "own")
    "#,
    );
}

#[test]
fn newindex_redirects_writes() {
    run_ok(
        r#"
        local store = {}
        local proxy = setmetatable({}, {
            __newindex = function(t, k, v) store[k] = v end,
            __index = store,
        })
        proxy.a = 1
        assert(rawget(proxy, "a") == nil)
        assert(store.a == 1)
        assert(proxy.a == 1)

        -- __newindex as a table writes through
        local target = {}
        local t2 = setmetatable({}, { __newindex = target })
        t2.x = 9
        assert(target.x == 9)
        assert(rawget(t2, "x") == nil)
    "#,
    );
}

#[test]
fn eq_only_between_same_kind() {
    run_ok(
        r#"
        local mt = { __eq = function(a, b) return a.id == b.id end }
        local a = setmetatable({ id = 1 }, mt)
        local b = setmetatable({ id = 1 }, mt)
        local c = setmetatable({ id = 2 }, mt)
        assert(a == b)
        assert(a ~= c)
        assert(a ~= 1)
        assert(a ~= "a")
        -- identity short-circuits without calling __eq
        assert(a == a)
    "#,
    );
}

#[test]
fn comparison_metamethods() {
    run_ok(
        r#"
        local mt
        mt = { __lt = function(a, b) return a.v < b.v end,
               __le = function(a, b) return a.v <= b.v end }
        local small = setmetatable({ v = 1 }, mt)
        local big = setmetatable({ v = 2 }, mt)
        assert(small < big)
        assert(small <= big)
        assert(not (big < small))
        assert(big > small)
        assert(big >= small)
    "#,
    );
}

#[test]
fn len_and_concat() {
    run_ok(
        r#"
        local sized = setmetatable({}, { __len = function() return 42 end })
        assert(#sized == 42)
        local tag = setmetatable({}, { __concat = function(a, b)
            if type(a) == "string" then return a .. "<obj>" end
            return "<obj>" .. b
        end })
        assert(("x" .. tag) == "x<obj>")
        assert((tag .. "y") == "<obj>y")
    "#,
    );
}

#[test]
fn call_metamethod() {
    run_ok(
        r#"
        local callable = setmetatable({ factor = 3 }, {
            __call = function(self, n) return self.factor * n end,
        })
        assert(callable(5) == 15)
    "#,
    );
}

#[test]
fn unary_minus_metamethod() {
    run_ok(
        r#"
        local mt = { __unm = function(a) return setmetatable({ v = -a.v }, getmetatable(a)) end }
        local x = setmetatable({ v = 7 }, mt)
        assert((-x).v == -7)
    "#,
    );
}

#[test]
fn tostring_metamethod() {
    run_ok(
        r#"
        local named = setmetatable({}, { __tostring = function() return "I am named" end })
        assert(tostring(named) == "I am named")
        assert(tostring(12) == "12")
        assert(tostring(nil) == "nil")
        assert(tostring(true) == "true")
    "#,
    );
}

#[test]
fn metatable_protection() {
    run_ok(
        r#"
        local t = setmetatable({}, { __metatable = "locked" })
        assert(getmetatable(t) == "locked")
        local ok = pcall(setmetatable, t, {})
        assert(ok == false)
    "#,
    );
}

#[test]
fn rawops_bypass_metamethods() {
    run_ok(
        r#"
        local t = setmetatable({}, {
            __index = function() return "virtual" end,
            __newindex = function() error("blocked") end,
        })
        assert(t.x == "virtual")
        assert(rawget(t, "x") == nil)
        rawset(t, "x", 1)
        assert(rawget(t, "x") == 1)
        assert(rawequal(t, t))
        assert(rawlen({1, 2}) == 2)
    "#,
    );
}

#[test]
fn absent_metamethod_cache_invalidation() {
    run_ok(
        r#"
        local mt = {}
        local t = setmetatable({}, mt)
        -- miss populates the absent cache
        assert(t.missing == nil)
        -- mutating the metatable must invalidate it
        mt.__index = function() return "found" end
        assert(t.missing == "found")
    "#,
    );
}
