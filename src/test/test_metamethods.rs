use super::run_ok;

#[test]
fn add_metamethod_combines_operand_tables() {
    run_ok(
        r#"
        local mt = {__add = function(x, y) return {val = x.val + y.val} end}
        local a = setmetatable({val = 5}, mt)
        local b = setmetatable({val = 3}, mt)
        local c = a + b
        assert(c.val == 8)
        "#,
    );
}

#[test]
fn index_metamethod_falls_back_to_table() {
    run_ok(
        r#"
        local defaults = {greeting = "hi"}
        local t = setmetatable({}, {__index = defaults})
        assert(t.greeting == "hi")
        t.greeting = "bye"
        assert(t.greeting == "bye")
        "#,
    );
}

#[test]
fn index_metamethod_chains_through_functions() {
    run_ok(
        r#"
        local t = setmetatable({}, {__index = function(_, key) return key .. "!" end})
        assert(t.anything == "anything!")
        "#,
    );
}

#[test]
fn newindex_metamethod_redirects_writes() {
    run_ok(
        r#"
        local backing = {}
        local t = setmetatable({}, {__newindex = backing})
        t.x = 5
        assert(rawget(t, "x") == nil)
        assert(backing.x == 5)
        "#,
    );
}

#[test]
fn tostring_metamethod_used_by_concat_and_print() {
    run_ok(
        r#"
        local point = setmetatable({x = 1, y = 2}, {
            __tostring = function(p) return "(" .. p.x .. "," .. p.y .. ")" end,
        })
        assert(tostring(point) == "(1,2)")
        "#,
    );
}

#[test]
fn eq_metamethod_only_applies_between_tables() {
    run_ok(
        r#"
        local mt = {__eq = function(a, b) return a.id == b.id end}
        local a = setmetatable({id = 1}, mt)
        local b = setmetatable({id = 1}, mt)
        local c = setmetatable({id = 2}, mt)
        assert(a == b)
        assert(not (a == c))
        "#,
    );
}

#[test]
fn len_metamethod_overrides_hash_length() {
    run_ok(
        r#"
        local t = setmetatable({}, {__len = function() return 42 end})
        assert(#t == 42)
        "#,
    );
}

#[test]
fn call_metamethod_makes_table_callable() {
    run_ok(
        r#"
        local callable = setmetatable({}, {__call = function(self, x) return x * 2 end})
        assert(callable(21) == 42)
        "#,
    );
}

#[test]
fn metatable_protection_blocks_setmetatable() {
    run_ok(
        r#"
        local t = setmetatable({}, {__metatable = "locked"})
        local ok = pcall(setmetatable, t, {})
        assert(ok == false)
        assert(getmetatable(t) == "locked")
        "#,
    );
}
