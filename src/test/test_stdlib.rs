use super::{assert_global_true, run_ok};

#[test]
fn string_basic_functions() {
    run_ok(
        r#"
        assert(string.len("hello") == 5)
        assert(string.upper("hi") == "HI")
        assert(string.lower("HI") == "hi")
        assert(string.sub("hello world", 1, 5) == "hello")
        assert(string.sub("hello world", -5) == "world")
        assert(string.rep("ab", 3) == "ababab")
        assert(string.rep("ab", 3, "-") == "ab-ab-ab")
        assert(string.reverse("abc") == "cba")
        assert(string.byte("A") == 65)
        assert(string.char(65, 66) == "AB")
        "#,
    );
}

#[test]
fn string_format_directives() {
    run_ok(
        r#"
        assert(string.format("%d", 42) == "42")
        assert(string.format("%5d", 3) == "    3")
        assert(string.format("%-5d|", 3) == "3    |")
        assert(string.format("%s %s", "a", "b") == "a b")
        assert(string.format("%x", 255) == "ff")
        assert(string.format("%%") == "%")
        "#,
    );
}

#[test]
fn string_find_and_match_with_patterns() {
    run_ok(
        r#"
        local s, e = string.find("hello world", "wor")
        assert(s == 7 and e == 9)

        local digit = string.match("abc123", "%d+")
        assert(digit == "123")

        local key, value = string.match("name=value", "(%a+)=(%a+)")
        assert(key == "name")
        assert(value == "value")
        "#,
    );
}

#[test]
fn string_gmatch_iterates_all_matches() {
    run_ok(
        r#"
        local words = {}
        for word in string.gmatch("the quick brown fox", "%a+") do
            table.insert(words, word)
        end
        assert(#words == 4)
        assert(words[1] == "the")
        assert(words[4] == "fox")
        "#,
    );
}

#[test]
fn string_gsub_replaces_with_count() {
    run_ok(
        r#"
        local result, n = string.gsub("hello world", "o", "0")
        assert(result == "hell0 w0rld")
        assert(n == 2)

        local templated = string.gsub("hello", "(l)(l)", "%2%1")
        assert(templated == "hello")
        "#,
    );
}

#[test]
fn table_library_functions() {
    run_ok(
        r#"
        local t = {5, 3, 1, 4, 2}
        table.sort(t)
        assert(t[1] == 1 and t[5] == 5)

        table.sort(t, function(a, b) return a > b end)
        assert(t[1] == 5 and t[5] == 1)

        assert(table.concat({"a", "b", "c"}, ",") == "a,b,c")

        local packed = table.pack(1, 2, 3)
        assert(packed.n == 3)

        local a, b, c = table.unpack({10, 20, 30})
        assert(a == 10 and b == 20 and c == 30)
        "#,
    );
}

#[test]
fn math_library_functions() {
    run_ok(
        r#"
        assert(math.floor(3.7) == 3)
        assert(math.ceil(3.2) == 4)
        assert(math.abs(-5) == 5)
        assert(math.max(1, 5, 3) == 5)
        assert(math.min(1, 5, 3) == 1)
        assert(math.type(1) == "integer")
        assert(math.type(1.0) == "float")
        assert(math.tointeger(3.0) == 3)
        assert(math.tointeger(3.5) == nil)
        local r = math.random(1, 10)
        assert(r >= 1 and r <= 10)
        "#,
    );
}

#[test]
fn pcall_and_error_interop() {
    run_ok(
        r#"
        local ok, err = pcall(function() error("bad thing") end)
        assert(ok == false)
        assert(string.find(err, "bad thing") ~= nil)

        local ok2, value = pcall(function() return 10 + 5 end)
        assert(ok2 == true)
        assert(value == 15)
        "#,
    );
}

#[test]
fn debug_traceback_includes_message() {
    let vm = run_ok(
        r#"
        trace = debug.traceback("context")
        has_message = string.find(trace, "context") ~= nil
        "#,
    );
    assert_global_true(&vm, "has_message");
}

#[test]
fn debug_traceback_level_skips_innermost_frames() {
    let vm = run_ok(
        r#"
        local function inner()
            return debug.traceback("x", 0), debug.traceback("x", 1)
        end
        local full, skipped = inner()
        full_lines = 0
        for _ in string.gmatch(full, "\n") do full_lines = full_lines + 1 end
        skipped_lines = 0
        for _ in string.gmatch(skipped, "\n") do skipped_lines = skipped_lines + 1 end
        fewer_lines_when_skipped = skipped_lines < full_lines
        "#,
    );
    assert_global_true(&vm, "fewer_lines_when_skipped");
}

#[test]
fn error_level_reports_callers_line() {
    run_ok(
        r#"
        local function raiser()
            error("boom", 2)
        end
        local function caller()
            raiser()
        end
        local ok, err = pcall(caller)
        assert(ok == false)
        assert(string.find(err, "boom") ~= nil)
        "#,
    );
}

#[test]
fn error_level_zero_omits_location() {
    run_ok(
        r#"
        local ok, err = pcall(function() error("plain", 0) end)
        assert(ok == false)
        assert(err == "plain")
        "#,
    );
}

#[test]
fn package_sandbox_inherits_selected_globals() {
    run_ok(
        r#"
        x = 42
        local sb = package.sandbox("demo", _G, true)
        assert(sb.x == 42)
        assert(package.loaded.demo == sb)

        local bare = package.sandbox("bare")
        assert(bare.x == nil)
        "#,
    );
}

#[test]
fn load_compiles_and_runs_a_chunk() {
    run_ok(
        r#"
        local f = load("return 1 + 2")
        assert(f() == 3)

        local bad, msg = load("this is not lua")
        assert(bad == nil)
        assert(type(msg) == "string")
        "#,
    );
}

#[test]
fn load_with_custom_env_scopes_top_level_globals() {
    run_ok(
        r#"
        local env = { print = print }
        local f = load("seen = 99", "chunk", env)
        f()
        assert(env.seen == 99)
        assert(seen == nil)
        "#,
    );
}
