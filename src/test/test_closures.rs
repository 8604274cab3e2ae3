use super::run_ok;

#[test]
fn counter_closure_shares_captured_state() {
    run_ok(
        r#"
        local function make_counter()
            local n = 0
            return function()
                n = n + 1
                return n
            end
        end
        local counter = make_counter()
        assert(counter() == 1)
        assert(counter() == 2)
        assert(counter() == 3)
        "#,
    );
}

#[test]
fn independent_closures_do_not_share_state() {
    run_ok(
        r#"
        local function make_counter()
            local n = 0
            return function()
                n = n + 1
                return n
            end
        end
        local a = make_counter()
        local b = make_counter()
        a()
        a()
        assert(a() == 3)
        assert(b() == 1)
        "#,
    );
}

#[test]
fn recursive_local_function() {
    run_ok(
        r#"
        local function fact(n)
            if n <= 1 then return 1 end
            return n * fact(n - 1)
        end
        assert(fact(5) == 120)
        "#,
    );
}

#[test]
fn varargs_forward_through_select() {
    run_ok(
        r##"
        local function sum(...)
            local total = 0
            for i = 1, select("#", ...) do
                total = total + select(i, ...)
            end
            return total
        end
        assert(sum(1, 2, 3, 4) == 10)
        "##,
    );
}

#[test]
fn closures_over_loop_variable_capture_snapshot() {
    run_ok(
        r#"
        local fns = {}
        for i = 1, 3 do
            fns[i] = function() return i end
        end
        assert(fns[1]() == 1)
        assert(fns[2]() == 2)
        assert(fns[3]() == 3)
        "#,
    );
}
