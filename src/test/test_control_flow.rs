use super::{compile_err, run_ok};

#[test]
fn if_else_branches() {
    run_ok(
        r#"
        local x = 10
        local result = "unset"
        if x > 5 then
            result = "greater"
        else
            result = "less or equal"
        end
        assert(result == "greater")
        "#,
    );
}

#[test]
fn if_elseif_chain() {
    run_ok(
        r#"
        local function classify(x)
            if x > 0 then
                return "positive"
            elseif x < 0 then
                return "negative"
            else
                return "zero"
            end
        end
        assert(classify(5) == "positive")
        assert(classify(-5) == "negative")
        assert(classify(0) == "zero")
        "#,
    );
}

#[test]
fn while_loop_accumulates() {
    run_ok(
        r#"
        local i = 0
        local sum = 0
        while i < 5 do
            i = i + 1
            sum = sum + i
        end
        assert(i == 5)
        assert(sum == 15)
        "#,
    );
}

#[test]
fn repeat_until_runs_at_least_once() {
    run_ok(
        r#"
        local i = 0
        repeat
            i = i + 1
        until i >= 5
        assert(i == 5)
        "#,
    );
}

#[test]
fn numeric_for_loop() {
    run_ok(
        r#"
        local total = 0
        for i = 1, 10 do
            total = total + i
        end
        assert(total == 55)
        "#,
    );
}

#[test]
fn numeric_for_loop_with_step() {
    run_ok(
        r#"
        local seen = {}
        for i = 10, 1, -2 do
            table.insert(seen, i)
        end
        assert(#seen == 5)
        assert(seen[1] == 10)
        assert(seen[5] == 2)
        "#,
    );
}

#[test]
fn generic_for_with_ipairs() {
    run_ok(
        r#"
        local t = {"a", "b", "c"}
        local out = ""
        for i, v in ipairs(t) do
            out = out .. i .. v
        end
        assert(out == "1a2b3c")
        "#,
    );
}

#[test]
fn break_exits_loop_early() {
    run_ok(
        r#"
        local i = 0
        while true do
            i = i + 1
            if i == 3 then break end
        end
        assert(i == 3)
        "#,
    );
}

#[test]
fn goto_skips_forward_within_same_block() {
    run_ok(
        r#"
        local out = ""
        goto skip
        out = out .. "a"
        ::skip::
        out = out .. "b"
        assert(out == "b")
        "#,
    );
}

#[test]
fn goto_jumps_backward_to_reenter_loop() {
    run_ok(
        r#"
        local i = 0
        ::top::
        i = i + 1
        if i < 5 then goto top end
        assert(i == 5)
        "#,
    );
}

#[test]
fn goto_to_undefined_label_is_a_compile_error() {
    let err = compile_err(
        r#"
        goto nowhere
        "#,
    );
    assert!(err.contains("nowhere"), "unexpected message: {}", err);
}

#[test]
fn goto_into_scope_of_later_local_is_rejected() {
    let err = compile_err(
        r#"
        goto skip
        local x = 1
        ::skip::
        "#,
    );
    assert!(err.contains("scope"), "unexpected message: {}", err);
}
