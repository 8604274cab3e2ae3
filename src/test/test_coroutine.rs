use super::run_ok;

#[test]
fn create_and_resume_returns_final_value() {
    run_ok(
        r#"
        local co = coroutine.create(function()
            return 42
        end)
        assert(type(co) == "thread")
        local ok, value = coroutine.resume(co)
        assert(ok == true)
        assert(value == 42)
        assert(coroutine.status(co) == "dead")
        "#,
    );
}

#[test]
fn yield_suspends_and_resumes_with_values() {
    run_ok(
        r#"
        local co = coroutine.create(function()
            coroutine.yield(1)
            coroutine.yield(2)
            return 3
        end)

        local ok1, v1 = coroutine.resume(co)
        assert(ok1 == true and v1 == 1)
        assert(coroutine.status(co) == "suspended")

        local ok2, v2 = coroutine.resume(co)
        assert(ok2 == true and v2 == 2)

        local ok3, v3 = coroutine.resume(co)
        assert(ok3 == true and v3 == 3)
        assert(coroutine.status(co) == "dead")
        "#,
    );
}

#[test]
fn resume_passes_arguments_into_yield_point() {
    run_ok(
        r#"
        local co = coroutine.create(function(a)
            local b = coroutine.yield(a + 1)
            return a + b
        end)
        local ok1, first = coroutine.resume(co, 10)
        assert(ok1 == true and first == 11)
        local ok2, second = coroutine.resume(co, 5)
        assert(ok2 == true and second == 15)
        "#,
    );
}

#[test]
fn error_inside_coroutine_is_reported_not_propagated() {
    run_ok(
        r#"
        local co = coroutine.create(function()
            error("boom")
        end)
        local ok, err = coroutine.resume(co)
        assert(ok == false)
        assert(type(err) == "string")
        assert(coroutine.status(co) == "dead")
        "#,
    );
}

#[test]
fn wrap_reraises_instead_of_returning_false() {
    run_ok(
        r#"
        local next_value = coroutine.wrap(function()
            coroutine.yield(1)
            coroutine.yield(2)
        end)
        assert(next_value() == 1)
        assert(next_value() == 2)
        "#,
    );
}

#[test]
fn close_marks_a_suspended_coroutine_dead() {
    run_ok(
        r#"
        local co = coroutine.create(function()
            coroutine.yield()
        end)
        coroutine.resume(co)
        assert(coroutine.status(co) == "suspended")
        local ok = coroutine.close(co)
        assert(ok == true)
        assert(coroutine.status(co) == "dead")
        "#,
    );
}

#[test]
fn isyieldable_reflects_coroutine_context() {
    run_ok(
        r#"
        assert(coroutine.isyieldable() == false)
        local co = coroutine.create(function()
            assert(coroutine.isyieldable() == true)
        end)
        coroutine.resume(co)
        "#,
    );
}
