use super::{run_err, run_ok};

#[test]
fn integer_arithmetic_stays_integer() {
    run_ok(
        r#"
        local a = 7
        local b = 2
        assert(a + b == 9)
        assert(a - b == 5)
        assert(a * b == 14)
        assert(math.type(a + b) == "integer")
        "#,
    );
}

#[test]
fn division_always_floats() {
    run_ok(
        r#"
        local result = 7 / 2
        assert(math.type(result) == "float")
        assert(result == 3.5)
        "#,
    );
}

#[test]
fn floor_division_on_integers_is_floored() {
    run_ok(
        r#"
        assert(7 // 2 == 3)
        assert(-7 // 2 == -4)
        assert(math.type(7 // 2) == "integer")
        "#,
    );
}

#[test]
fn modulo_matches_lua_sign_convention() {
    run_ok(
        r#"
        assert(5 % 3 == 2)
        assert(-5 % 3 == 1)
        "#,
    );
}

#[test]
fn floor_division_with_negative_divisor() {
    run_ok(
        r#"
        assert(7 // -2 == -4)
        assert(-7 // -2 == 3)
        "#,
    );
}

#[test]
fn modulo_with_negative_divisor_takes_divisor_sign() {
    run_ok(
        r#"
        assert(5 % -3 == -1)
        assert(-5 % -3 == -2)
        "#,
    );
}

#[test]
fn integer_division_by_zero_raises() {
    let err = run_err("return 1 // 0");
    assert!(err.contains("0"));
}

#[test]
fn integer_modulo_by_zero_raises() {
    let err = run_err("return 1 % 0");
    assert!(err.contains("0"));
}

#[test]
fn concat_coerces_numbers() {
    run_ok(
        r#"
        assert(("x=" .. 5) == "x=5")
        assert((1 .. 2) == "12")
        "#,
    );
}

#[test]
fn relational_and_equality() {
    run_ok(
        r#"
        assert(1 < 2)
        assert(not (2 < 1))
        assert(2 <= 2)
        assert("abc" < "abd")
        assert(1 == 1.0)
        assert(1 ~= 2)
        "#,
    );
}

#[test]
fn logical_and_or_short_circuit() {
    run_ok(
        r#"
        local calls = 0
        local function bump() calls = calls + 1; return true end
        local x = false and bump()
        assert(calls == 0)
        local y = true or bump()
        assert(calls == 0)
        assert(x == false)
        assert(y == true)
        "#,
    );
}

#[test]
fn bitwise_operators() {
    run_ok(
        r#"
        assert(5 & 3 == 1)
        assert(5 | 2 == 7)
        assert(5 ~ 1 == 4)
        assert(1 << 4 == 16)
        assert(256 >> 4 == 16)
        "#,
    );
}
