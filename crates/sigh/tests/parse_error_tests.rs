//! Syntax errors reported through the public API.

use sigh::{Runner, SighError};

fn parse_error(source: &str) -> String {
    match Runner::new(source, "test.si") {
        Err(SighError::Parse(err)) => err.to_string(),
        Ok(_) => panic!("expected a parse error"),
        Err(other) => panic!("expected a parse error, got: {other}"),
    }
}

#[test]
fn missing_colon_in_var_declaration() {
    let msg = parse_error("var x Int = 1");
    assert!(msg.contains("expected `:`"), "{msg}");
}

#[test]
fn unclosed_block() {
    let msg = parse_error("fun f() { print(\"x\")");
    assert!(msg.contains("expected"), "{msg}");
}

#[test]
fn unrecognized_character() {
    let msg = parse_error("var x: Int = 1 ~ 2");
    assert!(msg.contains("unrecognized token"), "{msg}");
}

#[test]
fn class_bodies_only_hold_members() {
    let msg = parse_error("class A { print(\"no\") }");
    assert!(msg.contains("class body"), "{msg}");
}

#[test]
fn born_takes_names_not_expressions() {
    let msg = parse_error("born(1 + 2)");
    assert!(msg.contains("expected a variable or function name"), "{msg}");
}

#[test]
fn errors_carry_the_line() {
    let msg = parse_error("\nvar x Int = 1");
    assert!(msg.contains("at 2:"), "{msg}");
}
