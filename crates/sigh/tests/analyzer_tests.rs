//! Tests for semantic analysis: every error is collected (analysis never
//! stops at the first problem) and attached to a source position.

use sigh::{Runner, SighError};

/// Analyzes a program expected to fail and returns the error messages.
fn errors(source: &str) -> Vec<String> {
    match Runner::new(source, "test.si") {
        Err(SighError::Semantic(errors)) => errors.into_iter().map(|e| e.msg).collect(),
        Ok(_) => panic!("expected semantic errors, analysis succeeded"),
        Err(other) => panic!("expected semantic errors, got: {other}"),
    }
}

fn assert_has(errors: &[String], needle: &str) {
    assert!(
        errors.iter().any(|e| e.contains(needle)),
        "no error contains {needle:?}, got: {errors:#?}"
    );
}

fn analyzes(source: &str) {
    Runner::new(source, "test.si").unwrap();
}

// === resolution ===

#[test]
fn unknown_name() {
    let errs = errors("foo");
    assert_has(&errs, "Could not resolve: foo");
}

#[test]
fn variable_used_before_declaration() {
    let errs = errors("print(\"\" + y)\nvar y: Int = 1");
    assert_has(&errs, "Variable used before declaration: y");
}

#[test]
fn forward_function_references_are_fine() {
    analyzes("fun a(): Int { return b() }\nfun b(): Int { return 1 }");
}

#[test]
fn constructor_of_non_struct_is_rejected() {
    let errs = errors("var x: Int = 0\nvar y: Int = $x(1)");
    assert_has(&errs, "$ must be applied to a struct");
}

// === shapes ===

#[test]
fn wrong_argument_count() {
    let errs = errors("fun f(a: Int) {}\nf()");
    assert_has(&errs, "Wrong number of arguments: expected 1, got 0");
}

#[test]
fn wrong_argument_type() {
    let errs = errors("fun f(a: Int) {}\nf(\"nope\")");
    assert_has(&errs, "Argument 1 has type String, expected Int");
}

#[test]
fn initializer_type_mismatch() {
    let errs = errors("var x: Int = \"hello\"");
    assert_has(&errs, "initialize variable `x` of type Int with a value of type String");
}

#[test]
fn assignment_type_mismatch() {
    let errs = errors("var x: Int = 1\nx = \"s\"");
    assert_has(&errs, "assign a value of type String to a non-compatible lvalue of type Int");
}

#[test]
fn indexing_a_non_array() {
    let errs = errors("var x: Int = 1\nvar y: Int = x[0]");
    assert_has(&errs, "Trying to index a non-array expression of type Int");
}

#[test]
fn non_int_index() {
    let errs = errors("var xs: Int[] = [1]\nvar y: Int = xs[1.5]");
    assert_has(&errs, "non-Int index of type Float");
}

#[test]
fn arrays_only_have_length() {
    let errs = errors("var xs: Int[] = [1]\nvar y: Int = xs.size");
    assert_has(&errs, "Arrays only have a `length` field, not `size`");
}

#[test]
fn unknown_struct_field() {
    let errs = errors("struct Pair { var a: Int }\nvar p: Pair = $Pair(1)\nvar y: Int = p.b");
    assert_has(&errs, "Unknown field `b` in struct `Pair`");
}

#[test]
fn array_elements_need_a_common_supertype() {
    let errs = errors("var xs: Int[] = [1, \"two\"]");
    assert_has(&errs, "No common supertype");
}

#[test]
fn empty_array_without_context_is_rejected() {
    let errs = errors("var x: Auto = []");
    assert_has(&errs, "Cannot infer the type of this empty array literal");
}

#[test]
fn auto_infers_from_initializer() {
    analyzes("var x: Auto = 1\nvar y: Float = x + 0.5");
}

#[test]
fn incompatible_class_shapes_are_detailed() {
    let errs = errors(
        r#"
class One {
    fun One() {}
    var a: Int = 1
}
class Two {
    fun Two() {}
    var a: String = "s"
    var b: Int = 2
}
var x: Two = One()
"#,
    );
    assert_has(&errs, "field `a` has type Int, expected String");
    assert_has(&errs, "missing field `b`");
}

// === inheritance ===

#[test]
fn undeclared_ancestor() {
    let errs = errors("class A sonOf Nothing { fun A() {} }");
    assert_has(&errs, "Undeclared ancestor of class `A`: `Nothing`");
}

#[test]
fn parent_must_be_a_class() {
    let errs = errors("var B: Int = 1\nclass A sonOf B { fun A() {} }");
    assert_has(&errs, "Parent of class `A` is not a class: `B`");
}

#[test]
fn cyclic_inheritance() {
    let errs = errors("class A sonOf B { fun A() {} }\nclass B sonOf A { fun B() {} }");
    assert_has(&errs, "Cyclic inheritance");
}

#[test]
fn missing_constructor() {
    let errs = errors("class A { var a: Int = 1 }");
    assert_has(&errs, "Missing constructor for class `A`");
}

#[test]
fn constructor_must_return_void() {
    let errs = errors("class A { fun A(): Int { return 1 } }");
    assert_has(&errs, "Constructor `A` must have return type Void");
}

#[test]
fn class_names_must_be_capitalized() {
    let errs = errors("class lower { fun lower() {} }");
    assert_has(&errs, "Class names must be capitalized: `lower`");
}

#[test]
fn daddy_is_a_reserved_function_name() {
    let errs = errors("fun Daddy() {}");
    assert_has(&errs, "Daddy cannot be used as a function name");
}

#[test]
fn variables_cannot_be_overridden() {
    let errs = errors(
        r#"
class Base {
    fun Base() {}
    var a: Int = 1
}
class Derived sonOf Base {
    fun Derived() {}
    var a: Int = 2
}
"#,
    );
    assert_has(&errs, "cannot override variable");
}

#[test]
fn overriding_keeps_the_parent_signature() {
    let errs = errors(
        r#"
class Base {
    fun Base() {}
    fun m(a: Int) {}
}
class Derived sonOf Base {
    fun Derived() {}
    fun m(a: String) {}
}
"#,
    );
    assert_has(&errs, "Overriding method `m` must keep the inherited signature");
}

// === control flow ===

#[test]
fn missing_return() {
    let errs = errors("fun f(): Int { var x: Int = 1 }");
    assert_has(&errs, "Missing return in function `f`");
}

#[test]
fn return_in_both_branches_satisfies_the_checker() {
    analyzes("fun f(): Int { if true { return 1 } else { return 2 } }");
}

#[test]
fn one_armed_if_does_not_count_as_returning() {
    let errs = errors("fun f(): Int { if true { return 1 } }");
    assert_has(&errs, "Missing return in function `f`");
}

#[test]
fn void_function_cannot_return_a_value() {
    let errs = errors("fun f() { return 1 }");
    assert_has(&errs, "Returning a value of type Int from a Void function");
}

#[test]
fn valued_function_cannot_return_bare() {
    let errs = errors("fun f(): Int { return }");
    assert_has(&errs, "Return without a value in a function returning Int");
}

#[test]
fn if_condition_must_be_bool() {
    let errs = errors("if 1 { print(\"x\") }");
    assert_has(&errs, "If condition must be a Bool, got Int");
}

#[test]
fn while_condition_must_be_bool() {
    let errs = errors("while 1.5 { print(\"x\") }");
    assert_has(&errs, "While condition must be a Bool, got Float");
}

#[test]
fn daddy_outside_a_method() {
    let errs = errors("fun f() { Daddy() }");
    assert_has(&errs, "Daddy calls must be located inside a method");
}

#[test]
fn daddy_without_an_overridden_method() {
    let errs = errors(
        r#"
class A {
    fun A() {}
    fun m() { Daddy() }
}
"#,
    );
    assert_has(&errs, "Daddy call in a method that overrides no parent method");
}

// === async ===

#[test]
fn born_requires_an_async_function() {
    let errs = errors("fun f() {}\nf()\nborn(f)");
    assert_has(&errs, "born expects an async function");
}

#[test]
fn born_cannot_capture_a_void_result() {
    let errs = errors(
        r#"
fun f(): Unborn<Void> { var x: Int = 1 }
var v: Int = 0
f()
born(f, v)
"#,
    );
    assert_has(&errs, "Cannot store the result of a Void async function");
}

#[test]
fn async_methods_are_sealed_from_the_outside() {
    let errs = errors(
        r#"
class A {
    fun A() {}
    fun work(): Unborn<Int> { return 1 }
}
var a: A = A()
a.work()
"#,
    );
    assert_has(&errs, "Async method `work` may only be called from inside class `A`");
}

// === error collection ===

#[test]
fn multiple_errors_are_reported_together() {
    let errs = errors("var x: Int = \"one\"\nvar y: Bool = 2\nz");
    assert_has(&errs, "initialize variable `x`");
    assert_has(&errs, "initialize variable `y`");
    assert_has(&errs, "Could not resolve: z");
    assert!(errs.len() >= 3);
}

#[test]
fn errors_carry_positions() {
    match Runner::new("\n\nboom", "test.si") {
        Err(SighError::Semantic(errors)) => {
            assert_eq!(errors[0].range.start.line, 3);
        }
        other => panic!("expected semantic errors, got {:?}", other.is_ok()),
    }
}
