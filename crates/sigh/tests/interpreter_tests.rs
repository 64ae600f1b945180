//! End-to-end tests for the interpreter over plain (class-free) programs.

use pretty_assertions::assert_eq;
use sigh::{CollectStringPrint, Object, Runner, RuntimeErrorKind, SighError};

/// Runs a program and returns its top-level return value and print output.
fn run(source: &str) -> (Option<Object>, String) {
    let runner = Runner::new(source, "test.si").unwrap();
    let mut print = CollectStringPrint::new();
    let result = runner.run(&mut print).unwrap();
    (result, print.into_output())
}

fn run_err(source: &str) -> RuntimeErrorKind {
    let runner = Runner::new(source, "test.si").unwrap();
    let mut print = CollectStringPrint::new();
    match runner.run(&mut print) {
        Err(SighError::Runtime(err)) => err.kind,
        Ok(value) => panic!("expected a runtime error, got {value:?}"),
        Err(other) => panic!("expected a runtime error, got {other}"),
    }
}

#[test]
fn print_writes_line_and_returns_its_argument() {
    let (_, output) = run(r#"var s: String = print("hi")
print(s)"#);
    assert_eq!(output, "hi\nhi\n");
}

#[test]
fn integer_arithmetic_and_precedence() {
    let (_, output) = run(r#"print("" + (1 + 2 * 3))"#);
    assert_eq!(output, "7\n");
}

#[test]
fn integer_division_truncates() {
    let (_, output) = run(r#"print("" + (7 / 2))"#);
    assert_eq!(output, "3\n");
}

#[test]
fn mixed_arithmetic_widens_to_float() {
    let (_, output) = run(r#"print("" + (1.5 + 1))"#);
    assert_eq!(output, "2.5\n");
}

#[test]
fn string_concatenation_converts_operands() {
    let (_, output) = run(r#"print("a" + 1 + "b" + true)"#);
    assert_eq!(output, "a1btrue\n");
}

#[test]
fn logic_operators_short_circuit() {
    // the right operand would divide by zero if evaluated
    let (_, output) = run(r#"
var x: Int = 0
if false && 1 / x == 1 { print("and") }
if true || 1 / x == 1 { print("or") }
"#);
    assert_eq!(output, "or\n");
}

#[test]
fn while_loop_accumulates() {
    let (_, output) = run(r#"
var i: Int = 0
var total: Int = 0
while i < 5 { total = total + i; i = i + 1 }
print("" + total)
"#);
    assert_eq!(output, "10\n");
}

#[test]
fn recursion_works() {
    let (_, output) = run(r#"
fun fact(n: Int): Int {
    if n <= 1 { return 1 }
    return n * fact(n - 1)
}
print("" + fact(5))
"#);
    assert_eq!(output, "120\n");
}

#[test]
fn parameters_widen_ints_into_float_slots() {
    let (_, output) = run(r#"
fun same(x: Float): Float { return x }
print("" + same(1))
"#);
    assert_eq!(output, "1.0\n");
}

#[test]
fn forward_reference_to_function() {
    let (_, output) = run(r#"
print("" + later())
fun later(): Int { return 9 }
"#);
    assert_eq!(output, "9\n");
}

#[test]
fn arrays_index_assign_and_length() {
    let (_, output) = run(r#"
var xs: Int[] = [1, 2, 3]
xs[1] = 20
print("" + xs[1] + "," + xs.length)
"#);
    assert_eq!(output, "20,3\n");
}

#[test]
fn empty_array_literal_typed_by_declaration() {
    let (_, output) = run(r#"
var xs: Int[] = []
print("" + xs.length)
"#);
    assert_eq!(output, "0\n");
}

#[test]
fn structs_construct_read_and_write() {
    let (_, output) = run(r#"
struct Pair { var a: Int var b: Int }
var p: Pair = $Pair(1, 2)
p.b = 20
print("" + p.a + "," + p.b)
"#);
    assert_eq!(output, "1,20\n");
}

#[test]
fn struct_equality_is_identity() {
    let (_, output) = run(r#"
struct Pair { var a: Int var b: Int }
var p: Pair = $Pair(1, 2)
var q: Pair = $Pair(1, 2)
var alias: Pair = p
print("" + (p == q) + "," + (p == alias))
"#);
    assert_eq!(output, "false,true\n");
}

#[test]
fn top_level_return_is_the_program_value() {
    let (value, _) = run("return 40 + 2");
    assert_eq!(value, Some(Object::Int(42)));
}

#[test]
fn program_without_return_yields_none() {
    let (value, _) = run(r#"var x: Int = 1"#);
    assert_eq!(value, None);
}

#[test]
fn top_level_return_inside_a_block() {
    let (value, output) = run(r#"
{
    print("before")
    return 5
}
print("after")
"#);
    assert_eq!(value, Some(Object::Int(5)));
    assert_eq!(output, "before\n");
}

#[test]
fn block_scopes_shadow_and_restore() {
    let (_, output) = run(r#"
var x: Int = 1
{
    var x: Int = 2
    print("" + x)
}
print("" + x)
"#);
    assert_eq!(output, "2\n1\n");
}

#[test]
fn division_by_zero_is_reported() {
    let kind = run_err("var x: Int = 1 / 0");
    assert!(matches!(kind, RuntimeErrorKind::DivisionByZero));
}

#[test]
fn integer_overflow_is_reported() {
    let kind = run_err("var x: Int = 9223372036854775807 + 1");
    assert!(matches!(kind, RuntimeErrorKind::IntegerOverflow));
}

#[test]
fn negative_array_index_is_reported() {
    let kind = run_err("var xs: Int[] = [1]\nvar y: Int = xs[-1]");
    assert!(matches!(kind, RuntimeErrorKind::NegativeIndex(-1)));
}

#[test]
fn too_large_array_index_is_reported() {
    let kind = run_err("var xs: Int[] = [1]\nvar y: Int = xs[3]");
    assert!(matches!(kind, RuntimeErrorKind::IndexOutOfBounds { index: 3, len: 1 }));
}

#[test]
fn comparisons_mix_ints_and_floats() {
    let (_, output) = run(r#"print("" + (1 < 1.5) + "," + (2.0 >= 2))"#);
    assert_eq!(output, "true,true\n");
}

#[test]
fn equality_mixes_ints_and_floats() {
    let (_, output) = run(r#"print("" + (1 == 1.0) + "," + (1 != 2))"#);
    assert_eq!(output, "true,true\n");
}
