//! End-to-end tests for async functions: `Unborn<T>` launches on its own
//! OS thread, `born` joins and delivers the recorded return value.

use pretty_assertions::assert_eq;
use sigh::{CollectStringPrint, Runner, RuntimeErrorKind, SighError};

fn run_output(source: &str) -> String {
    let runner = Runner::new(source, "test.si").unwrap();
    let mut print = CollectStringPrint::new();
    runner.run(&mut print).unwrap();
    print.into_output()
}

#[test]
fn born_into_a_variable() {
    let output = run_output(
        r#"
fun myFunc(): Unborn<Int> {
    return 41
}
var result: Int = 0
myFunc()
born(myFunc, result)
print("" + result)
"#,
    );
    assert_eq!(output, "41\n");
}

#[test]
fn born_on_the_unborn_variable_delivers_the_value() {
    let output = run_output(
        r#"
fun myFunc(): Unborn<Int> {
    var v: Int = 0
    return v
}
var x: Unborn<Int> = myFunc()
born(x)
x = x + 1
print("" + x)
"#,
    );
    assert_eq!(output, "1\n");
}

#[test]
fn async_results_widen_into_float_variables() {
    let output = run_output(
        r#"
fun myFunc(): Unborn<Int> {
    return 2
}
var f: Float = 0.0
myFunc()
born(myFunc, f)
print("" + f)
"#,
    );
    assert_eq!(output, "2.0\n");
}

#[test]
fn async_work_really_runs() {
    let output = run_output(
        r#"
fun sum(): Unborn<Int> {
    var total: Int = 0
    var i: Int = 0
    while i < 1000 {
        total = total + i
        i = i + 1
    }
    return total
}
var result: Int = 0
sum()
born(sum, result)
print("" + result)
"#,
    );
    assert_eq!(output, "499500\n");
}

#[test]
fn writes_to_globals_are_visible_after_born() {
    let output = run_output(
        r#"
var shared: Int = 0
fun bump(): Unborn<Void> {
    shared = 123
}
bump()
born(bump)
print("" + shared)
"#,
    );
    assert_eq!(output, "123\n");
}

#[test]
fn async_functions_take_arguments() {
    let output = run_output(
        r#"
fun double(n: Int): Unborn<Int> {
    return n * 2
}
var result: Int = 0
double(21)
born(double, result)
print("" + result)
"#,
    );
    assert_eq!(output, "42\n");
}

#[test]
fn unborn_threads_are_joined_at_program_exit() {
    // the program never borns `emit`; the implicit end-of-program join must
    // still wait for it, so its output is flushed before run() returns
    let output = run_output(
        r#"
fun emit(): Unborn<Void> {
    print("late")
}
emit()
"#,
    );
    assert_eq!(output, "late\n");
}

#[test]
fn born_before_calling_is_a_runtime_error() {
    let runner = Runner::new(
        "fun f(): Unborn<Int> { return 1 }\nborn(f)",
        "test.si",
    )
    .unwrap();
    let mut print = CollectStringPrint::new();
    match runner.run(&mut print) {
        Err(SighError::Runtime(err)) => {
            assert!(matches!(err.kind, RuntimeErrorKind::BornBeforeCall));
            assert_eq!(
                err.kind.to_string(),
                "Please call the async function before trying to born it."
            );
        }
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn two_async_functions_run_independently() {
    let output = run_output(
        r#"
fun a(): Unborn<Int> { return 1 }
fun b(): Unborn<Int> { return 2 }
var ra: Int = 0
var rb: Int = 0
a()
b()
born(a, ra)
born(b, rb)
print("" + ra + rb)
"#,
    );
    assert_eq!(output, "12\n");
}

#[test]
fn async_errors_surface_after_the_main_thread() {
    let runner = Runner::new(
        r#"
fun boom(): Unborn<Int> {
    return 1 / 0
}
boom()
born(boom)
"#,
        "test.si",
    )
    .unwrap();
    let mut print = CollectStringPrint::new();
    match runner.run(&mut print) {
        Err(SighError::Runtime(err)) => {
            assert!(matches!(err.kind, RuntimeErrorKind::DivisionByZero));
        }
        other => panic!("expected a runtime error, got {other:?}"),
    }
}
