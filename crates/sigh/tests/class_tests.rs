//! End-to-end tests for classes: inheritance, overriding, duck typing,
//! nested instances and `Daddy` dispatch.

use pretty_assertions::assert_eq;
use sigh::{CollectStringPrint, Runner};

fn run_output(source: &str) -> String {
    let runner = Runner::new(source, "test.si").unwrap();
    let mut print = CollectStringPrint::new();
    runner.run(&mut print).unwrap();
    print.into_output()
}

#[test]
fn inherited_method_call() {
    let output = run_output(
        r#"
class FatherClass {
    fun FatherClass() {}
    fun printHello() { print("Hello") }
}
class MyClass sonOf FatherClass {
    fun MyClass() {}
}
var instance: MyClass = MyClass()
instance.printHello()
"#,
    );
    assert_eq!(output, "Hello\n");
}

#[test]
fn overriding_method_wins() {
    let output = run_output(
        r#"
class FatherClass {
    fun FatherClass() {}
    fun printHello() { print("Hello") }
}
class MyClass sonOf FatherClass {
    fun MyClass() {}
    fun printHello() { print("Hello World !") }
}
var instance: MyClass = MyClass()
instance.printHello()
"#,
    );
    assert_eq!(output, "Hello World !\n");
}

#[test]
fn structural_assignment_between_unrelated_classes() {
    let output = run_output(
        r#"
class One {
    fun One() {}
    var a: Int = 12
}
class Two {
    fun Two() {}
    var a: Int = 0
}
var x: Two = One()
print("" + x.a)
"#,
    );
    assert_eq!(output, "12\n");
}

#[test]
fn nested_class_instances() {
    let output = run_output(
        r#"
class ImbricatedClass {
    fun ImbricatedClass(initialVal: Int) { a = initialVal }
    var a: Int = 0
}
class OuterClass {
    fun OuterClass() {}
    var imbricatedClass: ImbricatedClass = ImbricatedClass(456)
}
var instance: OuterClass = OuterClass()
print("" + instance.imbricatedClass.a)
"#,
    );
    assert_eq!(output, "456\n");
}

#[test]
fn daddy_delegates_to_parent_method() {
    let output = run_output(
        r#"
class FatherClass {
    fun FatherClass() {}
    var a: Int = 0
    fun setA(value: Int) { a = value }
}
class MyClass sonOf FatherClass {
    fun MyClass() {}
    fun setA(value: Int) { Daddy(value) }
}
var instance: MyClass = MyClass()
instance.setA(12)
print("" + instance.a)
"#,
    );
    assert_eq!(output, "12\n");
}

#[test]
fn constructor_arguments_initialize_fields() {
    let output = run_output(
        r#"
class Point {
    fun Point(x0: Int, y0: Int) {
        x = x0
        y = y0
    }
    var x: Int = 0
    var y: Int = 0
}
var p: Point = Point(3, 4)
print("" + p.x + "," + p.y)
"#,
    );
    assert_eq!(output, "3,4\n");
}

#[test]
fn methods_mutate_instance_state_across_calls() {
    let output = run_output(
        r#"
class Counter {
    fun Counter() {}
    var count: Int = 0
    fun bump() { count = count + 1 }
}
var c: Counter = Counter()
c.bump()
c.bump()
c.bump()
print("" + c.count)
"#,
    );
    assert_eq!(output, "3\n");
}

#[test]
fn inherited_fields_are_constructed() {
    let output = run_output(
        r#"
class Base {
    fun Base() {}
    var a: Int = 7
}
class Derived sonOf Base {
    fun Derived() {}
    var b: Int = 8
}
var d: Derived = Derived()
print("" + d.a + "," + d.b)
"#,
    );
    assert_eq!(output, "7,8\n");
}

#[test]
fn field_assignment_from_outside() {
    let output = run_output(
        r#"
class Holder {
    fun Holder() {}
    var value: Int = 0
}
var h: Holder = Holder()
h.value = 99
print("" + h.value)
"#,
    );
    assert_eq!(output, "99\n");
}

#[test]
fn ciblings_is_true_for_same_shape() {
    let output = run_output(
        r#"
class One {
    fun One() {}
    var a: Int = 1
}
class Two {
    fun Two() {}
    var a: Int = 2
}
class Three {
    fun Three() {}
    var b: Int = 3
}
var x: One = One()
var y: Two = Two()
var z: Three = Three()
print("" + (x ciblingsOf y) + "," + (x ciblingsOf z))
"#,
    );
    assert_eq!(output, "true,false\n");
}

#[test]
fn siblings_spelling_is_accepted() {
    let output = run_output(
        r#"
class One {
    fun One() {}
    var a: Int = 1
}
var x: One = One()
var y: One = One()
print("" + (x siblingsOf y))
"#,
    );
    assert_eq!(output, "true\n");
}

#[test]
fn null_assigns_to_class_variables() {
    let output = run_output(
        r#"
class A {
    fun A() {}
    var a: Int = 1
}
var x: A = null
print("" + (x == null))
"#,
    );
    assert_eq!(output, "true\n");
}

#[test]
fn instance_equality_is_identity() {
    let output = run_output(
        r#"
class A {
    fun A() {}
    var a: Int = 1
}
var x: A = A()
var y: A = A()
var alias: A = x
print("" + (x == y) + "," + (x == alias))
"#,
    );
    assert_eq!(output, "false,true\n");
}

#[test]
fn grandparent_methods_resolve() {
    let output = run_output(
        r#"
class A {
    fun A() {}
    fun hello() { print("from A") }
}
class B sonOf A {
    fun B() {}
}
class C sonOf B {
    fun C() {}
}
var c: C = C()
c.hello()
"#,
    );
    assert_eq!(output, "from A\n");
}
