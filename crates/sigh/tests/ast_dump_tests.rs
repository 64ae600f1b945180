//! Tests for the JSON AST dump exposed to embedders and the CLI.

use sigh::Runner;

fn dump(source: &str) -> serde_json::Value {
    Runner::new(source, "test.si").unwrap().dump_ast()
}

#[test]
fn dump_is_an_object_with_arena_and_root() {
    let value = dump("var x: Int = 1");
    assert!(value.is_object(), "expected a JSON object, got: {value}");
    assert!(value.get("nodes").is_some_and(serde_json::Value::is_array));
    assert!(value.get("root").is_some());
}

#[test]
fn declarations_appear_with_their_names() {
    let value = dump("fun greet() { print(\"hi\") }");
    let text = value.to_string();
    assert!(text.contains("\"FunDecl\""), "{text}");
    assert!(text.contains("\"greet\""), "{text}");
}

#[test]
fn nodes_carry_source_positions() {
    let value = dump("\nvar late: Int = 2");
    let nodes = value["nodes"].as_array().unwrap();
    let on_line_two = nodes
        .iter()
        .any(|node| node["range"]["start"]["line"] == serde_json::json!(2));
    assert!(on_line_two, "no node starts on line 2: {value}");
}

#[test]
fn dump_matches_the_borrowed_tree() {
    let runner = Runner::new("return 1 + 2", "test.si").unwrap();
    let value = runner.dump_ast();
    let via_ast = serde_json::to_value(runner.ast()).unwrap();
    assert_eq!(value, via_ast);
}
