//! Editor operations mirrored into the shared root produce the same document
//! as applying them to the tree.

mod common;

use common::{canonical, paragraph, seeded};
use duet_editor::{Node, Operation, Path, Properties};
use duet_sync::apply_to_crdt::{apply_json, apply_operation, ApplyContext};
use duet_sync::delta::{sequence_to_insert_delta, DeltaValue};
use duet_sync::{SharedRoot, SyncError};
use serde_json::json;
use yrs::Transact;

const PREFIX: &str = "__test_position_";

fn props(pairs: &[(&str, serde_json::Value)]) -> Properties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn mirror(shared: &SharedRoot, tree: &[Node], op: &Operation) -> duet_sync::Result<()> {
    let mut txn = shared.doc().transact_mut();
    let cx = ApplyContext {
        root: shared.root(),
        tree,
        position_prefix: PREFIX,
    };
    apply_operation(&mut txn, cx, op)
}

/// Apply `op` on both sides and compare.
fn check(tree: Vec<Node>, op: Operation) {
    let shared = seeded(&tree);
    mirror(&shared, &tree, &op).unwrap();

    let mut expected = tree;
    op.apply_to(&mut expected, &mut None).unwrap();
    assert_eq!(shared.to_nodes(), canonical(&expected), "after {op:?}");
}

fn sample() -> Vec<Node> {
    vec![
        Node::element(vec![Node::text("Hello "), Node::text("world").with("bold", true)])
            .with("type", "paragraph"),
        Node::element(vec![
            Node::element(vec![Node::text("first")]).with("type", "item"),
            Node::element(vec![Node::text("second")]).with("type", "item"),
        ])
        .with("type", "list"),
        paragraph("tail"),
    ]
}

#[test]
fn test_insert_bold_text_node_at_start() {
    let tree = vec![Node::element(vec![Node::text("abc")])];
    let shared = seeded(&tree);
    let op = Operation::InsertNode {
        path: Path::from([0, 0]),
        node: Node::text("ab").with("bold", true),
    };
    mirror(&shared, &tree, &op).unwrap();

    let txn = shared.doc().transact();
    let root = sequence_to_insert_delta(&txn, shared.root());
    let paragraph = root[0].as_sequence().unwrap();
    let content = sequence_to_insert_delta(&txn, paragraph);

    assert_eq!(content.len(), 2);
    assert_eq!(content[0].insert, DeltaValue::Text("ab".into()));
    assert_eq!(content[0].attributes, props(&[("bold", json!(true))]));
    assert_eq!(content[1].insert, DeltaValue::Text("abc".into()));
    assert!(content[1].attributes.is_empty());
}

#[test]
fn test_text_operations() {
    check(
        sample(),
        Operation::InsertText {
            path: Path::from([0, 1]),
            offset: 5,
            text: "!".into(),
        },
    );
    check(
        sample(),
        Operation::InsertText {
            path: Path::from([1, 0, 0]),
            offset: 0,
            text: "très ".into(),
        },
    );
    check(
        sample(),
        Operation::RemoveText {
            path: Path::from([0, 0]),
            offset: 1,
            text: "ell".into(),
        },
    );
}

#[test]
fn test_insert_and_remove_nodes() {
    check(
        sample(),
        Operation::InsertNode {
            path: Path::from([1]),
            node: Node::element(vec![
                Node::text("new "),
                Node::element(vec![Node::text("nested")]).with("type", "quote"),
            ])
            .with("type", "section"),
        },
    );
    check(
        sample(),
        Operation::InsertNode {
            path: Path::from([1, 2]),
            node: Node::element(vec![Node::text("third")]).with("type", "item"),
        },
    );
    check(
        sample(),
        Operation::RemoveNode {
            path: Path::from([1, 0]),
            node: Node::element(vec![Node::text("first")]).with("type", "item"),
        },
    );
    check(
        sample(),
        Operation::RemoveNode {
            path: Path::from([0, 1]),
            node: Node::text("world").with("bold", true),
        },
    );
}

#[test]
fn test_set_node_on_element_and_text() {
    check(
        sample(),
        Operation::SetNode {
            path: Path::from([2]),
            properties: props(&[("type", json!("paragraph"))]),
            new_properties: props(&[("type", json!("heading")), ("level", json!(1))]),
        },
    );
    check(
        sample(),
        Operation::SetNode {
            path: Path::from([0, 1]),
            properties: props(&[("bold", json!(true))]),
            new_properties: props(&[("bold", serde_json::Value::Null), ("italic", json!(true))]),
        },
    );
}

#[test]
fn test_split_and_merge_text() {
    check(
        sample(),
        Operation::SplitNode {
            path: Path::from([0, 0]),
            position: 2,
            properties: props(&[("italic", json!(true))]),
        },
    );
    check(
        sample(),
        Operation::MergeNode {
            path: Path::from([0, 1]),
            position: 6,
            properties: props(&[("bold", json!(true))]),
        },
    );
}

#[test]
fn test_split_and_merge_elements() {
    check(
        sample(),
        Operation::SplitNode {
            path: Path::from([0]),
            position: 1,
            properties: props(&[("type", json!("paragraph"))]),
        },
    );
    check(
        sample(),
        Operation::SplitNode {
            path: Path::from([1]),
            position: 1,
            properties: props(&[("type", json!("list")), ("start", json!(2))]),
        },
    );
    check(
        sample(),
        Operation::MergeNode {
            path: Path::from([1, 1]),
            position: 1,
            properties: props(&[("type", json!("item"))]),
        },
    );
}

#[test]
fn test_split_then_merge_restores_shared_content() {
    let tree = sample();
    let shared = seeded(&tree);
    let split = Operation::SplitNode {
        path: Path::from([0]),
        position: 1,
        properties: props(&[("type", json!("paragraph"))]),
    };
    let merge = Operation::MergeNode {
        path: Path::from([1]),
        position: 1,
        properties: props(&[("type", json!("paragraph"))]),
    };

    let mut current = tree.clone();
    mirror(&shared, &current, &split).unwrap();
    split.apply_to(&mut current, &mut None).unwrap();
    mirror(&shared, &current, &merge).unwrap();

    assert_eq!(shared.to_nodes(), canonical(&tree));
}

#[test]
fn test_move_nodes() {
    check(
        sample(),
        Operation::MoveNode {
            path: Path::from([0]),
            new_path: Path::from([2]),
        },
    );
    check(
        sample(),
        Operation::MoveNode {
            path: Path::from([2]),
            new_path: Path::from([0]),
        },
    );
    check(
        sample(),
        Operation::MoveNode {
            path: Path::from([1, 1]),
            new_path: Path::from([1, 0]),
        },
    );
    check(
        sample(),
        Operation::MoveNode {
            path: Path::from([0, 1]),
            new_path: Path::from([2, 1]),
        },
    );
}

#[test]
fn test_selection_is_not_shared() {
    let tree = sample();
    let shared = seeded(&tree);
    let before = shared.encode_state();
    mirror(
        &shared,
        &tree,
        &Operation::SetSelection {
            properties: None,
            new_properties: None,
        },
    )
    .unwrap();
    assert_eq!(shared.encode_state(), before);
}

#[test]
fn test_unknown_operation_is_rejected() {
    let tree = sample();
    let shared = seeded(&tree);
    let mut txn = shared.doc().transact_mut();
    let cx = ApplyContext {
        root: shared.root(),
        tree: &tree,
        position_prefix: PREFIX,
    };
    let result = apply_json(&mut txn, cx, json!({ "type": "teleport_node", "path": [0] }));
    assert!(matches!(result, Err(SyncError::UnknownOperation(kind)) if kind == "teleport_node"));
}

#[test]
fn test_out_of_bounds_remove_fails() {
    let tree = sample();
    let shared = seeded(&tree);
    let result = mirror(
        &shared,
        &tree,
        &Operation::RemoveText {
            path: Path::from([2, 0]),
            offset: 2,
            text: "ilxx".into(),
        },
    );
    assert!(matches!(result, Err(SyncError::OutOfBounds { .. })));
}

#[test]
fn test_text_insert_into_element_is_desync() {
    let tree = sample();
    let shared = seeded(&tree);
    let result = mirror(
        &shared,
        &tree,
        &Operation::InsertText {
            path: Path::from([1, 0]),
            offset: 0,
            text: "x".into(),
        },
    );
    assert!(matches!(result, Err(SyncError::Desync(_))));
}
