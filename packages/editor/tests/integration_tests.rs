//! Integration tests for editor crate

use duet_editor::{
    Document, EditorError, Node, Operation, OperationKind, Path, Point, Range, RangeAffinity,
};
use serde_json::json;

fn paragraph(text: &str) -> Node {
    Node::element(vec![Node::text(text)]).with("type", "paragraph")
}

#[test]
fn test_document_lifecycle() {
    let mut doc = Document::new(vec![paragraph("Click me")]);
    assert_eq!(doc.version, 0);

    doc.apply(Operation::RemoveText {
        path: Path::from([0, 0]),
        offset: 0,
        text: "Click".into(),
    })
    .unwrap();
    doc.apply(Operation::InsertText {
        path: Path::from([0, 0]),
        offset: 0,
        text: "Tap".into(),
    })
    .unwrap();

    assert_eq!(doc.version, 2);
    assert_eq!(doc.children()[0].string(), "Tap me");
}

#[test]
fn test_operation_serialization() {
    let op = Operation::SetNode {
        path: Path::from([0]),
        properties: [("type".to_string(), json!("paragraph"))].into(),
        new_properties: [("type".to_string(), json!("heading"))].into(),
    };

    let json = serde_json::to_string(&op).unwrap();
    assert!(json.contains("\"newProperties\""));

    let deserialized: Operation = serde_json::from_str(&json).unwrap();
    assert_eq!(op, deserialized);
    assert_eq!(deserialized.kind(), OperationKind::SetNode);
}

#[test]
fn test_operation_kind_parsing() {
    assert_eq!("merge_node".parse::<OperationKind>(), Ok(OperationKind::MergeNode));
    assert_eq!(
        "explode_node".parse::<OperationKind>(),
        Err(EditorError::UnknownOperation("explode_node".into()))
    );
}

#[test]
fn test_range_ref_survives_split() {
    let mut doc = Document::new(vec![paragraph("hello world")]);
    let range = Range::new(Point::new([0, 0], 6), Point::new([0, 0], 11));
    let r = doc.range_ref(range, RangeAffinity::Inward);

    doc.apply(Operation::SplitNode {
        path: Path::from([0, 0]),
        position: 5,
        properties: Default::default(),
    })
    .unwrap();

    assert_eq!(
        doc.refs().range(r),
        Some(Range::new(Point::new([0, 1], 1), Point::new([0, 1], 6)))
    );
}

#[test]
fn test_normalization_on_apply() {
    let mut doc = Document::new(vec![paragraph("ab")]).with_normalization(true);
    doc.apply(Operation::InsertNode {
        path: Path::from([0, 1]),
        node: Node::text("cd"),
    })
    .unwrap();

    // merged back into a single leaf
    assert_eq!(doc.children()[0].children().map(Vec::len), Some(1));
    assert_eq!(doc.children()[0].string(), "abcd");
}
