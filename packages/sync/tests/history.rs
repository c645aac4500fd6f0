//! Collaborative undo/redo

mod common;

use common::{assert_in_sync, deliver, pair, paragraph};
use duet_editor::{Document, Operation, Path, Point, Range};
use duet_sync::{SyncConfig, SyncEditor};

fn insert(path: [usize; 2], offset: usize, text: &str) -> Operation {
    Operation::InsertText {
        path: Path::from(path),
        offset,
        text: text.into(),
    }
}

#[test]
fn test_undo_redo_restores_selection() -> anyhow::Result<()> {
    common::init_tracing();
    let (mut a, _b) = pair(&[paragraph("abef")]);

    let before = Range::collapsed(Point::new([0, 0], 2));
    a.select(before.clone())?;
    a.change(|a| a.apply(insert([0, 0], 2, "cd")))?;

    let after = Range::collapsed(Point::new([0, 0], 4));
    assert_eq!(a.document().selection(), Some(&after));
    assert!(a.can_undo());

    assert!(a.undo()?);
    assert_eq!(a.document().children()[0].string(), "abef");
    assert_eq!(a.document().selection(), Some(&before));
    assert!(a.can_redo());

    assert!(a.redo()?);
    assert_eq!(a.document().children()[0].string(), "abcdef");
    assert_eq!(a.document().selection(), Some(&after));
    assert_in_sync(&a);
    Ok(())
}

#[test]
fn test_undo_only_reverts_own_changes() -> anyhow::Result<()> {
    let (mut a, mut b) = pair(&[paragraph("one"), paragraph("two")]);

    a.change(|a| a.apply(insert([0, 0], 3, "!")))?;
    b.change(|b| b.apply(insert([1, 0], 0, ">")))?;
    deliver(&mut b, &mut a);
    assert_eq!(a.document().children()[1].string(), ">two");

    assert!(a.undo()?);
    assert_eq!(a.document().children()[0].string(), "one");
    assert_eq!(a.document().children()[1].string(), ">two");
    assert!(!a.can_undo());

    deliver(&mut a, &mut b);
    assert_eq!(b.document().children(), a.document().children());
    Ok(())
}

#[test]
fn test_remote_changes_are_not_undoable() -> anyhow::Result<()> {
    let (mut a, mut b) = pair(&[paragraph("x")]);

    b.change(|b| b.apply(insert([0, 0], 1, "y")))?;
    deliver(&mut b, &mut a);

    assert!(!a.can_undo());
    assert!(!a.undo()?);
    assert_eq!(a.document().children()[0].string(), "xy");
    Ok(())
}

#[test]
fn test_structural_undo_round_trip() -> anyhow::Result<()> {
    let (mut a, mut b) = pair(&[paragraph("hello world")]);

    a.change(|a| {
        a.apply(Operation::SplitNode {
            path: Path::from([0, 0]),
            position: 5,
            properties: [("bold".to_string(), serde_json::json!(true))].into(),
        })?;
        a.apply(Operation::SplitNode {
            path: Path::from([0]),
            position: 1,
            properties: [("type".to_string(), serde_json::json!("paragraph"))].into(),
        })
    })?;
    assert_eq!(a.document().children().len(), 2);
    assert_eq!(a.history().undo_entries().len(), 2);

    assert!(a.undo()?);
    assert!(a.undo()?);
    assert_eq!(a.document().children().len(), 1);
    assert_eq!(common::canonical(a.document().children()), vec![paragraph("hello world")]);

    assert!(a.redo()?);
    assert_eq!(a.document().children().len(), 1);
    assert!(a.redo()?);
    assert_eq!(a.document().children().len(), 2);
    assert_in_sync(&a);

    deliver(&mut a, &mut b);
    assert_eq!(
        common::canonical(b.document().children()),
        common::canonical(a.document().children())
    );
    Ok(())
}

#[test]
fn test_capture_timeout_merges_steps() -> anyhow::Result<()> {
    let shared = common::seeded(&[paragraph("")]);
    let mut config = SyncConfig::default();
    config.history.capture_timeout_ms = 60_000;
    let mut editor = SyncEditor::new(Document::default(), shared, config);
    editor.connect()?;

    editor.change(|e| e.apply(insert([0, 0], 0, "a")))?;
    editor.change(|e| e.apply(insert([0, 0], 1, "b")))?;
    assert_eq!(editor.history().undo_entries().len(), 1);
    assert_eq!(editor.history().undo_entries()[0].operations.len(), 2);

    editor.stop_capturing()?;
    editor.change(|e| e.apply(insert([0, 0], 2, "c")))?;
    assert_eq!(editor.history().undo_entries().len(), 2);

    assert!(editor.undo()?);
    assert_eq!(editor.document().children()[0].string(), "ab");
    assert!(editor.undo()?);
    assert_eq!(editor.document().children()[0].string(), "");
    Ok(())
}

#[test]
fn test_uncaptured_operations_are_not_undoable() -> anyhow::Result<()> {
    let shared = common::seeded(&[paragraph("a")]);
    let mut editor = SyncEditor::new(Document::default(), shared, common::config())
        .with_capture_predicate(|op| !matches!(op, Operation::SetNode { .. }));
    editor.connect()?;

    editor.change(|e| {
        e.apply(Operation::SetNode {
            path: Path::from([0]),
            properties: [("type".to_string(), serde_json::json!("paragraph"))].into(),
            new_properties: [("type".to_string(), serde_json::json!("heading"))].into(),
        })
    })?;

    assert!(!editor.can_undo());
    assert_in_sync(&editor);
    Ok(())
}

#[test]
fn test_disconnected_history_uses_document_stack() -> anyhow::Result<()> {
    let shared = common::seeded(&[paragraph("a")]);
    let mut editor = SyncEditor::new(Document::new(vec![paragraph("a")]), shared, common::config());

    editor.apply(insert([0, 0], 1, "b"))?;
    assert!(editor.can_undo());
    assert!(editor.undo()?);
    assert_eq!(editor.document().children()[0].string(), "a");
    assert!(editor.pending_changes().is_empty());
    Ok(())
}

#[test]
fn test_refs_follow_structural_undo_and_redo() -> anyhow::Result<()> {
    let (mut a, _b) = pair(&[paragraph("hello world")]);

    a.change(|a| {
        a.apply(Operation::SplitNode {
            path: Path::from([0, 0]),
            position: 5,
            properties: [("bold".to_string(), serde_json::json!(true))].into(),
        })
    })?;
    let mark = a.point_ref(Point::new([0, 1], 3), None);

    assert!(a.undo()?);
    assert_eq!(a.document().children(), &[paragraph("hello world")][..]);
    assert_eq!(a.refs().point(mark), Some(Point::new([0, 0], 8)));

    assert!(a.redo()?);
    assert_eq!(a.document().children()[0].children().map(Vec::len), Some(2));
    assert_eq!(a.refs().point(mark), Some(Point::new([0, 1], 3)));
    assert_in_sync(&a);
    Ok(())
}
