//! Two replicas editing concurrently end up with the same document.

mod common;

use common::{assert_in_sync, deliver, exchange, pair, paragraph};
use duet_editor::{node, Node, Operation, Path};
use duet_sync::delta::shared_shape;
use duet_sync::SyncEditor;
use proptest::prelude::*;
use serde_json::json;

/// An edit chosen independently of the tree; indexes are reduced modulo
/// what the tree offers when it is turned into an operation.
#[derive(Debug, Clone)]
enum Edit {
    Type { leaf: usize, at: usize, text: String },
    Erase { leaf: usize, at: usize, len: usize },
    AddParagraph { index: usize, text: String },
    DropParagraph { index: usize },
    Retype { index: usize, heading: bool },
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (any::<usize>(), any::<usize>(), "[a-z]{1,3}")
            .prop_map(|(leaf, at, text)| Edit::Type { leaf, at, text }),
        2 => (any::<usize>(), any::<usize>(), 1usize..3)
            .prop_map(|(leaf, at, len)| Edit::Erase { leaf, at, len }),
        1 => (any::<usize>(), "[a-z]{0,3}")
            .prop_map(|(index, text)| Edit::AddParagraph { index, text }),
        1 => any::<usize>().prop_map(|index| Edit::DropParagraph { index }),
        1 => (any::<usize>(), any::<bool>())
            .prop_map(|(index, heading)| Edit::Retype { index, heading }),
    ]
}

/// Step on one replica, optionally followed by delivering to the other.
fn step() -> impl Strategy<Value = (bool, Edit, bool)> {
    (any::<bool>(), edit(), any::<bool>())
}

fn to_operation(tree: &[Node], edit: &Edit) -> Option<Operation> {
    let texts = node::texts(tree);
    match edit {
        Edit::Type { leaf, at, text } => {
            let (path, leaf) = texts.get(leaf % texts.len().max(1))?;
            Some(Operation::InsertText {
                path: path.clone(),
                offset: at % (leaf.text.len() + 1),
                text: text.clone(),
            })
        }
        Edit::Erase { leaf, at, len } => {
            let (path, leaf) = texts.get(leaf % texts.len().max(1))?;
            if leaf.text.is_empty() {
                return None;
            }
            let at = at % leaf.text.len();
            let end = (at + len).min(leaf.text.len());
            Some(Operation::RemoveText {
                path: path.clone(),
                offset: at,
                text: leaf.text[at..end].to_string(),
            })
        }
        Edit::AddParagraph { index, text } => Some(Operation::InsertNode {
            path: Path::from([index % (tree.len() + 1)]),
            node: paragraph(text),
        }),
        Edit::DropParagraph { index } => {
            if tree.len() < 2 {
                return None;
            }
            let index = index % tree.len();
            Some(Operation::RemoveNode {
                path: Path::from([index]),
                node: tree[index].clone(),
            })
        }
        Edit::Retype { index, heading } => {
            if tree.is_empty() {
                return None;
            }
            let index = index % tree.len();
            let kind = if *heading { "heading" } else { "paragraph" };
            let current = tree[index].properties().get("type").cloned();
            Some(Operation::SetNode {
                path: Path::from([index]),
                properties: [("type".to_string(), current.unwrap_or(json!(null)))].into(),
                new_properties: [("type".to_string(), json!(kind))].into(),
            })
        }
    }
}

fn run(editor: &mut SyncEditor, edit: &Edit) {
    if let Some(op) = to_operation(editor.document().children(), edit) {
        editor.change(|e| e.apply(op)).expect("local edit");
    }
}

fn assert_converged(a: &SyncEditor, b: &SyncEditor) {
    assert_eq!(a.shared().to_nodes(), b.shared().to_nodes());
    assert_eq!(
        shared_shape(a.document().children()),
        shared_shape(b.document().children())
    );
    assert_in_sync(a);
    assert_in_sync(b);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn test_interleaved_edits_converge(steps in prop::collection::vec(step(), 1..24)) {
        let (mut a, mut b) = pair(&[paragraph("hello"), paragraph("world")]);

        for (on_a, edit, send) in &steps {
            let (from, to) = if *on_a { (&mut a, &mut b) } else { (&mut b, &mut a) };
            run(from, edit);
            if *send {
                deliver(from, to);
            }
        }
        exchange(&mut a, &mut b);

        assert_converged(&a, &b);
    }
}

/// Element merge, move and split interleaved with a text edit, all on one
/// replica and delivered one by one.
#[test]
#[ignore = "yrs leaves the replicas with different roots under equal state vectors"]
fn test_structural_sequence_converges() -> anyhow::Result<()> {
    let quote = Node::element(vec![paragraph("ab"), paragraph("cd")]).with("type", "quote");
    let (mut a, mut b) = pair(&[paragraph("hello"), quote, paragraph("tail")]);

    let steps = [
        Operation::MergeNode {
            path: Path::from([1]),
            position: 1,
            properties: [("type".to_string(), json!("quote"))].into(),
        },
        Operation::InsertText {
            path: Path::from([0, 0]),
            offset: 0,
            text: "x".into(),
        },
        Operation::MoveNode {
            path: Path::from([0]),
            new_path: Path::from([1]),
        },
        Operation::SplitNode {
            path: Path::from([1, 2]),
            position: 1,
            properties: [("type".to_string(), json!("paragraph"))].into(),
        },
        Operation::MergeNode {
            path: Path::from([1]),
            position: 1,
            properties: [("type".to_string(), json!("paragraph"))].into(),
        },
    ];
    for op in steps {
        a.change(|a| a.apply(op))?;
        deliver(&mut a, &mut b);
        assert_converged(&a, &b);
    }
    Ok(())
}
