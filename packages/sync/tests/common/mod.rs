//! Helpers shared by the sync integration tests
#![allow(dead_code)]

use duet_editor::{Document, Element, Node, Text};
use duet_sync::{new_doc, SharedRoot, SyncConfig, SyncEditor};
use yrs::updates::decoder::Decode;
use yrs::{Transact, Update};

pub const ROOT: &str = "content";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn paragraph(text: &str) -> Node {
    Node::element(vec![Node::text(text)]).with("type", "paragraph")
}

/// Config whose undo steps never merge by time.
pub fn config() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.history.capture_timeout_ms = 0;
    config
}

/// A shared root seeded with `nodes`.
pub fn seeded(nodes: &[Node]) -> SharedRoot {
    let shared = SharedRoot::bootstrap(new_doc(), ROOT).expect("bootstrap");
    shared.load_nodes(nodes).expect("load");
    shared
}

/// A second shared root holding a copy of `source`.
pub fn replica_of(source: &SharedRoot) -> SharedRoot {
    let doc = new_doc();
    {
        let update = Update::decode_v1(&source.encode_state()).expect("decode");
        doc.transact_mut().apply_update(update).expect("apply");
    }
    SharedRoot::open(doc, ROOT).expect("open")
}

pub fn connected(shared: SharedRoot) -> SyncEditor {
    let mut editor = SyncEditor::new(Document::default(), shared, config());
    editor.connect().expect("connect");
    editor
}

/// Two connected editors on the same content.
pub fn pair(nodes: &[Node]) -> (SyncEditor, SyncEditor) {
    let a = seeded(nodes);
    let b = replica_of(&a);
    (connected(a), connected(b))
}

/// Flush `from` and deliver what `to` is missing.
pub fn deliver(from: &mut SyncEditor, to: &mut SyncEditor) {
    from.flush_local_changes().expect("flush");
    let update = from
        .encode_state_as_update(&to.state_vector())
        .expect("encode");
    to.receive_update(&update).expect("receive");
}

pub fn exchange(a: &mut SyncEditor, b: &mut SyncEditor) {
    deliver(a, b);
    deliver(b, a);
}

/// Tree as the shared representation reads it back: adjacent texts with
/// equal properties merged, empty texts dropped, empty elements holding one
/// empty text.
pub fn canonical(nodes: &[Node]) -> Vec<Node> {
    canonical_children(nodes)
}

fn canonical_children(nodes: &[Node]) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::new();
    for node in nodes {
        match node {
            Node::Text(text) if text.text.is_empty() => {}
            Node::Text(text) => {
                if let Some(Node::Text(prev)) = out.last_mut() {
                    if prev.properties == text.properties {
                        prev.text.push_str(&text.text);
                        continue;
                    }
                }
                out.push(Node::Text(text.clone()));
            }
            Node::Element(element) => {
                let mut children = canonical_children(&element.children);
                if children.is_empty() {
                    children.push(Node::Text(Text::new("")));
                }
                out.push(Node::Element(Element {
                    children,
                    properties: element.properties.clone(),
                }));
            }
        }
    }
    out
}

pub fn assert_in_sync(editor: &SyncEditor) {
    assert_eq!(
        canonical(editor.document().children()),
        editor.shared().to_nodes(),
        "tree and shared root diverged"
    );
}
