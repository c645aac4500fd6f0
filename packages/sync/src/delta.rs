//! # Insert Deltas
//!
//! An insert delta is the full content of a rich sequence (or a slice of it)
//! as a list of inserts. Text runs carry their formatting marks, embedded
//! sequences stand for elements and always have length 1.
//!
//! A live embedded sequence can only exist in one place, so content that is
//! about to be moved or split is first detached with
//! [`clone_insert_delta_deep`], which copies it into plain data.

use duet_editor::{Element, Node, Properties, Text as TextNode};
use yrs::types::text::{Diff, YChange};
use yrs::{Any, Out, ReadTxn, Text, TransactionMut, Xml, XmlTextPrelim, XmlTextRef};

use crate::convert::{attrs_to_properties, json_to_any, out_to_json, properties_to_attrs};
use crate::error::{Result, SyncError};

/// Content of a single insert
#[derive(Debug, Clone)]
pub enum DeltaValue {
    Text(String),
    /// A live embedded sequence
    Sequence(XmlTextRef),
    /// A deep copy of an embedded sequence, not attached to any document
    Detached(Box<DetachedSequence>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetachedSequence {
    pub attributes: Properties,
    pub delta: InsertDelta,
}

#[derive(Debug, Clone)]
pub struct DeltaInsert {
    pub insert: DeltaValue,
    pub attributes: Properties,
}

pub type InsertDelta = Vec<DeltaInsert>;

impl PartialEq for DeltaValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DeltaValue::Text(a), DeltaValue::Text(b)) => a == b,
            (DeltaValue::Sequence(a), DeltaValue::Sequence(b)) => same_sequence(a, b),
            (DeltaValue::Detached(a), DeltaValue::Detached(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for DeltaInsert {
    fn eq(&self, other: &Self) -> bool {
        self.insert == other.insert && self.attributes == other.attributes
    }
}

impl DeltaInsert {
    pub fn text(text: impl Into<String>, attributes: Properties) -> Self {
        Self {
            insert: DeltaValue::Text(text.into()),
            attributes,
        }
    }

    pub fn len(&self) -> u32 {
        match &self.insert {
            DeltaValue::Text(text) => text.len() as u32,
            DeltaValue::Sequence(_) | DeltaValue::Detached(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_sequence(&self) -> Option<&XmlTextRef> {
        match &self.insert {
            DeltaValue::Sequence(seq) => Some(seq),
            _ => None,
        }
    }
}

/// Two handles refer to the same shared sequence.
pub fn same_sequence(a: &XmlTextRef, b: &XmlTextRef) -> bool {
    let a: &yrs::branch::Branch = a.as_ref();
    let b: &yrs::branch::Branch = b.as_ref();
    std::ptr::eq(a, b)
}

/// Current content of a sequence. Adjacent runs with equal marks are merged.
pub fn sequence_to_insert_delta<T: ReadTxn>(txn: &T, seq: &XmlTextRef) -> InsertDelta {
    let diff: Vec<Diff<YChange>> = seq.diff(txn, YChange::identity);
    let mut delta: InsertDelta = Vec::with_capacity(diff.len());

    for chunk in diff {
        let attributes = chunk
            .attributes
            .as_deref()
            .map(attrs_to_properties)
            .unwrap_or_default();
        let insert = match chunk.insert {
            Out::Any(Any::String(text)) => DeltaValue::Text(text.to_string()),
            Out::YXmlText(embedded) => DeltaValue::Sequence(embedded),
            other => {
                tracing::warn!(value = ?other, "ignoring unsupported embed");
                continue;
            }
        };

        if let (DeltaValue::Text(next), Some(last)) = (&insert, delta.last_mut()) {
            if let DeltaValue::Text(prev) = &mut last.insert {
                if last.attributes == attributes {
                    prev.push_str(next);
                    continue;
                }
            }
        }
        delta.push(DeltaInsert { insert, attributes });
    }

    delta
}

pub fn insert_delta_length(delta: &[DeltaInsert]) -> u32 {
    delta.iter().map(DeltaInsert::len).sum()
}

/// The inserts covering `[start, start + length)`. Text runs are cut at the
/// boundaries, embeds are never split.
pub fn slice_insert_delta(delta: &[DeltaInsert], start: u32, length: u32) -> InsertDelta {
    let end = start + length;
    let mut sliced = Vec::new();
    let mut offset = 0u32;

    for item in delta {
        if offset >= end {
            break;
        }
        let item_len = item.len();
        let item_end = offset + item_len;
        if item_end <= start {
            offset = item_end;
            continue;
        }

        match &item.insert {
            DeltaValue::Text(text) => {
                let from = start.saturating_sub(offset) as usize;
                let to = (end.min(item_end) - offset) as usize;
                if let Some(part) = text.get(from..to) {
                    if !part.is_empty() {
                        sliced.push(DeltaInsert::text(part, item.attributes.clone()));
                    }
                }
            }
            _ => sliced.push(item.clone()),
        }
        offset = item_end;
    }

    sliced
}

/// Copy a delta into plain data, recursively detaching embedded sequences.
pub fn clone_insert_delta_deep<T: ReadTxn>(txn: &T, delta: &[DeltaInsert]) -> InsertDelta {
    delta
        .iter()
        .map(|item| match &item.insert {
            DeltaValue::Sequence(seq) => DeltaInsert {
                insert: DeltaValue::Detached(Box::new(detach_sequence(txn, seq))),
                attributes: item.attributes.clone(),
            },
            _ => item.clone(),
        })
        .collect()
}

fn detach_sequence<T: ReadTxn>(txn: &T, seq: &XmlTextRef) -> DetachedSequence {
    let delta = sequence_to_insert_delta(txn, seq);
    DetachedSequence {
        attributes: sequence_attributes(txn, seq),
        delta: clone_insert_delta_deep(txn, &delta),
    }
}

/// Element attributes of a sequence.
pub fn sequence_attributes<T: ReadTxn>(txn: &T, seq: &XmlTextRef) -> Properties {
    seq.attributes(txn)
        .map(|(key, value)| (key.to_string(), out_to_json(&value)))
        .collect()
}

/// Children of a sequence, without the empty-text placeholder.
pub fn sequence_to_children<T: ReadTxn>(txn: &T, seq: &XmlTextRef) -> Vec<Node> {
    sequence_to_insert_delta(txn, seq)
        .iter()
        .map(|item| delta_insert_to_node(txn, item))
        .collect()
}

/// The element a sequence stands for. An empty sequence becomes an element
/// with a single empty text child.
pub fn sequence_to_element<T: ReadTxn>(txn: &T, seq: &XmlTextRef) -> Element {
    let mut children = sequence_to_children(txn, seq);
    if children.is_empty() {
        children.push(Node::text(""));
    }
    Element {
        children,
        properties: sequence_attributes(txn, seq),
    }
}

pub fn delta_insert_to_node<T: ReadTxn>(txn: &T, item: &DeltaInsert) -> Node {
    match &item.insert {
        DeltaValue::Text(text) => Node::Text(TextNode {
            text: text.clone(),
            properties: item.attributes.clone(),
        }),
        DeltaValue::Sequence(seq) => Node::Element(sequence_to_element(txn, seq)),
        DeltaValue::Detached(detached) => Node::Element(detached_to_element(detached)),
    }
}

fn detached_to_element(detached: &DetachedSequence) -> Element {
    let mut children: Vec<Node> = detached
        .delta
        .iter()
        .map(|item| match &item.insert {
            DeltaValue::Text(text) => Node::Text(TextNode {
                text: text.clone(),
                properties: item.attributes.clone(),
            }),
            DeltaValue::Detached(inner) => Node::Element(detached_to_element(inner)),
            // detached content never holds live sequences
            DeltaValue::Sequence(_) => Node::element(vec![Node::text("")]),
        })
        .collect();
    if children.is_empty() {
        children.push(Node::text(""));
    }
    Element {
        children,
        properties: detached.attributes.clone(),
    }
}

/// `nodes` the way the shared root reads them back: adjacent texts with equal
/// marks joined, empty texts dropped and empty elements holding one empty
/// text.
pub fn shared_shape(nodes: &[Node]) -> Vec<Node> {
    let mut shaped: Vec<Node> = Vec::new();
    for node in nodes {
        match node {
            Node::Text(text) if text.text.is_empty() => {}
            Node::Text(text) => match shaped.last_mut() {
                Some(Node::Text(prev)) if prev.properties == text.properties => {
                    prev.text.push_str(&text.text)
                }
                _ => shaped.push(node.clone()),
            },
            Node::Element(element) => {
                let mut children = shared_shape(&element.children);
                if children.is_empty() {
                    children.push(Node::text(""));
                }
                shaped.push(Node::Element(Element {
                    children,
                    properties: element.properties.clone(),
                }));
            }
        }
    }
    shaped
}

/// Insert delta for a list of sibling nodes. Empty texts have no CRDT
/// counterpart and are skipped.
pub fn nodes_to_insert_delta(nodes: &[Node]) -> InsertDelta {
    nodes
        .iter()
        .filter_map(|node| match node {
            Node::Text(text) if text.text.is_empty() => None,
            Node::Text(text) => Some(DeltaInsert::text(text.text.clone(), text.properties.clone())),
            Node::Element(element) => Some(DeltaInsert {
                insert: DeltaValue::Detached(Box::new(element_to_detached(element))),
                attributes: Properties::new(),
            }),
        })
        .collect()
}

pub fn element_to_detached(element: &Element) -> DetachedSequence {
    DetachedSequence {
        attributes: element.properties.clone(),
        delta: nodes_to_insert_delta(&element.children),
    }
}

/// Write `delta` into `seq` starting at `index`. Live sequences in the delta
/// are copied first.
pub fn write_delta(
    txn: &mut TransactionMut,
    seq: &XmlTextRef,
    index: u32,
    delta: &[DeltaInsert],
) -> Result<()> {
    let owned;
    let delta = if delta.iter().any(|item| item.as_sequence().is_some()) {
        owned = clone_insert_delta_deep(&*txn, delta);
        &owned[..]
    } else {
        delta
    };

    let mut offset = index;
    for item in delta {
        match &item.insert {
            DeltaValue::Text(text) => {
                if text.is_empty() {
                    continue;
                }
                seq.insert_with_attributes(
                    txn,
                    offset,
                    text,
                    properties_to_attrs(&item.attributes),
                );
            }
            DeltaValue::Detached(detached) => {
                let embedded = seq.insert_embed_with_attributes(
                    txn,
                    offset,
                    XmlTextPrelim::new(""),
                    properties_to_attrs(&item.attributes),
                );
                write_detached(txn, &embedded, detached)?;
            }
            DeltaValue::Sequence(_) => {
                return Err(SyncError::Desync(
                    "live sequence left in a detached delta".into(),
                ))
            }
        }
        offset += item.len();
    }
    Ok(())
}

/// Fill an empty sequence with detached content and attributes.
pub fn write_detached(
    txn: &mut TransactionMut,
    seq: &XmlTextRef,
    detached: &DetachedSequence,
) -> Result<()> {
    for (key, value) in &detached.attributes {
        if !value.is_null() {
            seq.insert_attribute(txn, key.as_str(), json_to_any(value));
        }
    }
    write_delta(txn, seq, 0, &detached.delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bold() -> Properties {
        let mut props = Properties::new();
        props.insert("bold".into(), json!(true));
        props
    }

    #[test]
    fn test_shared_shape_joins_equal_runs() {
        let nodes = vec![Node::element(vec![
            Node::text("a"),
            Node::text(""),
            Node::text("b"),
            Node::text("c").with("bold", true),
            Node::element(vec![Node::text("")]),
        ])];
        assert_eq!(
            shared_shape(&nodes),
            vec![Node::element(vec![
                Node::text("ab"),
                Node::text("c").with("bold", true),
                Node::element(vec![Node::text("")]),
            ])]
        );
    }

    #[test]
    fn test_slice_cuts_text_but_not_embeds() {
        let detached = DeltaInsert {
            insert: DeltaValue::Detached(Box::new(DetachedSequence {
                attributes: Properties::new(),
                delta: vec![DeltaInsert::text("inner", Properties::new())],
            })),
            attributes: Properties::new(),
        };
        let delta = vec![
            DeltaInsert::text("abc", Properties::new()),
            detached.clone(),
            DeltaInsert::text("de", bold()),
        ];
        assert_eq!(insert_delta_length(&delta), 6);

        let slice = slice_insert_delta(&delta, 1, 4);
        assert_eq!(
            slice,
            vec![
                DeltaInsert::text("bc", Properties::new()),
                detached,
                DeltaInsert::text("d", bold()),
            ]
        );
        assert!(slice_insert_delta(&delta, 6, 0).is_empty());
    }

    #[test]
    fn test_nodes_to_delta_skips_empty_text() {
        let nodes = vec![
            Node::text(""),
            Node::text("hi").with("bold", true),
            Node::element(vec![Node::text("")]).with("type", "paragraph"),
        ];
        let delta = nodes_to_insert_delta(&nodes);
        assert_eq!(delta.len(), 2);
        assert_eq!(delta[0], DeltaInsert::text("hi", bold()));
        match &delta[1].insert {
            DeltaValue::Detached(d) => {
                assert!(d.delta.is_empty());
                assert_eq!(d.attributes.get("type"), Some(&json!("paragraph")));
            }
            other => panic!("unexpected insert {other:?}"),
        }
    }

    #[test]
    fn test_detached_element_gets_placeholder_text() {
        let element = Element::new(vec![Node::text("")]);
        let back = detached_to_element(&element_to_detached(&element));
        assert_eq!(back, element);
    }
}
