use duet_editor::{node, Node, Operation, Path, Properties};
use serde_json::Value;
use yrs::types::Attrs;
use yrs::{Text, TransactionMut, Xml, XmlTextPrelim};

use super::ApplyContext;
use crate::convert::{json_to_any, properties_to_attrs};
use crate::delta::{
    clone_insert_delta_deep, element_to_detached, insert_delta_length, sequence_to_insert_delta,
    slice_insert_delta, write_delta, write_detached, DetachedSequence,
};
use crate::error::{Result, SyncError};
use crate::location::{resolve_target, sequence_length};
use crate::positions::{capture_positions_in_range, restore_positions};

pub fn insert_node(
    txn: &mut TransactionMut,
    cx: ApplyContext<'_>,
    path: &Path,
    node: &Node,
) -> Result<()> {
    let target = resolve_target(&*txn, cx.root, cx.tree, path)?;
    match node {
        Node::Text(text) => {
            if !text.text.is_empty() {
                target.parent.insert_with_attributes(
                    txn,
                    target.start,
                    &text.text,
                    properties_to_attrs(&text.properties),
                );
            }
        }
        Node::Element(element) => {
            let embedded = target.parent.insert_embed_with_attributes(
                txn,
                target.start,
                XmlTextPrelim::new(""),
                Attrs::new(),
            );
            write_detached(txn, &embedded, &element_to_detached(element))?;
        }
    }
    Ok(())
}

pub fn remove_node(txn: &mut TransactionMut, cx: ApplyContext<'_>, path: &Path) -> Result<()> {
    let target = resolve_target(&*txn, cx.root, cx.tree, path)?;
    if target.node.is_none() {
        return Err(SyncError::Desync(format!("no node to remove at {path}")));
    }
    if !target.is_empty() {
        target.parent.remove_range(txn, target.start, target.len());
    }
    Ok(())
}

pub fn set_node(
    txn: &mut TransactionMut,
    cx: ApplyContext<'_>,
    path: &Path,
    properties: &Properties,
    new_properties: &Properties,
) -> Result<()> {
    let target = resolve_target(&*txn, cx.root, cx.tree, path)?;

    if let Some(seq) = &target.sequence {
        for (key, value) in new_properties {
            if value.is_null() {
                seq.remove_attribute(txn, key);
            } else {
                seq.insert_attribute(txn, key.as_str(), json_to_any(value));
            }
        }
        for key in properties.keys() {
            if !new_properties.contains_key(key) {
                seq.remove_attribute(txn, key);
            }
        }
        return Ok(());
    }

    // text marks are formatting over the run
    let mut format: Properties = properties
        .keys()
        .map(|key| (key.clone(), Value::Null))
        .collect();
    format.extend(new_properties.clone());
    if !target.is_empty() {
        target
            .parent
            .format(txn, target.start, target.len(), properties_to_attrs(&format));
    }
    Ok(())
}

pub fn split_node(
    txn: &mut TransactionMut,
    cx: ApplyContext<'_>,
    path: &Path,
    position: usize,
    properties: &Properties,
) -> Result<()> {
    let target = resolve_target(&*txn, cx.root, cx.tree, path)?;
    let node = target
        .node
        .ok_or_else(|| SyncError::Desync(format!("no node to split at {path}")))?;

    match (&target.sequence, node) {
        (None, Node::Text(_)) => {
            let mut format = Properties::new();
            for item in &target.delta {
                for key in item.attributes.keys() {
                    format.insert(key.clone(), Value::Null);
                }
            }
            format.extend(properties.clone());

            let from = target.start + position as u32;
            let len = target.end.saturating_sub(from);
            if len > 0 {
                target
                    .parent
                    .format(txn, from, len, properties_to_attrs(&format));
            }
            Ok(())
        }
        (Some(seq), Node::Element(element)) => {
            let split = resolve_target(&*txn, seq, &element.children, &Path::from([position]))?;
            let split_at = split.start;
            let content = sequence_to_insert_delta(&*txn, seq);
            let total = insert_delta_length(&content);
            let tail = slice_insert_delta(&content, split_at, total.saturating_sub(split_at));
            let detached = clone_insert_delta_deep(&*txn, &tail);
            let captured =
                capture_positions_in_range(&*txn, cx.root, cx.position_prefix, seq, split_at, total);

            if total > split_at {
                seq.remove_range(txn, split_at, total - split_at);
            }
            let sibling = target.parent.insert_embed_with_attributes(
                txn,
                target.end,
                XmlTextPrelim::new(""),
                Attrs::new(),
            );
            write_detached(
                txn,
                &sibling,
                &DetachedSequence {
                    attributes: properties.clone(),
                    delta: detached,
                },
            )?;
            restore_positions(txn, cx.root, cx.position_prefix, &sibling, &captured, 0);
            Ok(())
        }
        _ => Err(SyncError::Desync(format!(
            "node kind at {path} differs between tree and sequence"
        ))),
    }
}

pub fn merge_node(txn: &mut TransactionMut, cx: ApplyContext<'_>, path: &Path) -> Result<()> {
    let target = resolve_target(&*txn, cx.root, cx.tree, path)?;
    let prev_path = path
        .previous()
        .ok_or_else(|| SyncError::Desync(format!("nothing to merge {path} into")))?;
    let prev = resolve_target(&*txn, cx.root, cx.tree, &prev_path)?;

    match (&prev.sequence, &target.sequence) {
        (None, None) => {
            let (Some(Node::Text(text)), Some(Node::Text(prev_text))) = (target.node, prev.node)
            else {
                return Err(SyncError::Desync(format!(
                    "merging {path} expects two text nodes"
                )));
            };
            // the previous sibling's marks win
            let mut format: Properties = text
                .properties
                .keys()
                .filter(|key| !prev_text.properties.contains_key(*key))
                .map(|key| (key.clone(), Value::Null))
                .collect();
            format.extend(prev_text.properties.clone());
            if !target.is_empty() {
                target
                    .parent
                    .format(txn, target.start, target.len(), properties_to_attrs(&format));
            }
            Ok(())
        }
        (Some(prev_seq), Some(target_seq)) => {
            let offset = sequence_length(&*txn, prev_seq);
            let content = sequence_to_insert_delta(&*txn, target_seq);
            let detached = clone_insert_delta_deep(&*txn, &content);
            let captured = capture_positions_in_range(
                &*txn,
                cx.root,
                cx.position_prefix,
                target_seq,
                0,
                insert_delta_length(&content),
            );

            write_delta(txn, prev_seq, offset, &detached)?;
            target.parent.remove_range(txn, target.start, target.len());
            restore_positions(txn, cx.root, cx.position_prefix, prev_seq, &captured, offset);
            Ok(())
        }
        _ => Err(SyncError::Desync(format!(
            "cannot merge {path}: a text run and an element"
        ))),
    }
}

pub fn move_node(
    txn: &mut TransactionMut,
    cx: ApplyContext<'_>,
    path: &Path,
    new_path: &Path,
) -> Result<()> {
    let source = resolve_target(&*txn, cx.root, cx.tree, path)?;
    let moved = source
        .node
        .ok_or_else(|| SyncError::Desync(format!("no node to move at {path}")))?;
    let content = clone_insert_delta_deep(&*txn, &source.delta);
    let captured = capture_positions_in_range(
        &*txn,
        cx.root,
        cx.position_prefix,
        &source.parent,
        source.start,
        source.end,
    );
    if !source.is_empty() {
        source.parent.remove_range(txn, source.start, source.len());
    }

    // the destination resolves against the tree without the moved node
    let op = Operation::MoveNode {
        path: path.clone(),
        new_path: new_path.clone(),
    };
    let true_path = path
        .transform(&op, None)
        .ok_or_else(|| SyncError::Desync(format!("cannot move {path} to {new_path}")))?;
    let mut remaining = cx.tree.to_vec();
    Operation::RemoveNode {
        path: path.clone(),
        node: moved.clone(),
    }
    .apply_to(&mut remaining, &mut None)?;

    let parent_path = true_path
        .parent()
        .ok_or_else(|| SyncError::Desync("cannot move a node to the root".into()))?;
    let index = true_path.last().unwrap_or(0);
    let siblings = node::children_at(&remaining, &parent_path)?;
    let destination = parent_path.child(index.min(siblings.len()));

    let dest = resolve_target(&*txn, cx.root, &remaining, &destination)?;
    let at = dest.start.min(sequence_length(&*txn, &dest.parent));
    write_delta(txn, &dest.parent, at, &content)?;
    restore_positions(txn, cx.root, cx.position_prefix, &dest.parent, &captured, at);
    Ok(())
}
