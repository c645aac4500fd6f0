use duet_editor::{node, Node, Operation, Path, Properties};
use serde_json::Value;
use yrs::Assoc;

use super::event::{ChangeStep, InsertContent, SequenceEvent};
use crate::error::{Result, SyncError};
use crate::location::{flat_to_path_offset, hops_to_path};

/// Editor operations equivalent to `event`, computed against `tree` as it is
/// before any of them is applied. They must be applied in order.
pub fn translate_event(tree: &[Node], event: &SequenceEvent) -> Result<Vec<Operation>> {
    let Some(hops) = &event.target else {
        return Ok(Vec::new());
    };
    let path = hops_to_path(tree, hops)?;
    let children = node::children_at(tree, &path)
        .map_err(|_| SyncError::Desync(format!("change event maps to text node {path}")))?;

    let mut ops = Vec::new();

    if !path.is_root() && !event.keys.is_empty() {
        let current = node::get(tree, &path)?.properties();
        let mut properties = Properties::new();
        let mut new_properties = Properties::new();
        for (key, value) in &event.keys {
            properties.insert(key.clone(), current.get(key).cloned().unwrap_or(Value::Null));
            new_properties.insert(key.clone(), value.clone().unwrap_or(Value::Null));
        }
        ops.push(Operation::SetNode {
            path: path.clone(),
            properties,
            new_properties,
        });
    }

    if !event.delta.is_empty() {
        ops.extend(translate_delta(children, &path, &event.delta)?);
    }

    Ok(ops)
}

/// Walk the delta backwards so that operations for later steps never shift
/// the paths of earlier ones.
pub fn translate_delta(children: &[Node], path: &Path, delta: &[ChangeStep]) -> Result<Vec<Operation>> {
    let mut ops = Vec::new();
    let mut flat: u32 = delta
        .iter()
        .map(|step| match step {
            ChangeStep::Retain { length, .. } => *length,
            ChangeStep::Delete(length) => *length,
            ChangeStep::Insert(_) => 0,
        })
        .sum();

    for step in delta.iter().rev() {
        match step {
            ChangeStep::Retain { length, attributes } => {
                if let Some(attributes) = attributes {
                    format_range(children, path, flat - length, flat, attributes, &mut ops)?;
                }
                flat -= length;
            }
            ChangeStep::Delete(length) => {
                let start = flat - length;
                delete_range(children, path, start, flat, &mut ops)?;
                flat = start;
            }
            ChangeStep::Insert(content) => insert_at(children, path, flat, content, &mut ops)?,
        }
    }

    Ok(ops)
}

fn text_child(children: &[Node], index: usize) -> Result<&Node> {
    children
        .get(index)
        .ok_or_else(|| SyncError::Desync(format!("change refers to missing child {index}")))
}

/// Isolate the formatted part of each text child, then set its marks.
fn format_range(
    children: &[Node],
    path: &Path,
    from: u32,
    to: u32,
    attributes: &Properties,
    ops: &mut Vec<Operation>,
) -> Result<()> {
    let (start_index, start_offset) = flat_to_path_offset(children, from, Assoc::After, false)?;
    let (end_index, end_offset) = flat_to_path_offset(children, to, Assoc::Before, false)?;

    for index in (start_index..=end_index).rev() {
        // formatting of embeds is not part of the tree
        let Node::Text(child) = text_child(children, index)? else {
            continue;
        };
        let child_path = path.child(index);
        let properties: Properties = attributes
            .keys()
            .map(|key| {
                let old = child.properties.get(key).cloned().unwrap_or(Value::Null);
                (key.clone(), old)
            })
            .collect();
        let text_len = child.text.len();

        if index == start_index || index == end_index {
            let start = if index == start_index { start_offset as usize } else { 0 };
            let end = if index == end_index { end_offset as usize } else { text_len };
            if end != text_len {
                ops.push(Operation::SplitNode {
                    path: child_path.clone(),
                    position: end,
                    properties: child.properties.clone(),
                });
            }
            if start != 0 {
                ops.push(Operation::SplitNode {
                    path: child_path,
                    position: start,
                    properties: child.properties.clone(),
                });
                ops.push(Operation::SetNode {
                    path: path.child(index + 1),
                    properties,
                    new_properties: attributes.clone(),
                });
                continue;
            }
        }

        ops.push(Operation::SetNode {
            path: child_path,
            properties,
            new_properties: attributes.clone(),
        });
    }
    Ok(())
}

/// Boundary texts lose the covered slice, everything in between is removed.
fn delete_range(
    children: &[Node],
    path: &Path,
    from: u32,
    to: u32,
    ops: &mut Vec<Operation>,
) -> Result<()> {
    let (start_index, start_offset) = flat_to_path_offset(children, from, Assoc::After, false)?;
    let (end_index, end_offset) = flat_to_path_offset(children, to, Assoc::Before, false)?;
    let last = if end_offset == 0 {
        match end_index.checked_sub(1) {
            Some(last) => last,
            None => return Ok(()),
        }
    } else {
        end_index
    };
    if last < start_index {
        return Ok(());
    }

    for index in (start_index..=last).rev() {
        let child = text_child(children, index)?;
        let child_path = path.child(index);

        if let Node::Text(text) = child {
            if index == start_index || index == end_index {
                let start = if index == start_index { start_offset as usize } else { 0 };
                let end = if index == end_index { end_offset as usize } else { text.text.len() };
                let removed = text.text.get(start..end).ok_or_else(|| {
                    SyncError::Desync(format!("deleted range splits a character in {child_path}"))
                })?;
                if !removed.is_empty() {
                    ops.push(Operation::RemoveText {
                        path: child_path,
                        offset: start,
                        text: removed.to_string(),
                    });
                }
                continue;
            }
        }

        ops.push(Operation::RemoveNode {
            path: child_path,
            node: child.clone(),
        });
    }
    Ok(())
}

/// Plain text matching the marks of the text it lands in becomes a text
/// insert; anything else becomes a node, splitting the text when needed.
fn insert_at(
    children: &[Node],
    path: &Path,
    flat: u32,
    content: &InsertContent,
    ops: &mut Vec<Operation>,
) -> Result<()> {
    let (index, offset) = flat_to_path_offset(children, flat, Assoc::After, true)?;

    // text appended to a run with the same marks extends that run
    if let InsertContent::Text { text, attributes } = content {
        if let Ok((before, before_offset)) = flat_to_path_offset(children, flat, Assoc::Before, false) {
            let extends = match children.get(before) {
                Some(Node::Text(prev)) => {
                    before_offset as usize == prev.text.len()
                        && !prev.text.is_empty()
                        && prev.properties == *attributes
                }
                _ => false,
            };
            let inner = matches!(children.get(index), Some(Node::Text(t)) if t.properties == *attributes);
            if extends && !inner {
                ops.push(Operation::InsertText {
                    path: path.child(before),
                    offset: before_offset as usize,
                    text: text.clone(),
                });
                return Ok(());
            }
        }
    }

    let child_path = path.child(index);
    let Some(Node::Text(child)) = children.get(index) else {
        ops.push(Operation::InsertNode {
            path: child_path,
            node: content.to_node(),
        });
        return Ok(());
    };

    if let InsertContent::Text { text, attributes } = content {
        if *attributes == child.properties {
            ops.push(Operation::InsertText {
                path: child_path,
                offset: offset as usize,
                text: text.clone(),
            });
            return Ok(());
        }
    }

    let node = content.to_node();
    if offset == 0 {
        ops.push(Operation::InsertNode {
            path: child_path,
            node,
        });
        return Ok(());
    }
    if (offset as usize) < child.text.len() {
        ops.push(Operation::SplitNode {
            path: child_path.clone(),
            position: offset as usize,
            properties: child.properties.clone(),
        });
    }
    ops.push(Operation::InsertNode {
        path: child_path.next(),
        node,
    });
    Ok(())
}
