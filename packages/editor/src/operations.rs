//! # Operations
//!
//! Low-level, invertible edits on the document tree.
//!
//! ## Design Principles
//!
//! 1. **Positional**: every operation addresses nodes by [`Path`]
//! 2. **Invertible**: [`Operation::inverse`] undoes an operation when applied to
//!    the tree state the operation produced
//! 3. **Self-contained**: removals carry the removed content, property
//!    changes carry the old values
//!
//! ## Operation Semantics
//!
//! ### split_node / merge_node
//! - Splitting a text node at `position` cuts its string; splitting an element
//!   cuts its child list. The new right-hand node receives `properties`.
//! - Merging fuses a node into its previous sibling; `position` is the length
//!   of the previous sibling before the merge.
//!
//! ### move_node
//! - `new_path` is where the node ends up, expressed against the tree state
//!   *after* the node has been removed from `path`.
//! - A node cannot be moved inside itself.
//!
//! ### set_node
//! - A `null` new value removes the key. Keys present in `properties` but
//!   absent from `new_properties` are removed as well.

use crate::errors::{EditorError, Result};
use crate::node::{self, Node, Properties, RESERVED_KEYS};
use crate::path::Path;
use crate::point::{Point, Range};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    InsertNode {
        path: Path,
        node: Node,
    },

    RemoveNode {
        path: Path,
        node: Node,
    },

    InsertText {
        path: Path,
        offset: usize,
        text: String,
    },

    RemoveText {
        path: Path,
        offset: usize,
        text: String,
    },

    SetNode {
        path: Path,
        properties: Properties,
        #[serde(rename = "newProperties")]
        new_properties: Properties,
    },

    SplitNode {
        path: Path,
        position: usize,
        properties: Properties,
    },

    MergeNode {
        path: Path,
        position: usize,
        properties: Properties,
    },

    MoveNode {
        path: Path,
        #[serde(rename = "newPath")]
        new_path: Path,
    },

    SetSelection {
        properties: Option<Range>,
        #[serde(rename = "newProperties")]
        new_properties: Option<Range>,
    },
}

/// The tag of an [`Operation`], usable as a key in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    InsertNode,
    RemoveNode,
    InsertText,
    RemoveText,
    SetNode,
    SplitNode,
    MergeNode,
    MoveNode,
    SetSelection,
}

impl OperationKind {
    pub const ALL: [OperationKind; 9] = [
        OperationKind::InsertNode,
        OperationKind::RemoveNode,
        OperationKind::InsertText,
        OperationKind::RemoveText,
        OperationKind::SetNode,
        OperationKind::SplitNode,
        OperationKind::MergeNode,
        OperationKind::MoveNode,
        OperationKind::SetSelection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::InsertNode => "insert_node",
            OperationKind::RemoveNode => "remove_node",
            OperationKind::InsertText => "insert_text",
            OperationKind::RemoveText => "remove_text",
            OperationKind::SetNode => "set_node",
            OperationKind::SplitNode => "split_node",
            OperationKind::MergeNode => "merge_node",
            OperationKind::MoveNode => "move_node",
            OperationKind::SetSelection => "set_selection",
        }
    }
}

impl FromStr for OperationKind {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EditorError::UnknownOperation(s.to_string()))
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Operation {
    /// Parse an operation from its JSON form, rejecting unknown `type` tags
    /// with [`EditorError::UnknownOperation`].
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let tag = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| EditorError::UnknownOperation("<missing>".into()))?;
        OperationKind::from_str(tag)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::InsertNode { .. } => OperationKind::InsertNode,
            Operation::RemoveNode { .. } => OperationKind::RemoveNode,
            Operation::InsertText { .. } => OperationKind::InsertText,
            Operation::RemoveText { .. } => OperationKind::RemoveText,
            Operation::SetNode { .. } => OperationKind::SetNode,
            Operation::SplitNode { .. } => OperationKind::SplitNode,
            Operation::MergeNode { .. } => OperationKind::MergeNode,
            Operation::MoveNode { .. } => OperationKind::MoveNode,
            Operation::SetSelection { .. } => OperationKind::SetSelection,
        }
    }

    /// The primary path this operation targets (`None` for selection changes).
    pub fn path(&self) -> Option<&Path> {
        match self {
            Operation::InsertNode { path, .. }
            | Operation::RemoveNode { path, .. }
            | Operation::InsertText { path, .. }
            | Operation::RemoveText { path, .. }
            | Operation::SetNode { path, .. }
            | Operation::SplitNode { path, .. }
            | Operation::MergeNode { path, .. }
            | Operation::MoveNode { path, .. } => Some(path),
            Operation::SetSelection { .. } => None,
        }
    }

    pub fn is_selection(&self) -> bool {
        matches!(self, Operation::SetSelection { .. })
    }

    /// Operation that reverts this one.
    pub fn inverse(&self) -> Operation {
        match self {
            Operation::InsertNode { path, node } => Operation::RemoveNode {
                path: path.clone(),
                node: node.clone(),
            },

            Operation::RemoveNode { path, node } => Operation::InsertNode {
                path: path.clone(),
                node: node.clone(),
            },

            Operation::InsertText { path, offset, text } => Operation::RemoveText {
                path: path.clone(),
                offset: *offset,
                text: text.clone(),
            },

            Operation::RemoveText { path, offset, text } => Operation::InsertText {
                path: path.clone(),
                offset: *offset,
                text: text.clone(),
            },

            Operation::SetNode {
                path,
                properties,
                new_properties,
            } => Operation::SetNode {
                path: path.clone(),
                properties: new_properties.clone(),
                new_properties: properties.clone(),
            },

            Operation::SplitNode {
                path,
                position,
                properties,
            } => Operation::MergeNode {
                path: path.next(),
                position: *position,
                properties: properties.clone(),
            },

            Operation::MergeNode {
                path,
                position,
                properties,
            } => Operation::SplitNode {
                // merge_node is never applied at a first child
                path: path.previous().unwrap_or_else(|| path.clone()),
                position: *position,
                properties: properties.clone(),
            },

            Operation::MoveNode { path, new_path } => {
                if path == new_path {
                    return self.clone();
                }
                if path.is_sibling(new_path) {
                    return Operation::MoveNode {
                        path: new_path.clone(),
                        new_path: path.clone(),
                    };
                }
                // The node ends up at transform(path); the slot it vacated is
                // wherever its old next sibling went.
                let inverse_path = path.transform(self, None).unwrap_or_else(|| new_path.clone());
                let inverse_new_path = path
                    .next()
                    .transform(self, None)
                    .unwrap_or_else(|| path.clone());
                Operation::MoveNode {
                    path: inverse_path,
                    new_path: inverse_new_path,
                }
            }

            Operation::SetSelection {
                properties,
                new_properties,
            } => Operation::SetSelection {
                properties: new_properties.clone(),
                new_properties: properties.clone(),
            },
        }
    }

    /// Apply the operation to a children list, keeping `selection` in step.
    pub fn apply_to(&self, root: &mut Vec<Node>, selection: &mut Option<Range>) -> Result<()> {
        match self {
            Operation::InsertNode { path, node } => Self::apply_insert_node(root, path, node)?,
            Operation::RemoveNode { path, .. } => {
                Self::apply_remove_node(root, path)?;
                *selection = Self::selection_after_remove(root, selection.take(), self, path);
                return Ok(());
            }
            Operation::InsertText { path, offset, text } => {
                Self::apply_insert_text(root, path, *offset, text)?
            }
            Operation::RemoveText { path, offset, text } => {
                Self::apply_remove_text(root, path, *offset, text)?
            }
            Operation::SetNode {
                path,
                properties,
                new_properties,
            } => Self::apply_set_node(root, path, properties, new_properties)?,
            Operation::SplitNode {
                path,
                position,
                properties,
            } => Self::apply_split_node(root, path, *position, properties)?,
            Operation::MergeNode { path, .. } => Self::apply_merge_node(root, path)?,
            Operation::MoveNode { path, new_path } => {
                Self::apply_move_node(root, self, path, new_path)?
            }
            Operation::SetSelection { new_properties, .. } => {
                *selection = new_properties.clone();
                return Ok(());
            }
        }

        if let Some(range) = selection.as_mut() {
            for point in [&mut range.anchor, &mut range.focus] {
                if let Some(p) = point.transform(self, Some(crate::path::Affinity::Forward)) {
                    *point = p;
                }
            }
        }
        Ok(())
    }

    fn split_parent(path: &Path) -> Result<(Path, usize)> {
        match (path.parent(), path.last()) {
            (Some(parent), Some(index)) => Ok((parent, index)),
            _ => Err(EditorError::InvalidPath(format!(
                "operation cannot target the root ({path})"
            ))),
        }
    }

    fn apply_insert_node(root: &mut Vec<Node>, path: &Path, node: &Node) -> Result<()> {
        let (parent, index) = Self::split_parent(path)?;
        let children = node::children_at_mut(root, &parent)?;
        if index > children.len() {
            return Err(EditorError::InvalidPath(format!(
                "cannot insert at {path}: destination is past the end of the node"
            )));
        }
        children.insert(index, node.clone());
        Ok(())
    }

    fn apply_remove_node(root: &mut Vec<Node>, path: &Path) -> Result<Node> {
        let (parent, index) = Self::split_parent(path)?;
        let children = node::children_at_mut(root, &parent)?;
        if index >= children.len() {
            return Err(EditorError::NodeNotFound(path.clone()));
        }
        Ok(children.remove(index))
    }

    /// A removed selection endpoint falls back to the nearest text: the end of
    /// the previous text, else the start of the next one, else no selection.
    fn selection_after_remove(
        root: &[Node],
        selection: Option<Range>,
        op: &Operation,
        removed: &Path,
    ) -> Option<Range> {
        let mut range = selection?;
        for point in [&mut range.anchor, &mut range.focus] {
            if let Some(p) = point.transform(op, Some(crate::path::Affinity::Forward)) {
                *point = p;
                continue;
            }

            let mut prev: Option<(Path, usize)> = None;
            let mut next: Option<Path> = None;
            for (p, text) in node::texts(root) {
                if p.is_before(removed) {
                    prev = Some((p, text.text.len()));
                } else {
                    next = Some(p);
                    break;
                }
            }

            let prefer_next = match (&prev, &next) {
                (Some((prev_path, _)), Some(next_path)) => {
                    if next_path == removed {
                        !next_path.has_previous()
                    } else {
                        prev_path.common(removed).len() < next_path.common(removed).len()
                    }
                }
                _ => false,
            };

            match (prev, next) {
                (Some((path, offset)), _) if !prefer_next => *point = Point { path, offset },
                (_, Some(path)) => *point = Point { path, offset: 0 },
                _ => return None,
            }
        }
        Some(range)
    }

    fn apply_insert_text(root: &mut [Node], path: &Path, offset: usize, text: &str) -> Result<()> {
        let leaf = node::leaf_mut(root, path)?;
        if offset > leaf.text.len() || !leaf.text.is_char_boundary(offset) {
            return Err(EditorError::InvalidOffset {
                path: path.clone(),
                offset,
            });
        }
        leaf.text.insert_str(offset, text);
        Ok(())
    }

    fn apply_remove_text(root: &mut [Node], path: &Path, offset: usize, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let leaf = node::leaf_mut(root, path)?;
        let end = offset + text.len();
        if end > leaf.text.len()
            || !leaf.text.is_char_boundary(offset)
            || !leaf.text.is_char_boundary(end)
        {
            return Err(EditorError::InvalidOffset {
                path: path.clone(),
                offset: end,
            });
        }
        leaf.text.replace_range(offset..end, "");
        Ok(())
    }

    fn apply_set_node(
        root: &mut [Node],
        path: &Path,
        properties: &Properties,
        new_properties: &Properties,
    ) -> Result<()> {
        if path.is_root() {
            return Err(EditorError::InvalidPath(
                "cannot set properties on the root node".into(),
            ));
        }
        let node = node::get_mut(root, path)?;
        let props = node.properties_mut();

        for (key, value) in new_properties {
            if RESERVED_KEYS.contains(&key.as_str()) {
                return Err(EditorError::InvalidProperty(format!(
                    "cannot set the \"{key}\" property of nodes"
                )));
            }
            if value.is_null() {
                props.remove(key);
            } else {
                props.insert(key.clone(), value.clone());
            }
        }

        for key in properties.keys() {
            if !new_properties.contains_key(key) {
                props.remove(key);
            }
        }
        Ok(())
    }

    fn apply_split_node(
        root: &mut Vec<Node>,
        path: &Path,
        position: usize,
        properties: &Properties,
    ) -> Result<()> {
        let (parent, index) = Self::split_parent(path)?;
        let new_node = match node::get_mut(root, path)? {
            Node::Text(t) => {
                if position > t.text.len() || !t.text.is_char_boundary(position) {
                    return Err(EditorError::InvalidOffset {
                        path: path.clone(),
                        offset: position,
                    });
                }
                let after = t.text.split_off(position);
                Node::Text(crate::node::Text {
                    text: after,
                    properties: properties.clone(),
                })
            }
            Node::Element(e) => {
                if position > e.children.len() {
                    return Err(EditorError::InvalidOffset {
                        path: path.clone(),
                        offset: position,
                    });
                }
                let after = e.children.split_off(position);
                Node::Element(crate::node::Element {
                    children: after,
                    properties: properties.clone(),
                })
            }
        };
        node::children_at_mut(root, &parent)?.insert(index + 1, new_node);
        Ok(())
    }

    fn apply_merge_node(root: &mut Vec<Node>, path: &Path) -> Result<()> {
        let (parent, index) = Self::split_parent(path)?;
        if index == 0 {
            return Err(EditorError::InvalidPath(format!(
                "cannot merge {path}: it has no previous sibling"
            )));
        }
        let children = node::children_at_mut(root, &parent)?;
        if index >= children.len() {
            return Err(EditorError::NodeNotFound(path.clone()));
        }

        let compatible = matches!(
            (&children[index - 1], &children[index]),
            (Node::Text(_), Node::Text(_)) | (Node::Element(_), Node::Element(_))
        );
        if !compatible {
            return Err(EditorError::MergeMismatch(path.clone()));
        }

        let node = children.remove(index);
        match (&mut children[index - 1], node) {
            (Node::Text(prev), Node::Text(t)) => prev.text.push_str(&t.text),
            (Node::Element(prev), Node::Element(e)) => prev.children.extend(e.children),
            _ => return Err(EditorError::MergeMismatch(path.clone())),
        }
        Ok(())
    }

    fn apply_move_node(
        root: &mut Vec<Node>,
        op: &Operation,
        path: &Path,
        new_path: &Path,
    ) -> Result<()> {
        if path.is_ancestor(new_path) {
            return Err(EditorError::CannotMoveIntoItself);
        }
        if path == new_path {
            return Ok(());
        }

        let node = Self::apply_remove_node(root, path)?;
        let true_path = path
            .transform(op, None)
            .ok_or_else(|| EditorError::InvalidPath(format!("cannot move {path}")))?;
        let (parent, index) = Self::split_parent(&true_path)?;
        let children = node::children_at_mut(root, &parent)?;
        if index > children.len() {
            return Err(EditorError::InvalidPath(format!(
                "cannot move to {new_path}: destination is past the end of the node"
            )));
        }
        children.insert(index, node);
        Ok(())
    }
}
