//! # Location Mapping
//!
//! Translates between tree coordinates and flat sequence coordinates.
//!
//! Inside an element, every text child occupies as many flat slots as it has
//! bytes and every element child occupies exactly one. A tree path is
//! resolved level by level: the child index becomes a flat range in the
//! parent sequence, and the insert delta in that range must be a single item
//! (the embedded sequence of an element, or one text run).

use duet_editor::{Node, Path};
use yrs::{Assoc, ReadTxn, Xml, XmlOut, XmlTextRef};

use crate::delta::{
    insert_delta_length, same_sequence, sequence_to_insert_delta, slice_insert_delta,
    DeltaValue, InsertDelta,
};
use crate::error::{Result, SyncError};

/// Flat length of a node inside its parent.
pub fn length_of(node: &Node) -> u32 {
    match node {
        Node::Text(text) => text.text.len() as u32,
        Node::Element(_) => 1,
    }
}

/// Flat offset at which child `path_offset` starts.
pub fn path_offset_to_flat(children: &[Node], path_offset: usize) -> u32 {
    children.iter().take(path_offset).map(length_of).sum()
}

/// Child index and offset inside that child for a flat offset.
///
/// A flat offset on the boundary of two children binds to the start of the
/// following child with [`Assoc::After`] and to the end of the preceding
/// non-empty child with [`Assoc::Before`]. With `insert`, an offset at the
/// very end yields one past the last child.
pub fn flat_to_path_offset(
    children: &[Node],
    flat: u32,
    assoc: Assoc,
    insert: bool,
) -> Result<(usize, u32)> {
    let mut current = 0u32;
    let mut last_non_empty = 0usize;

    for (index, child) in children.iter().enumerate() {
        let len = length_of(child);
        if len > 0 {
            last_non_empty = index;
        }
        let end = current + len;
        let hit = match assoc {
            Assoc::After => end > flat,
            Assoc::Before => end >= flat,
        };
        if len > 0 && hit {
            return Ok((index, flat - current));
        }
        current = end;
    }

    if flat > current + u32::from(insert) {
        return Err(SyncError::OutOfBounds {
            offset: flat,
            length: current,
        });
    }
    if insert {
        return Ok((children.len(), 0));
    }
    let offset = children.get(last_non_empty).map(length_of).unwrap_or(0);
    Ok((last_non_empty, offset))
}

/// A resolved tree path in the sequence tree
#[derive(Debug, Clone)]
pub struct Target<'a> {
    /// Sequence holding the target
    pub parent: XmlTextRef,
    /// Tree children of that parent
    pub parent_children: &'a [Node],
    /// Flat range `[start, end)` occupied by the target in `parent`
    pub start: u32,
    pub end: u32,
    /// Embedded sequence of the target when it is an element
    pub sequence: Option<XmlTextRef>,
    /// Tree node at the path; `None` for an insert position
    pub node: Option<&'a Node>,
    /// Content of `[start, end)`
    pub delta: InsertDelta,
}

impl Target<'_> {
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Resolve `path` against the sequence rooted at `root` and the tree children
/// `tree`, descending both in lockstep.
pub fn resolve_target<'a, T: ReadTxn>(
    txn: &T,
    root: &XmlTextRef,
    tree: &'a [Node],
    path: &Path,
) -> Result<Target<'a>> {
    let (&path_offset, rest) = path
        .split_first()
        .ok_or_else(|| SyncError::Desync("cannot resolve the root as a target".into()))?;

    let node = tree.get(path_offset);
    let start = path_offset_to_flat(tree, path_offset);
    let end = start + node.map(length_of).unwrap_or(0);
    let delta = slice_insert_delta(&sequence_to_insert_delta(txn, root), start, end - start);
    if delta.len() > 1 {
        return Err(SyncError::Desync(format!(
            "target at {path} spans {} sequence items",
            delta.len()
        )));
    }
    let sequence = delta.first().and_then(|item| item.as_sequence().cloned());

    if !rest.is_empty() {
        let (Some(Node::Element(element)), Some(sequence)) = (node, sequence.as_ref()) else {
            return Err(SyncError::Desync(format!(
                "cannot descend into {path}: not an element on both sides"
            )));
        };
        return resolve_target(txn, sequence, &element.children, &Path::from(rest));
    }

    Ok(Target {
        parent: root.clone(),
        parent_children: tree,
        start,
        end,
        sequence,
        node,
        delta,
    })
}

/// Flat offset of each embed on the way from `root` down to `seq`.
///
/// Returns `None` when `seq` is no longer reachable from `root`, e.g. because
/// it was deleted.
pub fn sequence_hops<T: ReadTxn>(
    txn: &T,
    root: &XmlTextRef,
    seq: &XmlTextRef,
) -> Result<Option<Vec<u32>>> {
    let mut hops = Vec::new();
    let mut current = seq.clone();

    while !same_sequence(&current, root) {
        let parent = match current.parent() {
            Some(XmlOut::Text(parent)) => parent,
            Some(_) | None => {
                return Err(SyncError::UnexpectedTarget(
                    "sequence is not a descendant of the shared root".into(),
                ))
            }
        };
        match embed_offset(txn, &parent, &current) {
            Some(offset) => hops.push(offset),
            None => return Ok(None),
        }
        current = parent;
    }

    hops.reverse();
    Ok(Some(hops))
}

/// Flat offset of `child` inside `parent`, if it is still embedded there.
pub fn embed_offset<T: ReadTxn>(txn: &T, parent: &XmlTextRef, child: &XmlTextRef) -> Option<u32> {
    let mut offset = 0;
    for item in sequence_to_insert_delta(txn, parent) {
        if let DeltaValue::Sequence(seq) = &item.insert {
            if same_sequence(seq, child) {
                return Some(offset);
            }
        }
        offset += item.len();
    }
    None
}

/// Embedded sequence at flat `offset` of `parent`.
pub fn embed_at<T: ReadTxn>(txn: &T, parent: &XmlTextRef, offset: u32) -> Option<XmlTextRef> {
    slice_insert_delta(&sequence_to_insert_delta(txn, parent), offset, 1)
        .first()
        .and_then(|item| item.as_sequence().cloned())
}

/// Turn flat hops into a tree path.
pub fn hops_to_path(tree: &[Node], hops: &[u32]) -> Result<Path> {
    let mut path = Path::root();
    let mut children = tree;

    for &hop in hops {
        let (index, _) = flat_to_path_offset(children, hop, Assoc::After, false)?;
        match children.get(index) {
            Some(Node::Element(element)) => children = &element.children,
            _ => {
                return Err(SyncError::Desync(format!(
                    "embedded sequence maps to a text node below {path}"
                )))
            }
        }
        path.push(index);
    }

    Ok(path)
}

/// Tree path of an embedded sequence. The root resolves to the empty path.
pub fn resolve_path<T: ReadTxn>(
    txn: &T,
    root: &XmlTextRef,
    tree: &[Node],
    seq: &XmlTextRef,
) -> Result<Option<Path>> {
    match sequence_hops(txn, root, seq)? {
        Some(hops) => hops_to_path(tree, &hops).map(Some),
        None => Ok(None),
    }
}

/// Total flat length of a sequence.
pub fn sequence_length<T: ReadTxn>(txn: &T, seq: &XmlTextRef) -> u32 {
    insert_delta_length(&sequence_to_insert_delta(txn, seq))
}
