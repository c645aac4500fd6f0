//! # Stored Positions
//!
//! Named points persisted on the shared root as encoded sticky indexes, plus
//! the conversions between tree points/ranges and CRDT-relative positions.
//!
//! A stored position lives under the root attribute `<prefix><key>`. It keeps
//! pointing at the same character while other content changes and stops
//! resolving once that character is deleted.
//!
//! Content that is moved by deleting it in one place and re-inserting a copy
//! elsewhere loses its sticky indexes. Handlers doing that capture the
//! positions inside the range first ([`capture_positions_in_range`]) and
//! re-anchor them in the copy afterwards ([`restore_positions`]).

use duet_editor::{node, Node, Point, Range};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Any, Assoc, IndexedSequence, Out, ReadTxn, StickyIndex, TransactionMut, Xml, XmlOut, XmlTextRef};

use crate::delta::same_sequence;
use crate::error::{Result, SyncError};
use crate::location::{embed_at, embed_offset, flat_to_path_offset, resolve_path, resolve_target};

/// A range anchored in the CRDT
#[derive(Debug, Clone)]
pub struct RelativeRange {
    pub anchor: StickyIndex,
    pub focus: StickyIndex,
}

/// Sticky index for a text point. A point at the very end of its text sticks
/// to the character before it.
pub fn point_to_relative_position(
    txn: &mut TransactionMut,
    root: &XmlTextRef,
    tree: &[Node],
    point: &Point,
) -> Result<StickyIndex> {
    let target = resolve_target(&*txn, root, tree, &point.path)?;
    if target.sequence.is_some() || !matches!(target.node, Some(Node::Text(_))) {
        return Err(SyncError::Desync(format!(
            "point at {} does not target a text node",
            point.path
        )));
    }
    let index = target.start + point.offset as u32;
    let assoc = if index == target.end {
        Assoc::Before
    } else {
        Assoc::After
    };
    target
        .parent
        .sticky_index(txn, index, assoc)
        .ok_or_else(|| SyncError::Desync(format!("no sticky index at {index}")))
}

/// Resolve a sticky index to a tree point. `None` when the anchored content is
/// gone or no longer lands in a text node.
pub fn relative_position_to_point<T: ReadTxn>(
    txn: &T,
    root: &XmlTextRef,
    tree: &[Node],
    position: &StickyIndex,
) -> Result<Option<Point>> {
    let Some(offset) = position.get_offset(txn) else {
        return Ok(None);
    };
    let seq = match XmlOut::try_from(offset.branch) {
        Ok(XmlOut::Text(seq)) => seq,
        _ => {
            return Err(SyncError::UnexpectedTarget(
                "position points into a non-text sequence".into(),
            ))
        }
    };
    let Some(parent_path) = resolve_path(txn, root, tree, &seq)? else {
        return Ok(None);
    };
    let children = node::children_at(tree, &parent_path)?;
    let (index, text_offset) = flat_to_path_offset(children, offset.index, offset.assoc, false)?;
    match children.get(index) {
        Some(Node::Text(_)) => Ok(Some(Point::new(parent_path.child(index), text_offset as usize))),
        _ => Ok(None),
    }
}

pub fn range_to_relative_range(
    txn: &mut TransactionMut,
    root: &XmlTextRef,
    tree: &[Node],
    range: &Range,
) -> Result<RelativeRange> {
    Ok(RelativeRange {
        anchor: point_to_relative_position(txn, root, tree, &range.anchor)?,
        focus: point_to_relative_position(txn, root, tree, &range.focus)?,
    })
}

pub fn relative_range_to_range<T: ReadTxn>(
    txn: &T,
    root: &XmlTextRef,
    tree: &[Node],
    range: &RelativeRange,
) -> Result<Option<Range>> {
    let anchor = relative_position_to_point(txn, root, tree, &range.anchor)?;
    let focus = relative_position_to_point(txn, root, tree, &range.focus)?;
    Ok(anchor.zip(focus).map(|(anchor, focus)| Range { anchor, focus }))
}

fn attribute_key(prefix: &str, key: &str) -> String {
    format!("{prefix}{key}")
}

/// Persist `point` under `key`.
pub fn store_position(
    txn: &mut TransactionMut,
    root: &XmlTextRef,
    tree: &[Node],
    prefix: &str,
    key: &str,
    point: &Point,
) -> Result<()> {
    let position = point_to_relative_position(txn, root, tree, point)?;
    write_position(txn, root, prefix, key, &position);
    tracing::debug!(key, path = %point.path, offset = point.offset, "stored position");
    Ok(())
}

fn write_position(
    txn: &mut TransactionMut,
    root: &XmlTextRef,
    prefix: &str,
    key: &str,
    position: &StickyIndex,
) {
    let encoded: Vec<u8> = position.encode_v1();
    root.insert_attribute(txn, attribute_key(prefix, key), Any::Buffer(encoded.into()));
}

/// Raw sticky index stored under `key`.
pub fn read_position<T: ReadTxn>(
    txn: &T,
    root: &XmlTextRef,
    prefix: &str,
    key: &str,
) -> Result<Option<StickyIndex>> {
    match root.get_attribute(txn, &attribute_key(prefix, key)) {
        Some(Out::Any(Any::Buffer(bytes))) => StickyIndex::decode_v1(&bytes)
            .map(Some)
            .map_err(|e| SyncError::Decode(e.to_string())),
        Some(_) => Err(SyncError::Decode(format!(
            "stored position {key} is not a binary value"
        ))),
        None => Ok(None),
    }
}

/// The point stored under `key`: `None` if nothing was stored, `Some(None)` if
/// it no longer resolves.
pub fn position<T: ReadTxn>(
    txn: &T,
    root: &XmlTextRef,
    tree: &[Node],
    prefix: &str,
    key: &str,
) -> Result<Option<Option<Point>>> {
    match read_position(txn, root, prefix, key)? {
        Some(sticky) => relative_position_to_point(txn, root, tree, &sticky).map(Some),
        None => Ok(None),
    }
}

pub fn remove_stored_position(txn: &mut TransactionMut, root: &XmlTextRef, prefix: &str, key: &str) {
    root.remove_attribute(txn, &attribute_key(prefix, key));
    tracing::debug!(key, "removed stored position");
}

/// All stored positions with their keys, undecodable entries skipped.
pub fn stored_sticky_indexes<T: ReadTxn>(
    txn: &T,
    root: &XmlTextRef,
    prefix: &str,
) -> Vec<(String, StickyIndex)> {
    let mut positions: Vec<(String, StickyIndex)> = root
        .attributes(txn)
        .filter_map(|(name, value)| {
            let key = name.strip_prefix(prefix)?;
            match value {
                Out::Any(Any::Buffer(bytes)) => match StickyIndex::decode_v1(&bytes) {
                    Ok(sticky) => Some((key.to_string(), sticky)),
                    Err(e) => {
                        tracing::warn!(key, error = %e, "skipping undecodable stored position");
                        None
                    }
                },
                _ => None,
            }
        })
        .collect();
    positions.sort_by(|a, b| a.0.cmp(&b.0));
    positions
}

/// Every stored position, resolved against `tree`.
pub fn stored_positions<T: ReadTxn>(
    txn: &T,
    root: &XmlTextRef,
    tree: &[Node],
    prefix: &str,
) -> Result<Vec<(String, Option<Point>)>> {
    stored_sticky_indexes(txn, root, prefix)
        .into_iter()
        .map(|(key, sticky)| Ok((key, relative_position_to_point(txn, root, tree, &sticky)?)))
        .collect()
}

/// A stored position captured relative to a range of a sequence
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPosition {
    pub key: String,
    /// Embed offsets from the captured range down to the anchoring sequence.
    /// The first hop is relative to the range start.
    pub route: Vec<u32>,
    /// Index inside the anchoring sequence; relative to the range start when
    /// `route` is empty
    pub index: u32,
    pub assoc: Assoc,
}

/// Stored positions anchored inside `[start, end)` of `seq`, including those
/// anchored in sequences embedded in that range.
pub fn capture_positions_in_range<T: ReadTxn>(
    txn: &T,
    root: &XmlTextRef,
    prefix: &str,
    seq: &XmlTextRef,
    start: u32,
    end: u32,
) -> Vec<CapturedPosition> {
    let mut captured = Vec::new();

    for (key, sticky) in stored_sticky_indexes(txn, root, prefix) {
        let Some(offset) = sticky.get_offset(txn) else {
            continue;
        };
        let Ok(XmlOut::Text(anchor)) = XmlOut::try_from(offset.branch) else {
            continue;
        };
        let Some(mut route) = route_between(txn, seq, &anchor) else {
            continue;
        };

        let inside = match route.first() {
            Some(&hop) => hop >= start && hop < end,
            None => {
                let anchor_index = match offset.assoc {
                    Assoc::After => Some(offset.index),
                    Assoc::Before => offset.index.checked_sub(1),
                };
                anchor_index.map_or(false, |i| i >= start && i < end)
            }
        };
        if !inside {
            continue;
        }

        let index = match route.first_mut() {
            Some(hop) => {
                *hop -= start;
                offset.index
            }
            None => offset.index - start,
        };
        captured.push(CapturedPosition {
            key,
            route,
            index,
            assoc: offset.assoc,
        });
    }

    captured
}

/// Embed offsets leading from `ancestor` down to `seq`, if `seq` lies below.
fn route_between<T: ReadTxn>(txn: &T, ancestor: &XmlTextRef, seq: &XmlTextRef) -> Option<Vec<u32>> {
    let mut route = Vec::new();
    let mut current = seq.clone();
    while !same_sequence(&current, ancestor) {
        let Some(XmlOut::Text(parent)) = current.parent() else {
            return None;
        };
        route.push(embed_offset(txn, &parent, &current)?);
        current = parent;
    }
    route.reverse();
    Some(route)
}

/// Re-anchor captured positions in `target`, whose copy of the captured range
/// starts at `shift`.
pub fn restore_positions(
    txn: &mut TransactionMut,
    root: &XmlTextRef,
    prefix: &str,
    target: &XmlTextRef,
    captured: &[CapturedPosition],
    shift: u32,
) {
    for position in captured {
        let (seq, index) = match position.route.split_first() {
            None => (Some(target.clone()), position.index + shift),
            Some((&first, rest)) => {
                let mut seq = embed_at(&*txn, target, first + shift);
                for &hop in rest {
                    seq = seq.and_then(|s| embed_at(&*txn, &s, hop));
                }
                (seq, position.index)
            }
        };

        let sticky = seq.and_then(|seq| seq.sticky_index(txn, index, position.assoc));
        match sticky {
            Some(sticky) => write_position(txn, root, prefix, &position.key, &sticky),
            None => tracing::warn!(key = %position.key, "could not restore stored position"),
        }
    }
}
