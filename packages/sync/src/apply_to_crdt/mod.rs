//! # Editor → CRDT
//!
//! Mirrors one editor operation into the shared sequence. Every handler gets
//! the tree as it was *before* the operation, so paths and offsets in the
//! operation resolve exactly as they did when the editor applied it.
//!
//! ## Handlers
//!
//! | Operation | Effect on the sequence |
//! |---|---|
//! | `insert_node` | insert the text run or a new embedded sequence |
//! | `remove_node` | delete the range the node occupies |
//! | `set_node` | element attributes, or formatting over a text run |
//! | `split_node` | re-format a text run, or move the tail of an element into a new sibling |
//! | `merge_node` | re-format a text run, or append an element's content to its previous sibling |
//! | `move_node` | delete the range and insert a copy at the destination |
//! | `insert_text` / `remove_text` | character edits |
//! | `set_selection` | nothing |

mod node;
mod text;

use duet_editor::{Node, Operation};
use yrs::{TransactionMut, XmlTextRef};

use crate::error::{Result, SyncError};

/// What a handler needs besides the operation
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext<'a> {
    pub root: &'a XmlTextRef,
    /// Tree before the operation
    pub tree: &'a [Node],
    /// Root attribute prefix of stored positions
    pub position_prefix: &'a str,
}

/// Mirror `op` into the shared sequence.
pub fn apply_operation(txn: &mut TransactionMut, cx: ApplyContext<'_>, op: &Operation) -> Result<()> {
    tracing::trace!(kind = %op.kind(), "applying operation to the shared root");
    match op {
        Operation::InsertNode { path, node } => node::insert_node(txn, cx, path, node),
        Operation::RemoveNode { path, .. } => node::remove_node(txn, cx, path),
        Operation::SetNode {
            path,
            properties,
            new_properties,
        } => node::set_node(txn, cx, path, properties, new_properties),
        Operation::SplitNode {
            path,
            position,
            properties,
        } => node::split_node(txn, cx, path, *position, properties),
        Operation::MergeNode { path, .. } => node::merge_node(txn, cx, path),
        Operation::MoveNode { path, new_path } => node::move_node(txn, cx, path, new_path),
        Operation::InsertText { path, offset, text } => {
            text::insert_text(txn, cx, path, *offset, text)
        }
        Operation::RemoveText { path, offset, text } => {
            text::remove_text(txn, cx, path, *offset, text)
        }
        Operation::SetSelection { .. } => Ok(()),
    }
}

/// Mirror an operation in its JSON form. Unknown operation types fail with
/// [`SyncError::UnknownOperation`].
pub fn apply_json(
    txn: &mut TransactionMut,
    cx: ApplyContext<'_>,
    value: serde_json::Value,
) -> Result<()> {
    let op = Operation::from_json(value).map_err(SyncError::from)?;
    apply_operation(txn, cx, &op)
}
