use duet_editor::{Node, Path};
use yrs::{Text, TransactionMut};

use super::ApplyContext;
use crate::convert::properties_to_attrs;
use crate::error::{Result, SyncError};
use crate::location::resolve_target;

pub fn insert_text(
    txn: &mut TransactionMut,
    cx: ApplyContext<'_>,
    path: &Path,
    offset: usize,
    text: &str,
) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    let target = resolve_target(&*txn, cx.root, cx.tree, path)?;
    let Some(Node::Text(leaf)) = target.node else {
        return Err(SyncError::Desync(format!("cannot insert text into {path}")));
    };
    target.parent.insert_with_attributes(
        txn,
        target.start + offset as u32,
        text,
        properties_to_attrs(&leaf.properties),
    );
    Ok(())
}

pub fn remove_text(
    txn: &mut TransactionMut,
    cx: ApplyContext<'_>,
    path: &Path,
    offset: usize,
    text: &str,
) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    let target = resolve_target(&*txn, cx.root, cx.tree, path)?;
    let start = target.start + offset as u32;
    let len = text.len() as u32;
    if start + len > target.end {
        return Err(SyncError::OutOfBounds {
            offset: start + len,
            length: target.end,
        });
    }
    target.parent.remove_range(txn, start, len);
    Ok(())
}
