//! # CRDT → Editor
//!
//! Remote changes arrive as CRDT events. [`event`] copies them out of the
//! committing transaction, [`translate`] turns each one into editor
//! operations against the current tree.
//!
//! ```text
//! observe_deep → capture_events → inbox → translate_event → Document
//! ```

mod event;
mod translate;

pub use event::{
    capture_events, drain, observe, CapturedTransaction, ChangeStep, Inbox, InsertContent,
    SequenceEvent,
};
pub use translate::{translate_delta, translate_event};

use duet_editor::{Document, Operation};

use crate::error::Result;

/// Translate and apply `events` in order. Each event is translated against
/// the tree left by the previous one. Returns the applied operations.
pub fn apply_events(document: &mut Document, events: &[SequenceEvent]) -> Result<Vec<Operation>> {
    let mut applied = Vec::new();
    for event in events {
        if event.target.is_none() {
            tracing::debug!("skipping event of a sequence deleted in the same transaction");
            continue;
        }
        for op in translate_event(document.children(), event)? {
            document.apply_operation(op.clone())?;
            applied.push(op);
        }
    }
    Ok(applied)
}
