//! # Undo/Redo Stack
//!
//! Local, non-collaborative history. The collaborative history in the sync
//! crate replaces it while a document is connected to a shared CRDT.
//!
//! ## Design
//!
//! - Each batch records the operations it applied plus the selection before
//!   the first of them
//! - Undo applies the inverses in reverse order, then restores the selection
//! - Redo restores the selection, then reapplies the operations
//! - New batches clear the redo stack
//! - Consecutive typing (or deleting) in one text leaf merges into one batch
//! - Selection changes are never recorded
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut doc = Document::new(children);
//! doc.apply(Operation::InsertText { .. })?;
//! doc.undo()?;
//! doc.redo()?;
//! ```

use crate::operations::Operation;
use crate::point::Range;

/// A group of operations that are undone/redone together
#[derive(Debug, Clone, PartialEq)]
pub struct OperationBatch {
    /// The operations in this batch (in application order)
    pub operations: Vec<Operation>,

    /// Selection before the first operation
    pub selection_before: Option<Range>,
}

impl OperationBatch {
    pub fn single(operation: Operation, selection_before: Option<Range>) -> Self {
        Self {
            operations: vec![operation],
            selection_before,
        }
    }

    /// Inverse operations, in the order they must be applied.
    pub fn inverses(&self) -> Vec<Operation> {
        self.operations.iter().rev().map(Operation::inverse).collect()
    }
}

/// Undo/redo stack for document editing
#[derive(Debug)]
pub struct UndoStack {
    /// Stack of applied batches (most recent last)
    undo_stack: Vec<OperationBatch>,

    /// Stack of undone batches (most recent last)
    redo_stack: Vec<OperationBatch>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    /// Currently building a batch
    current_batch: Option<OperationBatch>,

    /// Whether the next recorded operation may merge into the top batch
    merging: bool,
}

impl UndoStack {
    /// Create a new undo stack with default max levels (100)
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            current_batch: None,
            merging: true,
        }
    }

    /// Record an applied operation. `selection_before` is the selection just
    /// before it was applied.
    pub fn record(&mut self, operation: &Operation, selection_before: &Option<Range>) {
        if operation.is_selection() {
            return;
        }

        if let Some(batch) = &mut self.current_batch {
            if batch.operations.is_empty() {
                batch.selection_before = selection_before.clone();
            }
            batch.operations.push(operation.clone());
            return;
        }

        let merge = self.merging
            && self
                .undo_stack
                .last()
                .and_then(|batch| batch.operations.last())
                .map_or(false, |prev| continues_typing(prev, operation));

        if merge {
            if let Some(batch) = self.undo_stack.last_mut() {
                batch.operations.push(operation.clone());
                self.redo_stack.clear();
                return;
            }
        }

        self.push_batch(OperationBatch::single(
            operation.clone(),
            selection_before.clone(),
        ));
    }

    /// Start a batch of operations (will be undone/redone together)
    pub fn begin_batch(&mut self) {
        self.current_batch = Some(OperationBatch {
            operations: Vec::new(),
            selection_before: None,
        });
    }

    /// End the current batch and push to undo stack
    pub fn end_batch(&mut self) {
        if let Some(batch) = self.current_batch.take() {
            if !batch.operations.is_empty() {
                self.push_batch(batch);
            }
        }
    }

    pub fn is_batching(&self) -> bool {
        self.current_batch.is_some()
    }

    /// Prevent the next operation from merging into the current top batch.
    pub fn break_merge(&mut self) {
        self.merging = false;
    }

    fn push_batch(&mut self, batch: OperationBatch) {
        self.merging = true;
        self.undo_stack.push(batch);

        // Trim if exceeded max levels
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        // Clear redo stack (new action invalidates future)
        self.redo_stack.clear();
    }

    /// Take the batch to undo; the caller applies it and hands it back with
    /// [`UndoStack::push_redo`].
    pub fn pop_undo(&mut self) -> Option<OperationBatch> {
        self.merging = false;
        self.undo_stack.pop()
    }

    pub fn pop_redo(&mut self) -> Option<OperationBatch> {
        self.merging = false;
        self.redo_stack.pop()
    }

    pub fn push_redo(&mut self, batch: OperationBatch) {
        self.redo_stack.push(batch);
    }

    /// Put a redone batch back without clearing the redo stack.
    pub fn push_undo(&mut self, batch: OperationBatch) {
        self.undo_stack.push(batch);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Get the number of undo levels available
    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    /// Get the number of redo levels available
    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    /// Clear all undo/redo history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current_batch = None;
        self.merging = true;
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

/// `next` extends the text edit made by `prev` without a gap.
fn continues_typing(prev: &Operation, next: &Operation) -> bool {
    match (prev, next) {
        (
            Operation::InsertText {
                path: p1,
                offset: o1,
                text: t1,
            },
            Operation::InsertText {
                path: p2,
                offset: o2,
                ..
            },
        ) => p1 == p2 && o1 + t1.len() == *o2,
        (
            Operation::RemoveText {
                path: p1,
                offset: o1,
                ..
            },
            Operation::RemoveText {
                path: p2,
                offset: o2,
                text: t2,
            },
        ) => p1 == p2 && o2 + t2.len() == *o1,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;

    fn insert(offset: usize, text: &str) -> Operation {
        Operation::InsertText {
            path: Path::from([0, 0]),
            offset,
            text: text.into(),
        }
    }

    #[test]
    fn test_undo_stack_creation() {
        let stack = UndoStack::new();
        assert_eq!(stack.undo_levels(), 0);
        assert_eq!(stack.redo_levels(), 0);
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_typing_merges() {
        let mut stack = UndoStack::new();
        stack.record(&insert(0, "a"), &None);
        stack.record(&insert(1, "b"), &None);
        stack.record(&insert(5, "c"), &None);
        assert_eq!(stack.undo_levels(), 2);
    }

    #[test]
    fn test_batched_operations() {
        let mut stack = UndoStack::new();
        stack.begin_batch();
        stack.record(&insert(0, "a"), &None);
        stack.record(&insert(9, "b"), &None);
        stack.end_batch();

        assert_eq!(stack.undo_levels(), 1);
        let batch = stack.pop_undo().unwrap();
        assert_eq!(batch.inverses()[0], insert(9, "b").inverse());
    }

    #[test]
    fn test_new_batch_clears_redo() {
        let mut stack = UndoStack::new();
        stack.record(&insert(0, "a"), &None);
        let batch = stack.pop_undo().unwrap();
        stack.push_redo(batch);
        assert_eq!(stack.redo_levels(), 1);

        stack.record(&insert(0, "z"), &None);
        assert_eq!(stack.redo_levels(), 0);
    }

    #[test]
    fn test_max_levels_enforced() {
        let mut stack = UndoStack::with_max_levels(2);
        for i in 0..3 {
            stack.record(&insert(i * 10, "x"), &None);
        }
        assert_eq!(stack.undo_levels(), 2);
    }

    #[test]
    fn test_selection_changes_not_recorded() {
        let mut stack = UndoStack::new();
        stack.record(
            &Operation::SetSelection {
                properties: None,
                new_properties: None,
            },
            &None,
        );
        assert!(!stack.can_undo());
    }
}
