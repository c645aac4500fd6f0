//! # Shared History
//!
//! Undo and redo over the shared root, built on the CRDT undo manager so only
//! this replica's own changes are reverted.
//!
//! The undo manager knows CRDT changes only. Every one of its stack items is
//! mirrored by a [`HistoryEntry`] carrying the editor operations that produced
//! it and the selection around them. Entries are kept in step with the
//! manager's stacks after every local transaction and every undo or redo.

use duet_editor::Operation;
use std::collections::HashSet;
use yrs::undo::Options as UndoOptions;
use yrs::{Doc, Origin, UndoManager, XmlTextRef};

use crate::config::SyncConfig;
use crate::positions::RelativeRange;

/// Mirror of one undo manager stack item
#[derive(Debug, Clone, Default)]
pub struct HistoryEntry {
    /// Editor operations in the order they were applied
    pub operations: Vec<Operation>,
    pub selection_before: Option<RelativeRange>,
    pub selection_after: Option<RelativeRange>,
}

impl HistoryEntry {
    /// Operations reverting this entry: each one inverted, in reverse order.
    pub fn inverse_operations(&self) -> Vec<Operation> {
        self.operations.iter().rev().map(Operation::inverse).collect()
    }
}

pub struct HistoryController {
    manager: UndoManager,
    tracked: HashSet<Origin>,
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
}

impl std::fmt::Debug for HistoryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryController")
            .field("undo", &self.undo.len())
            .field("redo", &self.redo.len())
            .finish()
    }
}

impl HistoryController {
    pub fn new(doc: &Doc, root: &XmlTextRef, config: &SyncConfig) -> Self {
        let options = UndoOptions {
            capture_timeout_millis: config.history.capture_timeout_ms,
            ..UndoOptions::default()
        };
        let mut manager = UndoManager::with_scope_and_options(doc, root, options);

        let mut tracked = HashSet::new();
        let origins = std::iter::once(&config.local_origin).chain(&config.history.tracked_origins);
        for origin in origins {
            let origin = Origin::from(origin.as_str());
            manager.include_origin(origin.clone());
            tracked.insert(origin);
        }

        Self {
            manager,
            tracked,
            undo: Vec::new(),
            redo: Vec::new(),
        }
    }

    /// Origin of the transactions the undo manager runs.
    pub fn origin(&self) -> Origin {
        self.manager.as_origin()
    }

    pub fn is_tracked(&self, origin: &Origin) -> bool {
        self.tracked.contains(origin)
    }

    pub fn can_undo(&self) -> bool {
        self.manager.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.manager.can_redo()
    }

    pub fn undo_entries(&self) -> &[HistoryEntry] {
        &self.undo
    }

    pub fn redo_entries(&self) -> &[HistoryEntry] {
        &self.redo
    }

    /// Bookkeeping after a committed local transaction. A new stack item gets
    /// a new entry; a transaction merged into the top item extends it and
    /// moves its after-selection.
    pub fn record(
        &mut self,
        origin: &Origin,
        operations: Vec<Operation>,
        selection_before: Option<RelativeRange>,
        selection_after: Option<RelativeRange>,
    ) {
        let items = self.manager.undo_stack().len();
        if self.is_tracked(origin) {
            if items > self.undo.len() {
                self.pad_undo(items - 1);
                self.undo.push(HistoryEntry {
                    operations,
                    selection_before,
                    selection_after,
                });
                tracing::debug!(entries = self.undo.len(), "pushed history entry");
            } else if items == self.undo.len() {
                if let Some(top) = self.undo.last_mut() {
                    top.operations.extend(operations);
                    top.selection_after = selection_after;
                    tracing::trace!(entries = self.undo.len(), "updated history entry");
                }
            }
        }
        self.sync_lengths();
    }

    /// Undo the top item. `on_pop` sees the popped entry once, before the
    /// manager's transaction runs. Returns the entry when something was
    /// undone.
    pub fn undo(&mut self, on_pop: impl FnOnce(&HistoryEntry)) -> Option<HistoryEntry> {
        self.sync_lengths();
        let entry = self.undo.last()?.clone();
        on_pop(&entry);
        if !self.manager.undo_blocking() {
            return None;
        }
        self.undo.pop();
        self.redo.push(entry.clone());
        self.sync_lengths();
        tracing::debug!(undo = self.undo.len(), redo = self.redo.len(), "popped undo entry");
        Some(entry)
    }

    /// Redo the top item of the redo stack, mirroring [`HistoryController::undo`].
    pub fn redo(&mut self, on_pop: impl FnOnce(&HistoryEntry)) -> Option<HistoryEntry> {
        self.sync_lengths();
        let entry = self.redo.last()?.clone();
        on_pop(&entry);
        if !self.manager.redo_blocking() {
            return None;
        }
        self.redo.pop();
        self.undo.push(entry.clone());
        self.sync_lengths();
        tracing::debug!(undo = self.undo.len(), redo = self.redo.len(), "popped redo entry");
        Some(entry)
    }

    /// Close the current stack item so the next change starts a new one.
    pub fn stop_capturing(&mut self) {
        self.manager.reset();
    }

    pub fn clear(&mut self) {
        self.manager.clear();
        self.undo.clear();
        self.redo.clear();
    }

    fn pad_undo(&mut self, len: usize) {
        while self.undo.len() < len {
            self.undo.insert(0, HistoryEntry::default());
        }
    }

    /// Entries without a stack item are dropped from the top; items the
    /// mirror does not know get empty entries at the bottom.
    fn sync_lengths(&mut self) {
        let undo = self.manager.undo_stack().len();
        let redo = self.manager.redo_stack().len();

        self.undo.truncate(undo);
        self.pad_undo(undo);

        self.redo.truncate(redo);
        while self.redo.len() < redo {
            self.redo.insert(0, HistoryEntry::default());
        }
    }
}
