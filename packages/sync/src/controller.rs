//! # Sync Controller
//!
//! [`SyncEditor`] keeps a [`Document`] and a [`SharedRoot`] in step.
//!
//! ## Local edits
//!
//! While connected, every structural operation applied under a local origin
//! is queued. [`SyncEditor::flush_local_changes`] replays the queue into the
//! shared root, one CRDT transaction per group of consecutive changes with the
//! same origin. Operations listed in `unique_operations` always get a group of
//! their own.
//!
//! The queue is replayed against a copy of the tree taken before its first
//! operation, so every operation resolves against the tree it was applied to.
//!
//! ## Remote changes
//!
//! A deep observer copies every committed transaction into an inbox.
//! Transactions with a local origin are this replica's own echo and are
//! dropped. Everything else is translated into editor operations and applied
//! with normalization suspended, after pending local changes are flushed.

use duet_editor::{
    Affinity, Document, EditorError, Node, Operation, OperationKind, Path, PathRef, Point, PointRef,
    Range, RangeAffinity, RangeRef, RefRegistry,
};
use std::collections::{HashMap, HashSet};
use yrs::{Origin, Subscription, Transact, TransactionMut, XmlTextRef};

use crate::apply_to_crdt::{apply_operation, ApplyContext};
use crate::apply_to_editor::{apply_events, drain, observe, Inbox, SequenceEvent};
use crate::config::SyncConfig;
use crate::delta::shared_shape;
use crate::error::{Result, SyncError};
use crate::history::HistoryController;
use crate::positions::{self, range_to_relative_range, relative_range_to_range, RelativeRange};
use crate::shared::SharedRoot;

/// A queued local operation
#[derive(Debug, Clone, PartialEq)]
pub struct LocalChange {
    pub operation: Operation,
    pub origin: Origin,
    /// Editor selection right before the operation
    pub selection_before: Option<Range>,
}

/// Split `changes` into transaction groups: runs of consecutive changes with
/// the same origin, with every unique operation alone in its group.
pub fn group_local_changes<'a>(
    changes: &'a [LocalChange],
    unique: &[OperationKind],
) -> Vec<&'a [LocalChange]> {
    let is_unique = |change: &LocalChange| unique.contains(&change.operation.kind());
    let mut groups = Vec::new();
    let mut start = 0;

    for end in 1..=changes.len() {
        let boundary = end == changes.len()
            || changes[end].origin != changes[end - 1].origin
            || is_unique(&changes[end])
            || is_unique(&changes[end - 1]);
        if boundary {
            groups.push(&changes[start..end]);
            start = end;
        }
    }

    groups
}

type CapturePredicate = Box<dyn Fn(&Operation) -> bool>;

/// Editor connected to a shared CRDT root
pub struct SyncEditor {
    document: Document,
    shared: SharedRoot,
    config: SyncConfig,

    subscription: Option<Subscription>,
    inbox: Inbox,

    /// Queued local changes, oldest first
    local_changes: Vec<LocalChange>,
    /// Tree before the first queued change
    pending_base: Option<Vec<Node>>,

    /// Active origin is the top; the local origin when empty
    origins: Vec<Origin>,
    local_origins: HashSet<Origin>,

    /// Editor operations behind a CRDT transaction, keyed by its origin
    meta: HashMap<Origin, Vec<Operation>>,

    history: HistoryController,
    should_capture: CapturePredicate,
}

impl std::fmt::Debug for SyncEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEditor")
            .field("shared", &self.shared)
            .field("connected", &self.is_connected())
            .field("local_changes", &self.local_changes.len())
            .field("history", &self.history)
            .finish()
    }
}

impl SyncEditor {
    pub fn new(mut document: Document, shared: SharedRoot, config: SyncConfig) -> Self {
        document.set_auto_normalize(config.normalize);
        let history = HistoryController::new(shared.doc(), shared.root(), &config);
        let local_origins = [
            &config.local_origin,
            &config.untracked_origin,
            &config.position_origin,
        ]
        .into_iter()
        .map(|origin| Origin::from(origin.as_str()))
        .collect();

        Self {
            document,
            shared,
            config,
            subscription: None,
            inbox: Inbox::default(),
            local_changes: Vec::new(),
            pending_base: None,
            origins: Vec::new(),
            local_origins,
            meta: HashMap::new(),
            history,
            should_capture: Box::new(|_| true),
        }
    }

    /// Decide per operation whether local transactions containing it may be
    /// undone. Groups with an operation failing the predicate are committed
    /// under the untracked origin.
    pub fn with_capture_predicate(mut self, predicate: impl Fn(&Operation) -> bool + 'static) -> Self {
        self.should_capture = Box::new(predicate);
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Direct access to the document. Operations applied through it bypass
    /// the queue; pass them to [`SyncEditor::store_local_change`] to share
    /// them.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn path_ref(&mut self, path: Path, affinity: Option<Affinity>) -> PathRef {
        self.document.path_ref(path, affinity)
    }

    pub fn point_ref(&mut self, point: Point, affinity: Option<Affinity>) -> PointRef {
        self.document.point_ref(point, affinity)
    }

    pub fn range_ref(&mut self, range: Range, affinity: RangeAffinity) -> RangeRef {
        self.document.range_ref(range, affinity)
    }

    pub fn refs(&self) -> &RefRegistry {
        self.document.refs()
    }

    pub fn refs_mut(&mut self) -> &mut RefRegistry {
        self.document.refs_mut()
    }

    pub fn shared(&self) -> &SharedRoot {
        &self.shared
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn pending_changes(&self) -> &[LocalChange] {
        &self.local_changes
    }

    pub fn history(&self) -> &HistoryController {
        &self.history
    }

    // Lifecycle

    /// Start observing the shared root and replace the editor content with
    /// the shared content. Selection and local history are cleared.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(SyncError::AlreadyConnected);
        }

        let (subscription, inbox) = observe(self.shared.root());
        self.subscription = Some(subscription);
        self.inbox = inbox;
        self.local_changes.clear();
        self.pending_base = None;
        self.meta.clear();
        self.history.clear();

        self.document.replace_content(self.shared.to_nodes());
        self.document.set_history_recording(false);
        tracing::debug!(root = self.shared.name(), "connected");
        Ok(())
    }

    /// Flush pending local changes, then stop observing. Does nothing when
    /// already disconnected.
    pub fn disconnect(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        self.settle()?;
        self.apply_pending_events()?;

        self.subscription = None;
        self.document.set_history_recording(true);
        tracing::debug!(root = self.shared.name(), "disconnected");
        Ok(())
    }

    // Origins

    /// Origin tagging operations applied right now.
    pub fn active_origin(&self) -> Origin {
        self.origins
            .last()
            .cloned()
            .unwrap_or_else(|| Origin::from(self.config.local_origin.as_str()))
    }

    /// Run `f` with `origin` as the active origin.
    pub fn with_origin<R>(&mut self, origin: impl Into<Origin>, f: impl FnOnce(&mut Self) -> R) -> R {
        self.origins.push(origin.into());
        let result = f(self);
        self.origins.pop();
        result
    }

    pub fn is_local_origin(&self, origin: &Origin) -> bool {
        self.local_origins.contains(origin)
    }

    /// Treat `origin` as local: its operations are queued and its
    /// transactions are not translated back.
    pub fn register_local_origin(&mut self, origin: impl Into<Origin>) {
        self.local_origins.insert(origin.into());
    }

    // Local edits

    /// Apply an operation, normalizing afterwards when enabled.
    pub fn apply(&mut self, op: Operation) -> Result<()> {
        self.apply_one(op)?;
        if self.document.is_normalizing() {
            self.normalize()?;
        }
        Ok(())
    }

    pub fn select(&mut self, range: Range) -> Result<()> {
        self.apply(Operation::SetSelection {
            properties: self.document.selection().cloned(),
            new_properties: Some(range),
        })
    }

    /// Apply a burst of operations, then flush them.
    pub fn change<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let value = f(self)?;
        self.flush_local_changes()?;
        Ok(value)
    }

    /// Queue an operation for the shared root without applying it to the
    /// editor. Use when the operation was already applied to the tree
    /// through other means.
    pub fn store_local_change(&mut self, op: Operation) -> Result<()> {
        if self.pending_base.is_none() {
            // the tree already contains `op`
            let mut base = self.document.children().to_vec();
            op.inverse().apply_to(&mut base, &mut None)?;
            self.pending_base = Some(base);
        }
        self.local_changes.push(LocalChange {
            operation: op,
            origin: self.active_origin(),
            selection_before: self.document.selection().cloned(),
        });
        Ok(())
    }

    fn apply_one(&mut self, op: Operation) -> Result<()> {
        let origin = self.active_origin();
        let shared = self.is_connected() && !op.is_selection();

        if shared && self.is_local_origin(&origin) {
            if self.pending_base.is_none() {
                self.pending_base = Some(self.document.children().to_vec());
            }
            self.local_changes.push(LocalChange {
                operation: op.clone(),
                origin,
                selection_before: self.document.selection().cloned(),
            });
        } else if shared {
            self.settle()?;
        }

        self.document.apply_operation(op)?;
        Ok(())
    }

    fn normalize(&mut self) -> Result<()> {
        let budget = self.document.normalization_budget();
        let mut applied = 0;
        while let Some(op) = self.document.next_normalization() {
            if applied >= budget {
                return Err(EditorError::Normalization(format!(
                    "could not completely normalize after {applied} operations"
                ))
                .into());
            }
            self.apply_one(op)?;
            applied += 1;
        }
        Ok(())
    }

    /// Write queued changes to the shared root. Deferred while composing.
    pub fn flush_local_changes(&mut self) -> Result<()> {
        if self.document.is_composing() {
            tracing::trace!(pending = self.local_changes.len(), "composing, flush deferred");
            return Ok(());
        }
        self.settle()
    }

    /// Composition (IME) state. Ending a composition flushes what it queued.
    pub fn set_composing(&mut self, composing: bool) -> Result<()> {
        if composing {
            self.settle()?;
            self.document.set_composing(true);
            Ok(())
        } else {
            self.document.set_composing(false);
            self.settle()
        }
    }

    /// Flush unconditionally.
    fn settle(&mut self) -> Result<()> {
        if self.local_changes.is_empty() {
            self.pending_base = None;
            return Ok(());
        }

        let changes = std::mem::take(&mut self.local_changes);
        let mut scratch = self
            .pending_base
            .take()
            .ok_or_else(|| SyncError::Desync("queued changes without a base tree".into()))?;
        let groups = group_local_changes(&changes, &self.config.unique_operations);
        let final_selection = self.document.selection().cloned();
        let local_origin = Origin::from(self.config.local_origin.as_str());

        tracing::debug!(changes = changes.len(), groups = groups.len(), "flushing local changes");

        for (index, group) in groups.iter().enumerate() {
            let operations: Vec<Operation> = group.iter().map(|c| c.operation.clone()).collect();
            let mut origin = group[0].origin.clone();
            if origin == local_origin && !operations.iter().all(|op| (self.should_capture)(op)) {
                origin = Origin::from(self.config.untracked_origin.as_str());
            }
            let before = group[0].selection_before.as_ref();
            let after = match groups.get(index + 1) {
                Some(next) => next[0].selection_before.as_ref(),
                None => final_selection.as_ref(),
            };

            let (selection_before, selection_after) = {
                let mut txn = self.shared.doc().transact_mut_with(origin.clone());
                let root = self.shared.root();
                let prefix = self.config.position_prefix.as_str();

                let selection_before = relative_selection(&mut txn, root, &scratch, before);
                for op in &operations {
                    let cx = ApplyContext {
                        root,
                        tree: &scratch,
                        position_prefix: prefix,
                    };
                    apply_operation(&mut txn, cx, op)?;
                    op.apply_to(&mut scratch, &mut None)?;
                }
                let selection_after = relative_selection(&mut txn, root, &scratch, after);
                (selection_before, selection_after)
            };

            tracing::trace!(origin = ?origin, operations = operations.len(), "committed group");
            self.history
                .record(&origin, operations, selection_before, selection_after);
        }

        self.discard_local_echoes();
        Ok(())
    }

    fn discard_local_echoes(&mut self) {
        let captured = drain(&self.inbox);
        let remaining: Vec<_> = captured
            .into_iter()
            .filter(|txn| !txn.origin.as_ref().is_some_and(|o| self.is_local_origin(o)))
            .collect();
        if let Ok(mut inbox) = self.inbox.lock() {
            let newer = std::mem::replace(&mut *inbox, remaining);
            inbox.extend(newer);
        }
    }

    // Remote changes

    /// Apply an encoded update from another replica and translate its
    /// changes into the editor.
    pub fn receive_update(&mut self, update: &[u8]) -> Result<()> {
        self.settle()?;
        self.shared.apply_update(update, &self.config.remote_origin)?;
        self.apply_pending_events()
    }

    /// Translate every transaction observed since the last call, skipping
    /// this replica's own.
    pub fn apply_pending_events(&mut self) -> Result<()> {
        for captured in drain(&self.inbox) {
            if captured.origin.as_ref().is_some_and(|o| self.is_local_origin(o)) {
                tracing::trace!(origin = ?captured.origin, "ignoring local echo");
                continue;
            }
            let events = captured.events?;
            self.apply_remote_events(&events, captured.origin)?;
        }
        Ok(())
    }

    /// Apply the events of one remote transaction to the editor.
    ///
    /// When the transaction is known to come from a unique operation, the
    /// recorded operations are applied in place of the translated ones as
    /// long as they lead to the same shared content, so references follow the
    /// edit that was made rather than its CRDT rendition.
    pub fn apply_remote_events(
        &mut self,
        events: &[SequenceEvent],
        origin: Option<Origin>,
    ) -> Result<()> {
        self.settle()?;

        let recorded = origin
            .as_ref()
            .and_then(|o| self.meta.remove(o))
            .unwrap_or_default();
        let explicit = recorded
            .first()
            .is_some_and(|op| self.config.unique_operations.contains(&op.kind()));
        let active = origin
            .clone()
            .unwrap_or_else(|| Origin::from(self.config.remote_origin.as_str()));

        self.document.suspend_normalizing();
        let result = self.with_origin(active, |this| {
            if explicit {
                this.apply_recorded(events, &recorded)
            } else {
                apply_events(&mut this.document, events)
            }
        });
        let resumed = self.document.resume_normalizing();
        let applied = result?;

        tracing::debug!(
            origin = ?origin,
            events = events.len(),
            operations = applied.len(),
            "applied remote events"
        );

        if resumed && self.document.is_normalizing() {
            self.normalize()?;
            self.settle()?;
        }
        Ok(())
    }

    /// Replay `recorded` when it reproduces the shared content, otherwise
    /// fall back to translating `events`. References are transformed once,
    /// by whichever list is applied.
    fn apply_recorded(
        &mut self,
        events: &[SequenceEvent],
        recorded: &[Operation],
    ) -> Result<Vec<Operation>> {
        let mut replayed = self.document.children().to_vec();
        let replays = recorded
            .iter()
            .try_for_each(|op| op.apply_to(&mut replayed, &mut None))
            .is_ok();

        if replays && shared_shape(&replayed) == self.shared.to_nodes() {
            self.document.without_ref_transforms(|document| {
                recorded
                    .iter()
                    .try_for_each(|op| document.apply_operation(op.clone()))
            })?;
            for op in recorded {
                self.document.transform_refs(op);
            }
            return Ok(recorded.to_vec());
        }

        tracing::debug!(
            operations = recorded.len(),
            "recorded operations do not reproduce the shared content, translating events"
        );
        apply_events(&mut self.document, events)
    }

    // Stored positions

    pub fn store_position(&mut self, key: &str, point: &Point) -> Result<()> {
        self.settle()?;
        {
            let mut txn = self
                .shared
                .doc()
                .transact_mut_with(self.config.position_origin.as_str());
            positions::store_position(
                &mut txn,
                self.shared.root(),
                self.document.children(),
                &self.config.position_prefix,
                key,
                point,
            )?;
        }
        self.discard_local_echoes();
        Ok(())
    }

    /// The point stored under `key`: `None` when nothing is stored,
    /// `Some(None)` when the stored position no longer resolves.
    pub fn position(&mut self, key: &str) -> Result<Option<Option<Point>>> {
        self.settle()?;
        let txn = self.shared.doc().transact();
        positions::position(
            &txn,
            self.shared.root(),
            self.document.children(),
            &self.config.position_prefix,
            key,
        )
    }

    pub fn remove_stored_position(&mut self, key: &str) -> Result<()> {
        self.settle()?;
        {
            let mut txn = self
                .shared
                .doc()
                .transact_mut_with(self.config.position_origin.as_str());
            positions::remove_stored_position(
                &mut txn,
                self.shared.root(),
                &self.config.position_prefix,
                key,
            );
        }
        self.discard_local_echoes();
        Ok(())
    }

    pub fn stored_positions(&mut self) -> Result<Vec<(String, Option<Point>)>> {
        self.settle()?;
        let txn = self.shared.doc().transact();
        positions::stored_positions(
            &txn,
            self.shared.root(),
            self.document.children(),
            &self.config.position_prefix,
        )
    }

    // History

    pub fn undo(&mut self) -> Result<bool> {
        if !self.is_connected() {
            return Ok(self.document.undo()?);
        }
        self.settle()?;

        let origin = self.history.origin();
        let meta = &mut self.meta;
        let Some(entry) = self.history.undo(|entry| {
            meta.insert(origin.clone(), entry.inverse_operations());
        }) else {
            self.meta.remove(&origin);
            return Ok(false);
        };

        self.apply_pending_events()?;
        self.restore_selection(entry.selection_before.as_ref())?;
        Ok(true)
    }

    pub fn redo(&mut self) -> Result<bool> {
        if !self.is_connected() {
            return Ok(self.document.redo()?);
        }
        self.settle()?;

        let origin = self.history.origin();
        let meta = &mut self.meta;
        let Some(entry) = self.history.redo(|entry| {
            meta.insert(origin.clone(), entry.operations.clone());
        }) else {
            self.meta.remove(&origin);
            return Ok(false);
        };

        self.apply_pending_events()?;
        self.restore_selection(entry.selection_after.as_ref())?;
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        if self.is_connected() {
            self.history.can_undo()
        } else {
            self.document.can_undo()
        }
    }

    pub fn can_redo(&self) -> bool {
        if self.is_connected() {
            self.history.can_redo()
        } else {
            self.document.can_redo()
        }
    }

    /// Start a new undo step with the next change.
    pub fn stop_capturing(&mut self) -> Result<()> {
        self.settle()?;
        self.history.stop_capturing();
        Ok(())
    }

    /// Select `range` if it still resolves, otherwise keep the selection.
    fn restore_selection(&mut self, range: Option<&RelativeRange>) -> Result<()> {
        let Some(range) = range else {
            return Ok(());
        };
        let resolved = {
            let txn = self.shared.doc().transact();
            relative_range_to_range(&txn, self.shared.root(), self.document.children(), range)?
        };
        match resolved {
            Some(range) => self.select(range),
            None => {
                tracing::debug!("saved selection no longer resolves");
                Ok(())
            }
        }
    }

    // Transport

    pub fn state_vector(&self) -> Vec<u8> {
        self.shared.state_vector()
    }

    pub fn encode_state_as_update(&self, state_vector: &[u8]) -> Result<Vec<u8>> {
        self.shared.encode_state_as_update(state_vector)
    }
}

fn relative_selection(
    txn: &mut TransactionMut,
    root: &XmlTextRef,
    tree: &[Node],
    range: Option<&Range>,
) -> Option<RelativeRange> {
    let range = range?;
    match range_to_relative_range(txn, root, tree, range) {
        Ok(relative) => Some(relative),
        Err(e) => {
            tracing::warn!(error = %e, "selection has no relative position");
            None
        }
    }
}
