//! # Document Host
//!
//! A [`Document`] owns the editable tree and everything that must stay in
//! step with it while operations are applied:
//!
//! - the selection
//! - path/point/range references (transformed on every apply unless
//!   suppressed)
//! - the local undo stack
//! - normalization
//!
//! ## Lifecycle
//!
//! ```text
//! Operation → apply_operation → refs / history → normalize
//!                 ↓
//!           children, selection
//! ```

use crate::errors::{EditorError, Result};
use crate::node::{self, Node};
use crate::normalize::{NormalizerEngine, ITERATIONS_PER_NODE};
use crate::operations::Operation;
use crate::path::{Affinity, Path};
use crate::point::{Point, Range, RangeAffinity};
use crate::refs::{PathRef, PointRef, RangeRef, RefRegistry};
use crate::undo_stack::UndoStack;

/// Editable document
#[derive(Debug)]
pub struct Document {
    /// Top-level nodes
    children: Vec<Node>,

    selection: Option<Range>,

    /// Current version number (increments on each operation)
    pub version: u64,

    refs: RefRegistry,
    ref_transforms_suppressed: usize,

    normalizer: NormalizerEngine,
    auto_normalize: bool,
    normalizing_suspended: usize,

    composing: bool,

    history: UndoStack,
    recording: bool,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self {
            children,
            selection: None,
            version: 0,
            refs: RefRegistry::new(),
            ref_transforms_suppressed: 0,
            normalizer: NormalizerEngine::new(),
            auto_normalize: false,
            normalizing_suspended: 0,
            composing: false,
            history: UndoStack::new(),
            recording: true,
        }
    }

    /// Enable or disable normalization after every [`Document::apply`].
    pub fn with_normalization(mut self, enabled: bool) -> Self {
        self.auto_normalize = enabled;
        self
    }

    pub fn with_normalizer(mut self, engine: NormalizerEngine) -> Self {
        self.normalizer = engine;
        self
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn selection(&self) -> Option<&Range> {
        self.selection.as_ref()
    }

    pub fn get(&self, path: &Path) -> Result<&Node> {
        node::get(&self.children, path)
    }

    /// Apply an operation, then normalize if enabled and not suspended.
    pub fn apply(&mut self, op: Operation) -> Result<()> {
        self.apply_operation(op)?;
        if self.is_normalizing() {
            self.normalize()?;
        }
        Ok(())
    }

    /// Apply an operation without normalizing.
    pub fn apply_operation(&mut self, op: Operation) -> Result<()> {
        let selection_before = self.selection.clone();
        op.apply_to(&mut self.children, &mut self.selection)?;

        if self.ref_transforms_suppressed == 0 {
            self.refs.transform(&op);
        }
        if self.recording {
            self.history.record(&op, &selection_before);
        }
        self.version += 1;
        tracing::trace!(kind = %op.kind(), version = self.version, "applied operation");
        Ok(())
    }

    /// Replace the whole content. Selection is cleared, references become
    /// unresolvable and local history is dropped.
    pub fn replace_content(&mut self, children: Vec<Node>) {
        self.children = children;
        self.selection = None;
        self.refs.invalidate();
        self.history.clear();
        self.version += 1;
    }

    // Selection

    pub fn select(&mut self, range: Range) -> Result<()> {
        self.apply_operation(Operation::SetSelection {
            properties: self.selection.clone(),
            new_properties: Some(range),
        })
    }

    pub fn deselect(&mut self) -> Result<()> {
        if self.selection.is_none() {
            return Ok(());
        }
        self.apply_operation(Operation::SetSelection {
            properties: self.selection.clone(),
            new_properties: None,
        })
    }

    // Composition

    pub fn set_composing(&mut self, composing: bool) {
        self.composing = composing;
    }

    pub fn is_composing(&self) -> bool {
        self.composing
    }

    // Normalization

    /// Whether applying an operation currently triggers normalization.
    pub fn is_normalizing(&self) -> bool {
        self.auto_normalize && self.normalizing_suspended == 0
    }

    pub fn set_auto_normalize(&mut self, enabled: bool) {
        self.auto_normalize = enabled;
    }

    /// Run `f` with normalization suspended, normalizing once afterwards.
    pub fn without_normalizing<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        self.suspend_normalizing();
        let result = f(self);
        let resumed = self.resume_normalizing();
        let value = result?;
        if resumed && self.is_normalizing() {
            self.normalize()?;
        }
        Ok(value)
    }

    pub fn suspend_normalizing(&mut self) {
        self.normalizing_suspended += 1;
    }

    /// Returns true once the outermost suspension has ended.
    pub fn resume_normalizing(&mut self) -> bool {
        self.normalizing_suspended = self.normalizing_suspended.saturating_sub(1);
        self.normalizing_suspended == 0
    }

    /// Next fixing operation proposed by the normalizers.
    pub fn next_normalization(&self) -> Option<Operation> {
        self.normalizer.next_operation(&self.children)
    }

    /// Maximum fixing operations one normalization pass may apply.
    pub fn normalization_budget(&self) -> usize {
        node::count(&self.children).max(1) * ITERATIONS_PER_NODE
    }

    /// Apply fixing operations until the tree is canonical.
    pub fn normalize(&mut self) -> Result<()> {
        let budget = self.normalization_budget();
        let mut applied = 0;
        while let Some(op) = self.next_normalization() {
            if applied >= budget {
                return Err(EditorError::Normalization(format!(
                    "could not completely normalize after {applied} operations"
                )));
            }
            self.apply_operation(op)?;
            applied += 1;
        }
        Ok(())
    }

    // References

    pub fn path_ref(&mut self, path: Path, affinity: Option<Affinity>) -> PathRef {
        self.refs.path_ref(path, affinity)
    }

    pub fn point_ref(&mut self, point: Point, affinity: Option<Affinity>) -> PointRef {
        self.refs.point_ref(point, affinity)
    }

    pub fn range_ref(&mut self, range: Range, affinity: RangeAffinity) -> RangeRef {
        self.refs.range_ref(range, affinity)
    }

    pub fn refs(&self) -> &RefRegistry {
        &self.refs
    }

    pub fn refs_mut(&mut self) -> &mut RefRegistry {
        &mut self.refs
    }

    /// Transform all references explicitly, e.g. while implicit transforms
    /// are suppressed.
    pub fn transform_refs(&mut self, op: &Operation) {
        self.refs.transform(op);
    }

    /// Run `f` with the transform-on-apply of references switched off.
    pub fn without_ref_transforms<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.ref_transforms_suppressed += 1;
        let result = f(self);
        self.ref_transforms_suppressed -= 1;
        result
    }

    // Local history

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut UndoStack {
        &mut self.history
    }

    /// Turn recording of applied operations into the local undo stack on or
    /// off.
    pub fn set_history_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Undo the most recent batch. Returns false when there is nothing to
    /// undo.
    pub fn undo(&mut self) -> Result<bool> {
        let Some(batch) = self.history.pop_undo() else {
            return Ok(false);
        };

        let recording = std::mem::replace(&mut self.recording, false);
        let result = self.without_normalizing(|doc| {
            for op in batch.inverses() {
                doc.apply_operation(op)?;
            }
            match &batch.selection_before {
                Some(range) => doc.select(range.clone()),
                None => doc.deselect(),
            }
        });
        self.recording = recording;
        result?;

        self.history.push_redo(batch);
        Ok(true)
    }

    /// Redo the most recently undone batch.
    pub fn redo(&mut self) -> Result<bool> {
        let Some(batch) = self.history.pop_redo() else {
            return Ok(false);
        };

        let recording = std::mem::replace(&mut self.recording, false);
        let result = self.without_normalizing(|doc| {
            if let Some(range) = &batch.selection_before {
                doc.select(range.clone())?;
            }
            for op in &batch.operations {
                doc.apply_operation(op.clone())?;
            }
            Ok(())
        });
        self.recording = recording;
        result?;

        self.history.push_undo(batch);
        Ok(true)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
