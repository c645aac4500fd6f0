//! # Duet Editor
//!
//! Tree model and editing host for Duet documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ node / path / point: tree + coordinates     │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ operations: invertible positional edits     │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ document: apply + selection + refs          │
//! │  - Path/point/range references              │
//! │  - Normalization (optional)                 │
//! │  - Local undo/redo                          │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Operations are the only way to change a document**: everything that
//!    tracks positions (selection, refs, history, sync) observes them
//! 2. **Paths are positional**: transformed through operations, never cached
//! 3. **Every operation is invertible**
//!
//! ## Usage
//!
//! ```rust,ignore
//! use duet_editor::{Document, Node, Operation, Path};
//!
//! let mut doc = Document::new(vec![Node::element(vec![Node::text("Hello")])]);
//!
//! doc.apply(Operation::InsertText {
//!     path: Path::from([0, 0]),
//!     offset: 5,
//!     text: " world".into(),
//! })?;
//!
//! doc.undo()?;
//! ```

mod document;
mod errors;
pub mod node;
mod normalize;
mod operations;
mod path;
mod point;
mod refs;
mod undo_stack;

pub use document::Document;
pub use errors::{EditorError, Result};
pub use node::{Element, Node, Properties, Text};
pub use normalize::{EnsureChildren, MergeAdjacentTexts, Normalizer, NormalizerEngine};
pub use operations::{Operation, OperationKind};
pub use path::{Affinity, Path};
pub use point::{Point, Range, RangeAffinity};
pub use refs::{PathRef, PointRef, RangeRef, RefRegistry};
pub use undo_stack::{OperationBatch, UndoStack};
