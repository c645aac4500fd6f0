//! # Duet Sync
//!
//! Keeps a [`duet_editor::Document`] tree and a shared CRDT sequence in
//! correspondence, in both directions.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐          ┌──────────────────────────┐
//! │ Document (tree)          │          │ SharedRoot (yrs XmlText) │
//! └──────────────────────────┘          └──────────────────────────┘
//!        │ local operations                    │ observed events
//!        ↓                                     ↓
//! ┌──────────────────────────┐          ┌──────────────────────────┐
//! │ SyncEditor queue         │          │ apply_to_editor          │
//! │  - grouped by origin     │          │  - capture in observer   │
//! │  - flushed per group     │          │  - reverse delta walk    │
//! └──────────────────────────┘          └──────────────────────────┘
//!        ↓                                     ↓
//! ┌──────────────────────────┐          ┌──────────────────────────┐
//! │ apply_to_crdt            │ ───────→ │ Document operations      │
//! └──────────────────────────┘  remote  └──────────────────────────┘
//! ```
//!
//! ## Shared Representation
//!
//! An element is a rich text sequence. Its text children are runs of
//! characters formatted with their properties; its element children are
//! embedded sequences whose XML attributes are the element properties. The
//! document root itself is the first child of a named XML fragment.
//!
//! Offsets are UTF-8 bytes on both sides.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use duet_sync::{new_doc, SharedRoot, SyncConfig, SyncEditor};
//!
//! let shared = SharedRoot::bootstrap(new_doc(), "content")?;
//! let mut editor = SyncEditor::new(Document::default(), shared, SyncConfig::default());
//! editor.connect()?;
//!
//! editor.change(|e| e.apply(op))?;
//! transport.send(editor.encode_state_as_update(&remote_state_vector)?);
//!
//! editor.receive_update(&incoming)?;
//! ```

pub mod apply_to_crdt;
pub mod apply_to_editor;
mod config;
mod controller;
pub mod convert;
pub mod delta;
mod error;
mod history;
pub mod location;
pub mod positions;
mod shared;

pub use config::{HistoryConfig, SyncConfig, DEFAULT_CONFIG_NAME};
pub use controller::{group_local_changes, LocalChange, SyncEditor};
pub use error::{Result, SyncError};
pub use history::{HistoryController, HistoryEntry};
pub use positions::RelativeRange;
pub use shared::{new_doc, SharedRoot};
