//! Error types for the sync layer

use duet_editor::EditorError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The tree and the shared sequence disagree about the document shape.
    #[error("Structural desync: {0}")]
    Desync(String),

    #[error("Offset {offset} is out of bounds (length {length})")]
    OutOfBounds { offset: u32, length: u32 },

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Unexpected target: {0}")]
    UnexpectedTarget(String),

    #[error("Editor is already connected")]
    AlreadyConnected,

    #[error("Shared root not found: {0}")]
    MissingRoot(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Failed to apply update: {0}")]
    Apply(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Editor error: {0}")]
    Editor(EditorError),
}

impl From<EditorError> for SyncError {
    fn from(e: EditorError) -> Self {
        match e {
            EditorError::UnknownOperation(kind) => SyncError::UnknownOperation(kind),
            other => SyncError::Editor(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
