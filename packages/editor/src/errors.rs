//! Error types for the editor

use crate::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("Node not found: {0}")]
    NodeNotFound(Path),

    #[error("Node is not text: {0}")]
    NotText(Path),

    #[error("Node is not an element: {0}")]
    NotElement(Path),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Offset {offset} is out of range for {path}")]
    InvalidOffset { path: Path, offset: usize },

    #[error("Cannot move a node into itself")]
    CannotMoveIntoItself,

    #[error("Cannot merge nodes of different kinds at {0}")]
    MergeMismatch(Path),

    #[error("Invalid property: {0}")]
    InvalidProperty(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Normalization error: {0}")]
    Normalization(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EditorError {
    fn from(e: serde_json::Error) -> Self {
        EditorError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EditorError>;
