//! Error types for editing-model operations.

use thiserror::Error;

use crate::path::Path;

/// Errors that can occur when applying an operation to a document.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EditorError {
    /// The path does not address a node of the expected kind.
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: Path, reason: &'static str },

    /// A text offset lies past the end of the leaf.
    #[error("offset {offset} out of range for text of length {len} at {path}")]
    OffsetOutOfRange {
        path: Path,
        offset: usize,
        len: usize,
    },

    /// A property key collides with a structural key.
    #[error("property key {0:?} is reserved")]
    ReservedProperty(String),

    /// Merge of a text leaf with an element or vice versa.
    #[error("cannot merge nodes of different kinds at {0}")]
    MismatchedNodes(Path),

    /// A node cannot be moved inside its own subtree.
    #[error("cannot move {from} into its own descendant {to}")]
    MoveIntoSelf { from: Path, to: Path },
}

impl EditorError {
    pub(crate) fn invalid(path: &Path, reason: &'static str) -> Self {
        EditorError::InvalidPath {
            path: path.clone(),
            reason,
        }
    }
}
