//! Error types for the sync bridge.

use tandem_editor_core::{EditorError, Path};
use thiserror::Error;

use crate::guard::Direction;

/// Errors surfaced by the sync bridge.
///
/// All of these propagate to the caller of the entry point that triggered
/// them. Nothing is retried.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SyncError {
    /// An operation addresses a position that does not exist in the CRDT.
    ///
    /// The remaining operations of the batch were not applied; the ones
    /// before `index` were committed.
    #[error("invalid path {path} in operation {index}: {reason}")]
    InvalidPath {
        path: Path,
        index: usize,
        reason: &'static str,
    },

    /// A cycle was started while another one was in flight.
    #[error("cannot start a {requested} cycle while a {active} cycle is in flight")]
    Reentrancy {
        active: Direction,
        requested: Direction,
    },

    /// Observed CRDT changes do not fit the editing model's structure.
    #[error("translation mismatch: {0}")]
    TranslationMismatch(String),

    /// Failed to import update bytes.
    #[error("failed to import update: {0}")]
    Import(String),

    /// Failed to export CRDT data.
    #[error("failed to export CRDT data: {0}")]
    Export(String),

    /// Translated operations were rejected by the editing model.
    #[error(transparent)]
    Editor(#[from] EditorError),

    /// Loro CRDT error.
    #[error("loro error: {0}")]
    Loro(String),
}

impl SyncError {
    pub(crate) fn invalid_path(path: &Path, reason: &'static str) -> Self {
        SyncError::InvalidPath {
            path: path.clone(),
            index: 0,
            reason,
        }
    }

    pub(crate) fn mismatch(msg: impl Into<String>) -> Self {
        SyncError::TranslationMismatch(msg.into())
    }

    /// Attach the batch position to an `InvalidPath` error.
    pub(crate) fn at_operation(self, at: usize) -> Self {
        match self {
            SyncError::InvalidPath { path, reason, .. } => SyncError::InvalidPath {
                path,
                index: at,
                reason,
            },
            other => other,
        }
    }
}

impl From<loro::LoroError> for SyncError {
    fn from(e: loro::LoroError) -> Self {
        SyncError::Loro(e.to_string())
    }
}
