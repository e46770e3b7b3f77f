//! The editor: a document plus the ordered log of operations applied to it.
//!
//! Every operation goes through [`Editor::apply`], which records it. The
//! recorded operations are handed out as one [`ChangeBatch`] by
//! [`Editor::flush`]; that is the point where a synchronization layer picks
//! them up.

use crate::document::Document;
use crate::error::EditorError;
use crate::operation::Operation;

/// Where the operations of a batch came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Produced by this editor's user.
    Local,
    /// Replayed from a remote change. Must not be fed back to the source.
    Remote,
}

/// Operations applied since the previous flush, in application order.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeBatch {
    pub operations: Vec<Operation>,
    pub origin: ChangeOrigin,
}

impl ChangeBatch {
    pub fn is_local(&self) -> bool {
        self.origin == ChangeOrigin::Local
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Editor {
    document: Document,
    operations: Vec<Operation>,
    is_remote: bool,
}

impl Editor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: Document) -> Self {
        Self {
            document,
            ..Self::default()
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Apply an operation and record it for the next batch.
    ///
    /// Failed operations are not recorded.
    pub fn apply(&mut self, op: Operation) -> Result<(), EditorError> {
        self.document.apply(&op)?;
        tracing::trace!(kind = op.kind(), remote = self.is_remote, "editor applied operation");
        self.operations.push(op);
        Ok(())
    }

    /// Apply operations in order, stopping at the first failure.
    pub fn apply_all(
        &mut self,
        ops: impl IntoIterator<Item = Operation>,
    ) -> Result<(), EditorError> {
        ops.into_iter().try_for_each(|op| self.apply(op))
    }

    /// Whether remotely-originated operations are currently being applied.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Run `f` with the remote flag set.
    ///
    /// Batches flushed inside `f` are tagged [`ChangeOrigin::Remote`]. The
    /// previous flag value is restored afterwards.
    pub fn apply_remote<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = std::mem::replace(&mut self.is_remote, true);
        let result = f(self);
        self.is_remote = previous;
        result
    }

    /// Number of operations waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.operations.len()
    }

    /// Take the recorded operations as one batch.
    ///
    /// Returns `None` if nothing was applied since the last flush.
    pub fn flush(&mut self) -> Option<ChangeBatch> {
        if self.operations.is_empty() {
            return None;
        }
        let origin = if self.is_remote {
            ChangeOrigin::Remote
        } else {
            ChangeOrigin::Local
        };
        Some(ChangeBatch {
            operations: std::mem::take(&mut self.operations),
            origin,
        })
    }
}
