//! Harness for driving a controller from tests.
//!
//! [`TestEditor`] wraps a [`SyncController`] with update capture switched
//! on. Every helper waits for the cycle it starts to settle, so tests read
//! as straight-line sequences of edits and assertions.

use tandem_editor_core::{Document, Operation};

use crate::SyncError;
use crate::applier::apply_operations;
use crate::completion::CycleReport;
use crate::config::SyncConfig;
use crate::controller::SyncController;

/// Origin tag used when writing straight to the CRDT.
pub const HARNESS_ORIGIN: &str = "test-harness";

#[derive(Debug)]
pub struct TestEditor {
    controller: SyncController,
}

impl TestEditor {
    pub fn new() -> Result<Self, SyncError> {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Result<Self, SyncError> {
        Self::with_document(config, Document::new())
    }

    pub fn with_document(config: SyncConfig, document: Document) -> Result<Self, SyncError> {
        let controller = SyncController::with_document(config.with_capture(true), document)?;
        Ok(Self { controller })
    }

    pub fn controller(&self) -> &SyncController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut SyncController {
        &mut self.controller
    }

    pub fn document(&self) -> &Document {
        self.controller.document()
    }

    /// The CRDT's tree read back as a document.
    pub fn crdt_document(&self) -> Result<Document, SyncError> {
        self.controller.doc().to_document()
    }

    /// Apply one operation as its own local batch.
    pub async fn apply_op(&mut self, op: Operation) -> Result<Option<CycleReport>, SyncError> {
        self.apply_ops(vec![op]).await
    }

    /// Apply operations as a single local batch.
    ///
    /// Resolves with `None` when the batch held nothing to synchronize.
    pub async fn apply_ops(
        &mut self,
        ops: Vec<Operation>,
    ) -> Result<Option<CycleReport>, SyncError> {
        self.controller.pump()?;
        self.settle(|controller| controller.apply_local(ops)).await
    }

    /// Apply one remote update with capture paused, so the captured frames
    /// only ever hold this editor's own transactions.
    pub async fn apply_update(
        &mut self,
        update: &[u8],
    ) -> Result<Option<CycleReport>, SyncError> {
        let capture = self.controller.capture().clone();
        capture.set_enabled(false);
        let result = self
            .settle(|controller| controller.apply_remote_update(update))
            .await;
        capture.set_enabled(true);
        result
    }

    /// Apply updates one at a time, waiting for each cycle.
    pub async fn apply_updates(
        &mut self,
        updates: &[Vec<u8>],
    ) -> Result<Vec<CycleReport>, SyncError> {
        let mut reports = Vec::with_capacity(updates.len());
        for update in updates {
            if let Some(report) = self.apply_update(update).await? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Apply operations to the CRDT directly, as another actor on the same
    /// document would, and let the controller bring the editor up to date.
    pub async fn apply_ops_to_crdt(
        &mut self,
        ops: &[Operation],
    ) -> Result<Option<CycleReport>, SyncError> {
        apply_operations(self.controller.doc(), ops, HARNESS_ORIGIN)?;
        self.settle(SyncController::pump).await
    }

    /// Every frame captured since the last call.
    pub fn captured_updates(&self) -> Vec<Vec<u8>> {
        self.controller.capture().drain()
    }

    /// Run `f` and wait for the first cycle it completes, if any.
    async fn settle<T>(
        &mut self,
        f: impl FnOnce(&mut SyncController) -> Result<T, SyncError>,
    ) -> Result<Option<CycleReport>, SyncError> {
        let before = self.controller.cycles();
        let settled = self.controller.settled();
        f(&mut self.controller)?;
        if self.controller.cycles() == before {
            return Ok(None);
        }
        Ok(settled.await)
    }
}
