//! The shared CRDT document and its observers.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use loro::event::DiffEvent;
use loro::{ContainerTrait, ExportMode, LoroDoc, LoroList, Subscription, VersionVector};
use tandem_editor_core::Document;

use crate::capture::UpdateCapture;
use crate::config::SyncConfig;
use crate::convert::{insert_node, read_document};
use crate::event::{ChangeEvent, ObservedBatch, resolve};
use crate::SyncError;

#[derive(Debug, Default)]
struct Inbox {
    next_seq: u64,
    batches: VecDeque<ObservedBatch>,
}

/// A `LoroDoc` holding the shared node tree, with a deep observer and an
/// update-frame capture attached for its whole lifetime.
///
/// The observer only records what changed. Translation happens after the
/// committing call returns, through [`SyncDoc::take_observed`].
pub struct SyncDoc {
    doc: LoroDoc,
    root: LoroList,
    inbox: Arc<Mutex<Inbox>>,
    capture: UpdateCapture,
    _observer: Subscription,
    _local_updates: Subscription,
}

impl SyncDoc {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let doc = LoroDoc::new();
        if let Some(peer) = config.peer_id {
            doc.set_peer_id(peer)?;
        }
        let root = doc.get_list(config.root.as_str());

        let inbox = Arc::new(Mutex::new(Inbox::default()));
        let observer_inbox = inbox.clone();
        let observer = doc.subscribe_root(Arc::new(move |event: DiffEvent| {
            let mut inbox = observer_inbox.lock().unwrap_or_else(|e| e.into_inner());
            let batch = ObservedBatch::from_event(inbox.next_seq, &event);
            inbox.next_seq += 1;
            tracing::trace!(
                seq = batch.seq,
                origin = %batch.origin,
                trigger = %batch.trigger,
                diffs = batch.len(),
                "observed CRDT batch"
            );
            inbox.batches.push_back(batch);
        }));

        let capture = UpdateCapture::new(config.capture_updates);
        let frames = capture.clone();
        let local_updates = doc.subscribe_local_update(Box::new(move |update| {
            frames.record(update);
            true
        }));

        Ok(Self {
            doc,
            root,
            inbox,
            capture,
            _observer: observer,
            _local_updates: local_updates,
        })
    }

    pub fn loro_doc(&self) -> &LoroDoc {
        &self.doc
    }

    /// The root list holding the top-level nodes.
    pub fn root(&self) -> &LoroList {
        &self.root
    }

    pub fn capture(&self) -> &UpdateCapture {
        &self.capture
    }

    /// Commit pending mutations tagged with `origin`.
    pub(crate) fn commit_as(&self, origin: &str) {
        self.doc.set_next_commit_origin(origin);
        self.doc.commit();
    }

    /// Merge encoded updates or a snapshot.
    pub fn import(&self, bytes: &[u8]) -> Result<(), SyncError> {
        self.doc
            .import(bytes)
            .map_err(|e| SyncError::Import(e.to_string()))?;
        Ok(())
    }

    pub fn export_snapshot(&self) -> Result<Vec<u8>, SyncError> {
        self.doc
            .export(ExportMode::Snapshot)
            .map_err(|e| SyncError::Export(e.to_string()))
    }

    /// Updates since `version`, or `None` when there is nothing new.
    pub fn export_updates_since(&self, version: &VersionVector) -> Result<Option<Vec<u8>>, SyncError> {
        if *version == self.doc.oplog_vv() {
            return Ok(None);
        }
        let updates = self
            .doc
            .export(ExportMode::Updates {
                from: Cow::Borrowed(version),
            })
            .map_err(|e| SyncError::Export(e.to_string()))?;
        Ok((!updates.is_empty()).then_some(updates))
    }

    pub fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    /// Read the shared tree as an editor document.
    pub fn to_document(&self) -> Result<Document, SyncError> {
        read_document(&self.root)
    }

    /// Append the nodes of `document` to the root in one transaction.
    pub fn load_document(&self, document: &Document, origin: &str) -> Result<(), SyncError> {
        let offset = self.root.len();
        for (i, node) in document.children.iter().enumerate() {
            insert_node(&self.root, offset + i, node)?;
        }
        self.commit_as(origin);
        Ok(())
    }

    /// Remove and return every observed batch, oldest first.
    pub fn take_observed(&self) -> Vec<ObservedBatch> {
        let mut inbox = self.inbox.lock().unwrap_or_else(|e| e.into_inner());
        inbox.batches.drain(..).collect()
    }

    /// Put batches back at the front of the inbox, keeping their order.
    pub(crate) fn requeue(&self, batches: Vec<ObservedBatch>) {
        let mut inbox = self.inbox.lock().unwrap_or_else(|e| e.into_inner());
        for batch in batches.into_iter().rev() {
            inbox.batches.push_front(batch);
        }
    }

    pub fn has_observed(&self) -> bool {
        let inbox = self.inbox.lock().unwrap_or_else(|e| e.into_inner());
        !inbox.batches.is_empty()
    }

    /// Resolve an observed batch against the current state.
    pub fn resolve(&self, batch: &ObservedBatch) -> Result<Vec<ChangeEvent>, SyncError> {
        resolve(&self.root, batch)
    }
}

impl fmt::Debug for SyncDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncDoc")
            .field("root", &self.root.id())
            .field("version", &self.doc.oplog_vv())
            .field("capture", &self.capture)
            .finish_non_exhaustive()
    }
}
