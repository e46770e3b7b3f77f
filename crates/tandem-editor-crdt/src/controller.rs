//! The synchronization controller.
//!
//! Owns the editor, the CRDT document and the guard, and runs every change
//! through one of two cycles:
//!
//! - local: editor batch -> [`apply_operations`] -> commit -> our own echo is
//!   observed and suppressed
//! - remote: update bytes -> import -> observed batch -> [`translate`] ->
//!   operations replayed into the editor under its remote flag
//!
//! Both run to completion inside the call that started them. Each ends in
//! `Idle` and then fires one [`CycleReport`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tandem_editor_core::{Document, Editor, Operation, Path};
use web_time::Instant;

use crate::SyncError;
use crate::applier::apply_operations;
use crate::capture::UpdateCapture;
use crate::completion::{Completion, CycleReport, Settlement};
use crate::config::SyncConfig;
use crate::doc::SyncDoc;
use crate::event::ObservedBatch;
use crate::guard::{Direction, OriginGuard, Provenance, SyncState};
use crate::translator::translate;

/// Queue of remote update frames waiting for the controller.
///
/// Clones share the queue, so transport code can hold one and push at any
/// time; the frames are applied in arrival order by
/// [`SyncController::pump`].
#[derive(Clone, Debug, Default)]
pub struct RemoteInbox {
    queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl RemoteInbox {
    pub fn push(&self, update: Vec<u8>) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(update);
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pop(&self) -> Option<Vec<u8>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }
}

/// Counts gathered while a cycle runs.
#[derive(Debug, Default)]
struct Tally {
    operations: usize,
    suppressed: usize,
}

#[derive(Debug)]
pub struct SyncController {
    config: SyncConfig,
    editor: Editor,
    doc: SyncDoc,
    guard: OriginGuard,
    inbox: RemoteInbox,
    completion: Completion,
    cycles: u64,
}

impl SyncController {
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        Self::with_document(config, Document::new())
    }

    /// Start from an existing document, seeding the CRDT with its nodes.
    pub fn with_document(config: SyncConfig, document: Document) -> Result<Self, SyncError> {
        let doc = SyncDoc::new(&config)?;
        if !document.children.is_empty() {
            doc.load_document(&document, &config.origin)?;
            // The seed is already in the editor.
            doc.take_observed();
        }
        tracing::debug!(origin = %config.origin, root = %config.root, "sync controller ready");
        Ok(Self {
            guard: OriginGuard::new(config.origin.clone()),
            editor: Editor::with_document(document),
            doc,
            inbox: RemoteInbox::default(),
            completion: Completion::default(),
            cycles: 0,
            config,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn document(&self) -> &Document {
        self.editor.document()
    }

    pub fn doc(&self) -> &SyncDoc {
        &self.doc
    }

    pub fn capture(&self) -> &UpdateCapture {
        self.doc.capture()
    }

    pub fn state(&self) -> SyncState {
        self.guard.state()
    }

    /// Number of cycles completed so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Handle for queueing remote updates.
    pub fn remote_inbox(&self) -> RemoteInbox {
        self.inbox.clone()
    }

    /// Future resolving with the report of the next finished cycle.
    pub fn settled(&mut self) -> Settlement {
        self.completion.settled()
    }

    /// Call `callback` at the end of every cycle.
    pub fn on_cycle_complete(&mut self, callback: impl FnMut(&CycleReport) + Send + 'static) {
        self.completion.on_complete(Box::new(callback));
    }

    /// Apply local operations to the editor and push them to the CRDT as
    /// one batch.
    ///
    /// If an operation is rejected by the editor, the ones before it are
    /// still synchronized and the editor error is returned afterwards.
    pub fn apply_local(
        &mut self,
        ops: impl IntoIterator<Item = Operation>,
    ) -> Result<usize, SyncError> {
        self.pump()?;
        let applied = self.editor.apply_all(ops);
        let flushed = self.flush_local();
        applied?;
        flushed
    }

    /// Run `f` against the editor, then synchronize whatever it applied.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut Editor) -> R) -> Result<R, SyncError> {
        self.pump()?;
        let out = f(&mut self.editor);
        self.flush_local()?;
        Ok(out)
    }

    /// Push the editor's pending local batch into the CRDT.
    ///
    /// Only reached through `apply_local` and `edit`, which pump before the
    /// editor is touched. Returns the number of operations committed.
    fn flush_local(&mut self) -> Result<usize, SyncError> {
        if self.editor.pending() == 0 {
            return Ok(0);
        }
        let token = self.guard.begin(Direction::Local)?;
        let started = Instant::now();

        let mut tally = Tally::default();
        let result = match self.editor.flush() {
            Some(batch) if batch.is_local() => {
                apply_operations(&self.doc, &batch.operations, &self.config.origin)
            }
            // Remote batches were already in the CRDT.
            _ => Ok(0),
        };
        if let Ok(n) = &result {
            tally.operations = *n;
        }

        let mut external = Vec::new();
        for batch in self.doc.take_observed() {
            match self.guard.classify(&batch.origin, batch.trigger) {
                Provenance::Echo => tally.suppressed += 1,
                Provenance::External => external.push(batch),
            }
        }
        if !external.is_empty() {
            tracing::warn!(
                batches = external.len(),
                "foreign changes observed during local cycle, deferring"
            );
            self.doc.requeue(external);
        }

        self.guard.finish(token);
        self.complete(Direction::Local, tally, result.is_err(), started);
        result
    }

    /// Merge one remote update and replay its effect into the editor.
    ///
    /// Returns the number of operations applied to the editor.
    pub fn apply_remote_update(&mut self, update: &[u8]) -> Result<usize, SyncError> {
        let token = self.guard.begin(Direction::Remote)?;
        let started = Instant::now();

        let mut tally = Tally::default();
        let result = self
            .doc
            .import(update)
            .and_then(|()| self.replay_observed(&mut tally));

        self.guard.finish(token);
        self.complete(Direction::Remote, tally, result.is_err(), started);
        result
    }

    /// Apply updates strictly one after another, one cycle each.
    ///
    /// Stops at the first failure; the updates after it are not applied.
    pub fn apply_remote_updates<I, B>(&mut self, updates: I) -> Result<usize, SyncError>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut total = 0;
        for update in updates {
            total += self.apply_remote_update(update.as_ref())?;
        }
        Ok(total)
    }

    /// Process everything waiting while idle: changes committed to the
    /// CRDT by other handles, then queued remote updates in arrival order.
    ///
    /// Returns the number of operations applied to the editor.
    pub fn pump(&mut self) -> Result<usize, SyncError> {
        let mut total = 0;
        if self.doc.has_observed() {
            let token = self.guard.begin(Direction::Remote)?;
            let started = Instant::now();
            let mut tally = Tally::default();
            let result = self.replay_observed(&mut tally);
            self.guard.finish(token);
            self.complete(Direction::Remote, tally, result.is_err(), started);
            total += result?;
        }
        while let Some(update) = self.inbox.pop() {
            total += self.apply_remote_update(&update)?;
        }
        Ok(total)
    }

    /// Replace the editor's tree with the CRDT's, as a remote change.
    ///
    /// Recovery path after a failed cycle left the two sides apart.
    pub fn resync_from_crdt(&mut self) -> Result<usize, SyncError> {
        let token = self.guard.begin(Direction::Remote)?;
        let started = Instant::now();
        let mut tally = Tally::default();

        let result = self.doc.to_document().and_then(|target| {
            // Anything observed is already part of the tree being loaded.
            self.doc.take_observed();
            let mut ops: Vec<Operation> = (0..self.editor.document().children.len())
                .rev()
                .filter_map(|i| {
                    let path = Path::from([i]);
                    let node = self.editor.document().node(&path)?.clone();
                    Some(Operation::RemoveNode { path, node })
                })
                .collect();
            ops.extend(
                target
                    .children
                    .into_iter()
                    .enumerate()
                    .map(|(i, node)| Operation::InsertNode {
                        path: Path::from([i]),
                        node,
                    }),
            );
            self.replay(ops, &mut tally)
        });

        self.guard.finish(token);
        self.complete(Direction::Remote, tally, result.is_err(), started);
        result
    }

    /// Translate and apply every external batch waiting in the inbox.
    fn replay_observed(&mut self, tally: &mut Tally) -> Result<usize, SyncError> {
        let mut combined: Option<ObservedBatch> = None;
        for batch in self.doc.take_observed() {
            if self.guard.classify(&batch.origin, batch.trigger) == Provenance::Echo {
                tally.suppressed += 1;
                continue;
            }
            tracing::debug!(
                seq = batch.seq,
                origin = %batch.origin,
                trigger = %batch.trigger,
                diffs = batch.len(),
                "replaying external batch"
            );
            match &mut combined {
                Some(acc) => acc.absorb(batch),
                None => combined = Some(batch),
            }
        }
        let Some(batch) = combined else {
            return Ok(0);
        };

        let events = self.doc.resolve(&batch)?;
        let ops = translate(&events, self.editor.document())?;
        self.replay(ops, tally)
    }

    fn replay(&mut self, ops: Vec<Operation>, tally: &mut Tally) -> Result<usize, SyncError> {
        if ops.is_empty() {
            return Ok(0);
        }
        let count = ops.len();
        self.editor.apply_remote(|editor| {
            let applied = editor.apply_all(ops);
            // Remote batches are not fed back to the CRDT.
            editor.flush();
            applied
        })?;
        tally.operations += count;
        Ok(count)
    }

    fn complete(&mut self, direction: Direction, tally: Tally, aborted: bool, started: Instant) {
        self.cycles += 1;
        let report = CycleReport {
            cycle: self.cycles,
            direction,
            operations: tally.operations,
            suppressed_batches: tally.suppressed,
            aborted,
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            cycle = report.cycle,
            %direction,
            operations = report.operations,
            suppressed = report.suppressed_batches,
            aborted,
            "sync cycle complete"
        );
        self.completion.fire(&report);
    }
}
