//! tandem-editor-crdt: Loro-backed synchronization for the tandem editor.
//!
//! This crate provides:
//! - `SyncDoc` - the shared node tree in a `LoroDoc`, with its observers
//! - `apply_operations` - editor operations to CRDT mutations, one transaction
//! - `translate` - observed CRDT changes back to editor operations
//! - `OriginGuard` - direction state and echo suppression by origin tag
//! - `SyncController` - runs local and remote cycles and reports completion
//! - `UpdateCapture` / `TestEditor` - update frame capture and test harness

pub mod applier;
pub mod capture;
pub mod completion;
pub mod config;
pub mod controller;
mod convert;
pub mod doc;
pub mod error;
pub mod event;
pub mod guard;
pub mod testing;
pub mod translator;

pub use applier::apply_operations;
pub use capture::UpdateCapture;
pub use completion::{CycleReport, Settlement};
pub use config::SyncConfig;
pub use controller::{RemoteInbox, SyncController};
pub use convert::{json_to_loro, loro_to_json};
pub use doc::SyncDoc;
pub use error::SyncError;
pub use event::{ChangeEvent, ListDelta, ObservedBatch, TextChange, Trigger};
pub use guard::{CycleToken, Direction, OriginGuard, Provenance, SyncState};
pub use testing::TestEditor;
pub use translator::translate;

// Re-export the loro crate for downstream consumers.
pub use loro;
