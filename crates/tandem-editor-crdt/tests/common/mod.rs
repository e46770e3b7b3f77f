//! Shared helpers for the integration tests.

#![allow(dead_code)]

use tandem_editor_core::{Document, Node, Operation, Path};
use tandem_editor_crdt::{SyncConfig, TestEditor};
use tracing_subscriber::EnvFilter;

/// Route tracing output through the test writer. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fresh test editor with a fixed peer id.
pub fn peer(id: u64) -> TestEditor {
    init_tracing();
    TestEditor::with_config(SyncConfig::default().with_peer_id(id)).unwrap()
}

/// A test editor seeded with `document`.
pub fn seeded_peer(id: u64, document: Document) -> TestEditor {
    init_tracing();
    TestEditor::with_document(SyncConfig::default().with_peer_id(id), document).unwrap()
}

pub fn paragraph(text: &str) -> Node {
    Node::element(vec![Node::text(text)]).with_prop("type", "paragraph")
}

pub fn insert(path: impl Into<Path>, node: Node) -> Operation {
    Operation::InsertNode {
        path: path.into(),
        node,
    }
}

pub fn insert_text(path: impl Into<Path>, offset: usize, text: &str) -> Operation {
    Operation::InsertText {
        path: path.into(),
        offset,
        text: text.into(),
    }
}

/// Both sides of a test editor hold the same tree.
pub fn assert_settled(editor: &TestEditor) {
    assert_eq!(&editor.crdt_document().unwrap(), editor.document());
}
