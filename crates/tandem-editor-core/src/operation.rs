//! Path-addressed editing operations.
//!
//! Operations are produced in strict sequence: the path in each one is
//! interpreted against the document as left by all previous operations of
//! the same batch.

use serde::{Deserialize, Serialize};

use crate::node::{Node, Props};
use crate::path::Path;
use crate::types::Selection;

/// One atomic change to the editing model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Insert `node` so that it ends up at `path`.
    InsertNode { path: Path, node: Node },
    /// Remove the node at `path`. `node` is the removed subtree.
    RemoveNode { path: Path, node: Node },
    /// Insert text into the leaf at `path` at char `offset`.
    InsertText {
        path: Path,
        offset: usize,
        text: String,
    },
    /// Remove `text` from the leaf at `path` starting at char `offset`.
    RemoveText {
        path: Path,
        offset: usize,
        text: String,
    },
    /// Set node properties.
    ///
    /// Keys in `new_properties` are set; keys only in `properties` are removed.
    SetNode {
        path: Path,
        properties: Props,
        new_properties: Props,
    },
    /// Move the node at `path` to `new_path`.
    ///
    /// `new_path` is read against the tree before the node is taken out.
    MoveNode { path: Path, new_path: Path },
    /// Merge the node at `path` into its previous sibling.
    ///
    /// `position` is the previous sibling's text length (for leaves) or
    /// child count (for elements) before the merge.
    MergeNode {
        path: Path,
        position: usize,
        properties: Props,
    },
    /// Split the node at `path` at `position`.
    ///
    /// The right-hand half is inserted after the node with the node's
    /// properties overlaid by `properties`.
    SplitNode {
        path: Path,
        position: usize,
        properties: Props,
    },
    /// Replace the local selection. Never replicated.
    SetSelection { selection: Option<Selection> },
}

impl Operation {
    /// The path this operation addresses, `None` for selection changes.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Operation::InsertNode { path, .. }
            | Operation::RemoveNode { path, .. }
            | Operation::InsertText { path, .. }
            | Operation::RemoveText { path, .. }
            | Operation::SetNode { path, .. }
            | Operation::MoveNode { path, .. }
            | Operation::MergeNode { path, .. }
            | Operation::SplitNode { path, .. } => Some(path),
            Operation::SetSelection { .. } => None,
        }
    }

    /// Selection changes are local cursor state.
    pub fn is_selection(&self) -> bool {
        matches!(self, Operation::SetSelection { .. })
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::InsertNode { .. } => "insert_node",
            Operation::RemoveNode { .. } => "remove_node",
            Operation::InsertText { .. } => "insert_text",
            Operation::RemoveText { .. } => "remove_text",
            Operation::SetNode { .. } => "set_node",
            Operation::MoveNode { .. } => "move_node",
            Operation::MergeNode { .. } => "merge_node",
            Operation::SplitNode { .. } => "split_node",
            Operation::SetSelection { .. } => "set_selection",
        }
    }
}
