//! Cursor types: points and selections addressed by path and char offset.

use serde::{Deserialize, Serialize};

use crate::node::char_len;
use crate::operation::Operation;
use crate::path::Path;

/// A position inside a text leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    /// Path of the text leaf.
    pub path: Path,
    /// Character offset in the leaf (NOT byte offset!)
    pub offset: usize,
}

impl Point {
    pub fn new(path: impl Into<Path>, offset: usize) -> Self {
        Self {
            path: path.into(),
            offset,
        }
    }

    /// Where this point ends up after `op`, with forward affinity.
    ///
    /// Returns `None` if the leaf holding the point was removed.
    pub fn transform(&self, op: &Operation) -> Option<Point> {
        let mut path = self.path.clone();
        let mut offset = self.offset;

        match op {
            Operation::InsertText {
                path: op_path,
                offset: op_offset,
                text,
            } => {
                if *op_path == path && *op_offset <= offset {
                    offset += char_len(text);
                }
            }
            Operation::RemoveText {
                path: op_path,
                offset: op_offset,
                text,
            } => {
                if *op_path == path && *op_offset <= offset {
                    offset -= (offset - op_offset).min(char_len(text));
                }
            }
            Operation::MergeNode {
                path: op_path,
                position,
                ..
            } => {
                if *op_path == path {
                    offset += position;
                }
                path = path.transform(op)?;
            }
            Operation::SplitNode {
                path: op_path,
                position,
                ..
            } if *op_path == path => {
                if *position <= offset {
                    offset -= position;
                    path = path.next();
                }
            }
            _ => {
                path = path.transform(op)?;
            }
        }

        Some(Point { path, offset })
    }
}

/// A selection between an anchor and a focus point.
///
/// The anchor is where the selection started, the focus is where the cursor is now.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    /// Create a collapsed selection (cursor position).
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn transform(&self, op: &Operation) -> Option<Selection> {
        Some(Selection {
            anchor: self.anchor.transform(op)?,
            focus: self.focus.transform(op)?,
        })
    }
}
