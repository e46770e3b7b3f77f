//! Index paths from the document root.
//!
//! A path addresses a node by the index of each ancestor in its parent's
//! children. The empty path is the document itself. Paths are positional:
//! after any structural operation they have to be recomputed with
//! [`Path::transform`], never cached.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operation::Operation;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<usize>);

impl Path {
    /// The document root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Index within the parent, `None` for the root.
    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            return None;
        }
        Some(Path(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn child(&self, index: usize) -> Path {
        let mut indices = self.0.clone();
        indices.push(index);
        Path(indices)
    }

    /// The next sibling's path. The root is its own next.
    pub fn next(&self) -> Path {
        let mut indices = self.0.clone();
        if let Some(last) = indices.last_mut() {
            *last += 1;
        }
        Path(indices)
    }

    /// The previous sibling's path, `None` at index 0 or for the root.
    pub fn previous(&self) -> Option<Path> {
        let mut indices = self.0.clone();
        let last = indices.last_mut()?;
        *last = last.checked_sub(1)?;
        Some(Path(indices))
    }

    /// Strict ancestor check: `self` is a proper prefix of `other`.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        self.0.len() < other.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Same parent, different index.
    pub fn is_sibling_of(&self, other: &Path) -> bool {
        match (self.0.split_last(), other.0.split_last()) {
            (Some((a, a_parent)), Some((b, b_parent))) => a_parent == b_parent && a != b,
            _ => false,
        }
    }

    /// Whether `self` ends before `other` at `self`'s depth, i.e. it is an
    /// earlier sibling of `other` or of one of `other`'s ancestors.
    pub fn ends_before(&self, other: &Path) -> bool {
        let Some((&last, parent)) = self.0.split_last() else {
            return false;
        };
        if other.0.len() <= parent.len() || other.0[..parent.len()] != *parent {
            return false;
        }
        last < other.0[parent.len()]
    }

    /// Where this path ends up after `op` is applied.
    ///
    /// Returns `None` if the addressed node no longer exists afterwards.
    pub fn transform(&self, op: &Operation) -> Option<Path> {
        if self.is_root() {
            return Some(self.clone());
        }
        let mut p = self.0.clone();

        match op {
            Operation::InsertNode { path, .. } => {
                if path == self || path.ends_before(self) || path.is_ancestor_of(self) {
                    p[path.len() - 1] += 1;
                }
            }
            Operation::RemoveNode { path, .. } => {
                if path == self || path.is_ancestor_of(self) {
                    return None;
                }
                if path.ends_before(self) {
                    p[path.len() - 1] -= 1;
                }
            }
            Operation::MergeNode { path, position, .. } => {
                if path == self || path.ends_before(self) {
                    p[path.len() - 1] -= 1;
                } else if path.is_ancestor_of(self) {
                    p[path.len() - 1] -= 1;
                    p[path.len()] += position;
                }
            }
            Operation::SplitNode { path, position, .. } => {
                if path.ends_before(self) {
                    p[path.len() - 1] += 1;
                } else if path.is_ancestor_of(self) && self.0[path.len()] >= *position {
                    p[path.len() - 1] += 1;
                    p[path.len()] -= position;
                }
            }
            Operation::MoveNode { path, new_path } => {
                if path == new_path {
                    return Some(self.clone());
                }
                if path == self || path.is_ancestor_of(self) {
                    let mut moved = new_path.0.clone();
                    if path.ends_before(new_path) && path.len() < new_path.len() {
                        moved[path.len() - 1] -= 1;
                    }
                    moved.extend_from_slice(&self.0[path.len()..]);
                    return Some(Path(moved));
                }
                if path.is_sibling_of(new_path)
                    && (new_path.is_ancestor_of(self) || new_path == self)
                {
                    if path.ends_before(self) {
                        p[path.len() - 1] -= 1;
                    } else {
                        p[path.len() - 1] += 1;
                    }
                } else if new_path.ends_before(self)
                    || new_path == self
                    || new_path.is_ancestor_of(self)
                {
                    if path.ends_before(self) {
                        p[path.len() - 1] -= 1;
                    }
                    p[new_path.len() - 1] += 1;
                } else if path.ends_before(self) {
                    if new_path == self {
                        p[new_path.len() - 1] += 1;
                    }
                    p[path.len() - 1] -= 1;
                }
            }
            Operation::InsertText { .. }
            | Operation::RemoveText { .. }
            | Operation::SetNode { .. }
            | Operation::SetSelection { .. } => {}
        }

        Some(Path(p))
    }
}

impl From<Vec<usize>> for Path {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl<const N: usize> From<[usize; N]> for Path {
    fn from(indices: [usize; N]) -> Self {
        Self(indices.to_vec())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{idx}")?;
        }
        write!(f, "]")
    }
}
