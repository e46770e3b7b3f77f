//! The document tree and operation application.

use serde::{Deserialize, Serialize};

use crate::error::EditorError;
use crate::node::{Element, Node, Props, TextLeaf, byte_index, char_len, is_reserved_key};
use crate::operation::Operation;
use crate::path::Path;
use crate::types::Selection;

/// Root of the editing model: top-level nodes plus the local selection.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Document {
    pub children: Vec<Node>,
    /// Local cursor state. Not part of document equality.
    #[serde(skip)]
    pub selection: Option<Selection>,
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.children == other.children
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(children: Vec<Node>) -> Self {
        Self {
            children,
            selection: None,
        }
    }

    /// Node at `path`. The root path has no node.
    pub fn node(&self, path: &Path) -> Option<&Node> {
        let (last, ancestors) = path.as_slice().split_last()?;
        let mut children: &[Node] = &self.children;
        for &idx in ancestors {
            children = children.get(idx)?.children()?;
        }
        children.get(*last)
    }

    pub fn node_mut(&mut self, path: &Path) -> Option<&mut Node> {
        let (last, ancestors) = path.as_slice().split_last()?;
        let mut children = &mut self.children;
        for &idx in ancestors {
            children = children.get_mut(idx)?.children_mut()?;
        }
        children.get_mut(*last)
    }

    /// Children of the node at `path`, or the top-level nodes for the root.
    pub fn children_at(&self, path: &Path) -> Option<&[Node]> {
        if path.is_root() {
            Some(self.children.as_slice())
        } else {
            self.node(path)?.children()
        }
    }

    fn children_at_mut(&mut self, path: &Path) -> Option<&mut Vec<Node>> {
        let mut children = &mut self.children;
        for &idx in path.as_slice() {
            children = children.get_mut(idx)?.children_mut()?;
        }
        Some(children)
    }

    /// Total number of nodes below the root.
    pub fn node_count(&self) -> usize {
        self.children.iter().map(Node::subtree_len).sum()
    }

    /// Text of each top-level node, joined by newlines.
    pub fn text_content(&self) -> String {
        self.children
            .iter()
            .map(Node::string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Apply one operation, transforming the selection through it.
    ///
    /// On error the document is left unchanged.
    pub fn apply(&mut self, op: &Operation) -> Result<(), EditorError> {
        match op {
            Operation::SetSelection { selection } => {
                self.selection = selection.clone();
                return Ok(());
            }
            Operation::InsertNode { path, node } => self.insert_node(path, node)?,
            Operation::RemoveNode { path, .. } => {
                self.remove_node(path)?;
            }
            Operation::InsertText { path, offset, text } => {
                let leaf = self.text_mut(path)?;
                let at = byte_index(&leaf.text, *offset).ok_or_else(|| {
                    EditorError::OffsetOutOfRange {
                        path: path.clone(),
                        offset: *offset,
                        len: char_len(&leaf.text),
                    }
                })?;
                leaf.text.insert_str(at, text);
            }
            Operation::RemoveText { path, offset, text } => {
                let leaf = self.text_mut(path)?;
                let end_offset = offset.checked_add(char_len(text));
                let out_of_range = || EditorError::OffsetOutOfRange {
                    path: path.clone(),
                    offset: end_offset.unwrap_or(usize::MAX),
                    len: char_len(&leaf.text),
                };
                let start = byte_index(&leaf.text, *offset).ok_or_else(out_of_range)?;
                let end = end_offset
                    .and_then(|end| byte_index(&leaf.text, end))
                    .ok_or_else(out_of_range)?;
                leaf.text.replace_range(start..end, "");
            }
            Operation::SetNode {
                path,
                properties,
                new_properties,
            } => {
                if let Some(key) = new_properties
                    .keys()
                    .chain(properties.keys())
                    .find(|k| is_reserved_key(k))
                {
                    return Err(EditorError::ReservedProperty(key.to_string()));
                }
                let node = self
                    .node_mut(path)
                    .ok_or_else(|| EditorError::invalid(path, "no node to set properties on"))?;
                let props = node.props_mut();
                for (key, value) in new_properties {
                    props.insert(key.clone(), value.clone());
                }
                for key in properties.keys() {
                    if !new_properties.contains_key(key) {
                        props.remove(key);
                    }
                }
            }
            Operation::MoveNode { path, new_path } => self.move_node(op, path, new_path)?,
            Operation::MergeNode { path, .. } => self.merge_node(path)?,
            Operation::SplitNode {
                path,
                position,
                properties,
            } => self.split_node(path, *position, properties)?,
        }

        self.selection = self.selection.take().and_then(|sel| sel.transform(op));
        Ok(())
    }

    fn insert_node(&mut self, path: &Path, node: &Node) -> Result<(), EditorError> {
        node.check_props()?;
        let (parent, index) = split(path)?;
        let children = self
            .children_at_mut(&parent)
            .ok_or_else(|| EditorError::invalid(path, "parent is not an element"))?;
        if index > children.len() {
            return Err(EditorError::invalid(path, "index past end of parent"));
        }
        children.insert(index, node.clone());
        Ok(())
    }

    fn remove_node(&mut self, path: &Path) -> Result<Node, EditorError> {
        let (parent, index) = split(path)?;
        let children = self
            .children_at_mut(&parent)
            .ok_or_else(|| EditorError::invalid(path, "parent is not an element"))?;
        if index >= children.len() {
            return Err(EditorError::invalid(path, "no node to remove"));
        }
        Ok(children.remove(index))
    }

    fn move_node(&mut self, op: &Operation, path: &Path, new_path: &Path) -> Result<(), EditorError> {
        if path.is_ancestor_of(new_path) {
            return Err(EditorError::MoveIntoSelf {
                from: path.clone(),
                to: new_path.clone(),
            });
        }
        if self.node(path).is_none() {
            return Err(EditorError::invalid(path, "no node to move"));
        }
        if path == new_path {
            return Ok(());
        }

        let node = self.remove_node(path)?;
        let target = path
            .transform(op)
            .ok_or_else(|| EditorError::invalid(new_path, "move target vanished"))?;
        if let Err(e) = self.insert_node(&target, &node) {
            // Put it back so a failed move leaves the tree untouched.
            self.insert_node(path, &node)?;
            return Err(e);
        }
        Ok(())
    }

    fn merge_node(&mut self, path: &Path) -> Result<(), EditorError> {
        let prev_path = path
            .previous()
            .ok_or_else(|| EditorError::invalid(path, "no previous sibling to merge into"))?;
        match (self.node(&prev_path), self.node(path)) {
            (Some(Node::Text(_)), Some(Node::Text(_)))
            | (Some(Node::Element(_)), Some(Node::Element(_))) => {}
            (Some(_), Some(_)) => return Err(EditorError::MismatchedNodes(path.clone())),
            _ => return Err(EditorError::invalid(path, "no node to merge")),
        }

        let node = self.remove_node(path)?;
        let prev = self
            .node_mut(&prev_path)
            .ok_or_else(|| EditorError::invalid(&prev_path, "no previous sibling to merge into"))?;
        match (prev, node) {
            (Node::Text(prev), Node::Text(leaf)) => prev.text.push_str(&leaf.text),
            (Node::Element(prev), Node::Element(el)) => prev.children.extend(el.children),
            _ => return Err(EditorError::MismatchedNodes(path.clone())),
        }
        Ok(())
    }

    fn split_node(
        &mut self,
        path: &Path,
        position: usize,
        properties: &Props,
    ) -> Result<(), EditorError> {
        if let Some(key) = properties.keys().find(|k| is_reserved_key(k)) {
            return Err(EditorError::ReservedProperty(key.to_string()));
        }
        let node = self
            .node_mut(path)
            .ok_or_else(|| EditorError::invalid(path, "no node to split"))?;

        let mut props = node.props().clone();
        props.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));

        let right = match node {
            Node::Text(leaf) => {
                let at = byte_index(&leaf.text, position).ok_or_else(|| {
                    EditorError::OffsetOutOfRange {
                        path: path.clone(),
                        offset: position,
                        len: char_len(&leaf.text),
                    }
                })?;
                Node::Text(TextLeaf {
                    text: leaf.text.split_off(at),
                    props,
                })
            }
            Node::Element(el) => {
                if position > el.children.len() {
                    return Err(EditorError::OffsetOutOfRange {
                        path: path.clone(),
                        offset: position,
                        len: el.children.len(),
                    });
                }
                Node::Element(Element {
                    props,
                    children: el.children.split_off(position),
                })
            }
        };

        self.insert_node(&path.next(), &right)
    }

    fn text_mut(&mut self, path: &Path) -> Result<&mut TextLeaf, EditorError> {
        match self.node_mut(path) {
            Some(Node::Text(leaf)) => Ok(leaf),
            Some(Node::Element(_)) => Err(EditorError::invalid(path, "node is not a text leaf")),
            None => Err(EditorError::invalid(path, "no node at path")),
        }
    }
}

fn split(path: &Path) -> Result<(Path, usize), EditorError> {
    match (path.parent(), path.last()) {
        (Some(parent), Some(index)) => Ok((parent, index)),
        _ => Err(EditorError::invalid(path, "the root cannot be addressed")),
    }
}
