//! Document nodes: elements with children and text leaves.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::error::EditorError;

/// Property map carried by every node.
///
/// Ordered so that two nodes with the same properties always compare and
/// serialize identically regardless of insertion order.
pub type Props = BTreeMap<SmolStr, Value>;

/// Key under which an element stores its children.
pub const CHILDREN_KEY: &str = "children";

/// Key under which a text leaf stores its content.
pub const TEXT_KEY: &str = "text";

/// Whether a property key collides with the structural keys.
pub fn is_reserved_key(key: &str) -> bool {
    key == CHILDREN_KEY || key == TEXT_KEY
}

/// An element node: properties plus an ordered list of children.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: Props,
    #[serde(default)]
    pub children: Vec<Node>,
}

/// A text leaf: a run of characters with properties (marks).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TextLeaf {
    pub text: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: Props,
}

/// A node in the document tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Text(TextLeaf),
    Element(Element),
}

impl Node {
    /// Create an element with no properties.
    pub fn element(children: Vec<Node>) -> Self {
        Node::Element(Element {
            props: Props::new(),
            children,
        })
    }

    /// Create a text leaf with no properties.
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextLeaf {
            text: text.into(),
            props: Props::new(),
        })
    }

    /// Builder-style property setter.
    pub fn with_prop(mut self, key: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        self.props_mut().insert(key.into(), value.into());
        self
    }

    pub fn props(&self) -> &Props {
        match self {
            Node::Text(t) => &t.props,
            Node::Element(e) => &e.props,
        }
    }

    pub fn props_mut(&mut self) -> &mut Props {
        match self {
            Node::Text(t) => &mut t.props,
            Node::Element(e) => &mut e.props,
        }
    }

    /// Children of an element, `None` for text leaves.
    pub fn children(&self) -> Option<&[Node]> {
        match self {
            Node::Element(e) => Some(&e.children),
            Node::Text(_) => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Element(e) => Some(&mut e.children),
            Node::Text(_) => None,
        }
    }

    /// Text content of a leaf, `None` for elements.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(t) => Some(&t.text),
            Node::Element(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Node::Text(_))
    }

    /// Number of nodes in this subtree, including this one.
    pub fn subtree_len(&self) -> usize {
        match self {
            Node::Text(_) => 1,
            Node::Element(e) => 1 + e.children.iter().map(Node::subtree_len).sum::<usize>(),
        }
    }

    /// Reject the subtree if any node carries a reserved property key.
    pub fn check_props(&self) -> Result<(), EditorError> {
        if let Some(key) = self.props().keys().find(|k| is_reserved_key(k)) {
            return Err(EditorError::ReservedProperty(key.to_string()));
        }
        self.children()
            .unwrap_or_default()
            .iter()
            .try_for_each(Node::check_props)
    }

    /// Concatenated text of all leaves in this subtree.
    pub fn string(&self) -> String {
        match self {
            Node::Text(t) => t.text.clone(),
            Node::Element(e) => e.children.iter().map(Node::string).collect(),
        }
    }
}

/// Char count of a string; all text offsets are in Unicode scalar values.
pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of a char offset, or `None` if the offset is past the end.
pub(crate) fn byte_index(s: &str, char_offset: usize) -> Option<usize> {
    if char_offset == 0 {
        return Some(0);
    }
    match s.char_indices().nth(char_offset) {
        Some((idx, _)) => Some(idx),
        None if char_len(s) == char_offset => Some(s.len()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subtree_len() {
        let node = Node::element(vec![
            Node::text("a"),
            Node::element(vec![Node::text("b"), Node::text("c")]),
        ]);
        assert_eq!(node.subtree_len(), 5);
        assert_eq!(node.string(), "abc");
    }

    #[test]
    fn test_check_props_walks_the_subtree() {
        let ok = Node::element(vec![Node::text("a").with_prop("bold", true)]);
        assert!(ok.check_props().is_ok());
        assert!(!ok.is_text());
        assert!(ok.children().unwrap()[0].is_text());

        let nested = Node::element(vec![Node::element(vec![
            Node::text("b").with_prop("text", 1),
        ])]);
        assert!(matches!(
            nested.check_props(),
            Err(EditorError::ReservedProperty(key)) if key == "text"
        ));
    }

    #[test]
    fn test_serde_shape() {
        let node = Node::element(vec![Node::text("hi").with_prop("bold", true)])
            .with_prop("type", "paragraph");
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(
            value,
            json!({
                "props": { "type": "paragraph" },
                "children": [{ "text": "hi", "props": { "bold": true } }]
            })
        );
        let back: Node = serde_json::from_value(value).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_byte_index_multibyte() {
        let s = "hé🌍x";
        assert_eq!(byte_index(s, 0), Some(0));
        assert_eq!(byte_index(s, 2), Some(3));
        assert_eq!(byte_index(s, 3), Some(7));
        assert_eq!(byte_index(s, 4), Some(8));
        assert_eq!(byte_index(s, 5), None);
    }
}
