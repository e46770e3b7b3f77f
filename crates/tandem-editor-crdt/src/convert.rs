//! Mapping between editor nodes and Loro containers.
//!
//! Every node is a `LoroMap`. Elements keep their children in a `LoroList`
//! under `children`, text leaves keep their content in a `LoroText` under
//! `text`. All other keys are properties stored as plain values.

use std::collections::HashMap;

use loro::{
    Container, ContainerID, ContainerTrait, LoroList, LoroMap, LoroText, LoroValue,
    ValueOrContainer,
};
use serde_json::{Map, Number, Value};
use tandem_editor_core::{
    CHILDREN_KEY, Document, Element, Node, Path, Props, TEXT_KEY, TextLeaf, is_reserved_key,
};

use crate::SyncError;

/// Convert a JSON property value into a Loro value.
pub fn json_to_loro(value: &Value) -> LoroValue {
    match value {
        Value::Null => LoroValue::Null,
        Value::Bool(b) => LoroValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => LoroValue::I64(i),
            None => LoroValue::Double(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => LoroValue::from(s.as_str()),
        Value::Array(items) => LoroValue::from(items.iter().map(json_to_loro).collect::<Vec<_>>()),
        Value::Object(map) => LoroValue::from(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_loro(v)))
                .collect::<HashMap<String, LoroValue>>(),
        ),
    }
}

/// Convert a Loro value back into JSON.
///
/// Binary values become arrays of bytes; container references have no JSON
/// form and become `null`.
pub fn loro_to_json(value: &LoroValue) -> Value {
    match value {
        LoroValue::Null => Value::Null,
        LoroValue::Bool(b) => Value::Bool(*b),
        LoroValue::I64(i) => Value::from(*i),
        LoroValue::Double(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        LoroValue::String(s) => Value::String(s.to_string()),
        LoroValue::Binary(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        LoroValue::List(items) => Value::Array(items.iter().map(loro_to_json).collect()),
        LoroValue::Map(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.to_string(), loro_to_json(v)))
                .collect::<Map<String, Value>>(),
        ),
        LoroValue::Container(_) => Value::Null,
        #[allow(unreachable_patterns)]
        _ => Value::Null,
    }
}

/// Fill an attached, empty node map with `node`.
///
/// The subtree's keys must already have been checked.
fn write_node(map: &LoroMap, node: &Node) -> Result<(), SyncError> {
    for (key, value) in node.props() {
        map.insert(key.as_str(), json_to_loro(value))?;
    }
    match node {
        Node::Text(leaf) => {
            let text = map.insert_container(TEXT_KEY, LoroText::new())?;
            if !leaf.text.is_empty() {
                text.insert(0, &leaf.text)?;
            }
        }
        Node::Element(el) => {
            let children = map.insert_container(CHILDREN_KEY, LoroList::new())?;
            for (i, child) in el.children.iter().enumerate() {
                let child_map = children.insert_container(i, LoroMap::new())?;
                write_node(&child_map, child)?;
            }
        }
    }
    Ok(())
}

/// Insert `node` into `list` at `index` as a fresh node map.
pub(crate) fn insert_node(list: &LoroList, index: usize, node: &Node) -> Result<(), SyncError> {
    // Nothing is written unless the whole subtree can be.
    node.check_props()?;
    let map = list.insert_container(index, LoroMap::new())?;
    write_node(&map, node)
}

/// Read a node map into an editor node.
pub(crate) fn read_node(map: &LoroMap) -> Result<Node, SyncError> {
    value_to_node(&map.get_deep_value())
}

/// Convert a deep node value into an editor node.
pub(crate) fn value_to_node(value: &LoroValue) -> Result<Node, SyncError> {
    let LoroValue::Map(map) = value else {
        return Err(SyncError::mismatch("node is not a map"));
    };

    let props: Props = map
        .iter()
        .filter(|(k, _)| !is_reserved_key(k))
        .map(|(k, v)| (k.as_str().into(), loro_to_json(v)))
        .collect();

    if let Some(text) = map.get(TEXT_KEY) {
        let LoroValue::String(text) = text else {
            return Err(SyncError::mismatch("text leaf content is not a string"));
        };
        return Ok(Node::Text(TextLeaf {
            text: text.to_string(),
            props,
        }));
    }

    match map.get(CHILDREN_KEY) {
        Some(LoroValue::List(items)) => Ok(Node::Element(Element {
            props,
            children: items.iter().map(value_to_node).collect::<Result<_, _>>()?,
        })),
        Some(_) => Err(SyncError::mismatch("element children are not a list")),
        None => Err(SyncError::mismatch("node has neither text nor children")),
    }
}

/// Read the whole shared structure as a document.
pub(crate) fn read_document(root: &LoroList) -> Result<Document, SyncError> {
    let LoroValue::List(items) = root.get_deep_value() else {
        return Err(SyncError::mismatch("root is not a list"));
    };
    let children = items.iter().map(value_to_node).collect::<Result<_, _>>()?;
    Ok(Document::from_nodes(children))
}

fn as_map(item: Option<ValueOrContainer>) -> Option<LoroMap> {
    match item {
        Some(ValueOrContainer::Container(Container::Map(map))) => Some(map),
        _ => None,
    }
}

pub(crate) fn children_of(map: &LoroMap) -> Option<LoroList> {
    match map.get(CHILDREN_KEY) {
        Some(ValueOrContainer::Container(Container::List(list))) => Some(list),
        _ => None,
    }
}

pub(crate) fn text_of(map: &LoroMap) -> Option<LoroText> {
    match map.get(TEXT_KEY) {
        Some(ValueOrContainer::Container(Container::Text(text))) => Some(text),
        _ => None,
    }
}

/// Node map at `path`, resolved against the current state.
pub(crate) fn node_map(root: &LoroList, path: &Path) -> Result<LoroMap, SyncError> {
    let Some((&last, ancestors)) = path.as_slice().split_last() else {
        return Err(SyncError::invalid_path(path, "the root is not a node"));
    };
    let mut list = root.clone();
    for &idx in ancestors {
        let map = as_map(list.get(idx)).ok_or_else(|| SyncError::invalid_path(path, "no node"))?;
        list = children_of(&map)
            .ok_or_else(|| SyncError::invalid_path(path, "ancestor is not an element"))?;
    }
    as_map(list.get(last)).ok_or_else(|| SyncError::invalid_path(path, "no node"))
}

/// Children list of the node at `path`, or the root list for the root.
pub(crate) fn children_list(root: &LoroList, path: &Path) -> Result<LoroList, SyncError> {
    if path.is_root() {
        return Ok(root.clone());
    }
    let map = node_map(root, path)?;
    children_of(&map).ok_or_else(|| SyncError::invalid_path(path, "node is not an element"))
}

/// What part of a node a container holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Slot {
    /// The node map itself: its properties.
    Node,
    /// The node's children list (or the root list).
    Children,
    /// A text leaf's content.
    Text,
}

/// Where an attached container currently lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Location {
    pub path: Path,
    pub slot: Slot,
}

/// Index every attached container of the shared structure by id.
pub(crate) fn index_containers(root: &LoroList) -> HashMap<ContainerID, Location> {
    let mut index = HashMap::new();
    index.insert(
        root.id(),
        Location {
            path: Path::root(),
            slot: Slot::Children,
        },
    );
    index_children(root, &Path::root(), &mut index);
    index
}

fn index_children(list: &LoroList, parent: &Path, index: &mut HashMap<ContainerID, Location>) {
    for i in 0..list.len() {
        let Some(map) = as_map(list.get(i)) else {
            continue;
        };
        let path = parent.child(i);
        index.insert(
            map.id(),
            Location {
                path: path.clone(),
                slot: Slot::Node,
            },
        );
        if let Some(text) = text_of(&map) {
            index.insert(
                text.id(),
                Location {
                    path: path.clone(),
                    slot: Slot::Text,
                },
            );
        }
        if let Some(children) = children_of(&map) {
            index.insert(
                children.id(),
                Location {
                    path: path.clone(),
                    slot: Slot::Children,
                },
            );
            index_children(&children, &path, index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loro::LoroDoc;
    use serde_json::json;

    fn sample() -> Node {
        Node::element(vec![
            Node::text("hello ").with_prop("bold", true),
            Node::text("world").with_prop("size", 1.5),
        ])
        .with_prop("type", "paragraph")
        .with_prop("meta", json!({ "id": 7, "tags": ["a", null] }))
    }

    #[test]
    fn test_json_values_survive_loro() {
        for value in [
            json!(null),
            json!(true),
            json!(-3),
            json!(2.25),
            json!("text"),
            json!([1, "two", [3]]),
            json!({ "nested": { "k": false } }),
        ] {
            assert_eq!(loro_to_json(&json_to_loro(&value)), value);
        }
    }

    #[test]
    fn test_write_then_read_node() {
        let doc = LoroDoc::new();
        let root = doc.get_list("content");
        insert_node(&root, 0, &sample()).unwrap();
        doc.commit();

        let map = node_map(&root, &[0].into()).unwrap();
        assert_eq!(read_node(&map).unwrap(), sample());
        assert_eq!(
            read_document(&root).unwrap(),
            Document::from_nodes(vec![sample()])
        );
    }

    #[test]
    fn test_reserved_property_rejected() {
        let doc = LoroDoc::new();
        let root = doc.get_list("content");
        let node = Node::text("x").with_prop("children", 1);
        assert!(matches!(
            insert_node(&root, 0, &node),
            Err(SyncError::Editor(_))
        ));
        assert_eq!(root.len(), 0);
    }

    #[test]
    fn test_resolution_errors() {
        let doc = LoroDoc::new();
        let root = doc.get_list("content");
        insert_node(&root, 0, &sample()).unwrap();

        assert!(node_map(&root, &[0, 1].into()).is_ok());
        assert!(matches!(
            node_map(&root, &[1].into()),
            Err(SyncError::InvalidPath { .. })
        ));
        assert!(matches!(
            children_list(&root, &[0, 0].into()),
            Err(SyncError::InvalidPath { .. })
        ));
        assert!(matches!(
            node_map(&root, &Path::root()),
            Err(SyncError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_index_locates_containers() {
        let doc = LoroDoc::new();
        let root = doc.get_list("content");
        insert_node(&root, 0, &Node::text("first")).unwrap();
        insert_node(&root, 1, &sample()).unwrap();

        let index = index_containers(&root);
        let second = node_map(&root, &[1].into()).unwrap();
        let leaf = node_map(&root, &[1, 1].into()).unwrap();

        assert_eq!(index[&root.id()].slot, Slot::Children);
        assert_eq!(index[&second.id()].path, Path::from([1]));
        assert_eq!(
            index[&children_of(&second).unwrap().id()],
            Location {
                path: [1].into(),
                slot: Slot::Children
            }
        );
        assert_eq!(
            index[&text_of(&leaf).unwrap().id()],
            Location {
                path: [1, 1].into(),
                slot: Slot::Text
            }
        );
        // root + 4 node maps + 1 children list + 3 texts
        assert_eq!(index.len(), 9);
    }
}
