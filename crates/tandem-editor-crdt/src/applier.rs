//! Editor operations to CRDT mutations.
//!
//! A batch is applied in one Loro transaction. Each operation resolves its
//! path against the live state, which already contains the effects of the
//! earlier operations of the same batch.

use loro::{LoroList, LoroText};
use tandem_editor_core::{EditorError, Node, Operation, Path, Props, is_reserved_key};

use crate::SyncError;
use crate::convert::{
    children_list, children_of, insert_node, json_to_loro, node_map, read_node, text_of,
};
use crate::doc::SyncDoc;

/// Apply `ops` to the shared tree and commit them as one transaction tagged
/// with `origin`.
///
/// Selection operations are skipped; a batch with nothing else does not
/// commit at all. On the first failing operation the rest of the batch is
/// abandoned, the operations before it are still committed, and the error
/// carries the failing operation's index. Returns the number of operations
/// applied.
pub fn apply_operations(doc: &SyncDoc, ops: &[Operation], origin: &str) -> Result<usize, SyncError> {
    if ops.iter().all(Operation::is_selection) {
        return Ok(0);
    }

    let mut applied = 0;
    let mut failure = None;
    for (index, op) in ops.iter().enumerate() {
        if op.is_selection() {
            continue;
        }
        if let Err(e) = apply_operation(doc.root(), op) {
            tracing::error!(index, kind = op.kind(), path = ?op.path(), "aborting batch: {e}");
            failure = Some(e.at_operation(index));
            break;
        }
        tracing::trace!(index, kind = op.kind(), "applied to CRDT");
        applied += 1;
    }

    doc.commit_as(origin);
    tracing::debug!(applied, total = ops.len(), origin, "committed CRDT transaction");

    match failure {
        Some(e) => Err(e),
        None => Ok(applied),
    }
}

fn apply_operation(root: &LoroList, op: &Operation) -> Result<(), SyncError> {
    match op {
        Operation::InsertNode { path, node } => insert_at(root, path, node),
        Operation::RemoveNode { path, .. } => remove(root, path),
        Operation::InsertText { path, offset, text } => {
            let content = leaf_text(root, path)?;
            check_range(&content, path, *offset)?;
            content.insert(*offset, text)?;
            Ok(())
        }
        Operation::RemoveText { path, offset, text } => {
            let content = leaf_text(root, path)?;
            let len = text.chars().count();
            let end = offset.checked_add(len).unwrap_or(usize::MAX);
            check_range(&content, path, end)?;
            content.delete(*offset, len)?;
            Ok(())
        }
        Operation::SetNode {
            path,
            properties,
            new_properties,
        } => {
            check_keys(properties)?;
            check_keys(new_properties)?;
            let map = node_map(root, path)?;
            for (key, value) in new_properties {
                map.insert(key.as_str(), json_to_loro(value))?;
            }
            for key in properties.keys() {
                if !new_properties.contains_key(key) {
                    map.delete(key.as_str())?;
                }
            }
            Ok(())
        }
        Operation::MoveNode { path, new_path } => {
            if path.is_ancestor_of(new_path) {
                return Err(EditorError::MoveIntoSelf {
                    from: path.clone(),
                    to: new_path.clone(),
                }
                .into());
            }
            let node = read_node(&node_map(root, path)?)?;
            if path == new_path {
                return Ok(());
            }
            let target = path
                .transform(op)
                .ok_or_else(|| SyncError::invalid_path(new_path, "move target vanished"))?;
            remove(root, path)?;
            if let Err(e) = insert_at(root, &target, &node) {
                // Put it back so a failed move leaves the tree untouched.
                insert_at(root, path, &node)?;
                return Err(e);
            }
            Ok(())
        }
        Operation::MergeNode { path, .. } => {
            let prev_path = path
                .previous()
                .ok_or_else(|| SyncError::invalid_path(path, "no previous sibling to merge into"))?;
            let prev = node_map(root, &prev_path)?;
            let node = read_node(&node_map(root, path)?)?;
            match node {
                Node::Text(leaf) => {
                    let target = text_of(&prev).ok_or(EditorError::MismatchedNodes(path.clone()))?;
                    if !leaf.text.is_empty() {
                        target.insert(target.len_unicode(), &leaf.text)?;
                    }
                }
                Node::Element(el) => {
                    let target =
                        children_of(&prev).ok_or(EditorError::MismatchedNodes(path.clone()))?;
                    let at = target.len();
                    for (i, child) in el.children.iter().enumerate() {
                        insert_node(&target, at + i, child)?;
                    }
                }
            }
            remove(root, path)
        }
        Operation::SplitNode {
            path,
            position,
            properties,
        } => {
            check_keys(properties)?;
            let map = node_map(root, path)?;
            let mut right = read_node(&map)?;
            right
                .props_mut()
                .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));

            match &mut right {
                Node::Text(leaf) => {
                    let content = text_of(&map)
                        .ok_or_else(|| SyncError::invalid_path(path, "node is not a text leaf"))?;
                    check_range(&content, path, *position)?;
                    leaf.text = leaf.text.chars().skip(*position).collect();
                    let tail = content.len_unicode() - position;
                    if tail > 0 {
                        content.delete(*position, tail)?;
                    }
                }
                Node::Element(el) => {
                    let children = children_of(&map)
                        .ok_or_else(|| SyncError::invalid_path(path, "node is not an element"))?;
                    if *position > children.len() {
                        return Err(EditorError::OffsetOutOfRange {
                            path: path.clone(),
                            offset: *position,
                            len: children.len(),
                        }
                        .into());
                    }
                    el.children.drain(..*position);
                    let tail = children.len() - position;
                    if tail > 0 {
                        children.delete(*position, tail)?;
                    }
                }
            }

            insert_at(root, &path.next(), &right)
        }
        Operation::SetSelection { .. } => Ok(()),
    }
}

/// The list holding the node at `path`, and the node's index in it.
fn parent_list(root: &LoroList, path: &Path) -> Result<(LoroList, usize), SyncError> {
    match (path.parent(), path.last()) {
        (Some(parent), Some(index)) => Ok((children_list(root, &parent)?, index)),
        _ => Err(SyncError::invalid_path(path, "the root cannot be addressed")),
    }
}

fn insert_at(root: &LoroList, path: &Path, node: &Node) -> Result<(), SyncError> {
    let (list, index) = parent_list(root, path)?;
    if index > list.len() {
        return Err(SyncError::invalid_path(path, "index past end of parent"));
    }
    insert_node(&list, index, node)
}

fn remove(root: &LoroList, path: &Path) -> Result<(), SyncError> {
    let (list, index) = parent_list(root, path)?;
    if index >= list.len() {
        return Err(SyncError::invalid_path(path, "no node to remove"));
    }
    list.delete(index, 1)?;
    Ok(())
}

fn leaf_text(root: &LoroList, path: &Path) -> Result<LoroText, SyncError> {
    text_of(&node_map(root, path)?)
        .ok_or_else(|| SyncError::invalid_path(path, "node is not a text leaf"))
}

fn check_range(content: &LoroText, path: &Path, end: usize) -> Result<(), SyncError> {
    let len = content.len_unicode();
    if end > len {
        return Err(EditorError::OffsetOutOfRange {
            path: path.clone(),
            offset: end,
            len,
        }
        .into());
    }
    Ok(())
}

fn check_keys(props: &Props) -> Result<(), SyncError> {
    match props.keys().find(|k| is_reserved_key(k)) {
        Some(key) => Err(EditorError::ReservedProperty(key.to_string()).into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tandem_editor_core::{Document, Point, Selection};

    use super::*;
    use crate::SyncConfig;

    fn seeded() -> (SyncDoc, Document) {
        let document = Document::from_nodes(vec![
            Node::element(vec![Node::text("hello"), Node::text(" world")])
                .with_prop("type", "paragraph"),
            Node::element(vec![Node::text("second")]).with_prop("type", "quote"),
        ]);
        let doc = SyncDoc::new(&SyncConfig::default()).unwrap();
        doc.load_document(&document, "seed").unwrap();
        doc.take_observed();
        (doc, document)
    }

    /// Apply `ops` on both sides and check the trees agree.
    fn assert_mirrors(ops: Vec<Operation>) {
        let (doc, mut document) = seeded();
        for op in &ops {
            document.apply(op).unwrap();
        }
        apply_operations(&doc, &ops, "test").unwrap();
        assert_eq!(doc.to_document().unwrap(), document);
    }

    #[test]
    fn test_sequential_inserts_resolve_against_live_state() {
        assert_mirrors(vec![
            Operation::InsertNode {
                path: [0].into(),
                node: Node::text("A"),
            },
            Operation::InsertNode {
                path: [0].into(),
                node: Node::text("B"),
            },
        ]);
    }

    #[test]
    fn test_text_and_properties() {
        assert_mirrors(vec![
            Operation::InsertText {
                path: [0, 0].into(),
                offset: 5,
                text: ", there".into(),
            },
            Operation::RemoveText {
                path: [1, 0].into(),
                offset: 0,
                text: "sec".into(),
            },
            Operation::SetNode {
                path: [0].into(),
                properties: [("type".into(), json!("paragraph"))].into(),
                new_properties: [("align".into(), json!("center"))].into(),
            },
        ]);
    }

    #[test]
    fn test_move_split_merge() {
        assert_mirrors(vec![
            Operation::MoveNode {
                path: [0, 1].into(),
                new_path: [1, 0].into(),
            },
            Operation::SplitNode {
                path: [1, 1].into(),
                position: 3,
                properties: Props::new(),
            },
            Operation::SplitNode {
                path: [1].into(),
                position: 1,
                properties: [("type".into(), json!("heading"))].into(),
            },
            Operation::MergeNode {
                path: [2, 1].into(),
                position: 3,
                properties: Props::new(),
            },
        ]);
    }

    #[test]
    fn test_invalid_path_commits_prefix() {
        let (doc, _) = seeded();
        let ops = vec![
            Operation::InsertNode {
                path: [2].into(),
                node: Node::text("kept"),
            },
            Operation::RemoveNode {
                path: [9].into(),
                node: Node::text("missing"),
            },
            Operation::InsertNode {
                path: [0].into(),
                node: Node::text("dropped"),
            },
        ];
        let err = apply_operations(&doc, &ops, "test").unwrap_err();
        assert!(matches!(err, SyncError::InvalidPath { index: 1, .. }));

        let document = doc.to_document().unwrap();
        assert_eq!(document.children.len(), 3);
        assert_eq!(document.children[2].as_text(), Some("kept"));
        assert_eq!(doc.take_observed().len(), 1);
    }

    #[test]
    fn test_reserved_key_insert_leaves_tree_readable() {
        let (doc, document) = seeded();
        let ops = vec![
            Operation::InsertText {
                path: [1, 0].into(),
                offset: 0,
                text: "the ".into(),
            },
            Operation::InsertNode {
                path: [0].into(),
                node: Node::element(vec![
                    Node::text("x").with_prop("aaa", 1).with_prop("text", 2),
                ]),
            },
        ];
        let err = apply_operations(&doc, &ops, "test").unwrap_err();
        assert!(matches!(
            err,
            SyncError::Editor(EditorError::ReservedProperty(ref key)) if key == "text"
        ));

        let mut expected = document;
        expected.apply(&ops[0]).unwrap();
        assert_eq!(doc.to_document().unwrap(), expected);
        assert_eq!(doc.root().len(), 2);
    }

    #[test]
    fn test_remove_text_near_usize_max_is_out_of_range() {
        let (doc, document) = seeded();
        let ops = vec![Operation::RemoveText {
            path: [0, 0].into(),
            offset: usize::MAX - 1,
            text: "abc".into(),
        }];
        let err = apply_operations(&doc, &ops, "test").unwrap_err();
        assert!(matches!(
            err,
            SyncError::Editor(EditorError::OffsetOutOfRange { offset: usize::MAX, .. })
        ));
        assert_eq!(doc.to_document().unwrap(), document);
    }

    #[test]
    fn test_selection_only_batch_is_not_committed() {
        let (doc, _) = seeded();
        let ops = vec![Operation::SetSelection {
            selection: Some(Selection::collapsed(Point::new([0, 0], 1))),
        }];
        assert_eq!(apply_operations(&doc, &ops, "test").unwrap(), 0);
        assert!(!doc.has_observed());
    }

    #[test]
    fn test_move_into_descendant_rejected() {
        let (doc, document) = seeded();
        let ops = vec![Operation::MoveNode {
            path: [0].into(),
            new_path: [0, 1].into(),
        }];
        let err = apply_operations(&doc, &ops, "test").unwrap_err();
        assert!(matches!(err, SyncError::Editor(EditorError::MoveIntoSelf { .. })));
        assert_eq!(doc.to_document().unwrap(), document);
    }
}
