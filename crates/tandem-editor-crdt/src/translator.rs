//! Resolved CRDT change events to editor operations.

use serde_json::Value;
use tandem_editor_core::{Document, Node, Operation, Path, Props, SmolStr};

use crate::SyncError;
use crate::event::{ChangeEvent, ListDelta, TextChange};

/// Translate resolved events into operations for `document`.
///
/// Events are consumed in order. Every generated operation is applied to a
/// working copy straight away, so later events see the effects of earlier
/// ones and removal payloads are read from the tree as it stands at that
/// point. A batch whose net effect leaves the document unchanged yields no
/// operations at all.
pub fn translate(events: &[ChangeEvent], document: &Document) -> Result<Vec<Operation>, SyncError> {
    let mut translation = Translation {
        working: document.clone(),
        ops: Vec::new(),
    };
    for event in events {
        match event {
            ChangeEvent::Children { path, delta } => translation.children(path, delta)?,
            ChangeEvent::Text { path, delta } => translation.text(path, delta)?,
            ChangeEvent::Props { path, changes } => translation.props(path, changes)?,
        }
    }

    if translation.working == *document {
        if !translation.ops.is_empty() {
            tracing::debug!(ops = translation.ops.len(), "batch nets to no change, dropping");
        }
        return Ok(Vec::new());
    }
    Ok(translation.ops)
}

struct Translation {
    working: Document,
    ops: Vec<Operation>,
}

impl Translation {
    fn push(&mut self, op: Operation) -> Result<(), SyncError> {
        self.working
            .apply(&op)
            .map_err(|e| SyncError::mismatch(format!("{} does not apply: {e}", op.kind())))?;
        self.ops.push(op);
        Ok(())
    }

    fn children(&mut self, path: &Path, delta: &[ListDelta]) -> Result<(), SyncError> {
        if self.working.children_at(path).is_none() {
            return Err(SyncError::mismatch(format!("no element at {path}")));
        }
        let mut cursor = 0;
        for step in delta {
            match step {
                ListDelta::Retain(n) => cursor += n,
                ListDelta::Insert(nodes) => {
                    for node in nodes {
                        self.push(Operation::InsertNode {
                            path: path.child(cursor),
                            node: node.clone(),
                        })?;
                        cursor += 1;
                    }
                }
                ListDelta::Delete(n) => {
                    for _ in 0..*n {
                        let target = path.child(cursor);
                        let node = self.working.node(&target).cloned().ok_or_else(|| {
                            SyncError::mismatch(format!("no node to remove at {target}"))
                        })?;
                        self.push(Operation::RemoveNode { path: target, node })?;
                    }
                }
            }
        }
        Ok(())
    }

    fn text(&mut self, path: &Path, delta: &[TextChange]) -> Result<(), SyncError> {
        let mut cursor = 0;
        for step in delta {
            match step {
                TextChange::Retain(n) => cursor += n,
                TextChange::Insert(text) => {
                    self.push(Operation::InsertText {
                        path: path.clone(),
                        offset: cursor,
                        text: text.clone(),
                    })?;
                    cursor += text.chars().count();
                }
                TextChange::Delete(n) => {
                    let current = match self.working.node(path) {
                        Some(Node::Text(leaf)) => &leaf.text,
                        _ => return Err(SyncError::mismatch(format!("no text leaf at {path}"))),
                    };
                    let text: String = current.chars().skip(cursor).take(*n).collect();
                    if text.chars().count() != *n {
                        return Err(SyncError::mismatch(format!(
                            "text delete past end of leaf at {path}"
                        )));
                    }
                    self.push(Operation::RemoveText {
                        path: path.clone(),
                        offset: cursor,
                        text,
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Only keys whose value actually changed end up in the operation.
    fn props(
        &mut self,
        path: &Path,
        changes: &[(SmolStr, Option<Value>)],
    ) -> Result<(), SyncError> {
        let node = self
            .working
            .node(path)
            .ok_or_else(|| SyncError::mismatch(format!("property change on missing node {path}")))?;

        let mut properties = Props::new();
        let mut new_properties = Props::new();
        for (key, value) in changes {
            let old = node.props().get(key);
            match value {
                Some(value) if old == Some(value) => {}
                Some(value) => {
                    new_properties.insert(key.clone(), value.clone());
                    if let Some(old) = old {
                        properties.insert(key.clone(), old.clone());
                    }
                }
                None => {
                    if let Some(old) = old {
                        properties.insert(key.clone(), old.clone());
                    }
                }
            }
        }

        if properties.is_empty() && new_properties.is_empty() {
            return Ok(());
        }
        self.push(Operation::SetNode {
            path: path.clone(),
            properties,
            new_properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn letters() -> Document {
        Document::from_nodes(vec![Node::text("a"), Node::text("b"), Node::text("c")])
    }

    fn applied(document: &Document, ops: &[Operation]) -> Document {
        let mut out = document.clone();
        for op in ops {
            out.apply(op).unwrap();
        }
        out
    }

    #[test]
    fn test_list_delta_positions_follow_earlier_steps() {
        let document = letters();
        let events = vec![ChangeEvent::Children {
            path: Path::root(),
            delta: vec![
                ListDelta::Retain(1),
                ListDelta::Delete(1),
                ListDelta::Insert(vec![Node::text("x"), Node::text("y")]),
            ],
        }];

        let ops = translate(&events, &document).unwrap();
        assert_eq!(
            ops,
            vec![
                Operation::RemoveNode {
                    path: [1].into(),
                    node: Node::text("b"),
                },
                Operation::InsertNode {
                    path: [1].into(),
                    node: Node::text("x"),
                },
                Operation::InsertNode {
                    path: [2].into(),
                    node: Node::text("y"),
                },
            ]
        );
        assert_eq!(applied(&document, &ops).text_content(), "a\nx\ny\nc");
    }

    #[test]
    fn test_text_delta() {
        let document = Document::from_nodes(vec![Node::element(vec![Node::text("hello")])]);
        let events = vec![ChangeEvent::Text {
            path: [0, 0].into(),
            delta: vec![
                TextChange::Retain(1),
                TextChange::Delete(3),
                TextChange::Insert("ipp".into()),
            ],
        }];

        let ops = translate(&events, &document).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops[0],
            Operation::RemoveText {
                path: [0, 0].into(),
                offset: 1,
                text: "ell".into(),
            }
        );
        assert_eq!(applied(&document, &ops).text_content(), "hippo");
    }

    #[test]
    fn test_property_change_is_minimal() {
        let document = Document::from_nodes(vec![
            Node::text("x")
                .with_prop("bold", true)
                .with_prop("color", "red")
                .with_prop("size", 2),
        ]);
        let events = vec![ChangeEvent::Props {
            path: [0].into(),
            changes: vec![
                ("bold".into(), Some(json!(true))),
                ("color".into(), Some(json!("blue"))),
                ("size".into(), None),
                ("italic".into(), Some(json!(true))),
            ],
        }];

        let ops = translate(&events, &document).unwrap();
        assert_eq!(
            ops,
            vec![Operation::SetNode {
                path: [0].into(),
                properties: [("color".into(), json!("red")), ("size".into(), json!(2))].into(),
                new_properties: [("color".into(), json!("blue")), ("italic".into(), json!(true))]
                    .into(),
            }]
        );
    }

    #[test]
    fn test_unchanged_properties_produce_nothing() {
        let document = Document::from_nodes(vec![Node::text("x").with_prop("bold", true)]);
        let events = vec![ChangeEvent::Props {
            path: [0].into(),
            changes: vec![("bold".into(), Some(json!(true))), ("gone".into(), None)],
        }];
        assert!(translate(&events, &document).unwrap().is_empty());
    }

    #[test]
    fn test_zero_effect_collapses() {
        let document = letters();
        let events = vec![
            ChangeEvent::Children {
                path: Path::root(),
                delta: vec![ListDelta::Insert(vec![Node::text("tmp")])],
            },
            ChangeEvent::Children {
                path: Path::root(),
                delta: vec![ListDelta::Delete(1)],
            },
        ];
        assert!(translate(&events, &document).unwrap().is_empty());
    }

    #[test]
    fn test_nested_events_after_structural_change() {
        let document = Document::from_nodes(vec![Node::element(vec![Node::text("old")])]);
        let events = vec![
            ChangeEvent::Children {
                path: Path::root(),
                delta: vec![ListDelta::Insert(vec![Node::text("first")])],
            },
            ChangeEvent::Text {
                path: [1, 0].into(),
                delta: vec![TextChange::Retain(3), TextChange::Insert("er".into())],
            },
        ];

        let ops = translate(&events, &document).unwrap();
        assert_eq!(applied(&document, &ops).text_content(), "first\nolder");
    }

    #[test]
    fn test_mismatched_structure() {
        let document = Document::from_nodes(vec![Node::element(vec![])]);
        let text_on_element = vec![ChangeEvent::Text {
            path: [0].into(),
            delta: vec![TextChange::Insert("x".into())],
        }];
        assert!(matches!(
            translate(&text_on_element, &document),
            Err(SyncError::TranslationMismatch(_))
        ));

        let delete_past_end = vec![ChangeEvent::Children {
            path: [0].into(),
            delta: vec![ListDelta::Delete(1)],
        }];
        assert!(matches!(
            translate(&delete_past_end, &document),
            Err(SyncError::TranslationMismatch(_))
        ));

        let unknown_node = vec![ChangeEvent::Props {
            path: [4].into(),
            changes: vec![("k".into(), Some(json!(1)))],
        }];
        assert!(matches!(
            translate(&unknown_node, &document),
            Err(SyncError::TranslationMismatch(_))
        ));
    }
}
