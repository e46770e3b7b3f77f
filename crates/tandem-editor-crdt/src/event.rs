//! Observed CRDT changes and their resolution into path-addressed events.
//!
//! Loro hands its observer borrowed diffs. The observer copies them into an
//! owned [`ObservedBatch`] (one per commit or import) without touching the
//! document state. Once the commit has returned, the batch is resolved
//! against the committed state into [`ChangeEvent`]s addressed by node path,
//! which is what the translator consumes.

use std::collections::HashMap;
use std::fmt;

use loro::event::{ContainerDiff, Diff, DiffEvent, ListDiffItem};
use loro::{
    Container, ContainerID, ContainerTrait, EventTriggerKind, LoroList, LoroValue, TextDelta,
    ValueOrContainer,
};
use serde_json::Value;
use smol_str::SmolStr;
use tandem_editor_core::{Node, Path, is_reserved_key};

use crate::SyncError;
use crate::convert::{Location, Slot, index_containers, loro_to_json, node_map, read_node};

/// What produced an observed batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// A transaction committed on this document.
    Local,
    /// Update bytes imported from elsewhere.
    Import,
    /// A checkout to another version.
    Checkout,
}

impl From<EventTriggerKind> for Trigger {
    fn from(kind: EventTriggerKind) -> Self {
        match kind {
            EventTriggerKind::Local => Trigger::Local,
            EventTriggerKind::Import => Trigger::Import,
            EventTriggerKind::Checkout => Trigger::Checkout,
            #[allow(unreachable_patterns)]
            _ => Trigger::Import,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::Local => "local",
            Trigger::Import => "import",
            Trigger::Checkout => "checkout",
        };
        f.write_str(name)
    }
}

/// All container diffs of one commit or import, in emission order.
#[derive(Clone, Debug)]
pub struct ObservedBatch {
    /// Sequence number, unique per document.
    pub seq: u64,
    /// Origin tag of the transaction, empty for untagged ones.
    pub origin: SmolStr,
    pub trigger: Trigger,
    pub(crate) diffs: Vec<ObservedDiff>,
}

#[derive(Clone, Debug)]
pub(crate) struct ObservedDiff {
    pub target: ContainerID,
    pub delta: ObservedDelta,
}

#[derive(Clone, Debug)]
pub(crate) enum ObservedDelta {
    List(Vec<ListChange>),
    Text(Vec<TextChange>),
    Map(Vec<(SmolStr, Option<LoroValue>)>),
}

#[derive(Clone, Debug)]
pub(crate) enum ListChange {
    Retain(usize),
    Insert(Vec<Inserted>),
    Delete(usize),
}

/// An inserted list item, by id only; its content is read after the commit.
#[derive(Clone, Debug)]
pub(crate) enum Inserted {
    Node(ContainerID),
    Other,
}

impl ObservedBatch {
    pub(crate) fn from_event(seq: u64, event: &DiffEvent<'_>) -> Self {
        Self {
            seq,
            origin: SmolStr::new(event.origin),
            trigger: event.triggered_by.into(),
            diffs: event
                .events
                .iter()
                .filter_map(ObservedDiff::from_container_diff)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    /// Append the diffs of a later batch, so both resolve as one.
    pub(crate) fn absorb(&mut self, later: ObservedBatch) {
        self.diffs.extend(later.diffs);
    }
}

impl ObservedDiff {
    fn from_container_diff(diff: &ContainerDiff<'_>) -> Option<Self> {
        let delta = match &diff.diff {
            Diff::List(items) => ObservedDelta::List(
                items
                    .iter()
                    .map(|item| match item {
                        ListDiffItem::Insert { insert, .. } => {
                            ListChange::Insert(insert.iter().map(Inserted::from).collect())
                        }
                        ListDiffItem::Delete { delete } => ListChange::Delete(*delete),
                        ListDiffItem::Retain { retain } => ListChange::Retain(*retain),
                    })
                    .collect(),
            ),
            Diff::Text(deltas) => ObservedDelta::Text(
                deltas
                    .iter()
                    .map(|delta| match delta {
                        TextDelta::Retain { retain, .. } => TextChange::Retain(*retain),
                        TextDelta::Insert { insert, .. } => TextChange::Insert(insert.clone()),
                        TextDelta::Delete { delete } => TextChange::Delete(*delete),
                    })
                    .collect(),
            ),
            Diff::Map(map) => ObservedDelta::Map(
                map.updated
                    .iter()
                    .filter_map(|(key, value)| {
                        let key = SmolStr::new(key.to_string());
                        match value {
                            Some(ValueOrContainer::Value(v)) => Some((key, Some(v.clone()))),
                            // Containers under a node are its structure, not properties.
                            Some(ValueOrContainer::Container(_)) => None,
                            None => Some((key, None)),
                        }
                    })
                    .collect(),
            ),
            _ => {
                tracing::trace!("ignoring unsupported diff on {}", diff.target);
                return None;
            }
        };
        Some(Self {
            target: diff.target.clone(),
            delta,
        })
    }
}

impl From<&ValueOrContainer> for Inserted {
    fn from(item: &ValueOrContainer) -> Self {
        match item {
            ValueOrContainer::Container(Container::Map(map)) => Inserted::Node(map.id()),
            _ => Inserted::Other,
        }
    }
}

/// One step of a children-list delta.
#[derive(Clone, Debug, PartialEq)]
pub enum ListDelta {
    Retain(usize),
    Insert(Vec<Node>),
    Delete(usize),
}

/// One step of a text delta, in chars.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextChange {
    Retain(usize),
    Insert(String),
    Delete(usize),
}

/// A CRDT change addressed by node path.
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeEvent {
    /// Children of the node at `path` (the top-level nodes for the root).
    Children { path: Path, delta: Vec<ListDelta> },
    /// Content of the text leaf at `path`.
    Text { path: Path, delta: Vec<TextChange> },
    /// Properties of the node at `path`. `None` removes the key.
    Props {
        path: Path,
        changes: Vec<(SmolStr, Option<Value>)>,
    },
}

impl ChangeEvent {
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Children { path, .. }
            | ChangeEvent::Text { path, .. }
            | ChangeEvent::Props { path, .. } => path,
        }
    }
}

/// Resolve a batch against the committed state of `root`.
///
/// Diffs on detached containers are dropped, as are diffs inside subtrees
/// inserted by the same batch (the insert already carries their content).
/// The result is ordered shallowest first, stable within a depth.
pub(crate) fn resolve(root: &LoroList, batch: &ObservedBatch) -> Result<Vec<ChangeEvent>, SyncError> {
    let index = index_containers(root);

    let inserted: Vec<&Path> = batch
        .diffs
        .iter()
        .filter_map(|diff| match &diff.delta {
            ObservedDelta::List(changes) => Some(changes),
            _ => None,
        })
        .flatten()
        .filter_map(|change| match change {
            ListChange::Insert(items) => Some(items),
            _ => None,
        })
        .flatten()
        .filter_map(|item| match item {
            Inserted::Node(id) => index.get(id).map(|loc| &loc.path),
            Inserted::Other => None,
        })
        .collect();

    let mut events = Vec::with_capacity(batch.diffs.len());
    for diff in &batch.diffs {
        let Some(location) = index.get(&diff.target) else {
            tracing::debug!(seq = batch.seq, "dropping diff on detached container {}", diff.target);
            continue;
        };
        let within_insert = inserted
            .iter()
            .any(|p| **p == location.path || p.is_ancestor_of(&location.path));
        if within_insert {
            continue;
        }
        events.push(resolve_diff(root, &index, location, diff)?);
    }

    events.sort_by_key(|event| event.path().len());
    for event in &events {
        tracing::trace!(seq = batch.seq, "resolved {:?}", event);
    }
    Ok(events)
}

fn resolve_diff(
    root: &LoroList,
    index: &HashMap<ContainerID, Location>,
    location: &Location,
    diff: &ObservedDiff,
) -> Result<ChangeEvent, SyncError> {
    let path = location.path.clone();
    match (&diff.delta, location.slot) {
        (ObservedDelta::List(changes), Slot::Children) => {
            let mut delta = Vec::with_capacity(changes.len());
            for change in changes {
                delta.push(match change {
                    ListChange::Retain(n) => ListDelta::Retain(*n),
                    ListChange::Delete(n) => ListDelta::Delete(*n),
                    ListChange::Insert(items) => {
                        let nodes = items
                            .iter()
                            .map(|item| inserted_node(root, index, item))
                            .collect::<Result<_, _>>()?;
                        ListDelta::Insert(nodes)
                    }
                });
            }
            Ok(ChangeEvent::Children { path, delta })
        }
        (ObservedDelta::Text(changes), Slot::Text) => Ok(ChangeEvent::Text {
            path,
            delta: changes.clone(),
        }),
        (ObservedDelta::Map(updates), Slot::Node) => Ok(ChangeEvent::Props {
            path,
            changes: updates
                .iter()
                .filter(|(key, _)| !is_reserved_key(key))
                .map(|(key, value)| (key.clone(), value.as_ref().map(loro_to_json)))
                .collect(),
        }),
        (_, slot) => Err(SyncError::mismatch(format!(
            "diff kind does not match {slot:?} container at {path}"
        ))),
    }
}

fn inserted_node(
    root: &LoroList,
    index: &HashMap<ContainerID, Location>,
    item: &Inserted,
) -> Result<Node, SyncError> {
    let Inserted::Node(id) = item else {
        return Err(SyncError::mismatch("inserted list item is not a node"));
    };
    match index.get(id) {
        Some(location) => read_node(&node_map(root, &location.path)?),
        // Gone by the end of the batch, so a later delete in the same batch
        // removes it again. Its content never becomes visible.
        None => {
            tracing::trace!("inserted node {id} was removed in the same batch");
            Ok(Node::element(Vec::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tandem_editor_core::{Document, Operation, Props};

    use super::*;
    use crate::{SyncConfig, SyncDoc, apply_operations};

    fn doc_with(nodes: Vec<Node>) -> SyncDoc {
        let doc = SyncDoc::new(&SyncConfig::default()).unwrap();
        doc.load_document(&Document::from_nodes(nodes), "seed").unwrap();
        doc.take_observed();
        doc
    }

    fn resolve_ops(doc: &SyncDoc, ops: &[Operation]) -> Vec<ChangeEvent> {
        apply_operations(doc, ops, "test").unwrap();
        let batches = doc.take_observed();
        assert_eq!(batches.len(), 1);
        doc.resolve(&batches[0]).unwrap()
    }

    #[test]
    fn test_inserted_subtree_is_one_event() {
        let doc = doc_with(vec![Node::text("a")]);
        let node = Node::element(vec![Node::text("x"), Node::text("y")]).with_prop("k", 1);
        let events = resolve_ops(
            &doc,
            &[Operation::InsertNode {
                path: [1].into(),
                node: node.clone(),
            }],
        );

        assert_eq!(
            events,
            vec![ChangeEvent::Children {
                path: Path::root(),
                delta: vec![ListDelta::Retain(1), ListDelta::Insert(vec![node])],
            }]
        );
    }

    #[test]
    fn test_text_and_props_resolve_to_paths() {
        let doc = doc_with(vec![Node::element(vec![Node::text("abc")])]);
        let events = resolve_ops(
            &doc,
            &[
                Operation::InsertText {
                    path: [0, 0].into(),
                    offset: 3,
                    text: "d".into(),
                },
                Operation::SetNode {
                    path: [0].into(),
                    properties: Props::new(),
                    new_properties: [("align".into(), json!("left"))].into(),
                },
            ],
        );

        // Shallowest first regardless of emission order.
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            ChangeEvent::Props {
                path: [0].into(),
                changes: vec![("align".into(), Some(json!("left")))],
            }
        );
        assert_eq!(
            events[1],
            ChangeEvent::Text {
                path: [0, 0].into(),
                delta: vec![TextChange::Retain(3), TextChange::Insert("d".into())],
            }
        );
    }

    #[test]
    fn test_removed_property_resolves_to_none() {
        let doc = doc_with(vec![Node::text("a").with_prop("bold", true)]);
        let events = resolve_ops(
            &doc,
            &[Operation::SetNode {
                path: [0].into(),
                properties: [("bold".into(), json!(true))].into(),
                new_properties: Props::new(),
            }],
        );
        assert_eq!(
            events,
            vec![ChangeEvent::Props {
                path: [0].into(),
                changes: vec![("bold".into(), None)],
            }]
        );
    }
}
