//! Wire records exchanged with the collaborative synchronization layer.
//!
//! An [Operation] is plain data, safe to JSON-serialize and transmit. Peers
//! must apply the operations of one batch in array order: later offsets are
//! computed assuming the earlier operations of the batch already shifted the
//! document.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::revision::RevisionKind;
use crate::model::tree::FieldKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Insert,
    Delete,
    Format,
    Update,
}

/// Sub-kind tag refining an operation for the peer's dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationSubtype {
    CharacterFormat,
    ParagraphFormat,
    SectionFormat,
    TableFormat,
    RowFormat,
    CellFormat,
    ListFormat,
    Paste,
    DropDown,
    Accept,
    Reject,
}

/// Structural metadata that must travel alongside an Insert/Format operation
/// so a remote peer can reconstruct non-text structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MarkerInfo {
    Bookmark {
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    Revision {
        id: Uuid,
        kind: RevisionKind,
        author: String,
        date: DateTime<Utc>,
        /// Revisions split across runs chain to the ids of their fragments.
        split_revisions: Vec<Uuid>,
    },
    Comment {
        id: Uuid,
        author: String,
    },
    #[serde(rename_all = "camelCase")]
    Field {
        kind: FieldKind,
    },
    EditRange {
        user: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub action: OperationKind,
    pub offset: usize,
    pub length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Serialized JSON format record, produced by the transfer-format writer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker_data: Option<MarkerInfo>,
    /// Serialized subtree for structural inserts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paste_content: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub subtype: Option<OperationSubtype>,
}

impl Operation {
    pub fn new(action: OperationKind, offset: usize, length: usize) -> Self {
        Self {
            action,
            offset,
            length,
            text: None,
            format: None,
            marker_data: None,
            paste_content: None,
            subtype: None,
        }
    }
}

/// LIFO side channel for marker descriptors. Markers are pushed in the order
/// their nodes are removed and popped in reverse while nodes are reinserted,
/// so the top of the stack always describes the next node to restore.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarkerStack {
    items: Vec<MarkerInfo>,
}

impl MarkerStack {
    pub fn push(&mut self, marker: MarkerInfo) {
        self.items.push(marker);
    }

    pub fn pop(&mut self) -> Option<MarkerInfo> {
        self.items.pop()
    }

    pub fn peek(&self) -> Option<&MarkerInfo> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// FIFO side channel for operations accumulated during multi-step structural
/// edits (each touched cell/row contributes one). Flushed front-to-back into
/// the final operation list so peer-side application order matches the order
/// cells were touched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OperationQueue {
    items: VecDeque<Operation>,
}

impl OperationQueue {
    pub fn push_back(&mut self, operation: Operation) {
        self.items.push_back(operation);
    }

    pub fn pop_front(&mut self) -> Option<Operation> {
        self.items.pop_front()
    }

    pub fn drain_into(&mut self, target: &mut Vec<Operation>) {
        while let Some(operation) = self.items.pop_front() {
            target.push(operation);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn operation_wire_shape_is_stable() {
        let mut operation = Operation::new(OperationKind::Insert, 4, 2);
        operation.text = Some("ab".into());
        let json = serde_json::to_value(&operation).unwrap();
        assert_eq!(json["action"], "Insert");
        assert_eq!(json["offset"], 4);
        assert_eq!(json["length"], 2);
        assert_eq!(json["text"], "ab");
        assert!(json.get("format").is_none());
        assert!(json.get("type").is_none());
    }

    #[test]
    fn queue_preserves_push_order_and_stack_reverses_it() {
        let mut queue = OperationQueue::default();
        queue.push_back(Operation::new(OperationKind::Format, 1, 1));
        queue.push_back(Operation::new(OperationKind::Format, 2, 1));
        let mut flushed = vec![];
        queue.drain_into(&mut flushed);
        assert_eq!(flushed[0].offset, 1);
        assert_eq!(flushed[1].offset, 2);

        let mut stack = MarkerStack::default();
        stack.push(MarkerInfo::Bookmark { name: "a".into() });
        stack.push(MarkerInfo::Bookmark { name: "b".into() });
        assert_eq!(stack.pop(), Some(MarkerInfo::Bookmark { name: "b".into() }));
    }
}
