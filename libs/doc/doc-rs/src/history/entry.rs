//! One record per undoable user action.
//!
//! An entry captures enough state to invert the action purely from tree
//! operations and, when collaborative editing is enabled, to synthesize the
//! absolute-offset operations describing it. Exactly one of
//! `modified_properties` / `removed_nodes` being non-empty decides which of
//! revert's two main branches applies; an entry never mixes both semantics.

use serde_json::Value;
use uuid::Uuid;

use crate::history::action::ActionKind;
use crate::history::properties::{
    FormatKind, ModifiedProperty, PropertyCursor, add_modified_properties,
};
use crate::history::stack::Direction;
use crate::model::offset_types::DocCharOffset;
use crate::model::position::{LogicalIndex, Selection, TextPosition};
use crate::model::revision::RevisionTracker;
use crate::model::tree::{DocumentTree, FieldKind, NodeId};
use crate::sync::operation::{MarkerStack, OperationQueue};

/// A captured piece of removed content: either a detached subtree snapshot
/// owned by the entry, or a lightweight descriptor for structure that can be
/// rebuilt from metadata alone.
#[derive(Clone, Debug, PartialEq)]
pub enum RemovedNode {
    Node(NodeId),
    Bookmark { name: String },
    EditRange { user: String },
    Field { kind: FieldKind },
}

pub struct HistoryEntry {
    pub action: ActionKind,

    // logical positions survive later tree mutations and are re-resolved on
    // every revert
    pub selection_start: Option<LogicalIndex>,
    pub selection_end: Option<LogicalIndex>,
    pub insert_position: Option<LogicalIndex>,
    pub end_position: Option<LogicalIndex>,

    // absolute offsets, only computed while collaborative editing is active;
    // deliberately not kept in sync, recomputed per use
    pub start_index: Option<DocCharOffset>,
    pub end_index: Option<DocCharOffset>,
    pub insert_index: Option<DocCharOffset>,
    pub header_footer_start: Option<DocCharOffset>,
    pub header_footer_end: Option<DocCharOffset>,

    pub removed_nodes: Vec<RemovedNode>,
    pub modified_properties: Vec<ModifiedProperty>,

    // side channels accumulated during multi-step structural edits
    pub marker_data: MarkerStack,
    pub cell_operations: OperationQueue,
    pub format_operations: OperationQueue,
    pub revision_operations: OperationQueue,

    pub end_revision_logical_index: Option<LogicalIndex>,
    pub revision_id: Option<Uuid>,

    pub insert_text: Option<String>,
    /// Name of the single format property a format entry changed.
    pub property_name: Option<String>,

    // structural anchors for table edits
    pub row_index: Option<usize>,
    pub cell_index: Option<usize>,
    pub structure_count: usize,

    destroyed: bool,
}

impl HistoryEntry {
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            selection_start: None,
            selection_end: None,
            insert_position: None,
            end_position: None,
            start_index: None,
            end_index: None,
            insert_index: None,
            header_footer_start: None,
            header_footer_end: None,
            removed_nodes: vec![],
            modified_properties: vec![],
            marker_data: MarkerStack::default(),
            cell_operations: OperationQueue::default(),
            format_operations: OperationQueue::default(),
            revision_operations: OperationQueue::default(),
            end_revision_logical_index: None,
            revision_id: None,
            insert_text: None,
            property_name: None,
            row_index: None,
            cell_index: None,
            structure_count: 0,
            destroyed: false,
        }
    }

    /// Snapshots the current selection as logical indexes. In collaborative
    /// mode also resolves absolute offsets, rounding table selections out to
    /// whole-cell boundaries first.
    pub fn update_selection(
        &mut self, tree: &DocumentTree, selection: Selection, collaborative: bool,
    ) {
        self.selection_start = tree.hierarchical_index(selection.start);
        self.selection_end = tree.hierarchical_index(selection.end);

        if collaborative {
            let (start, end) = update_table_selection(tree, selection);
            self.start_index = tree.absolute_offset(start);
            self.end_index = tree.absolute_offset(end);
        }
    }

    /// Enforces `start <= end` on the captured absolute offsets. Capture
    /// order follows selection direction; it is normalized here, not earlier.
    pub fn normalized_indexes(&self) -> Option<(DocCharOffset, DocCharOffset)> {
        let (start, end) = (self.start_index?, self.end_index?);
        if start > end { Some((end, start)) } else { Some((start, end)) }
    }

    pub fn add_modified_properties(
        &mut self, cursor: &mut PropertyCursor, direction: Direction, kind: FormatKind,
        live_snapshot: Value, property: Option<&str>, value: Value, current_len: Option<usize>,
    ) -> Value {
        add_modified_properties(
            &mut self.modified_properties,
            cursor,
            direction,
            kind,
            live_snapshot,
            property,
            value,
            current_len,
        )
    }

    /// Extends the captured selection end over adjacent runs that were later
    /// merged into the same in-progress revision. The extended index is used
    /// preferentially over the plain selection end.
    pub fn update_end_revision_info(&mut self, tree: &DocumentTree, tracker: &RevisionTracker) {
        let Some(revision_id) = self.revision_id else { return };
        let Some(end) = &self.end_position else { return };
        let Ok(position) = tree.text_pos_from_logical_index(end) else {
            warn!("end position no longer resolves; revision end not extended");
            return;
        };

        let Some((mut inline, _)) = tree.inline_at(position.paragraph, position.offset) else {
            return;
        };
        let mut offset = position.offset;
        while let Some(next) = tree.next_inline(inline) {
            if !tracker.is_marked_for_revision(tree, next, revision_id) {
                break;
            }
            offset += tree.inline_length(next).0;
            inline = next;
        }
        let extended = TextPosition { paragraph: position.paragraph, offset };
        self.end_revision_logical_index = tree.hierarchical_index(extended);
    }

    /// The logical end to revert to: the revision-extended index when one
    /// was computed, otherwise the plain captured end.
    pub fn effective_end_position(&self) -> Option<&LogicalIndex> {
        self.end_revision_logical_index.as_ref().or(self.end_position.as_ref())
    }

    /// Releases owned subtree snapshots back to the arena. Called when the
    /// entry is evicted from both stacks; safe exactly once.
    pub fn destroy(&mut self, tree: &mut DocumentTree) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        for removed in self.removed_nodes.drain(..) {
            if let RemovedNode::Node(id) = removed {
                tree.release_subtree(id);
            }
        }
        self.modified_properties.clear();
        self.marker_data.clear();
        self.cell_operations.clear();
        self.format_operations.clear();
        self.revision_operations.clear();
    }
}

/// Table selections are rounded out to whole-cell boundaries before offset
/// resolution: an endpoint inside a cell snaps to the first/last paragraph
/// of the covering cell.
pub fn update_table_selection(tree: &DocumentTree, selection: Selection) -> (TextPosition, TextPosition) {
    let mut start = selection.start;
    let mut end = selection.end;
    if let Some(cell) = tree.covering_cell(start.paragraph) {
        if let Some(snapped) = tree.start_position_of(cell) {
            start = snapped;
        }
    }
    if let Some(cell) = tree.covering_cell(end.paragraph) {
        if let Some(snapped) = tree.end_position_of(cell) {
            end = snapped;
        }
    }
    (start, end)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::format::CharacterFormat;

    #[test]
    fn normalization_swaps_backward_capture() {
        let mut entry = HistoryEntry::new(ActionKind::Delete);
        entry.start_index = Some(DocCharOffset(9));
        entry.end_index = Some(DocCharOffset(2));
        assert_eq!(entry.normalized_indexes(), Some((DocCharOffset(2), DocCharOffset(9))));
    }

    #[test]
    fn destroy_releases_snapshots_once() {
        let mut tree = DocumentTree::new();
        let run = tree.new_text_run("snapshot", CharacterFormat::default());
        let mut entry = HistoryEntry::new(ActionKind::BackSpace);
        entry.removed_nodes.push(RemovedNode::Node(run));

        entry.destroy(&mut tree);
        assert!(tree.node(run).is_none());
        assert!(entry.removed_nodes.is_empty());

        // second call is a no-op even though the id may have been reused
        let reused = tree.new_text_run("other", CharacterFormat::default());
        entry.destroy(&mut tree);
        assert!(tree.node(reused).is_some());
    }

    #[test]
    fn table_selection_rounds_out_to_whole_cells() {
        let mut tree = DocumentTree::new();
        let section = tree.sections[0];
        let table = tree.new_table(1, 2);
        tree.insert_block_at(section, 1, table);
        let row = tree.child_ids(table)[0];
        let first_cell = tree.child_ids(row)[0];
        let second_cell = tree.child_ids(row)[1];
        let first_para = tree.first_paragraph(first_cell).unwrap();
        let second_para = tree.first_paragraph(second_cell).unwrap();
        let run = tree.new_text_run("abc", CharacterFormat::default());
        tree.insert_inline_at(second_para, 0, run);

        let selection = Selection {
            start: TextPosition { paragraph: first_para, offset: 0 },
            end: TextPosition { paragraph: second_para, offset: 1 },
        };
        let (start, end) = update_table_selection(&tree, selection);
        assert_eq!(start, TextPosition { paragraph: first_para, offset: 0 });
        // snapped to the end of the covering cell's last paragraph
        assert_eq!(end, TextPosition { paragraph: second_para, offset: 3 });
    }
}
