//! The editing facade: applies user actions to the document tree, captures
//! history entries for them, and (in collaborative mode) hands the captured
//! entries to the operation builder.
//!
//! Everything here runs on one logical thread as a direct call chain from a
//! user action; there are no suspension points and no background work.

use serde_json::{Value, json};
use uuid::Uuid;

use crate::history::action::{
    ActionKind, cell_property_name, row_property_name, table_property_name,
};
use crate::history::entry::{HistoryEntry, RemovedNode};
use crate::history::properties::{FormatKind, PropertyCursor};
use crate::history::stack::{Direction, EditorHistory};
use crate::model::format::{CellFormat, RowFormat, TableFormat};
use crate::model::position::{LogicalIndex, Selection, TextPosition};
use crate::model::revision::{RevisionKind, RevisionTracker};
use crate::model::tree::{
    Cell, DocumentTree, FieldKind, Footnote, FootnoteKind, HeaderFooter, HeaderFooterKind, Node,
    NodeId, Paragraph, TextRun,
};
use crate::model::writer;
use crate::sync::builder;
use crate::sync::operation::{MarkerInfo, Operation};

pub struct DocumentEditor {
    pub tree: DocumentTree,
    pub selection: Selection,
    pub revisions: RevisionTracker,
    pub history: EditorHistory,
    collaborative_editing: bool,
}

impl DocumentEditor {
    pub fn new(author: impl Into<String>) -> Self {
        let tree = DocumentTree::new();
        let paragraph = tree.first_paragraph(tree.sections[0]).expect("fresh document");
        Self {
            tree,
            selection: Selection::caret(TextPosition { paragraph, offset: 0 }),
            revisions: RevisionTracker::new(author),
            history: EditorHistory::default(),
            collaborative_editing: false,
        }
    }

    pub fn set_collaborative_editing(&mut self, enabled: bool) {
        self.collaborative_editing = enabled;
    }

    pub fn collaborative_editing(&self) -> bool {
        self.collaborative_editing
    }

    pub fn set_track_changes(&mut self, enabled: bool) {
        self.revisions.track_changes = enabled;
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
    }

    pub fn document_json(&self) -> Value {
        writer::write_document(&self.tree)
    }

    pub(crate) fn caret(&self) -> TextPosition {
        self.selection.start
    }

    /// Selection endpoints in document order. Endpoints that no longer
    /// resolve keep capture order.
    pub(crate) fn ordered_selection(&self) -> (TextPosition, TextPosition) {
        let (start, end) = (self.selection.start, self.selection.end);
        match (self.tree.absolute_offset(start), self.tree.absolute_offset(end)) {
            (Some(a), Some(b)) if b < a => (end, start),
            _ => (start, end),
        }
    }

    pub(crate) fn logical(&self, position: TextPosition) -> Option<LogicalIndex> {
        self.tree.hierarchical_index(position)
    }

    /// Builds the operation batch for a finished entry (collaborative mode
    /// only) and files the entry on the undo stack.
    fn finalize(&mut self, mut entry: HistoryEntry) -> Vec<Operation> {
        let operations = if self.collaborative_editing {
            builder::action_info(
                &mut entry,
                &self.tree,
                &self.revisions,
                Direction::Forward,
                None,
                None,
            )
        } else {
            vec![]
        };
        self.history.push(entry, &mut self.tree);
        operations
    }

    // ----- inline-level primitives ------------------------------------------

    /// Inline index in `pos.paragraph` at which the character boundary
    /// `pos.offset` falls, splitting a run when the boundary is inside one.
    pub(crate) fn inline_boundary_index(&mut self, pos: TextPosition) -> usize {
        let mut acc = 0;
        let inlines = self.tree.child_ids(pos.paragraph);
        for (index, &inline) in inlines.iter().enumerate() {
            if pos.offset == acc {
                return index;
            }
            let length = self.tree.inline_length(inline).0;
            if pos.offset < acc + length {
                self.tree.split_run(inline, pos.offset - acc);
                return index + 1;
            }
            acc += length;
        }
        inlines.len()
    }

    /// Detaches the inlines covering `[from, to)` within one paragraph,
    /// splitting boundary runs. Returned in document order.
    pub(crate) fn remove_inline_range(
        &mut self, paragraph: NodeId, from: usize, to: usize,
    ) -> Vec<NodeId> {
        if to <= from {
            return vec![];
        }
        let first = self.inline_boundary_index(TextPosition { paragraph, offset: from });
        let last = self.inline_boundary_index(TextPosition { paragraph, offset: to });
        let inlines = self.tree.child_ids(paragraph);
        let mut removed = vec![];
        for &inline in inlines.iter().take(last).skip(first) {
            self.tree.remove_inline(inline);
            removed.push(inline);
        }
        removed
    }

    /// Removes the selected range and collapses the selection to its start.
    /// Cross-paragraph ranges detach: the start paragraph's tail inlines,
    /// every whole block in between, and the end paragraph itself (holding
    /// only the deleted head inlines); the end paragraph's surviving tail
    /// migrates into the start paragraph. Walking the result in reverse
    /// reinserts everything.
    pub(crate) fn delete_selected_contents(&mut self) -> Vec<RemovedNode> {
        let (start, end) = self.ordered_selection();
        if start == end {
            return vec![];
        }
        let mut removed = vec![];

        if start.paragraph == end.paragraph {
            for id in self.remove_inline_range(start.paragraph, start.offset, end.offset) {
                removed.push(RemovedNode::Node(id));
            }
        } else {
            let Some(parent) = self.tree.parent(start.paragraph) else {
                warn!("cross-paragraph delete outside a block container; skipping");
                return vec![];
            };
            if self.tree.parent(end.paragraph) != Some(parent) {
                warn!("selection endpoints in different containers; skipping delete");
                return vec![];
            }

            let tail_from = start.offset;
            let tail_to = (self.tree.block_length(start.paragraph) - 1).0;
            for id in self.remove_inline_range(start.paragraph, tail_from, tail_to) {
                removed.push(RemovedNode::Node(id));
            }

            let siblings = self.tree.child_ids(parent);
            let first = siblings.iter().position(|&id| id == start.paragraph);
            let second = siblings.iter().position(|&id| id == end.paragraph);
            if let (Some(first), Some(second)) = (first, second) {
                for &block in siblings.iter().take(second).skip(first + 1) {
                    self.tree.remove_block(block);
                    removed.push(RemovedNode::Node(block));
                }
            }

            let head = self.remove_inline_range(end.paragraph, 0, end.offset);
            // survivors of the end paragraph join the start paragraph
            let survivors = self.tree.child_ids(end.paragraph);
            let mut insert_at = self.tree.child_ids(start.paragraph).len();
            for survivor in survivors {
                self.tree.remove_inline(survivor);
                self.tree.insert_inline_at(start.paragraph, insert_at, survivor);
                insert_at += 1;
            }
            // the end paragraph leaves with the deleted head content inside
            self.tree.remove_block(end.paragraph);
            for (index, id) in head.into_iter().enumerate() {
                self.tree.insert_inline_at(end.paragraph, index, id);
            }
            removed.push(RemovedNode::Node(end.paragraph));
        }

        self.selection = Selection::caret(start);
        removed
    }

    /// Marker descriptors travel with the removal so reinsertion (local or
    /// remote) can rebuild non-text structure. Pushed in removal order; the
    /// consumer pops in reverse while walking removed nodes back in.
    pub(crate) fn capture_markers_into(&self, removed: &[RemovedNode], entry: &mut HistoryEntry) {
        for node in removed {
            let RemovedNode::Node(id) = node else { continue };
            match self.tree.node(*id) {
                Some(Node::BookmarkStart { name }) | Some(Node::BookmarkEnd { name }) => {
                    entry.marker_data.push(MarkerInfo::Bookmark { name: name.clone() });
                }
                Some(Node::CommentStart { id, author }) => {
                    entry
                        .marker_data
                        .push(MarkerInfo::Comment { id: *id, author: author.clone() });
                }
                Some(Node::EditRangeStart { user }) => {
                    entry.marker_data.push(MarkerInfo::EditRange { user: user.clone() });
                }
                Some(Node::FieldStart { kind }) => {
                    entry.marker_data.push(MarkerInfo::Field { kind: *kind });
                }
                Some(Node::TextRun(run)) => {
                    for &revision_id in &run.revision_ids {
                        if let Some(revision) = self.revisions.get(revision_id) {
                            entry.marker_data.push(MarkerInfo::Revision {
                                id: revision.id,
                                kind: revision.kind,
                                author: revision.author.clone(),
                                date: revision.date,
                                split_revisions: vec![],
                            });
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Inserts a detached paragraph block at the caret. A mid-paragraph
    /// caret splits the current paragraph; the inserted paragraph absorbs
    /// the split-off tail after its own content.
    pub(crate) fn insert_paragraph_block_at_caret(&mut self, block: NodeId) {
        let caret = self.caret();
        let Some(parent) = self.tree.parent(caret.paragraph) else { return };
        let Some(index) = self.tree.child_index(caret.paragraph) else { return };

        let boundary = self.inline_boundary_index(caret);
        let tail: Vec<NodeId> = self.tree.child_ids(caret.paragraph).split_off(boundary);
        let mut insert_at = self.tree.child_ids(block).len();
        for inline in tail {
            self.tree.remove_inline(inline);
            self.tree.insert_inline_at(block, insert_at, inline);
            insert_at += 1;
        }
        self.tree.insert_block_at(parent, index + 1, block);
    }

    /// Inserts a non-paragraph block relative to the caret. `after` places
    /// it after the caret paragraph; otherwise before.
    pub(crate) fn insert_block_near_caret(&mut self, block: NodeId, after: bool) {
        let caret = self.caret();
        let Some(parent) = self.tree.parent(caret.paragraph) else { return };
        let Some(index) = self.tree.child_index(caret.paragraph) else { return };
        self.tree.insert_block_at(parent, if after { index + 1 } else { index }, block);
    }

    pub(crate) fn insert_inline_at_caret(&mut self, inline: NodeId) {
        let caret = self.caret();
        let index = self.inline_boundary_index(caret);
        self.tree.insert_inline_at(caret.paragraph, index, inline);
    }

    // ----- content actions ---------------------------------------------------

    /// Types `text` at the selection, replacing any selected range.
    pub fn insert_text(&mut self, text: &str) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(ActionKind::Insert);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        if !self.selection.is_empty() {
            let removed = self.delete_selected_contents();
            self.capture_markers_into(&removed, &mut entry);
            entry.removed_nodes = removed;
        }

        let caret = self.caret();
        entry.insert_position = self.logical(caret);
        entry.insert_index = self.tree.absolute_offset(caret);

        let revision_id = if self.revisions.track_changes {
            let id = self.revisions.begin(RevisionKind::Insertion);
            entry.revision_id = Some(id);
            Some(id)
        } else {
            None
        };

        let run = self.tree.new_text_run(text, Default::default());
        if let (Some(id), Some(Node::TextRun(text_run))) = (revision_id, self.tree.node_mut(run)) {
            text_run.revision_ids.push(id);
        }
        self.insert_inline_at_caret(run);

        let advanced = TextPosition {
            paragraph: caret.paragraph,
            offset: caret.offset + DocumentTree::grapheme_len(text),
        };
        self.selection = Selection::caret(advanced);
        entry.end_position = self.logical(advanced);
        entry.insert_text = Some(text.to_string());
        if self.collaborative_editing {
            entry.start_index = self.tree.absolute_offset(caret);
            entry.end_index = self.tree.absolute_offset(advanced);
        }
        self.finalize(entry)
    }

    /// Splits the paragraph at the caret.
    pub fn enter(&mut self) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(ActionKind::Enter);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        if !self.selection.is_empty() {
            let removed = self.delete_selected_contents();
            self.capture_markers_into(&removed, &mut entry);
            entry.removed_nodes = removed;
        }

        let caret = self.caret();
        entry.insert_position = self.logical(caret);
        entry.insert_index = self.tree.absolute_offset(caret);

        let format = match self.tree.node(caret.paragraph) {
            Some(Node::Paragraph(paragraph)) => paragraph.format.clone(),
            _ => Default::default(),
        };
        let successor =
            self.tree.alloc(Node::Paragraph(Paragraph { format, inlines: vec![] }));
        self.insert_paragraph_block_at_caret(successor);

        let after = TextPosition { paragraph: successor, offset: 0 };
        self.selection = Selection::caret(after);
        entry.end_position = self.logical(after);
        if self.collaborative_editing {
            entry.start_index = self.tree.absolute_offset(caret);
            entry.end_index = self.tree.absolute_offset(after);
        }
        self.finalize(entry)
    }

    /// Deletes the selection, or the character before a collapsed caret.
    pub fn backspace(&mut self) -> Vec<Operation> {
        if self.selection.is_empty() {
            let caret = self.caret();
            if caret.offset > 0 {
                self.selection.start = TextPosition {
                    paragraph: caret.paragraph,
                    offset: caret.offset - 1,
                };
            } else if let Some(previous) = self.previous_paragraph(caret.paragraph) {
                let offset = (self.tree.block_length(previous) - 1).0;
                self.selection.start = TextPosition { paragraph: previous, offset };
            } else {
                return vec![];
            }
        }
        self.delete_action(ActionKind::BackSpace)
    }

    /// Deletes the selection, or the character after a collapsed caret.
    pub fn delete_forward(&mut self) -> Vec<Operation> {
        if self.selection.is_empty() {
            let caret = self.caret();
            let paragraph_end = (self.tree.block_length(caret.paragraph) - 1).0;
            if caret.offset < paragraph_end {
                self.selection.end = TextPosition {
                    paragraph: caret.paragraph,
                    offset: caret.offset + 1,
                };
            } else if let Some(next) = self.next_paragraph(caret.paragraph) {
                self.selection.end = TextPosition { paragraph: next, offset: 0 };
            } else {
                return vec![];
            }
        }
        self.delete_action(ActionKind::Delete)
    }

    pub fn cut(&mut self) -> Vec<Operation> {
        if self.selection.is_empty() {
            return vec![];
        }
        self.delete_action(ActionKind::Cut)
    }

    fn delete_action(&mut self, action: ActionKind) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(action);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        if self.revisions.track_changes {
            return self.tracked_delete(entry);
        }

        let removed = self.delete_selected_contents();
        if removed.is_empty() {
            return vec![];
        }
        self.capture_markers_into(&removed, &mut entry);
        entry.removed_nodes = removed;

        let caret = self.caret();
        entry.insert_position = self.logical(caret);
        entry.end_position = entry.insert_position.clone();
        entry.insert_index = self.tree.absolute_offset(caret);
        self.finalize(entry)
    }

    /// Track-changes delete: runs covered by the acting user's own pending
    /// insertion are hard-deleted, everything else is only marked with a
    /// deletion revision.
    fn tracked_delete(&mut self, mut entry: HistoryEntry) -> Vec<Operation> {
        let (start, end) = self.ordered_selection();
        if start.paragraph != end.paragraph {
            warn!("tracked delete across paragraphs unsupported; nothing deleted");
            return vec![];
        }
        let deletion = self.revisions.begin(RevisionKind::Deletion);
        entry.revision_id = Some(deletion);

        let covered = self.remove_inline_range(start.paragraph, start.offset, end.offset);
        let mut keep_at = self.inline_boundary_index(start);
        for inline in covered {
            let owned = self
                .revisions
                .covering_insertion(&self.tree, inline)
                .map(|revision| revision.author == self.revisions.current_author)
                .unwrap_or(false);
            if owned {
                entry.removed_nodes.push(RemovedNode::Node(inline));
            } else {
                if let Some(Node::TextRun(run)) = self.tree.node_mut(inline) {
                    run.revision_ids.push(deletion);
                }
                self.tree.insert_inline_at(start.paragraph, keep_at, inline);
                keep_at += 1;
            }
        }
        let removed: Vec<RemovedNode> = entry.removed_nodes.clone();
        self.capture_markers_into(&removed, &mut entry);

        self.selection = Selection::caret(start);
        entry.insert_position = self.logical(start);
        entry.end_position = self.logical(TextPosition {
            paragraph: start.paragraph,
            offset: start.offset,
        });
        entry.update_end_revision_info(&self.tree, &self.revisions);
        self.finalize(entry)
    }

    fn previous_paragraph(&self, paragraph: NodeId) -> Option<NodeId> {
        let parent = self.tree.parent(paragraph)?;
        let siblings = self.tree.child_ids(parent);
        let index = siblings.iter().position(|&id| id == paragraph)?;
        if index == 0 {
            return None;
        }
        self.tree.last_paragraph(siblings[index - 1])
    }

    fn next_paragraph(&self, paragraph: NodeId) -> Option<NodeId> {
        let parent = self.tree.parent(paragraph)?;
        let siblings = self.tree.child_ids(parent);
        let index = siblings.iter().position(|&id| id == paragraph)?;
        siblings.get(index + 1).and_then(|&next| self.tree.first_paragraph(next))
    }

    // ----- table structure ---------------------------------------------------

    /// Inserts a table at the caret, splitting the caret paragraph.
    pub fn insert_table(&mut self, rows: usize, columns: usize) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(ActionKind::InsertTable);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        let caret = self.caret();
        entry.insert_position = self.logical(caret);
        entry.insert_index = self.tree.absolute_offset(caret);

        let format = match self.tree.node(caret.paragraph) {
            Some(Node::Paragraph(paragraph)) => paragraph.format.clone(),
            _ => Default::default(),
        };
        let successor = self.tree.alloc(Node::Paragraph(Paragraph { format, inlines: vec![] }));
        self.insert_paragraph_block_at_caret(successor);

        let table = self.tree.new_table(rows, columns);
        let parent = self.tree.parent(caret.paragraph);
        let index = self.tree.child_index(caret.paragraph);
        if let (Some(parent), Some(index)) = (parent, index) {
            self.tree.insert_block_at(parent, index + 1, table);
        }

        if self.collaborative_editing {
            entry.start_index = self.tree.position_info_for_header_footer(table);
            entry.end_index =
                entry.start_index.map(|start| start + self.tree.block_length(table));
            self.queue_cell_operations(&mut entry, table);
        }

        let after = TextPosition { paragraph: successor, offset: 0 };
        self.selection = Selection::caret(after);
        entry.end_position = self.logical(after);
        self.finalize(entry)
    }

    /// One Format operation per cell for structural inserts: cell format,
    /// paragraph format, character format stacked at the cell's offset.
    fn queue_cell_operations(&self, entry: &mut HistoryEntry, table: NodeId) {
        for row in self.tree.child_ids(table) {
            for cell in self.tree.child_ids(row) {
                if let Some(offset) = self.tree.position_info_for_header_footer(cell) {
                    for operation in builder::build_cell_operation(&self.tree, cell, offset.0) {
                        entry.cell_operations.push_back(operation);
                    }
                }
            }
        }
    }

    /// Deletes the table containing the selection start.
    pub fn delete_table(&mut self) -> Vec<Operation> {
        let Some(table) = self.tree.owner_table(self.caret().paragraph) else {
            return vec![];
        };
        let mut entry = HistoryEntry::new(ActionKind::DeleteTable);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);
        if self.collaborative_editing {
            entry.start_index = self.tree.position_info_for_header_footer(table);
            entry.end_index =
                entry.start_index.map(|start| start + self.tree.block_length(table));
        }

        self.tree.combine_widget(table);
        let parent = self.tree.parent(table);
        let index = self.tree.child_index(table);
        self.tree.remove_block(table);
        entry.removed_nodes.push(RemovedNode::Node(table));

        // caret convention: start of the block that followed, else end of
        // the block before
        let caret = match (parent, index) {
            (Some(parent), Some(index)) => {
                let siblings = self.tree.child_ids(parent);
                if let Some(&follower) = siblings.get(index) {
                    self.tree.start_position_of(follower)
                } else if index > 0 {
                    self.tree.end_position_of(siblings[index - 1])
                } else {
                    None
                }
            }
            _ => None,
        };
        if let Some(caret) = caret {
            self.selection = Selection::caret(caret);
            entry.insert_position = self.logical(caret);
            entry.end_position = entry.insert_position.clone();
        }
        self.finalize(entry)
    }

    /// Deletes the row containing the selection start.
    pub fn delete_row(&mut self) -> Vec<Operation> {
        let caret = self.caret();
        let Some(cell) = self.tree.covering_cell(caret.paragraph) else { return vec![] };
        let Some(row) = self.tree.parent(cell) else { return vec![] };
        let Some(table) = self.tree.owner_table(row) else { return vec![] };

        let mut entry = HistoryEntry::new(ActionKind::DeleteRow);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);
        if self.collaborative_editing {
            entry.start_index = self.tree.position_info_for_header_footer(row);
            entry.end_index = entry.start_index.map(|start| start + self.tree.row_length(row));
        }

        self.tree.combine_widget(table);
        let row_index = self.tree.child_index(row).unwrap_or(0);
        self.detach_row(table, row);
        entry.removed_nodes.push(RemovedNode::Node(row));
        entry.row_index = Some(row_index);
        entry.structure_count = 1;

        if let Some(position) = self.tree.start_position_of(table).or_else(|| {
            self.tree.parent(table).and_then(|parent| self.tree.start_position_of(parent))
        }) {
            self.selection = Selection::caret(position);
            entry.insert_position = self.logical(position);
            entry.end_position = entry.insert_position.clone();
        }
        self.finalize(entry)
    }

    pub(crate) fn detach_row(&mut self, table: NodeId, row: NodeId) {
        if let Some(Node::Table(table_node)) = self.tree.node_mut(table) {
            table_node.rows.retain(|&id| id != row);
        }
        self.tree.set_parent(row, None);
    }

    pub(crate) fn attach_row(&mut self, table: NodeId, index: usize, row: NodeId) {
        if let Some(Node::Table(table_node)) = self.tree.node_mut(table) {
            let index = index.min(table_node.rows.len());
            table_node.rows.insert(index, row);
        }
        self.tree.set_parent(row, Some(table));
    }

    /// Inserts a row above or below the row containing the selection.
    pub fn insert_row(&mut self, above: bool) -> Vec<Operation> {
        let caret = self.caret();
        let Some(cell) = self.tree.covering_cell(caret.paragraph) else { return vec![] };
        let Some(row) = self.tree.parent(cell) else { return vec![] };
        let Some(table) = self.tree.owner_table(row) else { return vec![] };

        let action = if above { ActionKind::InsertRowAbove } else { ActionKind::InsertRowBelow };
        let mut entry = HistoryEntry::new(action);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        self.tree.combine_widget(table);
        let columns = self.tree.child_ids(row).len();
        let reference = self.tree.child_index(row).unwrap_or(0);
        let index = if above { reference } else { reference + 1 };
        let new_row = self.tree.new_row(columns);
        self.attach_row(table, index, new_row);
        entry.row_index = Some(index);
        entry.structure_count = 1;

        if self.collaborative_editing {
            entry.start_index = self.tree.position_info_for_header_footer(new_row);
            entry.end_index =
                entry.start_index.map(|start| start + self.tree.row_length(new_row));
            for cell in self.tree.child_ids(new_row) {
                if let Some(offset) = self.tree.position_info_for_header_footer(cell) {
                    for operation in builder::build_cell_operation(&self.tree, cell, offset.0) {
                        entry.cell_operations.push_back(operation);
                    }
                }
            }
        }

        if let Some(position) = self.tree.start_position_of(new_row) {
            self.selection = Selection::caret(position);
            entry.insert_position = self.logical(position);
            entry.end_position = entry.insert_position.clone();
        }
        self.finalize(entry)
    }

    /// Deletes the column containing the selection start.
    pub fn delete_column(&mut self) -> Vec<Operation> {
        let caret = self.caret();
        let Some(cell) = self.tree.covering_cell(caret.paragraph) else { return vec![] };
        let Some(row) = self.tree.parent(cell) else { return vec![] };
        let Some(table) = self.tree.owner_table(row) else { return vec![] };

        let mut entry = HistoryEntry::new(ActionKind::DeleteColumn);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        self.tree.combine_widget(table);
        let column = self
            .tree
            .child_ids(row)
            .iter()
            .position(|&id| id == cell)
            .unwrap_or(0);
        entry.cell_index = Some(column);

        for row_id in self.tree.child_ids(table) {
            let cells = self.tree.child_ids(row_id);
            let Some(&victim) = cells.get(column) else { continue };
            if self.collaborative_editing {
                if let Some(offset) = self.tree.position_info_for_header_footer(victim) {
                    let length = self.tree.cell_length(victim).0;
                    entry
                        .cell_operations
                        .push_back(builder::delete_cell_operation(offset.0, length));
                }
            }
            self.detach_cell(row_id, victim);
            entry.removed_nodes.push(RemovedNode::Node(victim));
        }
        entry.structure_count = entry.removed_nodes.len();

        if let Some(position) = self.tree.start_position_of(table) {
            self.selection = Selection::caret(position);
            entry.insert_position = self.logical(position);
            entry.end_position = entry.insert_position.clone();
        }
        self.finalize(entry)
    }

    /// Inserts a column left or right of the selection's column.
    pub fn insert_column(&mut self, left: bool) -> Vec<Operation> {
        let caret = self.caret();
        let Some(cell) = self.tree.covering_cell(caret.paragraph) else { return vec![] };
        let Some(row) = self.tree.parent(cell) else { return vec![] };
        let Some(table) = self.tree.owner_table(row) else { return vec![] };

        let action =
            if left { ActionKind::InsertColumnLeft } else { ActionKind::InsertColumnRight };
        let mut entry = HistoryEntry::new(action);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        self.tree.combine_widget(table);
        let reference =
            self.tree.child_ids(row).iter().position(|&id| id == cell).unwrap_or(0);
        let column = if left { reference } else { reference + 1 };
        entry.cell_index = Some(column);
        entry.structure_count = self.tree.child_ids(table).len();

        let mut first_cell = None;
        for row_id in self.tree.child_ids(table) {
            let new_cell = self.tree.new_cell();
            self.attach_cell(row_id, column, new_cell);
            first_cell.get_or_insert(new_cell);
            if self.collaborative_editing {
                if let Some(offset) = self.tree.position_info_for_header_footer(new_cell) {
                    for operation in builder::build_cell_operation(&self.tree, new_cell, offset.0)
                    {
                        entry.cell_operations.push_back(operation);
                    }
                }
            }
        }

        if let Some(position) = first_cell.and_then(|cell| self.tree.start_position_of(cell)) {
            self.selection = Selection::caret(position);
            entry.insert_position = self.logical(position);
            entry.end_position = entry.insert_position.clone();
        }
        self.finalize(entry)
    }

    pub(crate) fn detach_cell(&mut self, row: NodeId, cell: NodeId) {
        if let Some(Node::Row(row_node)) = self.tree.node_mut(row) {
            row_node.cells.retain(|&id| id != cell);
        }
        self.tree.set_parent(cell, None);
    }

    pub(crate) fn attach_cell(&mut self, row: NodeId, index: usize, cell: NodeId) {
        if let Some(Node::Row(row_node)) = self.tree.node_mut(row) {
            let index = index.min(row_node.cells.len());
            row_node.cells.insert(index, cell);
        }
        self.tree.set_parent(cell, Some(row));
    }

    /// Merges the cells covered by the selection within one row into a
    /// single cell holding clones of their content.
    pub fn merge_cells(&mut self) -> Vec<Operation> {
        let (start, end) = self.ordered_selection();
        let Some(first_cell) = self.tree.covering_cell(start.paragraph) else { return vec![] };
        let Some(last_cell) = self.tree.covering_cell(end.paragraph) else { return vec![] };
        let Some(row) = self.tree.parent(first_cell) else { return vec![] };
        if self.tree.parent(last_cell) != Some(row) {
            warn!("merge across rows unsupported; skipping");
            return vec![];
        }
        let Some(table) = self.tree.owner_table(row) else { return vec![] };

        let cells = self.tree.child_ids(row);
        let Some(from) = cells.iter().position(|&id| id == first_cell) else { return vec![] };
        let Some(to) = cells.iter().position(|&id| id == last_cell) else { return vec![] };
        if from == to {
            return vec![];
        }

        let mut entry = HistoryEntry::new(ActionKind::MergeCells);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);
        self.tree.combine_widget(table);
        entry.cell_index = Some(from);
        entry.structure_count = to - from + 1;

        let merged = self.merge_cell_range(row, from, to, &mut entry);
        if let Some(position) = self.tree.start_position_of(merged) {
            self.selection = Selection::caret(position);
            entry.insert_position = self.logical(position);
            entry.end_position = entry.insert_position.clone();
        }
        self.finalize(entry)
    }

    /// Detaches `[from..=to]` intact into the entry and attaches one merged
    /// cell holding cloned blocks.
    pub(crate) fn merge_cell_range(
        &mut self, row: NodeId, from: usize, to: usize, entry: &mut HistoryEntry,
    ) -> NodeId {
        let cells = self.tree.child_ids(row);
        let victims: Vec<NodeId> = cells[from..=to.min(cells.len() - 1)].to_vec();

        let mut blocks = vec![];
        let mut format = CellFormat::default();
        for (index, &victim) in victims.iter().enumerate() {
            if index == 0 {
                if let Some(Node::Cell(cell)) = self.tree.node(victim) {
                    format = cell.format.clone();
                }
            }
            for block in self.tree.child_ids(victim) {
                if let Some(clone) = self.tree.clone_subtree(block) {
                    blocks.push(clone);
                }
            }
        }
        format.column_span = victims.len() as u32;

        for &victim in &victims {
            self.detach_cell(row, victim);
            entry.removed_nodes.push(RemovedNode::Node(victim));
        }

        let merged = self.tree.alloc(Node::Cell(Cell { format, blocks: blocks.clone() }));
        for block in blocks {
            self.tree.set_parent(block, Some(merged));
        }
        self.attach_cell(row, from, merged);
        merged
    }

    /// Replaces the content of every wholly-selected cell with one empty
    /// paragraph, detaching the original cells into the entry.
    pub fn clear_cells(&mut self) -> Vec<Operation> {
        let (start, end) = self.ordered_selection();
        let Some(first_cell) = self.tree.covering_cell(start.paragraph) else { return vec![] };
        let Some(last_cell) = self.tree.covering_cell(end.paragraph) else { return vec![] };
        let Some(row) = self.tree.parent(first_cell) else { return vec![] };
        if self.tree.parent(last_cell) != Some(row) {
            warn!("clear across rows unsupported; skipping");
            return vec![];
        }
        let Some(table) = self.tree.owner_table(row) else { return vec![] };

        let cells = self.tree.child_ids(row);
        let Some(from) = cells.iter().position(|&id| id == first_cell) else { return vec![] };
        let Some(to) = cells.iter().position(|&id| id == last_cell) else { return vec![] };

        let mut entry = HistoryEntry::new(ActionKind::ClearCells);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);
        self.tree.combine_widget(table);
        entry.cell_index = Some(from);
        entry.structure_count = to - from + 1;

        for column in from..=to {
            let cells = self.tree.child_ids(row);
            let Some(&victim) = cells.get(column) else { continue };
            let format = match self.tree.node(victim) {
                Some(Node::Cell(cell)) => cell.format.clone(),
                _ => CellFormat::default(),
            };
            self.detach_cell(row, victim);
            entry.removed_nodes.push(RemovedNode::Node(victim));

            let paragraph = self.tree.new_paragraph();
            let replacement =
                self.tree.alloc(Node::Cell(Cell { format, blocks: vec![paragraph] }));
            self.tree.set_parent(paragraph, Some(replacement));
            self.attach_cell(row, column, replacement);
        }

        if let Some(position) = self
            .tree
            .child_ids(row)
            .get(from)
            .copied()
            .and_then(|cell| self.tree.start_position_of(cell))
        {
            self.selection = Selection::caret(position);
            entry.insert_position = self.logical(position);
            entry.end_position = entry.insert_position.clone();
        }
        self.finalize(entry)
    }

    // ----- formatting --------------------------------------------------------

    /// Applies one character property over the covered runs.
    pub fn apply_character_format(&mut self, property: &str, value: Value) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(ActionKind::CharacterFormat);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        let mut cursor = PropertyCursor::default();
        let runs = self.covered_runs();
        for run in runs {
            let (snapshot, length) = match self.tree.node(run) {
                Some(Node::TextRun(text_run)) => (
                    crate::history::properties::character_snapshot(&text_run.format),
                    DocumentTree::grapheme_len(&text_run.text),
                ),
                _ => continue,
            };
            let applied = entry.add_modified_properties(
                &mut cursor,
                Direction::Forward,
                FormatKind::Character,
                snapshot,
                Some(property),
                value.clone(),
                Some(length),
            );
            if let Some(Node::TextRun(text_run)) = self.tree.node_mut(run) {
                text_run.format.set_property(property, &applied);
            }
        }
        entry.property_name = Some(property.to_string());
        self.finalize(entry)
    }

    /// Splits boundary runs and returns the runs covered by the selection.
    pub(crate) fn covered_runs(&mut self) -> Vec<NodeId> {
        let (start, end) = self.ordered_selection();
        if start == end {
            return vec![];
        }
        if start.paragraph != end.paragraph {
            let mut runs = self.runs_in_range(
                start.paragraph,
                start.offset,
                (self.tree.block_length(start.paragraph) - 1).0,
            );
            // intermediate paragraphs contribute all their runs
            if let (Some(parent), Some(first), Some(second)) = (
                self.tree.parent(start.paragraph),
                self.tree.child_index(start.paragraph),
                self.tree.child_index(end.paragraph),
            ) {
                let siblings = self.tree.child_ids(parent);
                for &block in siblings.iter().take(second).skip(first + 1) {
                    for inline in self.tree.child_ids(block) {
                        if matches!(self.tree.node(inline), Some(Node::TextRun(_))) {
                            runs.push(inline);
                        }
                    }
                }
            }
            runs.extend(self.runs_in_range(end.paragraph, 0, end.offset));
            return runs;
        }
        self.runs_in_range(start.paragraph, start.offset, end.offset)
    }

    fn runs_in_range(&mut self, paragraph: NodeId, from: usize, to: usize) -> Vec<NodeId> {
        if to <= from {
            return vec![];
        }
        let first = self.inline_boundary_index(TextPosition { paragraph, offset: from });
        let last = self.inline_boundary_index(TextPosition { paragraph, offset: to });
        self.tree
            .child_ids(paragraph)
            .into_iter()
            .take(last)
            .skip(first)
            .filter(|&inline| matches!(self.tree.node(inline), Some(Node::TextRun(_))))
            .collect()
    }

    pub fn apply_paragraph_format(&mut self, property: &str, value: Value) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(ActionKind::ParagraphFormat);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        let mut cursor = PropertyCursor::default();
        for paragraph in self.covered_paragraphs() {
            let snapshot = match self.tree.node(paragraph) {
                Some(Node::Paragraph(p)) => {
                    crate::history::properties::paragraph_snapshot(&p.format)
                }
                _ => continue,
            };
            let applied = entry.add_modified_properties(
                &mut cursor,
                Direction::Forward,
                FormatKind::Paragraph,
                snapshot,
                Some(property),
                value.clone(),
                None,
            );
            if let Some(Node::Paragraph(p)) = self.tree.node_mut(paragraph) {
                p.format.set_property(property, &applied);
            }
        }
        entry.property_name = Some(property.to_string());
        self.finalize(entry)
    }

    pub(crate) fn covered_paragraphs(&self) -> Vec<NodeId> {
        let (start, end) = self.ordered_selection();
        if start.paragraph == end.paragraph {
            return vec![start.paragraph];
        }
        let mut paragraphs = vec![start.paragraph];
        if let (Some(parent), Some(first), Some(second)) = (
            self.tree.parent(start.paragraph),
            self.tree.child_index(start.paragraph),
            self.tree.child_index(end.paragraph),
        ) {
            let siblings = self.tree.child_ids(parent);
            for &block in siblings.iter().take(second).skip(first + 1) {
                if self.tree.is_paragraph(block) {
                    paragraphs.push(block);
                }
            }
        }
        paragraphs.push(end.paragraph);
        paragraphs
    }

    pub fn apply_section_format(&mut self, property: &str, value: Value) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(ActionKind::SectionFormat);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        let section = self.tree.sections[0];
        let snapshot = match self.tree.node(section) {
            Some(Node::Section(s)) => crate::history::properties::section_snapshot(&s.format),
            _ => return vec![],
        };
        let mut cursor = PropertyCursor::default();
        let applied = entry.add_modified_properties(
            &mut cursor,
            Direction::Forward,
            FormatKind::Section,
            snapshot,
            Some(property),
            value,
            None,
        );
        if let Some(Node::Section(s)) = self.tree.node_mut(section) {
            s.format.set_property(property, &applied);
        }
        entry.property_name = Some(property.to_string());
        self.finalize(entry)
    }

    /// Single-property table/row/cell actions; the action picks the target
    /// structure and the property name.
    pub fn apply_table_family_format(&mut self, action: ActionKind, value: Value) -> Vec<Operation> {
        let caret = self.caret();
        let Some(cell) = self.tree.covering_cell(caret.paragraph) else { return vec![] };
        let row = self.tree.parent(cell);
        let table = self.tree.owner_table(cell);

        let mut entry = HistoryEntry::new(action);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);
        let mut cursor = PropertyCursor::default();

        if let Some(property) = row_property_name(action) {
            let Some(row) = row else { return vec![] };
            let snapshot = match self.tree.node(row) {
                Some(Node::Row(r)) => crate::history::properties::row_snapshot(&r.format),
                _ => return vec![],
            };
            let applied = entry.add_modified_properties(
                &mut cursor,
                Direction::Forward,
                FormatKind::Row,
                snapshot,
                Some(property),
                value,
                None,
            );
            if let Some(Node::Row(r)) = self.tree.node_mut(row) {
                r.format.set_property(property, &applied);
            }
        } else if let Some(property) = cell_property_name(action) {
            let snapshot = match self.tree.node(cell) {
                Some(Node::Cell(c)) => crate::history::properties::cell_snapshot(&c.format),
                _ => return vec![],
            };
            let applied = entry.add_modified_properties(
                &mut cursor,
                Direction::Forward,
                FormatKind::Cell,
                snapshot,
                Some(property),
                value,
                None,
            );
            if let Some(Node::Cell(c)) = self.tree.node_mut(cell) {
                c.format.set_property(property, &applied);
            }
        } else if let Some(property) = table_property_name(action) {
            let Some(table) = table else { return vec![] };
            let snapshot = match self.tree.node(table) {
                Some(Node::Table(t)) => crate::history::properties::table_snapshot(&t.format),
                _ => return vec![],
            };
            let applied = entry.add_modified_properties(
                &mut cursor,
                Direction::Forward,
                FormatKind::Table,
                snapshot,
                Some(property),
                value,
                None,
            );
            if let Some(Node::Table(t)) = self.tree.node_mut(table) {
                t.format.set_property(property, &applied);
            }
        } else {
            warn!(?action, "action carries no table-family property; nothing applied");
            return vec![];
        }
        self.finalize(entry)
    }

    /// Table-dialog commit: whole table, row and cell formats replaced in
    /// one entry, snapshots stored in that order.
    pub fn apply_table_dialog(
        &mut self, table_format: TableFormat, row_format: RowFormat, cell_format: CellFormat,
    ) -> Vec<Operation> {
        let caret = self.caret();
        let Some(cell) = self.tree.covering_cell(caret.paragraph) else { return vec![] };
        let Some(row) = self.tree.parent(cell) else { return vec![] };
        let Some(table) = self.tree.owner_table(cell) else { return vec![] };

        let mut entry = HistoryEntry::new(ActionKind::TableDialog);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);
        let mut cursor = PropertyCursor::default();

        if let Some(Node::Table(t)) = self.tree.node(table) {
            let snapshot = crate::history::properties::table_snapshot(&t.format);
            entry.add_modified_properties(
                &mut cursor,
                Direction::Forward,
                FormatKind::Table,
                snapshot,
                None,
                Value::Null,
                None,
            );
        }
        if let Some(Node::Table(t)) = self.tree.node_mut(table) {
            t.format = table_format;
        }
        if let Some(Node::Row(r)) = self.tree.node(row) {
            let snapshot = crate::history::properties::row_snapshot(&r.format);
            entry.add_modified_properties(
                &mut cursor,
                Direction::Forward,
                FormatKind::Row,
                snapshot,
                None,
                Value::Null,
                None,
            );
        }
        if let Some(Node::Row(r)) = self.tree.node_mut(row) {
            r.format = row_format;
        }
        if let Some(Node::Cell(c)) = self.tree.node(cell) {
            let snapshot = crate::history::properties::cell_snapshot(&c.format);
            entry.add_modified_properties(
                &mut cursor,
                Direction::Forward,
                FormatKind::Cell,
                snapshot,
                None,
                Value::Null,
                None,
            );
        }
        if let Some(Node::Cell(c)) = self.tree.node_mut(cell) {
            c.format = cell_format;
        }
        self.finalize(entry)
    }

    pub fn continue_numbering(&mut self) -> Vec<Operation> {
        self.numbering_action(ActionKind::ContinueNumbering, FormatKind::ContinueNumbering)
    }

    pub fn restart_numbering(&mut self) -> Vec<Operation> {
        self.numbering_action(ActionKind::RestartNumbering, FormatKind::RestartNumbering)
    }

    fn numbering_action(&mut self, action: ActionKind, kind: FormatKind) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(action);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        let mut cursor = PropertyCursor::default();
        for paragraph in self.covered_paragraphs() {
            let snapshot = match self.tree.node(paragraph) {
                Some(Node::Paragraph(p)) => serde_json::to_value(&p.format.list_format)
                    .unwrap_or(Value::Null),
                _ => continue,
            };
            let applied = entry.add_modified_properties(
                &mut cursor,
                Direction::Forward,
                kind,
                snapshot,
                None,
                json!(action == ActionKind::RestartNumbering),
                None,
            );
            if let Some(Node::Paragraph(p)) = self.tree.node_mut(paragraph) {
                if let Some(list) = p.format.list_format.as_mut() {
                    list.list_level_number =
                        if applied == json!(true) { 0 } else { list.list_level_number };
                }
            }
        }
        self.finalize(entry)
    }

    /// Resets character formats of the covered runs and paragraph formats of
    /// the covered paragraphs. Snapshot order: runs first, then paragraphs.
    pub fn clear_format(&mut self) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(ActionKind::ClearFormat);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        let mut cursor = PropertyCursor::default();
        for run in self.covered_runs() {
            let (snapshot, length) = match self.tree.node(run) {
                Some(Node::TextRun(text_run)) => (
                    crate::history::properties::character_snapshot(&text_run.format),
                    DocumentTree::grapheme_len(&text_run.text),
                ),
                _ => continue,
            };
            entry.add_modified_properties(
                &mut cursor,
                Direction::Forward,
                FormatKind::Character,
                snapshot,
                None,
                Value::Null,
                Some(length),
            );
            if let Some(Node::TextRun(text_run)) = self.tree.node_mut(run) {
                text_run.format = Default::default();
            }
        }
        for paragraph in self.covered_paragraphs() {
            let snapshot = match self.tree.node(paragraph) {
                Some(Node::Paragraph(p)) => {
                    crate::history::properties::paragraph_snapshot(&p.format)
                }
                _ => continue,
            };
            entry.add_modified_properties(
                &mut cursor,
                Direction::Forward,
                FormatKind::Paragraph,
                snapshot,
                None,
                Value::Null,
                None,
            );
            if let Some(Node::Paragraph(p)) = self.tree.node_mut(paragraph) {
                p.format = Default::default();
            }
        }
        self.finalize(entry)
    }

    pub fn resize_row(&mut self, height: f32) -> Vec<Operation> {
        self.apply_table_family_format(ActionKind::RowResizing, json!(height))
    }

    pub fn resize_cell(&mut self, width: f32) -> Vec<Operation> {
        self.apply_table_family_format(ActionKind::CellResizing, json!(width))
    }

    // ----- non-text structure ------------------------------------------------

    /// Brackets the selection with bookmark markers.
    pub fn insert_bookmark(&mut self, name: &str) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(ActionKind::InsertBookmark);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        let (start, end) = self.ordered_selection();
        let end_marker = self.tree.alloc(Node::BookmarkEnd { name: name.to_string() });
        let end_index = self.inline_boundary_index(end);
        self.tree.insert_inline_at(end.paragraph, end_index, end_marker);
        let start_marker = self.tree.alloc(Node::BookmarkStart { name: name.to_string() });
        let start_index = self.inline_boundary_index(start);
        self.tree.insert_inline_at(start.paragraph, start_index, start_marker);

        entry.removed_nodes.push(RemovedNode::Bookmark { name: name.to_string() });
        entry.marker_data.push(MarkerInfo::Bookmark { name: name.to_string() });
        entry.insert_position = self.logical(start);
        entry.end_position = self.logical(end);
        self.finalize(entry)
    }

    pub fn delete_bookmark(&mut self, name: &str) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(ActionKind::DeleteBookmark);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        let Some((start, end)) = self.bookmark_positions(name) else { return vec![] };
        entry.insert_position = self.logical(start);
        entry.end_position = self.logical(end);
        self.remove_bookmark_markers(name);
        entry.removed_nodes.push(RemovedNode::Bookmark { name: name.to_string() });
        entry.marker_data.push(MarkerInfo::Bookmark { name: name.to_string() });
        self.finalize(entry)
    }

    pub(crate) fn bookmark_positions(&self, name: &str) -> Option<(TextPosition, TextPosition)> {
        let mut start = None;
        let mut end = None;
        for &section in &self.tree.sections {
            self.scan_bookmark(section, name, &mut start, &mut end);
        }
        Some((start?, end?))
    }

    fn scan_bookmark(
        &self, node: NodeId, name: &str, start: &mut Option<TextPosition>,
        end: &mut Option<TextPosition>,
    ) {
        if let Some(Node::Paragraph(paragraph)) = self.tree.node(node) {
            let mut offset = 0;
            for &inline in &paragraph.inlines {
                match self.tree.node(inline) {
                    Some(Node::BookmarkStart { name: n }) if n == name => {
                        *start = Some(TextPosition { paragraph: node, offset });
                    }
                    Some(Node::BookmarkEnd { name: n }) if n == name => {
                        *end = Some(TextPosition { paragraph: node, offset });
                    }
                    _ => {}
                }
                offset += self.tree.inline_length(inline).0;
            }
            return;
        }
        for child in self.tree.child_ids(node) {
            self.scan_bookmark(child, name, start, end);
        }
    }

    pub(crate) fn remove_bookmark_markers(&mut self, name: &str) {
        let mut victims = vec![];
        for &section in &self.tree.sections {
            self.collect_bookmark_markers(section, name, &mut victims);
        }
        for victim in victims {
            self.tree.remove_inline(victim);
            self.tree.release_subtree(victim);
        }
    }

    fn collect_bookmark_markers(&self, node: NodeId, name: &str, victims: &mut Vec<NodeId>) {
        match self.tree.node(node) {
            Some(Node::BookmarkStart { name: n }) | Some(Node::BookmarkEnd { name: n })
                if n == name =>
            {
                victims.push(node);
            }
            _ => {}
        }
        for child in self.tree.child_ids(node) {
            self.collect_bookmark_markers(child, name, victims);
        }
    }

    /// Brackets the selection with comment markers.
    pub fn insert_comment(&mut self) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(ActionKind::InsertComment);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        let id = Uuid::new_v4();
        let author = self.revisions.current_author.clone();
        let (start, end) = self.ordered_selection();
        let end_marker = self.tree.alloc(Node::CommentEnd { id });
        let end_index = self.inline_boundary_index(end);
        self.tree.insert_inline_at(end.paragraph, end_index, end_marker);
        let start_marker = self.tree.alloc(Node::CommentStart { id, author: author.clone() });
        let start_index = self.inline_boundary_index(start);
        self.tree.insert_inline_at(start.paragraph, start_index, start_marker);

        entry.revision_id = Some(id);
        entry.marker_data.push(MarkerInfo::Comment { id, author });
        entry.insert_position = self.logical(start);
        entry.end_position = self.logical(end);
        self.finalize(entry)
    }

    pub fn delete_comment(&mut self, id: Uuid) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(ActionKind::DeleteComment);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        let mut victims = vec![];
        let mut author = String::new();
        for &section in &self.tree.sections {
            self.collect_comment_markers(section, id, &mut victims, &mut author);
        }
        if victims.is_empty() {
            return vec![];
        }
        if let Some(position) = victims
            .first()
            .and_then(|&marker| self.tree.parent(marker))
            .map(|paragraph| TextPosition { paragraph, offset: 0 })
        {
            entry.insert_position = self.logical(position);
            entry.end_position = entry.insert_position.clone();
        }
        for victim in victims {
            self.tree.remove_inline(victim);
            self.tree.release_subtree(victim);
        }
        entry.revision_id = Some(id);
        entry.marker_data.push(MarkerInfo::Comment { id, author });
        self.finalize(entry)
    }

    fn collect_comment_markers(
        &self, node: NodeId, id: Uuid, victims: &mut Vec<NodeId>, author: &mut String,
    ) {
        match self.tree.node(node) {
            Some(Node::CommentStart { id: marker, author: a }) if *marker == id => {
                *author = a.clone();
                victims.push(node);
            }
            Some(Node::CommentEnd { id: marker }) if *marker == id => victims.push(node),
            _ => {}
        }
        for child in self.tree.child_ids(node) {
            self.collect_comment_markers(child, id, victims, author);
        }
    }

    /// Inserts a field start/end pair at the caret.
    pub fn insert_field(&mut self, kind: FieldKind) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(ActionKind::InsertField);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        let caret = self.caret();
        entry.insert_position = self.logical(caret);
        let end_marker = self.tree.alloc(Node::FieldEnd);
        let start_marker = self.tree.alloc(Node::FieldStart { kind });
        let index = self.inline_boundary_index(caret);
        self.tree.insert_inline_at(caret.paragraph, index, end_marker);
        self.tree.insert_inline_at(caret.paragraph, index, start_marker);

        let after = TextPosition { paragraph: caret.paragraph, offset: caret.offset + 2 };
        self.selection = Selection::caret(after);
        entry.end_position = self.logical(after);
        entry.removed_nodes.push(RemovedNode::Field { kind });
        entry.marker_data.push(MarkerInfo::Field { kind });
        if self.collaborative_editing {
            entry.start_index = self.tree.absolute_offset(caret);
            entry.end_index = self.tree.absolute_offset(after);
        }
        self.finalize(entry)
    }

    /// Inserts a footnote/endnote anchor at the caret whose body holds one
    /// paragraph of `text`.
    pub fn insert_footnote(&mut self, kind: FootnoteKind, text: &str) -> Vec<Operation> {
        let action = match kind {
            FootnoteKind::Footnote => ActionKind::InsertFootnote,
            FootnoteKind::Endnote => ActionKind::InsertEndnote,
        };
        let mut entry = HistoryEntry::new(action);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        let caret = self.caret();
        entry.insert_position = self.logical(caret);

        let run = self.tree.new_text_run(text, Default::default());
        let paragraph = self.tree.new_paragraph();
        self.tree.insert_inline_at(paragraph, 0, run);
        let footnote =
            self.tree.alloc(Node::Footnote(Footnote { kind, blocks: vec![paragraph] }));
        self.tree.set_parent(paragraph, Some(footnote));
        self.insert_inline_at_caret(footnote);

        let after = TextPosition { paragraph: caret.paragraph, offset: caret.offset + 1 };
        self.selection = Selection::caret(after);
        entry.end_position = self.logical(after);
        if self.collaborative_editing {
            entry.start_index = self.tree.absolute_offset(caret);
            entry.end_index = self.tree.absolute_offset(after);
        }
        self.finalize(entry)
    }

    /// Brackets the selection with an editable-range for `user`.
    pub fn insert_edit_range(&mut self, user: &str) -> Vec<Operation> {
        let mut entry = HistoryEntry::new(ActionKind::InsertEditRange);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        let (start, end) = self.ordered_selection();
        let end_marker = self.tree.alloc(Node::EditRangeEnd);
        let end_index = self.inline_boundary_index(end);
        self.tree.insert_inline_at(end.paragraph, end_index, end_marker);
        let start_marker = self.tree.alloc(Node::EditRangeStart { user: user.to_string() });
        let start_index = self.inline_boundary_index(start);
        self.tree.insert_inline_at(start.paragraph, start_index, start_marker);

        entry.removed_nodes.push(RemovedNode::EditRange { user: user.to_string() });
        entry.marker_data.push(MarkerInfo::EditRange { user: user.to_string() });
        entry.insert_position = self.logical(start);
        entry.end_position = self.logical(end);
        self.finalize(entry)
    }

    // ----- headers/footers ---------------------------------------------------

    pub fn add_header(&mut self, text: &str) -> NodeId {
        let run = self.tree.new_text_run(text, Default::default());
        let paragraph = self.tree.new_paragraph();
        self.tree.insert_inline_at(paragraph, 0, run);
        self.tree
            .headers_footers
            .push(HeaderFooter { kind: HeaderFooterKind::Header, blocks: vec![paragraph] });
        paragraph
    }

    /// Clears a header/footer container, snapshotting its blocks.
    pub fn delete_header_footer(&mut self, container: usize) -> Vec<Operation> {
        if container >= self.tree.headers_footers.len() {
            return vec![];
        }
        let mut entry = HistoryEntry::new(ActionKind::DeleteHeaderFooter);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);

        let blocks = std::mem::take(&mut self.tree.headers_footers[container].blocks);
        let mut length = 0;
        for &block in &blocks {
            length += self.tree.block_length(block).0;
            entry.removed_nodes.push(RemovedNode::Node(block));
        }
        entry.header_footer_start = Some(0.into());
        entry.header_footer_end = Some(length.into());
        entry.row_index = Some(container);

        let empty = self.tree.new_paragraph();
        self.tree.headers_footers[container].blocks.push(empty);
        entry.insert_position = Some(LogicalIndex::new(format!("HF;{container};0;0")));
        entry.end_position = entry.insert_position.clone();
        self.finalize(entry)
    }

    // ----- tracked changes ---------------------------------------------------

    /// Accepts a tracked change: an insertion keeps its content and sheds
    /// the revision marks, a deletion removes the marked content.
    pub fn accept_change(&mut self, revision_id: Uuid) -> Vec<Operation> {
        self.resolve_change(revision_id, ActionKind::AcceptChange)
    }

    /// Rejects a tracked change: an insertion removes its content, a
    /// deletion keeps the content and sheds the marks.
    pub fn reject_change(&mut self, revision_id: Uuid) -> Vec<Operation> {
        self.resolve_change(revision_id, ActionKind::RejectChange)
    }

    fn resolve_change(&mut self, revision_id: Uuid, action: ActionKind) -> Vec<Operation> {
        let Some(revision) = self.revisions.get(revision_id).cloned() else {
            warn!(%revision_id, "revision absent; accept/reject is a no-op");
            return vec![];
        };
        let mut entry = HistoryEntry::new(action);
        entry.update_selection(&self.tree, self.selection, self.collaborative_editing);
        entry.revision_id = Some(revision_id);
        entry.marker_data.push(MarkerInfo::Revision {
            id: revision.id,
            kind: revision.kind,
            author: revision.author.clone(),
            date: revision.date,
            split_revisions: vec![],
        });

        let marked = self.runs_marked_with(revision_id);
        let keeps_content = matches!(
            (action, revision.kind),
            (ActionKind::AcceptChange, RevisionKind::Insertion)
                | (ActionKind::RejectChange, RevisionKind::Deletion)
        );

        if let Some((start, end)) = self.marked_span(&marked) {
            entry.insert_position = self.logical(start);
            entry.end_position = self.logical(end);
            if self.collaborative_editing {
                entry.start_index = self.tree.absolute_offset(start);
                entry.end_index = self.tree.absolute_offset(end);
            }
        }

        if keeps_content {
            for run in marked {
                if let Some(Node::TextRun(text_run)) = self.tree.node_mut(run) {
                    text_run.revision_ids.retain(|&id| id != revision_id);
                }
            }
        } else {
            for run in marked {
                self.tree.remove_inline(run);
                entry.removed_nodes.push(RemovedNode::Node(run));
            }
        }
        self.revisions.remove(revision_id);
        self.finalize(entry)
    }

    pub(crate) fn runs_marked_with(&self, revision_id: Uuid) -> Vec<NodeId> {
        let mut marked = vec![];
        for &section in &self.tree.sections {
            self.collect_marked(section, revision_id, &mut marked);
        }
        marked
    }

    fn collect_marked(&self, node: NodeId, revision_id: Uuid, marked: &mut Vec<NodeId>) {
        if let Some(Node::TextRun(run)) = self.tree.node(node) {
            if run.revision_ids.contains(&revision_id) {
                marked.push(node);
            }
        }
        for child in self.tree.child_ids(node) {
            self.collect_marked(child, revision_id, marked);
        }
    }

    fn marked_span(&self, marked: &[NodeId]) -> Option<(TextPosition, TextPosition)> {
        let first = *marked.first()?;
        let last = *marked.last()?;
        let start_paragraph = self.tree.parent(first)?;
        let end_paragraph = self.tree.parent(last)?;
        let start_offset = self.offset_of_inline(start_paragraph, first)?;
        let end_offset =
            self.offset_of_inline(end_paragraph, last)? + self.tree.inline_length(last).0;
        Some((
            TextPosition { paragraph: start_paragraph, offset: start_offset },
            TextPosition { paragraph: end_paragraph, offset: end_offset },
        ))
    }

    fn offset_of_inline(&self, paragraph: NodeId, inline: NodeId) -> Option<usize> {
        let mut offset = 0;
        for child in self.tree.child_ids(paragraph) {
            if child == inline {
                return Some(offset);
            }
            offset += self.tree.inline_length(child).0;
        }
        None
    }

    // ----- undo/redo ---------------------------------------------------------

    /// Reverts the newest entry; returns the operations describing the
    /// revert when collaborative editing is enabled.
    pub fn undo(&mut self) -> Vec<Operation> {
        let Some(mut entry) = self.history.pop_undo() else { return vec![] };
        let operations = self.revert_entry(&mut entry, Direction::Undo);
        self.history.push_reverted(entry, Direction::Undo);
        operations
    }

    pub fn redo(&mut self) -> Vec<Operation> {
        let Some(mut entry) = self.history.pop_redo() else { return vec![] };
        let operations = self.revert_entry(&mut entry, Direction::Redo);
        self.history.push_reverted(entry, Direction::Redo);
        operations
    }
}
