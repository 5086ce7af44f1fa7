//! In-place entry reversion.
//!
//! Reverting does not allocate an inverse record: the entry is mutated so
//! that, after the revert, it describes the opposite edit and can be filed on
//! the opposite stack. Content entries swap their node snapshots with the
//! live content they displace; property entries swap snapshots through
//! [crate::history::properties::add_modified_properties]; structural entries
//! toggle between attached and detached structure.
//!
//! A position that no longer resolves downgrades the revert to a warned
//! no-op rather than corrupting the tree.

use std::mem;

use serde_json::Value;

use crate::history::action::{ActionKind, cell_property_name, row_property_name, table_property_name};
use crate::history::entry::{HistoryEntry, RemovedNode};
use crate::history::properties::{FormatKind, PropertyCursor};
use crate::history::stack::Direction;
use crate::model::position::{Selection, TextPosition};
use crate::model::revision::Revision;
use crate::model::tree::{DocumentTree, Node, NodeId};
use crate::sync::builder;
use crate::sync::operation::{MarkerInfo, Operation};
use crate::DocumentEditor;

impl DocumentEditor {
    /// Applies the inverse of `entry` to the document and inverts the entry
    /// in place. Returns the operation batch describing the revert when
    /// collaborative editing is enabled.
    pub(crate) fn revert_entry(
        &mut self, entry: &mut HistoryEntry, direction: Direction,
    ) -> Vec<Operation> {
        // the revert swaps the entry's snapshots for live content, so the
        // wire form of the restored content is captured first
        let restored = if self.collaborative_editing() {
            Some(builder::restored_content(&self.tree, &entry.removed_nodes))
        } else {
            None
        };
        let prior_span =
            entry.normalized_indexes().map(|(start, end)| (start.0, (end - start).0));

        if entry.action.is_table_structural() {
            self.revert_table_structure(entry, direction);
        } else if entry.action.is_format_action() {
            self.revert_properties(entry, direction);
        } else {
            match entry.action {
                ActionKind::InsertBookmark | ActionKind::DeleteBookmark => {
                    self.revert_bookmark(entry);
                }
                ActionKind::InsertComment | ActionKind::DeleteComment => {
                    self.revert_comment(entry);
                }
                ActionKind::InsertField => self.revert_field(entry),
                ActionKind::InsertEditRange | ActionKind::DeleteEditRange => {
                    self.revert_edit_range(entry);
                }
                ActionKind::DeleteHeaderFooter => self.revert_header_footer(entry),
                ActionKind::AcceptChange | ActionKind::RejectChange => {
                    self.revert_change_resolution(entry, direction);
                }
                _ => self.revert_content(entry, direction),
            }
        }

        if self.collaborative_editing() {
            builder::action_info(entry, &self.tree, &self.revisions, direction, restored, prior_span)
        } else {
            vec![]
        }
    }

    /// Content entries: deletes whatever the entry's position span currently
    /// covers, reinserts the stored snapshots at the collapsed caret, and
    /// stores the freshly deleted content in their place. An entry whose
    /// positions coincide is a pure reinsert; one with no snapshots is a
    /// pure delete. Repeating the call toggles the two states.
    fn revert_content(&mut self, entry: &mut HistoryEntry, direction: Direction) {
        if entry.revision_id.is_some() && entry.action.is_delete_family() {
            return self.revert_tracked_delete(entry, direction);
        }
        let Some(start) = entry
            .insert_position
            .as_ref()
            .and_then(|index| self.tree.text_pos_from_logical_index(index).ok())
        else {
            warn!("entry positions no longer resolve; revert is a no-op");
            return;
        };
        let end = entry
            .effective_end_position()
            .and_then(|index| self.tree.text_pos_from_logical_index(index).ok())
            .unwrap_or(start);

        self.selection = Selection { start, end };
        let deleted = if start == end { vec![] } else { self.delete_selected_contents() };
        let stored = mem::take(&mut entry.removed_nodes);
        let new_end = self.reinsert_removed(stored);
        entry.removed_nodes = deleted;
        entry.end_revision_logical_index = None;

        let caret = self.caret();
        entry.insert_position = self.logical(caret);
        entry.end_position = self.logical(new_end);
        if self.collaborative_editing() {
            entry.insert_index = self.tree.absolute_offset(caret);
            entry.start_index = entry.insert_index;
            entry.end_index = self.tree.absolute_offset(new_end);
        }
        self.selection = Selection { start: caret, end: new_end };
    }

    /// Tracked deletions mark non-owned runs and hard-delete owned ones.
    /// Undo strips the marks and reinserts the hard-deleted runs; redo
    /// replays the split decision over the originally captured span.
    fn revert_tracked_delete(&mut self, entry: &mut HistoryEntry, direction: Direction) {
        let Some(revision_id) = entry.revision_id else { return };
        match direction {
            Direction::Undo => {
                for run in self.runs_marked_with(revision_id) {
                    if let Some(Node::TextRun(text_run)) = self.tree.node_mut(run) {
                        text_run.revision_ids.retain(|&id| id != revision_id);
                    }
                }
                let Some(start) = entry
                    .insert_position
                    .as_ref()
                    .and_then(|index| self.tree.text_pos_from_logical_index(index).ok())
                else {
                    warn!("tracked delete anchor no longer resolves; content not restored");
                    return;
                };
                self.selection = Selection::caret(start);
                let stored = mem::take(&mut entry.removed_nodes);
                let end = self.reinsert_removed(stored);
                self.selection = Selection { start, end };
            }
            Direction::Redo => {
                let start = entry
                    .selection_start
                    .as_ref()
                    .and_then(|index| self.tree.text_pos_from_logical_index(index).ok());
                let end = entry
                    .selection_end
                    .as_ref()
                    .and_then(|index| self.tree.text_pos_from_logical_index(index).ok());
                let (Some(start), Some(end)) = (start, end) else {
                    warn!("tracked delete span no longer resolves; redo is a no-op");
                    return;
                };
                self.selection = Selection { start, end };
                for run in self.covered_runs() {
                    let owned = self
                        .revisions
                        .covering_insertion(&self.tree, run)
                        .map(|revision| revision.author == self.revisions.current_author)
                        .unwrap_or(false);
                    if owned {
                        self.tree.remove_inline(run);
                        entry.removed_nodes.push(RemovedNode::Node(run));
                    } else if let Some(Node::TextRun(text_run)) = self.tree.node_mut(run) {
                        text_run.revision_ids.push(revision_id);
                    }
                }
                self.selection = Selection::caret(self.ordered_selection().0);
            }
            Direction::Forward => {}
        }
    }

    /// Reinserts detached snapshots at the caret, walking them in reverse of
    /// removal order. Returns the position just past the reinserted content.
    ///
    /// A reinserted paragraph splits the caret paragraph and absorbs its
    /// tail, restoring a merged paragraph boundary. Non-paragraph blocks
    /// land between the caret paragraph and an already-reinserted successor;
    /// with no successor the caret offset decides the side. Inlines stack at
    /// the caret boundary, so reverse order restores document order.
    pub(crate) fn reinsert_removed(&mut self, removed: Vec<RemovedNode>) -> TextPosition {
        let caret = self.caret();
        let mut end = caret;
        let mut saw_paragraph = false;
        let mut inline_length = 0;

        for node in removed.into_iter().rev() {
            let RemovedNode::Node(id) = node else { continue };
            match self.tree.node(id) {
                Some(Node::Paragraph(paragraph)) => {
                    let head_length: usize = paragraph
                        .inlines
                        .clone()
                        .into_iter()
                        .map(|inline| self.tree.inline_length(inline).0)
                        .sum();
                    self.insert_paragraph_block_at_caret(id);
                    // the reversed walk reaches the selection's end paragraph
                    // first; paragraphs after it are interior and must not
                    // move the end position
                    if !saw_paragraph {
                        end = TextPosition { paragraph: id, offset: head_length };
                    }
                    saw_paragraph = true;
                }
                Some(Node::Table(_)) => {
                    let after = saw_paragraph || caret.offset > 0;
                    self.insert_block_near_caret(id, after);
                }
                Some(_) => {
                    self.insert_inline_at_caret(id);
                    inline_length += self.tree.inline_length(id).0;
                }
                None => warn!("removed snapshot no longer allocated; skipping"),
            }
        }
        if !saw_paragraph {
            end = TextPosition { paragraph: caret.paragraph, offset: caret.offset + inline_length };
        }
        end
    }

    /// Format entries: walks the stored snapshots with a fresh cursor and
    /// swaps each against the live format it targets.
    fn revert_properties(&mut self, entry: &mut HistoryEntry, direction: Direction) {
        let start = entry
            .selection_start
            .as_ref()
            .and_then(|index| self.tree.text_pos_from_logical_index(index).ok());
        let end = entry
            .selection_end
            .as_ref()
            .and_then(|index| self.tree.text_pos_from_logical_index(index).ok());
        if let (Some(start), Some(end)) = (start, end) {
            self.selection = Selection { start, end };
        } else {
            warn!("format selection no longer resolves; reverting against current selection");
        }

        let mut cursor = PropertyCursor::default();
        // each helper consumes one contiguous group of snapshots of its kind
        loop {
            if cursor.index >= entry.modified_properties.len() {
                break;
            }
            let kind = entry.modified_properties[cursor.index].kind;
            let before = cursor.index;
            match kind {
                FormatKind::Character => self.revert_run_property(entry, &mut cursor, direction),
                FormatKind::Paragraph => {
                    self.revert_paragraph_property(entry, &mut cursor, direction)
                }
                FormatKind::Section => self.revert_section_property(entry, &mut cursor, direction),
                FormatKind::Table | FormatKind::Row | FormatKind::Cell => {
                    self.revert_table_family_property(entry, kind, &mut cursor, direction)
                }
                FormatKind::ListLevel
                | FormatKind::ContinueNumbering
                | FormatKind::RestartNumbering => {
                    self.revert_numbering_property(entry, &mut cursor, direction)
                }
            }
            if cursor.index == before {
                warn!(?kind, "snapshot replay made no progress; abandoning revert");
                break;
            }
        }
    }

    /// One character snapshot restores one covered run, in selection order.
    /// Runs the layout split since capture are healed by the snapshot store.
    fn revert_run_property(
        &mut self, entry: &mut HistoryEntry, cursor: &mut PropertyCursor, direction: Direction,
    ) {
        let runs = self.covered_runs();
        let property = entry.modified_properties[cursor.index].property.clone();
        for run in runs {
            if cursor.index >= entry.modified_properties.len()
                || entry.modified_properties[cursor.index].kind != FormatKind::Character
            {
                break;
            }
            let (snapshot, length) = match self.tree.node(run) {
                Some(Node::TextRun(text_run)) => (
                    crate::history::properties::character_snapshot(&text_run.format),
                    DocumentTree::grapheme_len(&text_run.text),
                ),
                _ => continue,
            };
            let previous = entry.add_modified_properties(
                cursor,
                direction,
                FormatKind::Character,
                snapshot,
                property.as_deref(),
                Value::Null,
                Some(length),
            );
            if let Some(Node::TextRun(text_run)) = self.tree.node_mut(run) {
                match &property {
                    Some(name) => text_run.format.set_property(name, &previous),
                    None => {
                        if let Ok(format) = serde_json::from_value(previous) {
                            text_run.format = format;
                        }
                    }
                }
            }
        }
    }

    fn revert_paragraph_property(
        &mut self, entry: &mut HistoryEntry, cursor: &mut PropertyCursor, direction: Direction,
    ) {
        let property = entry.modified_properties[cursor.index].property.clone();
        for paragraph in self.covered_paragraphs() {
            if cursor.index >= entry.modified_properties.len()
                || entry.modified_properties[cursor.index].kind != FormatKind::Paragraph
            {
                break;
            }
            let snapshot = match self.tree.node(paragraph) {
                Some(Node::Paragraph(p)) => {
                    crate::history::properties::paragraph_snapshot(&p.format)
                }
                _ => continue,
            };
            let previous = entry.add_modified_properties(
                cursor,
                direction,
                FormatKind::Paragraph,
                snapshot,
                property.as_deref(),
                Value::Null,
                None,
            );
            if let Some(Node::Paragraph(p)) = self.tree.node_mut(paragraph) {
                match &property {
                    Some(name) => p.format.set_property(name, &previous),
                    None => {
                        if let Ok(format) = serde_json::from_value(previous) {
                            p.format = format;
                        }
                    }
                }
            }
        }
    }

    fn revert_section_property(
        &mut self, entry: &mut HistoryEntry, cursor: &mut PropertyCursor, direction: Direction,
    ) {
        let section = self.tree.sections[0];
        let property = entry.modified_properties[cursor.index].property.clone();
        let snapshot = match self.tree.node(section) {
            Some(Node::Section(s)) => crate::history::properties::section_snapshot(&s.format),
            _ => return,
        };
        let previous = entry.add_modified_properties(
            cursor,
            direction,
            FormatKind::Section,
            snapshot,
            property.as_deref(),
            Value::Null,
            None,
        );
        if let Some(Node::Section(s)) = self.tree.node_mut(section) {
            match &property {
                Some(name) => s.format.set_property(name, &previous),
                None => {
                    if let Ok(format) = serde_json::from_value(previous) {
                        s.format = format;
                    }
                }
            }
        }
    }

    /// Table/row/cell snapshots resolve their target through the covering
    /// structure of the selection start.
    fn revert_table_family_property(
        &mut self, entry: &mut HistoryEntry, kind: FormatKind, cursor: &mut PropertyCursor,
        direction: Direction,
    ) {
        let caret = self.caret();
        let Some(cell) = self.tree.covering_cell(caret.paragraph) else {
            warn!("selection left the table; format snapshot not restored");
            cursor.index += 1;
            return;
        };
        let property = entry.modified_properties[cursor.index].property.clone();
        let action = entry.action;

        match kind {
            FormatKind::Table => {
                let Some(table) = self.tree.owner_table(cell) else { return };
                let snapshot = match self.tree.node(table) {
                    Some(Node::Table(t)) => crate::history::properties::table_snapshot(&t.format),
                    _ => return,
                };
                let name =
                    property.clone().or(table_property_name(action).map(str::to_string));
                let previous = entry.add_modified_properties(
                    cursor,
                    direction,
                    kind,
                    snapshot,
                    property.as_deref(),
                    Value::Null,
                    None,
                );
                if let Some(Node::Table(t)) = self.tree.node_mut(table) {
                    match name {
                        Some(name) => t.format.set_property(&name, &previous),
                        None => {
                            if let Ok(format) = serde_json::from_value(previous) {
                                t.format = format;
                            }
                        }
                    }
                }
            }
            FormatKind::Row => {
                let Some(row) = self.tree.parent(cell) else { return };
                let snapshot = match self.tree.node(row) {
                    Some(Node::Row(r)) => crate::history::properties::row_snapshot(&r.format),
                    _ => return,
                };
                let name = property.clone().or(row_property_name(action).map(str::to_string));
                let previous = entry.add_modified_properties(
                    cursor,
                    direction,
                    kind,
                    snapshot,
                    property.as_deref(),
                    Value::Null,
                    None,
                );
                if let Some(Node::Row(r)) = self.tree.node_mut(row) {
                    match name {
                        Some(name) => r.format.set_property(&name, &previous),
                        None => {
                            if let Ok(format) = serde_json::from_value(previous) {
                                r.format = format;
                            }
                        }
                    }
                }
            }
            FormatKind::Cell => {
                let snapshot = match self.tree.node(cell) {
                    Some(Node::Cell(c)) => crate::history::properties::cell_snapshot(&c.format),
                    _ => return,
                };
                let name = property.clone().or(cell_property_name(action).map(str::to_string));
                let previous = entry.add_modified_properties(
                    cursor,
                    direction,
                    kind,
                    snapshot,
                    property.as_deref(),
                    Value::Null,
                    None,
                );
                if let Some(Node::Cell(c)) = self.tree.node_mut(cell) {
                    match name {
                        Some(name) => c.format.set_property(&name, &previous),
                        None => {
                            if let Ok(format) = serde_json::from_value(previous) {
                                c.format = format;
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn revert_numbering_property(
        &mut self, entry: &mut HistoryEntry, cursor: &mut PropertyCursor, direction: Direction,
    ) {
        for paragraph in self.covered_paragraphs() {
            if cursor.index >= entry.modified_properties.len() {
                break;
            }
            let kind = entry.modified_properties[cursor.index].kind;
            if !matches!(
                kind,
                FormatKind::ListLevel | FormatKind::ContinueNumbering | FormatKind::RestartNumbering
            ) {
                break;
            }
            let snapshot = match self.tree.node(paragraph) {
                Some(Node::Paragraph(p)) => {
                    serde_json::to_value(&p.format.list_format).unwrap_or(Value::Null)
                }
                _ => continue,
            };
            let previous =
                entry.add_modified_properties(cursor, direction, kind, snapshot, None, Value::Null, None);
            if let Some(Node::Paragraph(p)) = self.tree.node_mut(paragraph) {
                if let Ok(list_format) = serde_json::from_value(previous) {
                    p.format.list_format = list_format;
                }
            }
        }
    }

    // ----- structural table reverts ------------------------------------------

    /// Structural entries toggle between "structure attached" and "structure
    /// detached into the entry". Fragmented tables are re-combined before
    /// any reattachment so indices address the logical table.
    fn revert_table_structure(&mut self, entry: &mut HistoryEntry, _direction: Direction) {
        match entry.action {
            ActionKind::DeleteTable => self.toggle_table_block(entry),
            ActionKind::DeleteRow | ActionKind::InsertRowAbove | ActionKind::InsertRowBelow => {
                self.toggle_rows(entry)
            }
            ActionKind::DeleteColumn
            | ActionKind::InsertColumnLeft
            | ActionKind::InsertColumnRight => self.toggle_column(entry),
            ActionKind::MergeCells => self.toggle_merge(entry),
            ActionKind::ClearCells => self.toggle_cleared_cells(entry),
            _ => warn!(action = ?entry.action, "not a structural toggle; revert skipped"),
        }
    }

    fn resolve_caret(&mut self, entry: &HistoryEntry) -> Option<TextPosition> {
        let position = entry
            .insert_position
            .as_ref()
            .and_then(|index| self.tree.text_pos_from_logical_index(index).ok());
        if position.is_none() {
            warn!("structural anchor no longer resolves; revert is a no-op");
        }
        position
    }

    fn toggle_table_block(&mut self, entry: &mut HistoryEntry) {
        let Some(caret) = self.resolve_caret(entry) else { return };
        self.selection = Selection::caret(caret);

        if entry.removed_nodes.is_empty() {
            // redo: the reinserted table sits next to the caret paragraph
            let Some(parent) = self.tree.parent(caret.paragraph) else { return };
            let Some(index) = self.tree.child_index(caret.paragraph) else { return };
            let siblings = self.tree.child_ids(parent);
            let neighbor = if caret.offset == 0 && index > 0 {
                siblings.get(index - 1).copied()
            } else {
                siblings.get(index + 1).copied()
            };
            let Some(table) = neighbor.filter(|&id| self.tree.is_table(id)) else {
                warn!("no table adjacent to caret; delete not replayed");
                return;
            };
            self.tree.combine_widget(table);
            if self.collaborative_editing() {
                entry.start_index = self.tree.position_info_for_header_footer(table);
                entry.end_index =
                    entry.start_index.map(|start| start + self.tree.block_length(table));
            }
            self.tree.remove_block(table);
            entry.removed_nodes.push(RemovedNode::Node(table));
        } else {
            let stored = mem::take(&mut entry.removed_nodes);
            let end = self.reinsert_removed(stored);
            let _ = end;
            if self.collaborative_editing() {
                let Some(parent) = self.tree.parent(caret.paragraph) else { return };
                let Some(index) = self.tree.child_index(caret.paragraph) else { return };
                let siblings = self.tree.child_ids(parent);
                let neighbor = if caret.offset == 0 && index > 0 {
                    siblings.get(index - 1).copied()
                } else {
                    siblings.get(index + 1).copied()
                };
                if let Some(table) = neighbor.filter(|&id| self.tree.is_table(id)) {
                    entry.start_index = self.tree.position_info_for_header_footer(table);
                    entry.end_index =
                        entry.start_index.map(|start| start + self.tree.block_length(table));
                }
            }
        }
    }

    fn anchor_table(&mut self, entry: &HistoryEntry) -> Option<NodeId> {
        let caret = self.resolve_caret(entry)?;
        let table = self.tree.owner_table(caret.paragraph).or_else(|| {
            // the caret may sit just outside the table (last row deleted)
            let parent = self.tree.parent(caret.paragraph)?;
            let index = self.tree.child_index(caret.paragraph)?;
            let siblings = self.tree.child_ids(parent);
            [index.wrapping_sub(1), index + 1]
                .into_iter()
                .filter_map(|i| siblings.get(i).copied())
                .find(|&id| self.tree.is_table(id))
        })?;
        self.tree.combine_widget(table);
        Some(table)
    }

    fn toggle_rows(&mut self, entry: &mut HistoryEntry) {
        let Some(table) = self.anchor_table(entry) else {
            warn!("row toggle without an anchor table; revert is a no-op");
            return;
        };
        let Some(row_index) = entry.row_index else { return };

        if entry.removed_nodes.is_empty() {
            let rows = self.tree.child_ids(table);
            let count = entry.structure_count.max(1);
            let mut detached = crate::model::offset_types::RelCharOffset(0);
            for offset in 0..count {
                let Some(&row) = rows.get(row_index + offset) else { break };
                if self.collaborative_editing() && offset == 0 {
                    entry.start_index = self.tree.position_info_for_header_footer(row);
                }
                detached += self.tree.row_length(row);
                self.detach_row(table, row);
                entry.removed_nodes.push(RemovedNode::Node(row));
            }
            if self.collaborative_editing() {
                entry.end_index = entry.start_index.map(|start| start + detached);
            }
        } else {
            let stored = mem::take(&mut entry.removed_nodes);
            for (offset, node) in stored.into_iter().enumerate() {
                let RemovedNode::Node(row) = node else { continue };
                self.attach_row(table, row_index + offset, row);
                if self.collaborative_editing() && offset == 0 {
                    entry.start_index = self.tree.position_info_for_header_footer(row);
                    entry.end_index =
                        entry.start_index.map(|start| start + self.tree.row_length(row));
                }
            }
        }
        if let Some(position) = self.tree.start_position_of(table) {
            self.selection = Selection::caret(position);
        }
    }

    fn toggle_column(&mut self, entry: &mut HistoryEntry) {
        let Some(table) = self.anchor_table(entry) else {
            warn!("column toggle without an anchor table; revert is a no-op");
            return;
        };
        let Some(column) = entry.cell_index else { return };

        if entry.removed_nodes.is_empty() {
            for row in self.tree.child_ids(table) {
                let cells = self.tree.child_ids(row);
                let Some(&cell) = cells.get(column) else { continue };
                self.detach_cell(row, cell);
                entry.removed_nodes.push(RemovedNode::Node(cell));
            }
            entry.structure_count = entry.removed_nodes.len();
        } else {
            let stored = mem::take(&mut entry.removed_nodes);
            let rows = self.tree.child_ids(table);
            for (row, node) in rows.into_iter().zip(stored) {
                let RemovedNode::Node(cell) = node else { continue };
                self.attach_cell(row, column, cell);
            }
        }
        if let Some(position) = self.tree.start_position_of(table) {
            self.selection = Selection::caret(position);
        }
    }

    fn toggle_merge(&mut self, entry: &mut HistoryEntry) {
        let Some(caret) = self.resolve_caret(entry) else { return };
        let Some(cell) = self.tree.covering_cell(caret.paragraph) else { return };
        let Some(row) = self.tree.parent(cell) else { return };
        if let Some(table) = self.tree.owner_table(row) {
            self.tree.combine_widget(table);
        }
        let Some(from) = entry.cell_index else { return };

        if entry.removed_nodes.is_empty() {
            // redo: merge again, re-capturing the originals
            let to = from + entry.structure_count.saturating_sub(1);
            let merged = self.merge_cell_range(row, from, to, entry);
            if let Some(position) = self.tree.start_position_of(merged) {
                self.selection = Selection::caret(position);
            }
        } else {
            // undo: discard the merged cell, restore the originals
            let cells = self.tree.child_ids(row);
            if let Some(&merged) = cells.get(from) {
                self.detach_cell(row, merged);
                self.tree.release_subtree(merged);
            }
            let stored = mem::take(&mut entry.removed_nodes);
            for (offset, node) in stored.into_iter().enumerate() {
                let RemovedNode::Node(original) = node else { continue };
                self.attach_cell(row, from + offset, original);
            }
            if let Some(position) = self
                .tree
                .child_ids(row)
                .get(from)
                .copied()
                .and_then(|cell| self.tree.start_position_of(cell))
            {
                self.selection = Selection::caret(position);
            }
        }
    }

    fn toggle_cleared_cells(&mut self, entry: &mut HistoryEntry) {
        let Some(caret) = self.resolve_caret(entry) else { return };
        let Some(cell) = self.tree.covering_cell(caret.paragraph) else { return };
        let Some(row) = self.tree.parent(cell) else { return };
        if let Some(table) = self.tree.owner_table(row) {
            self.tree.combine_widget(table);
        }
        let Some(from) = entry.cell_index else { return };
        let count = entry.structure_count.max(1);

        if entry.removed_nodes.is_empty() {
            // redo: clear again
            for column in from..from + count {
                let cells = self.tree.child_ids(row);
                let Some(&victim) = cells.get(column) else { continue };
                let format = match self.tree.node(victim) {
                    Some(Node::Cell(c)) => c.format.clone(),
                    _ => continue,
                };
                self.detach_cell(row, victim);
                entry.removed_nodes.push(RemovedNode::Node(victim));
                let paragraph = self.tree.new_paragraph();
                let replacement = self
                    .tree
                    .alloc(Node::Cell(crate::model::tree::Cell { format, blocks: vec![paragraph] }));
                self.tree.set_parent(paragraph, Some(replacement));
                self.attach_cell(row, column, replacement);
            }
        } else {
            // undo: swap the empty replacements back out
            let stored = mem::take(&mut entry.removed_nodes);
            for (offset, node) in stored.into_iter().enumerate() {
                let RemovedNode::Node(original) = node else { continue };
                let column = from + offset;
                let cells = self.tree.child_ids(row);
                if let Some(&replacement) = cells.get(column) {
                    self.detach_cell(row, replacement);
                    self.tree.release_subtree(replacement);
                }
                self.attach_cell(row, column, original);
            }
        }
        if let Some(position) = self
            .tree
            .child_ids(row)
            .get(from)
            .copied()
            .and_then(|cell| self.tree.start_position_of(cell))
        {
            self.selection = Selection::caret(position);
        }
    }

    // ----- non-text structure ------------------------------------------------

    /// Bookmarks toggle on existence: present markers are removed, absent
    /// ones are recreated at the entry's captured span.
    fn revert_bookmark(&mut self, entry: &mut HistoryEntry) {
        let Some(RemovedNode::Bookmark { name }) = entry.removed_nodes.first().cloned() else {
            warn!("bookmark entry without a descriptor; revert is a no-op");
            return;
        };
        if self.bookmark_positions(&name).is_some() {
            self.remove_bookmark_markers(&name);
            return;
        }
        let start = entry
            .insert_position
            .as_ref()
            .and_then(|index| self.tree.text_pos_from_logical_index(index).ok());
        let end = entry
            .end_position
            .as_ref()
            .and_then(|index| self.tree.text_pos_from_logical_index(index).ok());
        let (Some(start), Some(end)) = (start, end) else {
            warn!(%name, "bookmark span no longer resolves; not recreated");
            return;
        };
        let end_marker = self.tree.alloc(Node::BookmarkEnd { name: name.clone() });
        let end_index = self.inline_boundary_index(end);
        self.tree.insert_inline_at(end.paragraph, end_index, end_marker);
        let start_marker = self.tree.alloc(Node::BookmarkStart { name });
        let start_index = self.inline_boundary_index(start);
        self.tree.insert_inline_at(start.paragraph, start_index, start_marker);
    }

    fn revert_comment(&mut self, entry: &mut HistoryEntry) {
        let Some(MarkerInfo::Comment { id, author }) = entry.marker_data.peek().cloned() else {
            warn!("comment entry without marker data; revert is a no-op");
            return;
        };
        let mut victims = vec![];
        let mut found_author = String::new();
        for &section in &self.tree.sections.clone() {
            self.collect_comment_markers_for_revert(section, id, &mut victims, &mut found_author);
        }
        if !victims.is_empty() {
            for victim in victims {
                self.tree.remove_inline(victim);
                self.tree.release_subtree(victim);
            }
            return;
        }
        let start = entry
            .insert_position
            .as_ref()
            .and_then(|index| self.tree.text_pos_from_logical_index(index).ok());
        let end = entry
            .end_position
            .as_ref()
            .and_then(|index| self.tree.text_pos_from_logical_index(index).ok());
        let (Some(start), Some(end)) = (start, end) else {
            warn!(%id, "comment span no longer resolves; not recreated");
            return;
        };
        let end_marker = self.tree.alloc(Node::CommentEnd { id });
        let end_index = self.inline_boundary_index(end);
        self.tree.insert_inline_at(end.paragraph, end_index, end_marker);
        let start_marker = self.tree.alloc(Node::CommentStart { id, author });
        let start_index = self.inline_boundary_index(start);
        self.tree.insert_inline_at(start.paragraph, start_index, start_marker);
    }

    fn collect_comment_markers_for_revert(
        &self, node: NodeId, id: uuid::Uuid, victims: &mut Vec<NodeId>, author: &mut String,
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
            self.collect_comment_markers_for_revert(child, id, victims, author);
        }
    }

    /// Field pairs toggle at the captured caret: a pair present at the
    /// position is removed, an absent one reinserted.
    fn revert_field(&mut self, entry: &mut HistoryEntry) {
        let Some(RemovedNode::Field { kind }) = entry.removed_nodes.first().cloned() else {
            warn!("field entry without a descriptor; revert is a no-op");
            return;
        };
        let Some(caret) = self.resolve_caret(entry) else { return };

        let index = self.inline_boundary_index(caret);
        let inlines = self.tree.child_ids(caret.paragraph);
        let pair = match (inlines.get(index), inlines.get(index + 1)) {
            (Some(&start), Some(&end))
                if matches!(self.tree.node(start), Some(Node::FieldStart { .. }))
                    && matches!(self.tree.node(end), Some(Node::FieldEnd)) =>
            {
                Some((start, end))
            }
            _ => None,
        };
        match pair {
            Some((start, end)) => {
                self.tree.remove_inline(end);
                self.tree.release_subtree(end);
                self.tree.remove_inline(start);
                self.tree.release_subtree(start);
            }
            None => {
                let end_marker = self.tree.alloc(Node::FieldEnd);
                let start_marker = self.tree.alloc(Node::FieldStart { kind });
                self.tree.insert_inline_at(caret.paragraph, index, end_marker);
                self.tree.insert_inline_at(caret.paragraph, index, start_marker);
            }
        }
    }

    fn revert_edit_range(&mut self, entry: &mut HistoryEntry) {
        let Some(RemovedNode::EditRange { user }) = entry.removed_nodes.first().cloned() else {
            warn!("edit-range entry without a descriptor; revert is a no-op");
            return;
        };
        let mut victims = vec![];
        for &section in &self.tree.sections.clone() {
            self.collect_edit_range_markers(section, &user, &mut victims);
        }
        if !victims.is_empty() {
            for victim in victims {
                self.tree.remove_inline(victim);
                self.tree.release_subtree(victim);
            }
            return;
        }
        let start = entry
            .insert_position
            .as_ref()
            .and_then(|index| self.tree.text_pos_from_logical_index(index).ok());
        let end = entry
            .end_position
            .as_ref()
            .and_then(|index| self.tree.text_pos_from_logical_index(index).ok());
        let (Some(start), Some(end)) = (start, end) else {
            warn!(%user, "edit-range span no longer resolves; not recreated");
            return;
        };
        let end_marker = self.tree.alloc(Node::EditRangeEnd);
        let end_index = self.inline_boundary_index(end);
        self.tree.insert_inline_at(end.paragraph, end_index, end_marker);
        let start_marker = self.tree.alloc(Node::EditRangeStart { user });
        let start_index = self.inline_boundary_index(start);
        self.tree.insert_inline_at(start.paragraph, start_index, start_marker);
    }

    fn collect_edit_range_markers(&self, node: NodeId, user: &str, victims: &mut Vec<NodeId>) {
        match self.tree.node(node) {
            Some(Node::EditRangeStart { user: u }) if u == user => victims.push(node),
            Some(Node::EditRangeEnd) if !victims.is_empty() => victims.push(node),
            _ => {}
        }
        for child in self.tree.child_ids(node) {
            self.collect_edit_range_markers(child, user, victims);
        }
    }

    /// Header/footer clearing swaps the container's current blocks with the
    /// stored ones; undo and redo are the same swap.
    fn revert_header_footer(&mut self, entry: &mut HistoryEntry) {
        let Some(container) = entry.row_index else { return };
        if container >= self.tree.headers_footers.len() {
            warn!(container, "header/footer container gone; revert is a no-op");
            return;
        }
        let stored: Vec<NodeId> = mem::take(&mut entry.removed_nodes)
            .into_iter()
            .filter_map(|node| match node {
                RemovedNode::Node(id) => Some(id),
                _ => None,
            })
            .collect();
        let current = mem::replace(&mut self.tree.headers_footers[container].blocks, stored);
        let mut length = 0;
        for &block in &self.tree.headers_footers[container].blocks {
            length += self.tree.block_length(block).0;
        }
        entry.header_footer_start = Some(0.into());
        entry.header_footer_end = Some(length.into());
        for block in current {
            entry.removed_nodes.push(RemovedNode::Node(block));
        }
    }

    /// Undoing accept/reject restores the revision registration and either
    /// re-marks the kept content or reinserts the removed content; redo
    /// replays the resolution.
    fn revert_change_resolution(&mut self, entry: &mut HistoryEntry, direction: Direction) {
        let Some(MarkerInfo::Revision { id, kind, author, date, .. }) =
            entry.marker_data.peek().cloned()
        else {
            warn!("change resolution without revision marker; revert is a no-op");
            return;
        };

        let start = entry
            .insert_position
            .as_ref()
            .and_then(|index| self.tree.text_pos_from_logical_index(index).ok());
        let end = entry
            .end_position
            .as_ref()
            .and_then(|index| self.tree.text_pos_from_logical_index(index).ok());

        match direction {
            Direction::Undo => {
                self.revisions.restore(Revision { id, kind, author, date });
                if entry.removed_nodes.is_empty() {
                    // marks were stripped; reapply over the span
                    let (Some(start), Some(end)) = (start, end) else {
                        warn!(%id, "resolution span no longer resolves; marks not restored");
                        return;
                    };
                    self.selection = Selection { start, end };
                    for run in self.covered_runs() {
                        if let Some(Node::TextRun(text_run)) = self.tree.node_mut(run) {
                            if !text_run.revision_ids.contains(&id) {
                                text_run.revision_ids.push(id);
                            }
                        }
                    }
                } else {
                    // content was removed; put it back with its marks intact
                    let Some(start) = start else {
                        warn!(%id, "resolution anchor no longer resolves; content not restored");
                        return;
                    };
                    self.selection = Selection::caret(start);
                    let stored = mem::take(&mut entry.removed_nodes);
                    let new_end = self.reinsert_removed(stored);
                    self.selection = Selection { start, end: new_end };
                }
            }
            Direction::Redo => {
                let keeps_content = matches!(
                    (entry.action, kind),
                    (ActionKind::AcceptChange, crate::model::revision::RevisionKind::Insertion)
                        | (ActionKind::RejectChange, crate::model::revision::RevisionKind::Deletion)
                );
                if keeps_content {
                    for run in self.runs_marked_with(id) {
                        if let Some(Node::TextRun(text_run)) = self.tree.node_mut(run) {
                            text_run.revision_ids.retain(|&marked| marked != id);
                        }
                    }
                } else {
                    for run in self.runs_marked_with(id) {
                        self.tree.remove_inline(run);
                        entry.removed_nodes.push(RemovedNode::Node(run));
                    }
                }
                self.revisions.remove(id);
            }
            Direction::Forward => {}
        }
    }
}
