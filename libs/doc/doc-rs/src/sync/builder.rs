//! Synthesizes the operation batch describing a history entry.
//!
//! Called once per user action (forward) and once per undo/redo replay. All
//! offsets in a batch are absolute stream offsets; peers apply the batch in
//! array order, so every structural Delete precedes the Insert/Format
//! operations that compensate for it.

use serde_json::json;

use crate::history::action::ActionKind;
use crate::history::entry::{HistoryEntry, RemovedNode};
use crate::history::stack::Direction;
use crate::model::revision::{RevisionKind, RevisionTracker};
use crate::model::tree::{DocumentTree, Node, NodeId};
use crate::model::writer;
use crate::sync::operation::{MarkerInfo, Operation, OperationKind, OperationSubtype};

/// Snapshot of the content an entry holds detached, serialized before a
/// revert reattaches it. The revert swaps the entry's snapshots for live
/// content, so anything the batch must re-describe is captured up front.
#[derive(Clone, Debug, Default)]
pub struct RestoredContent {
    pub text: Option<String>,
    pub paste_content: Option<String>,
    pub length: usize,
    /// Whether a block node (paragraph/table) is part of the content; block
    /// restores need a structural Delete emitted before the Insert.
    pub has_block: bool,
}

/// Serializes an entry's detached snapshots for the wire. Single text runs
/// travel as plain text; anything structural travels as paste content.
pub fn restored_content(tree: &DocumentTree, removed: &[RemovedNode]) -> RestoredContent {
    let mut restored = RestoredContent::default();
    let mut parts = vec![];
    let mut only_text = String::new();
    let mut run_count = 0;

    for node in removed {
        let RemovedNode::Node(id) = node else { continue };
        match tree.node(*id) {
            Some(Node::TextRun(run)) => {
                restored.length += DocumentTree::grapheme_len(&run.text);
                only_text.push_str(&run.text);
                run_count += 1;
            }
            Some(Node::Paragraph(_)) | Some(Node::Table(_)) => {
                restored.length += tree.block_length(*id).0;
                restored.has_block = true;
            }
            Some(Node::Row(_)) => {
                restored.length += tree.row_length(*id).0;
                restored.has_block = true;
            }
            Some(Node::Cell(_)) => {
                restored.length += tree.cell_length(*id).0;
                restored.has_block = true;
            }
            Some(_) => {
                restored.length += tree.inline_length(*id).0;
            }
            None => continue,
        }
        parts.push(writer::write_node(tree, *id));
    }

    if restored.has_block || run_count != parts.len() {
        restored.paste_content = serde_json::to_string(&parts).ok();
    } else if run_count > 0 {
        restored.text = Some(only_text);
    }
    restored
}

/// Builds the operation batch for an entry. `restored` and `prior_span`
/// carry the entry's pre-revert snapshots and offset span for undo/redo
/// builds (the revert rewrites both); forward builds read the entry
/// directly.
pub fn action_info(
    entry: &mut HistoryEntry, tree: &DocumentTree, revisions: &RevisionTracker,
    direction: Direction, restored: Option<RestoredContent>, prior_span: Option<(usize, usize)>,
) -> Vec<Operation> {
    let restored = restored
        .or_else(|| {
            if direction == Direction::Forward && !entry.removed_nodes.is_empty() {
                Some(restored_content(tree, &entry.removed_nodes))
            } else {
                None
            }
        })
        .filter(|content| content.length > 0);

    let mut operations = vec![];
    let action = entry.action;

    if matches!(action, ActionKind::AcceptChange | ActionKind::RejectChange) {
        build_change_resolution(entry, direction, &mut operations);
    } else if action == ActionKind::DeleteHeaderFooter {
        build_header_footer(entry, direction, restored.as_ref(), &mut operations);
    } else if action.is_format_action() {
        build_format(entry, tree, direction, &mut operations);
    } else if action.is_table_structural() || action == ActionKind::InsertTable {
        build_structural(
            entry,
            tree,
            revisions,
            direction,
            restored.as_ref(),
            prior_span,
            &mut operations,
        );
    } else if is_marker_action(action) {
        build_marker(entry, direction, &mut operations);
    } else if action.is_insert_family() {
        build_insert(entry, direction, restored.as_ref(), prior_span, &mut operations);
    } else if action.is_delete_family() {
        build_delete(entry, tree, revisions, direction, restored.as_ref(), prior_span, &mut operations);
    } else {
        warn!(?action, "no operation family for action; empty batch");
    }

    // side channels flush behind the primary operations, in cell order
    entry.cell_operations.drain_into(&mut operations);
    entry.format_operations.drain_into(&mut operations);
    entry.revision_operations.drain_into(&mut operations);
    operations
}

fn is_marker_action(action: ActionKind) -> bool {
    matches!(
        action,
        ActionKind::InsertBookmark
            | ActionKind::DeleteBookmark
            | ActionKind::InsertComment
            | ActionKind::DeleteComment
            | ActionKind::InsertField
            | ActionKind::InsertEditRange
            | ActionKind::DeleteEditRange
    )
}

/// Normalized span, widened to length 1 when the capture was a zero-width
/// caret: BackSpace/Insert/Enter widen backwards, everything else forwards.
fn widened_span(entry: &HistoryEntry) -> Option<(usize, usize)> {
    let (mut start, mut end) = entry.normalized_indexes()?;
    if start == end {
        if entry.action.widens_start() {
            start = start - 1;
        } else {
            end = end + 1;
        }
    }
    Some((start.0, (end - start).0))
}

fn insert_offset(entry: &HistoryEntry) -> Option<usize> {
    entry
        .insert_index
        .or(entry.normalized_indexes().map(|(start, _)| start))
        .map(|offset| offset.0)
}

fn inserted_length(entry: &HistoryEntry) -> usize {
    match entry.action {
        ActionKind::Enter => 1,
        _ => entry
            .insert_text
            .as_deref()
            .map(DocumentTree::grapheme_len)
            .unwrap_or(1),
    }
}

/// Deletions covering footnote anchors extend their length by the owned
/// body, which the anchor glyph stands in for on the wire.
fn footnote_extension(tree: &DocumentTree, removed: &[RemovedNode]) -> usize {
    removed
        .iter()
        .filter_map(|node| match node {
            RemovedNode::Node(id) if matches!(tree.node(*id), Some(Node::Footnote(_))) => {
                Some(tree.footnote_body_length(*id).0)
            }
            _ => None,
        })
        .sum()
}

// ----- insert family --------------------------------------------------------

fn build_insert(
    entry: &HistoryEntry, direction: Direction, restored: Option<&RestoredContent>,
    prior_span: Option<(usize, usize)>, operations: &mut Vec<Operation>,
) {
    let Some(offset) = insert_offset(entry) else {
        warn!("insert entry without offsets; empty batch");
        return;
    };
    match direction {
        Direction::Forward | Direction::Redo => {
            // whatever currently occupies the span goes first so the
            // peer's offsets line up: the replaced selection (forward) or
            // the content the redo displaces
            let displaced = match direction {
                Direction::Forward => restored.map(|r| (offset, r.length)),
                _ => prior_span.filter(|&(_, length)| length > 0),
            };
            if let Some((delete_offset, length)) = displaced {
                operations.push(Operation::new(OperationKind::Delete, delete_offset, length));
            }
            let mut operation =
                Operation::new(OperationKind::Insert, offset, inserted_length(entry));
            operation.text = match entry.action {
                ActionKind::Enter => Some("\n".to_string()),
                _ => entry.insert_text.clone(),
            };
            if entry.action == ActionKind::Paste {
                operation.subtype = Some(OperationSubtype::Paste);
            }
            operation.marker_data = entry.marker_data.peek().cloned();
            operations.push(operation);
        }
        Direction::Undo => {
            let length = prior_span
                .map(|(_, length)| length)
                .filter(|&length| length > 0)
                .unwrap_or_else(|| inserted_length(entry));
            operations.push(Operation::new(OperationKind::Delete, offset, length));
            if let Some(restored) = restored {
                let mut operation =
                    Operation::new(OperationKind::Insert, offset, restored.length);
                operation.text = restored.text.clone();
                operation.paste_content = restored.paste_content.clone();
                if restored.paste_content.is_some() {
                    operation.subtype = Some(OperationSubtype::Paste);
                }
                operations.push(operation);
            }
        }
    }
}

// ----- delete family --------------------------------------------------------

fn build_delete(
    entry: &HistoryEntry, tree: &DocumentTree, revisions: &RevisionTracker, direction: Direction,
    restored: Option<&RestoredContent>, prior_span: Option<(usize, usize)>,
    operations: &mut Vec<Operation>,
) {
    match direction {
        Direction::Forward | Direction::Redo => {
            if revisions.track_changes && entry.revision_id.is_some() {
                delete_operations_for_track_changes(entry, tree, revisions, operations);
                return;
            }
            // redo deletes the span the undo restored
            let span = match direction {
                Direction::Redo => prior_span.filter(|&(_, length)| length > 0),
                _ => None,
            }
            .or_else(|| widened_span(entry));
            let Some((offset, length)) = span else {
                warn!("delete entry without offsets; empty batch");
                return;
            };
            let length = length + footnote_extension(tree, &entry.removed_nodes);
            operations.push(Operation::new(OperationKind::Delete, offset, length));
        }
        Direction::Undo => {
            let Some(offset) = insert_offset(entry) else {
                warn!("delete entry without offsets; empty batch");
                return;
            };
            let Some(restored) = restored else { return };
            if restored.has_block {
                // the restore splits a merged paragraph: the structural
                // delete of the combined mark precedes the insert
                operations.push(Operation::new(OperationKind::Delete, offset, 1));
            }
            let mut operation = Operation::new(OperationKind::Insert, offset, restored.length);
            operation.text = restored.text.clone();
            operation.paste_content = restored.paste_content.clone();
            if restored.paste_content.is_some() {
                operation.subtype = Some(OperationSubtype::Paste);
            }
            operation.marker_data = entry.marker_data.peek().cloned();
            operations.push(operation);
        }
    }
}

/// Splits a tracked deletion into its wire form: content covered by the
/// acting author's own pending insertion is hard-deleted, the rest becomes a
/// format operation carrying a deletion revision.
fn delete_operations_for_track_changes(
    entry: &HistoryEntry, tree: &DocumentTree, revisions: &RevisionTracker,
    operations: &mut Vec<Operation>,
) {
    let Some((offset, span)) = widened_span(entry) else {
        warn!("tracked delete without offsets; empty batch");
        return;
    };
    let mut hard = 0;
    for node in &entry.removed_nodes {
        let RemovedNode::Node(id) = node else { continue };
        if let Some(Node::TextRun(run)) = tree.node(*id) {
            hard += DocumentTree::grapheme_len(&run.text);
        }
    }
    if hard > 0 {
        operations.push(Operation::new(OperationKind::Delete, offset, hard));
    }
    let marked = span.saturating_sub(hard);
    if marked > 0 {
        let mut operation = Operation::new(OperationKind::Format, offset, marked);
        operation.marker_data = entry.revision_id.and_then(|id| {
            revisions.get(id).map(|revision| MarkerInfo::Revision {
                id: revision.id,
                kind: revision.kind,
                author: revision.author.clone(),
                date: revision.date,
                split_revisions: vec![],
            })
        });
        operations.push(operation);
    }
}

// ----- format family --------------------------------------------------------

fn build_format(
    entry: &HistoryEntry, tree: &DocumentTree, _direction: Direction,
    operations: &mut Vec<Operation>,
) {
    let Some((offset, length)) = widened_span(entry) else {
        warn!("format entry without offsets; empty batch");
        return;
    };
    let mut operation = Operation::new(OperationKind::Format, offset, length);
    operation.subtype = format_subtype(entry.action);
    operation.format = format_payload(entry, tree);
    // resizing travels as a dimension update, not a format replacement
    if matches!(entry.action, ActionKind::RowResizing | ActionKind::CellResizing) {
        operation.action = OperationKind::Update;
    }
    operations.push(operation);
}

fn format_subtype(action: ActionKind) -> Option<OperationSubtype> {
    match action {
        ActionKind::CharacterFormat | ActionKind::ClearFormat => {
            Some(OperationSubtype::CharacterFormat)
        }
        ActionKind::ParagraphFormat => Some(OperationSubtype::ParagraphFormat),
        ActionKind::ListFormat
        | ActionKind::ContinueNumbering
        | ActionKind::RestartNumbering => Some(OperationSubtype::ListFormat),
        ActionKind::SectionFormat => Some(OperationSubtype::SectionFormat),
        ActionKind::TableFormat
        | ActionKind::TableDialog
        | ActionKind::CellSpacing
        | ActionKind::TableLeftIndent
        | ActionKind::TablePreferredWidth
        | ActionKind::Borders => Some(OperationSubtype::TableFormat),
        ActionKind::RowFormat
        | ActionKind::RowResizing
        | ActionKind::RowHeight
        | ActionKind::RowHeightType
        | ActionKind::RowHeader
        | ActionKind::AllowBreakAcrossPages => Some(OperationSubtype::RowFormat),
        ActionKind::CellFormat
        | ActionKind::CellResizing
        | ActionKind::CellContentVerticalAlignment
        | ActionKind::CellPreferredWidth
        | ActionKind::Shading => Some(OperationSubtype::CellFormat),
        _ => None,
    }
}

/// Serializes the live format of the operation's target. Built after the
/// edit (or revert) applied, so the payload always carries the state the
/// peer should converge to.
fn format_payload(entry: &HistoryEntry, tree: &DocumentTree) -> Option<String> {
    let position = entry
        .selection_start
        .as_ref()
        .and_then(|index| tree.text_pos_from_logical_index(index).ok())?;

    let value = match format_subtype(entry.action)? {
        OperationSubtype::CharacterFormat => {
            let (inline, _) = tree.inline_at(position.paragraph, position.offset).or_else(|| {
                // caret at paragraph end: take the last inline
                tree.child_ids(position.paragraph)
                    .last()
                    .map(|&inline| (inline, 0))
            })?;
            match tree.node(inline) {
                Some(Node::TextRun(run)) => writer::write_character_format(&run.format),
                _ => return None,
            }
        }
        OperationSubtype::ParagraphFormat | OperationSubtype::ListFormat => {
            match tree.node(position.paragraph) {
                Some(Node::Paragraph(paragraph)) => {
                    writer::write_paragraph_format(&paragraph.format)
                }
                _ => return None,
            }
        }
        OperationSubtype::SectionFormat => match tree.node(*tree.sections.first()?) {
            Some(Node::Section(section)) => writer::write_section_format(&section.format),
            _ => return None,
        },
        OperationSubtype::TableFormat => {
            let table = tree.owner_table(position.paragraph)?;
            match tree.node(table) {
                Some(Node::Table(t)) => writer::write_table_format(&t.format),
                _ => return None,
            }
        }
        OperationSubtype::RowFormat => {
            let cell = tree.covering_cell(position.paragraph)?;
            let row = tree.parent(cell)?;
            match tree.node(row) {
                Some(Node::Row(r)) => writer::write_row_format(&r.format),
                _ => return None,
            }
        }
        OperationSubtype::CellFormat => {
            let cell = tree.covering_cell(position.paragraph)?;
            match tree.node(cell) {
                Some(Node::Cell(c)) => writer::write_cell_format(&c.format),
                _ => return None,
            }
        }
        _ => return None,
    };
    serde_json::to_string(&value).ok()
}

// ----- structural family ----------------------------------------------------

fn build_structural(
    entry: &HistoryEntry, tree: &DocumentTree, revisions: &RevisionTracker, direction: Direction,
    restored: Option<&RestoredContent>, prior_span: Option<(usize, usize)>,
    operations: &mut Vec<Operation>,
) {
    let Some((start, end)) = entry.normalized_indexes() else {
        warn!("structural entry without offsets; empty batch");
        return;
    };
    let (mut offset, mut length) = (start.0, (end - start).0);
    // a revert that only detached structure leaves a collapsed live span;
    // the pre-revert span describes what the peer must remove
    if length == 0 {
        if let Some((prior_offset, prior_length)) = prior_span.filter(|&(_, len)| len > 0) {
            offset = prior_offset;
            length = prior_length;
        }
    }

    let inserts_structure = matches!(
        entry.action,
        ActionKind::InsertTable
            | ActionKind::InsertRowAbove
            | ActionKind::InsertRowBelow
            | ActionKind::InsertColumnLeft
            | ActionKind::InsertColumnRight
    );
    // undo flips the structural sense of the action
    let inserting = inserts_structure != (direction == Direction::Undo);

    match entry.action {
        ActionKind::MergeCells | ActionKind::ClearCells => {
            let mut operation = Operation::new(OperationKind::Format, offset, length);
            operation.subtype = Some(OperationSubtype::CellFormat);
            operations.push(operation);
        }
        _ if inserting => {
            let mut operation = Operation::new(OperationKind::Insert, offset, length);
            operation.paste_content = restored.and_then(|r| r.paste_content.clone());
            operations.push(operation);
        }
        _ => {
            // own-author tracked structure deletes hard; others mark
            if revisions.track_changes {
                if let Some(revision) = first_covering_insertion(tree, revisions, &entry.removed_nodes)
                {
                    if revision.author != revisions.current_author {
                        let mut operation =
                            Operation::new(OperationKind::Format, offset, length);
                        operation.marker_data = Some(MarkerInfo::Revision {
                            id: uuid::Uuid::new_v4(),
                            kind: RevisionKind::Deletion,
                            author: revisions.current_author.clone(),
                            date: chrono::Utc::now(),
                            split_revisions: vec![],
                        });
                        operations.push(operation);
                        return;
                    }
                }
            }
            operations.push(Operation::new(OperationKind::Delete, offset, length));
        }
    }
}

fn first_covering_insertion<'a>(
    tree: &DocumentTree, revisions: &'a RevisionTracker, removed: &[RemovedNode],
) -> Option<&'a crate::model::revision::Revision> {
    fn scan<'a>(
        tree: &DocumentTree, revisions: &'a RevisionTracker, id: NodeId,
    ) -> Option<&'a crate::model::revision::Revision> {
        if let Some(revision) = revisions.covering_insertion(tree, id) {
            return Some(revision);
        }
        tree.child_ids(id).into_iter().find_map(|child| scan(tree, revisions, child))
    }
    removed.iter().find_map(|node| match node {
        RemovedNode::Node(id) => scan(tree, revisions, *id),
        _ => None,
    })
}

// ----- markers, headers/footers, tracked-change resolution -------------------

fn build_marker(entry: &HistoryEntry, direction: Direction, operations: &mut Vec<Operation>) {
    let Some((offset, length)) = widened_span(entry) else {
        warn!("marker entry without offsets; empty batch");
        return;
    };
    let removes = matches!(
        entry.action,
        ActionKind::DeleteBookmark | ActionKind::DeleteComment | ActionKind::DeleteEditRange
    );
    let deleting = removes != (direction == Direction::Undo);
    let kind = if deleting { OperationKind::Delete } else { OperationKind::Insert };
    let mut operation = Operation::new(kind, offset, length);
    operation.marker_data = entry.marker_data.peek().cloned();
    operations.push(operation);
}

fn build_header_footer(
    entry: &HistoryEntry, direction: Direction, restored: Option<&RestoredContent>,
    operations: &mut Vec<Operation>,
) {
    let (Some(start), Some(end)) = (entry.header_footer_start, entry.header_footer_end) else {
        warn!("header/footer entry without container offsets; empty batch");
        return;
    };
    let (offset, length) = (start.0, (end - start).0);
    match direction {
        Direction::Forward | Direction::Redo => {
            operations.push(Operation::new(OperationKind::Delete, offset, length));
        }
        Direction::Undo => {
            let mut operation = Operation::new(OperationKind::Insert, offset, length);
            operation.paste_content = restored.and_then(|r| r.paste_content.clone());
            operations.push(operation);
        }
    }
}

fn build_change_resolution(
    entry: &HistoryEntry, direction: Direction, operations: &mut Vec<Operation>,
) {
    let Some((offset, length)) = widened_span(entry) else {
        warn!("change resolution without offsets; empty batch");
        return;
    };
    let mut operation = Operation::new(OperationKind::Format, offset, length);
    operation.subtype = match (entry.action, direction) {
        (ActionKind::AcceptChange, Direction::Undo) => Some(OperationSubtype::Reject),
        (ActionKind::AcceptChange, _) => Some(OperationSubtype::Accept),
        (ActionKind::RejectChange, Direction::Undo) => Some(OperationSubtype::Accept),
        _ => Some(OperationSubtype::Reject),
    };
    operation.marker_data = entry.marker_data.peek().cloned();
    operations.push(operation);
}

// ----- per-cell side-channel operations --------------------------------------

/// Three stacked format operations describe one freshly created cell: the
/// cell's own format, its paragraph format, and the character format peers
/// apply to subsequent typing.
pub fn build_cell_operation(tree: &DocumentTree, cell: NodeId, offset: usize) -> [Operation; 3] {
    let (cell_format, paragraph_format, character_format) = match tree.node(cell) {
        Some(Node::Cell(c)) => {
            let paragraph = tree.first_paragraph(cell);
            let paragraph_format = paragraph
                .and_then(|id| match tree.node(id) {
                    Some(Node::Paragraph(p)) => Some(writer::write_paragraph_format(&p.format)),
                    _ => None,
                })
                .unwrap_or(json!({}));
            (writer::write_cell_format(&c.format), paragraph_format, json!({}))
        }
        _ => (json!({}), json!({}), json!({})),
    };

    let mut cell_operation = Operation::new(OperationKind::Format, offset, 1);
    cell_operation.subtype = Some(OperationSubtype::CellFormat);
    cell_operation.format = serde_json::to_string(&cell_format).ok();

    let mut paragraph_operation = Operation::new(OperationKind::Format, offset, 1);
    paragraph_operation.subtype = Some(OperationSubtype::ParagraphFormat);
    paragraph_operation.format = serde_json::to_string(&paragraph_format).ok();

    let mut character_operation = Operation::new(OperationKind::Format, offset, 1);
    character_operation.subtype = Some(OperationSubtype::CharacterFormat);
    character_operation.format = serde_json::to_string(&character_format).ok();

    [cell_operation, paragraph_operation, character_operation]
}

pub fn delete_cell_operation(offset: usize, length: usize) -> Operation {
    Operation::new(OperationKind::Delete, offset, length)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::offset_types::DocCharOffset;

    #[test]
    fn zero_width_capture_widens_to_length_one() {
        let mut entry = HistoryEntry::new(ActionKind::Delete);
        entry.start_index = Some(DocCharOffset(10));
        entry.end_index = Some(DocCharOffset(10));
        assert_eq!(widened_span(&entry), Some((10, 1)));

        let mut entry = HistoryEntry::new(ActionKind::BackSpace);
        entry.start_index = Some(DocCharOffset(10));
        entry.end_index = Some(DocCharOffset(10));
        assert_eq!(widened_span(&entry), Some((9, 1)));
    }

    #[test]
    fn backward_selection_normalizes_before_widening() {
        let mut entry = HistoryEntry::new(ActionKind::Cut);
        entry.start_index = Some(DocCharOffset(9));
        entry.end_index = Some(DocCharOffset(4));
        assert_eq!(widened_span(&entry), Some((4, 5)));
    }

    #[test]
    fn restored_single_run_travels_as_text() {
        let mut tree = DocumentTree::new();
        let run = tree.new_text_run("abc", Default::default());
        let restored = restored_content(&tree, &[RemovedNode::Node(run)]);
        assert_eq!(restored.text.as_deref(), Some("abc"));
        assert_eq!(restored.length, 3);
        assert!(!restored.has_block);
        assert!(restored.paste_content.is_none());
    }

    #[test]
    fn restored_paragraph_travels_as_paste() {
        let mut tree = DocumentTree::new();
        let paragraph = tree.new_paragraph();
        let run = tree.new_text_run("tail", Default::default());
        let restored =
            restored_content(&tree, &[RemovedNode::Node(run), RemovedNode::Node(paragraph)]);
        // run (4) + empty paragraph (mark only, 1)
        assert_eq!(restored.length, 5);
        assert!(restored.has_block);
        assert!(restored.paste_content.is_some());
        assert!(restored.text.is_none());
    }
}
