//! Arena-backed document tree.
//!
//! Nodes live in a slab addressed by [NodeId]; parents own children by id and
//! every cross-reference is an index, never a pointer, so traversal is
//! acyclic by construction and detached subtrees (history snapshots) are
//! plain id handles whose storage is reclaimed explicitly via
//! [DocumentTree::release_subtree].

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::model::errors::{DocErrorKind, DocResult};
use crate::model::format::{
    CellFormat, CharacterFormat, ParagraphFormat, RowFormat, SectionFormat, TableFormat,
};
use crate::model::offset_types::RelCharOffset;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Hyperlink,
    Date,
    DropDown,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FootnoteKind {
    Footnote,
    Endnote,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderFooterKind {
    Header,
    Footer,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub format: SectionFormat,
    pub blocks: Vec<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub format: ParagraphFormat,
    pub inlines: Vec<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub format: TableFormat,
    pub rows: Vec<NodeId>,
    /// Stable identity shared between a table and the continuation fragment
    /// layout produces when the table breaks across pages.
    pub table_id: Uuid,
    pub is_continuation: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub format: RowFormat,
    pub cells: Vec<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub format: CellFormat,
    pub blocks: Vec<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub format: CharacterFormat,
    /// Tracked revisions covering this run, newest last.
    pub revision_ids: Vec<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Footnote {
    pub kind: FootnoteKind,
    pub blocks: Vec<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Section(Section),
    Paragraph(Paragraph),
    Table(Table),
    Row(Row),
    Cell(Cell),
    TextRun(TextRun),
    BookmarkStart { name: String },
    BookmarkEnd { name: String },
    CommentStart { id: Uuid, author: String },
    CommentEnd { id: Uuid },
    EditRangeStart { user: String },
    EditRangeEnd,
    FieldStart { kind: FieldKind },
    FieldEnd,
    Footnote(Footnote),
}

#[derive(Clone, Debug)]
struct Slot {
    node: Node,
    parent: Option<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeaderFooter {
    pub kind: HeaderFooterKind,
    pub blocks: Vec<NodeId>,
}

/// The paragraph/table/row/cell/inline tree with mutation primitives. The
/// history engine treats this as an opaque collaborator; tests drive it
/// through [crate::DocumentEditor].
#[derive(Default)]
pub struct DocumentTree {
    slots: Vec<Option<Slot>>,
    free: Vec<NodeId>,
    pub sections: Vec<NodeId>,
    pub headers_footers: Vec<HeaderFooter>,
}

impl DocumentTree {
    /// A document with one empty section holding one empty paragraph.
    pub fn new() -> Self {
        let mut tree = Self::default();
        let paragraph = tree.alloc(Node::Paragraph(Paragraph {
            format: ParagraphFormat::default(),
            inlines: vec![],
        }));
        let section = tree.alloc(Node::Section(Section {
            format: SectionFormat::default(),
            blocks: vec![paragraph],
        }));
        tree.set_parent(paragraph, Some(section));
        tree.sections.push(section);
        tree
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.slots[id.0] = Some(Slot { node, parent: None });
            id
        } else {
            self.slots.push(Some(Slot { node, parent: None }));
            NodeId(self.slots.len() - 1)
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref()).map(|slot| &slot.node)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.0).and_then(|slot| slot.as_mut()).map(|slot| &mut slot.node)
    }

    pub fn find(&self, id: NodeId) -> DocResult<&Node> {
        self.node(id).ok_or_else(|| DocErrorKind::NodeNotFound.into())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref()).and_then(|slot| slot.parent)
    }

    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(Some(slot)) = self.slots.get_mut(id.0) {
            slot.parent = parent;
        }
    }

    /// Frees a detached subtree. Safe to call once per snapshot; the slot is
    /// drained so stale ids resolve to nothing afterwards.
    pub fn release_subtree(&mut self, id: NodeId) {
        for child in self.child_ids(id) {
            self.release_subtree(child);
        }
        if let Some(slot) = self.slots.get_mut(id.0) {
            if slot.take().is_some() {
                self.free.push(id);
            }
        }
    }

    /// Deep-clones a subtree into fresh arena slots. The clone is detached.
    pub fn clone_subtree(&mut self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id)?.clone();
        let children = self.child_ids(id);
        let cloned_children: Vec<NodeId> =
            children.iter().filter_map(|&child| self.clone_subtree(child)).collect();
        let mut node = node;
        replace_children(&mut node, cloned_children.clone());
        let clone = self.alloc(node);
        for child in cloned_children {
            self.set_parent(child, Some(clone));
        }
        Some(clone)
    }

    pub fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        match self.node(id) {
            Some(Node::Section(section)) => section.blocks.clone(),
            Some(Node::Paragraph(paragraph)) => paragraph.inlines.clone(),
            Some(Node::Table(table)) => table.rows.clone(),
            Some(Node::Row(row)) => row.cells.clone(),
            Some(Node::Cell(cell)) => cell.blocks.clone(),
            Some(Node::Footnote(footnote)) => footnote.blocks.clone(),
            _ => vec![],
        }
    }

    pub fn is_paragraph(&self, id: NodeId) -> bool {
        matches!(self.node(id), Some(Node::Paragraph(_)))
    }

    pub fn is_table(&self, id: NodeId) -> bool {
        matches!(self.node(id), Some(Node::Table(_)))
    }

    // ----- structural queries ------------------------------------------------

    /// Index of `child` within its parent's child list.
    pub fn child_index(&self, child: NodeId) -> Option<usize> {
        let parent = self.parent(child)?;
        self.child_ids(parent).iter().position(|&id| id == child)
    }

    /// Walks ancestors until a cell is found, if the node sits inside a table.
    pub fn covering_cell(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if matches!(self.node(node), Some(Node::Cell(_))) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    pub fn owner_table(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if matches!(self.node(node), Some(Node::Table(_))) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// First paragraph in document order under `id` (inclusive).
    pub fn first_paragraph(&self, id: NodeId) -> Option<NodeId> {
        if self.is_paragraph(id) {
            return Some(id);
        }
        self.child_ids(id).into_iter().find_map(|child| self.first_paragraph(child))
    }

    /// Last paragraph in document order under `id` (inclusive).
    pub fn last_paragraph(&self, id: NodeId) -> Option<NodeId> {
        if self.is_paragraph(id) {
            return Some(id);
        }
        self.child_ids(id).into_iter().rev().find_map(|child| self.last_paragraph(child))
    }

    /// The next inline sibling, or `None` at the end of the paragraph.
    pub fn next_inline(&self, inline: NodeId) -> Option<NodeId> {
        let parent = self.parent(inline)?;
        let siblings = self.child_ids(parent);
        let index = siblings.iter().position(|&id| id == inline)?;
        siblings.get(index + 1).copied()
    }

    // ----- lengths -----------------------------------------------------------

    /// Grapheme count of a run's text, matching how peers count characters.
    pub fn grapheme_len(text: &str) -> usize {
        text.graphemes(true).count()
    }

    pub fn inline_length(&self, id: NodeId) -> RelCharOffset {
        match self.node(id) {
            Some(Node::TextRun(run)) => Self::grapheme_len(&run.text).into(),
            // markers and footnote anchors occupy one position in the stream
            Some(
                Node::BookmarkStart { .. }
                | Node::BookmarkEnd { .. }
                | Node::CommentStart { .. }
                | Node::CommentEnd { .. }
                | Node::EditRangeStart { .. }
                | Node::EditRangeEnd
                | Node::FieldStart { .. }
                | Node::FieldEnd
                | Node::Footnote(_),
            ) => 1.into(),
            _ => 0.into(),
        }
    }

    /// Length of a block in the flattened stream: paragraph text plus its
    /// paragraph mark, or the table's +1-per-boundary accounting.
    pub fn block_length(&self, id: NodeId) -> RelCharOffset {
        match self.node(id) {
            Some(Node::Paragraph(paragraph)) => {
                let mut length = RelCharOffset(1); // paragraph mark
                for &inline in &paragraph.inlines {
                    length += self.inline_length(inline);
                }
                length
            }
            Some(Node::Table(table)) => {
                let mut length = RelCharOffset(1); // table marker
                for &row in &table.rows {
                    length += self.row_length(row);
                }
                length
            }
            _ => 0.into(),
        }
    }

    pub fn row_length(&self, row: NodeId) -> RelCharOffset {
        let mut length = RelCharOffset(1); // row boundary marker
        if let Some(Node::Row(row)) = self.node(row) {
            for &cell in &row.cells {
                length += self.cell_length(cell);
            }
        }
        length
    }

    pub fn cell_length(&self, cell: NodeId) -> RelCharOffset {
        let mut length = RelCharOffset(1); // cell boundary marker
        if let Some(Node::Cell(cell)) = self.node(cell) {
            for &block in &cell.blocks {
                length += self.block_length(block);
            }
        }
        length
    }

    /// Absolute length of a footnote's owned body. In the main stream the
    /// footnote is a single anchor glyph; operations carrying its removal
    /// extend their length by this amount.
    pub fn footnote_body_length(&self, id: NodeId) -> RelCharOffset {
        let mut length = RelCharOffset(0);
        if let Some(Node::Footnote(footnote)) = self.node(id) {
            for &block in &footnote.blocks {
                length += self.block_length(block);
            }
        }
        length
    }

    /// The inline covering a character offset within a paragraph, plus the
    /// offset into that inline. An offset landing exactly between inlines
    /// resolves to the start of the following inline.
    pub fn inline_at(&self, paragraph: NodeId, offset: usize) -> Option<(NodeId, usize)> {
        let mut remaining = offset;
        for inline in self.child_ids(paragraph) {
            let length = self.inline_length(inline).0;
            if remaining < length {
                return Some((inline, remaining));
            }
            remaining -= length;
        }
        None
    }

    pub fn paragraph_text(&self, id: NodeId) -> String {
        let mut text = String::new();
        if let Some(Node::Paragraph(paragraph)) = self.node(id) {
            for &inline in &paragraph.inlines {
                if let Some(Node::TextRun(run)) = self.node(inline) {
                    text.push_str(&run.text);
                }
            }
        }
        text
    }

    // ----- mutation primitives ----------------------------------------------

    pub fn insert_block_at(&mut self, parent: NodeId, index: usize, block: NodeId) {
        let index = match self.node_mut(parent) {
            Some(Node::Section(section)) => {
                let index = index.min(section.blocks.len());
                section.blocks.insert(index, block);
                index
            }
            Some(Node::Cell(cell)) => {
                let index = index.min(cell.blocks.len());
                cell.blocks.insert(index, block);
                index
            }
            Some(Node::Footnote(footnote)) => {
                let index = index.min(footnote.blocks.len());
                footnote.blocks.insert(index, block);
                index
            }
            _ => return,
        };
        let _ = index;
        self.set_parent(block, Some(parent));
    }

    pub fn remove_block(&mut self, block: NodeId) -> Option<usize> {
        let parent = self.parent(block)?;
        let index = match self.node_mut(parent) {
            Some(Node::Section(section)) => {
                let index = section.blocks.iter().position(|&id| id == block)?;
                section.blocks.remove(index);
                index
            }
            Some(Node::Cell(cell)) => {
                let index = cell.blocks.iter().position(|&id| id == block)?;
                cell.blocks.remove(index);
                index
            }
            Some(Node::Footnote(footnote)) => {
                let index = footnote.blocks.iter().position(|&id| id == block)?;
                footnote.blocks.remove(index);
                index
            }
            _ => return None,
        };
        self.set_parent(block, None);
        Some(index)
    }

    pub fn insert_inline_at(&mut self, paragraph: NodeId, index: usize, inline: NodeId) {
        if let Some(Node::Paragraph(para)) = self.node_mut(paragraph) {
            let index = index.min(para.inlines.len());
            para.inlines.insert(index, inline);
            self.set_parent(inline, Some(paragraph));
        }
    }

    pub fn remove_inline(&mut self, inline: NodeId) -> Option<usize> {
        let parent = self.parent(inline)?;
        if let Some(Node::Paragraph(para)) = self.node_mut(parent) {
            let index = para.inlines.iter().position(|&id| id == inline)?;
            para.inlines.remove(index);
            self.set_parent(inline, None);
            return Some(index);
        }
        None
    }

    /// Splits a text run at a grapheme offset; the tail becomes a new run
    /// inserted immediately after. Returns the tail id, or `None` when the
    /// offset falls on a run boundary and no split is needed.
    pub fn split_run(&mut self, run: NodeId, offset: usize) -> Option<NodeId> {
        let (tail_text, format, revision_ids) = match self.node(run) {
            Some(Node::TextRun(text_run)) => {
                let len = Self::grapheme_len(&text_run.text);
                if offset == 0 || offset >= len {
                    return None;
                }
                let byte = text_run
                    .text
                    .grapheme_indices(true)
                    .nth(offset)
                    .map(|(byte, _)| byte)?;
                (
                    text_run.text[byte..].to_string(),
                    text_run.format.clone(),
                    text_run.revision_ids.clone(),
                )
            }
            _ => return None,
        };
        if let Some(Node::TextRun(text_run)) = self.node_mut(run) {
            let keep = text_run.text.len() - tail_text.len();
            text_run.text.truncate(keep);
        }
        let tail = self.alloc(Node::TextRun(TextRun { text: tail_text, format, revision_ids }));
        let paragraph = self.parent(run)?;
        let index = self.child_ids(paragraph).iter().position(|&id| id == run)?;
        self.insert_inline_at(paragraph, index + 1, tail);
        Some(tail)
    }

    /// Splits a table before `row_index`, producing a continuation fragment
    /// inserted as the next sibling block. Models the layout engine breaking
    /// a table across pages.
    pub fn split_table(&mut self, table: NodeId, row_index: usize) -> Option<NodeId> {
        let (moved_rows, format, table_id) = match self.node_mut(table) {
            Some(Node::Table(t)) => {
                if row_index == 0 || row_index >= t.rows.len() {
                    return None;
                }
                (t.rows.split_off(row_index), t.format.clone(), t.table_id)
            }
            _ => return None,
        };
        let continuation = self.alloc(Node::Table(Table {
            format,
            rows: moved_rows.clone(),
            table_id,
            is_continuation: true,
        }));
        for row in moved_rows {
            self.set_parent(row, Some(continuation));
        }
        let parent = self.parent(table)?;
        let index = self.child_ids(parent).iter().position(|&id| id == table)?;
        self.insert_block_at(parent, index + 1, continuation);
        Some(continuation)
    }

    /// Re-merges continuation fragments into the logical table. Reinsertion
    /// after a structural table edit must target the combined widget, not
    /// whatever fragmentation layout last produced.
    pub fn combine_widget(&mut self, table: NodeId) {
        let table_id = match self.node(table) {
            Some(Node::Table(t)) => t.table_id,
            _ => return,
        };
        loop {
            let parent = match self.parent(table) {
                Some(parent) => parent,
                None => return,
            };
            let siblings = self.child_ids(parent);
            let index = match siblings.iter().position(|&id| id == table) {
                Some(index) => index,
                None => return,
            };
            let continuation = match siblings.get(index + 1) {
                Some(&next) => match self.node(next) {
                    Some(Node::Table(t)) if t.table_id == table_id && t.is_continuation => next,
                    _ => return,
                },
                None => return,
            };
            let rows = match self.node_mut(continuation) {
                Some(Node::Table(t)) => std::mem::take(&mut t.rows),
                _ => return,
            };
            for &row in &rows {
                self.set_parent(row, Some(table));
            }
            if let Some(Node::Table(t)) = self.node_mut(table) {
                t.rows.extend(rows);
            }
            self.remove_block(continuation);
            self.release_subtree(continuation);
        }
    }

    // ----- convenience constructors -----------------------------------------

    pub fn new_paragraph(&mut self) -> NodeId {
        self.alloc(Node::Paragraph(Paragraph { format: ParagraphFormat::default(), inlines: vec![] }))
    }

    pub fn new_text_run(&mut self, text: &str, format: CharacterFormat) -> NodeId {
        self.alloc(Node::TextRun(TextRun {
            text: text.to_string(),
            format,
            revision_ids: vec![],
        }))
    }

    pub fn new_table(&mut self, rows: usize, columns: usize) -> NodeId {
        let mut row_ids = Vec::with_capacity(rows);
        for _ in 0..rows {
            row_ids.push(self.new_row(columns));
        }
        let table = self.alloc(Node::Table(Table {
            format: TableFormat::default(),
            rows: row_ids.clone(),
            table_id: Uuid::new_v4(),
            is_continuation: false,
        }));
        for row in row_ids {
            self.set_parent(row, Some(table));
        }
        table
    }

    pub fn new_row(&mut self, columns: usize) -> NodeId {
        let mut cell_ids = Vec::with_capacity(columns);
        for _ in 0..columns {
            cell_ids.push(self.new_cell());
        }
        let row =
            self.alloc(Node::Row(Row { format: RowFormat::default(), cells: cell_ids.clone() }));
        for cell in cell_ids {
            self.set_parent(cell, Some(row));
        }
        row
    }

    pub fn new_cell(&mut self) -> NodeId {
        let paragraph = self.new_paragraph();
        let cell = self
            .alloc(Node::Cell(Cell { format: CellFormat::default(), blocks: vec![paragraph] }));
        self.set_parent(paragraph, Some(cell));
        cell
    }
}

fn replace_children(node: &mut Node, children: Vec<NodeId>) {
    match node {
        Node::Section(section) => section.blocks = children,
        Node::Paragraph(paragraph) => paragraph.inlines = children,
        Node::Table(table) => table.rows = children,
        Node::Row(row) => row.cells = children,
        Node::Cell(cell) => cell.blocks = children,
        Node::Footnote(footnote) => footnote.blocks = children,
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn release_drains_slots_recursively() {
        let mut tree = DocumentTree::new();
        let run = tree.new_text_run("hello", CharacterFormat::default());
        let paragraph = tree.new_paragraph();
        tree.insert_inline_at(paragraph, 0, run);

        tree.release_subtree(paragraph);
        assert!(tree.node(paragraph).is_none());
        assert!(tree.node(run).is_none());
    }

    #[test]
    fn clone_subtree_is_detached_and_deep() {
        let mut tree = DocumentTree::new();
        let table = tree.new_table(2, 2);
        let clone = tree.clone_subtree(table).unwrap();

        assert_ne!(table, clone);
        assert!(tree.parent(clone).is_none());
        assert_eq!(tree.child_ids(clone).len(), 2);
        assert_ne!(tree.child_ids(clone)[0], tree.child_ids(table)[0]);
    }

    #[test]
    fn split_then_combine_restores_row_count() {
        let mut tree = DocumentTree::new();
        let section = tree.sections[0];
        let table = tree.new_table(4, 1);
        tree.insert_block_at(section, 1, table);

        let continuation = tree.split_table(table, 2).unwrap();
        assert_eq!(tree.child_ids(table).len(), 2);
        assert_eq!(tree.child_ids(continuation).len(), 2);

        tree.combine_widget(table);
        assert_eq!(tree.child_ids(table).len(), 4);
        assert!(tree.node(continuation).is_none());
    }

    #[test]
    fn table_length_counts_boundary_markers() {
        let mut tree = DocumentTree::new();
        let table = tree.new_table(2, 2);
        // 1 table marker + 2 * (1 row + 2 * (1 cell + 1 empty paragraph))
        assert_eq!(tree.block_length(table), 1 + 2 * (1 + 2 * 2));
    }

    #[test]
    fn split_run_preserves_graphemes() {
        let mut tree = DocumentTree::new();
        let section = tree.sections[0];
        let paragraph = tree.first_paragraph(section).unwrap();
        let run = tree.new_text_run("héllo", CharacterFormat::default());
        tree.insert_inline_at(paragraph, 0, run);

        let tail = tree.split_run(run, 2).unwrap();
        match (tree.node(run), tree.node(tail)) {
            (Some(Node::TextRun(head)), Some(Node::TextRun(tail))) => {
                assert_eq!(head.text, "hé");
                assert_eq!(tail.text, "llo");
            }
            _ => panic!("expected two text runs"),
        }
    }
}
