//! Position and offset resolution.
//!
//! Two addressing schemes coexist. Logical indexes are hierarchical path
//! strings (`"0;2;4"`: section 0, block 2, character 4; table paths descend
//! `block;row;cell;block`; header/footer paths are prefixed `"HF;n;..."`)
//! and survive document growth because they address structure. Absolute
//! offsets flatten the document into a single character stream and are only
//! computed when collaborative operations need them.

use serde::{Deserialize, Serialize};

use crate::model::errors::{DocErrorKind, DocResult};
use crate::model::offset_types::DocCharOffset;
use crate::model::tree::{DocumentTree, Node, NodeId};

pub const HEADER_FOOTER_PREFIX: &str = "HF";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalIndex(pub String);

impl LogicalIndex {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A tree-relative cursor position: a paragraph and a character offset
/// within it (markers count as one character each).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextPosition {
    pub paragraph: NodeId,
    pub offset: usize,
}

/// Cursor bounds; `start`/`end` keep capture order, which follows selection
/// direction. Offset ordering is normalized later, at operation-build time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    pub start: TextPosition,
    pub end: TextPosition,
}

impl Selection {
    pub fn caret(position: TextPosition) -> Self {
        Self { start: position, end: position }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl DocumentTree {
    /// Logical index of a position: the child-index path from the root to
    /// the paragraph, with the character offset as the final component.
    pub fn hierarchical_index(&self, position: TextPosition) -> Option<LogicalIndex> {
        let mut components = vec![position.offset.to_string()];
        let mut current = position.paragraph;
        while let Some(parent) = self.parent(current) {
            let index = self.child_ids(parent).iter().position(|&id| id == current)?;
            components.push(index.to_string());
            current = parent;
        }
        // `current` is now a root: either a section or a header/footer block
        if let Some(section_index) = self.sections.iter().position(|&id| id == current) {
            components.push(section_index.to_string());
        } else {
            let (container, block) = self.header_footer_root(current)?;
            components.push(block.to_string());
            components.push(container.to_string());
            components.push(HEADER_FOOTER_PREFIX.to_string());
        }
        components.reverse();
        Some(LogicalIndex(components.join(";")))
    }

    fn header_footer_root(&self, block: NodeId) -> Option<(usize, usize)> {
        for (container_index, container) in self.headers_footers.iter().enumerate() {
            if let Some(block_index) = container.blocks.iter().position(|&id| id == block) {
                return Some((container_index, block_index));
            }
        }
        None
    }

    /// Inverse of [Self::hierarchical_index]. The tree may have been mutated
    /// since the index was captured; a path that no longer resolves is an
    /// error the caller downgrades to a no-op.
    pub fn text_pos_from_logical_index(&self, index: &LogicalIndex) -> DocResult<TextPosition> {
        let invalid = || DocErrorKind::InvalidLogicalIndex(index.0.clone());
        let mut parts = index.0.split(';').peekable();

        let mut current = if parts.peek() == Some(&HEADER_FOOTER_PREFIX) {
            parts.next();
            let container: usize = next_component(&mut parts).ok_or_else(invalid)?;
            let block: usize = next_component(&mut parts).ok_or_else(invalid)?;
            *self
                .headers_footers
                .get(container)
                .and_then(|hf| hf.blocks.get(block))
                .ok_or_else(invalid)?
        } else {
            let section: usize = next_component(&mut parts).ok_or_else(invalid)?;
            *self.sections.get(section).ok_or_else(invalid)?
        };

        let mut components: Vec<usize> = Vec::new();
        for part in parts {
            components.push(part.parse().map_err(|_| invalid())?);
        }
        let (&offset, path) = components.split_last().ok_or_else(invalid)?;

        for &child_index in path {
            current = *self.child_ids(current).get(child_index).ok_or_else(invalid)?;
        }
        if !self.is_paragraph(current) {
            return Err(DocErrorKind::NotAParagraph.into());
        }
        Ok(TextPosition { paragraph: current, offset })
    }

    /// Absolute offset of a position in the flattened stream. Positions in
    /// header/footer containers resolve in the container's own offset space.
    pub fn absolute_offset(&self, position: TextPosition) -> Option<DocCharOffset> {
        let start = self.stream_offset_of(position.paragraph)?;
        Some(start + position.offset)
    }

    /// Stream offset of the start of a block, row, or cell. This is the
    /// resolver the table-structural operation family uses; tables and their
    /// parts carry one boundary marker each, so offsets land just before the
    /// target's marker.
    pub fn position_info_for_header_footer(&self, target: NodeId) -> Option<DocCharOffset> {
        self.stream_offset_of(target)
    }

    fn stream_offset_of(&self, target: NodeId) -> Option<DocCharOffset> {
        let mut acc = DocCharOffset(0);
        for &section in &self.sections {
            match self.scan_blocks(&self.child_ids(section), target, &mut acc) {
                Scan::Found => return Some(acc),
                Scan::NotFound => {}
            }
        }
        for container in &self.headers_footers {
            let mut acc = DocCharOffset(0);
            match self.scan_blocks(&container.blocks, target, &mut acc) {
                Scan::Found => return Some(acc),
                Scan::NotFound => {}
            }
        }
        None
    }

    fn scan_blocks(&self, blocks: &[NodeId], target: NodeId, acc: &mut DocCharOffset) -> Scan {
        for &block in blocks {
            if block == target {
                return Scan::Found;
            }
            match self.node(block) {
                Some(Node::Paragraph(_)) => {
                    *acc += self.block_length(block);
                }
                Some(Node::Table(table)) => {
                    *acc += 1; // table marker
                    for &row in &table.rows {
                        if row == target {
                            return Scan::Found;
                        }
                        *acc += 1; // row boundary
                        if let Some(Node::Row(row_node)) = self.node(row) {
                            for &cell in &row_node.cells {
                                if cell == target {
                                    return Scan::Found;
                                }
                                *acc += 1; // cell boundary
                                let cell_blocks = self.child_ids(cell);
                                if let Scan::Found =
                                    self.scan_blocks(&cell_blocks, target, acc)
                                {
                                    return Scan::Found;
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        Scan::NotFound
    }

    /// Caret position at the start of the first paragraph under a node.
    pub fn start_position_of(&self, id: NodeId) -> Option<TextPosition> {
        self.first_paragraph(id).map(|paragraph| TextPosition { paragraph, offset: 0 })
    }

    /// Caret position at the end of the last paragraph under a node (before
    /// the paragraph mark).
    pub fn end_position_of(&self, id: NodeId) -> Option<TextPosition> {
        let paragraph = self.last_paragraph(id)?;
        let offset = (self.block_length(paragraph) - 1).0;
        Some(TextPosition { paragraph, offset })
    }
}

enum Scan {
    Found,
    NotFound,
}

fn next_component<'a, I: Iterator<Item = &'a str>>(parts: &mut I) -> Option<usize> {
    parts.next().and_then(|part| part.parse().ok())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::format::CharacterFormat;

    fn tree_with_text(text: &str) -> (DocumentTree, NodeId) {
        let mut tree = DocumentTree::new();
        let paragraph = tree.first_paragraph(tree.sections[0]).unwrap();
        let run = tree.new_text_run(text, CharacterFormat::default());
        tree.insert_inline_at(paragraph, 0, run);
        (tree, paragraph)
    }

    #[test]
    fn logical_index_round_trips() {
        let (tree, paragraph) = tree_with_text("hello world");
        let position = TextPosition { paragraph, offset: 6 };
        let index = tree.hierarchical_index(position).unwrap();
        assert_eq!(index.as_str(), "0;0;6");
        assert_eq!(tree.text_pos_from_logical_index(&index).unwrap(), position);
    }

    #[test]
    fn logical_index_descends_tables() {
        let mut tree = DocumentTree::new();
        let section = tree.sections[0];
        let table = tree.new_table(2, 2);
        tree.insert_block_at(section, 1, table);
        let row = tree.child_ids(table)[1];
        let cell = tree.child_ids(row)[0];
        let paragraph = tree.first_paragraph(cell).unwrap();

        let position = TextPosition { paragraph, offset: 0 };
        let index = tree.hierarchical_index(position).unwrap();
        assert_eq!(index.as_str(), "0;1;1;0;0;0");
        assert_eq!(tree.text_pos_from_logical_index(&index).unwrap(), position);
    }

    #[test]
    fn stale_logical_index_is_an_error_not_a_panic() {
        let (tree, _) = tree_with_text("hi");
        let stale = LogicalIndex::new("0;9;0");
        assert!(tree.text_pos_from_logical_index(&stale).is_err());
    }

    #[test]
    fn absolute_offset_counts_structure_markers() {
        let (mut tree, paragraph) = tree_with_text("abc");
        // "abc" + paragraph mark = 4, table starts at 4
        let section = tree.sections[0];
        let table = tree.new_table(1, 1);
        tree.insert_block_at(section, 1, table);
        let cell_paragraph = tree.first_paragraph(table).unwrap();

        assert_eq!(
            tree.absolute_offset(TextPosition { paragraph, offset: 2 }),
            Some(DocCharOffset(2))
        );
        // table marker (4) + row boundary (5) + cell boundary (6) -> paragraph at 7
        assert_eq!(
            tree.absolute_offset(TextPosition { paragraph: cell_paragraph, offset: 0 }),
            Some(DocCharOffset(7))
        );
        assert_eq!(tree.position_info_for_header_footer(table), Some(DocCharOffset(4)));
    }
}
