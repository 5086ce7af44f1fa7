//! Transfer-format writer: serializes subtrees and format records into the
//! plain JSON exchanged with peers (`pasteContent`, `Operation.format`) and
//! compared by tests to assert document equivalence.

use serde_json::{Value, json};

use crate::model::format::{
    CellFormat, CharacterFormat, ParagraphFormat, RowFormat, SectionFormat, TableFormat,
};
use crate::model::tree::{DocumentTree, Node, NodeId};

pub fn write_character_format(format: &CharacterFormat) -> Value {
    serde_json::to_value(format).unwrap_or(Value::Null)
}

pub fn write_paragraph_format(format: &ParagraphFormat) -> Value {
    serde_json::to_value(format).unwrap_or(Value::Null)
}

pub fn write_section_format(format: &SectionFormat) -> Value {
    serde_json::to_value(format).unwrap_or(Value::Null)
}

pub fn write_table_format(format: &TableFormat) -> Value {
    serde_json::to_value(format).unwrap_or(Value::Null)
}

pub fn write_row_format(format: &RowFormat) -> Value {
    serde_json::to_value(format).unwrap_or(Value::Null)
}

pub fn write_cell_format(format: &CellFormat) -> Value {
    serde_json::to_value(format).unwrap_or(Value::Null)
}

/// Serializes one node and its subtree. Detached snapshots serialize the
/// same as live content, which is what lets a peer replay a reinsertion.
pub fn write_node(tree: &DocumentTree, id: NodeId) -> Value {
    let Some(node) = tree.node(id) else { return Value::Null };
    match node {
        Node::Section(section) => json!({
            "kind": "section",
            "sectionFormat": write_section_format(&section.format),
            "blocks": write_children(tree, &section.blocks),
        }),
        Node::Paragraph(paragraph) => json!({
            "kind": "paragraph",
            "paragraphFormat": write_paragraph_format(&paragraph.format),
            "inlines": write_children(tree, &paragraph.inlines),
        }),
        Node::Table(table) => json!({
            "kind": "table",
            "tableFormat": write_table_format(&table.format),
            "rows": write_children(tree, &table.rows),
        }),
        Node::Row(row) => json!({
            "kind": "row",
            "rowFormat": write_row_format(&row.format),
            "cells": write_children(tree, &row.cells),
        }),
        Node::Cell(cell) => json!({
            "kind": "cell",
            "cellFormat": write_cell_format(&cell.format),
            "blocks": write_children(tree, &cell.blocks),
        }),
        Node::TextRun(run) => json!({
            "kind": "textRun",
            "text": run.text,
            "characterFormat": write_character_format(&run.format),
            "revisionIds": run.revision_ids,
        }),
        Node::BookmarkStart { name } => json!({ "kind": "bookmarkStart", "name": name }),
        Node::BookmarkEnd { name } => json!({ "kind": "bookmarkEnd", "name": name }),
        Node::CommentStart { id, author } => {
            json!({ "kind": "commentStart", "id": id, "author": author })
        }
        Node::CommentEnd { id } => json!({ "kind": "commentEnd", "id": id }),
        Node::EditRangeStart { user } => json!({ "kind": "editRangeStart", "user": user }),
        Node::EditRangeEnd => json!({ "kind": "editRangeEnd" }),
        Node::FieldStart { kind } => json!({ "kind": "fieldStart", "fieldKind": kind }),
        Node::FieldEnd => json!({ "kind": "fieldEnd" }),
        Node::Footnote(footnote) => json!({
            "kind": "footnote",
            "footnoteKind": footnote.kind,
            "blocks": write_children(tree, &footnote.blocks),
        }),
    }
}

fn write_children(tree: &DocumentTree, children: &[NodeId]) -> Value {
    Value::Array(children.iter().map(|&child| write_node(tree, child)).collect())
}

/// Serializes a whole document body plus header/footer containers. Two
/// documents with equal output are equivalent for undo/redo purposes; node
/// ids never appear in the output.
pub fn write_document(tree: &DocumentTree) -> Value {
    json!({
        "sections": tree
            .sections
            .iter()
            .map(|&section| write_node(tree, section))
            .collect::<Vec<_>>(),
        "headersFooters": tree
            .headers_footers
            .iter()
            .map(|container| json!({
                "kind": container.kind,
                "blocks": write_children(tree, &container.blocks),
            }))
            .collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::format::CharacterFormat;

    #[test]
    fn identical_content_serializes_identically_across_arenas() {
        let mut a = DocumentTree::new();
        let mut b = DocumentTree::new();
        // allocate extra garbage in b so ids diverge
        let garbage = b.new_paragraph();
        b.release_subtree(garbage);

        for tree in [&mut a, &mut b] {
            let paragraph = tree.first_paragraph(tree.sections[0]).unwrap();
            let run = tree.new_text_run("same", CharacterFormat::default());
            tree.insert_inline_at(paragraph, 0, run);
        }

        assert_eq!(write_document(&a), write_document(&b));
    }
}
