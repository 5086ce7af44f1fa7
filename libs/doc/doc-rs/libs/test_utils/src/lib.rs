//! Shared fixtures for driving a [DocumentEditor] in integration tests.

use doc_rs::DocumentEditor;
use doc_rs::model::format::CharacterFormat;
use doc_rs::model::position::{Selection, TextPosition};
use doc_rs::model::revision::RevisionKind;
use doc_rs::model::tree::{Node, NodeId};
use uuid::Uuid;

pub fn editor() -> DocumentEditor {
    DocumentEditor::new("ada")
}

pub fn collaborative_editor() -> DocumentEditor {
    let mut editor = editor();
    editor.set_collaborative_editing(true);
    editor
}

/// A fresh editor whose first paragraph holds `text`, caret at the end.
pub fn editor_with_text(text: &str) -> (DocumentEditor, NodeId) {
    let mut editor = editor();
    let paragraph = seed_text(&mut editor, text);
    (editor, paragraph)
}

pub fn collaborative_editor_with_text(text: &str) -> (DocumentEditor, NodeId) {
    let (mut editor, paragraph) = editor_with_text(text);
    editor.set_collaborative_editing(true);
    (editor, paragraph)
}

fn seed_text(editor: &mut DocumentEditor, text: &str) -> NodeId {
    let section = editor.tree.sections[0];
    let paragraph = editor.tree.first_paragraph(section).unwrap();
    if !text.is_empty() {
        let run = editor.tree.new_text_run(text, CharacterFormat::default());
        editor.tree.insert_inline_at(paragraph, 0, run);
    }
    let offset = doc_rs::model::tree::DocumentTree::grapheme_len(text);
    place_caret(editor, paragraph, offset);
    paragraph
}

/// Appends a new paragraph holding `text` at the end of the first section.
pub fn append_paragraph(editor: &mut DocumentEditor, text: &str) -> NodeId {
    let section = editor.tree.sections[0];
    let paragraph = editor.tree.new_paragraph();
    if !text.is_empty() {
        let run = editor.tree.new_text_run(text, CharacterFormat::default());
        editor.tree.insert_inline_at(paragraph, 0, run);
    }
    let index = editor.tree.child_ids(section).len();
    editor.tree.insert_block_at(section, index, paragraph);
    paragraph
}

/// Appends a `rows` x `columns` table after the existing body blocks and
/// returns its id.
pub fn append_table(editor: &mut DocumentEditor, rows: usize, columns: usize) -> NodeId {
    let section = editor.tree.sections[0];
    let table = editor.tree.new_table(rows, columns);
    let index = editor.tree.child_ids(section).len();
    editor.tree.insert_block_at(section, index, table);
    table
}

pub fn place_caret(editor: &mut DocumentEditor, paragraph: NodeId, offset: usize) {
    editor.set_selection(Selection::caret(TextPosition { paragraph, offset }));
}

pub fn select(
    editor: &mut DocumentEditor, start: (NodeId, usize), end: (NodeId, usize),
) {
    editor.set_selection(Selection {
        start: TextPosition { paragraph: start.0, offset: start.1 },
        end: TextPosition { paragraph: end.0, offset: end.1 },
    });
}

/// First paragraph of the cell at (`row`, `column`).
pub fn cell_paragraph(
    editor: &DocumentEditor, table: NodeId, row: usize, column: usize,
) -> NodeId {
    let row_id = editor.tree.child_ids(table)[row];
    let cell_id = editor.tree.child_ids(row_id)[column];
    editor.tree.first_paragraph(cell_id).unwrap()
}

/// Top-level blocks of the first section.
pub fn body_blocks(editor: &DocumentEditor) -> Vec<NodeId> {
    editor.tree.child_ids(editor.tree.sections[0])
}

pub fn paragraph_text(editor: &DocumentEditor, paragraph: NodeId) -> String {
    editor.tree.paragraph_text(paragraph)
}

/// Registers an insertion revision authored by `author` and marks the first
/// run of `paragraph` with it. The acting author is left unchanged.
pub fn mark_insertion(
    editor: &mut DocumentEditor, paragraph: NodeId, author: &str,
) -> Uuid {
    let previous = editor.revisions.current_author.clone();
    editor.revisions.current_author = author.to_string();
    let id = editor.revisions.begin(RevisionKind::Insertion);
    editor.revisions.current_author = previous;

    let run = editor
        .tree
        .child_ids(paragraph)
        .into_iter()
        .find(|&inline| matches!(editor.tree.node(inline), Some(Node::TextRun(_))))
        .expect("paragraph without a run");
    if let Some(Node::TextRun(text_run)) = editor.tree.node_mut(run) {
        text_run.revision_ids.push(id);
    }
    id
}

/// Revision ids carried by the first run of `paragraph`.
pub fn run_revisions(editor: &DocumentEditor, paragraph: NodeId) -> Vec<Uuid> {
    for inline in editor.tree.child_ids(paragraph) {
        if let Some(Node::TextRun(run)) = editor.tree.node(inline) {
            return run.revision_ids.clone();
        }
    }
    vec![]
}
