//! Structural table edits toggle between attached and detached structure on
//! every undo/redo replay, re-combining split fragments first.

use doc_rs::DocumentEditor;
use doc_rs::model::format::CharacterFormat;
use doc_rs::model::tree::{Node, NodeId};
use test_utils::*;

fn put_cell_text(editor: &mut DocumentEditor, paragraph: NodeId, text: &str) {
    let run = editor.tree.new_text_run(text, CharacterFormat::default());
    editor.tree.insert_inline_at(paragraph, 0, run);
}

#[test]
fn deleting_a_split_table_restores_one_combined_widget() {
    let (mut editor, _intro) = editor_with_text("intro");
    let table = append_table(&mut editor, 3, 2);
    let continuation = editor.tree.split_table(table, 2);
    assert!(continuation.is_some());
    assert_eq!(body_blocks(&editor).len(), 3);

    let inside = cell_paragraph(&editor, table, 0, 0);
    place_caret(&mut editor, inside, 0);
    editor.delete_table();
    assert_eq!(body_blocks(&editor).len(), 1);

    editor.undo();
    let blocks = body_blocks(&editor);
    assert_eq!(blocks.len(), 2);
    assert!(editor.tree.is_table(blocks[1]));
    // the continuation fragment was folded back before removal
    assert_eq!(editor.tree.child_ids(blocks[1]).len(), 3);

    editor.redo();
    assert_eq!(body_blocks(&editor).len(), 1);
}

#[test]
fn delete_row_round_trips() {
    let (mut editor, _intro) = editor_with_text("intro");
    let table = append_table(&mut editor, 2, 2);
    let target = cell_paragraph(&editor, table, 1, 0);
    put_cell_text(&mut editor, target, "row two");
    place_caret(&mut editor, target, 0);

    editor.delete_row();
    assert_eq!(editor.tree.child_ids(table).len(), 1);

    editor.undo();
    assert_eq!(editor.tree.child_ids(table).len(), 2);
    assert_eq!(paragraph_text(&editor, target), "row two");

    editor.redo();
    assert_eq!(editor.tree.child_ids(table).len(), 1);
}

#[test]
fn insert_row_below_round_trips() {
    let (mut editor, _intro) = editor_with_text("intro");
    let table = append_table(&mut editor, 2, 2);
    let anchor = cell_paragraph(&editor, table, 0, 0);
    place_caret(&mut editor, anchor, 0);

    editor.insert_row(false);
    assert_eq!(editor.tree.child_ids(table).len(), 3);

    editor.undo();
    assert_eq!(editor.tree.child_ids(table).len(), 2);

    editor.redo();
    assert_eq!(editor.tree.child_ids(table).len(), 3);
}

#[test]
fn delete_column_round_trips() {
    let (mut editor, _intro) = editor_with_text("intro");
    let table = append_table(&mut editor, 2, 2);
    let target = cell_paragraph(&editor, table, 0, 1);
    put_cell_text(&mut editor, target, "x");
    place_caret(&mut editor, target, 0);

    editor.delete_column();
    for row in editor.tree.child_ids(table) {
        assert_eq!(editor.tree.child_ids(row).len(), 1);
    }

    editor.undo();
    for row in editor.tree.child_ids(table) {
        assert_eq!(editor.tree.child_ids(row).len(), 2);
    }
    assert_eq!(paragraph_text(&editor, target), "x");

    editor.redo();
    for row in editor.tree.child_ids(table) {
        assert_eq!(editor.tree.child_ids(row).len(), 1);
    }
}

#[test]
fn merge_cells_round_trips() {
    let (mut editor, _intro) = editor_with_text("intro");
    let table = append_table(&mut editor, 1, 2);
    let left = cell_paragraph(&editor, table, 0, 0);
    let right = cell_paragraph(&editor, table, 0, 1);
    put_cell_text(&mut editor, left, "a");
    put_cell_text(&mut editor, right, "b");
    select(&mut editor, (left, 0), (right, 1));

    editor.merge_cells();
    let row = editor.tree.child_ids(table)[0];
    let cells = editor.tree.child_ids(row);
    assert_eq!(cells.len(), 1);
    assert_eq!(editor.tree.child_ids(cells[0]).len(), 2);
    match editor.tree.node(cells[0]) {
        Some(Node::Cell(cell)) => assert_eq!(cell.format.column_span, 2),
        _ => panic!("merged cell missing"),
    }

    editor.undo();
    let cells = editor.tree.child_ids(row);
    assert_eq!(cells.len(), 2);
    assert_eq!(paragraph_text(&editor, left), "a");
    assert_eq!(paragraph_text(&editor, right), "b");

    editor.redo();
    assert_eq!(editor.tree.child_ids(row).len(), 1);
}

#[test]
fn clear_cells_round_trips() {
    let (mut editor, _intro) = editor_with_text("intro");
    let table = append_table(&mut editor, 1, 2);
    let left = cell_paragraph(&editor, table, 0, 0);
    let right = cell_paragraph(&editor, table, 0, 1);
    put_cell_text(&mut editor, left, "a");
    put_cell_text(&mut editor, right, "b");
    select(&mut editor, (left, 0), (right, 1));

    editor.clear_cells();
    let row = editor.tree.child_ids(table)[0];
    for cell in editor.tree.child_ids(row) {
        let paragraph = editor.tree.first_paragraph(cell).unwrap();
        assert_eq!(paragraph_text(&editor, paragraph), "");
    }

    editor.undo();
    assert_eq!(paragraph_text(&editor, left), "a");
    assert_eq!(paragraph_text(&editor, right), "b");

    editor.redo();
    for cell in editor.tree.child_ids(row) {
        let paragraph = editor.tree.first_paragraph(cell).unwrap();
        assert_eq!(paragraph_text(&editor, paragraph), "");
    }
}
