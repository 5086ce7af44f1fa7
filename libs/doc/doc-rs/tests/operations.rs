//! Operation batches emitted in collaborative mode. Offsets are absolute
//! stream positions; batches apply in array order on the peer.

use doc_rs::model::tree::FootnoteKind;
use doc_rs::sync::operation::{MarkerInfo, OperationSubtype};
use doc_rs::OperationKind;
use serde_json::json;
use test_utils::*;

#[test]
fn typing_emits_insert_and_its_inverse() {
    let (mut editor, _paragraph) = collaborative_editor_with_text("");

    let ops = editor.insert_text("AB");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].action, OperationKind::Insert);
    assert_eq!(ops[0].offset, 0);
    assert_eq!(ops[0].length, 2);
    assert_eq!(ops[0].text.as_deref(), Some("AB"));

    let ops = editor.undo();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].action, OperationKind::Delete);
    assert_eq!(ops[0].offset, 0);
    assert_eq!(ops[0].length, 2);

    let ops = editor.redo();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].action, OperationKind::Insert);
    assert_eq!(ops[0].offset, 0);
    assert_eq!(ops[0].length, 2);
    assert_eq!(ops[0].text.as_deref(), Some("AB"));
}

#[test]
fn collapsed_forward_delete_widens_to_length_one() {
    let (mut editor, paragraph) = collaborative_editor_with_text("abcdefghijkl");
    place_caret(&mut editor, paragraph, 10);

    let ops = editor.delete_forward();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].action, OperationKind::Delete);
    assert_eq!(ops[0].offset, 10);
    assert_eq!(ops[0].length, 1);
}

#[test]
fn backward_selection_is_normalized_before_emission() {
    let (mut editor, paragraph) = collaborative_editor_with_text("abcdefghij");
    select(&mut editor, (paragraph, 9), (paragraph, 4));

    let ops = editor.cut();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].action, OperationKind::Delete);
    assert_eq!(ops[0].offset, 4);
    assert_eq!(ops[0].length, 5);
}

#[test]
fn replacing_a_selection_orders_delete_before_insert() {
    let (mut editor, paragraph) = collaborative_editor_with_text("hello");
    select(&mut editor, (paragraph, 1), (paragraph, 4));

    let ops = editor.insert_text("X");
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0].action, OperationKind::Delete);
    assert_eq!(ops[0].offset, 1);
    assert_eq!(ops[0].length, 3);
    assert_eq!(ops[1].action, OperationKind::Insert);
    assert_eq!(ops[1].offset, 1);
    assert_eq!(ops[1].length, 1);
    assert_eq!(ops[1].text.as_deref(), Some("X"));
}

#[test]
fn merged_paragraph_undo_orders_structural_delete_first() {
    let (mut editor, first) = collaborative_editor_with_text("ab");
    let second = append_paragraph(&mut editor, "cd");
    select(&mut editor, (first, 1), (second, 1));

    let ops = editor.backspace();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].action, OperationKind::Delete);
    assert_eq!(ops[0].offset, 1);
    assert_eq!(ops[0].length, 3);

    // restoring a removed paragraph first deletes the merged boundary
    let ops = editor.undo();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0].action, OperationKind::Delete);
    assert_eq!(ops[0].offset, 1);
    assert_eq!(ops[0].length, 1);
    assert_eq!(ops[1].action, OperationKind::Insert);
    assert_eq!(ops[1].offset, 1);
    assert_eq!(ops[1].length, 3);
    assert!(ops[1].paste_content.is_some());
    assert_eq!(ops[1].subtype, Some(OperationSubtype::Paste));

    let ops = editor.redo();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].action, OperationKind::Delete);
    assert_eq!(ops[0].offset, 1);
    assert_eq!(ops[0].length, 3);
}

#[test]
fn deleting_a_footnote_anchor_extends_the_length_by_its_body() {
    let (mut editor, paragraph) = collaborative_editor_with_text("abc");
    place_caret(&mut editor, paragraph, 1);
    editor.insert_footnote(FootnoteKind::Footnote, "note");

    select(&mut editor, (paragraph, 1), (paragraph, 2));
    let ops = editor.delete_forward();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].action, OperationKind::Delete);
    assert_eq!(ops[0].offset, 1);
    // anchor glyph plus the owned body ("note" + paragraph mark)
    assert_eq!(ops[0].length, 6);
}

#[test]
fn character_format_carries_the_live_payload() {
    let (mut editor, paragraph) = collaborative_editor_with_text("word");
    select(&mut editor, (paragraph, 0), (paragraph, 4));

    let ops = editor.apply_character_format("bold", json!(true));
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].action, OperationKind::Format);
    assert_eq!(ops[0].offset, 0);
    assert_eq!(ops[0].length, 4);
    assert_eq!(ops[0].subtype, Some(OperationSubtype::CharacterFormat));
    let payload: serde_json::Value =
        serde_json::from_str(ops[0].format.as_deref().unwrap()).unwrap();
    assert_eq!(payload["bold"], json!(true));
}

#[test]
fn bookmark_insert_travels_with_marker_data() {
    let (mut editor, paragraph) = collaborative_editor_with_text("word");
    select(&mut editor, (paragraph, 0), (paragraph, 4));

    let ops = editor.insert_bookmark("mark");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].action, OperationKind::Insert);
    assert_eq!(
        ops[0].marker_data,
        Some(MarkerInfo::Bookmark { name: "mark".into() })
    );

    let ops = editor.undo();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].action, OperationKind::Delete);
}

#[test]
fn inserting_a_table_queues_per_cell_formats() {
    let (mut editor, paragraph) = collaborative_editor_with_text("intro");
    place_caret(&mut editor, paragraph, 5);

    let ops = editor.insert_table(2, 2);
    // one structural insert, then three format operations per cell
    assert_eq!(ops.len(), 1 + 4 * 3);
    assert_eq!(ops[0].action, OperationKind::Insert);
    assert!(ops[1..].iter().all(|op| op.action == OperationKind::Format));
}

#[test]
fn row_resize_travels_as_an_update() {
    let (mut editor, _intro) = collaborative_editor_with_text("intro");
    let table = append_table(&mut editor, 1, 1);
    let inside = cell_paragraph(&editor, table, 0, 0);
    place_caret(&mut editor, inside, 0);

    let ops = editor.resize_row(24.0);
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].action, OperationKind::Update);
    assert_eq!(ops[0].subtype, Some(OperationSubtype::RowFormat));
}
