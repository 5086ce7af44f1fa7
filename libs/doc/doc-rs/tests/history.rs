//! Undo/redo round trips for plain content edits.

use test_utils::*;

#[test]
fn typing_round_trips_through_undo_and_redo() {
    let (mut editor, paragraph) = editor_with_text("");

    editor.insert_text("AB");
    assert_eq!(paragraph_text(&editor, paragraph), "AB");

    editor.undo();
    assert_eq!(paragraph_text(&editor, paragraph), "");
    assert!(editor.history.can_redo());

    editor.redo();
    assert_eq!(paragraph_text(&editor, paragraph), "AB");

    editor.undo();
    assert_eq!(paragraph_text(&editor, paragraph), "");
}

#[test]
fn backspace_restores_the_deleted_character() {
    let (mut editor, paragraph) = editor_with_text("abc");

    editor.backspace();
    assert_eq!(paragraph_text(&editor, paragraph), "ab");

    editor.undo();
    assert_eq!(paragraph_text(&editor, paragraph), "abc");

    editor.redo();
    assert_eq!(paragraph_text(&editor, paragraph), "ab");
}

#[test]
fn replacing_a_selection_round_trips() {
    let (mut editor, paragraph) = editor_with_text("hello");
    select(&mut editor, (paragraph, 1), (paragraph, 4));

    editor.insert_text("X");
    assert_eq!(paragraph_text(&editor, paragraph), "hXo");

    editor.undo();
    assert_eq!(paragraph_text(&editor, paragraph), "hello");

    editor.redo();
    assert_eq!(paragraph_text(&editor, paragraph), "hXo");
}

#[test]
fn enter_splits_and_undo_rejoins() {
    let (mut editor, paragraph) = editor_with_text("abcd");
    place_caret(&mut editor, paragraph, 2);

    editor.enter();
    let blocks = body_blocks(&editor);
    assert_eq!(blocks.len(), 2);
    assert_eq!(paragraph_text(&editor, blocks[0]), "ab");
    assert_eq!(paragraph_text(&editor, blocks[1]), "cd");

    editor.undo();
    assert_eq!(body_blocks(&editor).len(), 1);
    assert_eq!(paragraph_text(&editor, paragraph), "abcd");

    editor.redo();
    let blocks = body_blocks(&editor);
    assert_eq!(blocks.len(), 2);
    assert_eq!(paragraph_text(&editor, blocks[0]), "ab");
    assert_eq!(paragraph_text(&editor, blocks[1]), "cd");
}

#[test]
fn cross_paragraph_delete_restores_both_paragraphs() {
    let (mut editor, first) = editor_with_text("ab");
    let second = append_paragraph(&mut editor, "cd");
    select(&mut editor, (first, 1), (second, 1));

    editor.backspace();
    assert_eq!(body_blocks(&editor).len(), 1);
    assert_eq!(paragraph_text(&editor, first), "ad");

    editor.undo();
    let blocks = body_blocks(&editor);
    assert_eq!(blocks.len(), 2);
    assert_eq!(paragraph_text(&editor, blocks[0]), "ab");
    assert_eq!(paragraph_text(&editor, blocks[1]), "cd");

    editor.redo();
    assert_eq!(body_blocks(&editor).len(), 1);
    assert_eq!(paragraph_text(&editor, first), "ad");
}

#[test]
fn delete_spanning_three_paragraphs_round_trips() {
    let (mut editor, first) = editor_with_text("ab");
    append_paragraph(&mut editor, "mid");
    let third = append_paragraph(&mut editor, "cd");
    select(&mut editor, (first, 1), (third, 1));

    editor.backspace();
    assert_eq!(body_blocks(&editor).len(), 1);
    assert_eq!(paragraph_text(&editor, first), "ad");
    let after = editor.document_json();

    editor.undo();
    let blocks = body_blocks(&editor);
    assert_eq!(blocks.len(), 3);
    assert_eq!(paragraph_text(&editor, blocks[0]), "ab");
    assert_eq!(paragraph_text(&editor, blocks[1]), "mid");
    assert_eq!(paragraph_text(&editor, blocks[2]), "cd");

    // redo must collapse all three paragraphs again, not just the first two
    editor.redo();
    assert_eq!(body_blocks(&editor).len(), 1);
    assert_eq!(paragraph_text(&editor, first), "ad");
    assert_eq!(editor.document_json(), after);
}

#[test]
fn undo_restores_the_exact_serialized_document() {
    let (mut editor, first) = editor_with_text("ab");
    append_paragraph(&mut editor, "cd");
    let before = editor.document_json();

    select(&mut editor, (first, 0), (first, 2));
    editor.insert_text("xy");
    let after = editor.document_json();
    assert_ne!(before, after);

    editor.undo();
    assert_eq!(editor.document_json(), before);

    // replaying the same entry converges to the same two documents
    editor.redo();
    assert_eq!(editor.document_json(), after);
    editor.undo();
    assert_eq!(editor.document_json(), before);
}

#[test]
fn a_fresh_action_clears_the_redo_stack() {
    let (mut editor, _paragraph) = editor_with_text("");
    editor.insert_text("a");
    editor.undo();
    assert!(editor.history.can_redo());

    editor.insert_text("b");
    assert!(!editor.history.can_redo());
}

#[test]
fn undo_depth_is_capped() {
    let (mut editor, _paragraph) = editor_with_text("");
    for _ in 0..510 {
        editor.insert_text("x");
    }
    assert_eq!(editor.history.undo_len(), 500);
}

#[test]
fn undo_with_empty_history_is_a_noop() {
    let mut editor = editor();
    assert!(editor.undo().is_empty());
    assert!(editor.redo().is_empty());
    assert!(!editor.history.can_undo());
}
