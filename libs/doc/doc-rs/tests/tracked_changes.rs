//! Track-changes semantics: deletes over another author's pending insertion
//! only mark the content, deletes over the acting author's own insertion are
//! hard, and accept/reject resolutions round trip through undo/redo.

use doc_rs::model::format::CharacterFormat;
use doc_rs::model::revision::RevisionKind;
use doc_rs::model::tree::NodeId;
use doc_rs::sync::operation::MarkerInfo;
use doc_rs::{DocumentEditor, OperationKind};
use test_utils::*;

fn put_cell_text(editor: &mut DocumentEditor, paragraph: NodeId, text: &str) {
    let run = editor.tree.new_text_run(text, CharacterFormat::default());
    editor.tree.insert_inline_at(paragraph, 0, run);
}

#[test]
fn deleting_another_authors_insertion_only_marks_it() {
    let (mut editor, paragraph) = editor_with_text("abc");
    let insertion = mark_insertion(&mut editor, paragraph, "grace");
    editor.set_track_changes(true);
    select(&mut editor, (paragraph, 0), (paragraph, 3));

    editor.backspace();
    assert_eq!(paragraph_text(&editor, paragraph), "abc");
    let marks = run_revisions(&editor, paragraph);
    assert_eq!(marks.len(), 2);
    assert!(marks.contains(&insertion));

    editor.undo();
    assert_eq!(run_revisions(&editor, paragraph), vec![insertion]);

    editor.redo();
    assert_eq!(run_revisions(&editor, paragraph).len(), 2);
    assert_eq!(paragraph_text(&editor, paragraph), "abc");
}

#[test]
fn deleting_your_own_pending_insertion_is_hard() {
    let (mut editor, paragraph) = editor_with_text("abc");
    let insertion = mark_insertion(&mut editor, paragraph, "ada");
    editor.set_track_changes(true);
    select(&mut editor, (paragraph, 0), (paragraph, 3));

    editor.backspace();
    assert_eq!(paragraph_text(&editor, paragraph), "");

    editor.undo();
    assert_eq!(paragraph_text(&editor, paragraph), "abc");
    assert!(run_revisions(&editor, paragraph).contains(&insertion));

    editor.redo();
    assert_eq!(paragraph_text(&editor, paragraph), "");
}

#[test]
fn marked_delete_travels_as_a_format_operation() {
    let (mut editor, paragraph) = collaborative_editor_with_text("abc");
    mark_insertion(&mut editor, paragraph, "grace");
    editor.set_track_changes(true);
    select(&mut editor, (paragraph, 0), (paragraph, 3));

    let ops = editor.backspace();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].action, OperationKind::Format);
    assert_eq!(ops[0].offset, 0);
    assert_eq!(ops[0].length, 3);
    match &ops[0].marker_data {
        Some(MarkerInfo::Revision { kind, author, .. }) => {
            assert_eq!(*kind, RevisionKind::Deletion);
            assert_eq!(author, "ada");
        }
        other => panic!("expected a deletion revision marker, got {other:?}"),
    }
}

#[test]
fn deleting_a_row_you_inserted_emits_a_hard_delete() {
    let mut editor = collaborative_editor();
    let table = append_table(&mut editor, 2, 2);
    let target = cell_paragraph(&editor, table, 1, 0);
    put_cell_text(&mut editor, target, "mine");
    mark_insertion(&mut editor, target, "ada");
    editor.set_track_changes(true);
    place_caret(&mut editor, target, 0);

    let ops = editor.delete_row();
    assert!(!ops.is_empty());
    assert_eq!(ops[0].action, OperationKind::Delete);
}

#[test]
fn deleting_another_authors_row_emits_a_deletion_mark() {
    let mut editor = collaborative_editor();
    let table = append_table(&mut editor, 2, 2);
    let target = cell_paragraph(&editor, table, 1, 0);
    put_cell_text(&mut editor, target, "theirs");
    mark_insertion(&mut editor, target, "grace");
    editor.set_track_changes(true);
    place_caret(&mut editor, target, 0);

    let ops = editor.delete_row();
    assert!(!ops.is_empty());
    assert_eq!(ops[0].action, OperationKind::Format);
    match &ops[0].marker_data {
        Some(MarkerInfo::Revision { kind, author, .. }) => {
            assert_eq!(*kind, RevisionKind::Deletion);
            assert_eq!(author, "ada");
        }
        other => panic!("expected a deletion revision marker, got {other:?}"),
    }
}

#[test]
fn tracked_delete_across_paragraphs_leaves_the_document_unchanged() {
    let (mut editor, first) = editor_with_text("ab");
    let second = append_paragraph(&mut editor, "cd");
    editor.set_track_changes(true);
    let before = editor.document_json();
    select(&mut editor, (first, 1), (second, 1));

    let ops = editor.backspace();
    assert!(ops.is_empty());
    assert_eq!(editor.document_json(), before);
    assert!(!editor.history.can_undo());
}

#[test]
fn accepting_an_insertion_keeps_content_and_round_trips() {
    let (mut editor, paragraph) = editor_with_text("abc");
    let insertion = mark_insertion(&mut editor, paragraph, "grace");

    editor.accept_change(insertion);
    assert_eq!(paragraph_text(&editor, paragraph), "abc");
    assert!(run_revisions(&editor, paragraph).is_empty());
    assert!(editor.revisions.get(insertion).is_none());

    editor.undo();
    assert_eq!(run_revisions(&editor, paragraph), vec![insertion]);
    assert!(editor.revisions.get(insertion).is_some());

    editor.redo();
    assert!(run_revisions(&editor, paragraph).is_empty());
    assert_eq!(paragraph_text(&editor, paragraph), "abc");
}

#[test]
fn rejecting_an_insertion_removes_content_and_round_trips() {
    let (mut editor, paragraph) = editor_with_text("abc");
    let insertion = mark_insertion(&mut editor, paragraph, "grace");

    editor.reject_change(insertion);
    assert_eq!(paragraph_text(&editor, paragraph), "");

    editor.undo();
    assert_eq!(paragraph_text(&editor, paragraph), "abc");
    assert!(run_revisions(&editor, paragraph).contains(&insertion));

    editor.redo();
    assert_eq!(paragraph_text(&editor, paragraph), "");
}
