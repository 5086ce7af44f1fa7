//! Property snapshot round trips: the same entry must toggle between the
//! before and after formats on every undo/redo replay.

use doc_rs::DocumentEditor;
use doc_rs::model::format::ListFormat;
use doc_rs::model::tree::{Node, NodeId};
use serde_json::json;
use test_utils::*;

fn run_styles(editor: &DocumentEditor, paragraph: NodeId) -> Vec<(String, bool, bool)> {
    editor
        .tree
        .child_ids(paragraph)
        .into_iter()
        .filter_map(|inline| match editor.tree.node(inline) {
            Some(Node::TextRun(run)) => {
                Some((run.text.clone(), run.format.bold, run.format.italic))
            }
            _ => None,
        })
        .collect()
}

#[test]
fn stacked_format_entries_undo_and_redo_independently() {
    let (mut editor, paragraph) = editor_with_text("word");
    select(&mut editor, (paragraph, 0), (paragraph, 4));

    editor.apply_character_format("bold", json!(true));
    editor.apply_character_format("italic", json!(true));
    assert_eq!(run_styles(&editor, paragraph), vec![("word".into(), true, true)]);

    editor.undo();
    assert_eq!(run_styles(&editor, paragraph), vec![("word".into(), true, false)]);
    editor.undo();
    assert_eq!(run_styles(&editor, paragraph), vec![("word".into(), false, false)]);

    editor.redo();
    assert_eq!(run_styles(&editor, paragraph), vec![("word".into(), true, false)]);
    editor.redo();
    assert_eq!(run_styles(&editor, paragraph), vec![("word".into(), true, true)]);
}

#[test]
fn format_entries_record_the_property_name() {
    let (mut editor, paragraph) = editor_with_text("word");
    select(&mut editor, (paragraph, 0), (paragraph, 4));
    editor.apply_character_format("bold", json!(true));

    let entry = editor.history.pop_undo().expect("entry recorded");
    assert_eq!(entry.property_name.as_deref(), Some("bold"));
    assert!(entry.insert_text.is_none());
}

#[test]
fn partial_selection_splits_the_run_and_undoes_cleanly() {
    let (mut editor, paragraph) = editor_with_text("hello");
    select(&mut editor, (paragraph, 1), (paragraph, 4));

    editor.apply_character_format("bold", json!(true));
    assert_eq!(
        run_styles(&editor, paragraph),
        vec![
            ("h".into(), false, false),
            ("ell".into(), true, false),
            ("o".into(), false, false),
        ]
    );

    editor.undo();
    assert_eq!(paragraph_text(&editor, paragraph), "hello");
    assert!(run_styles(&editor, paragraph).iter().all(|(_, bold, _)| !bold));
}

#[test]
fn clear_format_undo_restores_character_and_paragraph_formats() {
    let (mut editor, paragraph) = editor_with_text("word");
    select(&mut editor, (paragraph, 0), (paragraph, 4));
    editor.apply_character_format("bold", json!(true));
    editor.apply_paragraph_format("leftIndent", json!(36.0));

    editor.clear_format();
    assert_eq!(run_styles(&editor, paragraph), vec![("word".into(), false, false)]);

    editor.undo();
    assert_eq!(run_styles(&editor, paragraph), vec![("word".into(), true, false)]);
    match editor.tree.node(paragraph) {
        Some(Node::Paragraph(p)) => assert_eq!(p.format.left_indent, 36.0),
        _ => panic!("paragraph missing"),
    }
}

#[test]
fn paragraph_format_round_trips() {
    let (mut editor, paragraph) = editor_with_text("word");
    place_caret(&mut editor, paragraph, 0);

    editor.apply_paragraph_format("leftIndent", json!(36.0));
    match editor.tree.node(paragraph) {
        Some(Node::Paragraph(p)) => assert_eq!(p.format.left_indent, 36.0),
        _ => panic!("paragraph missing"),
    }

    editor.undo();
    match editor.tree.node(paragraph) {
        Some(Node::Paragraph(p)) => assert_eq!(p.format.left_indent, 0.0),
        _ => panic!("paragraph missing"),
    }

    editor.redo();
    match editor.tree.node(paragraph) {
        Some(Node::Paragraph(p)) => assert_eq!(p.format.left_indent, 36.0),
        _ => panic!("paragraph missing"),
    }
}

#[test]
fn restart_numbering_round_trips_the_list_level() {
    let (mut editor, paragraph) = editor_with_text("item");
    if let Some(Node::Paragraph(p)) = editor.tree.node_mut(paragraph) {
        p.format.list_format = Some(ListFormat { list_id: 7, list_level_number: 2 });
    }
    place_caret(&mut editor, paragraph, 0);

    editor.restart_numbering();
    match editor.tree.node(paragraph) {
        Some(Node::Paragraph(p)) => {
            assert_eq!(p.format.list_format.as_ref().unwrap().list_level_number, 0)
        }
        _ => panic!("paragraph missing"),
    }

    editor.undo();
    match editor.tree.node(paragraph) {
        Some(Node::Paragraph(p)) => {
            assert_eq!(p.format.list_format.as_ref().unwrap().list_level_number, 2)
        }
        _ => panic!("paragraph missing"),
    }
}
