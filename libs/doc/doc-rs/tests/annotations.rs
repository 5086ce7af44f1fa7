//! Marker-pair annotations (bookmarks, comments, fields, editable ranges),
//! footnotes, and header/footer containers round trip through undo/redo.

use doc_rs::model::tree::{FieldKind, FootnoteKind, Node, NodeId};
use doc_rs::DocumentEditor;
use test_utils::*;
use uuid::Uuid;

fn count_markers(editor: &DocumentEditor, matches: &dyn Fn(&Node) -> bool) -> usize {
    fn walk(
        editor: &DocumentEditor, node: NodeId, matches: &dyn Fn(&Node) -> bool, total: &mut usize,
    ) {
        if let Some(current) = editor.tree.node(node) {
            if matches(current) {
                *total += 1;
            }
        }
        for child in editor.tree.child_ids(node) {
            walk(editor, child, matches, total);
        }
    }
    let mut total = 0;
    for &section in &editor.tree.sections {
        walk(editor, section, matches, &mut total);
    }
    total
}

fn comment_id(editor: &DocumentEditor, paragraph: NodeId) -> Option<Uuid> {
    for inline in editor.tree.child_ids(paragraph) {
        if let Some(Node::CommentStart { id, .. }) = editor.tree.node(inline) {
            return Some(*id);
        }
    }
    None
}

#[test]
fn bookmark_markers_round_trip() {
    let (mut editor, paragraph) = editor_with_text("abcd");
    select(&mut editor, (paragraph, 1), (paragraph, 3));
    let is_bookmark = |node: &Node| {
        matches!(node, Node::BookmarkStart { .. } | Node::BookmarkEnd { .. })
    };

    editor.insert_bookmark("b1");
    assert_eq!(count_markers(&editor, &is_bookmark), 2);
    assert_eq!(paragraph_text(&editor, paragraph), "abcd");

    editor.undo();
    assert_eq!(count_markers(&editor, &is_bookmark), 0);

    editor.redo();
    assert_eq!(count_markers(&editor, &is_bookmark), 2);

    editor.delete_bookmark("b1");
    assert_eq!(count_markers(&editor, &is_bookmark), 0);

    editor.undo();
    assert_eq!(count_markers(&editor, &is_bookmark), 2);
}

#[test]
fn comment_markers_round_trip() {
    let (mut editor, paragraph) = editor_with_text("abcd");
    select(&mut editor, (paragraph, 0), (paragraph, 4));
    let is_comment =
        |node: &Node| matches!(node, Node::CommentStart { .. } | Node::CommentEnd { .. });

    editor.insert_comment();
    assert_eq!(count_markers(&editor, &is_comment), 2);
    let id = comment_id(&editor, paragraph).expect("comment start missing");

    editor.undo();
    assert_eq!(count_markers(&editor, &is_comment), 0);

    editor.redo();
    assert_eq!(count_markers(&editor, &is_comment), 2);

    editor.delete_comment(id);
    assert_eq!(count_markers(&editor, &is_comment), 0);

    editor.undo();
    assert_eq!(count_markers(&editor, &is_comment), 2);
}

#[test]
fn field_pair_round_trips() {
    let (mut editor, paragraph) = editor_with_text("abcd");
    place_caret(&mut editor, paragraph, 2);
    let is_field =
        |node: &Node| matches!(node, Node::FieldStart { .. } | Node::FieldEnd);

    editor.insert_field(FieldKind::Hyperlink);
    assert_eq!(count_markers(&editor, &is_field), 2);

    editor.undo();
    assert_eq!(count_markers(&editor, &is_field), 0);
    assert_eq!(paragraph_text(&editor, paragraph), "abcd");

    editor.redo();
    assert_eq!(count_markers(&editor, &is_field), 2);
}

#[test]
fn footnote_anchor_round_trips() {
    let (mut editor, paragraph) = editor_with_text("abcd");
    place_caret(&mut editor, paragraph, 2);
    let is_anchor = |node: &Node| matches!(node, Node::Footnote(_));

    editor.insert_footnote(FootnoteKind::Footnote, "see below");
    assert_eq!(count_markers(&editor, &is_anchor), 1);

    editor.undo();
    assert_eq!(count_markers(&editor, &is_anchor), 0);

    editor.redo();
    assert_eq!(count_markers(&editor, &is_anchor), 1);
}

#[test]
fn edit_range_round_trips() {
    let (mut editor, paragraph) = editor_with_text("abcd");
    select(&mut editor, (paragraph, 0), (paragraph, 4));
    let is_range = |node: &Node| {
        matches!(node, Node::EditRangeStart { .. } | Node::EditRangeEnd)
    };

    editor.insert_edit_range("grace");
    assert_eq!(count_markers(&editor, &is_range), 2);

    editor.undo();
    assert_eq!(count_markers(&editor, &is_range), 0);

    editor.redo();
    assert_eq!(count_markers(&editor, &is_range), 2);
}

#[test]
fn deleting_a_header_snapshots_and_restores_its_blocks() {
    let mut editor = editor();
    editor.add_header("head");
    assert_eq!(editor.tree.headers_footers.len(), 1);

    editor.delete_header_footer(0);
    let block = editor.tree.headers_footers[0].blocks[0];
    assert_eq!(paragraph_text(&editor, block), "");

    editor.undo();
    let block = editor.tree.headers_footers[0].blocks[0];
    assert_eq!(paragraph_text(&editor, block), "head");

    editor.redo();
    let block = editor.tree.headers_footers[0].blocks[0];
    assert_eq!(paragraph_text(&editor, block), "");
}
