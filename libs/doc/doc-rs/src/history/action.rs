//! The closed set of undoable user actions. Each variant selects the
//! capture/revert/operation-synthesis branch that applies; exhaustive
//! matching replaces the runtime string dispatch the engine grew out of.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    // content edits
    Insert,
    Enter,
    BackSpace,
    Delete,
    Cut,
    Paste,
    // table structure
    InsertTable,
    InsertRowAbove,
    InsertRowBelow,
    InsertColumnLeft,
    InsertColumnRight,
    DeleteRow,
    DeleteColumn,
    DeleteTable,
    MergeCells,
    ClearCells,
    RowResizing,
    CellResizing,
    TableDialog,
    // whole-format changes
    CharacterFormat,
    ParagraphFormat,
    SectionFormat,
    TableFormat,
    RowFormat,
    CellFormat,
    ListFormat,
    ContinueNumbering,
    RestartNumbering,
    ClearFormat,
    // single-property table family changes
    RowHeight,
    RowHeightType,
    RowHeader,
    AllowBreakAcrossPages,
    CellContentVerticalAlignment,
    CellPreferredWidth,
    Shading,
    CellSpacing,
    TableLeftIndent,
    TablePreferredWidth,
    Borders,
    // non-text structure
    InsertBookmark,
    DeleteBookmark,
    InsertComment,
    DeleteComment,
    InsertField,
    InsertEditRange,
    DeleteEditRange,
    InsertFootnote,
    InsertEndnote,
    DeleteHeaderFooter,
    // tracked changes
    AcceptChange,
    RejectChange,
}

impl ActionKind {
    /// Actions whose revert must re-combine split table fragments before any
    /// node reinsertion.
    pub fn is_table_structural(self) -> bool {
        matches!(
            self,
            ActionKind::DeleteRow
                | ActionKind::DeleteColumn
                | ActionKind::DeleteTable
                | ActionKind::MergeCells
                | ActionKind::ClearCells
                | ActionKind::InsertRowAbove
                | ActionKind::InsertRowBelow
                | ActionKind::InsertColumnLeft
                | ActionKind::InsertColumnRight
        )
    }

    /// Zero-width caret widening direction: these decrement the start, every
    /// other action increments the end.
    pub fn widens_start(self) -> bool {
        matches!(self, ActionKind::BackSpace | ActionKind::Insert | ActionKind::Enter)
    }

    /// Actions whose entries restore properties rather than reinsert nodes.
    pub fn is_format_action(self) -> bool {
        matches!(
            self,
            ActionKind::CharacterFormat
                | ActionKind::ParagraphFormat
                | ActionKind::SectionFormat
                | ActionKind::TableFormat
                | ActionKind::RowFormat
                | ActionKind::CellFormat
                | ActionKind::ListFormat
                | ActionKind::ContinueNumbering
                | ActionKind::RestartNumbering
                | ActionKind::ClearFormat
                | ActionKind::RowResizing
                | ActionKind::CellResizing
                | ActionKind::TableDialog
                | ActionKind::RowHeight
                | ActionKind::RowHeightType
                | ActionKind::RowHeader
                | ActionKind::AllowBreakAcrossPages
                | ActionKind::CellContentVerticalAlignment
                | ActionKind::CellPreferredWidth
                | ActionKind::Shading
                | ActionKind::CellSpacing
                | ActionKind::TableLeftIndent
                | ActionKind::TablePreferredWidth
                | ActionKind::Borders
        )
    }

    pub fn is_insert_family(self) -> bool {
        matches!(
            self,
            ActionKind::Insert
                | ActionKind::Enter
                | ActionKind::Paste
                | ActionKind::InsertTable
                | ActionKind::InsertRowAbove
                | ActionKind::InsertRowBelow
                | ActionKind::InsertColumnLeft
                | ActionKind::InsertColumnRight
                | ActionKind::InsertFootnote
                | ActionKind::InsertEndnote
        )
    }

    pub fn is_delete_family(self) -> bool {
        matches!(
            self,
            ActionKind::BackSpace
                | ActionKind::Delete
                | ActionKind::Cut
                | ActionKind::DeleteBookmark
                | ActionKind::DeleteComment
                | ActionKind::DeleteEditRange
                | ActionKind::DeleteTable
                | ActionKind::DeleteRow
                | ActionKind::DeleteColumn
                | ActionKind::DeleteHeaderFooter
        )
    }
}

/// Property names for the single-property row format actions. Unmatched
/// actions resolve to no property and therefore to no format operation.
pub fn row_property_name(action: ActionKind) -> Option<&'static str> {
    match action {
        ActionKind::RowHeight | ActionKind::RowResizing => Some("height"),
        ActionKind::RowHeightType => Some("heightType"),
        ActionKind::RowHeader => Some("isHeader"),
        ActionKind::AllowBreakAcrossPages => Some("allowBreakAcrossPages"),
        _ => None,
    }
}

pub fn cell_property_name(action: ActionKind) -> Option<&'static str> {
    match action {
        ActionKind::CellContentVerticalAlignment => Some("verticalAlignment"),
        ActionKind::CellPreferredWidth | ActionKind::CellResizing => Some("preferredWidth"),
        ActionKind::Shading => Some("shading"),
        _ => None,
    }
}

pub fn table_property_name(action: ActionKind) -> Option<&'static str> {
    match action {
        ActionKind::CellSpacing => Some("cellSpacing"),
        ActionKind::TableLeftIndent => Some("leftIndent"),
        ActionKind::TablePreferredWidth => Some("preferredWidth"),
        ActionKind::Borders => Some("borders"),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unmatched_actions_map_to_no_property() {
        assert_eq!(row_property_name(ActionKind::Insert), None);
        assert_eq!(cell_property_name(ActionKind::DeleteRow), None);
        assert_eq!(table_property_name(ActionKind::BackSpace), None);
    }

    #[test]
    fn caret_widening_direction() {
        assert!(ActionKind::BackSpace.widens_start());
        assert!(ActionKind::Insert.widens_start());
        assert!(ActionKind::Enter.widens_start());
        assert!(!ActionKind::Delete.widens_start());
        assert!(!ActionKind::Cut.widens_start());
    }
}
