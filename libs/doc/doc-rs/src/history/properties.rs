//! "Previous value" snapshots for formatting actions.
//!
//! Snapshots implement a swap-for-inverse pattern: the first (forward) call
//! stores the state being replaced; every undo/redo replay returns the stored
//! state and overwrites the slot with the live state, so repeated undo/redo
//! toggles between exactly two states without a third copy.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::history::stack::Direction;
use crate::model::format::{
    CellFormat, CharacterFormat, ListLevelFormat, ParagraphFormat, RowFormat, SectionFormat,
    TableFormat,
};
use crate::model::writer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatKind {
    Character,
    Paragraph,
    Section,
    Table,
    Row,
    Cell,
    ListLevel,
    ContinueNumbering,
    RestartNumbering,
}

/// One stored "previous" snapshot. `snapshot` is the whole-format JSON
/// record; `property` narrows the restore to a single named property when
/// the action only changed one. `captured_len` is the owning run's length at
/// capture time, used to detect runs the layout re-split afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModifiedProperty {
    pub kind: FormatKind,
    pub snapshot: Value,
    pub property: Option<String>,
    pub captured_len: Option<usize>,
}

/// Replay position within `modified_properties`. One entry can cover many
/// non-contiguous edits (multi-cell formatting); each replay pass walks the
/// snapshots with its own cursor instead of entry-wide mutable state.
#[derive(Debug, Default, Clone, Copy)]
pub struct PropertyCursor {
    pub index: usize,
}

/// Core swap. Forward pushes a snapshot of the state being replaced and
/// returns `value` untouched. Undo/redo returns the stored previous value
/// (whole snapshot, or the named property extracted from it) and overwrites
/// the slot with `live_snapshot`.
#[allow(clippy::too_many_arguments)]
pub fn add_modified_properties(
    properties: &mut Vec<ModifiedProperty>, cursor: &mut PropertyCursor, direction: Direction,
    kind: FormatKind, live_snapshot: Value, property: Option<&str>, value: Value,
    current_len: Option<usize>,
) -> Value {
    match direction {
        Direction::Forward => {
            properties.push(ModifiedProperty {
                kind,
                snapshot: live_snapshot,
                property: property.map(|name| name.to_string()),
                captured_len: current_len,
            });
            value
        }
        Direction::Undo | Direction::Redo => {
            if cursor.index >= properties.len() {
                warn!("property replay past end of snapshots; skipping");
                return value;
            }

            heal_split_run(properties, cursor.index, current_len);

            let slot = &mut properties[cursor.index];
            let previous = std::mem::replace(&mut slot.snapshot, live_snapshot);
            slot.captured_len = current_len;
            cursor.index += 1;

            match property {
                Some(name) => previous.get(name).cloned().unwrap_or(Value::Null),
                None => previous,
            }
        }
    }
}

/// A split/partial run shrank since capture: splice a synthetic snapshot in
/// at the next index carrying the same previous value, so the split fragment
/// replays against the correct state too.
fn heal_split_run(properties: &mut Vec<ModifiedProperty>, index: usize, current_len: Option<usize>) {
    let (Some(current), Some(captured)) =
        (current_len, properties[index].captured_len)
    else {
        return;
    };
    if current >= captured {
        return;
    }
    let mut synthetic = properties[index].clone();
    synthetic.captured_len = Some(captured - current);
    properties[index].captured_len = Some(current);
    properties.insert(index + 1, synthetic);
}

pub fn character_snapshot(format: &CharacterFormat) -> Value {
    writer::write_character_format(format)
}

pub fn paragraph_snapshot(format: &ParagraphFormat) -> Value {
    writer::write_paragraph_format(format)
}

pub fn section_snapshot(format: &SectionFormat) -> Value {
    writer::write_section_format(format)
}

pub fn table_snapshot(format: &TableFormat) -> Value {
    writer::write_table_format(format)
}

pub fn row_snapshot(format: &RowFormat) -> Value {
    writer::write_row_format(format)
}

pub fn cell_snapshot(format: &CellFormat) -> Value {
    writer::write_cell_format(format)
}

pub fn list_level_snapshot(format: &ListLevelFormat) -> Value {
    serde_json::to_value(format).unwrap_or(Value::Null)
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn swap_toggles_between_two_states() {
        let mut properties = vec![];
        let mut format = CharacterFormat::default();

        // capture: bold goes false -> true
        let mut cursor = PropertyCursor::default();
        let applied = add_modified_properties(
            &mut properties,
            &mut cursor,
            Direction::Forward,
            FormatKind::Character,
            character_snapshot(&format),
            Some("bold"),
            json!(true),
            None,
        );
        assert_eq!(applied, json!(true));
        format.bold = true;

        // undo: original value comes back, slot now holds the bold state
        let mut cursor = PropertyCursor::default();
        let previous = add_modified_properties(
            &mut properties,
            &mut cursor,
            Direction::Undo,
            FormatKind::Character,
            character_snapshot(&format),
            Some("bold"),
            Value::Null,
            None,
        );
        assert_eq!(previous, json!(false));
        format.bold = false;

        // redo: second-call value comes back
        let mut cursor = PropertyCursor::default();
        let second = add_modified_properties(
            &mut properties,
            &mut cursor,
            Direction::Redo,
            FormatKind::Character,
            character_snapshot(&format),
            Some("bold"),
            Value::Null,
            None,
        );
        assert_eq!(second, json!(true));
        assert_eq!(properties.len(), 1);
    }

    #[test]
    fn shrunken_run_splices_synthetic_snapshot() {
        let format = CharacterFormat::default();
        let mut properties = vec![ModifiedProperty {
            kind: FormatKind::Character,
            snapshot: character_snapshot(&format),
            property: Some("bold".into()),
            captured_len: Some(5),
        }];
        let mut cursor = PropertyCursor::default();

        add_modified_properties(
            &mut properties,
            &mut cursor,
            Direction::Undo,
            FormatKind::Character,
            character_snapshot(&format),
            Some("bold"),
            Value::Null,
            Some(2),
        );

        assert_eq!(properties.len(), 2);
        assert_eq!(properties[0].captured_len, Some(2));
        assert_eq!(properties[1].captured_len, Some(3));
        assert_eq!(cursor.index, 1);
    }
}
