//! Formatting records captured by history snapshots and embedded, as plain
//! JSON data, in outgoing operations.
//!
//! Only the property subset the history engine actually round-trips is
//! modeled; the breadth of the visual format surface is out of scope.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Underline {
    #[default]
    None,
    Single,
    Double,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeightType {
    #[default]
    Auto,
    AtLeast,
    Exactly,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerticalAlignment {
    #[default]
    Top,
    Center,
    Bottom,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListPattern {
    #[default]
    Arabic,
    LowLetter,
    UpLetter,
    LowRoman,
    UpRoman,
    Bullet,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Shading {
    pub background_color: String,
    pub foreground_color: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Borders {
    pub line_width: f32,
    pub color: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CharacterFormat {
    pub bold: bool,
    pub italic: bool,
    pub underline: Underline,
    pub strikethrough: bool,
    pub font_family: String,
    pub font_size: f32,
    pub font_color: String,
    pub highlight_color: Option<String>,
}

impl Default for CharacterFormat {
    fn default() -> Self {
        Self {
            bold: false,
            italic: false,
            underline: Underline::None,
            strikethrough: false,
            font_family: "Calibri".into(),
            font_size: 11.0,
            font_color: "#000000".into(),
            highlight_color: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListFormat {
    pub list_id: i32,
    pub list_level_number: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParagraphFormat {
    pub alignment: Alignment,
    pub left_indent: f32,
    pub right_indent: f32,
    pub first_line_indent: f32,
    pub line_spacing: f32,
    pub before_spacing: f32,
    pub after_spacing: f32,
    pub list_format: Option<ListFormat>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionFormat {
    pub page_width: f32,
    pub page_height: f32,
    pub left_margin: f32,
    pub right_margin: f32,
    pub top_margin: f32,
    pub bottom_margin: f32,
    pub header_distance: f32,
    pub footer_distance: f32,
}

impl Default for SectionFormat {
    fn default() -> Self {
        Self {
            page_width: 612.0,
            page_height: 792.0,
            left_margin: 72.0,
            right_margin: 72.0,
            top_margin: 72.0,
            bottom_margin: 72.0,
            header_distance: 36.0,
            footer_distance: 36.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableFormat {
    pub left_indent: f32,
    pub cell_spacing: f32,
    pub preferred_width: f32,
    pub borders: Borders,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RowFormat {
    pub height: f32,
    pub height_type: HeightType,
    pub is_header: bool,
    pub allow_break_across_pages: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CellFormat {
    pub preferred_width: f32,
    pub vertical_alignment: VerticalAlignment,
    pub shading: Shading,
    pub column_span: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListLevelFormat {
    pub list_level_pattern: ListPattern,
    pub number_format: String,
    pub start_at: i32,
}

fn value_as_f32(value: &Value) -> Option<f32> {
    value.as_f64().map(|f| f as f32)
}

impl CharacterFormat {
    pub fn property(&self, name: &str) -> Option<Value> {
        match name {
            "bold" => Some(json!(self.bold)),
            "italic" => Some(json!(self.italic)),
            "underline" => serde_json::to_value(self.underline).ok(),
            "strikethrough" => Some(json!(self.strikethrough)),
            "fontFamily" => Some(json!(self.font_family)),
            "fontSize" => Some(json!(self.font_size)),
            "fontColor" => Some(json!(self.font_color)),
            "highlightColor" => Some(json!(self.highlight_color)),
            _ => None,
        }
    }

    pub fn set_property(&mut self, name: &str, value: &Value) {
        match name {
            "bold" => self.bold = value.as_bool().unwrap_or(self.bold),
            "italic" => self.italic = value.as_bool().unwrap_or(self.italic),
            "underline" => {
                if let Ok(underline) = serde_json::from_value(value.clone()) {
                    self.underline = underline;
                }
            }
            "strikethrough" => {
                self.strikethrough = value.as_bool().unwrap_or(self.strikethrough)
            }
            "fontFamily" => {
                if let Some(family) = value.as_str() {
                    self.font_family = family.to_string();
                }
            }
            "fontSize" => self.font_size = value_as_f32(value).unwrap_or(self.font_size),
            "fontColor" => {
                if let Some(color) = value.as_str() {
                    self.font_color = color.to_string();
                }
            }
            "highlightColor" => {
                self.highlight_color = value.as_str().map(|color| color.to_string())
            }
            _ => {}
        }
    }
}

impl ParagraphFormat {
    pub fn property(&self, name: &str) -> Option<Value> {
        match name {
            "alignment" => serde_json::to_value(self.alignment).ok(),
            "leftIndent" => Some(json!(self.left_indent)),
            "rightIndent" => Some(json!(self.right_indent)),
            "firstLineIndent" => Some(json!(self.first_line_indent)),
            "lineSpacing" => Some(json!(self.line_spacing)),
            "beforeSpacing" => Some(json!(self.before_spacing)),
            "afterSpacing" => Some(json!(self.after_spacing)),
            "listFormat" => serde_json::to_value(&self.list_format).ok(),
            _ => None,
        }
    }

    pub fn set_property(&mut self, name: &str, value: &Value) {
        match name {
            "alignment" => {
                if let Ok(alignment) = serde_json::from_value(value.clone()) {
                    self.alignment = alignment;
                }
            }
            "leftIndent" => self.left_indent = value_as_f32(value).unwrap_or(self.left_indent),
            "rightIndent" => self.right_indent = value_as_f32(value).unwrap_or(self.right_indent),
            "firstLineIndent" => {
                self.first_line_indent = value_as_f32(value).unwrap_or(self.first_line_indent)
            }
            "lineSpacing" => self.line_spacing = value_as_f32(value).unwrap_or(self.line_spacing),
            "beforeSpacing" => {
                self.before_spacing = value_as_f32(value).unwrap_or(self.before_spacing)
            }
            "afterSpacing" => {
                self.after_spacing = value_as_f32(value).unwrap_or(self.after_spacing)
            }
            "listFormat" => {
                if let Ok(list_format) = serde_json::from_value(value.clone()) {
                    self.list_format = list_format;
                }
            }
            _ => {}
        }
    }
}

impl TableFormat {
    pub fn property(&self, name: &str) -> Option<Value> {
        match name {
            "leftIndent" => Some(json!(self.left_indent)),
            "cellSpacing" => Some(json!(self.cell_spacing)),
            "preferredWidth" => Some(json!(self.preferred_width)),
            "borders" => serde_json::to_value(&self.borders).ok(),
            _ => None,
        }
    }

    pub fn set_property(&mut self, name: &str, value: &Value) {
        match name {
            "leftIndent" => self.left_indent = value_as_f32(value).unwrap_or(self.left_indent),
            "cellSpacing" => self.cell_spacing = value_as_f32(value).unwrap_or(self.cell_spacing),
            "preferredWidth" => {
                self.preferred_width = value_as_f32(value).unwrap_or(self.preferred_width)
            }
            "borders" => {
                if let Ok(borders) = serde_json::from_value(value.clone()) {
                    self.borders = borders;
                }
            }
            _ => {}
        }
    }
}

impl RowFormat {
    pub fn property(&self, name: &str) -> Option<Value> {
        match name {
            "height" => Some(json!(self.height)),
            "heightType" => serde_json::to_value(self.height_type).ok(),
            "isHeader" => Some(json!(self.is_header)),
            "allowBreakAcrossPages" => Some(json!(self.allow_break_across_pages)),
            _ => None,
        }
    }

    pub fn set_property(&mut self, name: &str, value: &Value) {
        match name {
            "height" => self.height = value_as_f32(value).unwrap_or(self.height),
            "heightType" => {
                if let Ok(height_type) = serde_json::from_value(value.clone()) {
                    self.height_type = height_type;
                }
            }
            "isHeader" => self.is_header = value.as_bool().unwrap_or(self.is_header),
            "allowBreakAcrossPages" => {
                self.allow_break_across_pages =
                    value.as_bool().unwrap_or(self.allow_break_across_pages)
            }
            _ => {}
        }
    }
}

impl CellFormat {
    pub fn property(&self, name: &str) -> Option<Value> {
        match name {
            "preferredWidth" => Some(json!(self.preferred_width)),
            "verticalAlignment" => serde_json::to_value(self.vertical_alignment).ok(),
            "shading" => serde_json::to_value(&self.shading).ok(),
            "columnSpan" => Some(json!(self.column_span)),
            _ => None,
        }
    }

    pub fn set_property(&mut self, name: &str, value: &Value) {
        match name {
            "preferredWidth" => {
                self.preferred_width = value_as_f32(value).unwrap_or(self.preferred_width)
            }
            "verticalAlignment" => {
                if let Ok(alignment) = serde_json::from_value(value.clone()) {
                    self.vertical_alignment = alignment;
                }
            }
            "shading" => {
                if let Ok(shading) = serde_json::from_value(value.clone()) {
                    self.shading = shading;
                }
            }
            "columnSpan" => {
                self.column_span = value.as_u64().map(|v| v as u32).unwrap_or(self.column_span)
            }
            _ => {}
        }
    }
}

impl SectionFormat {
    pub fn property(&self, name: &str) -> Option<Value> {
        match name {
            "pageWidth" => Some(json!(self.page_width)),
            "pageHeight" => Some(json!(self.page_height)),
            "leftMargin" => Some(json!(self.left_margin)),
            "rightMargin" => Some(json!(self.right_margin)),
            "topMargin" => Some(json!(self.top_margin)),
            "bottomMargin" => Some(json!(self.bottom_margin)),
            "headerDistance" => Some(json!(self.header_distance)),
            "footerDistance" => Some(json!(self.footer_distance)),
            _ => None,
        }
    }

    pub fn set_property(&mut self, name: &str, value: &Value) {
        let Some(number) = value_as_f32(value) else { return };
        match name {
            "pageWidth" => self.page_width = number,
            "pageHeight" => self.page_height = number,
            "leftMargin" => self.left_margin = number,
            "rightMargin" => self.right_margin = number,
            "topMargin" => self.top_margin = number,
            "bottomMargin" => self.bottom_margin = number,
            "headerDistance" => self.header_distance = number,
            "footerDistance" => self.footer_distance = number,
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn character_property_round_trip() {
        let mut format = CharacterFormat::default();
        format.set_property("bold", &json!(true));
        assert_eq!(format.property("bold"), Some(json!(true)));
        assert_eq!(format.property("notAProperty"), None);
    }

    #[test]
    fn set_ignores_mistyped_values() {
        let mut format = RowFormat::default();
        format.set_property("height", &json!("not a number"));
        assert_eq!(format.height, 0.0);
    }
}
