//! Shared export specification models.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conf::{
    C_COL_REF_BOUND_DEFAULT, C_SHEET_NAME_DEFAULT, C_SUFFIX_CALENDAR_TITLE, C_TITLE_ENTITY_INFO,
    N_HEIGHT_HEADER,
};

////////////////////////////////////////////////////////////////////////////////
// #region TableSpecification

/// Display column definition handed over by the table collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecColumnDefinition {
    /// Record field key; columns without one are display-only.
    #[serde(default)]
    pub prop: Option<String>,
    /// Header label.
    #[serde(default)]
    pub label: String,
    /// Export flag; `false` hides the column from the export.
    #[serde(default = "derive_true")]
    pub is_export: bool,
}

fn derive_true() -> bool {
    true
}

impl SpecColumnDefinition {
    /// Exported column bound to `prop`.
    pub fn new(prop: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            prop: Some(prop.into()),
            label: label.into(),
            is_export: true,
        }
    }

    /// Return a copy with the export flag replaced.
    pub fn with_export(mut self, is_export: bool) -> Self {
        self.is_export = is_export;
        self
    }

    /// Whether this column takes part in the export.
    pub fn is_exportable(&self) -> bool {
        self.prop.is_some() && self.is_export
    }
}

/// Normalized cell value during the assemble/write pipeline.
///
/// Deserializes from JSON null, numbers and strings; booleans become the text
/// `True`/`False`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum EnumCellValue {
    /// Missing/blank value.
    #[default]
    None,
    /// Numeric value.
    Number(f64),
    /// Text value.
    String(String),
}

impl EnumCellValue {
    /// Whether the value renders as an empty cell.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::None => true,
            Self::String(s) => s.is_empty(),
            Self::Number(_) => false,
        }
    }
}

impl<'de> Deserialize<'de> for EnumCellValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(CellValueVisitor)
    }
}

struct CellValueVisitor;

impl<'de> Visitor<'de> for CellValueVisitor {
    type Value = EnumCellValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("null, a number, a string or a boolean")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(EnumCellValue::None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(EnumCellValue::None)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        EnumCellValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(EnumCellValue::String(
            if v { "True" } else { "False" }.to_string(),
        ))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(EnumCellValue::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(EnumCellValue::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(EnumCellValue::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(EnumCellValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(EnumCellValue::String(v))
    }
}

impl From<&str> for EnumCellValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for EnumCellValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for EnumCellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for EnumCellValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

/// One table row keyed by column `prop`.
pub type SpecRecord = BTreeMap<String, EnumCellValue>;

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CalendarSpecification

/// Month calendar used for the attendance header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecCalendar {
    /// Calendar year.
    pub year: i32,
    /// Calendar month, 1-based.
    pub month: u32,
    /// Number of days in `month`.
    pub days_in_month: u32,
    /// Month title, e.g. `2024年4月份`.
    pub header_label: String,
    /// One label per day, e.g. `4月1日`.
    pub day_labels: Vec<String>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region GridSpecification

/// Rectangular merged span, 0-indexed and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecMergeRegion {
    /// First row.
    pub row_start: usize,
    /// First column.
    pub col_start: usize,
    /// Last row.
    pub row_end: usize,
    /// Last column.
    pub col_end: usize,
}

impl SpecMergeRegion {
    /// Horizontal span on a single row.
    pub fn horizontal(row_idx: usize, col_start: usize, col_end: usize) -> Self {
        Self {
            row_start: row_idx,
            col_start,
            row_end: row_idx,
            col_end,
        }
    }

    /// Whether the region covers only its anchor cell.
    pub fn is_single_cell(&self) -> bool {
        self.row_start == self.row_end && self.col_start == self.col_end
    }

    /// Whether `(row_idx, col_idx)` lies inside the region.
    pub fn contains(&self, row_idx: usize, col_idx: usize) -> bool {
        (self.row_start..=self.row_end).contains(&row_idx)
            && (self.col_start..=self.col_end).contains(&col_idx)
    }
}

/// Cell rectangle, 0-indexed and inclusive (`A1:AI3` is rows 0..=2, cols 0..=34).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecCellRange {
    /// First row.
    pub row_first: usize,
    /// First column.
    pub col_first: usize,
    /// Last row.
    pub row_last: usize,
    /// Last column.
    pub col_last: usize,
}

impl SpecCellRange {
    /// Whether `(row_idx, col_idx)` lies inside the range.
    pub fn contains(&self, row_idx: usize, col_idx: usize) -> bool {
        (self.row_first..=self.row_last).contains(&row_idx)
            && (self.col_first..=self.col_last).contains(&col_idx)
    }
}

/// Assembled worksheet: two header rows, data body, merges and declared range.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecExportGrid {
    /// Row 0 (titles) and row 1 (column labels); both `width_total()` wide.
    pub header_grid: Vec<Vec<String>>,
    /// One row per record, one cell per exportable column.
    pub body_grid: Vec<Vec<EnumCellValue>>,
    /// Header merge regions on row 0.
    pub merges: Vec<SpecMergeRegion>,
    /// Declared sheet range in A1 notation.
    pub range_ref: String,
    /// Number of exportable entity columns.
    pub width_entity: usize,
}

impl SpecExportGrid {
    /// Total column count (entity columns + calendar day columns).
    pub fn width_total(&self) -> usize {
        self.header_grid.first().map_or(0, Vec::len)
    }

    /// Total row count including the header rows.
    pub fn height_total(&self) -> usize {
        N_HEIGHT_HEADER + self.body_grid.len()
    }

    /// Title row; empty when the header is missing.
    pub fn row_titles(&self) -> &[String] {
        self.header_grid.first().map(Vec::as_slice).unwrap_or_default()
    }

    /// Column labels row; empty when the header is missing.
    pub fn row_labels(&self) -> &[String] {
        self.header_grid.get(1).map(Vec::as_slice).unwrap_or_default()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WriteOptions

/// Autofit rule for column width inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumAutofitColumnsRule {
    /// Disable autofit.
    None,
    /// Infer width from header cells only (default).
    #[default]
    Header,
    /// Infer width from body cells only.
    Body,
    /// Infer width from both header and body cells.
    All,
}

/// Autofit policy for one sheet write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecAutofitCellsPolicy {
    /// Autofit width inference rule.
    pub rule_columns: EnumAutofitColumnsRule,
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            rule_columns: EnumAutofitColumnsRule::Header,
            width_cell_min: 8,
            width_cell_max: 60,
            width_cell_padding: 2,
        }
    }
}

/// Export-wide options: fixed titles, sheet naming and layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecExportOptions {
    /// Worksheet name.
    pub sheet_name: String,
    /// Rightmost column letter of the declared sheet range.
    pub col_ref_bound: String,
    /// Title over the entity-info block.
    pub title_entity_info: String,
    /// Suffix appended to the calendar month title.
    pub suffix_calendar_title: String,
    /// Number of frozen columns.
    pub col_freeze: usize,
    /// Frozen row index; defaults to the header height when `None`.
    pub row_freeze: Option<usize>,
    /// Column autofit policy.
    pub policy_autofit: SpecAutofitCellsPolicy,
}

impl Default for SpecExportOptions {
    fn default() -> Self {
        Self {
            sheet_name: C_SHEET_NAME_DEFAULT.to_string(),
            col_ref_bound: C_COL_REF_BOUND_DEFAULT.to_string(),
            title_entity_info: C_TITLE_ENTITY_INFO.to_string(),
            suffix_calendar_title: C_SUFFIX_CALENDAR_TITLE.to_string(),
            col_freeze: 0,
            row_freeze: None,
            policy_autofit: SpecAutofitCellsPolicy::default(),
        }
    }
}

/// Cell format specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Italic style.
    pub italic: Option<bool>,

    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,
    /// Text wrap.
    pub text_wrap: Option<bool>,

    /// Number format code.
    pub num_format: Option<String>,
    /// Background fill color.
    pub bg_color: Option<String>,
    /// Font color.
    pub font_color: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            text_wrap: other.text_wrap.or(self.text_wrap),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportSpecification

/// One written worksheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSheetWrite {
    /// Actual unique sheet name in workbook.
    pub sheet_name: String,
    /// Declared range written to the sheet.
    pub range_ref: String,
    /// Number of data rows below the header.
    pub height_body: usize,
    /// Total column count of the assembled grid.
    pub width_total: usize,
    /// Number of cells dropped because they fall outside `range_ref`.
    pub cnt_cells_clipped: usize,
}

/// Per-write call report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecXlsxReport {
    /// Sheets produced by the write call.
    pub sheets: Vec<SpecSheetWrite>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecXlsxReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Export failures surfaced to callers.
#[derive(Debug, Error)]
pub enum XlsxExportError {
    /// Range reference is not `<col><row>:<col><row>` in A1 notation.
    #[error("invalid range reference: {0:?}")]
    InvalidRangeRef(String),
    /// Column letters are empty or not uppercase A-Z.
    #[error("invalid column reference: {0:?}")]
    InvalidColumnRef(String),
    /// Row or column index exceeds the worksheet limits.
    #[error("{axis} index overflow: {value}")]
    IndexOverflow {
        /// `row` or `column`.
        axis: &'static str,
        /// Offending 0-based index.
        value: usize,
    },
    /// Grid header/body/merge shapes disagree.
    #[error("invalid grid layout: {0}")]
    InvalidGridLayout(String),
    /// Autofit policy bounds are inconsistent.
    #[error("invalid autofit policy: {0}")]
    InvalidAutofitPolicy(String),
    /// Writer was already closed.
    #[error("cannot write after close()")]
    WriterClosed,
    /// DataFrame input could not be decoded.
    #[error("failed to read DataFrame: {0}")]
    DataFrame(String),
    /// Serialization library failure.
    #[error("xlsx write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_definition_deserializes_collaborator_field_names() {
        let l_cols: Vec<SpecColumnDefinition> = serde_json::from_str(
            r#"[
                {"prop": "name", "label": "Name"},
                {"prop": "age", "label": "Age", "isExport": false},
                {"label": "Actions"}
            ]"#,
        )
        .expect("parse columns");

        assert!(l_cols[0].is_export);
        assert!(l_cols[0].is_exportable());
        assert!(!l_cols[1].is_exportable());
        assert_eq!(l_cols[2].prop, None);
        assert!(!l_cols[2].is_exportable());
    }

    #[test]
    fn test_record_values_deserialize_by_kind() {
        let record: SpecRecord =
            serde_json::from_str(r#"{"name": "Li", "age": 30, "note": null}"#).expect("parse");

        assert_eq!(record["name"], EnumCellValue::String("Li".to_string()));
        assert_eq!(record["age"], EnumCellValue::Number(30.0));
        assert_eq!(record["note"], EnumCellValue::None);
    }

    #[test]
    fn test_record_booleans_deserialize_as_text() {
        let l_records: Vec<SpecRecord> = serde_json::from_str(
            r#"[{"name": "Li", "active": true}, {"name": "Wang", "active": false}]"#,
        )
        .expect("parse records");

        assert_eq!(l_records[0]["active"], EnumCellValue::String("True".to_string()));
        assert_eq!(l_records[1]["active"], EnumCellValue::String("False".to_string()));
        assert_eq!(l_records[1]["name"], EnumCellValue::String("Wang".to_string()));
        assert!(serde_json::from_str::<SpecRecord>(r#"{"tags": ["a"]}"#).is_err());
    }

    #[test]
    fn test_grid_rows_are_empty_without_header() {
        let grid = SpecExportGrid {
            header_grid: vec![],
            body_grid: vec![],
            merges: vec![],
            range_ref: "A1:AI2".to_string(),
            width_entity: 0,
        };
        assert!(grid.row_titles().is_empty());
        assert!(grid.row_labels().is_empty());
        assert_eq!(grid.width_total(), 0);
    }

    #[test]
    fn test_export_options_fill_missing_fields_from_defaults() {
        let options: SpecExportOptions =
            serde_json::from_str(r#"{"sheet_name": "考勤"}"#).expect("parse options");

        assert_eq!(options.sheet_name, "考勤");
        assert_eq!(options.col_ref_bound, C_COL_REF_BOUND_DEFAULT);
        assert_eq!(options.title_entity_info, C_TITLE_ENTITY_INFO);
        assert_eq!(options.policy_autofit, SpecAutofitCellsPolicy::default());
    }

    #[test]
    fn test_merge_region_single_cell_and_contains() {
        let region = SpecMergeRegion::horizontal(0, 2, 5);
        assert!(!region.is_single_cell());
        assert!(region.contains(0, 2));
        assert!(region.contains(0, 5));
        assert!(!region.contains(1, 3));
        assert!(SpecMergeRegion::horizontal(0, 0, 0).is_single_cell());
    }
}
