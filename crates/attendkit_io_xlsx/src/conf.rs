//! Export constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::SpecCellFormat;

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Number of header rows above the data body (title row + labels row).
pub const N_HEIGHT_HEADER: usize = 2;

/// Title written over the entity-info column block.
pub const C_TITLE_ENTITY_INFO: &str = "人员信息";
/// Suffix appended to the calendar header label in the title row.
pub const C_SUFFIX_CALENDAR_TITLE: &str = "考勤日历";

/// Default worksheet name.
pub const C_SHEET_NAME_DEFAULT: &str = "sheet0";
/// Default workbook file name.
pub const C_FILE_NAME_DEFAULT: &str = "test.xlsx";
/// Rightmost column of the declared sheet range.
pub const C_COL_REF_BOUND_DEFAULT: &str = "AI";

/// Canonical format preset keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumFmtKey {
    /// Data cell format.
    Text,
    /// Header cell format (title row and labels row).
    Header,
}

impl EnumFmtKey {
    /// Key used in [`derive_default_xlsx_formats`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Header => "header",
        }
    }
}

/// Build default named format presets used by [`crate::writer::XlsxExportWriter`].
pub fn derive_default_xlsx_formats() -> BTreeMap<String, SpecCellFormat> {
    let cfg_base_fmt_spec = SpecCellFormat {
        font_name: Some("Times New Roman".to_string()),
        font_size: Some(11),
        border: Some(1),
        align: Some("left".to_string()),
        valign: Some("vcenter".to_string()),
        ..Default::default()
    };

    let mut dict_fmt = BTreeMap::new();
    dict_fmt.insert(
        EnumFmtKey::Text.as_str().to_string(),
        cfg_base_fmt_spec.clone(),
    );
    dict_fmt.insert(
        EnumFmtKey::Header.as_str().to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            align: Some("center".to_string()),
            ..Default::default()
        }),
    );

    dict_fmt
}

/// Look up one default preset by key.
pub fn derive_default_xlsx_format(key: EnumFmtKey) -> SpecCellFormat {
    derive_default_xlsx_formats()
        .remove(key.as_str())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_formats_cover_every_key() {
        let dict_fmt = derive_default_xlsx_formats();
        for key in [EnumFmtKey::Text, EnumFmtKey::Header] {
            assert!(dict_fmt.contains_key(key.as_str()));
        }
        assert_eq!(derive_default_xlsx_format(EnumFmtKey::Header).bold, Some(true));
        assert_eq!(derive_default_xlsx_format(EnumFmtKey::Text).bold, None);
    }
}
