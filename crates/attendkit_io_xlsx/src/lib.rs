//! `attendkit_io_xlsx` v1:
//! Rust-side attendance-calendar XLSX export kernel.
//!
//! Module layout:
//! - `conf`     : constants and default presets
//! - `spec`     : specs/models/options/errors
//! - `calendar` : month calendar generation
//! - `grid`     : two-row merged header + data grid assembly
//! - `util`     : pure helper functions
//! - `writer`   : pure-Rust workbook writer
pub mod calendar;
pub mod conf;
pub mod grid;
pub mod spec;
pub mod util;
pub mod writer;

pub use calendar::{calculate_days_in_month, generate_calendar, generate_calendar_for_today};
pub use conf::{
    C_COL_REF_BOUND_DEFAULT, C_FILE_NAME_DEFAULT, C_SHEET_NAME_DEFAULT, C_SUFFIX_CALENDAR_TITLE,
    C_TITLE_ENTITY_INFO, N_HEIGHT_HEADER, N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX,
    N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
};
pub use grid::{
    build_export_grid, build_export_grid_from_dataframe, build_export_grid_from_ipc_bytes,
    plan_header_merges,
};
pub use spec::{
    EnumAutofitColumnsRule, EnumCellValue, SpecAutofitCellsPolicy, SpecCalendar, SpecCellFormat,
    SpecCellRange, SpecColumnDefinition, SpecExportGrid, SpecExportOptions, SpecMergeRegion,
    SpecRecord, SpecSheetWrite, SpecXlsxReport, XlsxExportError,
};
pub use util::{
    convert_col_ref_to_index, convert_index_to_col_ref, format_cell_range, parse_cell_range,
    sanitize_sheet_name, select_exportable_columns,
};
pub use writer::{XlsxExportWriter, export_sheet};
