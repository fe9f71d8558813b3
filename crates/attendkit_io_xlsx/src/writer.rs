//! XLSX writer kernel that turns assembled export grids into workbook output.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::NaiveDate;
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use tracing::{info, warn};

use crate::calendar::generate_calendar;
use crate::conf::{EnumFmtKey, N_HEIGHT_HEADER, derive_default_xlsx_format};
use crate::grid::build_export_grid;
use crate::spec::{
    EnumAutofitColumnsRule, EnumCellValue, SpecAutofitCellsPolicy, SpecCellFormat,
    SpecColumnDefinition, SpecExportGrid, SpecExportOptions, SpecMergeRegion, SpecRecord,
    SpecSheetWrite, SpecXlsxReport, XlsxExportError,
};
use crate::util::{
    clip_merge_region, derive_merge_covered_cells, derive_unique_sheet_name,
    estimate_unicode_string_width, parse_cell_range, sanitize_sheet_name,
};

/// Stateful workbook writer.
pub struct XlsxExportWriter {
    path_file_out: PathBuf,
    workbook: Workbook,
    fmt_text: SpecCellFormat,
    fmt_header: SpecCellFormat,
    options: SpecExportOptions,
    set_sheet_names_existing: BTreeSet<String>,
    l_reports: Vec<SpecXlsxReport>,
    if_closed: bool,
}

impl XlsxExportWriter {
    /// Create writer bound to output path and format/options presets.
    ///
    /// The workbook is buffered in memory until [`Self::close`] is called.
    pub fn new(
        path_file_out: PathBuf,
        fmt_text: SpecCellFormat,
        fmt_header: SpecCellFormat,
        options: SpecExportOptions,
    ) -> Self {
        Self {
            path_file_out,
            workbook: Workbook::new(),
            fmt_text,
            fmt_header,
            options,
            set_sheet_names_existing: BTreeSet::new(),
            l_reports: Vec::new(),
            if_closed: false,
        }
    }

    /// Create writer with the default text/header presets.
    pub fn with_default_formats(path_file_out: PathBuf, options: SpecExportOptions) -> Self {
        Self::new(
            path_file_out,
            derive_default_xlsx_format(EnumFmtKey::Text),
            derive_default_xlsx_format(EnumFmtKey::Header),
            options,
        )
    }

    /// Return output file path as string.
    pub fn file_out(&self) -> String {
        self.path_file_out.to_string_lossy().to_string()
    }

    /// Return immutable snapshot of per-sheet write reports.
    pub fn report(&self) -> Vec<SpecXlsxReport> {
        self.l_reports.clone()
    }

    /// Flush workbook to disk. Idempotent.
    pub fn close(&mut self) -> Result<(), XlsxExportError> {
        if self.if_closed {
            return Ok(());
        }
        self.workbook.save(&self.path_file_out)?;
        self.if_closed = true;
        info!(path = %self.path_file_out.display(), "saved workbook");
        Ok(())
    }

    /// Write `grid` into a new worksheet named after `sheet_name`.
    ///
    /// Cells and merges outside `grid.range_ref` are dropped and reported as
    /// warnings.
    pub fn write_grid(
        &mut self,
        grid: &SpecExportGrid,
        sheet_name: &str,
    ) -> Result<(), XlsxExportError> {
        if self.if_closed {
            return Err(XlsxExportError::WriterClosed);
        }
        validate_grid_layout(grid)?;
        let policy_autofit = self.options.policy_autofit.clone();
        validate_policy_autofit(&policy_autofit)?;

        let range = parse_cell_range(&grid.range_ref)?;
        let sheet_name_unique = derive_unique_sheet_name(
            &sanitize_sheet_name(sheet_name, "_"),
            &mut self.set_sheet_names_existing,
        );

        let fmt_header = derive_rust_xlsx_format(&self.fmt_header);
        let fmt_text = derive_rust_xlsx_format(&self.fmt_text);

        let mut report = SpecXlsxReport::default();
        let mut n_cells_clipped = 0usize;

        let l_merges: Vec<SpecMergeRegion> = grid
            .merges
            .iter()
            .filter_map(|merge| {
                let merge_clipped = clip_merge_region(merge, &range);
                if merge_clipped != Some(*merge) {
                    report.warn(format!(
                        "Merge region {merge:?} clipped to range {}.",
                        grid.range_ref
                    ));
                }
                merge_clipped
            })
            .filter(|merge| !merge.is_single_cell())
            .collect();
        let set_cells_covered = derive_merge_covered_cells(&l_merges);
        let set_cells_anchor: BTreeSet<(usize, usize)> = l_merges
            .iter()
            .map(|merge| (merge.row_start, merge.col_start))
            .collect();

        let n_width_sheet = usize::min(grid.width_total(), range.col_last + 1);
        let mut l_width_by_col_header = vec![0usize; n_width_sheet];
        let mut l_width_by_col_body = vec![0usize; n_width_sheet];

        let worksheet = self.workbook.add_worksheet();
        worksheet.set_name(&sheet_name_unique)?;

        for (row_idx, row_values) in grid.header_grid.iter().enumerate() {
            for (col_idx, cell_value) in row_values.iter().enumerate() {
                if !range.contains(row_idx, col_idx) {
                    if !cell_value.is_empty() {
                        n_cells_clipped += 1;
                    }
                    continue;
                }
                if set_cells_covered.contains(&(row_idx, col_idx))
                    || set_cells_anchor.contains(&(row_idx, col_idx))
                {
                    continue;
                }

                if cell_value.is_empty() {
                    worksheet.write_blank(
                        cast_row_num(row_idx)?,
                        cast_col_num(col_idx)?,
                        &fmt_header,
                    )?;
                } else {
                    worksheet.write_string_with_format(
                        cast_row_num(row_idx)?,
                        cast_col_num(col_idx)?,
                        cell_value,
                        &fmt_header,
                    )?;
                    l_width_by_col_header[col_idx] = usize::max(
                        l_width_by_col_header[col_idx],
                        estimate_unicode_string_width(cell_value),
                    );
                }
            }
        }

        for merge in &l_merges {
            let c_text = &grid.header_grid[merge.row_start][merge.col_start];
            worksheet.merge_range(
                cast_row_num(merge.row_start)?,
                cast_col_num(merge.col_start)?,
                cast_row_num(merge.row_end)?,
                cast_col_num(merge.col_end)?,
                c_text,
                &fmt_header,
            )?;
        }

        for (n_idx_row, row_values) in grid.body_grid.iter().enumerate() {
            let row_idx = N_HEIGHT_HEADER + n_idx_row;
            for (col_idx, value) in row_values.iter().enumerate() {
                if !range.contains(row_idx, col_idx) {
                    if !value.is_blank() {
                        n_cells_clipped += 1;
                    }
                    continue;
                }
                write_cell_with_format(worksheet, row_idx, col_idx, value, &fmt_text)?;
                l_width_by_col_body[col_idx] = usize::max(
                    l_width_by_col_body[col_idx],
                    estimate_width_len(value),
                );
            }
        }

        worksheet.set_freeze_panes(
            cast_row_num(self.options.row_freeze.unwrap_or(N_HEIGHT_HEADER))?,
            cast_col_num(self.options.col_freeze)?,
        )?;

        if !matches!(policy_autofit.rule_columns, EnumAutofitColumnsRule::None) {
            let n_min = usize::max(1, policy_autofit.width_cell_min);
            let n_max = usize::min(255, usize::max(n_min, policy_autofit.width_cell_max));
            let n_pad = policy_autofit.width_cell_padding;

            for n_idx_col in 0..n_width_sheet {
                let n_width_recorded = match policy_autofit.rule_columns {
                    EnumAutofitColumnsRule::Body => l_width_by_col_body[n_idx_col],
                    EnumAutofitColumnsRule::All => usize::max(
                        l_width_by_col_header[n_idx_col],
                        l_width_by_col_body[n_idx_col],
                    ),
                    EnumAutofitColumnsRule::Header | EnumAutofitColumnsRule::None => {
                        l_width_by_col_header[n_idx_col]
                    }
                };
                let n_width_final =
                    usize::min(n_max, usize::max(n_min, n_width_recorded + n_pad));
                worksheet.set_column_width(cast_col_num(n_idx_col)?, n_width_final as f64)?;
            }
        }

        if n_cells_clipped > 0 {
            warn!(
                sheet = %sheet_name_unique,
                range_ref = %grid.range_ref,
                cells = n_cells_clipped,
                "dropped cells outside declared range"
            );
            report.warn(format!(
                "{n_cells_clipped} cell(s) outside range {} were not written.",
                grid.range_ref
            ));
        }

        info!(
            sheet = %sheet_name_unique,
            rows_body = grid.body_grid.len(),
            cols_total = grid.width_total(),
            "wrote export sheet"
        );

        report.sheets.push(SpecSheetWrite {
            sheet_name: sheet_name_unique,
            range_ref: grid.range_ref.clone(),
            height_body: grid.body_grid.len(),
            width_total: grid.width_total(),
            cnt_cells_clipped: n_cells_clipped,
        });
        self.l_reports.push(report);
        Ok(())
    }
}

/// Build the attendance sheet for the month of `reference_date` and save it.
///
/// One-shot counterpart of the table's export action: one workbook, one sheet
/// named `options.sheet_name`.
pub fn export_sheet(
    records: &[SpecRecord],
    column_defs: &[SpecColumnDefinition],
    reference_date: NaiveDate,
    path_file_out: PathBuf,
    options: &SpecExportOptions,
) -> Result<SpecXlsxReport, XlsxExportError> {
    let calendar = generate_calendar(reference_date);
    let grid = build_export_grid(records, column_defs, &calendar, options)?;

    let mut writer = XlsxExportWriter::with_default_formats(path_file_out, options.clone());
    writer.write_grid(&grid, &options.sheet_name)?;
    writer.close()?;

    Ok(writer.l_reports.pop().unwrap_or_default())
}

/// Estimate displayed width units for one body cell value.
pub fn estimate_width_len(value: &EnumCellValue) -> usize {
    match value {
        EnumCellValue::None => 0,
        EnumCellValue::String(s) => estimate_unicode_string_width(s),
        EnumCellValue::Number(n) => n.to_string().len(),
    }
}

fn validate_grid_layout(grid: &SpecExportGrid) -> Result<(), XlsxExportError> {
    if grid.header_grid.len() != N_HEIGHT_HEADER {
        return Err(XlsxExportError::InvalidGridLayout(format!(
            "header must have {N_HEIGHT_HEADER} rows, got {}.",
            grid.header_grid.len()
        )));
    }
    let n_width_total = grid.width_total();
    if grid.header_grid.iter().any(|row| row.len() != n_width_total) {
        return Err(XlsxExportError::InvalidGridLayout(
            "header rows must have equal width.".to_string(),
        ));
    }
    if let Some((n_idx_row, row)) = grid
        .body_grid
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() > n_width_total)
    {
        return Err(XlsxExportError::InvalidGridLayout(format!(
            "body row {n_idx_row} has {} cells, header width is {n_width_total}.",
            row.len()
        )));
    }
    if let Some(merge) = grid.merges.iter().find(|merge| {
        merge.row_start > merge.row_end
            || merge.col_start > merge.col_end
            || merge.row_end >= N_HEIGHT_HEADER
            || merge.col_end >= n_width_total
    }) {
        return Err(XlsxExportError::InvalidGridLayout(format!(
            "merge region {merge:?} lies outside the header."
        )));
    }
    Ok(())
}

fn validate_policy_autofit(
    policy_autofit: &SpecAutofitCellsPolicy,
) -> Result<(), XlsxExportError> {
    if policy_autofit.width_cell_min == 0 {
        return Err(XlsxExportError::InvalidAutofitPolicy(
            "width_cell_min must be >= 1".to_string(),
        ));
    }
    if policy_autofit.width_cell_max < policy_autofit.width_cell_min {
        return Err(XlsxExportError::InvalidAutofitPolicy(
            "width_cell_max must be >= width_cell_min".to_string(),
        ));
    }
    Ok(())
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<(), XlsxExportError> {
    let n_row = cast_row_num(row_idx)?;
    let n_col = cast_col_num(col_idx)?;
    match value {
        EnumCellValue::None => {
            worksheet.write_blank(n_row, n_col, format)?;
        }
        EnumCellValue::String(val) => {
            worksheet.write_string_with_format(n_row, n_col, val, format)?;
        }
        EnumCellValue::Number(val) if val.is_finite() => {
            worksheet.write_number_with_format(n_row, n_col, *val, format)?;
        }
        EnumCellValue::Number(val) => {
            let c_text = if val.is_nan() {
                "NaN"
            } else if val.is_sign_positive() {
                "Inf"
            } else {
                "-Inf"
            };
            worksheet.write_string_with_format(n_row, n_col, c_text, format)?;
        }
    }
    Ok(())
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if spec.italic.unwrap_or(false) {
        format = format.set_italic();
    }

    if let Some(val) = &spec.align
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }
    if let Some(val) = &spec.valign
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }

    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = &spec.font_color {
        format = format.set_font_color(val.as_str());
    }
    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }
    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    let value = align.trim().to_ascii_lowercase();
    match value.as_str() {
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "vcenter" => Some(FormatAlign::VerticalCenter),
        _ => None,
    }
}

fn cast_row_num(value: usize) -> Result<u32, XlsxExportError> {
    u32::try_from(value).map_err(|_| XlsxExportError::IndexOverflow { axis: "row", value })
}

fn cast_col_num(value: usize) -> Result<u16, XlsxExportError> {
    u16::try_from(value).map_err(|_| XlsxExportError::IndexOverflow {
        axis: "column",
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_width_len() {
        assert_eq!(estimate_width_len(&EnumCellValue::None), 0);
        assert_eq!(estimate_width_len(&"张三".into()), 3);
        assert_eq!(estimate_width_len(&EnumCellValue::Number(30.0)), 2);
    }

    #[test]
    fn test_validate_policy_autofit() {
        assert!(validate_policy_autofit(&SpecAutofitCellsPolicy::default()).is_ok());

        let policy_bad = SpecAutofitCellsPolicy {
            width_cell_min: 10,
            width_cell_max: 5,
            ..SpecAutofitCellsPolicy::default()
        };
        assert!(matches!(
            validate_policy_autofit(&policy_bad),
            Err(XlsxExportError::InvalidAutofitPolicy(_))
        ));
    }

    #[test]
    fn test_cast_overflow_is_reported() {
        assert!(cast_col_num(20_000).is_ok());
        assert!(matches!(
            cast_col_num(70_000),
            Err(XlsxExportError::IndexOverflow { axis: "column", .. })
        ));
    }

    #[test]
    fn test_format_align_and_border_mapping() {
        assert_eq!(derive_format_align(" Left "), Some(FormatAlign::Left));
        assert_eq!(derive_format_align("center"), Some(FormatAlign::Center));
        assert_eq!(derive_format_align("right"), Some(FormatAlign::Right));
        assert_eq!(derive_format_align("vcenter"), Some(FormatAlign::VerticalCenter));
        assert_eq!(derive_format_align("diagonal"), None);

        assert_eq!(derive_format_border(1), FormatBorder::Thin);
        assert_eq!(derive_format_border(6), FormatBorder::Double);
        assert_eq!(derive_format_border(0), FormatBorder::None);
        assert_eq!(derive_format_border(42), FormatBorder::None);
    }

    fn derive_grid(
        header_grid: Vec<Vec<&str>>,
        body_grid: Vec<Vec<EnumCellValue>>,
        merges: Vec<SpecMergeRegion>,
    ) -> SpecExportGrid {
        SpecExportGrid {
            header_grid: header_grid
                .into_iter()
                .map(|row| row.into_iter().map(str::to_string).collect())
                .collect(),
            body_grid,
            merges,
            range_ref: "A1:AI3".to_string(),
            width_entity: 1,
        }
    }

    fn assert_grid_rejected(grid: &SpecExportGrid) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut writer = XlsxExportWriter::with_default_formats(
            tmp.path().join("bad.xlsx"),
            SpecExportOptions::default(),
        );
        assert!(matches!(
            writer.write_grid(grid, "sheet0"),
            Err(XlsxExportError::InvalidGridLayout(_))
        ));
        assert!(writer.report().is_empty());
    }

    #[test]
    fn test_write_grid_rejects_body_wider_than_header() {
        let grid = derive_grid(
            vec![vec!["t"], vec!["l"]],
            vec![vec!["a".into(), "b".into()]],
            vec![],
        );
        assert_grid_rejected(&grid);
    }

    #[test]
    fn test_write_grid_rejects_uneven_header_rows() {
        let grid = derive_grid(vec![vec!["t"], vec!["l", "m"]], vec![], vec![]);
        assert_grid_rejected(&grid);

        let grid = derive_grid(vec![vec!["t"]], vec![], vec![]);
        assert_grid_rejected(&grid);

        let grid = derive_grid(vec![], vec![], vec![]);
        assert_grid_rejected(&grid);
    }

    #[test]
    fn test_write_grid_rejects_merge_outside_header() {
        let grid = derive_grid(
            vec![vec!["t", ""], vec!["l", "m"]],
            vec![],
            vec![SpecMergeRegion::horizontal(0, 1, 3)],
        );
        assert_grid_rejected(&grid);

        let grid = derive_grid(
            vec![vec!["t", ""], vec!["l", "m"]],
            vec![],
            vec![SpecMergeRegion::horizontal(2, 0, 1)],
        );
        assert_grid_rejected(&grid);
    }

    #[test]
    fn test_write_grid_accepts_narrow_body_rows() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut writer = XlsxExportWriter::with_default_formats(
            tmp.path().join("ok.xlsx"),
            SpecExportOptions::default(),
        );
        let grid = derive_grid(
            vec![vec!["t", ""], vec!["l", "m"]],
            vec![vec!["a".into()]],
            vec![SpecMergeRegion::horizontal(0, 0, 1)],
        );
        writer.write_grid(&grid, "sheet0").expect("write grid");
        writer.close().expect("close");
        assert_eq!(writer.report()[0].sheets[0].height_body, 1);
    }

    #[test]
    fn test_write_after_close_fails() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut writer = XlsxExportWriter::with_default_formats(
            tmp.path().join("closed.xlsx"),
            SpecExportOptions::default(),
        );
        writer.close().expect("close");
        writer.close().expect("close twice");

        let grid = SpecExportGrid {
            header_grid: vec![vec!["t".to_string()], vec!["l".to_string()]],
            body_grid: vec![],
            merges: vec![],
            range_ref: "A1:AI2".to_string(),
            width_entity: 1,
        };
        assert!(matches!(
            writer.write_grid(&grid, "sheet0"),
            Err(XlsxExportError::WriterClosed)
        ));
    }
}
