//! Worksheet grid assembly: two-row merged header plus entity data body.

use std::io::Cursor;

use polars::prelude::{AnyValue, DataFrame, IpcReader, SerReader};
use tracing::debug;

use crate::conf::N_HEIGHT_HEADER;
use crate::spec::{
    EnumCellValue, SpecCalendar, SpecCellRange, SpecColumnDefinition, SpecExportGrid,
    SpecExportOptions, SpecMergeRegion, SpecRecord, XlsxExportError,
};
use crate::util::{convert_col_ref_to_index, format_cell_range, select_exportable_columns};

/// Assemble the export grid for `records` under the exportable `column_defs`.
///
/// Row 0 carries the entity-info title at column 0 and the calendar title at
/// the first day column; row 1 carries entity labels followed by day labels.
/// Data rows only fill entity columns, day cells stay unset. A record without
/// a value for some `prop` yields a blank cell.
pub fn build_export_grid(
    records: &[SpecRecord],
    column_defs: &[SpecColumnDefinition],
    calendar: &SpecCalendar,
    options: &SpecExportOptions,
) -> Result<SpecExportGrid, XlsxExportError> {
    let l_cols_export = select_exportable_columns(column_defs);
    let n_width_entity = l_cols_export.len();

    let mut l_row_labels: Vec<String> = l_cols_export
        .iter()
        .map(|col_def| col_def.label.clone())
        .collect();
    l_row_labels.extend(calendar.day_labels.iter().cloned());
    let n_width_total = l_row_labels.len();

    let mut l_row_titles = vec![String::new(); n_width_total];
    if let Some(cell) = l_row_titles.first_mut() {
        *cell = options.title_entity_info.clone();
    }
    // Shares column 0 with the entity title when nothing is exportable.
    if let Some(cell) = l_row_titles.get_mut(n_width_entity) {
        *cell = format!("{}{}", calendar.header_label, options.suffix_calendar_title);
    }

    let body_grid: Vec<Vec<EnumCellValue>> = records
        .iter()
        .map(|record| {
            l_cols_export
                .iter()
                .map(|col_def| {
                    col_def
                        .prop
                        .as_ref()
                        .and_then(|prop| record.get(prop))
                        .cloned()
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();

    let merges = plan_header_merges(n_width_entity, n_width_total);
    let range_ref =
        derive_range_ref(N_HEIGHT_HEADER + body_grid.len(), &options.col_ref_bound)?;

    debug!(
        cols_entity = n_width_entity,
        cols_total = n_width_total,
        rows_body = body_grid.len(),
        range_ref = %range_ref,
        "assembled export grid"
    );

    Ok(SpecExportGrid {
        header_grid: vec![l_row_titles, l_row_labels],
        body_grid,
        merges,
        range_ref,
        width_entity: n_width_entity,
    })
}

/// Plan the two title-row merges: entity block, then calendar block.
///
/// With no entity columns the first region degenerates to the single cell
/// `[0, 0]`.
pub fn plan_header_merges(width_entity: usize, width_total: usize) -> Vec<SpecMergeRegion> {
    vec![
        SpecMergeRegion::horizontal(0, 0, width_entity.saturating_sub(1)),
        SpecMergeRegion::horizontal(
            0,
            width_entity,
            usize::max(width_entity, width_total.saturating_sub(1)),
        ),
    ]
}

/// Declared range from `A1` to the configured column bound on the last row.
pub fn derive_range_ref(
    height_total: usize,
    col_ref_bound: &str,
) -> Result<String, XlsxExportError> {
    let range = SpecCellRange {
        row_first: 0,
        col_first: 0,
        row_last: height_total.saturating_sub(1),
        col_last: convert_col_ref_to_index(col_ref_bound)?,
    };
    Ok(format_cell_range(&range))
}

/// Assemble from a DataFrame whose column names match the column `prop`s.
pub fn build_export_grid_from_dataframe(
    df: &DataFrame,
    column_defs: &[SpecColumnDefinition],
    calendar: &SpecCalendar,
    options: &SpecExportOptions,
) -> Result<SpecExportGrid, XlsxExportError> {
    let records = derive_records_from_dataframe(df, column_defs)?;
    build_export_grid(&records, column_defs, calendar, options)
}

/// Assemble from IPC-serialized DataFrame bytes.
pub fn build_export_grid_from_ipc_bytes(
    v_ipc_df: &[u8],
    column_defs: &[SpecColumnDefinition],
    calendar: &SpecCalendar,
    options: &SpecExportOptions,
) -> Result<SpecExportGrid, XlsxExportError> {
    let df = derive_dataframe_from_ipc_bytes(v_ipc_df)?;
    build_export_grid_from_dataframe(&df, column_defs, calendar, options)
}

/// Read only the exportable `prop` columns of `df` into records.
pub fn derive_records_from_dataframe(
    df: &DataFrame,
    column_defs: &[SpecColumnDefinition],
) -> Result<Vec<SpecRecord>, XlsxExportError> {
    let mut l_records = vec![SpecRecord::new(); df.height()];

    for prop in select_exportable_columns(column_defs)
        .into_iter()
        .filter_map(|col_def| col_def.prop.as_deref())
    {
        let Ok(col) = df.column(prop) else {
            continue;
        };
        for (n_idx_row, record) in l_records.iter_mut().enumerate() {
            let value = col
                .get(n_idx_row)
                .map_err(|err| XlsxExportError::DataFrame(format!("{prop:?}: {err}")))?;
            record.insert(prop.to_string(), derive_cell_value_from_any_value(value));
        }
    }

    Ok(l_records)
}

/// Decode a Polars IPC payload.
pub fn derive_dataframe_from_ipc_bytes(v_ipc_df: &[u8]) -> Result<DataFrame, XlsxExportError> {
    IpcReader::new(Cursor::new(v_ipc_df))
        .finish()
        .map_err(|err| XlsxExportError::DataFrame(format!("invalid IPC bytes: {err}")))
}

fn derive_cell_value_from_any_value(value: AnyValue<'_>) -> EnumCellValue {
    match value {
        AnyValue::Null => EnumCellValue::None,
        AnyValue::String(val) => EnumCellValue::String(val.to_string()),
        AnyValue::StringOwned(val) => EnumCellValue::String(val.to_string()),
        AnyValue::Boolean(val) => {
            EnumCellValue::String(if val { "True" } else { "False" }.to_string())
        }
        AnyValue::UInt8(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt16(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt32(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt64(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int8(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int16(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int32(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int64(val) => EnumCellValue::Number(val as f64),
        AnyValue::Float32(val) => EnumCellValue::Number(val as f64),
        AnyValue::Float64(val) => EnumCellValue::Number(val),
        _ => EnumCellValue::String(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use polars::prelude::{IntoColumn, NamedFrom, Series};

    use super::*;
    use crate::calendar::generate_calendar;

    fn derive_calendar(year: i32, month: u32) -> SpecCalendar {
        generate_calendar(NaiveDate::from_ymd_opt(year, month, 1).expect("valid date"))
    }

    fn derive_columns() -> Vec<SpecColumnDefinition> {
        vec![
            SpecColumnDefinition::new("name", "Name"),
            SpecColumnDefinition::new("age", "Age").with_export(false),
            SpecColumnDefinition {
                prop: None,
                label: "Actions".to_string(),
                is_export: true,
            },
            SpecColumnDefinition::new("dept", "Dept"),
        ]
    }

    fn derive_record(pairs: &[(&str, EnumCellValue)]) -> SpecRecord {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_build_export_grid_april_example() {
        let l_cols = vec![
            SpecColumnDefinition::new("name", "Name"),
            SpecColumnDefinition::new("age", "Age").with_export(false),
        ];
        let l_records = vec![derive_record(&[
            ("name", "Li".into()),
            ("age", EnumCellValue::Number(30.0)),
        ])];
        let calendar = derive_calendar(2024, 4);

        let grid =
            build_export_grid(&l_records, &l_cols, &calendar, &SpecExportOptions::default())
                .unwrap();

        assert_eq!(grid.width_entity, 1);
        assert_eq!(grid.width_total(), 31);
        assert_eq!(grid.row_labels()[0], "Name");
        assert_eq!(grid.row_labels()[1], "4月1日");
        assert_eq!(grid.row_labels()[30], "4月30日");
        assert!(!grid.row_labels().iter().any(|label| label == "Age"));

        assert_eq!(grid.row_titles()[0], "人员信息");
        assert_eq!(grid.row_titles()[1], "2024年4月份考勤日历");
        assert!(grid.row_titles()[2..].iter().all(String::is_empty));

        assert_eq!(grid.body_grid, vec![vec![EnumCellValue::String("Li".to_string())]]);
        assert_eq!(
            grid.merges,
            vec![
                SpecMergeRegion::horizontal(0, 0, 0),
                SpecMergeRegion::horizontal(0, 1, 30),
            ]
        );
        assert_eq!(grid.range_ref, "A1:AI3");
    }

    #[test]
    fn test_build_export_grid_filters_columns_and_keeps_order() {
        let l_records = vec![
            derive_record(&[("name", "Li".into()), ("dept", "R&D".into())]),
            derive_record(&[("dept", "Ops".into()), ("name", "Wang".into())]),
        ];
        let calendar = derive_calendar(2023, 2);

        let grid = build_export_grid(
            &l_records,
            &derive_columns(),
            &calendar,
            &SpecExportOptions::default(),
        )
        .unwrap();

        assert_eq!(grid.width_entity, 2);
        assert_eq!(grid.row_labels().len(), 2 + 28);
        assert_eq!(&grid.row_labels()[..2], &["Name".to_string(), "Dept".to_string()]);
        assert_eq!(
            grid.body_grid[1],
            vec![
                EnumCellValue::String("Wang".to_string()),
                EnumCellValue::String("Ops".to_string()),
            ]
        );

        let l_idx_non_empty: Vec<usize> = grid
            .row_titles()
            .iter()
            .enumerate()
            .filter(|(_, cell)| !cell.is_empty())
            .map(|(idx, _)| idx)
            .collect();
        assert_eq!(l_idx_non_empty, vec![0, 2]);

        assert_eq!(
            grid.merges,
            vec![
                SpecMergeRegion::horizontal(0, 0, 1),
                SpecMergeRegion::horizontal(0, 2, 29),
            ]
        );
        assert_eq!(grid.range_ref, "A1:AI4");
    }

    #[test]
    fn test_build_export_grid_missing_value_is_blank() {
        let l_records = vec![derive_record(&[("name", "Li".into())])];
        let grid = build_export_grid(
            &l_records,
            &derive_columns(),
            &derive_calendar(2024, 1),
            &SpecExportOptions::default(),
        )
        .unwrap();

        assert_eq!(
            grid.body_grid[0],
            vec![EnumCellValue::String("Li".to_string()), EnumCellValue::None]
        );
    }

    #[test]
    fn test_build_export_grid_without_records_is_headers_only() {
        let grid = build_export_grid(
            &[],
            &derive_columns(),
            &derive_calendar(2024, 1),
            &SpecExportOptions::default(),
        )
        .unwrap();

        assert!(grid.body_grid.is_empty());
        assert_eq!(grid.height_total(), 2);
        assert_eq!(grid.row_labels().len(), 2 + 31);
        assert_eq!(grid.range_ref, "A1:AI2");
    }

    #[test]
    fn test_build_export_grid_without_exportable_columns_degenerates() {
        let l_cols = vec![SpecColumnDefinition::new("age", "Age").with_export(false)];
        let grid = build_export_grid(
            &[SpecRecord::new()],
            &l_cols,
            &derive_calendar(2024, 4),
            &SpecExportOptions::default(),
        )
        .unwrap();

        assert_eq!(grid.width_entity, 0);
        assert_eq!(grid.width_total(), 30);
        assert_eq!(grid.row_titles()[0], "2024年4月份考勤日历");
        assert_eq!(
            grid.merges,
            vec![
                SpecMergeRegion::horizontal(0, 0, 0),
                SpecMergeRegion::horizontal(0, 0, 29),
            ]
        );
        assert!(grid.merges[0].is_single_cell());
        assert_eq!(grid.body_grid, vec![Vec::<EnumCellValue>::new()]);
    }

    #[test]
    fn test_build_export_grid_uses_configured_titles_and_bound() {
        let options = SpecExportOptions {
            col_ref_bound: "BZ".to_string(),
            title_entity_info: "Staff".to_string(),
            suffix_calendar_title: " attendance".to_string(),
            ..SpecExportOptions::default()
        };
        let grid = build_export_grid(
            &[],
            &derive_columns(),
            &derive_calendar(2024, 4),
            &options,
        )
        .unwrap();

        assert_eq!(grid.row_titles()[0], "Staff");
        assert_eq!(grid.row_titles()[2], "2024年4月份 attendance");
        assert_eq!(grid.range_ref, "A1:BZ2");

        let options_bad = SpecExportOptions {
            col_ref_bound: "a1".to_string(),
            ..SpecExportOptions::default()
        };
        assert!(matches!(
            build_export_grid(&[], &derive_columns(), &derive_calendar(2024, 4), &options_bad),
            Err(XlsxExportError::InvalidColumnRef(_))
        ));
    }

    #[test]
    fn test_build_export_grid_from_dataframe_reads_prop_columns() {
        let df = DataFrame::new(vec![
            Series::new("name".into(), &["Li", "Wang"]).into_column(),
            Series::new("age".into(), &[30i64, 41]).into_column(),
        ])
        .unwrap();
        let grid = build_export_grid_from_dataframe(
            &df,
            &derive_columns(),
            &derive_calendar(2024, 4),
            &SpecExportOptions::default(),
        )
        .unwrap();

        assert_eq!(
            grid.body_grid,
            vec![
                vec![EnumCellValue::String("Li".to_string()), EnumCellValue::None],
                vec![EnumCellValue::String("Wang".to_string()), EnumCellValue::None],
            ]
        );
    }
}
