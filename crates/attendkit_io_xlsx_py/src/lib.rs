use std::path::PathBuf;

use attendkit_io_xlsx::conf::{C_FILE_NAME_DEFAULT, C_SHEET_NAME_DEFAULT};
use attendkit_io_xlsx::grid::{build_export_grid, build_export_grid_from_ipc_bytes};
use attendkit_io_xlsx::spec::{
    EnumCellValue, SpecCalendar, SpecColumnDefinition, SpecExportGrid, SpecExportOptions,
    SpecRecord, SpecXlsxReport, XlsxExportError,
};
use attendkit_io_xlsx::{XlsxExportWriter as RsXlsxExportWriter, generate_calendar};
use chrono::{Datelike, Local, NaiveDate};
use pyo3::IntoPyObject;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyAny, PyBool, PyDict, PyFloat, PyInt, PyList, PyString, PyTuple};

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "attendkit.xlsx.export.v1";

#[pyclass(name = "XlsxExportWriter")]
struct PyXlsxExportWriter {
    #[pyo3(get)]
    file_out: String,
    inner: RsXlsxExportWriter,
}

#[pymethods]
impl PyXlsxExportWriter {
    #[new]
    #[pyo3(signature = (file_out, col_ref_bound = None))]
    fn new(file_out: String, col_ref_bound: Option<String>) -> Self {
        let path_file_out = PathBuf::from(&file_out);
        let inner =
            RsXlsxExportWriter::with_default_formats(path_file_out, derive_options(col_ref_bound));
        Self { file_out, inner }
    }

    fn __enter__(slf: PyRefMut<'_, Self>) -> PyRefMut<'_, Self> {
        slf
    }

    #[pyo3(signature = (_exc_type=None, _exc=None, _tb=None))]
    fn __exit__(
        &mut self,
        _exc_type: Option<&Bound<'_, PyAny>>,
        _exc: Option<&Bound<'_, PyAny>>,
        _tb: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<()> {
        self.close()
    }

    fn close(&mut self) -> PyResult<()> {
        self.inner.close().map_err(derive_runtime_error)
    }

    fn report(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        let l_report_obj = self
            .inner
            .report()
            .iter()
            .map(|report| create_report_object(py, report))
            .collect::<PyResult<Vec<_>>>()?;
        Ok(PyTuple::new(py, l_report_obj)?.into_any().unbind())
    }

    /// Write one attendance sheet from row mappings or Polars IPC bytes.
    #[pyo3(signature = (
        columns,
        records = None,
        ipc_records = None,
        year = None,
        month = None,
        sheet_name = C_SHEET_NAME_DEFAULT.to_string(),
        col_ref_bound = None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn write_sheet<'py>(
        mut slf: PyRefMut<'py, Self>,
        columns: &Bound<'py, PyAny>,
        records: Option<&Bound<'py, PyAny>>,
        ipc_records: Option<Vec<u8>>,
        year: Option<i32>,
        month: Option<u32>,
        sheet_name: String,
        col_ref_bound: Option<String>,
    ) -> PyResult<PyRefMut<'py, Self>> {
        let l_cols = parse_column_definitions(columns)?;
        let calendar = generate_calendar(derive_reference_date(year, month)?);
        let options = derive_options(col_ref_bound);

        let grid = match (records, ipc_records) {
            (Some(_), Some(_)) => {
                return Err(PyValueError::new_err(
                    "Pass either `records` or `ipc_records`, not both.",
                ));
            }
            (_, Some(v_ipc)) => {
                build_export_grid_from_ipc_bytes(&v_ipc, &l_cols, &calendar, &options)
                    .map_err(derive_value_error)?
            }
            (records, None) => {
                let l_records = match records {
                    Some(obj) if !obj.is_none() => parse_records(obj)?,
                    _ => vec![],
                };
                build_export_grid(&l_records, &l_cols, &calendar, &options)
                    .map_err(derive_value_error)?
            }
        };

        slf.inner
            .write_grid(&grid, &sheet_name)
            .map_err(derive_value_error)?;
        Ok(slf)
    }
}

/// Return `(header_label, day_labels)` for one month.
#[pyfunction]
#[pyo3(name = "generate_calendar", signature = (year = None, month = None))]
fn py_generate_calendar(
    year: Option<i32>,
    month: Option<u32>,
) -> PyResult<(String, Vec<String>)> {
    let calendar = generate_calendar(derive_reference_date(year, month)?);
    Ok((calendar.header_label, calendar.day_labels))
}

/// Assemble the export grid and return it as a plain dict.
#[pyfunction]
#[pyo3(
    name = "build_export_grid",
    signature = (columns, records, year = None, month = None, col_ref_bound = None)
)]
fn py_build_export_grid(
    py: Python<'_>,
    columns: &Bound<'_, PyAny>,
    records: &Bound<'_, PyAny>,
    year: Option<i32>,
    month: Option<u32>,
    col_ref_bound: Option<String>,
) -> PyResult<Py<PyAny>> {
    let l_cols = parse_column_definitions(columns)?;
    let l_records = parse_records(records)?;
    let calendar = generate_calendar(derive_reference_date(year, month)?);
    let grid = build_export_grid(&l_records, &l_cols, &calendar, &derive_options(col_ref_bound))
        .map_err(derive_value_error)?;
    create_grid_object(py, &grid, &calendar)
}

/// One-shot export: build the month sheet and save the workbook.
#[pyfunction]
#[pyo3(signature = (
    columns,
    records,
    file_out = C_FILE_NAME_DEFAULT.to_string(),
    year = None,
    month = None,
    sheet_name = C_SHEET_NAME_DEFAULT.to_string(),
    col_ref_bound = None
))]
#[allow(clippy::too_many_arguments)]
fn export_sheet(
    py: Python<'_>,
    columns: &Bound<'_, PyAny>,
    records: &Bound<'_, PyAny>,
    file_out: String,
    year: Option<i32>,
    month: Option<u32>,
    sheet_name: String,
    col_ref_bound: Option<String>,
) -> PyResult<Py<PyAny>> {
    let l_cols = parse_column_definitions(columns)?;
    let l_records = parse_records(records)?;
    let options = SpecExportOptions {
        sheet_name,
        ..derive_options(col_ref_bound)
    };

    let report = attendkit_io_xlsx::export_sheet(
        &l_records,
        &l_cols,
        derive_reference_date(year, month)?,
        PathBuf::from(file_out),
        &options,
    )
    .map_err(derive_runtime_error)?;
    create_report_object(py, &report)
}

fn derive_options(col_ref_bound: Option<String>) -> SpecExportOptions {
    let mut options = SpecExportOptions::default();
    if let Some(c_bound) = col_ref_bound {
        options.col_ref_bound = c_bound;
    }
    options
}

fn derive_reference_date(year: Option<i32>, month: Option<u32>) -> PyResult<NaiveDate> {
    let date_today = Local::now().date_naive();
    let n_year = year.unwrap_or(date_today.year());
    let n_month = month.unwrap_or(date_today.month());
    NaiveDate::from_ymd_opt(n_year, n_month, 1)
        .ok_or_else(|| PyValueError::new_err(format!("Invalid year/month: {n_year}/{n_month}")))
}

fn parse_column_definitions(obj: &Bound<'_, PyAny>) -> PyResult<Vec<SpecColumnDefinition>> {
    let mut l_cols = Vec::new();
    for item in obj.try_iter()? {
        let item = item?;
        let dict_col = item
            .downcast::<PyDict>()
            .map_err(|_| PyValueError::new_err("Each column definition must be a mapping."))?;

        let prop = match dict_col.get_item("prop")? {
            Some(val) if !val.is_none() => Some(val.str()?.to_string()),
            _ => None,
        };
        let label = match dict_col.get_item("label")? {
            Some(val) if !val.is_none() => val.str()?.to_string(),
            _ => String::new(),
        };
        let is_export = match dict_col.get_item("isExport")? {
            Some(val) if !val.is_none() => val.is_truthy()?,
            _ => true,
        };

        l_cols.push(SpecColumnDefinition {
            prop,
            label,
            is_export,
        });
    }
    Ok(l_cols)
}

fn parse_records(obj: &Bound<'_, PyAny>) -> PyResult<Vec<SpecRecord>> {
    let mut l_records = Vec::new();
    for item in obj.try_iter()? {
        let item = item?;
        let dict_record = item
            .downcast::<PyDict>()
            .map_err(|_| PyValueError::new_err("Each record must be a mapping."))?;

        let mut record = SpecRecord::new();
        for (key, value) in dict_record.iter() {
            record.insert(key.str()?.to_string(), parse_cell_value(&value)?);
        }
        l_records.push(record);
    }
    Ok(l_records)
}

fn parse_cell_value(obj: &Bound<'_, PyAny>) -> PyResult<EnumCellValue> {
    if obj.is_none() {
        return Ok(EnumCellValue::None);
    }
    if obj.is_instance_of::<PyBool>() {
        let if_value = obj.extract::<bool>()?;
        return Ok(EnumCellValue::String(
            if if_value { "True" } else { "False" }.to_string(),
        ));
    }
    if obj.is_instance_of::<PyInt>() || obj.is_instance_of::<PyFloat>() {
        return Ok(EnumCellValue::Number(obj.extract::<f64>()?));
    }
    if let Ok(val) = obj.downcast::<PyString>() {
        return Ok(EnumCellValue::String(val.to_str()?.to_string()));
    }
    Ok(EnumCellValue::String(obj.str()?.to_string()))
}

fn create_cell_object(py: Python<'_>, value: &EnumCellValue) -> PyResult<Py<PyAny>> {
    Ok(match value {
        EnumCellValue::None => py.None(),
        EnumCellValue::String(val) => val.as_str().into_pyobject(py)?.into_any().unbind(),
        EnumCellValue::Number(val) => (*val).into_pyobject(py)?.into_any().unbind(),
    })
}

fn create_grid_object(
    py: Python<'_>,
    grid: &SpecExportGrid,
    calendar: &SpecCalendar,
) -> PyResult<Py<PyAny>> {
    let dict_grid = PyDict::new(py);
    dict_grid.set_item("header_grid", grid.header_grid.clone())?;

    let mut l_rows_body = Vec::with_capacity(grid.body_grid.len());
    for row in &grid.body_grid {
        let l_cells = row
            .iter()
            .map(|value| create_cell_object(py, value))
            .collect::<PyResult<Vec<_>>>()?;
        l_rows_body.push(PyList::new(py, l_cells)?);
    }
    dict_grid.set_item("body_grid", PyList::new(py, l_rows_body)?)?;

    let l_merges: Vec<(usize, usize, usize, usize)> = grid
        .merges
        .iter()
        .map(|merge| (merge.row_start, merge.col_start, merge.row_end, merge.col_end))
        .collect();
    dict_grid.set_item("merges", l_merges)?;
    dict_grid.set_item("range_ref", grid.range_ref.clone())?;
    dict_grid.set_item("width_entity", grid.width_entity)?;
    dict_grid.set_item("header_label", calendar.header_label.clone())?;
    dict_grid.set_item("days_in_month", calendar.days_in_month)?;

    Ok(dict_grid.into_any().unbind())
}

fn create_report_object(py: Python<'_>, report: &SpecXlsxReport) -> PyResult<Py<PyAny>> {
    let mut l_sheet_obj = Vec::with_capacity(report.sheets.len());
    for sheet in &report.sheets {
        let dict_sheet = PyDict::new(py);
        dict_sheet.set_item("sheet_name", sheet.sheet_name.clone())?;
        dict_sheet.set_item("range_ref", sheet.range_ref.clone())?;
        dict_sheet.set_item("height_body", sheet.height_body)?;
        dict_sheet.set_item("width_total", sheet.width_total)?;
        dict_sheet.set_item("cnt_cells_clipped", sheet.cnt_cells_clipped)?;
        l_sheet_obj.push(dict_sheet);
    }

    let dict_report = PyDict::new(py);
    dict_report.set_item("sheets", PyList::new(py, l_sheet_obj)?)?;
    dict_report.set_item("warnings", report.warnings.clone())?;
    Ok(dict_report.into_any().unbind())
}

fn derive_value_error(err: XlsxExportError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn derive_runtime_error(err: XlsxExportError) -> PyErr {
    PyRuntimeError::new_err(err.to_string())
}

#[pymodule]
fn _attendkit_io_xlsx_rs(_py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PyXlsxExportWriter>()?;
    module.add_function(wrap_pyfunction!(py_generate_calendar, module)?)?;
    module.add_function(wrap_pyfunction!(py_build_export_grid, module)?)?;
    module.add_function(wrap_pyfunction!(export_sheet, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    Ok(())
}
