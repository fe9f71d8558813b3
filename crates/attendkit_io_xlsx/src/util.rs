//! Stateless helper utilities used by the grid assembler and writer.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
};
use crate::spec::{SpecCellRange, SpecColumnDefinition, SpecMergeRegion, XlsxExportError};

static RE_CELL_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]+)([1-9][0-9]*):([A-Z]+)([1-9][0-9]*)$").expect("valid range regex")
});

////////////////////////////////////////////////////////////////////////////////
// #region ColumnSelection

/// Keep exportable column definitions in their original order.
pub fn select_exportable_columns(
    column_defs: &[SpecColumnDefinition],
) -> Vec<&SpecColumnDefinition> {
    column_defs
        .iter()
        .filter(|col_def| col_def.is_exportable())
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellReferences

/// Convert column letters (`A`, `Z`, `AA`, `AI`) to a 0-based index.
pub fn convert_col_ref_to_index(col_ref: &str) -> Result<usize, XlsxExportError> {
    if col_ref.is_empty() || !col_ref.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(XlsxExportError::InvalidColumnRef(col_ref.to_string()));
    }

    let mut n_idx = 0usize;
    for b in col_ref.bytes() {
        n_idx = n_idx
            .checked_mul(26)
            .and_then(|val| val.checked_add(usize::from(b - b'A') + 1))
            .ok_or_else(|| XlsxExportError::InvalidColumnRef(col_ref.to_string()))?;
    }

    let n_idx = n_idx - 1;
    if n_idx >= N_NCOLS_EXCEL_MAX {
        return Err(XlsxExportError::InvalidColumnRef(col_ref.to_string()));
    }
    Ok(n_idx)
}

/// Convert a 0-based column index to column letters.
pub fn convert_index_to_col_ref(col_idx: usize) -> String {
    let mut l_chars = Vec::new();
    let mut n_rest = col_idx + 1;
    while n_rest > 0 {
        let n_rem = (n_rest - 1) % 26;
        l_chars.push(char::from(b'A' + n_rem as u8));
        n_rest = (n_rest - 1) / 26;
    }
    l_chars.iter().rev().collect()
}

/// Render `range` in A1 notation.
pub fn format_cell_range(range: &SpecCellRange) -> String {
    format!(
        "{}{}:{}{}",
        convert_index_to_col_ref(range.col_first),
        range.row_first + 1,
        convert_index_to_col_ref(range.col_last),
        range.row_last + 1
    )
}

/// Parse an A1-notation range such as `A1:AI3`.
pub fn parse_cell_range(range_ref: &str) -> Result<SpecCellRange, XlsxExportError> {
    let Some(caps) = RE_CELL_RANGE.captures(range_ref.trim()) else {
        return Err(XlsxExportError::InvalidRangeRef(range_ref.to_string()));
    };

    let derive_row = |txt: &str| -> Result<usize, XlsxExportError> {
        let n_row = txt
            .parse::<usize>()
            .map_err(|_| XlsxExportError::InvalidRangeRef(range_ref.to_string()))?;
        if n_row > N_NROWS_EXCEL_MAX {
            return Err(XlsxExportError::InvalidRangeRef(range_ref.to_string()));
        }
        Ok(n_row - 1)
    };

    let range = SpecCellRange {
        row_first: derive_row(&caps[2])?,
        col_first: convert_col_ref_to_index(&caps[1])?,
        row_last: derive_row(&caps[4])?,
        col_last: convert_col_ref_to_index(&caps[3])?,
    };

    if range.row_first > range.row_last || range.col_first > range.col_last {
        return Err(XlsxExportError::InvalidRangeRef(range_ref.to_string()));
    }
    Ok(range)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

/// Return `name`, or `name__N` when it is already taken; registers the result.
pub fn derive_unique_sheet_name(name: &str, names_existing: &mut BTreeSet<String>) -> String {
    if names_existing.insert(name.to_string()) {
        return name.to_string();
    }

    let base_name: String = name
        .chars()
        .take(usize::max(1, N_LEN_EXCEL_SHEET_NAME_MAX - 3))
        .collect();

    let mut n_idx = 2usize;
    loop {
        let candidate: String = format!("{base_name}__{n_idx}")
            .chars()
            .take(N_LEN_EXCEL_SHEET_NAME_MAX)
            .collect();
        if names_existing.insert(candidate.clone()) {
            return candidate;
        }
        n_idx += 1;
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region HeaderMergeUtils

/// Clip `region` to `range`; `None` when nothing of it remains.
pub fn clip_merge_region(
    region: &SpecMergeRegion,
    range: &SpecCellRange,
) -> Option<SpecMergeRegion> {
    let clipped = SpecMergeRegion {
        row_start: usize::max(region.row_start, range.row_first),
        col_start: usize::max(region.col_start, range.col_first),
        row_end: usize::min(region.row_end, range.row_last),
        col_end: usize::min(region.col_end, range.col_last),
    };
    if clipped.row_start > clipped.row_end || clipped.col_start > clipped.col_end {
        return None;
    }
    Some(clipped)
}

/// Build lookup set for cells covered by a multi-cell merge (excluding anchor).
pub fn derive_merge_covered_cells(merges: &[SpecMergeRegion]) -> BTreeSet<(usize, usize)> {
    let mut set_covered = BTreeSet::new();
    for merge in merges.iter().filter(|merge| !merge.is_single_cell()) {
        for row_idx in merge.row_start..=merge.row_end {
            for col_idx in merge.col_start..=merge.col_end {
                if (row_idx, col_idx) != (merge.row_start, merge.col_start) {
                    set_covered.insert((row_idx, col_idx));
                }
            }
        }
    }
    set_covered
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Autofit

/// Estimate displayed width units; non-ASCII (CJK) characters count 1.6 units.
pub fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
