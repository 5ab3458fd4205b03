use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rust_xlsxwriter::{Table, Workbook, XlsxError};
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::flatten::WorkbookData;

/// Longest string Excel accepts in a single cell.
pub const MAX_CELL_CHARS: usize = 32_767;

/// Default export location: `<dir>/portfolio_export_<YYYYmmdd_HHMMSS>.xlsx`.
pub fn default_output_path(dir: &Path, at: DateTime<Local>) -> PathBuf {
    dir.join(format!("portfolio_export_{}.xlsx", at.format("%Y%m%d_%H%M%S")))
}

/// Writes the provided workbook data to the given path, one worksheet per
/// table. Missing parent directories are created.
///
/// Over-long cells are truncated and headers that collide case-insensitively
/// get a `_n` suffix.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn write_workbook(path: &Path, workbook: &WorkbookData) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut workbook_writer = Workbook::new();

    for table in &workbook.tables {
        let worksheet = workbook_writer.add_worksheet();
        worksheet.set_name(&table.sheet_name)?;

        for (col_idx, header) in unique_headers(&table.columns).iter().enumerate() {
            let (row, col) = position(0, col_idx)?;
            worksheet.write_string(row, col, excel_text(&table.sheet_name, header))?;
        }

        for (row_idx, values) in table.rows.iter().enumerate() {
            for (col_idx, cell) in values.iter().enumerate() {
                let (row, col) = position(row_idx + 1, col_idx)?;
                worksheet.write_string(row, col, excel_text(&table.sheet_name, cell))?;
            }
        }

        // Excel tables need a header and at least one data row.
        if table.columns.is_empty() || table.rows.is_empty() {
            continue;
        }
        let (last_row, last_col) = position(table.rows.len(), table.columns.len() - 1)?;
        let mut excel_table = Table::new();
        excel_table.set_autofilter(true);
        if let Err(err) = worksheet.add_table(0, 0, last_row, last_col, &excel_table) {
            warn!(sheet = %table.sheet_name, error = %err, "sheet written without a table");
        }
    }

    workbook_writer.save(path)?;
    info!(sheets = workbook.tables.len(), "workbook written");
    Ok(())
}

fn position(row: usize, col: usize) -> Result<(u32, u16)> {
    match (u32::try_from(row), u16::try_from(col)) {
        (Ok(row), Ok(col)) => Ok((row, col)),
        _ => Err(XlsxError::RowColumnLimitError.into()),
    }
}

fn excel_text<'a>(sheet: &str, text: &'a str) -> &'a str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((cut, _)) => {
            warn!(sheet, chars = text.chars().count(), "cell truncated to Excel's limit");
            &text[..cut]
        }
        None => text,
    }
}

/// Excel table headers must be unique ignoring case.
fn unique_headers(columns: &[String]) -> Vec<String> {
    let mut used = HashSet::new();
    columns
        .iter()
        .map(|header| {
            if used.insert(header.to_lowercase()) {
                return header.clone();
            }
            (1..)
                .map(|counter| format!("{header}_{counter}"))
                .find(|candidate| used.insert(candidate.to_lowercase()))
                .unwrap_or_else(|| header.clone())
        })
        .collect()
}
