//! Loading the prompt list from a spreadsheet or CSV file.

use std::path::Path;

use calamine::{Reader, open_workbook_auto};
use tracing::{debug, warn};

use crate::error::BatchError;

/// One prompt to process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkItem {
    /// Position of the item, or the value of the configured index column
    pub index: usize,
    /// Prompt sent to the chat model
    pub prompt: String,
}

/// Everything read from the input file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WorkList {
    /// Rows that hold a prompt, in file order
    pub items: Vec<WorkItem>,
    /// Data-row positions left out because the prompt cell was blank.
    /// These rows get no report row.
    pub skipped_rows: Vec<usize>,
}

/// Which columns to read.
#[derive(Clone, Copy, Debug, Default)]
pub struct Columns {
    /// Zero-based prompt column
    pub prompt: usize,
    /// Zero-based index column; data-row position is used when `None`
    pub index: Option<usize>,
}

/// Reads all work items from `path`.
///
/// `.csv` files are read as CSV, anything else is handed to calamine
/// (xlsx, xlsm, xlsb, xls, ods) and the first worksheet is used. The first
/// row is always a header. Rows without a prompt are listed in
/// [`WorkList::skipped_rows`] instead of becoming items.
pub fn load_work_items(path: &Path, columns: Columns) -> Result<WorkList, BatchError> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    let rows = if is_csv {
        read_csv_rows(path)?
    } else {
        read_sheet_rows(path)?
    };
    debug!("Read {} data rows from {}", rows.len(), path.display());
    items_from_rows(rows, columns)
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>, BatchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    Ok(rows)
}

fn read_sheet_rows(path: &Path) -> Result<Vec<Vec<String>>, BatchError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| BatchError::Input(format!("{} has no worksheets", path.display())))??;
    Ok(range
        .rows()
        .skip(1)
        .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>())
        .collect())
}

fn items_from_rows(rows: Vec<Vec<String>>, columns: Columns) -> Result<WorkList, BatchError> {
    let mut list = WorkList {
        items: Vec::with_capacity(rows.len()),
        skipped_rows: Vec::new(),
    };
    for (position, row) in rows.into_iter().enumerate() {
        let prompt = row
            .get(columns.prompt)
            .map(|cell| cell.trim())
            .unwrap_or_default();
        if prompt.is_empty() {
            warn!("Skipping row {position}: no prompt in column {}", columns.prompt);
            list.skipped_rows.push(position);
            continue;
        }
        let index = match columns.index {
            Some(col) => parse_index(row.get(col).map(String::as_str).unwrap_or_default())
                .ok_or_else(|| {
                    BatchError::Input(format!(
                        "row {position}: column {col} does not hold an integer index"
                    ))
                })?,
            None => position,
        };
        list.items.push(WorkItem {
            index,
            prompt: prompt.to_string(),
        });
    }
    Ok(list)
}

/// Spreadsheet numbers come through as floats, so `3` and `3.0` both count.
fn parse_index(cell: &str) -> Option<usize> {
    let cell = cell.trim();
    if let Ok(index) = cell.parse::<usize>() {
        return Some(index);
    }
    let float = cell.parse::<f64>().ok()?;
    if float >= 0.0 && float.fract() == 0.0 && float <= usize::MAX as f64 {
        Some(float as usize)
    } else {
        None
    }
}
