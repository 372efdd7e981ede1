//! Spreadsheet ingestion and table export for sheetwise.
//!
//! Source workbooks are read as headerless [`Grid`]s so their irregular
//! layout (title rows, spacer rows, merged header bands) survives for
//! analysis. Reference datasets are read as header-row [`Table`]s.
//!
//! ```no_run
//! use sheetwise_sheet::{read_preview, read_table};
//!
//! let preview = read_preview("sales.xlsx", None, 50).unwrap();
//! println!("{}", preview.to_text(40));
//!
//! let reference = read_table("expected.csv", None).unwrap();
//! assert!(reference.col_count() > 0);
//! ```

mod csv;
mod error;
mod export;
mod grid;
mod json;
mod xlsx;

pub use csv::CsvOptions;
pub use error::{Result, SheetError};
pub use export::export;
pub use grid::Grid;

use serde::Serialize;
use sheetwise_core::Table;
use std::path::Path;
use tracing::debug;

/// Sheets in a workbook and their extents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkbookInfo {
    pub path: String,
    pub sheets: Vec<SheetInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetInfo {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
}

impl WorkbookInfo {
    #[must_use]
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Delimited,
    Workbook,
    Json,
}

fn source_kind(path: &Path) -> Result<SourceKind> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "csv" | "tsv" => Ok(SourceKind::Delimited),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SourceKind::Workbook),
        "json" => Ok(SourceKind::Json),
        _ => Err(SheetError::UnsupportedFormat { extension }),
    }
}

/// List the sheets of a workbook with their row and column extents.
///
/// Delimited files report a single sheet named after the file stem.
pub fn workbook_info(path: impl AsRef<Path>) -> Result<WorkbookInfo> {
    let path = path.as_ref();
    match source_kind(path)? {
        SourceKind::Workbook => xlsx::workbook_info(path),
        SourceKind::Delimited => {
            let grid = csv::read_grid(path, None)?;
            Ok(single_sheet_info(path, grid.name(), grid.row_count(), grid.col_count()))
        }
        SourceKind::Json => {
            let table = json::read_table(path)?;
            let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("Sheet1");
            Ok(single_sheet_info(path, name, table.row_count() + 1, table.col_count()))
        }
    }
}

fn single_sheet_info(path: &Path, name: &str, rows: usize, columns: usize) -> WorkbookInfo {
    WorkbookInfo {
        path: path.display().to_string(),
        sheets: vec![SheetInfo {
            name: name.to_string(),
            rows,
            columns,
        }],
    }
}

/// Read at most `max_rows` raw rows of a sheet, without header interpretation.
///
/// `sheet = None` selects the first sheet. The sheet name is ignored for
/// delimited files.
pub fn read_preview(path: impl AsRef<Path>, sheet: Option<&str>, max_rows: usize) -> Result<Grid> {
    read_grid(path.as_ref(), sheet, Some(max_rows))
}

/// Read a whole sheet as a header-row table.
pub fn read_table(path: impl AsRef<Path>, sheet: Option<&str>) -> Result<Table> {
    let path = path.as_ref();
    if source_kind(path)? == SourceKind::Json {
        return json::read_table(path);
    }
    let table = read_grid(path, sheet, None)?.into_table()?;
    debug!(
        path = %path.display(),
        rows = table.row_count(),
        columns = table.col_count(),
        "Read table"
    );
    Ok(table)
}

fn read_grid(path: &Path, sheet: Option<&str>, max_rows: Option<usize>) -> Result<Grid> {
    match source_kind(path)? {
        SourceKind::Workbook => xlsx::read_grid(path, sheet, max_rows),
        SourceKind::Delimited => csv::read_grid(path, max_rows),
        SourceKind::Json => {
            let table = json::read_table(path)?;
            let mut rows = Vec::with_capacity(table.row_count() + 1);
            rows.push(
                table
                    .columns()
                    .iter()
                    .map(|c| sheetwise_core::CellValue::from(c.as_str()))
                    .collect(),
            );
            rows.extend(table.rows().iter().cloned());
            rows.truncate(max_rows.unwrap_or(usize::MAX));
            let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("Sheet1");
            Ok(Grid::new(name, rows))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_dispatch() {
        assert_eq!(source_kind(Path::new("a.CSV")).unwrap(), SourceKind::Delimited);
        assert_eq!(source_kind(Path::new("a.xls")).unwrap(), SourceKind::Workbook);
        assert_eq!(source_kind(Path::new("a.json")).unwrap(), SourceKind::Json);
        assert!(matches!(
            source_kind(Path::new("a.pdf")),
            Err(SheetError::UnsupportedFormat { extension }) if extension == "pdf"
        ));
        assert!(source_kind(Path::new("noext")).is_err());
    }
}
