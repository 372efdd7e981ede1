use crate::error::{Result, SheetError};
use crate::grid::Grid;
use crate::{SheetInfo, WorkbookInfo};
use calamine::{open_workbook_auto, Data, ExcelDateTime, Range, Reader};
use chrono::{NaiveDate, NaiveTime, TimeDelta};
use rust_xlsxwriter::Workbook;
use sheetwise_core::{CellValue, Table};
use std::path::Path;

/// Convert calamine Data to CellValue
fn data_to_cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Null,
        Data::Bool(b) => CellValue::Int(i64::from(*b)),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::String(s) => CellValue::String(s.clone()),
        Data::DateTime(dt) => datetime_cell(dt),
        Data::DateTimeIso(s) => CellValue::String(s.clone()),
        Data::DurationIso(s) => CellValue::String(s.clone()),
        Data::Error(e) => CellValue::String(format!("#ERROR: {e:?}")),
    }
}

/// Dates become ISO 8601 text, the same rendering candidate programs use.
/// Durations stay numeric (days).
fn datetime_cell(dt: &ExcelDateTime) -> CellValue {
    if dt.is_duration() {
        return CellValue::Float(dt.as_f64());
    }
    serial_to_iso(dt.as_f64()).map_or(CellValue::Float(dt.as_f64()), CellValue::String)
}

/// `YYYY-MM-DD` at midnight, `YYYY-MM-DDTHH:MM:SS` otherwise.
fn serial_to_iso(serial: f64) -> Option<String> {
    if !serial.is_finite() {
        return None;
    }
    // Excel serial days count from 1899-12-30
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    let millis = (serial * 86_400_000.0).round() as i64;
    let at = epoch.checked_add_signed(TimeDelta::try_milliseconds(millis)?)?;
    let text = if at.time() == NaiveTime::MIN {
        at.format("%Y-%m-%d").to_string()
    } else {
        at.format("%Y-%m-%dT%H:%M:%S").to_string()
    };
    Some(text)
}

/// Convert a used range back to worksheet coordinates.
///
/// calamine trims leading empty rows and columns; layout analysis needs them,
/// so they are restored as nulls.
fn range_to_rows(range: &Range<Data>, max_rows: Option<usize>) -> Vec<Vec<CellValue>> {
    let (row_offset, col_offset) = range
        .start()
        .map_or((0, 0), |(r, c)| (r as usize, c as usize));
    let limit = max_rows.unwrap_or(usize::MAX);

    let mut rows: Vec<Vec<CellValue>> = Vec::new();
    for _ in 0..row_offset.min(limit) {
        rows.push(Vec::new());
    }

    for row in range.rows() {
        if rows.len() >= limit {
            break;
        }
        let mut cells = vec![CellValue::Null; col_offset];
        cells.extend(row.iter().map(data_to_cell_value));
        rows.push(cells);
    }

    rows
}

/// List sheets and their extents.
pub(crate) fn workbook_info(path: &Path) -> Result<WorkbookInfo> {
    let mut workbook = open_workbook_auto(path).map_err(SheetError::workbook)?;
    let names = workbook.sheet_names().clone();

    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook
            .worksheet_range(&name)
            .map_err(SheetError::workbook)?;
        let (rows, columns) = match (range.start(), range.end()) {
            (Some(_), Some((r, c))) => (r as usize + 1, c as usize + 1),
            _ => (0, 0),
        };
        sheets.push(SheetInfo {
            name,
            rows,
            columns,
        });
    }

    Ok(WorkbookInfo {
        path: path.display().to_string(),
        sheets,
    })
}

/// Read a headerless grid from a workbook. `sheet = None` picks the first sheet.
pub(crate) fn read_grid(path: &Path, sheet: Option<&str>, max_rows: Option<usize>) -> Result<Grid> {
    let mut workbook = open_workbook_auto(path).map_err(SheetError::workbook)?;
    let names = workbook.sheet_names().clone();

    let name = match sheet {
        Some(requested) => names
            .iter()
            .find(|n| n.as_str() == requested)
            .cloned()
            .ok_or_else(|| SheetError::SheetNotFound {
                name: requested.to_string(),
            })?,
        None => names.first().cloned().ok_or_else(|| SheetError::NoSheets {
            path: path.display().to_string(),
        })?,
    };

    let range = workbook
        .worksheet_range(&name)
        .map_err(SheetError::workbook)?;

    Ok(Grid::new(name, range_to_rows(&range, max_rows)))
}

/// Write a table to an Excel file: one header row, then typed cells.
pub(crate) fn write_xlsx(table: &Table, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col_idx, name) in table.columns().iter().enumerate() {
        let col_num = u16::try_from(col_idx)
            .map_err(|_| SheetError::write("Column index overflow"))?;
        worksheet
            .write_string(0, col_num, name)
            .map_err(SheetError::write)?;
    }

    for (row_idx, row) in table.rows().iter().enumerate() {
        let row_num = u32::try_from(row_idx + 1)
            .map_err(|_| SheetError::write("Row index overflow"))?;
        for (col_idx, cell) in row.iter().enumerate() {
            let col_num = u16::try_from(col_idx)
                .map_err(|_| SheetError::write("Column index overflow"))?;

            match cell {
                CellValue::Null => {}
                CellValue::Int(i) => {
                    // Excel stores all numbers as f64; integers beyond 2^53 lose precision
                    worksheet
                        .write_number(row_num, col_num, *i as f64)
                        .map_err(SheetError::write)?;
                }
                CellValue::Float(f) => {
                    worksheet
                        .write_number(row_num, col_num, *f)
                        .map_err(SheetError::write)?;
                }
                CellValue::String(s) => {
                    worksheet
                        .write_string(row_num, col_num, s)
                        .map_err(SheetError::write)?;
                }
            }
        }
    }

    workbook.save(path).map_err(SheetError::write)?;
    Ok(())
}
