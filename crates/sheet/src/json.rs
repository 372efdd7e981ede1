//! JSON support for tables.
//!
//! Tables are written as an array of records `[{"name": "North", "units": 3}, ...]`
//! with column order preserved. Reading also accepts the split
//! `{"columns": [...], "rows": [...]}` shape.

use crate::error::{Result, SheetError};
use serde_json::Value;
use sheetwise_core::Table;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Load a table from a JSON file.
pub(crate) fn read_table(path: &Path) -> Result<Table> {
    let file = File::open(path)?;
    read_table_from(BufReader::new(file))
}

pub(crate) fn read_table_from<R: Read>(reader: R) -> Result<Table> {
    let value: Value = serde_json::from_reader(reader)
        .map_err(|e| SheetError::Parse(format!("Invalid JSON: {e}")))?;
    Ok(Table::from_json(&value)?)
}

/// Write a table as pretty-printed JSON records.
pub(crate) fn write_json(table: &Table, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_json_to(table, &mut writer)?;
    writer.flush()?;
    Ok(())
}

pub(crate) fn write_json_to<W: Write>(table: &Table, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, &table.to_records_json())
        .map_err(|e| SheetError::Serialize(e.to_string()))
}
