use crate::error::Result;
use crate::grid::Grid;
use sheetwise_core::{CellValue, Table};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// CSV reader/writer options
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter (default: ',')
    pub delimiter: u8,
    /// Quote character (default: '"')
    pub quote: u8,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: b',',
            quote: b'"',
        }
    }
}

impl CsvOptions {
    /// Options for TSV (tab-separated values)
    #[must_use]
    pub fn tsv() -> Self {
        CsvOptions {
            delimiter: b'\t',
            ..Default::default()
        }
    }

    /// Pick options from a file extension.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => Self::tsv(),
            _ => Self::default(),
        }
    }
}

/// Read a delimited file as a headerless grid with inferred cell types.
pub(crate) fn read_grid(path: &Path, max_rows: Option<usize>) -> Result<Grid> {
    let file = File::open(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Sheet1")
        .to_string();
    read_grid_from(BufReader::new(file), name, &CsvOptions::for_path(path), max_rows)
}

pub(crate) fn read_grid_from<R: Read>(
    reader: R,
    name: String,
    options: &CsvOptions,
    max_rows: Option<usize>,
) -> Result<Grid> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .quote(options.quote)
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let limit = max_rows.unwrap_or(usize::MAX);
    let mut rows: Vec<Vec<CellValue>> = Vec::new();

    for result in csv_reader.records() {
        if rows.len() >= limit {
            break;
        }
        let record = result?;
        rows.push(record.iter().map(CellValue::parse).collect());
    }

    Ok(Grid::new(name, rows))
}

/// Write a table with a header row.
pub(crate) fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    write_csv_to(table, BufWriter::new(file), &CsvOptions::for_path(path))
}

pub(crate) fn write_csv_to<W: Write>(table: &Table, writer: W, options: &CsvOptions) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .quote(options.quote)
        .from_writer(writer);

    csv_writer.write_record(table.columns())?;
    for row in table.rows() {
        let record: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                CellValue::Null => String::new(),
                other => other.to_string(),
            })
            .collect();
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}
