use crate::error::Result;
use crate::{csv, json, xlsx};
use sheetwise_core::{ExportFormat, Table};
use std::path::{Path, PathBuf};
use tracing::info;

/// Write `table` once per requested format next to `base_path`.
///
/// `base_path` has no extension; each format appends its own. Parent
/// directories are created as needed. Duplicate formats are written once.
pub fn export(table: &Table, base_path: &Path, formats: &[ExportFormat]) -> Result<Vec<PathBuf>> {
    if let Some(parent) = base_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut written = Vec::with_capacity(formats.len());
    for format in formats {
        let path = base_path.with_extension(format.extension());
        if written.contains(&path) {
            continue;
        }
        match format {
            ExportFormat::Csv => csv::write_csv(table, &path)?,
            ExportFormat::Json => json::write_json(table, &path)?,
            ExportFormat::Xlsx => xlsx::write_xlsx(table, &path)?,
        }
        info!(format = %format, path = %path.display(), rows = table.row_count(), "Exported table");
        written.push(path);
    }

    Ok(written)
}
