use sheetwise_core::SheetwiseError;
use thiserror::Error;

/// Errors that can occur while reading or writing spreadsheet files
#[derive(Error, Debug)]
pub enum SheetError {
    #[error("Sheet not found: {name}")]
    SheetNotFound { name: String },

    #[error("Workbook has no sheets: {path}")]
    NoSheets { path: String },

    #[error("Unsupported file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Table error: {0}")]
    Table(#[from] SheetwiseError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SheetError {
    pub(crate) fn workbook(err: impl std::fmt::Display) -> Self {
        SheetError::Workbook(err.to_string())
    }

    pub(crate) fn write(err: impl std::fmt::Display) -> Self {
        SheetError::Write(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SheetError>;
