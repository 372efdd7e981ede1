//! Error types for sheetwise.

use thiserror::Error;

/// Result type for sheetwise core operations.
pub type SwResult<T> = Result<T, SheetwiseError>;

/// Errors that can occur while building tables or loading configuration.
#[derive(Debug, Error)]
pub enum SheetwiseError {
    /// A row does not have the same number of cells as the table has columns.
    #[error("Ragged row {row}: expected {expected} cells, got {actual}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// A column name appears more than once.
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    /// A value outside the cell universe (int, float, string, null).
    #[error("Unsupported cell value at row {row}, column {column}: {found}")]
    UnsupportedCell {
        row: usize,
        column: usize,
        found: String,
    },

    /// Value is not shaped like a table.
    #[error("Not a table: {0}")]
    NotATable(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parse error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SheetwiseError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a not-a-table error.
    pub fn not_a_table(message: impl Into<String>) -> Self {
        Self::NotATable(message.into())
    }
}
