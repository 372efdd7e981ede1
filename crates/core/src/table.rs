//! Columnar table with a fixed cell universe.
//!
//! Source, reference and result datasets all share this shape: an ordered
//! list of column names plus position-addressable rows. Every row holds
//! exactly one cell per column.

use crate::cell::CellValue;
use crate::error::{SheetwiseError, SwResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;
use std::fmt;

/// Inferred type of a column, derived from its non-null cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Every cell is null.
    Empty,
    Integer,
    /// Floats, or a mix of integers and floats.
    Float,
    Text,
    /// Numbers and strings in the same column.
    Mixed,
}

impl ColumnType {
    /// Whether the column holds numbers only.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    /// Lenient compatibility used by schema checks.
    ///
    /// Integer and float are interchangeable, text and mixed are both
    /// free-form columns, and an all-null column carries no type evidence.
    #[must_use]
    pub fn compatible_with(self, other: ColumnType) -> bool {
        if self == other || self == ColumnType::Empty || other == ColumnType::Empty {
            return true;
        }
        if self.is_numeric() && other.is_numeric() {
            return true;
        }
        matches!(
            (self, other),
            (ColumnType::Text, ColumnType::Mixed) | (ColumnType::Mixed, ColumnType::Text)
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Empty => "empty",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

/// A rectangular table of named columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Table {
    /// Build a table, checking that every row matches the column count and
    /// that column names are unique.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> SwResult<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(SheetwiseError::DuplicateColumn(name.clone()));
            }
        }

        for (idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(SheetwiseError::RaggedRow {
                    row: idx,
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
        }

        Ok(Self { columns, rows })
    }

    /// Build a table from anything convertible into cells.
    pub fn from_data<S, T>(columns: Vec<S>, rows: Vec<Vec<T>>) -> SwResult<Self>
    where
        S: Into<String>,
        T: Into<CellValue>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        Self::new(columns, rows)
    }

    /// Column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn col_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at `(row, col)`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Index of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate the cells of one column.
    pub fn column_values(&self, col: usize) -> impl Iterator<Item = &CellValue> + '_ {
        self.rows.iter().filter_map(move |row| row.get(col))
    }

    /// Infer the type of a column from its non-null cells.
    #[must_use]
    pub fn column_type(&self, col: usize) -> ColumnType {
        let mut has_int = false;
        let mut has_float = false;
        let mut has_text = false;

        for cell in self.column_values(col) {
            match cell {
                CellValue::Null => {}
                CellValue::Int(_) => has_int = true,
                CellValue::Float(_) => has_float = true,
                CellValue::String(_) => has_text = true,
            }
        }

        match (has_int || has_float, has_text) {
            (false, false) => ColumnType::Empty,
            (true, true) => ColumnType::Mixed,
            (false, true) => ColumnType::Text,
            (true, false) if has_float => ColumnType::Float,
            (true, false) => ColumnType::Integer,
        }
    }

    /// Inferred types for every column, in column order.
    #[must_use]
    pub fn column_types(&self) -> Vec<ColumnType> {
        (0..self.col_count()).map(|c| self.column_type(c)).collect()
    }

    /// Keep only the first `n` rows.
    #[must_use]
    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Parse a table from JSON.
    ///
    /// Two shapes are accepted: `{"columns": [...], "rows": [[...], ...]}`
    /// and an array of records `[{"col": value, ...}, ...]`. Records take
    /// their column order from the first record; missing keys become null.
    pub fn from_json(value: &JsonValue) -> SwResult<Self> {
        match value {
            JsonValue::Object(obj) => Self::from_split_json(obj),
            JsonValue::Array(items) => Self::from_records_json(items),
            other => Err(SheetwiseError::not_a_table(format!(
                "expected an object or an array, got {}",
                json_kind(other)
            ))),
        }
    }

    fn from_split_json(obj: &Map<String, JsonValue>) -> SwResult<Self> {
        let columns = obj
            .get("columns")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| SheetwiseError::not_a_table("missing 'columns' array"))?;
        let columns: Vec<String> = columns
            .iter()
            .map(|c| match c {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();

        let raw_rows = obj
            .get("rows")
            .or_else(|| obj.get("data"))
            .and_then(JsonValue::as_array)
            .ok_or_else(|| SheetwiseError::not_a_table("missing 'rows' array"))?;

        let mut rows = Vec::with_capacity(raw_rows.len());
        for (row_idx, raw) in raw_rows.iter().enumerate() {
            let cells = raw.as_array().ok_or_else(|| {
                SheetwiseError::not_a_table(format!("row {row_idx} is not an array"))
            })?;
            let mut row = Vec::with_capacity(cells.len());
            for (col_idx, cell) in cells.iter().enumerate() {
                row.push(cell_from_json(cell, row_idx, col_idx)?);
            }
            rows.push(row);
        }

        Self::new(columns, rows)
    }

    fn from_records_json(items: &[JsonValue]) -> SwResult<Self> {
        let Some(first) = items.first() else {
            return Ok(Table::default());
        };
        let first = first
            .as_object()
            .ok_or_else(|| SheetwiseError::not_a_table("records must be objects"))?;
        let columns: Vec<String> = first.keys().cloned().collect();

        let mut rows = Vec::with_capacity(items.len());
        for (row_idx, item) in items.iter().enumerate() {
            let obj = item.as_object().ok_or_else(|| {
                SheetwiseError::not_a_table(format!("record {row_idx} is not an object"))
            })?;
            let mut row = Vec::with_capacity(columns.len());
            for (col_idx, name) in columns.iter().enumerate() {
                let cell = obj.get(name).unwrap_or(&JsonValue::Null);
                row.push(cell_from_json(cell, row_idx, col_idx)?);
            }
            rows.push(row);
        }

        Self::new(columns, rows)
    }

    /// Rows as an array of JSON records, keeping column order.
    #[must_use]
    pub fn to_records_json(&self) -> JsonValue {
        let records = self
            .rows
            .iter()
            .map(|row| {
                let mut record = Map::with_capacity(self.columns.len());
                for (name, cell) in self.columns.iter().zip(row) {
                    record.insert(name.clone(), cell.to_json());
                }
                JsonValue::Object(record)
            })
            .collect();
        JsonValue::Array(records)
    }
}

impl<'de> Deserialize<'de> for Table {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            columns: Vec<String>,
            rows: Vec<Vec<CellValue>>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Table::new(raw.columns, raw.rows).map_err(serde::de::Error::custom)
    }
}

fn cell_from_json(value: &JsonValue, row: usize, column: usize) -> SwResult<CellValue> {
    CellValue::from_json(value).ok_or_else(|| SheetwiseError::UnsupportedCell {
        row,
        column,
        found: json_kind(value).to_string(),
    })
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
