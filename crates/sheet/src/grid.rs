use crate::error::Result;
use sheetwise_core::{CellValue, Table};
use std::fmt::Write as _;

/// A headerless block of cells exactly as laid out in a worksheet.
///
/// Irregular sources keep their title rows, blank spacer rows and merged
/// header bands here; nothing is interpreted as a header until
/// [`Grid::into_table`] is called.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    name: String,
    rows: Vec<Vec<CellValue>>,
}

impl Grid {
    /// Create a grid, padding short rows with nulls so it is rectangular.
    #[must_use]
    pub fn new(name: impl Into<String>, mut rows: Vec<Vec<CellValue>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, CellValue::Null);
        }
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Sheet the grid was read from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

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
        self.rows.first().map_or(0, Vec::len)
    }

    /// Render a row-indexed, fixed-width text preview.
    ///
    /// Each cell is cut to `max_width` characters; nulls print as `NaN`.
    #[must_use]
    pub fn to_text(&self, max_width: usize) -> String {
        let max_width = max_width.max(1);
        let rendered: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|cell| render_cell(cell, max_width)).collect())
            .collect();

        let cols = self.col_count();
        let mut widths: Vec<usize> = (0..cols).map(|c| c.to_string().len()).collect();
        for row in &rendered {
            for (c, cell) in row.iter().enumerate() {
                widths[c] = widths[c].max(cell.chars().count());
            }
        }
        let index_width = self.rows.len().saturating_sub(1).to_string().len();

        let mut out = String::new();
        let _ = write!(out, "{:index_width$}", "");
        for (c, width) in widths.iter().copied().enumerate() {
            let _ = write!(out, "  {c:>width$}");
        }
        out.push('\n');

        for (r, row) in rendered.iter().enumerate() {
            let _ = write!(out, "{r:<index_width$}");
            for (cell, width) in row.iter().zip(widths.iter().copied()) {
                let _ = write!(out, "  {cell:>width$}");
            }
            out.push('\n');
        }

        out
    }

    /// Interpret the first row as column names and the rest as data.
    ///
    /// Blank header cells become `Unnamed: <index>`; numeric headers are
    /// rendered as text.
    pub fn into_table(self) -> Result<Table> {
        let mut rows = self.rows.into_iter();
        let Some(header) = rows.next() else {
            return Ok(Table::default());
        };

        let columns = header
            .iter()
            .enumerate()
            .map(|(idx, cell)| match cell {
                CellValue::Null => format!("Unnamed: {idx}"),
                CellValue::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect();

        Ok(Table::new(columns, rows.collect())?)
    }
}

fn render_cell(cell: &CellValue, max_width: usize) -> String {
    let text = match cell {
        CellValue::Null => "NaN".to_string(),
        other => other.to_string().replace(['\n', '\r'], " "),
    };
    if text.chars().count() > max_width {
        let mut cut: String = text.chars().take(max_width.saturating_sub(3)).collect();
        cut.push_str("...");
        cut
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Grid {
        Grid::new(
            "Sales",
            vec![
                vec![CellValue::from("Quarterly Sales Report - Q1")],
                vec![],
                vec![
                    CellValue::from("Region"),
                    CellValue::from("Units"),
                    CellValue::Null,
                ],
                vec![CellValue::from("North"), CellValue::Int(12), CellValue::Null],
            ],
        )
    }

    #[test]
    fn test_new_pads_rows() {
        let grid = sample();
        assert_eq!(grid.row_count(), 4);
        assert_eq!(grid.col_count(), 3);
        assert!(grid.rows().iter().all(|r| r.len() == 3));
    }

    #[test]
    fn test_to_text_layout() {
        let text = sample().to_text(10);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with('0'));
        assert!(lines[1].contains("Quarter..."));
        assert!(lines[2].contains("NaN"));
        assert!(lines[4].contains("North"));
    }

    #[test]
    fn test_into_table_uses_header_row() {
        let grid = Grid::new(
            "Truth",
            vec![
                vec![CellValue::from("Region"), CellValue::Null, CellValue::Int(2024)],
                vec![CellValue::from("A"), CellValue::Int(1), CellValue::Float(2.5)],
            ],
        );
        let table = grid.into_table().unwrap();
        assert_eq!(table.columns(), &["Region", "Unnamed: 1", "2024"]);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_into_table_empty() {
        let table = Grid::default().into_table().unwrap();
        assert!(table.is_empty());
        assert_eq!(table.col_count(), 0);
    }
}
