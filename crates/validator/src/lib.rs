//! # sheetwise-validator
//!
//! Compares a result table against the reference table.
//!
//! Validation runs in three steps:
//! 1. Schema: identical column names in identical order, and per-column
//!    type compatibility (integer and float are interchangeable). A schema
//!    failure short-circuits with accuracy 0.
//! 2. Row count: exact equality, recorded but not short-circuiting.
//! 3. Cells: every cell of the overlapping rows is compared; numbers within
//!    an absolute tolerance match, everything else must be equal.
//!
//! ```
//! use sheetwise_core::{CellValue, Table};
//! use sheetwise_validator::{validate, ValidationOptions};
//!
//! let table = Table::from_data(vec!["k", "v"], vec![vec![CellValue::from("A"), CellValue::Int(1)]]).unwrap();
//! let report = validate(&table, &table, &ValidationOptions::default());
//! assert!(report.passed);
//! assert_eq!(report.value_accuracy, 1.0);
//! ```

use serde::{Deserialize, Serialize};
use sheetwise_core::{CellValue, Table, ValidationConfig};
use tracing::info;

/// Knobs for one validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationOptions {
    /// Minimum accuracy in [0, 1] for a pass.
    pub accuracy_threshold: f64,
    /// Absolute tolerance for numeric cells.
    pub numeric_tolerance: f64,
    /// How many mismatches the report keeps.
    pub max_mismatches: usize,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self::from(&ValidationConfig::default())
    }
}

impl From<&ValidationConfig> for ValidationOptions {
    fn from(config: &ValidationConfig) -> Self {
        Self {
            accuracy_threshold: config.accuracy_threshold,
            numeric_tolerance: config.numeric_tolerance,
            max_mismatches: config.max_mismatches,
        }
    }
}

/// One cell-level disagreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub row_index: usize,
    pub column_name: String,
    pub expected_value: CellValue,
    pub actual_value: CellValue,
    /// `expected - actual` when both sides are numeric.
    pub numeric_difference: Option<f64>,
}

/// Verdict of comparing a result table with the reference.
///
/// `passed` holds exactly when `schema_match && row_count_match &&
/// value_accuracy >= accuracy_threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub schema_match: bool,
    pub schema_errors: Vec<String>,
    pub row_count_match: bool,
    pub rows_expected: usize,
    pub rows_actual: usize,
    pub value_accuracy: f64,
    pub accuracy_threshold: f64,
    pub matching_cells: usize,
    pub total_cells: usize,
    /// All mismatches found, including those not kept in `mismatches`.
    pub mismatch_count: usize,
    /// The first mismatches in row-major, column order.
    pub mismatches: Vec<Mismatch>,
    pub summary: String,
}

impl ValidationReport {
    fn summarize(passed: bool, accuracy: f64, mismatch_count: usize) -> String {
        format!(
            "{}: {:.2}% accuracy, {} mismatches",
            if passed { "PASSED" } else { "FAILED" },
            accuracy * 100.0,
            mismatch_count
        )
    }
}

/// Compare `result` with `reference`.
///
/// Pure: the same inputs always produce the same report.
#[must_use]
pub fn validate(result: &Table, reference: &Table, options: &ValidationOptions) -> ValidationReport {
    let rows_expected = reference.row_count();
    let rows_actual = result.row_count();

    let schema_errors = check_schema(result, reference);
    if !schema_errors.is_empty() {
        let report = ValidationReport {
            passed: false,
            schema_match: false,
            schema_errors,
            row_count_match: rows_expected == rows_actual,
            rows_expected,
            rows_actual,
            value_accuracy: 0.0,
            accuracy_threshold: options.accuracy_threshold,
            matching_cells: 0,
            total_cells: 0,
            mismatch_count: 0,
            mismatches: Vec::new(),
            summary: "FAILED: schema mismatch".to_string(),
        };
        info!(errors = report.schema_errors.len(), "{}", report.summary);
        return report;
    }

    let row_count_match = rows_expected == rows_actual;
    let compared_rows = rows_expected.min(rows_actual);
    let columns = reference.columns();
    let total_cells = compared_rows * columns.len();

    let mut matching_cells = 0;
    let mut mismatch_count = 0;
    let mut mismatches = Vec::new();

    for (row_index, (actual_row, expected_row)) in result
        .rows()
        .iter()
        .zip(reference.rows())
        .enumerate()
    {
        for ((column_name, actual), expected) in columns.iter().zip(actual_row).zip(expected_row) {
            if cells_match(expected, actual, options.numeric_tolerance) {
                matching_cells += 1;
                continue;
            }
            mismatch_count += 1;
            if mismatches.len() < options.max_mismatches {
                mismatches.push(Mismatch {
                    row_index,
                    column_name: column_name.clone(),
                    expected_value: expected.clone(),
                    actual_value: actual.clone(),
                    numeric_difference: numeric_difference(expected, actual),
                });
            }
        }
    }

    let value_accuracy = if total_cells == 0 {
        0.0
    } else {
        matching_cells as f64 / total_cells as f64
    };
    let passed = row_count_match && value_accuracy >= options.accuracy_threshold;
    let summary = ValidationReport::summarize(passed, value_accuracy, mismatch_count);
    info!(
        rows_expected,
        rows_actual,
        accuracy = value_accuracy,
        "{summary}"
    );

    ValidationReport {
        passed,
        schema_match: true,
        schema_errors: Vec::new(),
        row_count_match,
        rows_expected,
        rows_actual,
        value_accuracy,
        accuracy_threshold: options.accuracy_threshold,
        matching_cells,
        total_cells,
        mismatch_count,
        mismatches,
        summary,
    }
}

fn check_schema(result: &Table, reference: &Table) -> Vec<String> {
    let mut errors = Vec::new();

    if result.columns() != reference.columns() {
        errors.push(format!(
            "Column mismatch. Expected: {:?}, Got: {:?}",
            reference.columns(),
            result.columns()
        ));
    }

    for (expected_idx, name) in reference.columns().iter().enumerate() {
        let Some(actual_idx) = result.column_index(name) else {
            continue;
        };
        let expected = reference.column_type(expected_idx);
        let actual = result.column_type(actual_idx);
        if !expected.compatible_with(actual) {
            errors.push(format!(
                "Column '{name}' type mismatch. Expected: {expected}, Got: {actual}"
            ));
        }
    }

    errors
}

fn is_absent(cell: &CellValue) -> bool {
    match cell {
        CellValue::Null => true,
        CellValue::Float(f) => f.is_nan(),
        _ => false,
    }
}

fn cells_match(expected: &CellValue, actual: &CellValue, tolerance: f64) -> bool {
    match (is_absent(expected), is_absent(actual)) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        (false, false) => {}
    }
    // exact, so integers past 2^53 are not collapsed by the f64 path
    if let (CellValue::Int(e), CellValue::Int(a)) = (expected, actual) {
        return e == a;
    }
    match (expected.as_f64(), actual.as_f64()) {
        (Some(e), Some(a)) => (e - a).abs() <= tolerance,
        _ => expected == actual,
    }
}

fn numeric_difference(expected: &CellValue, actual: &CellValue) -> Option<f64> {
    if let (CellValue::Int(e), CellValue::Int(a)) = (expected, actual) {
        return Some((i128::from(*e) - i128::from(*a)) as f64);
    }
    match (expected.as_f64(), actual.as_f64()) {
        (Some(e), Some(a)) if e.is_finite() && a.is_finite() => Some(e - a),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_column(values: impl IntoIterator<Item = CellValue>) -> Table {
        Table::new(
            vec!["value".to_string()],
            values.into_iter().map(|v| vec![v]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_identical_tables_pass() {
        let table = Table::from_data(
            vec!["name", "n"],
            vec![
                vec![CellValue::from("A"), CellValue::Int(1)],
                vec![CellValue::from("B"), CellValue::Int(2)],
            ],
        )
        .unwrap();

        let report = validate(&table, &table, &ValidationOptions::default());
        assert!(report.passed);
        assert!(report.schema_match);
        assert!(report.row_count_match);
        assert!((report.value_accuracy - 1.0).abs() < f64::EPSILON);
        assert!(report.mismatches.is_empty());
        assert_eq!(report.summary, "PASSED: 100.00% accuracy, 0 mismatches");
    }

    #[test]
    fn test_reordered_columns_fail_schema() {
        let reference = Table::from_data(
            vec!["x", "y"],
            vec![vec![CellValue::Int(1), CellValue::from("a")]],
        )
        .unwrap();
        let result = Table::from_data(
            vec!["y", "x"],
            vec![vec![CellValue::from("a"), CellValue::Int(1)]],
        )
        .unwrap();

        let report = validate(&result, &reference, &ValidationOptions::default());
        assert!(!report.schema_match);
        assert!(!report.passed);
        assert!(report.value_accuracy.abs() < f64::EPSILON);
        assert!(report.schema_errors[0].starts_with("Column mismatch"));
        assert_eq!(report.total_cells, 0);
    }

    #[test]
    fn test_int_float_drift_is_compatible() {
        let reference = single_column([CellValue::Int(1), CellValue::Int(2)]);
        let result = single_column([CellValue::Float(1.0), CellValue::Float(2.0)]);

        let report = validate(&result, &reference, &ValidationOptions::default());
        assert!(report.schema_match);
        assert!(report.passed);
    }

    #[test]
    fn test_numeric_vs_string_drift_is_schema_error() {
        let reference = single_column([CellValue::Int(1)]);
        let result = single_column([CellValue::from("1")]);

        let report = validate(&result, &reference, &ValidationOptions::default());
        assert!(!report.schema_match);
        assert!(report.schema_errors[0].contains("type mismatch"));
    }

    #[test]
    fn test_tolerance_is_absolute() {
        let reference = single_column([CellValue::Float(1.0)]);

        let close = single_column([CellValue::Float(1.000_000_1)]);
        assert!(validate(&close, &reference, &ValidationOptions::default()).passed);

        let far = single_column([CellValue::Float(1.1)]);
        let report = validate(&far, &reference, &ValidationOptions::default());
        assert!(!report.passed);
        let diff = report.mismatches[0].numeric_difference.unwrap();
        assert!((diff - (1.0 - 1.1)).abs() < 1e-12);

        let big_reference = single_column([CellValue::Float(1.0e9)]);
        let big_drift = single_column([CellValue::Float(1.0e9 + 1.0e-3)]);
        assert!(!validate(&big_drift, &big_reference, &ValidationOptions::default()).passed);
    }

    #[test]
    fn test_three_differences_in_hundred_rows() {
        let reference = single_column((0..100).map(CellValue::Int));
        let result = single_column((0..100).map(|i| {
            if [5, 50, 95].contains(&i) {
                CellValue::Int(i + 1000)
            } else {
                CellValue::Int(i)
            }
        }));

        let report = validate(&result, &reference, &ValidationOptions::default());
        assert!((report.value_accuracy - 0.97).abs() < 1e-12);
        assert_eq!(report.mismatches.len(), 3);
        assert_eq!(report.mismatch_count, 3);
        assert_eq!(report.mismatches[0].row_index, 5);
        assert_eq!(report.mismatches[0].numeric_difference, Some(-1000.0));
        assert!(!report.passed);
    }

    #[test]
    fn test_mismatch_list_is_bounded() {
        let reference = single_column((0..100).map(CellValue::Int));
        let result = single_column((0..100).map(|i| CellValue::Int(-i - 1)));

        let report = validate(&result, &reference, &ValidationOptions::default());
        assert_eq!(report.mismatch_count, 100);
        assert_eq!(report.mismatches.len(), 20);
        assert!(report.value_accuracy.abs() < f64::EPSILON);
        assert_eq!(report.summary, "FAILED: 0.00% accuracy, 100 mismatches");
    }

    #[test]
    fn test_empty_tables_have_zero_accuracy() {
        let reference = Table::from_data::<&str, CellValue>(vec!["a"], vec![]).unwrap();
        let report = validate(&reference, &reference, &ValidationOptions::default());
        assert!(report.schema_match);
        assert!(report.value_accuracy.abs() < f64::EPSILON);
        assert!(!report.passed);
    }

    #[test]
    fn test_row_count_mismatch_does_not_short_circuit() {
        let reference = single_column([CellValue::Int(1), CellValue::Int(2), CellValue::Int(3)]);
        let result = single_column([CellValue::Int(1), CellValue::Int(2)]);

        let report = validate(&result, &reference, &ValidationOptions::default());
        assert!(!report.row_count_match);
        assert!(!report.passed);
        assert_eq!(report.total_cells, 2);
        assert!((report.value_accuracy - 1.0).abs() < f64::EPSILON);
        assert_eq!(report.rows_expected, 3);
        assert_eq!(report.rows_actual, 2);
    }

    #[test]
    fn test_null_handling() {
        let reference = Table::from_data(
            vec!["a", "b"],
            vec![vec![CellValue::Null, CellValue::Int(0)]],
        )
        .unwrap();
        let result = Table::from_data(
            vec!["a", "b"],
            vec![vec![CellValue::Null, CellValue::Null]],
        )
        .unwrap();

        let report = validate(&result, &reference, &ValidationOptions::default());
        assert_eq!(report.matching_cells, 1);
        assert_eq!(report.mismatches[0].column_name, "b");
        assert_eq!(report.mismatches[0].numeric_difference, None);
    }

    #[test]
    fn test_string_cells_compare_exactly() {
        let reference = single_column([CellValue::from("North")]);
        let result = single_column([CellValue::from("north")]);
        let report = validate(&result, &reference, &ValidationOptions::default());
        assert_eq!(report.mismatch_count, 1);
        assert_eq!(report.mismatches[0].expected_value, CellValue::from("North"));
        assert_eq!(report.mismatches[0].actual_value, CellValue::from("north"));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let reference = single_column((0..10).map(CellValue::Int));
        let result = single_column((0..10).map(|i| CellValue::Int(if i == 0 { 99 } else { i })));
        let options = ValidationOptions {
            accuracy_threshold: 0.9,
            ..ValidationOptions::default()
        };
        assert!(validate(&result, &reference, &options).passed);
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let reference = single_column([CellValue::Int(9_007_199_254_740_993)]);
        let result = single_column([CellValue::Int(9_007_199_254_740_992)]);
        let report = validate(&result, &reference, &ValidationOptions::default());
        assert!(!report.passed);
        assert_eq!(report.mismatch_count, 1);
        assert_eq!(report.mismatches[0].numeric_difference, Some(1.0));

        let same = single_column([CellValue::Int(9_007_199_254_740_993)]);
        assert!(validate(&same, &reference, &ValidationOptions::default()).passed);
    }

    #[test]
    fn test_report_serializes_for_artifacts() {
        let reference = single_column([CellValue::Int(1)]);
        let result = single_column([CellValue::Int(2)]);
        let report = validate(&result, &reference, &ValidationOptions::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mismatches"][0]["expected_value"], 1);
        assert_eq!(json["mismatches"][0]["actual_value"], 2);
        assert_eq!(json["mismatches"][0]["numeric_difference"], -1.0);
    }
}
