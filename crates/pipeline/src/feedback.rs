//! Failure diagnostics handed to the regeneration step.
//!
//! Execution errors and validation failures are packaged the same way so
//! the regeneration prompt does not care which one happened.

use crate::job::FailureKind;
use serde::Serialize;
use sheetwise_sandbox::ExecutionErrorKind;
use sheetwise_validator::{Mismatch, ValidationReport};

/// Mismatches carried into a regeneration request.
pub const MAX_EXAMPLES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    pub kind: FailureKind,
    /// Execution error message; `None` for validation failures.
    pub error: Option<String>,
    /// Report summary plus schema and row-count details.
    pub details: Vec<String>,
    pub mismatch_examples: Vec<Mismatch>,
}

impl Feedback {
    /// The candidate could not be run to completion.
    pub fn from_execution(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        let kind = match kind {
            ExecutionErrorKind::SyntaxError => FailureKind::SyntaxError,
            ExecutionErrorKind::RuntimeError | ExecutionErrorKind::ContractViolation => {
                FailureKind::RuntimeError
            }
        };
        Self::from_error(kind, message)
    }

    pub(crate) fn from_error(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            error: Some(message.into()),
            details: Vec::new(),
            mismatch_examples: Vec::new(),
        }
    }

    /// The candidate ran but its output did not pass validation.
    pub fn from_report(report: &ValidationReport) -> Self {
        let kind = if report.schema_match {
            FailureKind::ValueMismatch
        } else {
            FailureKind::SchemaMismatch
        };

        let mut details = vec![report.summary.clone()];
        details.extend(report.schema_errors.iter().cloned());
        if report.schema_match && !report.row_count_match {
            details.push(format!(
                "Row count mismatch. Expected: {}, Got: {}",
                report.rows_expected, report.rows_actual
            ));
        }

        Self {
            kind,
            error: None,
            details,
            mismatch_examples: report.mismatches.iter().take(MAX_EXAMPLES).cloned().collect(),
        }
    }

    /// One-paragraph description for prompts and logs.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("Failure: {}", self.kind)];
        if let Some(error) = &self.error {
            lines.push(format!("Error: {error}"));
        }
        lines.extend(self.details.iter().cloned());
        lines.join("\n")
    }
}
