//! What a finished job reports back.

use serde::{Deserialize, Serialize};
use sheetwise_core::{CandidateProgram, JobId, PatternId};
use sheetwise_validator::ValidationReport;
use std::fmt;
use std::path::PathBuf;

/// Why a job (or one attempt within it) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    SyntaxError,
    /// Includes contract violations, timeouts and sandbox host faults.
    RuntimeError,
    SchemaMismatch,
    /// Accuracy below threshold or row count differs.
    ValueMismatch,
    OracleError,
    BudgetExhausted,
    Cancelled,
    /// Inputs could not be read or results could not be written.
    IoError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::SyntaxError => "SyntaxError",
            FailureKind::RuntimeError => "RuntimeError",
            FailureKind::SchemaMismatch => "SchemaMismatch",
            FailureKind::ValueMismatch => "ValueMismatch",
            FailureKind::OracleError => "OracleError",
            FailureKind::BudgetExhausted => "BudgetExhausted",
            FailureKind::Cancelled => "Cancelled",
            FailureKind::IoError => "IoError",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: FailureKind,
    /// For `BudgetExhausted`, the kind of the last failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<FailureKind>,
    pub message: String,
}

impl JobError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            last_failure: None,
            message: message.into(),
        }
    }

    pub fn budget_exhausted(last_failure: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::BudgetExhausted,
            last_failure: Some(last_failure),
            message: message.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last_failure {
            Some(last) => write!(f, "{} (last: {last}): {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Outcome of one transformation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub success: bool,
    /// Executor invocations consumed.
    pub iterations: u32,
    pub final_validation_report: Option<ValidationReport>,
    pub final_program: Option<CandidateProgram>,
    /// Where the last successful program wrote its own output, if it did.
    pub cleaned_data: Option<PathBuf>,
    #[serde(default)]
    pub exported_files: Vec<PathBuf>,
    /// Pattern stored for this job.
    pub cache_pattern_id: Option<PatternId>,
    /// Pattern found by the cache check, whether or not it was reused.
    pub cache_hit: Option<PatternId>,
    pub artifacts_dir: Option<PathBuf>,
    pub error: Option<JobError>,
}

impl JobResult {
    pub(crate) fn failed_early(job_id: JobId, error: JobError) -> Self {
        Self {
            job_id,
            success: false,
            iterations: 0,
            final_validation_report: None,
            final_program: None,
            cleaned_data: None,
            exported_files: Vec::new(),
            cache_pattern_id: None,
            cache_hit: None,
            artifacts_dir: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = JobError::budget_exhausted(FailureKind::ValueMismatch, "FAILED: 90.00% accuracy");
        assert_eq!(
            err.to_string(),
            "BudgetExhausted (last: ValueMismatch): FAILED: 90.00% accuracy"
        );
        assert_eq!(
            JobError::new(FailureKind::Cancelled, "job cancelled").to_string(),
            "Cancelled: job cancelled"
        );
    }

    #[test]
    fn test_result_serializes_kind() {
        let result = JobResult::failed_early(
            JobId::generate(),
            JobError::new(FailureKind::OracleError, "HTTP 529"),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "OracleError");
        assert!(json["error"].get("last_failure").is_none());
    }
}
