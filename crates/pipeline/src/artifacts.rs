//! Per-job traceability files under `<output>/artifacts/<job_id>/`.
//!
//! Writing an artifact never fails a job: errors are logged and dropped.

use crate::analysis::AnalysisReport;
use serde::Serialize;
use sheetwise_core::{CandidateProgram, JobId};
use sheetwise_sandbox::ExecutionOutcome;
use sheetwise_validator::ValidationReport;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: Option<PathBuf>,
    extension: String,
}

impl ArtifactStore {
    /// Store for `job_id` under `output_dir`.
    pub fn new(output_dir: &Path, job_id: &JobId, extension: impl Into<String>) -> Self {
        Self {
            dir: Some(output_dir.join("artifacts").join(job_id.as_str())),
            extension: extension.into(),
        }
    }

    /// A store that writes nothing.
    pub fn disabled() -> Self {
        Self {
            dir: None,
            extension: String::new(),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub async fn save_analysis(&self, report: &AnalysisReport) {
        self.write_json("analysis.json", report).await;
    }

    pub async fn save_program(&self, iteration: u32, program: &CandidateProgram) {
        let name = format!("iter{iteration}_program.{}", self.extension);
        self.write(&name, program.source().as_bytes()).await;
    }

    pub async fn save_validation(&self, iteration: u32, report: &ValidationReport) {
        self.write_json(&format!("iter{iteration}_validation.json"), report)
            .await;
    }

    pub async fn save_execution(&self, iteration: u32, outcome: &ExecutionOutcome) {
        self.write_json(&format!("iter{iteration}_execution.json"), outcome)
            .await;
    }

    async fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) {
        if self.dir.is_none() {
            return;
        }
        match serde_json::to_vec_pretty(value) {
            Ok(bytes) => self.write(name, &bytes).await,
            Err(e) => warn!(artifact = name, error = %e, "Failed to serialize artifact"),
        }
    }

    async fn write(&self, name: &str, bytes: &[u8]) {
        let Some(dir) = &self.dir else {
            return;
        };
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %e, "Failed to create artifact directory");
            return;
        }
        let path = dir.join(name);
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => debug!(path = %path.display(), "Saved artifact"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to save artifact"),
        }
    }
}
