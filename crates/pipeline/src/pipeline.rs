//! One job, end to end: ingest, analyze, run the correction loop, export,
//! learn.

use crate::analysis::{AnalysisError, AnalysisReport, Analyzer};
use crate::artifacts::ArtifactStore;
use crate::author::CodeAuthor;
use crate::correction::{CorrectionLoop, LoopInputs, LoopOptions, LoopOutcome, LoopStatus};
use crate::job::{FailureKind, JobError, JobResult};
use crate::prompts::{GenerationContext, PromptBuilder};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use sheetwise_core::{CandidateProgram, Config, JobId, PatternId};
use sheetwise_oracle::{HttpOracle, Oracle, OracleError};
use sheetwise_patterns::{PatternError, PatternStore};
use sheetwise_sandbox::{CancelToken, Executor, Sandbox, SandboxError};
use sheetwise_validator::{ValidationOptions, ValidationReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Raw source rows shown to the code generator.
const SOURCE_SAMPLE_ROWS: usize = 20;

/// Failures assembling a [`Pipeline`] from configuration.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Patterns(#[from] PatternError),
}

/// What to transform and where results go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub source: PathBuf,
    pub reference: PathBuf,
    pub output_dir: PathBuf,
    /// Source sheet; the first sheet when `None`.
    pub sheet: Option<String>,
    /// Consult the pattern cache before generating.
    pub check_library: bool,
}

pub struct Pipeline {
    config: Config,
    oracle: Arc<dyn Oracle>,
    executor: Arc<dyn Executor>,
    patterns: Option<Arc<PatternStore>>,
}

impl Pipeline {
    pub fn new(config: Config, oracle: Arc<dyn Oracle>, executor: Arc<dyn Executor>) -> Self {
        Self {
            config,
            oracle,
            executor,
            patterns: None,
        }
    }

    #[must_use]
    pub fn with_patterns(mut self, patterns: Arc<PatternStore>) -> Self {
        self.patterns = Some(patterns);
        self
    }

    /// HTTP oracle, process sandbox and (with learning on) the on-disk
    /// pattern store, all from `config`.
    pub async fn from_config(config: Config) -> Result<Self, PipelineError> {
        let oracle = Arc::new(HttpOracle::from_config(&config.oracle)?);
        let executor = Arc::new(Sandbox::new(config.sandbox.clone())?);
        let patterns = if config.optimization.enable_learning {
            Some(Arc::new(PatternStore::open(&config.patterns.dir).await?))
        } else {
            None
        };
        let mut pipeline = Self::new(config, oracle, executor);
        pipeline.patterns = patterns;
        Ok(pipeline)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one job. Every failure is reported in the result.
    pub async fn run(&self, request: &JobRequest, cancel: &CancelToken) -> JobResult {
        let job_id = JobId::generate();
        if cancel.is_cancelled() {
            return JobResult::failed_early(
                job_id,
                JobError::new(FailureKind::Cancelled, "job cancelled"),
            );
        }
        info!(
            job_id = %job_id,
            source = %request.source.display(),
            reference = %request.reference.display(),
            "Starting transformation job"
        );

        let artifacts = if self.config.output.save_artifacts {
            ArtifactStore::new(&request.output_dir, &job_id, &self.config.sandbox.extension)
        } else {
            ArtifactStore::disabled()
        };

        let reference = match sheetwise_sheet::read_table(&request.reference, None) {
            Ok(table) => table,
            Err(e) => {
                return JobResult::failed_early(
                    job_id,
                    JobError::new(FailureKind::IoError, format!("reference: {e}")),
                )
            }
        };

        let prompts =
            PromptBuilder::for_sandbox(&self.config.sandbox, self.config.analysis.reference_sample_rows);
        let analyzer = Analyzer::new(
            Arc::clone(&self.oracle),
            prompts.clone(),
            self.config.analysis.clone(),
        );

        let analysis = match analyzer
            .analyze(&request.source, request.sheet.as_deref(), &request.reference, &reference)
            .await
        {
            Ok(_) if cancel.is_cancelled() => {
                return JobResult::failed_early(
                    job_id,
                    JobError::new(FailureKind::Cancelled, "job cancelled"),
                )
            }
            Ok(report) => report,
            Err(e) => {
                let kind = match e {
                    AnalysisError::Oracle(_) => FailureKind::OracleError,
                    AnalysisError::Sheet(_) => FailureKind::IoError,
                };
                return JobResult::failed_early(job_id, JobError::new(kind, e.to_string()));
            }
        };
        artifacts.save_analysis(&analysis).await;

        let analyzed_sheet = analysis
            .structure()
            .get("analyzed_sheet")
            .and_then(JsonValue::as_str);
        let preview = match sheetwise_sheet::read_preview(&request.source, analyzed_sheet, SOURCE_SAMPLE_ROWS)
        {
            Ok(grid) => grid,
            Err(e) => {
                return JobResult::failed_early(
                    job_id,
                    JobError::new(FailureKind::IoError, format!("source: {e}")),
                )
            }
        };

        let options = LoopOptions {
            max_iterations: self.config.optimization.max_iterations,
            cache_policy: self.config.optimization.cache_policy,
            validation: ValidationOptions::from(&self.config.validation),
        };
        let author = Arc::new(CodeAuthor::new(Arc::clone(&self.oracle), prompts));
        let mut correction = CorrectionLoop::new(Arc::clone(&self.executor), author, options)
            .with_artifacts(artifacts.clone());
        if let Some(patterns) = &self.patterns {
            correction = correction.with_patterns(Arc::clone(patterns));
        }

        let inputs = LoopInputs {
            job_id: &job_id,
            context: GenerationContext {
                analysis: &analysis,
                source_preview: &preview,
                reference: &reference,
            },
            source: &request.source,
            output_dir: &request.output_dir,
            check_library: request.check_library && self.config.optimization.enable_learning,
        };
        let LoopOutcome {
            status,
            iterations,
            last_program,
            last_report,
            cache_hit,
        } = correction.run(&inputs, cancel).await;

        let mut result = JobResult {
            job_id: job_id.clone(),
            success: false,
            iterations,
            final_validation_report: last_report,
            final_program: last_program,
            cleaned_data: None,
            exported_files: Vec::new(),
            cache_pattern_id: None,
            cache_hit,
            artifacts_dir: artifacts.dir().map(Path::to_path_buf),
            error: None,
        };
        let (table, output) = match status {
            LoopStatus::Succeeded { table, output } => (table, output),
            LoopStatus::Failed(error) => {
                result.error = Some(error);
                return result;
            }
        };

        let base = request
            .output_dir
            .join("cleaned_data")
            .join(format!("cleaned_{job_id}"));
        match sheetwise_sheet::export(&table, &base, &self.config.output.formats) {
            Ok(files) => result.exported_files = files,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Export failed");
                result.error = Some(JobError::new(FailureKind::IoError, format!("export: {e}")));
                return result;
            }
        }
        if tokio::fs::try_exists(&output).await.unwrap_or(false) {
            result.cleaned_data = Some(output);
        }
        result.success = true;

        if let (Some(program), Some(report)) =
            (&result.final_program, &result.final_validation_report)
        {
            result.cache_pattern_id = self.learn(request, &job_id, &analysis, program, report).await;
        }

        info!(
            job_id = %job_id,
            iterations = result.iterations,
            files = result.exported_files.len(),
            "Transformation job succeeded"
        );
        result
    }

    async fn learn(
        &self,
        request: &JobRequest,
        job_id: &JobId,
        analysis: &AnalysisReport,
        program: &CandidateProgram,
        report: &ValidationReport,
    ) -> Option<PatternId> {
        if !self.config.optimization.enable_learning {
            return None;
        }
        let store = self.patterns.as_ref()?;

        let mut metadata = IndexMap::new();
        metadata.insert(
            "source_file".to_string(),
            JsonValue::String(request.source.display().to_string()),
        );
        metadata.insert(
            "ground_truth_file".to_string(),
            JsonValue::String(request.reference.display().to_string()),
        );
        metadata.insert("job_id".to_string(), JsonValue::String(job_id.to_string()));

        match store
            .store(analysis.characteristics(), program, report, metadata)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to save pattern");
                None
            }
        }
    }
}
