//! The bounded execute / validate / regenerate loop.
//!
//! States run strictly one after another. `iteration` counts executor
//! invocations and is bumped on entry to `Execute`, so `max_iterations`
//! bounds execution attempts, not regenerations. Cancellation is checked
//! before every transition.

use crate::artifacts::ArtifactStore;
use crate::author::CodeAuthor;
use crate::feedback::Feedback;
use crate::job::{FailureKind, JobError};
use crate::prompts::GenerationContext;
use sheetwise_core::{CachePolicy, CandidateProgram, JobId, PatternId, Table};
use sheetwise_patterns::PatternStore;
use sheetwise_sandbox::{CancelToken, ExecutionOutcome, Executor, SandboxError};
use sheetwise_validator::{validate, ValidationOptions, ValidationReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Loop limits and cache behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopOptions {
    pub max_iterations: u32,
    pub cache_policy: CachePolicy,
    pub validation: ValidationOptions,
}

/// Per-job inputs.
#[derive(Debug, Clone, Copy)]
pub struct LoopInputs<'a> {
    pub job_id: &'a JobId,
    pub context: GenerationContext<'a>,
    /// Workbook handed to every candidate.
    pub source: &'a Path,
    /// Root of `cleaned_data/`.
    pub output_dir: &'a Path,
    /// Start in `CacheCheck`.
    pub check_library: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopStatus {
    Succeeded {
        table: Table,
        /// Output destination given to the passing program.
        output: PathBuf,
    },
    Failed(JobError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub status: LoopStatus,
    pub iterations: u32,
    pub last_program: Option<CandidateProgram>,
    pub last_report: Option<ValidationReport>,
    pub cache_hit: Option<PatternId>,
}

enum State {
    CacheCheck,
    Execute(CandidateProgram),
    Validate {
        program: CandidateProgram,
        table: Table,
        output: PathBuf,
    },
    Regenerate(CandidateProgram, Feedback),
    Succeeded {
        table: Table,
        output: PathBuf,
    },
    Failed(JobError),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::CacheCheck => "CacheCheck",
            State::Execute(_) => "Execute",
            State::Validate { .. } => "Validate",
            State::Regenerate(..) => "Regenerate",
            State::Succeeded { .. } => "Succeeded",
            State::Failed(_) => "Failed",
        }
    }
}

pub struct CorrectionLoop {
    executor: Arc<dyn Executor>,
    author: Arc<CodeAuthor>,
    patterns: Option<Arc<PatternStore>>,
    artifacts: ArtifactStore,
    options: LoopOptions,
}

impl CorrectionLoop {
    pub fn new(executor: Arc<dyn Executor>, author: Arc<CodeAuthor>, options: LoopOptions) -> Self {
        Self {
            executor,
            author,
            patterns: None,
            artifacts: ArtifactStore::disabled(),
            options,
        }
    }

    #[must_use]
    pub fn with_patterns(mut self, patterns: Arc<PatternStore>) -> Self {
        self.patterns = Some(patterns);
        self
    }

    #[must_use]
    pub fn with_artifacts(mut self, artifacts: ArtifactStore) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub async fn run(&self, inputs: &LoopInputs<'_>, cancel: &CancelToken) -> LoopOutcome {
        let mut iteration = 0u32;
        let mut last_program = None;
        let mut last_report = None;
        let mut cache_hit = None;

        let mut state = if inputs.check_library && self.patterns.is_some() {
            State::CacheCheck
        } else if cancel.is_cancelled() {
            cancelled()
        } else {
            self.generate(&inputs.context).await
        };

        loop {
            info!(job_id = %inputs.job_id, iteration, state = state.name(), "Correction loop");
            state = match state {
                State::Succeeded { table, output } => {
                    return LoopOutcome {
                        status: LoopStatus::Succeeded { table, output },
                        iterations: iteration,
                        last_program,
                        last_report,
                        cache_hit,
                    };
                }
                State::Failed(error) => {
                    warn!(job_id = %inputs.job_id, iteration, error = %error, "Correction loop failed");
                    return LoopOutcome {
                        status: LoopStatus::Failed(error),
                        iterations: iteration,
                        last_program,
                        last_report,
                        cache_hit,
                    };
                }
                _ if cancel.is_cancelled() => cancelled(),
                State::CacheCheck => {
                    let (next, hit) = self.check_cache(inputs).await;
                    cache_hit = hit;
                    next
                }
                State::Execute(program) => {
                    iteration += 1;
                    self.artifacts.save_program(iteration, &program).await;
                    last_program = Some(program.clone());
                    // A report only ever describes `last_program`.
                    last_report = None;
                    self.execute(iteration, program, inputs, cancel).await
                }
                State::Validate {
                    program,
                    table,
                    output,
                } => {
                    let report = validate(&table, inputs.context.reference, &self.options.validation);
                    self.artifacts.save_validation(iteration, &report).await;
                    let passed = report.passed;
                    let feedback = Feedback::from_report(&report);
                    last_report = Some(report);
                    if passed {
                        State::Succeeded { table, output }
                    } else {
                        self.after_failure(iteration, program, feedback)
                    }
                }
                State::Regenerate(program, feedback) => {
                    match self.author.regenerate_code(&program, &feedback).await {
                        Ok(next) => State::Execute(next),
                        Err(e) => State::Failed(JobError::new(FailureKind::OracleError, e.to_string())),
                    }
                }
            };
        }
    }

    async fn generate(&self, context: &GenerationContext<'_>) -> State {
        match self.author.generate_code(context).await {
            Ok(program) => State::Execute(program),
            Err(e) => State::Failed(JobError::new(FailureKind::OracleError, e.to_string())),
        }
    }

    async fn check_cache(&self, inputs: &LoopInputs<'_>) -> (State, Option<PatternId>) {
        let signature = inputs.context.analysis.signature();
        let hit = match &self.patterns {
            Some(store) => store.lookup(&signature).await,
            None => None,
        };
        let Some(pattern) = hit else {
            info!(signature = %signature, "No cached pattern");
            return (self.generate(&inputs.context).await, None);
        };

        let id = pattern.pattern_id.clone();
        match self.options.cache_policy {
            CachePolicy::Reuse => {
                info!(pattern_id = %id, "Reusing cached program as first candidate");
                let program = CandidateProgram::cached(pattern.transformation_code, id.clone());
                (State::Execute(program), Some(id))
            }
            CachePolicy::Advisory => {
                info!(pattern_id = %id, "Similar pattern found, generating a fresh program");
                (self.generate(&inputs.context).await, Some(id))
            }
        }
    }

    async fn execute(
        &self,
        iteration: u32,
        program: CandidateProgram,
        inputs: &LoopInputs<'_>,
        cancel: &CancelToken,
    ) -> State {
        let output = iteration_output(inputs, iteration).await;
        let outcome = match self
            .executor
            .execute(&program, inputs.source, &output, cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(SandboxError::Cancelled) => return cancelled(),
            Err(e) => {
                warn!(iteration, error = %e, "Sandbox fault");
                let feedback = Feedback::from_error(FailureKind::RuntimeError, e.to_string());
                return self.after_failure(iteration, program, feedback);
            }
        };

        if !outcome.is_ok() {
            self.artifacts.save_execution(iteration, &outcome).await;
        }
        match outcome {
            ExecutionOutcome::Ok { table } => State::Validate {
                program,
                table,
                output,
            },
            ExecutionOutcome::Failed { kind, message } => {
                info!(iteration, kind = %kind, "Candidate failed to execute");
                self.after_failure(iteration, program, Feedback::from_execution(kind, message))
            }
        }
    }

    fn after_failure(&self, iteration: u32, program: CandidateProgram, feedback: Feedback) -> State {
        if iteration < self.options.max_iterations {
            State::Regenerate(program, feedback)
        } else {
            State::Failed(JobError::budget_exhausted(feedback.kind, feedback.summary()))
        }
    }
}

fn cancelled() -> State {
    State::Failed(JobError::new(FailureKind::Cancelled, "job cancelled"))
}

async fn iteration_output(inputs: &LoopInputs<'_>, iteration: u32) -> PathBuf {
    let dir = inputs.output_dir.join("cleaned_data");
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        warn!(dir = %dir.display(), error = %e, "Failed to create output directory");
    }
    dir.join(format!("cleaned_{}_iter{iteration}.csv", inputs.job_id))
}
