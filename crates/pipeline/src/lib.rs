//! # sheetwise-pipeline
//!
//! Turns an irregular spreadsheet into a table matching a reference dataset.
//!
//! A job runs three oracle analysis stages, asks the oracle for a
//! transformation program, then repeatedly executes, validates and
//! regenerates it until the output matches the reference or the iteration
//! budget runs out. Passing programs are exported and remembered in the
//! pattern cache.
//!
//! ## Example
//!
//! ```no_run
//! use sheetwise_core::Config;
//! use sheetwise_pipeline::{JobRequest, Pipeline};
//! use sheetwise_sandbox::CancelToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::from_config(Config::default()).await?;
//! let result = pipeline
//!     .run(
//!         &JobRequest {
//!             source: "sales.xlsx".into(),
//!             reference: "expected.csv".into(),
//!             output_dir: "output".into(),
//!             sheet: None,
//!             check_library: true,
//!         },
//!         &CancelToken::new(),
//!     )
//!     .await;
//! println!("success: {}", result.success);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
mod artifacts;
mod author;
pub mod correction;
mod feedback;
mod job;
mod pipeline;
pub mod prompts;

pub use analysis::{AnalysisReport, AnalysisSummary, Analyzer, ConfidenceScores};
pub use artifacts::ArtifactStore;
pub use author::CodeAuthor;
pub use correction::{CorrectionLoop, LoopInputs, LoopOptions, LoopOutcome, LoopStatus};
pub use feedback::Feedback;
pub use job::{FailureKind, JobError, JobResult};
pub use pipeline::{JobRequest, Pipeline, PipelineError};
pub use prompts::{GenerationContext, PromptBuilder, TargetLanguage};
