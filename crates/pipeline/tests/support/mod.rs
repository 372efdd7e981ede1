//! Test doubles shared by the pipeline integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use sheetwise_core::{CandidateProgram, SandboxConfig};
use sheetwise_oracle::{Oracle, OracleError, Result as OracleResult};
use sheetwise_pipeline::{AnalysisReport, PromptBuilder, TargetLanguage};
use sheetwise_sandbox::{CancelToken, ExecutionOutcome, Executor, Sandbox};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Replies to oracle calls in order and records every prompt.
#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<OracleResult<String>>>,
    prompts: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    pub fn reply_json(self, value: JsonValue) -> Self {
        self.reply(format!("```json\n{value}\n```"))
    }

    pub fn reply_code(self, code: &str) -> Self {
        self.reply(format!("Here is the program:\n```sh\n{code}\n```"))
    }

    pub fn fail(self, error: OracleError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    /// Structure, semantic and planning answers for a tabular sales sheet.
    pub fn with_analysis(self) -> Self {
        self.reply_json(json!({"layout_type": "tabular", "confidence_score": 0.9}))
            .reply_json(json!({"fact_type": "sales", "confidence_score": 0.8}))
            .reply_json(json!({"complexity_estimate": "low", "confidence_score": 0.7}))
    }

    pub fn prompts(&self) -> Vec<(String, Option<String>)> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate(&self, prompt: &str, system: Option<&str>) -> OracleResult<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), system.map(str::to_string)));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Transport("script exhausted".into())))
    }
}

/// The `sh` sandbox, counting invocations.
pub struct CountingExecutor {
    inner: Sandbox,
    calls: AtomicU32,
}

impl CountingExecutor {
    pub fn new() -> Self {
        Self {
            inner: Sandbox::new(sh_sandbox()).expect("sandbox"),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for CountingExecutor {
    async fn execute(
        &self,
        program: &CandidateProgram,
        source: &Path,
        output: &Path,
        cancel: &CancelToken,
    ) -> sheetwise_sandbox::Result<ExecutionOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(program, source, output, cancel).await
    }
}

pub fn sh_sandbox() -> SandboxConfig {
    SandboxConfig {
        command: "sh".to_string(),
        extension: "sh".to_string(),
        timeout_secs: 20,
        ..SandboxConfig::default()
    }
}

pub fn prompts() -> PromptBuilder {
    PromptBuilder::new(TargetLanguage::Shell, "transform", 20)
}

pub fn analysis(layout: &str, fact: &str) -> AnalysisReport {
    let object = |v: JsonValue| v.as_object().cloned().expect("object");
    AnalysisReport::new(
        object(json!({"layout_type": layout, "analyzed_file": "source.csv"})),
        object(json!({"fact_type": fact})),
        object(json!({"complexity_estimate": "low", "ground_truth_file": "reference.csv"})),
    )
}

pub const REFERENCE_CSV: &str = "region,units\nNorth,3\nSouth,5\n";
pub const SOURCE_CSV: &str = "Sales report,\nRegion,Units\nNorth,3\nSouth,5\nTotal,8\n";

/// Writes its output file and returns the expected table.
pub const PASSING: &str = r#"transform() {
    printf 'region,units\nNorth,3\nSouth,5\n' > "$2"
    printf '{"columns":["region","units"],"rows":[["North",3],["South",5]]}'
}"#;

/// Right schema, one wrong value.
pub const OFF_BY_ONE: &str = r#"transform() {
    printf '{"columns":["region","units"],"rows":[["North",3],["South",4]]}'
}"#;

/// Columns in the wrong order.
pub const SWAPPED: &str = r#"transform() {
    printf '{"columns":["units","region"],"rows":[[3,"North"],[5,"South"]]}'
}"#;

/// Defines the wrong function.
pub const NO_ENTRY_POINT: &str = r#"convert() {
    printf '{"columns":[],"rows":[]}'
}"#;
