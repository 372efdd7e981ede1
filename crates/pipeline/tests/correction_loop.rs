mod support;

use indexmap::IndexMap;
use sheetwise_core::{CachePolicy, CandidateProgram, JobId, ProgramOrigin, Table};
use sheetwise_oracle::OracleError;
use sheetwise_patterns::{PatternStore, SourceCharacteristics};
use sheetwise_pipeline::{
    AnalysisReport, CodeAuthor, CorrectionLoop, FailureKind, GenerationContext, LoopInputs,
    LoopOptions, LoopOutcome, LoopStatus,
};
use sheetwise_sandbox::CancelToken;
use sheetwise_sheet::Grid;
use sheetwise_validator::{validate, ValidationOptions};
use std::sync::Arc;
use support::{
    analysis, prompts, CountingExecutor, ScriptedOracle, NO_ENTRY_POINT, OFF_BY_ONE, PASSING,
    SWAPPED,
};

struct Harness {
    dir: tempfile::TempDir,
    job_id: JobId,
    analysis: AnalysisReport,
    preview: Grid,
    reference: Table,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("source.csv"), support::SOURCE_CSV).expect("source");
        std::fs::write(dir.path().join("reference.csv"), support::REFERENCE_CSV).expect("reference");
        let reference =
            sheetwise_sheet::read_table(dir.path().join("reference.csv"), None).expect("reference");
        Self {
            dir,
            job_id: JobId::generate(),
            analysis: analysis("tabular", "sales"),
            preview: Grid::new("source", Vec::new()),
            reference,
        }
    }

    async fn run(
        &self,
        correction: &CorrectionLoop,
        check_library: bool,
        cancel: &CancelToken,
    ) -> LoopOutcome {
        let source = self.dir.path().join("source.csv");
        let inputs = LoopInputs {
            job_id: &self.job_id,
            context: GenerationContext {
                analysis: &self.analysis,
                source_preview: &self.preview,
                reference: &self.reference,
            },
            source: &source,
            output_dir: self.dir.path(),
            check_library,
        };
        correction.run(&inputs, cancel).await
    }
}

fn options(max_iterations: u32, cache_policy: CachePolicy) -> LoopOptions {
    LoopOptions {
        max_iterations,
        cache_policy,
        validation: ValidationOptions::default(),
    }
}

fn correction(
    oracle: &Arc<ScriptedOracle>,
    executor: &Arc<CountingExecutor>,
    options: LoopOptions,
) -> CorrectionLoop {
    let author = Arc::new(CodeAuthor::new(oracle.clone(), prompts()));
    CorrectionLoop::new(executor.clone(), author, options)
}

#[tokio::test]
async fn test_first_candidate_passes() {
    let harness = Harness::new();
    let oracle = Arc::new(ScriptedOracle::new().reply_code(PASSING));
    let executor = Arc::new(CountingExecutor::new());

    let outcome = harness
        .run(
            &correction(&oracle, &executor, options(5, CachePolicy::Advisory)),
            false,
            &CancelToken::new(),
        )
        .await;

    let LoopStatus::Succeeded { table, output } = &outcome.status else {
        panic!("expected success, got {:?}", outcome.status);
    };
    assert_eq!(table, &harness.reference);
    assert!(output.ends_with(format!("cleaned_{}_iter1.csv", harness.job_id)));
    assert_eq!(outcome.iterations, 1);
    assert_eq!(executor.calls(), 1);
    assert!(outcome.last_report.expect("report").passed);
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test]
async fn test_contract_violation_regenerates() {
    let harness = Harness::new();
    let oracle = Arc::new(
        ScriptedOracle::new()
            .reply_code(NO_ENTRY_POINT)
            .reply_code(PASSING),
    );
    let executor = Arc::new(CountingExecutor::new());

    let outcome = harness
        .run(
            &correction(&oracle, &executor, options(5, CachePolicy::Advisory)),
            false,
            &CancelToken::new(),
        )
        .await;

    assert!(matches!(outcome.status, LoopStatus::Succeeded { .. }));
    assert_eq!(outcome.iterations, 2);
    assert_eq!(executor.calls(), 2);

    let program = outcome.last_program.expect("program");
    assert_eq!(program.generation(), 2);
    assert_eq!(program.predecessor(), Some(1));

    // the execution error reached the regeneration prompt
    let (regeneration, _) = &oracle.prompts()[1];
    assert!(regeneration.contains("Failure: RuntimeError"));
    assert!(regeneration.contains("transform"));
    assert!(regeneration.contains("convert()"));
}

#[tokio::test]
async fn test_value_mismatch_feedback_lists_cells() {
    let harness = Harness::new();
    let oracle = Arc::new(
        ScriptedOracle::new()
            .reply_code(OFF_BY_ONE)
            .reply_code(PASSING),
    );
    let executor = Arc::new(CountingExecutor::new());

    let outcome = harness
        .run(
            &correction(&oracle, &executor, options(5, CachePolicy::Advisory)),
            false,
            &CancelToken::new(),
        )
        .await;

    assert!(matches!(outcome.status, LoopStatus::Succeeded { .. }));
    let (regeneration, _) = &oracle.prompts()[1];
    assert!(regeneration.contains("Row 1, Column 'units': Expected 5, Got 4"));
}

#[tokio::test]
async fn test_budget_bounds_executor_calls() {
    let harness = Harness::new();
    let oracle = Arc::new(
        ScriptedOracle::new()
            .reply_code(OFF_BY_ONE)
            .reply_code(OFF_BY_ONE)
            .reply_code(OFF_BY_ONE)
            .reply_code(PASSING),
    );
    let executor = Arc::new(CountingExecutor::new());

    let outcome = harness
        .run(
            &correction(&oracle, &executor, options(3, CachePolicy::Advisory)),
            false,
            &CancelToken::new(),
        )
        .await;

    assert_eq!(executor.calls(), 3);
    assert_eq!(outcome.iterations, 3);
    // generate + two regenerations; the passing reply is never requested
    assert_eq!(oracle.calls(), 3);

    let LoopStatus::Failed(error) = &outcome.status else {
        panic!("expected failure");
    };
    assert_eq!(error.kind, FailureKind::BudgetExhausted);
    assert_eq!(error.last_failure, Some(FailureKind::ValueMismatch));
    assert!(error.message.contains("accuracy"));

    let report = outcome.last_report.expect("last report kept");
    assert!(!report.passed);
    assert_eq!(report.mismatches.len(), 1);
}

#[tokio::test]
async fn test_budget_exhausted_after_execution_error_reports_error() {
    let harness = Harness::new();
    let oracle = Arc::new(ScriptedOracle::new().reply_code(NO_ENTRY_POINT));
    let executor = Arc::new(CountingExecutor::new());

    let outcome = harness
        .run(
            &correction(&oracle, &executor, options(1, CachePolicy::Advisory)),
            false,
            &CancelToken::new(),
        )
        .await;

    assert_eq!(executor.calls(), 1);
    let LoopStatus::Failed(error) = &outcome.status else {
        panic!("expected failure");
    };
    assert_eq!(error.kind, FailureKind::BudgetExhausted);
    assert_eq!(error.last_failure, Some(FailureKind::RuntimeError));
    assert!(error.message.contains("transform"));
    assert!(outcome.last_report.is_none());
}

#[tokio::test]
async fn test_execution_failure_drops_report_of_earlier_program() {
    let harness = Harness::new();
    let oracle = Arc::new(
        ScriptedOracle::new()
            .reply_code(OFF_BY_ONE)
            .reply_code(NO_ENTRY_POINT),
    );
    let executor = Arc::new(CountingExecutor::new());

    let outcome = harness
        .run(
            &correction(&oracle, &executor, options(2, CachePolicy::Advisory)),
            false,
            &CancelToken::new(),
        )
        .await;

    let LoopStatus::Failed(error) = &outcome.status else {
        panic!("expected failure");
    };
    assert_eq!(error.kind, FailureKind::BudgetExhausted);
    assert_eq!(error.last_failure, Some(FailureKind::RuntimeError));
    assert_eq!(outcome.last_program.expect("program").generation(), 2);
    // iteration 1 was validated, iteration 2 never was
    assert!(outcome.last_report.is_none());
}

#[tokio::test]
async fn test_schema_mismatch_is_recoverable() {
    let harness = Harness::new();
    let oracle = Arc::new(ScriptedOracle::new().reply_code(SWAPPED).reply_code(PASSING));
    let executor = Arc::new(CountingExecutor::new());

    let outcome = harness
        .run(
            &correction(&oracle, &executor, options(2, CachePolicy::Advisory)),
            false,
            &CancelToken::new(),
        )
        .await;

    assert!(matches!(outcome.status, LoopStatus::Succeeded { .. }));
    let (regeneration, _) = &oracle.prompts()[1];
    assert!(regeneration.contains("Failure: SchemaMismatch"));
    assert!(regeneration.contains("Column mismatch"));
}

#[tokio::test]
async fn test_oracle_error_aborts_without_retry() {
    let harness = Harness::new();
    let oracle = Arc::new(
        ScriptedOracle::new()
            .reply_code(OFF_BY_ONE)
            .fail(OracleError::Status {
                status: 529,
                body: "overloaded".into(),
            })
            .reply_code(PASSING),
    );
    let executor = Arc::new(CountingExecutor::new());

    let outcome = harness
        .run(
            &correction(&oracle, &executor, options(5, CachePolicy::Advisory)),
            false,
            &CancelToken::new(),
        )
        .await;

    let LoopStatus::Failed(error) = &outcome.status else {
        panic!("expected failure");
    };
    assert_eq!(error.kind, FailureKind::OracleError);
    assert!(error.message.contains("529"));
    assert_eq!(executor.calls(), 1);
    assert_eq!(oracle.calls(), 2);
}

#[tokio::test]
async fn test_generation_failure_never_executes() {
    let harness = Harness::new();
    let oracle = Arc::new(ScriptedOracle::new().reply("```sh\n```"));
    let executor = Arc::new(CountingExecutor::new());

    let outcome = harness
        .run(
            &correction(&oracle, &executor, options(5, CachePolicy::Advisory)),
            false,
            &CancelToken::new(),
        )
        .await;

    let LoopStatus::Failed(error) = &outcome.status else {
        panic!("expected failure");
    };
    assert_eq!(error.kind, FailureKind::OracleError);
    assert_eq!(outcome.iterations, 0);
    assert_eq!(executor.calls(), 0);
}

async fn seeded_store(dir: &std::path::Path) -> Arc<PatternStore> {
    let store = PatternStore::open(dir.join("patterns")).await.expect("open");
    let table = Table::from_data(vec!["a"], vec![vec![1]]).expect("table");
    let report = validate(&table, &table, &ValidationOptions::default());
    store
        .store(
            SourceCharacteristics {
                layout_type: Some("tabular".into()),
                fact_type: Some("sales".into()),
                complexity: None,
            },
            &CandidateProgram::generated(PASSING),
            &report,
            IndexMap::new(),
        )
        .await
        .expect("store");
    Arc::new(store)
}

#[tokio::test]
async fn test_reuse_policy_executes_cached_program() {
    let harness = Harness::new();
    let store = seeded_store(harness.dir.path()).await;
    let oracle = Arc::new(ScriptedOracle::new());
    let executor = Arc::new(CountingExecutor::new());

    let outcome = harness
        .run(
            &correction(&oracle, &executor, options(5, CachePolicy::Reuse))
                .with_patterns(store.clone()),
            true,
            &CancelToken::new(),
        )
        .await;

    assert!(matches!(outcome.status, LoopStatus::Succeeded { .. }));
    assert_eq!(oracle.calls(), 0);
    assert_eq!(outcome.iterations, 1);

    let hit = outcome.cache_hit.expect("hit");
    let program = outcome.last_program.expect("program");
    assert_eq!(
        program.origin(),
        &ProgramOrigin::Cached {
            pattern_id: hit.clone()
        }
    );
    let pattern = store.get(&hit).await.expect("get").expect("present");
    assert_eq!(pattern.usage_count, 1);
}

#[tokio::test]
async fn test_advisory_policy_still_generates() {
    let harness = Harness::new();
    let store = seeded_store(harness.dir.path()).await;
    let oracle = Arc::new(ScriptedOracle::new().reply_code(PASSING));
    let executor = Arc::new(CountingExecutor::new());

    let outcome = harness
        .run(
            &correction(&oracle, &executor, options(5, CachePolicy::Advisory))
                .with_patterns(store),
            true,
            &CancelToken::new(),
        )
        .await;

    assert!(matches!(outcome.status, LoopStatus::Succeeded { .. }));
    assert!(outcome.cache_hit.is_some());
    assert_eq!(oracle.calls(), 1);
    assert_eq!(
        outcome.last_program.expect("program").origin(),
        &ProgramOrigin::Generated
    );
}

#[tokio::test]
async fn test_cache_miss_falls_through_to_generation() {
    let harness = Harness::new();
    let store = Arc::new(
        PatternStore::open(harness.dir.path().join("empty"))
            .await
            .expect("open"),
    );
    let oracle = Arc::new(ScriptedOracle::new().reply_code(PASSING));
    let executor = Arc::new(CountingExecutor::new());

    let outcome = harness
        .run(
            &correction(&oracle, &executor, options(5, CachePolicy::Reuse)).with_patterns(store),
            true,
            &CancelToken::new(),
        )
        .await;

    assert!(matches!(outcome.status, LoopStatus::Succeeded { .. }));
    assert!(outcome.cache_hit.is_none());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let harness = Harness::new();
    let oracle = Arc::new(ScriptedOracle::new().reply_code(PASSING));
    let executor = Arc::new(CountingExecutor::new());
    let cancel = CancelToken::new();
    cancel.cancel();

    let outcome = harness
        .run(
            &correction(&oracle, &executor, options(5, CachePolicy::Advisory)),
            false,
            &cancel,
        )
        .await;

    let LoopStatus::Failed(error) = &outcome.status else {
        panic!("expected failure");
    };
    assert_eq!(error.kind, FailureKind::Cancelled);
    assert_eq!(executor.calls(), 0);
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn test_cancel_during_execution() {
    let harness = Harness::new();
    let oracle = Arc::new(ScriptedOracle::new().reply_code("transform() { sleep 30; }"));
    let executor = Arc::new(CountingExecutor::new());
    let cancel = CancelToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let outcome = harness
        .run(
            &correction(&oracle, &executor, options(5, CachePolicy::Advisory)),
            false,
            &cancel,
        )
        .await;

    let LoopStatus::Failed(error) = &outcome.status else {
        panic!("expected failure");
    };
    assert_eq!(error.kind, FailureKind::Cancelled);
    assert_eq!(executor.calls(), 1);
}
