//! # sheetwise-cli
//!
//! Command-line interface for sheetwise.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use sheetwise_core::{Config, ExportFormat};
use sheetwise_patterns::PatternStore;
use sheetwise_pipeline::{JobRequest, JobResult, Pipeline};
use sheetwise_sandbox::CancelToken;
use sheetwise_validator::{validate, Mismatch, ValidationOptions, ValidationReport};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Mismatch lines printed for a failed validation.
const MISMATCH_SAMPLE: usize = 10;

/// sheetwise - reshape irregular spreadsheets to match a reference dataset
#[derive(Parser)]
#[command(name = "sheetwise")]
#[command(author, version, about = "Oracle-driven spreadsheet normalization", long_about = None)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true, default_value = "sheetwise.yaml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transform a source workbook until it matches the reference
    Run(RunArgs),

    /// Show the sheets of a workbook and their first rows
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Rows to show per sheet
        #[arg(short, long, default_value_t = 10)]
        rows: usize,
    },

    /// Compare a result file with a reference file
    Validate {
        #[arg(value_name = "RESULT")]
        result: PathBuf,

        #[arg(value_name = "REFERENCE")]
        reference: PathBuf,

        /// Minimum accuracy for a pass
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored patterns
    Patterns,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Irregular source workbook
    #[arg(short, long)]
    source: PathBuf,

    /// Reference (ground-truth) dataset
    #[arg(short, long)]
    reference: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Source sheet (defaults to the first)
    #[arg(long)]
    sheet: Option<String>,

    /// Consult the pattern cache before generating
    #[arg(long)]
    check_library: bool,

    /// Override optimization.max_iterations
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Override validation.accuracy_threshold
    #[arg(long)]
    threshold: Option<f64>,

    /// Export formats (csv, json, xlsx); repeatable
    #[arg(short, long = "format", value_name = "FORMAT")]
    formats: Vec<ExportFormat>,

    /// Print the job result as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;
    init_logging(&config, cli.verbose);

    match cli.command {
        Command::Run(args) => run(config, args).await,
        Command::Inspect { file, rows } => inspect(&file, rows),
        Command::Validate {
            result,
            reference,
            threshold,
            json,
        } => validate_files(&config, &result, &reference, threshold, json),
        Command::Patterns => list_patterns(&config).await,
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let default = if verbose { "debug" } else { config.logging.level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Apply command-line overrides and re-check the result.
fn apply_overrides(mut config: Config, args: &RunArgs) -> Result<Config> {
    if let Some(max_iterations) = args.max_iterations {
        config.optimization.max_iterations = max_iterations;
    }
    if let Some(threshold) = args.threshold {
        config.validation.accuracy_threshold = threshold;
    }
    if !args.formats.is_empty() {
        config.output.formats.clone_from(&args.formats);
    }
    config.validate().context("Invalid command-line override")?;
    Ok(config)
}

async fn run(config: Config, args: RunArgs) -> Result<ExitCode> {
    let config = apply_overrides(config, &args)?;
    for path in [&args.source, &args.reference] {
        if !path.exists() {
            bail!("File not found: {}", path.display());
        }
    }

    let pipeline = Pipeline::from_config(config)
        .await
        .context("Failed to initialize pipeline")?;

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling job");
            trigger.cancel();
        }
    });

    let request = JobRequest {
        source: args.source,
        reference: args.reference,
        output_dir: args.output,
        sheet: args.sheet,
        check_library: args.check_library,
    };
    let result = pipeline.run(&request, &cancel).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_job_result(&result));
    }
    Ok(exit_code(result.success))
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn inspect(path: &Path, rows: usize) -> Result<ExitCode> {
    let info = sheetwise_sheet::workbook_info(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    println!("{} {}", "Workbook:".cyan().bold(), info.path);

    for sheet in &info.sheets {
        println!();
        println!(
            "{} {} ({} rows x {} columns)",
            "Sheet:".cyan().bold(),
            sheet.name,
            sheet.rows,
            sheet.columns
        );
        let preview = sheetwise_sheet::read_preview(path, Some(&sheet.name), rows)
            .with_context(|| format!("Failed to read sheet '{}'", sheet.name))?;
        print!("{}", preview.to_text(24));
    }
    Ok(ExitCode::SUCCESS)
}

fn validate_files(
    config: &Config,
    result: &Path,
    reference: &Path,
    threshold: Option<f64>,
    json: bool,
) -> Result<ExitCode> {
    let mut options = ValidationOptions::from(&config.validation);
    if let Some(threshold) = threshold {
        if !(0.0..=1.0).contains(&threshold) {
            bail!("--threshold must be within [0, 1], got {threshold}");
        }
        options.accuracy_threshold = threshold;
    }

    let actual = sheetwise_sheet::read_table(result, None)
        .with_context(|| format!("Failed to read {}", result.display()))?;
    let expected = sheetwise_sheet::read_table(reference, None)
        .with_context(|| format!("Failed to read {}", reference.display()))?;
    let report = validate(&actual, &expected, &options);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(exit_code(report.passed))
}

async fn list_patterns(config: &Config) -> Result<ExitCode> {
    let store = PatternStore::open(&config.patterns.dir)
        .await
        .with_context(|| format!("Failed to open pattern store {}", config.patterns.dir.display()))?;
    let patterns = store.list().await.context("Failed to list patterns")?;
    info!(count = patterns.len(), "Listed patterns");

    if patterns.is_empty() {
        println!("(no patterns in {})", config.patterns.dir.display());
        return Ok(ExitCode::SUCCESS);
    }
    for pattern in &patterns {
        println!(
            "{}  {:<32} accuracy {:>6.2}%  used {:>3}x  {}",
            pattern.pattern_id.to_string().yellow(),
            pattern.source_characteristics.signature().to_string(),
            pattern.validation_accuracy * 100.0,
            pattern.usage_count,
            pattern.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn render_job_result(result: &JobResult) -> String {
    let mut out = String::new();
    let status = if result.success {
        "SUCCESS".green().bold()
    } else {
        "FAILED".red().bold()
    };
    let _ = writeln!(out, "{status} job {}", result.job_id);
    let _ = writeln!(out, "Iterations: {}", result.iterations);

    if let Some(report) = &result.final_validation_report {
        out.push_str(&render_report(report));
    }
    if let Some(error) = &result.error {
        let _ = writeln!(out, "{} {error}", "Error:".red().bold());
    }
    if let Some(hit) = &result.cache_hit {
        let _ = writeln!(out, "Cache hit: {hit}");
    }
    if let Some(id) = &result.cache_pattern_id {
        let _ = writeln!(out, "Saved pattern: {id}");
    }
    for file in &result.exported_files {
        let _ = writeln!(out, "Exported: {}", file.display());
    }
    if let Some(dir) = &result.artifacts_dir {
        let _ = writeln!(out, "Artifacts: {}", dir.display());
    }
    out
}

fn render_report(report: &ValidationReport) -> String {
    let mut out = String::new();
    let summary = if report.passed {
        report.summary.green()
    } else {
        report.summary.red()
    };
    let _ = writeln!(out, "Validation: {summary}");
    let _ = writeln!(
        out,
        "Rows: {} expected, {} actual",
        report.rows_expected, report.rows_actual
    );
    for error in &report.schema_errors {
        let _ = writeln!(out, "  {error}");
    }
    if !report.mismatches.is_empty() {
        let _ = writeln!(out, "Mismatches (first {}):", MISMATCH_SAMPLE.min(report.mismatches.len()));
        for mismatch in report.mismatches.iter().take(MISMATCH_SAMPLE) {
            let _ = writeln!(out, "  {}", describe_mismatch(mismatch));
        }
    }
    out
}

fn describe_mismatch(mismatch: &Mismatch) -> String {
    let mut line = format!(
        "row {}, column '{}': expected {:?}, got {:?}",
        mismatch.row_index,
        mismatch.column_name,
        mismatch.expected_value.to_string(),
        mismatch.actual_value.to_string()
    );
    if let Some(diff) = mismatch.numeric_difference {
        let _ = write!(line, " (diff {diff})");
    }
    line
}
