//! The three analysis stages run before any code is written.
//!
//! Each stage is one structured oracle call. The returned objects are kept
//! as opaque JSON; only a handful of well-known keys are lifted into the
//! [`AnalysisSummary`].

use crate::prompts::PromptBuilder;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use sheetwise_core::{AnalysisConfig, Table};
use sheetwise_oracle::{Oracle, OracleError};
use sheetwise_patterns::{Signature, SourceCharacteristics};
use sheetwise_sheet::SheetError;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub type JsonMap = Map<String, JsonValue>;

const STRUCTURE_SYSTEM: &str =
    "You are an expert spreadsheet data analyst. Provide detailed, accurate structural analysis.";
const SEMANTIC_SYSTEM: &str =
    "You are an expert business data analyst. Extract semantic meaning and business context.";
const PLANNING_SYSTEM: &str =
    "You are an expert data transformation architect. Design precise transformation plans.";

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Failed to read input: {0}")]
    Sheet(#[from] SheetError),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Per-stage self-reported confidence, clamped to [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ConfidenceScores {
    pub structure: Option<f64>,
    pub semantic: Option<f64>,
    pub transformation: Option<f64>,
}

/// Fields lifted out of the stage reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub source_file: Option<String>,
    pub target_file: Option<String>,
    pub layout_type: Option<String>,
    pub fact_type: Option<String>,
    pub complexity: Option<String>,
    pub confidence_scores: ConfidenceScores,
}

/// Everything the oracle said about a job's inputs. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    created_at: DateTime<Utc>,
    structure: JsonMap,
    semantic: JsonMap,
    transformation_plan: JsonMap,
    summary: AnalysisSummary,
}

impl AnalysisReport {
    #[must_use]
    pub fn new(structure: JsonMap, semantic: JsonMap, transformation_plan: JsonMap) -> Self {
        let summary = AnalysisSummary {
            source_file: text_field(&structure, "analyzed_file"),
            target_file: text_field(&transformation_plan, "ground_truth_file"),
            layout_type: text_field(&structure, "layout_type"),
            fact_type: text_field(&semantic, "fact_type"),
            complexity: text_field(&transformation_plan, "complexity_estimate"),
            confidence_scores: ConfidenceScores {
                structure: confidence(&structure),
                semantic: confidence(&semantic),
                transformation: confidence(&transformation_plan),
            },
        };
        Self {
            created_at: Utc::now(),
            structure,
            semantic,
            transformation_plan,
            summary,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn structure(&self) -> &JsonMap {
        &self.structure
    }

    pub fn semantic(&self) -> &JsonMap {
        &self.semantic
    }

    pub fn transformation_plan(&self) -> &JsonMap {
        &self.transformation_plan
    }

    pub fn summary(&self) -> &AnalysisSummary {
        &self.summary
    }

    /// Pattern cache key for this job.
    pub fn signature(&self) -> Signature {
        self.characteristics().signature()
    }

    pub fn characteristics(&self) -> SourceCharacteristics {
        SourceCharacteristics {
            layout_type: self.summary.layout_type.clone(),
            fact_type: self.summary.fact_type.clone(),
            complexity: self.summary.complexity.clone(),
        }
    }
}

/// Strings pass through; other scalars and compound values are rendered as
/// JSON text. Null and missing keys are absent.
fn text_field(map: &JsonMap, key: &str) -> Option<String> {
    match map.get(key)? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn confidence(map: &JsonMap) -> Option<f64> {
    map.get("confidence_score")
        .and_then(JsonValue::as_f64)
        .map(|score| score.clamp(0.0, 1.0))
}

fn into_object(stage: &str, value: JsonValue) -> std::result::Result<JsonMap, OracleError> {
    match value {
        JsonValue::Object(map) => Ok(map),
        other => Err(OracleError::UnexpectedShape(format!(
            "{stage} analysis must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Runs the structure, semantic and planning stages.
pub struct Analyzer {
    oracle: Arc<dyn Oracle>,
    prompts: PromptBuilder,
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(oracle: Arc<dyn Oracle>, prompts: PromptBuilder, config: AnalysisConfig) -> Self {
        Self {
            oracle,
            prompts,
            config,
        }
    }

    /// Stage 1: layout of the raw sheet.
    pub async fn analyze_structure(&self, source: &Path, sheet: Option<&str>) -> Result<JsonMap> {
        let info = sheetwise_sheet::workbook_info(source)?;
        let preview = sheetwise_sheet::read_preview(source, sheet, self.config.sample_rows)?;
        info!(
            file = %source.display(),
            sheet = preview.name(),
            rows = preview.row_count(),
            "Analyzing structure"
        );

        let prompt = self
            .prompts
            .structure_prompt(&info, &preview, self.config.sample_rows);
        let value = self
            .oracle
            .generate_structured(&prompt, Some(STRUCTURE_SYSTEM))
            .await?;

        let mut structure = into_object("structure", value)?;
        structure.insert(
            "analyzed_file".to_string(),
            JsonValue::String(source.display().to_string()),
        );
        structure.insert(
            "analyzed_sheet".to_string(),
            JsonValue::String(preview.name().to_string()),
        );
        structure.insert("sample_rows".to_string(), self.config.sample_rows.into());
        debug!(layout_type = ?structure.get("layout_type"), "Structure analysis complete");
        Ok(structure)
    }

    /// Stage 2: business meaning, given the structure report.
    pub async fn analyze_semantics(&self, source: &Path, structure: &JsonMap) -> Result<JsonMap> {
        let sheet = structure.get("analyzed_sheet").and_then(JsonValue::as_str);
        let preview = sheetwise_sheet::read_preview(source, sheet, self.config.semantic_rows)?;
        info!(rows = preview.row_count(), "Analyzing semantics");

        let prompt = self.prompts.semantic_prompt(structure, &preview);
        let value = self
            .oracle
            .generate_structured(&prompt, Some(SEMANTIC_SYSTEM))
            .await?;

        let semantic = into_object("semantic", value)?;
        debug!(fact_type = ?semantic.get("fact_type"), "Semantic analysis complete");
        Ok(semantic)
    }

    /// Stage 3: how to get from the source to the reference layout.
    pub async fn plan_transformation(
        &self,
        structure: &JsonMap,
        semantic: &JsonMap,
        reference_path: &Path,
        reference: &Table,
    ) -> Result<JsonMap> {
        info!(
            reference = %reference_path.display(),
            columns = reference.col_count(),
            "Planning transformation"
        );
        let sample = reference.head(self.config.reference_sample_rows);
        let prompt = self
            .prompts
            .planning_prompt(structure, semantic, reference.columns(), &sample);
        let value = self
            .oracle
            .generate_structured(&prompt, Some(PLANNING_SYSTEM))
            .await?;

        let mut plan = into_object("transformation", value)?;
        plan.insert(
            "ground_truth_file".to_string(),
            JsonValue::String(reference_path.display().to_string()),
        );
        plan.insert(
            "target_columns".to_string(),
            JsonValue::from(reference.columns().to_vec()),
        );
        info!(complexity = ?plan.get("complexity_estimate"), "Transformation plan ready");
        Ok(plan)
    }

    /// All three stages in order.
    pub async fn analyze(
        &self,
        source: &Path,
        sheet: Option<&str>,
        reference_path: &Path,
        reference: &Table,
    ) -> Result<AnalysisReport> {
        let structure = self.analyze_structure(source, sheet).await?;
        let semantic = self.analyze_semantics(source, &structure).await?;
        let plan = self
            .plan_transformation(&structure, &semantic, reference_path, reference)
            .await?;
        Ok(AnalysisReport::new(structure, semantic, plan))
    }
}
