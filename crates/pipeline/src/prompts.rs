//! Prompt text for every oracle call.

use crate::analysis::{AnalysisReport, JsonMap};
use crate::feedback::{Feedback, MAX_EXAMPLES};
use sheetwise_core::{CandidateProgram, CellValue, SandboxConfig, Table};
use sheetwise_sheet::{Grid, WorkbookInfo};
use std::fmt::Write as _;

/// Widest cell rendered in a preview.
const CELL_WIDTH: usize = 40;

/// Language candidate programs are written in, picked by the sandbox's
/// file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetLanguage {
    Python,
    Shell,
}

impl TargetLanguage {
    #[must_use]
    pub fn from_extension(extension: &str) -> Self {
        match extension {
            "sh" => TargetLanguage::Shell,
            _ => TargetLanguage::Python,
        }
    }

    /// Code fence tag the oracle is asked to use.
    #[must_use]
    pub fn fence_tag(self) -> &'static str {
        match self {
            TargetLanguage::Python => "python",
            TargetLanguage::Shell => "sh",
        }
    }

    fn display_name(self) -> &'static str {
        match self {
            TargetLanguage::Python => "Python",
            TargetLanguage::Shell => "POSIX shell",
        }
    }

    fn calling_convention(self, entry_point: &str) -> String {
        match self {
            TargetLanguage::Python => format!(
                "Define `def {entry_point}(input_path, output_path)`. Read the source workbook \
                 from `input_path` (pandas with openpyxl is available), write the cleaned table \
                 to `output_path` as CSV, and return the cleaned table as a pandas DataFrame."
            ),
            TargetLanguage::Shell => format!(
                "Define a shell function `{entry_point}` called as `{entry_point} \"$input_path\" \
                 \"$output_path\"`. It may write the cleaned table to the output path, and must \
                 print the table to stdout as JSON: {{\"columns\": [...], \"rows\": [[...], ...]}}."
            ),
        }
    }
}

/// Inputs to the first code generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub analysis: &'a AnalysisReport,
    /// Headerless rows from the top of the source sheet.
    pub source_preview: &'a Grid,
    pub reference: &'a Table,
}

/// Renders prompts for one target language and entry point.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    language: TargetLanguage,
    entry_point: String,
    reference_sample_rows: usize,
}

impl PromptBuilder {
    pub fn new(
        language: TargetLanguage,
        entry_point: impl Into<String>,
        reference_sample_rows: usize,
    ) -> Self {
        Self {
            language,
            entry_point: entry_point.into(),
            reference_sample_rows,
        }
    }

    pub fn for_sandbox(config: &SandboxConfig, reference_sample_rows: usize) -> Self {
        Self::new(
            TargetLanguage::from_extension(&config.extension),
            config.entry_point.clone(),
            reference_sample_rows,
        )
    }

    pub fn language(&self) -> TargetLanguage {
        self.language
    }

    pub fn structure_prompt(&self, info: &WorkbookInfo, preview: &Grid, sample_rows: usize) -> String {
        format!(
            r#"Analyze the layout of this spreadsheet.

WORKBOOK:
{info}

SHEET: {sheet}
FIRST {sample_rows} ROWS (row index, then raw cell values, no header interpretation):
{preview}

Respond with a single JSON object with these keys:
- "layout_type": one of "tabular", "pivot", "crosstab", "multi_block", "hierarchical", "form"
- "header_rows": list of row indexes that hold headers
- "data_start_row": row index where data begins
- "blocks": list of distinct data regions, each with a description and row range
- "merged_or_spanning_headers": description of headers spanning several columns, if any
- "notes": anything irregular (subtotals, blank separator rows, notes in cells)
- "confidence_score": number between 0 and 1"#,
            info = pretty(info),
            sheet = preview.name(),
            preview = preview.to_text(CELL_WIDTH),
        )
    }

    pub fn semantic_prompt(&self, structure: &JsonMap, preview: &Grid) -> String {
        format!(
            r#"Given this structural analysis of a spreadsheet:
{structure}

And this data sample:
{preview}

Explain what the data means. Respond with a single JSON object with these keys:
- "fact_type": the kind of business fact recorded, e.g. "sales", "inventory", "budget"
- "dimensions": the descriptive attributes (region, product, period, ...)
- "measures": the numeric quantities and their units
- "time_dimension": how time is represented, if at all
- "entities": the business entities involved
- "confidence_score": number between 0 and 1"#,
            structure = pretty(structure),
            preview = preview.to_text(CELL_WIDTH),
        )
    }

    pub fn planning_prompt(
        &self,
        structure: &JsonMap,
        semantic: &JsonMap,
        target_columns: &[String],
        target_sample: &Table,
    ) -> String {
        format!(
            r#"Design a transformation from the source spreadsheet to the target dataset.

STRUCTURE ANALYSIS:
{structure}

SEMANTIC ANALYSIS:
{semantic}

TARGET COLUMNS: {columns}

TARGET SAMPLE:
{sample}

Respond with a single JSON object with these keys:
- "steps": ordered list of transformation steps
- "column_mapping": how each target column is derived from the source
- "filters": rows to drop (totals, blanks, notes)
- "reshaping": any unpivot/melt or block stacking required
- "type_conversions": conversions needed per target column
- "complexity_estimate": one of "low", "medium", "high"
- "confidence_score": number between 0 and 1"#,
            structure = pretty(structure),
            semantic = pretty(semantic),
            columns = target_columns.join(", "),
            sample = table_to_text(target_sample),
        )
    }

    pub fn generation_prompt(&self, context: &GenerationContext<'_>) -> String {
        let analysis = context.analysis;
        let target_sample = context.reference.head(self.reference_sample_rows);
        format!(
            r#"Write a {language} program that transforms the source spreadsheet into the target dataset.

STRUCTURE:
{structure}

SEMANTICS:
{semantic}

TRANSFORMATION PLAN:
{plan}

SOURCE DATA SAMPLE (raw rows, no header interpretation):
{source}

TARGET DATA:
Columns: {columns}
Sample:
{target}

REQUIREMENTS:
1. {convention}
2. Output columns must be exactly, in order: {columns}
3. Cell values must be integers, floats, strings or null. Dates are ISO 8601 text
   (YYYY-MM-DD, or YYYY-MM-DDTHH:MM:SS with a time). Drop subtotal, total, note and blank rows.
4. Row order must match the target sample.
5. Fail loudly on unexpected input instead of guessing.
6. Use only the standard library{extra}.

Return ONLY the code in a single ```{fence} block."#,
            language = self.language.display_name(),
            structure = pretty(analysis.structure()),
            semantic = pretty(analysis.semantic()),
            plan = pretty(analysis.transformation_plan()),
            source = context.source_preview.to_text(CELL_WIDTH),
            columns = context.reference.columns().join(", "),
            target = table_to_text(&target_sample),
            convention = self.language.calling_convention(&self.entry_point),
            extra = match self.language {
                TargetLanguage::Python => ", pandas and openpyxl",
                TargetLanguage::Shell => " and POSIX utilities",
            },
            fence = self.language.fence_tag(),
        )
    }

    pub fn regeneration_prompt(&self, previous: &CandidateProgram, feedback: &Feedback) -> String {
        let mut issues = String::new();
        for mismatch in feedback.mismatch_examples.iter().take(MAX_EXAMPLES) {
            let _ = writeln!(
                issues,
                "Row {}, Column '{}': Expected {}, Got {}",
                mismatch.row_index,
                mismatch.column_name,
                render_cell(&mismatch.expected_value),
                render_cell(&mismatch.actual_value)
            );
        }
        if issues.is_empty() {
            issues.push_str("(none recorded)\n");
        }

        format!(
            r#"The following {language} program did not produce the expected output.

CURRENT CODE:
```{fence}
{code}
```

VALIDATION RESULT:
{summary}

SAMPLE ISSUES:
{issues}
Fix the program. Keep the calling convention: {convention}

Return ONLY the corrected code in a single ```{fence} block."#,
            language = self.language.display_name(),
            fence = self.language.fence_tag(),
            code = previous.source(),
            summary = feedback.summary(),
            convention = self.language.calling_convention(&self.entry_point),
        )
    }
}

fn pretty<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

fn render_cell(value: &CellValue) -> String {
    match value {
        CellValue::Null => "null".to_string(),
        CellValue::String(s) => format!("'{s}'"),
        other => other.to_string(),
    }
}

/// Header row followed by the data rows, in preview layout.
fn table_to_text(table: &Table) -> String {
    let mut rows = Vec::with_capacity(table.row_count() + 1);
    rows.push(
        table
            .columns()
            .iter()
            .map(|c| CellValue::String(c.clone()))
            .collect(),
    );
    rows.extend(table.rows().iter().cloned());
    Grid::new("target", rows).to_text(CELL_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetwise_validator::{validate, ValidationOptions};

    fn builder() -> PromptBuilder {
        PromptBuilder::new(TargetLanguage::Python, "transform", 20)
    }

    #[test]
    fn test_language_from_extension() {
        assert_eq!(TargetLanguage::from_extension("sh"), TargetLanguage::Shell);
        assert_eq!(TargetLanguage::from_extension("py"), TargetLanguage::Python);
        assert_eq!(TargetLanguage::Shell.fence_tag(), "sh");
    }

    #[test]
    fn test_regeneration_prompt_lists_at_most_ten_mismatches() {
        let expected = Table::from_data(
            vec!["units"],
            (0..15).map(|_| vec![CellValue::Int(1)]).collect(),
        )
        .unwrap();
        let actual = Table::from_data(
            vec!["units"],
            (0..15).map(|_| vec![CellValue::Float(2.5)]).collect(),
        )
        .unwrap();
        let report = validate(&actual, &expected, &ValidationOptions::default());
        let feedback = Feedback::from_report(&report);
        let prompt = builder().regeneration_prompt(&CandidateProgram::generated("print(1)"), &feedback);

        assert!(prompt.contains("Row 0, Column 'units': Expected 1, Got 2.5"));
        assert!(prompt.contains("Row 9, Column 'units'"));
        assert!(!prompt.contains("Row 10, Column"));
        assert!(prompt.contains("print(1)"));
        assert!(prompt.contains("0.00% accuracy, 15 mismatches"));
    }

    #[test]
    fn test_table_to_text_includes_header() {
        let table = Table::from_data(vec!["region", "units"], vec![vec![
            CellValue::from("North"),
            CellValue::Int(3),
        ]])
        .unwrap();
        let text = table_to_text(&table);
        assert!(text.contains("region"));
        assert!(text.contains("North"));
    }

    #[test]
    fn test_render_cell() {
        assert_eq!(render_cell(&CellValue::Null), "null");
        assert_eq!(render_cell(&CellValue::Float(1.5)), "1.5");
    }
}
