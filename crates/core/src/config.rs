//! Runtime configuration.
//!
//! Loaded once from YAML at startup and validated before any job runs.
//! Every field has a default, so a partial file (or none at all) is valid.

use crate::error::{SheetwiseError, SwResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub oracle: OracleConfig,
    pub analysis: AnalysisConfig,
    pub validation: ValidationConfig,
    pub optimization: OptimizationConfig,
    pub output: OutputConfig,
    pub sandbox: SandboxConfig,
    pub patterns: PatternConfig,
    pub logging: LoggingConfig,
}

/// Supported oracle providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    /// Any OpenAI-compatible chat completions endpoint.
    OpenAi,
}

/// Oracle connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OracleConfig {
    pub provider: Provider,
    pub model: String,
    /// Override for the provider's default endpoint.
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            endpoint: None,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            max_tokens: 8000,
            temperature: 0.1,
            timeout_secs: 300,
        }
    }
}

/// How many rows each analysis stage shows the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub sample_rows: usize,
    pub semantic_rows: usize,
    pub reference_sample_rows: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rows: 50,
            semantic_rows: 100,
            reference_sample_rows: 20,
        }
    }
}

/// Validator thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    pub accuracy_threshold: f64,
    pub numeric_tolerance: f64,
    pub max_mismatches: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            accuracy_threshold: 0.99,
            numeric_tolerance: 1e-6,
            max_mismatches: 20,
        }
    }
}

/// What a pattern cache hit does to a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// Log the hit and generate a fresh program anyway.
    #[default]
    Advisory,
    /// Execute the cached program as the first candidate.
    Reuse,
}

/// Correction loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizationConfig {
    pub max_iterations: u32,
    pub enable_learning: bool,
    pub cache_policy: CachePolicy,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            enable_learning: true,
            cache_policy: CachePolicy::Advisory,
        }
    }
}

/// Export formats for a validated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Xlsx,
}

impl ExportFormat {
    /// File extension written for this format.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = SheetwiseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            other => Err(SheetwiseError::config(format!(
                "unknown export format '{other}' (expected csv, json or xlsx)"
            ))),
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub formats: Vec<ExportFormat>,
    pub save_artifacts: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            formats: vec![ExportFormat::Csv],
            save_artifacts: true,
        }
    }
}

/// Sandboxed executor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxConfig {
    /// Interpreter used to run candidate programs.
    pub command: String,
    /// File extension candidate programs are written with.
    pub extension: String,
    /// Name of the function candidate programs must define.
    pub entry_point: String,
    /// Run a cheap compile-only check before full execution.
    pub syntax_check: bool,
    pub timeout_secs: u64,
    pub memory_limit_mb: Option<u64>,
    pub max_output_bytes: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            command: "python3".to_string(),
            extension: "py".to_string(),
            entry_point: "transform".to_string(),
            syntax_check: true,
            timeout_secs: 120,
            memory_limit_mb: None,
            max_output_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Pattern cache location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatternConfig {
    pub dir: PathBuf,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("patterns"),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(content: &str) -> SwResult<Self> {
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> SwResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SheetwiseError::config(format!(
                "cannot read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load `path` when it exists, otherwise fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> SwResult<Self> {
        if path.as_ref().exists() {
            Self::from_yaml_file(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Check every recognized option once, before any job starts.
    pub fn validate(&self) -> SwResult<()> {
        let threshold = self.validation.accuracy_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SheetwiseError::config(format!(
                "validation.accuracy_threshold must be within [0, 1], got {threshold}"
            )));
        }
        let tolerance = self.validation.numeric_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(SheetwiseError::config(format!(
                "validation.numeric_tolerance must be a non-negative number, got {tolerance}"
            )));
        }
        if self.optimization.max_iterations == 0 {
            return Err(SheetwiseError::config(
                "optimization.max_iterations must be at least 1",
            ));
        }
        if self.sandbox.command.trim().is_empty() {
            return Err(SheetwiseError::config("sandbox.command must not be empty"));
        }
        if self.sandbox.entry_point.trim().is_empty() {
            return Err(SheetwiseError::config(
                "sandbox.entry_point must not be empty",
            ));
        }
        if !matches!(self.sandbox.extension.as_str(), "py" | "sh") {
            return Err(SheetwiseError::config(format!(
                "sandbox.extension must be 'py' or 'sh', got '{}'",
                self.sandbox.extension
            )));
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(SheetwiseError::config("sandbox.timeout_secs must be positive"));
        }
        if self.sandbox.memory_limit_mb == Some(0) {
            return Err(SheetwiseError::config(
                "sandbox.memory_limit_mb must be positive when set",
            ));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(SheetwiseError::config("oracle.timeout_secs must be positive"));
        }
        if !(0.0..=2.0).contains(&self.oracle.temperature) {
            return Err(SheetwiseError::config(format!(
                "oracle.temperature must be within [0, 2], got {}",
                self.oracle.temperature
            )));
        }
        if self.oracle.model.trim().is_empty() {
            return Err(SheetwiseError::config("oracle.model must not be empty"));
        }
        if self.analysis.sample_rows == 0 || self.analysis.semantic_rows == 0 {
            return Err(SheetwiseError::config(
                "analysis sample sizes must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.optimization.max_iterations, 5);
        assert!((config.validation.numeric_tolerance - 1e-6).abs() < f64::EPSILON);
        assert_eq!(config.output.formats, vec![ExportFormat::Csv]);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r"
validation:
  accuracy_threshold: 0.95
optimization:
  max_iterations: 3
  cache_policy: reuse
output:
  formats: [csv, xlsx]
";
        let config = Config::from_yaml_str(yaml).unwrap();
        assert!((config.validation.accuracy_threshold - 0.95).abs() < f64::EPSILON);
        assert_eq!(config.validation.max_mismatches, 20);
        assert_eq!(config.optimization.max_iterations, 3);
        assert_eq!(config.optimization.cache_policy, CachePolicy::Reuse);
        assert!(config.optimization.enable_learning);
        assert_eq!(
            config.output.formats,
            vec![ExportFormat::Csv, ExportFormat::Xlsx]
        );
        assert_eq!(config.sandbox.command, "python3");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Config::from_yaml_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let err = Config::from_yaml_str("validation:\n  accuracy_threshold: 1.5\n").unwrap_err();
        assert!(err.to_string().contains("accuracy_threshold"));
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let err = Config::from_yaml_str("optimization:\n  max_iterations: 0\n").unwrap_err();
        assert!(matches!(err, SheetwiseError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_keys_and_formats() {
        assert!(Config::from_yaml_str("optimisation:\n  max_iterations: 2\n").is_err());
        assert!(Config::from_yaml_str("output:\n  formats: [sqlite]\n").is_err());
    }

    #[test]
    fn test_export_format_from_str() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("excel".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert!("parquet".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_provider_names() {
        let config = Config::from_yaml_str("oracle:\n  provider: openai\n  model: gpt-4o\n").unwrap();
        assert_eq!(config.oracle.provider, Provider::OpenAi);
    }
}
