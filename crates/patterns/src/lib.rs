//! # sheetwise-patterns
//!
//! A durable cache of transformations that passed validation, one JSON file
//! per pattern, addressed by the `(layout_type, fact_type)` signature of the
//! source they were written for.
//!
//! Records are written to a temporary file and renamed into place, so a
//! reader never sees a torn record. Writers in one process are serialized;
//! across processes, concurrent hits on the same pattern may lose a usage
//! increment but never corrupt the record.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sheetwise_core::{CandidateProgram, PatternId};
use sheetwise_validator::ValidationReport;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Pattern store IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize pattern: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PatternError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        PatternError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PatternError>;

/// Lookup key: exact match on both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub layout_type: Option<String>,
    pub fact_type: Option<String>,
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}",
            self.layout_type.as_deref().unwrap_or("?"),
            self.fact_type.as_deref().unwrap_or("?")
        )
    }
}

/// What the source workbook looked like when the pattern was learned.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceCharacteristics {
    pub layout_type: Option<String>,
    pub fact_type: Option<String>,
    pub complexity: Option<String>,
}

impl SourceCharacteristics {
    #[must_use]
    pub fn signature(&self) -> Signature {
        Signature {
            layout_type: self.layout_type.clone(),
            fact_type: self.fact_type.clone(),
        }
    }
}

/// A validated transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_id: PatternId,
    pub created_at: DateTime<Utc>,
    pub source_characteristics: SourceCharacteristics,
    pub transformation_code: String,
    pub validation_accuracy: f64,
    #[serde(default)]
    pub metadata: IndexMap<String, JsonValue>,
    #[serde(default)]
    pub usage_count: u64,
}

impl Pattern {
    /// Preference among patterns sharing a signature: higher accuracy, then
    /// more uses, then the older pattern.
    fn rank(&self, other: &Pattern) -> Ordering {
        self.validation_accuracy
            .total_cmp(&other.validation_accuracy)
            .then(self.usage_count.cmp(&other.usage_count))
            .then_with(|| other.pattern_id.cmp(&self.pattern_id))
    }
}

/// Directory-backed pattern cache.
#[derive(Debug)]
pub struct PatternStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl PatternStore {
    /// Open (creating if needed) the store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PatternError::io(&dir, e))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Find the best pattern for `signature` and count the hit.
    ///
    /// Never fails: unreadable records and I/O problems are logged and the
    /// call degrades to a miss. The incremented usage count is persisted
    /// before the pattern is returned.
    pub async fn lookup(&self, signature: &Signature) -> Option<Pattern> {
        let _guard = self.write_lock.lock().await;

        let patterns = match self.load_all().await {
            Ok(patterns) => patterns,
            Err(e) => {
                warn!(error = %e, "Pattern store unreadable, treating as miss");
                return None;
            }
        };

        let mut best = patterns
            .into_iter()
            .filter(|p| p.source_characteristics.signature() == *signature)
            .max_by(Pattern::rank)?;

        best.usage_count += 1;
        if let Err(e) = self.write(&best).await {
            warn!(pattern_id = %best.pattern_id, error = %e, "Failed to record pattern usage");
        }
        info!(
            pattern_id = %best.pattern_id,
            signature = %signature,
            usage_count = best.usage_count,
            "Pattern cache hit"
        );
        Some(best)
    }

    /// Record a transformation that passed validation.
    pub async fn store(
        &self,
        characteristics: SourceCharacteristics,
        program: &CandidateProgram,
        report: &ValidationReport,
        metadata: IndexMap<String, JsonValue>,
    ) -> Result<PatternId> {
        let pattern = Pattern {
            pattern_id: PatternId::generate(),
            created_at: Utc::now(),
            source_characteristics: characteristics,
            transformation_code: program.source().to_string(),
            validation_accuracy: report.value_accuracy,
            metadata,
            usage_count: 0,
        };

        let _guard = self.write_lock.lock().await;
        self.write(&pattern).await?;
        info!(
            pattern_id = %pattern.pattern_id,
            signature = %pattern.source_characteristics.signature(),
            "Saved pattern"
        );
        Ok(pattern.pattern_id)
    }

    /// Read one pattern by id.
    pub async fn get(&self, id: &PatternId) -> Result<Option<Pattern>> {
        let path = self.path_for(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PatternError::io(&path, e)),
        }
    }

    /// Every readable pattern, oldest first.
    pub async fn list(&self) -> Result<Vec<Pattern>> {
        let mut patterns = self.load_all().await?;
        patterns.sort_by(|a, b| a.pattern_id.cmp(&b.pattern_id));
        Ok(patterns)
    }

    fn path_for(&self, id: &PatternId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn load_all(&self) -> Result<Vec<Pattern>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| PatternError::io(&self.dir, e))?;

        let mut patterns = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PatternError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable pattern");
                    continue;
                }
            };
            match serde_json::from_slice::<Pattern>(&bytes) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping corrupt pattern");
                }
            }
        }

        debug!(count = patterns.len(), dir = %self.dir.display(), "Loaded patterns");
        Ok(patterns)
    }

    async fn write(&self, pattern: &Pattern) -> Result<()> {
        let path = self.path_for(&pattern.pattern_id);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", pattern.pattern_id, Uuid::new_v4().simple()));
        let bytes = serde_json::to_vec_pretty(pattern)?;

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| PatternError::io(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PatternError::io(&path, e));
        }
        Ok(())
    }
}
