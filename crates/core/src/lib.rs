//! # sheetwise-core
//!
//! Core types shared by every sheetwise crate.
//!
//! This crate provides:
//! - The cell value sum type and the columnar `Table`
//! - Runtime configuration, validated once at startup
//! - Error types
//! - Job and pattern identifiers
//! - Candidate transformation programs and their lineage

/// Cell value type.
pub mod cell;
/// Configuration structures.
pub mod config;
/// Error types and result aliases.
pub mod error;
/// Job and pattern identifiers.
pub mod id;
/// Candidate transformation programs.
pub mod program;
/// Columnar table.
pub mod table;

pub use cell::CellValue;
pub use config::{
    AnalysisConfig, CachePolicy, Config, ExportFormat, LoggingConfig, OptimizationConfig,
    OracleConfig, OutputConfig, PatternConfig, Provider, SandboxConfig, ValidationConfig,
};
pub use error::{SheetwiseError, SwResult};
pub use id::{JobId, PatternId};
pub use program::{CandidateProgram, ProgramOrigin};
pub use table::{ColumnType, Table};
