//! # sheetwise-oracle
//!
//! The analysis oracle: an external text-generation service that answers
//! structural questions about a spreadsheet and writes transformation code.
//!
//! [`Oracle`] is the seam the pipeline depends on; [`HttpOracle`] talks to
//! Anthropic Messages or any OpenAI-compatible chat completions endpoint.

mod extract;
mod http;

pub use extract::{extract_code, extract_json};
pub use http::HttpOracle;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

/// Failures talking to the oracle.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Oracle configuration error: {0}")]
    Config(String),

    #[error("API key environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("Oracle request failed: {0}")]
    Transport(String),

    #[error("Oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Oracle response was not valid JSON: {0}")]
    MalformedJson(String),

    #[error("Oracle returned an unexpected shape: {0}")]
    UnexpectedShape(String),

    #[error("Oracle returned an empty response")]
    EmptyResponse,
}

pub type Result<T> = std::result::Result<T, OracleError>;

/// A text-generation service.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Send `prompt` with an optional system instruction and return the raw text.
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String>;

    /// Like [`Oracle::generate`], parsing the answer as JSON.
    ///
    /// A surrounding ```json fence is stripped first.
    async fn generate_structured(&self, prompt: &str, system: Option<&str>) -> Result<JsonValue> {
        let response = self.generate(prompt, system).await?;
        let payload = extract_json(&response);
        serde_json::from_str(&payload).map_err(|e| {
            debug!(response = %truncate(&response, 320), "Unparseable oracle JSON");
            OracleError::MalformedJson(e.to_string())
        })
    }
}

/// Cut `value` to `max_chars` characters, marking the cut with `...`.
#[must_use]
pub fn truncate(value: &str, max_chars: usize) -> String {
    let mut chars = value.chars();
    let truncated: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{truncated}...")
    } else {
        truncated
    }
}
