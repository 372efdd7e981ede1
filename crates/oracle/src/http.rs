use crate::{truncate, Oracle, OracleError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use sheetwise_core::{OracleConfig, Provider};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const DEFAULT_ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: JsonValue,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

/// Oracle backed by a hosted model over HTTP.
pub struct HttpOracle {
    client: Client,
    provider: Provider,
    url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f64,
}

impl std::fmt::Debug for HttpOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOracle")
            .field("provider", &self.provider)
            .field("url", &self.url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl HttpOracle {
    /// Build an oracle, reading the API key from the environment variable
    /// named by `config.api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns `OracleError::MissingApiKey` when the variable is unset or empty.
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| OracleError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_api_key(config, api_key)
    }

    /// Build an oracle with an explicit API key.
    ///
    /// # Errors
    ///
    /// Returns `OracleError::Config` if the HTTP client cannot be built.
    pub fn with_api_key(config: &OracleConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            // Disable system proxy lookup to avoid macOS system-configuration issues
            .no_proxy()
            .build()
            .map_err(|e| OracleError::Config(format!("failed to build HTTP client: {e}")))?;

        let url = match config.provider {
            Provider::Anthropic => {
                resolve_endpoint(config.endpoint.as_deref(), DEFAULT_ANTHROPIC_ENDPOINT, "/messages")
            }
            Provider::OpenAi => resolve_endpoint(
                config.endpoint.as_deref(),
                DEFAULT_OPENAI_ENDPOINT,
                "/chat/completions",
            ),
        };

        Ok(Self {
            client,
            provider: config.provider,
            url,
            model: config.model.clone(),
            api_key: api_key.into(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self, request: reqwest::RequestBuilder, payload: &JsonValue) -> Result<reqwest::Response> {
        let response = request
            .json(payload)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status,
                body: truncate(&body, 320),
            });
        }
        Ok(response)
    }

    async fn generate_anthropic(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let mut payload = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [
                {
                    "role": "user",
                    "content": prompt,
                }
            ],
        });
        if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
            payload["system"] = json!(system);
        }

        let request = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let response = self.send(request, &payload).await?;

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| OracleError::UnexpectedShape(format!("invalid anthropic response: {e}")))?;

        debug!(stop_reason = ?body.stop_reason, "Anthropic response");
        Ok(body
            .content
            .iter()
            .filter(|part| part.content_type == "text")
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn generate_openai(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
            messages.push(json!({
                "role": "system",
                "content": system,
            }));
        }
        messages.push(json!({
            "role": "user",
            "content": prompt,
        }));

        let payload = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let request = self.client.post(&self.url).bearer_auth(&self.api_key);
        let response = self.send(request, &payload).await?;

        let body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| OracleError::UnexpectedShape(format!("invalid chat response: {e}")))?;

        let choice = body.choices.first().ok_or(OracleError::EmptyResponse)?;
        debug!(finish_reason = ?choice.finish_reason, "Chat completion response");
        Ok(extract_text(&choice.message.content))
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let started = Instant::now();
        let output = match self.provider {
            Provider::Anthropic => self.generate_anthropic(prompt, system).await?,
            Provider::OpenAi => self.generate_openai(prompt, system).await?,
        };

        let output = output.trim().to_string();
        if output.is_empty() {
            return Err(OracleError::EmptyResponse);
        }

        info!(
            model = %self.model,
            prompt_chars = prompt.len(),
            response_chars = output.len(),
            latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Oracle call complete"
        );
        Ok(output)
    }
}

fn resolve_endpoint(endpoint: Option<&str>, default_endpoint: &str, suffix: &str) -> String {
    let endpoint = endpoint.unwrap_or(default_endpoint);
    if endpoint.ends_with(suffix) {
        endpoint.to_string()
    } else {
        format!("{}{suffix}", endpoint.trim_end_matches('/'))
    }
}

fn extract_text(content: &JsonValue) -> String {
    match content {
        JsonValue::String(text) => text.clone(),
        JsonValue::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(JsonValue::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_endpoint() {
        assert_eq!(
            resolve_endpoint(None, DEFAULT_ANTHROPIC_ENDPOINT, "/messages"),
            DEFAULT_ANTHROPIC_ENDPOINT
        );
        assert_eq!(
            resolve_endpoint(Some("http://localhost:8080/v1/"), DEFAULT_OPENAI_ENDPOINT, "/chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_extract_text_parts() {
        let content = json!([{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]);
        assert_eq!(extract_text(&content), "a\nb");
        assert_eq!(extract_text(&json!(null)), "");
    }

    #[test]
    fn test_missing_api_key() {
        let config = OracleConfig {
            api_key_env: "SHEETWISE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..OracleConfig::default()
        };
        let err = HttpOracle::from_config(&config).unwrap_err();
        assert!(matches!(err, OracleError::MissingApiKey(name) if name.ends_with("NEVER_SET")));
    }
}
