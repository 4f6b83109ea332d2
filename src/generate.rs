//! Completion-service clients and the generation client wrapper.
//!
//! [`CompletionService`] is the seam to the generative model. The
//! composition root builds one service (see [`create_service`]) and shares
//! it via `Arc`; nothing here holds global state.
//!
//! [`GenerationClient`] enforces the per-call contract: bounded timeout,
//! JSON response format, non-empty output. Every failure becomes a
//! [`PipelineError::Generation`] for that single attempt; retrying is the
//! batch orchestrator's decision, not this module's.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::PipelineError;

const SYSTEM_MESSAGE: &str =
    "You are an expert CFA exam question writer. You respond only with valid JSON.";

/// Sampling and format options for one completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub json_response: bool,
}

impl CompletionOptions {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            json_response: true,
        }
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1500,
            json_response: true,
        }
    }
}

/// A text completion backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;
}

// ============ Disabled ============

/// Always fails; used when `generation.provider = "disabled"`.
pub struct DisabledCompletion;

#[async_trait]
impl CompletionService for DisabledCompletion {
    fn name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
        bail!("Generation provider is disabled")
    }
}

// ============ OpenAI ============

/// Chat-completions client for OpenAI-compatible endpoints.
///
/// Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAiCompletion {
    model: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompletion {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        // The caller's timeout is authoritative; this one only bounds stuck sockets.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs + 5))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletion {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_MESSAGE },
                { "role": "user", "content": prompt }
            ],
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });
        if options.json_response {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("completion API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid completion response: missing choices[0].message.content"))
}

/// Create the completion service named by `generation.provider`.
pub fn create_service(config: &GenerationConfig) -> Result<Arc<dyn CompletionService>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompletion)),
        "openai" => Ok(Arc::new(OpenAiCompletion::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

// ============ Generation client ============

/// Wraps a [`CompletionService`] with the generation call contract.
#[derive(Clone)]
pub struct GenerationClient {
    service: Arc<dyn CompletionService>,
    options: CompletionOptions,
    timeout: Duration,
}

impl GenerationClient {
    pub fn new(service: Arc<dyn CompletionService>, options: CompletionOptions, timeout: Duration) -> Self {
        Self {
            service,
            options,
            timeout,
        }
    }

    pub fn from_config(service: Arc<dyn CompletionService>, config: &GenerationConfig) -> Self {
        Self::new(
            service,
            CompletionOptions::from_config(config),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Returns the raw model output, expected to be JSON text.
    pub async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let started = std::time::Instant::now();
        let result = tokio::time::timeout(self.timeout, self.service.complete(prompt, &self.options)).await;

        let text = match result {
            Err(_) => {
                return Err(PipelineError::Generation(format!(
                    "timed out after {:?}",
                    self.timeout
                )))
            }
            Ok(Err(e)) => return Err(PipelineError::Generation(format!("{:#}", e))),
            Ok(Ok(text)) => text,
        };

        if text.trim().is_empty() {
            return Err(PipelineError::Generation("empty response".to_string()));
        }

        debug!(
            service = self.service.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = text.len(),
            "completion received"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl CompletionService for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Slow;

    #[async_trait]
    impl CompletionService for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("{}".to_string())
        }
    }

    fn client(service: Arc<dyn CompletionService>) -> GenerationClient {
        GenerationClient::new(service, CompletionOptions::default(), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn returns_raw_text() {
        let out = client(Arc::new(Fixed("{\"a\":1}"))).generate("p").await.unwrap();
        assert_eq!(out, "{\"a\":1}");
    }

    #[tokio::test]
    async fn empty_response_is_generation_error() {
        let err = client(Arc::new(Fixed("   "))).generate("p").await.unwrap_err();
        assert!(matches!(err, PipelineError::Generation(ref m) if m.contains("empty")));
    }

    #[tokio::test]
    async fn service_error_is_generation_error() {
        let err = client(Arc::new(DisabledCompletion)).generate("p").await.unwrap_err();
        assert!(matches!(err, PipelineError::Generation(ref m) if m.contains("disabled")));
    }

    #[tokio::test]
    async fn timeout_is_generation_error() {
        let err = client(Arc::new(Slow)).generate("p").await.unwrap_err();
        assert!(matches!(err, PipelineError::Generation(ref m) if m.contains("timed out")));
    }

    #[test]
    fn parses_chat_content() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"ok\":true}" } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "{\"ok\":true}");
        assert!(parse_chat_response(&serde_json::json!({ "choices": [] })).is_err());
    }

    #[test]
    fn options_follow_config() {
        let config = GenerationConfig::default();
        let opts = CompletionOptions::from_config(&config);
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
        assert!(opts.json_response);
    }
}
