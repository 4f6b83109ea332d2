//! Embedding providers for the vector index.
//!
//! `provider = "disabled"` yields [`DisabledProvider`], which fails every
//! call; `provider = "openai"` yields [`OpenAIProvider`], which posts to
//! `{base_url}/embeddings`.
//!
//! Rate limits (429), server errors (5xx) and transport errors are retried
//! up to `max_retries` times with exponential backoff starting at one
//! second and capped at 32 seconds. Other 4xx responses fail at once.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::EmbeddingConfig;

const MAX_BACKOFF_EXP: u32 = 5;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    /// Length of every vector this provider returns.
    fn dims(&self) -> usize;
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embeds a single search string.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let mut vectors = provider.embed(&[text.to_string()]).await?;
    vectors
        .pop()
        .ok_or_else(|| anyhow!("embedding provider returned no vector for query"))
}

pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled ============

pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI ============

/// Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    endpoint: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Outcome of one HTTP attempt.
enum Attempt<T> {
    Done(T),
    Retry(anyhow::Error),
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (Some(model), Some(dims)) = (config.model.clone(), config.dims) else {
            bail!("embedding.model and embedding.dims are required for the openai provider");
        };
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Attempt<EmbeddingResponse>> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let response = match self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Ok(Attempt::Retry(e.into())),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(Attempt::Done(response.json().await?));
        }

        let text = response.text().await.unwrap_or_default();
        let err = anyhow!("embeddings API error {}: {}", status, text);
        if status.as_u16() == 429 || status.is_server_error() {
            Ok(Attempt::Retry(err))
        } else {
            Err(err)
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = with_backoff(self.max_retries, || self.request(texts)).await?;
        order_vectors(response, texts.len(), self.dims)
    }
}

/// Runs `attempt` until it finishes or `max_retries` retries are used up.
async fn with_backoff<T, F, Fut>(max_retries: u32, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Attempt<T>>>,
{
    let mut tries = 0u32;
    loop {
        match attempt().await? {
            Attempt::Done(value) => return Ok(value),
            Attempt::Retry(err) if tries >= max_retries => return Err(err),
            Attempt::Retry(err) => {
                let delay = Duration::from_secs(1u64 << tries.min(MAX_BACKOFF_EXP));
                warn!(attempt = tries + 1, delay_secs = delay.as_secs(), error = %err, "retrying embeddings request");
                tokio::time::sleep(delay).await;
                tries += 1;
            }
        }
    }
}

/// Puts vectors back into input order and checks count and length.
fn order_vectors(
    response: EmbeddingResponse,
    expected: usize,
    dims: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut items = response.data;
    if items.len() != expected {
        bail!(
            "embeddings API returned {} vectors for {} inputs",
            items.len(),
            expected
        );
    }
    items.sort_by_key(|item| item.index);

    items
        .into_iter()
        .map(|item| {
            if item.embedding.len() != dims {
                bail!(
                    "embedding has {} dimensions, expected {}",
                    item.embedding.len(),
                    dims
                );
            }
            Ok(item.embedding)
        })
        .collect()
}
