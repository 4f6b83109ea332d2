//! Batch orchestration: N sequential generation attempts for one topic.
//!
//! Each attempt runs retrieve → build prompt → generate → validate.
//! Topic documents are read and chunked once, on the first attempt.
//! Attempts are strictly sequential and separated by a configurable
//! pause, so a batch never has more than one call in flight against the
//! completion service.
//!
//! # Failure handling
//!
//! | Failure | Effect |
//! |---------|--------|
//! | [`PipelineError::NoSourceMaterial`] / [`PipelineError::TopicNotFound`] | batch stops; one aggregate error, `aborted` set |
//! | [`PipelineError::Generation`] | error recorded, next attempt |
//! | [`PipelineError::SchemaViolation`] | error recorded, next attempt |
//! | cancellation | no further attempts; `cancelled` set |
//!
//! Only request validation ([`PipelineError::InvalidRequest`]) is returned
//! as `Err`; everything else lands in the [`BatchResult`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::generate::GenerationClient;
use crate::models::{BatchResult, GeneratedQuestion, RetrievalQuery};
use crate::prompt::build_prompt;
use crate::retrieve::{Retriever, SampleCache};
use crate::validate::validate_for_query;

/// Waits between attempts.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// Sleeps on the tokio timer.
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Returns immediately.
pub struct NoPacer;

#[async_trait]
impl Pacer for NoPacer {
    async fn pause(&self, _delay: Duration) {}
}

pub struct BatchGenerator {
    retriever: Arc<Retriever>,
    client: GenerationClient,
    pacer: Arc<dyn Pacer>,
    delay: Duration,
    max_count: usize,
}

impl BatchGenerator {
    pub fn new(retriever: Arc<Retriever>, client: GenerationClient) -> Self {
        Self {
            retriever,
            client,
            pacer: Arc::new(TokioPacer),
            delay: Duration::from_millis(1500),
            max_count: 20,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    pub async fn generate_batch(
        &self,
        query: &RetrievalQuery,
        count: usize,
    ) -> Result<BatchResult, PipelineError> {
        self.generate_batch_with_cancel(query, count, &CancellationToken::new())
            .await
    }

    /// Runs up to `count` attempts, stopping early on a topic-level failure
    /// or once `cancel` fires. An attempt already dispatched to the
    /// completion service is allowed to finish.
    pub async fn generate_batch_with_cancel(
        &self,
        query: &RetrievalQuery,
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, PipelineError> {
        if count == 0 || count > self.max_count {
            return Err(PipelineError::InvalidRequest(format!(
                "count must be between 1 and {}, got {}",
                self.max_count, count
            )));
        }

        let mut result = BatchResult::new(count);
        let mut cache = SampleCache::new();
        info!(topic = %query.topic, difficulty = %query.difficulty, count, "starting batch");

        for attempt in 1..=count {
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }

            match self.attempt(query, &mut cache, &mut result).await {
                Ok(question) => result.accepted.push(question),
                Err(e) if e.is_topic_level() => {
                    warn!(topic = %query.topic, error = %e, "aborting batch");
                    let reason = e.to_string();
                    result.errors.push(reason.clone());
                    result.aborted = Some(reason);
                    break;
                }
                Err(e) => {
                    warn!(topic = %query.topic, attempt, error = %e, "attempt failed");
                    result.errors.push(format!("attempt {}: {}", attempt, e));
                }
            }

            if attempt < count {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        result.cancelled = true;
                        break;
                    }
                    _ = self.pacer.pause(self.delay) => {}
                }
            }
        }

        info!(
            topic = %query.topic,
            accepted = result.accepted.len(),
            failed = result.errors.len(),
            aborted = result.is_aborted(),
            cancelled = result.cancelled,
            "batch finished"
        );
        Ok(result)
    }

    async fn attempt(
        &self,
        query: &RetrievalQuery,
        cache: &mut SampleCache,
        result: &mut BatchResult,
    ) -> Result<GeneratedQuestion, PipelineError> {
        let context = self.retriever.retrieve_cached(query, cache).await?;
        result.add_sources(&context.source_files);

        let prompt = build_prompt(query, &context);
        let raw = self.client.generate(&prompt).await?;
        let mut question = validate_for_query(&raw, query)?;

        if question.source_material.is_none() && !context.source_files.is_empty() {
            question.source_material = Some(context.source_files.join(", "));
        }
        Ok(question)
    }
}
