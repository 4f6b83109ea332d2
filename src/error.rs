//! Pipeline error taxonomy.
//!
//! Request- and topic-level errors ([`PipelineError::InvalidTopic`],
//! [`PipelineError::InvalidRequest`], [`PipelineError::TopicNotFound`],
//! [`PipelineError::NoSourceMaterial`]) propagate to the caller.
//! Attempt-level errors ([`PipelineError::Generation`],
//! [`PipelineError::SchemaViolation`]) are captured by the batch
//! orchestrator into the batch result and never escape it.

use thiserror::Error;

use crate::extract::ExtractError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid topic '{0}': must be one of the 10 CFA topic areas")]
    InvalidTopic(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("topic folder not found: {0}")]
    TopicNotFound(String),

    #[error("no source material available for topic {0}")]
    NoSourceMaterial(String),

    #[error("extraction failed for {file}: {source}")]
    Extraction {
        file: String,
        #[source]
        source: ExtractError,
    },

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidTopic(_) => "invalid_topic",
            PipelineError::InvalidRequest(_) => "bad_request",
            PipelineError::TopicNotFound(_) => "topic_not_found",
            PipelineError::NoSourceMaterial(_) => "no_source_material",
            PipelineError::Extraction { .. } => "extraction_error",
            PipelineError::Generation(_) => "generation_error",
            PipelineError::SchemaViolation(_) => "schema_violation",
            PipelineError::Internal(_) => "internal",
        }
    }

    /// True for failures that end a whole batch rather than one attempt.
    pub fn is_topic_level(&self) -> bool {
        matches!(
            self,
            PipelineError::TopicNotFound(_) | PipelineError::NoSourceMaterial(_)
        )
    }
}
