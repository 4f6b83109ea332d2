//! Composition root: builds the long-lived pipeline objects from config.
//!
//! The completion service, embedding provider, and vector index are
//! created once here and shared via `Arc` for the life of the process.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::batch::BatchGenerator;
use crate::config::Config;
use crate::embedding::create_provider;
use crate::generate::{create_service, CompletionService, GenerationClient};
use crate::index::{SqliteIndex, VectorIndex};
use crate::ingest::Library;
use crate::retrieve::{RetrievalStrategy, Retriever};

/// Builds a retriever, attaching the SQLite vector index when the vector
/// strategy is configured.
pub fn build_retriever(config: &Config, pool: &SqlitePool) -> Result<Retriever> {
    let library = Library::new(&config.sources, &config.chunking)?;
    let strategy: RetrievalStrategy = config.retrieval.strategy.parse()?;

    let index: Option<Arc<dyn VectorIndex>> = if strategy == RetrievalStrategy::VectorSearch {
        let embedder = create_provider(&config.embedding)
            .context("vector retrieval needs an embedding provider")?;
        Some(Arc::new(SqliteIndex::new(
            pool.clone(),
            embedder,
            config.embedding.batch_size,
        )))
    } else {
        None
    };

    Ok(Retriever::from_config(&config.retrieval, library, index)?)
}

/// Builds the batch generator with the configured completion service.
pub fn build_generator(config: &Config, pool: &SqlitePool) -> Result<BatchGenerator> {
    let service = create_service(&config.generation)?;
    build_generator_with_service(config, pool, service)
}

/// Like [`build_generator`], with an explicit completion service.
pub fn build_generator_with_service(
    config: &Config,
    pool: &SqlitePool,
    service: Arc<dyn CompletionService>,
) -> Result<BatchGenerator> {
    let retriever = build_retriever(config, pool)?;
    info!(
        strategy = ?retriever.strategy(),
        service = service.name(),
        "pipeline ready"
    );
    let client = GenerationClient::from_config(service, &config.generation);

    Ok(BatchGenerator::new(Arc::new(retriever), client)
        .with_delay(Duration::from_millis(config.batch.delay_ms))
        .with_max_count(config.batch.max_count))
}
