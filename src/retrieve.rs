//! Context retrieval for question generation.
//!
//! Two strategies, chosen by `[retrieval].strategy`:
//!
//! | Strategy | Behavior |
//! |----------|----------|
//! | [`RetrievalStrategy::VectorSearch`] | top-K nearest chunks from a [`VectorIndex`], ranked by similarity |
//! | [`RetrievalStrategy::LocalSample`] | one chunk drawn uniformly at random from the topic's re-chunked documents |
//!
//! Vector search falls back to local sampling when no index is attached,
//! the index errors, or it returns nothing. Retrieval fails with
//! [`PipelineError::NoSourceMaterial`] only when both come up empty.
//!
//! The combined context never exceeds `max_context_chars` characters.
//!
//! Local sampling loads and chunks the topic folder once per
//! [`SampleCache`]; a batch holds one cache so its attempts draw from the
//! same chunk set without re-reading the files.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::error::PipelineError;
use crate::index::VectorIndex;
use crate::ingest::Library;
use crate::models::{RetrievalQuery, RetrievedContext, TextChunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStrategy {
    VectorSearch,
    LocalSample,
}

impl FromStr for RetrievalStrategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vector" => Ok(RetrievalStrategy::VectorSearch),
            "local" => Ok(RetrievalStrategy::LocalSample),
            other => Err(PipelineError::InvalidRequest(format!(
                "unknown retrieval strategy: {}",
                other
            ))),
        }
    }
}

/// Chunks loaded by local sampling, reused until the cache is dropped.
#[derive(Default)]
pub struct SampleCache {
    chunks: Option<Vec<TextChunk>>,
}

impl SampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.chunks.is_some()
    }
}

pub struct Retriever {
    strategy: RetrievalStrategy,
    library: Library,
    index: Option<Arc<dyn VectorIndex>>,
    top_k: usize,
    max_context_chars: usize,
    rng: Mutex<StdRng>,
}

impl Retriever {
    pub fn new(
        strategy: RetrievalStrategy,
        library: Library,
        top_k: usize,
        max_context_chars: usize,
    ) -> Self {
        Self {
            strategy,
            library,
            index: None,
            top_k,
            max_context_chars,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn from_config(
        config: &RetrievalConfig,
        library: Library,
        index: Option<Arc<dyn VectorIndex>>,
    ) -> Result<Self, PipelineError> {
        let strategy = config.strategy.parse()?;
        let mut retriever = Self::new(strategy, library, config.top_k, config.max_context_chars);
        retriever.index = index;
        if let Some(seed) = config.seed {
            retriever = retriever.with_seed(seed);
        }
        Ok(retriever)
    }

    pub fn with_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Makes local sampling reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn strategy(&self) -> RetrievalStrategy {
        self.strategy
    }

    pub async fn retrieve(&self, query: &RetrievalQuery) -> Result<RetrievedContext, PipelineError> {
        self.retrieve_cached(query, &mut SampleCache::new()).await
    }

    /// Like [`Retriever::retrieve`], but local sampling reuses the chunks
    /// held in `cache`, loading them on first use.
    pub async fn retrieve_cached(
        &self,
        query: &RetrievalQuery,
        cache: &mut SampleCache,
    ) -> Result<RetrievedContext, PipelineError> {
        if self.strategy == RetrievalStrategy::VectorSearch {
            if let Some(ctx) = self.vector_search(query).await {
                return Ok(ctx);
            }
        }
        self.local_sample(query, cache).await
    }

    async fn vector_search(&self, query: &RetrievalQuery) -> Option<RetrievedContext> {
        let Some(index) = &self.index else {
            debug!(topic = %query.topic, "no vector index attached; sampling locally");
            return None;
        };

        match index
            .search(query.topic, &query.search_text(), self.top_k)
            .await
        {
            Ok(hits) if !hits.is_empty() => {
                let ctx = fit_to_budget(
                    hits.into_iter().map(|h| (h.content, h.source_file)),
                    self.max_context_chars,
                );
                debug!(topic = %query.topic, chunks = ctx.chunks.len(), chars = ctx.total_chars(), "vector retrieval");
                Some(ctx)
            }
            Ok(_) => {
                debug!(topic = %query.topic, "vector index returned nothing; sampling locally");
                None
            }
            Err(e) => {
                warn!(topic = %query.topic, error = %e, "vector search failed; sampling locally");
                None
            }
        }
    }

    async fn local_sample(
        &self,
        query: &RetrievalQuery,
        cache: &mut SampleCache,
    ) -> Result<RetrievedContext, PipelineError> {
        let topic = query.topic;
        if cache.chunks.is_none() {
            cache.chunks = Some(self.load_chunks(query).await?);
        }
        let Some(chunks) = cache.chunks.as_deref().filter(|c| !c.is_empty()) else {
            return Err(PipelineError::NoSourceMaterial(topic.to_string()));
        };

        let pick = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            rng.gen_range(0..chunks.len())
        };
        let chosen = &chunks[pick];
        debug!(topic = %topic, file = %chosen.source_file, ordinal = chosen.ordinal, "sampled chunk");

        Ok(fit_to_budget(
            std::iter::once((chosen.content.clone(), chosen.source_file.clone())),
            self.max_context_chars,
        ))
    }

    async fn load_chunks(&self, query: &RetrievalQuery) -> Result<Vec<TextChunk>, PipelineError> {
        let library = self.library.clone();
        let topic = query.topic;
        let hint = query.subtopic.clone();
        let chunks = tokio::task::spawn_blocking(move || library.load_chunks(topic, hint.as_deref()))
            .await
            .map_err(|e| PipelineError::Internal(format!("chunking task failed: {}", e)))??;

        if chunks.is_empty() {
            return Err(PipelineError::NoSourceMaterial(topic.to_string()));
        }
        debug!(topic = %topic, chunks = chunks.len(), "loaded topic chunks");
        Ok(chunks)
    }
}

/// Keeps ranked chunks while they fit in `budget` characters.
///
/// The first chunk is always kept, truncated if it alone exceeds the budget.
fn fit_to_budget(
    ranked: impl IntoIterator<Item = (String, String)>,
    budget: usize,
) -> RetrievedContext {
    let mut ctx = RetrievedContext::default();
    let mut used = 0;

    for (content, source) in ranked {
        let len = content.chars().count();
        if used + len <= budget {
            used += len;
            ctx.chunks.push(content);
        } else if ctx.chunks.is_empty() {
            used = budget;
            ctx.chunks.push(content.chars().take(budget).collect());
        } else {
            break;
        }
        if !ctx.source_files.contains(&source) {
            ctx.source_files.push(source);
        }
    }

    ctx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(content: &str, source: &str) -> (String, String) {
        (content.to_string(), source.to_string())
    }

    #[test]
    fn budget_keeps_ranked_prefix() {
        let ctx = fit_to_budget(
            vec![
                pair(&"a".repeat(3000), "one.pdf"),
                pair(&"b".repeat(2500), "two.pdf"),
                pair(&"c".repeat(1000), "three.pdf"),
            ],
            6000,
        );
        assert_eq!(ctx.chunks.len(), 2);
        assert_eq!(ctx.source_files, vec!["one.pdf", "two.pdf"]);
        assert!(ctx.total_chars() <= 6000);
    }

    #[test]
    fn oversized_first_chunk_is_truncated() {
        let ctx = fit_to_budget(vec![pair(&"x".repeat(9000), "big.pdf")], 6000);
        assert_eq!(ctx.chunks.len(), 1);
        assert_eq!(ctx.total_chars(), 6000);
    }

    #[test]
    fn sources_deduplicated() {
        let ctx = fit_to_budget(vec![pair("one", "a.pdf"), pair("two", "a.pdf")], 6000);
        assert_eq!(ctx.chunks.len(), 2);
        assert_eq!(ctx.source_files, vec!["a.pdf"]);
    }

    #[test]
    fn strategy_parses_config_names() {
        assert_eq!(
            "vector".parse::<RetrievalStrategy>().unwrap(),
            RetrievalStrategy::VectorSearch
        );
        assert_eq!(
            "local".parse::<RetrievalStrategy>().unwrap(),
            RetrievalStrategy::LocalSample
        );
        assert!("random".parse::<RetrievalStrategy>().is_err());
    }
}
