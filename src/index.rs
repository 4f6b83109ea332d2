//! Vector index over topic chunks.
//!
//! [`VectorIndex`] is the nearest-neighbor seam used by the retriever's
//! vector strategy. Two backends are provided:
//!
//! - [`InMemoryIndex`]: brute-force cosine over vectors held in memory;
//!   used by tests and short-lived tools.
//! - [`SqliteIndex`]: vectors persisted as little-endian `f32` BLOBs in
//!   the `index_chunks` table, populated by [`SqliteIndex::index_topic`]
//!   (`qgen index`), searched by brute-force cosine over one topic's rows.
//!
//! Both embed the query text with the configured [`EmbeddingProvider`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::{Arc, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::ingest::Library;
use crate::models::{TextChunk, TopicArea};

/// A chunk returned from similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub content: String,
    pub score: f32,
    pub source_file: String,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns up to `top_k` chunks of `topic`, most similar first.
    async fn search(&self, topic: TopicArea, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>>;
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (dot, na, nb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });
    let norm = na.sqrt() * nb.sqrt();
    if norm <= f32::EPSILON {
        0.0
    } else {
        dot / norm
    }
}

/// Little-endian `f32` BLOB, as stored in `index_chunks.embedding`.
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Sorts by score (desc), then source file and content for stable ties.
fn rank(mut scored: Vec<ScoredChunk>, top_k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source_file.cmp(&b.source_file))
            .then_with(|| a.content.cmp(&b.content))
    });
    scored.truncate(top_k);
    scored
}

// ============ In-memory ============

struct IndexedChunk {
    topic: TopicArea,
    source_file: String,
    content: String,
    vector: Vec<f32>,
}

pub struct InMemoryIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    entries: RwLock<Vec<IndexedChunk>>,
}

impl InMemoryIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Embeds and stores chunks under `topic`.
    pub async fn add_chunks(&self, topic: TopicArea, chunks: &[TextChunk]) -> Result<()> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("index lock poisoned"))?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            entries.push(IndexedChunk {
                topic,
                source_file: chunk.source_file.clone(),
                content: chunk.content.clone(),
                vector,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn search(&self, topic: TopicArea, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow::anyhow!("index lock poisoned"))?;
        let scored = entries
            .iter()
            .filter(|e| e.topic == topic)
            .map(|e| ScoredChunk {
                content: e.content.clone(),
                score: cosine_similarity(&query_vec, &e.vector),
                source_file: e.source_file.clone(),
            })
            .collect();
        Ok(rank(scored, top_k))
    }
}

// ============ SQLite ============

pub struct SqliteIndex {
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool, embedder: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            pool,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Re-chunks a topic's documents and replaces its indexed vectors.
    /// Returns the number of chunks written.
    pub async fn index_topic(&self, library: &Library, topic: TopicArea) -> Result<usize> {
        let lib = library.clone();
        let chunks = tokio::task::spawn_blocking(move || lib.load_chunks(topic, None))
            .await
            .context("chunking task panicked")??;

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            vectors.extend(self.embedder.embed(&texts).await?);
        }
        if vectors.len() != chunks.len() {
            anyhow::bail!(
                "embedding provider returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM index_chunks WHERE topic_area = ?")
            .bind(topic.as_str())
            .execute(&mut *tx)
            .await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO index_chunks (id, topic_area, source_file, ordinal, text, hash, model, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(topic.as_str())
            .bind(&chunk.source_file)
            .bind(chunk.ordinal as i64)
            .bind(&chunk.content)
            .bind(&chunk.hash)
            .bind(self.embedder.model_name())
            .bind(vector.len() as i64)
            .bind(encode_vector(vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(topic = %topic, chunks = chunks.len(), "indexed topic");
        Ok(chunks.len())
    }

    pub async fn count(&self, topic: TopicArea) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_chunks WHERE topic_area = ?")
            .bind(topic.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn search(&self, topic: TopicArea, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            "SELECT source_file, text, embedding FROM index_chunks WHERE topic_area = ?",
        )
        .bind(topic.as_str())
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.embedder.as_ref(), query).await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            scored.push(ScoredChunk {
                content: row.try_get("text")?,
                score: cosine_similarity(&query_vec, &decode_vector(&blob)),
                source_file: row.try_get("source_file")?,
            });
        }
        Ok(rank(scored, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Embeds text as letter-frequency vectors; similar wording scores high.
    struct LetterEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.to_ascii_lowercase().bytes() {
                        if c.is_ascii_lowercase() {
                            v[(c - b'a') as usize] += 1.0;
                        }
                    }
                    v
                })
                .collect())
        }
    }

    fn chunk(file: &str, content: &str) -> TextChunk {
        TextChunk {
            source_file: file.to_string(),
            ordinal: 0,
            span: (0, content.len()),
            content: content.to_string(),
            hash: String::new(),
        }
    }

    #[tokio::test]
    async fn in_memory_search_filters_topic_and_ranks() {
        let index = InMemoryIndex::new(Arc::new(LetterEmbedder));
        index
            .add_chunks(
                TopicArea::FixedIncome,
                &[chunk("bonds.txt", "zzzz yield"), chunk("duration.txt", "duration duration")],
            )
            .await
            .unwrap();
        index
            .add_chunks(TopicArea::Economics, &[chunk("econ.txt", "duration")])
            .await
            .unwrap();

        let hits = index
            .search(TopicArea::FixedIncome, "duration", 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_file, "duration.txt");
        assert!(hits[0].score >= hits[1].score);

        let top1 = index.search(TopicArea::FixedIncome, "duration", 1).await.unwrap();
        assert_eq!(top1.len(), 1);
    }

    #[tokio::test]
    async fn empty_topic_returns_nothing() {
        let index = InMemoryIndex::new(Arc::new(LetterEmbedder));
        let hits = index.search(TopicArea::Derivatives, "swap", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        let v = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn vector_blob_is_little_endian_f32() {
        let v = vec![1.0f32, -2.5, 0.125];
        let blob = encode_vector(&v);
        assert_eq!(blob.len(), 12);
        assert_eq!(&blob[0..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_vector(&blob), v);
    }

    #[tokio::test]
    async fn sqlite_index_replaces_topic_rows_and_searches() {
        use crate::config::{ChunkingConfig, SourcesConfig};
        use tempfile::TempDir;

        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("materials").join("Derivatives");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("forwards.txt"), "forward forward contracts").unwrap();
        std::fs::write(dir.join("swaps.txt"), "swap agreements exchange cash flows").unwrap();

        let library = Library::new(
            &SourcesConfig {
                root: tmp.path().join("materials"),
                include_globs: vec!["**/*.txt".into()],
            },
            &ChunkingConfig::default(),
        )
        .unwrap();

        let pool = crate::db::connect_path(&tmp.path().join("idx.sqlite")).await.unwrap();
        crate::migrate::apply_schema(&pool).await.unwrap();
        let index = SqliteIndex::new(pool.clone(), Arc::new(LetterEmbedder), 1);

        assert_eq!(index.index_topic(&library, TopicArea::Derivatives).await.unwrap(), 2);
        assert_eq!(index.index_topic(&library, TopicArea::Derivatives).await.unwrap(), 2);
        assert_eq!(index.count(TopicArea::Derivatives).await.unwrap(), 2);

        let hits = index.search(TopicArea::Derivatives, "swap agreements", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_file, "swaps.txt");

        assert!(index.search(TopicArea::Economics, "swap", 3).await.unwrap().is_empty());
        pool.close().await;
    }
}
