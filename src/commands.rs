//! CLI command implementations. Each `run_*` prints its report to stdout.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::batch::NoPacer;
use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::index::SqliteIndex;
use crate::ingest::Library;
use crate::migrate;
use crate::models::{Difficulty, RetrievalQuery, TopicArea};
use crate::pipeline::build_generator;
use crate::store::{QuestionStore, SqliteQuestionStore};

/// Arguments of `qgen generate`.
#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub topic: String,
    pub difficulty: String,
    pub count: usize,
    pub subtopic: Option<String>,
    pub lo_id: Option<String>,
    pub lo_text: Option<String>,
    pub save: bool,
    pub no_delay: bool,
}

pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    println!("Database initialized successfully.");
    Ok(())
}

/// Lists every topic with its source-file count and stored questions.
pub async fn run_topics(config: &Config) -> Result<()> {
    let library = Library::new(&config.sources, &config.chunking)?;
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let store = SqliteQuestionStore::new(pool.clone());

    println!("{:<44} {:>7} {:>10}", "TOPIC", "FILES", "QUESTIONS");
    for topic in TopicArea::ALL {
        let files = match library.list_source_files(topic, None) {
            Ok(files) => files.len().to_string(),
            Err(_) => "-".to_string(),
        };
        let questions = store.count_questions(Some(topic)).await?;
        println!("{:<44} {:>7} {:>10}", topic.as_str(), files, questions);
    }

    pool.close().await;
    Ok(())
}

/// Dry-run of ingestion and chunking for one topic.
pub async fn run_chunk(config: &Config, topic: &str, subtopic: Option<&str>) -> Result<()> {
    let topic: TopicArea = topic.parse()?;
    let library = Library::new(&config.sources, &config.chunking)?;

    let hint = subtopic.map(str::to_string);
    let lib = library.clone();
    let docs = tokio::task::spawn_blocking(move || lib.load_documents(topic, hint.as_deref()))
        .await
        .context("document loading task failed")??;

    println!("chunk {} (dry-run)", topic);
    let mut total = 0usize;
    for doc in &docs {
        let chunks = crate::chunk::chunk_document(
            doc,
            config.chunking.max_chars,
            config.chunking.min_chars,
        );
        let chars: usize = chunks.iter().map(|c| c.content.chars().count()).sum();
        let avg = if chunks.is_empty() { 0 } else { chars / chunks.len() };
        println!(
            "  {:<40} chunks: {:>4}  avg chars: {:>5}",
            doc.file_name,
            chunks.len(),
            avg
        );
        total += chunks.len();
    }
    println!("  documents: {}", docs.len());
    println!("  chunks: {}", total);
    Ok(())
}

/// Embeds topic chunks into the SQLite vector index.
pub async fn run_index(config: &Config, target: &str) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let topics: Vec<TopicArea> = if target.eq_ignore_ascii_case("all") {
        TopicArea::ALL.to_vec()
    } else {
        vec![target.parse()?]
    };

    let library = Library::new(&config.sources, &config.chunking)?;
    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let index = SqliteIndex::new(pool.clone(), provider, config.embedding.batch_size);

    println!("index");
    let mut failed = 0usize;
    for topic in topics {
        match index.index_topic(&library, topic).await {
            Ok(n) => println!("  {:<44} {} chunks", topic.as_str(), n),
            Err(e) => {
                failed += 1;
                println!("  {:<44} failed: {:#}", topic.as_str(), e);
            }
        }
    }

    pool.close().await;
    if failed > 0 {
        bail!("{} topic(s) failed to index", failed);
    }
    Ok(())
}

/// Runs one batch and prints the result as JSON. Ctrl-C stops the batch
/// after the in-flight attempt.
pub async fn run_generate(config: &Config, args: GenerateArgs) -> Result<()> {
    let topic: TopicArea = args.topic.parse()?;
    let difficulty: Difficulty = args.difficulty.parse()?;

    let mut query =
        RetrievalQuery::new(topic, difficulty).with_learning_objective(args.lo_id, args.lo_text);
    query.subtopic = args.subtopic;

    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let mut generator = build_generator(config, &pool)?;
    if args.no_delay {
        generator = generator.with_pacer(Arc::new(NoPacer));
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted; finishing the current attempt.");
            on_signal.cancel();
        }
    });

    let result = generator
        .generate_batch_with_cancel(&query, args.count, &cancel)
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if args.save && !result.accepted.is_empty() {
        let store = SqliteQuestionStore::new(pool.clone());
        let saved = store.insert_questions(&result.accepted).await?;
        eprintln!("Saved {} question(s).", saved);
    }

    pool.close().await;

    if let Some(reason) = result.aborted {
        bail!("batch aborted: {}", reason);
    }
    Ok(())
}
