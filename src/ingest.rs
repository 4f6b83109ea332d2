//! Document ingestion: discovering and extracting a topic's source files.
//!
//! The source tree has one folder per topic display name under
//! `[sources].root`. Files are matched against the configured include
//! globs, sorted by file name, and extracted via [`crate::extract`].
//! Unreadable documents are logged and skipped.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::chunk::chunk_document;
use crate::config::{ChunkingConfig, SourcesConfig};
use crate::error::PipelineError;
use crate::extract::extract_file;
use crate::models::{SourceDocument, TextChunk, TopicArea};

/// Number of leading subtopic characters matched against file names.
const SUBTOPIC_HINT_CHARS: usize = 15;

/// Read-only view of the topic-organized source tree.
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
    include_set: GlobSet,
    chunking: ChunkingConfig,
}

impl Library {
    pub fn new(sources: &SourcesConfig, chunking: &ChunkingConfig) -> Result<Self> {
        Ok(Self {
            root: sources.root.clone(),
            include_set: build_globset(&sources.include_globs)?,
            chunking: chunking.clone(),
        })
    }

    pub fn topic_dir(&self, topic: TopicArea) -> PathBuf {
        self.root.join(topic.folder_name())
    }

    /// Lists the topic's source files, optionally narrowed by a subtopic hint.
    ///
    /// The hint keeps files whose name contains (case-insensitively) the
    /// first 15 characters of the subtopic. When nothing matches, the full
    /// topic list is returned instead.
    pub fn list_source_files(
        &self,
        topic: TopicArea,
        subtopic_hint: Option<&str>,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let dir = self.topic_dir(topic);
        if !dir.is_dir() {
            return Err(PipelineError::TopicNotFound(dir.display().to_string()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(topic = %topic, error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(&dir).unwrap_or(path);
            if self.include_set.is_match(relative) {
                files.push(path.to_path_buf());
            }
        }

        files.sort_by_key(|p| file_name_of(p));

        let Some(hint) = subtopic_hint.map(hint_prefix).filter(|h| !h.is_empty()) else {
            return Ok(files);
        };

        let matched: Vec<PathBuf> = files
            .iter()
            .filter(|p| file_name_of(p).to_lowercase().contains(&hint))
            .cloned()
            .collect();

        if matched.is_empty() {
            debug!(topic = %topic, hint = %hint, "no file matches subtopic hint; using all topic files");
            Ok(files)
        } else {
            Ok(matched)
        }
    }

    /// Extracts every listed document, skipping the ones that fail.
    ///
    /// Fails with [`PipelineError::NoSourceMaterial`] when the topic has no
    /// files or none of them could be extracted.
    pub fn load_documents(
        &self,
        topic: TopicArea,
        subtopic_hint: Option<&str>,
    ) -> Result<Vec<SourceDocument>, PipelineError> {
        let files = self.list_source_files(topic, subtopic_hint)?;

        let mut docs = Vec::with_capacity(files.len());
        for path in &files {
            let file_name = file_name_of(path);
            match extract_file(path) {
                Ok(text) => docs.push(SourceDocument {
                    topic,
                    file_name,
                    text,
                }),
                Err(source) => {
                    let err = PipelineError::Extraction {
                        file: file_name,
                        source,
                    };
                    warn!(topic = %topic, error = %err, "skipping document");
                }
            }
        }

        if docs.is_empty() {
            return Err(PipelineError::NoSourceMaterial(topic.to_string()));
        }
        Ok(docs)
    }

    /// Loads and chunks the topic's documents.
    pub fn load_chunks(
        &self,
        topic: TopicArea,
        subtopic_hint: Option<&str>,
    ) -> Result<Vec<TextChunk>, PipelineError> {
        let docs = self.load_documents(topic, subtopic_hint)?;
        let chunks: Vec<TextChunk> = docs
            .iter()
            .flat_map(|d| chunk_document(d, self.chunking.max_chars, self.chunking.min_chars))
            .collect();
        debug!(topic = %topic, documents = docs.len(), chunks = chunks.len(), "chunked topic");
        Ok(chunks)
    }
}

fn hint_prefix(hint: &str) -> String {
    hint.trim()
        .chars()
        .take(SUBTOPIC_HINT_CHARS)
        .collect::<String>()
        .to_lowercase()
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
