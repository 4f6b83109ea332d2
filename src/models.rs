//! Core data models used throughout the question generation pipeline.
//!
//! These types represent the source documents, chunks, retrieval inputs and
//! outputs, and generated questions that flow from ingestion to persistence.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// One of the ten CFA Level I curriculum topic areas.
///
/// The display name doubles as the topic's folder name under the
/// configured source root and as the `topic_area` value stored with
/// every generated question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TopicArea {
    EthicalAndProfessionalStandards,
    QuantitativeMethods,
    Economics,
    FinancialStatementAnalysis,
    CorporateIssuers,
    EquityInvestments,
    FixedIncome,
    Derivatives,
    AlternativeInvestments,
    PortfolioManagement,
}

impl TopicArea {
    pub const ALL: [TopicArea; 10] = [
        TopicArea::EthicalAndProfessionalStandards,
        TopicArea::QuantitativeMethods,
        TopicArea::Economics,
        TopicArea::FinancialStatementAnalysis,
        TopicArea::CorporateIssuers,
        TopicArea::EquityInvestments,
        TopicArea::FixedIncome,
        TopicArea::Derivatives,
        TopicArea::AlternativeInvestments,
        TopicArea::PortfolioManagement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TopicArea::EthicalAndProfessionalStandards => "Ethical and Professional Standards",
            TopicArea::QuantitativeMethods => "Quantitative Methods",
            TopicArea::Economics => "Economics",
            TopicArea::FinancialStatementAnalysis => "Financial Statement Analysis",
            TopicArea::CorporateIssuers => "Corporate Issuers",
            TopicArea::EquityInvestments => "Equity Investments",
            TopicArea::FixedIncome => "Fixed Income",
            TopicArea::Derivatives => "Derivatives",
            TopicArea::AlternativeInvestments => "Alternative Investments",
            TopicArea::PortfolioManagement => "Portfolio Management",
        }
    }

    /// Folder name under the source root holding this topic's documents.
    pub fn folder_name(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for TopicArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the display name in any case, or a slug such as
/// `fixed-income` / `fixed_income`.
impl FromStr for TopicArea {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_topic_key(s);
        TopicArea::ALL
            .into_iter()
            .find(|t| normalize_topic_key(t.as_str()) == wanted)
            .ok_or_else(|| PipelineError::InvalidTopic(s.to_string()))
    }
}

fn normalize_topic_key(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            '-' | '_' => ' ',
            other => other.to_ascii_lowercase(),
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl Serialize for TopicArea {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TopicArea {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Question difficulty level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [
        Difficulty::Beginner,
        Difficulty::Intermediate,
        Difficulty::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            _ => Err(PipelineError::InvalidRequest(format!(
                "unknown difficulty '{}': must be beginner, intermediate, or advanced",
                s
            ))),
        }
    }
}

/// An ingested source file and its extracted text.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub topic: TopicArea,
    pub file_name: String,
    pub text: String,
}

/// A bounded, paragraph-aligned slice of a [`SourceDocument`].
#[derive(Debug, Clone)]
pub struct TextChunk {
    /// File name of the document this chunk came from.
    pub source_file: String,
    /// Position within the document, contiguous from 0.
    pub ordinal: usize,
    /// Byte span `[start, end)` in the document's extracted text.
    pub span: (usize, usize),
    pub content: String,
    /// SHA-256 of `content`, hex encoded.
    pub hash: String,
}

/// Input to the retriever.
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub topic: TopicArea,
    pub subtopic: Option<String>,
    pub learning_objective_id: Option<String>,
    pub learning_objective_text: Option<String>,
    pub difficulty: Difficulty,
}

impl RetrievalQuery {
    pub fn new(topic: TopicArea, difficulty: Difficulty) -> Self {
        Self {
            topic,
            subtopic: None,
            learning_objective_id: None,
            learning_objective_text: None,
            difficulty,
        }
    }

    pub fn with_subtopic(mut self, subtopic: impl Into<String>) -> Self {
        self.subtopic = Some(subtopic.into());
        self
    }

    pub fn with_learning_objective(
        mut self,
        id: Option<String>,
        text: Option<String>,
    ) -> Self {
        self.learning_objective_id = id;
        self.learning_objective_text = text;
        self
    }

    /// Text used to embed the query for vector search:
    /// topic, subtopic and learning-objective text.
    pub fn search_text(&self) -> String {
        let mut parts = vec![self.topic.as_str().to_string()];
        if let Some(s) = non_blank(&self.subtopic) {
            parts.push(s.to_string());
        }
        if let Some(lo) = non_blank(&self.learning_objective_text) {
            parts.push(lo.to_string());
        }
        parts.join(" ")
    }
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Chunks selected for one generation request, in prompt order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedContext {
    pub chunks: Vec<String>,
    /// File names of the documents the chunks came from, deduplicated.
    pub source_files: Vec<String>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_chars(&self) -> usize {
        self.chunks.iter().map(|c| c.chars().count()).sum()
    }
}

/// A validated multiple-choice question with exactly three options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub question_text: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub correct_answer: AnswerLetter,
    pub explanation: String,
    pub difficulty_level: Difficulty,
    pub topic_area: TopicArea,
    #[serde(default)]
    pub subtopic: Option<String>,
    #[serde(default)]
    pub learning_objective_id: Option<String>,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub source_material: Option<String>,
}

/// The correct option of a three-choice question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerLetter {
    A,
    B,
    C,
}

impl AnswerLetter {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerLetter::A => "A",
            AnswerLetter::B => "B",
            AnswerLetter::C => "C",
        }
    }
}

impl fmt::Display for AnswerLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate outcome of one generation batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub requested: usize,
    pub accepted: Vec<GeneratedQuestion>,
    /// One message per failed attempt, or the single topic-level abort reason.
    pub errors: Vec<String>,
    pub source_files: Vec<String>,
    /// Set when the batch stopped because the topic had no source material.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub cancelled: bool,
}

impl BatchResult {
    pub fn new(requested: usize) -> Self {
        Self {
            requested,
            ..Default::default()
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub(crate) fn add_sources(&mut self, files: &[String]) {
        for f in files {
            if !self.source_files.contains(f) {
                self.source_files.push(f.clone());
            }
        }
    }
}
