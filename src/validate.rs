//! Validation of raw model output into [`GeneratedQuestion`]s.
//!
//! This is the only place untrusted generative output becomes a typed
//! domain value. The raw text is parsed into a loosely-typed JSON value
//! first, then each field is checked explicitly. Anything ambiguous is
//! rejected with [`PipelineError::SchemaViolation`]; nothing is guessed.
//!
//! `topic_area` and `difficulty_level` are always overwritten with the
//! requested values, whatever the model echoed back.

use serde_json::{Map, Value};

use crate::error::PipelineError;
use crate::models::{
    non_blank, AnswerLetter, Difficulty, GeneratedQuestion, RetrievalQuery, TopicArea,
};

const MIN_KEYWORDS: usize = 3;
const MAX_KEYWORDS: usize = 5;

/// Option fields beyond the three allowed choices.
const EXTRA_OPTIONS: [&str; 2] = ["option_d", "option_e"];

fn violation(msg: impl Into<String>) -> PipelineError {
    PipelineError::SchemaViolation(msg.into())
}

/// Parses and validates one question.
pub fn parse_and_validate(
    raw: &str,
    expected_topic: TopicArea,
    expected_difficulty: Difficulty,
) -> Result<GeneratedQuestion, PipelineError> {
    let body = strip_code_fence(raw.trim())?;
    let value: Value =
        serde_json::from_str(body).map_err(|e| violation(format!("not valid JSON: {}", e)))?;
    let obj = value
        .as_object()
        .ok_or_else(|| violation("expected a JSON object"))?;

    for extra in EXTRA_OPTIONS {
        if obj.get(extra).is_some_and(|v| !v.is_null()) {
            return Err(violation(format!(
                "unexpected field '{}': exactly three options are allowed",
                extra
            )));
        }
    }

    Ok(GeneratedQuestion {
        question_text: required_string(obj, "question_text")?,
        option_a: required_string(obj, "option_a")?,
        option_b: required_string(obj, "option_b")?,
        option_c: required_string(obj, "option_c")?,
        correct_answer: answer_letter(obj)?,
        explanation: required_string(obj, "explanation")?,
        difficulty_level: expected_difficulty,
        topic_area: expected_topic,
        subtopic: optional_string(obj, "subtopic")?,
        learning_objective_id: optional_string(obj, "learning_objective_id")?,
        keywords: keywords(obj)?,
        source_material: optional_string(obj, "source_material")?,
    })
}

/// Validates against a retrieval query; the query's subtopic and
/// learning-objective id take precedence over the model's.
pub fn validate_for_query(
    raw: &str,
    query: &RetrievalQuery,
) -> Result<GeneratedQuestion, PipelineError> {
    let mut question = parse_and_validate(raw, query.topic, query.difficulty)?;
    if let Some(sub) = non_blank(&query.subtopic) {
        question.subtopic = Some(sub.to_string());
    }
    if let Some(lo) = non_blank(&query.learning_objective_id) {
        question.learning_objective_id = Some(lo.to_string());
    }
    Ok(question)
}

/// Accepts a bare body or one wrapped in a single Markdown code fence.
fn strip_code_fence(text: &str) -> Result<&str, PipelineError> {
    let Some(rest) = text.strip_prefix("```") else {
        return Ok(text);
    };
    // Drop the info string (e.g. "json") on the opening line.
    let after_open = rest
        .split_once('\n')
        .map(|(_, body)| body)
        .ok_or_else(|| violation("unterminated code fence"))?;
    let inner = after_open
        .trim_end()
        .strip_suffix("```")
        .ok_or_else(|| violation("unterminated code fence"))?;
    if inner.contains("```") {
        return Err(violation("multiple code fences"));
    }
    Ok(inner.trim())
}

fn required_string(obj: &Map<String, Value>, field: &str) -> Result<String, PipelineError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(violation(format!("missing field '{}'", field))),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(violation(format!("field '{}' is empty", field)))
        }
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(_) => Err(violation(format!("field '{}' must be a string", field))),
    }
}

fn optional_string(obj: &Map<String, Value>, field: &str) -> Result<Option<String>, PipelineError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(violation(format!(
            "field '{}' must be a string or null",
            field
        ))),
    }
}

/// Exact match only; no trimming or case folding.
fn answer_letter(obj: &Map<String, Value>) -> Result<AnswerLetter, PipelineError> {
    let raw = match obj.get("correct_answer") {
        None | Some(Value::Null) => return Err(violation("missing field 'correct_answer'")),
        Some(Value::String(s)) => s.as_str(),
        Some(_) => return Err(violation("field 'correct_answer' must be a string")),
    };
    match raw {
        "A" => Ok(AnswerLetter::A),
        "B" => Ok(AnswerLetter::B),
        "C" => Ok(AnswerLetter::C),
        other => Err(violation(format!(
            "correct_answer must be \"A\", \"B\", or \"C\", got {:?}",
            other
        ))),
    }
}

fn keywords(obj: &Map<String, Value>) -> Result<Vec<String>, PipelineError> {
    let items = match obj.get("keywords") {
        None | Some(Value::Null) => return Err(violation("missing field 'keywords'")),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(violation("field 'keywords' must be an array")),
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
            _ => return Err(violation("keywords must be non-empty strings")),
        }
    }

    if !(MIN_KEYWORDS..=MAX_KEYWORDS).contains(&out.len()) {
        return Err(violation(format!(
            "expected {} to {} keywords, got {}",
            MIN_KEYWORDS,
            MAX_KEYWORDS,
            out.len()
        )));
    }
    Ok(out)
}
