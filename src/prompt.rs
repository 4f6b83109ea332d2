//! Generation prompt assembly.
//!
//! [`build_prompt`] is pure string assembly: identical inputs always
//! produce byte-identical prompts.

use std::fmt::Write;

use crate::models::{non_blank, Difficulty, RetrievalQuery, RetrievedContext};

const GUIDELINES: &str = "\
You are writing one CFA Level I exam-style multiple-choice question.

Question-writing guidelines:
- Provide exactly 3 answer options (A, B, C). Exactly one option is correct.
- Phrase the stem with qualifiers such as \"most likely\", \"least likely\", \"most appropriate\", or \"best describes\" where natural.
- Test foundational concepts and their application, not trivia.
- Avoid calculator-heavy arithmetic; any numbers must be workable by hand in under a minute.
- Use a formal, precise tone consistent with the CFA Institute curriculum.
- Distractors must be plausible and reflect common misconceptions.
- The question, the correct answer, and the explanation MUST be derived only from the SOURCE MATERIAL below. Do not introduce facts, figures, or terminology that the source material does not support.";

const OUTPUT_CONTRACT: &str = "\
Respond with a single JSON object and nothing else: no Markdown, no commentary.
Use exactly these fields:
{
  \"question_text\": string,
  \"option_a\": string,
  \"option_b\": string,
  \"option_c\": string,
  \"correct_answer\": one of \"A\" | \"B\" | \"C\",
  \"explanation\": string explaining why the correct option is right and the others are wrong,
  \"difficulty_level\": one of \"beginner\" | \"intermediate\" | \"advanced\",
  \"topic_area\": string,
  \"subtopic\": string or null,
  \"learning_objective_id\": string or null,
  \"keywords\": array of 3 to 5 short strings,
  \"source_material\": string naming the source passage the answer is grounded in
}
Do not include any other option fields.";

const NO_CONTEXT: &str = "(no source material was retrieved)";

fn difficulty_guidance(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Beginner => "recall and understanding of a single definition or relationship",
        Difficulty::Intermediate => "applying a concept to a short scenario",
        Difficulty::Advanced => "analysis that connects two or more concepts or evaluates a scenario",
    }
}

/// Builds the prompt for one question.
pub fn build_prompt(query: &RetrievalQuery, context: &RetrievedContext) -> String {
    let mut out = String::with_capacity(GUIDELINES.len() + context.total_chars() + 2048);

    out.push_str(GUIDELINES);
    out.push_str("\n\nPARAMETERS:\n");
    // Writing to a String cannot fail.
    let _ = writeln!(out, "- Topic area: {}", query.topic);
    if let Some(sub) = non_blank(&query.subtopic) {
        let _ = writeln!(out, "- Subtopic / reading: {}", sub);
    }
    let _ = writeln!(
        out,
        "- Difficulty: {} ({})",
        query.difficulty,
        difficulty_guidance(query.difficulty)
    );
    match (
        non_blank(&query.learning_objective_id),
        non_blank(&query.learning_objective_text),
    ) {
        (Some(id), Some(text)) => {
            let _ = writeln!(out, "- Learning objective {}: {}", id, text);
        }
        (Some(id), None) => {
            let _ = writeln!(out, "- Learning objective: {}", id);
        }
        (None, Some(text)) => {
            let _ = writeln!(out, "- Learning objective: {}", text);
        }
        (None, None) => {}
    }

    out.push_str("\nSOURCE MATERIAL:\n");
    if context.is_empty() {
        out.push_str(NO_CONTEXT);
        out.push('\n');
    } else {
        for (i, chunk) in context.chunks.iter().enumerate() {
            let _ = writeln!(out, "--- excerpt {} ---", i + 1);
            out.push_str(chunk);
            out.push('\n');
        }
        out.push_str("--- end of source material ---\n");
    }

    out.push_str("\nOUTPUT FORMAT:\n");
    out.push_str(OUTPUT_CONTRACT);
    out.push('\n');
    out
}
