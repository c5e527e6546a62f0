//! Answer evaluator: grades one free-text answer through the model and turns
//! the untrusted reply into a structured `Evaluation`.
//!
//! Parsing is best-effort by design: a reply with no usable JSON is absorbed
//! into a deterministic fallback, never reported as an error. Only failures
//! of the generation call itself propagate.

use tracing::{debug, instrument};

use crate::config::Prompts;
use crate::domain::Evaluation;
use crate::error::GenError;
use crate::openai::TextGenerator;
use crate::util::{extract_json_object, fill_template, trunc_for_log};

/// Grade `answer` against the current question. The expected-answer slot is a
/// topic-level stand-in; there is no knowledge base behind it.
#[instrument(level = "info", skip(gen, prompts, question, answer), fields(%topic, answer_len = answer.len()))]
pub async fn evaluate_answer(
  gen: &dyn TextGenerator,
  prompts: &Prompts,
  question: &str,
  topic: &str,
  answer: &str,
) -> Result<Evaluation, GenError> {
  let expected = format!("Key concepts related to {}", topic);
  let prompt = fill_template(
    &prompts.evaluation_template,
    &[("topic", topic), ("question", question), ("expected", &expected), ("answer", answer)],
  );
  let raw = gen.generate(&prompt).await?;
  let eval = parse_evaluation(&raw);
  debug!(target: "session", score = eval.score, correct = eval.correct, raw = %trunc_for_log(&raw, 200), "Answer evaluated");
  Ok(eval)
}

/// Turn a raw model reply into an `Evaluation`.
///
/// Takes the first brace-delimited substring and reads `score` (default 0.5),
/// `correct` (default false) and `feedback` out of it. When no such substring
/// parses, synthesizes: score 0.5, correct iff the reply contains "correct"
/// or "right" case-insensitively (so "incorrect" counts as correct — a quirk
/// kept for compatibility), feedback = the raw reply.
pub fn parse_evaluation(raw: &str) -> Evaluation {
  let parsed = extract_json_object(raw)
    .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
    .filter(|v| v.is_object());

  match parsed {
    Some(v) => Evaluation {
      score: v.get("score").and_then(|s| s.as_f64()).unwrap_or(0.5),
      correct: v.get("correct").and_then(|c| c.as_bool()).unwrap_or(false),
      feedback: v
        .get("feedback")
        .and_then(|f| f.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| raw.trim().to_string()),
    },
    None => {
      let lower = raw.to_lowercase();
      Evaluation {
        score: 0.5,
        correct: lower.contains("correct") || lower.contains("right"),
        feedback: raw.trim().to_string(),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn well_formed_json_reply_is_parsed() {
    let e = parse_evaluation(r#"{"score": 0.9, "correct": true, "feedback": "Solid answer."}"#);
    assert_eq!(e.score, 0.9);
    assert!(e.correct);
    assert_eq!(e.feedback, "Solid answer.");
  }

  #[test]
  fn json_embedded_in_prose_is_found() {
    let raw = r#"Here is my grading: {"score": 0.3, "correct": false, "feedback": "Missing the base case."} Good luck!"#;
    let e = parse_evaluation(raw);
    assert_eq!(e.score, 0.3);
    assert!(!e.correct);
  }

  #[test]
  fn missing_fields_get_typed_defaults() {
    let e = parse_evaluation(r#"{"feedback": "hmm"}"#);
    assert_eq!(e.score, 0.5);
    assert!(!e.correct);
    assert_eq!(e.feedback, "hmm");
  }

  #[test]
  fn no_json_falls_back_to_substring_check() {
    let e = parse_evaluation("That's correct! Nice reasoning.");
    assert_eq!(e.score, 0.5);
    assert!(e.correct);
    assert_eq!(e.feedback, "That's correct! Nice reasoning.");

    let e = parse_evaluation("Wrong answer, try once more.");
    assert_eq!(e.score, 0.5);
    assert!(!e.correct);
  }

  #[test]
  fn substring_check_has_known_quirks() {
    // "incorrect" contains "correct"; "Not quite right" contains "right".
    // Both are kept deliberately compatible with the substring rule.
    assert!(parse_evaluation("That is incorrect.").correct);
    assert!(parse_evaluation("Not quite right.").correct);
  }

  #[test]
  fn unparseable_braces_also_fall_back() {
    let e = parse_evaluation("{score: not json} but you were right");
    assert_eq!(e.score, 0.5);
    assert!(e.correct);
  }
}
