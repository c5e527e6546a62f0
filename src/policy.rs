//! Action policy: asks the model what the session should do next and falls
//! back to a deterministic rule when the reply names no recognized action.
//!
//! Generation failures propagate; only an unrecognized reply triggers the
//! fallback table.

use tracing::{debug, instrument};

use crate::config::Prompts;
use crate::domain::{NextAction, UnderstandingLevel};
use crate::error::GenError;
use crate::openai::TextGenerator;
use crate::util::{fill_template, trunc_for_log};

#[instrument(level = "info", skip(gen, prompts), fields(%topic, questions_asked, correct_answers, last_correct))]
pub async fn decide(
  gen: &dyn TextGenerator,
  prompts: &Prompts,
  topic: &str,
  questions_asked: u32,
  correct_answers: u32,
  last_correct: bool,
  level: UnderstandingLevel,
) -> Result<NextAction, GenError> {
  let accuracy_pct = if questions_asked > 0 {
    f64::from(correct_answers) / f64::from(questions_asked) * 100.0
  } else {
    0.0
  };
  let prompt = fill_template(
    &prompts.decision_template,
    &[
      ("topic", topic),
      ("questions_asked", &questions_asked.to_string()),
      ("correct_answers", &correct_answers.to_string()),
      ("accuracy", &format!("{:.1}", accuracy_pct)),
      ("last_correct", if last_correct { "true" } else { "false" }),
      ("level", level.as_str()),
    ],
  );

  let reply = gen.generate(&prompt).await?;
  let normalized = reply.trim().to_lowercase();
  if let Some(action) = recognize_action(&normalized) {
    return Ok(action);
  }

  debug!(target: "session", reply = %trunc_for_log(&normalized, 120), "Unrecognized action reply; using fallback rule");
  Ok(fallback_action(questions_asked, correct_answers, last_correct))
}

/// Accept the reply if it contains any recognized action token, checked in
/// `RECOGNITION_ORDER`. First match in that fixed checklist wins, regardless
/// of where the tokens sit in the reply.
pub fn recognize_action(normalized_reply: &str) -> Option<NextAction> {
  NextAction::RECOGNITION_ORDER
    .iter()
    .copied()
    .find(|a| normalized_reply.contains(a.token()))
}

/// Deterministic default when the model names no action: finish a mastered
/// topic, explain after a miss, otherwise keep asking.
pub fn fallback_action(questions_asked: u32, correct_answers: u32, last_correct: bool) -> NextAction {
  let accuracy = if questions_asked > 0 {
    f64::from(correct_answers) / f64::from(questions_asked)
  } else {
    0.0
  };
  if accuracy >= 0.80 && questions_asked >= 3 {
    NextAction::EndSession
  } else if !last_correct {
    NextAction::ProvideExplanation
  } else {
    NextAction::AskQuestion
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fallback_table_matches_contract() {
    assert_eq!(fallback_action(3, 3, true), NextAction::EndSession);
    assert_eq!(fallback_action(2, 0, false), NextAction::ProvideExplanation);
    assert_eq!(fallback_action(1, 1, true), NextAction::AskQuestion);
  }

  #[test]
  fn fallback_needs_three_questions_to_end() {
    // 100% accuracy but too few questions keeps the session going.
    assert_eq!(fallback_action(2, 2, true), NextAction::AskQuestion);
    assert_eq!(fallback_action(0, 0, true), NextAction::AskQuestion);
  }

  #[test]
  fn recognition_accepts_token_inside_prose() {
    assert_eq!(recognize_action("i would end_session now"), Some(NextAction::EndSession));
    assert_eq!(recognize_action("follow_up"), Some(NextAction::FollowUp));
    assert_eq!(recognize_action("keep going!"), None);
  }

  #[test]
  fn recognition_order_is_positional_not_reply_order() {
    // Both tokens present; ask_question wins because it is checked first,
    // even though the reply names end_session first.
    assert_eq!(
      recognize_action("end_session unless you prefer ask_question"),
      Some(NextAction::AskQuestion)
    );
  }
}
