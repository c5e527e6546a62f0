//! Domain models: understanding levels, next actions, conversation turns,
//! answer evaluations, and the per-session state blob.

use serde::{Deserialize, Serialize};

/// Coarse three-point proficiency scale. Moves at most one step per
/// progress update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderstandingLevel {
  Beginner,
  Intermediate,
  Advanced,
}

impl UnderstandingLevel {
  pub fn as_str(self) -> &'static str {
    match self {
      UnderstandingLevel::Beginner => "beginner",
      UnderstandingLevel::Intermediate => "intermediate",
      UnderstandingLevel::Advanced => "advanced",
    }
  }

  /// Parse driver input; anything unrecognized falls back to beginner.
  pub fn parse_or_beginner(s: &str) -> Self {
    match s.trim().to_lowercase().as_str() {
      "intermediate" => UnderstandingLevel::Intermediate,
      "advanced" => UnderstandingLevel::Advanced,
      _ => UnderstandingLevel::Beginner,
    }
  }

  /// One step up the scale; advanced is the ceiling.
  pub fn promote(self) -> Self {
    match self {
      UnderstandingLevel::Beginner => UnderstandingLevel::Intermediate,
      UnderstandingLevel::Intermediate => UnderstandingLevel::Advanced,
      UnderstandingLevel::Advanced => UnderstandingLevel::Advanced,
    }
  }

  /// One step down the scale; beginner is the floor.
  pub fn demote(self) -> Self {
    match self {
      UnderstandingLevel::Advanced => UnderstandingLevel::Intermediate,
      UnderstandingLevel::Intermediate => UnderstandingLevel::Beginner,
      UnderstandingLevel::Beginner => UnderstandingLevel::Beginner,
    }
  }
}

/// What the session does next, as decided by the action policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
  AskQuestion,
  ProvideExplanation,
  FollowUp,
  EndSession,
}

impl NextAction {
  /// Order in which reply tokens are checked by the policy. This is a
  /// positional contract kept for compatibility: a reply naming several
  /// actions resolves to whichever appears first in THIS list, not first
  /// in the reply.
  pub const RECOGNITION_ORDER: [NextAction; 4] = [
    NextAction::AskQuestion,
    NextAction::ProvideExplanation,
    NextAction::FollowUp,
    NextAction::EndSession,
  ];

  pub fn token(self) -> &'static str {
    match self {
      NextAction::AskQuestion => "ask_question",
      NextAction::ProvideExplanation => "provide_explanation",
      NextAction::FollowUp => "follow_up",
      NextAction::EndSession => "end_session",
    }
  }
}

/// Who said a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  Student,
  Tutor,
}

/// One entry in the conversation log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
  pub role: Role,
  pub text: String,
}

/// Structured grading result for one answer. Transient: consumed by the
/// state machine on the turn it was produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
  /// 0.0 to 1.0.
  pub score: f64,
  pub correct: bool,
  pub feedback: String,
}

/// One tutoring conversation for one student on one topic.
///
/// Mutated exclusively by `TutorEngine` transitions; `active == false` is
/// terminal. Invariant: `correct_answers <= questions_asked`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TutorSession {
  pub student_id: String,
  pub topic: String,
  pub turns: Vec<Turn>,
  pub current_question: String,
  pub student_answer: String,
  pub last_evaluation: Option<Evaluation>,
  pub explanation_issued: bool,
  pub questions_asked: u32,
  pub correct_answers: u32,
  pub topics_covered: Vec<String>,
  pub understanding_level: UnderstandingLevel,
  pub next_action: NextAction,
  pub active: bool,
}

impl TutorSession {
  pub fn new(student_id: impl Into<String>, topic: impl Into<String>, level: UnderstandingLevel) -> Self {
    Self {
      student_id: student_id.into(),
      topic: topic.into(),
      turns: Vec::new(),
      current_question: String::new(),
      student_answer: String::new(),
      last_evaluation: None,
      explanation_issued: false,
      questions_asked: 0,
      correct_answers: 0,
      topics_covered: Vec::new(),
      understanding_level: level,
      next_action: NextAction::AskQuestion,
      active: true,
    }
  }

  pub fn push_turn(&mut self, role: Role, text: impl Into<String>) {
    self.turns.push(Turn { role, text: text.into() });
  }

  /// Fraction in [0, 1]; 0 when nothing was asked yet.
  pub fn accuracy(&self) -> f64 {
    if self.questions_asked == 0 {
      0.0
    } else {
      f64::from(self.correct_answers) / f64::from(self.questions_asked)
    }
  }

  /// Accuracy as a percentage, the shape drivers and the progress store use.
  pub fn accuracy_pct(&self) -> f64 {
    self.accuracy() * 100.0
  }

  /// Questions already asked, derived from the conversation log: tutor turns
  /// containing a question mark.
  pub fn prior_questions(&self) -> Vec<&str> {
    self
      .turns
      .iter()
      .filter(|t| t.role == Role::Tutor && t.text.contains('?'))
      .map(|t| t.text.as_str())
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn level_moves_one_step_with_floor_and_ceiling() {
    assert_eq!(UnderstandingLevel::Beginner.promote(), UnderstandingLevel::Intermediate);
    assert_eq!(UnderstandingLevel::Intermediate.promote(), UnderstandingLevel::Advanced);
    assert_eq!(UnderstandingLevel::Advanced.promote(), UnderstandingLevel::Advanced);
    assert_eq!(UnderstandingLevel::Advanced.demote(), UnderstandingLevel::Intermediate);
    assert_eq!(UnderstandingLevel::Beginner.demote(), UnderstandingLevel::Beginner);
  }

  #[test]
  fn unrecognized_level_input_defaults_to_beginner() {
    assert_eq!(UnderstandingLevel::parse_or_beginner("Advanced"), UnderstandingLevel::Advanced);
    assert_eq!(UnderstandingLevel::parse_or_beginner("expert"), UnderstandingLevel::Beginner);
    assert_eq!(UnderstandingLevel::parse_or_beginner(""), UnderstandingLevel::Beginner);
  }

  #[test]
  fn prior_questions_are_tutor_turns_with_question_marks() {
    let mut s = TutorSession::new("s1", "Recursion", UnderstandingLevel::Beginner);
    s.push_turn(Role::Tutor, "What is a base case?");
    s.push_turn(Role::Student, "The stopping condition?");
    s.push_turn(Role::Tutor, "Good work.");
    s.push_turn(Role::Tutor, "How does the stack unwind?");
    assert_eq!(s.prior_questions(), vec!["What is a base case?", "How does the stack unwind?"]);
  }

  #[test]
  fn accuracy_is_zero_before_any_question() {
    let s = TutorSession::new("s1", "Rust", UnderstandingLevel::Beginner);
    assert_eq!(s.accuracy(), 0.0);
  }
}
