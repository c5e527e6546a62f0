//! Session state machine: sequences question generation, answer intake,
//! evaluation, optional explanation, and the next-action decision for one
//! tutoring session.
//!
//! Flow per answered turn:
//!   evaluate -> update_progress -> decide_next
//!     -> (explain -> decide_next, at most once)
//!     -> generate_question when the session keeps going.
//!
//! A generation failure aborts the turn where it happened; counters keep the
//! values committed up to that point (no transactional rollback).

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::Prompts;
use crate::domain::{Evaluation, NextAction, Role, TutorSession, UnderstandingLevel};
use crate::error::SessionError;
use crate::evaluator;
use crate::openai::TextGenerator;
use crate::policy;
use crate::progress::ProgressStore;
use crate::util::fill_template;

/// What one answered turn produced, beyond the mutated session itself.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
  pub evaluation: Evaluation,
  pub explanation: Option<String>,
  pub next_question: Option<String>,
}

/// Drives all session transitions. Holds the generation seam, the prompt
/// templates, and the progress store.
#[derive(Clone)]
pub struct TutorEngine {
  generator: Arc<dyn TextGenerator>,
  prompts: Prompts,
  progress: Arc<ProgressStore>,
}

impl TutorEngine {
  pub fn new(generator: Arc<dyn TextGenerator>, prompts: Prompts, progress: Arc<ProgressStore>) -> Self {
    Self { generator, prompts, progress }
  }

  /// Create and initialize a session, then generate its first question.
  #[instrument(level = "info", skip(self), fields(%student_id, %topic))]
  pub async fn start_session(
    &self,
    student_id: &str,
    topic: &str,
    level: UnderstandingLevel,
  ) -> Result<(TutorSession, String), SessionError> {
    let mut session = TutorSession::new(student_id, topic, level);
    self.initialize(&mut session).await;
    let question = self.generate_question(&mut session).await?;
    Ok((session, question))
  }

  /// First-call setup: pick up the last-known level for this topic from the
  /// progress store, register the topic, and arm the session.
  pub async fn initialize(&self, session: &mut TutorSession) {
    if let Some(level) = self.progress.level_for(&session.student_id, &session.topic).await {
      session.understanding_level = level;
    }
    if !session.topics_covered.contains(&session.topic) {
      let topic = session.topic.clone();
      session.topics_covered.push(topic);
    }
    session.active = true;
    session.next_action = NextAction::AskQuestion;
    info!(
      target: "session",
      student_id = %session.student_id,
      topic = %session.topic,
      level = session.understanding_level.as_str(),
      "Session initialized"
    );
  }

  /// Ask the model for a fresh question, conditioned on topic, level, and the
  /// last few questions already asked.
  #[instrument(level = "info", skip(self, session), fields(topic = %session.topic))]
  pub async fn generate_question(&self, session: &mut TutorSession) -> Result<String, SessionError> {
    let prior = session.prior_questions();
    let previous_context = if prior.is_empty() {
      String::new()
    } else {
      let recent: Vec<&str> = prior.iter().rev().take(3).rev().copied().collect();
      format!("\nPrevious questions asked: {}", recent.join(", "))
    };

    let prompt = fill_template(
      &self.prompts.question_template,
      &[
        ("topic", &session.topic),
        ("level", session.understanding_level.as_str()),
        ("previous_context", &previous_context),
      ],
    );
    let question = self.generator.generate(&prompt).await?.trim().to_string();

    session.current_question = question.clone();
    session.push_turn(Role::Tutor, question.clone());
    Ok(question)
  }

  /// Record the student's answer. Fails on a terminated session; clears any
  /// prior evaluation so the turn starts clean.
  pub fn submit_answer(&self, session: &mut TutorSession, answer: &str) -> Result<(), SessionError> {
    if !session.active {
      return Err(SessionError::Inactive);
    }
    session.student_answer = answer.to_string();
    session.push_turn(Role::Student, answer);
    session.last_evaluation = None;
    Ok(())
  }

  /// Grade the pending answer, bump counters, and log the feedback as a
  /// tutor turn.
  pub async fn evaluate(&self, session: &mut TutorSession) -> Result<Evaluation, SessionError> {
    let eval = evaluator::evaluate_answer(
      self.generator.as_ref(),
      &self.prompts,
      &session.current_question,
      &session.topic,
      &session.student_answer,
    )
    .await?;

    session.questions_asked += 1;
    if eval.correct {
      session.correct_answers += 1;
    }
    session.push_turn(Role::Tutor, eval.feedback.clone());
    session.last_evaluation = Some(eval.clone());
    Ok(eval)
  }

  /// Write the session through to the progress store, then move the
  /// understanding level by at most one step based on accuracy so far.
  pub async fn update_progress(&self, session: &mut TutorSession) -> Result<(), SessionError> {
    self.progress.update(session).await?;

    let accuracy = session.accuracy();
    if accuracy >= 0.80 && session.questions_asked >= 3 {
      session.understanding_level = session.understanding_level.promote();
    } else if accuracy < 0.50 {
      session.understanding_level = session.understanding_level.demote();
    }
    Ok(())
  }

  /// Ask the policy what to do next. An `EndSession` decision terminates the
  /// session immediately.
  pub async fn decide_next(&self, session: &mut TutorSession) -> Result<NextAction, SessionError> {
    let last_correct = session.last_evaluation.as_ref().map(|e| e.correct).unwrap_or(true);
    let action = policy::decide(
      self.generator.as_ref(),
      &self.prompts,
      &session.topic,
      session.questions_asked,
      session.correct_answers,
      last_correct,
      session.understanding_level,
    )
    .await?;

    session.next_action = action;
    if action == NextAction::EndSession {
      session.active = false;
      info!(target: "session", student_id = %session.student_id, "Session complete");
    }
    Ok(action)
  }

  /// Generate an explanation for the current question/answer pair and log it
  /// as a tutor turn with an explicit marker prefix.
  #[instrument(level = "info", skip(self, session), fields(topic = %session.topic))]
  pub async fn explain(&self, session: &mut TutorSession) -> Result<String, SessionError> {
    let prompt = fill_template(
      &self.prompts.explanation_template,
      &[
        ("topic", &session.topic),
        ("level", session.understanding_level.as_str()),
        ("question", &session.current_question),
        ("answer", &session.student_answer),
      ],
    );
    let explanation = self.generator.generate(&prompt).await?.trim().to_string();

    session.explanation_issued = true;
    session.push_turn(Role::Tutor, format!("Explanation: {}", explanation));
    Ok(explanation)
  }

  /// Run one full answered turn. At most one explanation is issued per turn;
  /// a follow-up decision after it that still says "explain" is carried in
  /// `next_action` but not acted on until the driver comes back.
  #[instrument(level = "info", skip(self, session, answer), fields(student_id = %session.student_id, answer_len = answer.len()))]
  pub async fn answer_turn(
    &self,
    session: &mut TutorSession,
    answer: &str,
  ) -> Result<AnswerOutcome, SessionError> {
    self.submit_answer(session, answer)?;
    let evaluation = self.evaluate(session).await?;
    self.update_progress(session).await?;
    let mut action = self.decide_next(session).await?;

    let explanation = if action == NextAction::ProvideExplanation {
      let text = self.explain(session).await?;
      action = self.decide_next(session).await?;
      Some(text)
    } else {
      None
    };

    let next_question = if session.active
      && matches!(action, NextAction::AskQuestion | NextAction::FollowUp)
    {
      Some(self.generate_question(session).await?)
    } else {
      None
    };
    session.student_answer.clear();

    Ok(AnswerOutcome { evaluation, explanation, next_question })
  }

  /// Force-terminate: one final progress write, then deactivate.
  pub async fn end_session(&self, session: &mut TutorSession) -> Result<(), SessionError> {
    self.progress.update(session).await?;
    session.active = false;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::GenError;
  use async_trait::async_trait;

  /// Routes each prompt to a canned reply based on which template produced
  /// it. `Err` entries simulate service failures for that call kind.
  struct ScriptedGen {
    question: Result<String, GenError>,
    evaluation: Result<String, GenError>,
    explanation: Result<String, GenError>,
    decision: Result<String, GenError>,
  }

  impl ScriptedGen {
    fn ok(question: &str, evaluation: &str, explanation: &str, decision: &str) -> Self {
      Self {
        question: Ok(question.into()),
        evaluation: Ok(evaluation.into()),
        explanation: Ok(explanation.into()),
        decision: Ok(decision.into()),
      }
    }
  }

  #[async_trait]
  impl TextGenerator for ScriptedGen {
    async fn generate(&self, prompt: &str) -> Result<String, GenError> {
      let slot = if prompt.contains("Respond in JSON format") {
        &self.evaluation
      } else if prompt.contains("Respond with ONLY one of") {
        &self.decision
      } else if prompt.contains("just the explanation") {
        &self.explanation
      } else {
        &self.question
      };
      slot.clone()
    }
  }

  fn engine_with(gen: ScriptedGen, progress: Arc<ProgressStore>) -> TutorEngine {
    TutorEngine::new(Arc::new(gen), Prompts::default(), progress)
  }

  fn temp_store(dir: &tempfile::TempDir) -> Arc<ProgressStore> {
    Arc::new(ProgressStore::open(dir.path().join("progress.json")))
  }

  #[tokio::test]
  async fn three_correct_answers_promote_and_end_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = temp_store(&dir);
    // Decision reply names no action, so the deterministic fallback drives
    // the loop: keep asking until 3/3, then end.
    let gen = ScriptedGen::ok(
      "What is a base case?",
      r#"{"score": 1.0, "correct": true, "feedback": "Exactly right."}"#,
      "unused",
      "hmm, not sure",
    );
    let engine = engine_with(gen, store.clone());

    let (mut session, question) =
      engine.start_session("s1", "Recursion", UnderstandingLevel::Beginner).await.unwrap();
    assert_eq!(question, "What is a base case?");
    assert!(session.active);

    for i in 1..=3u32 {
      let outcome = engine.answer_turn(&mut session, "when the input stops shrinking").await.unwrap();
      assert_eq!(session.questions_asked, i);
      assert_eq!(session.correct_answers, i);
      assert!(session.correct_answers <= session.questions_asked);
      assert!(outcome.explanation.is_none());
      if i < 3 {
        assert!(outcome.next_question.is_some());
        assert!(session.active);
      } else {
        assert!(outcome.next_question.is_none());
        assert!(!session.active);
      }
    }

    assert_eq!(session.understanding_level, UnderstandingLevel::Intermediate);
    assert_eq!(session.next_action, NextAction::EndSession);
    assert_eq!(store.get("s1").await.sessions.len(), 3);
  }

  #[tokio::test]
  async fn incorrect_answer_gets_one_explanation_per_turn() {
    let dir = tempfile::tempdir().unwrap();
    let gen = ScriptedGen::ok(
      "What does ownership mean?",
      r#"{"score": 0.2, "correct": false, "feedback": "Not there yet."}"#,
      "Each value has a single owner responsible for freeing it.",
      "no recognizable action",
    );
    let engine = engine_with(gen, temp_store(&dir));

    let (mut session, _q) =
      engine.start_session("s2", "Rust ownership", UnderstandingLevel::Intermediate).await.unwrap();
    let outcome = engine.answer_turn(&mut session, "something vague").await.unwrap();

    assert_eq!(session.questions_asked, 1);
    assert_eq!(session.correct_answers, 0);
    assert_eq!(
      outcome.explanation.as_deref(),
      Some("Each value has a single owner responsible for freeing it.")
    );
    assert!(session.explanation_issued);
    // The post-explanation decision still says "explain"; the turn stops
    // there instead of looping.
    assert_eq!(session.next_action, NextAction::ProvideExplanation);
    assert!(outcome.next_question.is_none());
    assert!(session.active);

    let marked = session.turns.iter().any(|t| t.text.starts_with("Explanation: "));
    assert!(marked, "explanation turn should carry the marker prefix");
  }

  #[tokio::test]
  async fn low_accuracy_demotes_one_step_to_the_floor() {
    let dir = tempfile::tempdir().unwrap();
    let gen = ScriptedGen::ok(
      "Q?",
      r#"{"score": 0.0, "correct": false, "feedback": "No."}"#,
      "explanation",
      "ask_question",
    );
    let engine = engine_with(gen, temp_store(&dir));

    let (mut session, _q) =
      engine.start_session("s3", "Graphs", UnderstandingLevel::Intermediate).await.unwrap();

    engine.answer_turn(&mut session, "wrong").await.unwrap();
    assert_eq!(session.understanding_level, UnderstandingLevel::Beginner);

    engine.answer_turn(&mut session, "wrong again").await.unwrap();
    assert_eq!(session.understanding_level, UnderstandingLevel::Beginner);
  }

  #[tokio::test]
  async fn initialize_prefers_the_stored_level_for_the_topic() {
    let dir = tempfile::tempdir().unwrap();
    let store = temp_store(&dir);

    let mut earlier = TutorSession::new("s4", "Recursion", UnderstandingLevel::Advanced);
    earlier.topics_covered.push("Recursion".into());
    store.update(&earlier).await.unwrap();

    let gen = ScriptedGen::ok("Q?", "{}", "e", "ask_question");
    let engine = engine_with(gen, store);

    let (session, _q) =
      engine.start_session("s4", "Recursion", UnderstandingLevel::Beginner).await.unwrap();
    assert_eq!(session.understanding_level, UnderstandingLevel::Advanced);
    assert_eq!(session.topics_covered, vec!["Recursion"]);
  }

  #[tokio::test]
  async fn submitting_to_an_ended_session_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let gen = ScriptedGen::ok("Q?", "{}", "e", "end_session");
    let engine = engine_with(gen, temp_store(&dir));

    let (mut session, _q) =
      engine.start_session("s5", "Sorting", UnderstandingLevel::Beginner).await.unwrap();
    engine.end_session(&mut session).await.unwrap();

    let err = engine.answer_turn(&mut session, "too late").await.unwrap_err();
    assert!(matches!(err, SessionError::Inactive));
    assert_eq!(session.questions_asked, 0);
  }

  #[tokio::test]
  async fn decision_failure_aborts_the_turn_but_keeps_committed_counters() {
    let dir = tempfile::tempdir().unwrap();
    let gen = ScriptedGen {
      question: Ok("Q?".into()),
      evaluation: Ok(r#"{"score": 1.0, "correct": true, "feedback": "Yes."}"#.into()),
      explanation: Ok("e".into()),
      decision: Err(GenError::RateLimited("slow down".into())),
    };
    let engine = engine_with(gen, temp_store(&dir));

    let (mut session, _q) =
      engine.start_session("s6", "Hashing", UnderstandingLevel::Beginner).await.unwrap();
    let err = engine.answer_turn(&mut session, "buckets").await.unwrap_err();

    assert!(matches!(err, SessionError::Generation(GenError::RateLimited(_))));
    // Evaluation committed before the failure; nothing is rolled back.
    assert_eq!(session.questions_asked, 1);
    assert_eq!(session.correct_answers, 1);
    assert!(session.active);
  }
}
