//! Loading tutor configuration (prompt templates) from TOML.
//!
//! See `TutorConfig` and `Prompts` for expected schema.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TutorConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompt templates used when talking to the model. Defaults reproduce the
/// tutoring prompts the backend ships with; override them in TOML to tune
/// tone/structure. Placeholders are filled with `util::fill_template`.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  /// Question generation: {topic}, {level}, {previous_context}.
  pub question_template: String,
  /// Answer grading: {topic}, {question}, {expected}, {answer}.
  pub evaluation_template: String,
  /// Concept explanation: {topic}, {level}, {question}, {answer}.
  pub explanation_template: String,
  /// Next-action decision: {topic}, {questions_asked}, {correct_answers},
  /// {accuracy}, {last_correct}, {level}.
  pub decision_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      question_template: "\
You are an expert tutor helping a student learn about {topic}.
The student's current understanding level is: {level}.

Generate a single, clear question that:
1. Is appropriate for the {level} level
2. Tests understanding of key concepts in {topic}
3. Is different from previous questions{previous_context}
4. Can be answered in 1-3 sentences

Format your response as just the question, nothing else."
        .into(),
      evaluation_template: "\
You are a tutor evaluating a student's answer.

Topic: {topic}
Question: {question}
Expected answer (key concepts): {expected}
Student's answer: {answer}

Evaluate the student's answer and provide:
1. A score from 0.0 to 1.0 (where 1.0 is fully correct)
2. Brief feedback (1-2 sentences) explaining what was correct or incorrect
3. Whether the answer demonstrates understanding (correct: true/false)

Respond in JSON format:
{
    \"score\": 0.0-1.0,
    \"correct\": true/false,
    \"feedback\": \"your feedback here\"
}"
        .into(),
      explanation_template: "\
You are a tutor explaining a concept to a student.

Topic: {topic}
Student's understanding level: {level}
Question asked: {question}
Student's answer: {answer}

Provide a clear, engaging explanation that:
1. Addresses the question directly
2. Uses examples and analogies appropriate for {level} level
3. Builds on what the student already knows
4. Is 2-4 sentences long

Format your response as just the explanation, nothing else."
        .into(),
      decision_template: "\
As a tutor, decide the next action for this student:

Topic: {topic}
Questions asked: {questions_asked}
Correct answers: {correct_answers}
Accuracy: {accuracy}%
Last answer was correct: {last_correct}
Understanding level: {level}

Decide the next action:
- \"ask_question\": Ask another question to continue learning
- \"provide_explanation\": Provide explanation if student struggled
- \"follow_up\": Ask a follow-up question on the same concept
- \"end_session\": End the session if student has mastered the topic

Respond with ONLY one of: ask_question, provide_explanation, follow_up, end_session"
        .into(),
    }
  }
}

/// Attempt to load `TutorConfig` from TUTOR_CONFIG_PATH. On any parsing/IO
/// error, returns None and the compiled-in defaults are used.
pub fn load_tutor_config_from_env() -> Option<TutorConfig> {
  let path = std::env::var("TUTOR_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<TutorConfig>(&s) {
      Ok(cfg) => {
        info!(target: "tutor_backend", %path, "Loaded tutor config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "tutor_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "tutor_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
