//! Public request/response structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{NextAction, TutorSession, UnderstandingLevel};
use crate::progress::ProgressRecord;

#[derive(Serialize)]
pub struct HealthOut {
    pub status: &'static str,
    pub llm_initialized: bool,
    pub active_sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct StartSessionIn {
    #[serde(rename = "studentId")]
    pub student_id: String,
    pub topic: String,
    #[serde(rename = "understandingLevel", default)]
    pub understanding_level: Option<String>,
}

/// Counters snapshot shared by the start/answer/progress responses.
#[derive(Serialize)]
pub struct SessionStateOut {
    pub topic: String,
    pub understanding_level: UnderstandingLevel,
    pub questions_asked: u32,
    pub correct_answers: u32,
    pub accuracy: f64,
    pub next_action: NextAction,
    pub session_active: bool,
}

impl SessionStateOut {
    pub fn from_session(s: &TutorSession) -> Self {
        Self {
            topic: s.topic.clone(),
            understanding_level: s.understanding_level,
            questions_asked: s.questions_asked,
            correct_answers: s.correct_answers,
            accuracy: s.accuracy_pct(),
            next_action: s.next_action,
            session_active: s.active,
        }
    }
}

#[derive(Serialize)]
pub struct StartSessionOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub message: String,
    pub question: String,
    pub state: SessionStateOut,
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub answer: String,
}

#[derive(Serialize)]
pub struct AnswerOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// Evaluation feedback text.
    pub message: String,
    pub is_correct: bool,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub state: SessionStateOut,
}

#[derive(Serialize)]
pub struct SessionProgressOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub state: SessionStateOut,
}

#[derive(Serialize)]
pub struct StudentProgressOut {
    #[serde(rename = "studentId")]
    pub student_id: String,
    pub summary: String,
    pub progress: ProgressRecord,
}

#[derive(Serialize)]
pub struct EndSessionOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub message: String,
    pub summary: SessionStateOut,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}
