//! Durable per-student progress: append-only session summaries plus merged
//! lifetime counters, persisted as one JSON file.
//!
//! The whole store (all students) is rewritten on every update. There is no
//! cross-process locking; concurrent writers race and the last one wins.
//! Accepted as a documented limitation of the persistence medium.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::domain::{TutorSession, UnderstandingLevel};

/// One finished (or checkpointed) session, as stored on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSummary {
  pub timestamp: String,
  pub topic: String,
  pub questions_asked: u32,
  pub correct_answers: u32,
  /// Percentage, 0-100.
  pub accuracy: f64,
}

/// Lifetime aggregate for one student. `sessions` is append-only; the
/// topic-to-level map keeps exactly one current value per topic.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProgressRecord {
  #[serde(default)]
  pub sessions: Vec<SessionSummary>,
  #[serde(default)]
  pub topics_covered: Vec<String>,
  #[serde(default)]
  pub total_questions: u64,
  #[serde(default)]
  pub total_correct: u64,
  #[serde(default)]
  pub understanding_levels: HashMap<String, UnderstandingLevel>,
}

/// Keyed student-id → record store with write-through JSON persistence.
pub struct ProgressStore {
  path: PathBuf,
  records: RwLock<HashMap<String, ProgressRecord>>,
}

impl ProgressStore {
  /// Open the store, reading any existing file. A missing or unreadable file
  /// starts an empty store rather than failing startup.
  pub fn open(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    let records = match std::fs::read_to_string(&path) {
      Ok(s) => match serde_json::from_str::<HashMap<String, ProgressRecord>>(&s) {
        Ok(map) => {
          info!(target: "tutor_backend", path = %path.display(), students = map.len(), "Loaded progress file");
          map
        }
        Err(e) => {
          warn!(target: "tutor_backend", path = %path.display(), error = %e, "Progress file unparseable; starting empty");
          HashMap::new()
        }
      },
      Err(_) => HashMap::new(),
    };
    Self { path, records: RwLock::new(records) }
  }

  /// Record for a student, lazily created empty on first access.
  pub async fn get(&self, student_id: &str) -> ProgressRecord {
    let mut records = self.records.write().await;
    records.entry(student_id.to_string()).or_default().clone()
  }

  /// Last-known understanding level for a student/topic pair, if any.
  pub async fn level_for(&self, student_id: &str, topic: &str) -> Option<UnderstandingLevel> {
    let records = self.records.read().await;
    records
      .get(student_id)
      .and_then(|r| r.understanding_levels.get(topic))
      .copied()
  }

  /// Append a session summary, merge topics and totals, set the topic level,
  /// then rewrite the whole file.
  #[instrument(level = "info", skip(self, session), fields(student_id = %session.student_id, topic = %session.topic))]
  pub async fn update(&self, session: &TutorSession) -> std::io::Result<()> {
    {
      let mut records = self.records.write().await;
      let record = records.entry(session.student_id.clone()).or_default();

      record.sessions.push(SessionSummary {
        timestamp: Utc::now().to_rfc3339(),
        topic: session.topic.clone(),
        questions_asked: session.questions_asked,
        correct_answers: session.correct_answers,
        accuracy: session.accuracy_pct(),
      });

      for topic in &session.topics_covered {
        if !record.topics_covered.contains(topic) {
          record.topics_covered.push(topic.clone());
        }
      }

      record.total_questions += u64::from(session.questions_asked);
      record.total_correct += u64::from(session.correct_answers);
      record
        .understanding_levels
        .insert(session.topic.clone(), session.understanding_level);
    }
    self.persist().await
  }

  /// Human-readable aggregate for a student.
  pub async fn summarize(&self, student_id: &str) -> String {
    let record = self.get(student_id).await;
    if record.sessions.is_empty() {
      return "No previous sessions found.".into();
    }

    let overall_accuracy = if record.total_questions > 0 {
      record.total_correct as f64 / record.total_questions as f64 * 100.0
    } else {
      0.0
    };
    let topics = if record.topics_covered.is_empty() {
      "None".to_string()
    } else {
      record.topics_covered.join(", ")
    };

    format!(
      "Progress Summary for Student: {}\n\
       ========================================\n\
       Total Sessions: {}\n\
       Total Questions: {}\n\
       Correct Answers: {}\n\
       Overall Accuracy: {:.1}%\n\
       Topics Covered: {}",
      student_id,
      record.sessions.len(),
      record.total_questions,
      record.total_correct,
      overall_accuracy,
      topics
    )
  }

  async fn persist(&self) -> std::io::Result<()> {
    let snapshot = { self.records.read().await.clone() };
    let json = serde_json::to_string_pretty(&snapshot)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(&self.path, json)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::TutorSession;

  fn finished_session(student: &str, topic: &str, asked: u32, correct: u32) -> TutorSession {
    let mut s = TutorSession::new(student, topic, UnderstandingLevel::Beginner);
    s.topics_covered.push(topic.to_string());
    s.questions_asked = asked;
    s.correct_answers = correct;
    s
  }

  #[tokio::test]
  async fn summaries_are_append_only_and_topics_deduped() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProgressStore::open(dir.path().join("progress.json"));

    store.update(&finished_session("s1", "Recursion", 3, 3)).await.unwrap();
    store.update(&finished_session("s1", "Recursion", 2, 1)).await.unwrap();

    let record = store.get("s1").await;
    assert_eq!(record.sessions.len(), 2);
    assert_eq!(record.topics_covered, vec!["Recursion"]);
    assert_eq!(record.total_questions, 5);
    assert_eq!(record.total_correct, 4);
  }

  #[tokio::test]
  async fn latest_level_write_wins_per_topic() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProgressStore::open(dir.path().join("progress.json"));

    let mut first = finished_session("s1", "Rust", 3, 3);
    first.understanding_level = UnderstandingLevel::Intermediate;
    store.update(&first).await.unwrap();

    let mut second = finished_session("s1", "Rust", 4, 1);
    second.understanding_level = UnderstandingLevel::Beginner;
    store.update(&second).await.unwrap();

    assert_eq!(store.level_for("s1", "Rust").await, Some(UnderstandingLevel::Beginner));
    assert_eq!(store.level_for("s1", "Go").await, None);
  }

  #[tokio::test]
  async fn file_round_trip_reproduces_the_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.json");

    let store = ProgressStore::open(&path);
    store.update(&finished_session("s1", "Sorting", 4, 2)).await.unwrap();
    drop(store);

    let reopened = ProgressStore::open(&path);
    let record = reopened.get("s1").await;
    assert_eq!(record.sessions.len(), 1);
    assert_eq!(record.sessions[0].topic, "Sorting");
    assert_eq!(record.sessions[0].accuracy, 50.0);
  }

  #[tokio::test]
  async fn summarize_is_idempotent_and_has_empty_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProgressStore::open(dir.path().join("progress.json"));

    assert_eq!(store.summarize("nobody").await, "No previous sessions found.");

    store.update(&finished_session("s1", "Recursion", 3, 3)).await.unwrap();
    let a = store.summarize("s1").await;
    let b = store.summarize("s1").await;
    assert_eq!(a, b);
    assert!(a.contains("Total Sessions: 1"));
    assert!(a.contains("Overall Accuracy: 100.0%"));
    assert!(a.contains("Topics Covered: Recursion"));
  }
}
