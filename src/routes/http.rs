//! HTTP endpoint handlers. These are thin wrappers that forward to the
//! session engine and the progress store.
//! Each handler is instrumented and logs parameters and basic result info.

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::UnderstandingLevel;
use crate::error::{GenError, SessionError};
use crate::protocol::*;
use crate::state::AppState;

/// Session-layer error rendered as a JSON body with a status that tells the
/// operator what to do: quota and service trouble map to 502, rate limits to
/// 503 so clients know to back off.
pub struct ApiError(pub SessionError);

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self.0 {
      SessionError::NotFound(_) => StatusCode::NOT_FOUND,
      SessionError::Inactive => StatusCode::BAD_REQUEST,
      SessionError::Generation(GenError::RateLimited(_)) => StatusCode::SERVICE_UNAVAILABLE,
      SessionError::Generation(GenError::QuotaExceeded(_))
      | SessionError::Generation(GenError::Service(_)) => StatusCode::BAD_GATEWAY,
      SessionError::Generation(GenError::Unknown(_)) | SessionError::Storage(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    };
    (status, Json(ErrorOut { error: self.0.to_string() })).into_response()
  }
}

impl<E: Into<SessionError>> From<E> for ApiError {
  fn from(e: E) -> Self {
    ApiError(e.into())
  }
}

fn llm_unavailable() -> Response {
  (
    StatusCode::SERVICE_UNAVAILABLE,
    Json(ErrorOut { error: "LLM not initialized. Set OPENAI_API_KEY.".into() }),
  )
    .into_response()
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<AppState>) -> impl IntoResponse {
  Json(HealthOut {
    status: "healthy",
    llm_initialized: state.openai.is_some(),
    active_sessions: state.sessions.len().await,
  })
}

#[instrument(level = "info", skip(state, body), fields(student_id = %body.student_id, topic = %body.topic))]
pub async fn http_start_session(
  State(state): State<AppState>,
  Json(body): Json<StartSessionIn>,
) -> Response {
  let Some(engine) = state.engine() else { return llm_unavailable() };

  let level = body
    .understanding_level
    .as_deref()
    .map(UnderstandingLevel::parse_or_beginner)
    .unwrap_or(UnderstandingLevel::Beginner);

  match engine.start_session(&body.student_id, &body.topic, level).await {
    Ok((session, question)) => {
      let session_id = Uuid::new_v4().to_string();
      let out = StartSessionOut {
        session_id: session_id.clone(),
        message: "Session started successfully".into(),
        question,
        state: SessionStateOut::from_session(&session),
      };
      state.sessions.insert(session_id.clone(), session).await;
      info!(target: "session", %session_id, "HTTP session started");
      Json(out).into_response()
    }
    Err(e) => ApiError(e).into_response(),
  }
}

#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id, answer_len = body.answer.len()))]
pub async fn http_submit_answer(
  State(state): State<AppState>,
  Json(body): Json<AnswerIn>,
) -> Response {
  let Some(engine) = state.engine() else { return llm_unavailable() };

  let Some(mut session) = state.sessions.get(&body.session_id).await else {
    return ApiError(SessionError::NotFound(body.session_id)).into_response();
  };

  let result = engine.answer_turn(&mut session, &body.answer).await;
  // Write back even on failure: counters committed before the failing call
  // are kept rather than rolled back.
  let snapshot = SessionStateOut::from_session(&session);
  state.sessions.put(&body.session_id, session).await;

  match result {
    Ok(outcome) => {
      info!(
        target: "session",
        session_id = %body.session_id,
        correct = outcome.evaluation.correct,
        score = outcome.evaluation.score,
        "HTTP answer evaluated"
      );
      Json(AnswerOut {
        session_id: body.session_id,
        message: outcome.evaluation.feedback,
        is_correct: outcome.evaluation.correct,
        score: outcome.evaluation.score,
        explanation: outcome.explanation,
        question: outcome.next_question,
        state: snapshot,
      })
      .into_response()
    }
    Err(e) => ApiError(e).into_response(),
  }
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn http_session_progress(
  State(state): State<AppState>,
  Path(session_id): Path<String>,
) -> Result<Json<SessionProgressOut>, ApiError> {
  let session = state
    .sessions
    .get(&session_id)
    .await
    .ok_or(SessionError::NotFound(session_id.clone()))?;
  Ok(Json(SessionProgressOut {
    session_id,
    state: SessionStateOut::from_session(&session),
  }))
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn http_end_session(
  State(state): State<AppState>,
  Path(session_id): Path<String>,
) -> Result<Json<EndSessionOut>, ApiError> {
  let mut session = state
    .sessions
    .get(&session_id)
    .await
    .ok_or(SessionError::NotFound(session_id.clone()))?;

  // Final write-through, then deactivate. Needs no generator.
  state.progress.update(&session).await?;
  session.active = false;

  let out = EndSessionOut {
    session_id: session_id.clone(),
    message: "Session ended".into(),
    summary: SessionStateOut::from_session(&session),
  };
  state.sessions.put(&session_id, session).await;
  info!(target: "session", %session_id, "HTTP session ended");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state), fields(%student_id))]
pub async fn http_student_progress(
  State(state): State<AppState>,
  Path(student_id): Path<String>,
) -> impl IntoResponse {
  let summary = state.progress.summarize(&student_id).await;
  let progress = state.progress.get(&student_id).await;
  Json(StudentProgressOut { student_id, summary, progress })
}
