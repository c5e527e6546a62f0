//! Error taxonomies for the generation boundary and the session layer.
//!
//! Generation errors are never retried or recovered here; each variant keeps
//! the upstream message so the operator can tell "add credits" apart from
//! "wait and retry".

use thiserror::Error;

/// Failures surfaced by the text-generation service boundary.
#[derive(Debug, Clone, Error)]
pub enum GenError {
  #[error("OpenAI quota exceeded (check billing/credits): {0}")]
  QuotaExceeded(String),
  #[error("OpenAI rate limited (wait a moment and retry): {0}")]
  RateLimited(String),
  #[error("OpenAI service error: {0}")]
  Service(String),
  #[error("unexpected generation error: {0}")]
  Unknown(String),
}

/// Failures surfaced by session transitions and the registry.
#[derive(Debug, Error)]
pub enum SessionError {
  #[error("session not found: {0}")]
  NotFound(String),
  #[error("session is no longer active")]
  Inactive,
  #[error(transparent)]
  Generation(#[from] GenError),
  #[error("failed to persist progress: {0}")]
  Storage(#[from] std::io::Error),
}
