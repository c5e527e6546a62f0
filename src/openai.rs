//! Minimal OpenAI client for our use-cases.
//!
//! We only call chat.completions with a single user prompt and hand the raw
//! text back to the caller. Calls are instrumented and log model names,
//! latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to
//! avoid PII leaks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::GenError;

/// Seam over the hosted text-generation service. The tutoring core only ever
/// needs "prompt in, text out"; tests inject canned replies through this.
#[async_trait]
pub trait TextGenerator: Send + Sync {
  async fn generate(&self, prompt: &str) -> Result<String, GenError>;
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model })
  }

  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn chat_plain(&self, prompt: &str) -> Result<String, GenError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![ChatMessageReq { role: "user".into(), content: prompt.into() }],
      temperature: 0.7,
    };

    let start = std::time::Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "tutor-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await
      .map_err(|e| GenError::Service(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(classify_http_failure(status, msg));
    }

    let body: ChatCompletionResponse =
      res.json().await.map_err(|e| GenError::Unknown(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(
        prompt_tokens = ?usage.prompt_tokens,
        completion_tokens = ?usage.completion_tokens,
        total_tokens = ?usage.total_tokens,
        elapsed = ?start.elapsed(),
        "OpenAI usage"
      );
    }
    let text = body
      .choices
      .first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default()
      .trim()
      .to_string();

    Ok(text)
  }
}

#[async_trait]
impl TextGenerator for OpenAI {
  async fn generate(&self, prompt: &str) -> Result<String, GenError> {
    self.chat_plain(prompt).await
  }
}

/// Map an HTTP failure to the error taxonomy. A 429 whose message mentions
/// quota means "add credits"; a plain 429 means "wait and retry".
fn classify_http_failure(status: StatusCode, msg: String) -> GenError {
  if status == StatusCode::TOO_MANY_REQUESTS {
    let lower = msg.to_lowercase();
    if lower.contains("insufficient_quota") || lower.contains("quota") {
      GenError::QuotaExceeded(msg)
    } else {
      GenError::RateLimited(msg)
    }
  } else {
    GenError::Service(format!("HTTP {}: {}", status, msg))
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
}
#[derive(Serialize)]
struct ChatMessageReq {
  role: String,
  content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)]
  usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice {
  message: ChatMessageResp,
}
#[derive(Deserialize)]
struct ChatMessageResp {
  content: Option<String>,
}
#[derive(Deserialize)]
struct Usage {
  #[serde(default)]
  prompt_tokens: Option<u32>,
  #[serde(default)]
  completion_tokens: Option<u32>,
  #[serde(default)]
  total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EObj,
  }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quota_messages_on_429_are_distinct_from_rate_limits() {
    let quota = classify_http_failure(
      StatusCode::TOO_MANY_REQUESTS,
      "You exceeded your current quota (insufficient_quota)".into(),
    );
    assert!(matches!(quota, GenError::QuotaExceeded(_)));

    let rate = classify_http_failure(StatusCode::TOO_MANY_REQUESTS, "Requests too frequent".into());
    assert!(matches!(rate, GenError::RateLimited(_)));

    let service = classify_http_failure(StatusCode::INTERNAL_SERVER_ERROR, "boom".into());
    assert!(matches!(service, GenError::Service(_)));
  }

  #[test]
  fn error_body_message_is_extracted() {
    let body = r#"{"error": {"message": "model overloaded", "type": "server_error"}}"#;
    assert_eq!(extract_openai_error(body), Some("model overloaded".into()));
    assert_eq!(extract_openai_error("not json"), None);
  }
}
