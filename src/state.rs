//! Application state: the session registry, the progress store, the optional
//! OpenAI client, and the prompt templates.
//!
//! Sessions never leave this process and the registry has no eviction, so
//! memory grows with session count. Known limitation carried over from the
//! persistence model.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::config::{load_tutor_config_from_env, Prompts};
use crate::domain::TutorSession;
use crate::openai::OpenAI;
use crate::progress::ProgressStore;
use crate::session::TutorEngine;

/// Keyed ownership of in-flight sessions. Handlers clone a session out,
/// mutate it, and put it back; concurrent writers to the same id race and
/// the last writer wins.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<HashMap<String, TutorSession>>,
}

impl SessionRegistry {
    pub async fn insert(&self, id: String, session: TutorSession) {
        self.inner.write().await.insert(id, session);
    }

    pub async fn get(&self, id: &str) -> Option<TutorSession> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn put(&self, id: &str, session: TutorSession) {
        self.inner.write().await.insert(id.to_string(), session);
    }

    /// Evict a session. No handler calls this yet; drivers that add
    /// eviction use it.
    #[allow(dead_code)]
    pub async fn remove(&self, id: &str) -> Option<TutorSession> {
        self.inner.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub progress: Arc<ProgressStore>,
    pub openai: Option<Arc<OpenAI>>,
    pub prompts: Prompts,
}

impl AppState {
    /// Build state from env: load config, open the progress file, init OpenAI.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let prompts = load_tutor_config_from_env()
            .map(|c| c.prompts)
            .unwrap_or_default();

        let progress_path =
            std::env::var("PROGRESS_PATH").unwrap_or_else(|_| "student_progress.json".into());
        let progress = Arc::new(ProgressStore::open(progress_path));

        let openai = OpenAI::from_env().map(Arc::new);
        if let Some(oa) = &openai {
            info!(target: "tutor_backend", base_url = %oa.base_url, model = %oa.model, "OpenAI enabled.");
        } else {
            info!(target: "tutor_backend", "OpenAI disabled (no OPENAI_API_KEY). Sessions cannot be started.");
        }

        Self {
            sessions: Arc::new(SessionRegistry::default()),
            progress,
            openai,
            prompts,
        }
    }

    /// Engine wired to the live OpenAI client; None when no API key is set.
    pub fn engine(&self) -> Option<TutorEngine> {
        let generator = self.openai.clone()?;
        Some(TutorEngine::new(
            generator,
            self.prompts.clone(),
            self.progress.clone(),
        ))
    }
}
