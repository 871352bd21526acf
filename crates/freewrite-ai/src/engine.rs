//! Generation engine: the single owner of the loaded model session.

use std::sync::{Arc, LazyLock, PoisonError};

use regex::Regex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use freewrite_local_ai::ModelManager;
use freewrite_passes::Pass;

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::parser::{parse_bullets, EnhancementResult, ResponseParser};
use crate::pressure::PressureSource;
use crate::prompt;
use crate::runtime::{ensure_supported, GenerationParams, InferenceRuntime, Session, TokenFlow};

/// Reasoning blocks some models emit before answering; an unterminated block
/// runs to the end of the output.
static REASONING_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?(?:</think>|\z)").expect("valid reasoning block regex")
});

struct LoadedSession {
    model_id: String,
    session: Box<dyn Session>,
}

/// Runs prompts against the selected model, one at a time.
///
/// Loads and generations are serialized through a fair lock, so concurrent
/// callers are served in the order they arrive. The session is loaded on
/// first use and replaced when the selected model changes.
pub struct GenerationEngine {
    models: Arc<ModelManager>,
    runtime: Arc<dyn InferenceRuntime>,
    config: EngineConfig,
    slot: Mutex<Option<LoadedSession>>,
    cancel: std::sync::Mutex<CancelToken>,
}

impl GenerationEngine {
    pub fn new(
        models: Arc<ModelManager>,
        runtime: Arc<dyn InferenceRuntime>,
        config: EngineConfig,
    ) -> Self {
        Self {
            models,
            runtime,
            config,
            slot: Mutex::new(None),
            cancel: std::sync::Mutex::new(CancelToken::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn models(&self) -> &Arc<ModelManager> {
        &self.models
    }

    /// Id of the model whose session is currently loaded.
    pub async fn loaded_model(&self) -> Option<String> {
        self.slot.lock().await.as_ref().map(|l| l.model_id.clone())
    }

    /// Load the selected model now instead of on first use.
    pub async fn preload(&self) -> Result<(), EngineError> {
        let mut slot = self.slot.lock().await;
        self.ensure_loaded(&mut slot).await?;
        info!("Model preloaded successfully");
        Ok(())
    }

    /// Drop the session and let the runtime release its caches.
    pub async fn unload(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(loaded) = slot.take() {
            info!("Unloading model '{}'", loaded.model_id);
        }
        self.runtime.shrink_cache();
    }

    /// Cancel every generation accepted so far. Does not block.
    pub fn cancel(&self) {
        debug!("Cancellation requested");
        self.cancel_guard().cancel();
    }

    /// Run `prompt` under the engine-wide cancellation token.
    pub async fn run(&self, prompt: &str, max_tokens: u32) -> Result<String, EngineError> {
        let token = self.cancel_guard().clone();
        let result = self.run_with_token(prompt, max_tokens, &token).await;

        if token.is_cancelled() {
            // Later runs start from a fresh token.
            let mut current = self.cancel_guard();
            if current.same_as(&token) {
                *current = CancelToken::new();
            }
        }

        result
    }

    /// Run `prompt`, polling `token` before loading, before decoding and
    /// before every token. A cancelled run never returns partial output.
    pub async fn run_with_token(
        &self,
        prompt: &str,
        max_tokens: u32,
        token: &CancelToken,
    ) -> Result<String, EngineError> {
        if token.is_cancelled() {
            info!("Generation cancelled before loading the model");
            return Err(EngineError::GenerationCancelled);
        }

        let mut slot = self.slot.lock().await;
        let loaded = self.ensure_loaded(&mut slot).await?;

        if token.is_cancelled() {
            info!("Generation cancelled before decoding");
            return Err(EngineError::GenerationCancelled);
        }

        let params = GenerationParams {
            max_tokens,
            temperature: self.config.temperature,
        };
        let mut output = String::new();
        let mut stopped = false;
        let result = {
            let mut on_token = |piece: &str| {
                if token.is_cancelled() {
                    stopped = true;
                    return TokenFlow::Stop;
                }
                output.push_str(piece);
                TokenFlow::Continue
            };
            loaded.session.generate(prompt, &params, &mut on_token).await
        };

        if stopped || token.is_cancelled() {
            info!("Generation cancelled; discarding {} bytes", output.len());
            return Err(EngineError::GenerationCancelled);
        }
        result.map_err(EngineError::GenerationFailure)?;

        Ok(strip_reasoning(&output))
    }

    /// Correct grammar, punctuation and typos.
    pub async fn cleaned_text(&self, text: &str) -> Result<String, EngineError> {
        self.run(&prompt::cleaned_text(text), self.config.limits.cleaned_text)
            .await
    }

    pub async fn summary(&self, text: &str) -> Result<String, EngineError> {
        self.run(&prompt::summary(text), self.config.limits.summary)
            .await
    }

    pub async fn key_ideas(&self, text: &str) -> Result<Vec<String>, EngineError> {
        let raw = self
            .run(&prompt::key_ideas(text), self.config.limits.key_ideas)
            .await?;
        Ok(parse_bullets(&raw))
    }

    /// Run a user template, substituting `{{text}}` or appending the text.
    pub async fn run_custom_prompt(&self, template: &str, text: &str) -> Result<String, EngineError> {
        self.run(&prompt::custom(template, text), self.config.limits.custom)
            .await
    }

    pub async fn run_pass(&self, pass: &Pass, text: &str) -> Result<String, EngineError> {
        debug!("Running pass '{}' ({})", pass.name, pass.id);
        self.run_custom_prompt(&pass.prompt, text).await
    }

    /// Cleaned text, summary and key ideas from a single generation.
    pub async fn process_all_enhancements(
        &self,
        text: &str,
    ) -> Result<EnhancementResult, EngineError> {
        let response = self
            .run(&prompt::combined(text), self.config.limits.combined)
            .await?;
        Ok(ResponseParser::parse_with_fallback(&response, text))
    }

    /// Delete a model from disk, first waiting for any in-flight generation
    /// and dropping the session if it belongs to that model.
    pub async fn delete_model(&self, id: &str) -> Result<(), EngineError> {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|loaded| loaded.model_id == id) {
            info!("Unloading model '{}' before deletion", id);
            *slot = None;
            self.runtime.shrink_cache();
        }

        self.models.delete(id).await?;
        Ok(())
    }

    /// Unload the model on every signal from `source`.
    ///
    /// The task ends when the source closes or the engine is dropped.
    pub fn watch_memory_pressure<S: PressureSource>(self: &Arc<Self>, mut source: S) -> JoinHandle<()> {
        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(level) = source.next_signal().await {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                warn!("Memory pressure ({:?}); unloading model", level);
                engine.unload().await;
            }
            debug!("Memory pressure watcher stopped");
        })
    }

    /// Make sure `slot` holds a session for the selected model.
    async fn ensure_loaded<'a>(
        &self,
        slot: &'a mut Option<LoadedSession>,
    ) -> Result<&'a mut LoadedSession, EngineError> {
        let selected = self
            .models
            .selected()
            .ok_or_else(|| EngineError::ModelNotFound("no model selected".to_string()))?;

        let reusable = slot
            .as_ref()
            .is_some_and(|loaded| loaded.model_id == selected);

        if !reusable {
            if let Some(stale) = slot.take() {
                info!(
                    "Selected model changed from '{}' to '{}'; unloading",
                    stale.model_id, selected
                );
                drop(stale);
                self.runtime.shrink_cache();
            }

            if !self.models.is_downloaded(&selected) {
                return Err(EngineError::ModelNotFound(format!(
                    "'{}' is not downloaded",
                    selected
                )));
            }

            let descriptor = self
                .models
                .catalog()
                .lookup(&selected)
                .map_err(|e| EngineError::ModelNotFound(e.to_string()))?;
            ensure_supported(self.runtime.as_ref(), descriptor).map_err(EngineError::LoadFailure)?;

            let model_dir = self.models.model_dir(&selected);
            info!("Loading model '{}' from {:?}", selected, model_dir);
            let session = self
                .runtime
                .load(&model_dir)
                .await
                .map_err(EngineError::LoadFailure)?;

            return Ok(slot.insert(LoadedSession {
                model_id: selected,
                session,
            }));
        }

        slot.as_mut()
            .ok_or_else(|| EngineError::ModelNotFound(selected))
    }

    fn cancel_guard(&self) -> std::sync::MutexGuard<'_, CancelToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Remove reasoning blocks and surrounding whitespace.
pub fn strip_reasoning(output: &str) -> String {
    REASONING_BLOCK.replace_all(output, "").trim().to_string()
}
