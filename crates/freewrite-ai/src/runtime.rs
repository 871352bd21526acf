//! Boundary to the inference runtime.
//!
//! The engine never touches tensors. It hands a model directory to an
//! [`InferenceRuntime`], gets back a [`Session`], and drives generation
//! through a per-token callback that can stop the loop.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use freewrite_local_ai::{ModelDescriptor, WeightFormat, MARKER_FILENAME};

use crate::error::RuntimeError;

/// Returned by the token callback to continue or stop decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFlow {
    Continue,
    Stop,
}

/// Sampling parameters for one generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Called with each decoded piece of text.
pub type TokenCallback<'a> = dyn FnMut(&str) -> TokenFlow + Send + 'a;

/// A loaded model.
#[async_trait]
pub trait Session: Send {
    /// Generate a reply to `prompt`, feeding decoded pieces to `on_token`
    /// until the model finishes, `max_tokens` is reached or the callback
    /// returns [`TokenFlow::Stop`].
    async fn generate(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        on_token: &mut TokenCallback<'_>,
    ) -> Result<(), RuntimeError>;
}

/// Something that can turn a model directory into a [`Session`].
#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    async fn load(&self, model_dir: &Path) -> Result<Box<dyn Session>, RuntimeError>;

    /// Whether `load` can read weights stored as `format`.
    fn supports_weights(&self, _format: WeightFormat) -> bool {
        true
    }

    /// Release cached buffers after a session was dropped.
    fn shrink_cache(&self) {}
}

/// Reject a model whose weight format `runtime` cannot load.
pub fn ensure_supported(
    runtime: &dyn InferenceRuntime,
    model: &ModelDescriptor,
) -> Result<(), RuntimeError> {
    if runtime.supports_weights(model.weights) {
        Ok(())
    } else {
        Err(RuntimeError::UnsupportedWeights {
            model: model.id.clone(),
            format: model.weights,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ModelConfig {
    model_type: Option<String>,
}

/// Read the architecture id (`model_type`) from a model's configuration file.
pub async fn read_architecture(model_dir: &Path) -> Result<String, RuntimeError> {
    let path = model_dir.join(MARKER_FILENAME);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| RuntimeError::Load(format!("cannot read {}: {}", path.display(), e)))?;

    let config: ModelConfig = serde_json::from_str(&content)?;
    config
        .model_type
        .ok_or_else(|| RuntimeError::Load(format!("{} has no model_type", path.display())))
}

/// Dispatch table from architecture id to the runtime that can load it.
#[derive(Default)]
pub struct ArchitectureRegistry {
    runtimes: HashMap<String, Arc<dyn InferenceRuntime>>,
}

impl ArchitectureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `runtime` for models whose `model_type` is `architecture`.
    /// A later registration for the same id replaces the earlier one.
    pub fn register(
        &mut self,
        architecture: impl Into<String>,
        runtime: Arc<dyn InferenceRuntime>,
    ) -> &mut Self {
        let architecture = architecture.into();
        debug!("Registering runtime for architecture '{}'", architecture);
        self.runtimes.insert(architecture, runtime);
        self
    }

    pub fn supports(&self, architecture: &str) -> bool {
        self.runtimes.contains_key(architecture)
    }

    /// Registered architecture ids, sorted.
    pub fn architectures(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.runtimes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl InferenceRuntime for ArchitectureRegistry {
    async fn load(&self, model_dir: &Path) -> Result<Box<dyn Session>, RuntimeError> {
        let architecture = read_architecture(model_dir).await?;
        let runtime = self
            .runtimes
            .get(&architecture)
            .ok_or_else(|| RuntimeError::UnsupportedArchitecture(architecture.clone()))?;

        info!("Loading {:?} as '{}'", model_dir, architecture);
        runtime.load(model_dir).await
    }

    fn supports_weights(&self, format: WeightFormat) -> bool {
        self.runtimes.values().any(|runtime| runtime.supports_weights(format))
    }

    fn shrink_cache(&self) {
        for runtime in self.runtimes.values() {
            runtime.shrink_cache();
        }
    }
}
