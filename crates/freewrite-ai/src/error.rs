//! Error types for the generation engine and inference runtimes.

use freewrite_local_ai::{LocalAIError, WeightFormat};
use thiserror::Error;

/// Errors raised by an inference runtime or session.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{0}")]
    Load(String),
    #[error("{0}")]
    Generation(String),
    #[error("unsupported model architecture '{0}'")]
    UnsupportedArchitecture(String),
    #[error("model '{model}' ships {format} weights, which no configured runtime can load")]
    UnsupportedWeights { model: String, format: WeightFormat },
    #[error("llama-server binary not found at {0}")]
    ServerBinaryNotFound(String),
    #[error("failed to start llama-server: {0}")]
    ServerStartFailed(String),
    #[error("llama-server did not become ready in time")]
    ServerStartTimeout,
    #[error("llama-server not running at {0}")]
    ServerNotRunning(String),
    #[error("llama-server API error: {0}")]
    Api(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the generation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No model is selected, or the selected model is not usable.
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("failed to load model: {0}")]
    LoadFailure(#[source] RuntimeError),
    #[error("generation failed: {0}")]
    GenerationFailure(#[source] RuntimeError),
    /// The caller asked to stop; there is no output.
    #[error("generation cancelled")]
    GenerationCancelled,
    #[error(transparent)]
    Model(#[from] LocalAIError),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::GenerationCancelled)
    }
}
