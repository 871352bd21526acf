//! llama.cpp backend: one `llama-server` process per loaded model.

mod client;
mod server;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use freewrite_local_ai::WeightFormat;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::RuntimeError;
use crate::runtime::{GenerationParams, InferenceRuntime, Session, TokenCallback};

pub use client::LlamaCppClient;
pub use server::LlamaCppServer;

/// Architectures the bundled models declare in their `config.json`.
pub const LLAMA_ARCHITECTURES: &[&str] = &["llama", "qwen3", "qwen2", "gemma3_text"];

/// Loads model directories that carry GGUF weights by spawning llama-server.
pub struct LlamaServerLoader {
    binary: PathBuf,
    port: u16,
    start_timeout: Duration,
}

impl LlamaServerLoader {
    pub fn new(binary: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            binary: binary.into(),
            port,
            start_timeout: Duration::from_secs(60),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.llama_server, config.llama_port).with_start_timeout(config.start_timeout)
    }

    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }
}

/// First `.gguf` file in `dir`, by name.
pub fn find_gguf(dir: &Path) -> Result<PathBuf, RuntimeError> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("gguf"))
        })
        .collect();
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| {
        RuntimeError::Load(format!("no .gguf weights found in {}", dir.display()))
    })
}

#[async_trait]
impl InferenceRuntime for LlamaServerLoader {
    async fn load(&self, model_dir: &Path) -> Result<Box<dyn Session>, RuntimeError> {
        let model = find_gguf(model_dir)?;
        debug!("Serving {:?} with {:?}", model, self.binary);

        let mut server = LlamaCppServer::new(&self.binary, model, self.port);
        server.start()?;
        server.wait_ready(self.start_timeout).await?;

        let client = server.client();
        Ok(Box::new(LlamaSession {
            _server: server,
            client,
        }))
    }

    fn supports_weights(&self, format: WeightFormat) -> bool {
        format == WeightFormat::Gguf
    }
}

/// A running llama-server; dropping it stops the process.
struct LlamaSession {
    _server: LlamaCppServer,
    client: LlamaCppClient,
}

#[async_trait]
impl Session for LlamaSession {
    async fn generate(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        on_token: &mut TokenCallback<'_>,
    ) -> Result<(), RuntimeError> {
        self.client.stream_chat(prompt, params, on_token).await
    }
}
