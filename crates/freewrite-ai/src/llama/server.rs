//! Process manager for llama-server.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::client::LlamaCppClient;
use crate::error::RuntimeError;

/// Manager for one llama-server process serving one model file.
pub struct LlamaCppServer {
    binary: PathBuf,
    model: PathBuf,
    port: u16,
    context_size: u32,
    process: Option<Child>,
}

impl LlamaCppServer {
    /// Create a new server manager for `model`.
    pub fn new(binary: impl Into<PathBuf>, model: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
            port,
            context_size: 8192,
            process: None,
        }
    }

    /// Set a custom context size.
    pub fn with_context_size(mut self, context_size: u32) -> Self {
        self.context_size = context_size;
        self
    }

    /// Get the port this server is configured to use.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn model(&self) -> &Path {
        &self.model
    }

    /// Start the llama-server process.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if !self.model.exists() {
            return Err(RuntimeError::Load(format!(
                "model file {} does not exist",
                self.model.display()
            )));
        }

        info!(
            "Starting llama-server on port {} with model {:?}",
            self.port, self.model
        );

        let child = Command::new(&self.binary)
            .arg("--model")
            .arg(&self.model)
            .arg("--host")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(self.port.to_string())
            .arg("--ctx-size")
            .arg(self.context_size.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RuntimeError::ServerBinaryNotFound(self.binary.display().to_string())
                } else {
                    RuntimeError::ServerStartFailed(e.to_string())
                }
            })?;

        debug!("llama-server process started with PID: {}", child.id());
        self.process = Some(child);

        Ok(())
    }

    /// Wait for the server to become ready.
    pub async fn wait_ready(&mut self, timeout: Duration) -> Result<(), RuntimeError> {
        let client = self.client();
        let start = std::time::Instant::now();
        let check_interval = Duration::from_millis(500);

        info!("Waiting for llama-server to become ready...");

        while start.elapsed() < timeout {
            match client.check_health().await {
                Ok(()) => {
                    info!("llama-server is ready");
                    return Ok(());
                }
                Err(_) => {
                    if !self.is_running() {
                        return Err(RuntimeError::ServerStartFailed(
                            "llama-server exited during startup".to_string(),
                        ));
                    }
                    sleep(check_interval).await;
                }
            }
        }

        Err(RuntimeError::ServerStartTimeout)
    }

    /// Stop the server process.
    pub fn stop(&mut self) {
        if let Some(mut child) = self.process.take() {
            info!("Stopping llama-server (PID: {})", child.id());

            // Try graceful shutdown first
            #[cfg(unix)]
            {
                // SAFETY: sending a signal to a child we spawned and still own.
                unsafe {
                    libc::kill(child.id() as i32, libc::SIGTERM);
                }
                std::thread::sleep(Duration::from_millis(500));
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Server exited with status: {:?}", status);
                }
                Ok(None) => {
                    warn!("Server didn't exit gracefully, killing...");
                    let _ = child.kill();
                    let _ = child.wait();
                }
                Err(e) => {
                    warn!("Error checking server status: {}", e);
                    let _ = child.kill();
                }
            }
        }
    }

    /// Check if the server process is running.
    pub fn is_running(&mut self) -> bool {
        let Some(child) = self.process.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(_)) => {
                self.process = None;
                false
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }

    /// Get a client connected to this server.
    pub fn client(&self) -> LlamaCppClient {
        LlamaCppClient::with_port(self.port)
    }
}

impl Drop for LlamaCppServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_file_is_a_load_error() {
        let mut server = LlamaCppServer::new("llama-server", "/nonexistent/model.gguf", 9999);
        assert!(matches!(server.start(), Err(RuntimeError::Load(_))));
        assert!(!server.is_running());
    }

    #[test]
    fn missing_binary_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.gguf");
        std::fs::write(&model, b"gguf").unwrap();

        let mut server =
            LlamaCppServer::new(dir.path().join("no-such-llama-server"), &model, 9999);
        assert!(matches!(
            server.start(),
            Err(RuntimeError::ServerBinaryNotFound(_))
        ));
    }
}
