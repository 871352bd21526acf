//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default port for the local llama-server instance.
pub const DEFAULT_LLAMA_PORT: u16 = 11435;

/// Per-operation generation limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLimits {
    pub cleaned_text: u32,
    pub summary: u32,
    pub key_ideas: u32,
    pub custom: u32,
    pub combined: u32,
}

impl Default for TokenLimits {
    fn default() -> Self {
        Self {
            cleaned_text: 1024,
            summary: 256,
            key_ideas: 256,
            custom: 1024,
            combined: 2048,
        }
    }
}

/// Configuration for the generation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sampling temperature.
    pub temperature: f32,
    /// Token budget per operation.
    pub limits: TokenLimits,
    /// Port the llama-server backend listens on.
    pub llama_port: u16,
    /// Path to the llama-server binary (default: looked up on `PATH`).
    pub llama_server: PathBuf,
    /// How long to wait for llama-server to report healthy.
    pub start_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            limits: TokenLimits::default(),
            llama_port: DEFAULT_LLAMA_PORT,
            llama_server: PathBuf::from("llama-server"),
            start_timeout: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let temperature = std::env::var("FREEWRITE_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.temperature);

        let llama_port = std::env::var("FREEWRITE_LLAMA_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.llama_port);

        let llama_server = std::env::var_os("FREEWRITE_LLAMA_SERVER")
            .map(PathBuf::from)
            .unwrap_or(defaults.llama_server);

        Self {
            temperature,
            llama_port,
            llama_server,
            ..defaults
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

/// Builder for engine configuration.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn limits(mut self, limits: TokenLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn llama_port(mut self, port: u16) -> Self {
        self.config.llama_port = port;
        self
    }

    pub fn llama_server(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.llama_server = path.into();
        self
    }

    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.config.start_timeout = timeout;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}
