//! # Freewrite generation engine
//!
//! This crate runs prompts against a locally downloaded model and turns the
//! responses into structured results.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  ModelManager   │ --> │ GenerationEngine │ --> │ ResponseParser  │
//! │ (selected model)│     │  (one session)   │     │ (sections)      │
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!                                  │
//!                       ┌──────────┴───────────┐
//!                       │ ArchitectureRegistry │
//!                       │  (model_type → rt)   │
//!                       └──────────────────────┘
//! ```
//!
//! ## Backends
//!
//! - **llama.cpp** - [`LlamaServerLoader`] spawns `llama-server` for GGUF models
//! - anything else implementing [`InferenceRuntime`], registered per architecture
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use freewrite_ai::{ArchitectureRegistry, EngineConfig, GenerationEngine, LlamaServerLoader};
//! use freewrite_local_ai::ModelManager;
//!
//! let config = EngineConfig::from_env();
//! let models = Arc::new(ModelManager::from_default_paths()?);
//! let mut registry = ArchitectureRegistry::new();
//! registry.register("qwen3", Arc::new(LlamaServerLoader::from_config(&config)));
//!
//! let engine = GenerationEngine::new(models, Arc::new(registry), config);
//! let result = engine.process_all_enhancements("i woke up erly today").await?;
//! ```

mod cancel;
mod config;
mod engine;
mod error;
pub mod llama;
mod parser;
mod pressure;
pub mod prompt;
mod runtime;

pub use cancel::CancelToken;
pub use config::{EngineConfig, EngineConfigBuilder, TokenLimits, DEFAULT_LLAMA_PORT};
pub use engine::{strip_reasoning, GenerationEngine};
pub use error::{EngineError, RuntimeError};
pub use llama::{LlamaServerLoader, LLAMA_ARCHITECTURES};
pub use parser::{parse_bullets, EnhancementResult, ResponseParser};
pub use pressure::{MemoryPressure, PressureSource};
pub use runtime::{
    ensure_supported, read_architecture, ArchitectureRegistry, GenerationParams, InferenceRuntime,
    Session, TokenCallback, TokenFlow,
};

// Re-export model management types
pub use freewrite_local_ai::{
    paths as local_ai_paths, DownloadOutcome, DownloadState, LocalAIError, ModelCatalog,
    ModelDescriptor, ModelEvent, ModelManager, ModelStatus, WeightFormat,
};
