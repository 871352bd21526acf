//! CLI commands.

pub mod enhance;
pub mod models;
pub mod passes;

use std::sync::Arc;

use freewrite_ai::{
    ensure_supported, ArchitectureRegistry, EngineConfig, GenerationEngine, LlamaServerLoader,
    LLAMA_ARCHITECTURES,
};
use freewrite_local_ai::{paths, ModelDescriptor, ModelManager};
use freewrite_passes::PassStore;

/// Model manager over the default data directories.
pub(crate) fn model_manager() -> miette::Result<Arc<ModelManager>> {
    ModelManager::from_default_paths()
        .map(Arc::new)
        .map_err(|e| miette::miette!("Failed to open models directory: {}", e))
}

/// Pass store backed by the default custom passes file.
pub(crate) fn pass_store() -> miette::Result<PassStore> {
    let path = paths::custom_passes_path()
        .map_err(|e| miette::miette!("Failed to locate custom passes: {}", e))?;
    Ok(PassStore::open(path))
}

/// Architecture table with llama-server serving every bundled architecture.
pub(crate) fn runtime_registry(config: &EngineConfig) -> ArchitectureRegistry {
    let loader = Arc::new(LlamaServerLoader::from_config(config));
    let mut registry = ArchitectureRegistry::new();
    for architecture in LLAMA_ARCHITECTURES {
        registry.register(*architecture, loader.clone());
    }
    registry
}

/// Refuse a model the configured runtimes cannot load.
pub(crate) fn ensure_runnable(
    registry: &ArchitectureRegistry,
    model: &ModelDescriptor,
) -> miette::Result<()> {
    ensure_supported(registry, model).map_err(|e| {
        miette::miette!(
            "{}. List a model with \"weights\": \"gguf\" in {} to use it here.",
            e,
            paths::catalog_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| paths::CATALOG_FILENAME.to_string())
        )
    })
}

pub(crate) fn engine(models: Arc<ModelManager>) -> Arc<GenerationEngine> {
    let config = EngineConfig::from_env();
    let registry = runtime_registry(&config);
    Arc::new(GenerationEngine::new(models, Arc::new(registry), config))
}
