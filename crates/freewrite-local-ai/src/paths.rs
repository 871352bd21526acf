//! Path utilities for Freewrite data directories.

use std::path::PathBuf;

use crate::error::LocalAIError;

/// Environment variable overriding the models root.
pub const MODELS_DIR_ENV: &str = "FREEWRITE_MODELS_DIR";

/// Environment variable overriding the application-support directory.
pub const DATA_DIR_ENV: &str = "FREEWRITE_DATA_DIR";

/// Name of the models folder under the user's documents directory.
pub const MODELS_DIR_NAME: &str = "LLMModels";

/// File that records the selected model.
pub const SELECTION_FILENAME: &str = "selection.json";

/// File that holds user-defined passes.
pub const CUSTOM_PASSES_FILENAME: &str = "custom_passes.json";

/// Optional file listing models beyond the built-in catalog.
pub const CATALOG_FILENAME: &str = "catalog.json";

/// Get the models root (`~/Documents/LLMModels/` unless overridden).
pub fn models_dir() -> Result<PathBuf, LocalAIError> {
    if let Some(dir) = std::env::var_os(MODELS_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    dirs::document_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Documents")))
        .map(|docs| docs.join(MODELS_DIR_NAME))
        .ok_or(LocalAIError::DataDirUnavailable("documents"))
}

/// Get the application-support directory (`<data_dir>/freewrite/`).
pub fn app_support_dir() -> Result<PathBuf, LocalAIError> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    dirs::data_dir()
        .map(|data| data.join("freewrite"))
        .ok_or(LocalAIError::DataDirUnavailable("application support"))
}

/// Get the path of the persisted model selection.
pub fn selection_path() -> Result<PathBuf, LocalAIError> {
    Ok(app_support_dir()?.join(SELECTION_FILENAME))
}

/// Get the path of the persisted custom passes.
pub fn custom_passes_path() -> Result<PathBuf, LocalAIError> {
    Ok(app_support_dir()?.join(CUSTOM_PASSES_FILENAME))
}

/// Get the path of the extra model catalog.
pub fn catalog_path() -> Result<PathBuf, LocalAIError> {
    Ok(app_support_dir()?.join(CATALOG_FILENAME))
}

/// Ensure the Freewrite data directories exist.
pub fn ensure_dirs() -> Result<(), LocalAIError> {
    std::fs::create_dir_all(models_dir()?)?;
    std::fs::create_dir_all(app_support_dir()?)?;
    Ok(())
}
