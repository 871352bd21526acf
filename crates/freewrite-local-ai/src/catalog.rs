//! Static registry of downloadable models.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LocalAIError;

/// File whose presence marks a model directory as fully extracted.
pub const MARKER_FILENAME: &str = "config.json";

const MODEL_BASE_URL: &str = "https://mostack.blob.core.windows.net/models";

/// On-disk format of a model's weights; runtimes load only some of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightFormat {
    /// `*.safetensors` shards, as in MLX bundles.
    #[default]
    Safetensors,
    /// A single llama.cpp `*.gguf` file.
    Gguf,
}

impl fmt::Display for WeightFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            WeightFormat::Safetensors => "safetensors",
            WeightFormat::Gguf => "gguf",
        })
    }
}

/// Immutable description of a downloadable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Stable identifier, also the directory name on disk.
    pub id: String,
    /// Display name for the UI.
    pub display_name: String,
    /// Short description of the trade-offs.
    pub description: String,
    /// Location of the zipped model.
    pub download_url: String,
    /// Approximate archive size in bytes.
    pub size_bytes: u64,
    /// Expected SHA256 of the archive (optional).
    #[serde(default)]
    pub sha256: Option<String>,
    /// Format of the weights inside the archive.
    #[serde(default)]
    pub weights: WeightFormat,
}

impl ModelDescriptor {
    /// Filename of the archive while it sits in the model directory.
    pub fn archive_filename(&self) -> String {
        format!("{}.zip", self.id)
    }

    /// Human readable size, e.g. `~200 MB`.
    pub fn estimated_size(&self) -> String {
        const MB: u64 = 1000 * 1000;
        const GB: u64 = 1000 * MB;

        if self.size_bytes >= GB {
            format!("~{:.1} GB", self.size_bytes as f64 / GB as f64)
        } else {
            format!("~{} MB", (self.size_bytes + MB / 2) / MB)
        }
    }
}

/// Ordered, read-only set of known models.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    /// Build a catalog from explicit entries, rejecting duplicate or empty ids.
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self, LocalAIError> {
        let mut seen = HashSet::new();

        for model in &models {
            if model.id.trim().is_empty() {
                return Err(LocalAIError::InvalidCatalog(
                    "model id must not be empty".to_string(),
                ));
            }
            // Ids become directory names.
            if model.id.starts_with('.') || model.id.contains(['/', '\\']) {
                return Err(LocalAIError::InvalidCatalog(format!(
                    "model id '{}' is not a valid directory name",
                    model.id
                )));
            }
            if !seen.insert(model.id.as_str()) {
                return Err(LocalAIError::InvalidCatalog(format!(
                    "duplicate model id '{}'",
                    model.id
                )));
            }
        }

        Ok(Self { models })
    }

    /// The models compiled into the application.
    pub fn builtin() -> Self {
        Self {
            models: vec![
                builtin_model(
                    "Qwen3-0.6B-4bit",
                    "Qwen 3 (0.6B)",
                    "Smaller, faster model. Good for basic summaries.",
                    200,
                ),
                builtin_model(
                    "Qwen3-1.7B-4bit",
                    "Qwen 3 (1.7B)",
                    "Mid-size model. Higher quality output, slower and uses more memory.",
                    900,
                ),
                builtin_model(
                    "Llama-3.2-1B-Instruct-4bit",
                    "Llama 3.2 (1B)",
                    "Apple-optimised 1B Llama 3.2. Balanced quality/performance.",
                    630,
                ),
            ],
        }
    }

    /// The built-in models followed by those listed in the JSON file at `path`.
    ///
    /// A missing file yields the built-in catalog.
    pub fn builtin_with_extras(path: &Path) -> Result<Self, LocalAIError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No extra catalog at {:?}", path);
                return Ok(Self::builtin());
            }
            Err(e) => return Err(e.into()),
        };

        let extras: Vec<ModelDescriptor> = serde_json::from_str(&content).map_err(|e| {
            LocalAIError::InvalidCatalog(format!("{}: {}", path.display(), e))
        })?;
        info!("Loaded {} extra model(s) from {:?}", extras.len(), path);

        let mut models = Self::builtin().models;
        models.extend(extras);
        Self::new(models)
    }

    /// All models in catalog order.
    pub fn list(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Look up a model by id.
    pub fn lookup(&self, id: &str) -> Result<&ModelDescriptor, LocalAIError> {
        self.models
            .iter()
            .find(|model| model.id == id)
            .ok_or_else(|| LocalAIError::UnknownModel(id.to_string()))
    }

    /// Whether the catalog knows `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.models.iter().any(|model| model.id == id)
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_model(id: &str, display_name: &str, description: &str, size_mb: u64) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_string(),
        display_name: display_name.to_string(),
        description: description.to_string(),
        download_url: format!("{}/{}.zip", MODEL_BASE_URL, id),
        size_bytes: size_mb * 1000 * 1000,
        sha256: None,
        weights: WeightFormat::Safetensors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            display_name: id.to_string(),
            description: String::new(),
            download_url: format!("https://example.invalid/{}.zip", id),
            size_bytes: 1,
            sha256: None,
            weights: WeightFormat::Gguf,
        }
    }

    #[test]
    fn builtin_catalog_keeps_fixed_order() {
        let catalog = ModelCatalog::builtin();
        let ids: Vec<&str> = catalog.list().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["Qwen3-0.6B-4bit", "Qwen3-1.7B-4bit", "Llama-3.2-1B-Instruct-4bit"]
        );
    }

    #[test]
    fn lookup_unknown_id_is_not_found() {
        let catalog = ModelCatalog::builtin();
        assert!(matches!(
            catalog.lookup("gpt-5"),
            Err(LocalAIError::UnknownModel(id)) if id == "gpt-5"
        ));
    }

    #[test]
    fn download_urls_point_at_zip_archives() {
        let catalog = ModelCatalog::builtin();
        let model = catalog.lookup("Qwen3-1.7B-4bit").unwrap();
        assert_eq!(
            model.download_url,
            "https://mostack.blob.core.windows.net/models/Qwen3-1.7B-4bit.zip"
        );
        assert_eq!(model.archive_filename(), "Qwen3-1.7B-4bit.zip");
    }

    #[test]
    fn estimated_size_is_human_readable() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.lookup("Qwen3-0.6B-4bit").unwrap().estimated_size(), "~200 MB");

        let mut big = descriptor("big");
        big.size_bytes = 1_300_000_000;
        assert_eq!(big.estimated_size(), "~1.3 GB");
    }

    #[test]
    fn catalog_rejects_duplicate_ids() {
        let result = ModelCatalog::new(vec![descriptor("a"), descriptor("a")]);
        assert!(matches!(result, Err(LocalAIError::InvalidCatalog(_))));
    }

    #[test]
    fn builtin_bundles_ship_safetensors() {
        assert!(ModelCatalog::builtin()
            .list()
            .iter()
            .all(|m| m.weights == WeightFormat::Safetensors));
    }

    #[test]
    fn extras_file_extends_the_builtin_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let catalog = ModelCatalog::builtin_with_extras(&path).unwrap();
        assert_eq!(catalog.list().len(), 3);

        std::fs::write(
            &path,
            r#"[{"id": "qwen3-gguf", "display_name": "Qwen 3 GGUF", "description": "",
                "download_url": "https://example.invalid/qwen3-gguf.zip",
                "size_bytes": 400000000, "weights": "gguf"}]"#,
        )
        .unwrap();
        let catalog = ModelCatalog::builtin_with_extras(&path).unwrap();
        let extra = catalog.lookup("qwen3-gguf").unwrap();
        assert_eq!(extra.weights, WeightFormat::Gguf);
        assert_eq!(extra.sha256, None);
        assert_eq!(catalog.list().len(), 4);
    }

    #[test]
    fn malformed_or_clashing_extras_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        std::fs::write(&path, "[{").unwrap();
        assert!(matches!(
            ModelCatalog::builtin_with_extras(&path),
            Err(LocalAIError::InvalidCatalog(_))
        ));

        let clash = vec![descriptor("Qwen3-0.6B-4bit")];
        std::fs::write(&path, serde_json::to_string(&clash).unwrap()).unwrap();
        assert!(matches!(
            ModelCatalog::builtin_with_extras(&path),
            Err(LocalAIError::InvalidCatalog(_))
        ));
    }

    #[test]
    fn catalog_rejects_path_like_ids() {
        assert!(ModelCatalog::new(vec![descriptor("../escape")]).is_err());
        assert!(ModelCatalog::new(vec![descriptor(".staging")]).is_err());
    }
}
