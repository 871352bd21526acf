//! Persistence of the selected model id across restarts.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LocalAIError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SelectionFile {
    #[serde(default)]
    selected_model: Option<String>,
}

/// Small JSON file recording which model the user picked.
#[derive(Debug, Clone)]
pub struct SelectionStore {
    path: PathBuf,
}

impl SelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored selection. A missing or unreadable file means "none".
    pub fn load(&self) -> Option<String> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read model selection {:?}: {}", self.path, e);
                return None;
            }
        };

        match serde_json::from_str::<SelectionFile>(&content) {
            Ok(file) => file.selected_model,
            Err(e) => {
                warn!("Ignoring malformed model selection {:?}: {}", self.path, e);
                None
            }
        }
    }

    /// Replace the stored selection.
    pub fn save(&self, selected: Option<&str>) -> Result<(), LocalAIError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = SelectionFile {
            selected_model: selected.map(str::to_string),
        };
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&file)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
