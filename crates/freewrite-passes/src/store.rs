//! Merged list of built-in and custom passes with JSON persistence.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PassError;
use crate::pass::{builtin_passes, Pass, PassKind};

/// All passes: built-ins first, then custom passes in creation order.
#[derive(Debug)]
pub struct PassStore {
    passes: Vec<Pass>,
    path: PathBuf,
}

impl PassStore {
    /// Load the store backed by `path`.
    ///
    /// A missing or unreadable file yields no custom passes.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut passes = builtin_passes();
        passes.extend(load_custom(&path));

        debug!("Loaded {} passes from {:?}", passes.len(), path);
        Self { passes, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All passes in display order.
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    /// Owned copy of the current list, for readers on other tasks.
    pub fn snapshot(&self) -> Vec<Pass> {
        self.passes.clone()
    }

    /// The passes the user created.
    pub fn custom_passes(&self) -> impl Iterator<Item = &Pass> {
        self.passes.iter().filter(|p| p.kind == PassKind::Custom)
    }

    pub fn get(&self, id: Uuid) -> Option<&Pass> {
        self.passes.iter().find(|p| p.id == id)
    }

    /// Case-insensitive lookup by name.
    pub fn find_by_name(&self, name: &str) -> Option<&Pass> {
        let name = name.trim();
        self.passes
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Append a custom pass and persist.
    pub fn add(&mut self, name: &str, prompt: &str) -> Result<Pass, PassError> {
        let name = name.trim();
        let prompt = prompt.trim();
        if name.is_empty() {
            return Err(PassError::EmptyField("name"));
        }
        if prompt.is_empty() {
            return Err(PassError::EmptyField("prompt"));
        }

        let pass = Pass::custom(name, prompt);
        info!("Adding custom pass '{}' ({})", pass.name, pass.id);
        self.passes.push(pass.clone());
        self.persist();

        Ok(pass)
    }

    /// Remove the passes at `indices` and persist.
    ///
    /// Nothing is removed if any index is out of range or names a built-in.
    pub fn delete(&mut self, indices: &[usize]) -> Result<Vec<Pass>, PassError> {
        let indices: BTreeSet<usize> = indices.iter().copied().collect();

        for &index in &indices {
            let pass = self.passes.get(index).ok_or(PassError::IndexOutOfRange {
                index,
                len: self.passes.len(),
            })?;
            if pass.is_protected() {
                return Err(PassError::ProtectedPass {
                    name: pass.name.clone(),
                });
            }
        }

        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let mut removed: Vec<Pass> = indices
            .iter()
            .rev()
            .map(|&index| self.passes.remove(index))
            .collect();
        removed.reverse();

        info!("Deleted {} custom pass(es)", removed.len());
        self.persist();

        Ok(removed)
    }

    /// Write the custom subset. Failures leave the in-memory list authoritative.
    fn persist(&self) {
        let custom: Vec<&Pass> = self.custom_passes().collect();
        if let Err(e) = write_atomic(&self.path, &custom) {
            warn!("Failed to save custom passes to {:?}: {}", self.path, e);
        }
    }
}

fn load_custom(path: &Path) -> Vec<Pass> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("Failed to read custom passes {:?}: {}", path, e);
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<Pass>>(&content) {
        Ok(passes) => passes
            .into_iter()
            .filter(|p| p.kind == PassKind::Custom)
            .collect(),
        Err(e) => {
            warn!("Ignoring malformed custom passes {:?}: {}", path, e);
            Vec::new()
        }
    }
}

fn write_atomic(path: &Path, passes: &[&Pass]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(passes)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> PassStore {
        PassStore::open(dir.join("custom_passes.json"))
    }

    #[test]
    fn starts_with_builtins_only() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let names: Vec<&str> = store.passes().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Core Ideas", "Clean Up", "Writing Feedback"]);
        assert_eq!(store.custom_passes().count(), 0);
    }

    #[test]
    fn add_trims_and_appends_after_builtins() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());

        let pass = store.add("  Haiku ", "\nRewrite as a haiku.  ").unwrap();

        assert_eq!(pass.name, "Haiku");
        assert_eq!(pass.prompt, "Rewrite as a haiku.");
        assert_eq!(pass.kind, PassKind::Custom);
        assert_eq!(store.passes().len(), 4);
        assert_eq!(store.passes()[3].id, pass.id);
    }

    #[test]
    fn add_rejects_blank_fields_without_writing() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());

        assert_eq!(store.add("", "x"), Err(PassError::EmptyField("name")));
        assert_eq!(store.add("x", "  "), Err(PassError::EmptyField("prompt")));

        assert_eq!(store.passes().len(), 3);
        assert!(!store.path().exists());
    }

    #[test]
    fn delete_refuses_builtins_atomically() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.add("Haiku", "Rewrite as a haiku").unwrap();
        let before = store.snapshot();

        let result = store.delete(&[3, 1]);

        assert_eq!(
            result,
            Err(PassError::ProtectedPass {
                name: "Clean Up".to_string()
            })
        );
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn delete_out_of_range_changes_nothing() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.add("Haiku", "Rewrite as a haiku").unwrap();

        assert_eq!(
            store.delete(&[3, 9]),
            Err(PassError::IndexOutOfRange { index: 9, len: 4 })
        );
        assert_eq!(store.passes().len(), 4);
    }

    #[test]
    fn delete_removes_custom_passes_and_persists() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        let a = store.add("A", "a").unwrap();
        let b = store.add("B", "b").unwrap();
        let c = store.add("C", "c").unwrap();

        let removed = store.delete(&[5, 3, 5]).unwrap();

        assert_eq!(removed, vec![a, c]);
        let reopened = store_in(dir.path());
        let custom: Vec<&Pass> = reopened.custom_passes().collect();
        assert_eq!(custom, vec![&b]);
    }

    #[test]
    fn restart_reloads_identical_custom_passes() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.add("Haiku", "Rewrite as a haiku").unwrap();
        store.add("Tweet", "Condense into a tweet").unwrap();
        let expected = store.snapshot();

        let reopened = store_in(dir.path());

        assert_eq!(reopened.snapshot(), expected);
        assert!(!dir.path().join("custom_passes.json.tmp").exists());
    }

    #[test]
    fn persisted_builtins_are_ignored_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom_passes.json");
        let mut forged = builtin_passes();
        forged.truncate(1);
        forged.push(Pass::custom("Haiku", "Rewrite as a haiku"));
        fs::write(&path, serde_json::to_string(&forged).unwrap()).unwrap();

        let store = PassStore::open(&path);

        assert_eq!(store.passes().len(), 4);
        assert_eq!(store.custom_passes().count(), 1);
    }

    #[test]
    fn unreadable_file_yields_builtins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom_passes.json");
        fs::write(&path, "[{").unwrap();

        let store = PassStore::open(&path);
        assert_eq!(store.passes().len(), 3);
    }

    #[test]
    fn failed_save_keeps_memory_authoritative() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom_passes.json");
        let mut store = PassStore::open(&path);
        let haiku = store.add("Haiku", "Rewrite as a haiku").unwrap();

        // Block the temporary file so every later save fails.
        fs::create_dir(path.with_extension("json.tmp")).unwrap();

        let limerick = store.add("Limerick", "Rewrite as a limerick").unwrap();
        assert_eq!(store.passes().len(), 5);
        assert_eq!(store.get(limerick.id), Some(&limerick));

        let removed = store.delete(&[3]).unwrap();
        assert_eq!(removed, vec![haiku.clone()]);
        assert_eq!(store.custom_passes().cloned().collect::<Vec<_>>(), vec![limerick]);

        let reopened = PassStore::open(&path);
        assert_eq!(reopened.custom_passes().cloned().collect::<Vec<_>>(), vec![haiku]);
    }

    #[test]
    fn directory_in_place_of_file_is_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom_passes.json");
        fs::create_dir(&path).unwrap();

        let mut store = PassStore::open(&path);
        store.add("Haiku", "x").unwrap();

        assert_eq!(store.passes().len(), 4);
        assert_eq!(PassStore::open(&path).passes().len(), 3);
    }

    #[test]
    fn lookup_by_id_and_name() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        let pass = store.add("Haiku", "Rewrite as a haiku").unwrap();

        assert_eq!(store.get(pass.id), Some(&pass));
        assert_eq!(store.find_by_name("clean up").map(|p| p.id), Some(crate::pass::CLEAN_UP_ID));
        assert!(store.find_by_name("missing").is_none());
    }
}
