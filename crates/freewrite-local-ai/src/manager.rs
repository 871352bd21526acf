//! Model download, extraction, verification, selection and deletion.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::catalog::{ModelCatalog, ModelDescriptor, MARKER_FILENAME};
use crate::error::LocalAIError;
use crate::extract::{extract_archive, remove_path};
use crate::fetch::{ArchiveFetcher, HttpFetcher};
use crate::paths;
use crate::selection::SelectionStore;

/// Directory under the models root that holds in-progress extractions.
const STAGING_DIR_NAME: &str = ".staging";

/// Minimum progress delta between two progress events.
const PROGRESS_EVENT_STEP: f64 = 0.01;

/// Highest progress reported while the transfer length is only estimated.
const ESTIMATED_PROGRESS_CEILING: f64 = 0.99;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle state of a single model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DownloadState {
    Absent,
    Downloading { progress: f64 },
    Downloaded,
    Failed,
}

/// Result of a `download` call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The model was fetched, extracted and verified.
    Installed,
    /// Another download for the same id was already running; nothing was done.
    AlreadyInProgress,
}

/// Notifications for whoever owns UI-observable state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ModelEvent {
    DownloadStarted {
        model_id: String,
    },
    DownloadProgress {
        model_id: String,
        progress: f64,
        downloaded_bytes: u64,
        total_bytes: u64,
    },
    DownloadCompleted {
        model_id: String,
    },
    DownloadFailed {
        model_id: String,
        error: String,
    },
    Deleted {
        model_id: String,
    },
    SelectionChanged {
        model_id: Option<String>,
    },
}

/// Snapshot of one catalog entry for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStatus {
    pub descriptor: ModelDescriptor,
    pub state: DownloadState,
    pub selected: bool,
}

#[derive(Debug, Default)]
struct ManagerState {
    /// Only `Downloading` and `Failed` live here; the rest is derived from disk.
    transfers: HashMap<String, DownloadState>,
    downloaded: HashSet<String>,
    selected: Option<String>,
}

impl ManagerState {
    fn is_downloading(&self, id: &str) -> bool {
        matches!(
            self.transfers.get(id),
            Some(DownloadState::Downloading { .. })
        )
    }
}

/// Owner of every model's on-disk state and of the selected model.
pub struct ModelManager {
    catalog: ModelCatalog,
    models_root: PathBuf,
    fetcher: Arc<dyn ArchiveFetcher>,
    selection_store: SelectionStore,
    state: RwLock<ManagerState>,
    events: broadcast::Sender<ModelEvent>,
}

impl ModelManager {
    /// Create a manager over `models_root`, reconciling the persisted
    /// selection with what is actually on disk.
    pub fn new(
        catalog: ModelCatalog,
        models_root: impl Into<PathBuf>,
        selection_store: SelectionStore,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let manager = Self {
            catalog,
            models_root: models_root.into(),
            fetcher: Arc::new(HttpFetcher::new()),
            selection_store,
            state: RwLock::new(ManagerState::default()),
            events,
        };
        manager.reconcile_selection();
        manager
    }

    /// Create a manager over the default data directories and built-in catalog.
    pub fn from_default_paths() -> Result<Self, LocalAIError> {
        paths::ensure_dirs()?;
        Ok(Self::new(
            ModelCatalog::builtin_with_extras(&paths::catalog_path()?)?,
            paths::models_dir()?,
            SelectionStore::new(paths::selection_path()?),
        ))
    }

    /// Replace the archive fetcher.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArchiveFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn models_root(&self) -> &Path {
        &self.models_root
    }

    /// Directory holding the extracted model.
    pub fn model_dir(&self, id: &str) -> PathBuf {
        self.models_root.join(id)
    }

    fn staging_dir(&self, id: &str) -> PathBuf {
        self.models_root.join(STAGING_DIR_NAME).join(id)
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.events.subscribe()
    }

    /// Check whether the model's marker artifact exists.
    pub fn is_downloaded(&self, id: &str) -> bool {
        let Ok(descriptor) = self.catalog.lookup(id) else {
            return false;
        };

        let model_dir = self.model_dir(id);
        if model_dir.join(MARKER_FILENAME).is_file() {
            return true;
        }

        if model_dir.join(descriptor.archive_filename()).exists() {
            warn!(
                "Model '{}' exists as an archive but is not extracted; it will be purged on the next download",
                id
            );
        }

        false
    }

    /// Recompute the downloaded set from the marker artifacts.
    pub fn refresh(&self) {
        let downloaded: HashSet<String> = self
            .catalog
            .list()
            .iter()
            .filter(|model| self.is_downloaded(&model.id))
            .map(|model| model.id.clone())
            .collect();

        debug!("Downloaded models: {:?}", downloaded);
        self.write_state().downloaded = downloaded;
    }

    /// Ids of downloaded models, in catalog order.
    pub fn downloaded_models(&self) -> Vec<String> {
        let state = self.read_state();
        self.catalog
            .list()
            .iter()
            .filter(|model| state.downloaded.contains(&model.id))
            .map(|model| model.id.clone())
            .collect()
    }

    /// Current state of a single model.
    pub fn state(&self, id: &str) -> DownloadState {
        let state = self.read_state();
        if let Some(transfer) = state.transfers.get(id) {
            return *transfer;
        }
        if state.downloaded.contains(id) {
            DownloadState::Downloaded
        } else {
            DownloadState::Absent
        }
    }

    /// State of every catalog entry, in catalog order.
    pub fn snapshot(&self) -> Vec<ModelStatus> {
        let selected = self.selected();
        self.catalog
            .list()
            .iter()
            .map(|descriptor| ModelStatus {
                state: self.state(&descriptor.id),
                selected: selected.as_deref() == Some(descriptor.id.as_str()),
                descriptor: descriptor.clone(),
            })
            .collect()
    }

    /// The selected model id, if any.
    pub fn selected(&self) -> Option<String> {
        self.read_state().selected.clone()
    }

    /// Select a downloaded model and persist the choice.
    pub fn select(&self, id: &str) -> Result<(), LocalAIError> {
        self.catalog.lookup(id)?;

        {
            let mut state = self.write_state();
            if !state.downloaded.contains(id) {
                return Err(LocalAIError::NotDownloaded(id.to_string()));
            }
            if state.selected.as_deref() == Some(id) {
                return Ok(());
            }
            state.selected = Some(id.to_string());
        }

        info!("Selected model '{}'", id);
        self.persist_selection(Some(id));
        Ok(())
    }

    /// Download, extract and verify a model.
    ///
    /// A second call for an id that is already downloading returns
    /// `DownloadOutcome::AlreadyInProgress` without starting a transfer. On
    /// any failure the model directory is removed before the error is returned.
    pub async fn download(&self, id: &str) -> Result<DownloadOutcome, LocalAIError> {
        let descriptor = self.catalog.lookup(id)?.clone();

        let deselected = {
            let mut state = self.write_state();
            if state.is_downloading(id) {
                debug!("Download for '{}' already in progress", id);
                return Ok(DownloadOutcome::AlreadyInProgress);
            }
            state
                .transfers
                .insert(id.to_string(), DownloadState::Downloading { progress: 0.0 });
            state.downloaded.remove(id);

            // The directory is about to be purged; keep the selection honest.
            if state.selected.as_deref() == Some(id) {
                state.selected = None;
                true
            } else {
                false
            }
        };
        if deselected {
            self.persist_selection(None);
        }

        info!("Downloading model '{}' from {}", id, descriptor.download_url);
        self.emit(ModelEvent::DownloadStarted {
            model_id: id.to_string(),
        });

        match self.install(&descriptor).await {
            Ok(()) => self.finish_install(&descriptor).await,
            Err(e) => {
                warn!("Download of '{}' failed: {}", id, e);
                self.rollback(&descriptor).await;
                self.mark_failed(id, &e);
                Err(e)
            }
        }
    }

    /// Remove a model from disk, clearing the selection if it pointed at it.
    pub async fn delete(&self, id: &str) -> Result<(), LocalAIError> {
        self.catalog.lookup(id)?;

        if self.read_state().is_downloading(id) {
            return Err(LocalAIError::DownloadInProgress(id.to_string()));
        }

        remove_dir_if_exists(&self.model_dir(id)).await?;

        let deselected = {
            let mut state = self.write_state();
            state.downloaded.remove(id);
            state.transfers.remove(id);
            if state.selected.as_deref() == Some(id) {
                state.selected = None;
                true
            } else {
                false
            }
        };

        info!("Deleted model '{}'", id);
        self.emit(ModelEvent::Deleted {
            model_id: id.to_string(),
        });
        if deselected {
            self.persist_selection(None);
        }

        self.refresh();
        Ok(())
    }

    /// Purge stale files, fetch the archive, then extract and materialize it.
    async fn install(&self, descriptor: &ModelDescriptor) -> Result<(), LocalAIError> {
        let id = descriptor.id.as_str();
        let model_dir = self.model_dir(id);
        let staging_dir = self.staging_dir(id);

        remove_dir_if_exists(&model_dir).await?;
        remove_dir_if_exists(&staging_dir).await?;
        tokio::fs::create_dir_all(&model_dir).await?;

        let archive = model_dir.join(descriptor.archive_filename());
        let expected_size = descriptor.size_bytes;
        let mut last_reported = 0.0_f64;
        let mut on_progress = |written: u64, total: Option<u64>| {
            let denominator = total.unwrap_or(expected_size);
            let progress = match total {
                Some(total) => progress_fraction(written, total),
                None => progress_fraction(written, expected_size).min(ESTIMATED_PROGRESS_CEILING),
            };
            self.set_progress(id, progress);

            let completed = progress >= 1.0 && last_reported < 1.0;
            if progress - last_reported >= PROGRESS_EVENT_STEP || completed {
                last_reported = progress;
                self.emit(ModelEvent::DownloadProgress {
                    model_id: id.to_string(),
                    progress,
                    downloaded_bytes: written,
                    total_bytes: denominator,
                });
            }
        };

        let written = self
            .fetcher
            .fetch(&descriptor.download_url, &archive, &mut on_progress)
            .await
            .map_err(|e| match e {
                LocalAIError::DownloadFailed(_) => e,
                other => LocalAIError::DownloadFailed(other.to_string()),
            })?;
        debug!("Fetched {} bytes for '{}'", written, id);

        if let Some(expected) = &descriptor.sha256 {
            let actual = sha256_file(archive.clone()).await?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(LocalAIError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
            debug!("Checksum verified: {}", actual);
        }

        let (archive_path, staging) = (archive.clone(), staging_dir.clone());
        tokio::task::spawn_blocking(move || extract_archive(&archive_path, &staging, MARKER_FILENAME))
            .await
            .map_err(|e| LocalAIError::ExtractionFailed(e.to_string()))?
            .map_err(into_extraction_error)?;

        // The model directory only holds the archive at this point.
        remove_dir_if_exists(&model_dir)
            .await
            .map_err(|e| LocalAIError::ExtractionFailed(e.to_string()))?;
        tokio::fs::rename(&staging_dir, &model_dir)
            .await
            .map_err(|e| LocalAIError::ExtractionFailed(e.to_string()))?;

        Ok(())
    }

    /// Verify the marker and record the model as downloaded.
    async fn finish_install(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<DownloadOutcome, LocalAIError> {
        let id = descriptor.id.as_str();

        if !self.is_downloaded(id) {
            warn!(
                "Model '{}' was downloaded but could not be extracted; it will not be available",
                id
            );
            let error = LocalAIError::VerificationFailed(id.to_string());
            self.rollback(descriptor).await;
            self.mark_failed(id, &error);
            return Err(error);
        }

        let newly_selected = {
            let mut state = self.write_state();
            state.transfers.remove(id);
            state.downloaded.insert(id.to_string());
            if state.selected.is_none() {
                state.selected = Some(id.to_string());
                true
            } else {
                false
            }
        };

        info!("Model '{}' downloaded successfully", id);
        self.emit(ModelEvent::DownloadCompleted {
            model_id: id.to_string(),
        });
        if newly_selected {
            info!("Selected model '{}'", id);
            self.persist_selection(Some(id));
        }

        Ok(DownloadOutcome::Installed)
    }

    /// Delete every partial artifact of a failed download.
    async fn rollback(&self, descriptor: &ModelDescriptor) {
        let id = descriptor.id.as_str();
        let model_dir = self.model_dir(id);

        for path in [
            model_dir.join(descriptor.archive_filename()),
            model_dir,
            self.staging_dir(id),
        ] {
            let target = path.clone();
            let removed = tokio::task::spawn_blocking(move || remove_path(&target)).await;
            match removed {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to clean up {:?}: {}", path, e),
                Err(e) => warn!("Cleanup task for {:?} failed: {}", path, e),
            }
        }
    }

    fn mark_failed(&self, id: &str, error: &LocalAIError) {
        {
            let mut state = self.write_state();
            state.transfers.insert(id.to_string(), DownloadState::Failed);
            state.downloaded.remove(id);
        }
        self.emit(ModelEvent::DownloadFailed {
            model_id: id.to_string(),
            error: error.to_string(),
        });
    }

    fn set_progress(&self, id: &str, progress: f64) {
        self.write_state()
            .transfers
            .insert(id.to_string(), DownloadState::Downloading { progress });
    }

    /// Load the persisted selection and make it agree with the disk.
    fn reconcile_selection(&self) {
        self.refresh();

        let persisted = self.selection_store.load();
        let downloaded = self.downloaded_models();

        let selected = match persisted {
            Some(id) if downloaded.contains(&id) => Some(id),
            Some(id) => {
                warn!("Selected model '{}' is not downloaded; clearing selection", id);
                downloaded.first().cloned()
            }
            None => downloaded.first().cloned(),
        };

        let changed = selected != self.selection_store.load();
        self.write_state().selected = selected.clone();
        if changed {
            self.persist_selection(selected.as_deref());
        }
    }

    /// Persist the selection; failures are logged and the in-memory value wins.
    fn persist_selection(&self, selected: Option<&str>) {
        if let Err(e) = self.selection_store.save(selected) {
            warn!(
                "Failed to persist model selection to {:?}: {}",
                self.selection_store.path(),
                e
            );
        }
        self.emit(ModelEvent::SelectionChanged {
            model_id: selected.map(str::to_string),
        });
    }

    fn emit(&self, event: ModelEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ManagerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ManagerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `written / expected`, clamped to `[0, 1]`; an unknown (zero) size yields 0.
pub fn progress_fraction(written: u64, expected: u64) -> f64 {
    if expected == 0 {
        return 0.0;
    }
    (written as f64 / expected as f64).clamp(0.0, 1.0)
}

fn into_extraction_error(err: LocalAIError) -> LocalAIError {
    match err {
        LocalAIError::ExtractionFailed(_) => err,
        other => LocalAIError::ExtractionFailed(other.to_string()),
    }
}

async fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

async fn sha256_file(path: PathBuf) -> Result<String, LocalAIError> {
    tokio::task::spawn_blocking(move || -> Result<String, LocalAIError> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| LocalAIError::DownloadFailed(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::WeightFormat;
    use crate::extract::tests::build_zip;
    use crate::fetch::ProgressFn;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    const MODEL_A: &str = "model-a";
    const MODEL_B: &str = "model-b";

    enum Payload {
        Zip(Vec<u8>),
        Bytes(Vec<u8>),
        Fail,
    }

    /// Fetcher that writes a canned archive and counts transfers.
    struct FakeFetcher {
        payload: Payload,
        announce_length: bool,
        chunks: u64,
        calls: AtomicUsize,
        progress: Mutex<Vec<(u64, Option<u64>)>>,
    }

    impl FakeFetcher {
        fn build(payload: Payload, announce_length: bool, chunks: u64) -> Arc<Self> {
            Arc::new(Self {
                payload,
                announce_length,
                chunks,
                calls: AtomicUsize::new(0),
                progress: Mutex::new(Vec::new()),
            })
        }

        fn new(payload: Payload) -> Arc<Self> {
            Self::build(payload, true, 1)
        }

        fn without_length(payload: Payload) -> Arc<Self> {
            Self::build(payload, false, 1)
        }

        /// Reports the transfer in `chunks` callbacks without a content length.
        fn streaming(payload: Payload, chunks: u64) -> Arc<Self> {
            Self::build(payload, false, chunks)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ArchiveFetcher for FakeFetcher {
        async fn fetch(
            &self,
            _url: &str,
            dest: &Path,
            progress: &mut ProgressFn<'_>,
        ) -> Result<u64, LocalAIError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;

            let bytes = match &self.payload {
                Payload::Zip(bytes) | Payload::Bytes(bytes) => bytes.clone(),
                Payload::Fail => {
                    tokio::fs::write(dest, b"partial").await?;
                    return Err(LocalAIError::DownloadFailed("connection reset".to_string()));
                }
            };

            let len = bytes.len() as u64;
            let total = self.announce_length.then_some(len);
            tokio::fs::write(dest, &bytes).await?;
            for chunk in 1..=self.chunks {
                progress(len * chunk / self.chunks, total);
            }
            self.progress.lock().unwrap().push((len, total));
            Ok(len)
        }
    }

    fn descriptor(id: &str) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            display_name: id.to_string(),
            description: String::new(),
            download_url: format!("https://example.invalid/{}.zip", id),
            size_bytes: 0,
            sha256: None,
            weights: WeightFormat::Gguf,
        }
    }

    fn model_zip() -> Vec<u8> {
        build_zip(&[("config.json", "{\"model_type\":\"qwen3\"}"), ("weights.bin", "w")])
    }

    fn manager_with(dir: &TempDir, catalog: Vec<ModelDescriptor>, fetcher: Arc<dyn ArchiveFetcher>) -> ModelManager {
        ModelManager::new(
            ModelCatalog::new(catalog).unwrap(),
            dir.path().join("models"),
            SelectionStore::new(dir.path().join("support").join("selection.json")),
        )
        .with_fetcher(fetcher)
    }

    fn manager(dir: &TempDir, fetcher: Arc<dyn ArchiveFetcher>) -> ModelManager {
        manager_with(dir, vec![descriptor(MODEL_A), descriptor(MODEL_B)], fetcher)
    }

    fn install_marker(dir: &TempDir, id: &str) {
        let model_dir = dir.path().join("models").join(id);
        std::fs::create_dir_all(&model_dir).unwrap();
        std::fs::write(model_dir.join(MARKER_FILENAME), "{}").unwrap();
    }

    fn drain(rx: &mut broadcast::Receiver<ModelEvent>) -> Vec<ModelEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn marker_is_the_only_truth_for_downloaded() {
        let dir = tempdir().unwrap();
        let manager = manager(&dir, FakeFetcher::new(Payload::Fail));
        let model_dir = manager.model_dir(MODEL_A);

        assert!(!manager.is_downloaded(MODEL_A));

        std::fs::create_dir_all(&model_dir).unwrap();
        assert!(!manager.is_downloaded(MODEL_A), "directory alone is not enough");

        std::fs::write(model_dir.join("model-a.zip"), b"zip").unwrap();
        assert!(!manager.is_downloaded(MODEL_A), "stale archive is not enough");

        std::fs::write(model_dir.join(MARKER_FILENAME), "{}").unwrap();
        assert!(manager.is_downloaded(MODEL_A));
    }

    #[tokio::test]
    async fn download_installs_and_selects_first_model() {
        let dir = tempdir().unwrap();
        let fetcher = FakeFetcher::new(Payload::Zip(model_zip()));
        let manager = manager(&dir, fetcher.clone());

        let outcome = manager.download(MODEL_A).await.unwrap();

        assert_eq!(outcome, DownloadOutcome::Installed);
        assert!(manager.is_downloaded(MODEL_A));
        assert_eq!(manager.state(MODEL_A), DownloadState::Downloaded);
        assert_eq!(manager.downloaded_models(), vec![MODEL_A.to_string()]);
        assert_eq!(manager.selected().as_deref(), Some(MODEL_A));
        assert!(!manager.model_dir(MODEL_A).join("model-a.zip").exists());
        assert!(!dir.path().join("models").join(".staging").join(MODEL_A).exists());

        // A second model does not steal the selection.
        manager.download(MODEL_B).await.unwrap();
        assert_eq!(manager.selected().as_deref(), Some(MODEL_A));
    }

    #[tokio::test]
    async fn concurrent_downloads_share_one_transfer() {
        let dir = tempdir().unwrap();
        let fetcher = FakeFetcher::new(Payload::Zip(model_zip()));
        let manager = manager(&dir, fetcher.clone());
        let mut events = manager.subscribe();

        let (first, second) = tokio::join!(manager.download(MODEL_A), manager.download(MODEL_A));
        let mut outcomes = vec![first.unwrap(), second.unwrap()];
        outcomes.sort_by_key(|o| matches!(o, DownloadOutcome::AlreadyInProgress));

        assert_eq!(
            outcomes,
            vec![DownloadOutcome::Installed, DownloadOutcome::AlreadyInProgress]
        );
        assert_eq!(fetcher.calls(), 1);

        let events = drain(&mut events);
        let terminal = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    ModelEvent::DownloadCompleted { .. } | ModelEvent::DownloadFailed { .. }
                )
            })
            .count();
        assert_eq!(terminal, 1);
    }

    #[tokio::test]
    async fn failed_transfer_leaves_no_residue() {
        let dir = tempdir().unwrap();
        let manager = manager(&dir, FakeFetcher::new(Payload::Fail));

        let result = manager.download(MODEL_A).await;

        assert!(matches!(result, Err(LocalAIError::DownloadFailed(_))));
        assert!(!manager.model_dir(MODEL_A).exists());
        assert!(!manager.is_downloaded(MODEL_A));
        assert_eq!(manager.state(MODEL_A), DownloadState::Failed);
        assert_eq!(manager.selected(), None);
    }

    #[tokio::test]
    async fn corrupt_archive_is_rolled_back() {
        let dir = tempdir().unwrap();
        let manager = manager(&dir, FakeFetcher::new(Payload::Bytes(b"not a zip".to_vec())));

        let result = manager.download(MODEL_A).await;

        assert!(matches!(result, Err(LocalAIError::ExtractionFailed(_))));
        assert!(!manager.model_dir(MODEL_A).exists());
        assert!(!dir.path().join("models").join(".staging").join(MODEL_A).exists());
        assert_eq!(manager.state(MODEL_A), DownloadState::Failed);
    }

    #[tokio::test]
    async fn archive_without_marker_fails_verification() {
        let dir = tempdir().unwrap();
        let zip = build_zip(&[("weights.bin", "w"), ("tokenizer.json", "{}")]);
        let manager = manager(&dir, FakeFetcher::new(Payload::Zip(zip)));

        let result = manager.download(MODEL_A).await;

        assert!(matches!(result, Err(LocalAIError::VerificationFailed(id)) if id == MODEL_A));
        assert!(!manager.model_dir(MODEL_A).exists());
        assert_eq!(manager.state(MODEL_A), DownloadState::Failed);
        assert!(manager.downloaded_models().is_empty());
    }

    #[tokio::test]
    async fn nested_archive_is_flattened_on_install() {
        let dir = tempdir().unwrap();
        let zip = build_zip(&[
            ("Model-A/", ""),
            ("Model-A/config.json", "{}"),
            ("Model-A/weights.bin", "w"),
            ("__MACOSX/", ""),
            ("__MACOSX/._Model-A", "junk"),
        ]);
        let manager = manager(&dir, FakeFetcher::new(Payload::Zip(zip)));

        manager.download(MODEL_A).await.unwrap();

        let model_dir = manager.model_dir(MODEL_A);
        assert!(model_dir.join(MARKER_FILENAME).exists());
        assert!(model_dir.join("weights.bin").exists());
        assert!(!model_dir.join("Model-A").exists());
        assert!(!model_dir.join("__MACOSX").exists());
    }

    #[tokio::test]
    async fn retry_purges_stale_partial_state() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join("models").join(MODEL_A);
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("model-a.zip"), b"half an archive").unwrap();
        std::fs::write(stale.join("leftover.bin"), b"junk").unwrap();

        let manager = manager(&dir, FakeFetcher::new(Payload::Zip(model_zip())));
        assert!(!manager.is_downloaded(MODEL_A));

        manager.download(MODEL_A).await.unwrap();

        assert!(manager.is_downloaded(MODEL_A));
        assert!(!stale.join("leftover.bin").exists());
    }

    #[tokio::test]
    async fn checksum_mismatch_is_rolled_back() {
        let dir = tempdir().unwrap();
        let mut model = descriptor(MODEL_A);
        model.sha256 = Some("00".repeat(32));
        let manager = manager_with(
            &dir,
            vec![model],
            FakeFetcher::new(Payload::Zip(model_zip())),
        );

        let result = manager.download(MODEL_A).await;

        assert!(matches!(result, Err(LocalAIError::ChecksumMismatch { .. })));
        assert!(!manager.model_dir(MODEL_A).exists());
    }

    #[tokio::test]
    async fn unknown_content_length_falls_back_to_catalog_size() {
        let dir = tempdir().unwrap();
        let zip = model_zip();
        let mut model = descriptor(MODEL_A);
        model.size_bytes = zip.len() as u64 * 2;
        let fetcher = FakeFetcher::without_length(Payload::Zip(zip));
        let manager = manager_with(&dir, vec![model], fetcher.clone());
        let mut events = manager.subscribe();

        manager.download(MODEL_A).await.unwrap();

        let progress: Vec<f64> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                ModelEvent::DownloadProgress { progress, .. } => Some(progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![0.5]);
        assert_eq!(fetcher.progress.lock().unwrap()[0].1, None);
    }

    #[tokio::test]
    async fn progress_past_the_estimate_stays_throttled() {
        let dir = tempdir().unwrap();
        let zip = model_zip();
        let mut model = descriptor(MODEL_A);
        model.size_bytes = (zip.len() as u64 / 10).max(1);
        let manager = manager_with(&dir, vec![model], FakeFetcher::streaming(Payload::Zip(zip), 100));
        let mut events = manager.subscribe();

        manager.download(MODEL_A).await.unwrap();

        let mut progress = Vec::new();
        let mut started = false;
        loop {
            match events.try_recv() {
                Ok(ModelEvent::DownloadStarted { .. }) => started = true,
                Ok(ModelEvent::DownloadProgress { progress: p, .. }) => progress.push(p),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty) => break,
                Err(e) => panic!("event stream broken: {:?}", e),
            }
        }

        assert!(started);
        assert!(progress.len() <= 11, "{} progress events", progress.len());
        assert!(progress.iter().all(|p| *p < 1.0));
        assert_eq!(progress.last().copied(), Some(ESTIMATED_PROGRESS_CEILING));
        assert_eq!(manager.state(MODEL_A), DownloadState::Downloaded);
    }

    #[tokio::test]
    async fn completion_is_reported_once_for_known_lengths() {
        let dir = tempdir().unwrap();
        let manager = manager(&dir, FakeFetcher::build(Payload::Zip(model_zip()), true, 50));
        let mut events = manager.subscribe();

        manager.download(MODEL_A).await.unwrap();

        let complete = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, ModelEvent::DownloadProgress { progress, .. } if *progress >= 1.0))
            .count();
        assert_eq!(complete, 1);
    }

    #[test]
    fn progress_fraction_guards_unknown_totals() {
        assert_eq!(progress_fraction(10, 0), 0.0);
        assert_eq!(progress_fraction(5, 10), 0.5);
        assert_eq!(progress_fraction(30, 10), 1.0);
    }

    #[tokio::test]
    async fn deleting_selected_model_clears_selection() {
        let dir = tempdir().unwrap();
        install_marker(&dir, MODEL_A);
        install_marker(&dir, MODEL_B);
        let manager = manager(&dir, FakeFetcher::new(Payload::Fail));
        assert_eq!(manager.selected().as_deref(), Some(MODEL_A));

        manager.delete(MODEL_B).await.unwrap();
        assert_eq!(manager.selected().as_deref(), Some(MODEL_A));
        assert!(!manager.model_dir(MODEL_B).exists());

        manager.delete(MODEL_A).await.unwrap();
        assert_eq!(manager.selected(), None);
        assert_eq!(manager.state(MODEL_A), DownloadState::Absent);
        assert!(manager.downloaded_models().is_empty());
    }

    #[test]
    fn failed_selection_save_keeps_memory_authoritative() {
        let dir = tempdir().unwrap();
        install_marker(&dir, MODEL_A);
        install_marker(&dir, MODEL_B);
        let selection_path = dir.path().join("support").join("selection.json");

        let first_run = manager(&dir, FakeFetcher::new(Payload::Fail));
        assert_eq!(first_run.selected().as_deref(), Some(MODEL_A));
        drop(first_run);

        std::fs::create_dir(selection_path.with_extension("json.tmp")).unwrap();

        let second_run = manager(&dir, FakeFetcher::new(Payload::Fail));
        let mut events = second_run.subscribe();
        second_run.select(MODEL_B).unwrap();
        assert_eq!(second_run.selected().as_deref(), Some(MODEL_B));
        assert!(drain(&mut events).iter().any(|e| matches!(
            e,
            ModelEvent::SelectionChanged { model_id: Some(id) } if id == MODEL_B
        )));

        let third_run = manager(&dir, FakeFetcher::new(Payload::Fail));
        assert_eq!(third_run.selected().as_deref(), Some(MODEL_A));
    }

    #[test]
    fn select_requires_downloaded_model() {
        let dir = tempdir().unwrap();
        install_marker(&dir, MODEL_A);
        let manager = manager(&dir, FakeFetcher::new(Payload::Fail));

        assert!(matches!(
            manager.select(MODEL_B),
            Err(LocalAIError::NotDownloaded(id)) if id == MODEL_B
        ));
        assert!(matches!(manager.select("nope"), Err(LocalAIError::UnknownModel(_))));
        assert_eq!(manager.selected().as_deref(), Some(MODEL_A));
    }

    #[test]
    fn selection_survives_restart() {
        let dir = tempdir().unwrap();
        install_marker(&dir, MODEL_A);
        install_marker(&dir, MODEL_B);

        let first_run = manager(&dir, FakeFetcher::new(Payload::Fail));
        first_run.select(MODEL_B).unwrap();
        drop(first_run);

        let restarted = manager(&dir, FakeFetcher::new(Payload::Fail));
        assert_eq!(restarted.selected().as_deref(), Some(MODEL_B));
    }

    #[test]
    fn stale_persisted_selection_is_cleared() {
        let dir = tempdir().unwrap();
        let store = SelectionStore::new(dir.path().join("support").join("selection.json"));
        store.save(Some(MODEL_B)).unwrap();

        let manager = manager(&dir, FakeFetcher::new(Payload::Fail));

        assert_eq!(manager.selected(), None);
        assert_eq!(store.load(), None);
    }
}
