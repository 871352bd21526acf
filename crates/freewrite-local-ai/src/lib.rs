//! Local model management for Freewrite.
//!
//! This crate owns everything about a model's life on disk: the catalog of
//! known models, streaming downloads, archive extraction, verification,
//! the persisted selection and deletion.

mod catalog;
mod error;
mod extract;
mod fetch;
mod manager;
pub mod paths;
mod selection;

pub use catalog::{ModelCatalog, ModelDescriptor, WeightFormat, MARKER_FILENAME};
pub use error::LocalAIError;
pub use extract::{extract_archive, flatten_single_root};
pub use fetch::{ArchiveFetcher, HttpFetcher, ProgressFn};
pub use manager::{
    progress_fraction, DownloadOutcome, DownloadState, ModelEvent, ModelManager, ModelStatus,
};
pub use selection::SelectionStore;
