//! Error types for local model operations.

use thiserror::Error;

/// Errors that can occur while managing local models.
#[derive(Debug, Error)]
pub enum LocalAIError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The id is not part of the catalog.
    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    /// The model exists in the catalog but is not on disk.
    #[error("Model '{0}' is not downloaded")]
    NotDownloaded(String),

    /// A download for this model is still running.
    #[error("Model '{0}' is currently downloading")]
    DownloadInProgress(String),

    /// Model download failed.
    #[error("Failed to download model: {0}")]
    DownloadFailed(String),

    /// The archive could not be unpacked.
    #[error("Failed to extract model archive: {0}")]
    ExtractionFailed(String),

    /// The archive unpacked but the marker artifact is missing.
    #[error("Model '{0}' was extracted but its configuration file is missing")]
    VerificationFailed(String),

    /// Checksum verification failed.
    #[error("Model checksum mismatch. Expected: {expected}, got: {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Invalid catalog definition.
    #[error("Invalid model catalog: {0}")]
    InvalidCatalog(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No documents or data directory could be determined.
    #[error("Could not determine the {0} directory")]
    DataDirUnavailable(&'static str),
}

impl From<zip::result::ZipError> for LocalAIError {
    fn from(err: zip::result::ZipError) -> Self {
        LocalAIError::ExtractionFailed(err.to_string())
    }
}
