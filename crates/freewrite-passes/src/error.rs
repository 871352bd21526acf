//! Error types for pass management.

use thiserror::Error;

/// Errors returned by `PassStore` mutations. A failed mutation changes nothing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PassError {
    /// Name or prompt was empty after trimming.
    #[error("pass {0} must not be empty")]
    EmptyField(&'static str),

    /// Built-in passes cannot be deleted.
    #[error("'{name}' is a built-in pass and cannot be deleted")]
    ProtectedPass { name: String },

    /// An index did not refer to any pass.
    #[error("no pass at index {index} (have {len})")]
    IndexOutOfRange { index: usize, len: usize },
}
