//! Prompt passes for Freewrite.
//!
//! A pass is a named prompt template applied to the user's text. The
//! built-in passes ship with the application and keep their ids forever;
//! custom passes are created by the user and persisted to a JSON file.

mod error;
mod pass;
mod store;

pub use error::PassError;
pub use pass::{builtin_passes, Pass, PassKind, CLEAN_UP_ID, CORE_IDEAS_ID, WRITING_FEEDBACK_ID};
pub use store::PassStore;
