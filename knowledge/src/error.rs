//! Error types for the knowledge codex.

use thiserror::Error;

use crate::entry::{EntryKind, EntryRef};

/// Result type alias for codex operations.
pub type Result<T> = std::result::Result<T, CodexError>;

/// Errors that can occur while maintaining the codex.
#[derive(Error, Debug)]
pub enum CodexError {
    /// No entry with this tag exists in the store.
    #[error("entry not found: {0}")]
    NotFound(EntryRef),

    /// An identifier was handed out twice. The allocator and the store
    /// disagree, so the enclosing operation is aborted.
    #[error("duplicate entry id: {0}")]
    DuplicateId(EntryRef),

    /// Every id of this kind has been handed out.
    #[error("no {0:?} ids left")]
    IdsExhausted(EntryKind),

    /// A submitted entry names a related entry that does not exist.
    #[error("related entry does not exist: {0}")]
    UnknownReference(EntryRef),

    /// Reorganization failed and was rolled back.
    #[error("reorganization rolled back: {0}")]
    PartialReorganization(String),

    /// Submitted entry fields are unusable.
    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    /// A tag such as `E001` could not be parsed.
    #[error("invalid entry reference: {0}")]
    InvalidReference(String),

    /// Configuration is inconsistent (bad rule pattern, bad override tag).
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create a directory.
    #[error("failed to create directory: {0}")]
    CreateDirectory(String),

    /// Failed to read a file.
    #[error("failed to read file: {0}")]
    ReadFile(String),

    /// Failed to write a staged file.
    #[error("failed to write file: {0}")]
    WriteFile(String),

    /// Failed to move a staged file into place.
    #[error("failed to rename file: {0}")]
    Rename(String),
}
