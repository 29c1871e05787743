//! Feed error types.

use std::path::PathBuf;

/// Errors raised by the package index, its value types and storage.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Version text does not follow the version grammar.
    #[error("malformed version '{input}': {reason}")]
    MalformedVersion { input: String, reason: String },

    /// Version range text does not follow the bracket notation.
    #[error("malformed version constraint '{input}': {reason}")]
    MalformedConstraint { input: String, reason: String },

    /// Target framework moniker could not be parsed.
    #[error("malformed framework moniker '{input}': {reason}")]
    MalformedFramework { input: String, reason: String },

    /// A package being published carries unusable metadata.
    #[error("invalid package metadata: {detail}")]
    InvalidPackageMetadata { detail: String },

    /// The (id, version) pair is already present and overwriting is disabled.
    #[error("package '{id} {version}' already exists")]
    DuplicateVersion { id: String, version: String },

    /// The (id, version) pair is not present.
    #[error("package '{id} {version}' not found")]
    NotFound { id: String, version: String },

    /// A package file on disk could not be read or understood.
    #[error("corrupt package at {path}: {detail}")]
    CorruptPackage { path: PathBuf, detail: String },

    /// The storage root itself could not be listed.
    #[error("package storage unavailable at {path}: {detail}")]
    StorageUnavailable { path: PathBuf, detail: String },

    /// Package storage write failed.
    #[error("storage write failed at {path}: {detail}")]
    StorageWrite { path: PathBuf, detail: String },

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Zip archive error.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeedError {
    pub(crate) fn not_found(id: &str, version: impl ToString) -> Self {
        FeedError::NotFound {
            id: id.to_string(),
            version: version.to_string(),
        }
    }

    pub(crate) fn duplicate(id: &str, version: impl ToString) -> Self {
        FeedError::DuplicateVersion {
            id: id.to_string(),
            version: version.to_string(),
        }
    }
}

/// Result type alias for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
