//! Error types and load result structures for rule-group documents.

use std::path::PathBuf;

use culler_core::ProviderError;

/// Errors raised while loading, importing or evaluating rule groups.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Stored rule JSON could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rule validation error (unknown key, incompatible comparator, bad literal).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A capability provider failed while the group was being evaluated.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Media item not found: {0}")]
    MediaNotFound(String),
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Outcome of loading a single rule-group file.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was loaded.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    /// Group was parsed and validated.
    Loaded { name: String, rules: usize },
    /// File was skipped (dotfile, non-YAML, etc.).
    Skipped { reason: String },
    /// Parse or validation error occurred.
    Failed { error: String },
}
