//! Error types shared by ingestion, indexing, retrieval and generation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the course advisor pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// A source file or record is not valid for its declared family.
    #[error("Format error ({source_name}): {message}")]
    Format {
        /// The source file (or record) that failed to parse.
        source_name: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding provider was unreachable or returned malformed output.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The persisted index exists but cannot be used.
    #[error("Corrupt index at {}: {message}", path.display())]
    CorruptIndex { path: PathBuf, message: String },

    /// No persisted index exists at the given path.
    #[error("Index not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A query vector does not match the dimension of the index.
    #[error("Dimension mismatch: index holds {expected}-d vectors, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The language model call failed or produced no output.
    #[error("Generation error: {0}")]
    Generation(String),

    /// The labeled evaluation set does not exist.
    #[error("Labeled set file not found: {}", .0.display())]
    MissingLabeledSet(PathBuf),

    /// The labeled evaluation set is malformed.
    #[error("Invalid labeled set {}: {message}", path.display())]
    LabeledSet { path: PathBuf, message: String },

    /// A requested file lies outside the directory it must be read from.
    #[error("Path not allowed: {0}")]
    PathNotAllowed(String),

    /// A configuration value failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An index rebuild is already running.
    #[error("Index rebuild already in progress")]
    IndexBusy,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RagError {
    pub(crate) fn format(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Format { source_name: source_name.into(), message: message.into() }
    }

    pub(crate) fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Embedding { provider: provider.into(), message: message.into() }
    }

    /// True for failures of the external embedding or language model providers.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Embedding { .. } | Self::Generation(_))
    }
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;
