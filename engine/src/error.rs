//! Error type for the retrieval engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors the retrieval engine can surface to a caller.
///
/// Variants map onto the error kinds enumerated in the design: `NotFound`
/// and `Invalid` are never retried, `Transient` is retried internally by
/// background indexing tasks only, and `Fatal` is reserved for
/// initialization failures that should end the process.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A directory, image, or query id did not resolve to anything.
    #[error("not found: {0}")]
    NotFound(String),

    /// A request or configuration was ill-formed.
    #[error("invalid request: {0}")]
    Invalid(String),

    /// The catalog store, vector store, or generator was momentarily
    /// unavailable.
    #[error("transient failure in {component}: {source}")]
    Transient {
        /// Which collaborator failed (`"catalog"`, `"vector store"`, …).
        component: &'static str,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },

    /// The catalog store reported an error.
    #[error("catalog error: {0}")]
    Catalog(#[source] anyhow::Error),

    /// The vector store reported an error.
    #[error("vector store error: {0}")]
    VectorStore(#[source] anyhow::Error),

    /// An embedder or generator implementation reported an error.
    #[error("backend error: {0}")]
    Core(#[from] retrieval_core::CoreError),

    /// Filesystem access failed for the given path.
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        /// Path the operation was attempted against.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An operation exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Result type alias used throughout `retrieval-engine`.
pub type Result<T> = std::result::Result<T, EngineError>;
