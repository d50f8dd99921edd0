//! Error types shared by embedder and generator implementations.

use thiserror::Error;

/// Errors an [`crate::embedder::Embedder`] or [`crate::generator::ImageGenerator`]
/// implementation can report.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The underlying model or service failed to produce output.
    #[error("backend failed: {0}")]
    Backend(#[source] anyhow::Error),

    /// An embedding came back with an unexpected dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension declared by the embedder.
        expected: usize,
        /// Dimension actually returned.
        actual: usize,
    },

    /// The operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,
}

/// Result type alias used throughout `retrieval-core`.
pub type Result<T> = std::result::Result<T, CoreError>;
