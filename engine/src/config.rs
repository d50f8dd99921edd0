//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, Result};

/// HNSW index construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct IndexParams {
    /// Number of bi-directional links per node.
    pub m: usize,
    /// Size of the dynamic candidate list during construction.
    pub ef_construction: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            m: 48,
            ef_construction: 200,
        }
    }
}

/// Typed configuration for a retrieval engine instance.
///
/// Every tunable has a sensible default; use [`EngineConfig::builder`] to
/// override specific fields.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Size of the bounded indexing worker pool (C5).
    pub num_watcher_workers: usize,
    /// Intra-task parallelism hint passed to embedders.
    pub num_embedding_workers: usize,
    /// Number of images embedded per forward pass during directory indexing.
    pub batch_size: usize,
    /// Whether the filesystem scanner recurses into subdirectories.
    pub recursive_indexing: bool,
    /// Whether the scanner follows symlinked subdirectories.
    pub follow_symlinks: bool,
    /// Interval between consistency reconciler passes.
    pub consistency_check_interval: Duration,
    /// Default learning rate for feedback-driven weight updates.
    pub default_eta: f32,
    /// HNSW construction parameters applied to every embedder collection.
    pub index_params: IndexParams,
    /// Default number of results a retrieval call returns.
    pub num_images_to_retrieve: usize,
    /// Default number of guide images generated per query.
    pub num_images_to_generate: usize,
    /// Default engines to use before partial success is accepted.
    pub num_engines_to_use: usize,
    /// Whether a failing generation engine is skipped in favor of the next.
    pub use_fallback: bool,
    /// Where embedder fusion weights are persisted after every update, and
    /// loaded from at startup if present. `None` keeps weights in memory
    /// only.
    pub weights_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_watcher_workers: 4,
            num_embedding_workers: 4,
            batch_size: 50,
            recursive_indexing: false,
            follow_symlinks: false,
            consistency_check_interval: Duration::from_secs(1800),
            default_eta: 0.05,
            index_params: IndexParams::default(),
            num_images_to_retrieve: 20,
            num_images_to_generate: 4,
            num_engines_to_use: usize::MAX,
            use_fallback: true,
            weights_path: None,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for custom configuration.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Validates the configuration, returning [`EngineError::Invalid`] on
    /// the first violated constraint.
    ///
    /// Called once at engine construction time so a malformed configuration
    /// never results in a partially-initialized engine.
    pub fn validate(&self) -> Result<()> {
        if self.num_watcher_workers == 0 {
            return Err(EngineError::Invalid(
                "num_watcher_workers must be greater than zero".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(EngineError::Invalid(
                "batch_size must be greater than zero".into(),
            ));
        }
        if self.num_images_to_retrieve == 0 {
            return Err(EngineError::Invalid(
                "num_images_to_retrieve must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.default_eta) {
            return Err(EngineError::Invalid(
                "default_eta must be within [0.0, 1.0]".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Creates a new builder seeded with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Sets the indexing worker pool size.
    #[must_use]
    pub const fn num_watcher_workers(mut self, n: usize) -> Self {
        self.config.num_watcher_workers = n;
        self
    }

    /// Sets the embedding batch size.
    #[must_use]
    pub const fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    /// Enables or disables recursive directory scanning.
    #[must_use]
    pub const fn recursive_indexing(mut self, enabled: bool) -> Self {
        self.config.recursive_indexing = enabled;
        self
    }

    /// Enables or disables following symlinked subdirectories.
    #[must_use]
    pub const fn follow_symlinks(mut self, enabled: bool) -> Self {
        self.config.follow_symlinks = enabled;
        self
    }

    /// Sets the consistency reconciler interval.
    #[must_use]
    pub const fn consistency_check_interval(mut self, interval: Duration) -> Self {
        self.config.consistency_check_interval = interval;
        self
    }

    /// Sets the feedback learning rate.
    #[must_use]
    pub const fn default_eta(mut self, eta: f32) -> Self {
        self.config.default_eta = eta;
        self
    }

    /// Sets the HNSW construction parameters.
    #[must_use]
    pub const fn index_params(mut self, params: IndexParams) -> Self {
        self.config.index_params = params;
        self
    }

    /// Sets the default number of results returned per retrieval.
    #[must_use]
    pub const fn num_images_to_retrieve(mut self, n: usize) -> Self {
        self.config.num_images_to_retrieve = n;
        self
    }

    /// Sets the default number of guide images generated per query.
    #[must_use]
    pub const fn num_images_to_generate(mut self, n: usize) -> Self {
        self.config.num_images_to_generate = n;
        self
    }

    /// Sets how many generation engines must succeed before the rest are
    /// skipped.
    #[must_use]
    pub const fn num_engines_to_use(mut self, n: usize) -> Self {
        self.config.num_engines_to_use = n;
        self
    }

    /// Enables or disables falling back to the next engine on failure.
    #[must_use]
    pub const fn use_fallback(mut self, enabled: bool) -> Self {
        self.config.use_fallback = enabled;
        self
    }

    /// Sets the path embedder fusion weights are persisted to and loaded
    /// from.
    #[must_use]
    pub fn weights_path(mut self, path: PathBuf) -> Self {
        self.config.weights_path = Some(path);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_workers_is_invalid() {
        let result = EngineConfig::builder().num_watcher_workers(0).build();
        assert!(matches!(result, Err(EngineError::Invalid(_))));
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let result = EngineConfig::builder().batch_size(0).build();
        assert!(matches!(result, Err(EngineError::Invalid(_))));
    }

    #[test]
    fn eta_out_of_range_is_invalid() {
        let result = EngineConfig::builder().default_eta(1.5).build();
        assert!(matches!(result, Err(EngineError::Invalid(_))));
    }

    #[test]
    fn builder_overrides_apply() {
        let config = EngineConfig::builder()
            .num_watcher_workers(8)
            .batch_size(10)
            .recursive_indexing(true)
            .build()
            .unwrap();
        assert_eq!(config.num_watcher_workers, 8);
        assert_eq!(config.batch_size, 10);
        assert!(config.recursive_indexing);
    }
}
