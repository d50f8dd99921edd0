//! Engine Facade (C13) and Lifecycle & Shutdown (C16): the single entry
//! point an embedding application drives, tying together every other
//! component.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use retrieval_core::ImageGenerator;
use tokio::sync::Notify;

use crate::catalog::CatalogStore;
use crate::config::EngineConfig;
use crate::embedders::{DynEmbedderHandle, EmbedderSet};
use crate::error::{EngineError, Result};
use crate::feedback::FeedbackUpdater;
use crate::generator_client::GeneratorClient;
use crate::indexer::DirectoryIndexer;
use crate::query_registry::QueryRegistry;
use crate::queue::{IndexingQueue, PRIORITY_SCAN};
use crate::reconciler;
use crate::retrieval::{RetrievalPipeline, SearchOutcome};
use crate::types::Directory;
use crate::vector::VectorStoreSet;
use crate::watcher::ChangeWatcher;

/// Builds an [`Engine`] from its required collaborators.
pub struct EngineBuilder<C: CatalogStore, G: ImageGenerator> {
    catalog: Arc<C>,
    embedders: Vec<DynEmbedderHandle>,
    generator: G,
    generation_engine_names: Vec<String>,
    config: EngineConfig,
}

impl<C: CatalogStore + 'static, G: ImageGenerator + 'static> EngineBuilder<C, G> {
    /// Starts a builder over the given catalog backend and guide-image
    /// generator.
    pub fn new(catalog: Arc<C>, generator: G) -> Self {
        Self {
            catalog,
            embedders: Vec::new(),
            generator,
            generation_engine_names: Vec::new(),
            config: EngineConfig::default(),
        }
    }

    /// Registers an embedder to include in the fusion roster.
    #[must_use]
    pub fn with_embedder<E: retrieval_core::Embedder + 'static>(mut self, embedder: E) -> Self {
        self.embedders.push(DynEmbedderHandle::new(embedder));
        self
    }

    /// Names a generation engine the guide-image generator should attempt.
    #[must_use]
    pub fn with_generation_engine(mut self, name: impl Into<String>) -> Self {
        self.generation_engine_names.push(name.into());
        self
    }

    /// Overrides the default configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and assembles the engine.
    pub fn build(self) -> Result<Engine<C, G>> {
        self.config.validate()?;
        if self.embedders.is_empty() {
            return Err(EngineError::Invalid("at least one embedder is required".into()));
        }
        if self.generation_engine_names.is_empty() {
            return Err(EngineError::Invalid(
                "at least one generation engine name is required".into(),
            ));
        }

        let mut embedders = EmbedderSet::new(self.embedders);
        if let Some(path) = self.config.weights_path.clone() {
            if path.exists() {
                embedders.load_weights(&path)?;
            }
            embedders = embedders.with_weights_path(path);
        }
        let embedders = Arc::new(embedders);
        let vectors = Arc::new(VectorStoreSet::new());
        for name in embedders.list() {
            let dim = embedders.get(&name)?.dim();
            vectors.create_if_absent(&name, dim, self.config.index_params);
        }

        let registry = QueryRegistry::new();
        let queue = IndexingQueue::new();
        let indexer = Arc::new(DirectoryIndexer::new(
            Arc::clone(&self.catalog),
            Arc::clone(&vectors),
            Arc::clone(&embedders),
            self.config.batch_size,
            self.config.recursive_indexing,
            self.config.follow_symlinks,
        ));

        let generator_client = GeneratorClient::new(self.generator);
        let pipeline = RetrievalPipeline::new(
            Arc::clone(&self.catalog),
            Arc::clone(&vectors),
            Arc::clone(&embedders),
            generator_client,
            Arc::clone(&registry),
            self.config.num_images_to_retrieve,
            self.config.num_images_to_generate,
            self.config.num_engines_to_use,
            self.config.use_fallback,
            self.generation_engine_names,
        );

        {
            let indexer = Arc::clone(&indexer);
            queue.spawn_workers(
                self.config.num_watcher_workers,
                Arc::new(move |directory_id: i64, directory_path: PathBuf| {
                    let indexer = Arc::clone(&indexer);
                    Box::pin(async move { indexer.index_directory_path(directory_id, &directory_path).await })
                }),
            );
        }

        Ok(Engine {
            catalog: self.catalog,
            vectors,
            embedders,
            registry,
            queue,
            indexer,
            pipeline,
            config: self.config,
            watchers: Mutex::new(HashMap::new()),
            shutdown: Arc::new(Notify::new()),
        })
    }
}

/// The retrieval engine's single entry point.
///
/// Owns every other component and is safe to share behind an `Arc` across
/// tasks; all public methods take `&self`.
pub struct Engine<C: CatalogStore + 'static, G: ImageGenerator + 'static> {
    catalog: Arc<C>,
    vectors: Arc<VectorStoreSet>,
    embedders: Arc<EmbedderSet>,
    registry: Arc<QueryRegistry>,
    queue: Arc<IndexingQueue>,
    indexer: Arc<DirectoryIndexer<C>>,
    pipeline: RetrievalPipeline<C, G>,
    config: EngineConfig,
    watchers: Mutex<HashMap<i64, ChangeWatcher>>,
    shutdown: Arc<Notify>,
}

impl<C: CatalogStore + 'static, G: ImageGenerator + 'static> Engine<C, G> {
    /// Creates a builder; the primary way to assemble an engine.
    pub fn builder(catalog: Arc<C>, generator: G) -> EngineBuilder<C, G> {
        EngineBuilder::new(catalog, generator)
    }

    /// Registers a directory for indexing and search. Idempotent: calling
    /// this again for an already-registered path returns the existing row
    /// without rescanning.
    ///
    /// Starts a filesystem watcher for the directory and enqueues an initial
    /// indexing pass through the indexing queue (C5); the directory becomes
    /// searchable once a queue worker picks it up and `is_indexed` flips to
    /// `true`, not synchronously on return.
    pub async fn register_directory(&self, path: &Path) -> Result<Directory> {
        let directory = match self.catalog.get_directory_by_path(path).await? {
            Some(existing) => existing,
            None => self.catalog.create_directory(path).await?,
        };

        self.queue.enqueue(directory.id, directory.path.clone(), PRIORITY_SCAN);

        let watcher = ChangeWatcher::watch(
            path,
            directory.id,
            Arc::clone(&self.catalog),
            Arc::clone(&self.vectors),
            Arc::clone(&self.queue),
            self.config.recursive_indexing,
        )
        .map_err(|error| EngineError::Filesystem {
            path: path.to_path_buf(),
            source: std::io::Error::other(error),
        })?;
        self.watchers.lock().insert(directory.id, watcher);

        Ok(directory)
    }

    /// Unregisters a directory: stops watching it and deletes its images
    /// from the catalog and every vector collection.
    pub async fn remove_directory(&self, directory_id: i64) -> Result<()> {
        self.watchers.lock().remove(&directory_id);

        let images = self.catalog.list_images_by_directory(directory_id).await?;
        for image in &images {
            self.vectors.remove_everywhere(&image.path.to_string_lossy()).await?;
        }
        self.catalog.delete_images_by_directory(directory_id).await?;
        self.catalog.delete_directory(directory_id).await?;
        Ok(())
    }

    /// Enables or disables a directory for search without unregistering it.
    pub async fn set_directory_enabled(&self, directory_id: i64, enabled: bool) -> Result<()> {
        self.catalog.set_directory_enabled(directory_id, enabled).await
    }

    /// Registers a new query, returning its id.
    pub fn create_query(&self, text: impl Into<String>) -> u64 {
        self.registry.create(text)
    }

    /// Runs a search for a previously created query.
    pub async fn search(&self, query_id: u64, directory_filter: &[i64]) -> Result<SearchOutcome> {
        self.pipeline.search(query_id, directory_filter).await
    }

    /// Applies result feedback to a query, updating embedder fusion
    /// weights. `eta` defaults to the engine's configured learning rate
    /// when not given.
    pub fn submit_feedback(
        &self,
        query_id: u64,
        feedback: &HashMap<String, bool>,
        eta: Option<f32>,
    ) -> Result<()> {
        let updater = FeedbackUpdater::new(&self.registry, &self.embedders);
        updater.apply(query_id, feedback, eta.unwrap_or(self.config.default_eta))
    }

    /// Directly enqueues a rescan of a registered directory's full image
    /// set, without waiting for a watcher event or the periodic
    /// reconciler.
    pub async fn rescan_directory(&self, directory_id: i64) -> Result<()> {
        let directories = self.catalog.list_directories().await?;
        let Some(directory) = directories.into_iter().find(|d| d.id == directory_id) else {
            return Err(EngineError::NotFound(format!(
                "no directory with id {directory_id}"
            )));
        };
        self.queue.enqueue(directory.id, directory.path, PRIORITY_SCAN);
        Ok(())
    }

    /// Starts background tasks: the periodic consistency reconciler. Watchers
    /// are started individually by [`Engine::register_directory`].
    pub fn start(self: &Arc<Self>) {
        reconciler::spawn_periodic(
            Arc::clone(&self.catalog),
            Arc::clone(&self.vectors),
            Arc::clone(&self.embedders),
            Arc::clone(&self.queue),
            self.config.consistency_check_interval,
            self.config.recursive_indexing,
            self.config.follow_symlinks,
            Arc::clone(&self.shutdown),
        );
    }

    /// Signals every background task to stop and drops active watchers.
    ///
    /// In-flight indexing work already pulled off the queue is allowed to
    /// finish; no new work is pulled after this call.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
        self.queue.shutdown();
        self.watchers.lock().clear();
    }

    /// Current fusion weights, for diagnostics or persistence by the
    /// embedding application.
    #[must_use]
    pub fn embedder_weights(&self) -> HashMap<String, f32> {
        self.embedders.weights()
    }
}
