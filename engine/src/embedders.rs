//! Embedder Set (C3): the fixed roster of embedders an engine searches
//! across, and the fusion weight attached to each.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use retrieval_core::{Embedder, Embedding};

use crate::error::{EngineError, Result};

/// Object-safe adapter over [`Embedder`], since its native `async fn`
/// methods return an opaque `impl Future` that cannot be part of a trait
/// object's vtable.
trait DynEmbedder: Send + Sync {
    fn name(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed<'a>(
        &'a self,
        image: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = retrieval_core::Result<Embedding>> + Send + 'a>>;
    fn embed_batch<'a>(
        &'a self,
        images: &'a [Vec<u8>],
    ) -> Pin<Box<dyn Future<Output = retrieval_core::Result<Vec<Embedding>>> + Send + 'a>>;
}

impl<E: Embedder> DynEmbedder for E {
    fn name(&self) -> &str {
        Embedder::name(self)
    }

    fn dim(&self) -> usize {
        Embedder::dim(self)
    }

    fn embed<'a>(
        &'a self,
        image: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = retrieval_core::Result<Embedding>> + Send + 'a>> {
        Box::pin(Embedder::embed(self, image))
    }

    fn embed_batch<'a>(
        &'a self,
        images: &'a [Vec<u8>],
    ) -> Pin<Box<dyn Future<Output = retrieval_core::Result<Vec<Embedding>>> + Send + 'a>> {
        Box::pin(Embedder::embed_batch(self, images))
    }
}

/// A named embedder and its current fusion weight.
pub struct WeightedEmbedder {
    inner: Arc<dyn DynEmbedder>,
}

impl WeightedEmbedder {
    /// Name of the wrapped embedder; stable across the engine's lifetime.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Embedding dimension of the wrapped embedder.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.inner.dim()
    }

    /// Embeds a single image.
    pub async fn embed(&self, image: &[u8]) -> retrieval_core::Result<Embedding> {
        self.inner.embed(image).await
    }

    /// Embeds a batch of images.
    pub async fn embed_batch(&self, images: &[Vec<u8>]) -> retrieval_core::Result<Vec<Embedding>> {
        self.inner.embed_batch(images).await
    }
}

/// Floor applied to any embedder's fusion weight so a single catastrophic
/// query cannot zero it out permanently.
pub const MIN_WEIGHT: f32 = 0.01;

/// The fixed roster of embedders an engine searches across, together with
/// the fusion weight assigned to each.
///
/// Weights always sum to 1.0 and are never allowed to fall to zero; both
/// properties are maintained by [`EmbedderSet::set_weight`] and
/// [`EmbedderSet::apply_multiplicative_update`].
pub struct EmbedderSet {
    embedders: HashMap<String, WeightedEmbedder>,
    weights: DashMap<String, f32>,
    weights_path: Option<PathBuf>,
}

impl std::fmt::Debug for EmbedderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedderSet")
            .field("names", &self.list())
            .finish()
    }
}

impl EmbedderSet {
    /// Builds a set from a list of embedders, assigning each an equal
    /// starting weight of `1 / n`.
    ///
    /// # Panics
    ///
    /// Panics if `embedders` is empty or contains two embedders with the
    /// same name; both are configuration errors caught at startup, not
    /// runtime conditions.
    #[must_use]
    pub fn new(embedders: Vec<DynEmbedderHandle>) -> Self {
        assert!(!embedders.is_empty(), "an engine needs at least one embedder");

        let n = embedders.len();
        let mut map = HashMap::with_capacity(n);
        let weights = DashMap::with_capacity(n);

        for handle in embedders {
            let name = handle.0.name().to_string();
            let previous = map.insert(
                name.clone(),
                WeightedEmbedder {
                    inner: Arc::clone(&handle.0),
                },
            );
            assert!(previous.is_none(), "duplicate embedder name: {name}");
            weights.insert(name, 1.0 / n as f32);
        }

        Self {
            embedders: map,
            weights,
            weights_path: None,
        }
    }

    /// Configures a path to persist weights to after every mutation
    /// (`set_weight`, `apply_multiplicative_update`). Loading a previously
    /// persisted snapshot is a separate, explicit step via
    /// [`EmbedderSet::load_weights`].
    #[must_use]
    pub fn with_weights_path(mut self, path: PathBuf) -> Self {
        self.weights_path = Some(path);
        self
    }

    /// Names of every embedder in the set, in arbitrary order.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.embedders.keys().cloned().collect()
    }

    /// Looks up an embedder by name.
    pub fn get(&self, name: &str) -> Result<&WeightedEmbedder> {
        self.embedders
            .get(name)
            .ok_or_else(|| EngineError::NotFound(format!("no embedder named '{name}'")))
    }

    /// Current fusion weight for the named embedder.
    pub fn weight(&self, name: &str) -> Result<f32> {
        self.weights
            .get(name)
            .map(|w| *w)
            .ok_or_else(|| EngineError::NotFound(format!("no embedder named '{name}'")))
    }

    /// A snapshot of every embedder's current weight.
    #[must_use]
    pub fn weights(&self) -> HashMap<String, f32> {
        self.weights.iter().map(|e| (e.key().clone(), *e.value())).collect()
    }

    /// Directly overrides a weight and renormalizes the rest proportionally
    /// so the set still sums to 1.0.
    pub fn set_weight(&self, name: &str, weight: f32) -> Result<()> {
        if !self.embedders.contains_key(name) {
            return Err(EngineError::NotFound(format!("no embedder named '{name}'")));
        }
        if !(0.0..=1.0).contains(&weight) {
            return Err(EngineError::Invalid("weight must be within [0.0, 1.0]".into()));
        }

        self.weights.insert(name.to_string(), weight.max(MIN_WEIGHT));
        self.renormalize();
        self.persist_if_configured();
        Ok(())
    }

    /// Applies the feedback updater's multiplicative rule to every
    /// embedder's loss, floors each result at [`MIN_WEIGHT`], and
    /// renormalizes so the set sums back to 1.0.
    pub fn apply_multiplicative_update(&self, eta: f32, losses: &HashMap<String, f32>) {
        for mut entry in self.weights.iter_mut() {
            if let Some(&loss) = losses.get(entry.key()) {
                let updated = *entry.value() * (1.0 - eta * loss);
                *entry.value_mut() = updated.max(MIN_WEIGHT);
            }
        }
        self.renormalize();
        self.persist_if_configured();
    }

    /// Writes the current weights to `path` as JSON.
    pub fn persist_weights(&self, path: &Path) -> Result<()> {
        let weights = self.weights();
        let json = serde_json::to_string_pretty(&weights)
            .map_err(|error| EngineError::Invalid(format!("failed to serialize weights: {error}")))?;
        std::fs::write(path, json).map_err(|source| EngineError::Filesystem {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Loads weights previously written by [`EmbedderSet::persist_weights`],
    /// applying the floor and renormalizing afterward. Entries for embedders
    /// not in this set are ignored; embedders with no entry in the file keep
    /// their current weight.
    pub fn load_weights(&self, path: &Path) -> Result<()> {
        let json = std::fs::read_to_string(path).map_err(|source| EngineError::Filesystem {
            path: path.to_path_buf(),
            source,
        })?;
        let loaded: HashMap<String, f32> = serde_json::from_str(&json)
            .map_err(|error| EngineError::Invalid(format!("failed to parse persisted weights: {error}")))?;

        for (name, weight) in loaded {
            if self.embedders.contains_key(&name) {
                self.weights.insert(name, weight.max(MIN_WEIGHT));
            }
        }
        self.renormalize();
        Ok(())
    }

    fn persist_if_configured(&self) {
        if let Some(path) = &self.weights_path {
            if let Err(error) = self.persist_weights(path) {
                tracing::warn!(%error, "failed to persist embedder weights");
            }
        }
    }

    fn renormalize(&self) {
        let total: f32 = self.weights.iter().map(|e| *e.value()).sum();
        if total <= 0.0 {
            return;
        }
        for mut entry in self.weights.iter_mut() {
            *entry.value_mut() /= total;
        }
    }
}

/// Type-erased handle to an [`Embedder`], used to assemble an
/// [`EmbedderSet`] from heterogeneous embedder implementations.
#[derive(Clone)]
pub struct DynEmbedderHandle(Arc<dyn DynEmbedder>);

impl DynEmbedderHandle {
    /// Wraps a concrete embedder for insertion into an [`EmbedderSet`].
    pub fn new<E: Embedder + 'static>(embedder: E) -> Self {
        Self(Arc::new(embedder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstantEmbedder {
        name: &'static str,
        dim: usize,
    }

    impl Embedder for ConstantEmbedder {
        fn name(&self) -> &str {
            self.name
        }

        fn dim(&self) -> usize {
            self.dim
        }

        async fn embed(&self, _image: &[u8]) -> retrieval_core::Result<Embedding> {
            Ok(vec![0.5; self.dim])
        }
    }

    fn sample_set() -> EmbedderSet {
        EmbedderSet::new(vec![
            DynEmbedderHandle::new(ConstantEmbedder { name: "clip", dim: 4 }),
            DynEmbedderHandle::new(ConstantEmbedder { name: "dino", dim: 4 }),
        ])
    }

    #[test]
    fn equal_weights_on_construction() {
        let set = sample_set();
        assert!((set.weight("clip").unwrap() - 0.5).abs() < 1e-6);
        assert!((set.weight("dino").unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn set_weight_renormalizes() {
        let set = sample_set();
        set.set_weight("clip", 0.9).unwrap();
        let weights = set.weights();
        let total: f32 = weights.values().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn multiplicative_update_penalizes_high_loss_and_keeps_floor() {
        let set = sample_set();
        let mut losses = HashMap::new();
        losses.insert("clip".to_string(), 1.0);
        losses.insert("dino".to_string(), 0.0);

        for _ in 0..50 {
            set.apply_multiplicative_update(0.5, &losses);
        }

        assert!(set.weight("clip").unwrap() >= MIN_WEIGHT);
        assert!(set.weight("dino").unwrap() > set.weight("clip").unwrap());
        let total: f32 = set.weights().values().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn unknown_embedder_is_not_found() {
        let set = sample_set();
        assert!(matches!(set.get("missing"), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn persist_and_load_weights_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");

        let set = sample_set();
        set.set_weight("clip", 0.9).unwrap();
        set.persist_weights(&path).unwrap();

        let reloaded = sample_set();
        reloaded.load_weights(&path).unwrap();
        assert!((reloaded.weight("clip").unwrap() - set.weight("clip").unwrap()).abs() < 1e-6);
        assert!((reloaded.weight("dino").unwrap() - set.weight("dino").unwrap()).abs() < 1e-6);
    }

    #[test]
    fn mutations_persist_automatically_when_a_path_is_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");

        let set = EmbedderSet::new(vec![
            DynEmbedderHandle::new(ConstantEmbedder { name: "clip", dim: 4 }),
            DynEmbedderHandle::new(ConstantEmbedder { name: "dino", dim: 4 }),
        ])
        .with_weights_path(path.clone());

        set.set_weight("clip", 0.8).unwrap();
        assert!(path.exists());

        let reloaded = sample_set();
        reloaded.load_weights(&path).unwrap();
        assert!((reloaded.weight("clip").unwrap() - 0.8).abs() < 0.01);
    }

    #[tokio::test]
    async fn embed_through_dyn_handle() {
        let set = sample_set();
        let vector = set.get("clip").unwrap().embed(b"bytes").await.unwrap();
        assert_eq!(vector.len(), 4);
    }
}
