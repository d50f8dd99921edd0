//! Feedback Updater (C11): converts per-result approve/reject feedback on a
//! query into a multiplicative fusion weight update.

use std::collections::HashMap;

use crate::embedders::EmbedderSet;
use crate::error::{EngineError, Result};
use crate::query_registry::QueryRegistry;

/// Applies user feedback on a query's results to the embedder set's fusion
/// weights.
pub struct FeedbackUpdater<'a> {
    registry: &'a QueryRegistry,
    embedders: &'a EmbedderSet,
}

impl<'a> FeedbackUpdater<'a> {
    /// Binds an updater to a registry and embedder set.
    #[must_use]
    pub fn new(registry: &'a QueryRegistry, embedders: &'a EmbedderSet) -> Self {
        Self { registry, embedders }
    }

    /// Applies `feedback` (image path to approve/reject) to `query_id`'s
    /// recorded per-embedder top lists, using learning rate `eta`.
    ///
    /// For each embedder, loss is the rank-weighted sum of `1 / (j + 1)`
    /// over zero-indexed positions `j` of rejected images in that
    /// embedder's top list; images absent from an embedder's top list do
    /// not affect it. Images not mentioned in `feedback` are neither
    /// rewarded nor penalized.
    pub fn apply(&self, query_id: u64, feedback: &HashMap<String, bool>, eta: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&eta) {
            return Err(EngineError::Invalid("eta must be within [0.0, 1.0]".into()));
        }

        let query = self.registry.get(query_id)?;
        let mut losses = HashMap::with_capacity(query.embedder_results.len());

        for (embedder_name, top_list) in &query.embedder_results {
            let loss: f32 = top_list
                .iter()
                .enumerate()
                .filter_map(|(j, path)| {
                    let approved = *feedback.get(path)?;
                    (!approved).then_some(1.0 / (j as f32 + 1.0))
                })
                .sum();
            losses.insert(embedder_name.clone(), loss);
        }

        self.embedders.apply_multiplicative_update(eta, &losses);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedders::{DynEmbedderHandle, EmbedderSet};
    use retrieval_core::{Embedder, Embedding};

    struct StubEmbedder(&'static str);
    impl Embedder for StubEmbedder {
        fn name(&self) -> &str {
            self.0
        }
        fn dim(&self) -> usize {
            1
        }
        async fn embed(&self, _image: &[u8]) -> retrieval_core::Result<Embedding> {
            Ok(vec![0.0])
        }
    }

    #[test]
    fn matches_the_worked_example() {
        let embedders = EmbedderSet::new(vec![
            DynEmbedderHandle::new(StubEmbedder("e1")),
            DynEmbedderHandle::new(StubEmbedder("e2")),
        ]);
        embedders.set_weight("e1", 0.75).unwrap();

        let registry = QueryRegistry::new();
        let query_id = registry.create("query");
        let mut results = std::collections::BTreeMap::new();
        results.insert("e1".to_string(), vec!["A".to_string(), "B".to_string(), "C".to_string()]);
        registry.set_embedder_results(query_id, results).unwrap();

        let mut feedback = HashMap::new();
        feedback.insert("A".to_string(), true);
        feedback.insert("B".to_string(), false);
        feedback.insert("C".to_string(), false);

        let updater = FeedbackUpdater::new(&registry, &embedders);
        updater.apply(query_id, &feedback, 0.05).unwrap();

        // loss(e1) = 1/2 + 1/3 = 0.8333; raw = 0.75 * (1 - 0.05 * 0.8333) ≈ 0.71875
        // renormalized against the unchanged e2 = 0.25.
        let e1 = embedders.weight("e1").unwrap();
        let e2 = embedders.weight("e2").unwrap();
        assert!((e1 - 0.742).abs() < 0.01, "e1 = {e1}");
        assert!((e2 - 0.258).abs() < 0.01, "e2 = {e2}");
    }

    #[test]
    fn weights_stay_positive_and_sum_to_one() {
        let embedders = EmbedderSet::new(vec![
            DynEmbedderHandle::new(StubEmbedder("e1")),
            DynEmbedderHandle::new(StubEmbedder("e2")),
        ]);
        let registry = QueryRegistry::new();
        let query_id = registry.create("query");
        let mut results = std::collections::BTreeMap::new();
        results.insert("e1".to_string(), vec!["A".to_string()]);
        registry.set_embedder_results(query_id, results).unwrap();

        let mut feedback = HashMap::new();
        feedback.insert("A".to_string(), false);

        let updater = FeedbackUpdater::new(&registry, &embedders);
        for _ in 0..100 {
            updater.apply(query_id, &feedback, 0.5).unwrap();
        }

        let total: f32 = embedders.weights().values().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(embedders.weight("e1").unwrap() > 0.0);
    }

    #[test]
    fn feedback_on_image_absent_from_top_list_does_not_affect_that_embedder() {
        let embedders = EmbedderSet::new(vec![DynEmbedderHandle::new(StubEmbedder("e1"))]);
        let registry = QueryRegistry::new();
        let query_id = registry.create("query");
        let mut results = std::collections::BTreeMap::new();
        results.insert("e1".to_string(), vec!["A".to_string()]);
        registry.set_embedder_results(query_id, results).unwrap();

        let mut feedback = HashMap::new();
        feedback.insert("Z".to_string(), false);

        let before = embedders.weight("e1").unwrap();
        let updater = FeedbackUpdater::new(&registry, &embedders);
        updater.apply(query_id, &feedback, 0.5).unwrap();
        let after = embedders.weight("e1").unwrap();
        assert!((before - after).abs() < 1e-6);
    }
}
