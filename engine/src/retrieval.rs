//! Retrieval Pipeline (C10): generation → embedding → ANN search → fusion.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use retrieval_core::ImageGenerator;

use crate::catalog::CatalogStore;
use crate::embedders::EmbedderSet;
use crate::error::{EngineError, Result};
use crate::generator_client::GeneratorClient;
use crate::query_registry::QueryRegistry;
use crate::types::{ScoredResult, SearchTimings};
use crate::vector::VectorStoreSet;

/// Orchestrates a single search: generating guide images (once per query),
/// searching every embedder's collection for every guide image, and fusing
/// the results first per embedder, then across embedders.
pub struct RetrievalPipeline<C: CatalogStore, G: ImageGenerator> {
    catalog: Arc<C>,
    vectors: Arc<VectorStoreSet>,
    embedders: Arc<EmbedderSet>,
    generator: GeneratorClient<G>,
    registry: Arc<QueryRegistry>,
    num_images_to_retrieve: usize,
    num_images_to_generate: usize,
    num_engines_to_use: usize,
    use_fallback: bool,
    engine_names: Vec<String>,
}

/// A completed search, with the fused ranking and per-phase timings.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Final fused ranking, best first.
    pub results: Vec<ScoredResult>,
    /// Per-phase timings, useful for diagnosing slow queries.
    pub timings: SearchTimings,
}

impl<C: CatalogStore, G: ImageGenerator> RetrievalPipeline<C, G> {
    /// Assembles a pipeline over the given collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<C>,
        vectors: Arc<VectorStoreSet>,
        embedders: Arc<EmbedderSet>,
        generator: GeneratorClient<G>,
        registry: Arc<QueryRegistry>,
        num_images_to_retrieve: usize,
        num_images_to_generate: usize,
        num_engines_to_use: usize,
        use_fallback: bool,
        engine_names: Vec<String>,
    ) -> Self {
        Self {
            catalog,
            vectors,
            embedders,
            generator,
            registry,
            num_images_to_retrieve,
            num_images_to_generate,
            num_engines_to_use,
            use_fallback,
            engine_names,
        }
    }

    /// Runs (or re-runs) a search for `query_id`, restricted to enabled
    /// directories. `directory_filter`, when non-empty, further narrows the
    /// search to that subset.
    ///
    /// Guide images are generated at most once per query: if a prior call
    /// already attached them, this call reuses the cached set, making
    /// repeated searches of the same query idempotent.
    pub async fn search(&self, query_id: u64, directory_filter: &[i64]) -> Result<SearchOutcome> {
        let query = self.registry.get(query_id)?;
        let mut timings = SearchTimings::default();

        let guide_images = if let Some(cached) = query.guide_images {
            cached
        } else {
            let started = Instant::now();
            let descriptor = GeneratorClient::<G>::descriptor_for(
                &self.engine_names,
                self.num_engines_to_use.min(self.num_images_to_generate),
                self.use_fallback,
            );
            let generated = self.generator.generate(&query.text, &descriptor).await?;
            timings.generation = Some(started.elapsed());
            self.registry.attach_guide_images_if_absent(query_id, generated.clone())?;
            generated
        };

        if guide_images.is_empty() {
            return Err(EngineError::Invalid(
                "no guide images available for this query".into(),
            ));
        }

        let allowed_directories = self.resolve_allowed_directories(directory_filter).await?;
        if allowed_directories.is_empty() {
            // No enabled directory survives the filter; an empty slice to
            // the vector store would mean "unrestricted", so short-circuit
            // instead of searching without a filter.
            self.registry.set_embedder_results(query_id, BTreeMap::new())?;
            self.registry.set_final_results(query_id, Vec::new())?;
            return Ok(SearchOutcome {
                results: Vec::new(),
                timings,
            });
        }

        let mut embedder_names: Vec<String> = self.embedders.list();
        embedder_names.sort();

        let mut per_embedder_top: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let weights = self.embedders.weights();
        let mut fused: BTreeMap<String, f64> = BTreeMap::new();
        let mut first_seen_order: Vec<String> = Vec::new();

        for embedder_name in &embedder_names {
            let embedder = self.embedders.get(embedder_name)?;
            let started = Instant::now();

            let mut per_embedder_scores: BTreeMap<String, f64> = BTreeMap::new();
            let weight = weights.get(embedder_name).copied().unwrap_or(0.0) as f64;

            for guide_image in &guide_images {
                let query_vector = embedder.embed(&guide_image.bytes).await?;
                let ranked = self
                    .vectors
                    .search(
                        embedder_name,
                        &query_vector,
                        self.num_images_to_retrieve,
                        &allowed_directories,
                    )
                    .await?;

                for (rank_idx, (image_path, _score)) in ranked.iter().enumerate() {
                    let rank = (rank_idx + 1) as f64;
                    *per_embedder_scores.entry(image_path.clone()).or_insert(0.0) += 1.0 / rank;

                    let fused_entry = fused.entry(image_path.clone()).or_insert_with(|| {
                        first_seen_order.push(image_path.clone());
                        0.0
                    });
                    *fused_entry += weight / rank;
                }
            }

            timings
                .per_embedder_search
                .insert(embedder_name.clone(), started.elapsed());

            let mut ranked_by_embedder: Vec<(String, f64)> = per_embedder_scores.into_iter().collect();
            ranked_by_embedder.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            ranked_by_embedder.truncate(self.num_images_to_retrieve);
            per_embedder_top.insert(
                embedder_name.clone(),
                ranked_by_embedder.into_iter().map(|(path, _)| path).collect(),
            );
        }

        self.registry.set_embedder_results(query_id, per_embedder_top)?;

        let fusion_started = Instant::now();
        let mut final_ranking: Vec<ScoredResult> = first_seen_order
            .into_iter()
            .map(|path| {
                let score = fused.get(&path).copied().unwrap_or(0.0);
                ScoredResult { image_path: path, score }
            })
            .collect();
        final_ranking.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        final_ranking.truncate(self.num_images_to_retrieve);
        timings.fusion = fusion_started.elapsed();

        self.registry.set_final_results(
            query_id,
            final_ranking.iter().map(|r| r.image_path.clone()).collect(),
        )?;

        Ok(SearchOutcome {
            results: final_ranking,
            timings,
        })
    }

    async fn resolve_allowed_directories(&self, directory_filter: &[i64]) -> Result<Vec<i64>> {
        let enabled: Vec<i64> = self
            .catalog
            .list_directories()
            .await?
            .into_iter()
            .filter(|directory| directory.is_enabled && directory.is_indexed)
            .map(|directory| directory.id)
            .collect();

        if directory_filter.is_empty() {
            Ok(enabled)
        } else {
            Ok(enabled
                .into_iter()
                .filter(|id| directory_filter.contains(id))
                .collect())
        }
    }
}
