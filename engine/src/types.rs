//! Core data types shared across the engine's components.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use retrieval_core::GeneratedImage;

/// A registered, watched folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    /// Stable numeric id assigned by the catalog store.
    pub id: i64,
    /// Absolute path to the folder; unique across the catalog.
    pub path: PathBuf,
    /// `true` only when every listed image under this directory is indexed.
    pub is_indexed: bool,
    /// `false` excludes this directory from search even if fully indexed.
    pub is_enabled: bool,
}

/// A single image file discovered under some [`Directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Stable numeric id assigned by the catalog store.
    pub id: i64,
    /// Absolute path to the file; unique across the catalog.
    pub path: PathBuf,
    /// Id of the owning directory.
    pub directory_id: i64,
    /// `true` once an embedding exists for every configured embedder.
    pub is_indexed: bool,
}

/// A single entry in a per-embedder vector collection.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Id of the directory the image belongs to, used for search filtering.
    pub directory_id: i64,
    /// Primary key within the collection; shared across embedders for the
    /// same image.
    pub image_path: String,
    /// The embedding produced for this image by the owning collection's
    /// embedder.
    pub embedding: Vec<f32>,
}

/// A guide image cached on a [`Query`], generated from the query text.
pub type GuideImage = GeneratedImage;

/// One result row with its fused or per-embedder score.
#[derive(Debug, Clone)]
pub struct ScoredResult {
    /// Path of the matching image.
    pub image_path: String,
    /// Reciprocal-rank fusion score; higher is better.
    pub score: f64,
}

/// Per-phase timing captured during a single retrieval, returned when the
/// caller asks for verbose output.
#[derive(Debug, Clone, Default)]
pub struct SearchTimings {
    /// Time spent generating guide images (zero if guide images were cached).
    pub generation: Option<Duration>,
    /// Time spent per embedder performing ANN search across guide images.
    pub per_embedder_search: BTreeMap<String, Duration>,
    /// Time spent fusing per-embedder rankings into the final result.
    pub fusion: Duration,
}

/// A transient query: original text, lazily attached guide images, and the
/// per-embedder and fused rankings produced by the retrieval pipeline.
#[derive(Debug, Clone)]
pub struct Query {
    /// Monotonically assigned id.
    pub id: u64,
    /// Original natural-language query text.
    pub text: String,
    /// Guide images attached at most once, by the first retrieval call.
    pub guide_images: Option<Vec<GuideImage>>,
    /// Per-embedder reported top list (`T_e` in the design), keyed by
    /// embedder name. Used by the feedback updater.
    pub embedder_results: BTreeMap<String, Vec<String>>,
    /// Final fused ranking, set once a retrieval has run.
    pub final_results: Option<Vec<String>>,
}

impl Query {
    /// Creates a new query with no guide images or results attached.
    #[must_use]
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            guide_images: None,
            embedder_results: BTreeMap::new(),
            final_results: None,
        }
    }
}
