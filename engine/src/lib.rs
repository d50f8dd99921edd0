//! Indexing, retrieval, and fusion engine for text-to-image search over
//! user-registered directories.
//!
//! ```text
//!                 ┌─────────────────────────────────────────────┐
//!                 │                  Engine (C13)                │
//!                 │                                               │
//!  directories ──►│  Scanner ─► Catalog ─► Queue ─► Indexer ─► ANN │
//!                 │  Watcher ───────────────┘          Vector      │
//!                 │  Reconciler (periodic three-way diff)          │
//!                 │                                               │
//!  query text ───►│  Generator ─► Retrieval Pipeline ─► Fusion     │
//!  feedback ─────►│  Query Registry ─► Feedback Updater            │
//!                 └─────────────────────────────────────────────┘
//! ```
//!
//! An embedding application supplies a [`catalog::CatalogStore`]
//! implementation (or uses [`catalog::SqliteCatalog`]), one or more
//! [`retrieval_core::Embedder`] implementations, and one
//! [`retrieval_core::ImageGenerator`] implementation, then drives
//! everything else through [`engine::Engine`].

pub mod catalog;
pub mod config;
pub mod embedders;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod generator_client;
pub mod indexer;
pub mod query_registry;
pub mod queue;
pub mod reconciler;
pub mod retrieval;
pub mod scanner;
pub mod types;
pub mod vector;
pub mod watcher;

pub use config::{EngineConfig, EngineConfigBuilder, IndexParams};
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, Result};
pub use query_registry::QueryRegistry;
pub use retrieval::SearchOutcome;
pub use types::{Directory, Image, Query, ScoredResult, SearchTimings, VectorEntry};
