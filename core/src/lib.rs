//! # retrieval-core
//!
//! Trait abstractions that sit at the boundary between the retrieval engine
//! and its two external collaborators: the embedding models and the
//! generative image backend.
//!
//! ```text
//! ┌──────────────────┐    ┌────────────────────┐    ┌───────────────────┐
//! │  Retrieval Engine│───▶│  retrieval-core    │◀───│  Your Providers    │
//! │                  │    │   (this crate)     │    │                    │
//! │ - Indexer        │    │                    │    │ - CLIP embedder    │
//! │ - Query pipeline │    │ - Embedder         │    │ - ONNX embedder    │
//! │ - Fusion         │    │ - ImageGenerator   │    │ - Diffusion engine │
//! └──────────────────┘    └────────────────────┘    └────────────────────┘
//! ```
//!
//! Neither trait is concerned with *how* a vector or an image is produced —
//! only with the shape of the contract. Concrete models plug in by
//! implementing [`Embedder`] or [`ImageGenerator`].
//!
//! ## Modules
//!
//! - [`embedder`] — turns image bytes into a fixed-dimension vector.
//! - [`generator`] — turns a text prompt into one or more guide images.
//! - [`error`] — shared error type for both traits.

pub mod embedder;
pub mod error;
pub mod generator;

#[doc(inline)]
pub use embedder::{Embedder, Embedding};
#[doc(inline)]
pub use error::{CoreError, Result};
#[doc(inline)]
pub use generator::{EngineConfig, GenerationDescriptor, GeneratedImage, ImageGenerator};
