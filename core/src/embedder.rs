//! Image embedding abstraction.
//!
//! An [`Embedder`] is a deterministic function from raw image bytes to a
//! fixed-dimension vector. The retrieval engine treats embedders as opaque:
//! it never inspects the model behind one, only its declared dimension and
//! its `embed` operation.
//!
//! Implementations typically wrap a local ONNX/CLIP-style model or a remote
//! inference endpoint. The trait makes no assumption about which.

use std::future::Future;

/// A dense embedding vector produced by an [`Embedder`].
pub type Embedding = Vec<f32>;

/// Converts an image into a fixed-dimension embedding vector.
///
/// # Implementation requirements
///
/// - [`embed`](Embedder::embed) must return a vector of length exactly
///   [`dim`](Embedder::dim).
/// - `embed` must be deterministic for identical input bytes, since the
///   retrieval pipeline assumes repeated queries over the same guide image
///   return the same vector (see [`crate::Result`] determinism notes).
/// - Errors are opaque to the caller; the engine logs and, depending on the
///   call site, isolates or surfaces them (per-image failures during
///   indexing are isolated, query-time failures are surfaced).
///
/// # Example
///
/// ```rust
/// use retrieval_core::embedder::Embedder;
///
/// struct ZeroEmbedder(usize);
///
/// impl Embedder for ZeroEmbedder {
///     fn name(&self) -> &str {
///         "zero"
///     }
///
///     fn dim(&self) -> usize {
///         self.0
///     }
///
///     async fn embed(&self, _image: &[u8]) -> retrieval_core::Result<Vec<f32>> {
///         Ok(vec![0.0; self.0])
///     }
/// }
/// ```
pub trait Embedder: Send + Sync {
    /// Stable name for this embedder; used as the vector collection name.
    fn name(&self) -> &str;

    /// Returns the embedding vector dimension.
    fn dim(&self) -> usize;

    /// Converts raw image bytes into an embedding vector.
    fn embed(&self, image: &[u8]) -> impl Future<Output = crate::Result<Embedding>> + Send;

    /// Embeds a batch of images, one forward pass per call where the
    /// implementation supports it.
    ///
    /// The default implementation embeds sequentially; batching embedders
    /// should override this to amortize the forward pass, which is the
    /// entire reason the directory indexer groups images into batches.
    fn embed_batch(
        &self,
        images: &[Vec<u8>],
    ) -> impl Future<Output = crate::Result<Vec<Embedding>>> + Send {
        async move {
            let mut out = Vec::with_capacity(images.len());
            for image in images {
                out.push(self.embed(image).await?);
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstantEmbedder {
        dim: usize,
        value: f32,
    }

    impl Embedder for ConstantEmbedder {
        fn name(&self) -> &str {
            "constant"
        }

        fn dim(&self) -> usize {
            self.dim
        }

        async fn embed(&self, _image: &[u8]) -> crate::Result<Embedding> {
            Ok(vec![self.value; self.dim])
        }
    }

    #[tokio::test]
    async fn embed_respects_dimension() {
        let embedder = ConstantEmbedder { dim: 8, value: 1.0 };
        let vector = embedder.embed(b"image-bytes").await.unwrap();
        assert_eq!(vector.len(), 8);
    }

    #[tokio::test]
    async fn default_batch_embeds_sequentially() {
        let embedder = ConstantEmbedder { dim: 4, value: 2.0 };
        let images = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
        let vectors = embedder.embed_batch(&images).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 4));
    }
}
