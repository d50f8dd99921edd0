//! Guide-image generation abstraction.
//!
//! An [`ImageGenerator`] is the opaque boundary to the external generative
//! backend: given a text prompt and a descriptor of which engines to use,
//! it returns raw image bytes tagged with the engine that produced them.
//! The retrieval engine does not know or care whether an implementation
//! calls a local diffusion model or a remote API.

use std::future::Future;

/// One configured generation engine and its per-engine parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Name of the engine, matched against [`ImageGenerator`] implementations.
    pub name: String,
    /// Opaque per-engine parameters (e.g. image size, steps), serialized
    /// however the concrete generator expects.
    pub params: serde_json::Value,
}

impl EngineConfig {
    /// Creates a new engine config with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: serde_json::Value::Null,
        }
    }

    /// Creates a new engine config carrying parameters.
    #[must_use]
    pub fn with_params(name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// Describes which engines to invoke and how many successes to require.
#[derive(Debug, Clone)]
pub struct GenerationDescriptor {
    /// Engines to attempt, in the order they should be tried.
    pub engines: Vec<EngineConfig>,
    /// Stop once this many engines have succeeded. Defaults to all engines.
    pub num_engines_to_use: usize,
    /// When `true`, a failing engine is skipped in favor of the next one;
    /// when `false`, the first engine failure aborts the whole call.
    pub use_fallback: bool,
}

impl GenerationDescriptor {
    /// Creates a descriptor that attempts every engine in `engines`, in
    /// order, skipping failures (`use_fallback = true`).
    #[must_use]
    pub fn all(engines: Vec<EngineConfig>) -> Self {
        let num_engines_to_use = engines.len();
        Self {
            engines,
            num_engines_to_use,
            use_fallback: true,
        }
    }
}

/// A guide image produced by a generation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Raw image bytes.
    pub bytes: Vec<u8>,
    /// Name of the engine that produced this image.
    pub engine_name: String,
}

/// Converts a text prompt into one or more guide images.
///
/// # Failure semantics
///
/// A per-engine failure is not necessarily fatal: whether it is skipped or
/// propagated is controlled by [`GenerationDescriptor::use_fallback`].
/// Partial success — fewer images than `num_engines_to_use` requested — is
/// a valid, non-error outcome; callers observe it as a shorter result list.
pub trait ImageGenerator: Send + Sync {
    /// Generates guide images for `prompt` according to `descriptor`.
    fn generate(
        &self,
        prompt: &str,
        descriptor: &GenerationDescriptor,
    ) -> impl Future<Output = crate::Result<Vec<GeneratedImage>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoGenerator;

    impl ImageGenerator for EchoGenerator {
        async fn generate(
            &self,
            prompt: &str,
            descriptor: &GenerationDescriptor,
        ) -> crate::Result<Vec<GeneratedImage>> {
            Ok(descriptor
                .engines
                .iter()
                .take(descriptor.num_engines_to_use)
                .map(|engine| GeneratedImage {
                    bytes: prompt.as_bytes().to_vec(),
                    engine_name: engine.name.clone(),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn generates_one_image_per_requested_engine() {
        let descriptor = GenerationDescriptor::all(vec![
            EngineConfig::new("alpha"),
            EngineConfig::new("beta"),
        ]);
        let images = EchoGenerator.generate("a cat", &descriptor).await.unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].engine_name, "alpha");
        assert_eq!(images[1].engine_name, "beta");
    }
}
