//! Image Generator Client (C12): wraps an [`ImageGenerator`] and applies
//! the engine-selection policy (ordered attempts, partial success, and
//! optional fallback) to a configured roster of engines.

use retrieval_core::{EngineConfig as GeneratorEngineConfig, GenerationDescriptor, GeneratedImage, ImageGenerator};

use crate::error::{EngineError, Result};

/// Generates guide images for a query by delegating to an
/// [`ImageGenerator`], using the roster and policy carried on
/// [`GenerationDescriptor`].
///
/// Engines are attempted in the order given. Once `num_engines_to_use`
/// engines have produced an image, the rest are skipped. Whether a failing
/// engine aborts the whole call or is merely skipped is controlled by
/// `use_fallback`; partial success short of `num_engines_to_use` is not an
/// error, only a shorter result.
pub struct GeneratorClient<G: ImageGenerator> {
    generator: G,
}

impl<G: ImageGenerator> GeneratorClient<G> {
    /// Wraps a generator implementation.
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// Generates guide images for `prompt` against `descriptor`.
    ///
    /// Engines are attempted one at a time, in the order listed on
    /// `descriptor`. Each attempt wraps a single engine in its own
    /// one-engine descriptor so the underlying [`ImageGenerator`] never sees
    /// the rest of the roster; this client owns the ordering, the
    /// stop-once-enough-succeeded cutoff, and the fallback policy itself.
    /// When `use_fallback` is `false`, the first engine error aborts the
    /// call immediately, even if earlier engines already produced images.
    pub async fn generate(&self, prompt: &str, descriptor: &GenerationDescriptor) -> Result<Vec<GeneratedImage>> {
        if descriptor.engines.is_empty() {
            return Err(EngineError::Invalid("generation descriptor names no engines".into()));
        }

        let mut images = Vec::new();
        for engine in &descriptor.engines {
            if images.len() >= descriptor.num_engines_to_use {
                break;
            }

            let single_engine = GenerationDescriptor {
                engines: vec![engine.clone()],
                num_engines_to_use: 1,
                use_fallback: descriptor.use_fallback,
            };

            match self.generator.generate(prompt, &single_engine).await {
                Ok(mut produced) => images.append(&mut produced),
                Err(error) if descriptor.use_fallback => {
                    tracing::warn!(engine = %engine.name, %error, "generation engine failed, trying next");
                }
                Err(error) => return Err(error.into()),
            }
        }

        if images.is_empty() && !descriptor.use_fallback {
            return Err(EngineError::Invalid(
                "every configured generation engine failed".into(),
            ));
        }
        Ok(images)
    }

    /// Builds a descriptor that tries every named engine in order, stopping
    /// once `num_engines_to_use` have succeeded.
    #[must_use]
    pub fn descriptor_for(
        engine_names: &[String],
        num_engines_to_use: usize,
        use_fallback: bool,
    ) -> GenerationDescriptor {
        GenerationDescriptor {
            engines: engine_names.iter().map(|name| GeneratorEngineConfig::new(name)).collect(),
            num_engines_to_use: num_engines_to_use.min(engine_names.len().max(1)),
            use_fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyGenerator;

    impl ImageGenerator for FlakyGenerator {
        async fn generate(
            &self,
            prompt: &str,
            descriptor: &GenerationDescriptor,
        ) -> retrieval_core::Result<Vec<GeneratedImage>> {
            Ok(descriptor
                .engines
                .iter()
                .filter(|engine| engine.name != "broken")
                .take(descriptor.num_engines_to_use)
                .map(|engine| GeneratedImage {
                    bytes: prompt.as_bytes().to_vec(),
                    engine_name: engine.name.clone(),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn partial_success_is_not_an_error() {
        let client = GeneratorClient::new(FlakyGenerator);
        let descriptor = GeneratorClient::<FlakyGenerator>::descriptor_for(
            &["broken".into(), "good".into()],
            2,
            true,
        );
        let images = client.generate("a cat", &descriptor).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].engine_name, "good");
    }

    #[tokio::test]
    async fn total_failure_without_fallback_is_an_error() {
        let client = GeneratorClient::new(FlakyGenerator);
        let descriptor = GeneratorClient::<FlakyGenerator>::descriptor_for(&["broken".into()], 1, false);
        let result = client.generate("a cat", &descriptor).await;
        assert!(matches!(result, Err(EngineError::Invalid(_))));
    }

    struct ErroringGenerator;

    impl ImageGenerator for ErroringGenerator {
        async fn generate(
            &self,
            prompt: &str,
            descriptor: &GenerationDescriptor,
        ) -> retrieval_core::Result<Vec<GeneratedImage>> {
            let engine = &descriptor.engines[0];
            if engine.name == "erroring" {
                return Err(retrieval_core::CoreError::Backend(anyhow::anyhow!("engine down")));
            }
            Ok(vec![GeneratedImage {
                bytes: prompt.as_bytes().to_vec(),
                engine_name: engine.name.clone(),
            }])
        }
    }

    #[tokio::test]
    async fn first_failure_aborts_immediately_without_fallback() {
        let client = GeneratorClient::new(ErroringGenerator);
        let descriptor = GeneratorClient::<ErroringGenerator>::descriptor_for(
            &["good".into(), "erroring".into(), "also-good".into()],
            3,
            false,
        );
        let result = client.generate("a cat", &descriptor).await;
        assert!(matches!(result, Err(EngineError::Core(_))));
    }

    #[tokio::test]
    async fn failure_with_fallback_is_skipped_not_fatal() {
        let client = GeneratorClient::new(ErroringGenerator);
        let descriptor = GeneratorClient::<ErroringGenerator>::descriptor_for(
            &["erroring".into(), "good".into()],
            2,
            true,
        );
        let images = client.generate("a cat", &descriptor).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].engine_name, "good");
    }

    #[tokio::test]
    async fn empty_descriptor_is_invalid() {
        let client = GeneratorClient::new(FlakyGenerator);
        let descriptor = GenerationDescriptor {
            engines: vec![],
            num_engines_to_use: 0,
            use_fallback: true,
        };
        let result = client.generate("a cat", &descriptor).await;
        assert!(matches!(result, Err(EngineError::Invalid(_))));
    }
}
