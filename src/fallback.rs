//! Ordered provider fallback. One logical operation is attempted against each
//! configured provider in priority order; the first success wins. Attempts are
//! never raced: one in-flight request at a time keeps retry and cost
//! predictable.

use std::sync::Arc;

use thiserror::Error;

use crate::model::{BookOutline, ChapterOutline, CoverImage, GenerationOptions, SizeTier};
use crate::provider::{Provider, ProviderError};

/// One recorded failure: which provider, and why.
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub provider: String,
    pub message: String,
}

fn summarize(attempts: &[ProviderFailure]) -> String {
    if attempts.is_empty() {
        return "no providers were available".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.provider, a.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Raised when every provider in the chain has failed (or none was available).
#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("All providers failed: {}", summarize(.attempts))]
    AllProvidersFailed { attempts: Vec<ProviderFailure> },
}

impl FallbackError {
    pub fn attempts(&self) -> &[ProviderFailure] {
        match self {
            FallbackError::AllProvidersFailed { attempts } => attempts,
        }
    }
}

/// Ordered list of providers for one class of operation. Callers construct one
/// chain for text work and one for image work (not every backend does images).
pub struct FallbackChain {
    providers: Vec<Arc<dyn Provider>>,
}

impl FallbackChain {
    /// Build from an already-ordered provider list. Providers without
    /// credentials should be filtered out beforehand so that an empty chain
    /// fails with zero attempts recorded.
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self { providers }
    }

    /// Keep only providers that have a credential configured.
    pub fn with_credentials(providers: Vec<Arc<dyn Provider>>) -> Self {
        let providers = providers
            .into_iter()
            .filter(|p| {
                if !p.has_credential() {
                    tracing::debug!(provider = p.name(), "skipped: no credential configured");
                }
                p.has_credential()
            })
            .collect();
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    fn record(attempts: &mut Vec<ProviderFailure>, name: &str, error: &ProviderError) {
        tracing::warn!(provider = name, error = %error, "provider attempt failed");
        attempts.push(ProviderFailure {
            provider: name.to_string(),
            message: error.to_string(),
        });
    }

    pub async fn outline(
        &self,
        options: &GenerationOptions,
    ) -> Result<BookOutline, FallbackError> {
        let mut attempts = Vec::new();
        for provider in &self.providers {
            match provider.generate_outline(options).await {
                Ok(outline) => return Ok(outline),
                Err(e) => Self::record(&mut attempts, provider.name(), &e),
            }
        }
        Err(FallbackError::AllProvidersFailed { attempts })
    }

    pub async fn chapter(
        &self,
        options: &GenerationOptions,
        outline: &BookOutline,
        chapter: &ChapterOutline,
        index: usize,
        total: usize,
    ) -> Result<String, FallbackError> {
        let mut attempts = Vec::new();
        for provider in &self.providers {
            match provider
                .generate_chapter(options, outline, chapter, index, total)
                .await
            {
                Ok(body) => return Ok(body),
                Err(e) => Self::record(&mut attempts, provider.name(), &e),
            }
        }
        Err(FallbackError::AllProvidersFailed { attempts })
    }

    pub async fn cover_image(
        &self,
        prompt: &str,
        size: SizeTier,
    ) -> Result<CoverImage, FallbackError> {
        let mut attempts = Vec::new();
        for provider in &self.providers {
            match provider.generate_cover_image(prompt, size).await {
                Ok(image) => return Ok(image),
                Err(e) => Self::record(&mut attempts, provider.name(), &e),
            }
        }
        Err(FallbackError::AllProvidersFailed { attempts })
    }

    pub async fn edit_cover_image(
        &self,
        image: &CoverImage,
        prompt: &str,
    ) -> Result<CoverImage, FallbackError> {
        let mut attempts = Vec::new();
        for provider in &self.providers {
            match provider.edit_cover_image(image, prompt).await {
                Ok(edited) => return Ok(edited),
                Err(e) => Self::record(&mut attempts, provider.name(), &e),
            }
        }
        Err(FallbackError::AllProvidersFailed { attempts })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted provider for chain and sequencer tests: fails `failures`
    /// times, then succeeds; counts every invocation.
    pub(crate) struct ScriptedProvider {
        pub name: &'static str,
        pub failures: u32,
        pub calls: AtomicU32,
    }

    impl ScriptedProvider {
        pub fn ok(name: &'static str) -> Self {
            Self {
                name,
                failures: 0,
                calls: AtomicU32::new(0),
            }
        }

        pub fn failing(name: &'static str) -> Self {
            Self {
                name,
                failures: u32::MAX,
                calls: AtomicU32::new(0),
            }
        }

        pub fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn step(&self) -> Result<(), ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(ProviderError::Http {
                    provider: self.name,
                    status: 500,
                    message: "scripted failure".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn has_credential(&self) -> bool {
            true
        }

        async fn generate_outline(
            &self,
            options: &GenerationOptions,
        ) -> Result<BookOutline, ProviderError> {
            self.step()?;
            Ok(BookOutline {
                title: format!("{} on {}", self.name, options.topic),
                subtitle: "Subtitle".to_string(),
                description: "Description".to_string(),
                back_cover_copy: "Back cover".to_string(),
                chapters: (1..=options.chapter_count)
                    .map(|i| ChapterOutline {
                        title: format!("Chapter {}", i),
                        description: format!("About part {}", i),
                    })
                    .collect(),
            })
        }

        async fn generate_chapter(
            &self,
            _options: &GenerationOptions,
            _outline: &BookOutline,
            chapter: &ChapterOutline,
            index: usize,
            _total: usize,
        ) -> Result<String, ProviderError> {
            self.step()?;
            Ok(format!(
                "Body {} for {} from {}",
                index, chapter.title, self.name
            ))
        }

        async fn generate_cover_image(
            &self,
            _prompt: &str,
            _size: SizeTier,
        ) -> Result<CoverImage, ProviderError> {
            self.step()?;
            Ok(CoverImage {
                data: vec![0x89, 0x50],
                media_type: "image/png".to_string(),
            })
        }

        async fn edit_cover_image(
            &self,
            image: &CoverImage,
            _prompt: &str,
        ) -> Result<CoverImage, ProviderError> {
            self.step()?;
            Ok(image.clone())
        }
    }

    fn options() -> GenerationOptions {
        GenerationOptions {
            topic: "knots".to_string(),
            audience: "sailors".to_string(),
            tone: "direct".to_string(),
            objective: "reference".to_string(),
            chapter_count: 2,
            length: crate::model::LengthBucket::Short,
            description: None,
            features: vec![],
            author: None,
        }
    }

    #[tokio::test]
    async fn first_success_wins_and_later_providers_are_never_invoked() {
        let a = Arc::new(ScriptedProvider::failing("a"));
        let b = Arc::new(ScriptedProvider::ok("b"));
        let c = Arc::new(ScriptedProvider::ok("c"));
        let chain = FallbackChain::new(vec![a.clone(), b.clone(), c.clone()]);

        let outline = chain.outline(&options()).await.unwrap();
        assert!(outline.title.starts_with("b on"));
        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 1);
        assert_eq!(c.call_count(), 0);
    }

    #[tokio::test]
    async fn exhaustion_aggregates_every_failure_reason() {
        let a = Arc::new(ScriptedProvider::failing("a"));
        let b = Arc::new(ScriptedProvider::failing("b"));
        let chain = FallbackChain::new(vec![a, b]);

        let err = chain.outline(&options()).await.unwrap_err();
        let attempts = err.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].provider, "a");
        assert_eq!(attempts[1].provider, "b");
        let message = err.to_string();
        assert!(message.contains("a: "));
        assert!(message.contains("b: "));
    }

    #[tokio::test]
    async fn empty_chain_fails_with_zero_attempts() {
        let chain = FallbackChain::new(vec![]);
        let err = chain.outline(&options()).await.unwrap_err();
        assert!(err.attempts().is_empty());
    }

    #[tokio::test]
    async fn edit_falls_back_like_generation() {
        let a = Arc::new(ScriptedProvider::failing("a"));
        let b = Arc::new(ScriptedProvider::ok("b"));
        let chain = FallbackChain::new(vec![a, b]);

        let original = CoverImage {
            data: vec![1, 2, 3],
            media_type: "image/png".to_string(),
        };
        let edited = chain
            .edit_cover_image(&original, "make it bluer")
            .await
            .unwrap();
        assert_eq!(edited.data, original.data);
    }

    #[tokio::test]
    async fn cover_image_falls_back_in_order() {
        let a = Arc::new(ScriptedProvider::failing("a"));
        let b = Arc::new(ScriptedProvider::ok("b"));
        let chain = FallbackChain::new(vec![a.clone(), b.clone()]);

        let image = chain
            .cover_image("cover", SizeTier::Portrait)
            .await
            .unwrap();
        assert_eq!(image.media_type, "image/png");
        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 1);
    }
}
