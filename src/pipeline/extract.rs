//! The extraction capability: submit an invoice image, get raw text back.
//!
//! [`ExtractionClient`] is a capability seam, not a vendor binding — the
//! orchestrator and tests depend only on the one-method trait, and vendor
//! choice happens where a [`VisionClient`] is constructed. Callers never
//! branch on vendor identity.
//!
//! This module is intentionally thin: no retry (that is orchestrator
//! policy), no parsing (that is [`crate::pipeline::parse`]), no side
//! effects beyond the outbound call.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::pipeline::encode::encode_image;
use crate::pipeline::normalize::NormalizedImage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One extraction request: fixed instructions, the image, a short task.
///
/// Borrowed view — constructed once per document, immutable.
#[derive(Clone, Copy)]
pub struct ExtractionRequest<'a> {
    /// Full system instruction block (schema + field semantics).
    pub system_prompt: &'a str,
    /// The normalized still image.
    pub image: &'a NormalizedImage,
    /// Short user-turn task string.
    pub task: &'a str,
}

/// Capability abstraction over the vision backend.
///
/// Implementations must honour deterministic-leaning sampling and a bounded
/// output-length ceiling; both arrive via construction-time configuration,
/// never per call.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Submit one invoice image and return the backend's raw text.
    ///
    /// # Errors
    /// `ExtractionFailure` on any network, vendor, or timeout error.
    /// No retry is attempted here.
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<String, ExtractError>;
}

/// The production [`ExtractionClient`]: a vision-LLM call via
/// `edgequake_llm`, bounded by a per-call timeout.
pub struct VisionClient {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl std::fmt::Debug for VisionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionClient")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl VisionClient {
    /// Wrap a pre-built provider with the config's sampling bounds.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Resolve a client from the config, most-specific first:
    ///
    /// 1. **Pre-built provider** (`config.provider`) — used as-is. This is
    ///    the path tests and embedders take.
    /// 2. **Named provider + model** (`config.provider_name`) — constructed
    ///    via [`ProviderFactory`].
    ///
    /// There is no environment auto-detection here: key lookup belongs to
    /// whoever constructs the provider, not to library logic.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        if let Some(ref provider) = config.provider {
            return Ok(Self::new(Arc::clone(provider), config));
        }

        if let Some(ref name) = config.provider_name {
            let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
            let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
                ExtractError::ProviderNotConfigured {
                    provider: name.clone(),
                    hint: format!("{e}"),
                }
            })?;
            return Ok(Self::new(provider, config));
        }

        Err(ExtractError::ProviderNotConfigured {
            provider: "none".to_string(),
            hint: "Set ExtractionConfig::provider or ExtractionConfig::provider_name \
                   (e.g. \"openai\", \"anthropic\")."
                .to_string(),
        })
    }
}

#[async_trait]
impl ExtractionClient for VisionClient {
    /// ## Message Layout
    ///
    /// 1. **System message** — the fixed schema instruction block
    /// 2. **User message** — the short task string plus the invoice image
    ///    as a base64 attachment
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<String, ExtractError> {
        let messages = vec![
            ChatMessage::system(request.system_prompt),
            ChatMessage::user_with_images(request.task, vec![encode_image(request.image)]),
        ];

        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.provider.chat(&messages, Some(&options)),
        )
        .await
        .map_err(|_| ExtractError::ExtractionFailure {
            detail: format!("backend call timed out after {}s", self.timeout.as_secs()),
        })?
        .map_err(|e| ExtractError::ExtractionFailure {
            detail: format!("{e}"),
        })?;

        debug!(
            "Extraction response: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_without_provider_fails_typed() {
        let config = ExtractionConfig::default();
        let err = VisionClient::from_config(&config).unwrap_err();
        assert!(matches!(err, ExtractError::ProviderNotConfigured { .. }));
    }

    #[tokio::test]
    async fn mock_client_satisfies_the_trait() {
        struct CannedClient(&'static str);

        #[async_trait]
        impl ExtractionClient for CannedClient {
            async fn extract(
                &self,
                _request: ExtractionRequest<'_>,
            ) -> Result<String, ExtractError> {
                Ok(self.0.to_string())
            }
        }

        let image = NormalizedImage {
            bytes: vec![1, 2, 3],
            media_type: "image/png",
            enhanced: false,
        };
        let client: Arc<dyn ExtractionClient> = Arc::new(CannedClient("{\"ok\":true}"));
        let text = client
            .extract(ExtractionRequest {
                system_prompt: "sys",
                image: &image,
                task: "task",
            })
            .await
            .unwrap();
        assert_eq!(text, "{\"ok\":true}");
    }
}
