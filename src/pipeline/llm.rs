//! LLM interaction: markup cleanup and vision OCR behind small traits.
//!
//! The enricher only sees [`MarkupCleaner`] and [`TextRecognizer`]; the
//! default implementations here drive an `edgequake-llm` provider. All
//! prompt wording lives in [`crate::prompts`].
//!
//! Each region is one request with no retry. The caller wraps the call in
//! the configured timeout and falls back to the raw OCR text on any failure,
//! so a flaky service degrades output quality rather than aborting the run.

use crate::config::ConversionConfig;
use crate::error::{CleanupError, RecognizeError, Scan2DocError};
use crate::pipeline::encode::encode_region;
use crate::prompts::{cleanup_prompt, DEFAULT_CLEANUP_PROMPT, DEFAULT_OCR_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Text-cleanup capability: raw OCR text in, intermediate markup out.
#[async_trait]
pub trait MarkupCleaner: Send + Sync {
    async fn clean(&self, text: &str) -> Result<String, CleanupError>;
}

/// Re-recognises text from a region crop when the layout OCR came back empty.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, crop: &DynamicImage) -> Result<String, RecognizeError>;
}

// ── Cleanup ──────────────────────────────────────────────────────────────────

/// [`MarkupCleaner`] over an `edgequake-llm` chat provider.
pub struct LlmCleaner {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    options: CompletionOptions,
}

impl LlmCleaner {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            prompt: config
                .cleanup_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_CLEANUP_PROMPT.to_string()),
            options: build_options(config),
        }
    }
}

#[async_trait]
impl MarkupCleaner for LlmCleaner {
    async fn clean(&self, text: &str) -> Result<String, CleanupError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user(cleanup_prompt(&self.prompt, text))];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| CleanupError::Service(e.to_string()))?;

        debug!(
            "Cleanup: {} chars in, {} prompt tokens, {} completion tokens, {:?}",
            text.chars().count(),
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(CleanupError::EmptyResponse);
        }
        Ok(response.content)
    }
}

// ── Vision OCR ───────────────────────────────────────────────────────────────

/// [`TextRecognizer`] that sends the crop to a vision-capable chat model.
pub struct VisionRecognizer {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl VisionRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                // Transcription, not rewriting.
                temperature: Some(0.0),
                max_tokens: Some(config.max_tokens),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl TextRecognizer for VisionRecognizer {
    async fn recognize(&self, crop: &DynamicImage) -> Result<String, RecognizeError> {
        let image = encode_region(crop).map_err(|e| RecognizeError::Encode(e.to_string()))?;
        let messages = vec![
            ChatMessage::system(DEFAULT_OCR_PROMPT),
            ChatMessage::user_with_images("", vec![image]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| RecognizeError::Service(e.to_string()))?;

        debug!(
            "Vision OCR: {}x{} crop → {} chars",
            crop.width(),
            crop.height(),
            response.content.chars().count()
        );
        Ok(response.content)
    }
}

/// Build `CompletionOptions` from the conversion config.
fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

// ── Provider resolution ──────────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Scan2DocError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Scan2DocError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Model used when only `OPENAI_API_KEY` is available.
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4.1-nano";

fn openai_model(config: &ConversionConfig) -> &str {
    config.model.as_deref().unwrap_or(OPENAI_DEFAULT_MODEL)
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`)
/// 2. **Named provider** (`config.provider_name` + `config.model`)
/// 3. **`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`**, when both are set
/// 4. **`OPENAI_API_KEY`**, with `config.model` or [`OPENAI_DEFAULT_MODEL`]
/// 5. **Full auto-detection** (`ProviderFactory::from_env`)
pub fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, Scan2DocError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", openai_model(config));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Scan2DocError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set DEEPSEEK_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
