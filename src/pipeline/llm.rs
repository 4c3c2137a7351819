//! LLM-backed [`TextTransform`] implementations.
//!
//! [`LlmTransformClient`] turns one chunk into one chat completion. It is
//! deliberately thin: prompts live in [`crate::prompts`], and timeouts,
//! retries and fallbacks live in [`crate::pipeline::transform`], so this
//! module only builds messages and maps provider errors.
//!
//! [`PlaceholderTransform`] answers without any network access. It is used
//! in offline mode (no API key, dry runs, demos) and marks its output so a
//! reader can tell nothing was corrected or translated.

use crate::config::BatchConfig;
use crate::error::{DocBatchError, TransformError};
use crate::pipeline::postprocess::clean_response;
use crate::pipeline::transform::{TextTransform, TransformMode};
use crate::prompts::{
    correction_prompt, correction_system_prompt, translation_prompt, translation_system_prompt,
};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Chat-completion client for correction and translation.
pub struct LlmTransformClient {
    provider: Arc<dyn LLMProvider>,
    source_language: String,
    target_language: String,
    correction_temperature: f32,
    translation_temperature: f32,
    max_tokens: usize,
}

impl LlmTransformClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &BatchConfig) -> Self {
        Self {
            provider,
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
            correction_temperature: config.correction_temperature,
            translation_temperature: config.translation_temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn messages(&self, text: &str, mode: TransformMode) -> Vec<ChatMessage> {
        let (system, user) = match mode {
            TransformMode::Correct => (
                correction_system_prompt(&self.source_language),
                correction_prompt(&self.source_language, text),
            ),
            TransformMode::Translate => (
                translation_system_prompt(&self.source_language, &self.target_language),
                translation_prompt(&self.source_language, &self.target_language, text),
            ),
        };
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }

    fn options(&self, mode: TransformMode) -> CompletionOptions {
        let temperature = match mode {
            TransformMode::Correct => self.correction_temperature,
            TransformMode::Translate => self.translation_temperature,
        };
        CompletionOptions {
            temperature: Some(temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TextTransform for LlmTransformClient {
    async fn transform(&self, text: &str, mode: TransformMode) -> Result<String, TransformError> {
        let start = Instant::now();
        let messages = self.messages(text, mode);
        let options = self.options(mode);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| TransformError::Api {
                message: e.to_string(),
            })?;

        debug!(
            %mode,
            input_tokens = response.prompt_tokens,
            output_tokens = response.completion_tokens,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "transform call finished"
        );

        let cleaned = clean_response(&response.content);
        if cleaned.is_empty() && !text.trim().is_empty() {
            return Err(TransformError::EmptyResponse);
        }
        Ok(cleaned)
    }
}

/// Offline stand-in that never calls a model.
#[derive(Debug, Clone)]
pub struct PlaceholderTransform {
    target_language: String,
}

impl PlaceholderTransform {
    pub fn new(target_language: impl Into<String>) -> Self {
        Self {
            target_language: target_language.into(),
        }
    }
}

#[async_trait]
impl TextTransform for PlaceholderTransform {
    async fn transform(&self, text: &str, mode: TransformMode) -> Result<String, TransformError> {
        Ok(match mode {
            TransformMode::Correct => format!("{text} [CORRECTED]"),
            TransformMode::Translate => format!(
                "[{} TRANSLATION PLACEHOLDER]",
                self.target_language.to_uppercase()
            ),
        })
    }
}

/// Build the [`TextTransform`] selected by the configuration.
pub fn transform_from_config(config: &BatchConfig) -> Result<Arc<dyn TextTransform>, DocBatchError> {
    if config.offline {
        debug!("offline mode: using placeholder transform");
        return Ok(Arc::new(PlaceholderTransform::new(&config.target_language)));
    }
    let provider = resolve_provider(config)?;
    Ok(Arc::new(LlmTransformClient::new(provider, config)))
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is.
/// 2. **Named provider + model** (`config.provider_name`): the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI key present** (`OPENAI_API_KEY`): OpenAI with the configured
///    or default model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &BatchConfig) -> Result<Arc<dyn LLMProvider>, DocBatchError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", config.model_or_default());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DocBatchError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY or ANTHROPIC_API_KEY, or run with --offline.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DocBatchError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocBatchError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
