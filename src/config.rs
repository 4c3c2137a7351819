//! Configuration types for batch processing.
//!
//! All behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. One struct holds every knob so the supervisor,
//! the workers and the collaborators all read the same values.

use crate::error::DocBatchError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a batch processing service.
///
/// Built via [`BatchConfig::builder()`] or using [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_docbatch::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .max_concurrent_batches(2)
///     .target_language("English")
///     .offline(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.translation_chunk_chars, 3000);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Maximum characters per correction call. Default: 4000.
    pub correction_chunk_chars: usize,

    /// Maximum characters per translation call. Default: 3000.
    ///
    /// Smaller than the correction chunk because a translation is usually
    /// longer than its source and must still fit into `max_tokens`.
    pub translation_chunk_chars: usize,

    /// Attempts per text-transform call, including the first. Default: 3.
    pub max_attempts: u32,

    /// Initial retry delay in milliseconds. Default: 1000.
    ///
    /// Doubles after each failed attempt: 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 30.
    pub api_timeout_secs: u64,

    /// Sampling temperature for correction. Default: 0.3.
    pub correction_temperature: f32,

    /// Sampling temperature for translation. Default: 0.4.
    pub translation_temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4000.
    pub max_tokens: usize,

    /// LLM model identifier, e.g. "gpt-4o". If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Language of the submitted documents. Default: "Latin".
    pub source_language: String,

    /// Language to translate into. Default: "Dutch".
    pub target_language: String,

    /// Directory for persisted uploads. Default: `uploads`.
    pub upload_dir: PathBuf,

    /// Directory for rendered and compiled artifacts. Default: `processed`.
    pub output_dir: PathBuf,

    /// Accepted upload extensions, lower-case without the dot.
    /// Default: `docx`, `txt`, `md`.
    pub allowed_extensions: Vec<String>,

    /// Upper bound on batches processed at the same time. Default: 4.
    ///
    /// Further `start_processing` calls are still accepted immediately; their
    /// workers wait for a free slot.
    pub max_concurrent_batches: usize,

    /// Age after which finished tasks may be evicted. Default: None (keep
    /// every task for the lifetime of the process).
    pub retention_secs: Option<u64>,

    /// Use placeholder text instead of calling an LLM. Default: false.
    pub offline: bool,
}

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            correction_chunk_chars: 4000,
            translation_chunk_chars: 3000,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            api_timeout_secs: 30,
            correction_temperature: 0.3,
            translation_temperature: 0.4,
            max_tokens: 4000,
            model: None,
            provider_name: None,
            provider: None,
            source_language: "Latin".to_string(),
            target_language: "Dutch".to_string(),
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("processed"),
            allowed_extensions: vec!["docx".into(), "txt".into(), "md".into()],
            max_concurrent_batches: 4,
            retention_secs: None,
            offline: false,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("correction_chunk_chars", &self.correction_chunk_chars)
            .field("translation_chunk_chars", &self.translation_chunk_chars)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_tokens", &self.max_tokens)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("source_language", &self.source_language)
            .field("target_language", &self.target_language)
            .field("upload_dir", &self.upload_dir)
            .field("output_dir", &self.output_dir)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("max_concurrent_batches", &self.max_concurrent_batches)
            .field("retention_secs", &self.retention_secs)
            .field("offline", &self.offline)
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention_secs.map(Duration::from_secs)
    }

    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn correction_chunk_chars(mut self, n: usize) -> Self {
        self.config.correction_chunk_chars = n;
        self
    }

    pub fn translation_chunk_chars(mut self, n: usize) -> Self {
        self.config.translation_chunk_chars = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn correction_temperature(mut self, t: f32) -> Self {
        self.config.correction_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn translation_temperature(mut self, t: f32) -> Self {
        self.config.translation_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn source_language(mut self, lang: impl Into<String>) -> Self {
        self.config.source_language = lang.into();
        self
    }

    pub fn target_language(mut self, lang: impl Into<String>) -> Self {
        self.config.target_language = lang.into();
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.allowed_extensions = exts
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn max_concurrent_batches(mut self, n: usize) -> Self {
        self.config.max_concurrent_batches = n.max(1);
        self
    }

    pub fn retention_secs(mut self, secs: u64) -> Self {
        self.config.retention_secs = Some(secs);
        self
    }

    pub fn offline(mut self, v: bool) -> Self {
        self.config.offline = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, DocBatchError> {
        let c = &self.config;
        if c.correction_chunk_chars == 0 || c.translation_chunk_chars == 0 {
            return Err(DocBatchError::InvalidConfig(
                "Chunk sizes must be ≥ 1 character".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(DocBatchError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.allowed_extensions.is_empty() {
            return Err(DocBatchError::InvalidConfig(
                "At least one upload extension must be allowed".into(),
            ));
        }
        if c.source_language.trim().is_empty() || c.target_language.trim().is_empty() {
            return Err(DocBatchError::InvalidConfig(
                "Source and target languages must be named".into(),
            ));
        }
        Ok(self.config)
    }
}
