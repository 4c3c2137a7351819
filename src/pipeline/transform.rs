//! Text transformation: chunking, retries and graceful degradation.
//!
//! [`TextTransform`] is the seam to the language-generation service. It is
//! called once per chunk; [`ChunkedTransformer`] wraps it with the
//! per-call timeout, the [`RetryPolicy`] and the fallback that keeps a
//! failing service from failing an item:
//!
//! | Mode | After the last failed attempt |
//! |------|-------------------------------|
//! | [`TransformMode::Correct`]   | the chunk is kept unchanged |
//! | [`TransformMode::Translate`] | `[TRANSLATION ERROR FOR: <first 100 chars>...]` |
//!
//! [`ChunkedTransformer::run`] therefore always returns text.

use crate::error::TransformError;
use crate::pipeline::retry::{RetryPolicy, Sleeper};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Characters of an untranslated chunk embedded in the fallback marker.
pub const FALLBACK_SNIPPET_CHARS: usize = 100;

/// What the service is asked to do with a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMode {
    /// Fix transcription errors in the source language.
    Correct,
    /// Translate into the target language.
    Translate,
}

impl fmt::Display for TransformMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransformMode::Correct => "correction",
            TransformMode::Translate => "translation",
        })
    }
}

/// A text-to-text service. One call per chunk; may fail or hang.
#[async_trait]
pub trait TextTransform: Send + Sync {
    async fn transform(&self, text: &str, mode: TransformMode) -> Result<String, TransformError>;
}

/// Split `text` into consecutive pieces of at most `max_chars` characters.
///
/// Splits on `char` boundaries, never inside a code point. Empty input
/// yields no chunks.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::with_capacity(text.len() / max_chars + 1);
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// Replacement text for a chunk whose transform failed for good.
pub fn fallback(mode: TransformMode, chunk: &str) -> String {
    match mode {
        TransformMode::Correct => chunk.to_string(),
        TransformMode::Translate => {
            let snippet: String = chunk.chars().take(FALLBACK_SNIPPET_CHARS).collect();
            format!("[TRANSLATION ERROR FOR: {snippet}...]")
        }
    }
}

/// Drives a [`TextTransform`] over a whole text.
pub struct ChunkedTransformer<'a> {
    pub client: &'a dyn TextTransform,
    pub policy: RetryPolicy,
    pub sleeper: &'a dyn Sleeper,
    pub call_timeout: Duration,
}

impl ChunkedTransformer<'_> {
    /// Transform `text` chunk by chunk and join the outputs with `\n`.
    ///
    /// Chunks are processed in order; a chunk that keeps failing is replaced
    /// by its [`fallback`]. Never fails.
    pub async fn run(&self, text: &str, mode: TransformMode, chunk_chars: usize) -> String {
        let chunks = chunk_text(text, chunk_chars);
        let total = chunks.len();
        let mut outputs = Vec::with_capacity(total);

        for (i, chunk) in chunks.into_iter().enumerate() {
            debug!(%mode, chunk = i + 1, total, chars = chunk.chars().count(), "transforming chunk");
            let what = format!("{mode} chunk {}/{total}", i + 1);
            let result = self
                .policy
                .run(self.sleeper, &what, |_| self.call_once(chunk, mode))
                .await;
            match result {
                Ok(out) => outputs.push(out),
                Err(e) => {
                    warn!(%mode, chunk = i + 1, "all attempts failed, using fallback: {e}");
                    outputs.push(fallback(mode, chunk));
                }
            }
        }

        outputs.join("\n")
    }

    async fn call_once(&self, chunk: &str, mode: TransformMode) -> Result<String, TransformError> {
        match tokio::time::timeout(self.call_timeout, self.client.transform(chunk, mode)).await {
            Ok(result) => result,
            Err(_) => Err(TransformError::Timeout {
                secs: self.call_timeout.as_secs(),
            }),
        }
    }
}
