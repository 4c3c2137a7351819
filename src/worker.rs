//! The pipeline worker: drives one task from `processing` to a terminal state.
//!
//! ## Progress schedule
//!
//! ```text
//!  10            "Processing documents..."
//!  10 + 80·i/N   "Processing file {i+1} of {N}..."   (then one message per sub-phase)
//!  90            "Compiling documents..."
//! 100            "Processing completed"             (same update as status=completed)
//! ```
//!
//! ## Failure isolation
//!
//! An item that cannot be extracted or rendered is recorded as a failed
//! [`ItemResult`] and the loop moves on. Transform calls never fail an item
//! (see [`crate::pipeline::transform`]) and a failed compile only leaves
//! `compiled` unset. The only way out of [`Pipeline::run`] with an error is
//! a structural failure, which [`run_worker`] turns into `status=error`.

use crate::config::BatchConfig;
use crate::error::{DocBatchError, ItemError};
use crate::pipeline::extract::DocumentExtractor;
use crate::pipeline::render::DocumentBuilder;
use crate::pipeline::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::pipeline::transform::{ChunkedTransformer, TextTransform, TransformMode};
use crate::registry::TaskRegistry;
use crate::task::{ArtifactRef, InputItem, ItemResult, TaskId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Collaborators and settings shared by every worker.
///
/// Cheap to clone: everything sits behind an `Arc`.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<BatchConfig>,
    extractor: Arc<dyn DocumentExtractor>,
    transform: Arc<dyn TextTransform>,
    builder: Arc<dyn DocumentBuilder>,
    sleeper: Arc<dyn Sleeper>,
}

impl Pipeline {
    pub fn new(
        config: Arc<BatchConfig>,
        extractor: Arc<dyn DocumentExtractor>,
        transform: Arc<dyn TextTransform>,
        builder: Arc<dyn DocumentBuilder>,
    ) -> Self {
        Self {
            config,
            extractor,
            transform,
            builder,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the clock used between retry attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Process every item of `id` and finish the task.
    ///
    /// Expects the task to be `processing` already. Returns an error only
    /// for structural failures, e.g. the task disappearing from the registry.
    pub async fn run(&self, registry: &TaskRegistry, id: TaskId) -> Result<(), DocBatchError> {
        let start = Instant::now();
        let items = registry.update(&id, |t| {
            t.advance(10, "Processing documents...");
            t.input_items().to_vec()
        })?;
        let total = items.len();
        info!(task_id = %id, items = total, "batch started");

        let mut artifacts: Vec<ArtifactRef> = Vec::with_capacity(total);
        for (i, item) in items.iter().enumerate() {
            let (progress, message) = item_step(i, total);
            registry.update(&id, |t| t.advance(progress, message))?;

            let result = match self.process_item(registry, id, item).await {
                Ok(artifact) => {
                    artifacts.push(artifact.clone());
                    ItemResult::produced(&item.original_name, artifact)
                }
                Err(e) => {
                    warn!(task_id = %id, item = %item.original_name, "item failed: {e}");
                    ItemResult::failed(&item.original_name, e)
                }
            };
            registry.update(&id, |t| t.push_result(result))?;
        }

        registry.update(&id, |t| t.advance(90, "Compiling documents..."))?;
        let compiled = self.compile(id, &artifacts).await;

        registry.update(&id, |t| t.complete(compiled))?;
        info!(
            task_id = %id,
            items = total,
            produced = artifacts.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch completed"
        );
        Ok(())
    }

    /// extract → correct → translate → render for one item.
    async fn process_item(
        &self,
        registry: &TaskRegistry,
        id: TaskId,
        item: &InputItem,
    ) -> Result<ArtifactRef, ItemError> {
        let name = &item.original_name;
        let cfg = &self.config;
        let note = |message: String| {
            // A vanished task is caught by the next progress update.
            let _ = registry.update(&id, |t| t.set_message(message));
        };

        note(format!("Extracting text from {name}..."));
        let text = self.extractor.extract_text(item).await?;

        let driver = ChunkedTransformer {
            client: self.transform.as_ref(),
            policy: RetryPolicy::new(cfg.max_attempts, cfg.retry_backoff()),
            sleeper: self.sleeper.as_ref(),
            call_timeout: cfg.api_timeout(),
        };

        note(format!(
            "Correcting {} text for {name}...",
            cfg.source_language
        ));
        let corrected = driver
            .run(&text, TransformMode::Correct, cfg.correction_chunk_chars)
            .await;

        note(format!(
            "Translating to {} for {name}...",
            cfg.target_language
        ));
        let translated = driver
            .run(&corrected, TransformMode::Translate, cfg.translation_chunk_chars)
            .await;

        note(format!("Creating document for {name}..."));
        let artifact = self
            .builder
            .render(item.stem(), &corrected, &translated)
            .await?;

        debug!(task_id = %id, item = %name, artifact = %artifact.name, "item produced");
        Ok(artifact)
    }

    /// Compile when at least two items produced an artifact.
    async fn compile(&self, id: TaskId, artifacts: &[ArtifactRef]) -> Option<ArtifactRef> {
        if artifacts.len() < 2 {
            debug!(task_id = %id, produced = artifacts.len(), "nothing to compile");
            return None;
        }
        match self.builder.compile(artifacts).await {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                warn!(task_id = %id, "compilation skipped: {e}");
                None
            }
        }
    }
}

/// Progress and message set when item `i` (zero-based) of `total` starts.
fn item_step(i: usize, total: usize) -> (u8, String) {
    let progress = (10 + 80 * i / total.max(1)) as u8;
    (progress, format!("Processing file {} of {}...", i + 1, total))
}

/// Run [`Pipeline::run`] and record a structural failure as `status=error`.
pub async fn run_worker(pipeline: Pipeline, registry: Arc<TaskRegistry>, id: TaskId) {
    if let Err(e) = pipeline.run(&registry, id).await {
        error!(task_id = %id, "worker failed: {e}");
        // Nothing left to record if the task itself is gone.
        let _ = registry.update(&id, |t| t.fail(&e));
    }
}
