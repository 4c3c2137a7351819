//! The task supervisor: the caller-facing API of the batch service.
//!
//! ```text
//! submit_batch ──▶ registry.create ──▶ start_processing ──▶ spawn ──▶ permit ──▶ run_worker
//!                                                             │
//!                         get_status ◀── registry.get ◀───────┘ (polled at any time)
//! ```
//!
//! ## Why an outer and an inner task?
//!
//! `start_processing` flips the task to `processing` under the task lock and
//! returns at once. The spawned outer task first waits for one of
//! `max_concurrent_batches` semaphore permits, then spawns the worker and
//! awaits its `JoinHandle`. A panic inside the worker surfaces there as a
//! `JoinError` and is recorded as `status=error`, so every started task
//! reaches a terminal state.

use crate::config::BatchConfig;
use crate::error::DocBatchError;
use crate::pipeline::extract::FileExtractor;
use crate::pipeline::llm::transform_from_config;
use crate::pipeline::render::MarkdownBuilder;
use crate::registry::TaskRegistry;
use crate::storage::{FsUploadStore, UploadStore};
use crate::task::{TaskId, TaskSnapshot, Upload};
use crate::worker::{run_worker, Pipeline};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Message shown while a started task waits for a free worker slot.
pub const WAITING_MESSAGE: &str = "Waiting for a free worker...";

/// Accepts batches, starts workers and answers status queries.
#[derive(Clone)]
pub struct TaskSupervisor {
    registry: Arc<TaskRegistry>,
    storage: Arc<dyn UploadStore>,
    pipeline: Pipeline,
    permits: Arc<Semaphore>,
    runtime: Option<Handle>,
}

impl TaskSupervisor {
    /// Build a supervisor. When called inside a Tokio runtime, that runtime
    /// also runs workers started from threads outside it.
    pub fn new(registry: Arc<TaskRegistry>, storage: Arc<dyn UploadStore>, pipeline: Pipeline) -> Self {
        let permits = Arc::new(Semaphore::new(pipeline.config().max_concurrent_batches.max(1)));
        Self {
            registry,
            storage,
            pipeline,
            permits,
            runtime: Handle::try_current().ok(),
        }
    }

    /// Wire the file-system store, the file extractor, the Markdown builder
    /// and the configured text transform.
    pub fn from_config(config: BatchConfig) -> Result<Self, DocBatchError> {
        let transform = transform_from_config(&config)?;
        let storage = Arc::new(FsUploadStore::new(
            &config.upload_dir,
            &config.allowed_extensions,
        ));
        let builder = Arc::new(MarkdownBuilder::from_config(&config));
        let pipeline = Pipeline::new(Arc::new(config), Arc::new(FileExtractor), transform, builder);
        Ok(Self::new(Arc::new(TaskRegistry::new()), storage, pipeline))
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Persist the accepted uploads and register a task in `uploaded` state.
    ///
    /// Uploads with a rejected extension are skipped; if none is accepted the
    /// batch fails with [`DocBatchError::NoValidInput`] and no task is
    /// created. If any accepted upload cannot be stored, the ones already
    /// stored are discarded and the first storage error is returned.
    pub async fn submit_batch(&self, uploads: Vec<Upload>) -> Result<TaskId, DocBatchError> {
        let (accepted, rejected): (Vec<Upload>, Vec<Upload>) = uploads
            .into_iter()
            .partition(|u| self.storage.accepts(&u.file_name));

        let rejected: Vec<String> = rejected.into_iter().map(|u| u.file_name).collect();
        if accepted.is_empty() {
            return Err(DocBatchError::NoValidInput { rejected });
        }
        if !rejected.is_empty() {
            warn!(rejected = ?rejected, "skipping files with unsupported extensions");
        }

        // Stored concurrently; `join_all` keeps submission order.
        let stored = join_all(accepted.iter().map(|u| self.storage.store(u))).await;
        let mut items = Vec::with_capacity(stored.len());
        let mut first_err = None;
        for result in stored {
            match result {
                Ok(item) => items.push(item),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_err {
            warn!(discarded = items.len(), "batch storage failed: {e}");
            join_all(items.iter().map(|item| self.storage.discard(item))).await;
            return Err(e);
        }

        let id = self.registry.create(items);
        info!(task_id = %id, items = accepted.len(), "batch submitted");
        Ok(id)
    }

    /// Start the worker for an `uploaded` task and return immediately.
    ///
    /// The status change happens before this returns, so a second call for
    /// the same task fails with [`DocBatchError::AlreadyProcessing`] and a
    /// finished task with [`DocBatchError::AlreadyFinished`].
    ///
    /// The worker runs on the current Tokio runtime, or else on the one the
    /// supervisor was built in. With neither, the call fails with
    /// [`DocBatchError::NoRuntime`] and the task stays `uploaded`.
    pub fn start_processing(&self, id: &TaskId) -> Result<(), DocBatchError> {
        let runtime = Handle::try_current()
            .ok()
            .or_else(|| self.runtime.clone())
            .ok_or_else(|| DocBatchError::NoRuntime { id: id.to_string() })?;
        self.registry
            .update(id, |t| t.begin_processing(WAITING_MESSAGE))??;

        let id = *id;
        let registry = Arc::clone(&self.registry);
        let pipeline = self.pipeline.clone();
        let permits = Arc::clone(&self.permits);

        runtime.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let _ = registry.update(&id, |t| t.fail(format!("worker pool closed: {e}")));
                    return;
                }
            };
            debug!(task_id = %id, "worker slot acquired");

            let worker = tokio::spawn(run_worker(pipeline, Arc::clone(&registry), id));
            if let Err(e) = worker.await {
                error!(task_id = %id, "worker crashed: {e}");
                let detail = if e.is_panic() {
                    "worker panicked".to_string()
                } else {
                    e.to_string()
                };
                let _ = registry.update(&id, |t| t.fail(detail));
            }
        });

        debug!(task_id = %id, "processing scheduled");
        Ok(())
    }

    /// Current snapshot of a task.
    pub fn get_status(&self, id: &TaskId) -> Result<TaskSnapshot, DocBatchError> {
        self.registry.get(id)
    }

    /// Poll until the task is `completed` or `error`.
    pub async fn wait_for_terminal(
        &self,
        id: &TaskId,
        poll_interval: Duration,
    ) -> Result<TaskSnapshot, DocBatchError> {
        loop {
            let snap = self.registry.get(id)?;
            if snap.is_terminal() {
                return Ok(snap);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Drop finished tasks older than `retention_secs`. No-op without one.
    pub fn evict_expired(&self) -> usize {
        let Some(retention) = self.pipeline.config().retention() else {
            return 0;
        };
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        self.registry.evict_finished_before(Utc::now() - retention)
    }
}
