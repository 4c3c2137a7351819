//! In-memory task registry: the single source of truth for task status.
//!
//! ## Concurrency contract
//!
//! * The map itself sits behind an `RwLock` that is held only long enough to
//!   insert, remove or clone out an `Arc` to one task. Pollers of different
//!   tasks never wait on each other.
//! * Each task has its own `Mutex`. [`TaskRegistry::update`] runs the whole
//!   mutation under that lock and [`TaskRegistry::get`] copies the task out
//!   under the same lock, so a reader sees either all of an update or none
//!   of it.
//! * No lock is held across an `.await`: callers pass synchronous closures.

use crate::error::DocBatchError;
use crate::task::{InputItem, Task, TaskId, TaskSnapshot};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::debug;

/// Shared store of task records, keyed by [`TaskId`].
///
/// Inject one `Arc<TaskRegistry>` into the supervisor; workers receive it
/// from there.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Arc<Mutex<Task>>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task in `uploaded` state and return its identifier.
    pub fn create(&self, input_items: Vec<InputItem>) -> TaskId {
        let id = TaskId::new();
        let task = Task::new(id, input_items);
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(Mutex::new(task)));
        debug!(task_id = %id, "task registered");
        id
    }

    /// Consistent copy of one task.
    pub fn get(&self, id: &TaskId) -> Result<TaskSnapshot, DocBatchError> {
        let entry = self.entry(id)?;
        let task = lock(&entry);
        Ok(task.snapshot())
    }

    /// Apply `mutate` atomically to one task and return its result.
    ///
    /// Concurrent readers observe the task either before or after the whole
    /// closure has run.
    pub fn update<R>(
        &self,
        id: &TaskId,
        mutate: impl FnOnce(&mut Task) -> R,
    ) -> Result<R, DocBatchError> {
        let entry = self.entry(id)?;
        let mut task = lock(&entry);
        Ok(mutate(&mut task))
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifiers of every registered task, in no particular order.
    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Remove terminal tasks that finished before `cutoff`.
    ///
    /// Tasks that are uploaded or still processing are never evicted.
    /// Returns how many tasks were removed.
    pub fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let before = tasks.len();
        tasks.retain(|_, entry| {
            let task = lock(entry);
            !matches!(task.finished_at(), Some(at) if task.status().is_terminal() && at < cutoff)
        });
        let removed = before - tasks.len();
        if removed > 0 {
            debug!(removed, "evicted finished tasks");
        }
        removed
    }

    fn entry(&self, id: &TaskId) -> Result<Arc<Mutex<Task>>, DocBatchError> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| DocBatchError::TaskNotFound { id: id.to_string() })
    }
}

fn lock(entry: &Mutex<Task>) -> MutexGuard<'_, Task> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}
