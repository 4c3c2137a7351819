//! Task data model: one batch submission and its evolving status.
//!
//! A [`Task`] is owned by the [`crate::registry::TaskRegistry`]. Workers never
//! hold one directly; they mutate it through
//! [`crate::registry::TaskRegistry::update`], which is why every state change
//! is a method here that keeps the invariants local:
//!
//! * `progress` never decreases and never exceeds 100,
//! * `results` only grows,
//! * `compiled` is written together with `status = completed`.

use crate::error::DocBatchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque, never-reused task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = DocBatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| DocBatchError::TaskNotFound { id: s.to_string() })
    }
}

/// Top-level task state. Sub-phases of `Processing` are only visible through
/// `progress` and `message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Uploaded,
    Processing,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Uploaded => "uploaded",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        })
    }
}

/// A file submitted by a client, not yet persisted.
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name as given by the client (may contain path components).
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// A persisted upload, as referenced by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputItem {
    /// Sanitised client file name, e.g. `letter_12.docx`.
    pub original_name: String,
    /// Where the upload was stored.
    pub path: PathBuf,
}

impl InputItem {
    /// File name without its extension, used for titles and artifact names.
    pub fn stem(&self) -> &str {
        match self.original_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.original_name,
        }
    }
}

/// Reference to a rendered or compiled output document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// File name inside the output directory.
    pub name: String,
    /// Human-readable title (the source item's stem for rendered artifacts).
    pub label: String,
    pub download_url: String,
    #[serde(skip)]
    pub path: PathBuf,
}

impl ArtifactRef {
    pub fn new(name: impl Into<String>, label: impl Into<String>, path: PathBuf) -> Self {
        let name = name.into();
        Self {
            download_url: format!("/download/{name}"),
            name,
            label: label.into(),
            path,
        }
    }
}

/// Outcome for one input item: an artifact or an error, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemOutcome {
    Produced { produced_artifact: ArtifactRef },
    Failed { error_detail: String },
}

/// Result row appended by the worker for every input item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub original_name: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

impl ItemResult {
    pub fn produced(original_name: impl Into<String>, artifact: ArtifactRef) -> Self {
        Self {
            original_name: original_name.into(),
            outcome: ItemOutcome::Produced {
                produced_artifact: artifact,
            },
        }
    }

    pub fn failed(original_name: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            original_name: original_name.into(),
            outcome: ItemOutcome::Failed {
                error_detail: error.to_string(),
            },
        }
    }

    pub fn artifact(&self) -> Option<&ArtifactRef> {
        match &self.outcome {
            ItemOutcome::Produced { produced_artifact } => Some(produced_artifact),
            ItemOutcome::Failed { .. } => None,
        }
    }

    pub fn error_detail(&self) -> Option<&str> {
        match &self.outcome {
            ItemOutcome::Produced { .. } => None,
            ItemOutcome::Failed { error_detail } => Some(error_detail),
        }
    }

    pub fn is_success(&self) -> bool {
        self.artifact().is_some()
    }
}

/// One batch submission. Lives inside the registry.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    status: TaskStatus,
    progress: u8,
    message: String,
    input_items: Vec<InputItem>,
    results: Vec<ItemResult>,
    compiled: Option<ArtifactRef>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: TaskId, input_items: Vec<InputItem>) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Uploaded,
            progress: 0,
            message: "Files uploaded".to_string(),
            input_items,
            results: Vec::new(),
            compiled: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn input_items(&self) -> &[InputItem] {
        &self.input_items
    }

    pub fn results(&self) -> &[ItemResult] {
        &self.results
    }

    pub fn compiled(&self) -> Option<&ArtifactRef> {
        self.compiled.as_ref()
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// `uploaded → processing`. Rejects a running or finished task.
    pub fn begin_processing(&mut self, message: impl Into<String>) -> Result<(), DocBatchError> {
        match self.status {
            TaskStatus::Uploaded => {
                self.status = TaskStatus::Processing;
                self.set_message(message);
                Ok(())
            }
            TaskStatus::Processing => Err(DocBatchError::AlreadyProcessing {
                id: self.id.to_string(),
            }),
            status => Err(DocBatchError::AlreadyFinished {
                id: self.id.to_string(),
                status,
            }),
        }
    }

    /// Move progress forward (never backwards, capped at 100) and replace the
    /// message.
    pub fn advance(&mut self, progress: u8, message: impl Into<String>) {
        self.progress = self.progress.max(progress.min(100));
        self.set_message(message);
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
        self.updated_at = Utc::now();
    }

    pub fn push_result(&mut self, result: ItemResult) {
        self.results.push(result);
        self.updated_at = Utc::now();
    }

    /// Terminal success. Writes status, progress, message and the compiled
    /// artifact in one step so readers never see a half-finished task.
    pub fn complete(&mut self, compiled: Option<ArtifactRef>) {
        debug_assert_eq!(self.results.len(), self.input_items.len());
        self.status = TaskStatus::Completed;
        self.compiled = compiled;
        self.advance(100, "Processing completed");
        self.finished_at = Some(self.updated_at);
    }

    /// Terminal failure of the orchestration itself.
    pub fn fail(&mut self, message: impl fmt::Display) {
        self.status = TaskStatus::Error;
        self.set_message(format!("Error: {message}"));
        self.finished_at = Some(self.updated_at);
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            item_count: self.input_items.len(),
            results: self.results.clone(),
            compiled: self.compiled.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            finished_at: self.finished_at,
        }
    }
}

/// Consistent, owned copy of a task handed to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub item_count: usize,
    pub results: Vec<ItemResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiled: Option<ArtifactRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn succeeded_items(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}
