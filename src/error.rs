//! Error types for the edgequake-docbatch library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`DocBatchError`], **fatal for the call**: the request cannot proceed
//!   (no acceptable upload, unknown task, task already running, provider not
//!   configured). Returned as `Err(DocBatchError)` from the supervisor and
//!   registry, and used by a worker to report a task-fatal failure.
//!
//! * [`ItemError`], **non-fatal, per item**: one document could not be
//!   extracted or rendered, or the compiled document could not be written.
//!   Stored inside [`crate::task::ItemResult`] so the rest of the batch
//!   carries on.
//!
//! * [`TransformError`], **non-fatal, per call**: one text-transform call
//!   failed. These never leave the transform stage: the call is retried and
//!   then replaced by a fallback value.

use crate::task::TaskStatus;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-docbatch library.
///
/// Item-level failures use [`ItemError`] and are stored in
/// [`crate::task::ItemResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum DocBatchError {
    // ── Submission errors ─────────────────────────────────────────────────
    /// None of the submitted files has an accepted extension.
    #[error("No valid input files (rejected: {})", list_rejected(.rejected))]
    NoValidInput { rejected: Vec<String> },

    // ── Task lifecycle errors ─────────────────────────────────────────────
    /// No task is registered under this identifier.
    #[error("Task not found: '{id}'")]
    TaskNotFound { id: String },

    /// A worker is already running for this task.
    #[error("Task '{id}' is already processing")]
    AlreadyProcessing { id: String },

    /// The task already ran to a terminal state and cannot be started again.
    #[error("Task '{id}' has already finished with status '{status}'")]
    AlreadyFinished { id: String, status: TaskStatus },

    /// `start_processing` was called with no Tokio runtime to run the worker.
    #[error("No Tokio runtime available to run task '{id}'")]
    NoRuntime { id: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Could not persist an upload or an artifact.
    #[error("Failed to write '{path}': {source}")]
    StorageFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn list_rejected(rejected: &[String]) -> String {
    if rejected.is_empty() {
        "none submitted".to_string()
    } else {
        rejected.join(", ")
    }
}

/// A non-fatal error for a single item (or for the compile step).
///
/// The worker records it as the `error_detail` of an
/// [`crate::task::ItemResult`] and moves on to the next item.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The file extension has no extractor.
    #[error("{name}: unsupported document format")]
    UnsupportedFormat { name: String },

    /// The document could not be read or parsed.
    #[error("{name}: text extraction failed: {detail}")]
    ExtractionFailed { name: String, detail: String },

    /// The side-by-side document could not be produced.
    #[error("{name}: rendering failed: {detail}")]
    RenderFailed { name: String, detail: String },

    /// The compiled document could not be produced.
    #[error("compilation failed: {detail}")]
    CompileFailed { detail: String },
}

/// Failure of one text-transform call.
///
/// Always recoverable: see [`crate::pipeline::transform`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The call did not return within the per-call timeout.
    #[error("transform call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The service returned an error (network, HTTP status, auth, …).
    #[error("transform API error: {message}")]
    Api { message: String },

    /// The service answered, but with nothing usable.
    #[error("transform returned an empty response")]
    EmptyResponse,
}
