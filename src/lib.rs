//! # edgequake-docbatch
//!
//! Batch correction and translation of historical documents with an LLM,
//! run as background tasks that clients poll for progress.
//!
//! ## Why this crate?
//!
//! Correcting and translating a stack of transcribed letters takes minutes
//! of model calls per document. A request/response cycle cannot wait that
//! long, and one unreadable file or one flaky API call must not throw away
//! the rest of the batch. This crate turns a batch into a task with a
//! registry entry that moves `uploaded → processing → completed | error`,
//! isolates failures per item and per call, and compiles the results into
//! one document at the end.
//!
//! ## Pipeline Overview
//!
//! ```text
//! uploads
//!  │
//!  ├─ 1. Store      sanitised names, atomic writes        (storage)
//!  ├─ 2. Extract    .docx / .txt / .md → text             (pipeline::extract)
//!  ├─ 3. Correct    4000-char chunks, 3 attempts, fallback (pipeline::transform)
//!  ├─ 4. Translate  3000-char chunks, 3 attempts, fallback (pipeline::transform)
//!  ├─ 5. Render     side-by-side Markdown per item         (pipeline::render)
//!  └─ 6. Compile    one document when ≥ 2 items succeeded  (pipeline::render)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docbatch::{BatchConfig, TaskSupervisor, Upload};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let supervisor = TaskSupervisor::from_config(BatchConfig::default())?;
//!
//!     let id = supervisor
//!         .submit_batch(vec![Upload::new("letter.txt", std::fs::read("letter.txt")?)])
//!         .await?;
//!     supervisor.start_processing(&id)?;
//!
//!     let done = supervisor.wait_for_terminal(&id, Duration::from_millis(500)).await?;
//!     println!("{}: {}", done.status, done.message);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docbatch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-docbatch = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod input;
pub mod pipeline;
pub mod prompts;
pub mod registry;
pub mod storage;
pub mod supervisor;
pub mod task;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BatchConfig, BatchConfigBuilder, DEFAULT_MODEL};
pub use error::{DocBatchError, ItemError, TransformError};
pub use pipeline::extract::{DocumentExtractor, FileExtractor};
pub use pipeline::render::{DocumentBuilder, MarkdownBuilder};
pub use pipeline::retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use pipeline::transform::{TextTransform, TransformMode};
pub use registry::TaskRegistry;
pub use storage::{FsUploadStore, UploadStore};
pub use supervisor::TaskSupervisor;
pub use task::{
    ArtifactRef, InputItem, ItemOutcome, ItemResult, TaskId, TaskSnapshot, TaskStatus, Upload,
};
pub use worker::Pipeline;
