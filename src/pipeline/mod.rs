//! Pipeline stages for one batch item.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable and lets the worker swap implementations
//! (a fake transform in tests, a placeholder offline) without touching the
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ transform(correct) ──▶ transform(translate) ──▶ render
//! (docx/txt)   (chunks + retry)        (chunks + retry)        (Markdown)
//!                     │
//!                    llm ──▶ postprocess
//! ```
//!
//! 1. [`extract`]: plain text out of a stored upload; blocking work runs in
//!    `spawn_blocking`
//! 2. [`transform`]: chunking, per-call timeout and fallbacks around a
//!    [`transform::TextTransform`]
//! 3. [`retry`]: attempt counting and exponential backoff
//! 4. [`llm`]: the chat-completion client; the only stage with network I/O
//! 5. [`postprocess`]: deterministic cleanup of model responses
//! 6. [`render`]: per-item side-by-side document and the compiled batch
//!    document

pub mod extract;
pub mod llm;
pub mod postprocess;
pub mod render;
pub mod retry;
pub mod transform;
