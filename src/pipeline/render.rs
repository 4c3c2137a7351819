//! Rendering: side-by-side Markdown documents and the compiled batch document.
//!
//! ## Layout
//!
//! A rendered artifact is one Markdown file per input item:
//!
//! ```text
//! # {label}
//!
//! Processed on 2026-01-31
//!
//! | Latin | | Dutch |
//! |---|---|---|
//! | source line | | target line |
//! ```
//!
//! Lines of the corrected source and of the translation are paired by
//! position; the shorter side is padded with empty cells and rows that are
//! empty on both sides are dropped. The middle column is a spacer so the two
//! texts do not run into each other when the table is printed.
//!
//! The compiled artifact stitches the tables of several rendered artifacts
//! together behind a numbered table of contents.
//!
//! ## Why atomic writes?
//!
//! Artifacts are handed out as download links while other batches are still
//! running. Writing to a temporary file and renaming it means a reader sees
//! either nothing or the complete document, never a truncated one.

use crate::config::BatchConfig;
use crate::error::ItemError;
use crate::task::ArtifactRef;
use async_trait::async_trait;
use chrono::Utc;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Produces the per-item and compiled output documents.
#[async_trait]
pub trait DocumentBuilder: Send + Sync {
    /// Render one item: corrected source next to its translation.
    async fn render(
        &self,
        title: &str,
        source_text: &str,
        target_text: &str,
    ) -> Result<ArtifactRef, ItemError>;

    /// Combine previously rendered artifacts, in the given order.
    async fn compile(&self, artifacts: &[ArtifactRef]) -> Result<ArtifactRef, ItemError>;
}

/// [`DocumentBuilder`] writing Markdown files into an output directory.
#[derive(Debug, Clone)]
pub struct MarkdownBuilder {
    output_dir: PathBuf,
    source_language: String,
    target_language: String,
}

impl MarkdownBuilder {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(
            &config.output_dir,
            &config.source_language,
            &config.target_language,
        )
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn table(&self, source_text: &str, target_text: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "| {} | | {} |",
            escape_cell(&self.source_language),
            escape_cell(&self.target_language)
        );
        out.push_str("|---|---|---|\n");

        let source: Vec<&str> = source_text.lines().collect();
        let target: Vec<&str> = target_text.lines().collect();
        for i in 0..source.len().max(target.len()) {
            let left = source.get(i).map_or("", |l| l.trim());
            let right = target.get(i).map_or("", |l| l.trim());
            if left.is_empty() && right.is_empty() {
                continue;
            }
            let _ = writeln!(out, "| {} | | {} |", escape_cell(left), escape_cell(right));
        }
        out
    }
}

#[async_trait]
impl DocumentBuilder for MarkdownBuilder {
    async fn render(
        &self,
        title: &str,
        source_text: &str,
        target_text: &str,
    ) -> Result<ArtifactRef, ItemError> {
        let name = format!("processed_{}_{}.md", file_safe(title), short_uid());
        let path = self.output_dir.join(&name);

        let mut doc = header(title);
        doc.push_str(&self.table(source_text, target_text));

        write_atomic(&path, &doc)
            .await
            .map_err(|e| ItemError::RenderFailed {
                name: title.to_string(),
                detail: format!("cannot write '{}': {e}", path.display()),
            })?;

        debug!(artifact = %name, bytes = doc.len(), "rendered document");
        Ok(ArtifactRef::new(name, title, path))
    }

    async fn compile(&self, artifacts: &[ArtifactRef]) -> Result<ArtifactRef, ItemError> {
        let name = format!("compiled_{}.md", short_uid());
        let path = self.output_dir.join(&name);
        let title = format!(
            "{} Correspondence with {} Translation",
            self.source_language, self.target_language
        );

        let mut doc = header(&title);
        doc.push_str("## Contents\n\n");
        for (i, artifact) in artifacts.iter().enumerate() {
            let _ = writeln!(doc, "{}. {}", i + 1, artifact.label);
        }

        for (i, artifact) in artifacts.iter().enumerate() {
            let _ = write!(doc, "\n## {}. {}\n\n", i + 1, artifact.label);
            match tokio::fs::read_to_string(&artifact.path).await {
                Ok(content) => doc.push_str(&extract_table(&content)),
                Err(e) => {
                    warn!(artifact = %artifact.name, "cannot include artifact: {e}");
                    let _ = writeln!(doc, "*Error including {}: {e}*", artifact.label);
                }
            }
        }

        write_atomic(&path, &doc)
            .await
            .map_err(|e| ItemError::CompileFailed {
                detail: format!("cannot write '{}': {e}", path.display()),
            })?;

        info!(artifact = %name, sections = artifacts.len(), "compiled document");
        Ok(ArtifactRef::new(name, title, path))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn header(title: &str) -> String {
    format!(
        "# {title}\n\nProcessed on {}\n\n",
        Utc::now().format("%Y-%m-%d")
    )
}

fn short_uid() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// The table rows of a rendered artifact: every line starting with `|`.
fn extract_table(content: &str) -> String {
    let mut table = String::new();
    for line in content.lines().filter(|l| l.starts_with('|')) {
        table.push_str(line);
        table.push('\n');
    }
    table
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Keep a title usable inside a file name.
fn file_safe(title: &str) -> String {
    let safe: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe.is_empty() {
        "document".to_string()
    } else {
        safe
    }
}

/// Write `contents` to `path` through a sibling temp file and a rename.
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path).await
}
