//! Upload persistence.
//!
//! [`UploadStore`] is the boundary between submitted bytes and the files the
//! worker reads. [`FsUploadStore`] keeps uploads in a directory under
//! sanitised, timestamp-prefixed names:
//!
//! ```text
//! uploads/1767225600_letter_12.docx
//! ```
//!
//! Client file names are untrusted: only the final path component is kept,
//! characters outside `[A-Za-z0-9._-]` become `_` and leading dots are
//! dropped, so a name can neither escape the directory nor hide a file.

use crate::error::DocBatchError;
use crate::task::{InputItem, Upload};
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Accepts and persists uploads.
#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Whether a client file name has an accepted extension.
    fn accepts(&self, file_name: &str) -> bool;

    /// Persist one upload and return the item the worker will read.
    async fn store(&self, upload: &Upload) -> Result<InputItem, DocBatchError>;

    /// Best-effort removal of an item stored for a batch that was then
    /// rejected. The default keeps it.
    async fn discard(&self, item: &InputItem) {
        debug!(path = %item.path.display(), "keeping orphaned upload");
    }
}

/// [`UploadStore`] writing into a local directory.
#[derive(Debug, Clone)]
pub struct FsUploadStore {
    dir: PathBuf,
    allowed_extensions: Vec<String>,
}

impl FsUploadStore {
    /// `allowed_extensions` are compared case-insensitively, without dot.
    pub fn new<I, S>(dir: impl Into<PathBuf>, allowed_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            dir: dir.into(),
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl UploadStore for FsUploadStore {
    fn accepts(&self, file_name: &str) -> bool {
        match secure_filename(file_name).rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|a| *a == ext)
            }
            _ => false,
        }
    }

    async fn store(&self, upload: &Upload) -> Result<InputItem, DocBatchError> {
        let safe_name = secure_filename(&upload.file_name);
        let dir = self.dir.clone();
        let bytes = upload.bytes.clone();
        let name = safe_name.clone();

        let path = tokio::task::spawn_blocking(move || persist(&dir, &name, &bytes))
            .await
            .map_err(|e| DocBatchError::Internal(format!("Upload task panicked: {e}")))??;

        debug!(
            file = %safe_name,
            path = %path.display(),
            bytes = upload.bytes.len(),
            "stored upload"
        );
        Ok(InputItem {
            original_name: safe_name,
            path,
        })
    }

    async fn discard(&self, item: &InputItem) {
        match tokio::fs::remove_file(&item.path).await {
            Ok(()) => debug!(path = %item.path.display(), "discarded upload"),
            Err(e) => warn!(path = %item.path.display(), "could not discard upload: {e}"),
        }
    }
}

/// Atomically write `bytes` as `{unix_ts}_{name}` inside `dir`.
///
/// Never overwrites: a same-second name clash gets a numeric infix.
fn persist(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, DocBatchError> {
    let storage_err = |path: &Path, source: std::io::Error| DocBatchError::StorageFailed {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(|e| storage_err(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| storage_err(dir, e))?;
    tmp.write_all(bytes).map_err(|e| storage_err(tmp.path(), e))?;

    let ts = Utc::now().timestamp();
    let mut target = dir.join(format!("{ts}_{name}"));
    let mut n = 1;
    loop {
        match tmp.persist_noclobber(&target) {
            Ok(_) => return Ok(target),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                tmp = e.file;
                target = dir.join(format!("{ts}_{n}_{name}"));
                n += 1;
            }
            Err(e) => return Err(storage_err(&target, e.error)),
        }
    }
}

static RE_UNSAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]").unwrap());

/// Reduce a client-supplied name to a safe single path component.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let replaced = RE_UNSAFE.replace_all(base.trim(), "_");
    let safe = replaced.trim_start_matches(['.', '_']);
    if safe.is_empty() {
        "upload".to_string()
    } else {
        safe.to_string()
    }
}
