//! Input resolution: turn a user-supplied path or URL into an [`Upload`].
//!
//! The supervisor only ever sees uploads (a client file name plus bytes),
//! the same shape an HTTP front end would hand over. The CLI uses this
//! module to build them from local files and from `http(s)://` URLs.

use crate::error::DocBatchError;
use crate::task::Upload;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local file or download a URL.
pub async fn resolve_upload(input: &str, timeout_secs: u64) -> Result<Upload, DocBatchError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<Upload, DocBatchError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => DocBatchError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => DocBatchError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| DocBatchError::InvalidInput {
            input: path.display().to_string(),
        })?;

    debug!(file = %path.display(), bytes = bytes.len(), "read local input");
    Ok(Upload::new(file_name, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Upload, DocBatchError> {
    info!("Downloading input from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DocBatchError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            DocBatchError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            DocBatchError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(classify)?;

    if !response.status().is_success() {
        return Err(DocBatchError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(classify)?;
    let file_name = extract_filename(url);

    info!(file = %file_name, bytes = bytes.len(), "downloaded input");
    Ok(Upload::new(file_name, bytes.to_vec()))
}

/// Last non-empty URL path segment that looks like a file name.
///
/// Falls back to `download.txt` so the upload still carries an accepted
/// extension; the content decides whether extraction succeeds.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "download.txt".to_string()
}

/// Expand directory arguments into the files directly inside them.
///
/// Plain files and URLs pass through unchanged; directory entries are
/// sorted by name so the batch order is stable.
pub fn expand_inputs(inputs: &[String]) -> Result<Vec<String>, DocBatchError> {
    let mut out = Vec::with_capacity(inputs.len());
    for input in inputs {
        let path = PathBuf::from(input);
        if is_url(input) || !path.is_dir() {
            out.push(input.clone());
            continue;
        }
        let entries = std::fs::read_dir(&path).map_err(|e| DocBatchError::StorageFailed {
            path: path.clone(),
            source: e,
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        out.extend(files.into_iter().map(|p| p.display().to_string()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/letter.docx"));
        assert!(is_url("http://example.com/letter.docx"));
        assert!(!is_url("/tmp/letter.docx"));
        assert!(!is_url("letter.docx"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_last_url_segment() {
        assert_eq!(
            extract_filename("https://example.com/archive/letter_12.docx?raw=1"),
            "letter_12.docx"
        );
        assert_eq!(extract_filename("https://example.com/"), "download.txt");
    }

    #[tokio::test]
    async fn local_file_becomes_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epistola.txt");
        std::fs::write(&path, "Salve").unwrap();

        let upload = resolve_upload(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(upload.file_name, "epistola.txt");
        assert_eq!(upload.bytes, b"Salve");
    }

    #[tokio::test]
    async fn missing_local_file_is_not_found() {
        let err = resolve_upload("/definitely/not/here.txt", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, DocBatchError::FileNotFound { .. }));
    }

    #[test]
    fn directories_expand_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let inputs = vec![dir.path().display().to_string(), "https://x.org/c.md".into()];
        let expanded = expand_inputs(&inputs).unwrap();
        assert_eq!(expanded.len(), 3);
        assert!(expanded[0].ends_with("a.txt"));
        assert!(expanded[1].ends_with("b.txt"));
        assert_eq!(expanded[2], "https://x.org/c.md");
    }
}
