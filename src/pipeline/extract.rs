//! Text extraction: turn a stored upload into plain text.
//!
//! ## Why spawn_blocking?
//!
//! Reading a `.docx` means inflating a zip member and scanning its XML,
//! both synchronous and CPU-bound for large files. The work runs on Tokio's
//! blocking pool so a big document never stalls the worker threads that
//! also serve pollers.
//!
//! ## Formats
//!
//! | Extension | Text |
//! |-----------|------|
//! | `docx` | every `<w:p>` paragraph of `word/document.xml`, one line each |
//! | `txt`, `md` | the file contents (UTF-8) |

use crate::error::ItemError;
use crate::task::InputItem;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;

/// Source of plain text for one input item.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract_text(&self, item: &InputItem) -> Result<String, ItemError>;
}

/// Extractor for files in the upload directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileExtractor;

#[async_trait]
impl DocumentExtractor for FileExtractor {
    async fn extract_text(&self, item: &InputItem) -> Result<String, ItemError> {
        let name = item.original_name.clone();
        let path = item.path.clone();

        let text = tokio::task::spawn_blocking(move || extract_blocking(&name, &path))
            .await
            .map_err(|e| ItemError::ExtractionFailed {
                name: item.original_name.clone(),
                detail: format!("extraction task panicked: {e}"),
            })??;

        debug!(
            item = %item.original_name,
            chars = text.chars().count(),
            "extracted text"
        );
        Ok(text)
    }
}

fn extract_blocking(name: &str, path: &Path) -> Result<String, ItemError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let failed = |detail: String| ItemError::ExtractionFailed {
        name: name.to_string(),
        detail,
    };

    match ext.as_str() {
        "docx" => {
            let bytes = std::fs::read(path).map_err(|e| failed(e.to_string()))?;
            docx_text(&bytes).map_err(failed)
        }
        "txt" | "md" => {
            let bytes = std::fs::read(path).map_err(|e| failed(e.to_string()))?;
            String::from_utf8(bytes).map_err(|e| failed(format!("not valid UTF-8: {e}")))
        }
        _ => Err(ItemError::UnsupportedFormat {
            name: name.to_string(),
        }),
    }
}

// ── docx ─────────────────────────────────────────────────────────────────────

static RE_PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<w:p(?:\s[^>]*)?/>|<w:p(?:\s[^>]*)?>(.*?)</w:p>").unwrap());

static RE_TEXT_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:(tab|br)\b[^>]*/>").unwrap()
});

// Paragraph properties hold tab-stop definitions (`<w:tabs><w:tab .../>`),
// which are not text.
static RE_PARA_PROPS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<w:pPr\b[^>]*/>|<w:pPr\b[^>]*>.*?</w:pPr>").unwrap());

static RE_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(lt|gt|quot|apos|amp|#[0-9]+|#x[0-9A-Fa-f]+);").unwrap());

/// Plain text of a `.docx` body: one line per paragraph, each terminated by
/// `\n`. Tabs become `\t`, soft breaks become a space.
pub fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a docx archive: {e}"))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| format!("missing word/document.xml: {e}"))?
        .read_to_string(&mut xml)
        .map_err(|e| format!("unreadable word/document.xml: {e}"))?;

    let mut text = String::with_capacity(xml.len() / 4);
    for para in RE_PARAGRAPH.captures_iter(&xml) {
        if let Some(body) = para.get(1) {
            let body = RE_PARA_PROPS.replace_all(body.as_str(), "");
            for run in RE_TEXT_RUN.captures_iter(&body) {
                match (run.get(1), run.get(2).map(|m| m.as_str())) {
                    (Some(t), _) => text.push_str(&decode_entities(t.as_str())),
                    (None, Some("tab")) => text.push('\t'),
                    _ => text.push(' '),
                }
            }
        }
        text.push('\n');
    }
    Ok(text)
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    RE_ENTITY
        .replace_all(s, |caps: &regex::Captures| {
            let decoded = match &caps[1] {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                num => {
                    let code = match num.strip_prefix("#x") {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num[1..].parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
