//! Post-processing: deterministic cleanup of model responses.
//!
//! Even with "provide only the corrected text" in the prompt, chat models
//! now and then wrap their answer in a code fence, prepend a
//! "Here is the translation:" line, or emit CRLF line endings and
//! zero-width characters. Each of these would end up verbatim in the
//! rendered document, so every response passes through [`clean_response`]
//! before it is accepted.
//!
//! ## Rule Order
//!
//! Fences are stripped first so the preamble rule sees the real first line;
//! line endings are normalised before any per-line rule runs.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw model response.
///
/// Rules (applied in order):
/// 1. Strip an outer code fence (with or without a language tag)
/// 2. Normalise line endings (CRLF / CR → LF)
/// 3. Drop a leading "Here is the …:" preamble line
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 7. Trim leading/trailing blank space of the whole response
pub fn clean_response(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = strip_preamble(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer fence ────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Drop chatty preamble ─────────────────────────────────────────────

// Only a line that names the output counts as a preamble; a first line of
// the document that merely starts with "Here is" must survive.
static RE_PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^[ \t]*(?:(?:here is|here's|below is) (?:the|your) (?:corrected|translated|translation)\b[^\n]{0,60}|(?:the )?(?:corrected text|translation)):[ \t]*\n",
    )
    .unwrap()
});

fn strip_preamble(input: &str) -> String {
    RE_PREAMBLE.replace(input, "").to_string()
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 6: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}
